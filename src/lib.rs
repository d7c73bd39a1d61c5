pub mod builder;
pub mod catalog;
pub mod client;
pub mod codegen;
pub mod config;
pub mod error;
pub mod keys;
pub mod params;
pub mod session;
