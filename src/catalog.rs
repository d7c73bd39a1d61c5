use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Whether a request with this method carries a JSON body.
    pub fn sends_body(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            other => Err(anyhow!(
                "unsupported method {other} (expected: GET|POST|PUT|DELETE)"
            )),
        }
    }
}

/// Static description of one backend operation.
///
/// Optional text fields are `None` when the catalog omits them; an empty
/// string is kept as an empty string.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointDescriptor {
    pub path: String,
    pub method: HttpMethod,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub path_params: Vec<String>,
    #[serde(default)]
    pub query_params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_example: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub param_types: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub param_descriptions: BTreeMap<String, String>,
}

impl EndpointDescriptor {
    pub fn placeholder(name: &str) -> String {
        format!("{{{name}}}")
    }

    /// Path and query parameter names, path parameters first.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.path_params
            .iter()
            .chain(self.query_params.iter())
            .map(String::as_str)
    }

    pub fn param_type(&self, name: &str) -> Option<&str> {
        self.param_types.get(name).map(String::as_str)
    }

    pub fn param_description(&self, name: &str) -> Option<&str> {
        self.param_descriptions.get(name).map(String::as_str)
    }

    fn validate(&self) -> Result<()> {
        for name in &self.path_params {
            if !self.path.contains(&Self::placeholder(name)) {
                return Err(anyhow!(
                    "path param {name} does not appear in {} {}",
                    self.method,
                    self.path
                ));
            }
        }
        if let Some(body) = &self.request_body {
            serde_json::from_str::<Value>(body).with_context(|| {
                format!("invalid request_body JSON for {} {}", self.method, self.path)
            })?;
        }
        if let Some(example) = &self.response_example {
            serde_json::from_str::<Value>(example).with_context(|| {
                format!(
                    "invalid response_example JSON for {} {}",
                    self.method, self.path
                )
            })?;
        }
        Ok(())
    }
}

/// Descriptors sharing one category, in declaration order.
#[derive(Debug)]
pub struct CategoryGroup<'a> {
    pub category: &'a str,
    pub endpoints: Vec<&'a EndpointDescriptor>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EndpointCatalog {
    pub version: u32,
    pub default_base_url: String,
    pub bearer_auth_prefixes: Vec<String>,
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointCatalog {
    pub fn new(
        default_base_url: impl Into<String>,
        bearer_auth_prefixes: Vec<String>,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Result<Self> {
        let catalog = Self {
            version: 1,
            default_base_url: default_base_url.into(),
            bearer_auth_prefixes,
            endpoints,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let catalog: Self = serde_json::from_str(raw).context("parse endpoint catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn all(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// First descriptor of the first category, used as the initial selection.
    pub fn default_endpoint(&self) -> Option<&EndpointDescriptor> {
        self.by_category()
            .into_iter()
            .next()
            .and_then(|group| group.endpoints.into_iter().next())
    }

    pub fn by_category(&self) -> Vec<CategoryGroup<'_>> {
        let mut groups: Vec<CategoryGroup<'_>> = Vec::new();
        for endpoint in &self.endpoints {
            match groups
                .iter_mut()
                .find(|group| group.category == endpoint.category)
            {
                Some(group) => group.endpoints.push(endpoint),
                None => groups.push(CategoryGroup {
                    category: &endpoint.category,
                    endpoints: vec![endpoint],
                }),
            }
        }
        groups
    }

    /// Exact lookup on both path and method; several descriptors may share a path.
    pub fn find(&self, path: &str, method: HttpMethod) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.path == path && endpoint.method == method)
    }

    pub fn requires_bearer_auth(&self, path: &str) -> bool {
        self.bearer_auth_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    fn validate(&self) -> Result<()> {
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }
}

pub fn load_catalog() -> Result<EndpointCatalog> {
    let raw = include_str!("../schemas/endpoints.json");
    let catalog = EndpointCatalog::from_json(raw).context("invalid endpoints.json")?;
    log::debug!("loaded {} endpoints", catalog.all().len());
    Ok(catalog)
}
