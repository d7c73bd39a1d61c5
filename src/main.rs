use anyhow::{Context, Result, anyhow};
use api_console::builder::{LiveResult, RequestBuilder};
use api_console::catalog::{EndpointCatalog, EndpointDescriptor, HttpMethod};
use api_console::client::HttpClient;
use api_console::codegen::Language;
use api_console::config::{Config, Overrides};
use api_console::keys::{BackendClient, key_stats};
use api_console::params::split_key_value;
use api_console::session::SessionStore;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let catalog = api_console::catalog::load_catalog()?;
    let cli = build_cli();
    let matches = cli.get_matches();
    init_logging(&matches);

    let config = load_config(&catalog, &matches)?;
    let pretty = matches.get_flag("pretty");

    match matches.subcommand() {
        Some(("endpoints", sub)) => handle_endpoints(&catalog, sub),
        Some(("try", sub)) => handle_try(&catalog, &config, sub, pretty),
        Some(("snippet", sub)) => handle_snippet(&catalog, &config, sub),
        Some(("login", sub)) => handle_auth(&config, sub, false),
        Some(("register", sub)) => handle_auth(&config, sub, true),
        Some(("logout", _)) => handle_logout(&config),
        Some(("keys", sub)) => handle_keys(&config, sub, pretty),
        _ => Err(anyhow!("command required")),
    }
}

fn init_logging(matches: &ArgMatches) {
    let level = if matches.get_flag("debug") {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_env("RUST_LOG")
        .filter_level(level)
        .init();
}

fn load_config(catalog: &EndpointCatalog, matches: &ArgMatches) -> Result<Config> {
    let overrides = Overrides {
        base_url: matches.get_one::<String>("base_url").cloned(),
        token: matches.get_one::<String>("token").cloned(),
        token_file: matches.get_one::<String>("token_file").map(PathBuf::from),
        timeout: matches.get_one::<u64>("timeout").copied(),
    };
    Ok(Config::from_env(overrides, catalog))
}

fn build_cli() -> Command {
    let mut cmd = Command::new("api-console")
        .about("Explore, try and manage the backend REST API")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("base_url")
                .long("base-url")
                .global(true)
                .value_name("URL")
                .help("API base URL (env: API_CONSOLE_BASE_URL)"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .global(true)
                .value_name("TOKEN")
                .help("Session token or API key (env: API_CONSOLE_TOKEN)"),
        )
        .arg(
            Arg::new("token_file")
                .long("token-file")
                .global(true)
                .value_name("PATH")
                .help("Where the session token is kept (env: API_CONSOLE_TOKEN_FILE)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .global(true)
                .value_name("SECONDS")
                .value_parser(clap::value_parser!(u64))
                .help("HTTP timeout in seconds"),
        )
        .arg(
            Arg::new("pretty")
                .long("pretty")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Pretty-print JSON output"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        );

    cmd = cmd.subcommand(
        Command::new("endpoints")
            .about("Browse the endpoint catalog")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(Command::new("list").arg(json_flag()))
            .subcommand(
                Command::new("describe")
                    .arg(Arg::new("method").required(true))
                    .arg(Arg::new("path").required(true))
                    .arg(json_flag()),
            ),
    );

    cmd = cmd.subcommand(request_args(
        Command::new("try").about("Send a request to an endpoint and print the response"),
    ));

    cmd = cmd.subcommand(
        request_args(Command::new("snippet").about("Print code that sends the same request"))
            .arg(
                Arg::new("lang")
                    .long("lang")
                    .value_name("LANG")
                    .default_value("javascript")
                    .help("javascript|typescript|python|curl|go|ruby"),
            ),
    );

    for (name, about) in [
        ("login", "Sign in and save the session token"),
        ("register", "Create an account and save the session token"),
    ] {
        cmd = cmd.subcommand(
            Command::new(name)
                .about(about)
                .arg(Arg::new("email").long("email").value_name("EMAIL").required(true))
                .arg(
                    Arg::new("password")
                        .long("password")
                        .value_name("PASSWORD")
                        .required(true),
                ),
        );
    }

    cmd = cmd.subcommand(Command::new("logout").about("Forget the saved session token"));

    cmd = cmd.subcommand(
        Command::new("keys")
            .about("Manage API keys")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(Command::new("list"))
            .subcommand(
                Command::new("create").arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT"),
                ),
            )
            .subcommand(Command::new("regenerate").arg(Arg::new("key_id").required(true)))
            .subcommand(Command::new("delete").arg(Arg::new("key_id").required(true)))
            .subcommand(Command::new("stats")),
    );

    cmd
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .action(ArgAction::SetTrue)
        .help("Emit machine-readable JSON")
}

fn request_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("method").required(true))
        .arg(Arg::new("path").required(true))
        .arg(
            Arg::new("param")
                .long("param")
                .action(ArgAction::Append)
                .value_name("NAME=VALUE")
                .help("Path or query parameter (repeatable)"),
        )
        .arg(
            Arg::new("body")
                .long("body")
                .value_name("JSON")
                .conflicts_with("body_file")
                .help("Request body, replacing the endpoint's template"),
        )
        .arg(
            Arg::new("body_file")
                .long("body-file")
                .value_name("PATH")
                .conflicts_with("body")
                .help("Read the request body from a file"),
        )
}

fn handle_endpoints(catalog: &EndpointCatalog, matches: &ArgMatches) -> Result<()> {
    let (op, op_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("subcommand required"))?;
    match op {
        "list" => handle_list(catalog, op_matches),
        "describe" => {
            let endpoint = find_endpoint(catalog, op_matches)?;
            handle_describe(endpoint, op_matches)
        }
        other => Err(anyhow!("unknown endpoints command {other}")),
    }
}

fn handle_list(catalog: &EndpointCatalog, matches: &ArgMatches) -> Result<()> {
    let groups = catalog.by_category();
    if matches.get_flag("json") {
        let out: Vec<Value> = groups
            .iter()
            .map(|group| {
                let endpoints: Vec<String> = group
                    .endpoints
                    .iter()
                    .map(|e| format!("{} {}", e.method, e.path))
                    .collect();
                json!({ "category": group.category, "endpoints": endpoints })
            })
            .collect();
        return write_json(&Value::Array(out), true);
    }

    for group in &groups {
        write_stdout_line(group.category)?;
        for endpoint in &group.endpoints {
            write_stdout_line(&format!(
                "  {:<6} {}  {}",
                endpoint.method, endpoint.path, endpoint.description
            ))?;
        }
    }
    Ok(())
}

fn handle_describe(endpoint: &EndpointDescriptor, matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("json") {
        return write_json(&serde_json::to_value(endpoint)?, true);
    }

    write_stdout_line(&format!("{} {}", endpoint.method, endpoint.path))?;
    write_stdout_line(&format!("  category: {}", endpoint.category))?;
    write_stdout_line(&format!("  {}", endpoint.description))?;
    for (label, names) in [
        ("path params", &endpoint.path_params),
        ("query params", &endpoint.query_params),
    ] {
        if names.is_empty() {
            continue;
        }
        write_stdout_line(&format!("  {label}:"))?;
        for name in names {
            let kind = endpoint.param_type(name).unwrap_or("string");
            let mut line = format!("    {name}  {kind}");
            if let Some(description) = endpoint.param_description(name) {
                line.push_str(&format!("  {description}"));
            }
            write_stdout_line(&line)?;
        }
    }
    for (label, text) in [
        ("request body", &endpoint.request_body),
        ("response example", &endpoint.response_example),
    ] {
        if let Some(text) = text {
            let value: Value = serde_json::from_str(text)
                .with_context(|| format!("invalid {label} for {}", endpoint.path))?;
            write_stdout_line(&format!("  {label}:"))?;
            for line in serde_json::to_string_pretty(&value)?.lines() {
                write_stdout_line(&format!("    {line}"))?;
            }
        }
    }
    Ok(())
}

fn handle_try(
    catalog: &EndpointCatalog,
    config: &Config,
    matches: &ArgMatches,
    pretty: bool,
) -> Result<()> {
    let session = config.session_store()?;
    let mut builder = draft_from_args(catalog, config, &session, matches)?;
    let client = HttpClient::new(config.timeout)?;

    match builder.send(&client)? {
        LiveResult::Success(value) => write_json(value, pretty),
        LiveResult::Failure(message) => Err(anyhow!("{message}")),
    }
}

fn handle_snippet(catalog: &EndpointCatalog, config: &Config, matches: &ArgMatches) -> Result<()> {
    let session = config.session_store()?;
    let mut builder = draft_from_args(catalog, config, &session, matches)?;
    let language: Language = matches
        .get_one::<String>("lang")
        .map(|v| v.parse::<Language>())
        .transpose()?
        .unwrap_or_default();
    builder.set_target_language(language);

    if let Err(err) = builder.validate() {
        log::warn!("snippet is not ready to run: {err}");
    }
    let code = builder.snippet();
    write_stdout_line(code.trim_end())
}

fn draft_from_args<'a>(
    catalog: &'a EndpointCatalog,
    config: &Config,
    session: &dyn SessionStore,
    matches: &ArgMatches,
) -> Result<RequestBuilder<'a>> {
    let endpoint = find_endpoint(catalog, matches)?;
    let mut builder = RequestBuilder::new(catalog, config.base_url.clone(), session)?;
    builder.select_endpoint(endpoint);
    if let Some(token) = &config.token {
        builder.set_auth_token(token.clone());
    }

    if let Some(values) = matches.get_many::<String>("param") {
        for value in values {
            let (name, value) = split_key_value(value)
                .ok_or_else(|| anyhow!("--param expects NAME=VALUE, got {value}"))?;
            if !endpoint.param_names().any(|known| known == name) {
                return Err(anyhow!(
                    "{} {} has no parameter {name}",
                    endpoint.method,
                    endpoint.path
                ));
            }
            builder.set_param(name, value);
        }
    }

    if let Some(body) = load_body(
        matches.get_one::<String>("body"),
        matches.get_one::<String>("body_file"),
    )? {
        builder.set_body(body);
    }
    Ok(builder)
}

fn find_endpoint<'a>(
    catalog: &'a EndpointCatalog,
    matches: &ArgMatches,
) -> Result<&'a EndpointDescriptor> {
    let method: HttpMethod = matches
        .get_one::<String>("method")
        .ok_or_else(|| anyhow!("method required"))?
        .parse()?;
    let path = matches
        .get_one::<String>("path")
        .ok_or_else(|| anyhow!("path required"))?;
    catalog
        .find(path, method)
        .ok_or_else(|| anyhow!("unknown endpoint {method} {path}"))
}

/// Body text is kept as written so the request matches its snippet byte for byte.
fn load_body(body: Option<&String>, body_file: Option<&String>) -> Result<Option<String>> {
    let raw = if let Some(raw) = body {
        raw.clone()
    } else if let Some(path) = body_file {
        fs::read_to_string(path).with_context(|| format!("read body file {path}"))?
    } else {
        return Ok(None);
    };
    serde_json::from_str::<Value>(&raw).context("invalid JSON body")?;
    Ok(Some(raw))
}

fn handle_auth(config: &Config, matches: &ArgMatches, register: bool) -> Result<()> {
    let email = matches
        .get_one::<String>("email")
        .ok_or_else(|| anyhow!("email required"))?;
    let password = matches
        .get_one::<String>("password")
        .ok_or_else(|| anyhow!("password required"))?;

    let transport = HttpClient::new(config.timeout)?;
    let client = BackendClient::new(&transport, config.base_url.clone());
    let mut session = config.session_store()?;
    if register {
        client.register(&mut session, email, password)?;
    } else {
        client.login(&mut session, email, password)?;
    }
    write_stdout_line(&format!("signed in as {email}"))
}

fn handle_logout(config: &Config) -> Result<()> {
    let mut session = config.session_store()?;
    session.clear_token()?;
    write_stdout_line("signed out")
}

fn handle_keys(config: &Config, matches: &ArgMatches, pretty: bool) -> Result<()> {
    let (op, op_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("subcommand required"))?;

    let transport = HttpClient::new(config.timeout)?;
    let client = BackendClient::new(&transport, config.base_url.clone());
    let session = config.session_store()?;

    let out = match op {
        "list" => serde_json::to_value(client.list_keys(&session)?)?,
        "create" => {
            let description = op_matches.get_one::<String>("description");
            serde_json::to_value(client.create_key(&session, description.map(String::as_str))?)?
        }
        "regenerate" => {
            let key_id = key_id_arg(op_matches)?;
            serde_json::to_value(client.regenerate_key(&session, key_id)?)?
        }
        "delete" => {
            let key_id = key_id_arg(op_matches)?;
            client.delete_key(&session, key_id)?;
            json!({ "deleted": key_id })
        }
        "stats" => {
            let stats = key_stats(&client.list_keys(&session)?);
            json!({
                "total_keys": stats.total_keys,
                "last_used": stats
                    .last_used
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "Never".to_string()),
            })
        }
        other => return Err(anyhow!("unknown keys command {other}")),
    };
    write_json(&out, pretty)
}

fn key_id_arg(matches: &ArgMatches) -> Result<&str> {
    matches
        .get_one::<String>("key_id")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("key id required"))
}

fn write_json(value: &Value, pretty: bool) -> Result<()> {
    if pretty {
        write_stdout_line(&serde_json::to_string_pretty(value)?)
    } else {
        write_stdout_line(&serde_json::to_string(value)?)
    }
}

fn write_stdout_line(value: &str) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if let Err(err) = out.write_all(value.as_bytes()) {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    if let Err(err) = out.write_all(b"\n") {
        if err.kind() == std::io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        return Err(err.into());
    }
    Ok(())
}
