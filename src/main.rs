use std::path::PathBuf;

use clap::Parser;
use costscope::{AppState, build_app, config, observability};

/// Config file looked up in the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "costscope.toml";

/// CLI arguments for costscope
#[derive(Parser, Debug)]
#[command(version, about = "AWS Cost Explorer proxy and dashboard", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./costscope.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Export the OpenAPI specification (JSON format)
    Openapi {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Export the JSON schema for the configuration file
    Schema {
        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Write a starter configuration file
    Init {
        /// Path to create the config file (defaults to ./costscope.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Openapi { output }) => {
            #[cfg(feature = "utoipa")]
            run_openapi_export(output);
            #[cfg(not(feature = "utoipa"))]
            {
                let _ = output;
                eprintln!("Error: OpenAPI export requires the 'utoipa' feature to be enabled");
                std::process::exit(1);
            }
        }
        Some(Command::Schema { output }) => {
            #[cfg(feature = "json-schema")]
            run_schema_export(output);
            #[cfg(not(feature = "json-schema"))]
            {
                let _ = output;
                eprintln!("Error: JSON schema export requires the 'json-schema' feature");
                std::process::exit(1);
            }
        }
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Serve) | None => {
            if let Err(e) = run_server(args.config.as_deref()).await {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Pick the config file: an explicit path must exist; otherwise
/// `./costscope.toml` is used when present.
fn resolve_config_path(explicit_path: Option<&str>) -> Result<Option<PathBuf>, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(Some(path));
    }

    let cwd_config = PathBuf::from(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        return Ok(Some(cwd_config));
    }

    Ok(None)
}

fn load_config(
    explicit_path: Option<&str>,
) -> Result<(config::AppConfig, Option<PathBuf>), String> {
    match resolve_config_path(explicit_path)? {
        Some(path) => {
            let config = config::AppConfig::from_file(&path)
                .map_err(|e| format!("Failed to load config from {}: {e}", path.display()))?;
            Ok((config, Some(path)))
        }
        None => Ok((config::AppConfig::default(), None)),
    }
}

async fn run_server(explicit_config_path: Option<&str>) -> Result<(), String> {
    let (config, config_path) = load_config(explicit_config_path)?;

    observability::init_tracing(&config.observability.logging)
        .map_err(|e| format!("Failed to initialize tracing: {e}"))?;

    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    match &config_path {
        Some(path) => tracing::info!(config_file = %path.display(), "Starting costscope"),
        None => tracing::info!("Starting costscope with built-in defaults"),
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config)
        .map_err(|e| format!("Failed to create billing client: {e}"))?;
    tracing::info!(backend = state.billing.name(), "Billing backend ready");

    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {bind_addr}: {e}"))?;
    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {e}"))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests...");
}

/// Write the starter configuration file.
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To start the server, run:");
    println!("  costscope serve --config {}", output_path.display());
}

fn default_config_toml() -> &'static str {
    r#"# costscope configuration
#
# Every section is optional. Values of the form ${VAR} are read from the
# environment at startup.

[server]
host = "0.0.0.0"
port = 8000

# [server.cors]
# enabled = true
# allowed_origins = ["http://localhost:3000"]

[billing]
type = "cost_explorer"
region = "us-east-1"
timeout_secs = 60
default_currency = "USD"

# Uses the default AWS credential chain (environment, shared config, IMDS).
[billing.credentials]
type = "default"

# Or a named profile from ~/.aws/config:
# [billing.credentials]
# type = "profile"
# name = "billing"

# Or static keys:
# [billing.credentials]
# type = "static"
# access_key_id = "${AWS_ACCESS_KEY_ID}"
# secret_access_key = "${AWS_SECRET_ACCESS_KEY}"

# Generated data, no AWS access needed:
# [billing]
# type = "test"

[observability.logging]
level = "info"
format = "compact"

[observability.metrics]
enabled = false
path = "/metrics"

[dashboard]
enabled = true
title = "AWS Cost Analysis Dashboard"
"#
}

/// Export the config JSON schema to file or stdout
#[cfg(feature = "json-schema")]
fn run_schema_export(output: Option<String>) {
    let content = match config::AppConfig::json_schema_string() {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize config schema: {e}");
            std::process::exit(1);
        }
    };
    write_output(output, &content, "Config JSON schema");
}

/// Export OpenAPI specification to file or stdout (JSON format)
#[cfg(feature = "utoipa")]
fn run_openapi_export(output: Option<String>) {
    let spec = costscope::openapi::ApiDoc::build();
    let content = match serde_json::to_string_pretty(&spec) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Failed to serialize OpenAPI spec to JSON: {e}");
            std::process::exit(1);
        }
    };
    write_output(output, &content, "OpenAPI spec");
}

#[cfg(any(feature = "json-schema", feature = "utoipa"))]
fn write_output(output: Option<String>, content: &str, what: &str) {
    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, content) {
                eprintln!("Failed to write to {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("{what} written to {path}");
        }
        None => println!("{content}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_config_parses() {
        let config = config::AppConfig::from_str(default_config_toml()).unwrap();
        assert_eq!(config.server.port, 8000);
        assert!(config.dashboard.enabled);
        assert!(!config.observability.metrics.enabled);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let err = resolve_config_path(Some("/nonexistent/costscope.toml")).unwrap_err();
        assert!(err.contains("Config file not found"));
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let (config, resolved) = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(resolved, Some(path));
    }
}
