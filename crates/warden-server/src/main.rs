use clap::Parser;

use warden_server::WardenServer;
use warden_server::config::loader::load_config;

#[derive(Debug, Parser)]
#[command(name = "warden-server", version, about = "Warden identity provider")]
struct Cli {
    /// Configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<String>,
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From WARDEN_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (warden.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (WARDEN_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(
            e,
            dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound
        )
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    warden_server::observability::init_tracing();

    let cli = Cli::parse();
    let (config_path, source) = resolve_config_path(cli.config);

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        issuer = %cfg.auth.issuer,
        "Configuration loaded"
    );
    warden_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match WardenServer::build(&cfg).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err}");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: WARDEN_CONFIG
/// 3. Default: warden.toml
fn resolve_config_path(cli: Option<String>) -> (String, ConfigSource) {
    if let Some(path) = cli {
        return (path, ConfigSource::CliArgument);
    }

    if let Ok(path) = std::env::var("WARDEN_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }

    ("warden.toml".to_string(), ConfigSource::Default)
}
