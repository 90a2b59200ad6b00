use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Command-line flags.
///
/// Every setting is optional here: a flag that was not passed is left out of
/// the CLI layer so it cannot shadow the TOML file or the environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "jami-web-server", version, about = "Jami web realtime server")]
pub struct Cli {
    /// Port to listen on [default: 5000]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address [default: 0.0.0.0]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./jami-web.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub generate_config: bool,

    /// Print an argon2 hash of the given password (for accounts.json) and exit
    #[arg(long, value_name = "PASSWORD")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_password: Option<String>,

    /// Data directory for persistent state (token keys, accounts.json) [default: ./data]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Lifetime of issued access tokens in seconds [default: 7200]
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ttl_secs: Option<i64>,

    /// Address of the daemon sidecar (host:port). Without it the server
    /// uses an in-process loopback daemon.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daemon_addr: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub generate_config: bool,
    #[serde(default)]
    pub hash_password: Option<String>,
    pub data_dir: String,
    pub token_ttl_secs: i64,
    #[serde(default)]
    pub daemon_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            generate_config: false,
            hash_password: None,
            data_dir: "./data".to_string(),
            token_ttl_secs: 7200,
            daemon_addr: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (JAMI_WEB_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Cli::parse();
        let config_path = cli.config.clone();
        Self::figment(&config_path, cli).extract()
    }

    fn figment(config_path: &str, cli: Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("JAMI_WEB_"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Jami web realtime server configuration
# Place this file at ./jami-web.toml or specify with --config <path>
# All settings can be overridden via environment variables (JAMI_WEB_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 5000)
# port = 5000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory holding jwt_private.pem, jwt_public.pem and accounts.json
# data_dir = "./data"

# Access token lifetime in seconds (default: 7200 = 2 hours)
# token_ttl_secs = 7200

# Daemon sidecar address. Leave unset to run with the in-process
# loopback daemon (local accounts message each other directly).
# daemon_addr = "127.0.0.1:5555"
"#
    .to_string()
}
