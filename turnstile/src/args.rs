use std::{
    io::IsTerminal,
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    str::FromStr,
};

use anyhow::Context;
use clap::{Parser, ValueEnum};
use config::Config;
use log::LevelFilter;
use logforth::filter::EnvFilter;

/// Crates whose logs follow `--log`. Everything else logs warnings and errors only.
const WORKSPACE_CRATES: &[&str] = &["turnstile", "server", "rate_limit", "config", "telemetry"];

const DEFAULT_LISTEN_ADDRESS: SocketAddr = SocketAddr::new(std::net::IpAddr::V4(Ipv4Addr::LOCALHOST), 8000);

#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about = "Fixed-window request rate limiter")]
pub(crate) struct Args {
    /// Address to listen on. Overrides `server.listen_address`, which itself
    /// defaults to 127.0.0.1:8000.
    #[arg(short, long, env = "TURNSTILE_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,
    /// TOML configuration file. Must exist, the rate limit has no defaults.
    #[arg(short, long, env = "TURNSTILE_CONFIG_PATH", default_value = "./turnstile.toml")]
    pub config: PathBuf,
    /// Log level of the Turnstile crates.
    #[arg(long = "log", env = "TURNSTILE_LOG", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,
    /// Log output format.
    #[arg(long, env = "TURNSTILE_LOG_STYLE", value_enum, default_value_t = LogStyle::Auto)]
    pub log_style: LogStyle,
}

impl Args {
    /// Load and validate the configuration file.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        Config::load(&self.config).with_context(|| format!("Invalid configuration in {}", self.config.display()))
    }

    /// The command line address, then the configured one, then the default.
    pub fn listen_address(&self, config: &Config) -> SocketAddr {
        self.listen_address
            .or(config.server.listen_address)
            .unwrap_or(DEFAULT_LISTEN_ADDRESS)
    }

    pub fn log_filter(&self) -> anyhow::Result<EnvFilter> {
        let directives = self.log_level.filter_directives();

        EnvFilter::from_str(&directives).with_context(|| format!("Invalid log filter `{directives}`"))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colored text on a terminal, plain text otherwise
    Auto,
    /// Colored text
    Color,
    /// Plain text
    Text,
    /// One JSON object per line
    Json,
}

impl LogStyle {
    /// Resolve `auto` against the standard output.
    pub fn resolve(self) -> Self {
        match self {
            LogStyle::Auto if std::io::stdout().is_terminal() => LogStyle::Color,
            LogStyle::Auto => LogStyle::Text,
            style => style,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }

    fn filter_directives(self) -> String {
        let level = self.level_filter();

        if level == LevelFilter::Off {
            return "off".to_string();
        }

        let level = level.as_str().to_ascii_lowercase();

        std::iter::once("warn".to_string())
            .chain(WORKSPACE_CRATES.iter().map(|name| format!("{name}={level}")))
            .collect::<Vec<_>>()
            .join(",")
    }
}
