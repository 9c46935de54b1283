//! Command-line and environment configuration

use carelink_core::auth::MIN_KEY_LEN;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Cli(#[from] clap::Error),

    #[error("JWT secret is {0} bytes, at least {min} required", min = MIN_KEY_LEN)]
    SecretTooShort(usize),

    #[error("bootstrap admin must be EMAIL:PASSWORD")]
    BootstrapAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, PartialEq, Eq)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Validated start-up configuration. Immutable once built.
#[derive(Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub jwt_secret: Vec<u8>,
    pub token_ttl: Duration,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub log_format: LogFormat,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind", &self.bind)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl", &self.token_ttl)
            .field("bootstrap_admin", &self.bootstrap_admin)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl ServerConfig {
    pub fn command() -> Command {
        Command::new("carelink-server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Clinical records API with token authentication")
            .arg(
                Arg::new("bind")
                    .long("bind")
                    .value_name("ADDR")
                    .env("CARELINK_BIND")
                    .help("Bind address")
                    .default_value("127.0.0.1:8080")
                    .value_parser(value_parser!(SocketAddr)),
            )
            .arg(
                Arg::new("data-dir")
                    .long("data-dir")
                    .value_name("PATH")
                    .env("CARELINK_DATA_DIR")
                    .help("Data directory path")
                    .default_value("./data")
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("jwt-secret")
                    .long("jwt-secret")
                    .value_name("SECRET")
                    .env("CARELINK_JWT_SECRET")
                    .hide_env_values(true)
                    .help("Token signing secret, at least 32 bytes")
                    .required(true),
            )
            .arg(
                Arg::new("token-ttl-secs")
                    .long("token-ttl-secs")
                    .value_name("SECS")
                    .env("CARELINK_TOKEN_TTL_SECS")
                    .help("Session token lifetime in seconds")
                    .default_value("3600")
                    .value_parser(value_parser!(u64).range(1..)),
            )
            .arg(
                Arg::new("bootstrap-admin")
                    .long("bootstrap-admin")
                    .value_name("EMAIL:PASSWORD")
                    .env("CARELINK_BOOTSTRAP_ADMIN")
                    .hide_env_values(true)
                    .help("Create this ADMIN account on start if the email is unused"),
            )
            .arg(
                Arg::new("log-format")
                    .long("log-format")
                    .value_name("FORMAT")
                    .help("Log output format")
                    .default_value("text")
                    .value_parser(["text", "json"]),
            )
    }

    /// Parse process arguments, exiting with usage on a command-line error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_matches(&Self::command().get_matches())
    }

    pub fn try_parse_from<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        Self::from_matches(&matches)
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let jwt_secret = matches
            .get_one::<String>("jwt-secret")
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default();
        if jwt_secret.len() < MIN_KEY_LEN {
            return Err(ConfigError::SecretTooShort(jwt_secret.len()));
        }

        let bootstrap_admin = matches
            .get_one::<String>("bootstrap-admin")
            .map(|raw| parse_bootstrap_admin(raw.as_str()))
            .transpose()?;

        let log_format = match matches.get_one::<String>("log-format").map(String::as_str) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(ServerConfig {
            bind: matches
                .get_one::<SocketAddr>("bind")
                .copied()
                .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8080))),
            data_dir: matches
                .get_one::<PathBuf>("data-dir")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("./data")),
            jwt_secret,
            token_ttl: Duration::from_secs(
                matches.get_one::<u64>("token-ttl-secs").copied().unwrap_or(3600),
            ),
            bootstrap_admin,
            log_format,
        })
    }
}

fn parse_bootstrap_admin(raw: &str) -> Result<BootstrapAdmin, ConfigError> {
    match raw.split_once(':') {
        Some((email, password)) if !email.is_empty() && !password.is_empty() => Ok(BootstrapAdmin {
            email: email.to_string(),
            password: password.to_string(),
        }),
        _ => Err(ConfigError::BootstrapAdmin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn defaults_apply() {
        let config = ServerConfig::try_parse_from(["carelink-server", "--jwt-secret", SECRET]).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = ServerConfig::try_parse_from(["carelink-server", "--jwt-secret", "short"]).unwrap_err();
        assert!(matches!(err, ConfigError::SecretTooShort(5)));
    }

    #[test]
    fn bootstrap_admin_splits_on_first_colon() {
        let config = ServerConfig::try_parse_from([
            "carelink-server",
            "--jwt-secret",
            SECRET,
            "--bootstrap-admin",
            "root@clinic.test:pa:ss",
            "--log-format",
            "json",
            "--token-ttl-secs",
            "60",
        ])
        .unwrap();

        let admin = config.bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@clinic.test");
        assert_eq!(admin.password, "pa:ss");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.token_ttl, Duration::from_secs(60));
    }

    #[test]
    fn zero_ttl_is_a_cli_error() {
        let err = ServerConfig::try_parse_from([
            "carelink-server",
            "--jwt-secret",
            SECRET,
            "--token-ttl-secs",
            "0",
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Cli(_)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = ServerConfig::try_parse_from([
            "carelink-server",
            "--jwt-secret",
            SECRET,
            "--bootstrap-admin",
            "root@clinic.test:hunter2",
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(SECRET));
        assert!(!debug.contains("hunter2"));
    }
}
