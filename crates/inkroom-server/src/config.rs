//! Server configuration from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;

use thiserror::Error;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3001;
/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Base URL of the web client, used to build invitation links.
    pub frontend_url: String,
    /// Messages queued per connection before further ones are dropped.
    pub outbound_buffer: usize,
    /// Sender address on invitation emails.
    pub mail_from: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            frontend_url: "http://localhost:5173".to_string(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            mail_from: "noreply@localhost".to_string(),
        }
    }
}

impl ServerConfig {
    /// Read `INKROOM_HOST`, `PORT`, `FRONTEND_URL`, `INKROOM_OUTBOUND_BUFFER`
    /// and `SMTP_USER`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = lookup("INKROOM_HOST") {
            config.host = parse("INKROOM_HOST", host)?;
        }
        if let Some(port) = lookup("PORT") {
            config.port = parse("PORT", port)?;
        }
        if let Some(url) = lookup("FRONTEND_URL").filter(|u| !u.is_empty()) {
            config.frontend_url = url;
        }
        if let Some(buffer) = lookup("INKROOM_OUTBOUND_BUFFER") {
            config.outbound_buffer = parse("INKROOM_OUTBOUND_BUFFER", buffer.clone())?;
            if config.outbound_buffer == 0 {
                return Err(ConfigError::Invalid {
                    name: "INKROOM_OUTBOUND_BUFFER",
                    value: buffer,
                });
            }
        }
        if let Some(from) = lookup("SMTP_USER").filter(|f| !f.is_empty()) {
            config.mail_from = from;
        }

        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
