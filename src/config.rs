//! Server configuration from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Read an env var, treating blank values as unset
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse an env var, falling back (with a warning) when it is unset or invalid
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_non_empty(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            database_url: "sqlite://tohyo.db".to_string(),
            database_max_connections: 5,
        }
    }
}

impl ServerConfig {
    /// Load from BIND_ADDR, PORT, DATABASE_URL and DATABASE_MAX_CONNECTIONS
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("BIND_ADDR", defaults.bind_addr),
            port: env_parse("PORT", defaults.port),
            database_url: env_non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            database_max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            ),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEYS: [&str; 4] = ["BIND_ADDR", "PORT", "DATABASE_URL", "DATABASE_MAX_CONNECTIONS"];

    fn clear_env() {
        for key in KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = ServerConfig::from_env();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3000");
        assert_eq!(config.database_url, "sqlite://tohyo.db");
        assert_eq!(config.database_max_connections, 5);
    }

    #[test]
    #[serial]
    fn test_overrides_and_invalid_values() {
        clear_env();
        std::env::set_var("BIND_ADDR", "127.0.0.1");
        std::env::set_var("PORT", "not-a-port");
        std::env::set_var("DATABASE_URL", "  sqlite::memory:  ");
        std::env::set_var("DATABASE_MAX_CONNECTIONS", "   ");

        let config = ServerConfig::from_env();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.database_max_connections, 5);

        clear_env();
    }
}
