//! Server configuration: a TOML file carrying the record table and the
//! addresses, with defaults for everything but the records.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// On-disk server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address the server listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Upstream resolver unmatched queries are relayed to.
    #[serde(default = "default_upstream")]
    pub upstream: SocketAddr,
    /// TTL stamped on every answer record.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    /// Static A records served from the match table.
    #[serde(default)]
    pub records: HashMap<String, RecordValue>,
}

/// A record entry: one address, or an ordered list of addresses.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RecordValue {
    Single(Ipv4Addr),
    Multiple(Vec<Ipv4Addr>),
}

impl RecordValue {
    /// Normalize to an address list; a single address becomes a one-element
    /// list so answers are always emitted in configured order.
    pub fn into_addrs(self) -> Vec<Ipv4Addr> {
        match self {
            RecordValue::Single(addr) => vec![addr],
            RecordValue::Multiple(addrs) => addrs,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5353))
}

fn default_upstream() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

fn default_ttl() -> u32 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            upstream: default_upstream(),
            ttl: default_ttl(),
            records: HashMap::new(),
        }
    }
}

impl Config {
    /// Load and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_list_records() {
        let config: Config = toml::from_str(
            r#"
            listen = "127.0.0.1:53"
            upstream = "223.5.5.5:53"
            ttl = 60

            [records]
            "www.example.com" = "123.123.123.123"
            "multi.example.com" = ["1.2.3.4", "11.22.33.44"]
            "#,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:53".parse().unwrap());
        assert_eq!(config.upstream, "223.5.5.5:53".parse().unwrap());
        assert_eq!(config.ttl, 60);

        let addrs = config.records["www.example.com"].clone().into_addrs();
        assert_eq!(addrs, vec![Ipv4Addr::new(123, 123, 123, 123)]);

        let addrs = config.records["multi.example.com"].clone().into_addrs();
        assert_eq!(
            addrs,
            vec![Ipv4Addr::new(1, 2, 3, 4), Ipv4Addr::new(11, 22, 33, 44)]
        );
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.listen, "127.0.0.1:5353".parse().unwrap());
        assert_eq!(config.upstream, "8.8.8.8:53".parse().unwrap());
        assert_eq!(config.ttl, 300);
        assert!(config.records.is_empty());
    }

    #[test]
    fn rejects_bad_addresses() {
        let result: Result<Config, _> = toml::from_str(
            r#"
            [records]
            "www.example.com" = "not-an-address"
            "#,
        );

        assert!(result.is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result: Result<Config, _> = toml::from_str("zone_file = \"db.example\"");

        assert!(result.is_err());
    }
}
