//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use stockledger_infra::LedgerOptions;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_QTY_DISPLAY_SCALE: u32 = 3;
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} has an invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// `None` selects the in-memory store and catalog.
    pub database_url: Option<String>,
    pub require_issue_location: bool,
    pub max_append_attempts: u32,
    pub qty_display_scale: u32,
    /// JSON file with `items` and `locations` loaded into the in-memory catalog.
    pub catalog_seed: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", DEFAULT_BIND_ADDR.parse().ok())?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let persistent = parse_bool(&lookup, "USE_PERSISTENT_STORES")?;
        let database_url = if persistent {
            Some(lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let max_append_attempts =
            parse_or(&lookup, "MAX_APPEND_ATTEMPTS", Some(LedgerOptions::DEFAULT_MAX_APPEND_ATTEMPTS))?;
        if max_append_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_APPEND_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let qty_display_scale =
            parse_or(&lookup, "QTY_DISPLAY_SCALE", Some(DEFAULT_QTY_DISPLAY_SCALE))?;
        if qty_display_scale > 28 {
            return Err(ConfigError::Invalid {
                var: "QTY_DISPLAY_SCALE",
                value: qty_display_scale.to_string(),
                reason: "must be between 0 and 28".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            require_issue_location: parse_bool(&lookup, "REQUIRE_ISSUE_LOCATION")?,
            max_append_attempts,
            qty_display_scale,
            catalog_seed: lookup("CATALOG_SEED").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => default.ok_or(ConfigError::Missing(var)),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match lookup(var) {
        None => Ok(false),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw,
                reason: "expected true or false".to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_select_in_memory_dev_setup() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.database_url, None);
        assert!(!cfg.require_issue_location);
        assert_eq!(cfg.max_append_attempts, 100);
        assert_eq!(cfg.qty_display_scale, 3);
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        assert_eq!(
            config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );

        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/stock"),
        ])
        .unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/stock"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            config(&[("MAX_APPEND_ATTEMPTS", "many")]),
            Err(ConfigError::Invalid { var: "MAX_APPEND_ATTEMPTS", .. })
        ));
        assert!(matches!(
            config(&[("REQUIRE_ISSUE_LOCATION", "maybe")]),
            Err(ConfigError::Invalid { var: "REQUIRE_ISSUE_LOCATION", .. })
        ));
        assert!(matches!(
            config(&[("BIND_ADDR", "localhost")]),
            Err(ConfigError::Invalid { var: "BIND_ADDR", .. })
        ));
    }
}
