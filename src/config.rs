//! Configuration management for rategate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::error::{RategateError, Result};
use crate::ratelimit::{IpPolicy, RolePolicies};

/// Main configuration for the rategate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Paths never counted against the global per-IP limit
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            exempt_paths: default_exempt_paths(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string(), "/".to_string()]
}

/// Rate limiting configuration: the role table for authenticated endpoints
/// and the fixed IP policy for the global and login gates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default)]
    pub roles: RolePolicies,

    #[serde(default)]
    pub ip: IpPolicy,
}

impl AppConfig {
    /// Load configuration: the YAML file when a path is given, built-in
    /// defaults otherwise, then environment overrides and validation.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RategateError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply `RATEGATE_*` environment overrides to the fixed IP policy.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_u32("RATEGATE_LOGIN_PER_15MIN")? {
            self.limits.ip.login_per_15min = v;
        }
        if let Some(v) = env_u32("RATEGATE_LOGIN_PER_HOUR")? {
            self.limits.ip.login_per_hour = v;
        }
        if let Some(v) = env_u32("RATEGATE_GLOBAL_PER_HOUR")? {
            self.limits.ip.global_per_hour = v;
        }
        Ok(())
    }

    /// Reject invalid limit values at load time, before any check runs.
    pub fn validate(&self) -> Result<()> {
        let ip = &self.limits.ip;
        for (name, value) in [
            ("ip.login_per_15min", ip.login_per_15min),
            ("ip.login_per_hour", ip.login_per_hour),
            ("ip.global_per_hour", ip.global_per_hour),
        ] {
            if value == 0 {
                return Err(RategateError::Config(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        for (role, endpoint, limits) in self.limits.roles.entries() {
            for (window, value) in [
                ("per_minute", limits.per_minute),
                ("per_hour", limits.per_hour),
                ("per_day", limits.per_day),
            ] {
                if value == Some(0) {
                    return Err(RategateError::Config(format!(
                        "roles.{}.{endpoint}.{window} must be at least 1",
                        role.as_str()
                    )));
                }
            }
        }

        for path in &self.server.exempt_paths {
            if !path.starts_with('/') {
                return Err(RategateError::Config(format!(
                    "exempt path {path:?} must start with '/'"
                )));
            }
        }

        Ok(())
    }
}

/// Read an optional integer environment variable, failing fast on garbage.
fn env_u32(name: &str) -> Result<Option<u32>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<u32>().map(Some).map_err(|_| {
            RategateError::Config(format!("{name} must be an integer, got {value:?}"))
        }),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(RategateError::Config(format!("{name}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::Role;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.ip.global_per_hour, 1000);
        assert!(config.server.exempt_paths.contains(&"/health".to_string()));
    }

    #[test]
    fn test_parse_yaml_config() {
        let yaml = r#"
server:
  listen_addr: 0.0.0.0:9000
  exempt_paths: ["/health"]
limits:
  ip:
    login_per_15min: 3
    login_per_hour: 6
    global_per_hour: 500
  roles:
    admin:
      chat:
        per_minute: 30
        per_hour: 200
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.limits.ip.login_per_15min, 3);

        let windows = config.limits.roles.resolve(Role::Admin, "chat").unwrap();
        assert_eq!(windows[0].limit, 30);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = AppConfig::from_yaml("limits:\n  ip:\n    global_per_hour: 42\n").unwrap();
        assert_eq!(config.limits.ip.global_per_hour, 42);
        // Untouched fields keep their defaults.
        assert_eq!(config.limits.ip.login_per_15min, 5);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_zero_ip_limit_rejected() {
        let config = AppConfig::from_yaml("limits:\n  ip:\n    global_per_hour: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_role_limit_rejected() {
        let yaml = r#"
limits:
  roles:
    intern:
      chat:
        per_minute: 0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_exempt_path_rejected() {
        let config = AppConfig::from_yaml("server:\n  exempt_paths: [\"health\"]\n").unwrap();
        assert!(config.validate().is_err());
    }

    // Single test for env handling: load() reads every RATEGATE_* variable,
    // so separate tests would race through the shared process environment.
    #[test]
    fn test_env_overrides() {
        std::env::set_var("RATEGATE_GLOBAL_PER_HOUR", "77");
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.limits.ip.global_per_hour, 77);

        std::env::set_var("RATEGATE_GLOBAL_PER_HOUR", "plenty");
        assert!(AppConfig::load(None).is_err());
        std::env::remove_var("RATEGATE_GLOBAL_PER_HOUR");
    }
}
