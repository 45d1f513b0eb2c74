//! Load config from file and environment.

use std::path::PathBuf;

use meshlink_core::{ServiceTag, ServiceTagError};
use serde::Deserialize;
use tracing::{debug, warn};

/// Role a node takes when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialRole {
    Browse,
    Advertise,
    Idle,
}

impl std::str::FromStr for InitialRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "browse" => Ok(InitialRole::Browse),
            "advertise" => Ok(InitialRole::Advertise),
            "idle" => Ok(InitialRole::Idle),
            other => Err(ConfigError::InitialRole(other.to_string())),
        }
    }
}

/// Node configuration. File: ~/.config/meshlink/config.toml or /etc/meshlink/config.toml.
/// Env overrides: MESHLINK_DISPLAY_NAME, MESHLINK_SERVICE_TAG, MESHLINK_INITIAL_ROLE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name other peers see (default: $HOSTNAME, else "meshlink").
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Discovery namespace (default "mesh-chat").
    #[serde(default)]
    pub service_tag: ServiceTag,
    /// Default "browse".
    #[serde(default = "default_initial_role")]
    pub initial_role: InitialRole,
}

fn default_display_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "meshlink".to_string())
}

fn default_initial_role() -> InitialRole {
    InitialRole::Browse
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            service_tag: ServiceTag::default(),
            initial_role: default_initial_role(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MESHLINK_SERVICE_TAG: {0}")]
    ServiceTag(#[from] ServiceTagError),
    #[error("MESHLINK_INITIAL_ROLE: unknown role {0:?} (expected browse, advertise or idle)")]
    InitialRole(String),
    #[error("display name must not be empty")]
    EmptyDisplayName,
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Result<Config, ConfigError> {
    let c = load_file().unwrap_or_default();
    apply_env(c, |k| std::env::var(k).ok())
}

/// Apply env overrides read through `lookup`.
pub fn apply_env(
    mut c: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    if let Some(name) = lookup("MESHLINK_DISPLAY_NAME") {
        c.display_name = name;
    }
    if let Some(tag) = lookup("MESHLINK_SERVICE_TAG") {
        c.service_tag = ServiceTag::parse(&tag)?;
    }
    if let Some(role) = lookup("MESHLINK_INITIAL_ROLE") {
        c.initial_role = role.parse()?;
    }
    if c.display_name.trim().is_empty() {
        return Err(ConfigError::EmptyDisplayName);
    }
    Ok(c)
}

pub fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/meshlink/config.toml"));
    }
    out.push(PathBuf::from("/etc/meshlink/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p) {
                Ok(s) => match parse(&s) {
                    Ok(c) => {
                        debug!(path = %p.display(), "loaded config");
                        return Some(c);
                    }
                    Err(e) => warn!(path = %p.display(), error = %e, "ignoring invalid config"),
                },
                Err(e) => warn!(path = %p.display(), error = %e, "cannot read config"),
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn parse_full_file() {
        let c = parse(
            r#"
display_name = "Kitchen iPad"
service_tag = "mctest"
initial_role = "advertise"
"#,
        )
        .unwrap();
        assert_eq!(c.display_name, "Kitchen iPad");
        assert_eq!(c.service_tag.as_str(), "mctest");
        assert_eq!(c.initial_role, InitialRole::Advertise);
    }

    #[test]
    fn parse_empty_file_uses_defaults() {
        let c = parse("").unwrap();
        assert_eq!(c.service_tag, ServiceTag::default());
        assert_eq!(c.initial_role, InitialRole::Browse);
        assert!(!c.display_name.is_empty());
    }

    #[test]
    fn parse_rejects_bad_tag_and_unknown_keys() {
        assert!(parse(r#"service_tag = "Not Valid""#).is_err());
        assert!(parse(r#"proxy_port = 3128"#).is_err());
    }

    #[test]
    fn env_overrides_file() {
        let c = apply_env(
            Config::default(),
            env(&[
                ("MESHLINK_DISPLAY_NAME", "B"),
                ("MESHLINK_SERVICE_TAG", "chat-2"),
                ("MESHLINK_INITIAL_ROLE", "idle"),
            ]),
        )
        .unwrap();
        assert_eq!(c.display_name, "B");
        assert_eq!(c.service_tag.as_str(), "chat-2");
        assert_eq!(c.initial_role, InitialRole::Idle);
    }

    #[test]
    fn env_invalid_values_are_errors() {
        assert!(matches!(
            apply_env(Config::default(), env(&[("MESHLINK_SERVICE_TAG", "UPPER")])),
            Err(ConfigError::ServiceTag(_))
        ));
        assert!(matches!(
            apply_env(Config::default(), env(&[("MESHLINK_INITIAL_ROLE", "lurk")])),
            Err(ConfigError::InitialRole(_))
        ));
        assert!(matches!(
            apply_env(Config::default(), env(&[("MESHLINK_DISPLAY_NAME", "  ")])),
            Err(ConfigError::EmptyDisplayName)
        ));
    }
}
