use std::path::PathBuf;
use std::time::Duration;

pub const ENV_WORKSPACE: &str = "CLASSPOINTS_WORKSPACE";
pub const ENV_LOG: &str = "CLASSPOINTS_LOG";
pub const ENV_ROSTER_TTL: &str = "CLASSPOINTS_ROSTER_TTL_SECS";

const DEFAULT_LOG: &str = "info";
const DEFAULT_ROSTER_TTL_SECS: u64 = 30;

/// Process settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Opened before the first request when set.
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    /// How long a built roster may be served again. Zero disables reuse.
    pub roster_ttl: Duration,
    /// Problems found while reading the environment. Logged once logging is up.
    pub warnings: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let roster_ttl_secs = match non_empty(ENV_ROSTER_TTL) {
            None => DEFAULT_ROSTER_TTL_SECS,
            Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
                warnings.push(format!(
                    "{ENV_ROSTER_TTL}={raw:?} is not a whole number of seconds; using {DEFAULT_ROSTER_TTL_SECS}"
                ));
                DEFAULT_ROSTER_TTL_SECS
            }),
        };

        Config {
            workspace: non_empty(ENV_WORKSPACE).map(PathBuf::from),
            log_filter: non_empty(ENV_LOG).unwrap_or_else(|| DEFAULT_LOG.to_string()),
            roster_ttl: Duration::from_secs(roster_ttl_secs),
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = config_from(&[]);
        assert_eq!(c.workspace, None);
        assert_eq!(c.log_filter, "info");
        assert_eq!(c.roster_ttl, Duration::from_secs(30));
        assert!(c.warnings.is_empty());
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let c = config_from(&[
            (ENV_WORKSPACE, " /tmp/ws "),
            (ENV_LOG, "classpointsd=debug"),
            (ENV_ROSTER_TTL, "0"),
        ]);
        assert_eq!(c.workspace, Some(PathBuf::from("/tmp/ws")));
        assert_eq!(c.log_filter, "classpointsd=debug");
        assert!(c.roster_ttl.is_zero());
    }

    #[test]
    fn bad_ttl_falls_back_with_a_warning() {
        let c = config_from(&[(ENV_ROSTER_TTL, "soon")]);
        assert_eq!(c.roster_ttl, Duration::from_secs(30));
        assert_eq!(c.warnings.len(), 1);
    }
}
