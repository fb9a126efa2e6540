use std::path::PathBuf;

use serde::Deserialize;

/// Optional viewer configuration, read from `~/.config/uelog/config.toml`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ViewerConfig {
    /// Poll interval for --follow, in milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Filter definitions applied when --filters is not given
    pub filters_path: Option<PathBuf>,
}

impl ViewerConfig {
    /// Load the config file if one exists; missing or unreadable files fall
    /// back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&text) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "ignoring invalid config");
                Self::default()
            }
        }
    }

    fn config_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("uelog").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: ViewerConfig = toml::from_str(
            "poll_interval_ms = 250\nfilters_path = \"/tmp/filters.json\"\n",
        )
        .unwrap();
        assert_eq!(config.poll_interval_ms, Some(250));
        assert_eq!(
            config.filters_path.as_deref(),
            Some(std::path::Path::new("/tmp/filters.json"))
        );
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: ViewerConfig = toml::from_str("").unwrap();
        assert!(config.poll_interval_ms.is_none());
        assert!(config.filters_path.is_none());
    }
}
