#![forbid(unsafe_code)]

//! Synchronizer configuration.

/// Environment variable read by [`SyncConfig::from_env`].
pub const ENV_MIRROR_VISIBILITY: &str = "FRANKENTUI_SEPARATOR_MIRROR_VISIBILITY";

/// Configuration for a [`SeparatorSynchronizer`](crate::SeparatorSynchronizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Link each separator's visibility to its paired element's.
    pub mirror_visibility: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mirror_visibility: true,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_mirror_visibility(mut self, mirror: bool) -> Self {
        self.mirror_visibility = mirror;
        self
    }

    /// Defaults overridden by `FRANKENTUI_SEPARATOR_MIRROR_VISIBILITY`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom lookup (for tests).
    #[must_use]
    pub fn from_env_with<F>(get_env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mirror_visibility = get_env(ENV_MIRROR_VISIBILITY)
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(defaults.mirror_visibility);
        Self { mirror_visibility }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
