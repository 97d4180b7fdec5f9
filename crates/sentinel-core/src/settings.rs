//! Process-wide debug settings.
//!
//! Hazard tracking is off unless asked for. Settings come either from code
//! (`settings::init`) or, on first use, from the environment:
//!
//! | variable                | meaning                                  | default |
//! |-------------------------|------------------------------------------|---------|
//! | `SENTINEL_DEBUG`        | `1` / `true` enables the debug gate      | off     |
//! | `SENTINEL_DEBUG_COMPAT` | `0` / `false` skips compatibility checks | on      |
//! | `SENTINEL_DEBUG_HISTORY`| use records retained per storage region  | 64      |
//!
//! The global value is written at most once. Components that need different
//! settings (tests, embedded engines) build a [`crate::debug::DebugGate`]
//! from an explicit [`DebugSettings`] instead.

use std::env;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::hazard::DEFAULT_HISTORY_LIMIT;

static GLOBAL_SETTINGS: OnceLock<DebugSettings> = OnceLock::new();

pub const ENV_DEBUG: &str = "SENTINEL_DEBUG";
pub const ENV_DEBUG_COMPAT: &str = "SENTINEL_DEBUG_COMPAT";
pub const ENV_DEBUG_HISTORY: &str = "SENTINEL_DEBUG_HISTORY";

/// Configuration of the debug gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSettings {
    /// Master switch for use recording and checks.
    pub enabled: bool,
    /// Run dtype/device/broadcast checks on instrumented operations.
    pub check_compatibility: bool,
    /// Use records retained per storage region.
    pub history_limit: usize,
}

impl Default for DebugSettings {
    fn default() -> Self {
        DebugSettings {
            enabled: false,
            check_compatibility: true,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl DebugSettings {
    /// Debug mode on, everything else default.
    pub fn enabled() -> Self {
        DebugSettings::default().with_enabled(true)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_check_compatibility(mut self, check: bool) -> Self {
        self.check_compatibility = check;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Read settings from the `SENTINEL_DEBUG*` environment variables.
    /// Unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (the environment, a map...).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DebugSettings::default();
        let enabled = lookup(ENV_DEBUG)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.enabled);
        let check_compatibility = lookup(ENV_DEBUG_COMPAT)
            .and_then(|v| parse_flag(&v))
            .unwrap_or(defaults.check_compatibility);
        let history_limit = lookup(ENV_DEBUG_HISTORY)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults.history_limit);
        DebugSettings {
            enabled,
            check_compatibility,
            history_limit,
        }
    }
}

/// Install the process-wide settings. Fails if they were already set,
/// either by an earlier `init` or by a read through [`global`].
///
/// Only [`crate::DebugGate::from_global`] reads the global settings, so
/// tensors and storage regions may be created before `init` runs.
pub fn init(settings: DebugSettings) -> Result<()> {
    tracing::debug!(?settings, "installing debug settings");
    GLOBAL_SETTINGS
        .set(settings)
        .map_err(|_| Error::Settings("debug settings already initialized".to_string()))
}

/// The process-wide settings, read from the environment on first access.
pub fn global() -> &'static DebugSettings {
    GLOBAL_SETTINGS.get_or_init(|| {
        let settings = DebugSettings::from_env();
        tracing::debug!(?settings, "debug settings initialized from environment");
        settings
    })
}
