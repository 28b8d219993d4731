//! Tunable search heuristics and retry limits.
//!
//! The role lists below encode quirks of particular UI frameworks, so they
//! are data rather than code. Defaults work for common desktop applications
//! and browsers; a TOML file can override any subset.
//!
//! # Example
//!
//! ```ignore
//! use horizon_probe_core::ProbeConfig;
//!
//! let config = ProbeConfig::from_toml_str(r#"
//! [find]
//! skip_if_invisible_roles = ["WINDOW", "DOCUMENT"]
//!
//! [browser]
//! out_proc_attempts = 10
//! "#)?;
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::logging::targets;
use crate::role::Role;

/// All tunables, grouped by subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProbeConfig {
    pub find: FindConfig,
    pub rects: RectConfig,
    pub document: DocumentConfig,
    pub shim: ShimConfig,
    pub browser: BrowserConfig,
}

/// Tree search limits and hidden-subtree pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FindConfig {
    /// Deepest level searched unless the `level` prop says otherwise.
    pub max_level: u32,
    /// Most children read from one node unless the `maxcc` prop says otherwise.
    pub max_children: u32,
    /// Roles whose subtree is skipped when the object is invisible. Other
    /// roles are skipped only when invisible without being offscreen.
    pub skip_if_invisible_roles: Vec<Role>,
    /// Non-client roles never treated as the client area of a top-level window.
    pub top_level_nonclient_roles: Vec<Role>,
}

impl Default for FindConfig {
    fn default() -> Self {
        Self {
            max_level: 1000,
            max_children: 10000,
            skip_if_invisible_roles: vec![
                Role::WINDOW,
                Role::DOCUMENT,
                Role::PROPERTYPAGE,
                Role::GROUPING,
                Role::ALERT,
                Role::MENUPOPUP,
            ],
            top_level_nonclient_roles: vec![
                Role::MENUBAR,
                Role::TITLEBAR,
                Role::SCROLLBAR,
                Role::GRIP,
            ],
        }
    }
}

/// Filtering of captured rectangles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RectConfig {
    /// Dropped when they end up with no children.
    pub container_roles: Vec<Role>,
    /// Dropped when they are the only child of their parent.
    pub decorative_roles: Vec<Role>,
    /// Kept when offscreen.
    pub keep_offscreen_roles: Vec<Role>,
}

impl Default for RectConfig {
    fn default() -> Self {
        Self {
            container_roles: vec![Role::GROUPING, Role::PANE],
            decorative_roles: vec![Role::STATICTEXT, Role::GRAPHIC, Role::GROUPING],
            keep_offscreen_roles: vec![Role::PAGETAB, Role::PAGETABLIST],
        }
    }
}

/// Browser page document discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentConfig {
    pub max_level: u32,
    /// Roles that never contain the page document.
    pub skip_roles: Vec<Role>,
    /// Value prefixes of a real page document.
    pub url_schemes: Vec<String>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_level: 30,
            skip_roles: vec![
                Role::MENUBAR,
                Role::TITLEBAR,
                Role::MENUPOPUP,
                Role::TOOLBAR,
                Role::STATUSBAR,
                Role::OUTLINE,
                Role::LIST,
                Role::SCROLLBAR,
                Role::GRIP,
                Role::SEPARATOR,
                Role::PUSHBUTTON,
                Role::TEXT,
                Role::TOOLTIP,
                Role::TABLE,
            ],
            url_schemes: vec!["https:".into(), "http:".into(), "file:".into()],
        }
    }
}

/// Modern backend wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShimConfig {
    /// How long a child list stays valid.
    pub child_cache_ms: u64,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self { child_cache_ms: 40 }
    }
}

impl ShimConfig {
    pub fn child_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.child_cache_ms)
    }
}

/// Chromium accessibility enabling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub in_proc_attempts: u32,
    pub out_proc_attempts: u32,
    pub in_proc_sleep_ms: u64,
    pub out_proc_sleep_ms: u64,
    /// Restarts allowed while the page document does not exist yet.
    pub max_not_found: u32,
    /// Enabling slower than this is logged as a warning.
    pub slow_warning_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            in_proc_attempts: 70,
            out_proc_attempts: 25,
            in_proc_sleep_ms: 10,
            out_proc_sleep_ms: 100,
            max_not_found: 20,
            slow_warning_ms: 500,
        }
    }
}

impl ProbeConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ProbeConfig = toml::from_str(s).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(target: targets::CONFIG, path = %path.display(), "loaded probe configuration");
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        if self.find.max_children == 0 {
            return Err(Error::config("find.max_children must be at least 1"));
        }
        if self.browser.in_proc_attempts == 0 || self.browser.out_proc_attempts == 0 {
            return Err(Error::config("browser attempts must be at least 1"));
        }
        if self.document.url_schemes.iter().any(|s| s.is_empty()) {
            return Err(Error::config("document.url_schemes cannot contain empty strings"));
        }
        Ok(())
    }
}
