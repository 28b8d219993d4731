//! Logging and debugging facilities for Horizon Probe.
//!
//! This module provides:
//! - Target and span names for filtering `tracing` output by subsystem
//! - Debug visualization of accessible subtrees
//! - A guard for timing operations
//!
//! # Tracing Integration
//!
//! Horizon Probe only emits events; install a subscriber to see them:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("horizon_probe::find=trace,horizon_probe::bridge=debug")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! Use [`AoTreeDebug`] to print what a search will walk through:
//!
//! ```ignore
//! use horizon_probe_core::logging::{AoTreeDebug, TreeFormatOptions};
//!
//! let debug = AoTreeDebug::with_options(TreeFormatOptions::detailed());
//! println!("{}", debug.format_subtree(&root)?);
//! ```

use std::fmt::Write as FmtWrite;

use crate::ao::Ao;
use crate::error::Result;
use crate::node::Child;

/// Span names used throughout Horizon Probe for tracing.
pub mod span_names {
    /// One find traversal.
    pub const FIND: &str = "horizon_probe::find";
    /// One call through the in-process bridge.
    pub const BRIDGE_CALL: &str = "horizon_probe::bridge_call";
    /// The browser accessibility enabling loop.
    pub const BROWSER_ENABLE: &str = "horizon_probe::browser_enable";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Find/match engine.
    pub const FIND: &str = "horizon_probe::find";
    /// Parameter blocks and the result stream.
    pub const MARSHAL: &str = "horizon_probe::marshal";
    /// In-process call bridge and broker server.
    pub const BRIDGE: &str = "horizon_probe::bridge";
    /// Modern backend unification shim.
    pub const SHIM: &str = "horizon_probe::shim";
    /// Point, focus, window and navigation resolvers.
    pub const RESOLVE: &str = "horizon_probe::resolve";
    /// Browser document discovery and DOM access.
    pub const BROWSER: &str = "horizon_probe::browser";
    /// DPI coordinate adapter.
    pub const DPI: &str = "horizon_probe::dpi";
    /// Configuration loading.
    pub const CONFIG: &str = "horizon_probe::config";
}

/// Style options for tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for [`AoTreeDebug`] output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    pub style: TreeStyle,
    /// Show the object name after the role.
    pub show_names: bool,
    pub show_states: bool,
    pub show_rects: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_names: true,
            show_states: false,
            show_rects: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_states: true,
            show_rects: true,
            ..Default::default()
        }
    }

    /// Roles only.
    pub fn minimal() -> Self {
        Self {
            show_names: false,
            ..Default::default()
        }
    }
}

/// Renders an accessible subtree as text.
///
/// Properties that fail to read are shown as `?`; they do not abort the dump.
#[derive(Debug, Clone, Default)]
pub struct AoTreeDebug {
    options: TreeFormatOptions,
}

impl AoTreeDebug {
    /// Create a visualizer with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a visualizer with custom options.
    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, root: &Ao) -> Result<String> {
        let mut output = String::new();
        self.format_into(root, 0, true, &mut output)?;
        Ok(output)
    }

    fn format_into(&self, ao: &Ao, depth: usize, is_last: bool, output: &mut String) -> Result<()> {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        output.push_str(&self.build_prefix(depth, is_last));
        match ao.role() {
            Ok(role) => output.push_str(&role.to_role_string()),
            Err(_) => output.push('?'),
        }
        if ao.elem() != 0 {
            let _ = write!(output, " #{}", ao.elem());
        }
        if self.options.show_names {
            match ao.name() {
                Ok(Some(name)) => {
                    let _ = write!(output, " \"{name}\"");
                }
                Ok(None) => {}
                Err(_) => output.push_str(" ?"),
            }
        }
        if self.options.show_states {
            if let Ok(state) = ao.state() {
                let _ = write!(output, " {state:?}");
            }
        }
        if self.options.show_rects {
            if let Ok(r) = ao.location() {
                let _ = write!(
                    output,
                    " {{L={} T={} W={} H={}}}",
                    r.left,
                    r.top,
                    r.width(),
                    r.height()
                );
            }
        }
        output.push('\n');

        if ao.elem() != 0 {
            return Ok(());
        }
        // a node that cannot list its children is shown as a leaf
        let children: Vec<Child> = ao.node().children().unwrap_or_default();
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let child = Ao::child_of(ao, child);
            self.format_into(&child, depth + 1, i == count - 1, output)?;
        }
        Ok(())
    }

    /// Build the prefix string for a tree node.
    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, corner, last) = match self.options.style {
            TreeStyle::Ascii => ("|", "+--", "`--"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500}", "\u{2514}\u{2500}\u{2500}"),
            TreeStyle::Compact => ("", "-", "-"),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            for _ in 0..self.options.indent_size {
                prefix.push(' ');
            }
        }
        prefix.push_str(if is_last { last } else { corner });
        prefix.push(' ');
        prefix
    }
}
