//! Collaborators shared by every operation.

use std::sync::Arc;

use horizon_probe_core::{Ao, MiscFlags, ProbeConfig};

use crate::platform::{BackendResolver, WindowSystem};
use crate::shim::{ElementRef, UiaAccessible};

/// Window system, backends and configuration, as seen from one process.
///
/// The caller side and the broker side each hold their own context; the
/// broker's is the one of the target process.
#[derive(Clone)]
pub struct Context {
    pub windows: Arc<dyn WindowSystem>,
    pub backends: Arc<dyn BackendResolver>,
    pub config: Arc<ProbeConfig>,
}

impl Context {
    pub fn new(
        windows: Arc<dyn WindowSystem>,
        backends: Arc<dyn BackendResolver>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            windows,
            backends,
            config: Arc::new(config),
        }
    }

    /// Wrap a modern element for the legacy-shaped engine.
    pub fn modern_ao(&self, element: ElementRef) -> Ao {
        let node = UiaAccessible::node(element, self.config.shim.child_cache_ttl());
        Ao::with_flags(node, 0, MiscFlags::UIA)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
