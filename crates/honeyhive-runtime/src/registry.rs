use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, Weak};

use uuid::Uuid;

use honeyhive_engine::current_baggage;

use crate::lifecycle::TracerShared;

static REGISTRY: OnceLock<TracerRegistry> = OnceLock::new();

/// Live-tracer registry (C5).
///
/// Holds weak back-references only; a tracer dropped by the host vanishes
/// from lookups without registry bookkeeping. Read-heavy, so a plain
/// RwLock map.
pub struct TracerRegistry {
    tracers: RwLock<HashMap<Uuid, Weak<TracerShared>>>,
    default: RwLock<Option<Weak<TracerShared>>>,
}

impl TracerRegistry {
    fn new() -> Self {
        Self {
            tracers: RwLock::new(HashMap::new()),
            default: RwLock::new(None),
        }
    }

    /// Process-wide registry instance.
    pub fn global() -> &'static TracerRegistry {
        REGISTRY.get_or_init(TracerRegistry::new)
    }

    pub fn register(&self, tracer: &Arc<TracerShared>) {
        let mut tracers = self.tracers.write().unwrap_or_else(|e| e.into_inner());
        tracers.insert(tracer.id(), Arc::downgrade(tracer));
    }

    pub fn unregister(&self, id: Uuid) {
        let mut tracers = self.tracers.write().unwrap_or_else(|e| e.into_inner());
        tracers.remove(&id);

        let mut default = self.default.write().unwrap_or_else(|e| e.into_inner());
        let default_is_gone = default
            .as_ref()
            .is_some_and(|weak| weak.upgrade().is_none_or(|t| t.id() == id));
        if default_is_gone {
            *default = None;
        }
    }

    pub fn lookup(&self, id: Uuid) -> Option<Arc<TracerShared>> {
        let tracers = self.tracers.read().unwrap_or_else(|e| e.into_inner());
        tracers.get(&id).and_then(Weak::upgrade)
    }

    pub fn set_default(&self, tracer: &Arc<TracerShared>) {
        let mut default = self.default.write().unwrap_or_else(|e| e.into_inner());
        *default = Some(Arc::downgrade(tracer));
    }

    pub fn get_default(&self) -> Option<Arc<TracerShared>> {
        let default = self.default.read().unwrap_or_else(|e| e.into_inner());
        default.as_ref().and_then(Weak::upgrade)
    }

    /// Resolve the tracer referenced by `honeyhive.tracer_id` in the
    /// current baggage scope.
    pub fn from_context(&self) -> Option<Arc<TracerShared>> {
        let baggage = current_baggage();
        let id = baggage.tracer_id()?;
        let id = Uuid::parse_str(id).ok()?;
        self.lookup(id)
    }

    /// Decorator auto-discovery order: explicit > context > default > none.
    pub fn discover(&self, explicit: Option<Arc<TracerShared>>) -> Option<Arc<TracerShared>> {
        explicit
            .or_else(|| self.from_context())
            .or_else(|| self.get_default())
    }

    pub fn live_count(&self) -> usize {
        let tracers = self.tracers.read().unwrap_or_else(|e| e.into_inner());
        tracers.values().filter(|w| w.upgrade().is_some()).count()
    }
}
