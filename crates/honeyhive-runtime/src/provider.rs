use std::sync::{Mutex, OnceLock, Weak};

use tracing::debug;
use uuid::Uuid;

use crate::lifecycle::TracerShared;

/// Outcome of the atomic provider decision (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderRole {
    /// This instance became the process's tracing provider.
    Main,
    /// A functioning provider already exists; this instance attached
    /// alongside it.
    Independent,
}

/// The process-wide "main provider" slot.
///
/// Claimed at most once while its holder is alive; a functioning provider
/// is never replaced by a later tracer. A dead slot (holder dropped) may be
/// re-claimed.
pub struct ProviderSlot {
    slot: Mutex<Option<(Uuid, Weak<TracerShared>)>>,
}

static GLOBAL_SLOT: OnceLock<ProviderSlot> = OnceLock::new();

impl ProviderSlot {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    pub fn global() -> &'static ProviderSlot {
        GLOBAL_SLOT.get_or_init(ProviderSlot::new)
    }

    /// Decide a tracer's role under the slot lock.
    pub fn decide(&self, id: Uuid, tracer: Weak<TracerShared>) -> ProviderRole {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let holder_alive = slot
            .as_ref()
            .is_some_and(|(_, weak)| weak.upgrade().is_some());

        let role = if holder_alive {
            ProviderRole::Independent
        } else {
            *slot = Some((id, tracer));
            ProviderRole::Main
        };
        debug!(tracer = %id, ?role, "provider decision");
        role
    }

    /// Id of the current main provider, if its holder is still alive.
    pub fn main_provider_id(&self) -> Option<Uuid> {
        let slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        slot.as_ref()
            .filter(|(_, weak)| weak.upgrade().is_some())
            .map(|(id, _)| *id)
    }
}

impl Default for ProviderSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Decide against the process-global slot.
pub fn decide(id: Uuid, tracer: Weak<TracerShared>) -> ProviderRole {
    ProviderSlot::global().decide(id, tracer)
}
