//! Canonical-event invariant checks shared across integration tests.

use honeyhive_types::CanonicalEvent;
use uuid::{Uuid, Version};

/// Assert the universal event invariants: v4 identity, distinct
/// event/session ids, consistent timing.
pub fn assert_event_invariants(event: &CanonicalEvent) {
    assert_v4(event.event_id, "event_id");
    assert_v4(event.session_id, "session_id");
    assert_ne!(
        event.event_id, event.session_id,
        "event_id must differ from session_id"
    );
    if let Some(parent) = event.parent_id {
        assert_v4(parent, "parent_id");
    }
    for child in &event.children_ids {
        assert_v4(*child, "children_ids entry");
    }

    assert!(
        event.duration >= 0,
        "duration must be non-negative, got {}",
        event.duration
    );
    assert_eq!(
        event.duration,
        event.end_time - event.start_time,
        "duration must equal end_time - start_time"
    );
}

fn assert_v4(id: Uuid, label: &str) {
    assert_eq!(
        id.get_version(),
        Some(Version::Random),
        "{} must be UUIDv4, got {}",
        label,
        id
    );
}
