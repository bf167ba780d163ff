//! Scoped tracer context (C4).
//!
//! Baggage rides a thread-local scope stack with RAII release; async code
//! wraps futures in [`WithBaggage`], which re-enters the scope around every
//! poll so the ambient context survives executor migration across threads.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;

use honeyhive_types::keys;

thread_local! {
    static STACK: RefCell<Vec<Baggage>> = const { RefCell::new(Vec::new()) };
}

/// Tracer-scoped context entries propagated onto every span started within
/// the scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Baggage {
    entries: BTreeMap<String, String>,
}

impl Baggage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.get(keys::SESSION_ID)
    }

    pub fn project(&self) -> Option<&str> {
        self.get(keys::PROJECT)
    }

    pub fn source(&self) -> Option<&str> {
        self.get(keys::SOURCE)
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.get(keys::PARENT_ID)
    }

    pub fn tracer_id(&self) -> Option<&str> {
        self.get(keys::TRACER_ID)
    }

    /// `honeyhive.experiment.*` entries as (suffix, value) pairs.
    pub fn experiment_entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(k, v)| {
            k.strip_prefix(keys::EXPERIMENT_PREFIX)
                .map(|suffix| (suffix, v.as_str()))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay `other` on top of this baggage.
    pub fn merged_with(&self, other: &Baggage) -> Baggage {
        let mut merged = self.clone();
        for (k, v) in &other.entries {
            merged.entries.insert(k.clone(), v.clone());
        }
        merged
    }
}

/// Snapshot of the innermost active scope (empty baggage when none).
pub fn current_baggage() -> Baggage {
    STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
}

/// Enter a baggage scope; released when the guard drops, on every exit path.
#[must_use = "the scope ends when the guard is dropped"]
pub fn enter(baggage: Baggage) -> BaggageGuard {
    STACK.with(|stack| stack.borrow_mut().push(baggage));
    BaggageGuard { _private: () }
}

pub struct BaggageGuard {
    _private: (),
}

impl Drop for BaggageGuard {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

pin_project! {
    /// Future wrapper that re-enters a baggage scope around each poll.
    pub struct WithBaggage<F> {
        #[pin]
        future: F,
        baggage: Baggage,
    }
}

impl<F> WithBaggage<F> {
    pub fn new(future: F, baggage: Baggage) -> Self {
        Self { future, baggage }
    }
}

impl<F: Future> Future for WithBaggage<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = enter(this.baggage.clone());
        this.future.poll(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_push_pop() {
        assert!(current_baggage().is_empty());

        let mut baggage = Baggage::new();
        baggage.set(keys::PROJECT, "demo");
        {
            let _guard = enter(baggage);
            assert_eq!(current_baggage().project(), Some("demo"));

            let mut nested = current_baggage();
            nested.set(keys::PARENT_ID, "abc");
            {
                let _inner = enter(nested);
                assert_eq!(current_baggage().parent_id(), Some("abc"));
                assert_eq!(current_baggage().project(), Some("demo"));
            }
            assert_eq!(current_baggage().parent_id(), None);
        }
        assert!(current_baggage().is_empty());
    }

    #[test]
    fn test_experiment_entries() {
        let mut baggage = Baggage::new();
        baggage.set("honeyhive.experiment.id", "exp-1");
        baggage.set("honeyhive.experiment.variant", "b");
        baggage.set(keys::PROJECT, "demo");

        let entries: Vec<_> = baggage.experiment_entries().collect();
        assert_eq!(entries, vec![("id", "exp-1"), ("variant", "b")]);
    }

    #[test]
    fn test_guard_releases_on_panic_path() {
        let result = std::panic::catch_unwind(|| {
            let mut baggage = Baggage::new();
            baggage.set(keys::PROJECT, "demo");
            let _guard = enter(baggage);
            panic!("boom");
        });
        assert!(result.is_err());
        assert!(current_baggage().is_empty());
    }
}
