use std::sync::Mutex;

use honeyhive_engine::{ProcessedSpan, SinkError, SpanSink};
use honeyhive_types::CanonicalEvent;

/// Sink that captures processed spans in memory instead of exporting.
#[derive(Default)]
pub struct CaptureSink {
    spans: Mutex<Vec<ProcessedSpan>>,
    refuse: Mutex<Option<SinkError>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent submits fail with `error` (queue-full simulation).
    pub fn refuse_with(&self, error: SinkError) {
        *self.refuse.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    pub fn accept_again(&self) {
        *self.refuse.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn events(&self) -> Vec<CanonicalEvent> {
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| p.event.clone())
            .collect()
    }

    pub fn spans(&self) -> Vec<ProcessedSpan> {
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.spans.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.spans.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl SpanSink for CaptureSink {
    fn submit(&self, span: ProcessedSpan) -> Result<(), SinkError> {
        if let Some(error) = self
            .refuse
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(error);
        }
        self.spans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(span);
        Ok(())
    }
}
