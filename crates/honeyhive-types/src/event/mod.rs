mod event;
mod message;
mod sections;

pub use event::CanonicalEvent;
pub use message::{FinishReason, FunctionCall, Message, Role, ToolCall};
pub use sections::{
    CanonicalSections, EventConfig, EventInputs, EventMetadata, EventOutputs, ScopeInfo,
};
