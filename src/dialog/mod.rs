//! Dialog engine: one shared stepping core over three fixed flows.

pub mod buffer;
pub mod engine;
pub mod flow;
pub mod session;
pub mod validate;

/// Attachment cap for the quick-question optional step.
pub const MAX_QUICK_ATTACHMENTS: usize = 2;
/// Character cap for the quick-question brief.
pub const MAX_BRIEF_CHARS: usize = 500;
/// Upload cap for the document-review repeated step.
pub const MAX_REVIEW_UPLOADS: usize = 10;

pub use buffer::{DialogBuffer, DialogInput};
pub use engine::{DialogEngine, EngineEvent};
pub use flow::{Choice, FlowKind, Step, StepId};
pub use session::{DialogSession, SessionRegistry, SessionState};
