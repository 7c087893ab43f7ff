//! Turn orchestration: routing, history assembly, streamed completion and
//! the engine that ties them together.

pub mod completion;
pub mod engine;
pub mod events;
pub mod history;
pub mod router;
pub mod stream;

pub use completion::{CompletionDriver, CompletionOutcome, CompletionStatus, TurnIo};
pub use engine::{ChatEngine, TurnOutcome, TurnRequest, TurnStatus};
pub use events::{ChatEvent, ProgressSink};
pub use history::build_messages;
pub use router::{Route, route};
pub use stream::{Accumulated, DeltaAccumulator};
