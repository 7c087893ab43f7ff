//! Core data model: conversation state, grounding candidates, retrieved
//! documents, and the relevance grade.

pub mod document;
pub mod grade;
pub mod state;

pub use document::{DistanceMetric, IndexKind, RetrievalCandidate, RetrievedDocument};
pub use grade::Grade;
pub use state::{ConversationState, VsMetadata};
