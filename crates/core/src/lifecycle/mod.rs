pub mod commands;
pub mod engine;

pub use commands::{DisputeGrounds, EstimateDecision, EstimateDraft, ValidationNotes};
pub use engine::{
    EstimateChange, LifecycleEngine, TransitionOutcome, MIN_REJECTION_REASON_CHARS,
};
