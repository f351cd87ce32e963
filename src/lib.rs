pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod item_bank;
pub mod logging;
pub mod persistence;
pub mod router;
pub mod selector;
pub mod types;
pub mod weakness;

pub use config::EngineConfig;
pub use engine::{AdaptiveEngine, NextQuestion, SessionHandle, SessionOptions, SubmitOutcome};
pub use error::EngineError;
pub use types::{
    AdaptiveResponse, AttemptRecord, DifficultyLabel, DifficultyPath, ModuleResult, Question,
    SelectionReason, SessionPhase, SkillProficiency, StopDecision, StopReason, Subject,
    WeaknessPattern,
};
