//! Test planning pipeline: a staged run with an optional human checkpoint.

pub mod checkpoint;
pub mod extract;
pub mod generator;
pub mod planner;
pub mod retriever;
pub mod sanitize;
pub mod state;

pub use checkpoint::{Checkpoint, CheckpointLogger, CheckpointReader, RunSummary};
pub use generator::{FilePlanGenerator, GeneratedPlan, PlanGenerator, PlanRequest, StaticPlanGenerator};
pub use planner::{PlanReport, PlanningPipeline};
pub use retriever::{InMemoryRetriever, KnowledgeRetriever, RetrievedDocument};
pub use sanitize::InputSanitizer;
pub use state::{PlanningState, RunStatus, Stage};
