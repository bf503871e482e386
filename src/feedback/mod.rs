pub mod collector;
pub mod store;
pub mod types;

pub use collector::FeedbackCollector;
pub use store::FeedbackStore;
pub use types::{Feedback, FeedbackDraft, FeedbackStatistics};
