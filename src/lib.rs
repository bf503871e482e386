//! regent: agentic regression testing with human-in-the-loop approvals.
//!
//! The library holds the approval workflow, the planning pipeline, test
//! execution and feedback. The binary entrypoint is in `main.rs`.

pub mod adapter;
pub mod approval;
pub mod cli;
pub mod config;
pub mod desk;
pub mod error;
pub mod executor;
pub mod feedback;
pub mod pipeline;
pub mod store;
pub mod utils;
