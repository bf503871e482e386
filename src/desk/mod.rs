//! The approval desk: listing and deciding approvals from outside the
//! process that requested them.

pub mod client;
pub mod protocol;
pub mod server;
pub mod service;

pub use client::DeskClient;
pub use protocol::{DeskOp, DeskRequest, DeskResponse};
pub use server::DeskServer;
pub use service::{ApprovalDesk, DeskError, DeskStatistics, PendingSummary};
