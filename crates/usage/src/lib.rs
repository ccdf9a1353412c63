//! Usage request domain (event-sourced).
//!
//! A usage request proposes a single-item stock change. It starts pending
//! and is decided exactly once by an admin.

pub mod request;

pub use request::{
    ApproveUsage, RejectUsage, SubmitUsage, UsageApproved, UsageKind, UsageRejected, UsageRequest,
    UsageRequestCommand, UsageRequestEvent, UsageRequestId, UsageStatus, UsageSubmitted,
};
