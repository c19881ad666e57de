//! Approval gates between phases.

mod broker;
mod policy;

pub use broker::{DecisionId, DecisionTicket, GateBroker, GateOutcome, GateStatus, PendingGate};
pub use policy::{ApproveAll, AutoGatePolicy};
