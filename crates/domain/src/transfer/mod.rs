//! Single outbound transfer lifecycle.
//!
//! The simpler, per-request counterpart to the bulk aggregate: one transfer
//! driven through party resolution, quote agreement, and execution by the
//! generic cache-backed state machine. Kept as a complementary mechanism to
//! the bulk aggregate, not subsumed by it.

mod machine;

pub use machine::{OutboundTransferData, OutboundTransferMachine};
