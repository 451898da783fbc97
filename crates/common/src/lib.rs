//! Shared identifier and value types for the bulk-transfer saga engine.

mod types;

pub use types::{BatchId, BulkTransactionId, Currency, FspId, Money, TransferId};
