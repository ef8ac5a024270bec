//! Services module for wallet-service.

pub mod clock;
pub mod database;
pub mod memory;
pub mod metrics;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_accrual, record_conflict, record_disbursement,
    record_error, record_reversal, record_wallet_amount,
};
pub use store::{EntryWrite, PaymentStore};
