//! Ports consumed by the presence registry

mod ledger;
mod session_id;

pub use ledger::MinuteLedger;
pub use session_id::SessionIdGenerator;
