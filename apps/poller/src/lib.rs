pub mod config;
pub mod logging;
pub mod poller;
pub mod report;
pub mod sync;

pub use poller::{Poller, PollerError, PollerState};
pub use report::CycleReport;
pub use sync::{PriceSync, SyncError};
