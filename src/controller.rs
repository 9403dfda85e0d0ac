//! Poll loop orchestration and process lifecycle.
//!
//! - `monitor`: the per-cycle pipeline (fetch, classify, record, enforce)
//! - `controller_handler`: builds the components from the configuration and
//!   runs the monitor next to the web server until a signal arrives
//! - `backoff`, `claims`, `status`: loop bookkeeping

pub mod backoff;
pub mod claims;
pub mod controller_handler;
pub mod monitor;
pub mod status;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller_handler::Controller;
pub use monitor::{Monitor, MonitorSettings};
pub use status::{CycleReport, LoopState, MonitorStatus, SessionOutcome};
