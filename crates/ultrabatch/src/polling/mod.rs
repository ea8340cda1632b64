//! Status polling for launched jobs.

pub mod poller;
pub mod registry;

pub use poller::{Poller, StatusHandler};
pub use registry::{PollerRegistry, PollingState};
