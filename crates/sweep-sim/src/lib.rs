//! In-memory collaborators for sweep.
//!
//! [`Catalog`] serves container children from memory and
//! [`SimulatedProcessor`] runs bulk operations on a background task. Both
//! support failure injection and back the `sweep simulate` command and the
//! integration tests.

mod catalog;
mod processor;

pub use catalog::Catalog;
pub use processor::{DEFAULT_STEP, SimConfig, SimulatedProcessor};
