//! Reconciles the kernel's multipath topology against the
//! inventory of targets still in use, and removes faulty orphaned paths and
//! the empty multipath devices they leave behind.
//!
//! The pass is single threaded and synchronous. The mutating part runs under
//! [`lock::ExternalLock`], shared with the component that attaches and
//! detaches volumes.

pub mod cleaner;
pub mod error;
pub mod lock;
pub mod multipath;
pub mod preflight;
pub mod reconcile;
pub mod remover;
pub mod report;
pub mod scanner;
pub mod sweeper;
pub mod topology;

pub use cleaner::{Cleaner, CleanupOptions, Mode, Phase};
pub use error::{SweepError, SweepResult};
pub use multipath::{Multipath, MultipathCli, ToolOutput};
pub use report::{RunSummary, format_report};
pub use topology::TopologyParser;
