pub mod context;
pub mod core;
pub mod metrics;
pub mod pacemaker;

pub use context::DriverContext;
pub use core::TaskDriver;
pub use metrics::DriverMetrics;
pub use pacemaker::TaskPacemaker;
