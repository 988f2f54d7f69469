pub mod builder;
pub mod client;
pub mod options;

pub use builder::SchedulerBuilder;
pub use client::Scheduler;
pub use options::SubmitOptions;
