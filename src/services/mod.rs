pub mod usage;
pub mod usage_reporter;

pub use usage::{UsageCounters, UsageRecorder, UsageSnapshot};
pub use usage_reporter::UsageReporter;
