//! Error log, pipeline events and the error reporter.

pub mod events;
pub mod log;
pub mod reporter;

pub use events::PipelineEvent;
pub use log::{ErrorLog, ErrorRecord};
pub use reporter::ErrorReporter;
