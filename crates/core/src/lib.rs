#![forbid(unsafe_code)]

pub mod analysis;
pub mod error;
pub mod model;
pub mod progress;
pub mod time;

pub use error::Error;
pub use progress::{InterviewState, LifecycleError, PlannedQuestion, ProgressTracker, TrackerError};
pub use time::Clock;
