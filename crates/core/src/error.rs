use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::model::{RatingError, TemplateError};
use crate::progress::{LifecycleError, TrackerError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Rating(#[from] RatingError),
}
