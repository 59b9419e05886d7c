use rtcsg_db::{StoreError, WalkError};
use thiserror::Error;

/// Errors raised while configuring or preparing a scene.
#[derive(Error, Debug)]
pub enum RtError {
    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A combination tree could not be walked.
    #[error(transparent)]
    Walk(#[from] WalkError),
}
