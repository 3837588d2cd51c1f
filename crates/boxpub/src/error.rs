use std::error::Error as StdError;
use std::path::PathBuf;

use boxpub_registry::RegistryError;

use crate::types::{PublishState, PublishStep};

/// Coarse classification of a [`PublishError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad local setup: credential, request, client construction.
    Configuration,
    /// Registry answered with a status outside the policy.
    Http,
    /// Registry answered with a body we could not use.
    DataShape,
    /// The artifact could not be uploaded.
    Upload,
    /// The request never got a response.
    Transport,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("credential file not found: {}", path.display())]
    MissingCredential { path: PathBuf },

    #[error("credential file is empty: {}", path.display())]
    EmptyCredential { path: PathBuf },

    #[error("failed to read credential file {}", path.display())]
    CredentialRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to locate the executable to resolve the credential file")]
    CredentialLocation(#[source] std::io::Error),

    #[error("invalid publish request: {0}")]
    InvalidRequest(String),

    #[error("failed to initialise registry client")]
    Client(#[source] RegistryError),

    #[error("registry rejected the credential")]
    Authentication(#[source] RegistryError),

    #[error("{step} failed (last completed state: {reached})")]
    Step {
        step: PublishStep,
        reached: PublishState,
        #[source]
        source: RegistryError,
    },
}

impl PublishError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PublishError::MissingCredential { .. }
            | PublishError::EmptyCredential { .. }
            | PublishError::CredentialRead { .. }
            | PublishError::CredentialLocation(_)
            | PublishError::InvalidRequest(_)
            | PublishError::Client(_) => ErrorKind::Configuration,
            PublishError::Authentication(source) => classify_registry(source),
            PublishError::Step { step, source, .. } => {
                if *step == PublishStep::UploadArtifact {
                    ErrorKind::Upload
                } else {
                    classify_registry(source)
                }
            }
        }
    }

    /// The step that failed, for step errors.
    pub fn step(&self) -> Option<PublishStep> {
        match self {
            PublishError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }
}

fn classify_registry(err: &RegistryError) -> ErrorKind {
    match err {
        RegistryError::Status { .. } => ErrorKind::Http,
        RegistryError::DataShape { .. } => ErrorKind::DataShape,
        RegistryError::Artifact { .. } => ErrorKind::Upload,
        RegistryError::Client(_) => ErrorKind::Configuration,
        RegistryError::ApiBase { .. } => ErrorKind::Configuration,
        RegistryError::Transport { .. } => ErrorKind::Transport,
    }
}

/// Render an error and its sources on one line, `outer: inner: root`.
pub fn display_chain(err: &(dyn StdError + 'static)) -> String {
    std::iter::successors(Some(err), |&e| e.source())
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(": ")
}
