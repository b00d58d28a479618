use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Unknown object kind {0:?}")]
    UnknownKind(String),

    #[error("Unknown broker role suffix {0:?}; expected one of p, b or m")]
    UnknownRole(String),

    #[error("EventBroker is missing {0}; cannot derive owned objects")]
    MissingObjectKey(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::SerializationError(_) => "SerializationError",
            Error::KubeError(_) => "KubeError",
            Error::UnknownKind(_) => "UnknownKind",
            Error::UnknownRole(_) => "UnknownRole",
            Error::MissingObjectKey(_) => "MissingObjectKey",
        }
    }
}

pub mod controllers;

/// Log and trace integrations
pub mod telemetry;

/// Metrics
mod metrics;

pub use metrics::Metrics;

/// Custom resources owned by this operator
pub mod resources;
