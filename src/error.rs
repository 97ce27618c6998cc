use std::process::ExitStatus;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad archive interval {input:?}: must be an ISO 8601 duration ({reason})")]
    InvalidInterval { input: String, reason: &'static str },

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("archive listing failed: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("building S3 client failed: {0}")]
    S3Config(object_store::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("SMIL XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid SMIL: {0}")]
    InvalidSmil(String),

    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}")]
    Tool { tool: String, status: ExitStatus },
}
