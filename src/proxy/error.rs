//! Error types for decoding and merging

use thiserror::Error;

/// Why a single link or structured entry could not become a record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("undecodable base64 payload")]
    InvalidBase64,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// A whole source could not be loaded
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source {id} has no content")]
    Missing { id: String },

    #[error("failed to read source {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("source {id} contains no proxies")]
    Empty { id: String },

    #[error("source id {id:?} cannot name a cache file")]
    InvalidId { id: String },
}

/// Failures of a full merge pass
#[derive(Error, Debug)]
pub enum MergeError {
    #[error("no proxies left after aggregating {sources} source(s)")]
    EmptyResult { sources: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DecodeError::InvalidPort("abc".to_string()).to_string(),
            "invalid port: abc"
        );
        assert_eq!(
            SourceError::Missing {
                id: "sub_1".to_string()
            }
            .to_string(),
            "source sub_1 has no content"
        );
        assert_eq!(
            MergeError::EmptyResult { sources: 2 }.to_string(),
            "no proxies left after aggregating 2 source(s)"
        );
    }
}
