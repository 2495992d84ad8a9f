use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Enumerates the errors which can occur during operation.
///
/// After a transport error, [`Error::OffsetsNotSynced`] or
/// [`Error::ChecksumMismatch`] the stream keeps its dirty buffer, so the
/// failed chunk can be retried without re-reading the source. All other
/// errors leave the decision to reset with the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or contradictory server response, protocol version
    /// mismatch, or a server offset that did not advance.
    #[error("tus protocol error: {0}")]
    Protocol(String),

    /// The server did not advertise an extension required for the
    /// requested operation.
    #[error("server extension {0:?} is required")]
    UnsupportedFeature(String),

    /// The upload was not found on the server, or access was denied.
    #[error("upload does not exist")]
    UploadDoesNotExist,

    /// The upload exceeds what the server is willing to accept.
    #[error("upload is too large")]
    UploadTooLarge,

    /// The upload does not accept data: it is full, concatenated, or
    /// otherwise immutable.
    #[error("cannot upload")]
    CannotUpload,

    /// Local and server offsets disagree. Call `UploadStream::sync` and
    /// retry.
    #[error("local and server offsets are not synced")]
    OffsetsNotSynced,

    /// The server rejected a chunk or body whose checksum did not match.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// The status code returned by the server was not one of the
    /// expected ones.
    #[error("unexpected response status {status}")]
    UnexpectedResponse { status: u16 },

    /// Fewer bytes were accepted than were offered to `write`, with no
    /// other error to explain it.
    #[error("short write: only {written} bytes uploaded")]
    ShortWrite { written: usize },

    /// Only partial uploads can be concatenated.
    #[error("upload {0:?} is not partial")]
    NotPartial(String),

    /// The checksum algorithm is not in the registry.
    #[error("unknown checksum algorithm {0:?}")]
    UnknownAlgorithm(String),

    /// Metadata could not be encoded or decoded.
    #[error("invalid metadata: {0}")]
    Metadata(String),

    /// Reading the caller's data source failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An upload location could not be resolved against the base URL.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// The transport failed to carry the request, including cancellation.
    #[error("transport error: {0}")]
    Transport(String),
}
