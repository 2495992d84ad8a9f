/// Indicates a byte offset within a resource.
pub const UPLOAD_OFFSET: &str = "Upload-Offset";

/// Indicates the size of the entire upload in bytes.
pub const UPLOAD_LENGTH: &str = "Upload-Length";

/// Set to `1` to create an upload whose size is announced later.
pub const UPLOAD_DEFER_LENGTH: &str = "Upload-Defer-Length";

/// Base64-encoded key/value pairs attached to an upload.
pub const UPLOAD_METADATA: &str = "Upload-Metadata";

/// Marks an upload as `partial`, or lists the partials of a `final` one.
pub const UPLOAD_CONCAT: &str = "Upload-Concat";

/// RFC 1123 time after which the server may discard the upload.
pub const UPLOAD_EXPIRES: &str = "Upload-Expires";

/// `<algorithm> <base64 digest>` of a request body or chunk.
pub const UPLOAD_CHECKSUM: &str = "Upload-Checksum";

/// The version of the protocol used by the client or the server.
pub const TUS_RESUMABLE: &str = "Tus-Resumable";

/// A comma-separated list of protocol versions supported by the server.
pub const TUS_VERSION: &str = "Tus-Version";

/// A comma-separated list of the extensions supported by the server.
pub const TUS_EXTENSION: &str = "Tus-Extension";

/// Integer indicating the maximum allowed size of an entire upload in bytes.
pub const TUS_MAX_SIZE: &str = "Tus-Max-Size";

/// A comma-separated list of checksum algorithms supported by the server.
pub const TUS_CHECKSUM_ALGORITHM: &str = "Tus-Checksum-Algorithm";

pub const CONTENT_TYPE: &str = "Content-Type";

pub const CONTENT_LENGTH: &str = "Content-Length";

/// URL of an upload created by the server.
pub const LOCATION: &str = "Location";

/// Content type carried by every request that writes upload data.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";
