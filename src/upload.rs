use std::collections::HashMap;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Passed as the size of an upload whose length will be announced later,
/// during the first data transfer. Requires the `creation-defer-length`
/// server extension, and `UploadStream::set_upload_size` on the stream
/// that performs the first transfer.
pub const SIZE_UNKNOWN: i64 = -1;

/// Value of `Upload::remote_offset` while a final concatenated upload is
/// still being assembled on the server. Once the server finishes,
/// `Client::get_upload` reports a concrete offset again.
pub const OFFSET_UNKNOWN: i64 = -1;

/// An upload on the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Upload {
    /// Upload location: an absolute URL or a path relative to the
    /// client's base URL.
    pub location: String,

    /// Remote upload size in bytes. [`SIZE_UNKNOWN`] means the upload was
    /// created with a deferred length that has not been announced yet.
    pub remote_size: i64,

    /// Offset of the remote upload. Continuously updated by
    /// `UploadStream` while transferring data.
    pub remote_offset: i64,

    /// Additional data assigned to the upload when it was created.
    pub metadata: HashMap<String, String>,

    /// When the server will drop the upload. `None` means it does not
    /// expire.
    pub upload_expired: Option<DateTime<Utc>>,

    /// Marks a "partial" upload, meant to be concatenated into a "final"
    /// upload later.
    pub partial: bool,
}

impl Upload {
    /// Handle for an upload that already exists on the server.
    pub fn new(location: impl Into<String>, remote_size: i64) -> Self {
        Upload {
            location: location.into(),
            remote_size,
            ..Upload::default()
        }
    }
}

/// Converts a metadata map to the `Upload-Metadata` header format. Keys
/// must not contain spaces. Pairs are emitted in key order so the same
/// map always produces the same header value.
pub fn encode_metadata(metadata: &HashMap<String, String>) -> Result<String> {
    let mut pairs: Vec<_> = metadata.iter().collect();
    pairs.sort_by_key(|(k, _)| k.as_str());

    let mut encoded = Vec::with_capacity(pairs.len());
    for (key, value) in pairs {
        if key.contains(' ') {
            return Err(Error::Metadata(format!("key {:?} contains spaces", key)));
        }
        encoded.push(format!("{} {}", key, BASE64_STANDARD.encode(value.as_bytes())));
    }
    Ok(encoded.join(","))
}

/// Parses an `Upload-Expires` header. The wire format is RFC 1123, which
/// the RFC 2822 parser accepts, obsolete `GMT` zone included.
pub(crate) fn parse_expires(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            Error::Protocol(format!(
                "cannot parse Upload-Expires RFC 1123 header {:?}",
                value
            ))
        })
}

/// Decodes an `Upload-Metadata` header value.
pub fn decode_metadata(raw: &str) -> Result<HashMap<String, String>> {
    let mut res = HashMap::new();
    for item in raw.split(',') {
        let (key, value) = item
            .split_once(' ')
            .ok_or_else(|| Error::Metadata(format!("item {:?} has bad format", item)))?;
        let value = BASE64_STANDARD
            .decode(value)
            .map_err(|e| Error::Metadata(format!("item {:?}: {}", item, e)))?;
        let value = String::from_utf8(value)
            .map_err(|e| Error::Metadata(format!("item {:?}: {}", item, e)))?;
        res.insert(key.to_owned(), value);
    }
    Ok(res)
}
