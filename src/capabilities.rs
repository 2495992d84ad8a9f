use crate::checksum;
use crate::error::{Error, Result};
use crate::headers::{TUS_CHECKSUM_ALGORITHM, TUS_EXTENSION, TUS_MAX_SIZE, TUS_VERSION};
use crate::http::{HeaderMap, Headers};

/// Features and limits of a tus server, as exposed by its OPTIONS
/// endpoint. Fetched with `Client::update_capabilities` and cached on the
/// client until the next refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerCapabilities {
    /// Protocol extensions the server supports: `creation`,
    /// `creation-defer-length`, `creation-with-upload`, `termination`,
    /// `concatenation`, `concatenation-unfinished`, `checksum`,
    /// `checksum-trailer`, `expiration`, ...
    pub extensions: Vec<String>,

    /// Largest upload the server accepts. 0 means no limit is set.
    pub max_size: i64,

    /// Protocol versions the server supports, in order of preference.
    pub protocol_versions: Vec<String>,

    /// Checksum algorithms the server accepts, filtered down to the ones
    /// this crate's registry can produce, in canonical spelling.
    pub checksum_algorithms: Vec<String>,
}

impl ServerCapabilities {
    pub fn supports_extension(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    pub(crate) fn from_headers(resp: &Headers) -> Result<Self> {
        let mut caps = ServerCapabilities::default();
        if let Some(v) = resp.get_by_key(TUS_MAX_SIZE) {
            caps.max_size = v.trim().parse().map_err(|_| {
                Error::Protocol(format!("cannot parse Tus-Max-Size integer value {:?}", v))
            })?;
        }
        if let Some(v) = resp.get_by_key(TUS_EXTENSION) {
            caps.extensions = split_list(v);
        }
        if let Some(v) = resp.get_by_key(TUS_VERSION) {
            caps.protocol_versions = split_list(v);
        }
        if let Some(v) = resp.get_by_key(TUS_CHECKSUM_ALGORITHM) {
            caps.checksum_algorithms = split_list(v)
                .iter()
                .filter_map(|name| checksum::find(name))
                .map(str::to_owned)
                .collect();
        }
        Ok(caps)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_options_headers() {
        let mut resp = Headers::new();
        resp.insert("Tus-Version".to_owned(), "1.0.0,0.2.2".to_owned());
        resp.insert("Tus-Max-Size".to_owned(), "1073741824".to_owned());
        resp.insert(
            "Tus-Extension".to_owned(),
            "creation, termination,checksum".to_owned(),
        );
        resp.insert(
            "Tus-Checksum-Algorithm".to_owned(),
            "SHA-1,md5,whirlpool".to_owned(),
        );

        let caps = ServerCapabilities::from_headers(&resp).unwrap();
        assert_eq!(caps.protocol_versions, ["1.0.0", "0.2.2"]);
        assert_eq!(caps.max_size, 1_073_741_824);
        assert_eq!(caps.extensions, ["creation", "termination", "checksum"]);
        assert!(caps.supports_extension("checksum"));
        assert!(!caps.supports_extension("concatenation"));
        // Unknown algorithms are dropped, known ones canonicalized.
        assert_eq!(caps.checksum_algorithms, ["sha1", "md5"]);
    }

    #[test]
    fn rejects_bad_max_size() {
        let mut resp = Headers::new();
        resp.insert("Tus-Max-Size".to_owned(), "a lot".to_owned());
        assert!(matches!(
            ServerCapabilities::from_headers(&resp),
            Err(Error::Protocol(_))
        ));
    }
}
