use std::cell::RefCell;
use std::collections::HashMap;

use tracing::debug;
use url::Url;

use crate::capabilities::ServerCapabilities;
use crate::error::{Error, Result};
use crate::headers::{
    CONTENT_LENGTH, LOCATION, TUS_RESUMABLE, TUS_VERSION, UPLOAD_CONCAT, UPLOAD_DEFER_LENGTH,
    UPLOAD_EXPIRES, UPLOAD_LENGTH, UPLOAD_METADATA, UPLOAD_OFFSET,
};
use crate::http::{
    CancelToken, HeaderMap, HttpHandler, HttpMethod, HttpRequest, HttpResponse,
};
use crate::stream::UploadStream;
use crate::upload::{
    decode_metadata, encode_metadata, parse_expires, Upload, OFFSET_UNKNOWN, SIZE_UNKNOWN,
};

/// Protocol version sent in `Tus-Resumable` unless overridden.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Used to manipulate server uploads: creating, deleting, fetching their
/// state, and concatenating partial uploads into final ones. For
/// transferring data see [`UploadStream`].
///
/// All requests go through the [`HttpHandler`] passed at construction; a
/// default implementation for `reqwest::blocking::Client` is available
/// behind the `reqwest` feature.
pub struct Client {
    base_url: Url,
    protocol_version: String,
    capabilities: RefCell<Option<ServerCapabilities>>,
    handler: Box<dyn HttpHandler>,
    request_hook: Option<Box<dyn Fn(&mut HttpRequest)>>,
    cancel: Option<CancelToken>,
}

impl Client {
    /// New client sending requests through `handler`, with upload
    /// locations resolved against `base_url`.
    pub fn new(handler: impl HttpHandler + 'static, base_url: Url) -> Self {
        Client {
            base_url,
            protocol_version: PROTOCOL_VERSION.to_owned(),
            capabilities: RefCell::new(None),
            handler: Box::new(handler),
            request_hook: None,
            cancel: None,
        }
    }

    /// Overrides the protocol version sent in `Tus-Resumable`.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = version.into();
        self
    }

    /// Registers a callback that may adjust every outgoing request, e.g.
    /// to add authentication headers. Runs after the protocol headers are
    /// set, so it can override them.
    pub fn with_request_hook(mut self, hook: impl Fn(&mut HttpRequest) + 'static) -> Self {
        self.request_hook = Some(Box::new(hook));
        self
    }

    /// Cancellation for all control requests; streams created from this
    /// client inherit the token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Seeds the capability cache, skipping the OPTIONS round trip for a
    /// server whose feature set is known up front.
    pub fn with_capabilities(self, capabilities: ServerCapabilities) -> Self {
        self.capabilities.replace(Some(capabilities));
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// The cached capabilities, if any request fetched them already.
    pub fn capabilities(&self) -> Option<ServerCapabilities> {
        self.capabilities.borrow().clone()
    }

    pub(crate) fn cancel_token(&self) -> Option<CancelToken> {
        self.cancel.clone()
    }

    /// Queries the server's OPTIONS endpoint and replaces the cached
    /// capabilities.
    pub fn update_capabilities(&self) -> Result<ServerCapabilities> {
        let req = HttpRequest::new(HttpMethod::Options, self.base_url.as_str());
        let response = self.roundtrip(req)?;
        match response.status_code {
            200 | 204 => {
                let caps = ServerCapabilities::from_headers(&response.headers)?;
                debug!(extensions = ?caps.extensions, "refreshed server capabilities");
                self.capabilities.replace(Some(caps.clone()));
                Ok(caps)
            }
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Checks that the server advertises `extension`, fetching the
    /// capabilities first if they were never queried.
    pub fn ensure_extension(&self, extension: &str) -> Result<()> {
        if self.capabilities.borrow().is_none() {
            self.update_capabilities()?;
        }
        let caps = self.capabilities.borrow();
        let caps = caps.as_ref().expect("capabilities fetched above");
        if caps.supports_extension(extension) {
            Ok(())
        } else {
            Err(Error::UnsupportedFeature(extension.to_owned()))
        }
    }

    /// Fetches the state of the upload at `location` with a HEAD request.
    ///
    /// For a regular upload the offset is filled in, plus the size and
    /// metadata when the server reports them (a missing `Upload-Length`
    /// leaves the size at [`SIZE_UNKNOWN`]). For a final concatenated
    /// upload whose assembly is still in progress the offset is
    /// [`OFFSET_UNKNOWN`].
    pub fn get_upload(&self, location: &str) -> Result<Upload> {
        self.get_upload_with_response(location).map(|(u, _)| u)
    }

    pub(crate) fn get_upload_with_response(
        &self,
        location: &str,
    ) -> Result<(Upload, HttpResponse)> {
        let url = self.resolve(location)?;
        let req = HttpRequest::new(HttpMethod::Head, url);
        let response = self.roundtrip(req)?;
        match response.status_code {
            200 => {
                let h = &response.headers;
                let mut upload = Upload::new(location, SIZE_UNKNOWN);
                upload.partial = h.get_by_key(UPLOAD_CONCAT) == Some("partial");

                match h.get_by_key(UPLOAD_OFFSET) {
                    Some(v) => upload.remote_offset = parse_header_i64(UPLOAD_OFFSET, v)?,
                    // Upload-Offset may be absent while a final upload
                    // concatenation is still in progress on the server.
                    None if h.get_by_key(UPLOAD_CONCAT) == Some("final") => {
                        upload.remote_offset = OFFSET_UNKNOWN
                    }
                    None => {
                        return Err(Error::Protocol(
                            "response lacks the required Upload-Offset header".to_owned(),
                        ))
                    }
                }
                if let Some(v) = h.get_by_key(UPLOAD_LENGTH) {
                    upload.remote_size = parse_header_i64(UPLOAD_LENGTH, v)?;
                }
                match h.get_by_key(UPLOAD_METADATA) {
                    Some(v) if !v.is_empty() => {
                        upload.metadata = decode_metadata(v).map_err(|e| {
                            Error::Protocol(format!("cannot parse Upload-Metadata header: {}", e))
                        })?;
                    }
                    _ => {}
                }
                Ok((upload, response))
            }
            404 | 410 | 403 => Err(Error::UploadDoesNotExist),
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Creates an upload of `remote_size` bytes on the server. Requires
    /// the `creation` extension.
    ///
    /// Passing [`SIZE_UNKNOWN`] creates an upload with a deferred size,
    /// to be announced on the first data transfer; this additionally
    /// requires the `creation-defer-length` extension. `partial` marks
    /// the upload for later concatenation. Metadata keys must not contain
    /// spaces.
    ///
    /// # Panics
    ///
    /// Panics if `remote_size` is negative and not [`SIZE_UNKNOWN`].
    pub fn create_upload(
        &self,
        remote_size: i64,
        partial: bool,
        metadata: HashMap<String, String>,
    ) -> Result<Upload> {
        if remote_size < 0 && remote_size != SIZE_UNKNOWN {
            panic!("upload size is negative: {}", remote_size);
        }
        self.ensure_extension("creation")?;

        let mut req = HttpRequest::new(HttpMethod::Post, self.base_url.as_str());
        req.headers.insert(CONTENT_LENGTH.to_owned(), "0".to_owned());
        req.content_length = Some(0);
        if partial {
            req.headers
                .insert(UPLOAD_CONCAT.to_owned(), "partial".to_owned());
        }
        if remote_size == SIZE_UNKNOWN {
            self.ensure_extension("creation-defer-length")?;
            req.headers
                .insert(UPLOAD_DEFER_LENGTH.to_owned(), "1".to_owned());
        } else {
            req.headers
                .insert(UPLOAD_LENGTH.to_owned(), remote_size.to_string());
        }
        if !metadata.is_empty() {
            req.headers
                .insert(UPLOAD_METADATA.to_owned(), encode_metadata(&metadata)?);
        }

        let response = self.roundtrip(req)?;
        match response.status_code {
            201 => {
                let mut upload = Upload {
                    location: require_location(&response)?,
                    remote_size,
                    metadata,
                    partial,
                    ..Upload::default()
                };
                if let Some(v) = response.headers.get_by_key(UPLOAD_EXPIRES) {
                    upload.upload_expired = Some(parse_expires(v)?);
                }
                debug!(location = %upload.location, size = remote_size, "created upload");
                Ok(upload)
            }
            413 => Err(Error::UploadTooLarge),
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Creates an upload and transfers `data` in the same POST request.
    /// Requires the `creation-with-upload` extension. Returns the created
    /// upload and the number of bytes the server acknowledged.
    ///
    /// # Panics
    ///
    /// Panics if `data` is empty or `remote_size` is negative.
    pub fn create_upload_with_data(
        &self,
        data: &[u8],
        remote_size: i64,
        partial: bool,
        metadata: HashMap<String, String>,
    ) -> Result<(Upload, u64)> {
        assert!(!data.is_empty(), "data must not be empty");
        // No deferred-length variant exists for creation-with-upload, so
        // SIZE_UNKNOWN is as invalid here as any other negative size.
        if remote_size < 0 {
            panic!("upload size is negative: {}", remote_size);
        }
        self.ensure_extension("creation-with-upload")?;

        let mut extra: Vec<(&str, Option<String>)> = vec![
            // The creation request addresses no existing upload yet.
            (UPLOAD_OFFSET, None),
            (UPLOAD_LENGTH, Some(remote_size.to_string())),
        ];
        if partial {
            extra.push((UPLOAD_CONCAT, Some("partial".to_owned())));
        }
        if !metadata.is_empty() {
            extra.push((UPLOAD_METADATA, Some(encode_metadata(&metadata)?)));
        }

        let upload = Upload {
            remote_size,
            partial,
            metadata,
            ..Upload::default()
        };
        let mut stream = UploadStream::new(self, upload);
        stream.chunk_size = data.len() as i64;
        let uploaded = stream.create_with_data(self.base_url.as_str(), data, &extra)?;

        let location = stream
            .last_response()
            .and_then(|r| r.headers.get_by_key(LOCATION).map(str::to_owned))
            .ok_or_else(|| Error::Protocol("response lacks the Location header".to_owned()))?;
        let mut upload = stream.into_upload();
        upload.location = location;
        Ok((upload, uploaded))
    }

    /// Deletes an upload. Requires the `termination` extension.
    pub fn delete_upload(&self, upload: &Upload) -> Result<()> {
        self.ensure_extension("termination")?;
        let url = self.resolve(&upload.location)?;
        let req = HttpRequest::new(HttpMethod::Delete, url);
        let response = self.roundtrip(req)?;
        match response.status_code {
            204 => Ok(()),
            404 | 410 | 403 => Err(Error::UploadDoesNotExist),
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Concatenates previously created partial uploads into one final
    /// upload. Requires the `concatenation` extension.
    ///
    /// Every input must be a partial upload; a non-partial input is
    /// rejected before any request is made. The returned upload has an
    /// unknown size and offset until the server finishes assembling it;
    /// fetch them with [`Client::get_upload`].
    ///
    /// # Panics
    ///
    /// Panics if `partials` is empty.
    pub fn concatenate_uploads(
        &self,
        partials: &[Upload],
        metadata: HashMap<String, String>,
    ) -> Result<Upload> {
        assert!(
            !partials.is_empty(),
            "must be at least one partial upload to concatenate"
        );
        for upload in partials {
            if !upload.partial {
                return Err(Error::NotPartial(upload.location.clone()));
            }
        }
        self.ensure_extension("concatenation")?;

        let locations: Vec<&str> = partials.iter().map(|u| u.location.as_str()).collect();
        let mut req = HttpRequest::new(HttpMethod::Post, self.base_url.as_str());
        req.headers.insert(
            UPLOAD_CONCAT.to_owned(),
            format!("final;{}", locations.join(" ")),
        );
        if !metadata.is_empty() {
            req.headers
                .insert(UPLOAD_METADATA.to_owned(), encode_metadata(&metadata)?);
        }

        let response = self.roundtrip(req)?;
        match response.status_code {
            201 => {
                let location = require_location(&response)?;
                debug!(location = %location, partials = partials.len(), "concatenated uploads");
                Ok(Upload {
                    location,
                    remote_size: SIZE_UNKNOWN,
                    remote_offset: OFFSET_UNKNOWN,
                    metadata,
                    upload_expired: None,
                    partial: false,
                })
            }
            404 | 410 => Err(Error::UploadDoesNotExist),
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Concatenates the uploads behind the given streams. A stream whose
    /// offset has not reached its size is unfinished, which additionally
    /// requires the `concatenation-unfinished` extension.
    ///
    /// # Panics
    ///
    /// Panics if `streams` is empty.
    pub fn concatenate_streams(
        &self,
        streams: &[&UploadStream],
        metadata: HashMap<String, String>,
    ) -> Result<Upload> {
        assert!(
            !streams.is_empty(),
            "must be at least one stream to concatenate"
        );
        // Reject non-partial inputs before the extension checks, which
        // may issue a lazy OPTIONS request to fill the capability cache.
        for stream in streams {
            if !stream.upload().partial {
                return Err(Error::NotPartial(stream.upload().location.clone()));
            }
        }
        for stream in streams {
            if stream.tell() < stream.size() {
                self.ensure_extension("concatenation-unfinished")?;
            }
        }
        let uploads: Vec<Upload> = streams.iter().map(|s| s.upload().clone()).collect();
        self.concatenate_uploads(&uploads, metadata)
    }

    pub(crate) fn resolve(&self, location: &str) -> Result<String> {
        Ok(self.base_url.join(location)?.to_string())
    }

    /// Sends a request with the common protocol headers, the request
    /// hook and the cancellation boundary applied. Transport errors only;
    /// response-level protocol checks live in [`Client::check_protocol`]
    /// so the stream can retain the response first.
    pub(crate) fn tus_request(
        &self,
        mut req: HttpRequest<'_>,
        cancel: Option<&CancelToken>,
    ) -> Result<HttpResponse> {
        if req.method != HttpMethod::Options && req.headers.get_by_key(TUS_RESUMABLE).is_none() {
            req.headers
                .insert(TUS_RESUMABLE.to_owned(), self.protocol_version.clone());
        }
        if let Some(hook) = &self.request_hook {
            hook(&mut req);
        }
        if let Some(token) = cancel {
            if token.is_cancelled() {
                return Err(Error::Transport("request cancelled".to_owned()));
            }
            req.cancel = Some(token.clone());
        }
        debug!(method = %req.method, url = %req.url, "sending tus request");
        self.handler.handle_request(req)
    }

    /// Validates the protocol-level response headers: a 412 means the
    /// server rejected our protocol version; on other non-OPTIONS
    /// responses `Tus-Resumable` must match the configured version, and
    /// must be present on success statuses.
    pub(crate) fn check_protocol(
        &self,
        method: HttpMethod,
        response: &HttpResponse,
    ) -> Result<()> {
        if response.status_code == 412 {
            let versions = response.headers.get_by_key(TUS_VERSION).unwrap_or_default();
            return Err(Error::Protocol(format!(
                "request protocol version {:?}, server supported versions: {:?}",
                self.protocol_version, versions
            )));
        }
        if method == HttpMethod::Options {
            return Ok(());
        }
        match response.headers.get_by_key(TUS_RESUMABLE) {
            Some(v) if v != self.protocol_version => Err(Error::Protocol(format!(
                "server replied with protocol version {:?}, configured version is {:?}",
                v, self.protocol_version
            ))),
            None if (200..300).contains(&response.status_code) => Err(Error::Protocol(
                "response lacks the Tus-Resumable header".to_owned(),
            )),
            _ => Ok(()),
        }
    }

    fn roundtrip(&self, req: HttpRequest<'_>) -> Result<HttpResponse> {
        let method = req.method;
        let response = self.tus_request(req, self.cancel.as_ref())?;
        self.check_protocol(method, &response)?;
        Ok(response)
    }
}

fn require_location(response: &HttpResponse) -> Result<String> {
    response
        .headers
        .get_by_key(LOCATION)
        .map(str::to_owned)
        .ok_or_else(|| Error::Protocol("response lacks the Location header".to_owned()))
}

fn parse_header_i64(name: &str, value: &str) -> Result<i64> {
    value.trim().parse().map_err(|_| {
        Error::Protocol(format!("cannot parse {} header {:?}", name, value))
    })
}
