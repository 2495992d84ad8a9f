use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use crate::checksum::{self, DeferTrailerReader, HashBase64ReadWriter, HashTeeReader, SharedHash};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::headers::{
    CONTENT_TYPE, OFFSET_OCTET_STREAM, UPLOAD_CHECKSUM, UPLOAD_EXPIRES, UPLOAD_LENGTH,
    UPLOAD_OFFSET,
};
use crate::http::{Body, CancelToken, HeaderMap, Headers, HttpMethod, HttpRequest, HttpResponse};
use crate::upload::{parse_expires, Upload, SIZE_UNKNOWN};

/// Assigned to `UploadStream::chunk_size` to disable chunking: the whole
/// remaining source is streamed into a single request body.
pub const NO_CHUNKED: i64 = 0;

/// Chunk and dirty-buffer size of newly constructed streams.
pub const DEFAULT_CHUNK_SIZE: i64 = 2 * 1024 * 1024;

/// Write-only stream backed by tus upload requests.
///
/// The stream owns an [`Upload`] record and keeps its `remote_offset` in
/// step with the server while data is transferred. By default data goes
/// out in chunks of [`chunk_size`](Self::chunk_size) bytes, each read
/// into a dirty buffer before it is sent. A chunk that the server did not
/// acknowledge stays in the buffer (the stream is then "dirty") and is
/// re-sent by the next [`read_from`](Self::read_from) call, so a transfer
/// interrupted by a fault resumes without re-reading the source. Setting
/// `chunk_size` to [`NO_CHUNKED`] streams the source directly into one
/// request body and never uses the dirty buffer.
///
/// The server expects data exactly at the offset it manages. When the
/// local offset disagrees, the server answers 409, the stream returns
/// [`Error::OffsetsNotSynced`], and [`sync`](Self::sync) adopts the
/// server's offset so the transfer can be retried.
///
/// Checksum verification is enabled with
/// [`with_checksum_algorithm`](Self::with_checksum_algorithm) and needs
/// the server to support the `checksum` extension. In chunked mode the
/// digest of each chunk travels in the `Upload-Checksum` header; with
/// [`NO_CHUNKED`] it is only known once the body has been sent, so it is
/// emitted as an HTTP trailer, which additionally needs the
/// `checksum-trailer` extension and a trailer-capable transport.
///
/// For the deferred-length feature set the upload's size and
/// [`set_upload_size`](Self::set_upload_size) to true before the first
/// transfer: the request that writes at offset 0 then announces the size
/// in `Upload-Length`.
pub struct UploadStream<'a> {
    /// Chunk and dirty-buffer size, or [`NO_CHUNKED`]. Default 2 MiB.
    pub chunk_size: i64,

    /// When true, the request that writes at offset 0 also carries
    /// `Upload-Length` taken from the upload record. Requires the
    /// `creation-defer-length` extension.
    pub set_upload_size: bool,

    client: &'a Client,
    upload: Upload,
    method: HttpMethod,
    checksum: Option<StreamChecksum>,
    dirty_buffer: Option<Vec<u8>>,
    last_response: Option<HttpResponse>,
    cancel: Option<CancelToken>,
}

struct StreamChecksum {
    name: &'static str,
    hash: SharedHash,
}

impl<'a> UploadStream<'a> {
    /// Constructs a stream writing to `upload` through `client`. The
    /// stream inherits the client's cancel token.
    pub fn new(client: &'a Client, upload: Upload) -> Self {
        UploadStream {
            chunk_size: DEFAULT_CHUNK_SIZE,
            set_upload_size: false,
            cancel: client.cancel_token(),
            client,
            upload,
            method: HttpMethod::Patch,
            checksum: None,
            dirty_buffer: None,
            last_response: None,
        }
    }

    /// Independent copy of this stream with the given cancel token. The
    /// copy starts clean: no dirty buffer, no last response.
    pub fn with_cancel_token(&self, token: CancelToken) -> UploadStream<'a> {
        let mut copy = self.derive();
        copy.cancel = Some(token);
        copy
    }

    /// Independent copy of this stream that verifies data with the given
    /// checksum algorithm (any spelling the registry canonicalizes, e.g.
    /// `"SHA-1"`). The copy starts clean, with a fresh hash state.
    pub fn with_checksum_algorithm(&self, name: &str) -> Result<UploadStream<'a>> {
        let (canonical, hash) =
            checksum::lookup(name).ok_or_else(|| Error::UnknownAlgorithm(name.to_owned()))?;
        let mut copy = self.derive();
        copy.checksum = Some(StreamChecksum {
            name: canonical,
            hash: Arc::new(Mutex::new(hash)),
        });
        Ok(copy)
    }

    pub fn upload(&self) -> &Upload {
        &self.upload
    }

    pub fn upload_mut(&mut self) -> &mut Upload {
        &mut self.upload
    }

    pub fn into_upload(self) -> Upload {
        self.upload
    }

    /// The last response this stream received, e.g. the one that caused
    /// an error.
    pub fn last_response(&self) -> Option<&HttpResponse> {
        self.last_response.as_ref()
    }

    /// Current offset of the upload.
    pub fn tell(&self) -> i64 {
        self.upload.remote_offset
    }

    /// Size of the upload.
    pub fn size(&self) -> i64 {
        self.upload.remote_size
    }

    /// True while the dirty buffer holds a chunk the server has not
    /// acknowledged.
    pub fn is_dirty(&self) -> bool {
        self.dirty_buffer.is_some()
    }

    /// Drops the dirty buffer, discarding any unacknowledged chunk.
    pub fn force_clean(&mut self) {
        self.dirty_buffer = None;
    }

    /// Uploads data read from `src`, starting at the upload's current
    /// offset, until the source ends, the upload is full, or an error
    /// occurs. Returns the number of bytes drawn from the source.
    ///
    /// A dirty chunk left over from a previously failed call is re-sent
    /// before the source is touched. If a request fails, the chunk in
    /// flight stays in the dirty buffer and the source keeps its
    /// position, so calling `read_from` again with the same source
    /// resumes the transfer.
    pub fn read_from<R: Read>(&mut self, src: &mut R) -> Result<u64> {
        self.validate()?;
        let url = self.client.resolve(&self.upload.location)?;

        if let Some(buf) = self.dirty_buffer.take() {
            match self.send_chunk(&url, &buf, &[]) {
                Ok(acked) => {
                    // Keep the allocation only when a full-sized chunk
                    // went through; a tail or truncated resend is done
                    // with its buffer.
                    if self.chunk_size != NO_CHUNKED
                        && buf.len() as i64 == self.chunk_size
                        && acked == buf.len() as u64
                    {
                        self.dirty_buffer = Some(buf);
                    }
                }
                Err(err) => {
                    self.dirty_buffer = Some(buf);
                    return Err(err);
                }
            }
        }

        let mut counter = CountingReader::new(src);
        if self.chunk_size == NO_CHUNKED {
            self.send_streamed(&url, &mut counter, &[])?;
            return Ok(counter.bytes_read);
        }

        loop {
            let mut buf = self.dirty_buffer.take().unwrap_or_default();
            let filled = fill_chunk(&mut counter, &mut buf, self.chunk_target())?;
            if filled == 0 {
                // Source exhausted or upload full; nothing was sent, so
                // the stream ends up clean.
                break;
            }
            match self.send_chunk(&url, &buf, &[]) {
                Ok(acked) => {
                    let acked = acked as usize;
                    if acked < filled {
                        // The server accepted a prefix; keep the rest for
                        // a later resend.
                        buf.drain(..acked);
                        self.dirty_buffer = Some(buf);
                        break;
                    }
                    if acked as i64 == self.chunk_size {
                        self.dirty_buffer = Some(buf);
                        continue;
                    }
                    break;
                }
                Err(err) => {
                    self.dirty_buffer = Some(buf);
                    return Err(err);
                }
            }
        }
        Ok(counter.bytes_read)
    }

    /// Uploads up to `p.len()` bytes starting at the upload's current
    /// offset and returns the number of bytes the server acknowledged.
    ///
    /// The stream is always clean after this call: the slice is
    /// random-access, so a caller resumes by passing the unsent tail. If
    /// the upload has less space left than `p.len()` bytes and no other
    /// error occurred, the call fails with [`Error::ShortWrite`] carrying
    /// the acknowledged count. The [`io::Write`] impl adapts this to the
    /// std contract, reporting a short write as a short `Ok`.
    pub fn write(&mut self, p: &[u8]) -> Result<usize> {
        self.validate()?;
        let url = self.client.resolve(&self.upload.location)?;
        // A previously failed chunk is superseded by the slice.
        self.dirty_buffer = None;

        let mut written = 0usize;
        if self.chunk_size == NO_CHUNKED {
            let mut rd: &[u8] = p;
            written = self.send_streamed(&url, &mut rd, &[])? as usize;
        } else {
            let mut rd: &[u8] = p;
            let mut buf = Vec::new();
            loop {
                let filled = fill_chunk(&mut rd, &mut buf, self.chunk_target())?;
                if filled == 0 {
                    break;
                }
                let acked = self.send_chunk(&url, &buf, &[])? as usize;
                written += acked;
                if acked as i64 != self.chunk_size {
                    break;
                }
            }
        }
        if written < p.len() {
            return Err(Error::ShortWrite { written });
        }
        Ok(written)
    }

    /// Adopts the server's offset for this upload, querying it with a
    /// HEAD request. The usual answer to [`Error::OffsetsNotSynced`]. The
    /// dirty buffer is left untouched.
    pub fn sync(&mut self) -> Result<()> {
        let (upload, response) = self.client.get_upload_with_response(&self.upload.location)?;
        self.upload.remote_offset = upload.remote_offset;
        self.last_response = Some(response);
        Ok(())
    }

    pub(crate) fn create_with_data(
        &mut self,
        url: &str,
        data: &[u8],
        extra: &[(&str, Option<String>)],
    ) -> Result<u64> {
        self.method = HttpMethod::Post;
        self.validate()?;
        self.send_chunk(url, data, extra)
    }

    fn derive(&self) -> UploadStream<'a> {
        UploadStream {
            chunk_size: self.chunk_size,
            set_upload_size: self.set_upload_size,
            client: self.client,
            upload: self.upload.clone(),
            method: self.method,
            checksum: self.checksum.as_ref().map(|cs| StreamChecksum {
                name: cs.name,
                hash: Arc::new(Mutex::new(
                    checksum::lookup(cs.name).expect("algorithm was registered").1,
                )),
            }),
            dirty_buffer: None,
            last_response: None,
            cancel: self.cancel.clone(),
        }
    }

    /// # Panics
    ///
    /// Panics on caller invariant violations: an upload without a
    /// concrete non-negative size, or a negative `chunk_size`.
    fn validate(&self) -> Result<()> {
        if self.upload.remote_size == SIZE_UNKNOWN {
            panic!("upload must have a size before uploading starts");
        }
        if self.upload.remote_size < 0 {
            panic!("upload size is negative: {}", self.upload.remote_size);
        }
        if self.chunk_size < 0 {
            panic!("chunk_size must be a positive number or NO_CHUNKED");
        }
        if self.set_upload_size {
            self.client.ensure_extension("creation-defer-length")?;
        }
        if self.checksum.is_some() {
            self.client.ensure_extension("checksum")?;
        }
        Ok(())
    }

    fn chunk_target(&self) -> usize {
        self.chunk_size
            .min(self.upload.remote_size - self.upload.remote_offset)
            .max(0) as usize
    }

    /// Sends one chunked request carrying a prefix of `chunk`, bounded by
    /// the space left in the upload. Returns the number of acknowledged
    /// bytes, or 0 without sending anything when the upload is full.
    fn send_chunk(&mut self, url: &str, chunk: &[u8], extra: &[(&str, Option<String>)]) -> Result<u64> {
        let remaining = (self.upload.remote_size - self.upload.remote_offset).max(0) as usize;
        let send = chunk.len().min(remaining);
        if send == 0 {
            return Ok(0);
        }
        let chunk = &chunk[..send];

        let checksum_header = self.checksum.as_ref().map(|cs| {
            let mut hash = cs.hash.lock().expect("hash lock poisoned");
            hash.reset();
            hash.update(chunk);
            format!("{} {}", cs.name, BASE64_STANDARD.encode(hash.finalize_reset()))
        });

        let mut req = HttpRequest::new(self.method, url);
        if let Some(value) = checksum_header {
            req.headers.insert(UPLOAD_CHECKSUM.to_owned(), value);
        }
        req.content_length = Some(send as u64);
        let mut body: &[u8] = chunk;
        req.body = Body::Reader(&mut body);
        self.dispatch(req, extra)
    }

    /// Sends one request streaming the whole remaining source as its
    /// body. With a checksum configured, the body is teed into the hash
    /// and the digest travels as an `Upload-Checksum` trailer.
    fn send_streamed(
        &mut self,
        url: &str,
        src: &mut dyn Read,
        extra: &[(&str, Option<String>)],
    ) -> Result<u64> {
        if self.checksum.is_some() {
            self.client.ensure_extension("checksum-trailer")?;
        }

        let mut req = HttpRequest::new(self.method, url);
        let mut tee;
        let mut defer;
        if let Some(cs) = self.checksum.as_ref() {
            cs.hash.lock().expect("hash lock poisoned").reset();
            tee = HashTeeReader::new(src, cs.hash.clone());
            let value = HashBase64ReadWriter::new(cs.hash.clone(), format!("{} ", cs.name));
            defer = DeferTrailerReader::new(
                &mut tee,
                vec![(UPLOAD_CHECKSUM.to_owned(), Box::new(value))],
                &mut req,
            );
            req.body = Body::Reader(&mut defer);
        } else {
            req.body = Body::Reader(src);
        }
        self.dispatch(req, extra)
    }

    fn dispatch(&mut self, mut req: HttpRequest<'_>, extra: &[(&str, Option<String>)]) -> Result<u64> {
        let offset = self.upload.remote_offset;
        req.headers
            .insert(CONTENT_TYPE.to_owned(), OFFSET_OCTET_STREAM.to_owned());
        req.headers
            .insert(UPLOAD_OFFSET.to_owned(), offset.to_string());
        if self.set_upload_size && offset == 0 {
            req.headers
                .insert(UPLOAD_LENGTH.to_owned(), self.upload.remote_size.to_string());
        }
        for (name, value) in extra {
            match value {
                Some(v) => {
                    req.headers.insert((*name).to_owned(), v.clone());
                }
                None => req.headers.retain(|k, _| !k.eq_ignore_ascii_case(*name)),
            }
        }

        debug!(method = %req.method, url = %req.url, offset, "sending upload request");
        let method = req.method;
        let response = self.client.tus_request(req, self.cancel.as_ref())?;
        let checked = self.client.check_protocol(method, &response);
        let status = response.status_code;
        let headers = response.headers.clone();
        self.last_response = Some(response);
        checked?;

        match status {
            201 if self.method == HttpMethod::Post => self.commit(offset, &headers),
            204 => self.commit(offset, &headers),
            409 => Err(Error::OffsetsNotSynced),
            403 => Err(Error::CannotUpload),
            404 | 410 => Err(Error::UploadDoesNotExist),
            413 => Err(Error::UploadTooLarge),
            // Non-standard "460 Checksum Mismatch".
            460 if self.checksum.is_some() => Err(Error::ChecksumMismatch),
            status => Err(Error::UnexpectedResponse { status }),
        }
    }

    /// Applies a success response: the returned `Upload-Offset` must
    /// strictly advance past the pre-request offset.
    fn commit(&mut self, old_offset: i64, headers: &Headers) -> Result<u64> {
        let raw = headers.get_by_key(UPLOAD_OFFSET).ok_or_else(|| {
            Error::Protocol("response lacks the required Upload-Offset header".to_owned())
        })?;
        let new_offset: i64 = raw.trim().parse().map_err(|_| {
            Error::Protocol(format!("cannot parse Upload-Offset header {:?}", raw))
        })?;
        if new_offset <= old_offset {
            return Err(Error::Protocol(format!(
                "server offset {} did not advance past {}",
                new_offset, old_offset
            )));
        }
        if let Some(v) = headers.get_by_key(UPLOAD_EXPIRES) {
            self.upload.upload_expired = Some(parse_expires(v)?);
        }
        self.upload.remote_offset = new_offset;
        Ok((new_offset - old_offset) as u64)
    }
}

impl io::Write for UploadStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match UploadStream::write(self, buf) {
            Ok(n) => Ok(n),
            Err(Error::ShortWrite { written }) => Ok(written),
            Err(err) => Err(io::Error::new(io::ErrorKind::Other, err)),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for UploadStream<'_> {
    /// Repositions the upload offset. `SeekFrom::End` resolves to
    /// `remote_size - 1 + delta`.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_offset = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.upload.remote_offset + delta,
            SeekFrom::End(delta) => self.upload.remote_size - 1 + delta,
        };
        if new_offset < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {} is negative", new_offset),
            ));
        }
        if new_offset >= self.upload.remote_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "offset {} exceeds the upload size {} bytes",
                    new_offset, self.upload.remote_size
                ),
            ));
        }
        self.upload.remote_offset = new_offset;
        Ok(new_offset as u64)
    }
}

/// Counts the bytes drawn from the underlying reader, so `read_from` can
/// report what it consumed rather than what the server acknowledged.
struct CountingReader<'a> {
    inner: &'a mut dyn Read,
    bytes_read: u64,
}

impl<'a> CountingReader<'a> {
    fn new(inner: &'a mut dyn Read) -> Self {
        CountingReader {
            inner,
            bytes_read: 0,
        }
    }
}

impl Read for CountingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Reads up to `target` bytes into `buf`, stopping early only at
/// end-of-stream. Returns the number of bytes obtained.
fn fill_chunk(src: &mut dyn Read, buf: &mut Vec<u8>, target: usize) -> io::Result<usize> {
    buf.clear();
    if target == 0 {
        return Ok(0);
    }
    buf.resize(target, 0);
    let mut filled = 0;
    while filled < target {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_reader_tracks_consumption() {
        let data = vec![7u8; 100];
        let mut src: &[u8] = &data;
        let mut counter = CountingReader::new(&mut src);
        let mut buf = [0u8; 64];
        counter.read(&mut buf).unwrap();
        counter.read(&mut buf).unwrap();
        assert_eq!(counter.bytes_read, 100);
        assert_eq!(counter.read(&mut buf).unwrap(), 0);
        assert_eq!(counter.bytes_read, 100);
    }

    #[test]
    fn fill_chunk_stops_at_eof() {
        let mut src: &[u8] = b"hello";
        let mut buf = Vec::new();
        assert_eq!(fill_chunk(&mut src, &mut buf, 8).unwrap(), 5);
        assert_eq!(buf, b"hello");
        assert_eq!(fill_chunk(&mut src, &mut buf, 8).unwrap(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn fill_chunk_respects_target() {
        let mut src: &[u8] = b"0123456789";
        let mut buf = Vec::new();
        assert_eq!(fill_chunk(&mut src, &mut buf, 4).unwrap(), 4);
        assert_eq!(buf, b"0123");
        assert_eq!(fill_chunk(&mut src, &mut buf, 0).unwrap(), 0);
    }
}
