use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};

use base64::prelude::BASE64_STANDARD;
use base64::Engine;

use super::Hash;

/// One hash state shared between the body tee and the trailer reader of
/// a streamed upload.
pub type SharedHash = Arc<Mutex<Box<dyn Hash>>>;

/// Feeds everything read from the inner reader into a hash state, like
/// `io::copy`ing through a side channel. The hash sees every byte
/// exactly once as the transport drains the body.
pub struct HashTeeReader<'a> {
    inner: &'a mut dyn Read,
    hash: SharedHash,
}

impl<'a> HashTeeReader<'a> {
    pub fn new(inner: &'a mut dyn Read, hash: SharedHash) -> Self {
        HashTeeReader { inner, hash }
    }
}

impl Read for HashTeeReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hash
                .lock()
                .expect("hash lock poisoned")
                .update(&buf[..n]);
        }
        Ok(n)
    }
}

/// Exposes a running hash as both a write sink and a lazy reader of
/// `"<prefix><base64(digest)>"`.
///
/// The digest is taken on the first `read` call, so the value reflects
/// everything written (or teed) up to that point; reading resets the
/// hash state. Subsequent reads stream out the rest of the rendered
/// string and then signal end-of-stream.
pub struct HashBase64ReadWriter {
    hash: SharedHash,
    prefix: String,
    rendered: Option<Vec<u8>>,
    pos: usize,
}

impl HashBase64ReadWriter {
    pub fn new(hash: SharedHash, prefix: impl Into<String>) -> Self {
        HashBase64ReadWriter {
            hash,
            prefix: prefix.into(),
            rendered: None,
            pos: 0,
        }
    }
}

impl Write for HashBase64ReadWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.lock().expect("hash lock poisoned").update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for HashBase64ReadWriter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rendered.is_none() {
            let sum = self
                .hash
                .lock()
                .expect("hash lock poisoned")
                .finalize_reset();
            let mut out = self.prefix.clone().into_bytes();
            out.extend_from_slice(BASE64_STANDARD.encode(&sum).as_bytes());
            self.rendered = Some(out);
        }

        let rendered = self.rendered.as_ref().expect("rendered above");
        let remaining = &rendered[self.pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n;
        Ok(n)
    }
}
