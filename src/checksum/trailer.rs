use std::io::{self, Read};

use crate::http::{HttpRequest, TrailerMap};

/// Reader that forwards a request body and populates HTTP trailer values
/// once the body is exhausted. Suitable when a trailer value is unknown
/// until the whole body has been read, e.g. the checksum of a streamed
/// upload.
///
/// On construction the trailer names are recorded on the outgoing
/// request, so the transport announces them in the `Trailer` header. The
/// values are drained from the given readers and stored in the request's
/// trailer map exactly once, at end-of-stream and before end-of-stream is
/// reported to the transport.
pub struct DeferTrailerReader<'a> {
    body: &'a mut dyn Read,
    readers: Vec<(String, Box<dyn Read + 'a>)>,
    trailers: TrailerMap,
    populated: bool,
}

impl<'a> DeferTrailerReader<'a> {
    pub fn new(
        body: &'a mut dyn Read,
        readers: Vec<(String, Box<dyn Read + 'a>)>,
        request: &mut HttpRequest<'_>,
    ) -> Self {
        for (name, _) in &readers {
            if !request
                .trailer_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name))
            {
                request.trailer_names.push(name.clone());
            }
        }
        DeferTrailerReader {
            body,
            readers,
            trailers: request.trailers.clone(),
            populated: false,
        }
    }
}

impl Read for DeferTrailerReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.body.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.populated {
            for (name, reader) in &mut self.readers {
                let mut value = String::new();
                reader.read_to_string(&mut value)?;
                self.trailers.set(name, value);
            }
            self.populated = true;
        }
        Ok(n)
    }
}
