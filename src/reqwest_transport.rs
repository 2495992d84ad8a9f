use std::io::Read;

use reqwest::blocking::Client as BlockingClient;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;

use crate::http::{Body, Headers, HttpHandler, HttpMethod, HttpRequest, HttpResponse};
use crate::Error;

/// Transport implementation for `reqwest`'s blocking client.
///
/// Request bodies are buffered in memory before sending. The blocking
/// API cannot emit HTTP trailers, so requests announcing trailers are
/// rejected; streamed-checksum mode needs a trailer-capable transport.
impl HttpHandler for BlockingClient {
    fn handle_request(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        if !req.trailer_names.is_empty() {
            return Err(Error::Transport(
                "reqwest transport does not support HTTP request trailers".to_owned(),
            ));
        }

        let mut headers = HeaderMap::new();
        for (key, value) in &req.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Transport(format!("invalid header name {:?}: {}", key, e)))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::Transport(format!("invalid header value for {}: {}", key, e))
            })?;
            headers.insert(name, value);
        }

        let method = match req.method {
            HttpMethod::Head => Method::HEAD,
            HttpMethod::Options => Method::OPTIONS,
            HttpMethod::Post => Method::POST,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        };

        let mut builder = self.request(method, &req.url).headers(headers);
        if let Body::Reader(reader) = req.body {
            let mut buf = match req.content_length {
                Some(len) => Vec::with_capacity(len as usize),
                None => Vec::new(),
            };
            reader.read_to_end(&mut buf)?;
            builder = builder.body(buf);
        }

        let response = builder
            .send()
            .map_err(|e| Error::Transport(e.to_string()))?;

        let status_code = response.status().as_u16();
        let mut resp_headers = Headers::new();
        for (key, value) in response.headers() {
            resp_headers.insert(
                key.to_string(),
                value.to_str().map(String::from).unwrap_or_default(),
            );
        }
        // Drain the body so the connection can be reused.
        let _ = response.bytes();

        Ok(HttpResponse {
            status_code,
            headers: resp_headers,
        })
    }
}
