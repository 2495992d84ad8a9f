use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::Error;

/// Header names mapped to their values. Lookups should go through
/// [`HeaderMap::get_by_key`], since servers differ in header casing.
pub type Headers = HashMap<String, String>;

pub trait HeaderMap {
    fn get_by_key(&self, key: &str) -> Option<&str>;
}

impl HeaderMap for Headers {
    fn get_by_key(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Head,
    Options,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// Request body handed to the transport. Bodies are readers rather than
/// byte slices so that streamed uploads never have to be buffered by the
/// protocol layer; a transport may still choose to buffer them.
pub enum Body<'a> {
    Empty,
    Reader(&'a mut dyn Read),
}

/// Trailer values shared between the protocol layer and the transport.
///
/// The deferred-trailer reader fills this map while the transport drains
/// the request body; the transport must read it only after the body has
/// returned end-of-stream, and emit the values as HTTP trailers.
#[derive(Clone, Debug, Default)]
pub struct TrailerMap {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl TrailerMap {
    pub fn set(&self, name: &str, value: String) {
        self.values
            .lock()
            .expect("trailer map lock poisoned")
            .insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.values
            .lock()
            .expect("trailer map lock poisoned")
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.lock().expect("trailer map lock poisoned").clone()
    }
}

/// Cooperative cancellation flag, checked on the boundary of every
/// network request and handed to the transport so it can abort mid-flight
/// where its HTTP library allows it.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct HttpRequest<'a> {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Body<'a>,
    /// Body length when known. `None` means the transport must use a
    /// length-less encoding (e.g. chunked transfer).
    pub content_length: Option<u64>,
    /// Trailer names to announce in the `Trailer` header. Values show up
    /// in `trailers` once `body` has been fully read.
    pub trailer_names: Vec<String>,
    pub trailers: TrailerMap,
    pub cancel: Option<CancelToken>,
}

impl<'a> HttpRequest<'a> {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        HttpRequest {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Body::Empty,
            content_length: None,
            trailer_names: Vec::new(),
            trailers: TrailerMap::default(),
            cancel: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: Headers,
}

/// The transport seam. Implementations send the request, drain and
/// release the response body on every exit path, and return status plus
/// headers. Transports that cannot emit HTTP trailers must reject
/// requests with a non-empty `trailer_names` instead of silently
/// dropping the trailers.
pub trait HttpHandler {
    fn handle_request(&self, req: HttpRequest) -> Result<HttpResponse, Error>;
}
