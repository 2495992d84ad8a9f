#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io::Read;
use std::rc::Rc;

use tus_io::http::{
    Body, HeaderMap, Headers, HttpHandler, HttpMethod, HttpRequest, HttpResponse,
};
use tus_io::{Error, ServerCapabilities};

pub const BASE_URL: &str = "http://example.com/files/";

/// Everything the mock saw of one request, captured after the body was
/// drained so trailer values are observable.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub content_length: Option<u64>,
    pub trailer_names: Vec<String>,
    pub trailers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get_by_key(name)
    }
}

/// One scripted reply. Unless told otherwise the mock adds a
/// `Tus-Resumable: 1.0.0` header, and on success statuses an
/// `Upload-Offset` reflecting all body bytes accepted so far.
pub struct MockReply {
    status: u16,
    headers: Headers,
    omit_version: bool,
    no_auto_offset: bool,
}

impl MockReply {
    pub fn new(status: u16) -> Self {
        MockReply {
            status,
            headers: Headers::new(),
            omit_version: false,
            no_auto_offset: false,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_owned(), value.to_owned());
        self
    }

    pub fn without_version(mut self) -> Self {
        self.omit_version = true;
        self
    }

    pub fn without_auto_offset(mut self) -> Self {
        self.no_auto_offset = true;
        self
    }
}

pub fn no_content() -> MockReply {
    MockReply::new(204)
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    requests: Vec<RecordedRequest>,
    received: Vec<u8>,
}

/// Scripted tus server standing in for a real transport. Clones share
/// state, so tests keep one handle for assertions and give the other to
/// the `Client`.
#[derive(Clone, Default)]
pub struct MockHandler {
    state: Rc<RefCell<MockState>>,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, reply: MockReply) {
        self.state.borrow_mut().replies.push_back(reply);
    }

    /// Scripts `n` bare 204 replies.
    pub fn enqueue_ok(&self, n: usize) {
        for _ in 0..n {
            self.enqueue(no_content());
        }
    }

    /// Pretends `data` was accepted earlier, so auto `Upload-Offset`
    /// accounting starts past it.
    pub fn prefill(&self, data: &[u8]) {
        self.state.borrow_mut().received.extend_from_slice(data);
    }

    pub fn request(&self, index: usize) -> RecordedRequest {
        self.state.borrow().requests[index].clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.borrow().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.borrow().requests.len()
    }

    /// All body bytes accepted across successful requests.
    pub fn received(&self) -> Vec<u8> {
        self.state.borrow().received.clone()
    }
}

impl HttpHandler for MockHandler {
    fn handle_request(&self, req: HttpRequest) -> Result<HttpResponse, Error> {
        let mut body = Vec::new();
        match req.body {
            Body::Empty => {}
            Body::Reader(reader) => {
                reader.read_to_end(&mut body)?;
            }
        }

        let mut state = self.state.borrow_mut();
        let reply = state
            .replies
            .pop_front()
            .expect("no more scripted replies left");

        let mut headers = reply.headers;
        if !reply.omit_version && headers.get_by_key("Tus-Resumable").is_none() {
            headers.insert("Tus-Resumable".to_owned(), "1.0.0".to_owned());
        }
        if reply.status == 204 || reply.status == 201 {
            state.received.extend_from_slice(&body);
            if !reply.no_auto_offset && headers.get_by_key("Upload-Offset").is_none() {
                headers.insert("Upload-Offset".to_owned(), state.received.len().to_string());
            }
        }

        state.requests.push(RecordedRequest {
            method: req.method,
            url: req.url,
            headers: req.headers,
            body,
            content_length: req.content_length,
            trailer_names: req.trailer_names,
            trailers: req.trailers.snapshot(),
        });

        Ok(HttpResponse {
            status_code: reply.status,
            headers,
        })
    }
}

pub fn capabilities(extensions: &[&str]) -> ServerCapabilities {
    ServerCapabilities {
        extensions: extensions.iter().map(|s| s.to_string()).collect(),
        protocol_versions: vec!["1.0.0".to_owned()],
        ..ServerCapabilities::default()
    }
}

/// Deterministic test payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
