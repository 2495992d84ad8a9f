//! # tus_io
//!
//! A Rust client library for the [tus](https://tus.io) resumable upload
//! protocol, version 1.0.0. Large byte streams are transferred to a
//! tus-capable server and can resume after network or server faults
//! without retransmitting data the server already accepted.
//!
//! ## Transport
//!
//! All HTTP traffic goes through a handler implementing the
//! [`http::HttpHandler`] trait. A default implementation for
//! [`reqwest`](https://crates.io/crates/reqwest)'s blocking client ships
//! behind the `reqwest` feature (enabled by default).
//!
//! ## Usage
//!
//! ```no_run
//! use std::fs::File;
//! use tus_io::{Client, UploadStream};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(
//!     reqwest::blocking::Client::new(),
//!     "https://example.com/files/".parse()?,
//! );
//!
//! // Create the upload on the server, then push the data. If the
//! // transfer is interrupted, `read_from` with the same file picks up
//! // where the server left off.
//! let upload = client.create_upload(1024, false, Default::default())?;
//! let mut stream = UploadStream::new(&client, upload);
//! let mut file = File::open("video.mp4")?;
//! stream.read_from(&mut file)?;
//! # Ok(())
//! # }
//! ```
//!
//! Chunk size, checksum verification, deferred upload sizes and
//! cancellation are configured per stream; see [`UploadStream`].

mod capabilities;
mod client;
mod error;
mod stream;
mod upload;

pub mod checksum;
/// tus and HTTP header names used on the wire.
pub mod headers;
/// The transport seam: requests, responses and the `HttpHandler` trait.
/// Only relevant when implementing a custom transport.
pub mod http;

#[cfg(feature = "reqwest")]
mod reqwest_transport;

pub use capabilities::ServerCapabilities;
pub use client::{Client, PROTOCOL_VERSION};
pub use error::{Error, Result};
pub use http::CancelToken;
pub use stream::{UploadStream, DEFAULT_CHUNK_SIZE, NO_CHUNKED};
pub use upload::{decode_metadata, encode_metadata, Upload, OFFSET_UNKNOWN, SIZE_UNKNOWN};
