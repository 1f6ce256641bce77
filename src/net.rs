//! Request and response model shared by every adapter.
//!
//! A [`Request`] is built by the session, prepared once ([`Request::prepare`])
//! and handed to an adapter. Adapters return a [`Response`] whose body is read
//! lazily and at most once from the underlying stream.

mod headers;
mod request;
mod response;

pub use headers::{get_encoding_from_headers, guess_json_utf, parse_header_links, Link};
pub use request::{Body, Method, PreparedRequest, Request};
pub use response::{Chunks, Response, TextChunks, CONTENT_CHUNK_SIZE};
