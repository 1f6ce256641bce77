//! Client-side HTTP execution layer for a backend-as-a-service REST API.
//!
//! A [`Session`] keeps default headers and a cookie jar, and sends requests
//! through a pluggable [`Adapter`](adapter::Adapter): either straight onto
//! the network ([`DirectAdapter`](adapter::DirectAdapter)) or through a
//! sandboxed platform fetch service
//! ([`SandboxAdapter`](adapter::SandboxAdapter)). Responses are read lazily,
//! failures are classified into one [`Error`] enum, and the [`codec`] module
//! turns the backend's typed JSON envelope into [`WireValue`](codec::WireValue)s.
//!
//! ```rust,no_run
//! use baas_transport::{codec, RequestOptions, Session};
//!
//! # fn main() -> baas_transport::Result<()> {
//! let session = Session::new()?;
//! let mut response = session.get("https://api.example.com/1/classes/GameScore/Ed1nuqPvcm", RequestOptions::new())?;
//! let score = codec::decode_response(&mut response, Some("GameScore"))?;
//! println!("{score:?}");
//! # Ok(()) }
//! ```

pub mod adapter;
pub mod classify;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod net;
pub mod session;

pub use config::{SessionConfig, Transport};
pub use errors::{Error, HttpError, Result};
pub use net::{Method, Response};
pub use session::{delete, get, post, put, request, RequestOptions, Session};
