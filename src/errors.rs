//! Error taxonomy for the transport layer.
//!
//! Every failure an adapter can produce is classified into exactly one
//! [`Error`] variant before it reaches calling code (see [`crate::classify`]).
//! A non-2xx reply is reported as [`Error::Http`], which keeps the fully
//! populated [`Response`] so callers can still inspect its headers and body.

use crate::net::Response;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing scheme in URL: {0}")]
    MissingSchema(String),

    #[error("Invalid scheme: {0}")]
    InvalidSchema(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("SSL error: {0}")]
    Ssl(String),

    #[error("Connection timed out")]
    Timeout,

    #[error("Response too large")]
    ResponseTooLarge,

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("There are multiple cookies with name {name:?}")]
    CookieConflict { name: String },

    #[error("No cookie matches name={name:?}, domain={domain:?}, path={path:?}")]
    CookieNotFound {
        name: String,
        domain: Option<String>,
        path: Option<String>,
    },

    #[error("The content for this response was already consumed")]
    ContentConsumed,

    #[error("Cannot decode wire value: {0}")]
    Decode(String),

    #[error("Cannot encode wire value: {0}")]
    Encode(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Request(String),
}

impl Error {
    /// Returns the partial response carried by an HTTP error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Error::Http(e) => Some(&e.response),
            _ => None,
        }
    }

    /// Consumes the error and hands back the partial response, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Error::Http(e) => Some(*e.response),
            _ => None,
        }
    }

    /// True for the errors raised while validating the URL, before any
    /// network activity took place.
    pub fn is_url_error(&self) -> bool {
        matches!(
            self,
            Error::MissingSchema(_) | Error::InvalidSchema(_) | Error::InvalidUrl(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

/// A reply whose status code is outside the 2xx range.
///
/// `reason` and `code` come from the JSON body when the server sent
/// `{"error": ..., "code": ...}`; otherwise `reason` holds the generic
/// classification (see [`crate::classify::status_error`]).
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    pub reason: Option<String>,
    pub code: Option<i64>,
    pub response: Box<Response>,
}

impl HttpError {
    pub fn status(&self) -> u16 {
        self.status
    }
}
