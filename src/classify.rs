//! Maps transport failures and non-2xx replies onto [`Error`].
//!
//! Every adapter funnels its failures through here so that calling code sees
//! the same error for the same condition, whichever transport ran.

use std::error::Error as StdError;
use std::io;

use url::{ParseError, Url};

use crate::adapter::RpcError;
use crate::errors::{Error, HttpError, Result};
use crate::net::Response;

/// Schemes a request may use.
pub const SUPPORTED_SCHEMES: [&str; 2] = ["http", "https"];

/// Parses and validates a request URL.
///
/// - no scheme at all: [`Error::MissingSchema`]
/// - a scheme other than `http`/`https`: [`Error::InvalidSchema`]
/// - anything else unparseable or without a host: [`Error::InvalidUrl`]
///
/// `host:port/path` parses as a URL whose scheme is the host name, so an
/// unknown scheme without `://` counts as a missing one.
pub fn parse_url(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Ok(url) => {
            if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
                if !raw.contains("://") {
                    return Err(missing_schema(raw));
                }
                return Err(Error::InvalidSchema(url.scheme().to_string()));
            }
            if url.host_str().map_or(true, str::is_empty) {
                return Err(Error::InvalidUrl(format!("{raw}: no host")));
            }
            Ok(url)
        }
        Err(ParseError::RelativeUrlWithoutBase) => Err(missing_schema(raw)),
        Err(e) => Err(Error::InvalidUrl(format!("{raw}: {e}"))),
    }
}

fn missing_schema(raw: &str) -> Error {
    Error::MissingSchema(format!("{raw:?}: perhaps you meant http://{raw}?"))
}

/// Classifies a failure reported by the `reqwest` client.
pub fn transport_error(err: reqwest::Error) -> Error {
    let message = error_chain(&err);

    if err.is_timeout() {
        return Error::Timeout;
    }
    if is_tls_failure(&err) {
        return Error::Ssl(message);
    }
    if err.is_connect() {
        return Error::Connection(message);
    }
    if let Some(io) = find_io_error(&err) {
        return match io.kind() {
            io::ErrorKind::TimedOut => Error::Timeout,
            _ => Error::Connection(message),
        };
    }
    Error::Request(message)
}

/// Classifies a failure raised while reading a body stream.
///
/// Content decoders report corrupt or truncated input as `InvalidData`,
/// which is a request failure rather than a connection one.
pub fn io_error(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            Error::Request(format!("cannot decode response body: {err}"))
        }
        _ => match err.get_ref().and_then(|inner| inner.downcast_ref::<reqwest::Error>()) {
            Some(inner) if inner.is_timeout() => Error::Timeout,
            _ => Error::Connection(err.to_string()),
        },
    }
}

/// Classifies a failure reported by a sandbox RPC service.
///
/// `url` is the request URL; an invalid-URL report is narrowed down to the
/// same variants [`parse_url`] would produce.
pub fn rpc_error(err: RpcError, url: &str) -> Error {
    match err {
        RpcError::InvalidUrl(message) => match parse_url(url) {
            Err(e) => e,
            Ok(_) => Error::InvalidUrl(message),
        },
        RpcError::Download(message) => Error::Connection(message),
        RpcError::ResponseTooLarge => Error::ResponseTooLarge,
        RpcError::SslCertificate(message) => Error::Ssl(message),
        RpcError::DeadlineExceeded => Error::Timeout,
        RpcError::Other(message) => Error::Request(message),
    }
}

/// True when `err` (or anything in its source chain) is a TLS failure.
pub fn is_tls_failure(err: &reqwest::Error) -> bool {
    let chain = error_chain(err).to_ascii_lowercase();
    ["certificate", "tls", "ssl", "handshake"]
        .iter()
        .any(|needle| chain.contains(needle))
}

/// Passes 2xx responses through and turns anything else into [`Error::Http`].
pub fn check_status(response: Response) -> Result<Response> {
    if response.ok() {
        Ok(response)
    } else {
        Err(status_error(response))
    }
}

/// Builds the [`Error::Http`] for a non-2xx response.
///
/// A JSON body of the form `{"error": ..., "code": ...}` supplies the
/// reason and the service error code. Any other JSON body is reported as
/// `"Unauthorized"`. A body that is not JSON keeps the generic message
/// (`"404 Client Error: Not Found"`) with the HTTP status as the code.
pub fn status_error(mut response: Response) -> Error {
    let status = response.status;
    let generic = format!("{} {}: {}", status, status_class(status), response.reason);

    let body = match response.text() {
        Ok(body) => body,
        Err(e) => {
            log::debug!("cannot read error body from {}: {}", response.url, e);
            String::new()
        }
    };

    let (message, reason, code) = match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => match (json.get("error"), json.get("code").and_then(|c| c.as_i64())) {
            (Some(error), Some(code)) => {
                let error = error.as_str().map_or_else(|| error.to_string(), str::to_string);
                (error.clone(), Some(error), Some(code))
            }
            _ => ("Unauthorized".to_string(), None, None),
        },
        Err(_) => (generic.clone(), Some(generic), Some(i64::from(status))),
    };

    log::debug!("{} {} -> {}", status, response.url, message);
    Error::Http(HttpError {
        status,
        message,
        reason,
        code,
        response: Box::new(response),
    })
}

fn status_class(status: u16) -> &'static str {
    match status {
        400..=499 => "Client Error",
        500..=599 => "Server Error",
        300..=399 => "Redirection",
        _ => "Unexpected Status",
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn find_io_error<'e>(err: &'e (dyn StdError + 'static)) -> Option<&'e io::Error> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<io::Error>() {
            return Some(io);
        }
        source = inner.source();
    }
    None
}
