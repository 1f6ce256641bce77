//! Lazily materialized HTTP response.
//!
//! A [`Response`] is handed out as soon as the status line and headers are
//! known. The body stays on the wire until it is asked for:
//!
//! - [`Response::iter_content`] streams it in chunks, undoing any
//!   `Content-Encoding` (gzip or deflate) on the way.
//! - [`Response::content`] drains that stream once and caches the bytes;
//!   later calls return the cache.
//! - [`Response::text`] and [`Response::json`] decode the cached bytes.
//!
//! ## Notes
//! - Once the stream has been handed out it cannot be handed out again.
//!   Asking for content after a partial `iter_content` fails with
//!   [`Error::ContentConsumed`].
//! - A status of `0` means no reply was received; its content is `None`.
//! - `headers` is an `http::HeaderMap`, which is **case-insensitive** for
//!   header names.
use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use encoding_rs::Encoding;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use http::header::{CONTENT_ENCODING, LINK};
use http::HeaderMap;
use url::Url;

use crate::classify;
use crate::cookies::CookieJar;
use crate::errors::{Error, Result};
use crate::net::headers::{get_encoding_from_headers, guess_json_utf, parse_header_links, Link};

/// Chunk size used when [`Response::content`] drains the body stream.
pub const CONTENT_CHUNK_SIZE: usize = 10 * 1024;

type RawBody = Box<dyn Read + Send>;

enum Content {
    Pending,
    Absent,
    Cached(Vec<u8>),
}

pub struct Response {
    /// Final URL of the response (after redirects, if any).
    pub url: Url,

    /// Numeric HTTP status code; `0` when no reply was received.
    pub status: u16,

    /// Reason phrase (e.g., `"Not Found"`).
    pub reason: String,

    pub headers: HeaderMap,

    /// Charset used by [`Response::text`]. Taken from `Content-Type`; may be
    /// overridden before decoding.
    pub encoding: Option<String>,

    /// Time between sending the request and receiving the headers.
    pub elapsed: Duration,

    /// Cookies set by this response.
    pub cookies: CookieJar,

    // Mutex keeps the response Sync; the stream is only touched through &mut self.
    raw: Option<Mutex<RawBody>>,
    content: Content,
    consumed: bool,
}

impl Response {
    /// Wraps a reply whose body is still to be read from `raw`.
    ///
    /// Cookies are extracted from the `Set-Cookie` headers for `url`.
    pub fn new(url: Url, status: u16, headers: HeaderMap, raw: impl Read + Send + 'static) -> Self {
        let mut response = Self::without_body(url, status, headers);
        response.raw = Some(Mutex::new(Box::new(raw)));
        response
    }

    /// A response with no body stream at all; its content is `None`.
    pub fn without_body(url: Url, status: u16, headers: HeaderMap) -> Self {
        let mut cookies = CookieJar::new();
        cookies.extract_from_headers(&url, &headers);

        Self {
            reason: reason_phrase(status).to_string(),
            encoding: get_encoding_from_headers(&headers),
            elapsed: Duration::ZERO,
            raw: None,
            content: Content::Pending,
            consumed: false,
            url,
            status,
            headers,
            cookies,
        }
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// True for 2xx statuses.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True once the body stream has been handed out or cached.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Streams the decoded body in chunks of at most `chunk_size` bytes.
    ///
    /// When the body is already cached the cache is replayed. When the stream
    /// was handed out before without being cached, this fails with
    /// [`Error::ContentConsumed`].
    pub fn iter_content(&mut self, chunk_size: usize) -> Result<Chunks<'_>> {
        let chunk_size = chunk_size.max(1);

        if self.consumed {
            return match &self.content {
                Content::Cached(data) => Ok(Chunks::cached(data, chunk_size)),
                _ => Err(Error::ContentConsumed),
            };
        }

        self.consumed = true;
        let reader: RawBody = match self.raw.take() {
            Some(raw) => {
                let raw = raw.into_inner().unwrap_or_else(PoisonError::into_inner);
                decoding_reader(raw, self.content_encoding().as_deref())
            }
            None => Box::new(io::empty()),
        };
        Ok(Chunks::stream(reader, chunk_size))
    }

    /// Like [`Response::iter_content`], decoding each chunk with
    /// [`Response::encoding`] (UTF-8 when unset). Characters split across
    /// chunks are carried over to the next chunk.
    pub fn iter_text(&mut self, chunk_size: usize) -> Result<TextChunks<'_>> {
        let decoder = encoding_for(self.encoding.as_deref().unwrap_or("utf-8")).new_decoder();
        Ok(TextChunks {
            chunks: self.iter_content(chunk_size)?,
            decoder,
            finished: false,
        })
    }

    /// The whole decoded body, read once and cached.
    ///
    /// Returns `None` when the status is `0` or the response has no body
    /// stream.
    pub fn content(&mut self) -> Result<Option<&[u8]>> {
        if matches!(self.content, Content::Pending) {
            if self.consumed {
                return Err(Error::ContentConsumed);
            }

            if self.status == 0 || self.raw.is_none() {
                self.raw = None;
                self.content = Content::Absent;
            } else {
                let mut data = Vec::new();
                for chunk in self.iter_content(CONTENT_CHUNK_SIZE)? {
                    data.extend_from_slice(&chunk?);
                }
                self.content = Content::Cached(data);
            }
            self.consumed = true;
        }

        match &self.content {
            Content::Cached(data) => Ok(Some(data.as_slice())),
            _ => Ok(None),
        }
    }

    /// Body decoded with [`Response::encoding`], falling back to UTF-8.
    /// An absent body yields an empty string.
    pub fn text(&mut self) -> Result<String> {
        let encoding = self.encoding.clone();
        let Some(data) = self.content()? else {
            return Ok(String::new());
        };
        if data.is_empty() {
            return Ok(String::new());
        }
        Ok(decode_text(data, encoding.as_deref().unwrap_or("utf-8")))
    }

    /// Body parsed as JSON. Without a declared charset the Unicode encoding
    /// is sniffed from the first bytes.
    pub fn json(&mut self) -> Result<serde_json::Value> {
        if self.encoding.is_none() {
            if let Some(data) = self.content()? {
                if data.len() > 3 {
                    // UTF-32 has no decoder and goes through `text`
                    let sniffed = guess_json_utf(data).and_then(|label| Encoding::for_label(label.as_bytes()));
                    if let Some(encoding) = sniffed {
                        let (text, _, _) = encoding.decode(data);
                        return Ok(serde_json::from_str(&text)?);
                    }
                }
            }
        }
        Ok(serde_json::from_str(&self.text()?)?)
    }

    /// The `Link` header, keyed by `rel` (or by URL when `rel` is missing).
    pub fn links(&self) -> HashMap<String, Link> {
        let mut resolved = HashMap::new();
        for header in self.headers.get_all(LINK) {
            let Ok(value) = header.to_str() else {
                continue;
            };
            for link in parse_header_links(value) {
                let key = link.get("rel").or_else(|| link.get("url")).cloned().unwrap_or_default();
                resolved.insert(key, link);
            }
        }
        resolved
    }

    /// Turns a non-2xx response into [`Error::Http`].
    pub fn raise_for_status(self) -> Result<Response> {
        classify::check_status(self)
    }

    /// Releases the body stream. Content that was not cached yet is gone.
    pub fn close(&mut self) {
        if self.raw.take().is_some() {
            self.consumed = true;
        }
    }

    fn content_encoding(&self) -> Option<String> {
        self.headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = match &self.content {
            Content::Pending if self.consumed => "consumed".to_string(),
            Content::Pending => "pending".to_string(),
            Content::Absent => "absent".to_string(),
            Content::Cached(data) => format!("{} bytes", data.len()),
        };
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("reason", &self.reason)
            .field("headers", &self.headers)
            .field("encoding", &self.encoding)
            .field("elapsed", &self.elapsed)
            .field("content", &content)
            .finish()
    }
}

/// Body chunks produced by [`Response::iter_content`].
pub struct Chunks<'r> {
    source: ChunkSource<'r>,
    chunk_size: usize,
}

enum ChunkSource<'r> {
    Cached { data: &'r [u8], pos: usize },
    Stream { reader: RawBody, done: bool },
}

impl<'r> Chunks<'r> {
    fn cached(data: &'r [u8], chunk_size: usize) -> Self {
        Self {
            source: ChunkSource::Cached { data, pos: 0 },
            chunk_size,
        }
    }

    fn stream(reader: RawBody, chunk_size: usize) -> Self {
        Self {
            source: ChunkSource::Stream { reader, done: false },
            chunk_size,
        }
    }
}

impl Iterator for Chunks<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            ChunkSource::Cached { data, pos } => {
                if *pos >= data.len() {
                    return None;
                }
                let end = (*pos + self.chunk_size).min(data.len());
                let chunk = data[*pos..end].to_vec();
                *pos = end;
                Some(Ok(chunk))
            }
            ChunkSource::Stream { reader, done } => {
                if *done {
                    return None;
                }
                let mut chunk = Vec::with_capacity(self.chunk_size);
                match reader.by_ref().take(self.chunk_size as u64).read_to_end(&mut chunk) {
                    Ok(0) => {
                        *done = true;
                        None
                    }
                    Ok(_) => Some(Ok(chunk)),
                    Err(e) => {
                        *done = true;
                        Some(Err(classify::io_error(e)))
                    }
                }
            }
        }
    }
}

/// Decoded text chunks produced by [`Response::iter_text`].
pub struct TextChunks<'r> {
    chunks: Chunks<'r>,
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl TextChunks<'_> {
    fn decode(&mut self, data: &[u8], last: bool) -> String {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(data.len())
            .unwrap_or(data.len() * 3 + 4);
        let mut text = String::with_capacity(capacity);
        let _ = self.decoder.decode_to_string(data, &mut text, last);
        text
    }
}

impl Iterator for TextChunks<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            match self.chunks.next() {
                Some(Ok(data)) => {
                    // an incomplete character stays inside the decoder
                    let text = self.decode(&data, false);
                    if !text.is_empty() {
                        return Some(Ok(text));
                    }
                }
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    let text = self.decode(&[], true);
                    return (!text.is_empty()).then_some(Ok(text));
                }
            }
        }
    }
}

/// Looks up a charset label. Unknown labels decode as UTF-8.
fn encoding_for(label: &str) -> &'static Encoding {
    Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
        log::debug!("unsupported charset {label}, decoding as UTF-8");
        encoding_rs::UTF_8
    })
}

/// Decodes `data` with the named charset. A byte order mark overrides it.
fn decode_text(data: &[u8], label: &str) -> String {
    let (text, _, _) = encoding_for(label).decode(data);
    text.into_owned()
}

/// Wraps `raw` so that reading it undoes the `Content-Encoding`.
fn decoding_reader(raw: RawBody, content_encoding: Option<&str>) -> RawBody {
    match content_encoding {
        Some(enc) if enc.contains("gzip") => Box::new(BodyDecoder::new(raw, Coding::Gzip)),
        Some(enc) if enc.contains("deflate") => Box::new(BodyDecoder::new(raw, Coding::Deflate)),
        _ => raw,
    }
}

#[derive(Clone, Copy)]
enum Coding {
    Gzip,
    Deflate,
}

/// Decompresses a body once its first bytes are known.
///
/// An empty body is passed through untouched. `deflate` is accepted both
/// zlib-wrapped and raw, as servers disagree on what the token means.
enum BodyDecoder {
    Undecided(Option<BufReader<RawBody>>, Coding),
    Empty,
    Gzip(MultiGzDecoder<BufReader<RawBody>>),
    Zlib(ZlibDecoder<BufReader<RawBody>>),
    Raw(DeflateDecoder<BufReader<RawBody>>),
}

impl BodyDecoder {
    fn new(raw: RawBody, coding: Coding) -> Self {
        BodyDecoder::Undecided(Some(BufReader::new(raw)), coding)
    }

    fn decide(&mut self) -> io::Result<()> {
        let BodyDecoder::Undecided(slot, coding) = self else {
            return Ok(());
        };
        let coding = *coding;
        let Some(mut inner) = slot.take() else {
            *self = BodyDecoder::Empty;
            return Ok(());
        };

        let head = inner.fill_buf()?;
        let (empty, zlib) = (head.is_empty(), is_zlib_header(head));
        *self = match coding {
            _ if empty => BodyDecoder::Empty,
            Coding::Gzip => BodyDecoder::Gzip(MultiGzDecoder::new(inner)),
            Coding::Deflate if zlib => BodyDecoder::Zlib(ZlibDecoder::new(inner)),
            Coding::Deflate => BodyDecoder::Raw(DeflateDecoder::new(inner)),
        };
        Ok(())
    }
}

impl Read for BodyDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decide()?;

        let read = match self {
            BodyDecoder::Gzip(r) => r.read(buf),
            BodyDecoder::Zlib(r) => r.read(buf),
            BodyDecoder::Raw(r) => r.read(buf),
            BodyDecoder::Undecided(..) | BodyDecoder::Empty => Ok(0),
        };
        // a truncated stream is corrupt content, not a dropped connection
        read.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => io::Error::new(io::ErrorKind::InvalidData, e),
            _ => e,
        })
    }
}

fn is_zlib_header(head: &[u8]) -> bool {
    head.len() >= 2 && head[0] & 0x0f == 8 && (u16::from(head[0]) << 8 | u16::from(head[1])) % 31 == 0
}

fn reason_phrase(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;

    use super::*;

    fn url() -> Url {
        Url::parse("https://api.example.com/1/classes/Item").unwrap()
    }

    fn response(headers: &[(&'static str, &'static str)], body: Vec<u8>) -> Response {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(*k, v.parse().unwrap());
        }
        Response::new(url(), 200, map, Cursor::new(body))
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn gzip_body_is_decoded_once_and_cached() {
        let mut resp = response(&[("content-encoding", "gzip")], gzip(b"hello"));

        assert_eq!(resp.content().unwrap(), Some(&b"hello"[..]));
        // second call does not touch the stream
        assert_eq!(resp.content().unwrap(), Some(&b"hello"[..]));
        assert!(resp.is_consumed());
    }

    #[test]
    fn empty_compressed_body_is_empty_content() {
        let mut resp = response(&[("content-encoding", "gzip")], Vec::new());
        assert_eq!(resp.content().unwrap(), Some(&b""[..]));

        let mut resp = response(&[("content-encoding", "deflate")], Vec::new());
        assert_eq!(resp.text().unwrap(), "");
    }

    #[test]
    fn corrupt_gzip_is_a_request_error() {
        let mut resp = response(&[("content-encoding", "gzip")], b"plainly not gzip".to_vec());
        assert!(matches!(resp.content(), Err(Error::Request(_))));
    }

    #[test]
    fn deflate_accepts_zlib_and_raw_streams() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(b"wrapped").unwrap();
        let mut resp = response(&[("content-encoding", "deflate")], zlib.finish().unwrap());
        assert_eq!(resp.text().unwrap(), "wrapped");

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(b"bare").unwrap();
        let mut resp = response(&[("content-encoding", "deflate")], raw.finish().unwrap());
        assert_eq!(resp.text().unwrap(), "bare");
    }

    #[test]
    fn iter_content_respects_chunk_size() {
        let mut resp = response(&[], b"abcdefg".to_vec());
        let chunks: Vec<Vec<u8>> = resp.iter_content(3).unwrap().map(|c| c.unwrap()).collect();
        assert_eq!(chunks, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);
    }

    #[test]
    fn content_after_streaming_is_an_error() {
        let mut resp = response(&[], b"abc".to_vec());
        let first = resp.iter_content(1).unwrap().next().unwrap().unwrap();
        assert_eq!(first, b"a");

        assert!(matches!(resp.content(), Err(Error::ContentConsumed)));
        assert!(matches!(resp.iter_content(1), Err(Error::ContentConsumed)));
    }

    #[test]
    fn cached_content_is_replayed_by_iter_content() {
        let mut resp = response(&[], b"abcd".to_vec());
        resp.content().unwrap();
        let joined: Vec<u8> = resp.iter_content(3).unwrap().flat_map(|c| c.unwrap()).collect();
        assert_eq!(joined, b"abcd");
    }

    #[test]
    fn status_zero_has_no_content() {
        let mut resp = Response::new(url(), 0, HeaderMap::new(), Cursor::new(b"ignored".to_vec()));
        assert_eq!(resp.content().unwrap(), None);
        assert_eq!(resp.text().unwrap(), "");

        let mut bare = Response::without_body(url(), 204, HeaderMap::new());
        assert_eq!(bare.content().unwrap(), None);
    }

    #[test]
    fn text_uses_declared_charset() {
        let mut resp = response(&[("content-type", "text/plain")], vec![0x63, 0x61, 0x66, 0xe9]);
        assert_eq!(resp.encoding.as_deref(), Some("ISO-8859-1"));
        assert_eq!(resp.text().unwrap(), "café");

        let mut utf8 = response(&[("content-type", "text/plain; charset=utf-8")], "café".as_bytes().to_vec());
        assert_eq!(utf8.text().unwrap(), "café");
    }

    #[test]
    fn text_decodes_any_labelled_charset() {
        let body = vec![0x93, 0x68, 0x69, 0x94, 0x80];
        let mut resp = response(&[("content-type", "text/plain; charset=windows-1252")], body);
        assert_eq!(resp.text().unwrap(), "\u{201c}hi\u{201d}\u{20ac}");

        let mut sjis = response(&[("content-type", "text/plain; charset=Shift_JIS")], vec![0x82, 0xa0]);
        assert_eq!(sjis.text().unwrap(), "\u{3042}");
    }

    #[test]
    fn iter_text_keeps_split_utf16_units_together() {
        let body: Vec<u8> = "h\u{e9}llo \u{1f600}".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut resp = response(&[("content-type", "text/plain; charset=utf-16le")], body);
        // odd chunk size splits every code unit
        let parts: Vec<String> = resp.iter_text(3).unwrap().map(|t| t.unwrap()).collect();
        assert_eq!(parts.concat(), "h\u{e9}llo \u{1f600}");
    }

    #[test]
    fn json_sniffs_utf16_without_charset() {
        let body: Vec<u8> = "{\"a\":1}".encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut resp = response(&[], body);
        assert_eq!(resp.json().unwrap(), serde_json::json!({"a": 1}));
    }

    #[test]
    fn iter_text_keeps_split_characters_together() {
        let mut resp = response(&[("content-type", "text/plain; charset=utf-8")], "héllo".as_bytes().to_vec());
        // 'é' is two bytes and straddles the first chunk boundary
        let parts: Vec<String> = resp.iter_text(2).unwrap().map(|t| t.unwrap()).collect();
        assert_eq!(parts.concat(), "héllo");
        assert!(parts.iter().all(|p| !p.contains(char::REPLACEMENT_CHARACTER)));
    }

    #[test]
    fn links_are_keyed_by_rel() {
        let resp = response(
            &[("link", "<https://api.example.com/1/classes/Item?skip=100>; rel=\"next\"")],
            Vec::new(),
        );
        let links = resp.links();
        assert_eq!(links["next"]["url"], "https://api.example.com/1/classes/Item?skip=100");
    }

    #[test]
    fn response_extracts_cookies_and_reason() {
        let resp = response(&[("set-cookie", "sid=1; Path=/")], Vec::new());
        assert_eq!(resp.reason, "OK");
        assert_eq!(resp.cookies.get("sid", None, None).unwrap(), Some("1"));
        assert!(resp.ok());
    }

    #[test]
    fn close_drops_unread_body() {
        let mut resp = response(&[], b"abc".to_vec());
        resp.close();
        assert!(matches!(resp.content(), Err(Error::ContentConsumed)));
    }
}
