//! Header helpers: charset detection, JSON encoding sniffing and `Link`
//! header parsing.

use std::collections::HashMap;

use http::header::CONTENT_TYPE;
use http::HeaderMap;
use mime::Mime;

/// One entry of a `Link` header: `url` plus every `key="value"` parameter
/// (usually `rel`).
pub type Link = HashMap<String, String>;

/// Returns the charset declared by the `Content-Type` header.
///
/// `text/*` types without an explicit charset default to `ISO-8859-1`.
pub fn get_encoding_from_headers(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime: Mime = content_type.parse().ok()?;

    if let Some(charset) = mime.get_param(mime::CHARSET) {
        return Some(charset.as_str().to_string());
    }
    (mime.type_() == mime::TEXT).then(|| "ISO-8859-1".to_string())
}

/// Sniffs the Unicode encoding of a JSON document from its first four bytes.
///
/// JSON always starts with two ASCII characters, so the position of the null
/// bytes gives the encoding away. Returns `None` when nothing matches.
pub fn guess_json_utf(data: &[u8]) -> Option<&'static str> {
    let sample = &data[..data.len().min(4)];

    if sample.starts_with(&[0x00, 0x00, 0xfe, 0xff]) || sample.starts_with(&[0xff, 0xfe, 0x00, 0x00]) {
        return Some("utf-32");
    }
    if sample.starts_with(&[0xef, 0xbb, 0xbf]) {
        return Some("utf-8-sig");
    }
    if sample.starts_with(&[0xff, 0xfe]) || sample.starts_with(&[0xfe, 0xff]) {
        return Some("utf-16");
    }

    let nulls = sample.iter().filter(|b| **b == 0).count();
    match nulls {
        0 => Some("utf-8"),
        2 if sample.len() == 4 => {
            if sample[0] == 0 && sample[2] == 0 {
                Some("utf-16be")
            } else if sample[1] == 0 && sample[3] == 0 {
                Some("utf-16le")
            } else {
                None
            }
        }
        3 if sample.len() == 4 => {
            if sample[..3] == [0, 0, 0] {
                Some("utf-32-be")
            } else if sample[1..] == [0, 0, 0] {
                Some("utf-32-le")
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parses a `Link` header value such as
/// `<http://x/?page=2>; rel="next", <http://x/?page=9>; rel="last"`.
pub fn parse_header_links(value: &str) -> Vec<Link> {
    let strip: &[char] = &[' ', '\'', '"'];
    let mut links = Vec::new();

    for entry in value.split(", <").filter(|s| !s.trim().is_empty()) {
        let mut parts = entry.split(';');
        let url = parts
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| c == '<' || c == '>' || c == ' ' || c == '\'' || c == '"');

        let mut link = Link::new();
        link.insert("url".to_string(), url.to_string());

        for param in parts {
            let Some((key, value)) = param.split_once('=') else {
                break;
            };
            link.insert(
                key.trim_matches(strip).to_string(),
                value.trim_matches(strip).to_string(),
            );
        }
        links.push(link);
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_content_type(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, value.parse().unwrap());
        headers
    }

    #[test]
    fn charset_parameter_wins() {
        let headers = with_content_type("application/json; charset=\"UTF-16\"");
        let charset = get_encoding_from_headers(&headers).unwrap();
        assert!(charset.eq_ignore_ascii_case("utf-16"));

        let headers = with_content_type("text/html; charset=windows-1252");
        assert_eq!(get_encoding_from_headers(&headers).as_deref(), Some("windows-1252"));
    }

    #[test]
    fn text_types_default_to_latin1() {
        let headers = with_content_type("text/html");
        assert_eq!(get_encoding_from_headers(&headers).as_deref(), Some("ISO-8859-1"));
        assert_eq!(get_encoding_from_headers(&with_content_type("application/json")), None);
        assert_eq!(get_encoding_from_headers(&HeaderMap::new()), None);
        assert_eq!(get_encoding_from_headers(&with_content_type("not a mime type")), None);
    }

    #[test]
    fn sniffs_json_encodings() {
        assert_eq!(guess_json_utf(b"{\"a\":1}"), Some("utf-8"));
        assert_eq!(guess_json_utf(&[0xef, 0xbb, 0xbf, b'{']), Some("utf-8-sig"));
        assert_eq!(guess_json_utf(&[b'{', 0, b'"', 0]), Some("utf-16le"));
        assert_eq!(guess_json_utf(&[0, b'{', 0, b'"']), Some("utf-16be"));
        assert_eq!(guess_json_utf(&[b'{', 0, 0, 0]), Some("utf-32-le"));
        assert_eq!(guess_json_utf(&[0, 0, 0, b'{']), Some("utf-32-be"));
    }

    #[test]
    fn parses_link_header() {
        let links = parse_header_links(
            "<https://api.test/items?page=2>; rel=\"next\", <https://api.test/items?page=5>; rel=\"last\"",
        );
        assert_eq!(links.len(), 2);
        assert_eq!(links[0]["url"], "https://api.test/items?page=2");
        assert_eq!(links[0]["rel"], "next");
        assert_eq!(links[1]["rel"], "last");
    }
}
