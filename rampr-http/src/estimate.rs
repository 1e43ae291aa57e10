use super::util::{has_header, host_header_value, parse_target};
use super::{HttpRequest, Result};

const CRLF: u64 = 2;

/// Best-effort HTTP/1.1 size of `req` on the wire.
///
/// Counts the request line, every header (including the `host` and
/// `content-length` headers the client adds implicitly), the blank line and
/// the body.
pub fn estimate_http_request_bytes(req: &HttpRequest) -> Result<u64> {
    let parsed = parse_target(&req.url)?;
    Ok(request_bytes(
        &req.method,
        &parsed,
        &req.headers,
        req.body.len() as u64,
    ))
}

pub(super) fn request_bytes(
    method: &http::Method,
    parsed: &url::Url,
    headers: &[(String, String)],
    body_len: u64,
) -> u64 {
    let path = match parsed.query() {
        Some(q) => parsed.path().len() as u64 + 1 + q.len() as u64,
        None => parsed.path().len() as u64,
    };

    // "METHOD SP target SP HTTP/1.1 CRLF"
    let mut total = method.as_str().len() as u64 + 1 + path.max(1) + 1 + 8 + CRLF;

    total += headers
        .iter()
        .map(|(k, v)| header_line(k.len(), v.len()))
        .sum::<u64>();

    if !has_header(headers, "host")
        && let Some(host) = host_header_value(parsed)
    {
        total += header_line("host".len(), host.len());
    }
    if body_len != 0 && !has_header(headers, "content-length") {
        total += header_line("content-length".len(), body_len.to_string().len());
    }

    total + CRLF + body_len
}

pub(super) fn response_head_bytes(
    version: http::Version,
    status: http::StatusCode,
    headers: &http::HeaderMap,
) -> u64 {
    let version_len: u64 = match version {
        http::Version::HTTP_2 | http::Version::HTTP_3 => 6,
        _ => 8,
    };

    // "HTTP/1.1 SP 200 CRLF"; the reason phrase is ignored.
    let status_line = version_len + 1 + status.as_str().len() as u64 + CRLF;
    let header_bytes: u64 = headers
        .iter()
        .map(|(k, v)| header_line(k.as_str().len(), v.as_bytes().len()))
        .sum();

    status_line + header_bytes + CRLF
}

#[inline]
fn header_line(name_len: usize, value_len: usize) -> u64 {
    // "name: value CRLF"
    name_len as u64 + 2 + value_len as u64 + CRLF
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn get_includes_implicit_host_header() {
        let req = HttpRequest::get("http://example.com/health");
        let n = match estimate_http_request_bytes(&req) {
            Ok(n) => n,
            Err(err) => panic!("estimate failed: {err}"),
        };
        // "GET /health HTTP/1.1\r\n" + "host: example.com\r\n" + "\r\n"
        assert_eq!(n, 22 + 19 + 2);
    }

    #[test]
    fn post_counts_body_and_content_length() {
        let req = HttpRequest::post("http://example.com:8080/a?b=1", Bytes::from_static(b"hello"));
        let n = match estimate_http_request_bytes(&req) {
            Ok(n) => n,
            Err(err) => panic!("estimate failed: {err}"),
        };
        // "POST /a?b=1 HTTP/1.1\r\n" + "host: example.com:8080\r\n"
        // + "content-length: 5\r\n" + "\r\n" + body
        assert_eq!(n, 22 + 24 + 19 + 2 + 5);
    }

    #[test]
    fn rejects_non_http_scheme() {
        let req = HttpRequest::get("ftp://example.com/");
        assert!(estimate_http_request_bytes(&req).is_err());
    }
}
