//! HTTP response building module
//!
//! Builders for the non-JSON responses: file attachments, conditional and
//! range replies, CORS preflight.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::time::SystemTime;

use super::cache;
use super::range::{resolve_range, RangeOutcome};

/// A stored file about to be sent as a download
pub struct Attachment<'a> {
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub data: Bytes,
    pub modified: SystemTime,
}

/// Request headers that shape a download response
#[derive(Default)]
pub struct DownloadConditions<'a> {
    pub if_none_match: Option<&'a str>,
    pub range: Option<&'a str>,
    pub is_head: bool,
}

/// Build 304 Not Modified response
pub fn build_304_response(etag: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header("ETag", etag)
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|e| {
            log_build_error("304", &e);
            Response::new(Full::new(Bytes::new()))
        })
}

/// Build 416 Range Not Satisfiable response
pub fn build_416_response(file_size: usize) -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header("Content-Type", "text/plain")
        .header("Content-Range", format!("bytes */{file_size}"))
        .body(Full::new(Bytes::from("Range Not Satisfiable")))
        .unwrap_or_else(|e| {
            log_build_error("416", &e);
            Response::new(Full::new(Bytes::from("Range Not Satisfiable")))
        })
}

/// Build OPTIONS response (preflight request)
pub fn build_options_response(enable_cors: bool) -> Response<Full<Bytes>> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Allow", "GET, HEAD, POST, OPTIONS");

    if enable_cors {
        builder = builder
            .header("Access-Control-Allow-Methods", "GET, HEAD, POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type, Range")
            .header("Access-Control-Max-Age", "86400");
    }

    builder.body(Full::new(Bytes::new())).unwrap_or_else(|e| {
        log_build_error("OPTIONS", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Build a download response with `ETag`, `Last-Modified` and Range support
pub fn build_attachment_response(
    file: Attachment<'_>,
    conditions: &DownloadConditions<'_>,
) -> Response<Full<Bytes>> {
    let etag = cache::generate_etag(&file.data);
    if cache::check_etag_match(conditions.if_none_match, &etag) {
        return build_304_response(&etag);
    }

    let total = file.data.len();
    let (status, body, content_range) = match resolve_range(conditions.range, total) {
        RangeOutcome::Full => (StatusCode::OK, file.data, None),
        RangeOutcome::Partial(r) => (
            StatusCode::PARTIAL_CONTENT,
            file.data.slice(r.start..=r.end),
            Some(format!("bytes {}-{}/{total}", r.start, r.end)),
        ),
        RangeOutcome::Unsatisfiable => return build_416_response(total),
    };

    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", file.content_type)
        .header("Content-Length", body.len())
        .header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", file.file_name),
        )
        .header("ETag", &etag)
        .header("Last-Modified", cache::http_date(file.modified))
        .header("Cache-Control", "no-cache")
        .header("Accept-Ranges", "bytes");
    if let Some(value) = content_range {
        builder = builder.header("Content-Range", value);
    }

    let body = if conditions.is_head { Bytes::new() } else { body };
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        log_build_error("attachment", &e);
        Response::new(Full::new(Bytes::new()))
    })
}

/// Log response build error
fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn attachment(data: &'static [u8]) -> Attachment<'static> {
        Attachment {
            file_name: "deals_1_20240101_000000.csv",
            content_type: "text/csv; charset=utf-8",
            data: Bytes::from_static(data),
            modified: SystemTime::UNIX_EPOCH,
        }
    }

    async fn body_of(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_full_attachment() {
        let resp = build_attachment_response(attachment(b"a\n1\n"), &DownloadConditions::default());
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["Content-Disposition"],
            "attachment; filename=\"deals_1_20240101_000000.csv\""
        );
        assert_eq!(resp.headers()["Content-Type"], "text/csv; charset=utf-8");
        assert_eq!(resp.headers()["Last-Modified"], "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(body_of(resp).await, "a\n1\n");
    }

    #[tokio::test]
    async fn test_partial_attachment() {
        let conditions = DownloadConditions {
            range: Some("bytes=2-3"),
            ..DownloadConditions::default()
        };
        let resp = build_attachment_response(attachment(b"a\n1\n"), &conditions);
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.headers()["Content-Range"], "bytes 2-3/4");
        assert_eq!(body_of(resp).await, "1\n");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let conditions = DownloadConditions {
            range: Some("bytes=10-"),
            ..DownloadConditions::default()
        };
        let resp = build_attachment_response(attachment(b"a\n1\n"), &conditions);
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(resp.headers()["Content-Range"], "bytes */4");
    }

    #[tokio::test]
    async fn test_not_modified() {
        let etag = cache::generate_etag(b"a\n1\n");
        let conditions = DownloadConditions {
            if_none_match: Some(&etag),
            ..DownloadConditions::default()
        };
        let resp = build_attachment_response(attachment(b"a\n1\n"), &conditions);
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
        assert!(body_of(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_head_keeps_length_without_body() {
        let conditions = DownloadConditions {
            is_head: true,
            ..DownloadConditions::default()
        };
        let resp = build_attachment_response(attachment(b"a\n1\n"), &conditions);
        assert_eq!(resp.headers()["Content-Length"], "4");
        assert!(body_of(resp).await.is_empty());
    }

    #[test]
    fn test_options_cors_headers() {
        let resp = build_options_response(true);
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));
        assert!(!build_options_response(false)
            .headers()
            .contains_key("Access-Control-Allow-Methods"));
    }
}
