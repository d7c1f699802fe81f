// API module entry
// Routes the five data endpoints and wraps them with body limits,
// common headers and access logging

mod error;
mod handlers;
mod response;
mod types;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, SERVER};
use hyper::{Method, Request, Response};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::config::AppState;
use crate::http;
use crate::logger::{self, AccessLogEntry};

pub use error::ApiError;

const ALLOW_GET: &str = "GET, HEAD, OPTIONS";
const ALLOW_POST: &str = "POST, OPTIONS";

/// Connection-level entry point: reads the body, dispatches, decorates
pub async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let mut entry = access_entry(&req, peer_addr);

    let mut response = match read_body(req, state.config.http.max_body_size).await {
        Ok(req) => dispatch(&req, &state).await,
        Err(e) => e.into_response(),
    };
    apply_common_headers(&mut response, &state);

    if state.config.logging.access_log {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Route an already-buffered request to its handler
pub async fn dispatch(req: &Request<Bytes>, state: &AppState) -> Response<Full<Bytes>> {
    let method = req.method();
    let path = req.uri().path();

    if method == Method::OPTIONS {
        return http::build_options_response(state.config.http.enable_cors);
    }

    let result = match (method, path) {
        (&Method::GET | &Method::HEAD, "/api/status") => handlers::handle_status(state).await,
        (&Method::GET | &Method::HEAD, "/api/health") => handlers::handle_health(state).await,
        (&Method::POST, "/api/upload_data") => handlers::handle_upload(req.body(), state).await,
        (&Method::POST, "/api/process_zip") => handlers::handle_process_zip(req.body(), state).await,
        (&Method::GET | &Method::HEAD, p) if p.starts_with(handlers::DOWNLOAD_PREFIX) => {
            let file_name = &p[handlers::DOWNLOAD_PREFIX.len()..];
            handlers::handle_download(file_name, req.headers(), method == Method::HEAD, state)
                .await
        }
        (_, "/api/status" | "/api/health") => Err(ApiError::MethodNotAllowed(ALLOW_GET)),
        (_, "/api/upload_data" | "/api/process_zip") => Err(ApiError::MethodNotAllowed(ALLOW_POST)),
        (_, p) if p.starts_with(handlers::DOWNLOAD_PREFIX) => {
            Err(ApiError::MethodNotAllowed(ALLOW_GET))
        }
        _ => Err(ApiError::NotFound("Not Found".to_string())),
    };

    let response = result.unwrap_or_else(ApiError::into_response);
    logger::log_api_request(method.as_str(), path, response.status().as_u16());
    response
}

/// Buffer the request body, enforcing `http.max_body_size`
async fn read_body(
    req: Request<hyper::body::Incoming>,
    max_body_size: u64,
) -> Result<Request<Bytes>, ApiError> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|size| size > max_body_size) {
        logger::log_warning(&format!(
            "Request body too large: {} bytes (max: {max_body_size})",
            declared.unwrap_or_default()
        ));
        return Err(ApiError::PayloadTooLarge);
    }

    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let (parts, body) = req.into_parts();
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!("Request body exceeded {max_body_size} bytes"));
            return Err(ApiError::PayloadTooLarge);
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            return Err(ApiError::bad_request("Failed to read request body"));
        }
    };

    Ok(Request::from_parts(parts, bytes))
}

fn access_entry<B>(req: &Request<B>, peer_addr: SocketAddr) -> AccessLogEntry {
    let header = |name: hyper::header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let mut entry = AccessLogEntry::new(
        peer_addr.ip().to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.query = req.uri().query().map(ToString::to_string);
    entry.http_version = match req.version() {
        hyper::Version::HTTP_10 => "1.0".to_string(),
        hyper::Version::HTTP_2 => "2".to_string(),
        _ => "1.1".to_string(),
    };
    entry.referer = header(hyper::header::REFERER);
    entry.user_agent = header(hyper::header::USER_AGENT);
    entry
}

fn apply_common_headers(response: &mut Response<Full<Bytes>>, state: &AppState) {
    let headers = response.headers_mut();
    if let Ok(server) = HeaderValue::from_str(&state.config.http.server_name) {
        headers.insert(SERVER, server);
    }
    if state.config.http.enable_cors {
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::storage::FileStore;
    use hyper::StatusCode;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        state: AppState,
    }

    async fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let mut config = Config::load_from("no-such-config-file").unwrap();
        config.storage.base_dir = dir.path().to_path_buf();
        let store = FileStore::open(&config.storage).await.unwrap();
        Harness {
            state: AppState::new(config, Arc::new(store)),
            _dir: dir,
        }
    }

    impl Harness {
        fn dataset_path(&self) -> std::path::PathBuf {
            self.state.config.storage.dataset_path().join("combined.csv")
        }

        async fn call(&self, method: Method, uri: &str, body: &str) -> Response<Full<Bytes>> {
            self.call_with(Request::builder().method(method).uri(uri), body)
                .await
        }

        async fn call_with(
            &self,
            builder: hyper::http::request::Builder,
            body: &str,
        ) -> Response<Full<Bytes>> {
            let req = builder.body(Bytes::from(body.to_string())).unwrap();
            dispatch(&req, &self.state).await
        }

        async fn json(&self, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
            let resp = self.call(method, uri, body).await;
            let status = resp.status();
            let bytes = body_bytes(resp).await;
            (status, serde_json::from_slice(&bytes).unwrap())
        }
    }

    async fn body_bytes(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_status_without_dataset_is_not_ready() {
        let h = harness().await;
        let (status, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["message"], "No data available");
        assert!(body.get("record_count").is_none());
    }

    #[tokio::test]
    async fn test_status_with_valid_dataset_reports_rows() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "store,price\nA,1\nB,2\nC,3\n").unwrap();
        let (status, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
        assert_eq!(body["record_count"], 3);
        assert!(body["last_updated"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn test_status_with_corrupt_dataset_is_error() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "a,b\n1,2\n1,2,3,4\n").unwrap();
        let (status, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Data file corrupted: "));
    }

    #[tokio::test]
    async fn test_status_with_unclosed_quote_is_error() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "a,b\n\"x,1\n").unwrap();
        let (status, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("EOF inside string"));
    }

    #[tokio::test]
    async fn test_status_with_empty_dataset_file_is_error() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "").unwrap();
        let (_, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_upload_then_status_counts_rows() {
        let h = harness().await;
        let (status, body) = h
            .json(
                Method::POST,
                "/api/upload_data",
                r#"{"csv_data":[{"a":1},{"a":2}]}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = h.json(Method::GET, "/api/status", "").await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["record_count"], 2);
    }

    #[tokio::test]
    async fn test_upload_user_snapshot() {
        let h = harness().await;
        let (status, _) = h
            .json(
                Method::POST,
                "/api/upload_data",
                r#"{"user_data":[{"deal":"x"}],"user_id":123456789}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let snapshot = h
            .state
            .config
            .storage
            .user_path()
            .join("user_123456789.csv");
        assert_eq!(std::fs::read_to_string(snapshot).unwrap(), "deal\nx\n");
        // Dataset untouched
        assert!(!h.dataset_path().exists());
    }

    #[tokio::test]
    async fn test_upload_user_snapshot_defaults_to_unknown() {
        let h = harness().await;
        h.json(Method::POST, "/api/upload_data", r#"{"user_data":[{"deal":"x"}]}"#)
            .await;
        assert!(h
            .state
            .config
            .storage
            .user_path()
            .join("user_unknown.csv")
            .exists());
    }

    #[tokio::test]
    async fn test_upload_skips_empty_user_data() {
        let h = harness().await;
        let (status, _) = h
            .json(
                Method::POST,
                "/api/upload_data",
                r#"{"user_data":[],"user_id":"7"}"#,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!h.state.config.storage.user_path().join("user_7.csv").exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_unsafe_user_id_without_writing() {
        let h = harness().await;
        let (status, _) = h
            .json(
                Method::POST,
                "/api/upload_data",
                r#"{"csv_data":[{"a":1}],"user_data":[{"a":1}],"user_id":"../../x"}"#,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!h.dataset_path().exists());
    }

    #[tokio::test]
    async fn test_upload_rejects_malformed_json() {
        let h = harness().await;
        let (status, body) = h.json(Method::POST, "/api/upload_data", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_export_without_dataset_is_bad_request() {
        let h = harness().await;
        let (status, body) = h
            .json(Method::POST, "/api/process_zip", r#"{"zip_code":"90210"}"#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("No deal data available"));
    }

    #[tokio::test]
    async fn test_export_with_header_only_dataset_is_bad_request() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "a,b\n").unwrap();
        let (status, body) = h
            .json(Method::POST, "/api/process_zip", r#"{"zip_code":"90210"}"#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No deal data available");
    }

    #[tokio::test]
    async fn test_export_with_corrupt_dataset_hides_detail() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "").unwrap();
        let (status, body) = h
            .json(Method::POST, "/api/process_zip", r#"{"zip_code":"90210"}"#)
            .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_export_requires_safe_zip_code() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "a\n1\n").unwrap();
        for body in [r"{}", r#"{"zip_code":""}"#, r#"{"zip_code":"../../etc"}"#] {
            let (status, _) = h.json(Method::POST, "/api/process_zip", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body}");
        }
    }

    #[tokio::test]
    async fn test_export_then_download_is_byte_identical() {
        let h = harness().await;
        let dataset = "store,title\nA,\"2 for 1, today\"\nB,half off\r\n";
        std::fs::write(h.dataset_path(), dataset).unwrap();

        let (status, body) = h
            .json(Method::POST, "/api/process_zip", r#"{"zip_code":90210}"#)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["deal_count"], 2);
        assert_eq!(body["message"], "Found 2 deals for ZIP code 90210");

        let filename = body["filename"].as_str().unwrap();
        let stamp = filename
            .strip_prefix("deals_90210_")
            .and_then(|rest| rest.strip_suffix(".csv"))
            .unwrap();
        assert_eq!(stamp.len(), 15);
        assert_eq!(stamp.as_bytes()[8], b'_');
        assert!(stamp
            .bytes()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit()));
        assert_eq!(body["download_url"], format!("/api/download/{filename}"));

        let resp = h
            .call(Method::GET, body["download_url"].as_str().unwrap(), "")
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()["Content-Disposition"],
            format!("attachment; filename=\"{filename}\"").as_str()
        );
        assert_eq!(body_bytes(resp).await, dataset);
    }

    #[tokio::test]
    async fn test_download_missing_file_is_not_found() {
        let h = harness().await;
        let (status, body) = h
            .json(Method::GET, "/api/download/deals_1_20240101_000000.csv", "")
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "File not found"}));
    }

    #[tokio::test]
    async fn test_download_blocks_traversal() {
        let h = harness().await;
        std::fs::write(h.dataset_path(), "secret\n1\n").unwrap();
        for uri in [
            "/api/download/../csv/combined.csv",
            "/api/download/..%2Fcsv%2Fcombined.csv",
            "/api/download/",
        ] {
            let (status, body) = h.json(Method::GET, uri, "").await;
            assert_eq!(status, StatusCode::NOT_FOUND, "uri {uri}");
            assert_eq!(body["error"], "File not found");
        }
    }

    #[tokio::test]
    async fn test_download_range_request() {
        let h = harness().await;
        let name = "deals_5_20240101_000000.csv";
        std::fs::write(h.state.config.storage.user_path().join(name), "a\n1\n2\n").unwrap();
        let resp = h
            .call_with(
                Request::builder()
                    .uri(format!("/api/download/{name}"))
                    .header("Range", "bytes=2-"),
                "",
            )
            .await;
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(body_bytes(resp).await, "1\n2\n");
    }

    #[tokio::test]
    async fn test_health_reports_directories() {
        let h = harness().await;
        let (status, body) = h.json(Method::GET, "/api/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
        assert_eq!(
            body["directories"],
            json!({"csv": true, "user_csv": true, "temp_images": true})
        );
    }

    #[tokio::test]
    async fn test_unknown_path_and_wrong_method() {
        let h = harness().await;
        let (status, body) = h.json(Method::GET, "/api/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");

        let resp = h.call(Method::GET, "/api/upload_data", "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers()["Allow"], ALLOW_POST);

        let resp = h.call(Method::DELETE, "/api/download/x.csv", "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let h = harness().await;
        let resp = h.call(Method::OPTIONS, "/api/process_zip", "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_common_headers() {
        let mut h = harness().await;
        h.state.config.http.enable_cors = true;
        let mut resp = h.call(Method::GET, "/api/health", "").await;
        apply_common_headers(&mut resp, &h.state);
        assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
        assert_eq!(resp.headers()["Server"], "deal-export-server");
    }
}
