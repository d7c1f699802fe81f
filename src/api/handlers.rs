// Endpoint handlers
// Each handler reads or writes through the `DataStore` and returns JSON,
// except downloads which return the stored file as an attachment.

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{IF_NONE_MATCH, RANGE};
use hyper::{HeaderMap, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::path::Path;

use super::error::ApiError;
use super::response::json_response;
use super::types::{
    HealthResponse, ProcessZipRequest, ProcessZipResponse, StatusResponse, UploadRequest,
    UploadResponse,
};
use crate::config::AppState;
use crate::http::{self, mime, Attachment, DownloadConditions};
use crate::logger;
use crate::storage::{self, table, StoreError};

pub const DOWNLOAD_PREFIX: &str = "/api/download/";

const NO_DATASET: &str = "No deal data available. Please wait for Discord bot to process data.";
const EMPTY_DATASET: &str = "No deal data available";
const FILE_NOT_FOUND: &str = "File not found";
const UNKNOWN_USER: &str = "unknown";

type ApiResult = Result<Response<Full<Bytes>>, ApiError>;

/// `GET /api/status`
pub async fn handle_status(state: &AppState) -> ApiResult {
    let body = match state.store.get_dataset().await? {
        None => StatusResponse::not_ready(),
        Some(file) => match table::summarize(&file.data) {
            Ok(summary) => StatusResponse::ready(
                summary.rows,
                isoformat(DateTime::<Local>::from(file.modified).naive_local()),
            ),
            Err(reason) => {
                logger::log_warning(&format!("Dataset unreadable: {reason}"));
                StatusResponse::corrupted(&reason)
            }
        },
    };
    Ok(json_response(StatusCode::OK, &body))
}

/// `POST /api/upload_data`
pub async fn handle_upload(body: &[u8], state: &AppState) -> ApiResult {
    let request: UploadRequest = parse_json_object(body)?;

    let user_id = request
        .user_id
        .map_or_else(|| UNKNOWN_USER.to_string(), super::types::IdValue::into_string);
    let user_rows = request.user_data.filter(|rows| !rows.is_empty());

    // Reject before writing anything
    if user_rows.is_some() && !storage::is_safe_key(&user_id) {
        return Err(ApiError::bad_request(
            "user_id may only contain letters, digits, '-' and '_'",
        ));
    }

    if let Some(rows) = request.csv_data {
        let count = state.store.put_dataset(&rows).await?;
        logger::log_info(&format!("Saved CSV data with {count} records"));
    }

    if let Some(rows) = user_rows {
        let count = state.store.put_user_snapshot(&user_id, &rows).await?;
        logger::log_info(&format!("Saved user data for user {user_id} ({count} records)"));
    }

    Ok(json_response(
        StatusCode::OK,
        &UploadResponse {
            success: true,
            message: "Data uploaded successfully",
        },
    ))
}

/// `POST /api/process_zip`
pub async fn handle_process_zip(body: &[u8], state: &AppState) -> ApiResult {
    let request: ProcessZipRequest = parse_json_object(body)?;

    let zip_code = request
        .zip_code
        .map(super::types::IdValue::into_string)
        .filter(|z| !z.is_empty())
        .ok_or_else(|| ApiError::bad_request("zip_code is required"))?;
    if !storage::is_safe_key(&zip_code) {
        return Err(ApiError::bad_request(
            "zip_code may only contain letters, digits, '-' and '_'",
        ));
    }

    let Some(dataset) = state.store.get_dataset().await? else {
        return Err(ApiError::bad_request(NO_DATASET));
    };
    let summary = table::summarize(&dataset.data)
        .map_err(|reason| ApiError::Internal(format!("Dataset unreadable: {reason}")))?;
    if summary.rows == 0 {
        return Err(ApiError::bad_request(EMPTY_DATASET));
    }

    // Rows are not narrowed by ZIP code yet: the export is the whole dataset.
    let filename = export_file_name(&zip_code, Local::now().naive_local());
    state.store.put_export(&filename, dataset.data).await?;
    logger::log_info(&format!(
        "Exported {} deals ({} columns) for ZIP code {zip_code} to {filename}",
        summary.rows, summary.columns
    ));

    Ok(json_response(
        StatusCode::OK,
        &ProcessZipResponse {
            success: true,
            message: format!("Found {} deals for ZIP code {zip_code}", summary.rows),
            download_url: format!("{DOWNLOAD_PREFIX}{filename}"),
            filename,
            deal_count: summary.rows,
        },
    ))
}

/// `GET|HEAD /api/download/<filename>`
pub async fn handle_download(
    file_name: &str,
    headers: &HeaderMap,
    is_head: bool,
    state: &AppState,
) -> ApiResult {
    let stored = match state.store.get_export(file_name).await {
        Ok(Some(file)) => file,
        Ok(None) => return Err(ApiError::NotFound(FILE_NOT_FOUND.to_string())),
        Err(StoreError::InvalidName(name)) => {
            logger::log_warning(&format!("Rejected download of unsafe name: {name:?}"));
            return Err(ApiError::NotFound(FILE_NOT_FOUND.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let content_type =
        mime::get_content_type(Path::new(file_name).extension().and_then(OsStr::to_str));
    let conditions = DownloadConditions {
        if_none_match: headers.get(IF_NONE_MATCH).and_then(|v| v.to_str().ok()),
        range: headers.get(RANGE).and_then(|v| v.to_str().ok()),
        is_head,
    };

    Ok(http::build_attachment_response(
        Attachment {
            file_name,
            content_type,
            data: stored.data,
            modified: stored.modified,
        },
        &conditions,
    ))
}

/// `GET /api/health`
pub async fn handle_health(state: &AppState) -> ApiResult {
    let directories = state.store.directories().await;
    Ok(json_response(
        StatusCode::OK,
        &HealthResponse {
            status: "healthy",
            timestamp: isoformat(Local::now().naive_local()),
            directories: directories.into(),
        },
    ))
}

/// Parse a request body that must be a JSON object
fn parse_json_object<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Request body must be a JSON object"));
    }
    serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))
}

/// `deals_<zip>_<YYYYmmdd_HHMMSS>.csv`; same ZIP in the same second gives the same name
fn export_file_name(zip_code: &str, now: NaiveDateTime) -> String {
    format!("deals_{zip_code}_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

/// ISO-8601 local time, microseconds only when non-zero
fn isoformat(time: NaiveDateTime) -> String {
    let base = time.format("%Y-%m-%dT%H:%M:%S");
    match time.nanosecond() / 1_000 {
        0 => base.to_string(),
        micros => format!("{base}.{micros:06}"),
    }
}
