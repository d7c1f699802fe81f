// API request/response types

use serde::{Deserialize, Serialize};

use crate::storage::{DirectoryStatus, Row};

/// Identifier that producers send either as a string or as a bare number
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl IdValue {
    pub fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// `POST /api/upload_data`
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    #[serde(default)]
    pub csv_data: Option<Vec<Row>>,
    #[serde(default)]
    pub user_data: Option<Vec<Row>>,
    #[serde(default)]
    pub user_id: Option<IdValue>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
}

/// `POST /api/process_zip`
#[derive(Debug, Deserialize)]
pub struct ProcessZipRequest {
    #[serde(default)]
    pub zip_code: Option<IdValue>,
}

#[derive(Debug, Serialize)]
pub struct ProcessZipResponse {
    pub success: bool,
    pub message: String,
    pub filename: String,
    pub deal_count: usize,
    pub download_url: String,
}

/// `GET /api/status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl StatusResponse {
    pub fn not_ready() -> Self {
        Self {
            status: "not_ready",
            message: "No data available".to_string(),
            record_count: None,
            last_updated: None,
        }
    }

    pub fn ready(record_count: usize, last_updated: String) -> Self {
        Self {
            status: "ready",
            message: "Data available".to_string(),
            record_count: Some(record_count),
            last_updated: Some(last_updated),
        }
    }

    pub fn corrupted(reason: &str) -> Self {
        Self {
            status: "error",
            message: format!("Data file corrupted: {reason}"),
            record_count: None,
            last_updated: None,
        }
    }
}

/// `GET /api/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub directories: DirectoriesBody,
}

#[derive(Debug, Serialize)]
pub struct DirectoriesBody {
    pub csv: bool,
    pub user_csv: bool,
    pub temp_images: bool,
}

impl From<DirectoryStatus> for DirectoriesBody {
    fn from(status: DirectoryStatus) -> Self {
        Self {
            csv: status.csv,
            user_csv: status.user_csv,
            temp_images: status.temp_images,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
