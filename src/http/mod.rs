//! HTTP protocol layer module
//!
//! Protocol helpers shared by the API handlers, decoupled from the
//! endpoints themselves.

pub mod cache;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use response::{
    build_attachment_response, build_options_response, Attachment, DownloadConditions,
};
