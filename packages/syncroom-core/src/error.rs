//! Centralized error types for the syncroom core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::playback::PlaybackError;
use crate::rooms::RoomError;
use crate::services::download::DownloadError;
use crate::services::library::LibraryError;

/// Trait for error types that provide machine-readable error codes.
///
/// Room and playback codes are part of the WebSocket protocol
/// (`room:error{code}`); clients switch on them.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for PlaybackError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidIndex(_) => "invalid_index",
            Self::InvalidPosition(_) => "invalid_position",
            Self::EmptyPlaylist => "empty_playlist",
        }
    }
}

impl ErrorCode for RoomError {
    fn code(&self) -> &'static str {
        match self {
            Self::RoomAlreadyExists(_) => "room_already_exists",
            Self::RoomNotFound(_) => "room_not_found",
            Self::RoomGone(_) => "room_gone",
            Self::InvalidRoomCode(_) => "invalid_room_code",
            Self::Unauthorized => "unauthorized",
            Self::Playback(e) => e.code(),
        }
    }
}

impl ErrorCode for LibraryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "library_io_error",
            Self::Manifest(_) => "manifest_invalid",
            Self::Join(_) => "internal_error",
        }
    }
}

impl ErrorCode for DownloadError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "invalid_request",
            Self::Spawn(_) => "download_spawn_failed",
            Self::ToolFailed(_) => "download_failed",
            Self::Io(_) => "download_io_error",
        }
    }
}

/// Application-wide error type for the HTTP API.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum SyncroomError {
    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Media library scan or manifest failure.
    #[error("Library error: {0}")]
    Library(String),

    /// Download job could not be started.
    #[error("Download error: {0}")]
    Download(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Server configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SyncroomError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::Library(_) => "library_error",
            Self::Download(_) => "download_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type SyncroomResult<T> = Result<T, SyncroomError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SyncroomError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<LibraryError> for SyncroomError {
    fn from(err: LibraryError) -> Self {
        Self::Library(err.to_string())
    }
}

impl From<DownloadError> for SyncroomError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::EmptyQuery => Self::InvalidRequest(err.to_string()),
            other => Self::Download(other.to_string()),
        }
    }
}
