//! Application services layer.
//!
//! This module contains the business logic services that orchestrate
//! between the API layer and the domain modules (rooms/, playback/).

pub mod download;
pub mod library;
pub mod room_service;

pub use download::{
    CommandFetchTool, DownloadRecord, DownloadService, DownloadStatus, FetchTool,
};
pub use library::{LibraryError, MediaLibrary};
pub use room_service::RoomService;
