//! Syncroom Core - shared listening rooms with synchronized playback.
//!
//! Listeners join a room by code and hear the same track at the same position.
//! The server owns each room's playback timeline; clients receive snapshots
//! and reconcile their local players against them.
//!
//! # Architecture
//!
//! - [`playback`]: Playback state and the reducer that applies control intents
//! - [`rooms`]: Room codes, membership, host handover and the room registry
//! - [`sync`]: Server snapshots and the client-side reconciler
//! - [`services`]: Room coordination, media library and downloads
//! - [`events`]: Event system for real-time client communication
//! - [`api`]: HTTP routes and the WebSocket protocol
//! - [`state`]: Service configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`Clock`](utils::Clock): Server time, replaceable in tests
//! - [`FetchTool`](services::FetchTool): The external song download tool

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod playback;
pub mod protocol_constants;
pub mod rooms;
pub mod runtime;
pub mod services;
pub mod state;
pub mod sync;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{ErrorCode, SyncroomError, SyncroomResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, DownloadEvent, EventEmitter, LoggingEventEmitter,
    RoomEvent,
};
pub use playback::{Intent, PlaybackError, PlaybackState, Track, Transition};
pub use rooms::{RoomCode, RoomError, RoomRegistry, RoomSummary};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, DownloadConfig};
pub use sync::{Reconciler, Snapshot};
pub use utils::{now_millis, Clock, ManualClock, SystemClock};

// Re-export service types
pub use services::{
    CommandFetchTool, DownloadRecord, DownloadService, DownloadStatus, FetchTool, MediaLibrary,
    RoomService,
};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, bootstrap_services_with, BootstrappedServices};

// Re-export API types
pub use api::{serve, start_server, AppState, ServerError, WsConnectionManager};
