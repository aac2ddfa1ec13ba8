//! Playback state machine.
//!
//! [`PlaybackState`] is the per-room timeline and [`reducer::apply`] the only
//! way to change it.

pub mod reducer;
pub mod state;

use thiserror::Error;

pub use reducer::{apply, index_from_number, Intent, Transition};
pub use state::{PlaybackState, Track};

/// Rejections of a playback intent. The state is never modified when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    /// Track selection outside the playlist.
    #[error("Invalid track index: {0}")]
    InvalidIndex(String),

    /// Seek target that is not a finite number.
    #[error("Invalid seek position: {0}")]
    InvalidPosition(String),

    /// Transport operation on a room without tracks.
    #[error("The playlist is empty")]
    EmptyPlaylist,
}
