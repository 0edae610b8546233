#![deny(unsafe_code)]

//! Scroll position management for a bidirectionally growing chat timeline.
//!
//! Live messages arrive at the tail while older history is paginated in at the
//! head. [`ScrollbackController`] keeps the rows under the reader's eye stable
//! across those inserts, follows the tail only when the reader is already there,
//! and serializes every programmatic scroll through a per-frame queue.
//!
//! The controller is single-threaded: drive it from a tokio `LocalSet`.

pub mod cache;
pub mod config;
pub mod controller;
pub mod corrector;
pub mod error;
pub mod events;
pub mod frame_queue;
pub mod history;
pub mod ids;
pub mod merge;
pub mod message;
pub mod pagination;
pub mod presenter;
/// In-memory viewport and history provider for headless hosts and tests.
pub mod sim;
pub mod viewport;

pub use cache::{CacheKey, DEFAULT_CACHE_CAPACITY, RenderCache};
pub use config::{ConfigError, ScrollbackConfig};
pub use controller::{LoadOutcome, ScrollbackController};
pub use corrector::{AnchorSnapshot, Correction, apply_correction};
pub use error::{ControllerError, ControllerResult, IdError, IdResult};
pub use events::ControllerEvent;
pub use frame_queue::{DEFAULT_FRAME_INTERVAL_MS, FrameQueue};
pub use history::{HistoryError, HistoryPage, HistoryProvider, HistoryResult};
pub use ids::{MessageId, UserId};
pub use merge::{merge, should_scroll_to_bottom};
pub use message::{FileAttachment, Message, MessageKind, Sender, StreamingMessageSet};
pub use pagination::{
    LoadPhase, LoadTransition, LoadTransitionRejection, LoadWindowState, PaginationCoordinator,
};
pub use presenter::{MessagePresenter, PresentProps};
pub use viewport::{
    Debouncer, ScrollBehavior, ViewportGeometry, ViewportHandle, ViewportInfo, ViewportMonitor,
    ViewportThresholds,
};
