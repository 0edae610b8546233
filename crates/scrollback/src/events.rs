use crate::corrector::Correction;
use crate::viewport::{ScrollBehavior, ViewportInfo};

/// Notifications emitted by the controller for the hosting chat surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// Trailing-edge result of a burst of scroll events.
    ViewportChanged(ViewportInfo),
    LoadStarted,
    /// Older messages were merged in; the host should lay them out and then
    /// call `frame_rendered`. Empty pages are not announced.
    HistoryPrepended { count: usize, has_more: bool },
    ScrollRestored(Correction),
    /// The provider rejected the request; the reason is meant for display.
    LoadFailed { reason: String },
    FollowedBottom { behavior: ScrollBehavior },
}
