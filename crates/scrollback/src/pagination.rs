use std::fmt;

use crate::corrector::AnchorSnapshot;
use crate::viewport::{ViewportGeometry, ViewportInfo};

/// Lifecycle of one "load older history" cycle.
///
/// The anchor lives inside the phases that need it, so a restoration without a
/// captured anchor cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadWindowState {
    #[default]
    Idle,
    Saving,
    Loading(AnchorSnapshot),
    Restoring(AnchorSnapshot),
}

/// Field-less mirror of [`LoadWindowState`] for logs and rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPhase {
    Idle,
    Saving,
    Loading,
    Restoring,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Saving => "saving",
            Self::Loading => "loading",
            Self::Restoring => "restoring",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadTransition {
    Begin,
    Capture(AnchorSnapshot),
    Fetched,
    Settle,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTransitionRejection {
    /// Another cycle already left `Idle`.
    AlreadyInFlight { active: LoadPhase },
    OutOfOrder {
        from: LoadPhase,
        attempted: &'static str,
    },
}

pub type LoadTransitionResult = Result<LoadWindowState, LoadTransitionRejection>;

impl LoadWindowState {
    pub fn phase(&self) -> LoadPhase {
        match self {
            Self::Idle => LoadPhase::Idle,
            Self::Saving => LoadPhase::Saving,
            Self::Loading(_) => LoadPhase::Loading,
            Self::Restoring(_) => LoadPhase::Restoring,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True for every phase of an in-flight cycle.
    pub fn suppresses_follow(&self) -> bool {
        !self.is_idle()
    }

    pub fn anchor(&self) -> Option<AnchorSnapshot> {
        match self {
            Self::Loading(anchor) | Self::Restoring(anchor) => Some(*anchor),
            Self::Idle | Self::Saving => None,
        }
    }

    pub fn apply(&self, transition: LoadTransition) -> LoadTransitionResult {
        match (self, transition) {
            (Self::Idle, LoadTransition::Begin) => Ok(Self::Saving),
            (active, LoadTransition::Begin) => Err(LoadTransitionRejection::AlreadyInFlight {
                active: active.phase(),
            }),
            (Self::Saving, LoadTransition::Capture(anchor)) => Ok(Self::Loading(anchor)),
            (Self::Loading(anchor), LoadTransition::Fetched) => Ok(Self::Restoring(*anchor)),
            (Self::Restoring(_), LoadTransition::Settle) => Ok(Self::Idle),
            (_, LoadTransition::Reset) => Ok(Self::Idle),
            (from, transition) => Err(LoadTransitionRejection::OutOfOrder {
                from: from.phase(),
                attempted: transition.label(),
            }),
        }
    }
}

impl LoadTransition {
    fn label(&self) -> &'static str {
        match self {
            Self::Begin => "begin",
            Self::Capture(_) => "capture",
            Self::Fetched => "fetched",
            Self::Settle => "settle",
            Self::Reset => "reset",
        }
    }
}

/// Owns the load window state plus the provider's `has_more` hint.
#[derive(Debug, Clone)]
pub struct PaginationCoordinator {
    state: LoadWindowState,
    has_more: bool,
}

impl Default for PaginationCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PaginationCoordinator {
    pub fn new() -> Self {
        Self {
            state: LoadWindowState::Idle,
            has_more: true,
        }
    }

    pub fn state(&self) -> LoadWindowState {
        self.state
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn set_has_more(&mut self, has_more: bool) {
        self.has_more = has_more;
    }

    pub fn should_trigger(&self, info: &ViewportInfo) -> bool {
        info.is_at_top && self.has_more && self.state.is_idle()
    }

    /// `Idle -> Saving -> Loading`, capturing the anchor before any await point.
    ///
    /// Returns false without side effects when a cycle is already in flight.
    pub fn start(&mut self, geometry: &ViewportGeometry) -> bool {
        let saving = match self.state.apply(LoadTransition::Begin) {
            Ok(next) => next,
            Err(rejection) => {
                tracing::debug!(?rejection, "older-history load rejected");
                return false;
            }
        };
        let anchor = AnchorSnapshot::capture(geometry);
        match saving.apply(LoadTransition::Capture(anchor)) {
            Ok(loading) => {
                self.state = loading;
                tracing::debug!(?anchor, "older-history load started");
                true
            }
            Err(rejection) => {
                tracing::warn!(?rejection, "anchor capture rejected");
                false
            }
        }
    }

    /// `Loading -> Restoring`; returns the anchor to restore.
    pub fn fetched(&mut self, has_more: bool) -> Option<AnchorSnapshot> {
        self.has_more = has_more;
        self.transition(LoadTransition::Fetched)
            .and_then(|state| state.anchor())
    }

    pub fn settle(&mut self) -> bool {
        self.transition(LoadTransition::Settle).is_some()
    }

    /// Drops any captured geometry and returns to `Idle`.
    pub fn reset(&mut self) {
        self.state = LoadWindowState::Idle;
    }

    fn transition(&mut self, transition: LoadTransition) -> Option<LoadWindowState> {
        match self.state.apply(transition) {
            Ok(next) => {
                tracing::debug!(from = %self.state.phase(), to = %next.phase(), "load window transition");
                self.state = next;
                Some(next)
            }
            Err(rejection) => {
                tracing::debug!(?rejection, "load window transition rejected");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn top_geometry() -> ViewportGeometry {
        ViewportGeometry::new(10.0, 1_000.0, 500.0)
    }

    #[test]
    fn second_start_is_rejected_without_effect() {
        let mut coordinator = PaginationCoordinator::new();

        assert!(coordinator.start(&top_geometry()));
        let after_first = coordinator.state();
        assert!(!coordinator.start(&ViewportGeometry::new(0.0, 9_999.0, 500.0)));

        assert_eq!(coordinator.state(), after_first);
        assert_eq!(
            after_first.anchor(),
            Some(AnchorSnapshot {
                height_before: 1_000.0,
                offset_before: 10.0,
            })
        );
    }

    #[test]
    fn full_cycle_returns_to_idle() {
        let mut coordinator = PaginationCoordinator::new();
        assert!(coordinator.start(&top_geometry()));
        assert_eq!(coordinator.state().phase(), LoadPhase::Loading);

        let anchor = coordinator.fetched(false).expect("anchor survives fetch");
        assert_eq!(anchor.offset_before, 10.0);
        assert_eq!(coordinator.state().phase(), LoadPhase::Restoring);
        assert!(!coordinator.has_more());

        assert!(coordinator.settle());
        assert_eq!(coordinator.state(), LoadWindowState::Idle);
        assert!(!coordinator.settle());
    }

    #[test]
    fn out_of_order_transitions_are_rejected() {
        let anchor = AnchorSnapshot::capture(&top_geometry());

        assert_eq!(
            LoadWindowState::Idle.apply(LoadTransition::Fetched),
            Err(LoadTransitionRejection::OutOfOrder {
                from: LoadPhase::Idle,
                attempted: "fetched",
            })
        );
        assert_eq!(
            LoadWindowState::Loading(anchor).apply(LoadTransition::Begin),
            Err(LoadTransitionRejection::AlreadyInFlight {
                active: LoadPhase::Loading,
            })
        );
        assert_eq!(
            LoadWindowState::Restoring(anchor).apply(LoadTransition::Reset),
            Ok(LoadWindowState::Idle)
        );
    }

    #[test]
    fn trigger_requires_top_more_history_and_idle() {
        let mut coordinator = PaginationCoordinator::new();
        let at_top = ViewportInfo {
            is_at_top: true,
            is_at_bottom: false,
            geometry: top_geometry(),
        };
        let mid = ViewportInfo {
            is_at_top: false,
            ..at_top
        };

        assert!(coordinator.should_trigger(&at_top));
        assert!(!coordinator.should_trigger(&mid));

        coordinator.set_has_more(false);
        assert!(!coordinator.should_trigger(&at_top));

        coordinator.set_has_more(true);
        assert!(coordinator.start(&at_top.geometry));
        assert!(!coordinator.should_trigger(&at_top));

        coordinator.reset();
        assert!(coordinator.should_trigger(&at_top));
    }
}
