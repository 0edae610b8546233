use crate::viewport::{ScrollBehavior, ViewportGeometry, ViewportHandle};

/// Geometry captured right before older history is requested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorSnapshot {
    pub height_before: f32,
    pub offset_before: f32,
}

impl AnchorSnapshot {
    pub fn capture(geometry: &ViewportGeometry) -> Self {
        Self {
            height_before: geometry.content_extent,
            offset_before: geometry.scroll_offset,
        }
    }

    /// Offset that keeps the previously visible rows under the user's eye.
    pub fn corrected_offset(&self, content_extent_after: f32) -> f32 {
        self.offset_before + (content_extent_after - self.height_before)
    }
}

/// Result of one anchor restoration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub delta: f32,
    pub offset: f32,
    pub behavior: ScrollBehavior,
}

/// Restores the anchor on `viewport`; `None` when the viewport is already gone.
pub fn apply_correction(
    anchor: &AnchorSnapshot,
    viewport: &dyn ViewportHandle,
    behavior: ScrollBehavior,
) -> Option<Correction> {
    let geometry = viewport.geometry()?;
    let offset = anchor.corrected_offset(geometry.content_extent);

    match behavior {
        ScrollBehavior::Immediate => viewport.set_offset(offset),
        ScrollBehavior::Smooth => viewport.scroll_to(offset, ScrollBehavior::Smooth),
    }

    let correction = Correction {
        delta: geometry.content_extent - anchor.height_before,
        offset,
        behavior,
    };
    tracing::debug!(
        height_before = anchor.height_before,
        height_after = geometry.content_extent,
        offset_before = anchor.offset_before,
        offset,
        ?behavior,
        "scroll anchor restored"
    );
    Some(correction)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::sim::{SimulatedViewport, ViewportCommand};

    #[test]
    fn prepended_height_shifts_the_offset() {
        let anchor = AnchorSnapshot::capture(&ViewportGeometry::new(50.0, 1_000.0, 500.0));

        assert_eq!(anchor.corrected_offset(1_400.0), 450.0);
        assert_eq!(anchor.corrected_offset(1_000.0), 50.0);
    }

    #[test]
    fn immediate_and_smooth_modes_use_distinct_commands() {
        let viewport = SimulatedViewport::new(500.0);
        viewport.set_content_extent(1_000.0);
        viewport.set_offset(50.0);
        let anchor = AnchorSnapshot::capture(&viewport.geometry().unwrap());
        viewport.set_content_extent(1_400.0);
        viewport.clear_commands();

        let immediate = apply_correction(&anchor, &viewport, ScrollBehavior::Immediate).unwrap();
        assert_eq!(immediate.offset, 450.0);
        assert_eq!(immediate.delta, 400.0);

        let smooth = apply_correction(&anchor, &viewport, ScrollBehavior::Smooth).unwrap();
        assert_eq!(smooth.offset, 450.0);

        assert_eq!(
            viewport.commands(),
            vec![
                ViewportCommand::SetOffset(450.0),
                ViewportCommand::ScrollTo(450.0, ScrollBehavior::Smooth),
            ]
        );
        assert_eq!(viewport.geometry().unwrap().scroll_offset, 450.0);
    }

    #[test]
    fn detached_viewport_skips_correction() {
        let viewport = SimulatedViewport::new(500.0);
        let anchor = AnchorSnapshot {
            height_before: 1_000.0,
            offset_before: 0.0,
        };
        viewport.detach();

        assert_eq!(apply_correction(&anchor, &viewport, ScrollBehavior::Immediate), None);
        assert!(viewport.commands().is_empty());
    }
}
