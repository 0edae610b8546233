//! In-memory collaborators for headless hosts and tests.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use futures::FutureExt as _;
use futures::future::LocalBoxFuture;

use crate::history::{HistoryError, HistoryPage, HistoryProvider, HistoryResult};
use crate::message::Message;
use crate::viewport::{ScrollBehavior, ViewportGeometry, ViewportHandle};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportCommand {
    SetOffset(f32),
    ScrollTo(f32, ScrollBehavior),
}

/// Scroll container with browser-like clamping; smooth scrolls land instantly.
#[derive(Debug)]
pub struct SimulatedViewport {
    scroll_offset: Cell<f32>,
    content_extent: Cell<f32>,
    visible_extent: f32,
    attached: Cell<bool>,
    commands: RefCell<Vec<ViewportCommand>>,
}

impl SimulatedViewport {
    pub fn new(visible_extent: f32) -> Self {
        Self {
            scroll_offset: Cell::new(0.0),
            content_extent: Cell::new(0.0),
            visible_extent,
            attached: Cell::new(true),
            commands: RefCell::new(Vec::new()),
        }
    }

    /// Changes content height; the offset only moves when it falls out of range.
    pub fn set_content_extent(&self, content_extent: f32) {
        self.content_extent.set(content_extent.max(0.0));
        self.clamp_and_set(self.scroll_offset.get());
    }

    pub fn layout_rows(&self, rows: usize, row_height: f32) {
        self.set_content_extent(rows as f32 * row_height);
    }

    /// Moves the offset the way a user's wheel or drag would, without logging a command.
    pub fn scroll_by_user(&self, offset: f32) {
        self.clamp_and_set(offset);
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll_offset.get()
    }

    pub fn detach(&self) {
        self.attached.set(false);
    }

    pub fn attach(&self) {
        self.attached.set(true);
    }

    pub fn commands(&self) -> Vec<ViewportCommand> {
        self.commands.borrow().clone()
    }

    pub fn clear_commands(&self) {
        self.commands.borrow_mut().clear();
    }

    fn max_offset(&self) -> f32 {
        (self.content_extent.get() - self.visible_extent).max(0.0)
    }

    fn clamp_and_set(&self, offset: f32) {
        self.scroll_offset.set(offset.clamp(0.0, self.max_offset()));
    }
}

impl ViewportHandle for SimulatedViewport {
    fn geometry(&self) -> Option<ViewportGeometry> {
        self.attached.get().then(|| {
            ViewportGeometry::new(
                self.scroll_offset.get(),
                self.content_extent.get(),
                self.visible_extent,
            )
        })
    }

    fn set_offset(&self, offset: f32) {
        if !self.attached.get() {
            return;
        }
        self.commands
            .borrow_mut()
            .push(ViewportCommand::SetOffset(offset));
        self.clamp_and_set(offset);
    }

    fn scroll_to(&self, offset: f32, behavior: ScrollBehavior) {
        if !self.attached.get() {
            return;
        }
        self.commands
            .borrow_mut()
            .push(ViewportCommand::ScrollTo(offset, behavior));
        self.clamp_and_set(offset);
    }
}

/// Serves an archive newest-page-first, like a room history endpoint.
#[derive(Debug)]
pub struct InMemoryHistory {
    archive: Vec<Message>,
    page_size: usize,
    latency: Option<Duration>,
    cursor: Cell<usize>,
    fail_next: RefCell<Option<String>>,
    fetch_calls: Cell<usize>,
}

impl InMemoryHistory {
    /// `archive` must be ordered oldest first.
    pub fn new(archive: Vec<Message>, page_size: usize) -> Self {
        let cursor = archive.len();
        Self {
            archive,
            page_size: page_size.max(1),
            latency: None,
            cursor: Cell::new(cursor),
            fail_next: RefCell::new(None),
            fetch_calls: Cell::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Hands out the newest `count` messages as the initially loaded window.
    pub fn take_latest(&self, count: usize) -> Vec<Message> {
        let end = self.cursor.get();
        let start = end.saturating_sub(count);
        self.cursor.set(start);
        self.archive[start..end].to_vec()
    }

    pub fn fail_next(&self, reason: impl Into<String>) {
        *self.fail_next.borrow_mut() = Some(reason.into());
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get()
    }
}

impl HistoryProvider for InMemoryHistory {
    fn fetch_older(&self) -> LocalBoxFuture<'_, HistoryResult<HistoryPage>> {
        async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.fetch_calls.set(self.fetch_calls.get() + 1);

            if let Some(reason) = self.fail_next.borrow_mut().take() {
                return Err(HistoryError::FetchRejected {
                    stage: "in-memory-fetch-older",
                    reason,
                });
            }

            let end = self.cursor.get();
            let start = end.saturating_sub(self.page_size);
            self.cursor.set(start);
            Ok(HistoryPage::new(self.archive[start..end].to_vec(), start > 0))
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ids::MessageId;
    use crate::message::MessageKind;

    fn archive(count: usize) -> Vec<Message> {
        (0..count)
            .map(|index| {
                Message::new(MessageId::new_v7(), MessageKind::User, format!("m{index}"))
                    .with_timestamp(Utc.timestamp_opt(index as i64, 0).unwrap())
            })
            .collect()
    }

    #[tokio::test]
    async fn pages_walk_backwards_until_exhausted() {
        let history = InMemoryHistory::new(archive(25), 10);
        let latest = history.take_latest(5);
        assert_eq!(latest.first().map(|m| m.content.as_str()), Some("m20"));

        let first = history.fetch_older().await.unwrap();
        assert_eq!(first.messages.len(), 10);
        assert_eq!(first.messages[0].content, "m10");
        assert!(first.has_more);

        let second = history.fetch_older().await.unwrap();
        assert_eq!(second.messages.len(), 10);
        assert!(!second.has_more);
        assert_eq!(history.remaining(), 0);
        assert_eq!(history.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let history = InMemoryHistory::new(archive(4), 2);
        history.fail_next("room history unavailable");

        let error = history.fetch_older().await.unwrap_err();
        assert_eq!(error.reason(), "room history unavailable");
        assert_eq!(history.remaining(), 4);

        assert_eq!(history.fetch_older().await.unwrap().messages.len(), 2);
    }

    #[test]
    fn offsets_clamp_to_scrollable_range() {
        let viewport = SimulatedViewport::new(400.0);
        viewport.layout_rows(10, 50.0);

        viewport.set_offset(900.0);
        assert_eq!(viewport.scroll_offset(), 100.0);

        viewport.scroll_by_user(-20.0);
        assert_eq!(viewport.scroll_offset(), 0.0);
        assert_eq!(viewport.commands(), vec![ViewportCommand::SetOffset(900.0)]);
    }
}
