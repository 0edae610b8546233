//! Scrollback controller: glues the monitor, pagination, corrector, frame queue
//! and render cache to one viewport.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use snafu::ResultExt;
use tokio::sync::{mpsc, oneshot, watch};

use crate::cache::{CacheKey, RenderCache};
use crate::config::ScrollbackConfig;
use crate::corrector::{AnchorSnapshot, Correction, apply_correction};
use crate::error::{ControllerResult, FetchFailedSnafu};
use crate::events::ControllerEvent;
use crate::frame_queue::FrameQueue;
use crate::history::HistoryProvider;
use crate::ids::UserId;
use crate::merge::{merge, should_scroll_to_bottom};
use crate::message::{Message, StreamingMessageSet};
use crate::pagination::{LoadWindowState, PaginationCoordinator};
use crate::presenter::{MessagePresenter, PresentProps};
use crate::viewport::{
    Debouncer, ScrollBehavior, ViewportHandle, ViewportInfo, ViewportMonitor,
};

/// How one call to [`ScrollbackController::load_older`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// A cycle was already in flight, or no viewport was mounted.
    Skipped,
    Loaded {
        fetched: usize,
        has_more: bool,
        correction: Option<Correction>,
    },
    /// The controller was torn down before the cycle finished.
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default)]
struct RenderSignal {
    generation: u64,
    closed: bool,
}

struct ViewState<V> {
    history: Vec<Message>,
    streaming: StreamingMessageSet,
    merged: Rc<[Message]>,
    monitor: ViewportMonitor,
    pagination: PaginationCoordinator,
    cache: RenderCache<V>,
    scroll_events_suppressed: bool,
    initial_scroll_done: bool,
}

impl<V> ViewState<V> {
    fn remerge(&mut self) {
        self.merged = merge(&self.history, &self.streaming).into();
    }
}

struct Inner<V> {
    config: ScrollbackConfig,
    current_user: Option<UserId>,
    history_provider: Rc<dyn HistoryProvider>,
    viewport: RefCell<Option<Rc<dyn ViewportHandle>>>,
    frames: FrameQueue,
    debouncer: RefCell<Debouncer>,
    state: RefCell<ViewState<V>>,
    render_signal: watch::Sender<RenderSignal>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    torn_down: Cell<bool>,
}

/// Per-viewport scrollback controller.
///
/// The controller is `!Send`: timers, the frame queue and background load
/// cycles are spawned with `tokio::task::spawn_local`, so it must be driven
/// from inside a `LocalSet`. No `RefCell` borrow is held across an await or
/// across a call into the viewport handle or the presenter.
pub struct ScrollbackController<V> {
    inner: Rc<Inner<V>>,
}

impl<V> Clone for ScrollbackController<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone + 'static> ScrollbackController<V> {
    pub fn new(
        config: ScrollbackConfig,
        history_provider: Rc<dyn HistoryProvider>,
        current_user: Option<UserId>,
    ) -> (Self, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (render_signal, _) = watch::channel(RenderSignal::default());
        let state = ViewState {
            history: Vec::new(),
            streaming: StreamingMessageSet::new(),
            merged: Rc::from(Vec::new()),
            monitor: ViewportMonitor::new(config.thresholds()),
            pagination: PaginationCoordinator::new(),
            cache: RenderCache::new(),
            scroll_events_suppressed: false,
            initial_scroll_done: false,
        };

        let inner = Inner {
            frames: FrameQueue::new(config.frame_interval()),
            debouncer: RefCell::new(Debouncer::new(config.debounce())),
            config,
            current_user,
            history_provider,
            viewport: RefCell::new(None),
            state: RefCell::new(state),
            render_signal,
            events,
            torn_down: Cell::new(false),
        };

        (
            Self {
                inner: Rc::new(inner),
            },
            events_rx,
        )
    }

    pub fn config(&self) -> &ScrollbackConfig {
        &self.inner.config
    }

    pub fn attach_viewport(&self, viewport: Rc<dyn ViewportHandle>) {
        if self.is_torn_down() {
            return;
        }
        *self.inner.viewport.borrow_mut() = Some(viewport);
        self.jump_to_initial_tail();
    }

    pub fn detach_viewport(&self) {
        self.inner.viewport.borrow_mut().take();
    }

    /// Current merged, time-ordered view of history plus streaming entries.
    pub fn messages(&self) -> Rc<[Message]> {
        self.inner.state.borrow().merged.clone()
    }

    pub fn load_state(&self) -> LoadWindowState {
        self.inner.state.borrow().pagination.state()
    }

    pub fn has_more(&self) -> bool {
        self.inner.state.borrow().pagination.has_more()
    }

    pub fn set_has_more(&self, has_more: bool) {
        self.inner
            .state
            .borrow_mut()
            .pagination
            .set_has_more(has_more);
    }

    pub fn near_bottom(&self) -> bool {
        self.inner.state.borrow().monitor.near_bottom()
    }

    pub fn viewport_info(&self) -> Option<ViewportInfo> {
        self.inner.state.borrow().monitor.last()
    }

    pub fn cached_rows(&self) -> usize {
        self.inner.state.borrow().cache.len()
    }

    pub fn pending_scroll_tasks(&self) -> usize {
        self.inner.frames.len()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }

    /// Replaces the persisted history window.
    ///
    /// The first non-empty history jumps to the bottom without animation;
    /// later growth follows the newest message when the follow rule allows it.
    pub fn set_history(&self, messages: Vec<Message>) {
        if self.is_torn_down() {
            return;
        }

        let (newest, first_window) = {
            let mut state = self.inner.state.borrow_mut();
            let grew = messages.len() > state.history.len();
            state.history = messages;
            state.remerge();

            let newest = if grew {
                state.history.last().cloned()
            } else {
                None
            };
            (newest, !state.initial_scroll_done)
        };

        if first_window {
            self.jump_to_initial_tail();
        } else {
            self.follow_newest(newest.as_ref());
        }
    }

    /// Queues the one-time jump to the tail once history and a viewport are both present.
    fn jump_to_initial_tail(&self) {
        let pending = {
            let state = self.inner.state.borrow();
            !state.initial_scroll_done && !state.history.is_empty()
        };
        if pending && self.queue_scroll_to_bottom(ScrollBehavior::Immediate) {
            self.inner.state.borrow_mut().initial_scroll_done = true;
        }
    }

    /// Appends one finalized live message.
    pub fn push_message(&self, message: Message) {
        if self.is_torn_down() {
            return;
        }

        {
            let mut state = self.inner.state.borrow_mut();
            state.history.push(message.clone());
            state.remerge();
            state.initial_scroll_done = true;
        }
        self.follow_newest(Some(&message));
    }

    /// Replaces the streaming set; the controller never mutates it.
    pub fn set_streaming(&self, streaming: StreamingMessageSet) {
        if self.is_torn_down() {
            return;
        }

        let newest = {
            let mut state = self.inner.state.borrow_mut();
            state.streaming = streaming;
            state.remerge();
            state.streaming.last().cloned()
        };
        self.follow_newest(newest.as_ref());
    }

    pub fn should_scroll_to_bottom(&self, message: &Message) -> bool {
        let state = self.inner.state.borrow();
        should_scroll_to_bottom(
            message.is_from(self.inner.current_user),
            state.monitor.near_bottom(),
            &state.pagination.state(),
        )
    }

    fn follow_newest(&self, newest: Option<&Message>) {
        if let Some(message) = newest
            && self.should_scroll_to_bottom(message)
        {
            self.scroll_to_bottom(self.inner.config.follow_behavior);
        }
    }

    /// Queues a scroll to the tail; ignored while a load cycle is in flight.
    pub fn scroll_to_bottom(&self, behavior: ScrollBehavior) {
        self.queue_scroll_to_bottom(behavior);
    }

    fn queue_scroll_to_bottom(&self, behavior: ScrollBehavior) -> bool {
        if self.is_torn_down() || !self.load_state().is_idle() || self.viewport().is_none() {
            return false;
        }

        let weak = Rc::downgrade(&self.inner);
        self.inner.frames.enqueue(move || {
            let Some(controller) = Self::upgrade(&weak) else {
                return;
            };
            // A cycle may have started while this task waited for its frame.
            if !controller.load_state().is_idle() {
                tracing::debug!("bottom follow dropped; older-history load in flight");
                return;
            }
            let Some(viewport) = controller.viewport() else {
                return;
            };
            let Some(geometry) = viewport.geometry() else {
                return;
            };

            let target = geometry.max_offset();
            viewport.scroll_to(target, behavior);
            tracing::debug!(offset = target, ?behavior, "scrolled to bottom");
            controller.emit(ControllerEvent::FollowedBottom { behavior });
        });
        true
    }

    /// Entry point for raw scroll events from the host.
    pub fn on_scroll(&self) {
        if self.is_torn_down() {
            return;
        }

        let geometry = self.viewport().and_then(|viewport| viewport.geometry());
        let info = {
            let mut state = self.inner.state.borrow_mut();
            if state.scroll_events_suppressed
                || matches!(state.pagination.state(), LoadWindowState::Restoring(_))
            {
                tracing::trace!("scroll event skipped during anchor restoration");
                return;
            }
            state.monitor.observe(geometry)
        };
        let Some(info) = info else {
            return;
        };

        let weak = Rc::downgrade(&self.inner);
        self.inner.debouncer.borrow_mut().schedule(async move {
            if let Some(controller) = Self::upgrade(&weak) {
                controller.settle_scroll(info);
            }
        });
    }

    fn settle_scroll(&self, info: ViewportInfo) {
        if self.is_torn_down() {
            return;
        }

        let should_load = self.inner.state.borrow().pagination.should_trigger(&info);
        if should_load && self.start_loading_older() {
            let controller = self.clone();
            tokio::task::spawn_local(async move {
                if let Err(error) = controller.run_load_cycle().await {
                    tracing::warn!(%error, "background older-history load failed");
                }
            });
        }

        self.emit(ControllerEvent::ViewportChanged(info));
    }

    /// Moves `Idle -> Loading`, capturing the anchor synchronously.
    ///
    /// Returns false while another cycle is in flight or without a mounted viewport.
    pub fn start_loading_older(&self) -> bool {
        if self.is_torn_down() {
            return false;
        }
        let Some(geometry) = self.viewport().and_then(|viewport| viewport.geometry()) else {
            tracing::debug!("older-history load skipped; viewport detached");
            return false;
        };

        let started = self.inner.state.borrow_mut().pagination.start(&geometry);
        if started {
            tracing::info!(
                scroll_offset = geometry.scroll_offset,
                content_extent = geometry.content_extent,
                "loading older history"
            );
            self.emit(ControllerEvent::LoadStarted);
        }
        started
    }

    /// Runs one complete older-history cycle.
    ///
    /// Fetch failures reset the state to `Idle`, emit `LoadFailed` and are
    /// returned; no correction is attempted.
    pub async fn load_older(&self) -> ControllerResult<LoadOutcome> {
        if !self.start_loading_older() {
            return Ok(LoadOutcome::Skipped);
        }
        self.run_load_cycle().await
    }

    async fn run_load_cycle(&self) -> ControllerResult<LoadOutcome> {
        let provider = self.inner.history_provider.clone();
        let fetched = provider.fetch_older().await;
        if self.is_torn_down() {
            tracing::debug!("older-history fetch completed after teardown; ignoring");
            return Ok(LoadOutcome::Abandoned);
        }

        let page = match fetched {
            Ok(page) => page,
            Err(source) => {
                self.inner.state.borrow_mut().pagination.reset();
                let reason = source.reason().to_string();
                tracing::warn!(%reason, "older-history fetch rejected");
                self.emit(ControllerEvent::LoadFailed { reason });
                return Err(source).context(FetchFailedSnafu {
                    stage: "fetch-older-history",
                });
            }
        };

        let fetched = page.messages.len();
        let has_more = page.has_more;
        let (anchor, rendered_generation) = {
            let mut state = self.inner.state.borrow_mut();
            let anchor = state.pagination.fetched(has_more);
            if fetched > 0 {
                let mut history = page.messages;
                history.append(&mut state.history);
                state.history = history;
                state.remerge();
            }
            (anchor, self.inner.render_signal.borrow().generation)
        };

        let Some(anchor) = anchor else {
            self.inner.state.borrow_mut().pagination.reset();
            return Ok(LoadOutcome::Abandoned);
        };

        if fetched == 0 {
            // Nothing was inserted above the anchor, so nothing moves.
            tracing::info!(has_more, "older-history page was empty");
            self.inner.state.borrow_mut().pagination.settle();
            return Ok(LoadOutcome::Loaded {
                fetched,
                has_more,
                correction: None,
            });
        }

        tracing::info!(fetched, has_more, "older history merged");
        self.emit(ControllerEvent::HistoryPrepended {
            count: fetched,
            has_more,
        });

        if !self.wait_for_render(rendered_generation).await {
            return Ok(LoadOutcome::Abandoned);
        }

        match self.queue_correction(anchor).await {
            Ok(correction) => Ok(LoadOutcome::Loaded {
                fetched,
                has_more,
                correction,
            }),
            Err(_) => Ok(LoadOutcome::Abandoned),
        }
    }

    /// Signals that the host laid out the current merged sequence.
    pub fn frame_rendered(&self) {
        self.inner
            .render_signal
            .send_modify(|signal| signal.generation += 1);
    }

    async fn wait_for_render(&self, after_generation: u64) -> bool {
        let mut signal = self.inner.render_signal.subscribe();
        match signal
            .wait_for(|signal| signal.closed || signal.generation > after_generation)
            .await
        {
            Ok(signal) => !signal.closed,
            Err(_) => false,
        }
    }

    async fn queue_correction(
        &self,
        anchor: AnchorSnapshot,
    ) -> Result<Option<Correction>, oneshot::error::RecvError> {
        let (done_tx, done_rx) = oneshot::channel();
        let weak = Rc::downgrade(&self.inner);
        self.inner.frames.enqueue(move || {
            let Some(controller) = Self::upgrade(&weak) else {
                return;
            };
            let correction = controller.restore_anchor(anchor);
            let _ = done_tx.send(correction);
        });
        done_rx.await
    }

    fn restore_anchor(&self, anchor: AnchorSnapshot) -> Option<Correction> {
        if self.is_torn_down() {
            return None;
        }

        let behavior = self.inner.config.correction_behavior;
        let correction = self
            .viewport()
            .and_then(|viewport| apply_correction(&anchor, &*viewport, behavior));
        let suppress_echo = correction.is_some() && behavior == ScrollBehavior::Immediate;

        {
            let mut state = self.inner.state.borrow_mut();
            state.pagination.settle();
            state.scroll_events_suppressed = suppress_echo;
        }
        // Geometry captured by a pending debounce predates the prepend.
        self.inner.debouncer.borrow_mut().cancel();

        if suppress_echo {
            let weak = Rc::downgrade(&self.inner);
            self.inner.frames.enqueue(move || {
                if let Some(controller) = Self::upgrade(&weak) {
                    controller.inner.state.borrow_mut().scroll_events_suppressed = false;
                }
            });
        }

        if let Some(correction) = correction {
            tracing::info!(
                offset = correction.offset,
                delta = correction.delta,
                "scroll anchor preserved"
            );
            self.emit(ControllerEvent::ScrollRestored(correction));
        }
        correction
    }

    /// Renders the merged sequence, reusing cached rows whose key is unchanged.
    pub fn render<P>(&self, presenter: &P) -> Vec<V>
    where
        P: MessagePresenter<Output = V>,
    {
        if self.is_torn_down() {
            return Vec::new();
        }

        let (merged, mut cache) = {
            let mut state = self.inner.state.borrow_mut();
            (state.merged.clone(), std::mem::take(&mut state.cache))
        };

        let mut misses = 0usize;
        let rendered = merged
            .iter()
            .map(|message| {
                let key = CacheKey::for_message(message);
                if let Some(hit) = cache.get(&key) {
                    return hit.clone();
                }
                misses += 1;
                let props = PresentProps::for_message(message, self.inner.current_user);
                let output = presenter.present(message, &props);
                cache.put(key, output.clone());
                output
            })
            .collect::<Vec<_>>();
        cache.evict_excess(self.inner.config.cache_capacity);
        tracing::trace!(rows = rendered.len(), misses, "render pass");

        if !self.is_torn_down() {
            self.inner.state.borrow_mut().cache = cache;
        }
        rendered
    }

    /// Discards queued work and timers, clears the cache and drops the anchor.
    ///
    /// Every later call is a no-op; fetches that complete afterwards are ignored.
    pub fn teardown(&self) {
        if self.inner.torn_down.replace(true) {
            return;
        }

        self.inner.frames.close();
        self.inner.debouncer.borrow_mut().cancel();
        {
            let mut state = self.inner.state.borrow_mut();
            state.cache.clear();
            state.pagination.reset();
            state.monitor.reset();
            state.scroll_events_suppressed = false;
        }
        self.inner
            .render_signal
            .send_modify(|signal| signal.closed = true);
        self.inner.viewport.borrow_mut().take();
        tracing::info!("scrollback controller torn down");
    }

    fn viewport(&self) -> Option<Rc<dyn ViewportHandle>> {
        self.inner.viewport.borrow().clone()
    }

    fn emit(&self, event: ControllerEvent) {
        // The host may have dropped its receiver; events are advisory.
        let _ = self.inner.events.send(event);
    }

    fn upgrade(weak: &Weak<Inner<V>>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}
