//! Frame-rate-limited FIFO for scroll mutations.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Approximates one display refresh at 60 Hz.
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

pub type ScrollTask = Box<dyn FnOnce()>;

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<ScrollTask>,
    last_frame: Option<Instant>,
    draining: bool,
    drain_task: Option<JoinHandle<()>>,
    closed: bool,
}

/// Runs queued scroll mutations one per frame tick, in submission order.
///
/// The drain loop lives on the current `LocalSet` and stops once the queue is
/// empty; the next `enqueue` restarts it.
#[derive(Clone)]
pub struct FrameQueue {
    state: Rc<RefCell<QueueState>>,
    frame_interval: Duration,
}

impl FrameQueue {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(QueueState::default())),
            frame_interval,
        }
    }

    pub fn enqueue(&self, task: impl FnOnce() + 'static) {
        let mut state = self.state.borrow_mut();
        if state.closed {
            tracing::debug!("frame queue closed; dropping scroll task");
            return;
        }

        state.tasks.push_back(Box::new(task));
        if !state.draining {
            state.draining = true;
            state.drain_task = Some(tokio::task::spawn_local(self.clone().drain()));
        }
    }

    pub fn len(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().tasks.is_empty()
    }

    /// Discards pending tasks and stops accepting new ones.
    pub fn close(&self) {
        let (discarded, drain_task) = {
            let mut state = self.state.borrow_mut();
            state.closed = true;
            state.draining = false;
            (std::mem::take(&mut state.tasks), state.drain_task.take())
        };
        if let Some(drain_task) = drain_task {
            drain_task.abort();
        }
        if !discarded.is_empty() {
            tracing::debug!(discarded = discarded.len(), "frame queue discarded pending tasks");
        }
        // Dropped outside the borrow: task captures may own other queue handles.
        drop(discarded);
    }

    async fn drain(self) {
        loop {
            let next_frame = self
                .state
                .borrow()
                .last_frame
                .map(|last| last + self.frame_interval);
            if let Some(deadline) = next_frame {
                tokio::time::sleep_until(deadline).await;
            }

            let task = {
                let mut state = self.state.borrow_mut();
                match state.tasks.pop_front() {
                    Some(task) => {
                        state.last_frame = Some(Instant::now());
                        task
                    }
                    None => {
                        state.draining = false;
                        state.drain_task = None;
                        return;
                    }
                }
            };

            run_task(task);
        }
    }
}

fn run_task(task: ScrollTask) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        tracing::error!(
            panic = panic_message(payload.as_ref()),
            "scroll task panicked; continuing with next task"
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::task::LocalSet;

    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<(u32, Instant)>>>, impl Fn(u32) -> ScrollTask) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: u32| -> ScrollTask {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push((label, Instant::now())))
        };
        (log, make)
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_run_in_order_one_per_frame() {
        LocalSet::new()
            .run_until(async {
                let queue = FrameQueue::new(Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS));
                let (log, make) = recorder();

                for label in 0..4 {
                    queue.enqueue(make(label));
                }
                assert_eq!(queue.len(), 4);

                tokio::time::sleep(Duration::from_millis(100)).await;

                let log = log.borrow();
                let labels = log.iter().map(|(label, _)| *label).collect::<Vec<_>>();
                assert_eq!(labels, vec![0, 1, 2, 3]);
                for pair in log.windows(2) {
                    assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS));
                }
                assert!(queue.is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_task_does_not_stop_the_queue() {
        LocalSet::new()
            .run_until(async {
                let queue = FrameQueue::new(Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS));
                let (log, make) = recorder();

                queue.enqueue(make(1));
                queue.enqueue(|| panic!("layout handle vanished"));
                queue.enqueue(make(2));

                tokio::time::sleep(Duration::from_millis(100)).await;

                let labels = log.borrow().iter().map(|(label, _)| *label).collect::<Vec<_>>();
                assert_eq!(labels, vec![1, 2]);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn queue_restarts_after_idling() {
        LocalSet::new()
            .run_until(async {
                let queue = FrameQueue::new(Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS));
                let (log, make) = recorder();

                queue.enqueue(make(1));
                tokio::time::sleep(Duration::from_millis(50)).await;
                queue.enqueue(make(2));
                tokio::time::sleep(Duration::from_millis(50)).await;

                assert_eq!(log.borrow().len(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_discards_pending_work() {
        LocalSet::new()
            .run_until(async {
                let queue = FrameQueue::new(Duration::from_millis(DEFAULT_FRAME_INTERVAL_MS));
                let (log, make) = recorder();

                for label in 0..3 {
                    queue.enqueue(make(label));
                }
                tokio::task::yield_now().await;
                queue.close();
                queue.enqueue(make(9));

                tokio::time::sleep(Duration::from_millis(100)).await;

                let labels = log.borrow().iter().map(|(label, _)| *label).collect::<Vec<_>>();
                assert!(labels.len() <= 1);
                assert!(!labels.contains(&9));
                assert!(queue.is_empty());
            })
            .await;
    }
}
