mod presenter;

use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::task::{JoinHandle, LocalSet};
use tracing_subscriber::EnvFilter;

use scrollback::sim::{InMemoryHistory, SimulatedViewport};
use scrollback::{
    ControllerError, ControllerEvent, FileAttachment, LoadOutcome, Message, MessageId,
    ScrollbackConfig, ScrollbackController, Sender, StreamingMessageSet, UserId, ViewportHandle,
};

use crate::presenter::TextPresenter;

const ROW_HEIGHT: f32 = 48.0;
const VISIBLE_EXTENT: f32 = 480.0;
const ARCHIVE_LEN: usize = 120;
const INITIAL_WINDOW: usize = 30;
const FETCH_LATENCY: Duration = Duration::from_millis(80);

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    InitialWindow,
    Paginate,
    StreamReply,
    FetchFailure,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "initial_window" => Some(Self::InitialWindow),
            "paginate" => Some(Self::Paginate),
            "stream_reply" => Some(Self::StreamReply),
            "fetch_failure" => Some(Self::FetchFailure),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::InitialWindow => "initial_window",
            Self::Paginate => "paginate",
            Self::StreamReply => "stream_reply",
            Self::FetchFailure => "fetch_failure",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("older-history load failed: {source}"))]
    Load {
        stage: &'static str,
        source: ControllerError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let local = LocalSet::new();
    if let Err(error) = local.run_until(run()).await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(ScrollbackConfig::default_path);
    let config = ScrollbackConfig::load_or_default(Some(&config_path));
    println!("scenario={}", args.scenario.name());
    tracing::info!(path = %config_path.display(), ?config, "configuration resolved");

    match args.scenario {
        Scenario::InitialWindow => run_initial_window(&config).await,
        Scenario::Paginate => run_paginate(&config).await,
        Scenario::StreamReply => run_stream_reply(&config).await,
        Scenario::FetchFailure => run_fetch_failure(&config).await,
        Scenario::All => run_all(&config).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = Scenario::All;
    let mut config_path = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;
                scenario = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
            }
            "--config" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-config-value",
                    arg: "--config",
                })?;
                config_path = Some(PathBuf::from(value));
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario,
        config_path,
    })
}

async fn run_all(config: &ScrollbackConfig) -> RunnerResult<()> {
    run_initial_window(config).await?;
    run_paginate(config).await?;
    run_stream_reply(config).await?;
    run_fetch_failure(config).await?;
    println!("all_passed=true");
    Ok(())
}

/// One mounted chat surface: controller, simulated scroll container and a host
/// task that lays out rows whenever older history lands.
struct Session {
    controller: ScrollbackController<String>,
    viewport: Rc<SimulatedViewport>,
    history: Rc<InMemoryHistory>,
    me: Sender,
    rows: Rc<RefCell<Vec<String>>>,
    host: JoinHandle<()>,
}

impl Session {
    fn open(config: &ScrollbackConfig) -> Self {
        let me = Sender::new(UserId::new_v7(), "me");
        let history = Rc::new(
            InMemoryHistory::new(seed_archive(ARCHIVE_LEN), INITIAL_WINDOW)
                .with_latency(FETCH_LATENCY),
        );
        let (controller, mut events) =
            ScrollbackController::new(config.clone(), history.clone(), Some(me.id));
        let viewport = Rc::new(SimulatedViewport::new(VISIBLE_EXTENT));
        controller.attach_viewport(viewport.clone());
        let rows = Rc::new(RefCell::new(Vec::new()));

        let host = {
            let controller = controller.clone();
            let viewport = viewport.clone();
            let rows = rows.clone();
            tokio::task::spawn_local(async move {
                while let Some(event) = events.recv().await {
                    tracing::info!(?event, "controller event");
                    if matches!(event, ControllerEvent::HistoryPrepended { .. }) {
                        paint(&controller, &viewport, &rows);
                    }
                }
            })
        };

        let session = Self {
            controller,
            viewport,
            history,
            me,
            rows,
            host,
        };
        session
            .controller
            .set_history(session.history.take_latest(INITIAL_WINDOW));
        session.paint();
        session
    }

    fn paint(&self) {
        paint(&self.controller, &self.viewport, &self.rows);
    }

    fn max_offset(&self) -> f32 {
        self.viewport
            .geometry()
            .map(|geometry| geometry.max_offset())
            .unwrap_or_default()
    }

    fn close(self) {
        self.controller.teardown();
        self.host.abort();
    }
}

fn paint(
    controller: &ScrollbackController<String>,
    viewport: &SimulatedViewport,
    rows: &RefCell<Vec<String>>,
) {
    let rendered = controller.render(&TextPresenter);
    viewport.layout_rows(rendered.len(), ROW_HEIGHT);
    *rows.borrow_mut() = rendered;
    controller.frame_rendered();
}

/// Lets debounce windows, fetch latency and frame ticks elapse.
async fn settle(config: &ScrollbackConfig) {
    let slack = config.debounce() + FETCH_LATENCY + config.frame_interval() * 4;
    tokio::time::sleep(slack).await;
}

fn seed_archive(count: usize) -> Vec<Message> {
    let alice = Sender::new(UserId::new_v7(), "alice");
    let bob = Sender::new(UserId::new_v7(), "bob");
    let start = Utc::now() - TimeDelta::minutes(count as i64 + 10);

    (0..count)
        .map(|index| {
            let timestamp = start + TimeDelta::minutes(index as i64);
            let author = if index % 3 == 0 { &bob } else { &alice };
            match index {
                0 => Message::system("room created", timestamp),
                _ if index % 40 == 17 => {
                    Message::user(author.clone(), "shared a file", timestamp).with_file(
                        FileAttachment {
                            name: format!("notes-{index}.pdf"),
                            mime_type: "application/pdf".to_string(),
                            size_bytes: 48_000 + index as u64,
                        },
                    )
                }
                _ => {
                    let mut message =
                        Message::user(author.clone(), format!("message #{index}"), timestamp);
                    if index % 25 == 0 {
                        message.add_reaction("👍", alice.id);
                    }
                    message
                }
            }
        })
        .collect()
}

async fn run_initial_window(config: &ScrollbackConfig) -> RunnerResult<()> {
    let session = Session::open(config);
    settle(config).await;

    let offset = session.viewport.scroll_offset();
    let expected = session.max_offset();
    println!("initial_rows={}", session.rows.borrow().len());
    println!("initial_offset={offset}");
    if offset != expected {
        session.close();
        return ScenarioFailedSnafu {
            stage: "scenario-initial-window",
            scenario: "initial_window",
            reason: format!("expected the tail at {expected}, viewport sits at {offset}"),
        }
        .fail();
    }

    for row in session.rows.borrow().iter().rev().take(3).rev() {
        println!("  {row}");
    }
    session.close();
    println!("runner_ok=true");
    Ok(())
}

async fn run_paginate(config: &ScrollbackConfig) -> RunnerResult<()> {
    let session = Session::open(config);
    settle(config).await;

    // First page through the scroll path: near-top event, debounce, load, restore.
    session.viewport.scroll_by_user(12.0);
    session.controller.on_scroll();
    settle(config).await;
    settle(config).await;
    let after_scroll = session.controller.messages().len();
    println!("rows_after_scroll_load={after_scroll}");
    if after_scroll <= INITIAL_WINDOW {
        session.close();
        return ScenarioFailedSnafu {
            stage: "scenario-paginate-scroll",
            scenario: "paginate",
            reason: "scrolling near the top did not load older history".to_string(),
        }
        .fail();
    }

    while session.controller.has_more() {
        let offset_before = 12.0;
        session.viewport.scroll_by_user(offset_before);
        let outcome = session.controller.load_older().await.context(LoadSnafu {
            stage: "scenario-paginate-load",
        })?;

        let LoadOutcome::Loaded {
            fetched,
            correction,
            ..
        } = outcome
        else {
            session.close();
            return ScenarioFailedSnafu {
                stage: "scenario-paginate-outcome",
                scenario: "paginate",
                reason: format!("unexpected outcome {outcome:?}"),
            }
            .fail();
        };

        let expected = offset_before + fetched as f32 * ROW_HEIGHT;
        let restored = correction.map(|correction| correction.offset);
        println!("page fetched={fetched} restored_offset={restored:?}");
        if fetched > 0 && restored != Some(expected) {
            session.close();
            return ScenarioFailedSnafu {
                stage: "scenario-paginate-anchor",
                scenario: "paginate",
                reason: format!("anchor drifted: expected {expected}, got {restored:?}"),
            }
            .fail();
        }
    }

    println!("total_rows={}", session.controller.messages().len());
    println!("fetch_calls={}", session.history.fetch_calls());
    if let Some(first) = session.rows.borrow().first() {
        println!("  {first}");
    }
    session.close();
    println!("runner_ok=true");
    Ok(())
}

async fn run_stream_reply(config: &ScrollbackConfig) -> RunnerResult<()> {
    let session = Session::open(config);
    settle(config).await;

    session
        .controller
        .push_message(Message::user(session.me.clone(), "can you summarize?", Utc::now()));
    session.paint();

    let reply_id = MessageId::new_v7();
    let mut streaming = StreamingMessageSet::new();
    streaming.begin(Message::ai_streaming(reply_id, Utc::now()));
    for chunk in ["Sure. ", "The thread ", "covers release ", "planning."] {
        streaming.append_chunk(reply_id, chunk);
        session.controller.set_streaming(streaming.clone());
        session.paint();
        tokio::time::sleep(config.frame_interval() * 2).await;
    }

    if let Some(reply) = streaming.finalize(reply_id) {
        session.controller.set_streaming(StreamingMessageSet::new());
        session.controller.push_message(reply);
        session.paint();
    }
    settle(config).await;

    let offset = session.viewport.scroll_offset();
    let expected = session.max_offset();
    if let Some(last) = session.rows.borrow().last() {
        println!("  {last}");
    }
    if offset != expected {
        session.close();
        return ScenarioFailedSnafu {
            stage: "scenario-stream-reply",
            scenario: "stream_reply",
            reason: format!("live reply left the viewport at {offset}, tail is {expected}"),
        }
        .fail();
    }

    session.close();
    println!("runner_ok=true");
    Ok(())
}

async fn run_fetch_failure(config: &ScrollbackConfig) -> RunnerResult<()> {
    let session = Session::open(config);
    settle(config).await;

    session.history.fail_next("history service unavailable");
    session.viewport.scroll_by_user(0.0);
    let attempt = session.controller.load_older().await;
    let failed = match attempt {
        Ok(outcome) => {
            session.close();
            return ScenarioFailedSnafu {
                stage: "scenario-fetch-failure",
                scenario: "fetch_failure",
                reason: format!("expected a rejected fetch, got {outcome:?}"),
            }
            .fail();
        }
        Err(error) => error,
    };
    println!("error_banner={}", failed.user_message());

    let recovered = session.controller.load_older().await.context(LoadSnafu {
        stage: "scenario-fetch-failure-retry",
    })?;
    println!("retry={recovered:?}");
    session.close();
    println!("runner_ok=true");
    Ok(())
}
