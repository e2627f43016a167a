//! Stage runtime: the trait concrete stages implement, and the task that
//! drives one stage from its intake queue.
//!
//! Every stage owns one unbounded FIFO queue and exactly one task reading it.
//! That single consumer is what keeps units in submission order across the
//! whole chain; do not read a stage's queue from more than one task.
//!
//! ```text
//!   StageIntake ──▶ [queue] ──▶ run loop ──▶ Stage::process_order
//!                                                  │
//!                             StageContext::finish_order
//!                                                  │
//!                                    Downstream::Next / Discard
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::types::Session;
use crate::work::WorkUnit;

/// One processing step of a pipeline.
///
/// Implementations own their private state; the runtime guarantees that
/// `init`, every `process_order` call and `finish` run sequentially on the
/// stage's own task.
#[async_trait]
pub trait Stage: Send + 'static {
    /// Stage name, unique within a pipeline. Used in every log line.
    fn name(&self) -> &str;

    /// Called once before the stage starts taking units. Reset per-run state
    /// here. An error aborts the pipeline start.
    async fn init(&mut self, _session: &Session) -> Result<(), PipelineError> {
        Ok(())
    }

    /// Process one unit.
    ///
    /// The stage must hand every unit it receives, the end-of-stream sentinel
    /// included, to [`StageContext::finish_order`] exactly once, and must
    /// catch and log its own failures. Returning `false` stops the stage
    /// after this call; so does receiving the sentinel.
    async fn process_order(&mut self, unit: WorkUnit, ctx: &mut StageContext) -> bool;

    /// Called once after the loop exits, on every exit path.
    async fn finish(&mut self) {}
}

/// Lifecycle of a stage: `Created -> Running -> Stopped`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Added to a pipeline that has not started yet
    Created,
    /// Task is alive and accepting units
    Running,
    /// Task has exited; further units are rejected
    Stopped,
}

/// Sending side of a stage's queue. Cheap to clone.
#[derive(Clone)]
pub struct StageIntake {
    name: Arc<str>,
    tx: mpsc::UnboundedSender<WorkUnit>,
}

impl StageIntake {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a unit. Returns `false`, and logs a warning, if the stage has
    /// stopped. Never blocks.
    pub fn submit(&self, unit: WorkUnit) -> bool {
        match self.tx.send(unit) {
            Ok(()) => true,
            Err(mpsc::error::SendError(unit)) => {
                tracing::warn!(
                    stage = %self.name,
                    unit = %unit.describe(),
                    "Stage is not running, rejecting unit"
                );
                false
            }
        }
    }

    /// Whether the stage is still accepting units.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
    /// Resolves once the stage has stopped accepting units.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Where a stage sends the units it has finished with.
#[derive(Clone)]
pub enum Downstream {
    /// Forward to the next stage's queue
    Next(StageIntake),
    /// This is the last stage; finished units are complete
    Discard,
}

/// Per-stage handle the runtime passes into every `process_order` call.
///
/// It carries the route to the next stage, the session, and the stage's
/// interruption token. It holds no reference back into the pipeline.
pub struct StageContext {
    name: Arc<str>,
    session: Arc<Session>,
    downstream: Downstream,
    cancel: CancellationToken,
    end_of_stream_forwarded: bool,
    completed: u64,
}

impl StageContext {
    fn new(
        name: Arc<str>,
        session: Arc<Session>,
        downstream: Downstream,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            session,
            downstream,
            cancel,
            end_of_stream_forwarded: false,
            completed: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Hand a unit on: to the next stage, or drop it if this stage is last.
    ///
    /// The sentinel is forwarded at most once per stage.
    pub fn finish_order(&mut self, unit: WorkUnit) {
        let end_of_stream = unit.is_end_of_stream();
        if end_of_stream {
            if self.end_of_stream_forwarded {
                return;
            }
            self.end_of_stream_forwarded = true;
        } else {
            self.completed += 1;
        }

        match &self.downstream {
            Downstream::Next(next) => {
                next.submit(unit);
            }
            Downstream::Discard if !end_of_stream => {
                tracing::debug!(stage = %self.name, unit = %unit.describe(), "Unit complete");
            }
            Downstream::Discard => {}
        }
    }

    /// Whether this stage has been asked to stop.
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once this stage is interrupted. Meant for `tokio::select!`
    /// around blocking sub-operations.
    pub async fn interrupted(&self) {
        self.cancel.cancelled().await
    }

    /// The stage's interruption token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Owner-side handle to a started stage.
pub struct StageHandle {
    intake: StageIntake,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StageHandle {
    pub fn name(&self) -> &str {
        self.intake.name()
    }

    /// Enqueue a unit directly on this stage.
    pub fn submit(&self, unit: WorkUnit) -> bool {
        self.intake.submit(unit)
    }

    /// A cloneable sender for this stage's queue.
    pub fn intake(&self) -> StageIntake {
        self.intake.clone()
    }

    /// Whether the stage task is alive and accepting units.
    pub fn is_alive(&self) -> bool {
        self.intake.is_alive() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn state(&self) -> StageState {
        if self.is_alive() {
            StageState::Running
        } else {
            StageState::Stopped
        }
    }

    /// Ask the stage to stop. Idle stages stop at once; a stage in the middle
    /// of a unit abandons any retries, finishes that unit and then stops.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// Wait for the stage task to exit. Cancel-safe: dropping this future
    /// leaves the handle joinable.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.as_mut() {
            let result = task.await;
            self.task = None;
            if let Err(e) = result {
                tracing::error!(stage = %self.intake.name, "Stage task failed: {}", e);
            }
        }
    }
}

/// Receiving side of a stage's queue, consumed by [`launch`].
pub(crate) struct Mailbox {
    rx: mpsc::UnboundedReceiver<WorkUnit>,
}

/// Create the queue for a stage before it is launched, so the previous stage
/// can be wired to it.
pub(crate) fn mailbox(name: &str) -> (StageIntake, Mailbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        StageIntake {
            name: Arc::from(name),
            tx,
        },
        Mailbox { rx },
    )
}

/// Initialize a stage and spawn its task.
///
/// This is the standalone entry point for running a single stage; a
/// [`super::Pipeline`] does the same for each of its stages in order.
pub async fn start(
    stage: Box<dyn Stage>,
    downstream: Downstream,
    session: Arc<Session>,
    cancel: CancellationToken,
) -> Result<StageHandle, PipelineError> {
    let (intake, mailbox) = mailbox(stage.name());
    launch(stage, intake, mailbox, downstream, session, cancel).await
}

pub(crate) async fn launch(
    mut stage: Box<dyn Stage>,
    intake: StageIntake,
    mailbox: Mailbox,
    downstream: Downstream,
    session: Arc<Session>,
    cancel: CancellationToken,
) -> Result<StageHandle, PipelineError> {
    let name = intake.name.clone();

    stage
        .init(&session)
        .await
        .map_err(|e| PipelineError::StageInit {
            stage: name.to_string(),
            message: e.to_string(),
        })?;

    let ctx = StageContext::new(name, session, downstream, cancel.clone());
    let task = tokio::spawn(run(stage, mailbox, ctx));

    Ok(StageHandle {
        intake,
        cancel,
        task: Some(task),
    })
}

async fn run(mut stage: Box<dyn Stage>, mailbox: Mailbox, mut ctx: StageContext) {
    let Mailbox { mut rx } = mailbox;
    let name = ctx.name.clone();
    tracing::debug!(stage = %name, "Stage started");

    loop {
        let unit = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                tracing::debug!(stage = %name, "Interrupted while idle, treating as end of stream");
                None
            }
            unit = rx.recv() => unit,
        };

        // All senders gone means nothing more can arrive.
        let Some(unit) = unit else { break };

        let end_of_stream = unit.is_end_of_stream();
        let keep_going = stage.process_order(unit, &mut ctx).await;
        if end_of_stream || !keep_going {
            break;
        }
    }

    rx.close();
    let mut dropped = 0u64;
    while let Ok(unit) = rx.try_recv() {
        if !unit.is_end_of_stream() {
            tracing::warn!(stage = %name, unit = %unit.describe(), "Dropping unit queued after shutdown");
            dropped += 1;
        }
    }

    if !ctx.end_of_stream_forwarded {
        ctx.finish_order(WorkUnit::EndOfStream);
    }

    stage.finish().await;
    tracing::info!(
        stage = %name,
        completed = ctx.completed,
        dropped,
        "Stage stopped"
    );
}
