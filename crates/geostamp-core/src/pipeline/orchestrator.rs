//! Pipeline orchestration: owns the ordered stage chain, the intake queue the
//! producer writes to, and the task draining that queue into the first stage.
//!
//! A pipeline is assembled with [`Pipeline::add_stage`], started once with a
//! [`Session`], fed through [`Pipeline::submit`] (or a cloned
//! [`PipelineIntake`]), and shut down by submitting the end-of-stream
//! sentinel, which each stage forwards to the next before stopping.
//!
//! Global order is preserved end to end because every queue has exactly one
//! consumer and every stage handles one unit at a time.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::stage::{self, Downstream, Stage, StageHandle, StageIntake, StageState};
use crate::error::PipelineError;
use crate::types::{Position, Session};
use crate::work::WorkUnit;

/// Producer-side handle to a running pipeline's intake queue. Cheap to clone
/// and safe to move to another task or thread.
#[derive(Clone)]
pub struct PipelineIntake {
    pipeline: Arc<str>,
    tx: mpsc::UnboundedSender<WorkUnit>,
    accepting: Arc<AtomicBool>,
    first: StageIntake,
}

impl PipelineIntake {
    /// Submit a captured photo. Fire-and-forget; returns whether it was accepted.
    pub fn submit(&self, file_location: impl Into<PathBuf>, position: Position) -> bool {
        self.submit_unit(WorkUnit::photo(file_location, position))
    }

    /// Submit a prepared unit.
    ///
    /// Once the end-of-stream sentinel has been accepted, or the first stage
    /// has stopped, every later submission, sentinel included, is rejected.
    pub fn submit_unit(&self, unit: WorkUnit) -> bool {
        if !self.first.is_alive() {
            self.accepting.store(false, Ordering::Release);
            tracing::warn!(
                pipeline = %self.pipeline,
                unit = %unit.describe(),
                "Pipeline has stopped, rejecting unit"
            );
            return false;
        }

        if unit.is_end_of_stream() {
            if !self.accepting.swap(false, Ordering::AcqRel) {
                tracing::debug!(pipeline = %self.pipeline, "End of stream already submitted");
                return false;
            }
        } else if !self.accepting.load(Ordering::Acquire) {
            tracing::warn!(
                pipeline = %self.pipeline,
                unit = %unit.describe(),
                "Pipeline is shutting down, rejecting unit"
            );
            return false;
        }

        match self.tx.send(unit) {
            Ok(()) => true,
            Err(mpsc::error::SendError(unit)) => {
                tracing::warn!(
                    pipeline = %self.pipeline,
                    unit = %unit.describe(),
                    "Pipeline is not running, rejecting unit"
                );
                false
            }
        }
    }

    /// Ask the pipeline to drain everything already submitted and stop.
    pub fn submit_end_of_stream(&self) -> bool {
        self.submit_unit(WorkUnit::EndOfStream)
    }

    /// Whether new units are still accepted.
    pub fn is_alive(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.tx.is_closed() && self.first.is_alive()
    }
}

enum State {
    Assembling(Vec<Box<dyn Stage>>),
    Running(Running),
    Stopped,
}

struct Running {
    intake: PipelineIntake,
    stages: Vec<StageHandle>,
    drain: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// An ordered chain of stages fed from a single intake queue.
pub struct Pipeline {
    name: Arc<str>,
    state: State,
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            state: State::Assembling(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a stage to the chain.
    ///
    /// Fails once the pipeline has been started, or if a stage with the same
    /// name is already present.
    pub fn add_stage(&mut self, stage: Box<dyn Stage>) -> Result<(), PipelineError> {
        let State::Assembling(stages) = &mut self.state else {
            return Err(PipelineError::AlreadyStarted(self.name.to_string()));
        };
        if stages.iter().any(|s| s.name() == stage.name()) {
            return Err(PipelineError::DuplicateStage(stage.name().to_string()));
        }
        tracing::debug!(pipeline = %self.name, stage = %stage.name(), "Stage added");
        stages.push(stage);
        Ok(())
    }

    /// Initialize and start every stage in order, then start draining the
    /// intake queue.
    ///
    /// If any stage fails to initialize, the stages already started are
    /// interrupted and awaited, and the error is returned. The pipeline
    /// cannot be started again afterwards.
    pub async fn start(&mut self, session: Session) -> Result<(), PipelineError> {
        let stages = match std::mem::replace(&mut self.state, State::Stopped) {
            State::Assembling(stages) if stages.is_empty() => {
                self.state = State::Assembling(stages);
                return Err(PipelineError::NoStages(self.name.to_string()));
            }
            State::Assembling(stages) => stages,
            other => {
                self.state = other;
                return Err(PipelineError::AlreadyStarted(self.name.to_string()));
            }
        };

        let session = Arc::new(session);
        let cancel = CancellationToken::new();
        tracing::info!(
            pipeline = %self.name,
            stages = stages.len(),
            session = ?session.directory,
            "Starting pipeline"
        );

        // Every queue exists before any stage starts, so stage N can be
        // handed stage N+1's intake.
        let (intakes, mailboxes): (Vec<_>, Vec<_>) =
            stages.iter().map(|s| stage::mailbox(s.name())).unzip();

        let mut handles: Vec<StageHandle> = Vec::with_capacity(stages.len());
        for (index, (stage, (intake, mailbox))) in stages
            .into_iter()
            .zip(intakes.iter().cloned().zip(mailboxes))
            .enumerate()
        {
            let downstream = match intakes.get(index + 1) {
                Some(next) => Downstream::Next(next.clone()),
                None => Downstream::Discard,
            };
            let launched = stage::launch(
                stage,
                intake,
                mailbox,
                downstream,
                session.clone(),
                cancel.child_token(),
            )
            .await;

            match launched {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    tracing::error!(pipeline = %self.name, "Aborting start: {}", e);
                    cancel.cancel();
                    for handle in &mut handles {
                        handle.join().await;
                    }
                    return Err(e);
                }
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let accepting = Arc::new(AtomicBool::new(true));
        let first = intakes[0].clone();
        let intake = PipelineIntake {
            pipeline: self.name.clone(),
            tx,
            accepting: accepting.clone(),
            first: first.clone(),
        };

        let drain = tokio::spawn(drain(
            self.name.clone(),
            rx,
            first,
            accepting,
            cancel.clone(),
        ));

        self.state = State::Running(Running {
            intake,
            stages: handles,
            drain: Some(drain),
            cancel,
        });
        Ok(())
    }

    /// Submit a captured photo. Returns `false` (and logs) if the pipeline is
    /// not running or is shutting down.
    pub fn submit(&self, file_location: impl Into<PathBuf>, position: Position) -> bool {
        self.submit_unit(WorkUnit::photo(file_location, position))
    }

    /// Submit a prepared unit.
    pub fn submit_unit(&self, unit: WorkUnit) -> bool {
        match &self.state {
            State::Running(running) => running.intake.submit_unit(unit),
            _ => {
                tracing::warn!(
                    pipeline = %self.name,
                    unit = %unit.describe(),
                    "Pipeline is not running, dropping unit"
                );
                false
            }
        }
    }

    /// Submit the end-of-stream sentinel.
    pub fn submit_end_of_stream(&self) -> bool {
        self.submit_unit(WorkUnit::EndOfStream)
    }

    /// A producer handle for the intake queue, while running.
    pub fn intake(&self) -> Option<PipelineIntake> {
        match &self.state {
            State::Running(running) => Some(running.intake.clone()),
            _ => None,
        }
    }

    /// Whether any stage is still alive. Once every stage has stopped,
    /// whatever the reason, the pipeline is dead and rejects submissions.
    pub fn is_alive(&self) -> bool {
        match &self.state {
            State::Running(running) => running.stages.iter().any(StageHandle::is_alive),
            _ => false,
        }
    }

    /// Whether new units are still accepted.
    pub fn is_accepting(&self) -> bool {
        match &self.state {
            State::Running(running) => running.intake.is_alive(),
            _ => false,
        }
    }

    /// Stage names in chain order.
    pub fn stage_names(&self) -> Vec<String> {
        match &self.state {
            State::Assembling(stages) => stages.iter().map(|s| s.name().to_string()).collect(),
            State::Running(running) => running
                .stages
                .iter()
                .map(|s| s.name().to_string())
                .collect(),
            State::Stopped => Vec::new(),
        }
    }

    /// Look up a started stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageHandle> {
        match &self.state {
            State::Running(running) => running.stages.iter().find(|s| s.name() == name),
            _ => None,
        }
    }

    /// Lifecycle state of a stage, if the pipeline knows it.
    pub fn stage_state(&self, name: &str) -> Option<StageState> {
        match &self.state {
            State::Assembling(stages) => stages
                .iter()
                .any(|s| s.name() == name)
                .then_some(StageState::Created),
            State::Running(running) => running
                .stages
                .iter()
                .find(|s| s.name() == name)
                .map(StageHandle::state),
            State::Stopped => None,
        }
    }

    /// Interrupt the drain task and every stage.
    ///
    /// Idle stages stop at once. A stage in the middle of a unit abandons its
    /// retries, finishes the unit and then stops. Queued units are dropped
    /// and logged.
    pub fn interrupt(&self) {
        if let State::Running(running) = &self.state {
            tracing::info!(pipeline = %self.name, "Interrupting pipeline");
            running.cancel.cancel();
        }
    }

    /// Wait until the drain task and every stage have exited.
    ///
    /// Returns immediately if the pipeline was never started. Cancel-safe, so
    /// it can race a signal in `tokio::select!` and be called again. Call after
    /// [`Pipeline::submit_end_of_stream`] or [`Pipeline::interrupt`];
    /// otherwise this waits for one of them to happen elsewhere.
    pub async fn join(&mut self) {
        let State::Running(running) = &mut self.state else {
            return;
        };

        if let Some(drain) = running.drain.as_mut() {
            let result = drain.await;
            running.drain = None;
            if let Err(e) = result {
                tracing::error!(pipeline = %self.name, "Drain task failed: {}", e);
            }
        }
        for stage in &mut running.stages {
            stage.join().await;
        }

        tracing::info!(pipeline = %self.name, "Pipeline stopped");
        self.state = State::Stopped;
    }

    /// Submit end-of-stream and wait for the pipeline to drain completely.
    pub async fn shutdown(&mut self) {
        self.submit_end_of_stream();
        self.join().await;
    }
}

async fn drain(
    pipeline: Arc<str>,
    mut rx: mpsc::UnboundedReceiver<WorkUnit>,
    first: StageIntake,
    accepting: Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    tracing::debug!(pipeline = %pipeline, first = %first.name(), "Intake drain started");

    loop {
        let unit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(pipeline = %pipeline, "Drain interrupted, treating as end of stream");
                WorkUnit::EndOfStream
            }
            _ = first.closed() => {
                tracing::debug!(pipeline = %pipeline, first = %first.name(), "First stage stopped, closing intake");
                break;
            }
            unit = rx.recv() => unit.unwrap_or(WorkUnit::EndOfStream),
        };

        let end_of_stream = unit.is_end_of_stream();
        if end_of_stream && !first.is_alive() {
            break;
        }
        if !first.submit(unit) || end_of_stream {
            break;
        }
    }

    accepting.store(false, Ordering::Release);
    rx.close();
    while let Ok(unit) = rx.try_recv() {
        if !unit.is_end_of_stream() {
            tracing::warn!(
                pipeline = %pipeline,
                unit = %unit.describe(),
                "Dropping unit queued after the pipeline stopped"
            );
        }
    }
    tracing::debug!(pipeline = %pipeline, "Intake drain stopped");
}
