//! Test stages shared by the pipeline tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::stage::{Stage, StageContext};
use crate::error::PipelineError;
use crate::types::{Position, Session};
use crate::work::WorkUnit;

pub fn photo(name: &str) -> WorkUnit {
    WorkUnit::photo(name, Position::new(37.7749, -122.4194, 10.0, 1_700_000_000_000))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Init(String),
    Started(String, String),
    Processed(String, String),
    Finished(String),
}

/// Append-only record of what the test stages did, in global order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn processed_by(&self, stage: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Processed(s, unit) if s == stage => Some(unit),
                _ => None,
            })
            .collect()
    }

    pub fn finished(&self, stage: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(e, Event::Finished(s) if s == stage))
    }

    pub fn index_of(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// A stage that records every call and optionally sleeps per unit.
pub struct RecordingStage {
    name: String,
    log: EventLog,
    delays: HashMap<String, Duration>,
    stop_after: Option<usize>,
    fail_init: bool,
    seen: usize,
}

impl RecordingStage {
    pub fn new(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            delays: HashMap::new(),
            stop_after: None,
            fail_init: false,
            seen: 0,
        }
    }

    pub fn delay(mut self, unit: &str, delay: Duration) -> Self {
        self.delays.insert(unit.to_string(), delay);
        self
    }

    pub fn stop_after(mut self, units: usize) -> Self {
        self.stop_after = Some(units);
        self
    }

    pub fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn init(&mut self, _session: &Session) -> Result<(), PipelineError> {
        self.log.push(Event::Init(self.name.clone()));
        if self.fail_init {
            return Err(PipelineError::FileNotFound(PathBuf::from("missing.ttf")));
        }
        self.seen = 0;
        Ok(())
    }

    async fn process_order(&mut self, mut unit: WorkUnit, ctx: &mut StageContext) -> bool {
        if unit.is_end_of_stream() {
            ctx.finish_order(unit);
            return false;
        }

        let id = unit.describe();
        self.log.push(Event::Started(self.name.clone(), id.clone()));
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(photo) = unit.as_photo_mut() {
            let trace = photo.metadata_mut().entry("trace".to_string()).or_default();
            if !trace.is_empty() {
                trace.push('>');
            }
            trace.push_str(&self.name);
        }
        self.log.push(Event::Processed(self.name.clone(), id));
        ctx.finish_order(unit);

        self.seen += 1;
        !self.stop_after.is_some_and(|limit| self.seen >= limit)
    }

    async fn finish(&mut self) {
        self.log.push(Event::Finished(self.name.clone()));
    }
}

/// A final stage that reports every unit it receives, metadata included.
pub struct CollectingStage {
    name: String,
    collected: Arc<Mutex<Vec<WorkUnit>>>,
}

impl CollectingStage {
    pub fn new(name: &str) -> (Self, Arc<Mutex<Vec<WorkUnit>>>) {
        let collected = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                name: name.to_string(),
                collected: collected.clone(),
            },
            collected,
        )
    }
}

#[async_trait]
impl Stage for CollectingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process_order(&mut self, unit: WorkUnit, ctx: &mut StageContext) -> bool {
        if unit.is_end_of_stream() {
            ctx.finish_order(unit);
            return false;
        }
        let copy = unit.as_photo().cloned().map(WorkUnit::Photo);
        if let Some(copy) = copy {
            self.collected.lock().unwrap().push(copy);
        }
        ctx.finish_order(unit);
        true
    }
}
