//! The cycle scheduler.
//!
//! `AgentSystem` threads a [`SystemState`] through its stages once per
//! cycle and increments the cycle counter exactly once afterwards. `run`
//! repeats cycles until the task is complete, the cycle bound is reached,
//! or a [`StopHandle`] is triggered between cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use rustedloop_core::error::Result;
use rustedloop_core::event::{DomainEvent, EventBus};
use rustedloop_core::state::{SystemState, TaskStatus};
use tracing::{debug, info};

use crate::stages::Stage;

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    Running,
    /// The task reached COMPLETE
    Complete,
    /// `current_cycle` reached `max_cycles`
    Exhausted,
}

/// Cooperative cancellation, checked between cycles.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop once the in-flight cycle returns.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Runs orchestration cycles over an ordered list of stages.
pub struct AgentSystem {
    stages: Vec<Box<dyn Stage>>,
    events: Arc<EventBus>,
    stop: StopHandle,
}

impl AgentSystem {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            stages,
            events: Arc::new(EventBus::default()),
            stop: StopHandle::new(),
        }
    }

    /// Publish domain events on a shared bus.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// A handle that stops [`AgentSystem::run`] between cycles.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage once, then advance the cycle counter by one.
    pub async fn run_cycle(&self, state: SystemState) -> Result<SystemState> {
        let cycle = state.task.current_cycle + 1;
        debug!(run_id = %state.run_id, cycle, "Starting cycle");

        let mut state = state;
        for stage in &self.stages {
            state = stage.apply(state, &self.events).await?;
            debug!(run_id = %state.run_id, cycle, stage = stage.name(), "Stage finished");
        }

        let state = state.next_cycle();
        info!(
            run_id = %state.run_id,
            cycle = state.task.current_cycle,
            task_status = ?state.task.status,
            history = state.memory.message_count,
            "Cycle completed"
        );
        self.events.publish(DomainEvent::CycleCompleted {
            run_id: state.run_id.clone(),
            cycle: state.task.current_cycle,
            task_status: state.task.status,
            timestamp: Utc::now(),
        });
        Ok(state)
    }

    pub fn status(&self, state: &SystemState) -> CycleStatus {
        if state.task.status == TaskStatus::Complete {
            CycleStatus::Complete
        } else if state.task.cycles_exhausted() {
            CycleStatus::Exhausted
        } else {
            CycleStatus::Running
        }
    }

    /// True once the task is complete or the cycle bound is reached.
    pub fn is_terminated(&self, state: &SystemState) -> bool {
        self.status(state) != CycleStatus::Running
    }

    /// Run cycles until termination or a stop request.
    pub async fn run(&self, state: SystemState) -> Result<SystemState> {
        info!(
            run_id = %state.run_id,
            max_cycles = ?state.task.max_cycles,
            stages = ?self.stage_names(),
            "Starting run"
        );

        let mut state = state;
        while !self.is_terminated(&state) {
            if self.stop.is_stopped() {
                info!(run_id = %state.run_id, cycle = state.task.current_cycle, "Run stopped");
                return Ok(state);
            }
            state = self.run_cycle(state).await?;
        }

        info!(
            run_id = %state.run_id,
            cycles = state.task.current_cycle,
            status = ?self.status(&state),
            "Run finished"
        );
        Ok(state)
    }
}

impl std::fmt::Debug for AgentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSystem")
            .field("stages", &self.stage_names())
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}
