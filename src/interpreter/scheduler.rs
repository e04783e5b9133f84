//! The cooperative scheduler driving suspended tasks.
//!
//! Single-threaded: tasks are resumed one at a time in spawn order, so no
//! activation ever observes another task mid-resumption. Time is logical
//! and advances per tick, which keeps timed waits testable without a live
//! host loop.

use crate::error::{GraphError, RuntimeError};
use crate::graph::LifecycleEvent;
use crate::host::Host;
use crate::interpreter::{Interpreter, Suspension, Task, TaskStatus};
use crate::value::Value;

/// Identifies a spawned task within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle(usize);

enum SlotState {
    Ready,
    Waiting { wake_at: f64 },
    Finished(Option<Value>),
    Failed(RuntimeError),
    Stopped,
}

struct Slot<'g> {
    task: Task<'g>,
    state: SlotState,
}

pub struct Scheduler<'g> {
    slots: Vec<Slot<'g>>,
    time: f64,
    tick_interval: f64,
}

impl<'g> Scheduler<'g> {
    pub fn new() -> Self {
        Self::with_tick_interval(1.0)
    }

    /// Logical seconds added per tick; timed waits wake relative to this.
    pub fn with_tick_interval(tick_interval: f64) -> Self {
        Self {
            slots: Vec::new(),
            time: 0.0,
            tick_interval,
        }
    }

    pub fn spawn(&mut self, task: Task<'g>) -> TaskHandle {
        self.slots.push(Slot {
            task,
            state: SlotState::Ready,
        });
        TaskHandle(self.slots.len() - 1)
    }

    /// Spawns a task for every entry point registered on the given
    /// lifecycle event.
    pub fn fire(
        &mut self,
        interpreter: &Interpreter<'g>,
        event: LifecycleEvent,
    ) -> Result<Vec<TaskHandle>, GraphError> {
        let entries: Vec<_> = interpreter.graph().entries_for(event).collect();
        let mut handles = Vec::with_capacity(entries.len());
        for entry in entries {
            handles.push(self.spawn(interpreter.spawn(entry)?));
        }
        Ok(handles)
    }

    /// Advances logical time by one interval and steps every runnable task
    /// once. Returns the number of tasks stepped.
    pub fn tick(&mut self, host: &mut dyn Host) -> usize {
        self.time += self.tick_interval;
        let mut stepped = 0;
        for slot in &mut self.slots {
            let runnable = match slot.state {
                SlotState::Ready => true,
                SlotState::Waiting { wake_at } => wake_at <= self.time,
                _ => false,
            };
            if !runnable {
                continue;
            }
            stepped += 1;
            slot.state = match slot.task.step(host) {
                Ok(TaskStatus::Suspended(Suspension::Wait(seconds))) => SlotState::Waiting {
                    wake_at: self.time + seconds,
                },
                Ok(TaskStatus::Suspended(_)) => SlotState::Ready,
                Ok(TaskStatus::Done(value)) => SlotState::Finished(value),
                Err(e) => {
                    log::debug!("task failed during tick: {}", e);
                    SlotState::Failed(e)
                }
            };
        }
        stepped
    }

    /// Ticks until every task has finished, failed, or been stopped.
    /// Returns the number of ticks used, or `None` if `max_ticks` elapsed
    /// first.
    pub fn run_until_idle(&mut self, host: &mut dyn Host, max_ticks: u64) -> Option<u64> {
        for used in 0..max_ticks {
            if self.is_idle() {
                return Some(used);
            }
            self.tick(host);
        }
        if self.is_idle() { Some(max_ticks) } else { None }
    }

    pub fn is_idle(&self) -> bool {
        self.slots.iter().all(|slot| {
            matches!(
                slot.state,
                SlotState::Finished(_) | SlotState::Failed(_) | SlotState::Stopped
            )
        })
    }

    /// Cancels a running task: a distinct exit path that forces its active
    /// nodes to `Failure` and drops any pending suspension.
    pub fn stop(&mut self, handle: TaskHandle, host: &mut dyn Host) {
        if let Some(slot) = self.slots.get_mut(handle.0) {
            if !matches!(slot.state, SlotState::Finished(_) | SlotState::Failed(_)) {
                slot.task.cancel(host);
                slot.state = SlotState::Stopped;
            }
        }
    }

    pub fn task(&self, handle: TaskHandle) -> Option<&Task<'g>> {
        self.slots.get(handle.0).map(|slot| &slot.task)
    }

    /// The task's final value once finished.
    pub fn outcome(&self, handle: TaskHandle) -> Option<&Option<Value>> {
        match self.slots.get(handle.0).map(|s| &s.state) {
            Some(SlotState::Finished(value)) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self, handle: TaskHandle) -> Option<&RuntimeError> {
        match self.slots.get(handle.0).map(|s| &s.state) {
            Some(SlotState::Failed(e)) => Some(e),
            _ => None,
        }
    }
}

impl<'g> Default for Scheduler<'g> {
    fn default() -> Self {
        Self::new()
    }
}
