//! Single-threaded cooperative event loop.
//!
//! Input events, inbound channel messages, and timer ticks are queued as
//! [`Task`]s and run one at a time against the [`EngineCore`]. No task
//! preempts another, so the store has exactly one writer.
//!
//! Repaint requests are coalesced: tasks mark the frame dirty and the next
//! [`Task::Tick`] emits a single [`Action::RenderNeeded`].

#[cfg(test)]
#[path = "event_loop_test.rs"]
mod event_loop_test;

use std::collections::VecDeque;

use frames::SyncMessage;
use tracing::{debug, warn};

use crate::camera::Point;
use crate::engine::{Action, EngineCore};
use crate::error::QueueError;
use crate::input::{Button, Modifiers, WheelDelta};

/// A local event from the UI or the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { screen: Point, button: Button },
    PointerMove { screen: Point },
    PointerUp { screen: Point },
    PointerLeave,
    Wheel { screen: Point, delta: WheelDelta },
    KeyDown { key: String, modifiers: Modifiers },
    ConnectionOpened,
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    Input(InputEvent),
    Inbound(SyncMessage),
    /// Frame timer.
    Tick,
}

/// Bounded FIFO of pending tasks.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
    capacity: usize,
}

impl TaskQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { tasks: VecDeque::with_capacity(capacity), capacity }
    }

    /// Enqueue a task. A pointer move directly behind another pointer move
    /// replaces it, since only the latest position matters.
    ///
    /// # Errors
    ///
    /// Returns `Full` when the queue is at capacity. The task is not queued.
    pub fn push(&mut self, task: Task) -> Result<(), QueueError> {
        if let Task::Input(InputEvent::PointerMove { .. }) = task
            && let Some(Task::Input(InputEvent::PointerMove { .. })) = self.tasks.back()
        {
            self.tasks.pop_back();
        }
        if self.tasks.len() >= self.capacity {
            return Err(QueueError::Full { capacity: self.capacity });
        }
        self.tasks.push_back(task);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owns the engine and its task queue.
pub struct EventLoop {
    engine: EngineCore,
    queue: TaskQueue,
    dirty: bool,
}

impl EventLoop {
    #[must_use]
    pub fn new(engine: EngineCore) -> Self {
        let queue = TaskQueue::new(engine.config.queue_capacity);
        Self { engine, queue, dirty: false }
    }

    #[must_use]
    pub fn engine(&self) -> &EngineCore {
        &self.engine
    }

    /// Direct access for commands that are not queued events (tool changes,
    /// toolbar buttons). Must not be called while a task is running.
    pub fn engine_mut(&mut self) -> &mut EngineCore {
        &mut self.engine
    }

    #[must_use]
    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Whether a repaint is owed at the next tick.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// # Errors
    ///
    /// Returns `Full` when the queue is at capacity.
    pub fn push(&mut self, task: Task) -> Result<(), QueueError> {
        self.queue.push(task).inspect_err(|e| warn!(error = %e, "event_loop: task rejected"))
    }

    /// Run the oldest task. Returns `None` when the queue is empty.
    pub fn run_one(&mut self) -> Option<Vec<Action>> {
        let task = self.queue.pop()?;
        let actions = match task {
            Task::Input(event) => self.dispatch_input(event),
            Task::Inbound(message) => self.engine.receive(&message),
            Task::Tick => {
                if !std::mem::take(&mut self.dirty) {
                    return Some(Vec::new());
                }
                return Some(vec![Action::RenderNeeded]);
            }
        };
        Some(self.coalesce(actions))
    }

    /// Run every queued task in order and collect their actions.
    pub fn drain(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut ran = 0usize;
        while let Some(batch) = self.run_one() {
            actions.extend(batch);
            ran += 1;
        }
        if ran > 0 {
            debug!(ran, "event_loop: drained");
        }
        actions
    }

    fn dispatch_input(&mut self, event: InputEvent) -> Vec<Action> {
        let engine = &mut self.engine;
        match event {
            InputEvent::PointerDown { screen, button } => engine.pointer_down(screen, button),
            InputEvent::PointerMove { screen } => engine.pointer_move(screen),
            InputEvent::PointerUp { screen } => engine.pointer_up(screen),
            InputEvent::PointerLeave => engine.pointer_leave(),
            InputEvent::Wheel { screen, delta } => engine.wheel(screen, delta),
            InputEvent::KeyDown { key, modifiers } => engine.key_down(&key, modifiers),
            InputEvent::ConnectionOpened => engine.connection_opened(),
            InputEvent::ConnectionLost => engine.connection_lost(),
        }
    }

    /// Strip repaint requests into the dirty flag.
    fn coalesce(&mut self, actions: Vec<Action>) -> Vec<Action> {
        let mut kept = Vec::with_capacity(actions.len());
        for action in actions {
            if action == Action::RenderNeeded {
                self.dirty = true;
            } else {
                kept.push(action);
            }
        }
        kept
    }
}
