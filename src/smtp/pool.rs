//! Fixed-size pool of connection workers

use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tracing::debug;

use crate::smtp::error::SmtpError;
use crate::smtp::server::{ServerContext, handle_connection};

/// Lifecycle of a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Working = 1,
    Done = 2,
    Error = 3,
}

impl From<u8> for WorkerState {
    fn from(value: u8) -> Self {
        match value {
            0 => WorkerState::Idle,
            1 => WorkerState::Working,
            2 => WorkerState::Done,
            _ => WorkerState::Error,
        }
    }
}

#[derive(Debug)]
struct WorkerSlot {
    id: usize,
    state: AtomicU8,
}

impl WorkerSlot {
    fn state(&self) -> WorkerState {
        WorkerState::from(self.state.load(Ordering::Acquire))
    }

    /// Atomically moves a non-working slot to `Working`
    fn try_claim(&self) -> bool {
        let current = self.state.load(Ordering::Acquire);
        current != WorkerState::Working as u8
            && self
                .state
                .compare_exchange(
                    current,
                    WorkerState::Working as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }

    fn release(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Bounds the number of concurrent sessions.
///
/// Slots that finished (successfully or not) are reused.
#[derive(Debug)]
pub struct WorkerPool {
    slots: Vec<Arc<WorkerSlot>>,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        let slots = (0..max_workers)
            .map(|id| {
                Arc::new(WorkerSlot {
                    id,
                    state: AtomicU8::new(WorkerState::Idle as u8),
                })
            })
            .collect();
        Self { slots }
    }

    /// Claims the first slot that is not working.
    ///
    /// Fails with [`SmtpError::NoWorkerAvailable`] when every slot is busy.
    pub fn get_available_worker(&self) -> Result<SmtpWorker, SmtpError> {
        self.slots
            .iter()
            .find(|slot| slot.try_claim())
            .map(|slot| SmtpWorker {
                slot: Arc::clone(slot),
                outcome: WorkerState::Error,
            })
            .ok_or(SmtpError::NoWorkerAvailable)
    }

    /// Snapshot of every slot's state, by worker id
    pub fn states(&self) -> Vec<WorkerState> {
        self.slots.iter().map(|slot| slot.state()).collect()
    }

    /// Number of slots that can take a connection right now
    pub fn available(&self) -> usize {
        self.states()
            .into_iter()
            .filter(|state| *state != WorkerState::Working)
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// A claimed pool slot.
///
/// The slot is released exactly once, when the worker is dropped. A worker
/// dropped before it finished leaves the slot in `Error`.
#[derive(Debug)]
pub struct SmtpWorker {
    slot: Arc<WorkerSlot>,
    outcome: WorkerState,
}

impl SmtpWorker {
    pub fn id(&self) -> usize {
        self.slot.id
    }

    /// Serves one connection and releases the slot
    pub fn work(self, stream: TcpStream, context: &ServerContext) {
        let state = match handle_connection(stream, context) {
            Ok(()) => WorkerState::Done,
            Err(_) => WorkerState::Error,
        };

        debug!(worker = self.id(), ?state, "Worker finished");
        self.finish(state);
    }

    /// Releases the slot with `state`
    fn finish(mut self, state: WorkerState) {
        self.outcome = state;
    }
}

impl Drop for SmtpWorker {
    fn drop(&mut self) {
        self.slot.release(self.outcome);
    }
}
