//! Collective communication between ranks.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use log;

use crate::error::XcTaskError;

#[cfg(test)]
#[path = "comm_tests.rs"]
mod comm_tests;

/// Trait for rank communicators.
pub trait Communicator: Send + Sync {
    /// The index of this rank.
    fn rank(&self) -> usize;

    /// The number of ranks.
    fn size(&self) -> usize;

    /// Replaces `buffer` on every rank by the element-wise sum of the buffers of all ranks.
    /// Every rank obtains bitwise-identical results. Blocks until all ranks have joined.
    fn all_reduce_sum(&self, buffer: &mut [f64]) -> Result<(), XcTaskError>;

    /// Blocks until all ranks have reached this point.
    ///
    /// # Errors
    ///
    /// Errors if another rank has aborted.
    fn barrier(&self) -> Result<(), XcTaskError>;

    /// Marks the run as failed on this rank. Every rank blocked in, or later entering, a
    /// collective returns an error instead of waiting for this rank.
    fn abort(&self);
}

/// The error with which ranks leave a collective after another rank has aborted.
pub fn aborted_error() -> XcTaskError {
    XcTaskError::Configuration("another rank of the local world failed".to_string())
}

/// Aborts the communicator if the current thread unwinds while this guard is alive.
pub struct AbortOnPanic<'a>(pub &'a dyn Communicator);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.abort();
        }
    }
}

// ------------------
// SerialCommunicator
// ------------------

/// The communicator of a single-rank run.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _buffer: &mut [f64]) -> Result<(), XcTaskError> {
        Ok(())
    }

    fn barrier(&self) -> Result<(), XcTaskError> {
        Ok(())
    }

    fn abort(&self) {}
}

// ----------
// LocalWorld
// ----------

/// The rendezvous shared by the ranks of a [`LocalWorld`].
#[derive(Debug)]
struct Rendezvous {
    slots: Vec<Vec<f64>>,
    arrived: usize,
    generation: u64,
    aborted: bool,
}

#[derive(Debug)]
struct WorldState {
    size: usize,
    rendezvous: Mutex<Rendezvous>,
    released: Condvar,
}

/// A set of in-process ranks, each meant to be driven by its own thread.
#[derive(Debug)]
pub struct LocalWorld;

impl LocalWorld {
    /// Creates the communicators of `size` in-process ranks, in rank order.
    pub fn create(size: usize) -> Result<Vec<LocalCommunicator>, XcTaskError> {
        if size == 0 {
            return Err(XcTaskError::Configuration(
                "a local world needs at least one rank".to_string(),
            ));
        }
        let state = Arc::new(WorldState {
            size,
            rendezvous: Mutex::new(Rendezvous {
                slots: vec![vec![]; size],
                arrived: 0,
                generation: 0,
                aborted: false,
            }),
            released: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| LocalCommunicator {
                rank,
                state: Arc::clone(&state),
            })
            .collect())
    }
}

/// The communicator of one rank of a [`LocalWorld`].
#[derive(Clone, Debug)]
pub struct LocalCommunicator {
    rank: usize,
    state: Arc<WorldState>,
}

impl LocalCommunicator {
    fn poisoned() -> XcTaskError {
        XcTaskError::Configuration("a rank of the local world panicked".to_string())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Rendezvous>, XcTaskError> {
        self.state.rendezvous.lock().map_err(|_| Self::poisoned())
    }

    /// Waits until every rank has arrived, or until some rank aborts.
    fn wait<'g>(
        &'g self,
        mut guard: MutexGuard<'g, Rendezvous>,
    ) -> Result<MutexGuard<'g, Rendezvous>, XcTaskError> {
        if guard.aborted {
            return Err(aborted_error());
        }
        guard.arrived += 1;
        if guard.arrived == self.state.size {
            guard.arrived = 0;
            guard.generation += 1;
            self.state.released.notify_all();
            return Ok(guard);
        }
        let generation = guard.generation;
        while guard.generation == generation && !guard.aborted {
            guard = self
                .state
                .released
                .wait(guard)
                .map_err(|_| Self::poisoned())?;
        }
        if guard.generation == generation {
            Err(aborted_error())
        } else {
            Ok(guard)
        }
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn all_reduce_sum(&self, buffer: &mut [f64]) -> Result<(), XcTaskError> {
        let mut guard = self.lock()?;
        guard.slots[self.rank] = buffer.to_vec();
        let guard = self.wait(guard)?;

        // Every rank sums the deposits in rank order, so all obtain the same bits.
        let result = if guard.slots.iter().all(|slot| slot.len() == buffer.len()) {
            buffer.iter_mut().enumerate().for_each(|(i, b)| {
                *b = guard.slots.iter().fold(0.0, |acc, slot| acc + slot[i]);
            });
            Ok(())
        } else {
            Err(XcTaskError::Configuration(format!(
                "mismatched all-reduce buffer lengths across ranks: {:?}",
                guard.slots.iter().map(|slot| slot.len()).collect::<Vec<_>>()
            )))
        };
        // No rank may deposit the next round before all have read this one.
        drop(self.wait(guard)?);
        log::debug!(
            "Rank {} completed an all-reduce over {} values.",
            self.rank,
            buffer.len()
        );
        result
    }

    fn barrier(&self) -> Result<(), XcTaskError> {
        let guard = self.lock()?;
        drop(self.wait(guard)?);
        Ok(())
    }

    fn abort(&self) {
        let mut guard = match self.state.rendezvous.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !guard.aborted {
            log::debug!("Rank {} aborted the local world.", self.rank);
        }
        guard.aborted = true;
        self.state.released.notify_all();
    }
}
