#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Unit-of-work store.
//!
//! All persistence goes through a single `MemoryStore`: readers take a
//! shared snapshot, writers open a [`UnitOfWork`] that clones the state,
//! mutate the working copy, and either commit it back atomically or drop it.
//! The state lock is held for the life of a unit, so writers are serialized
//! — which is exactly the lock/serializability primitive the engines rely
//! on (no two token validations can interleave on `last_used_at`, no two
//! executes of one import session can double-post).

use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

mod state;

pub use state::State;

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Shared read access to the current committed state.
    pub async fn read(&self) -> StoreRead<'_> {
        StoreRead {
            guard: self.state.lock().await,
        }
    }

    /// Open a unit of work. Writes apply to a working copy; nothing is
    /// visible to other callers until [`UnitOfWork::commit`], and dropping
    /// the unit discards every change.
    pub async fn unit_of_work(&self) -> UnitOfWork<'_> {
        let guard = self.state.lock().await;
        let working = guard.clone();
        UnitOfWork { guard, working }
    }
}

pub struct StoreRead<'a> {
    guard: MutexGuard<'a, State>,
}

impl Deref for StoreRead<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &self.guard
    }
}

pub struct UnitOfWork<'a> {
    guard: MutexGuard<'a, State>,
    working: State,
}

impl UnitOfWork<'_> {
    /// Publish the working copy. Consumes the unit; every staged write
    /// becomes visible at once.
    pub fn commit(self) {
        let Self { mut guard, working } = self;
        *guard = working;
    }
}

impl Deref for UnitOfWork<'_> {
    type Target = State;

    fn deref(&self) -> &State {
        &self.working
    }
}

impl DerefMut for UnitOfWork<'_> {
    fn deref_mut(&mut self) -> &mut State {
        &mut self.working
    }
}
