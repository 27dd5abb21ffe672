use std::sync::{Mutex, MutexGuard, PoisonError};

use nbu_client::{Context, ContextError};
use tokio::sync::Notify;

use crate::error::CloseError;

/// Collector lifecycle: `Open -> Closing -> Closed`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug)]
struct Inner {
    state: CollectorState,
    active: usize,
}

/// State machine plus in-flight counter, both guarded by one lock.
///
/// The lock is never held across an await point.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    inner: Mutex<Inner>,
    drained: Notify,
}

/// Marks one in-flight collection; decrements on drop.
#[derive(Debug)]
pub(crate) struct InFlight<'a> {
    lifecycle: &'a Lifecycle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let remaining = {
            let mut inner = self.lifecycle.lock();
            inner.active -= 1;
            inner.active
        };
        if remaining == 0 {
            self.lifecycle.drained.notify_waiters();
        }
    }
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: CollectorState::Open,
                active: 0,
            }),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> CollectorState {
        self.lock().state
    }

    pub(crate) fn active(&self) -> usize {
        self.lock().active
    }

    /// Registers a collection if the collector is still open.
    pub(crate) fn enter(&self) -> Option<InFlight<'_>> {
        let mut inner = self.lock();
        if inner.state != CollectorState::Open {
            return None;
        }
        inner.active += 1;
        Some(InFlight { lifecycle: self })
    }

    /// The single `Open -> Closing` transition; every other caller loses.
    pub(crate) fn begin_close(&self) -> Result<(), CloseError> {
        let mut inner = self.lock();
        if inner.state != CollectorState::Open {
            return Err(CloseError::AlreadyClosing);
        }
        inner.state = CollectorState::Closing;
        Ok(())
    }

    /// Waits until no collection is in flight or `ctx` ends.
    pub(crate) async fn drain(&self, ctx: &Context) -> Result<(), ContextError> {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between check and await is not lost.
            notified.as_mut().enable();

            if self.active() == 0 {
                return Ok(());
            }
            ctx.run(notified).await?;
        }
    }

    pub(crate) fn finish_close(&self) {
        let mut inner = self.lock();
        debug_assert_eq!(inner.state, CollectorState::Closing);
        debug_assert_eq!(inner.active, 0);
        inner.state = CollectorState::Closed;
    }
}
