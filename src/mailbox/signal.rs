use super::queue::{Mailbox, MailboxState};
use crate::runtime::scheduler::WakeEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;
use std::time::Duration;

impl Mailbox {
    /// Wakes whoever is parked on this mailbox. A no-op when nobody waits.
    pub(crate) fn notify(&self) {
        let state = self.lock();
        self.signal(&state);
    }

    /// Signals while the caller holds the state lock, so a waiter that has checked the
    /// counters but not yet parked cannot miss it.
    pub(super) fn signal(&self, state: &MailboxState) {
        self.cond.notify_one();
        if let Some(wake) = &state.wake {
            wake.wake();
        }
    }

    fn work_pending(state: &MailboxState, run: &AtomicBool) -> bool {
        !run.load(Ordering::SeqCst)
            || (!state.messages.is_empty() && state.last_seen != state.msg_count)
    }

    /// Blocks the OS thread for up to `limit` (or until notified when `None`).
    ///
    /// Returns immediately when the worker is stopping or new messages arrived since the
    /// last wait.
    pub(crate) fn wait_blocking(&self, run: &AtomicBool, limit: Option<Duration>) {
        let mut state = self.lock();
        let pending = Self::work_pending(&state, run);
        state.last_seen = state.msg_count;
        if pending {
            return;
        }

        state = match limit {
            Some(limit) => {
                self.cond
                    .wait_timeout(state, limit)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self.cond.wait(state).unwrap_or_else(PoisonError::into_inner),
        };
        state.last_seen = state.msg_count;
    }

    /// Suspends the current task on `event` instead of blocking the thread. Same early
    /// return rules as [`Mailbox::wait_blocking`].
    pub(crate) async fn wait_cooperative(
        &self,
        run: &AtomicBool,
        event: &mut WakeEvent,
        limit: Option<Duration>,
    ) {
        {
            let mut state = self.lock();
            // Producers queue wakes under this lock, so every wake already in the channel
            // belongs to a message counted below.
            event.drain();
            let pending = Self::work_pending(&state, run);
            state.last_seen = state.msg_count;
            if pending {
                return;
            }
        }

        event.wait(limit).await;

        let mut state = self.lock();
        state.last_seen = state.msg_count;
    }
}
