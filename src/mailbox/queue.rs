use super::message::Message;
use crate::runtime::scheduler::WakeChannel;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) struct MailboxState {
    pub(super) messages: VecDeque<Message>,
    /// Bumped once per enqueue; never decreases.
    pub(super) msg_count: u64,
    /// `msg_count` as last observed by the waiting side.
    pub(super) last_seen: u64,
    pub(super) wake: Option<WakeChannel>,
}

/// FIFO shared between producers and the worker thread.
///
/// The lock is only held for queue bookkeeping and signalling; no user code ever runs
/// under it, so producers may enqueue from inside step functions and callbacks.
pub(crate) struct Mailbox {
    pub(super) state: Mutex<MailboxState>,
    pub(super) cond: Condvar,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(MailboxState {
                messages: VecDeque::new(),
                msg_count: 0,
                last_seen: 0,
                wake: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `message` to the tail and wakes the waiter. Returns the new enqueue count.
    pub(crate) fn push(&self, message: Message) -> u64 {
        let mut state = self.lock();
        state.messages.push_back(message);
        state.msg_count += 1;
        self.signal(&state);
        state.msg_count
    }

    /// Pops the oldest message without blocking.
    pub(crate) fn pop(&self) -> Option<Message> {
        self.lock().messages.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub(crate) fn msg_count(&self) -> u64 {
        self.lock().msg_count
    }

    /// Routes future notifications to a suspended task as well as the condvar.
    pub(crate) fn attach_wake(&self, wake: WakeChannel) {
        self.lock().wake = Some(wake);
    }

    pub(crate) fn detach_wake(&self) {
        self.lock().wake = None;
    }
}
