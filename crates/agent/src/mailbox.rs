//! Side channel for messages that arrive while a run is in progress.
//!
//! An interrupt lands in a single slot (newest wins) that the controller
//! drains at the start of every step. Queued messages wait in a FIFO for the
//! caller to deliver after the run finishes.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct Slots {
    interrupt: Option<String>,
    queued: VecDeque<String>,
}

#[derive(Default)]
pub struct Mailbox {
    slots: Mutex<Slots>,
    working: AtomicBool,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to the current run at its next step.
    pub fn send_interrupt(&self, message: impl Into<String>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.interrupt = Some(message.into());
        }
    }

    pub fn take_interrupt(&self) -> Option<String> {
        self.slots.lock().ok()?.interrupt.take()
    }

    /// Hold `message` until the current run completes.
    pub fn queue_message(&self, message: impl Into<String>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.queued.push_back(message.into());
        }
    }

    pub fn pop_queued(&self) -> Option<String> {
        self.slots.lock().ok()?.queued.pop_front()
    }

    pub fn has_queued(&self) -> bool {
        self.slots.lock().map(|s| !s.queued.is_empty()).unwrap_or(false)
    }

    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    pub(crate) fn set_working(&self, working: bool) {
        self.working.store(working, Ordering::SeqCst);
    }
}
