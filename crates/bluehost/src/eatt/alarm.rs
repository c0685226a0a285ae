//! Alarm collaborator binding
//!
//! Channels own up to two alarms (application-ack and peer-confirmation).
//! Expiry is never delivered as a callback from a timer thread: the
//! scheduler posts a [`TimerEvent`] into a queue that the stack's single
//! processing context drains and feeds to
//! [`EattExtension::handle_timer_expired`](super::extension::EattExtension::handle_timer_expired),
//! so channel state is only ever mutated from one place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use super::types::ChannelId;
use crate::gap::BdAddr;

/// Which of a channel's two timers fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The peer has not confirmed an outgoing indication
    IndicationConfirmation,
    /// The local application has not acknowledged an incoming indication
    AppAck,
}

/// Expiry notification delivered through the owner's event queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub addr: BdAddr,
    pub cid: ChannelId,
    pub kind: TimerKind,
}

/// Opaque handle to an alarm owned by a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmHandle(pub u64);

/// Capability interface for the timer collaborator
///
/// One production implementation ([`ThreadAlarms`]) and one test double
/// (manually fired) exist; the engine only ever talks to the trait.
pub trait AlarmScheduler {
    /// Allocate a named alarm. The name is diagnostic only.
    fn create(&mut self, name: &str) -> AlarmHandle;

    /// Arm the alarm to deliver `event` after `timeout`. Arming an
    /// already-armed alarm restarts it.
    fn arm(&mut self, handle: AlarmHandle, timeout: Duration, event: TimerEvent);

    /// Disarm without destroying. No-op when the alarm is not armed.
    fn cancel(&mut self, handle: AlarmHandle);

    /// Disarm and release the alarm. The handle is dead afterwards.
    fn destroy(&mut self, handle: AlarmHandle);

    fn is_armed(&self, handle: AlarmHandle) -> bool;
}

struct AlarmEntry {
    name: String,
    /// Bumped on every arm/cancel/destroy; a sleeper only delivers if the
    /// epoch it captured is still current
    epoch: Arc<AtomicU64>,
    armed: Arc<AtomicBool>,
}

/// Thread-backed scheduler posting expiries into an `mpsc` queue
///
/// The receiving end belongs to whoever owns the stack's processing loop;
/// that loop forwards each event into the extension facade.
pub struct ThreadAlarms {
    tx: Sender<TimerEvent>,
    next_handle: u64,
    alarms: HashMap<AlarmHandle, AlarmEntry>,
}

impl ThreadAlarms {
    pub fn new(tx: Sender<TimerEvent>) -> Self {
        Self {
            tx,
            next_handle: 0,
            alarms: HashMap::new(),
        }
    }
}

impl AlarmScheduler for ThreadAlarms {
    fn create(&mut self, name: &str) -> AlarmHandle {
        self.next_handle += 1;
        let handle = AlarmHandle(self.next_handle);
        self.alarms.insert(
            handle,
            AlarmEntry {
                name: name.to_string(),
                epoch: Arc::new(AtomicU64::new(0)),
                armed: Arc::new(AtomicBool::new(false)),
            },
        );
        handle
    }

    fn arm(&mut self, handle: AlarmHandle, timeout: Duration, event: TimerEvent) {
        let Some(entry) = self.alarms.get(&handle) else {
            return;
        };
        debug!("Arming alarm {} for {:?}", entry.name, timeout);

        let expected = entry.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        entry.armed.store(true, Ordering::SeqCst);

        let epoch = Arc::clone(&entry.epoch);
        let armed = Arc::clone(&entry.armed);
        let tx = self.tx.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            if epoch.load(Ordering::SeqCst) == expected {
                armed.store(false, Ordering::SeqCst);
                // Receiver gone means the stack is shutting down
                let _ = tx.send(event);
            }
        });
    }

    fn cancel(&mut self, handle: AlarmHandle) {
        if let Some(entry) = self.alarms.get(&handle) {
            debug!("Cancelling alarm {}", entry.name);
            entry.epoch.fetch_add(1, Ordering::SeqCst);
            entry.armed.store(false, Ordering::SeqCst);
        }
    }

    fn destroy(&mut self, handle: AlarmHandle) {
        if let Some(entry) = self.alarms.remove(&handle) {
            entry.epoch.fetch_add(1, Ordering::SeqCst);
            entry.armed.store(false, Ordering::SeqCst);
        }
    }

    fn is_armed(&self, handle: AlarmHandle) -> bool {
        self.alarms
            .get(&handle)
            .map(|entry| entry.armed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}
