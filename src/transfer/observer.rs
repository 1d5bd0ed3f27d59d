//! Phase observers
//!
//! The transfer stages publish each phase change; a UI, a log, or a test
//! subscribes without the stages knowing how updates are rendered.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::transfer::state::{transition, TransferEvent, TransferPhase};

/// One phase change for one transfer
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseUpdate {
    pub context_id: String,
    pub phase: TransferPhase,
    pub detail: Option<String>,
}

pub trait PhaseObserver: Send + Sync {
    fn on_phase(&self, update: &PhaseUpdate);
}

/// Discards updates
pub struct NoopObserver;

impl PhaseObserver for NoopObserver {
    fn on_phase(&self, _update: &PhaseUpdate) {}
}

/// Writes updates to the log
pub struct LogObserver;

impl PhaseObserver for LogObserver {
    fn on_phase(&self, update: &PhaseUpdate) {
        match &update.detail {
            Some(detail) => log::info!(
                "[{}] phase={} ({})",
                update.context_id,
                update.phase.as_str(),
                detail
            ),
            None => log::info!("[{}] phase={}", update.context_id, update.phase.as_str()),
        }
    }
}

/// Forwards updates into an unbounded channel (observable stream)
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<PhaseUpdate>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PhaseUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PhaseObserver for ChannelObserver {
    fn on_phase(&self, update: &PhaseUpdate) {
        // receiver dropped means nobody is listening any more
        let _ = self.tx.send(update.clone());
    }
}

/// Collects updates in memory (tests and batch callers)
#[derive(Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<PhaseUpdate>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<TransferPhase> {
        self.updates
            .lock()
            .map(|u| u.iter().map(|p| p.phase).collect())
            .unwrap_or_default()
    }

    pub fn updates(&self) -> Vec<PhaseUpdate> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

impl PhaseObserver for RecordingObserver {
    fn on_phase(&self, update: &PhaseUpdate) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(update.clone());
        }
    }
}

/// Tracks the current phase of one flow and notifies on every change
pub(crate) struct PhaseTracker<'a> {
    context_id: &'a str,
    phase: TransferPhase,
    observer: &'a dyn PhaseObserver,
}

impl<'a> PhaseTracker<'a> {
    pub(crate) fn resume(
        context_id: &'a str,
        phase: TransferPhase,
        observer: &'a dyn PhaseObserver,
    ) -> Self {
        Self {
            context_id,
            phase,
            observer,
        }
    }

    pub(crate) fn apply(&mut self, event: TransferEvent, detail: Option<String>) -> TransferPhase {
        let next = transition(self.phase, event);
        if next != self.phase {
            self.phase = next;
            self.observer.on_phase(&PhaseUpdate {
                context_id: self.context_id.to_string(),
                phase: next,
                detail,
            });
        } else {
            log::debug!(
                "[{}] ignored {:?} in phase {}",
                self.context_id,
                event,
                self.phase.as_str()
            );
        }
        next
    }
}

/// Shared no-op observer used when the caller does not subscribe
pub fn noop() -> Arc<dyn PhaseObserver> {
    Arc::new(NoopObserver)
}
