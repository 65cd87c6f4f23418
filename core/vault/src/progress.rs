//! Progress and notification channel for long-running operations.
//!
//! The engine announces a maximum once, then ticks strictly upwards to at
//! most that maximum, and resets when the operation ends either way.
//! Observers are called on whatever thread runs the engine; callers that
//! need events elsewhere forward them themselves.

use tracing::{info, warn};

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Total number of steps the operation will take.
    MaximumDetermined(u64),
    /// Number of steps completed so far.
    ProgressChanged(u64),
    /// The operation finished or aborted.
    ProgressReset,
    /// Informational or warning text.
    Message(String),
}

/// Receiver of engine notifications. Every method defaults to a no-op.
pub trait ProgressObserver: Send {
    /// Called once per operation with its total step count.
    fn on_maximum_determined(&mut self, _total: u64) {}

    /// Called after each step.
    fn on_progress_changed(&mut self, _current: u64) {}

    /// Called when the operation ends.
    fn on_progress_reset(&mut self) {}

    /// Called with human readable text.
    fn on_message(&mut self, _text: &str) {}
}

/// Log `text` and pass it to the observer.
pub(crate) fn notify(observer: &mut dyn ProgressObserver, text: &str) {
    info!("{}", text);
    observer.on_message(text);
}

/// Log `text` as a warning and pass it to the observer.
pub(crate) fn warn_observer(observer: &mut dyn ProgressObserver, text: &str) {
    warn!("{}", text);
    observer.on_message(text);
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {}

impl<F> ProgressObserver for F
where
    F: FnMut(ProgressEvent) + Send,
{
    fn on_maximum_determined(&mut self, total: u64) {
        self(ProgressEvent::MaximumDetermined(total));
    }

    fn on_progress_changed(&mut self, current: u64) {
        self(ProgressEvent::ProgressChanged(current));
    }

    fn on_progress_reset(&mut self) {
        self(ProgressEvent::ProgressReset);
    }

    fn on_message(&mut self, text: &str) {
        self(ProgressEvent::Message(text.to_string()));
    }
}

/// Step counter for one operation.
///
/// Announces the maximum on creation and resets the observer on drop, so
/// every exit path (including `?`) ends with a reset.
pub(crate) struct Ticker<'a> {
    observer: &'a mut dyn ProgressObserver,
    maximum: u64,
    current: u64,
}

impl<'a> Ticker<'a> {
    pub(crate) fn start(observer: &'a mut dyn ProgressObserver, maximum: u64) -> Self {
        observer.on_maximum_determined(maximum);
        Self {
            observer,
            maximum,
            current: 0,
        }
    }

    /// Advance by one step, never past the maximum.
    pub(crate) fn tick(&mut self) {
        if self.current < self.maximum {
            self.current += 1;
            self.observer.on_progress_changed(self.current);
        }
    }

    pub(crate) fn message(&mut self, text: &str) {
        notify(self.observer, text);
    }

    pub(crate) fn warning(&mut self, text: &str) {
        warn_observer(self.observer, text);
    }
}

impl Drop for Ticker<'_> {
    fn drop(&mut self) {
        self.observer.on_progress_reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_closure_observer_receives_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut observer = move |event: ProgressEvent| sink.lock().unwrap().push(event);

        {
            let mut ticker = Ticker::start(&mut observer, 2);
            ticker.tick();
            ticker.message("halfway");
            ticker.tick();
            ticker.tick();
        }

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ProgressEvent::MaximumDetermined(2),
                ProgressEvent::ProgressChanged(1),
                ProgressEvent::Message("halfway".to_string()),
                ProgressEvent::ProgressChanged(2),
                ProgressEvent::ProgressReset,
            ]
        );
    }

    #[test]
    fn test_reset_on_early_exit() {
        fn failing(observer: &mut dyn ProgressObserver) -> Result<(), ()> {
            let mut ticker = Ticker::start(observer, 10);
            ticker.tick();
            Err(())
        }

        let mut seen = Vec::new();
        let mut observer = |event: ProgressEvent| seen.push(event);
        assert!(failing(&mut observer).is_err());
        assert_eq!(seen.last(), Some(&ProgressEvent::ProgressReset));
    }
}
