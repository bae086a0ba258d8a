//! Start/stop delay timers that post ticks to their owner

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A tick posted by a [`Timer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick<K> {
    pub kind: K,
    pub generation: u64,
}

/// Owned delay timer
///
/// Every `start` bumps the generation, so ticks already queued by an earlier
/// run are rejected by [`Timer::accept`]. Dropping the timer cancels it.
pub struct Timer<K: Copy + Send + 'static> {
    kind: K,
    ticks: mpsc::UnboundedSender<TimerTick<K>>,
    generation: u64,
    repeating: bool,
    task: Option<JoinHandle<()>>,
}

impl<K: Copy + Send + 'static> Timer<K> {
    /// Create a stopped timer posting `kind` ticks to `ticks`
    pub fn new(kind: K, ticks: mpsc::UnboundedSender<TimerTick<K>>) -> Self {
        Self {
            kind,
            ticks,
            generation: 0,
            repeating: false,
            task: None,
        }
    }

    /// (Re)start the timer. A running timer is stopped first.
    pub fn start(&mut self, interval: Duration, repeating: bool) {
        self.stop();

        self.generation += 1;
        self.repeating = repeating;

        let tick = TimerTick {
            kind: self.kind,
            generation: self.generation,
        };
        let ticks = self.ticks.clone();

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if ticks.send(tick).is_err() || !repeating {
                    break;
                }
            }
        }));
    }

    /// Cancel the current run, if any
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a run is in progress
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Check whether a received tick belongs to the current run.
    ///
    /// A one-shot timer counts as stopped once its tick is accepted.
    pub fn accept(&mut self, tick: &TimerTick<K>) -> bool {
        if self.task.is_none() || tick.generation != self.generation {
            return false;
        }
        if !self.repeating {
            self.task = None;
        }
        true
    }
}

impl<K: Copy + Send + 'static> Drop for Timer<K> {
    fn drop(&mut self) {
        self.stop();
    }
}
