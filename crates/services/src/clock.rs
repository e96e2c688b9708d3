//! Tick sources that drive a practice session.
//!
//! A tick source pushes [`ClockTick`]s into a channel owned by the task that
//! also owns the phase controller, so ticks and commands are handled one at a
//! time. Each tick carries a strictly increasing sequence number and the whole
//! seconds that passed since the previous delivered tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::SessionError;

/// One delivery from a tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub sequence: u64,
    pub seconds: u32,
}

pub type TickSender = mpsc::UnboundedSender<ClockTick>;
pub type TickReceiver = mpsc::UnboundedReceiver<ClockTick>;

/// Something that can deliver ticks to a session.
pub trait TickSource: Send {
    /// Begin delivering ticks into `sink`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::ClockAlreadyRunning` when already started and
    /// `SessionError::ClockUnavailable` when ticks cannot be scheduled.
    fn start(&mut self, sink: TickSender) -> Result<(), SessionError>;

    /// Stop delivering ticks. Safe to call when already stopped.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Wall-clock tick source backed by a tokio interval.
///
/// Time that has not yet added up to a whole second is kept across
/// `stop`/`start`, so pausing never drops running time.
pub struct SessionClock {
    period: Duration,
    sequence: Arc<AtomicU64>,
    timing: Arc<Mutex<Timing>>,
    task: Option<JoinHandle<()>>,
}

/// Bookkeeping shared between the clock and its ticking task.
#[derive(Default)]
struct Timing {
    /// Bumped on every start and stop; a task from an older run exits.
    generation: u64,
    /// Instant of the last accounted moment while running.
    last: Option<Instant>,
    /// Running time not yet delivered as a whole second.
    carry: Duration,
}

impl Timing {
    /// Fold the time since `last` into the carry and return the whole seconds
    /// that are ready.
    fn settle(&mut self, now: Instant) -> u64 {
        if let Some(last) = self.last.replace(now) {
            self.carry += now.saturating_duration_since(last);
        }
        let whole = self.carry.as_secs();
        self.carry -= Duration::from_secs(whole);
        whole
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    /// A clock ticking once per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    #[must_use]
    pub fn with_period(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            sequence: Arc::new(AtomicU64::new(0)),
            timing: Arc::new(Mutex::new(Timing::default())),
            task: None,
        }
    }

    fn timing(&self) -> MutexGuard<'_, Timing> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TickSource for SessionClock {
    fn start(&mut self, sink: TickSender) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::ClockAlreadyRunning);
        }
        let handle = Handle::try_current().map_err(|_| SessionError::ClockUnavailable)?;

        let started = Instant::now();
        let (generation, first_delay) = {
            let mut timing = self.timing();
            timing.generation += 1;
            timing.last = Some(started);
            (
                timing.generation,
                Duration::from_secs(1).saturating_sub(timing.carry),
            )
        };

        let period = self.period;
        let sequence = Arc::clone(&self.sequence);
        let timing = Arc::clone(&self.timing);
        let mut interval = time::interval_at(started + first_delay.min(period), period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let task = handle.spawn(async move {
            loop {
                interval.tick().await;
                let mut state = timing.lock().unwrap_or_else(PoisonError::into_inner);
                if state.generation != generation {
                    break;
                }
                let whole = state.settle(Instant::now());
                if whole == 0 {
                    continue;
                }

                let tick = ClockTick {
                    sequence: sequence.fetch_add(1, Ordering::SeqCst) + 1,
                    seconds: u32::try_from(whole).unwrap_or(u32::MAX),
                };
                if sink.send(tick).is_err() {
                    log::debug!("tick receiver dropped; clock task exiting");
                    break;
                }
            }
        });

        self.task = Some(task);
        log::debug!("session clock started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let mut timing = self.timing();
            timing.generation += 1;
            if let Some(last) = timing.last.take() {
                timing.carry += Instant::now().saturating_duration_since(last);
            }
            log::debug!("session clock stopped with {:?} carried", timing.carry);
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick source driven by hand, for tests and hosts that own their own timing.
///
/// Clones share state: keep one clone to call [`ManualTicks::fire`] after the
/// other has been handed to a controller.
#[derive(Clone, Default)]
pub struct ManualTicks {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    sink: Option<TickSender>,
    sequence: u64,
    unavailable: bool,
}

impl ManualTicks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose `start` always fails with `ClockUnavailable`.
    #[must_use]
    pub fn unavailable() -> Self {
        let ticks = Self::default();
        ticks.set_available(false);
        ticks
    }

    pub fn set_available(&self, available: bool) {
        self.lock().unavailable = !available;
    }

    /// Deliver a tick covering `seconds`. Returns `false` while stopped.
    pub fn fire(&self, seconds: u32) -> bool {
        let mut state = self.lock();
        let Some(sink) = state.sink.clone() else {
            return false;
        };
        state.sequence += 1;
        let tick = ClockTick {
            sequence: state.sequence,
            seconds,
        };
        sink.send(tick).is_ok()
    }

    /// Deliver `count` one-second ticks. Returns how many were delivered.
    pub fn fire_many(&self, count: u32) -> u32 {
        let mut delivered = 0;
        for _ in 0..count {
            if !self.fire(1) {
                break;
            }
            delivered += 1;
        }
        delivered
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TickSource for ManualTicks {
    fn start(&mut self, sink: TickSender) -> Result<(), SessionError> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(SessionError::ClockUnavailable);
        }
        if state.sink.is_some() {
            return Err(SessionError::ClockAlreadyRunning);
        }
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.lock().sink = None;
    }

    fn is_running(&self) -> bool {
        self.lock().sink.is_some()
    }
}
