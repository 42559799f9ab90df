//! Circuit breaker shared by every fetch task.
//!
//! ```text
//! Closed { n } --n reaches threshold--> Open { until }
//! Open { until } --until passed, first caller--> HalfOpen (single probe)
//! HalfOpen --probe ok--> Closed { 0 }
//! HalfOpen --probe transient failure--> Open { now + cooldown }
//! ```
//!
//! Every transition bumps a generation counter. A permit only reports into
//! the generation it was admitted in, so results of requests that were in
//! flight when the breaker opened are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed { consecutive_failures: u32 },
    Open { until: Instant },
    HalfOpen,
}

#[derive(Debug)]
struct Shared {
    state: BreakerState,
    generation: u64,
}

#[derive(Debug)]
struct Inner {
    threshold: u32,
    cooldown: Duration,
    shared: Mutex<Shared>,
    changed: Notify,
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    inner: Arc<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                threshold: threshold.max(1),
                cooldown,
                shared: Mutex::new(Shared {
                    state: BreakerState::Closed {
                        consecutive_failures: 0,
                    },
                    generation: 0,
                }),
                changed: Notify::new(),
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn cooldown(&self) -> Duration {
        self.inner.cooldown
    }

    /// Wait until a request may be sent.
    ///
    /// While open, callers sleep until the cooldown ends; the first caller
    /// after that becomes the probe and everyone else waits for its result.
    pub async fn acquire(&self) -> BreakerPermit {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let open_until = {
                let mut shared = self.lock();
                match shared.state {
                    BreakerState::Closed { .. } => {
                        return BreakerPermit::new(self.clone(), shared.generation, false);
                    }
                    BreakerState::Open { until } if Instant::now() >= until => {
                        self.transition(&mut shared, BreakerState::HalfOpen);
                        info!("circuit breaker half-open, sending probe");
                        return BreakerPermit::new(self.clone(), shared.generation, true);
                    }
                    BreakerState::Open { until } => Some(until),
                    BreakerState::HalfOpen => None,
                }
            };

            match open_until {
                Some(until) => {
                    tokio::select! {
                        _ = &mut changed => {}
                        _ = tokio::time::sleep_until(until) => {}
                    }
                }
                None => changed.await,
            }
        }
    }

    fn on_success(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!("ignoring stale success");
            return;
        }
        match shared.state {
            BreakerState::Closed { .. } => {
                shared.state = BreakerState::Closed {
                    consecutive_failures: 0,
                };
            }
            BreakerState::HalfOpen => {
                self.transition(
                    &mut shared,
                    BreakerState::Closed {
                        consecutive_failures: 0,
                    },
                );
                info!("circuit breaker closed");
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn on_transient_failure(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation != generation {
            debug!("ignoring stale failure");
            return;
        }
        match shared.state {
            BreakerState::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.inner.threshold {
                    let until = Instant::now() + self.inner.cooldown;
                    self.transition(&mut shared, BreakerState::Open { until });
                    warn!(
                        failures,
                        cooldown_ms = self.inner.cooldown.as_millis() as u64,
                        "circuit breaker opened"
                    );
                } else {
                    shared.state = BreakerState::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            BreakerState::HalfOpen => {
                let until = Instant::now() + self.inner.cooldown;
                self.transition(&mut shared, BreakerState::Open { until });
                warn!(
                    cooldown_ms = self.inner.cooldown.as_millis() as u64,
                    "probe failed, circuit breaker re-opened"
                );
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut shared = self.lock();
        if shared.generation == generation && shared.state == BreakerState::HalfOpen {
            self.transition(
                &mut shared,
                BreakerState::Open {
                    until: Instant::now(),
                },
            );
            debug!("probe abandoned, next caller probes");
        }
    }

    fn transition(&self, shared: &mut Shared, state: BreakerState) {
        shared.state = state;
        shared.generation += 1;
        self.inner.changed.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission to send one request. Report its outcome with
/// [`record_success`](Self::record_success) or
/// [`record_transient_failure`](Self::record_transient_failure); a probe
/// dropped without a report hands the probe slot to the next caller.
#[derive(Debug)]
#[must_use]
pub struct BreakerPermit {
    breaker: CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl BreakerPermit {
    fn new(breaker: CircuitBreaker, generation: u64, probe: bool) -> Self {
        Self {
            breaker,
            generation,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    /// The upstream answered. Not-found and other non-transient answers
    /// count here too.
    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation);
    }

    pub fn record_transient_failure(mut self) {
        self.settled = true;
        self.breaker.on_transient_failure(self.generation);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.breaker.release_probe(self.generation);
        }
    }
}
