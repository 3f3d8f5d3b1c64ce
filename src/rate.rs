//! Fixed-rate tick scheduling.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

/// Sleeps until successive deadlines spaced one period apart.
///
/// Deadlines advance by exactly one period, so short overruns are absorbed
/// by the next sleep. After falling more than a full period behind, the
/// schedule restarts from the current instant instead of bursting.
#[derive(Debug)]
pub struct Rate {
    period: Duration,
    last_deadline: Instant,
}

impl Rate {
    pub fn new(hz: f64) -> Result<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(anyhow!("rate must be a positive number of hertz (got {})", hz));
        }
        let period = Duration::try_from_secs_f64(1.0 / hz)
            .map_err(|e| anyhow!("rate of {} Hz has no representable period: {}", hz, e))?;
        Ok(Self::from_period(period))
    }

    pub fn from_period(period: Duration) -> Self {
        Self {
            period,
            last_deadline: Instant::now(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn sleep(&mut self) {
        let deadline = self.last_deadline + self.period;
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        self.last_deadline = deadline;

        let now = Instant::now();
        if now.saturating_duration_since(self.last_deadline) > self.period {
            log::debug!("tick overran by more than one period; resetting schedule");
            self.last_deadline = now;
        }
    }
}
