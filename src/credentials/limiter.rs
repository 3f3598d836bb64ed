//! Sliding-window rate limiter owned by a single credential.
//!
//! A request is granted only when every configured window has room for it.
//! Granted requests are stamped into every window. A cool-down blocks all
//! acquisitions regardless of window occupancy.

use crate::error::ExtractError;
use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(120);

/// Budget ceiling over one sliding period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub limit: u32,
    pub period: Duration,
}

impl RateWindow {
    pub const fn new(limit: u32, period: Duration) -> Self {
        Self { limit, period }
    }

    /// Standard development-key budgets: 20 per second and 100 per two minutes.
    pub fn development_defaults() -> Vec<RateWindow> {
        vec![
            RateWindow::new(20, Duration::from_secs(1)),
            RateWindow::new(100, Duration::from_secs(120)),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    Granted,
    Wait(Duration),
}

#[derive(Debug)]
struct WindowState {
    window: RateWindow,
    stamps: VecDeque<Instant>,
}

impl WindowState {
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.stamps.front() {
            if *oldest + self.window.period <= now {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until `cost` more requests fit, or `None` when they already do.
    fn wait_for(&self, now: Instant, cost: u32) -> Option<Duration> {
        let in_window = self.stamps.len() as u64;
        let needed = in_window + u64::from(cost);
        let limit = u64::from(self.window.limit);
        if needed <= limit {
            return None;
        }

        let must_expire = (needed - limit) as usize;
        let stamp = self.stamps.get(must_expire - 1)?;
        Some((*stamp + self.window.period).saturating_duration_since(now))
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    windows: Vec<WindowState>,
    cooldown: Duration,
    cooldown_until: Option<Instant>,
    max_cost: u32,
}

impl RateLimiter {
    pub fn new(windows: Vec<RateWindow>, cooldown: Duration) -> Result<Self> {
        if windows.is_empty() {
            bail!("rate limiter requires at least one window");
        }
        for window in &windows {
            if window.limit == 0 {
                bail!("rate window limit must be greater than zero");
            }
            if window.period.is_zero() {
                bail!("rate window period must be greater than zero");
            }
        }

        let max_cost = windows
            .iter()
            .map(|window| window.limit)
            .min()
            .unwrap_or(1);

        Ok(Self {
            windows: windows
                .into_iter()
                .map(|window| WindowState {
                    window,
                    stamps: VecDeque::new(),
                })
                .collect(),
            cooldown,
            cooldown_until: None,
            max_cost,
        })
    }

    pub fn windows(&self) -> Vec<RateWindow> {
        self.windows.iter().map(|state| state.window).collect()
    }

    pub fn acquire(&mut self, cost: u32) -> Acquire {
        self.acquire_at(Instant::now(), cost)
    }

    pub fn acquire_at(&mut self, now: Instant, cost: u32) -> Acquire {
        let cost = cost.clamp(1, self.max_cost);

        if let Some(until) = self.cooldown_until {
            if now < until {
                return Acquire::Wait(until - now);
            }
            self.cooldown_until = None;
        }

        let mut wait = Duration::ZERO;
        for state in &mut self.windows {
            state.prune(now);
            if let Some(needed) = state.wait_for(now, cost) {
                wait = wait.max(needed);
            }
        }
        if !wait.is_zero() {
            return Acquire::Wait(wait);
        }

        for state in &mut self.windows {
            for _ in 0..cost {
                state.stamps.push_back(now);
            }
        }
        Acquire::Granted
    }

    /// Suspends the caller until `cost` requests are granted.
    pub async fn until_ready(&mut self, cost: u32, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(ExtractError::Cancelled.into());
            }
            match self.acquire(cost) {
                Acquire::Granted => return Ok(()),
                Acquire::Wait(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ExtractError::Cancelled.into()),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Blocks all acquisitions for `hint`, or the fixed recovery interval when
    /// the upstream gave no hint. Returns the applied duration.
    pub fn enter_cooldown(&mut self, hint: Option<Duration>) -> Duration {
        self.enter_cooldown_at(Instant::now(), hint)
    }

    pub fn enter_cooldown_at(&mut self, now: Instant, hint: Option<Duration>) -> Duration {
        let duration = hint.filter(|d| !d.is_zero()).unwrap_or(self.cooldown);
        let until = now + duration;
        self.cooldown_until = Some(match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
        duration
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.cooldown_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_remaining().is_some()
    }

    /// Sleeps out any active cool-down without consuming budget.
    pub async fn wait_cooldown(&self, cancel: &CancellationToken) -> Result<()> {
        if let Some(remaining) = self.cooldown_remaining() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ExtractError::Cancelled.into()),
                _ = sleep(remaining) => {}
            }
        }
        Ok(())
    }
}
