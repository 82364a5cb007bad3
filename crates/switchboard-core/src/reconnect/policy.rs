//! Single-flight retry bookkeeping per service

use super::backoff::BackoffConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a service is in its retry cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectPhase {
    /// No retry pending
    Idle,
    /// A timer is armed
    Scheduled,
    /// An open attempt is running
    InFlight,
    /// Automatic retries gave up; only a manual reconnect resumes
    Exhausted,
}

/// Retry state of one service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconnectionState {
    /// Retries scheduled since the last successful open
    pub attempt: u32,
    pub max_attempts: u32,
    pub phase: ReconnectPhase,
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(with = "humantime_serde")]
    pub last_delay: Duration,
    pub last_failure: Option<String>,
    pub backoff: BackoffConfig,
    /// Bumped whenever a pending timer must be invalidated
    pub generation: u64,
}

impl ReconnectionState {
    fn new(max_attempts: u32, backoff: BackoffConfig) -> Self {
        Self {
            attempt: 0,
            max_attempts,
            phase: ReconnectPhase::Idle,
            next_retry_at: None,
            last_delay: Duration::ZERO,
            last_failure: None,
            backoff,
            generation: 0,
        }
    }

    fn reset(&mut self) {
        self.attempt = 0;
        self.last_delay = Duration::ZERO;
        self.next_retry_at = None;
        self.generation += 1;
    }
}

/// What the caller should do after reporting a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Arm a timer; the retry must present `generation`
    Schedule {
        delay: Duration,
        attempt: u32,
        generation: u64,
    },
    /// A retry is already scheduled or running
    AlreadyPending,
    /// Attempts are used up
    Exhausted { attempts: u32 },
    /// The report belongs to a superseded retry cycle
    Stale,
}

/// Retry bookkeeping for every registered service
#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    states: Mutex<HashMap<String, ReconnectionState>>,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; existing state is kept and its limits updated
    pub fn register(&self, service: &str, max_attempts: u32, backoff: BackoffConfig) {
        let mut states = self.states.lock();
        states
            .entry(service.to_string())
            .and_modify(|s| {
                s.max_attempts = max_attempts;
                s.backoff = backoff;
            })
            .or_insert_with(|| ReconnectionState::new(max_attempts, backoff));
    }

    pub fn remove(&self, service: &str) -> Option<ReconnectionState> {
        self.states.lock().remove(service)
    }

    /// Report a connection-level failure outside a retry attempt
    pub fn on_failure(&self, service: &str, error: &str) -> RetryDecision {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(service) else {
            return RetryDecision::Stale;
        };
        state.last_failure = Some(error.to_string());

        match state.phase {
            ReconnectPhase::Scheduled | ReconnectPhase::InFlight => RetryDecision::AlreadyPending,
            ReconnectPhase::Exhausted => RetryDecision::Exhausted {
                attempts: state.attempt,
            },
            ReconnectPhase::Idle => schedule(service, state),
        }
    }

    /// Claim a scheduled retry; false when the timer is stale
    pub fn begin_attempt(&self, service: &str, generation: u64) -> bool {
        let mut states = self.states.lock();
        match states.get_mut(service) {
            Some(state)
                if state.generation == generation && state.phase == ReconnectPhase::Scheduled =>
            {
                state.phase = ReconnectPhase::InFlight;
                state.next_retry_at = None;
                true
            }
            _ => false,
        }
    }

    /// Report that a retry or manual attempt failed
    pub fn on_attempt_failed(&self, service: &str, generation: u64, error: &str) -> RetryDecision {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(service) else {
            return RetryDecision::Stale;
        };
        if state.generation != generation || state.phase != ReconnectPhase::InFlight {
            return RetryDecision::Stale;
        }
        state.last_failure = Some(error.to_string());
        state.phase = ReconnectPhase::Idle;
        schedule(service, state)
    }

    /// A connection opened; the cycle starts over
    pub fn on_success(&self, service: &str) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(service) {
            if state.attempt > 0 {
                debug!(service = %service, attempts = state.attempt, "reconnected");
            }
            state.reset();
            state.phase = ReconnectPhase::Idle;
            state.last_failure = None;
        }
    }

    /// Start a manual attempt: any timer is invalidated and the attempt
    /// counter restarts at zero. Returns the generation to report back with.
    pub fn manual(&self, service: &str) -> Option<u64> {
        let mut states = self.states.lock();
        let state = states.get_mut(service)?;
        state.reset();
        state.phase = ReconnectPhase::InFlight;
        Some(state.generation)
    }

    /// End an attempt that failed for a reason retries cannot fix
    pub fn settle(&self, service: &str, generation: u64) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(service) {
            if state.generation == generation && state.phase == ReconnectPhase::InFlight {
                state.phase = ReconnectPhase::Idle;
            }
        }
    }

    /// Whether `generation` is the attempt currently in flight
    pub fn is_current(&self, service: &str, generation: u64) -> bool {
        self.states
            .lock()
            .get(service)
            .is_some_and(|s| s.generation == generation && s.phase == ReconnectPhase::InFlight)
    }

    /// Invalidate the pending timer of one service
    pub fn cancel(&self, service: &str) {
        if let Some(state) = self.states.lock().get_mut(service) {
            cancel_state(state);
        }
    }

    /// Invalidate every pending timer
    pub fn cancel_all(&self) {
        for state in self.states.lock().values_mut() {
            cancel_state(state);
        }
    }

    pub fn snapshot(&self, service: &str) -> Option<ReconnectionState> {
        self.states.lock().get(service).cloned()
    }

    pub fn is_exhausted(&self, service: &str) -> bool {
        self.phase(service) == Some(ReconnectPhase::Exhausted)
    }

    /// Whether a retry is scheduled or running
    pub fn is_pending(&self, service: &str) -> bool {
        matches!(
            self.phase(service),
            Some(ReconnectPhase::Scheduled | ReconnectPhase::InFlight)
        )
    }

    fn phase(&self, service: &str) -> Option<ReconnectPhase> {
        self.states.lock().get(service).map(|s| s.phase)
    }
}

fn cancel_state(state: &mut ReconnectionState) {
    state.generation += 1;
    state.next_retry_at = None;
    if matches!(state.phase, ReconnectPhase::Scheduled | ReconnectPhase::InFlight) {
        state.phase = ReconnectPhase::Idle;
    }
}

fn schedule(service: &str, state: &mut ReconnectionState) -> RetryDecision {
    if state.attempt >= state.max_attempts {
        state.phase = ReconnectPhase::Exhausted;
        state.next_retry_at = None;
        warn!(
            service = %service,
            attempts = state.attempt,
            "reconnection attempts exhausted"
        );
        return RetryDecision::Exhausted {
            attempts: state.attempt,
        };
    }

    let delay = state
        .backoff
        .delay_for_attempt(state.attempt, state.last_delay);
    state.attempt += 1;
    state.last_delay = delay;
    state.generation += 1;
    state.phase = ReconnectPhase::Scheduled;
    state.next_retry_at = chrono::Duration::from_std(delay)
        .ok()
        .map(|d| Utc::now() + d);

    debug!(
        service = %service,
        attempt = state.attempt,
        delay_ms = delay.as_millis() as u64,
        "reconnection scheduled"
    );
    RetryDecision::Schedule {
        delay,
        attempt: state.attempt,
        generation: state.generation,
    }
}
