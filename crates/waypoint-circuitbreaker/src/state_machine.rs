//! Pure closed/open/half-open transition logic.
//!
//! Kept free of Redis and caching concerns so the transition rules can be
//! tested in isolation from persistence.

use chrono::{DateTime, Duration, Utc};
use waypoint_core::{CircuitBreakerConfig, CircuitBreakerState, CircuitState};

/// Evaluate whether the breaker currently blocks requests.
///
/// Lazily performs the `open -> half-open` transition in place when the
/// open window has elapsed, matching the spec's "on read" semantics.
pub fn is_open(state: &mut CircuitBreakerState, now: DateTime<Utc>) -> bool {
    match state.state {
        CircuitState::Open => {
            if state.open_until.is_none_or(|until| now >= until) {
                state.state = CircuitState::HalfOpen;
                state.half_open_success_count = 0;
                false
            } else {
                true
            }
        }
        CircuitState::Closed | CircuitState::HalfOpen => false,
    }
}

/// Record a failure. Returns whether the in-memory state changed and should
/// be persisted.
///
/// `failure_threshold <= 0` disables the breaker entirely: the state is
/// force-closed and no further transitions happen. An already-open circuit
/// is not refreshed by further failures (no open-window extension).
pub fn record_failure(
    state: &mut CircuitBreakerState,
    config: &CircuitBreakerConfig,
    now: DateTime<Utc>,
) -> bool {
    if config.failure_threshold <= 0 {
        let changed = state.state != CircuitState::Closed || state.failure_count != 0;
        *state = CircuitBreakerState::default();
        return changed;
    }

    match state.state {
        CircuitState::Open => false,
        CircuitState::HalfOpen => {
            open_circuit(state, config, now);
            true
        }
        CircuitState::Closed => {
            state.failure_count += 1;
            state.last_failure_time = Some(now);
            if i64::from(state.failure_count) >= i64::from(config.failure_threshold) {
                open_circuit(state, config, now);
            }
            true
        }
    }
}

fn open_circuit(state: &mut CircuitBreakerState, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
    state.state = CircuitState::Open;
    state.open_until = Some(now + Duration::milliseconds(i64::try_from(config.open_duration_ms).unwrap_or(i64::MAX)));
    state.failure_count = 0;
    state.half_open_success_count = 0;
}

/// Record a success. Returns whether the in-memory state changed and should
/// be persisted.
pub fn record_success(state: &mut CircuitBreakerState, config: &CircuitBreakerConfig) -> bool {
    match state.state {
        CircuitState::Closed => {
            let changed = state.failure_count != 0;
            state.failure_count = 0;
            changed
        }
        CircuitState::HalfOpen => {
            state.half_open_success_count += 1;
            if state.half_open_success_count >= config.half_open_success_threshold {
                *state = CircuitBreakerState::default();
            }
            true
        }
        CircuitState::Open => false,
    }
}

/// Admin reset: force closed unconditionally.
pub fn reset(state: &mut CircuitBreakerState) {
    *state = CircuitBreakerState::default();
}

/// Smart-probe trip: `open -> half-open` only.
pub fn trip_to_half_open(state: &mut CircuitBreakerState) -> bool {
    if state.state == CircuitState::Open {
        state.state = CircuitState::HalfOpen;
        state.half_open_success_count = 0;
        true
    } else {
        false
    }
}

/// Used when an admin sets `failure_threshold <= 0`: clears state even if
/// currently open or half-open.
pub fn force_close(state: &mut CircuitBreakerState) {
    *state = CircuitBreakerState::default();
}
