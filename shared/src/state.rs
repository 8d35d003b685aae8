/*!
Display model shared between the HMI decoder and the display pusher.
*/

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Default target distance shown on the panel
pub const DEFAULT_DISTANCE: f32 = 5.0;

/// Default side length shown on the panel
pub const DEFAULT_SIDE_LENGTH: f32 = 5.0;

/// Values mirrored on the HMI plus the flags that say what needs resending
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenState {
    pub distance: f32,
    pub side_length: f32,
    pub current: f32,
    pub power: f32,
    /// Highest power seen; only lowered by an explicit override
    pub max_power: f32,
    /// Start was pressed; distance and side length must be sent
    pub start_pending: bool,
    /// Current/power changed since the last push
    pub data_dirty: bool,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self {
            distance: DEFAULT_DISTANCE,
            side_length: DEFAULT_SIDE_LENGTH,
            current: 0.0,
            power: 0.0,
            max_power: 0.0,
            start_pending: false,
            data_dirty: false,
        }
    }
}

/// What one pusher cycle has to transmit, captured under a single lock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PushSnapshot {
    /// Send current and power
    pub send_measurements: bool,
    /// Send distance and side length
    pub send_geometry: bool,
    /// Field values at the time of the snapshot (flags already cleared)
    pub values: ScreenState,
}

/// Cloneable handle on a mutex-guarded [`ScreenState`]
#[derive(Debug, Clone, Default)]
pub struct SharedScreenState {
    inner: Arc<Mutex<ScreenState>>,
}

impl SharedScreenState {
    /// Create a handle on a fresh default state
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle on the given initial state
    pub fn with_state(state: ScreenState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScreenState> {
        // Every critical section leaves the state consistent, so a poisoned
        // lock still holds usable data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new sample and ratchet the maximum power
    pub fn update_current_power(&self, current: f32, power: f32) {
        let mut state = self.lock();
        state.current = current;
        state.power = power;
        if power > state.max_power {
            state.max_power = power;
            info!("📈 New max power: {:.3} W", power);
        }
        state.data_dirty = true;
    }

    /// Set the maximum power unconditionally
    pub fn override_max_power(&self, value: f32) {
        let mut state = self.lock();
        state.max_power = value;
        state.data_dirty = true;
    }

    /// Request distance and side length to be sent on the next push
    pub fn notify_start_pressed(&self) {
        self.lock().start_pending = true;
        info!("▶️ Start pressed, distance and side length queued");
    }

    /// Distance sent on the next start press; does not mark data dirty
    pub fn set_distance(&self, distance: f32) {
        self.lock().distance = distance;
    }

    /// Side length sent on the next start press; does not mark data dirty
    pub fn set_side_length(&self, side_length: f32) {
        self.lock().side_length = side_length;
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ScreenState {
        *self.lock()
    }

    /// Read and clear both pending flags in one critical section
    pub fn take_pending(&self) -> PushSnapshot {
        let mut state = self.lock();
        let snapshot = PushSnapshot {
            send_measurements: state.data_dirty,
            send_geometry: state.start_pending,
            values: ScreenState {
                data_dirty: false,
                start_pending: false,
                ..*state
            },
        };
        state.data_dirty = false;
        state.start_pending = false;
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = SharedScreenState::new().snapshot();
        assert_eq!(state.distance, 5.0);
        assert_eq!(state.side_length, 5.0);
        assert_eq!(state.max_power, 0.0);
        assert!(!state.start_pending);
        assert!(!state.data_dirty);
    }

    #[test]
    fn test_max_power_ratchet() {
        let state = SharedScreenState::new();
        let samples = [1.0, 3.5, 2.0, 3.5, 0.5, 4.0, -1.0];
        let mut previous_max = state.snapshot().max_power;

        for power in samples {
            state.update_current_power(0.1, power);
            let now = state.snapshot();
            assert_eq!(now.power, power);
            assert!(now.max_power >= previous_max);
            previous_max = now.max_power;
        }
        assert_eq!(previous_max, 4.0);
    }

    #[test]
    fn test_repeated_update_is_idempotent() {
        let state = SharedScreenState::new();
        state.update_current_power(2.0, 7.0);
        let first = state.snapshot();
        state.update_current_power(2.0, 7.0);
        state.update_current_power(2.0, 7.0);
        assert_eq!(state.snapshot(), first);
    }

    #[test]
    fn test_override_can_lower_max() {
        let state = SharedScreenState::new();
        state.update_current_power(1.0, 10.0);
        state.take_pending();

        state.override_max_power(2.0);
        let now = state.snapshot();
        assert_eq!(now.max_power, 2.0);
        assert!(now.data_dirty);

        // Ratchet resumes from the overridden value
        state.update_current_power(1.0, 3.0);
        assert_eq!(state.snapshot().max_power, 3.0);
    }

    #[test]
    fn test_take_pending_clears_flags() {
        let state = SharedScreenState::new();
        state.update_current_power(1.5, 2.5);
        state.notify_start_pressed();

        let snapshot = state.take_pending();
        assert!(snapshot.send_measurements);
        assert!(snapshot.send_geometry);
        assert_eq!(snapshot.values.current, 1.5);
        assert_eq!(snapshot.values.power, 2.5);

        let again = state.take_pending();
        assert!(!again.send_measurements);
        assert!(!again.send_geometry);
        assert_eq!(again.values.max_power, 2.5);
    }

    #[test]
    fn test_geometry_setters_do_not_mark_dirty() {
        let state = SharedScreenState::new();
        state.set_distance(12.5);
        state.set_side_length(3.25);

        let now = state.snapshot();
        assert_eq!(now.distance, 12.5);
        assert_eq!(now.side_length, 3.25);
        assert!(!now.data_dirty);
    }

    #[test]
    fn test_updates_from_many_threads() {
        let state = SharedScreenState::new();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let state = state.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        state.update_current_power(t as f32, (t * 100 + i) as f32);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(state.snapshot().max_power, 399.0);
    }
}
