//! Long-press lock gesture
//!
//! Press, hold, release. The state machine is a pure function of the
//! current state and one debounced reading; [`LockGesture`] wires it to a
//! debouncer and a pin.

use crate::debounce::{Debouncer, Reading};
use crate::error::PinError;
use crate::pin::InputPin;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GestureConfig {
    /// How long the press must last before release counts as a lock
    pub min_hold: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureState {
    Idle,
    Pressed { since: Instant },
    Held,
}

/// One debounced observation of the button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureInput {
    Press(Instant),
    Release(Instant),
    /// The debounce window disagreed with itself
    Jitter,
}

/// Emitted on state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Pressed,
    Held,
    /// Released before `min_hold`; no lock
    Tap,
    /// Completed press-hold-release
    Lock,
}

impl GestureState {
    pub fn transition(self, input: GestureInput, min_hold: Duration) -> (Self, Option<ButtonEvent>) {
        use GestureInput::*;
        use GestureState::*;

        match (self, input) {
            // Unstable readings never move the machine
            (state, Jitter) => (state, None),

            (Idle, Press(at)) => (Pressed { since: at }, Some(ButtonEvent::Pressed)),
            (Idle, Release(_)) => (Idle, None),

            (Pressed { since }, Press(at)) if at.saturating_duration_since(since) >= min_hold => {
                (Held, Some(ButtonEvent::Held))
            }
            (Pressed { since }, Press(_)) => (Pressed { since }, None),
            (Pressed { since }, Release(at)) if at.saturating_duration_since(since) >= min_hold => {
                (Idle, Some(ButtonEvent::Lock))
            }
            (Pressed { .. }, Release(_)) => (Idle, Some(ButtonEvent::Tap)),

            (Held, Press(_)) => (Held, None),
            (Held, Release(_)) => (Idle, Some(ButtonEvent::Lock)),
        }
    }
}

/// Lock-gesture detector over a debounced pin
pub struct LockGesture<D> {
    debouncer: D,
    config: GestureConfig,
    state: GestureState,
    locks: u64,
}

impl<D: Debouncer> LockGesture<D> {
    pub fn new(debouncer: D, config: GestureConfig) -> Self {
        Self {
            debouncer,
            config,
            state: GestureState::Idle,
            locks: 0,
        }
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    /// Completed gestures since construction
    pub fn locks(&self) -> u64 {
        self.locks
    }

    /// Advance the machine by one reading taken at `now`
    pub fn feed(&mut self, reading: Reading, now: Instant) -> Option<ButtonEvent> {
        let input = match reading {
            Reading::Stable(level) if level == self.debouncer.active_level() => GestureInput::Press(now),
            Reading::Stable(_) => GestureInput::Release(now),
            Reading::Unstable => GestureInput::Jitter,
        };
        let (next, event) = self.state.transition(input, self.config.min_hold);
        if next != self.state {
            log::debug!("Button {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        if event == Some(ButtonEvent::Lock) {
            self.locks += 1;
        }
        event
    }

    /// Take one debounced reading; once a press is seen keep reading until
    /// the gesture resolves
    ///
    /// Returns `true` on a completed lock. Blocks while the button is held,
    /// but no later than `deadline`; an unresolved press is then carried
    /// into the next call.
    pub fn poll(
        &mut self,
        pin: &mut dyn InputPin,
        deadline: Option<Instant>,
    ) -> Result<bool, PinError> {
        loop {
            let reading = self.debouncer.sample(pin)?;
            let now = Instant::now();
            match self.feed(reading, now) {
                Some(ButtonEvent::Lock) => return Ok(true),
                Some(ButtonEvent::Tap) => return Ok(false),
                _ if self.state == GestureState::Idle => return Ok(false),
                _ if deadline.map_or(false, |d| now >= d) => return Ok(false),
                _ => {}
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = GestureState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debounce::{DebounceConfig, PollingDebouncer};
    use crate::pin::scripted::ScriptedPin;
    use crate::pin::Level;

    fn gesture(samples: u32, min_hold: Duration) -> LockGesture<PollingDebouncer> {
        LockGesture::new(
            PollingDebouncer::new(DebounceConfig {
                samples,
                interval: Duration::ZERO,
                active_level: Level::High,
            }),
            GestureConfig { min_hold },
        )
    }

    #[test]
    fn test_transition_table() {
        let t0 = Instant::now();
        let hold = Duration::from_millis(50);
        let later = t0 + hold;

        let (s, e) = GestureState::Idle.transition(GestureInput::Press(t0), hold);
        assert_eq!(s, GestureState::Pressed { since: t0 });
        assert_eq!(e, Some(ButtonEvent::Pressed));

        let (s, e) = s.transition(GestureInput::Press(t0 + Duration::from_millis(10)), hold);
        assert_eq!(s, GestureState::Pressed { since: t0 });
        assert_eq!(e, None);

        let (s, e) = s.transition(GestureInput::Press(later), hold);
        assert_eq!((s, e), (GestureState::Held, Some(ButtonEvent::Held)));

        let (s, e) = s.transition(GestureInput::Jitter, hold);
        assert_eq!((s, e), (GestureState::Held, None));

        let (s, e) = s.transition(GestureInput::Release(later), hold);
        assert_eq!((s, e), (GestureState::Idle, Some(ButtonEvent::Lock)));
    }

    #[test]
    fn test_early_release_is_a_tap() {
        let t0 = Instant::now();
        let hold = Duration::from_millis(50);
        let (s, _) = GestureState::Idle.transition(GestureInput::Press(t0), hold);
        let (s, e) = s.transition(GestureInput::Release(t0 + Duration::from_millis(5)), hold);
        assert_eq!((s, e), (GestureState::Idle, Some(ButtonEvent::Tap)));
    }

    #[test]
    fn test_jitter_never_changes_state() {
        let t0 = Instant::now();
        for state in [
            GestureState::Idle,
            GestureState::Pressed { since: t0 },
            GestureState::Held,
        ] {
            assert_eq!(
                state.transition(GestureInput::Jitter, Duration::ZERO),
                (state, None)
            );
        }
    }

    #[test]
    fn test_poll_without_press_returns_immediately() {
        let mut pin = ScriptedPin::new([Level::Low; 3]);
        let mut g = gesture(3, Duration::ZERO);
        assert!(!g.poll(&mut pin, None).unwrap());
        assert_eq!(pin.reads(), 3);
        assert_eq!(g.state(), GestureState::Idle);
    }

    #[test]
    fn test_press_hold_release_locks_once() {
        // 3 windows held, then released
        let mut pin = ScriptedPin::press(0, 9);
        let mut g = gesture(3, Duration::ZERO);

        assert!(g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 1);
        assert_eq!(g.state(), GestureState::Idle);

        // Button stays released: no second lock
        assert!(!g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 1);
    }

    #[test]
    fn test_glitch_shorter_than_window_is_ignored() {
        let mut pin = ScriptedPin::new([
            Level::Low,
            Level::High,
            Level::Low,
            Level::Low,
            Level::High,
            Level::High,
        ]);
        let mut g = gesture(3, Duration::ZERO);
        assert!(!g.poll(&mut pin, None).unwrap());
        assert!(!g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 0);
        assert_eq!(g.state(), GestureState::Idle);
    }

    #[test]
    fn test_bouncy_release_still_locks_once() {
        let mut pin = ScriptedPin::press(0, 6);
        // contact bounce on release, then settled low
        pin.push([Level::Low, Level::High, Level::Low, Level::Low, Level::Low, Level::Low]);
        let mut g = gesture(3, Duration::ZERO);

        assert!(g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 1);
        assert!(!g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 1);
    }

    #[test]
    fn test_deadline_bounds_a_stuck_press() {
        let mut pin = ScriptedPin::new([Level::High; 3]);
        let mut g = gesture(3, Duration::ZERO);

        let past = Instant::now();
        assert!(!g.poll(&mut pin, Some(past)).unwrap());
        assert_eq!(pin.reads(), 3);
        assert!(matches!(g.state(), GestureState::Pressed { .. }));
        assert_eq!(g.locks(), 0);

        // The press carries over and still resolves once released
        assert!(g.poll(&mut pin, Some(past)).unwrap());
        assert_eq!(g.locks(), 1);
    }

    #[test]
    fn test_min_hold_turns_short_press_into_tap() {
        let mut pin = ScriptedPin::press(0, 6);
        let mut g = gesture(3, Duration::from_secs(60));
        assert!(!g.poll(&mut pin, None).unwrap());
        assert_eq!(g.locks(), 0);
        assert_eq!(g.state(), GestureState::Idle);
    }
}
