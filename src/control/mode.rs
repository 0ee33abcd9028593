//! Operating mode and the timers that move between modes.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Unattended motion surveillance.
    Autonomous,
    /// Remote commands are being executed.
    Interactive,
    /// A docking run started from interactive mode.
    Docking,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Autonomous => "autonomous",
            Mode::Interactive => "interactive",
            Mode::Docking => "docking",
        })
    }
}

/// Owns the current mode. Interactive mode lapses after `interactive_timeout`
/// without a valid command; an outstanding drive command lapses after
/// `liveness_timeout` without a liveness signal.
#[derive(Debug)]
pub struct ModeArbiter {
    mode: Mode,
    interactive_timeout: Duration,
    liveness_timeout: Duration,
    last_command: Option<Instant>,
    last_alive: Option<Instant>,
}

impl ModeArbiter {
    pub fn new(interactive_timeout: Duration, liveness_timeout: Duration) -> Self {
        Self {
            mode: Mode::Autonomous,
            interactive_timeout,
            liveness_timeout,
            last_command: None,
            last_alive: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The inactivity timer starts when interactive mode is entered.
    pub fn enter_interactive(&mut self, now: Instant) {
        if self.mode == Mode::Autonomous {
            self.transition(Mode::Interactive);
            self.last_command = Some(now);
        }
    }

    pub fn leave_interactive(&mut self) {
        if self.mode == Mode::Interactive {
            self.transition(Mode::Autonomous);
            self.last_command = None;
            self.last_alive = None;
        }
    }

    pub fn command_received(&mut self, now: Instant) {
        self.last_command = Some(now);
    }

    /// Revert to autonomous once the inactivity timeout has elapsed. Returns
    /// `true` only on the call that performs the transition.
    pub fn check_inactivity(&mut self, now: Instant) -> bool {
        if self.mode != Mode::Interactive {
            return false;
        }
        let idle = self
            .last_command
            .map_or(Duration::ZERO, |t| now.saturating_duration_since(t));
        if idle >= self.interactive_timeout {
            log::info!(
                "no command for {:.0}s, reverting to autonomous mode",
                idle.as_secs_f64()
            );
            self.leave_interactive();
            return true;
        }
        false
    }

    pub fn begin_docking(&mut self) {
        if self.mode == Mode::Interactive {
            self.transition(Mode::Docking);
        }
    }

    /// Docking always returns to interactive mode; the inactivity timer
    /// restarts from `now`.
    pub fn end_docking(&mut self, now: Instant) {
        if self.mode == Mode::Docking {
            self.transition(Mode::Interactive);
            self.last_command = Some(now);
        }
    }

    fn transition(&mut self, to: Mode) {
        log::info!("mode {} -> {}", self.mode, to);
        self.mode = to;
    }

    /// A liveness signal or a speed command: (re)arm the liveness timer.
    pub fn alive(&mut self, now: Instant) {
        self.last_alive = Some(now);
    }

    /// Returns `true` once when the liveness timer has lapsed; the caller must
    /// stop the motors. The timer stays disarmed until the next `alive`.
    pub fn check_liveness(&mut self, now: Instant) -> bool {
        match self.last_alive {
            Some(t) if now.saturating_duration_since(t) >= self.liveness_timeout => {
                self.last_alive = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arbiter() -> ModeArbiter {
        ModeArbiter::new(Duration::from_secs(60), Duration::from_secs(1))
    }

    #[test]
    fn interactive_reverts_exactly_once_after_timeout() {
        let start = Instant::now();
        let mut arbiter = arbiter();
        arbiter.enter_interactive(start);
        assert_eq!(arbiter.mode(), Mode::Interactive);

        assert!(!arbiter.check_inactivity(start + Duration::from_secs_f64(59.9)));
        assert!(arbiter.check_inactivity(start + Duration::from_secs(60)));
        assert_eq!(arbiter.mode(), Mode::Autonomous);
        assert!(!arbiter.check_inactivity(start + Duration::from_secs(61)));
        assert!(!arbiter.check_inactivity(start + Duration::from_secs(120)));
    }

    #[test]
    fn commands_postpone_the_timeout() {
        let start = Instant::now();
        let mut arbiter = arbiter();
        arbiter.enter_interactive(start);
        arbiter.command_received(start + Duration::from_secs(50));
        assert!(!arbiter.check_inactivity(start + Duration::from_secs(100)));
        assert!(arbiter.check_inactivity(start + Duration::from_secs(110)));
    }

    #[test]
    fn reentering_interactive_does_not_reset_timer() {
        let start = Instant::now();
        let mut arbiter = arbiter();
        arbiter.enter_interactive(start);
        arbiter.enter_interactive(start + Duration::from_secs(30));
        assert!(arbiter.check_inactivity(start + Duration::from_secs(60)));
    }

    #[test]
    fn liveness_fires_once_per_arming() {
        let start = Instant::now();
        let mut arbiter = arbiter();
        assert!(!arbiter.check_liveness(start + Duration::from_secs(5)));
        arbiter.alive(start);
        assert!(!arbiter.check_liveness(start + Duration::from_millis(900)));
        assert!(arbiter.check_liveness(start + Duration::from_secs(1)));
        assert!(!arbiter.check_liveness(start + Duration::from_secs(3)));
    }

    #[test]
    fn docking_is_a_sub_state_of_interactive() {
        let start = Instant::now();
        let mut arbiter = arbiter();
        arbiter.begin_docking();
        assert_eq!(arbiter.mode(), Mode::Autonomous);

        arbiter.enter_interactive(start);
        arbiter.begin_docking();
        assert_eq!(arbiter.mode(), Mode::Docking);
        assert!(!arbiter.check_inactivity(start + Duration::from_secs(600)));
        arbiter.end_docking(start + Duration::from_secs(600));
        assert_eq!(arbiter.mode(), Mode::Interactive);
        assert!(!arbiter.check_inactivity(start + Duration::from_secs(630)));
    }

    #[test]
    fn modes_display_as_lowercase_names() {
        assert_eq!(Mode::Autonomous.to_string(), "autonomous");
        assert_eq!(Mode::Interactive.to_string(), "interactive");
        assert_eq!(Mode::Docking.to_string(), "docking");
    }
}
