//! Remote driving state for incremental speed commands.

use crate::actuation::DriveCommand;

/// Turn acceleration used for incremental turns.
const TURN_INC_ACCEL: i32 = 60;

#[derive(Clone, Debug)]
pub struct DriveState {
    straight_speed: i32,
    max_speed: i32,
    standing_turn_factor: f64,
}

impl DriveState {
    pub fn new(max_speed: i32, standing_turn_factor: f64) -> Self {
        Self {
            straight_speed: 0,
            max_speed,
            standing_turn_factor,
        }
    }

    pub fn straight_speed(&self) -> i32 {
        self.straight_speed
    }

    /// Change the straight speed by `delta`, clamped to `±max_speed`.
    pub fn drive_inc(&mut self, delta: i32) -> DriveCommand {
        self.straight_speed = self
            .straight_speed
            .saturating_add(delta)
            .clamp(-self.max_speed, self.max_speed);
        DriveCommand {
            straight_speed: self.straight_speed,
            ..DriveCommand::STOP
        }
    }

    /// Turn at `speed` while keeping the straight speed. Standing still needs
    /// more torque, so the turn speed is scaled up then.
    pub fn turn_inc(&self, speed: i32) -> DriveCommand {
        let turn_speed = if self.straight_speed == 0 {
            (f64::from(speed) * self.standing_turn_factor) as i32
        } else {
            speed
        };
        DriveCommand {
            straight_speed: self.straight_speed,
            turn_speed,
            straight_accel: 0,
            turn_accel: TURN_INC_ACCEL,
            duration_secs: 0.0,
        }
    }

    /// Forget the straight speed and return the stop command.
    pub fn stop(&mut self) -> DriveCommand {
        self.straight_speed = 0;
        DriveCommand::STOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_inc_accumulates_and_clamps() {
        let mut drive = DriveState::new(62, 1.5);
        assert_eq!(drive.drive_inc(31).straight_speed, 31);
        assert_eq!(drive.drive_inc(31).straight_speed, 62);
        assert_eq!(drive.drive_inc(31).straight_speed, 62);
        assert_eq!(drive.drive_inc(-200).straight_speed, -62);
        assert!(drive.stop().is_stop());
        assert_eq!(drive.straight_speed(), 0);
    }

    #[test]
    fn standing_turn_is_scaled_and_truncated() {
        let mut drive = DriveState::new(62, 1.5);
        let cmd = drive.turn_inc(5);
        assert_eq!((cmd.straight_speed, cmd.turn_speed, cmd.turn_accel), (0, 7, 60));
        assert_eq!(drive.turn_inc(-5).turn_speed, -7);

        drive.drive_inc(20);
        let cmd = drive.turn_inc(5);
        assert_eq!((cmd.straight_speed, cmd.turn_speed), (20, 5));
    }
}
