//! Steering decisions from a validated marker set.
//!
//! Pure functions: given the markers and the frame size, decide the camera
//! tilt and the next maneuver. Size thresholds are calibrated at 640 pixels
//! wide and scale linearly with frame width.

use crate::actuation::Direction;

use super::pairing::BlobTriple;

pub const SMALL_TURN: f64 = 1.0;
pub const LARGE_TURN: f64 = 12.0;
pub const SEARCH_TURN: f64 = 22.0;
pub const FORWARD_FAR: f64 = 32.0;
pub const FORWARD_NEAR: f64 = 12.0;
pub const DOCK_FORWARD: f64 = 20.0;
pub const DOCK_ROTATION_DEG: f64 = 180.0;
pub const DOCK_BACKWARD_STEPS: usize = 8;
pub const DOCK_BACKWARD_STEP: f64 = 12.0;
pub const MOVE_DURATION_SECS: f64 = 1.0;
pub const TILT_RANGE_DEG: f64 = 30.0;
pub const TILT_DURATION_SECS: f64 = 0.1;

/// Quarter turn used by the approach correction; slightly over 90 degrees.
pub const CORRECTION_TURN: f64 = 112.0;
pub const CORRECTION_FORWARD_FACTOR: f64 = 3.0;
pub const CORRECTION_RETURN_SECS: f64 = 5.0;
/// Lateral offset (calibrated pixels) that arms an approach correction.
pub const CORRECTION_ARM: f64 = 2.0;
/// Lateral offset (calibrated pixels) still worth correcting when executing.
pub const CORRECTION_EXECUTE: f64 = 1.5;

/// Frame-size dependent thresholds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Calibration {
    pub width: f64,
    pub height: f64,
    pub width_factor: f64,
    pub size_min_for_correction: f64,
    pub size_max_for_correction: f64,
    pub size_slow: f64,
    pub size_stop: f64,
}

impl Calibration {
    pub fn for_frame(width: u32, height: u32) -> Self {
        let width_factor = f64::from(width) / 640.0;
        Self {
            width: f64::from(width),
            height: f64::from(height),
            width_factor,
            size_min_for_correction: 30.0 * width_factor,
            size_max_for_correction: 40.0 * width_factor,
            size_slow: 30.0 * width_factor,
            size_stop: 60.0 * width_factor,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Maneuver {
    /// Rotate toward the markers.
    Turn { direction: Direction, magnitude: f64 },
    /// Centered but approaching at an angle; correct on the next frame.
    ArmCorrection,
    /// Drive toward the dock.
    Forward { magnitude: f64 },
    /// Close enough: run the final docking maneuver.
    Dock,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteeringDecision {
    /// Relative camera tilt that centers the markers vertically.
    pub tilt: f64,
    /// Lateral offset of the middle marker, in calibrated pixels.
    pub correction: f64,
    pub maneuver: Maneuver,
}

pub fn steer(triple: &BlobTriple, cal: &Calibration) -> SteeringDecision {
    let (xmid, ymid) = triple.midpoint();
    let tilt = TILT_RANGE_DEG * (cal.height / 2.0 - ymid) / cal.height;
    let correction = match triple.middle {
        Some(middle) => (xmid - middle.x) / cal.width_factor,
        None => 0.0,
    };
    let avg = triple.avg_size();
    let course = cal.width / 2.0;

    let maneuver = if xmid < course - cal.width / 20.0 {
        Maneuver::Turn {
            direction: Direction::Left,
            magnitude: if xmid < course - cal.width / 5.0 {
                LARGE_TURN
            } else {
                SMALL_TURN
            },
        }
    } else if xmid > course + cal.width / 20.0 {
        Maneuver::Turn {
            direction: Direction::Right,
            magnitude: if xmid > course + cal.width / 5.0 {
                LARGE_TURN
            } else {
                SMALL_TURN
            },
        }
    } else if correction.abs() > CORRECTION_ARM
        && avg > cal.size_min_for_correction
        && avg < cal.size_max_for_correction
    {
        Maneuver::ArmCorrection
    } else if avg < cal.size_stop {
        Maneuver::Forward {
            magnitude: if avg < cal.size_slow {
                FORWARD_FAR
            } else {
                FORWARD_NEAR
            },
        }
    } else {
        Maneuver::Dock
    };

    SteeringDecision {
        tilt,
        correction,
        maneuver,
    }
}

/// The three moves of an approach correction: turn away by a quarter turn
/// reduced by the offset, drive sideways in proportion to it, turn back.
/// Empty when the offset is too small to act on.
pub fn correction_moves(correction: f64) -> Vec<(Direction, f64, f64)> {
    if correction > CORRECTION_EXECUTE {
        vec![
            (Direction::Left, CORRECTION_TURN - correction, MOVE_DURATION_SECS),
            (
                Direction::Forward,
                correction * CORRECTION_FORWARD_FACTOR,
                MOVE_DURATION_SECS,
            ),
            (Direction::Right, CORRECTION_TURN, CORRECTION_RETURN_SECS),
        ]
    } else if correction < -CORRECTION_EXECUTE {
        vec![
            (Direction::Right, CORRECTION_TURN + correction, MOVE_DURATION_SECS),
            (
                Direction::Forward,
                -correction * CORRECTION_FORWARD_FACTOR,
                MOVE_DURATION_SECS,
            ),
            (Direction::Left, CORRECTION_TURN, CORRECTION_RETURN_SECS),
        ]
    } else {
        Vec::new()
    }
}
