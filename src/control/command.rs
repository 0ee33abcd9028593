//! Interactive command parsing.
//!
//! Commands are dot-delimited: a name followed by numeric arguments, e.g.
//! `forward.20`, `drive-and-turn.30.-10` or `cam-move-abs.45`. Segments are
//! trimmed; any malformed line is rejected with a typed error.

use std::str::FromStr;

use thiserror::Error;

use crate::actuation::{Direction, StreamQuality};

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    StartStream(StreamQuality),
    StartFpv,
    StopFpv,
    StopStream,
    CaptureStart,
    CaptureStop,
    Move { direction: Direction, magnitude: f64 },
    DriveInc(i32),
    TurnInc(i32),
    DriveAndTurn {
        straight_speed: i32,
        turn_speed: i32,
        straight_accel: i32,
        turn_accel: i32,
    },
    CameraRelative(f64),
    CameraAbsolute(f64),
    LightOn,
    LightOff,
    HomeStart,
    DemoStart,
    Alive,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("command '{command}' is missing argument {position}")]
    MissingArgument { command: String, position: usize },
    #[error("command '{command}' has invalid number '{value}'")]
    InvalidNumber { command: String, value: String },
    #[error("command '{command}' takes {expected} argument(s), got {got}")]
    UnexpectedArgument {
        command: String,
        expected: usize,
        got: usize,
    },
    #[error("command '{0}' contains an empty segment")]
    EmptySegment(String),
}

struct Args<'a> {
    name: &'a str,
    values: Vec<&'a str>,
}

impl<'a> Args<'a> {
    fn expect_len(&self, allowed: &[usize]) -> Result<(), CommandParseError> {
        if allowed.contains(&self.values.len()) {
            return Ok(());
        }
        let max = allowed.iter().copied().max().unwrap_or(0);
        if self.values.len() < max {
            Err(CommandParseError::MissingArgument {
                command: self.name.to_string(),
                position: self.values.len() + 1,
            })
        } else {
            Err(CommandParseError::UnexpectedArgument {
                command: self.name.to_string(),
                expected: max,
                got: self.values.len(),
            })
        }
    }

    fn number<T: FromStr>(&self, index: usize) -> Result<T, CommandParseError> {
        let raw = self
            .values
            .get(index)
            .ok_or_else(|| CommandParseError::MissingArgument {
                command: self.name.to_string(),
                position: index + 1,
            })?;
        raw.parse().map_err(|_| CommandParseError::InvalidNumber {
            command: self.name.to_string(),
            value: raw.to_string(),
        })
    }

    fn none(&self, command: Command) -> Result<Command, CommandParseError> {
        self.expect_len(&[0])?;
        Ok(command)
    }
}

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(CommandParseError::Empty);
        }
        let mut segments = line.split('.').map(str::trim);
        let name = segments.next().unwrap_or_default();
        let values: Vec<&str> = segments.collect();
        if name.is_empty() || values.iter().any(|v| v.is_empty()) {
            return Err(CommandParseError::EmptySegment(line.to_string()));
        }
        let args = Args { name, values };

        match name {
            "start-stream-hq" => args.none(Command::StartStream(StreamQuality::High)),
            "start-stream-lq" => args.none(Command::StartStream(StreamQuality::Low)),
            "start-fpv" => args.none(Command::StartFpv),
            "stop-fpv" => args.none(Command::StopFpv),
            "stop-stream" => args.none(Command::StopStream),
            "capture-start" => args.none(Command::CaptureStart),
            "capture-stop" => args.none(Command::CaptureStop),
            "light-on" => args.none(Command::LightOn),
            "light-off" => args.none(Command::LightOff),
            "home-start" => args.none(Command::HomeStart),
            "demo-start" => args.none(Command::DemoStart),
            "ws-alive" => args.none(Command::Alive),
            "forward" | "backward" | "left" | "right" => {
                args.expect_len(&[1])?;
                let direction = match name {
                    "forward" => Direction::Forward,
                    "backward" => Direction::Backward,
                    "left" => Direction::Left,
                    _ => Direction::Right,
                };
                Ok(Command::Move {
                    direction,
                    magnitude: args.number(0)?,
                })
            }
            "drive-inc" => {
                args.expect_len(&[1])?;
                Ok(Command::DriveInc(args.number(0)?))
            }
            "turn-inc" => {
                args.expect_len(&[1])?;
                Ok(Command::TurnInc(args.number(0)?))
            }
            "drive-and-turn" => {
                args.expect_len(&[2, 4])?;
                let (straight_accel, turn_accel) = if args.values.len() == 4 {
                    (args.number(2)?, args.number(3)?)
                } else {
                    (0, 0)
                };
                Ok(Command::DriveAndTurn {
                    straight_speed: args.number(0)?,
                    turn_speed: args.number(1)?,
                    straight_accel,
                    turn_accel,
                })
            }
            "cam-move-rel" => {
                args.expect_len(&[1])?;
                Ok(Command::CameraRelative(args.number(0)?))
            }
            "cam-move-abs" => {
                args.expect_len(&[1])?;
                Ok(Command::CameraAbsolute(args.number(0)?))
            }
            other => Err(CommandParseError::UnknownCommand(other.to_string())),
        }
    }
}

impl Command {
    /// Commands that count as proof the remote connection is alive.
    pub fn refreshes_liveness(&self) -> bool {
        matches!(
            self,
            Command::Alive | Command::DriveInc(_) | Command::TurnInc(_) | Command::DriveAndTurn { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_moves_and_drive_commands() {
        assert_eq!(
            "forward.20".parse::<Command>().unwrap(),
            Command::Move {
                direction: Direction::Forward,
                magnitude: 20.0
            }
        );
        assert_eq!(
            " left . 3 ".parse::<Command>().unwrap(),
            Command::Move {
                direction: Direction::Left,
                magnitude: 3.0
            }
        );
        assert_eq!("drive-inc.-8".parse::<Command>().unwrap(), Command::DriveInc(-8));
        assert_eq!(
            "drive-and-turn.30.-10".parse::<Command>().unwrap(),
            Command::DriveAndTurn {
                straight_speed: 30,
                turn_speed: -10,
                straight_accel: 0,
                turn_accel: 0
            }
        );
        assert_eq!(
            "drive-and-turn.30.-10.5.6".parse::<Command>().unwrap(),
            Command::DriveAndTurn {
                straight_speed: 30,
                turn_speed: -10,
                straight_accel: 5,
                turn_accel: 6
            }
        );
    }

    #[test]
    fn parses_argumentless_commands() {
        assert_eq!("home-start".parse::<Command>().unwrap(), Command::HomeStart);
        assert_eq!(
            "start-stream-lq".parse::<Command>().unwrap(),
            Command::StartStream(StreamQuality::Low)
        );
        assert_eq!("ws-alive".parse::<Command>().unwrap(), Command::Alive);
        assert_eq!(
            "cam-move-abs.45".parse::<Command>().unwrap(),
            Command::CameraAbsolute(45.0)
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!("".parse::<Command>(), Err(CommandParseError::Empty));
        assert_eq!(
            "jump.3".parse::<Command>(),
            Err(CommandParseError::UnknownCommand("jump".into()))
        );
        assert_eq!(
            "forward".parse::<Command>(),
            Err(CommandParseError::MissingArgument {
                command: "forward".into(),
                position: 1
            })
        );
        assert_eq!(
            "forward.fast".parse::<Command>(),
            Err(CommandParseError::InvalidNumber {
                command: "forward".into(),
                value: "fast".into()
            })
        );
        assert_eq!(
            "light-on.1".parse::<Command>(),
            Err(CommandParseError::UnexpectedArgument {
                command: "light-on".into(),
                expected: 0,
                got: 1
            })
        );
        assert!(matches!(
            "forward..2".parse::<Command>(),
            Err(CommandParseError::EmptySegment(_))
        ));
        assert_eq!(
            "drive-and-turn.1.2.3".parse::<Command>(),
            Err(CommandParseError::MissingArgument {
                command: "drive-and-turn".into(),
                position: 4
            })
        );
    }

    #[test]
    fn speed_commands_refresh_liveness() {
        assert!(Command::DriveInc(1).refreshes_liveness());
        assert!(Command::Alive.refreshes_liveness());
        assert!(!Command::LightOn.refreshes_liveness());
    }
}
