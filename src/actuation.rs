//! Collaborator boundary: actuators, heading, notifications, stream control
//! and clip encoding.
//!
//! The core issues commands through these traits and does not wait for
//! completion beyond the duration it passes. Hardware bindings live outside
//! this crate. `Recorder` implements every trait by logging and recording the
//! issued `Action`s, which serves both dry runs and tests.

use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::sequence::FrameSequence;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Differential drive speed command.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct DriveCommand {
    pub straight_speed: i32,
    pub turn_speed: i32,
    pub straight_accel: i32,
    pub turn_accel: i32,
    pub duration_secs: f64,
}

impl DriveCommand {
    pub const STOP: DriveCommand = DriveCommand {
        straight_speed: 0,
        turn_speed: 0,
        straight_accel: 0,
        turn_accel: 0,
        duration_secs: 0.0,
    };

    pub fn is_stop(&self) -> bool {
        self.straight_speed == 0 && self.turn_speed == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamQuality {
    /// Low frame rate stream used for surveillance and docking.
    Low,
    /// High frame rate stream for remote viewing.
    High,
}

pub trait Actuator: Send {
    fn move_by(&mut self, direction: Direction, magnitude: f64, duration_secs: f64) -> Result<()>;
    fn drive_and_turn(&mut self, command: DriveCommand) -> Result<()>;
    fn move_camera_absolute(&mut self, angle: f64, duration_secs: f64) -> Result<()>;
    fn move_camera_relative(&mut self, angle: f64, duration_secs: f64) -> Result<()>;
    fn set_light(&mut self, on: bool) -> Result<()>;
}

pub trait Heading: Send {
    /// Rotate by `degrees` relative to the current heading. Blocks until done.
    fn rotate_to_relative_heading(&mut self, degrees: f64) -> Result<()>;
}

pub trait Notifier: Send {
    fn send_image(&mut self, path: &Path, caption: &str) -> Result<()>;
    fn send_video(&mut self, path: &Path, caption: &str) -> Result<()>;
}

pub trait StreamControl: Send {
    /// Start the camera stream at `quality`, delivering `fps` frames per second.
    fn start_stream(&mut self, quality: StreamQuality, fps: u32) -> Result<()>;
    fn stop_stream(&mut self) -> Result<()>;
    /// Record the running stream into `output`.
    fn start_recording(&mut self, output: &Path) -> Result<()>;
    fn stop_recording(&mut self) -> Result<()>;
}

pub trait ClipEncoder: Send {
    /// Encode `sequence` at `fps` into the video file `output`.
    fn encode(&mut self, sequence: &FrameSequence, fps: u32, output: &Path) -> Result<()>;
}

/// The collaborators the controller drives.
pub struct Peripherals {
    pub actuator: Box<dyn Actuator>,
    pub heading: Box<dyn Heading>,
    pub notifier: Box<dyn Notifier>,
    pub stream: Box<dyn StreamControl>,
    pub encoder: Box<dyn ClipEncoder>,
}

impl Peripherals {
    /// Every collaborator backed by the same recorder.
    pub fn recorded(recorder: &Recorder) -> Self {
        Self {
            actuator: Box::new(recorder.clone()),
            heading: Box::new(recorder.clone()),
            notifier: Box::new(recorder.clone()),
            stream: Box::new(recorder.clone()),
            encoder: Box::new(recorder.clone()),
        }
    }
}

// ----------------------------------------------------------------------------
// Action record
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move {
        direction: Direction,
        magnitude: f64,
        duration_secs: f64,
    },
    Drive(DriveCommand),
    CameraAbsolute {
        angle: f64,
        duration_secs: f64,
    },
    CameraRelative {
        angle: f64,
        duration_secs: f64,
    },
    Light {
        on: bool,
    },
    Rotate {
        degrees: f64,
    },
    SendImage {
        path: PathBuf,
        caption: String,
    },
    SendVideo {
        path: PathBuf,
        caption: String,
    },
    StartStream {
        quality: StreamQuality,
        fps: u32,
    },
    StopStream,
    StartRecording {
        output: PathBuf,
    },
    StopRecording,
    Encode {
        frames: usize,
        fps: u32,
        output: PathBuf,
    },
}

/// Logs every action and, unless built with `logging_only`, records it.
/// Clones share one log.
#[derive(Clone, Debug)]
pub struct Recorder {
    actions: Option<Arc<Mutex<Vec<Action>>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            actions: Some(Arc::default()),
        }
    }

    /// Logs actions without keeping them; for long-running dry runs.
    pub fn logging_only() -> Self {
        Self { actions: None }
    }

    fn record(&self, action: Action) {
        match serde_json::to_string(&action) {
            Ok(json) => log::info!("actuation {}", json),
            Err(_) => log::info!("actuation {:?}", action),
        }
        if let Some(actions) = &self.actions {
            actions
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(action);
        }
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.as_ref().map_or_else(Vec::new, |actions| {
            actions.lock().unwrap_or_else(|e| e.into_inner()).clone()
        })
    }

    pub fn take(&self) -> Vec<Action> {
        self.actions.as_ref().map_or_else(Vec::new, |actions| {
            std::mem::take(&mut *actions.lock().unwrap_or_else(|e| e.into_inner()))
        })
    }

    /// Last drive (speed) command issued, if any.
    pub fn last_drive(&self) -> Option<DriveCommand> {
        self.actions().into_iter().rev().find_map(|a| match a {
            Action::Drive(cmd) => Some(cmd),
            _ => None,
        })
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for Recorder {
    fn move_by(&mut self, direction: Direction, magnitude: f64, duration_secs: f64) -> Result<()> {
        self.record(Action::Move {
            direction,
            magnitude,
            duration_secs,
        });
        Ok(())
    }

    fn drive_and_turn(&mut self, command: DriveCommand) -> Result<()> {
        self.record(Action::Drive(command));
        Ok(())
    }

    fn move_camera_absolute(&mut self, angle: f64, duration_secs: f64) -> Result<()> {
        self.record(Action::CameraAbsolute {
            angle,
            duration_secs,
        });
        Ok(())
    }

    fn move_camera_relative(&mut self, angle: f64, duration_secs: f64) -> Result<()> {
        self.record(Action::CameraRelative {
            angle,
            duration_secs,
        });
        Ok(())
    }

    fn set_light(&mut self, on: bool) -> Result<()> {
        self.record(Action::Light { on });
        Ok(())
    }
}

impl Heading for Recorder {
    fn rotate_to_relative_heading(&mut self, degrees: f64) -> Result<()> {
        self.record(Action::Rotate { degrees });
        Ok(())
    }
}

impl Notifier for Recorder {
    fn send_image(&mut self, path: &Path, caption: &str) -> Result<()> {
        self.record(Action::SendImage {
            path: path.to_path_buf(),
            caption: caption.to_string(),
        });
        Ok(())
    }

    fn send_video(&mut self, path: &Path, caption: &str) -> Result<()> {
        self.record(Action::SendVideo {
            path: path.to_path_buf(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

impl StreamControl for Recorder {
    fn start_stream(&mut self, quality: StreamQuality, fps: u32) -> Result<()> {
        self.record(Action::StartStream { quality, fps });
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.record(Action::StopStream);
        Ok(())
    }

    fn start_recording(&mut self, output: &Path) -> Result<()> {
        self.record(Action::StartRecording {
            output: output.to_path_buf(),
        });
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        self.record(Action::StopRecording);
        Ok(())
    }
}

impl ClipEncoder for Recorder {
    fn encode(&mut self, sequence: &FrameSequence, fps: u32, output: &Path) -> Result<()> {
        self.record(Action::Encode {
            frames: sequence.len(),
            fps,
            output: output.to_path_buf(),
        });
        Ok(())
    }
}
