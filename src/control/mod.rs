//! Top-level control loop.
//!
//! - `command`: dot-delimited command parsing
//! - `mode`: mode state and the inactivity/liveness timers
//! - `drive`: incremental remote driving state
//!
//! `Controller::step` runs one iteration: in autonomous mode a complete
//! motion session, in interactive mode one pass over the command inbox.
//! Docking runs synchronously inside a `home-start` or `demo-start` command.
//! Any error ends the loop; `run` logs it with its full context chain and
//! returns it.

pub mod command;
pub mod drive;
pub mod mode;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::actuation::{Direction, DriveCommand, Peripherals, StreamQuality};
use crate::channel::CommandChannel;
use crate::clock::Clock;
use crate::config::SentryConfig;
use crate::homing::{HomingController, HomingOutcome};
use crate::ingest::{FeedSource, FrameFeed};
use crate::motion::{MotionEngine, MotionOutcome};
use crate::sequence::FrameStore;

pub use command::{Command, CommandParseError};
pub use drive::DriveState;
pub use mode::{Mode, ModeArbiter};

pub const MOTION_CAPTION: &str = "Motion detected!";
pub const HOMERUN_CAPTION: &str = "Here is your homerun video!";
pub const CAPTURE_CAPTION: &str = "Here is your captured video!";

const CAMERA_DURATION_SECS: f64 = 0.1;
const DEMO_ROUTE: [(Direction, f64); 4] = [
    (Direction::Forward, 72.0),
    (Direction::Forward, 72.0),
    (Direction::Left, 32.0),
    (Direction::Forward, 72.0),
];
const DEMO_MOVE_SECS: f64 = 1.0;
const FIRST_FRAME_WAIT: Duration = Duration::from_secs(1);

pub struct Controller {
    config: SentryConfig,
    channel: CommandChannel,
    peripherals: Peripherals,
    clock: Arc<dyn Clock>,
    source: Arc<dyn FeedSource>,
    store: FrameStore,
    arbiter: ModeArbiter,
    drive: DriveState,
    motion: MotionEngine,
    homing: HomingController,
    stream_started: bool,
}

impl Controller {
    pub fn new(
        config: SentryConfig,
        channel: CommandChannel,
        peripherals: Peripherals,
        clock: Arc<dyn Clock>,
        source: Arc<dyn FeedSource>,
    ) -> Result<Self> {
        let store = FrameStore::open(&config.storage.upload_dir)?;
        Ok(Self {
            arbiter: ModeArbiter::new(
                config.control.interactive_timeout,
                config.control.liveness_timeout,
            ),
            drive: DriveState::new(
                config.control.max_speed,
                config.control.standing_turn_factor,
            ),
            motion: MotionEngine::new(&config, store.clone()),
            homing: HomingController::new(&config, store.clone()),
            store,
            config,
            channel,
            peripherals,
            clock,
            source,
            stream_started: false,
        })
    }

    pub fn mode(&self) -> Mode {
        self.arbiter.mode()
    }

    pub fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// Loop until shutdown is requested. The first failing iteration ends the
    /// loop with its error.
    pub fn run(&mut self) -> Result<()> {
        log::info!("control loop started");
        while !self.channel.is_shutdown() {
            if let Err(e) = self.step() {
                log::error!("control loop failed: {:#}", e);
                return Err(e);
            }
            self.clock.sleep(self.config.control.poll_interval);
        }
        self.shutdown()
    }

    pub fn step(&mut self) -> Result<()> {
        let now = self.clock.now();
        if self.channel.is_interactive() {
            self.arbiter.enter_interactive(now);
        } else {
            self.arbiter.leave_interactive();
        }
        match self.arbiter.mode() {
            Mode::Autonomous => self.autonomous_step(),
            Mode::Interactive | Mode::Docking => self.interactive_step(),
        }
    }

    fn autonomous_step(&mut self) -> Result<()> {
        if !self.stream_started {
            self.restart_stream(StreamQuality::Low)?;
            self.stream_started = true;
        }
        let mut feed = self.source.open_feed().context("open frame feed")?;
        let outcome = self
            .motion
            .run(feed.as_mut(), &self.channel, &mut self.peripherals);
        let closed = feed.close();
        let outcome = outcome?;
        closed?;

        match outcome {
            MotionOutcome::Event(sequence) => {
                log::info!("motion detected, sending clip");
                let video = self.config.video_path();
                self.peripherals
                    .encoder
                    .encode(&sequence, self.config.stream.fps_low, &video)?;
                self.peripherals.notifier.send_video(&video, MOTION_CAPTION)?;
                self.store.clear()?;
            }
            MotionOutcome::Interrupted => {
                // The interactive user may switch streams; restart ours next time.
                self.stream_started = false;
            }
        }
        Ok(())
    }

    fn interactive_step(&mut self) -> Result<()> {
        let now = self.clock.now();
        if self.arbiter.check_liveness(now) {
            log::info!("connection liveness timeout, stopping motors");
            let stop = self.drive.stop();
            self.peripherals.actuator.drive_and_turn(stop)?;
        }

        let mut handled = false;
        if let Some(line) = self.channel.take_command() {
            match line.parse::<Command>() {
                Ok(command) => {
                    log::info!("command received: {}", line.trim());
                    self.arbiter.command_received(now);
                    self.dispatch(command)?;
                    handled = true;
                }
                Err(e) => log::warn!("ignoring command '{}': {}", line.trim(), e),
            }
        }
        if !handled && self.arbiter.check_inactivity(now) {
            self.channel.set_interactive(false);
        }

        if self.channel.take_stop() {
            log::info!("stop requested, stopping motors and light");
            let stop = self.drive.stop();
            self.peripherals.actuator.drive_and_turn(stop)?;
            self.peripherals.actuator.set_light(false)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        let now = self.clock.now();
        match command {
            Command::StartStream(quality) => self.restart_stream(quality)?,
            Command::StartFpv => self.restart_stream(StreamQuality::High)?,
            Command::StopFpv => self.restart_stream(StreamQuality::Low)?,
            Command::StopStream => self.peripherals.stream.stop_stream()?,
            Command::CaptureStart => {
                let video = self.config.video_path();
                self.peripherals.stream.start_recording(&video)?;
            }
            Command::CaptureStop => {
                self.peripherals.stream.stop_recording()?;
                let video = self.config.video_path();
                self.peripherals.notifier.send_video(&video, CAPTURE_CAPTION)?;
            }
            Command::Move {
                direction,
                magnitude,
            } => self
                .peripherals
                .actuator
                .move_by(direction, magnitude, 0.0)?,
            Command::Alive => self.arbiter.alive(now),
            Command::DriveInc(delta) => {
                let cmd = self.drive.drive_inc(delta);
                self.drive_and_turn(cmd)?;
            }
            Command::TurnInc(speed) => {
                let cmd = self.drive.turn_inc(speed);
                self.drive_and_turn(cmd)?;
            }
            Command::DriveAndTurn {
                straight_speed,
                turn_speed,
                straight_accel,
                turn_accel,
            } => self.drive_and_turn(DriveCommand {
                straight_speed,
                turn_speed,
                straight_accel,
                turn_accel,
                duration_secs: 0.0,
            })?,
            Command::CameraRelative(angle) => self
                .peripherals
                .actuator
                .move_camera_relative(angle, CAMERA_DURATION_SECS)?,
            Command::CameraAbsolute(angle) => self
                .peripherals
                .actuator
                .move_camera_absolute(angle, CAMERA_DURATION_SECS)?,
            Command::LightOn => self.peripherals.actuator.set_light(true)?,
            Command::LightOff => self.peripherals.actuator.set_light(false)?,
            Command::HomeStart => self.dock(false)?,
            Command::DemoStart => self.dock(true)?,
        }
        Ok(())
    }

    fn drive_and_turn(&mut self, command: DriveCommand) -> Result<()> {
        self.peripherals.actuator.drive_and_turn(command)?;
        self.arbiter.alive(self.clock.now());
        Ok(())
    }

    fn restart_stream(&mut self, quality: StreamQuality) -> Result<()> {
        let fps = match quality {
            StreamQuality::Low => self.config.stream.fps_low,
            StreamQuality::High => self.config.stream.fps_high,
        };
        log::info!("starting {:?} stream at {} fps", quality, fps);
        self.peripherals.stream.stop_stream()?;
        self.peripherals.stream.start_stream(quality, fps)?;
        self.clock.sleep(self.config.stream.startup_delay);
        Ok(())
    }

    /// Blocking docking run. The produced clip is encoded in either case; only
    /// a regular run (not the demo) is sent out.
    fn dock(&mut self, demo: bool) -> Result<()> {
        log::info!("going to start {}", if demo { "demo docking" } else { "docking" });
        self.restart_stream(StreamQuality::Low)?;
        self.arbiter.begin_docking();
        let result = self.docking_session(demo);
        self.arbiter.end_docking(self.clock.now());
        let outcome = result?;
        log::info!("docking finished: {:?}", outcome);

        let sequence = self.store.sequence()?;
        let video = self.config.video_path();
        if !sequence.is_empty() {
            self.peripherals
                .encoder
                .encode(&sequence, self.config.stream.fps_low, &video)?;
            if !demo {
                self.peripherals.notifier.send_video(&video, HOMERUN_CAPTION)?;
            }
        }
        self.store.clear()?;
        Ok(())
    }

    fn docking_session(&mut self, demo: bool) -> Result<HomingOutcome> {
        let mut feed = self.source.open_feed().context("open frame feed")?;
        let outcome = self.drive_to_dock(feed.as_mut(), demo);
        let closed = feed.close();
        let outcome = outcome?;
        closed?;
        Ok(outcome)
    }

    fn drive_to_dock(&mut self, feed: &mut dyn FrameFeed, demo: bool) -> Result<HomingOutcome> {
        if demo {
            let dark = feed
                .next_frame(FIRST_FRAME_WAIT)?
                .is_some_and(|frame| frame.brightness < self.config.control.brightness_threshold);
            if dark {
                self.peripherals.actuator.set_light(true)?;
            }
            for (direction, magnitude) in DEMO_ROUTE {
                self.peripherals
                    .actuator
                    .move_by(direction, magnitude, DEMO_MOVE_SECS)?;
            }
            feed.discard_pending();
        }
        self.homing.run(feed, &self.channel, &mut self.peripherals)
    }

    fn shutdown(&mut self) -> Result<()> {
        log::info!("shutting down");
        let stop = self.drive.stop();
        self.peripherals.actuator.drive_and_turn(stop)?;
        self.peripherals.actuator.set_light(false)?;
        self.peripherals.stream.stop_stream()?;
        Ok(())
    }
}
