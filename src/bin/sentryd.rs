//! sentryd - robot sentry daemon
//!
//! This daemon:
//! 1. Loads configuration (file, then environment overrides)
//! 2. Watches the MJPEG stream for motion while nobody is driving
//! 3. Accepts remote commands on stdin, one per line
//! 4. Runs docking on `home-start` / `demo-start`
//!
//! Console lines other than the control words below are queued as commands
//! and switch the robot to interactive mode:
//!
//! - `stop`: stop motors and light, abort a docking run
//! - `snapshot`: send a picture from the surveillance stream
//! - `motion-on` / `motion-off`: toggle motion detection
//! - `quit-interactive`: return to surveillance immediately
//!
//! Actuators are logged, not driven; hardware bindings implement the
//! `dock_sentry::actuation` traits.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use dock_sentry::{
    CommandChannel, Controller, HttpStreamOpener, Peripherals, Recorder, SentryConfig,
    StreamFeedSource, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "SENTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short)]
    verbose: bool,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let config = SentryConfig::load(args.config.as_deref())?;
    log::info!(
        "sentryd {} starting: stream {} ({}x{} @ {} fps), uploads in {}",
        env!("CARGO_PKG_VERSION"),
        config.stream.url,
        config.stream.width,
        config.stream.height,
        config.stream.fps_low,
        config.storage.upload_dir.display()
    );

    let channel = CommandChannel::new(config.motion.enabled);
    let shutdown = channel.clone();
    ctrlc::set_handler(move || shutdown.request_shutdown())
        .context("error setting Ctrl-C handler")?;

    if !args.no_console {
        spawn_console(channel.clone())?;
    }

    let opener = Arc::new(HttpStreamOpener::new(&config.stream.url)?);
    let source = Arc::new(StreamFeedSource::new(opener));
    let recorder = Recorder::logging_only();
    let mut controller = Controller::new(
        config,
        channel,
        Peripherals::recorded(&recorder),
        Arc::new(SystemClock),
        source,
    )?;
    controller.run()
}

fn spawn_console(channel: CommandChannel) -> Result<()> {
    std::thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("console read failed: {}", e);
                        break;
                    }
                };
                handle_console_line(&channel, line.trim());
            }
            log::debug!("console closed");
        })
        .context("spawn console thread")?;
    Ok(())
}

fn handle_console_line(channel: &CommandChannel, line: &str) {
    match line {
        "" => {}
        "stop" => channel.request_stop(),
        "snapshot" => channel.request_snapshot(),
        "motion-on" => channel.set_motion_detection(true),
        "motion-off" => channel.set_motion_detection(false),
        "quit-interactive" => channel.set_interactive(false),
        command => channel.submit(command),
    }
}
