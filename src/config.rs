use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STREAM_URL: &str = "http://localhost:44445/?action=stream";
const DEFAULT_WIDTH: u32 = 800;
const DEFAULT_HEIGHT: u32 = 600;
const DEFAULT_FPS_LOW: u32 = 2;
const DEFAULT_FPS_HIGH: u32 = 10;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 5;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_VIDEO_NAME: &str = "sentry_video.avi";
const DEFAULT_SNAPSHOT_NAME: &str = "latest_img.jpg";
const DEFAULT_BLUR_SIGMA: f32 = 3.5;
const DEFAULT_DIFF_THRESHOLD: u8 = 80;
const DEFAULT_MAX_CONTOURS: usize = 200;
const DEFAULT_MIN_CONTOUR_AREA: f64 = 100.0;
const DEFAULT_MAX_BOX_FRACTION: f64 = 0.5;
const DEFAULT_CONFIRM_FRAMES: u32 = 3;
const DEFAULT_BUFFER_SECS: u32 = 30;
const DEFAULT_PRE_EVENT_SECS: u32 = 3;
const DEFAULT_SNAPSHOT_SETTLE_FRAMES: u32 = 10;
const DEFAULT_INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_LIVENESS_TIMEOUT: Duration = Duration::from_secs(1);
/// Upper bound on the motion ring, in frames.
const MAX_BUFFER_FRAMES: u64 = 36_000;
const DEFAULT_MAX_SPEED: i32 = 62;
const DEFAULT_STANDING_TURN_FACTOR: f64 = 1.5;
const DEFAULT_BRIGHTNESS_THRESHOLD: f64 = 60.0;
const DEFAULT_POLL_INTERVAL_MS: u64 = 1;

#[derive(Debug, Deserialize, Default)]
struct SentryConfigFile {
    stream: Option<StreamConfigFile>,
    storage: Option<StorageConfigFile>,
    motion: Option<MotionConfigFile>,
    control: Option<ControlConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps_low: Option<u32>,
    fps_high: Option<u32>,
    startup_delay_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageConfigFile {
    upload_dir: Option<PathBuf>,
    video_name: Option<String>,
    snapshot_name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    enabled: Option<bool>,
    blur_sigma: Option<f32>,
    diff_threshold: Option<u8>,
    max_contours: Option<usize>,
    min_contour_area: Option<f64>,
    max_box_fraction: Option<f64>,
    confirm_frames: Option<u32>,
    buffer_secs: Option<u32>,
    pre_event_secs: Option<u32>,
    observe_only: Option<bool>,
    snapshot_settle_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ControlConfigFile {
    interactive_timeout_secs: Option<f64>,
    liveness_timeout_secs: Option<f64>,
    max_speed: Option<i32>,
    standing_turn_factor: Option<f64>,
    brightness_threshold: Option<f64>,
    poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub stream: StreamSettings,
    pub storage: StorageSettings,
    pub motion: MotionSettings,
    pub control: ControlSettings,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps_low: u32,
    pub fps_high: u32,
    pub startup_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub video_name: String,
    pub snapshot_name: String,
}

#[derive(Debug, Clone)]
pub struct MotionSettings {
    pub enabled: bool,
    pub blur_sigma: f32,
    pub diff_threshold: u8,
    pub max_contours: usize,
    /// Calibrated at 640x480; scaled by frame area at runtime.
    pub min_contour_area: f64,
    pub max_box_fraction: f64,
    pub confirm_frames: u32,
    pub buffer_secs: u32,
    pub pre_event_secs: u32,
    pub observe_only: bool,
    pub snapshot_settle_frames: u32,
}

#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub interactive_timeout: Duration,
    pub liveness_timeout: Duration,
    pub max_speed: i32,
    pub standing_turn_factor: f64,
    pub brightness_threshold: f64,
    pub poll_interval: Duration,
}

impl MotionSettings {
    /// Circular buffer capacity L in frames.
    pub fn buffer_len(&self, fps: u32) -> usize {
        (u64::from(fps) * u64::from(self.buffer_secs)) as usize
    }

    /// Pre-event offset O in frames.
    pub fn pre_event_len(&self, fps: u32) -> usize {
        (u64::from(fps) * u64::from(self.pre_event_secs)) as usize
    }
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self::from_file(SentryConfigFile::default())
    }
}

impl SentryConfig {
    /// Load from `path`, else from `SENTRY_CONFIG`, else defaults; then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("SENTRY_CONFIG").ok().map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let file = file_cfg.unwrap_or_default();
        let (interactive_secs, liveness_secs) = file
            .control
            .as_ref()
            .map(|c| (c.interactive_timeout_secs, c.liveness_timeout_secs))
            .unwrap_or_default();
        let mut cfg = Self::from_file(file);
        if let Some(secs) = interactive_secs {
            cfg.control.interactive_timeout = seconds("control.interactive_timeout_secs", secs)?;
        }
        if let Some(secs) = liveness_secs {
            cfg.control.liveness_timeout = seconds("control.liveness_timeout_secs", secs)?;
        }
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SentryConfigFile) -> Self {
        let stream = file.stream.unwrap_or_default();
        let storage = file.storage.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let control = file.control.unwrap_or_default();
        Self {
            stream: StreamSettings {
                url: stream
                    .url
                    .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                width: stream.width.unwrap_or(DEFAULT_WIDTH),
                height: stream.height.unwrap_or(DEFAULT_HEIGHT),
                fps_low: stream.fps_low.unwrap_or(DEFAULT_FPS_LOW),
                fps_high: stream.fps_high.unwrap_or(DEFAULT_FPS_HIGH),
                startup_delay: Duration::from_secs(
                    stream
                        .startup_delay_secs
                        .unwrap_or(DEFAULT_STARTUP_DELAY_SECS),
                ),
            },
            storage: StorageSettings {
                upload_dir: storage
                    .upload_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
                video_name: storage
                    .video_name
                    .unwrap_or_else(|| DEFAULT_VIDEO_NAME.to_string()),
                snapshot_name: storage
                    .snapshot_name
                    .unwrap_or_else(|| DEFAULT_SNAPSHOT_NAME.to_string()),
            },
            motion: MotionSettings {
                enabled: motion.enabled.unwrap_or(true),
                blur_sigma: motion.blur_sigma.unwrap_or(DEFAULT_BLUR_SIGMA),
                diff_threshold: motion.diff_threshold.unwrap_or(DEFAULT_DIFF_THRESHOLD),
                max_contours: motion.max_contours.unwrap_or(DEFAULT_MAX_CONTOURS),
                min_contour_area: motion.min_contour_area.unwrap_or(DEFAULT_MIN_CONTOUR_AREA),
                max_box_fraction: motion.max_box_fraction.unwrap_or(DEFAULT_MAX_BOX_FRACTION),
                confirm_frames: motion.confirm_frames.unwrap_or(DEFAULT_CONFIRM_FRAMES),
                buffer_secs: motion.buffer_secs.unwrap_or(DEFAULT_BUFFER_SECS),
                pre_event_secs: motion.pre_event_secs.unwrap_or(DEFAULT_PRE_EVENT_SECS),
                observe_only: motion.observe_only.unwrap_or(false),
                snapshot_settle_frames: motion
                    .snapshot_settle_frames
                    .unwrap_or(DEFAULT_SNAPSHOT_SETTLE_FRAMES),
            },
            control: ControlSettings {
                // File timeouts are converted by `load`, which can fail.
                interactive_timeout: DEFAULT_INTERACTIVE_TIMEOUT,
                liveness_timeout: DEFAULT_LIVENESS_TIMEOUT,
                max_speed: control.max_speed.unwrap_or(DEFAULT_MAX_SPEED),
                standing_turn_factor: control
                    .standing_turn_factor
                    .unwrap_or(DEFAULT_STANDING_TURN_FACTOR),
                brightness_threshold: control
                    .brightness_threshold
                    .unwrap_or(DEFAULT_BRIGHTNESS_THRESHOLD),
                poll_interval: Duration::from_millis(
                    control.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENTRY_STREAM_URL") {
            if !url.trim().is_empty() {
                self.stream.url = url;
            }
        }
        if let Ok(dir) = std::env::var("SENTRY_UPLOAD_DIR") {
            if !dir.trim().is_empty() {
                self.storage.upload_dir = PathBuf::from(dir);
            }
        }
        if let Ok(enabled) = std::env::var("SENTRY_MOTION_ENABLED") {
            self.motion.enabled = enabled
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTRY_MOTION_ENABLED must be true or false"))?;
        }
        if let Ok(timeout) = std::env::var("SENTRY_INTERACTIVE_TIMEOUT_SECS") {
            let secs: f64 = timeout.trim().parse().map_err(|_| {
                anyhow!("SENTRY_INTERACTIVE_TIMEOUT_SECS must be a number of seconds")
            })?;
            self.control.interactive_timeout = seconds("SENTRY_INTERACTIVE_TIMEOUT_SECS", secs)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(anyhow!("stream dimensions must be non-zero"));
        }
        if self.stream.fps_low == 0 || self.stream.fps_high == 0 {
            return Err(anyhow!("stream frame rates must be non-zero"));
        }
        let buffer_frames = u64::from(self.stream.fps_low) * u64::from(self.motion.buffer_secs);
        if buffer_frames > MAX_BUFFER_FRAMES {
            return Err(anyhow!(
                "motion buffer of {} frames (fps_low x buffer_secs) exceeds {}",
                buffer_frames,
                MAX_BUFFER_FRAMES
            ));
        }
        if self.motion.pre_event_secs >= self.motion.buffer_secs {
            return Err(anyhow!(
                "motion pre_event_secs ({}) must be less than buffer_secs ({})",
                self.motion.pre_event_secs,
                self.motion.buffer_secs
            ));
        }
        if self.motion.confirm_frames == 0 {
            return Err(anyhow!("motion confirm_frames must be at least 1"));
        }
        if !(self.motion.max_box_fraction > 0.0 && self.motion.max_box_fraction <= 1.0) {
            return Err(anyhow!("motion max_box_fraction must be in (0, 1]"));
        }
        if self.control.max_speed <= 0 {
            return Err(anyhow!("control max_speed must be positive"));
        }
        if self.storage.video_name.trim().is_empty() {
            return Err(anyhow!("storage video_name must not be empty"));
        }
        Ok(())
    }

    pub fn video_path(&self) -> PathBuf {
        self.storage.upload_dir.join(&self.storage.video_name)
    }
}

/// Non-negative, finite seconds as a `Duration`.
fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds, got {}", key, secs))
}

fn read_config_file(path: &Path) -> Result<SentryConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let cfg = SentryConfig::default();
        assert_eq!(cfg.stream.width, 800);
        assert_eq!(cfg.stream.fps_low, 2);
        assert_eq!(cfg.motion.buffer_len(cfg.stream.fps_low), 60);
        assert_eq!(cfg.motion.pre_event_len(cfg.stream.fps_low), 6);
        assert_eq!(cfg.control.interactive_timeout, Duration::from_secs(60));
        assert_eq!(cfg.control.liveness_timeout, Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_motion_buffer() {
        let mut cfg = SentryConfig::default();
        cfg.stream.fps_low = u32::MAX;
        cfg.motion.buffer_secs = u32::MAX;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn seconds_rejects_negative_and_non_finite() {
        assert_eq!(seconds("t", 2.5).unwrap(), Duration::from_millis(2500));
        assert!(seconds("t", -1.0).is_err());
        assert!(seconds("t", f64::NAN).is_err());
        assert!(seconds("t", f64::INFINITY).is_err());
    }

    #[test]
    fn rejects_offset_not_smaller_than_buffer() {
        let mut cfg = SentryConfig::default();
        cfg.motion.pre_event_secs = cfg.motion.buffer_secs;
        assert!(cfg.validate().is_err());
    }
}
