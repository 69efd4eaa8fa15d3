// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use dotenvy::dotenv;

/// Default number of focus-loss events (tab hidden / fullscreen exited) before escalation.
pub const DEFAULT_FOCUS_LOSS_LIMIT: u32 = 3;
pub const DEVICE_INTEGRITY_LIMIT: u32 = 3;
pub const MULTIPLE_FACES_LIMIT: u32 = 3;
pub const ABSENT_FACE_LIMIT: u32 = 5;
pub const HEAD_TURNED_LIMIT: u32 = 5;

/// Coincident visibility/fullscreen events within this window count once.
pub const FOCUS_LOSS_DEBOUNCE: Duration = Duration::from_secs(1);

/// Acceptable nose position between the jaw extremes, as a fraction of jaw width.
pub const HEAD_STRAIGHT_BAND: (f32, f32) = (0.35, 0.65);

/// Frames are downsampled to at most this raster before luminance is computed.
pub const SAMPLE_WIDTH: u32 = 64;
pub const SAMPLE_HEIGHT: u32 = 48;

pub const AUTOSAVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Preview frames and face reports older than this are treated as missing.
pub const SENSOR_MAX_AGE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub exam_id: i64,
    pub candidate_id: String,
    pub recording_dir: PathBuf,
    pub seed_demo_exam: bool,
    pub session: SessionConfig,
}

/// Timing and threshold knobs consumed by the session engine.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub autosave_interval: Duration,
    pub poll_interval: Duration,
    /// Average luma (0-255) below which a camera frame counts as blank.
    pub darkness_threshold: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(5),
            poll_interval: Duration::from_millis(1000),
            darkness_threshold: 40.0,
        }
    }
}

impl SessionConfig {
    /// Replaces zero periods with the defaults; the tickers reject a zero period.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            autosave_interval: non_zero_or(self.autosave_interval, defaults.autosave_interval),
            poll_interval: non_zero_or(self.poll_interval, defaults.poll_interval),
            ..self
        }
    }
}

fn non_zero_or(period: Duration, fallback: Duration) -> Duration {
    if period.is_zero() {
        tracing::warn!(?fallback, "Zero session period configured, using the default");
        fallback
    } else {
        period
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set");

        let rust_log = env::var("RUST_LOG")
            .unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .expect("BIND_ADDR must be a socket address");

        let exam_id = env::var("EXAM_ID")
            .expect("EXAM_ID must be set")
            .parse()
            .expect("EXAM_ID must be an integer");

        let candidate_id = env::var("CANDIDATE_ID")
            .expect("CANDIDATE_ID must be set");

        let recording_dir = env::var("RECORDING_DIR")
            .unwrap_or_else(|_| "recordings".to_string())
            .into();

        let seed_demo_exam = env::var("SEED_DEMO_EXAM")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let defaults = SessionConfig::default();
        let session = SessionConfig {
            autosave_interval: env_parse("AUTOSAVE_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.autosave_interval),
            poll_interval: env_parse("POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            darkness_threshold: env_parse("DARKNESS_THRESHOLD")
                .unwrap_or(defaults.darkness_threshold),
        }
        .normalized();

        Self {
            database_url,
            rust_log,
            bind_addr,
            exam_id,
            candidate_id,
            recording_dir,
            seed_demo_exam,
            session,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_periods_fall_back_to_defaults() {
        let config = SessionConfig {
            autosave_interval: Duration::ZERO,
            poll_interval: Duration::ZERO,
            darkness_threshold: 12.0,
        }
        .normalized();

        assert_eq!(config.autosave_interval, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_millis(1000));
        assert_eq!(config.darkness_threshold, 12.0);
    }

    #[test]
    fn test_positive_periods_are_kept() {
        let config = SessionConfig {
            autosave_interval: Duration::from_secs(30),
            poll_interval: Duration::from_millis(250),
            darkness_threshold: 40.0,
        }
        .normalized();

        assert_eq!(config.autosave_interval, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
