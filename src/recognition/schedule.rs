//! Recognition modes and their polling budgets.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum poll interval in interactive mode
const MIN_INTERACTIVE_INTERVAL_SECS: f64 = 10.0;

/// Seconds of audio per second of expected processing
const AUDIO_TO_PROCESSING_RATIO: f64 = 6.0;

/// Polls per expected processing time
const POLLS_PER_EXPECTED: f64 = 3.0;

/// Max wait as a multiple of the expected processing time
const MAX_WAIT_FACTOR: f64 = 10.0;

const DEFERRED_INTERVAL: Duration = Duration::from_secs(60);
const DEFERRED_MAX_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

/// How the recognizer schedules the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMode {
    /// Short, duration-proportional budget
    #[default]
    Interactive,

    /// Fixed long budget (up to 24h), cheaper on the recognizer side
    Deferred,
}

impl RecognitionMode {
    /// Recognizer model name for this mode
    pub fn model(&self) -> &'static str {
        match self {
            Self::Interactive => "general",
            Self::Deferred => "deferred-general",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Deferred => write!(f, "deferred"),
        }
    }
}

impl FromStr for RecognitionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interactive" | "general" => Ok(Self::Interactive),
            "deferred" | "deferred-general" => Ok(Self::Deferred),
            other => Err(format!("Unknown recognition mode: {}", other)),
        }
    }
}

/// Poll interval and total wait budget for one operation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSchedule {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl PollSchedule {
    /// Compute the schedule for an artifact of `duration_secs` seconds
    pub fn for_mode(mode: RecognitionMode, duration_secs: f64) -> Self {
        match mode {
            RecognitionMode::Interactive => {
                let duration = if duration_secs.is_finite() && duration_secs > 0.0 {
                    duration_secs
                } else {
                    0.0
                };
                let expected = duration / AUDIO_TO_PROCESSING_RATIO;
                let interval = (expected / POLLS_PER_EXPECTED).max(MIN_INTERACTIVE_INTERVAL_SECS);

                Self {
                    interval: saturating_secs(interval),
                    max_wait: saturating_secs(expected * MAX_WAIT_FACTOR),
                }
            }
            RecognitionMode::Deferred => Self {
                interval: DEFERRED_INTERVAL,
                max_wait: DEFERRED_MAX_WAIT,
            },
        }
    }
}

/// Seconds to a `Duration`, saturating instead of panicking on overflow
fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_schedule_for_ten_minutes() {
        let schedule = PollSchedule::for_mode(RecognitionMode::Interactive, 600.0);

        assert!((schedule.interval.as_secs_f64() - 100.0 / 3.0).abs() < 1e-6);
        assert_eq!(schedule.max_wait, Duration::from_secs(1000));
    }

    #[test]
    fn test_interactive_interval_floor() {
        let schedule = PollSchedule::for_mode(RecognitionMode::Interactive, 60.0);

        assert_eq!(schedule.interval, Duration::from_secs(10));
        assert_eq!(schedule.max_wait, Duration::from_secs(100));
    }

    #[test]
    fn test_deferred_schedule_ignores_duration() {
        for duration in [1.0, 600.0, 36_000.0] {
            let schedule = PollSchedule::for_mode(RecognitionMode::Deferred, duration);
            assert_eq!(schedule.interval, Duration::from_secs(60));
            assert_eq!(schedule.max_wait, Duration::from_secs(86_400));
        }
    }

    #[test]
    fn test_invalid_duration_does_not_panic() {
        for duration in [f64::NAN, -5.0, f64::INFINITY] {
            let schedule = PollSchedule::for_mode(RecognitionMode::Interactive, duration);
            assert_eq!(schedule.interval, Duration::from_secs(10));
            assert_eq!(schedule.max_wait, Duration::ZERO);
        }
    }

    #[test]
    fn test_huge_duration_saturates() {
        let schedule = PollSchedule::for_mode(RecognitionMode::Interactive, 1e20);
        assert_eq!(schedule.max_wait, Duration::MAX);
        assert!(schedule.interval > Duration::from_secs(10));

        let schedule = PollSchedule::for_mode(RecognitionMode::Interactive, f64::MAX);
        assert_eq!(schedule.interval, Duration::MAX);
        assert_eq!(schedule.max_wait, Duration::MAX);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("interactive".parse::<RecognitionMode>(), Ok(RecognitionMode::Interactive));
        assert_eq!("Deferred".parse::<RecognitionMode>(), Ok(RecognitionMode::Deferred));
        assert_eq!("deferred-general".parse::<RecognitionMode>(), Ok(RecognitionMode::Deferred));
        assert!("batch".parse::<RecognitionMode>().is_err());
        assert_eq!(RecognitionMode::Deferred.model(), "deferred-general");
    }
}
