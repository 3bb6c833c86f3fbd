//! Per-job recognition state machine.
//!
//! ```text
//! Submitting ──submit ok──▶ Polling ──done + chunks──▶ Done
//!     │                      │  ▲ │
//!     │ submit failed        │  │ └──done + error / no chunks──▶ Failed
//!     ▼                      │  │
//!   Failed                   │  └── pending / transport error (interval)
//!                            │  └── rate limited (cooldown, not charged)
//!                            └──budget exceeded──▶ TimedOut
//! ```
//!
//! Each `step` performs at most one network call and one sleep. The wait
//! budget is the time since submission minus time spent in rate-limit
//! cooldowns; it is checked before every sleep, so exceeding it stops polling
//! without cancelling an in-flight request.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use super::operation::{assemble_transcript, Operation, PollOutcome};
use super::schedule::{PollSchedule, RecognitionMode};
use super::RecognitionError;
use crate::adapters::Recognizer;

/// What to recognize and how
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionRequest {
    pub artifact_uri: String,
    pub duration_secs: f64,
    pub mode: RecognitionMode,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionState {
    /// Request not yet sent
    Submitting,

    /// Waiting `delay` before the next status query
    Polling {
        operation_id: String,
        delay: Duration,
        /// The delay is a rate-limit cooldown and is not charged to the budget
        cooldown: bool,
    },

    Done {
        operation_id: String,
        text: String,
    },

    Failed(RecognitionError),

    TimedOut {
        operation_id: String,
        waited: Duration,
    },
}

impl RecognitionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Done { .. } | Self::Failed(_) | Self::TimedOut { .. }
        )
    }
}

/// Poll counters for one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub polls: u32,
    pub rate_limited: u32,
    pub transport_errors: u32,
}

/// Drives one job from submission to a terminal state
pub struct RecognitionMachine<'a> {
    recognizer: &'a dyn Recognizer,
    request: RecognitionRequest,
    schedule: PollSchedule,
    rate_limit_cooldown: Duration,
    state: RecognitionState,
    submitted_at: Option<Instant>,
    cooldown_total: Duration,
    stats: PollStats,
}

impl<'a> RecognitionMachine<'a> {
    pub fn new(
        recognizer: &'a dyn Recognizer,
        request: RecognitionRequest,
        rate_limit_cooldown: Duration,
    ) -> Self {
        let schedule = PollSchedule::for_mode(request.mode, request.duration_secs);
        Self {
            recognizer,
            request,
            schedule,
            rate_limit_cooldown,
            state: RecognitionState::Submitting,
            submitted_at: None,
            cooldown_total: Duration::ZERO,
            stats: PollStats::default(),
        }
    }

    pub fn state(&self) -> &RecognitionState {
        &self.state
    }

    pub fn schedule(&self) -> PollSchedule {
        self.schedule
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Time since submission charged against `max_wait`
    pub fn budget_used(&self) -> Duration {
        match self.submitted_at {
            Some(at) => at.elapsed().saturating_sub(self.cooldown_total),
            None => Duration::ZERO,
        }
    }

    /// Advance by one transition; terminal states are left unchanged
    pub async fn step(&mut self) {
        let state = std::mem::replace(&mut self.state, RecognitionState::Submitting);
        self.state = match state {
            RecognitionState::Submitting => self.submit().await,
            RecognitionState::Polling {
                operation_id,
                delay,
                cooldown,
            } => self.poll(operation_id, delay, cooldown).await,
            terminal => terminal,
        };
    }

    /// Step until terminal and return the transcript
    pub async fn run(mut self) -> Result<String, RecognitionError> {
        while !self.is_terminal() {
            self.step().await;
        }

        debug!(
            polls = self.stats.polls,
            rate_limited = self.stats.rate_limited,
            transport_errors = self.stats.transport_errors,
            "Recognition finished"
        );

        match self.state {
            RecognitionState::Done { text, .. } => Ok(text),
            RecognitionState::Failed(e) => Err(e),
            RecognitionState::TimedOut {
                operation_id,
                waited,
            } => Err(RecognitionError::TimedOut {
                operation_id,
                waited_secs: waited.as_secs_f64(),
            }),
            other => Err(RecognitionError::Submit(format!(
                "machine stopped in non-terminal state {:?}",
                other
            ))),
        }
    }

    async fn submit(&mut self) -> RecognitionState {
        let submitted = self
            .recognizer
            .submit(
                &self.request.artifact_uri,
                self.request.duration_secs,
                self.request.mode,
            )
            .await;

        match submitted {
            Ok(operation_id) => {
                self.submitted_at = Some(Instant::now());
                info!(
                    %operation_id,
                    mode = %self.request.mode,
                    interval_secs = self.schedule.interval.as_secs_f64(),
                    max_wait_secs = self.schedule.max_wait.as_secs_f64(),
                    "Recognition operation started"
                );
                RecognitionState::Polling {
                    operation_id,
                    delay: self.schedule.interval,
                    cooldown: false,
                }
            }
            Err(e) => {
                error!(uri = %self.request.artifact_uri, error = %e, "Recognition submit failed");
                RecognitionState::Failed(RecognitionError::Submit(format!("{:#}", e)))
            }
        }
    }

    async fn poll(&mut self, operation_id: String, delay: Duration, cooldown: bool) -> RecognitionState {
        let used = self.budget_used();
        if used > self.schedule.max_wait {
            warn!(
                %operation_id,
                waited_secs = used.as_secs_f64(),
                max_wait_secs = self.schedule.max_wait.as_secs_f64(),
                "Recognition wait budget exceeded"
            );
            return RecognitionState::TimedOut {
                operation_id,
                waited: used,
            };
        }

        sleep(delay).await;
        if cooldown {
            self.cooldown_total += delay;
        }

        self.stats.polls += 1;
        match self.recognizer.poll(&operation_id).await {
            Ok(PollOutcome::RateLimited) => {
                self.stats.rate_limited += 1;
                warn!(
                    %operation_id,
                    cooldown_secs = self.rate_limit_cooldown.as_secs(),
                    "Recognizer rate limit hit, cooling down"
                );
                RecognitionState::Polling {
                    operation_id,
                    delay: self.rate_limit_cooldown,
                    cooldown: true,
                }
            }
            Ok(PollOutcome::Operation(op)) if !op.done => {
                debug!(%operation_id, "Operation not finished yet");
                RecognitionState::Polling {
                    operation_id,
                    delay: self.schedule.interval,
                    cooldown: false,
                }
            }
            Ok(PollOutcome::Operation(op)) => Self::finish(operation_id, op),
            Err(e) => {
                self.stats.transport_errors += 1;
                warn!(%operation_id, error = %e, "Operation status request failed");
                RecognitionState::Polling {
                    operation_id,
                    delay: self.schedule.interval,
                    cooldown: false,
                }
            }
        }
    }

    fn finish(operation_id: String, op: Operation) -> RecognitionState {
        if let Some(err) = op.error {
            error!(%operation_id, code = err.code, message = %err.message, "Recognition failed");
            return RecognitionState::Failed(RecognitionError::Operation {
                operation_id,
                code: err.code,
                message: err.message,
            });
        }

        match op.response.and_then(|r| r.chunks) {
            Some(chunks) => {
                let text = assemble_transcript(&chunks);
                info!(%operation_id, chunks = chunks.len(), chars = text.len(), "Recognition done");
                RecognitionState::Done { operation_id, text }
            }
            None => {
                error!(%operation_id, "Operation finished without recognition results");
                RecognitionState::Failed(RecognitionError::NoResults(operation_id))
            }
        }
    }
}
