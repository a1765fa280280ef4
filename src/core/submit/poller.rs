//! Batch job polling

use crate::adapters::traits::{JobState, JobStatus, PrimaryApi};
use crate::core::cancel::CancelToken;
use crate::core::flow::FlowState;
use crate::core::progress::{FlowProgress, ProgressSink};
use crate::domain::ids::JobHandle;
use crate::domain::{Result, SyncError};
use crate::log_poll_tick;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(1200),
        }
    }
}

/// Poll a job until it completes
///
/// Every tick is pushed to `sink`, including ticks whose status read failed
/// transiently. Those failures are logged and the loop keeps going until the
/// timeout.
///
/// # Errors
///
/// - [`SyncError::Fatal`] if the job reports `failed`
/// - [`SyncError::Timeout`] once `policy.timeout` has elapsed
/// - [`SyncError::Cancelled`] if the host cancels during a wait
/// - any non-transient status read error
pub async fn poll_until_terminal(
    api: &dyn PrimaryApi,
    job: &JobHandle,
    policy: PollPolicy,
    cancel: &CancelToken,
    sink: &dyn ProgressSink,
) -> Result<JobStatus> {
    let started = Instant::now();

    loop {
        let elapsed = started.elapsed();
        match api.read_job_status(job).await {
            Ok(status) => {
                log_poll_tick!(job, status.state, elapsed.as_secs());
                let message = match status.completion {
                    Some(pct) => format!("Job {job} {} ({pct:.0}%)", status.state),
                    None => format!("Job {job} {}", status.state),
                };
                sink.notify(&FlowProgress::new(
                    FlowState::PollingProgress,
                    message,
                    elapsed.as_secs(),
                ));

                match status.state {
                    JobState::Completed => return Ok(status),
                    JobState::Failed => {
                        return Err(SyncError::Fatal(format!(
                            "job {job} failed: {}",
                            status.message.as_deref().unwrap_or("no message")
                        )))
                    }
                    _ => {}
                }
            }
            Err(e) if e.is_transient() => {
                tracing::warn!(job = %job, error = %e, "Job status read failed; will retry");
                sink.notify(&FlowProgress::new(
                    FlowState::PollingProgress,
                    format!("Job {job} status unavailable, retrying"),
                    elapsed.as_secs(),
                ));
            }
            Err(e) => return Err(e),
        }

        if started.elapsed() >= policy.timeout {
            return Err(SyncError::Timeout {
                operation: format!("job {job}"),
                elapsed_secs: started.elapsed().as_secs(),
            });
        }
        cancel.sleep(policy.interval, "job polling").await?;
    }
}
