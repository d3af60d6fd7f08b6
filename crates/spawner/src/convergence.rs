use std::{future::Future, time::Duration};

use tracing::debug;

use crate::telemetry;

/// Outcome of one convergence attempt. Errors returned by the step end the
/// loop immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    Ready(T),
    Retry,
}

/// Runs `step` until it yields [`Step::Ready`], sleeping `interval` between
/// attempts. There is no attempt limit; callers bound it by dropping the
/// future.
pub async fn converge<T, E, F, Fut>(
    loop_name: &'static str,
    interval: Duration,
    mut step: F,
) -> Result<T, E>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Step<T>, E>>,
{
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match step(attempt).await {
            Ok(Step::Ready(value)) => {
                telemetry::record_convergence_attempts(loop_name, attempt);
                return Ok(value);
            }
            Ok(Step::Retry) => {
                debug!(loop_name, attempt, "not converged yet");
                tokio::time::sleep(interval).await;
            }
            Err(err) => {
                telemetry::record_convergence_attempts(loop_name, attempt);
                return Err(err);
            }
        }
    }
}
