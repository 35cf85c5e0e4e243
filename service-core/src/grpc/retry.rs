//! Retry utilities for service-to-service connections.
//!
//! Provides configurable exponential backoff for establishing gRPC channels.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tonic::Status;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};

/// Configuration for retry behavior.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Initial backoff duration before first retry.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to backoff duration.
    pub add_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculate backoff duration for a given attempt.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = (backoff_ms as f64 * 0.25 * rand_jitter()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependencies.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// Run `f` until it succeeds, `should_retry` rejects the error, or the
/// attempts in `config` are exhausted. Returns the last error on failure.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    should_retry: P,
    f: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 0 {
                    info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= config.max_retries || !should_retry(&err) {
                    if config.max_retries > 0 {
                        warn!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            error = %err,
                            "Operation failed, giving up"
                        );
                    }
                    return Err(err);
                }

                let backoff = config.backoff_duration(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    error = %err,
                    backoff_ms = backoff.as_millis(),
                    "Operation failed, retrying after backoff"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

/// Why a channel could not be established.
#[derive(Debug, Error)]
pub enum DialError {
    #[error(transparent)]
    Connect(#[from] tonic::transport::Error),

    #[error("peer rejected the readiness check: {0}")]
    NotReady(Status),

    #[error("peer did not answer within {0:?}")]
    ReadyTimeout(Duration),
}

/// Establish a channel to `endpoint` and confirm a gRPC server answers on it,
/// retrying failures per `config`.
///
/// A bare TCP connect succeeds against any socket that is listening, so the
/// channel only counts once `ready` resolves `Ok`. `attempt_timeout` bounds
/// each attempt, connect and readiness check together. With
/// [`RetryConfig::no_retry`] this is a single attempt.
pub async fn connect_with_retry<R, Fut>(
    endpoint: &Endpoint,
    config: &RetryConfig,
    attempt_timeout: Duration,
    ready: R,
) -> Result<Channel, DialError>
where
    R: Fn(Channel) -> Fut,
    Fut: Future<Output = Result<(), Status>>,
{
    let ready = &ready;
    retry_with_backoff(
        config,
        "grpc_connect",
        |_: &DialError| true,
        || async move {
            let attempt = async {
                let channel = endpoint.connect().await?;
                ready(channel.clone()).await.map_err(DialError::NotReady)?;
                Ok::<_, DialError>(channel)
            };
            match timeout(attempt_timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(DialError::ReadyTimeout(attempt_timeout)),
            }
        },
    )
    .await
}
