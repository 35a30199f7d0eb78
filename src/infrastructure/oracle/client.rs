//! Wraps a `ReasoningOracle` with the per-call timeout and retry policy from
//! spec.md §5: default 10s timeout, 2 retries, exponential back-off. Runs
//! outside any `PersistenceStore` lock.

use super::request::{OracleRequest, ReasoningOracle};
use crate::domain::errors::OracleError;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct OracleClient {
    oracle: Arc<dyn ReasoningOracle>,
    timeout: Duration,
    max_retries: u32,
}

impl OracleClient {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, timeout: Duration, max_retries: u32) -> Self {
        Self {
            oracle,
            timeout,
            max_retries,
        }
    }

    /// Calls the oracle, retrying on timeout/transport failure with
    /// exponential back-off (base 200ms). On exhaustion, returns the last error.
    pub async fn call(&self, request: OracleRequest) -> Result<String, OracleError> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.timeout, self.oracle.respond(request.clone())).await;
            match result {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) if attempt >= self.max_retries => return Err(e),
                Err(_elapsed) if attempt >= self.max_retries => {
                    return Err(OracleError::Timeout(self.timeout))
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "oracle call failed, retrying");
                }
                Err(_elapsed) => {
                    warn!(attempt, timeout_ms = self.timeout.as_millis(), "oracle call timed out, retrying");
                }
            }
            let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyOracle {
        failures_remaining: AtomicU32,
    }

    #[async_trait]
    impl ReasoningOracle for FlakyOracle {
        async fn respond(&self, _request: OracleRequest) -> Result<String, OracleError> {
            if self.failures_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(OracleError::Transport("connection reset".into()))
            } else {
                Ok(r#"{"action":"HOLD"}"#.to_string())
            }
        }
    }

    fn req() -> OracleRequest {
        OracleRequest {
            system_prompt: String::new(),
            user_prompt: String::new(),
            json_mode: true,
        }
    }

    #[tokio::test]
    async fn succeeds_after_retrying_transient_failures() {
        let oracle = Arc::new(FlakyOracle {
            failures_remaining: AtomicU32::new(2),
        });
        let client = OracleClient::new(oracle, Duration::from_secs(1), 2);
        let result = client.call(req()).await.unwrap();
        assert!(result.contains("HOLD"));
    }

    #[tokio::test]
    async fn exhausts_retries_and_returns_last_error() {
        let oracle = Arc::new(FlakyOracle {
            failures_remaining: AtomicU32::new(10),
        });
        let client = OracleClient::new(oracle, Duration::from_secs(1), 1);
        let result = client.call(req()).await;
        assert!(result.is_err());
    }
}
