//! Convergence wait with exponential backoff
//!
//! Polls a resource until it reports a usable state, bounded by a wait budget.
//! The probe says Ready, Pending or Failed, and only the budget decides when
//! Pending turns into a timeout.

use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

/// What a single readiness probe observed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    /// Usable by dependents
    Ready,
    /// Not yet; carries the provider status for diagnostics
    Pending(String),
    /// The resource reached a state it will never leave on its own
    Failed(String),
}

/// Wait budget and polling cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitConfig {
    /// Total time allowed before giving up
    pub budget: Duration,
    /// First polling interval
    pub initial_interval: Duration,
    /// Polling interval cap
    pub max_interval: Duration,
    /// Exponential multiplier
    pub multiplier: f64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            budget: Duration::from_secs(300),
            initial_interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl WaitConfig {
    pub fn with_budget(budget: Duration) -> Self {
        Self {
            budget,
            ..Self::default()
        }
    }

    /// Polling interval after `attempt` unsuccessful probes
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_interval.as_millis() as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(delay.min(self.max_interval.as_millis() as f64) as u64)
    }
}

/// Poll `probe` until it reports [`Readiness::Ready`]
///
/// Transient probe errors count as "not yet". A [`Readiness::Failed`] probe or
/// a non-transient error ends the wait immediately. Once `config.budget` has
/// elapsed (and not before) the wait fails with
/// [`GatewayError::ProvisioningTimeout`].
pub async fn poll_until_ready<F, Fut>(
    resource: &str,
    config: &WaitConfig,
    mut probe: F,
) -> GatewayResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = GatewayResult<Readiness>>,
{
    let started = Instant::now();
    let mut attempt = 0;
    let mut last_status: String;

    loop {
        match probe().await {
            Ok(Readiness::Ready) => {
                debug!(resource, attempt, "Resource is ready");
                return Ok(());
            }
            Ok(Readiness::Pending(status)) => last_status = status,
            Ok(Readiness::Failed(reason)) => {
                return Err(GatewayError::permanent(format!(
                    "{} entered a failed state: {}",
                    resource, reason
                )));
            }
            Err(err) if err.is_transient() => last_status = err.to_string(),
            Err(err) => return Err(err),
        }

        let elapsed = started.elapsed();
        if elapsed >= config.budget {
            return Err(GatewayError::ProvisioningTimeout {
                resource: resource.to_string(),
                waited: elapsed,
                last_status,
            });
        }

        // the last sleep only uses what is left of the budget
        let delay = config.delay_for_attempt(attempt).min(config.budget - elapsed);
        debug!(
            resource,
            attempt,
            status = %last_status,
            delay_ms = delay.as_millis() as u64,
            "Waiting for resource"
        );
        sleep(delay).await;
        attempt += 1;
    }
}
