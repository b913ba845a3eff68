//! Bounded tier escalation for a single executor slot.
//!
//! ```text
//! Attempting(tier) --ok--------------------------> Succeeded
//!        |  transient, retries left at tier -----> Attempting(tier)
//!        |  transient exhausted / timeout -------> Attempting(next tier)
//!        |  permanent / no tier left / budget ---> Failed
//! ```
//!
//! Escalation is monotonic (`Low -> Mid -> High`) and bounded by both the
//! tier ceiling and `max_attempts`, so a slot always terminates.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::capability::CapabilityInvoker;
use crate::catalog::{CostTier, ExecutorTemplate};
use crate::context::TaskContext;
use crate::error::CapabilityError;
use crate::plan::{AttemptRecord, ExecutorResult};

/// Retry and escalation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackPolicy {
    /// Attempts at one tier before escalating on transient errors.
    pub attempts_per_tier: u32,
    /// Hard cap on attempts across all tiers.
    pub max_attempts: u32,
    /// Whether a timeout escalates (true) or ends the slot (false).
    pub escalate_on_timeout: bool,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            attempts_per_tier: 2,
            max_attempts: 6,
            escalate_on_timeout: true,
        }
    }
}

impl FallbackPolicy {
    pub fn with_attempts_per_tier(mut self, attempts: u32) -> Self {
        self.attempts_per_tier = attempts.max(1);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_escalate_on_timeout(mut self, escalate: bool) -> Self {
        self.escalate_on_timeout = escalate;
        self
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Retry,
    Escalate(CostTier),
    Stop,
}

/// Runs executor slots with retry and tier escalation.
#[derive(Debug, Clone, Default)]
pub struct FallbackController {
    policy: FallbackPolicy,
}

impl FallbackController {
    pub fn new(policy: FallbackPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    fn next_step(&self, error: &CapabilityError, tier: CostTier, attempts_at_tier: u32) -> Next {
        let escalate = || tier.next().map(Next::Escalate).unwrap_or(Next::Stop);
        match error {
            CapabilityError::Permanent(_) => Next::Stop,
            CapabilityError::Timeout(_) if self.policy.escalate_on_timeout => escalate(),
            CapabilityError::Timeout(_) => Next::Stop,
            CapabilityError::Transient(_) if attempts_at_tier < self.policy.attempts_per_tier => {
                Next::Retry
            }
            CapabilityError::Transient(_) => escalate(),
        }
    }

    /// Runs one slot to completion, starting at the template's tier.
    ///
    /// Never returns an error: exhaustion yields a failed result carrying the
    /// last error. Every attempt is bounded by the template's timeout.
    pub async fn run_slot(
        &self,
        invoker: &dyn CapabilityInvoker,
        template: &ExecutorTemplate,
        input: &str,
        context: &TaskContext,
    ) -> ExecutorResult {
        let origin = template.cost_tier;
        let timeout = template.limits.timeout();
        let started = Instant::now();

        let mut tier = origin;
        let mut attempts_at_tier = 0u32;
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        loop {
            attempts_at_tier += 1;
            let attempt_started = Instant::now();
            let outcome = match tokio::time::timeout(
                timeout,
                invoker.invoke(template, input, context, tier),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout(timeout)),
            };
            let attempt_duration = attempt_started.elapsed();

            let error = match outcome {
                Ok(output) => {
                    attempts.push(AttemptRecord {
                        tier,
                        duration: attempt_duration,
                        error: None,
                    });
                    let mut result = ExecutorResult::succeeded(
                        template,
                        tier,
                        output.output,
                        output.confidence,
                        output.cost,
                    );
                    if tier != origin {
                        result.fallback_from = Some(origin);
                        tracing::info!(
                            executor_id = %template.id,
                            from = %origin,
                            to = %tier,
                            "Executor succeeded after escalation"
                        );
                    }
                    return finish(result, attempts, started);
                }
                Err(e) => e,
            };

            attempts.push(AttemptRecord {
                tier,
                duration: attempt_duration,
                error: Some((&error).into()),
            });

            let next = if attempts.len() as u32 >= self.policy.max_attempts {
                Next::Stop
            } else {
                self.next_step(&error, tier, attempts_at_tier)
            };

            match next {
                Next::Retry => {
                    tracing::debug!(
                        executor_id = %template.id,
                        %tier,
                        attempt = attempts_at_tier,
                        error = %error,
                        "Retrying executor at same tier"
                    );
                }
                Next::Escalate(higher) => {
                    tracing::warn!(
                        executor_id = %template.id,
                        from = %tier,
                        to = %higher,
                        error = %error,
                        "Escalating executor to higher tier"
                    );
                    tier = higher;
                    attempts_at_tier = 0;
                }
                Next::Stop => {
                    tracing::warn!(
                        executor_id = %template.id,
                        %tier,
                        attempts = attempts.len(),
                        error = %error,
                        "Executor failed"
                    );
                    let mut result = ExecutorResult::failed(template, tier, &error);
                    if tier != origin {
                        result.fallback_from = Some(origin);
                    }
                    return finish(result, attempts, started);
                }
            }
        }
    }
}

fn finish(mut result: ExecutorResult, attempts: Vec<AttemptRecord>, started: Instant) -> ExecutorResult {
    result.duration = started.elapsed();
    result.attempts = attempts;
    result
}
