//! Remote relationship oracle
//!
//! Wraps a [`CompletionTransport`] with prompt construction, reply parsing and
//! the retry policy. Every question gets an answer: when the transport keeps
//! failing, or fails hard, the client falls back to a fixed low-confidence
//! verdict that records how many attempts were made and why.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::domain::document::ConceptGroup;
use crate::domain::knowledge::{Origin, RelationshipType};
use crate::error::{Error, Result};
use crate::llm::{CompletionTransport, Message};

use super::prompt::{self, PromptLimits};
use super::reply;
use super::retry::{RetryPolicy, RetryStep};
use super::{ConceptVerdict, RelationVerdict, RelationshipOracle};

/// Confidence attached to a parsed oracle answer
const ORACLE_CONFIDENCE: f32 = 0.9;

/// Why the client stopped asking
#[derive(Debug)]
struct Failure {
    attempts: u32,
    reason: String,
}

pub struct OracleClient<T: CompletionTransport> {
    transport: T,
    policy: RetryPolicy,
    limits: PromptLimits,
    fallback_confidence: f32,
    cancel: Option<CancellationToken>,
}

impl<T: CompletionTransport> std::fmt::Debug for OracleClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleClient")
            .field("policy", &self.policy)
            .field("limits", &self.limits)
            .field("fallback_confidence", &self.fallback_confidence)
            .finish()
    }
}

impl<T: CompletionTransport> OracleClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            limits: PromptLimits::default(),
            fallback_confidence: 0.1,
            cancel: None,
        }
    }

    pub fn from_config(transport: T, config: &Config) -> Self {
        Self::new(transport)
            .with_policy(RetryPolicy::from_config(&config.oracle))
            .with_limits(PromptLimits {
                max_chars: config.oracle.max_prompt_chars,
                max_evidence: config.oracle.max_evidence,
            })
            .with_fallback_confidence(config.oracle.fallback_confidence)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_limits(mut self, limits: PromptLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_fallback_confidence(mut self, confidence: f32) -> Self {
        self.fallback_confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Stop waiting between retries once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send `messages` until `parse` accepts a reply or the policy gives up
    async fn ask<V>(
        &self,
        messages: Vec<Message>,
        parse: impl Fn(&str) -> Result<V> + Send + Sync,
    ) -> std::result::Result<(V, u32), Failure>
    where
        V: Send,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let outcome = match self.transport.complete(messages.clone()).await {
                Ok(response) => parse(&response.content),
                Err(e) => Err(e),
            };

            let error = match outcome {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };

            if !error.is_transient() {
                warn!(attempt, error = %error, "Oracle call failed permanently");
                return Err(Failure {
                    attempts: attempt,
                    reason: error.to_string(),
                });
            }

            let suggested = error.suggested_wait_secs().map(Duration::from_secs);
            match self.policy.next_step(attempt, suggested) {
                RetryStep::GiveUp => {
                    warn!(attempt, error = %error, "Oracle retries exhausted");
                    return Err(Failure {
                        attempts: attempt,
                        reason: error.to_string(),
                    });
                }
                RetryStep::Wait(wait) => {
                    debug!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %error,
                        "Oracle call failed, retrying after backoff"
                    );
                    if !self.sleep(wait).await {
                        return Err(Failure {
                            attempts: attempt,
                            reason: Error::Cancelled.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Sleep for `wait`; false when cancelled first
    async fn sleep(&self, wait: Duration) -> bool {
        match &self.cancel {
            Some(token) => {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => true,
                    _ = token.cancelled() => false,
                }
            }
            None => {
                tokio::time::sleep(wait).await;
                true
            }
        }
    }

    fn fallback_origin(failure: Failure) -> Origin {
        Origin::Fallback {
            attempts: failure.attempts,
            reason: failure.reason,
        }
    }
}

#[async_trait]
impl<T: CompletionTransport> RelationshipOracle for OracleClient<T> {
    async fn infer_relation(&self, source: &str, target: &str, context: &str) -> RelationVerdict {
        let messages = prompt::relation_messages(source, target, context, &self.limits);

        match self.ask(messages, reply::parse_relation).await {
            Ok((relationship, attempts)) => {
                info!(
                    source = %source,
                    target = %target,
                    relationship = %relationship,
                    attempts,
                    "Inferred relationship"
                );
                RelationVerdict {
                    relationship,
                    confidence: ORACLE_CONFIDENCE,
                    origin: Origin::Oracle,
                }
            }
            Err(failure) => {
                warn!(
                    source = %source,
                    target = %target,
                    attempts = failure.attempts,
                    "Falling back to {}",
                    RelationshipType::Mentions.label()
                );
                RelationVerdict {
                    relationship: RelationshipType::Mentions,
                    confidence: self.fallback_confidence,
                    origin: Self::fallback_origin(failure),
                }
            }
        }
    }

    async fn same_concept(&self, group: &ConceptGroup) -> ConceptVerdict {
        let messages = prompt::concept_messages(group, &self.limits);

        match self.ask(messages, reply::parse_same_concept).await {
            Ok((same, attempts)) => {
                info!(key = %group.key, same, attempts, "Checked concept group");
                ConceptVerdict {
                    same,
                    confidence: ORACLE_CONFIDENCE,
                    origin: Origin::Oracle,
                }
            }
            Err(failure) => {
                warn!(
                    key = %group.key,
                    attempts = failure.attempts,
                    "Concept check failed, treating group as distinct"
                );
                ConceptVerdict {
                    same: false,
                    confidence: self.fallback_confidence,
                    origin: Self::fallback_origin(failure),
                }
            }
        }
    }
}
