//! Relationship oracle
//!
//! Answers two questions about concepts found in the vault:
//! - which relationship links a source note to a linked target
//! - whether a group of keyword occurrences names one concept
//!
//! Answers are never errors. A client that cannot get a usable reply falls back
//! to a fixed verdict whose origin records the failure.

mod client;
mod offline;
pub mod prompt;
pub mod reply;
pub mod retry;

pub use client::OracleClient;
pub use offline::OfflineOracle;
pub use prompt::PromptLimits;
pub use retry::{RetryPolicy, RetryStep};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::domain::document::ConceptGroup;
use crate::domain::knowledge::{Origin, RelationshipType};
use crate::error::{Error, Result};
use crate::llm::LlmClient;

/// A question put to the oracle
#[derive(Debug, Clone, Copy)]
pub enum OracleQuery<'a> {
    Relation {
        source: &'a str,
        target: &'a str,
        context: &'a str,
    },
    SameConcept {
        group: &'a ConceptGroup,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationVerdict {
    pub relationship: RelationshipType,
    pub confidence: f32,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConceptVerdict {
    pub same: bool,
    pub confidence: f32,
    pub origin: Origin,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Relationship(RelationVerdict),
    SameConcept(ConceptVerdict),
}

#[async_trait]
pub trait RelationshipOracle: Send + Sync {
    async fn infer_relation(&self, source: &str, target: &str, context: &str) -> RelationVerdict;

    async fn same_concept(&self, group: &ConceptGroup) -> ConceptVerdict;

    async fn infer(&self, query: OracleQuery<'_>) -> Verdict {
        match query {
            OracleQuery::Relation {
                source,
                target,
                context,
            } => Verdict::Relationship(self.infer_relation(source, target, context).await),
            OracleQuery::SameConcept { group } => Verdict::SameConcept(self.same_concept(group).await),
        }
    }
}

/// Pick the oracle for `config`
///
/// The offline oracle is used when `llm.offline` is set or no API key is found
/// in the environment.
pub fn from_config(config: &Config, cancel: Option<CancellationToken>) -> Result<Arc<dyn RelationshipOracle>> {
    if config.llm.offline {
        info!("Using offline oracle");
        return Ok(Arc::new(OfflineOracle::new()));
    }

    let api_key = config
        .llm
        .resolved_api_key()
        .map_err(|e| Error::ConfigError(e.to_string()))?;

    let Some(api_key) = api_key else {
        info!(provider = %config.llm.provider, "No API key found, using offline oracle");
        return Ok(Arc::new(OfflineOracle::new()));
    };

    let transport = LlmClient::new(config.llm.clone(), api_key)?;
    info!(
        provider = %config.llm.provider,
        model = %transport.default_model(),
        "Using remote oracle"
    );

    let mut client = OracleClient::from_config(transport, config);
    if let Some(token) = cancel {
        client = client.with_cancellation(token);
    }
    Ok(Arc::new(client))
}
