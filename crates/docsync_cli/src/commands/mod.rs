//! CLI command implementations.

pub mod pending;
pub mod replicate;

use crate::error::{CliError, CliResult};
use clap::Args;
use docsync_replicator::ReplicatorConfig;

/// Options narrowing which documents are replicated.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Only documents whose string property equals the value (KEY=VALUE, repeatable)
    #[arg(long = "where", value_name = "KEY=VALUE")]
    pub conditions: Vec<String>,

    /// Only these document ids (comma separated, repeatable)
    #[arg(long = "id", value_delimiter = ',')]
    pub ids: Vec<String>,
}

impl ScopeArgs {
    /// Adds the filter and allow-list to a configuration.
    pub fn apply(&self, mut config: ReplicatorConfig) -> CliResult<ReplicatorConfig> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| parse_condition(c))
            .collect::<CliResult<Vec<_>>>()?;
        if !conditions.is_empty() {
            config = config.with_filter(move |doc| {
                conditions
                    .iter()
                    .all(|(key, value)| doc.string(key) == Some(value.as_str()))
            });
        }
        if !self.ids.is_empty() {
            config = config.with_document_ids(self.ids.iter().cloned());
        }
        Ok(config)
    }
}

fn parse_condition(condition: &str) -> CliResult<(String, String)> {
    match condition.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(CliError::InvalidArgument(format!(
            "expected KEY=VALUE, got {condition:?}"
        ))),
    }
}
