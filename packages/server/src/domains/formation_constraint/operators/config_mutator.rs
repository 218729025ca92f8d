use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::domains::formation_assignment::events::{parse_reported_state, NotificationResult};
use crate::domains::formation_assignment::models::non_empty_config;
use crate::domains::formation_assignment::notifications::AssignmentDetails;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigMutatorInput {
    /// Empty means every source
    pub only_for_source_subtypes: Vec<String>,
    pub state: Option<String>,
    pub configuration: Option<Value>,
}

/// `ConfigMutator`: override the state and/or configuration of a returned
/// result. Failed results are left alone.
pub fn mutate(
    input: &ConfigMutatorInput,
    details: &AssignmentDetails,
    result: &mut NotificationResult,
) -> Result<bool> {
    if result.error.is_some() {
        return Ok(false);
    }

    if !input.only_for_source_subtypes.is_empty() {
        let applies = details
            .source_subtype()
            .is_some_and(|s| input.only_for_source_subtypes.iter().any(|o| o == s));
        if !applies {
            return Ok(false);
        }
    }

    if let Some(state) = &input.state {
        result.state = parse_reported_state(details.operation, state).map_err(|e| anyhow!(e))?;
    }

    if let Some(configuration) = &input.configuration {
        let parsed = match configuration {
            Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| configuration.clone()),
            other => other.clone(),
        };
        result.configuration = non_empty_config(Some(parsed));
    }

    Ok(true)
}
