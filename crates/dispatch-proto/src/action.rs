use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CodecError;

/// Whether an action must complete before later nodes/edges may be released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockingType {
    None,
    Soft,
    Hard,
}

/// One key/value pair of `action_parameters`, as VDA5050 represents them
/// on the wire (an array of `{key, value}` rather than a bare object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionParameter {
    pub key: String,
    pub value: Value,
}

/// An Order-node action or an InstantActions entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "actionId")]
    pub action_id: String,
    #[serde(rename = "actionType")]
    pub action_type: String,
    #[serde(rename = "actionDescription", skip_serializing_if = "Option::is_none")]
    pub action_description: Option<String>,
    #[serde(rename = "blockingType")]
    pub blocking_type: BlockingType,
    #[serde(rename = "actionParameters", default)]
    pub action_parameters: Vec<ActionParameter>,
}

impl Action {
    /// Builds an action from the mission node's `action_parameters` JSON
    /// object (spec §3's `MissionNode::action.action_parameters`).
    pub fn from_json_parameters(
        action_id: impl Into<String>,
        action_type: impl Into<String>,
        blocking_type: BlockingType,
        parameters: &Value,
    ) -> Result<Self, CodecError> {
        let object = parameters
            .as_object()
            .ok_or_else(|| CodecError::NonObjectActionParameters(parameters.clone()))?;
        let action_parameters = object
            .iter()
            .map(|(key, value)| ActionParameter {
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Ok(Self {
            action_id: action_id.into(),
            action_type: action_type.into(),
            action_description: None,
            blocking_type,
            action_parameters,
        })
    }

    /// Reassembles `action_parameters` as a plain JSON object.
    pub fn parameters_as_json_object(&self) -> Value {
        Value::Object(
            self.action_parameters
                .iter()
                .map(|p| (p.key.clone(), p.value.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn action_parameters_round_trip_through_json_object() {
        let params = json!({"should_fail": 1, "time": 1});
        let action = Action::from_json_parameters("a1", "dummy_action", BlockingType::Hard, &params).unwrap();
        assert_eq!(action.parameters_as_json_object(), params);
    }

    #[test]
    fn rejects_non_object_parameters() {
        let err = Action::from_json_parameters("a1", "t", BlockingType::Hard, &json!([1, 2])).unwrap_err();
        assert!(matches!(err, CodecError::NonObjectActionParameters(_)));
    }
}
