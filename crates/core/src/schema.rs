//! Structured-response boundary.
//!
//! A response schema is any serde type that can produce an example of
//! itself. The example doubles as format documentation in the system
//! prompt and as corrective feedback when the model answers badly.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ProcessingError;

pub trait StructuredResponse: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// A filled-in instance showing the model what to produce.
    fn example() -> Self;

    /// Semantic checks beyond what deserialization enforces.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    fn from_json(text: &str) -> Result<Self, ProcessingError> {
        let value: Self = serde_json::from_str(text).map_err(|e| ProcessingError::InvalidPayload {
            format: "JSON",
            reason: e.to_string(),
        })?;
        value.validate().map_err(ProcessingError::Validation)?;
        Ok(value)
    }

    fn from_yaml(text: &str) -> Result<Self, ProcessingError> {
        let value: Self = serde_yaml::from_str(text).map_err(|e| ProcessingError::InvalidPayload {
            format: "YAML",
            reason: e.to_string(),
        })?;
        value.validate().map_err(ProcessingError::Validation)?;
        Ok(value)
    }

    fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    /// Top-level field names of the example, in declaration order.
    fn field_names() -> Vec<String> {
        match serde_yaml::to_value(Self::example()) {
            Ok(serde_yaml::Value::Mapping(map)) => map
                .keys()
                .filter_map(|k| k.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Verdict {
        verdict: String,
        score: u8,
    }

    impl StructuredResponse for Verdict {
        fn example() -> Self {
            Self { verdict: "<pass|fail>".into(), score: 5 }
        }

        fn validate(&self) -> Result<(), String> {
            if self.score > 10 {
                return Err(format!("score {} is above 10", self.score));
            }
            Ok(())
        }
    }

    #[test]
    fn parses_json_and_yaml() {
        let v = Verdict::from_json(r#"{"verdict": "pass", "score": 7}"#).unwrap();
        assert_eq!(v.score, 7);
        let v = Verdict::from_yaml("verdict: fail\nscore: 2\n").unwrap();
        assert_eq!(v.verdict, "fail");
    }

    #[test]
    fn validation_failure_is_reported() {
        let err = Verdict::from_json(r#"{"verdict": "pass", "score": 11}"#).unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
    }

    #[test]
    fn field_names_follow_declaration_order() {
        assert_eq!(Verdict::field_names(), vec!["verdict", "score"]);
    }

    #[test]
    fn example_renders_as_yaml() {
        assert!(Verdict::example().to_yaml().contains("verdict:"));
    }
}
