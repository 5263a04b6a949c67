//! Structured-format parsers.
//!
//! Models tend to wrap structured answers in prose or code fences. With
//! `attempt_parse` enabled (the default) the parsers cut the payload out
//! of the surrounding text before handing it to the schema.

use std::marker::PhantomData;

use rustedloop_core::error::ProcessingError;
use rustedloop_core::processing::ProcessedOutput;
use rustedloop_core::schema::StructuredResponse;
use tracing::{debug, warn};

use super::ResponseProcessor;

/// Slice from the first `{` to the last `}` inclusive.
pub fn locate_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Slice from the first line opening with the first top-level field of
/// `S` to the end of the payload: a closing code fence, or the end of the
/// text. A field name mentioned mid-sentence in prose does not count.
pub fn locate_yaml<S: StructuredResponse>(text: &str) -> Option<&str> {
    let fields = S::field_names();
    let first = fields.first()?;
    let key = format!("{first}:");
    let start = if text.starts_with(&key) {
        0
    } else {
        text.find(&format!("\n{key}"))? + 1
    };
    let rest = &text[start..];
    let end = rest.find("```").unwrap_or(rest.len());
    Some(rest[..end].trim_end())
}

/// Store a parse result on the output, or fail it with example-driven feedback.
fn record<S: StructuredResponse>(
    processor: &str,
    output: ProcessedOutput,
    parsed: Result<S, ProcessingError>,
    example: impl FnOnce() -> String,
) -> ProcessedOutput {
    let value = parsed.and_then(|p| {
        serde_json::to_value(&p).map_err(|e| ProcessingError::InvalidPayload {
            format: "JSON",
            reason: e.to_string(),
        })
    });
    match value {
        Ok(value) => {
            debug!(processor, "Parsed structured response");
            ProcessedOutput {
                parsed_response: Some(value),
                ..output
            }
            .succeed(processor)
        }
        Err(e) => {
            warn!(processor, error = %e, "Response could not be parsed");
            let feedback = format!("Bad response. Expected format:\n{}", example());
            output.fail(processor, e.to_string(), feedback)
        }
    }
}

/// Parses the response as JSON into `S`.
pub struct JsonParser<S> {
    attempt_parse: bool,
    example: Option<String>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: StructuredResponse> JsonParser<S> {
    pub fn new() -> Self {
        Self {
            attempt_parse: true,
            example: None,
            _schema: PhantomData,
        }
    }

    /// Parse the whole response instead of locating the payload.
    pub fn strict(mut self) -> Self {
        self.attempt_parse = false;
        self
    }

    /// Show this text in feedback instead of `S::example()`.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    fn parse(&self, text: &str) -> Result<S, ProcessingError> {
        let payload = if self.attempt_parse {
            locate_json(text).ok_or(ProcessingError::PayloadNotFound { format: "JSON" })?
        } else {
            text
        };
        S::from_json(payload)
    }

    fn example_text(&self) -> String {
        self.example.clone().unwrap_or_else(|| S::example().to_json())
    }
}

impl<S: StructuredResponse> Default for JsonParser<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StructuredResponse> ResponseProcessor for JsonParser<S> {
    fn name(&self) -> &str {
        "json_parser"
    }

    fn process(&self, output: ProcessedOutput) -> ProcessedOutput {
        let parsed = self.parse(&output.raw_response);
        record(self.name(), output, parsed, || self.example_text())
    }
}

/// Parses the response as YAML into `S`.
pub struct YamlParser<S> {
    attempt_parse: bool,
    example: Option<String>,
    _schema: PhantomData<fn() -> S>,
}

impl<S: StructuredResponse> YamlParser<S> {
    pub fn new() -> Self {
        Self {
            attempt_parse: true,
            example: None,
            _schema: PhantomData,
        }
    }

    /// Parse the whole response instead of locating the payload.
    pub fn strict(mut self) -> Self {
        self.attempt_parse = false;
        self
    }

    /// Show this text in feedback instead of `S::example()`.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    fn parse(&self, text: &str) -> Result<S, ProcessingError> {
        let payload = if self.attempt_parse {
            locate_yaml::<S>(text).ok_or(ProcessingError::PayloadNotFound { format: "YAML" })?
        } else {
            text
        };
        S::from_yaml(payload)
    }

    fn example_text(&self) -> String {
        self.example.clone().unwrap_or_else(|| S::example().to_yaml())
    }
}

impl<S: StructuredResponse> Default for YamlParser<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StructuredResponse> ResponseProcessor for YamlParser<S> {
    fn name(&self) -> &str {
        "yaml_parser"
    }

    fn process(&self, output: ProcessedOutput) -> ProcessedOutput {
        let parsed = self.parse(&output.raw_response);
        record(self.name(), output, parsed, || self.example_text())
    }
}
