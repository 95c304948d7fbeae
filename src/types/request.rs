//! Request and response bodies
//!
//! Wire format of the HTTP surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Body of `POST /`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    #[serde(rename = "PROMPT_TEXT_PREFIX")]
    pub prefix: String,
    #[serde(rename = "input_str")]
    pub input: String,
    #[serde(rename = "PROMPT_TEXT_POSTFIX")]
    pub postfix: String,
}

/// Errors raised while reading a request body
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl PromptRequest {
    pub fn new(
        prefix: impl Into<String>,
        input: impl Into<String>,
        postfix: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            input: input.into(),
            postfix: postfix.into(),
        }
    }

    /// Parses a raw request body
    ///
    /// All three fields must be present and be strings.
    pub fn from_body(body: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The prompt handed to the engine: prefix, input and postfix with no separator
    pub fn prompt(&self) -> String {
        let mut prompt =
            String::with_capacity(self.prefix.len() + self.input.len() + self.postfix.len());
        prompt.push_str(&self.prefix);
        prompt.push_str(&self.input);
        prompt.push_str(&self.postfix);
        prompt
    }
}

/// Body of every response: `{"content": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentResponse {
    pub content: String,
}

impl ContentResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_concatenation_is_byte_exact() {
        assert_eq!(PromptRequest::new("a", "b", "c").prompt(), "abc");
        assert_eq!(PromptRequest::new("", "x", "").prompt(), "x");
        assert_eq!(
            PromptRequest::new("<|im_start|>user ", "hi ", "<|im_end|>").prompt(),
            "<|im_start|>user hi <|im_end|>"
        );
    }

    #[test]
    fn test_parse_wire_field_names() {
        let body = br#"{"PROMPT_TEXT_PREFIX":"p","input_str":"i","PROMPT_TEXT_POSTFIX":"s"}"#;
        let request = PromptRequest::from_body(body).unwrap();
        assert_eq!(request, PromptRequest::new("p", "i", "s"));
    }

    #[test]
    fn test_parse_ignores_extra_fields() {
        let body = br#"{"PROMPT_TEXT_PREFIX":"","input_str":"x","PROMPT_TEXT_POSTFIX":"","n":1}"#;
        assert!(PromptRequest::from_body(body).is_ok());
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let body = br#"{"PROMPT_TEXT_PREFIX":"p","input_str":"i"}"#;
        let err = PromptRequest::from_body(body).unwrap_err();
        assert!(err.to_string().contains("PROMPT_TEXT_POSTFIX"));
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        let body = br#"{"PROMPT_TEXT_PREFIX":"p","input_str":42,"PROMPT_TEXT_POSTFIX":"s"}"#;
        assert!(PromptRequest::from_body(body).is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PromptRequest::from_body(b"not json").is_err());
        assert!(PromptRequest::from_body(b"").is_err());
    }

    #[test]
    fn test_content_response_shape() {
        let json = serde_json::to_string(&ContentResponse::new("online")).unwrap();
        assert_eq!(json, r#"{"content":"online"}"#);
    }
}
