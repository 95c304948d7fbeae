//! HTTP client
//!
//! Talks to a running server: wraps user input in the chat template and
//! returns the generated content.

use thiserror::Error;

use crate::types::request::{ContentResponse, PromptRequest};

/// Prefix placed before the user's input
pub const DEFAULT_PREFIX: &str =
    "<|im_start|>system You are a helpful assistant. <|im_end|> <|im_start|>user ";
/// Postfix placed after the user's input
pub const DEFAULT_POSTFIX: &str = "<|im_end|><|im_start|>assistant ";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {content}")]
    Status { status: u16, content: String },
}

/// Client for the prompt endpoint
#[derive(Debug, Clone)]
pub struct PromptClient {
    http: reqwest::Client,
    url: String,
}

impl PromptClient {
    /// Creates a client for the server at `url`, e.g. `http://192.168.0.196:31337`
    pub fn new(url: impl Into<String>) -> Self {
        let mut url = url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    /// Builds the request the REPL sends for `input`
    ///
    /// The input gets a trailing space before the postfix.
    pub fn chat_request(input: &str) -> PromptRequest {
        PromptRequest::new(DEFAULT_PREFIX, format!("{} ", input), DEFAULT_POSTFIX)
    }

    /// Sends `input` wrapped in the default chat template
    pub async fn ask(&self, input: &str) -> Result<String, ClientError> {
        self.send(&Self::chat_request(input)).await
    }

    /// Sends a raw three-part request
    pub async fn send(&self, request: &PromptRequest) -> Result<String, ClientError> {
        let response = self.http.post(&self.url).json(request).send().await?;
        Self::content(response).await
    }

    /// Calls the liveness probe
    pub async fn health(&self) -> Result<String, ClientError> {
        let response = self.http.get(&self.url).send().await?;
        Self::content(response).await
    }

    async fn content(response: reqwest::Response) -> Result<String, ClientError> {
        let status = response.status();
        let body: ContentResponse = response.json().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                content: body.content,
            });
        }
        Ok(body.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_wraps_input() {
        let request = PromptClient::chat_request("hello");
        assert_eq!(request.input, "hello ");
        assert_eq!(
            request.prompt(),
            "<|im_start|>system You are a helpful assistant. <|im_end|> <|im_start|>user hello <|im_end|><|im_start|>assistant "
        );
    }

    #[test]
    fn test_url_normalized() {
        let client = PromptClient::new("http://127.0.0.1:31337");
        assert_eq!(client.url, "http://127.0.0.1:31337/");
        let client = PromptClient::new("http://127.0.0.1:31337/");
        assert_eq!(client.url, "http://127.0.0.1:31337/");
    }
}
