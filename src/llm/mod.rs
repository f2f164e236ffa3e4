pub mod chat;
pub mod image;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4-vision-preview";
pub const DEFAULT_IMAGE_MAX_TOKENS: u32 = 1000;

/// Shown in place of a reply when no API key is configured.
pub const MISSING_CREDENTIAL_MESSAGE: &str = "The OpenAI API key is not configured.";

pub const SETUP_INSTRUCTIONS: &str =
    "How to set the API key:\n\
     1. Create a .env file and add OPENAI_API_KEY=your_api_key_here\n\
     2. Or set the OPENAI_API_KEY environment variable";

/// Hint attached to remote failures.
pub const API_FAILURE_HINT: &str = "Check that the OpenAI API key is set correctly.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{}", MISSING_CREDENTIAL_MESSAGE)]
    MissingCredential,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Api {
        status: u16,
        body: String,
    },

    #[error("invalid API key format: {0}")]
    InvalidKey(String),

    #[error("no response from the API")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub image_max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            image_max_tokens: DEFAULT_IMAGE_MAX_TOKENS,
        }
    }
}

impl LlmConfig {
    /// Blank keys count as absent.
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_key_is_not_a_credential() {
        let config = LlmConfig { api_key: Some("   ".into()), ..Default::default() };
        assert!(!config.has_credential());

        let config = LlmConfig { api_key: Some(" sk-test ".into()), ..Default::default() };
        assert_eq!(config.credential(), Some("sk-test"));
    }
}
