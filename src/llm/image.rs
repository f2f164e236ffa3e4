use base64::{ engine::general_purpose::STANDARD, Engine as _ };
use log::{ error, info };

use super::chat::{ ChatClient, ChatRequest, ContentPart, ImageUrl, MessageContent, RequestMessage };
use super::{ LlmConfig, LlmError };

pub const DEFAULT_ANALYSIS_PROMPT: &str = "Describe this image in detail.";

pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn build_image_request(config: &LlmConfig, image_base64: &str, prompt: &str) -> ChatRequest {
    let prompt = if prompt.trim().is_empty() { DEFAULT_ANALYSIS_PROMPT } else { prompt };
    ChatRequest {
        model: config.vision_model.clone(),
        messages: vec![RequestMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(
                vec![
                    ContentPart::Text { text: prompt.to_string() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{}", image_base64),
                        },
                    }
                ]
            ),
        }],
        temperature: None,
        max_tokens: Some(config.image_max_tokens),
    }
}

/// Single non-streaming request; no retry.
pub async fn analyze_image(
    client: Option<&dyn ChatClient>,
    config: &LlmConfig,
    image: &[u8],
    prompt: &str
) -> Result<String, LlmError> {
    let client = client.ok_or(LlmError::MissingCredential)?;
    let request = build_image_request(config, &encode_image(image), prompt);
    info!("Analyzing image ({} bytes) with {}", image.len(), request.model);

    match client.complete(&request).await {
        Ok(resp) => Ok(resp.response),
        Err(e) => {
            error!("Image analysis failed: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::CompletionResponse;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ChatClient for Recorder {
        async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(CompletionResponse { response: "a red square".into() })
        }

        fn get_base_url(&self) -> String {
            "test://".into()
        }
    }

    #[tokio::test]
    async fn sends_one_vision_request_with_data_url() {
        let recorder = Recorder { seen: Mutex::new(Vec::new()) };
        let config = LlmConfig::default();

        let answer = analyze_image(Some(&recorder), &config, b"\x89PNG", "what is it").await.unwrap();
        assert_eq!(answer, "a red square");

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gpt-4-vision-preview");
        assert_eq!(seen[0].max_tokens, Some(1000));
        let MessageContent::Parts(parts) = &seen[0].messages[0].content else {
            panic!("expected content parts");
        };
        assert_eq!(parts[0], ContentPart::Text { text: "what is it".into() });
        assert_eq!(
            parts[1],
            ContentPart::ImageUrl { image_url: ImageUrl { url: "data:image/jpeg;base64,iVBORw==".into() } }
        );
    }

    #[tokio::test]
    async fn missing_credential_is_reported_without_a_call() {
        let result = analyze_image(None, &LlmConfig::default(), b"img", "").await;
        assert!(matches!(result, Err(LlmError::MissingCredential)));
    }

    #[test]
    fn blank_prompt_falls_back_to_default() {
        let request = build_image_request(&LlmConfig::default(), "AAAA", "  ");
        let MessageContent::Parts(parts) = &request.messages[0].content else {
            panic!("expected content parts");
        };
        assert_eq!(parts[0], ContentPart::Text { text: DEFAULT_ANALYSIS_PROMPT.into() });
    }
}
