use async_trait::async_trait;
use futures::StreamExt;
use log::{ debug, info, warn };
use reqwest::{ Client as HttpClient, Response, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ create_streaming_response, ChatClient, ChatRequest, CompletionResponse, RequestMessage, TextStream };
use crate::llm::{ LlmConfig, LlmError };

pub struct OpenAIChatClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: &'a [RequestMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

impl<'a> OpenAIChatRequest<'a> {
    fn new(request: &'a ChatRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: stream.then_some(true),
        }
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIStreamResponse {
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Deserialize)]
struct OpenAIStreamChoice {
    delta: OpenAIDelta,
}

#[derive(Deserialize)]
struct OpenAIDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Fragment(String),
    Done,
    Skip,
}

/// Interprets one server-sent-event line of a chat-completion stream.
pub(crate) fn parse_stream_line(line: &str) -> StreamEvent {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return StreamEvent::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return StreamEvent::Done;
    }
    match serde_json::from_str::<OpenAIStreamResponse>(data) {
        Ok(resp) => {
            let content = resp.choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|content| !content.is_empty());
            match content {
                Some(content) => StreamEvent::Fragment(content),
                None => StreamEvent::Skip,
            }
        }
        Err(e) => {
            debug!("JSON parse error: {} for data: {}", e, data);
            StreamEvent::Skip
        }
    }
}

/// Reassembles lines that arrive split across network chunks.
#[derive(Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

async fn check_status(resp: Response) -> Result<Response, LlmError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!("OpenAI API returned {}: {}", status, body);
    Err(LlmError::Api { status: status.as_u16(), body })
}

impl OpenAIChatClient {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, LlmError> {
        let base_url = base_url.unwrap_or_else(|| crate::llm::DEFAULT_BASE_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::InvalidKey(e.to_string()))?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.credential().ok_or(LlmError::MissingCredential)?;
        Self::new(api_key, Some(config.base_url.clone()))
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, LlmError> {
        let body = OpenAIChatRequest::new(request, false);
        let resp = self.http.post(self.completions_url()).json(&body).send().await?;
        let resp = check_status(resp).await?.json::<OpenAIResponse>().await?;

        let content = resp.choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?
            .message.content
            .unwrap_or_default();

        Ok(CompletionResponse { response: content })
    }

    async fn stream_completion(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
        let body = OpenAIChatRequest::new(request, true);
        let resp = self.http.post(self.completions_url()).json(&body).send().await?;
        let resp = check_status(resp).await?;
        info!("OpenAI stream opened for model {}", request.model);

        Ok(
            create_streaming_response(move |tx| async move {
                let mut bytes = resp.bytes_stream();
                let mut lines = LineBuffer::default();

                while let Some(chunk) = bytes.next().await {
                    match chunk {
                        Ok(buf) => {
                            for line in lines.push(&buf) {
                                match parse_stream_line(&line) {
                                    StreamEvent::Fragment(text) => {
                                        if tx.send(Ok(text)).await.is_err() {
                                            return;
                                        }
                                    }
                                    StreamEvent::Done => {
                                        return;
                                    }
                                    StreamEvent::Skip => {}
                                }
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(LlmError::Http(e))).await;
                            return;
                        }
                    }
                }

                if let Some(line) = lines.finish() {
                    if let StreamEvent::Fragment(text) = parse_stream_line(&line) {
                        let _ = tx.send(Ok(text)).await;
                    }
                }
            })
        )
    }

    fn supports_native_streaming(&self) -> bool {
        true
    }

    fn get_base_url(&self) -> String {
        self.base_url.clone()
    }
}
