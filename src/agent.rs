use chrono::Local;
use futures::StreamExt;
use log::{ error, info, warn };
use std::sync::Arc;

use crate::llm::chat::{ ChatClient, ChatRequest, TextStream };
use crate::llm::image::analyze_image;
use crate::llm::{ LlmConfig, LlmError };
use crate::models::chat::Turn;
use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    AwaitingResponse,
}

/// A reply that is still arriving.
pub struct PendingReply {
    prompt: String,
    stream: TextStream,
    displayed: String,
}

impl PendingReply {
    /// Next accumulated text, or `None` once the remote stream has ended.
    /// Cancel-safe: dropping the future loses no fragment.
    pub async fn next_update(&mut self) -> Option<Result<String, LlmError>> {
        match self.stream.next().await? {
            Ok(fragment) => {
                self.displayed.push_str(&fragment);
                Some(Ok(self.displayed.clone()))
            }
            Err(e) => Some(Err(e)),
        }
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

pub enum Submission {
    Streaming(PendingReply),
    /// No credential: nothing was sent.
    Disabled,
    /// A reply is already in flight for this session.
    Busy,
    Failed(LlmError),
}

#[derive(Clone)]
pub struct ChatAgent {
    chat_client: Option<Arc<dyn ChatClient>>,
    llm_config: LlmConfig,
}

impl ChatAgent {
    pub fn new(llm_config: LlmConfig, chat_client: Option<Arc<dyn ChatClient>>) -> Self {
        Self { chat_client, llm_config }
    }

    pub fn is_enabled(&self) -> bool {
        self.chat_client.is_some()
    }

    /// Appends the user turn and opens the reply stream. The session stays in
    /// `AwaitingResponse` until [`finalize`](Self::finalize) or
    /// [`abort`](Self::abort) is called.
    pub async fn submit(&self, session: &mut SessionState, prompt: &str) -> Submission {
        if session.phase() != ChatPhase::Idle {
            warn!("Session {} rejected a message while awaiting a reply", session.id());
            return Submission::Busy;
        }

        session.push_turn(Turn::user(prompt));

        let Some(client) = self.chat_client.as_ref() else {
            return Submission::Disabled;
        };

        let settings = session.settings().clone();
        let request = ChatRequest::from_turns(
            settings.model.as_str(),
            settings.temperature,
            &session.request_turns()
        );
        info!(
            "Session {}: sending {} messages to {} (t={})",
            session.id(),
            request.messages.len(),
            settings.model,
            settings.temperature
        );

        session.set_phase(ChatPhase::AwaitingResponse);
        match client.stream_completion(&request).await {
            Ok(stream) =>
                Submission::Streaming(PendingReply {
                    prompt: prompt.to_string(),
                    stream,
                    displayed: String::new(),
                }),
            Err(e) => {
                self.abort(session, &e);
                Submission::Failed(e)
            }
        }
    }

    /// Appends the assistant turn and history record; returns the full reply.
    pub fn finalize(&self, session: &mut SessionState, reply: PendingReply) -> String {
        let PendingReply { prompt, displayed, .. } = reply;
        session.push_turn(Turn::assistant(displayed.as_str()));
        session.record_exchange(&prompt, &displayed, Local::now());
        session.set_phase(ChatPhase::Idle);
        info!("Session {}: reply complete ({} chars)", session.id(), displayed.len());
        displayed
    }

    /// Back to idle without an assistant turn or history record.
    pub fn abort(&self, session: &mut SessionState, error: &LlmError) {
        error!("Session {}: request failed: {}", session.id(), error);
        session.set_phase(ChatPhase::Idle);
    }

    pub async fn analyze_image(&self, image: &[u8], prompt: &str) -> Result<String, LlmError> {
        analyze_image(self.chat_client.as_deref(), &self.llm_config, image, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::variant::VariantProfile;
    use crate::llm::chat::CompletionResponse;
    use crate::models::chat::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{ AtomicUsize, Ordering };
    use std::sync::Mutex;

    struct CannedClient {
        fragments: Vec<Result<String, String>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl CannedClient {
        fn new(fragments: &[&str]) -> Self {
            Self {
                fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing_after(fragments: &[&str], message: &str) -> Self {
            let mut client = Self::new(fragments);
            client.fragments.push(Err(message.to_string()));
            client
        }
    }

    #[async_trait]
    impl ChatClient for CannedClient {
        async fn complete(&self, _request: &ChatRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::EmptyResponse)
        }

        async fn stream_completion(&self, request: &ChatRequest) -> Result<TextStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let items: Vec<Result<String, LlmError>> = self.fragments
                .iter()
                .map(|f| f.clone().map_err(|body| LlmError::Api { status: 500, body }))
                .collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }

        fn supports_native_streaming(&self) -> bool {
            true
        }

        fn get_base_url(&self) -> String {
            "test://".into()
        }
    }

    fn agent_with(client: Arc<CannedClient>) -> ChatAgent {
        ChatAgent::new(LlmConfig::default(), Some(client))
    }

    #[tokio::test]
    async fn accumulates_fragments_before_finalizing() {
        let client = Arc::new(CannedClient::new(&["Hel", "lo"]));
        let agent = agent_with(client.clone());
        let mut session = SessionState::new(VariantProfile::basic());

        let Submission::Streaming(mut reply) = agent.submit(&mut session, "hi").await else {
            panic!("expected a streaming reply");
        };
        assert_eq!(session.phase(), ChatPhase::AwaitingResponse);

        let mut updates = Vec::new();
        while let Some(update) = reply.next_update().await {
            updates.push(update.unwrap());
        }
        assert_eq!(updates, vec!["Hel", "Hello"]);
        assert_eq!(reply.displayed(), "Hello");
        assert_eq!(session.turns().len(), 1);
        assert!(session.history().is_empty());

        let full = agent.finalize(&mut session, reply);
        assert_eq!(full, "Hello");
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert_eq!(session.turns()[1], Turn::assistant("Hello"));
        assert_eq!(session.history()[0].user_message, "hi");
        assert_eq!(session.history()[0].ai_response, "Hello");
    }

    async fn run_exchange(agent: &ChatAgent, session: &mut SessionState, prompt: &str) -> String {
        let Submission::Streaming(mut reply) = agent.submit(session, prompt).await else {
            panic!("expected a streaming reply");
        };
        while let Some(update) = reply.next_update().await {
            update.unwrap();
        }
        agent.finalize(session, reply)
    }

    #[tokio::test]
    async fn replays_whole_conversation_each_request() {
        let client = Arc::new(CannedClient::new(&["ok"]));
        let agent = agent_with(client.clone());
        let mut session = SessionState::new(VariantProfile::advanced());

        run_exchange(&agent, &mut session, "one").await;
        run_exchange(&agent, &mut session, "two").await;

        let requests = client.requests.lock().unwrap();
        let roles: Vec<&str> = requests[1].messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(requests[1].model, "gpt-3.5-turbo");
        assert_eq!(requests[1].temperature, Some(0.7));
        assert_eq!(session.turns().len(), 4);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn disabled_without_client_and_never_calls_out() {
        let agent = ChatAgent::new(LlmConfig::default(), None);
        let mut session = SessionState::new(VariantProfile::basic());

        assert!(matches!(agent.submit(&mut session, "hi").await, Submission::Disabled));
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert!(session.history().is_empty());
        assert_eq!(session.turns().len(), 1);
        assert_eq!(session.turns()[0].role(), Role::User);
    }

    #[tokio::test]
    async fn stream_failure_returns_to_idle_without_reply() {
        let client = Arc::new(CannedClient::failing_after(&["par"], "rate limited"));
        let agent = agent_with(client);
        let mut session = SessionState::new(VariantProfile::basic());

        let Submission::Streaming(mut reply) = agent.submit(&mut session, "hi").await else {
            panic!("expected a streaming reply");
        };
        assert_eq!(reply.next_update().await.unwrap().unwrap(), "par");
        let Some(Err(e)) = reply.next_update().await else {
            panic!("expected the stream to fail");
        };
        assert!(matches!(e, LlmError::Api { status: 500, .. }));
        assert_eq!(session.phase(), ChatPhase::AwaitingResponse);

        agent.abort(&mut session, &e);
        assert_eq!(session.phase(), ChatPhase::Idle);
        assert_eq!(session.turns().len(), 1);
        assert!(session.history().is_empty());
        assert!(matches!(agent.submit(&mut session, "again").await, Submission::Streaming(_)));
    }

    #[tokio::test]
    async fn second_submission_while_awaiting_is_rejected() {
        let client = Arc::new(CannedClient::new(&["a"]));
        let agent = agent_with(client.clone());
        let mut session = SessionState::new(VariantProfile::basic());

        let Submission::Streaming(reply) = agent.submit(&mut session, "first").await else {
            panic!("expected a streaming reply");
        };
        assert!(matches!(agent.submit(&mut session, "second").await, Submission::Busy));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.turns().len(), 1);

        agent.finalize(&mut session, reply);
        assert!(matches!(agent.submit(&mut session, "third").await, Submission::Streaming(_)));
    }
}
