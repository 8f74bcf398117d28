//! Per-turn response orchestration.
//!
//! A turn moves through `Received -> RateChecked -> {Matched | ModelCalled |
//! Failed} -> Persisted -> NotifiedOrSkipped -> Returned`. Nothing is retried.
//! Model failures become an apology keyed by failure class; notification
//! failures never reach this module at all because delivery happens on the
//! dispatcher's worker task.
//!
//! The only `.await` that can take meaningful time is the model call. Before
//! it, the turn reserves a slot under the session's message ceiling, so
//! concurrent submits for one session are admitted one slot at a time. No
//! message is stored until the call has finished, and dropping the `respond`
//! future mid-call releases the slot and leaves the session as it was.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parley_types::chat::{ChatMessage, ChatReply, ReplySource};
use parley_types::config::{ChatConfig, ChatContext, ModelConfig};
use parley_types::error::ChatError;
use parley_types::knowledge::KnowledgeEntry;
use parley_types::llm::{CompletionRequest, FailureClass};
use parley_types::notification::ExchangeRecord;

use super::prompt::{build_messages, build_system_prompt};
use super::store::SessionStore;
use crate::knowledge::matcher::KnowledgeMatcher;
use crate::llm::box_provider::BoxLlmProvider;
use crate::notify::dispatcher::NotificationDispatcher;

pub const RATE_LIMITED_APOLOGY: &str =
    "I'm receiving a lot of requests right now. Please try again in a moment.";
pub const AUTH_APOLOGY: &str =
    "I'm having trouble connecting to the AI service. Please contact support.";
pub const GENERIC_APOLOGY: &str = "I apologize, but I'm having trouble processing your request \
     right now. Please try again or contact us directly.";

/// User-facing text for a failed model call.
pub fn apology_for(class: FailureClass) -> &'static str {
    match class {
        FailureClass::RateLimited => RATE_LIMITED_APOLOGY,
        FailureClass::Authentication => AUTH_APOLOGY,
        FailureClass::Other => GENERIC_APOLOGY,
    }
}

/// Coordinates the knowledge base, the model and the session store for one
/// inbound message at a time. Shared across requests behind an `Arc`.
pub struct ResponseOrchestrator {
    store: Arc<SessionStore>,
    provider: Arc<BoxLlmProvider>,
    matcher: KnowledgeMatcher,
    notifier: Option<NotificationDispatcher>,
    chat: ChatConfig,
    model: ModelConfig,
}

impl ResponseOrchestrator {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<BoxLlmProvider>,
        chat: ChatConfig,
        model: ModelConfig,
    ) -> Self {
        Self {
            store,
            provider,
            matcher: KnowledgeMatcher::from_config(&chat),
            notifier: None,
            chat,
            model,
        }
    }

    /// Send every persisted exchange to `notifier`.
    pub fn with_notifier(mut self, notifier: NotificationDispatcher) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Produce and persist the reply to one user message.
    ///
    /// Returns `Err` only for invalid input. Upstream failures are folded into
    /// the reply; see [`ChatReply::source`].
    pub async fn respond(
        &self,
        session_id: &str,
        message: &str,
        context: &ChatContext,
    ) -> Result<ChatReply, ChatError> {
        if session_id.trim().is_empty() {
            return Err(ChatError::InvalidInput("Session ID is required".to_string()));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput("Message is required".to_string()));
        }

        let ceiling = self.chat.max_messages_per_session;
        let Some(turn) = self.store.try_reserve_turn(session_id, ceiling)? else {
            info!(session_id, ceiling, "Session message limit reached");
            return Ok(ChatReply::new(
                self.chat.rate_limit_notice.clone(),
                ReplySource::RateLimited,
            ));
        };
        let history = self.store.get_history(session_id);

        let company = context
            .company_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.chat.company_name);
        let faqs = context.faqs.as_deref().unwrap_or(&self.chat.faqs);

        let reply = match self.matcher.find_answer(message, faqs) {
            Some(answer) => {
                debug!(session_id, "Answered from knowledge base");
                ChatReply::new(answer, ReplySource::KnowledgeBase)
            }
            None => self.generate(session_id, &history, message, company, faqs).await,
        };

        turn.commit(message, &reply.text)?;

        if let Some(notifier) = &self.notifier {
            notifier.dispatch(ExchangeRecord {
                session_id: session_id.to_string(),
                user_message: message.to_string(),
                reply: reply.text.clone(),
                company_name: company.to_string(),
                occurred_at: self.store.now(),
            });
        }

        info!(session_id, source = %reply.source, "Reply sent");
        Ok(reply)
    }

    /// [`respond`](Self::respond), abandoned as soon as `cancel` fires.
    ///
    /// A cancelled turn persists nothing and sends no notification.
    pub async fn respond_with_cancel(
        &self,
        session_id: &str,
        message: &str,
        context: &ChatContext,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ChatError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(session_id, "Turn cancelled by caller");
                Err(ChatError::Cancelled)
            }
            reply = self.respond(session_id, message, context) => reply,
        }
    }

    async fn generate(
        &self,
        session_id: &str,
        history: &[ChatMessage],
        message: &str,
        company: &str,
        faqs: &[KnowledgeEntry],
    ) -> ChatReply {
        let request = CompletionRequest {
            model: self.model.model.clone(),
            messages: build_messages(history, self.chat.history_window, message),
            system: Some(build_system_prompt(company, faqs)),
            max_tokens: self.model.max_tokens,
            temperature: Some(self.model.temperature),
        };

        debug!(
            session_id,
            provider = self.provider.name(),
            context_messages = request.messages.len(),
            "Calling model"
        );

        let limit = self.model.timeout();
        match tokio::time::timeout(limit, self.provider.complete(&request)).await {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                debug!(
                    session_id,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model replied"
                );
                ChatReply::new(response.content, ReplySource::Model)
            }
            Ok(Ok(_)) => {
                warn!(session_id, "Model returned an empty reply");
                ChatReply::new(GENERIC_APOLOGY, ReplySource::Apology)
            }
            Ok(Err(e)) => {
                warn!(session_id, error = %e, "Model call failed");
                ChatReply::new(apology_for(e.class()), ReplySource::Apology)
            }
            Err(_) => {
                warn!(session_id, timeout_secs = limit.as_secs(), "Model call timed out");
                ChatReply::new(GENERIC_APOLOGY, ReplySource::Apology)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures_util::future::join_all;
    use parley_types::chat::MessageRole;
    use parley_types::llm::{CompletionResponse, LlmError, Usage};

    use crate::llm::provider::LlmProvider;
    use crate::notify::sink::BoxNotificationSink;
    use crate::notify::sink::tests::RecordingSink;

    #[derive(Clone, Copy)]
    enum Behavior {
        Reply,
        Empty,
        RateLimited,
        Auth,
        Overloaded,
        Hang,
        Slow,
    }

    #[derive(Clone)]
    struct MockProvider {
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
        last_request: Arc<Mutex<Option<CompletionRequest>>>,
    }

    impl MockProvider {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                calls: Arc::new(AtomicUsize::new(0)),
                last_request: Arc::new(Mutex::new(None)),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> CompletionRequest {
            self.last_request.lock().unwrap().clone().unwrap()
        }
    }

    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            let content = match self.behavior {
                Behavior::Reply => "Hello from mock",
                Behavior::Empty => "  ",
                Behavior::RateLimited => {
                    return Err(LlmError::RateLimited {
                        retry_after_ms: Some(1000),
                    });
                }
                Behavior::Auth => return Err(LlmError::AuthenticationFailed),
                Behavior::Overloaded => {
                    return Err(LlmError::Overloaded("overloaded".to_string()));
                }
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Behavior::Slow => {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "Hello from mock"
                }
            };

            Ok(CompletionResponse {
                id: "resp-mock".to_string(),
                content: content.to_string(),
                model: request.model.clone(),
                stop_reason: Some("end_turn".to_string()),
                usage: Usage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        }
    }

    fn chat_config() -> ChatConfig {
        ChatConfig {
            company_name: "Acme".to_string(),
            faqs: vec![KnowledgeEntry::new(
                "What are your business hours?",
                "We're open 9am to 5pm, Monday to Friday.",
            )],
            ..ChatConfig::default()
        }
    }

    fn orchestrator(mock: &MockProvider) -> ResponseOrchestrator {
        ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(BoxLlmProvider::new(mock.clone())),
            chat_config(),
            ModelConfig::default(),
        )
    }

    fn ctx() -> ChatContext {
        ChatContext::default()
    }

    #[tokio::test]
    async fn test_faq_match_skips_model() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);

        let reply = orch
            .respond("s1", "can you tell me your business hours please", &ctx())
            .await
            .unwrap();

        assert_eq!(reply.source, ReplySource::KnowledgeBase);
        assert_eq!(reply.text, "We're open 9am to 5pm, Monday to Friday.");
        assert_eq!(mock.calls(), 0);

        let history = orch.store().get_history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[0].content, "can you tell me your business hours please");
        assert_eq!(history[1].role, MessageRole::Assistant);
        assert_eq!(history[1].content, reply.text);
    }

    #[tokio::test]
    async fn test_unmatched_message_goes_to_model() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);

        let reply = orch.respond("s1", "hello", &ctx()).await.unwrap();

        assert_eq!(reply.source, ReplySource::Model);
        assert_eq!(reply.text, "Hello from mock");
        assert_eq!(mock.calls(), 1);
        assert_eq!(orch.store().get_history("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_model_request_shape() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);
        for i in 0..7 {
            orch.store()
                .append_exchange("s1", &format!("q{i}"), &format!("a{i}"))
                .unwrap();
        }

        orch.respond("s1", "  anything else?  ", &ctx()).await.unwrap();

        let request = mock.last_request();
        assert_eq!(request.model, "claude-3-haiku-20240307");
        assert_eq!(request.max_tokens, 1000);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.messages.len(), 11);
        assert_eq!(request.messages[0].content, "q2");
        assert_eq!(request.messages[10].role, MessageRole::User);
        assert_eq!(request.messages[10].content, "anything else?");

        let system = request.system.unwrap();
        assert!(system.contains("for Acme."));
        assert!(system.contains("Q: What are your business hours?"));

        // Stored trimmed.
        let history = orch.store().get_history("s1");
        assert_eq!(history[14].content, "anything else?");
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);

        for (session, message) in [("s1", ""), ("s1", "   \n"), ("", "hello"), ("  ", "hello")] {
            let err = orch.respond(session, message, &ctx()).await.unwrap_err();
            assert!(matches!(err, ChatError::InvalidInput(_)));
        }
        assert_eq!(orch.store().session_count(), 0);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_after_ceiling() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);

        for i in 0..50 {
            let reply = orch.respond("s1", &format!("message {i}"), &ctx()).await.unwrap();
            assert_eq!(reply.source, ReplySource::Model);
        }
        assert_eq!(mock.calls(), 50);

        let reply = orch.respond("s1", "one more", &ctx()).await.unwrap();
        assert_eq!(reply.source, ReplySource::RateLimited);
        assert_eq!(reply.text, chat_config().rate_limit_notice);
        assert!(!reply.is_persisted());
        assert_eq!(mock.calls(), 50);
        assert_eq!(orch.store().get_history("s1").len(), 100);

        // Other sessions are unaffected.
        let reply = orch.respond("s2", "hello", &ctx()).await.unwrap();
        assert_eq!(reply.source, ReplySource::Model);
    }

    #[tokio::test]
    async fn test_failures_map_to_apologies() {
        let cases = [
            (Behavior::RateLimited, RATE_LIMITED_APOLOGY),
            (Behavior::Auth, AUTH_APOLOGY),
            (Behavior::Overloaded, GENERIC_APOLOGY),
            (Behavior::Empty, GENERIC_APOLOGY),
        ];

        for (behavior, expected) in cases {
            let mock = MockProvider::new(behavior);
            let orch = orchestrator(&mock);

            let reply = orch.respond("s1", "hello", &ctx()).await.unwrap();
            assert_eq!(reply.source, ReplySource::Apology);
            assert_eq!(reply.text, expected);

            // The apology is still persisted as the assistant turn.
            let history = orch.store().get_history("s1");
            assert_eq!(history.len(), 2);
            assert_eq!(history[1].content, expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_timeout_yields_apology() {
        let mock = MockProvider::new(Behavior::Hang);
        let orch = ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(BoxLlmProvider::new(mock.clone())),
            chat_config(),
            ModelConfig {
                timeout_secs: 5,
                ..ModelConfig::default()
            },
        );

        let reply = orch.respond("s1", "hello", &ctx()).await.unwrap();
        assert_eq!(reply.source, ReplySource::Apology);
        assert_eq!(reply.text, GENERIC_APOLOGY);
        assert_eq!(orch.store().get_history("s1").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_turn_persists_nothing() {
        let mock = MockProvider::new(Behavior::Hang);
        let orch = orchestrator(&mock);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = orch
            .respond_with_cancel("s1", "hello", &ctx(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Cancelled);
        assert_eq!(mock.calls(), 1);
        assert_eq!(orch.store().session_count(), 0);
    }

    #[tokio::test]
    async fn test_context_overrides_config() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);
        let context = ChatContext {
            company_name: Some("Globex".to_string()),
            faqs: Some(vec![KnowledgeEntry::new("Do you ship abroad?", "Yes, worldwide.")]),
        };

        let reply = orch
            .respond("s1", "do you ship abroad", &context)
            .await
            .unwrap();
        assert_eq!(reply.text, "Yes, worldwide.");

        // The configured FAQ set is not consulted when the caller sends one.
        let reply = orch
            .respond("s1", "what are your business hours", &context)
            .await
            .unwrap();
        assert_eq!(reply.source, ReplySource::Model);
        let system = mock.last_request().system.unwrap();
        assert!(system.contains("for Globex."));
        assert!(!system.contains("business hours"));
    }

    #[tokio::test]
    async fn test_blank_company_falls_back_to_config() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock);
        let context = ChatContext {
            company_name: Some("   ".to_string()),
            faqs: None,
        };

        orch.respond("s1", "hello", &context).await.unwrap();
        assert!(mock.last_request().system.unwrap().contains("for Acme."));
    }

    #[tokio::test]
    async fn test_exchange_is_notified_after_persistence() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, handle) = NotificationDispatcher::spawn(
            BoxNotificationSink::new(sink.clone()),
            8,
            CancellationToken::new(),
        );
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock).with_notifier(dispatcher);

        orch.respond("s1", "hello", &ctx()).await.unwrap();
        orch.respond("s1", "", &ctx()).await.unwrap_err();
        drop(orch);
        handle.await.unwrap();

        let received = sink.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].session_id, "s1");
        assert_eq!(received[0].user_message, "hello");
        assert_eq!(received[0].reply, "Hello from mock");
        assert_eq!(received[0].company_name, "Acme");
    }

    #[tokio::test]
    async fn test_failing_notifier_does_not_affect_reply() {
        let sink = Arc::new(RecordingSink::failing());
        let (dispatcher, handle) = NotificationDispatcher::spawn(
            BoxNotificationSink::new(sink.clone()),
            8,
            CancellationToken::new(),
        );
        let mock = MockProvider::new(Behavior::Reply);
        let orch = orchestrator(&mock).with_notifier(dispatcher);

        let reply = orch.respond("s1", "hello", &ctx()).await.unwrap();
        assert_eq!(reply.text, "Hello from mock");
        assert_eq!(orch.store().get_history("s1").len(), 2);

        drop(orch);
        handle.await.unwrap();
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_turn_is_not_notified() {
        let sink = Arc::new(RecordingSink::default());
        let (dispatcher, handle) = NotificationDispatcher::spawn(
            BoxNotificationSink::new(sink.clone()),
            8,
            CancellationToken::new(),
        );
        let mock = MockProvider::new(Behavior::Reply);
        let orch = ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(BoxLlmProvider::new(mock.clone())),
            ChatConfig {
                max_messages_per_session: 1,
                ..chat_config()
            },
            ModelConfig::default(),
        )
        .with_notifier(dispatcher);

        orch.respond("s1", "hello", &ctx()).await.unwrap();
        let reply = orch.respond("s1", "hello again", &ctx()).await.unwrap();
        assert_eq!(reply.source, ReplySource::RateLimited);

        drop(orch);
        handle.await.unwrap();
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_turns_keep_pairs_adjacent() {
        let mock = MockProvider::new(Behavior::Reply);
        let orch = Arc::new(orchestrator(&mock));

        let mut handles = Vec::new();
        for i in 0..8 {
            let orch = orch.clone();
            handles.push(tokio::spawn(async move {
                orch.respond("shared", &format!("question {i}"), &ChatContext::default())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = orch.store().get_history("shared");
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, MessageRole::User);
            assert_eq!(pair[1].role, MessageRole::Assistant);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_submits_respect_ceiling() {
        let mock = MockProvider::new(Behavior::Slow);
        let orch = ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(BoxLlmProvider::new(mock.clone())),
            ChatConfig {
                max_messages_per_session: 2,
                ..chat_config()
            },
            ModelConfig::default(),
        );
        orch.respond("s", "first", &ctx()).await.unwrap();

        let context = ctx();
        let replies = join_all((0..5).map(|i| {
            let message = format!("burst {i}");
            let orch = &orch;
            let context = &context;
            async move { orch.respond("s", &message, context).await.unwrap() }
        }))
        .await;

        let admitted = replies
            .iter()
            .filter(|r| r.source == ReplySource::Model)
            .count();
        let refused = replies
            .iter()
            .filter(|r| r.source == ReplySource::RateLimited)
            .count();
        assert_eq!(admitted, 1);
        assert_eq!(refused, 4);
        assert_eq!(mock.calls(), 2);

        let user_messages = orch
            .store()
            .get_history("s")
            .iter()
            .filter(|m| m.role == MessageRole::User)
            .count();
        assert_eq!(user_messages, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_turn_frees_its_slot() {
        let mock = MockProvider::new(Behavior::Hang);
        let orch = ResponseOrchestrator::new(
            Arc::new(SessionStore::new()),
            Arc::new(BoxLlmProvider::new(mock.clone())),
            ChatConfig {
                max_messages_per_session: 1,
                ..chat_config()
            },
            ModelConfig::default(),
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = orch
            .respond_with_cancel("s", "hello", &ctx(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ChatError::Cancelled);
        assert_eq!(mock.calls(), 1);

        // The slot is free again: a matched FAQ turn is admitted.
        let reply = orch
            .respond("s", "what are your business hours", &ctx())
            .await
            .unwrap();
        assert_eq!(reply.source, ReplySource::KnowledgeBase);
    }
}
