//! Reasoning Stream
//!
//! The public entry point of the engine. A query is answered either in one
//! call ([`ReasoningStream::process_query`]) or as a lazy stream of progress
//! events ([`ReasoningStream::stream_response`]). Neither mode surfaces an
//! error to the caller: every failure ends in a well-formed response or an
//! `error` event.

use crate::engine::EngineContext;
use crate::memory::{ConversationHistory, ConversationMemory, ConversationMessage, MessageRole};
use crate::reasoner::{ReasoningEngine, ReasoningStep, StepType};
use crate::synthesizer::{AnswerSource, SynthesizedAnswer, Synthesizer};
use agentrag_common::errors::{AppError, Result};
use agentrag_common::metrics;
use agentrag_common::DEFAULT_MAX_RESULTS;
use agentrag_retrieval::fusion;
use agentrag_retrieval::{
    AdaptiveRetrieval, Metadata, RetrievalContext, RetrievalQuery, RetrievalResponse, RetrievalResult,
    RetrievalStrategy, SourceType,
};
use futures::stream::{self, Stream};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Lazy, finite sequence of progress events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A retrieved item as presented to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    pub content: String,
    pub score: f32,
    pub source_type: SourceType,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl From<RetrievalResult> for Evidence {
    fn from(result: RetrievalResult) -> Self {
        Self {
            id: result.id,
            content: result.content,
            score: result.score,
            source_type: result.source_type,
            metadata: result.metadata,
            reasoning: result.reasoning,
        }
    }
}

/// Complete answer with its evidence and reasoning chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RAGResponse {
    pub response_id: Uuid,
    pub query: String,
    pub answer: String,
    pub supporting_evidence: Vec<Evidence>,
    pub reasoning_steps: Vec<ReasoningStep>,
    /// Within [0, 1]; zero when the request failed
    pub confidence_score: f32,
    pub sources_used: Vec<SourceType>,
    pub processing_time_ms: f64,
    pub conversation_id: String,
}

/// Progress events, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    RetrievalComplete {
        results_count: usize,
        confidence: f32,
        strategy: RetrievalStrategy,
    },
    ReasoningComplete {
        steps_count: usize,
    },
    Complete {
        response: Box<RAGResponse>,
    },
    Error {
        message: String,
        conversation_id: String,
    },
}

impl StreamEvent {
    fn status(message: &str, conversation_id: Option<&str>) -> Self {
        StreamEvent::Status {
            message: message.to_string(),
            conversation_id: conversation_id.map(str::to_string),
        }
    }

    /// The `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Status { .. } => "status",
            StreamEvent::RetrievalComplete { .. } => "retrieval_complete",
            StreamEvent::ReasoningComplete { .. } => "reasoning_complete",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Complete { .. } | StreamEvent::Error { .. })
    }
}

/// Caller-facing request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnswerRequest {
    #[validate(length(min = 1, max = 4000))]
    pub query: String,

    /// Continue an existing conversation; a new one is started when absent
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Override strategy selection
    #[serde(default)]
    pub strategy: Option<RetrievalStrategy>,

    #[serde(default = "default_max_results")]
    #[validate(range(min = 1, max = 100))]
    pub max_results: usize,

    #[serde(default)]
    pub stream: bool,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

impl AnswerRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            conversation_id: None,
            strategy: None,
            max_results: DEFAULT_MAX_RESULTS,
            stream: false,
        }
    }
}

/// Result of [`ReasoningStream::retrieve_and_answer`]
pub enum AnswerOutcome {
    Complete(Box<RAGResponse>),
    Stream(EventStream),
}

/// Counts one in-flight request until dropped
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_in_flight(current);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let previous = self.counter.fetch_sub(1, Ordering::SeqCst);
        metrics::set_in_flight(previous.saturating_sub(1));
    }
}

/// One user turn being answered
struct Turn {
    response_id: Uuid,
    query: String,
    conversation_id: String,
    /// Conversation before this turn
    context: Vec<ConversationMessage>,
    started: Instant,
}

struct Retrieved {
    query: RetrievalQuery,
    response: RetrievalResponse,
    steps: Vec<ReasoningStep>,
}

struct Inner {
    retrieval: Arc<AdaptiveRetrieval>,
    memory: Arc<ConversationMemory>,
    reasoner: ReasoningEngine,
    synthesizer: Synthesizer,
    default_max_results: usize,
    in_flight: Arc<AtomicUsize>,
}

impl Inner {
    /// Snapshot the context, then record the user turn
    fn begin(&self, query: &str, conversation_id: Option<&str>) -> Turn {
        let conversation_id = conversation_id
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let context = self.memory.context(&conversation_id);
        self.memory.add_message(&conversation_id, ConversationMessage::user(query));

        Turn {
            response_id: Uuid::new_v4(),
            query: query.to_string(),
            conversation_id,
            context,
            started: Instant::now(),
        }
    }

    async fn retrieve(&self, turn: &Turn, strategy: Option<RetrievalStrategy>, max_results: usize) -> Retrieved {
        let retrieval_context = RetrievalContext {
            conversation_id: Some(turn.conversation_id.clone()),
            history: turn
                .context
                .iter()
                .filter(|message| message.role == MessageRole::User)
                .map(|message| message.content.clone())
                .collect(),
            filters: Vec::new(),
        };

        let query = self.retrieval.analyzer().analyze(&turn.query, Some(&retrieval_context));
        let response = self.retrieval.execute(&query, strategy, max_results).await;

        Retrieved {
            query,
            response,
            steps: Vec::new(),
        }
    }

    fn reason(&self, turn: &Turn, retrieved: &mut Retrieved) {
        retrieved.steps = self
            .reasoner
            .reasoning_chain(&retrieved.query, &turn.context, &retrieved.response);
    }

    /// Synthesize, record the assistant turn and assemble the response
    async fn answer(&self, turn: &Turn, retrieved: Retrieved) -> RAGResponse {
        let Retrieved { response, mut steps, .. } = retrieved;
        let started = Instant::now();

        let synthesized = self
            .synthesizer
            .synthesize(&turn.query, &response.results, &turn.context)
            .await;
        steps.push(self.response_step(&synthesized, &response, started));

        let sources_used = fusion::distinct_sources(&response.results);
        let rag = RAGResponse {
            response_id: turn.response_id,
            query: turn.query.clone(),
            answer: synthesized.answer,
            supporting_evidence: response.results.into_iter().map(Evidence::from).collect(),
            reasoning_steps: steps,
            confidence_score: response.confidence_score,
            sources_used,
            processing_time_ms: turn.started.elapsed().as_secs_f64() * 1000.0,
            conversation_id: turn.conversation_id.clone(),
        };

        let mut metadata = Metadata::new();
        metadata.insert("confidence".into(), json!(rag.confidence_score));
        metadata.insert("sources".into(), json!(rag.sources_used));
        metadata.insert("reasoning_steps".into(), json!(rag.reasoning_steps.len()));
        metadata.insert("answer_source".into(), json!(synthesized.source));
        self.memory.add_message(
            &turn.conversation_id,
            ConversationMessage::assistant(rag.answer.clone(), metadata).with_id(rag.response_id.to_string()),
        );

        info!(
            response_id = %rag.response_id,
            conversation_id = %rag.conversation_id,
            confidence = rag.confidence_score,
            evidence = rag.supporting_evidence.len(),
            processing_time_ms = rag.processing_time_ms,
            "Query processed"
        );
        rag
    }

    fn response_step(&self, synthesized: &SynthesizedAnswer, response: &RetrievalResponse, started: Instant) -> ReasoningStep {
        let description = match synthesized.source {
            AnswerSource::Model => "Generated the answer with the language model",
            AnswerSource::Extractive => "Composed an extractive answer from the top-ranked evidence",
        };

        ReasoningStep::new(
            StepType::Response,
            description,
            json!({
                "evidence_count": response.results.len(),
                "model_available": self.synthesizer.has_model(),
            }),
            json!({
                "source": synthesized.source,
                "model": synthesized.model,
                "citations": synthesized.citations,
                "answer_chars": synthesized.answer.chars().count(),
                "generation_error": synthesized.generation_error,
            }),
            response.confidence_score,
            started,
        )
    }

    /// Zero-confidence response explaining what went wrong
    fn failure(&self, turn: &Turn, message: &str) -> RAGResponse {
        error!(
            response_id = %turn.response_id,
            conversation_id = %turn.conversation_id,
            error = message,
            "Failed to process query"
        );
        metrics::record_answer("error");

        RAGResponse {
            response_id: turn.response_id,
            query: turn.query.clone(),
            answer: format!(
                "I apologize, but I encountered an error while processing your query: {}",
                message
            ),
            supporting_evidence: Vec::new(),
            reasoning_steps: Vec::new(),
            confidence_score: 0.0,
            sources_used: Vec::new(),
            processing_time_ms: turn.started.elapsed().as_secs_f64() * 1000.0,
            conversation_id: turn.conversation_id.clone(),
        }
    }

    fn stream_error(&self, turn: &Turn, message: &str) -> StreamEvent {
        error!(conversation_id = %turn.conversation_id, error = message, "Streaming response failed");
        metrics::record_answer("error");

        StreamEvent::Error {
            message: message.to_string(),
            conversation_id: turn.conversation_id.clone(),
        }
    }

    /// Outcome for a request refused before any work was done
    fn rejection(&self, request: &AnswerRequest, error: &AppError) -> AnswerOutcome {
        let conversation_id = request
            .conversation_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        warn!(
            conversation_id = %conversation_id,
            code = error.code().as_code(),
            error = %error,
            "Request rejected"
        );
        metrics::record_answer("error");

        if request.stream {
            let event = StreamEvent::Error {
                message: error.to_string(),
                conversation_id,
            };
            return AnswerOutcome::Stream(Box::pin(stream::iter([event])));
        }

        AnswerOutcome::Complete(Box::new(RAGResponse {
            response_id: Uuid::new_v4(),
            query: request.query.clone(),
            answer: format!("Your request could not be processed: {}", error),
            supporting_evidence: Vec::new(),
            reasoning_steps: Vec::new(),
            confidence_score: 0.0,
            sources_used: Vec::new(),
            processing_time_ms: 0.0,
            conversation_id,
        }))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unexpected internal failure".to_string())
}

enum Phase {
    Accepted,
    AnnounceRetrieval(Turn),
    Retrieve(Turn),
    AnnounceReasoning(Turn, Retrieved),
    Reason(Turn, Retrieved),
    AnnounceAnswer(Turn, Retrieved),
    Answer(Turn, Retrieved),
    Finished,
}

/// State carried between events; dropping it releases the in-flight slot
struct StreamState {
    inner: Arc<Inner>,
    query: String,
    conversation_id: Option<String>,
    strategy: Option<RetrievalStrategy>,
    max_results: usize,
    phase: Phase,
    _guard: InFlightGuard,
}

impl StreamState {
    async fn advance(&mut self) -> Option<StreamEvent> {
        match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Accepted => {
                let turn = self.inner.begin(&self.query, self.conversation_id.as_deref());
                let event = StreamEvent::status("Processing query...", Some(turn.conversation_id.as_str()));
                self.phase = Phase::AnnounceRetrieval(turn);
                Some(event)
            }
            Phase::AnnounceRetrieval(turn) => {
                self.phase = Phase::Retrieve(turn);
                Some(StreamEvent::status("Retrieving relevant information...", None))
            }
            Phase::Retrieve(turn) => {
                let outcome = AssertUnwindSafe(self.inner.retrieve(&turn, self.strategy, self.max_results))
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(retrieved) => {
                        let event = StreamEvent::RetrievalComplete {
                            results_count: retrieved.response.results.len(),
                            confidence: retrieved.response.confidence_score,
                            strategy: retrieved.response.strategy_used,
                        };
                        self.phase = Phase::AnnounceReasoning(turn, retrieved);
                        Some(event)
                    }
                    Err(panic) => Some(self.inner.stream_error(&turn, &panic_message(&*panic))),
                }
            }
            Phase::AnnounceReasoning(turn, retrieved) => {
                self.phase = Phase::Reason(turn, retrieved);
                Some(StreamEvent::status("Generating reasoning chain...", None))
            }
            Phase::Reason(turn, mut retrieved) => {
                let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.reason(&turn, &mut retrieved)));

                match outcome {
                    Ok(()) => {
                        let event = StreamEvent::ReasoningComplete {
                            steps_count: retrieved.steps.len(),
                        };
                        self.phase = Phase::AnnounceAnswer(turn, retrieved);
                        Some(event)
                    }
                    Err(panic) => Some(self.inner.stream_error(&turn, &panic_message(&*panic))),
                }
            }
            Phase::AnnounceAnswer(turn, retrieved) => {
                self.phase = Phase::Answer(turn, retrieved);
                Some(StreamEvent::status("Generating response...", None))
            }
            Phase::Answer(turn, retrieved) => {
                let outcome = AssertUnwindSafe(self.inner.answer(&turn, retrieved)).catch_unwind().await;

                match outcome {
                    Ok(response) => Some(StreamEvent::Complete {
                        response: Box::new(response),
                    }),
                    Err(panic) => Some(self.inner.stream_error(&turn, &panic_message(&*panic))),
                }
            }
            Phase::Finished => None,
        }
    }
}

/// Conversational question answering over the retrieval engine
#[derive(Clone)]
pub struct ReasoningStream {
    inner: Arc<Inner>,
}

impl ReasoningStream {
    pub fn new(context: &EngineContext) -> Result<Self> {
        let synthesizer = Synthesizer::new(context.language_model().cloned())?;

        info!(
            language_model = synthesizer.has_model(),
            memory_size = context.memory().max_messages(),
            "Reasoning stream initialized"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                retrieval: context.retrieval().clone(),
                memory: context.memory().clone(),
                reasoner: ReasoningEngine::new(),
                synthesizer,
                default_max_results: context.config().retrieval.default_max_results,
                in_flight: Arc::new(AtomicUsize::new(0)),
            }),
        })
    }

    /// Requests currently being processed, open streams included
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Answer a query, continuing `conversation_id` when given
    pub async fn process_query(&self, query: &str, conversation_id: Option<&str>) -> RAGResponse {
        self.process_query_with(query, conversation_id, None, self.inner.default_max_results)
            .await
    }

    #[instrument(skip_all, fields(conversation_id = ?conversation_id, strategy = ?strategy, max_results))]
    pub async fn process_query_with(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        strategy: Option<RetrievalStrategy>,
        max_results: usize,
    ) -> RAGResponse {
        let _guard = InFlightGuard::acquire(&self.inner.in_flight);
        let inner = &self.inner;
        let turn = inner.begin(query, conversation_id);

        info!(
            response_id = %turn.response_id,
            context_messages = turn.context.len(),
            "Processing query with context"
        );

        let outcome = AssertUnwindSafe(async {
            let mut retrieved = inner.retrieve(&turn, strategy, max_results).await;
            inner.reason(&turn, &mut retrieved);
            inner.answer(&turn, retrieved).await
        })
        .catch_unwind()
        .await;

        match outcome {
            Ok(response) => response,
            Err(panic) => inner.failure(&turn, &panic_message(&*panic)),
        }
    }

    /// Stream progress events, ending with `complete` or `error`
    pub fn stream_response(&self, query: &str, conversation_id: Option<&str>) -> EventStream {
        self.stream_response_with(query, conversation_id, None, self.inner.default_max_results)
    }

    pub fn stream_response_with(
        &self,
        query: &str,
        conversation_id: Option<&str>,
        strategy: Option<RetrievalStrategy>,
        max_results: usize,
    ) -> EventStream {
        let state = StreamState {
            inner: self.inner.clone(),
            query: query.to_string(),
            conversation_id: conversation_id.map(str::to_string),
            strategy,
            max_results,
            phase: Phase::Accepted,
            _guard: InFlightGuard::acquire(&self.inner.in_flight),
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            let event = state.advance().await?;
            Some((event, state))
        }))
    }

    /// Validate a caller request and answer it in the requested mode
    ///
    /// A rejected request is answered too: with a zero-confidence response, or
    /// a stream holding a single `error` event. Nothing is recorded in memory.
    pub async fn retrieve_and_answer(&self, request: AnswerRequest) -> AnswerOutcome {
        if let Err(e) = request.validate() {
            let error = AppError::Validation {
                message: e.to_string(),
                field: None,
            };
            return self.inner.rejection(&request, &error);
        }

        let conversation_id = request.conversation_id.as_deref();
        if request.stream {
            AnswerOutcome::Stream(self.stream_response_with(
                &request.query,
                conversation_id,
                request.strategy,
                request.max_results,
            ))
        } else {
            let response = self
                .process_query_with(&request.query, conversation_id, request.strategy, request.max_results)
                .await;
            AnswerOutcome::Complete(Box::new(response))
        }
    }

    pub fn conversation_history(&self, conversation_id: &str) -> ConversationHistory {
        self.inner.memory.history(conversation_id)
    }

    /// False when the conversation was not known
    pub fn clear_conversation(&self, conversation_id: &str) -> bool {
        self.inner.memory.clear(conversation_id)
    }
}
