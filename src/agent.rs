//! Agent Orchestrator (C9): the central state machine described in SPEC_FULL
//! §4.9. Generalizes the teacher's `Agent` struct (injected clients,
//! `process()` entry point) — the workflow/tool/MCP/A2A machinery is gone,
//! replaced by the linear classify → branch → retrieve → prompt → generate →
//! post-process flow below. Construction takes an explicit context object
//! rather than reaching for globals (§9 redesign: "global mutable singletons"
//! → "construct at startup, inject via a context object").

use crate::classify::classify;
use crate::config::AgentConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::language::detect_language;
use crate::llm::{system_message, user_message, LlmClient, Message, Role};
use crate::retrieval::RetrievalScope;
use crate::session::ConversationMemory;
use crate::store::VectorStore;
use crate::types::{QueryClass, SourceRef, Turn};
use crate::websearch::WebSearcher;
use chrono::Utc;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use tracing::{instrument, warn};

/// Structured AI-content marker attached to every assistant message, per the
/// AI-Act-style disclosure requirement.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContentMarker {
    pub generated_by: &'static str,
    pub model: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub session_id: String,
    pub query_class: QueryClass,
}

/// The orchestrator's response to a single turn.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub query_class: QueryClass,
    pub marker: ContentMarker,
    /// e.g. `"ok"`, `"llm_unavailable"`, `"insufficient_evidence"`.
    pub status: &'static str,
    /// Count of `sources` entries of type `knowledge_base`, surfaced so
    /// callers can tell a pure web-fallback answer from a grounded one.
    pub kb_hits: usize,
}

/// Everything the orchestrator needs, constructed once at startup and shared
/// across requests — the explicit context object named in §9, replacing the
/// teacher's ad hoc field-by-field `Agent` construction.
pub struct AgentContext {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<Embedder>,
    pub web_searcher: Arc<WebSearcher>,
    pub llm: Arc<dyn LlmClient>,
    pub memory: Arc<ConversationMemory>,
    pub config: AgentConfig,
}

pub struct Agent {
    ctx: AgentContext,
}

impl Agent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    /// Processes one inbound `(session_id, text)` pair end to end: resolves
    /// the session, pins language on first turn, classifies, branches,
    /// retrieves and generates as needed, stamps the content marker, and
    /// appends the turn to history.
    #[instrument(skip(self, text), fields(session_id = %session_id))]
    pub async fn process(&self, session_id: &str, text: &str) -> Result<AgentResponse> {
        let is_first_turn = self.ctx.memory.language(session_id).is_none();
        if is_first_turn {
            let detected = detect_language(text);
            self.ctx.memory.pin_language(session_id, &detected);
        }
        let language = self
            .ctx
            .memory
            .language(session_id)
            .unwrap_or_else(|| "en".to_string());

        let query_class = classify(text, &self.ctx.config.classifier, Some(self.ctx.llm.as_ref())).await;

        let (answer, sources, status) = match query_class {
            QueryClass::SmallTalk => (small_talk_reply(&language), Vec::new(), "ok"),
            QueryClass::Identity => (identity_reply(&language), Vec::new(), "ok"),
            QueryClass::Meta => (meta_reply(&language), Vec::new(), "ok"),
            QueryClass::Policy => self.answer_policy_query(session_id, text, &language).await,
        };

        let marker = ContentMarker {
            generated_by: "agent",
            model: self.ctx.config.llm.model.clone(),
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            query_class,
        };

        self.ctx.memory.append(
            session_id,
            Turn {
                user_message: text.to_string(),
                assistant_message: answer.clone(),
                sources: sources.clone(),
                timestamp: Utc::now(),
            },
        );

        let kb_hits = sources
            .iter()
            .filter(|s| matches!(s, SourceRef::KnowledgeBase { .. }))
            .count();

        Ok(AgentResponse {
            text: answer,
            sources,
            query_class,
            marker,
            status,
            kb_hits,
        })
    }

    async fn answer_policy_query(
        &self,
        session_id: &str,
        text: &str,
        language: &str,
    ) -> (String, Vec<SourceRef>, &'static str) {
        let scope = RetrievalScope::new(
            self.ctx.store.as_ref(),
            self.ctx.embedder.as_ref(),
            self.ctx.web_searcher.as_ref(),
            &self.ctx.config.retrieval,
            &self.ctx.config.deadlines,
        );
        let sources = scope.retrieve(text).await;

        if sources.is_empty() {
            return (
                insufficient_evidence_reply(language),
                sources,
                "insufficient_evidence",
            );
        }

        let history = self.ctx.memory.last_turns(session_id, 20);
        let messages = build_prompt(text, language, &history, &sources);

        match self
            .ctx
            .llm
            .chat(
                &messages,
                self.ctx.config.llm.temperature,
                self.ctx.config.llm.max_output_tokens,
            )
            .await
        {
            Ok(raw) => {
                let cited = post_process_citations(&raw, sources.len());
                (cited, sources, "ok")
            }
            Err(e) => {
                warn!(error = %e, "LLM generation failed after retries, falling back to evidence-only reply");
                (llm_unavailable_reply(language), sources, "llm_unavailable")
            }
        }
    }
}

/// Builds the grounded prompt: system preamble + pinned language + last K
/// turns + numbered evidence block (title, URL, score) + the question.
fn build_prompt(question: &str, language: &str, history: &[Turn], sources: &[SourceRef]) -> Vec<Message> {
    let preamble = format!(
        "You are a policy research assistant for EU Green Deal topics. \
         Cite evidence strictly by its numbered index (e.g. [1]); never invent a URL. \
         If the evidence does not support an answer, say so plainly. Reply in language: {language}."
    );

    let mut messages = vec![system_message(preamble)];
    for turn in history {
        messages.push(user_message(turn.user_message.clone()));
        messages.push(Message {
            role: Role::Assistant,
            content: turn.assistant_message.clone(),
        });
    }

    let evidence_block = sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("[{}] {} — {}", i + 1, s.title(), s.url().unwrap_or("(no url)")))
        .collect::<Vec<_>>()
        .join("\n");

    messages.push(user_message(format!(
        "Evidence:\n{evidence_block}\n\nQuestion: {question}"
    )));

    messages
}

fn citation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"))
}

/// Drops any inline citation `[n]` that doesn't refer to one of the
/// `evidence_count` numbered evidence items, so the model can never smuggle
/// an invented reference past the reader.
fn post_process_citations(raw: &str, evidence_count: usize) -> String {
    citation_re()
        .replace_all(raw, |caps: &regex::Captures| {
            let n: usize = caps[1].parse().unwrap_or(0);
            if n >= 1 && n <= evidence_count {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

fn small_talk_reply(language: &str) -> String {
    format!("Hello! I can help with EU Green Deal policy questions. ({language})")
}

fn identity_reply(language: &str) -> String {
    format!(
        "I'm an assistant focused on EU Green Deal policy, grounded in a knowledge base and web search. ({language})"
    )
}

fn meta_reply(language: &str) -> String {
    format!(
        "I answer questions using a retrieval-augmented pipeline over an ingested policy corpus, \
         with web search as a fallback. I cite every claim and say so when evidence is missing. ({language})"
    )
}

fn insufficient_evidence_reply(language: &str) -> String {
    format!(
        "I couldn't find sufficient evidence to answer that confidently. Could you narrow or rephrase the question? ({language})"
    )
}

fn llm_unavailable_reply(language: &str) -> String {
    format!(
        "The language model is temporarily unavailable, but here is the supporting evidence I found. ({language})"
    )
}
