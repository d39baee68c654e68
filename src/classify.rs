//! Query Classifier (C8): decides which of the four `QueryClass` branches an
//! inbound turn takes. The rule-based path is the default (cheap, ≤300ms);
//! the LLM-prompt path is only consulted when the rules are inconclusive.

use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::llm::LlmClient;
use crate::types::QueryClass;
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

fn greeting_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(hi|hello|hey|good morning|good afternoon|good evening|thanks|thank you|bye|goodbye)\b")
            .expect("valid regex")
    })
}

fn identity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(who are you|what are you|your name|are you (a |an )?(bot|ai|human))\b")
            .expect("valid regex")
    })
}

fn meta_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(what can you do|how do you work|what sources|how many documents|your limitations|what is this (system|tool|app))\b")
            .expect("valid regex")
    })
}

/// Keyword gazetteer of obvious policy terms. Not exhaustive by design — the
/// rules only need to catch the clear cases; anything else falls to the LLM
/// path (or, on classifier failure, to `Policy` itself, the safer branch).
const POLICY_TERMS: &[&str] = &[
    "green deal",
    "emissions",
    "carbon",
    "climate",
    "renewable",
    "directive",
    "regulation",
    "taxonomy",
    "biodiversity",
    "circular economy",
    "fit for 55",
    "ets",
    "cbam",
];

fn rule_based_classify(text: &str) -> Option<QueryClass> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Some(QueryClass::SmallTalk);
    }
    if identity_re().is_match(trimmed) {
        return Some(QueryClass::Identity);
    }
    if meta_re().is_match(trimmed) {
        return Some(QueryClass::Meta);
    }
    if greeting_re().is_match(trimmed) && trimmed.split_whitespace().count() <= 4 {
        return Some(QueryClass::SmallTalk);
    }
    let lower = trimmed.to_lowercase();
    if POLICY_TERMS.iter().any(|term| lower.contains(term)) {
        return Some(QueryClass::Policy);
    }
    None
}

/// Classifies `text` into a `QueryClass`. Falls back to the LLM prompt path
/// when the rules are inconclusive and `config.use_llm_fallback` is set;
/// falls through to `Policy` on any classifier failure (the safer branch —
/// evidence will simply show or not).
pub async fn classify(
    text: &str,
    config: &ClassifierConfig,
    llm: Option<&dyn LlmClient>,
) -> QueryClass {
    if let Some(class) = rule_based_classify(text) {
        return class;
    }

    if config.use_llm_fallback {
        if let Some(llm) = llm {
            match classify_via_llm(text, llm).await {
                Ok(class) => return class,
                Err(e) => {
                    warn!(error = %e, "classifier LLM fallback failed, defaulting to policy");
                }
            }
        }
    }

    QueryClass::Policy
}

async fn classify_via_llm(text: &str, llm: &dyn LlmClient) -> Result<QueryClass> {
    let prompt = format!(
        "Classify the following user message into exactly one word: small_talk, identity, meta, or policy.\n\nMessage: {text}\n\nAnswer with exactly one word."
    );
    let response = llm
        .generate(&prompt, 0.0, 10)
        .await
        .map_err(|e| ClassifierError::LlmFailed(e.to_string()))?;

    let normalized = response.trim().to_lowercase();
    match normalized.as_str() {
        "small_talk" => Ok(QueryClass::SmallTalk),
        "identity" => Ok(QueryClass::Identity),
        "meta" => Ok(QueryClass::Meta),
        "policy" => Ok(QueryClass::Policy),
        other => Err(ClassifierError::UnknownClass(other.to_string()).into()),
    }
}
