//! Gesprächsimpulse für den unterrichtenden Teilnehmer
//!
//! Antworten des externen Generators werden hier gegen ein festes Schema
//! validiert. Nur geprüfte `Prompt`-Werte gelangen in die Session.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptValidationError {
    #[error("Response is not valid prompt JSON: {0}")]
    Malformed(String),

    #[error("Prompt question is empty")]
    EmptyQuestion,
}

// ============================================================================
// PROMPT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

/// Ein Gesprächsimpuls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub question: String,
    pub context: String,
    pub difficulty: Difficulty,
}

/// Rohform einer Generator-Antwort (vor der Validierung)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeneratedPrompt {
    question: String,
    #[serde(default)]
    context: String,
    difficulty: Difficulty,
}

impl Prompt {
    pub fn new(question: impl Into<String>, context: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            question: question.into(),
            context: context.into(),
            difficulty,
        }
    }

    /// Parst und prüft die JSON-Antwort eines Generators
    pub fn from_generated_json(text: &str) -> Result<Self, PromptValidationError> {
        let raw: GeneratedPrompt = serde_json::from_str(text.trim())
            .map_err(|e| PromptValidationError::Malformed(e.to_string()))?;

        let question = raw.question.trim().to_string();
        if question.is_empty() {
            return Err(PromptValidationError::EmptyQuestion);
        }

        Ok(Self {
            question,
            context: raw.context.trim().to_string(),
            difficulty: raw.difficulty,
        })
    }
}

/// Anfrage an den Content-Generator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromptRequest {
    /// Interessen des unterrichtenden Teilnehmers
    pub interests: Vec<String>,
    /// Sprache, in der das Gespräch geführt wird
    pub language: Option<String>,
    pub difficulty: Difficulty,
    /// Bereits gezeigte Fragen dieser Session
    pub excluding: Vec<String>,
}

// ============================================================================
// USED PROMPTS
// ============================================================================

/// Menge der in einer Session gezeigten Fragen (Einfügereihenfolge bleibt erhalten)
#[derive(Debug, Clone, Default)]
pub struct UsedPrompts {
    order: Vec<String>,
    seen: HashSet<String>,
}

impl UsedPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fügt eine Frage hinzu, false wenn sie schon enthalten war
    pub fn insert(&mut self, question: &str) -> bool {
        if self.seen.contains(question) {
            return false;
        }
        self.seen.insert(question.to_string());
        self.order.push(question.to_string());
        true
    }

    pub fn contains(&self, question: &str) -> bool {
        self.seen.contains(question)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }
}

// ============================================================================
// FALLBACK POOL
// ============================================================================

const FALLBACK_POOL: &[(&str, &str, Difficulty)] = &[
    (
        "What did you do last weekend?",
        "Talk about recent activities using the past tense.",
        Difficulty::Easy,
    ),
    (
        "What is your favourite food, and how is it made?",
        "Describe ingredients and steps in order.",
        Difficulty::Easy,
    ),
    (
        "Can you describe the place where you grew up?",
        "Practise descriptive adjectives and places.",
        Difficulty::Medium,
    ),
    (
        "What is a tradition in your country that visitors often find surprising?",
        "Compare cultures and explain customs.",
        Difficulty::Medium,
    ),
    (
        "If you could live anywhere in the world for a year, where would you go and why?",
        "Use conditional sentences to talk about hypotheticals.",
        Difficulty::Medium,
    ),
    (
        "What is a skill you would like to learn, and how would you start?",
        "Discuss plans and goals using future forms.",
        Difficulty::Medium,
    ),
    (
        "How has technology changed the way people in your city spend their free time?",
        "Give opinions and support them with examples.",
        Difficulty::Hard,
    ),
    (
        "Which book, film or series changed how you see something, and in what way?",
        "Explain a change of perspective in detail.",
        Difficulty::Hard,
    ),
];

/// Fester Pool generischer Gesprächsimpulse
pub fn fallback_prompts() -> Vec<Prompt> {
    FALLBACK_POOL
        .iter()
        .map(|(question, context, difficulty)| Prompt::new(*question, *context, *difficulty))
        .collect()
}

/// Wählt einen Fallback-Impuls, der nicht in `excluding` vorkommt
///
/// Passende Schwierigkeit wird bevorzugt. Sind alle Einträge verbraucht, wird
/// trotzdem einer geliefert, damit die Oberfläche nie leer bleibt.
pub fn pick_fallback(difficulty: Difficulty, excluding: &[String]) -> Prompt {
    let pool = fallback_prompts();
    let unused = |p: &&Prompt| !excluding.iter().any(|q| q == &p.question);

    if let Some(prompt) = pool
        .iter()
        .filter(unused)
        .find(|p| p.difficulty == difficulty)
        .or_else(|| pool.iter().find(unused))
    {
        return prompt.clone();
    }

    pool[excluding.len() % pool.len()].clone()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generated_prompt() {
        let prompt = Prompt::from_generated_json(
            r#"{"question": " What music do you like? ", "context": "Hobbies", "difficulty": "easy"}"#,
        )
        .unwrap();
        assert_eq!(prompt.question, "What music do you like?");
        assert_eq!(prompt.difficulty, Difficulty::Easy);
    }

    #[test]
    fn test_reject_malformed_prompt() {
        assert!(matches!(
            Prompt::from_generated_json("not json"),
            Err(PromptValidationError::Malformed(_))
        ));
        assert!(matches!(
            Prompt::from_generated_json(r#"{"question": "Hi?", "difficulty": "extreme"}"#),
            Err(PromptValidationError::Malformed(_))
        ));
        assert_eq!(
            Prompt::from_generated_json(r#"{"question": "  ", "difficulty": "hard"}"#),
            Err(PromptValidationError::EmptyQuestion)
        );
    }

    #[test]
    fn test_used_prompts_has_no_duplicates() {
        let mut used = UsedPrompts::new();
        assert!(used.insert("a"));
        assert!(used.insert("b"));
        assert!(!used.insert("a"));
        assert_eq!(used.to_vec(), vec!["a".to_string(), "b".to_string()]);

        used.clear();
        assert!(used.is_empty());
    }

    #[test]
    fn test_fallback_prefers_unused_with_matching_difficulty() {
        let first = pick_fallback(Difficulty::Hard, &[]);
        assert_eq!(first.difficulty, Difficulty::Hard);

        let second = pick_fallback(Difficulty::Hard, &[first.question.clone()]);
        assert_eq!(second.difficulty, Difficulty::Hard);
        assert_ne!(first.question, second.question);
    }

    #[test]
    fn test_fallback_never_repeats_while_pool_has_alternatives() {
        let mut used = Vec::new();
        for _ in 0..fallback_prompts().len() {
            let prompt = pick_fallback(Difficulty::Easy, &used);
            assert!(!used.contains(&prompt.question));
            used.push(prompt.question);
        }

        // Pool erschöpft: es kommt trotzdem ein Impuls
        let exhausted = pick_fallback(Difficulty::Easy, &used);
        assert!(!exhausted.question.is_empty());
    }
}
