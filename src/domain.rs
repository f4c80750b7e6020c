//! Domain models: tiers, categories, generation request, prompt payload and
//! the question records produced by the normalizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CountLimits;
use crate::errors::PipelineError;

/// Difficulty tier selected by the user.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
  Grade2,
  Grade3,
  Gifted,
}

impl Default for DifficultyTier {
  fn default() -> Self { DifficultyTier::Grade2 }
}

impl DifficultyTier {
  pub const ALL: [DifficultyTier; 3] = [DifficultyTier::Grade2, DifficultyTier::Grade3, DifficultyTier::Gifted];

  pub fn id(self) -> &'static str {
    match self {
      DifficultyTier::Grade2 => "grade2",
      DifficultyTier::Grade3 => "grade3",
      DifficultyTier::Gifted => "gifted",
    }
  }

  /// Label shown in the selector.
  pub fn label(self) -> &'static str {
    match self {
      DifficultyTier::Grade2 => "כיתה ב׳ (קל)",
      DifficultyTier::Grade3 => "כיתה ג׳ (בינוני)",
      DifficultyTier::Gifted => "מחוננים (מאתגר)",
    }
  }

  /// Audience description injected into the prompt.
  pub fn audience(self) -> &'static str {
    match self {
      DifficultyTier::Grade2 => "ילדים בכיתה ב׳, בגילאי 7-8. השתמש במילים פשוטות מאוד, משפטים קצרים, ודוגמאות מהחיים היומיומיים של ילדים",
      DifficultyTier::Grade3 => "ילדים בכיתה ג׳, בגילאי 8-9. השתמש בשפה ברורה, אפשר להוסיף מעט מורכבות",
      DifficultyTier::Gifted => "ילדים מחוננים בכיתות ב-ג, שאוהבים אתגרים. אפשר להוסיף שאלות חשיבה ופתרון בעיות",
    }
  }

  /// Upper bound for numbers used in quantitative templates.
  pub fn number_ceiling(self) -> u32 {
    match self {
      DifficultyTier::Grade2 => 100,
      DifficultyTier::Grade3 => 1000,
      DifficultyTier::Gifted => 10000,
    }
  }
}

/// Question-type bucket. Each maps to one instruction template.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
  GeneralQuiz,
  ReadingComprehension,
  QuantitativeReasoning,
  SentenceCompletion,
  WordAnalogies,
  NumberShapes,
  WordProblems,
  PatternRecognition,
}

impl Default for Category {
  fn default() -> Self { Category::GeneralQuiz }
}

impl Category {
  pub const ALL: [Category; 8] = [
    Category::GeneralQuiz,
    Category::ReadingComprehension,
    Category::QuantitativeReasoning,
    Category::SentenceCompletion,
    Category::WordAnalogies,
    Category::NumberShapes,
    Category::WordProblems,
    Category::PatternRecognition,
  ];

  pub fn id(self) -> &'static str {
    match self {
      Category::GeneralQuiz => "general_quiz",
      Category::ReadingComprehension => "reading_comprehension",
      Category::QuantitativeReasoning => "quantitative_reasoning",
      Category::SentenceCompletion => "sentence_completion",
      Category::WordAnalogies => "word_analogies",
      Category::NumberShapes => "number_shapes",
      Category::WordProblems => "word_problems",
      Category::PatternRecognition => "pattern_recognition",
    }
  }
}

/// Whether the model is asked for numbered prose or a JSON envelope.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
  FreeText,
  StructuredJson,
}

/// A validated user selection. Only constructible through `validated`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationRequest {
  topic: String,
  tier: DifficultyTier,
  category: Category,
  count: u32,
}

impl GenerationRequest {
  /// Trim and check the raw selection; nothing downstream runs on failure.
  pub fn validated(
    topic: &str,
    tier: DifficultyTier,
    category: Option<Category>,
    count: u32,
    limits: &CountLimits,
  ) -> Result<Self, PipelineError> {
    let topic = topic.trim();
    if topic.is_empty() {
      return Err(PipelineError::InvalidRequest("topic is empty".into()));
    }
    if !limits.contains(count) {
      return Err(PipelineError::InvalidRequest(format!(
        "count {} outside {}..={}",
        count, limits.min_count, limits.max_count
      )));
    }
    Ok(Self { topic: topic.to_string(), tier, category: category.unwrap_or_default(), count })
  }

  pub fn topic(&self) -> &str { &self.topic }
  pub fn tier(&self) -> DifficultyTier { self.tier }
  pub fn category(&self) -> Category { self.category }
  pub fn count(&self) -> u32 { self.count }
}

/// Generation parameters sent with the completion call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SamplingConfig {
  pub temperature: f32,
  pub max_tokens: u32,
  pub presence_penalty: f32,
  pub frequency_penalty: f32,
}

/// Everything the completion client needs for one call.
///
/// `style` and `nonce` are already embedded in `user_instruction`; the copies
/// here exist for logging only.
#[derive(Clone, Debug, PartialEq)]
pub struct PromptPayload {
  pub system_instruction: String,
  pub user_instruction: String,
  pub sampling: SamplingConfig,
  pub shape: OutputShape,
  pub style: &'static str,
  pub nonce: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawCompletion {
  pub text: String,
}

/// One displayable question.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuestionRecord {
  pub ordinal: u32,
  pub prompt: String,
  /// Empty or exactly four entries.
  pub options: Vec<String>,
  pub correct_label: Option<String>,
  pub auxiliary: BTreeMap<String, String>,
}

impl QuestionRecord {
  pub fn plain(ordinal: u32, prompt: String) -> Self {
    Self { ordinal, prompt, options: Vec::new(), correct_label: None, auxiliary: BTreeMap::new() }
  }
}

/// Terminal artifact of one pipeline run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuestionSet {
  pub passage: Option<String>,
  pub records: Vec<QuestionRecord>,
}
