//! Public protocol structs for WebSocket and HTTP endpoints (serde ready),
//! plus the display-sink conversion from `QuestionSet` to cards.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CountLimits;
use crate::domain::{Category, DifficultyTier, OutputShape, QuestionSet};
use crate::errors::PipelineError;
use crate::logic::Selection;
use crate::normalize::OPTION_LABELS;
use crate::state::LastResult;
use crate::templates::template_for;

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Generate {
        #[serde(flatten)]
        body: GenerateIn,
    },
    ShowLast {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Quiz {
        #[serde(flatten)]
        body: QuizResultOut,
    },
    Error {
        kind: String,
        message: String,
    },
}

impl ServerWsMessage {
    pub fn from_error(e: &PipelineError) -> Self {
        ServerWsMessage::Error { kind: e.kind().into(), message: e.user_message() }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    pub topic: String,
    #[serde(default)]
    pub tier: DifficultyTier,
    #[serde(default)]
    pub category: Option<Category>,
    pub count: u32,
}

impl GenerateIn {
    pub fn selection(&self) -> Selection {
        Selection {
            topic: self.topic.clone(),
            tier: self.tier,
            category: self.category,
            count: self.count,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LastQuery {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct QuizResultOut {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub topic: String,
    pub tier: DifficultyTier,
    pub category: Category,
    pub count: u32,
    pub quiz: QuizOut,
}

impl QuizResultOut {
    pub fn new(session_id: String, result: &LastResult) -> Self {
        Self {
            session_id,
            topic: result.topic.clone(),
            tier: result.tier,
            category: result.category,
            count: result.count,
            quiz: to_out(&result.set),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuizOut {
    pub passage: Option<String>,
    pub cards: Vec<CardOut>,
}

#[derive(Debug, Serialize)]
pub struct CardOut {
    pub ordinal: u32,
    pub heading: String,
    pub prompt: String,
    pub options: Vec<OptionOut>,
    /// Shown only when the user asks for the answer.
    pub reveal: RevealOut,
}

#[derive(Debug, Serialize)]
pub struct OptionOut {
    pub label: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct RevealOut {
    pub correct: Option<String>,
    pub hints: BTreeMap<String, String>,
}

/// Display sink: passage first, then one card per record in ordinal order.
pub fn to_out(set: &QuestionSet) -> QuizOut {
    let cards = set
        .records
        .iter()
        .map(|r| CardOut {
            ordinal: r.ordinal,
            heading: format!("שאלה {} 📝", r.ordinal),
            prompt: r.prompt.clone(),
            options: OPTION_LABELS
                .iter()
                .zip(r.options.iter())
                .map(|(label, text)| OptionOut { label: *label, text: text.clone() })
                .collect(),
            reveal: RevealOut {
                correct: r.correct_label.clone(),
                hints: r.auxiliary.clone(),
            },
        })
        .collect();
    QuizOut { passage: set.passage.clone(), cards }
}

//
// Catalog (selector contents)
//

#[derive(Debug, Serialize)]
pub struct CatalogOut {
    pub tiers: Vec<TierOut>,
    pub categories: Vec<CategoryOut>,
    #[serde(rename = "minCount")]
    pub min_count: u32,
    #[serde(rename = "maxCount")]
    pub max_count: u32,
    #[serde(rename = "suggestedCounts")]
    pub suggested_counts: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct TierOut {
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CategoryOut {
    pub id: &'static str,
    pub label: &'static str,
    pub shape: OutputShape,
}

pub fn catalog(limits: &CountLimits) -> CatalogOut {
    CatalogOut {
        tiers: DifficultyTier::ALL
            .iter()
            .map(|t| TierOut { id: t.id(), label: t.label() })
            .collect(),
        categories: Category::ALL
            .iter()
            .map(|c| {
                let t = template_for(*c);
                CategoryOut { id: c.id(), label: t.label, shape: t.shape }
            })
            .collect(),
        min_count: limits.min_count,
        max_count: limits.max_count,
        suggested_counts: limits.suggested.iter().copied().filter(|n| limits.contains(*n)).collect(),
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestionRecord;

    #[test]
    fn test_cards_label_options_and_defer_answer() {
        let mut record = QuestionRecord::plain(1, "מה חסר?".into());
        record.options = vec!["1".into(), "2".into(), "3".into(), "4".into()];
        record.correct_label = Some("ג".into());
        record.auxiliary.insert("rule".into(), "sum=10".into());
        let set = QuestionSet { passage: Some("קטע".into()), records: vec![record, QuestionRecord::plain(2, "פתוחה".into())] };

        let out = to_out(&set);
        assert_eq!(out.passage.as_deref(), Some("קטע"));
        assert_eq!(out.cards.len(), 2);
        assert_eq!(out.cards[0].heading, "שאלה 1 📝");
        assert_eq!(out.cards[0].options[2].label, "ג");
        assert_eq!(out.cards[0].options[2].text, "3");
        assert_eq!(out.cards[0].reveal.correct.as_deref(), Some("ג"));
        assert_eq!(out.cards[0].reveal.hints["rule"], "sum=10");
        assert!(out.cards[1].options.is_empty());

        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["cards"][1]["reveal"]["correct"], serde_json::Value::Null);
    }

    #[test]
    fn test_generate_message_parses_flattened_body() {
        let msg: ClientWsMessage = serde_json::from_str(
            r#"{"type": "generate", "topic": "ים", "tier": "gifted", "category": "word_analogies", "count": 5}"#,
        )
        .unwrap();
        match msg {
            ClientWsMessage::Generate { body } => {
                assert_eq!(body.topic, "ים");
                assert_eq!(body.tier, DifficultyTier::Gifted);
                assert_eq!(body.category, Some(Category::WordAnalogies));
                assert!(body.session_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_catalog_lists_everything() {
        let c = catalog(&CountLimits::default());
        assert_eq!(c.tiers.len(), 3);
        assert_eq!(c.categories.len(), 8);
        assert_eq!(c.suggested_counts, vec![3, 5, 7, 10]);
    }
}
