//! Response normalizer: raw model text -> ordered `QuestionSet`.
//!
//! Free text is segmented on question markers. JSON is parsed into a
//! `serde_json::Value` first and then validated field by field, so a bad
//! envelope reports the offending path instead of failing on the first
//! missing key. Either path returns the whole set or an error, never a
//! partially filled set.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::domain::{OutputShape, QuestionRecord, QuestionSet, RawCompletion};
use crate::errors::NormalizationFailure;

/// Literal token that opens a question line ("Question").
pub const QUESTION_MARKER: &str = "שאלה";

/// Labels shown next to the four options, in order.
pub const OPTION_LABELS: [&str; 4] = ["א", "ב", "ג", "ד"];
const LATIN_LABELS: [&str; 4] = ["A", "B", "C", "D"];
const DIGIT_LABELS: [&str; 4] = ["1", "2", "3", "4"];

#[instrument(level = "debug", skip(raw), fields(text_len = raw.text.len(), ?shape))]
pub fn normalize(raw: &RawCompletion, shape: OutputShape) -> Result<QuestionSet, NormalizationFailure> {
  let set = match shape {
    OutputShape::FreeText => segment_free_text(&raw.text)?,
    OutputShape::StructuredJson => parse_structured(&raw.text)?,
  };
  debug!(target: "quiz", records = set.records.len(), has_passage = set.passage.is_some(), "Completion normalized");
  Ok(set)
}

// -------- Free text --------

/// A line opens a question when it starts with the marker token, or when it
/// is longer than two chars, starts with a numeric char (any script), and has
/// `.` or `:` within its first three chars.
// TODO: replace the three-char window with an explicit numbered-line regex
// once the prompt format is pinned down.
fn is_question_start(line: &str) -> bool {
  if line.starts_with(QUESTION_MARKER) {
    return true;
  }
  let head: Vec<char> = line.chars().take(3).collect();
  line.chars().count() > 2
    && head[0].is_numeric()
    && head.iter().any(|c| *c == '.' || *c == ':')
}

fn segment_free_text(text: &str) -> Result<QuestionSet, NormalizationFailure> {
  fn flush(current: &mut String, records: &mut Vec<QuestionRecord>) {
    if !current.is_empty() {
      let ordinal = records.len() as u32 + 1;
      records.push(QuestionRecord::plain(ordinal, std::mem::take(current)));
    }
  }

  let mut records = Vec::new();
  let mut current = String::new();

  for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
    if is_question_start(line) {
      flush(&mut current, &mut records);
      current = match line.split_once(':') {
        Some((_, body)) => body.trim().to_string(),
        None => line.to_string(),
      };
    } else if current.is_empty() {
      current = line.to_string();
    } else {
      current.push(' ');
      current.push_str(line);
    }
  }
  flush(&mut current, &mut records);

  if records.is_empty() {
    return Err(NormalizationFailure::SchemaViolation { detail: "no questions in completion".into() });
  }
  Ok(QuestionSet { passage: None, records })
}

// -------- Structured JSON --------

/// Remove a surrounding code fence (optionally tagged `json`).
fn strip_code_fence(s: &str) -> &str {
  let t = s.trim();
  let Some(rest) = t.strip_prefix("```") else {
    return t;
  };
  let rest = rest.strip_prefix("json").or_else(|| rest.strip_prefix("JSON")).unwrap_or(rest);
  let rest = rest.strip_suffix("```").unwrap_or(rest);
  rest.trim()
}

fn violation(detail: String) -> NormalizationFailure {
  NormalizationFailure::SchemaViolation { detail }
}

fn parse_structured(text: &str) -> Result<QuestionSet, NormalizationFailure> {
  let body = strip_code_fence(text);
  let root: Value = serde_json::from_str(body)
    .map_err(|e| NormalizationFailure::MalformedJson { detail: e.to_string() })?;

  let obj = root.as_object().ok_or_else(|| violation("top level is not an object".into()))?;

  let passage = match obj.get("passage") {
    None | Some(Value::Null) => None,
    Some(Value::String(s)) if s.trim().is_empty() => None,
    Some(Value::String(s)) => Some(s.trim().to_string()),
    Some(_) => return Err(violation("passage: expected a string".into())),
  };

  let questions = match obj.get("questions") {
    Some(Value::Array(items)) if !items.is_empty() => items,
    Some(Value::Array(_)) => return Err(violation("questions: empty array".into())),
    Some(_) => return Err(violation("questions: expected an array".into())),
    None => return Err(violation("questions: missing".into())),
  };

  let records = questions
    .iter()
    .enumerate()
    .map(|(i, item)| parse_question(i, item))
    .collect::<Result<Vec<_>, _>>()?;

  Ok(QuestionSet { passage, records })
}

fn parse_question(index: usize, item: &Value) -> Result<QuestionRecord, NormalizationFailure> {
  let path = format!("questions[{}]", index);
  let obj: &Map<String, Value> = item
    .as_object()
    .ok_or_else(|| violation(format!("{path}: expected an object")))?;

  let prompt = match obj.get("question") {
    Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
    Some(Value::String(_)) => return Err(violation(format!("{path}.question: empty"))),
    Some(_) => return Err(violation(format!("{path}.question: expected a string"))),
    None => return Err(violation(format!("{path}.question: missing"))),
  };

  let options: Vec<String> = match obj.get("options") {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Array(items)) if items.is_empty() => Vec::new(),
    Some(Value::Array(items)) if items.len() == OPTION_LABELS.len() => items
      .iter()
      .enumerate()
      .map(|(j, v)| {
        v.as_str()
          .map(|s| s.trim().to_string())
          .ok_or_else(|| violation(format!("{path}.options[{j}]: expected a string")))
      })
      .collect::<Result<_, _>>()?,
    Some(Value::Array(items)) => {
      return Err(violation(format!("{path}.options: expected 4 entries, got {}", items.len())))
    }
    Some(_) => return Err(violation(format!("{path}.options: expected an array"))),
  };

  let correct = match obj.get("correct") {
    None | Some(Value::Null) => None,
    Some(Value::String(s)) if s.trim().is_empty() => None,
    Some(Value::String(s)) => Some(s.trim().to_string()),
    Some(Value::Number(n)) => Some(n.to_string()),
    Some(_) => return Err(violation(format!("{path}.correct: expected a string"))),
  };

  let mut auxiliary = BTreeMap::new();
  for (key, value) in obj {
    if matches!(key.as_str(), "question" | "options" | "correct") {
      continue;
    }
    match value {
      Value::String(s) => { auxiliary.insert(key.clone(), s.clone()); }
      Value::Number(n) => { auxiliary.insert(key.clone(), n.to_string()); }
      Value::Bool(b) => { auxiliary.insert(key.clone(), b.to_string()); }
      _ => warn!(target: "quiz", %path, field = %key, "Dropping non-scalar auxiliary field"),
    }
  }

  let correct_label = match (correct, options.is_empty()) {
    (None, _) => None,
    (Some(answer), true) => {
      // Open answer (no options): kept as a hint for the reveal.
      auxiliary.insert("correct".into(), answer);
      None
    }
    (Some(answer), false) => Some(
      resolve_label(&answer, &options)
        .ok_or_else(|| violation(format!("{path}.correct: '{answer}' matches no option")))?,
    ),
  };

  Ok(QuestionRecord { ordinal: index as u32 + 1, prompt, options, correct_label, auxiliary })
}

/// Map a `correct` value onto one of the Hebrew option labels. An exact
/// option text wins over reading the value as a label, so `"2"` among numeric
/// options names the option "2", not the second slot. Bare labels in any of
/// the three sets map by position; a label-prefixed option text (`א)` / `A.`)
/// maps to its option.
fn resolve_label(answer: &str, options: &[String]) -> Option<String> {
  let answer = answer.trim();
  let by_text = options.iter().position(|o| o == answer);

  let by_label = || {
    let bare = answer.trim_end_matches([')', '.', ':']).trim();
    [&OPTION_LABELS, &LATIN_LABELS, &DIGIT_LABELS]
      .into_iter()
      .find_map(|labels| labels.iter().position(|l| l.eq_ignore_ascii_case(bare)))
  };

  let by_stripped_text = || {
    let text = strip_label_prefix(answer);
    options.iter().position(|o| strip_label_prefix(o) == text)
  };

  by_text
    .or_else(by_label)
    .or_else(by_stripped_text)
    .map(|i| OPTION_LABELS[i].to_string())
}

/// "א) כלב" / "A. dog" -> "כלב" / "dog".
fn strip_label_prefix(s: &str) -> &str {
  let s = s.trim();
  for label in OPTION_LABELS.iter().chain(LATIN_LABELS.iter()).chain(DIGIT_LABELS.iter()) {
    if let Some(rest) = s.strip_prefix(label) {
      if let Some(rest) = rest.strip_prefix([')', '.', ':']) {
        return rest.trim();
      }
    }
  }
  s
}
