//! Instruction templates, one per question category, plus the decorative
//! style catalog and the sampling constants of each template family.

use crate::domain::{Category, DifficultyTier, OutputShape, SamplingConfig};

/// Cosmetic framing picked at random for every request.
pub const STYLES: [&str; 8] = [
  "עם דמויות מצחיקות",
  "עם חיות חמודות",
  "עם גיבורי על",
  "עם נסיכות ונסיכים",
  "עם רובוטים",
  "עם דינוזאורים",
  "עם כדורגלנים",
  "עם אסטרונאוטים",
];

pub const FREE_TEXT_SAMPLING: SamplingConfig =
  SamplingConfig { temperature: 1.0, max_tokens: 2000, presence_penalty: 0.6, frequency_penalty: 0.6 };

pub const STRUCTURED_SAMPLING: SamplingConfig =
  SamplingConfig { temperature: 0.9, max_tokens: 3000, presence_penalty: 0.6, frequency_penalty: 0.6 };

#[derive(Debug)]
pub struct InstructionTemplate {
  pub category: Category,
  pub label: &'static str,
  pub shape: OutputShape,
  /// One-line task statement ({task}).
  pub task: &'static str,
  /// JSON envelope description ({schema}); empty for free text.
  pub schema: &'static str,
  /// Authoring rules ({constraints}). May contain {max_number}.
  pub constraints: &'static str,
}

impl InstructionTemplate {
  pub fn sampling(&self) -> SamplingConfig {
    match self.shape {
      OutputShape::FreeText => FREE_TEXT_SAMPLING,
      OutputShape::StructuredJson => STRUCTURED_SAMPLING,
    }
  }

  /// Constraints with the tier's numeric ceiling filled in.
  pub fn constraints_for(&self, tier: DifficultyTier) -> String {
    self.constraints.replace("{max_number}", &tier.number_ceiling().to_string())
  }
}

const MC_RULES: &str = "- לכל שאלה בדיוק 4 אפשרויות תשובה, רק אחת נכונה\n- בשדה correct כתוב רק את אות האפשרות הנכונה: א, ב, ג או ד\n- אל תכתוב את האות בתוך טקסט האפשרות";

pub static TEMPLATES: [InstructionTemplate; 8] = [
  InstructionTemplate {
    category: Category::GeneralQuiz,
    label: "מבחן חופשי",
    shape: OutputShape::FreeText,
    task: "",
    schema: "",
    constraints: "",
  },
  InstructionTemplate {
    category: Category::ReadingComprehension,
    label: "הבנת הנקרא",
    shape: OutputShape::StructuredJson,
    task: "כתוב קטע קריאה קצר ושאלות הבנה עליו.",
    schema: r#"{"passage": "קטע הקריאה", "questions": [{"question": "...", "options": ["...", "...", "...", "..."], "correct": "א", "explanation": "למה זו התשובה"}]}"#,
    constraints: "- קטע באורך 80-150 מילים, באוצר מילים מתאים לגיל\n- כל התשובות חייבות להופיע בקטע או להסיק ממנו\n- MC_RULES",
  },
  InstructionTemplate {
    category: Category::QuantitativeReasoning,
    label: "חשיבה כמותית",
    shape: OutputShape::StructuredJson,
    task: "כתוב שאלות חשיבה כמותית: השוואות, סדרי גודל ופעולות חשבון.",
    schema: r#"{"questions": [{"question": "...", "options": ["...", "...", "...", "..."], "correct": "א", "solution": "דרך הפתרון"}]}"#,
    constraints: "- השתמש רק במספרים שלמים בין 0 ל-{max_number}\n- בלי שברים או מספרים שליליים\n- MC_RULES",
  },
  InstructionTemplate {
    category: Category::SentenceCompletion,
    label: "השלמת משפטים",
    shape: OutputShape::StructuredJson,
    task: "כתוב משפטים עם מילה חסרה (סמן את המקום ב-____) ואפשרויות להשלמה.",
    schema: r#"{"questions": [{"question": "משפט עם ____", "options": ["...", "...", "...", "..."], "correct": "א", "explanation": "למה המילה מתאימה"}]}"#,
    constraints: "- מילה חסרה אחת בכל משפט\n- אפשרויות שגויות צריכות להיות סבירות אך לא נכונות\n- MC_RULES",
  },
  InstructionTemplate {
    category: Category::WordAnalogies,
    label: "אנלוגיות מילוליות",
    shape: OutputShape::StructuredJson,
    task: "כתוב אנלוגיות בצורה \"X ל-Y כמו Z ל-?\".",
    schema: r#"{"questions": [{"question": "חתול לגור כמו כלב ל-?", "options": ["...", "...", "...", "..."], "correct": "א", "relation": "סוג הקשר"}]}"#,
    constraints: "- מילים מוכרות לילדים בלבד\n- ציין בשדה relation את סוג הקשר (חלק-שלם, הורה-צאצא, הפכים וכו׳)\n- MC_RULES",
  },
  InstructionTemplate {
    category: Category::NumberShapes,
    label: "צורות ומספרים",
    shape: OutputShape::StructuredJson,
    task: "כתוב חידות של צורות עם מספרים (משולש, ריבוע, עיגול) שבהן יש למצוא מספר חסר לפי חוק.",
    schema: r#"{"questions": [{"question": "תיאור הצורה והמספרים עם ?", "options": ["...", "...", "...", "..."], "correct": "א", "rule": "החוק, למשל sum=10"}]}"#,
    constraints: "- מספרים בין 0 ל-{max_number}\n- תאר את הצורה במילים, בלי ציורים\n- כתוב בשדה rule את החוק בקצרה\n- MC_RULES",
  },
  InstructionTemplate {
    category: Category::WordProblems,
    label: "בעיות מילוליות",
    shape: OutputShape::StructuredJson,
    task: "כתוב בעיות מילוליות בחשבון עם סיפור קצר.",
    schema: r#"{"questions": [{"question": "הבעיה", "answer": "התשובה המספרית", "solution": "דרך הפתרון בשלבים"}]}"#,
    constraints: "- מספרים בין 0 ל-{max_number}\n- בלי אפשרויות בחירה: התשובה בשדה answer\n- לכל בעיה שלב אחד או שניים",
  },
  InstructionTemplate {
    category: Category::PatternRecognition,
    label: "זיהוי חוקיות",
    shape: OutputShape::StructuredJson,
    task: "כתוב סדרות (מספרים, אותיות או צורות במילים) שבהן יש להשלים את האיבר הבא.",
    schema: r#"{"questions": [{"question": "2, 4, 6, ?", "options": ["...", "...", "...", "..."], "correct": "א", "pattern_type": "סוג החוקיות"}]}"#,
    constraints: "- לפחות 4 איברים גלויים בכל סדרה\n- מספרים עד {max_number}\n- MC_RULES",
  },
];

/// Template for a category. Every category has exactly one.
pub fn template_for(category: Category) -> &'static InstructionTemplate {
  TEMPLATES
    .iter()
    .find(|t| t.category == category)
    .unwrap_or(&TEMPLATES[0])
}

/// Expand the shared multiple-choice rule block inside constraints.
pub fn expand_rules(constraints: &str) -> String {
  constraints.replace("MC_RULES", MC_RULES)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_category_has_its_own_template() {
    for category in Category::ALL {
      assert_eq!(template_for(category).category, category);
    }
  }

  #[test]
  fn test_only_general_quiz_is_free_text() {
    for t in TEMPLATES.iter() {
      let free = t.shape == OutputShape::FreeText;
      assert_eq!(free, t.category == Category::GeneralQuiz, "{:?}", t.category);
      assert_eq!(t.schema.is_empty(), free);
    }
  }

  #[test]
  fn test_structured_schemas_are_valid_json() {
    for t in TEMPLATES.iter().filter(|t| t.shape == OutputShape::StructuredJson) {
      let v: serde_json::Value = serde_json::from_str(t.schema).unwrap();
      assert!(v["questions"].is_array(), "{:?}", t.category);
    }
  }

  #[test]
  fn test_constraints_fill_tier_ceiling() {
    let t = template_for(Category::QuantitativeReasoning);
    assert!(t.constraints_for(DifficultyTier::Grade3).contains("1000"));
    assert!(!t.constraints_for(DifficultyTier::Grade2).contains("{max_number}"));
  }
}
