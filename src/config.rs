//! Loading service configuration (completion endpoint, count limits, session
//! capacity, secrets location, prompt overrides) from TOML.
//!
//! Every section is optional. Expected schema:
//!
//! ```toml
//! [openai]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//!
//! [limits]
//! min_count = 3
//! max_count = 10
//!
//! [sessions]
//! max_sessions = 10000
//!
//! [secrets]
//! path = "secrets.toml"
//!
//! [prompts]
//! system = "..."
//! ```

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub openai: OpenAiCfg,
  #[serde(default)]
  pub limits: CountLimits,
  #[serde(default)]
  pub sessions: SessionsCfg,
  #[serde(default)]
  pub secrets: SecretsCfg,
  #[serde(default)]
  pub prompts: Prompts,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OpenAiCfg {
  pub base_url: String,
  pub model: String,
}

impl Default for OpenAiCfg {
  fn default() -> Self {
    Self { base_url: "https://api.openai.com/v1".into(), model: "gpt-4o-mini".into() }
  }
}

/// Closed range of accepted question counts.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CountLimits {
  pub min_count: u32,
  pub max_count: u32,
  /// Values offered by the count slider.
  pub suggested: Vec<u32>,
}

impl Default for CountLimits {
  fn default() -> Self {
    Self { min_count: 3, max_count: 10, suggested: vec![3, 5, 7, 10] }
  }
}

impl CountLimits {
  pub fn contains(&self, count: u32) -> bool {
    (self.min_count..=self.max_count).contains(&count)
  }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionsCfg {
  /// Upper bound on remembered sessions; the least recently written one is
  /// evicted when a new session would exceed it.
  pub max_sessions: usize,
}

impl Default for SessionsCfg {
  fn default() -> Self {
    Self { max_sessions: 10_000 }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
#[serde(default)]
pub struct SecretsCfg {
  /// Flat TOML file of secrets; environment variables are consulted after it.
  pub path: Option<String>,
}

/// Prompts sent to the model. Defaults target Hebrew-speaking children; any of
/// them can be overridden in TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub system: String,
  pub structured_system: String,
  /// Placeholders: {topic} {level} {count} {style} {nonce}
  pub quiz_user_template: String,
  /// Placeholders: {task} {topic} {level} {count} {style} {nonce} {constraints} {schema}
  pub structured_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system: "אתה מומחה ליצירת תוכן חינוכי לילדים בעברית. אתה יצירתי, חביב, ויודע להתאים את השפה לגיל הילדים. כל מבחן שאתה יוצר הוא ייחודי ומקורי.".into(),
      structured_system: "אתה מומחה ליצירת תוכן חינוכי לילדים בעברית. אתה יצירתי, חביב, ויודע להתאים את השפה לגיל הילדים. אתה מחזיר אך ורק JSON תקין, ללא טקסט נוסף.".into(),
      quiz_user_template: r#"אתה מורה חביב ויצירתי שמכין מבחנים מהנים לילדים.

הנחיות חשובות:
- הנושא: {topic}
- רמת הקושי מותאמת ל{level}
- מספר שאלות: {count}
- סגנון: {style}
- מזהה ייחודי: #{nonce}

כללים:
1. כתוב בעברית פשוטה וברורה
2. כל שאלה חייבת להיות שונה לחלוטין
3. הוסף אימוג׳ים רלוונטיים לכל שאלה 🌟
4. השאלות צריכות להיות מעניינות ומהנות
5. התאם את המורכבות לגיל הילדים
6. אל תחזור על דפוסים - היה יצירתי!

פורמט התשובה:
שאלה 1: [תוכן השאלה עם אימוג׳י]

שאלה 2: [תוכן השאלה עם אימוג׳י]

(וכן הלאה...)

צור {count} שאלות ייחודיות, מקוריות ומהנות על הנושא "{topic}":"#.into(),
      structured_user_template: r#"אתה מורה חביב ויצירתי שמכין תרגולים מהנים לילדים.

משימה: {task}

הנחיות חשובות:
- הנושא: {topic}
- רמת הקושי מותאמת ל{level}
- מספר שאלות: {count}
- סגנון: {style}
- מזהה ייחודי: #{nonce}

כללים:
{constraints}

החזר JSON בלבד, בדיוק במבנה הבא:
{schema}"#.into(),
    }
  }
}

/// Attempt to load `AppConfig` from QUIZ_CONFIG_PATH, then apply env overrides.
/// On any IO/parse error the defaults are used.
pub fn load_config_from_env() -> AppConfig {
  let mut cfg = match std::env::var("QUIZ_CONFIG_PATH") {
    Ok(path) => match std::fs::read_to_string(&path) {
      Ok(s) => match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => {
          info!(target: "quiz_wizard", %path, "Loaded config (TOML)");
          cfg
        }
        Err(e) => {
          error!(target: "quiz_wizard", %path, error = %e, "Failed to parse TOML config; using defaults");
          AppConfig::default()
        }
      },
      Err(e) => {
        error!(target: "quiz_wizard", %path, error = %e, "Failed to read TOML config file; using defaults");
        AppConfig::default()
      }
    },
    Err(_) => AppConfig::default(),
  };

  if let Ok(url) = std::env::var("OPENAI_BASE_URL") { cfg.openai.base_url = url; }
  if let Ok(model) = std::env::var("OPENAI_MODEL") { cfg.openai.model = model; }
  if let Ok(path) = std::env::var("QUIZ_SECRETS_PATH") { cfg.secrets.path = Some(path); }

  if cfg.limits.min_count == 0 || cfg.limits.min_count > cfg.limits.max_count {
    error!(target: "quiz_wizard", min = cfg.limits.min_count, max = cfg.limits.max_count, "Invalid count limits; using defaults");
    cfg.limits = CountLimits::default();
  }
  if cfg.sessions.max_sessions == 0 {
    error!(target: "quiz_wizard", "max_sessions must be positive; using default");
    cfg.sessions = SessionsCfg::default();
  }
  cfg
}
