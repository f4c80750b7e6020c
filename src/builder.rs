//! Request builder: validated selection + randomness -> prompt payload.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, instrument};

use crate::config::{CountLimits, Prompts};
use crate::domain::{Category, DifficultyTier, GenerationRequest, OutputShape, PromptPayload};
use crate::errors::PipelineError;
use crate::templates::{expand_rules, template_for, STYLES};
use crate::util::fill_template;

/// Nonce range. Only uniqueness across calls matters.
const NONCE_MAX: u32 = 1_000_000;

/// Validate the raw selection and compose its payload in one step.
pub fn build<R: Rng + ?Sized>(
  topic: &str,
  tier: DifficultyTier,
  count: u32,
  category: Option<Category>,
  limits: &CountLimits,
  prompts: &Prompts,
  rng: &mut R,
) -> Result<(GenerationRequest, PromptPayload), PipelineError> {
  let request = GenerationRequest::validated(topic, tier, category, count, limits)?;
  let payload = compose_payload(&request, prompts, rng);
  Ok((request, payload))
}

#[instrument(
  level = "debug",
  skip(request, prompts, rng),
  fields(tier = request.tier().id(), category = request.category().id(), count = request.count())
)]
pub fn compose_payload<R: Rng + ?Sized>(
  request: &GenerationRequest,
  prompts: &Prompts,
  rng: &mut R,
) -> PromptPayload {
  let style: &'static str = STYLES.choose(rng).copied().unwrap_or(STYLES[0]);
  let nonce = rng.gen_range(1..=NONCE_MAX);

  let template = template_for(request.category());
  let count = request.count().to_string();
  let nonce_s = nonce.to_string();
  let level = request.tier().audience();

  let (system_instruction, user_instruction) = match template.shape {
    OutputShape::FreeText => {
      let user = fill_template(
        &prompts.quiz_user_template,
        &[
          ("topic", request.topic()),
          ("level", level),
          ("count", &count),
          ("style", style),
          ("nonce", &nonce_s),
        ],
      );
      (prompts.system.clone(), user)
    }
    OutputShape::StructuredJson => {
      let constraints = expand_rules(&template.constraints_for(request.tier()));
      let user = fill_template(
        &prompts.structured_user_template,
        &[
          ("task", template.task),
          ("topic", request.topic()),
          ("level", level),
          ("count", &count),
          ("style", style),
          ("nonce", &nonce_s),
          ("constraints", &constraints),
          ("schema", template.schema),
        ],
      );
      (prompts.structured_system.clone(), user)
    }
  };

  debug!(target: "quiz", %style, nonce, shape = ?template.shape, user_len = user_instruction.len(), "Prompt composed");

  PromptPayload {
    system_instruction,
    user_instruction,
    sampling: template.sampling(),
    shape: template.shape,
    style,
    nonce,
  }
}
