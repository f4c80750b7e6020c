//! Application state: config, prompts, secret store, completion client, and
//! the per-session "last result" slots.
//!
//! Each session owns exactly one slot. A successful run replaces it wholesale;
//! failed runs never touch it. The number of slots is capped; storing a new
//! session into a full map evicts the least recently written one.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::{load_config_from_env, AppConfig};
use crate::domain::{Category, DifficultyTier, GenerationRequest, QuestionSet};
use crate::openai::{CompletionClient, OpenAI};
use crate::secrets::{ChainSecrets, EnvSecrets, FileSecrets, SecretStore};

/// The latest successful run of a session.
#[derive(Clone, Debug, PartialEq)]
pub struct LastResult {
    pub topic: String,
    pub tier: DifficultyTier,
    pub category: Category,
    pub count: u32,
    pub set: QuestionSet,
}

impl LastResult {
    pub fn new(request: &GenerationRequest, set: QuestionSet) -> Self {
        Self {
            topic: request.topic().to_string(),
            tier: request.tier(),
            category: request.category(),
            count: request.count(),
            set,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub last: Option<LastResult>,
}

/// Session slots bounded at `capacity`, ordered by last write.
#[derive(Debug)]
pub struct SessionSlots {
    capacity: usize,
    tick: u64,
    slots: HashMap<String, (u64, SessionContext)>,
    order: BTreeMap<u64, String>,
}

impl SessionSlots {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            slots: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionContext> {
        self.slots.get(session_id).map(|(_, ctx)| ctx)
    }

    /// Write the session's slot and mark it most recent. Returns the id of the
    /// session evicted to make room, if any.
    pub fn store(&mut self, session_id: &str, result: LastResult) -> Option<String> {
        self.tick += 1;
        let tick = self.tick;

        if let Some((seq, ctx)) = self.slots.get_mut(session_id) {
            self.order.remove(&*seq);
            *seq = tick;
            ctx.last = Some(result);
            self.order.insert(tick, session_id.to_string());
            return None;
        }

        let evicted = if self.slots.len() >= self.capacity {
            self.order.pop_first().map(|(_, oldest)| {
                self.slots.remove(&oldest);
                oldest
            })
        } else {
            None
        };

        self.slots.insert(session_id.to_string(), (tick, SessionContext { last: Some(result) }));
        self.order.insert(tick, session_id.to_string());
        evicted
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub secrets: Arc<dyn SecretStore>,
    pub client: Arc<dyn CompletionClient>,
    pub sessions: Arc<RwLock<SessionSlots>>,
}

impl AppState {
    /// Build state from env: load config, wire the secret chain, init the OpenAI client.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let config = load_config_from_env();

        let mut stores: Vec<Box<dyn SecretStore>> = Vec::new();
        if let Some(path) = &config.secrets.path {
            stores.push(Box::new(FileSecrets::load(path)));
        }
        stores.push(Box::new(EnvSecrets));

        let openai = OpenAI::new(&config.openai);
        info!(target: "quiz_wizard", base_url = %openai.base_url, model = %openai.model, min_count = config.limits.min_count, max_count = config.limits.max_count, "Completion client configured");

        Self::new(config, Arc::new(ChainSecrets(stores)), Arc::new(openai))
    }

    pub fn new(config: AppConfig, secrets: Arc<dyn SecretStore>, client: Arc<dyn CompletionClient>) -> Self {
        let sessions = SessionSlots::new(config.sessions.max_sessions);
        Self {
            config,
            secrets,
            client,
            sessions: Arc::new(RwLock::new(sessions)),
        }
    }

    /// Reuse the given session id or mint a fresh one.
    pub fn session_id(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    /// Replace the session's slot with a new result.
    #[instrument(level = "debug", skip(self, result), fields(%session_id))]
    pub async fn store_result(&self, session_id: &str, result: LastResult) {
        let mut sessions = self.sessions.write().await;
        if let Some(evicted) = sessions.store(session_id, result) {
            debug!(target: "quiz_wizard", %evicted, sessions = sessions.len(), "Session capacity reached; evicted oldest");
        }
    }

    #[instrument(level = "debug", skip(self), fields(%session_id))]
    pub async fn last_result(&self, session_id: &str) -> Option<LastResult> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).and_then(|s| s.last.clone())
    }
}
