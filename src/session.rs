use chrono::{ DateTime, Local };
use log::info;
use thiserror::Error;
use uuid::Uuid;

use crate::agent::ChatPhase;
use crate::config::variant::{ normalize_temperature, VariantProfile };
use crate::history;
use crate::models::chat::{ HistoryRecord, Turn };

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model '{0}' is not offered by this UI")]
    UnknownModel(String),

    #[error("system prompts are not enabled in this UI")]
    SystemPromptDisabled,

    #[error("export failed: {0}")]
    Export(#[from] history::ExportError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f32,
    /// Only present when the UI offers a system-prompt editor.
    pub system_prompt: Option<String>,
}

impl SessionSettings {
    pub fn from_profile(profile: &VariantProfile) -> Self {
        Self {
            model: profile.default_model().to_string(),
            temperature: normalize_temperature(profile.default_temperature),
            system_prompt: if profile.features.system_prompt {
                profile.default_system_prompt.clone().or_else(|| Some(String::new()))
            } else {
                None
            },
        }
    }
}

/// Lives as long as one browser session. Holds the turns replayed to the
/// model, the history records written by export, and the sidebar settings.
#[derive(Debug, Clone)]
pub struct SessionState {
    id: String,
    profile: VariantProfile,
    settings: SessionSettings,
    turns: Vec<Turn>,
    history: Vec<HistoryRecord>,
    phase: ChatPhase,
}

impl SessionState {
    pub fn new(profile: VariantProfile) -> Self {
        let settings = SessionSettings::from_profile(&profile);
        Self {
            id: Uuid::new_v4().to_string(),
            profile,
            settings,
            turns: Vec::new(),
            history: Vec::new(),
            phase: ChatPhase::Idle,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn profile(&self) -> &VariantProfile {
        &self.profile
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: ChatPhase) {
        self.phase = phase;
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn select_model(&mut self, model: &str) -> Result<(), SessionError> {
        if !self.profile.supports_model(model) {
            return Err(SessionError::UnknownModel(model.to_string()));
        }
        self.settings.model = model.to_string();
        Ok(())
    }

    /// Returns the value actually stored after clamping.
    pub fn set_temperature(&mut self, temperature: f32) -> f32 {
        self.settings.temperature = normalize_temperature(temperature);
        self.settings.temperature
    }

    pub fn apply_system_prompt(&mut self, prompt: &str) -> Result<(), SessionError> {
        if !self.profile.features.system_prompt {
            return Err(SessionError::SystemPromptDisabled);
        }
        self.settings.system_prompt = Some(prompt.to_string());
        Ok(())
    }

    /// Turns as sent to the model: the applied system prompt (if any) first,
    /// then the conversation in order.
    pub fn request_turns(&self) -> Vec<Turn> {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        if let Some(prompt) = self.settings.system_prompt.as_deref() {
            if !prompt.trim().is_empty() {
                turns.push(Turn::system(prompt));
            }
        }
        turns.extend(self.turns.iter().cloned());
        turns
    }

    pub fn record_exchange(&mut self, user_message: &str, ai_response: &str, at: DateTime<Local>) {
        self.history.push(HistoryRecord {
            timestamp: at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            user_message: user_message.to_string(),
            ai_response: ai_response.to_string(),
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            system_prompt: self.settings.system_prompt.clone(),
        });
    }

    /// Clears turns and history; settings survive.
    pub fn reset(&mut self) {
        info!("Session {} reset ({} turns, {} records)", self.id, self.turns.len(), self.history.len());
        self.turns.clear();
        self.history.clear();
    }

    /// `Ok(None)` when there is nothing to export yet.
    pub fn export(
        &self,
        dir: &std::path::Path,
        at: DateTime<Local>
    ) -> Result<Option<std::path::PathBuf>, SessionError> {
        if self.history.is_empty() {
            return Ok(None);
        }
        let path = history::export_history(&self.history, dir, at)?;
        Ok(Some(path))
    }
}
