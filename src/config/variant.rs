use serde::{ Deserialize, Serialize };
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::str::FromStr;
use thiserror::Error;
use log::info;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

#[derive(Debug, Error)]
pub enum VariantError {
    #[error("invalid UI variant: '{0}'")]
    Unknown(String),

    #[error("variant profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("variant profile '{0}' lists no models")]
    NoModels(String),

    #[error("variants file IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("variants JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UiVariant {
    Basic,
    Advanced,
}

impl UiVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            UiVariant::Basic => "basic",
            UiVariant::Advanced => "advanced",
        }
    }
}

impl fmt::Display for UiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UiVariant {
    type Err = VariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(UiVariant::Basic),
            "advanced" => Ok(UiVariant::Advanced),
            _ => Err(VariantError::Unknown(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Features {
    #[serde(default)]
    pub system_prompt: bool,
    #[serde(default)]
    pub file_upload: bool,
    #[serde(default)]
    pub image_analysis: bool,
}

/// Everything that distinguishes the basic chat page from the advanced one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VariantProfile {
    pub title: String,
    pub models: Vec<String>,
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub default_system_prompt: Option<String>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl VariantProfile {
    pub fn basic() -> Self {
        Self {
            title: "Personal AI Assistant".to_string(),
            models: vec!["gpt-3.5-turbo".to_string(), "gpt-4".to_string()],
            default_temperature: DEFAULT_TEMPERATURE,
            features: Features::default(),
            default_system_prompt: None,
        }
    }

    pub fn advanced() -> Self {
        Self {
            title: "Advanced Personal AI Assistant".to_string(),
            models: vec![
                "gpt-3.5-turbo".to_string(),
                "gpt-4".to_string(),
                "gpt-4-turbo-preview".to_string()
            ],
            default_temperature: DEFAULT_TEMPERATURE,
            features: Features {
                system_prompt: true,
                file_upload: true,
                image_analysis: true,
            },
            default_system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    pub fn builtin(variant: UiVariant) -> Self {
        match variant {
            UiVariant::Basic => Self::basic(),
            UiVariant::Advanced => Self::advanced(),
        }
    }

    pub fn default_model(&self) -> &str {
        self.models.first().map(String::as_str).unwrap_or("gpt-3.5-turbo")
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    fn validate(&self, name: &str) -> Result<(), VariantError> {
        if self.models.is_empty() {
            return Err(VariantError::NoModels(name.to_string()));
        }
        Ok(())
    }
}

/// Rounds to the slider's 0.1 step and clamps to the accepted range.
pub fn normalize_temperature(value: f32) -> f32 {
    if !value.is_finite() {
        return DEFAULT_TEMPERATURE;
    }
    let stepped = (value * 10.0).round() / 10.0;
    stepped.clamp(MIN_TEMPERATURE, MAX_TEMPERATURE)
}

pub fn parse_profiles(json: &str) -> Result<HashMap<UiVariant, VariantProfile>, VariantError> {
    let profiles: HashMap<UiVariant, VariantProfile> = serde_json::from_str(json)?;
    for (variant, profile) in &profiles {
        profile.validate(variant.as_str())?;
    }
    Ok(profiles)
}

/// Resolves the profile for `variant`, preferring an override file when given.
pub fn load_profile(variant: UiVariant, path: Option<&str>) -> Result<VariantProfile, VariantError> {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return Ok(VariantProfile::builtin(variant));
    };
    let file_content = fs::read_to_string(path)?;
    let mut profiles = parse_profiles(&file_content)?;
    info!("Loaded variant profiles from {}", path);
    profiles.remove(&variant).ok_or_else(|| VariantError::ProfileNotFound(variant.to_string()))
}
