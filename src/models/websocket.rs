use serde::{ Serialize, Deserialize };

use super::chat::{ HistoryRecord, Turn };

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "chat")] Chat {
        content: String,
    },
    #[serde(rename = "settings")] Settings {
        model: String,
        temperature: f32,
    },
    #[serde(rename = "system_prompt")] SystemPrompt {
        content: String,
    },
    #[serde(rename = "upload")] Upload {
        file_name: String,
        mime_type: String,
        /// Base64 of the raw file bytes.
        data: String,
    },
    #[serde(rename = "reset")]
    Reset,
    #[serde(rename = "export")]
    Export,
    #[serde(rename = "state")]
    State,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "processing")]
    Processing,
    /// Accumulated reply so far, not the latest fragment alone.
    #[serde(rename = "partial")] Partial {
        content: String,
    },
    #[serde(rename = "done")] Done {
        content: String,
        timestamp: i64,
    },
    #[serde(rename = "error")] Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        hint: Option<String>,
    },
    #[serde(rename = "notice")] Notice {
        level: NoticeLevel,
        message: String,
    },
    #[serde(rename = "state")] State {
        session_id: String,
        model: String,
        temperature: f32,
        system_prompt: Option<String>,
        turns: Vec<Turn>,
        history: Vec<HistoryRecord>,
    },
    #[serde(rename = "exported")] Exported {
        path: String,
        records: usize,
    },
}

impl ServerMessage {
    pub fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        ServerMessage::Notice { level, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error { message: message.into(), hint: None }
    }
}
