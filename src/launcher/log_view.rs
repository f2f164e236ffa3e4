use chrono::{ DateTime, Local };
use log::info;
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Info => write!(f, "info"),
            Notice::Warning => write!(f, "warning"),
            Notice::Error => write!(f, "error"),
        }
    }
}

/// The launcher's on-screen log. Every action appends `[HH:MM:SS] message`.
pub struct LogView {
    lines: Mutex<Vec<String>>,
    notices: Mutex<Vec<(Notice, String)>>,
    echo: bool,
}

pub fn format_line(at: DateTime<Local>, message: &str) -> String {
    format!("[{}] {}", at.format("%H:%M:%S"), message)
}

impl LogView {
    pub fn new(echo: bool) -> Self {
        Self { lines: Mutex::new(Vec::new()), notices: Mutex::new(Vec::new()), echo }
    }

    pub fn log(&self, message: impl AsRef<str>) {
        let line = format_line(Local::now(), message.as_ref());
        info!("{}", message.as_ref());
        if self.echo {
            println!("{}", line);
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }

    /// Pop-up style message. Also goes into the log.
    pub fn notice(&self, level: Notice, message: impl AsRef<str>) {
        let message = message.as_ref();
        self.log(format!("({}) {}", level, message));
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((level, message.to_string()));
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<(Notice, String)> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}
