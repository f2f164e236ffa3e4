pub mod console;
pub mod env;
pub mod log_view;
pub mod process;

pub use log_view::{ LogView, Notice };

use crate::config::variant::UiVariant;
use env::CommandSpec;
use process::{ AppSlot, StopOutcome };

use std::path::{ Path, PathBuf };
use std::sync::Arc;
use std::time::Duration;
use log::{ error, info };
use thiserror::Error;

pub const DEFAULT_ENV_DIR: &str = "personal-ai-env";
pub const DEFAULT_APP_URL: &str = "http://localhost:8501";
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PACKAGES: &[&str] = &["openai>=1.0.0", "python-dotenv", "requests", "Pillow"];

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("an application is already running")]
    AlreadyRunning,

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("could not open the browser: {0}")]
    Browser(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct LauncherConfig {
    /// Executable started as `<program> serve --variant <v>`.
    pub program: PathBuf,
    pub env_dir: PathBuf,
    pub python: String,
    pub packages: Vec<String>,
    pub app_url: String,
    pub stop_timeout: Duration,
    /// Where `.env` is looked up by the start-up check.
    pub work_dir: PathBuf,
}

impl LauncherConfig {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            env_dir: PathBuf::from(DEFAULT_ENV_DIR),
            python: "python3".to_string(),
            packages: DEFAULT_PACKAGES.iter().map(|p| p.to_string()).collect(),
            app_url: DEFAULT_APP_URL.to_string(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            work_dir: PathBuf::from("."),
        }
    }

    pub fn create_env_command(&self) -> CommandSpec {
        CommandSpec::new(&self.python, ["-m", "venv"]).arg(self.env_dir.display().to_string())
    }

    pub fn pip_path(&self) -> PathBuf {
        env::env_tool(&self.env_dir, "pip")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvStatus {
    pub env_dir_exists: bool,
    pub dotenv_exists: bool,
}

/// Prepares the environment, runs one chat UI child at a time and opens the
/// browser. Console actions run as their own tasks and report to the `LogView`.
#[derive(Clone)]
pub struct Launcher {
    config: Arc<LauncherConfig>,
    log: Arc<LogView>,
    app: AppSlot,
}

impl Launcher {
    pub fn new(config: LauncherConfig, log: Arc<LogView>) -> Self {
        Self { config: Arc::new(config), log, app: AppSlot::default() }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<LogView> {
        &self.log
    }

    /// Logs whether the environment directory and `.env` file are present.
    pub fn check_status(&self) -> EnvStatus {
        let status = EnvStatus {
            env_dir_exists: self.config.env_dir.exists(),
            dotenv_exists: self.config.work_dir.join(".env").exists(),
        };
        if status.env_dir_exists {
            self.log.log(format!("Environment found at {}.", self.config.env_dir.display()));
        } else {
            self.log.log("No environment yet. Run 'setup' to create one.");
        }
        if status.dotenv_exists {
            self.log.log(".env file found.");
        } else {
            self.log.log("No .env file. Add OPENAI_API_KEY to a .env file.");
        }
        status
    }

    pub async fn is_running(&self) -> bool {
        self.app.is_running().await
    }

    pub async fn running_variant(&self) -> Option<UiVariant> {
        self.app.variant().await
    }

    pub async fn create_env(&self) -> Result<env::InstallReport, LauncherError> {
        env::create_env(&self.config, &self.log).await
    }

    pub async fn install_packages(&self) -> Result<env::InstallReport, LauncherError> {
        env::install_packages(&self.config, &self.log).await
    }

    pub async fn start(&self, variant: UiVariant) -> Result<(), LauncherError> {
        process::start(&self.app, &self.config, &self.log, variant).await
    }

    pub async fn stop(&self) -> StopOutcome {
        process::stop(&self.app, &self.config, &self.log).await
    }

    pub async fn open_browser(&self) -> Result<(), LauncherError> {
        open_browser(&self.config.app_url, &self.log).await
    }

    // Fire-and-forget variants used by the console.

    pub fn spawn_create_env(&self) {
        let launcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = launcher.create_env().await {
                launcher.log.notice(Notice::Error, format!("Environment setup failed: {}", e));
            }
        });
    }

    pub fn spawn_install(&self) {
        let launcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = launcher.install_packages().await {
                launcher.log.notice(Notice::Error, format!("Package installation failed: {}", e));
            }
        });
    }

    pub fn spawn_start(&self, variant: UiVariant) {
        let launcher = self.clone();
        tokio::spawn(async move {
            match launcher.start(variant).await {
                Ok(()) | Err(LauncherError::AlreadyRunning) => {}
                Err(e) => launcher.log.notice(Notice::Error, format!("Failed to start the {} UI: {}", variant, e)),
            }
        });
    }

    pub fn spawn_stop(&self) {
        let launcher = self.clone();
        tokio::spawn(async move {
            launcher.stop().await;
        });
    }

    pub fn spawn_open_browser(&self) {
        let launcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = launcher.open_browser().await {
                launcher.log.notice(Notice::Error, e.to_string());
            }
        });
    }
}

pub async fn open_browser(url: &str, log: &LogView) -> Result<(), LauncherError> {
    let target = url.to_string();
    let opened = tokio::task
        ::spawn_blocking(move || webbrowser::open(&target)).await
        .map_err(|e| LauncherError::Browser(e.to_string()))?;
    match opened {
        Ok(()) => {
            info!("Opened {}", url);
            log.log("Opened the browser.");
            Ok(())
        }
        Err(e) => {
            error!("Failed to open {}: {}", url, e);
            log.log(format!("Failed to open the browser: {}", e));
            Err(LauncherError::Browser(e.to_string()))
        }
    }
}

/// Program used for the child when none is configured: this executable.
pub fn default_program() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| Path::new("personal-ai").to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_reports_missing_and_present_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LauncherConfig::new(PathBuf::from("personal-ai"));
        config.env_dir = dir.path().join("env");
        config.work_dir = dir.path().to_path_buf();

        let launcher = Launcher::new(config.clone(), Arc::new(LogView::new(false)));
        let status = launcher.check_status();
        assert!(!status.env_dir_exists);
        assert!(!status.dotenv_exists);
        assert!(launcher.log().contains("Run 'setup'"));

        std::fs::create_dir(&config.env_dir).unwrap();
        std::fs::write(dir.path().join(".env"), "OPENAI_API_KEY=x\n").unwrap();
        let status = launcher.check_status();
        assert!(status.env_dir_exists && status.dotenv_exists);
        assert!(launcher.log().contains(".env file found."));
    }

    #[test]
    fn create_command_targets_env_dir() {
        let config = LauncherConfig::new(PathBuf::from("personal-ai"));
        let cmd = config.create_env_command();
        assert_eq!(cmd.to_string(), "python3 -m venv personal-ai-env");
    }
}
