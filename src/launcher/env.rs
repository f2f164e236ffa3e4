use crate::launcher::{ LauncherConfig, LauncherError, LogView, Notice };

use std::fmt;
use std::path::{ Path, PathBuf };
use std::process::{ Output, Stdio };
use log::{ info, warn };
use tokio::process::Command;

/// A program and its arguments, run to completion with captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
        where I: IntoIterator<Item = S>, S: Into<String>
    {
        Self { program: program.into(), args: args.into_iter().map(Into::into).collect(), dir: None }
    }

    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub async fn output(&self) -> Result<Output, LauncherError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null());
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }
        command
            .output().await
            .map_err(|source| LauncherError::Spawn { program: self.program.clone(), source })
    }

    /// Runs the command and fails on a non-zero exit.
    pub async fn run(&self) -> Result<Output, LauncherError> {
        let output = self.output().await?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(LauncherError::CommandFailed {
                command: self.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Path of an executable inside the environment directory.
pub fn env_tool(env_dir: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("Scripts").join(name)
    } else {
        env_dir.join("bin").join(name)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
}

/// Creates the environment, then installs the package list into it.
pub async fn create_env(config: &LauncherConfig, log: &LogView) -> Result<InstallReport, LauncherError> {
    log.log("Creating the environment...");
    let command = config.create_env_command();
    info!("Running: {}", command);

    if let Err(e) = command.run().await {
        log.log(format!("Environment creation failed: {}", e));
        return Err(e);
    }
    log.log("Environment created.");
    install_packages(config, log).await
}

/// One install command per package. A failing package is logged and skipped.
pub async fn install_packages(config: &LauncherConfig, log: &LogView) -> Result<InstallReport, LauncherError> {
    log.log("Installing packages...");
    let pip = config.pip_path().display().to_string();
    let mut report = InstallReport::default();

    for package in &config.packages {
        log.log(format!("Installing: {}", package));
        let command = CommandSpec::new(pip.as_str(), ["install", package.as_str()]);
        let output = match command.output().await {
            Ok(output) => output,
            Err(e) => {
                log.log(format!("Package installation aborted: {}", e));
                return Err(e);
            }
        };
        if output.status.success() {
            log.log(format!("Installed {}", package));
            report.installed.push(package.clone());
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("pip install {} failed: {}", package, stderr.trim());
            log.log(format!("Failed to install {}: {}", package, stderr.trim()));
            report.failed.push(package.clone());
        }
    }

    if report.failed.is_empty() {
        log.log("Package installation finished.");
    } else {
        log.notice(
            Notice::Warning,
            format!("Package installation finished with {} failure(s).", report.failed.len())
        );
    }
    Ok(report)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_script(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn config_in(dir: &Path) -> LauncherConfig {
        let mut config = LauncherConfig::new(PathBuf::from("personal-ai"));
        config.env_dir = dir.join("env");
        config.packages = vec!["good".into(), "bad".into(), "also-good".into()];
        config
    }

    #[tokio::test]
    async fn install_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        write_script(
            &config.pip_path(),
            "if [ \"$2\" = bad ]; then echo 'no such package' >&2; exit 1; fi\nexit 0"
        );

        let log = LogView::new(false);
        let report = install_packages(&config, &log).await.unwrap();

        assert_eq!(report.installed, vec!["good", "also-good"]);
        assert_eq!(report.failed, vec!["bad"]);
        assert!(log.contains("Failed to install bad: no such package"));
        assert_eq!(log.notices()[0].0, Notice::Warning);
    }

    #[tokio::test]
    async fn failed_creation_does_not_install() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.python = "false".into();

        let log = LogView::new(false);
        let err = create_env(&config, &log).await.unwrap_err();

        assert!(matches!(err, LauncherError::CommandFailed { .. }));
        assert!(log.contains("Environment creation failed"));
        assert!(!log.contains("Installing packages"));
    }

    #[tokio::test]
    async fn missing_pip_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let log = LogView::new(false);
        assert!(matches!(install_packages(&config, &log).await, Err(LauncherError::Spawn { .. })));
    }
}
