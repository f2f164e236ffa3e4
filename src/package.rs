use crate::launcher::env::CommandSpec;
use crate::launcher::LauncherError;

use std::fs;
use std::path::{ Path, PathBuf };
use log::{ error, info, warn };
use thiserror::Error;

pub const DEFAULT_PACKAGE_NAME: &str = "PersonalAI_Launcher";
pub const DEFAULT_DIST_DIR: &str = "dist";
const OPTIONAL_FILES: &[&str] = &["icon.ico", ".env"];

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("packaging tool could not be installed: {0}")]
    ToolInstall(#[source] LauncherError),

    #[error("build failed: {0}")]
    Build(#[source] LauncherError),

    #[error("built binary not found at {0}")]
    MissingBinary(PathBuf),

    #[error("failed to stage {path}: {source}")]
    Stage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PackageConfig {
    pub project_dir: PathBuf,
    /// Probed with `--version`.
    pub tool: String,
    pub tool_install: CommandSpec,
    pub build_args: Vec<String>,
    /// Path of the build output, relative to `project_dir`.
    pub built_binary: PathBuf,
    pub package_name: String,
    pub dist_dir: PathBuf,
}

impl PackageConfig {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            tool: "cargo".to_string(),
            tool_install: CommandSpec::new("rustup", ["toolchain", "install", "stable"]),
            build_args: ["build", "--release", "--bin", "personal-ai"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            built_binary: PathBuf::from("target").join("release").join(exe_name("personal-ai")),
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            dist_dir: PathBuf::from(DEFAULT_DIST_DIR),
        }
    }

    fn dist_path(&self) -> PathBuf {
        self.project_dir.join(&self.dist_dir)
    }
}

fn exe_name(stem: &str) -> String {
    format!("{}{}", stem, std::env::consts::EXE_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub binary: PathBuf,
    pub extras: Vec<PathBuf>,
}

/// Installs the packaging tool when `<tool> --version` does not succeed.
pub async fn ensure_tool(config: &PackageConfig) -> Result<(), PackageError> {
    let probe = CommandSpec::new(config.tool.as_str(), ["--version"]);
    if probe.run().await.is_ok() {
        info!("{} is already installed", config.tool);
        return Ok(());
    }

    warn!("{} is not installed; running {}", config.tool, config.tool_install);
    config.tool_install.run().await.map_err(PackageError::ToolInstall)?;
    info!("{} installed", config.tool);
    Ok(())
}

pub async fn build(config: &PackageConfig) -> Result<(), PackageError> {
    let command = CommandSpec::new(config.tool.as_str(), config.build_args.iter().map(String::as_str)).in_dir(
        &config.project_dir
    );
    info!("Building: {}", command);
    command.run().await.map_err(PackageError::Build)?;
    Ok(())
}

/// Copies the build output into the dist directory, plus `icon.ico` and
/// `.env` when they exist next to the project.
pub fn stage(config: &PackageConfig) -> Result<PackageReport, PackageError> {
    let source = config.project_dir.join(&config.built_binary);
    if !source.is_file() {
        return Err(PackageError::MissingBinary(source));
    }

    let dist = config.dist_path();
    fs::create_dir_all(&dist).map_err(|e| stage_error(&dist, e))?;

    let binary = dist.join(exe_name(&config.package_name));
    fs::copy(&source, &binary).map_err(|e| stage_error(&binary, e))?;

    let mut extras = Vec::new();
    for name in OPTIONAL_FILES {
        let path = config.project_dir.join(name);
        if !path.exists() {
            info!("{} not found; skipping", name);
            continue;
        }
        let target = dist.join(name);
        fs::copy(&path, &target).map_err(|e| stage_error(&target, e))?;
        extras.push(target);
    }

    Ok(PackageReport { binary, extras })
}

fn stage_error(path: &Path, source: std::io::Error) -> PackageError {
    PackageError::Stage { path: path.to_path_buf(), source }
}

async fn pipeline(config: &PackageConfig) -> Result<PackageReport, PackageError> {
    ensure_tool(config).await?;
    build(config).await?;
    stage(config)
}

/// Builds a release binary of the launcher and stages it for distribution.
pub async fn run(config: &PackageConfig) -> Result<PackageReport, PackageError> {
    info!("Packaging {}", config.package_name);
    let result = pipeline(config).await;

    match &result {
        Ok(report) => {
            info!("Build complete: {}", report.binary.display());
            for extra in &report.extras {
                info!("Included {}", extra.display());
            }
        }
        Err(e) => error!("Packaging failed: {}", e),
    }
    result
}
