use thiserror::Error;

use crate::config::variant::VariantError;
use crate::launcher::LauncherError;
use crate::llm::LlmError;
use crate::package::PackageError;
use crate::session::SessionError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("variant error: {0}")]
    Variant(#[from] VariantError),

    #[error("launcher error: {0}")]
    Launcher(#[from] LauncherError),

    #[error("packaging error: {0}")]
    Package(#[from] PackageError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}
