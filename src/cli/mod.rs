use clap::{ Args, Parser, Subcommand };
use std::path::PathBuf;

use crate::config::variant::UiVariant;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Defaults to `launch` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub launch: LaunchArgs,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve the chat UI.
    Serve(ServeArgs),
    /// Interactive launcher for setting up the environment and starting the chat UI.
    Launch(LaunchArgs),
    /// Build a release binary and stage it into the dist directory.
    Package(PackageArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    // --- Server Args ---
    /// Address the chat UI listens on
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8501")]
    pub server_addr: String,

    /// Which chat UI to serve (basic, advanced)
    #[arg(long, env = "UI_VARIANT", default_value = "basic")]
    pub variant: UiVariant,

    /// Optional JSON file overriding the built-in variant profiles
    #[arg(long, env = "VARIANTS_PATH")]
    pub variants_path: Option<String>,

    /// Directory that conversation exports are written to
    #[arg(long, env = "EXPORT_DIR", default_value = ".")]
    pub export_dir: PathBuf,

    // --- LLM Provider Args ---
    /// API key for the OpenAI-compatible provider. Empty disables chat.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = crate::llm::DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Model used for image analysis
    #[arg(long, env = "VISION_MODEL", default_value = crate::llm::DEFAULT_VISION_MODEL)]
    pub vision_model: String,

    /// Reply length cap for image analysis
    #[arg(long, env = "IMAGE_MAX_TOKENS", default_value_t = crate::llm::DEFAULT_IMAGE_MAX_TOKENS)]
    pub image_max_tokens: u32,
}

#[derive(Args, Debug, Clone)]
pub struct LaunchArgs {
    /// Environment directory created by `setup`
    #[arg(long, env = "ENV_DIR", default_value = crate::launcher::DEFAULT_ENV_DIR)]
    pub env_dir: PathBuf,

    /// Interpreter used to create the environment
    #[arg(long, env = "ENV_PYTHON", default_value = "python3")]
    pub python: String,

    /// Address opened in the browser
    #[arg(long, env = "APP_URL", default_value = crate::launcher::DEFAULT_APP_URL)]
    pub app_url: String,

    /// Seconds to wait after terminate before killing the chat UI
    #[arg(long, env = "STOP_TIMEOUT_SECS", default_value_t = 5)]
    pub stop_timeout_secs: u64,

    /// Program started as `<program> serve --variant <v>`. Defaults to this executable.
    #[arg(long, env = "APP_PROGRAM")]
    pub program: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// Project directory to build
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Name of the staged binary
    #[arg(long, env = "PACKAGE_NAME", default_value = crate::package::DEFAULT_PACKAGE_NAME)]
    pub name: String,

    /// Output directory, relative to the project directory
    #[arg(long, env = "DIST_DIR", default_value = crate::package::DEFAULT_DIST_DIR)]
    pub dist_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_parses_variant_and_defaults() {
        let cli = Cli::try_parse_from(["personal-ai", "serve", "--variant", "advanced"]).unwrap();
        let Some(Command::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.variant, UiVariant::Advanced);
        assert_eq!(args.vision_model, "gpt-4-vision-preview");
        assert_eq!(args.image_max_tokens, 1000);
    }

    #[test]
    fn rejects_unknown_variant() {
        assert!(Cli::try_parse_from(["personal-ai", "serve", "--variant", "pro"]).is_err());
    }

    #[test]
    fn launcher_options_work_without_subcommand() {
        let cli = Cli::try_parse_from(["personal-ai", "--stop-timeout-secs", "2"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.launch.stop_timeout_secs, 2);
        assert_eq!(cli.launch.app_url, "http://localhost:8501");
    }

    #[test]
    fn launch_subcommand_takes_launcher_options() {
        let cli = Cli::try_parse_from(["personal-ai", "launch", "--env-dir", "x", "--python", "python3.11"]).unwrap();
        let Some(Command::Launch(args)) = cli.command else {
            panic!("expected launch");
        };
        assert_eq!(args.env_dir, PathBuf::from("x"));
        assert_eq!(args.python, "python3.11");
        assert_eq!(args.stop_timeout_secs, 5);
    }
}
