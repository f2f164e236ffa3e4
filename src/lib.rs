pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod launcher;
pub mod llm;
pub mod models;
pub mod package;
pub mod server;
pub mod session;
pub mod upload;

use agent::ChatAgent;
use cli::{ Cli, Command, LaunchArgs, PackageArgs, ServeArgs };
use config::variant::load_profile;
use error::AppError;
use launcher::{ Launcher, LauncherConfig, LogView };
use llm::LlmConfig;
use log::info;
use package::PackageConfig;
use server::{ AppState, Server };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    match cli.command {
        Some(Command::Serve(args)) => run_server(args).await,
        Some(Command::Package(args)) => Ok(run_package(args).await?),
        Some(Command::Launch(args)) => Ok(run_launcher(args).await?),
        None => Ok(run_launcher(cli.launch).await?),
    }
}

pub fn llm_config(args: &ServeArgs) -> LlmConfig {
    LlmConfig {
        api_key: Some(args.openai_api_key.clone()).filter(|k| !k.trim().is_empty()),
        base_url: args.openai_base_url.clone(),
        vision_model: args.vision_model.clone(),
        image_max_tokens: args.image_max_tokens,
    }
}

/// Builds the shared state for one chat UI from its command-line options.
pub fn app_state(args: &ServeArgs) -> Result<AppState, AppError> {
    let llm_config = llm_config(args);
    let chat_client = llm::chat::new_client(&llm_config)?;
    let profile = load_profile(args.variant, args.variants_path.as_deref())?;

    Ok(AppState {
        agent: ChatAgent::new(llm_config, chat_client),
        variant: args.variant,
        profile: Arc::new(profile),
        export_dir: args.export_dir.clone(),
    })
}

pub async fn run_server(args: ServeArgs) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("UI Variant: {}", args.variant);
    info!("Variants Path: {}", args.variants_path.as_deref().unwrap_or("(built-in)"));
    info!("Export Directory: {}", args.export_dir.display());
    info!("OpenAI Base URL: {}", args.openai_base_url);
    info!("OpenAI API Key: {}", if args.openai_api_key.trim().is_empty() { "not set" } else { "set" });
    info!("Vision Model: {}", args.vision_model);
    info!("Image Max Tokens: {}", args.image_max_tokens);
    info!("-------------------------");

    let state = app_state(&args)?;
    info!("Starting server on: {}", args.server_addr);
    let server = Server::bind(&args.server_addr, state).await?;
    server.run().await?;

    Ok(())
}

pub async fn run_launcher(args: LaunchArgs) -> Result<(), AppError> {
    let mut config = LauncherConfig::new(args.program.unwrap_or_else(launcher::default_program));
    config.env_dir = args.env_dir;
    config.python = args.python;
    config.app_url = args.app_url;
    config.stop_timeout = Duration::from_secs(args.stop_timeout_secs);

    info!("--- Core Configuration ---");
    info!("Chat UI Program: {}", config.program.display());
    info!("Environment Directory: {}", config.env_dir.display());
    info!("Environment Python: {}", config.python);
    info!("App URL: {}", config.app_url);
    info!("Stop Timeout: {:?}", config.stop_timeout);
    info!("-------------------------");

    let app_launcher = Launcher::new(config, Arc::new(LogView::new(true)));
    launcher::console::run(app_launcher).await?;
    Ok(())
}

pub async fn run_package(args: PackageArgs) -> Result<(), AppError> {
    let mut config = PackageConfig::new(args.project_dir);
    config.package_name = args.name;
    config.dist_dir = args.dist_dir;

    let report = package::run(&config).await?;
    println!("Build complete. Run {}", report.binary.display());
    Ok(())
}
