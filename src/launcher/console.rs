use crate::config::variant::UiVariant;
use crate::launcher::{ Launcher, LauncherError };

use log::info;
use tokio::io::{ AsyncBufReadExt, BufReader };

pub const HELP: &str =
    "Commands:
  setup            create the environment and install packages
  install          install packages into the existing environment
  start basic      start the basic chat UI
  start advanced   start the advanced chat UI
  stop             stop the running UI
  open             open the chat UI in the browser
  status           show environment and process status
  help             show this help
  quit             stop the running UI and exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Setup,
    Install,
    Start(UiVariant),
    Stop,
    Open,
    Status,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let command = match word.to_ascii_lowercase().as_str() {
        "setup" => ConsoleCommand::Setup,
        "install" => ConsoleCommand::Install,
        "start" => {
            let variant = words.next().unwrap_or("basic");
            ConsoleCommand::Start(variant.parse::<UiVariant>().map_err(|e| e.to_string())?)
        }
        "stop" => ConsoleCommand::Stop,
        "open" => ConsoleCommand::Open,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => {
            return Err(format!("Unknown command '{}'. Type 'help' for a list.", other));
        }
    };
    Ok(Some(command))
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run(launcher: Launcher) -> Result<(), LauncherError> {
    let log = launcher.log().clone();
    log.log("Personal AI launcher started.");
    log.log("Checking the environment...");
    launcher.check_status();
    log.log("Ready. Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => dispatch(&launcher, command).await,
            Err(message) => println!("{}", message),
        }
    }

    info!("Launcher shutting down");
    if launcher.is_running().await {
        launcher.stop().await;
    }
    Ok(())
}

async fn dispatch(launcher: &Launcher, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Setup => launcher.spawn_create_env(),
        ConsoleCommand::Install => launcher.spawn_install(),
        ConsoleCommand::Start(variant) => launcher.spawn_start(variant),
        ConsoleCommand::Stop => launcher.spawn_stop(),
        ConsoleCommand::Open => launcher.spawn_open_browser(),
        ConsoleCommand::Status => {
            launcher.check_status();
            match launcher.running_variant().await {
                Some(variant) => launcher.log().log(format!("Running: {} UI", variant)),
                None => launcher.log().log("Waiting..."),
            }
        }
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse_command("  "), Ok(None));
        assert_eq!(parse_command("setup"), Ok(Some(ConsoleCommand::Setup)));
        assert_eq!(parse_command("START Advanced"), Ok(Some(ConsoleCommand::Start(UiVariant::Advanced))));
        assert_eq!(parse_command("start"), Ok(Some(ConsoleCommand::Start(UiVariant::Basic))));
        assert_eq!(parse_command("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert!(parse_command("start turbo").is_err());
        assert!(parse_command("launch").unwrap_err().contains("Unknown command 'launch'"));
    }
}
