use crate::config::variant::UiVariant;
use crate::launcher::{ LauncherConfig, LauncherError, LogView, Notice };

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::atomic::{ AtomicU64, Ordering };
use std::sync::Arc;
use std::time::Duration;
use log::{ debug, info, warn };
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio::process::{ Child, Command };
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{ sleep, timeout };

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const STDERR_TAIL_LINES: usize = 20;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

struct RunningApp {
    id: u64,
    variant: UiVariant,
    child: Child,
}

/// The last lines a child wrote to stderr, reported when it fails.
#[derive(Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
}

impl StderrTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == STDERR_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn text(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// The one tracked child process, shared by all launcher tasks.
#[derive(Clone, Default)]
pub struct AppSlot {
    inner: Arc<Mutex<Option<RunningApp>>>,
}

impl AppSlot {
    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn variant(&self) -> Option<UiVariant> {
        self.inner
            .lock().await
            .as_ref()
            .map(|app| app.variant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    Terminated,
    Killed,
}

pub fn child_args(variant: UiVariant) -> [String; 3] {
    ["serve".to_string(), "--variant".to_string(), variant.to_string()]
}

pub async fn start(
    slot: &AppSlot,
    config: &LauncherConfig,
    log: &Arc<LogView>,
    variant: UiVariant
) -> Result<(), LauncherError> {
    let mut guard = slot.inner.lock().await;
    if guard.is_some() {
        log.notice(Notice::Warning, "An application is already running.");
        return Err(LauncherError::AlreadyRunning);
    }

    log.log(format!("Starting the {} UI...", variant));
    let mut child = Command::new(&config.program)
        .args(child_args(variant))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| {
            log.log(format!("Failed to start the {} UI: {}", variant, source));
            LauncherError::Spawn { program: config.program.display().to_string(), source }
        })?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[ui] {}", line);
            }
        });
    }
    let stderr = child.stderr.take().map(|stderr| {
        tokio::spawn(async move {
            let mut tail = StderrTail::default();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[ui:stderr] {}", line);
                tail.push(line);
            }
            tail.text()
        })
    });

    let id = NEXT_RUN_ID.fetch_add(1, Ordering::SeqCst);
    info!("Started {} UI (pid {:?})", variant, child.id());
    *guard = Some(RunningApp { id, variant, child });
    drop(guard);

    log.log(format!("The {} UI is running.", variant));
    log.log(format!("Open {} in your browser.", config.app_url));

    tokio::spawn(monitor(slot.clone(), Arc::clone(log), id, variant, stderr));
    Ok(())
}

/// Watches the child until it exits on its own. Returns quietly when the
/// child was taken out of the slot by `stop`.
async fn monitor(
    slot: AppSlot,
    log: Arc<LogView>,
    id: u64,
    variant: UiVariant,
    stderr: Option<JoinHandle<String>>
) {
    let status = loop {
        sleep(POLL_INTERVAL).await;
        let mut guard = slot.inner.lock().await;
        let Some(app) = guard.as_mut().filter(|app| app.id == id) else {
            return;
        };
        match app.child.try_wait() {
            Ok(Some(status)) => {
                guard.take();
                break Ok(status);
            }
            Ok(None) => {}
            Err(e) => {
                guard.take();
                break Err(e);
            }
        }
    };

    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    match status {
        Ok(status) if status.success() => {
            log.log(format!("The {} UI exited normally.", variant));
        }
        Ok(status) => {
            warn!("{} UI exited with {}", variant, status);
            log.log(format!("The {} UI failed: {}", variant, stderr.trim()));
            log.notice(Notice::Error, format!("The {} UI exited with {}.", variant, status));
        }
        Err(e) => {
            log.log(format!("Lost track of the {} UI: {}", variant, e));
        }
    }
}

pub async fn stop(slot: &AppSlot, config: &LauncherConfig, log: &LogView) -> StopOutcome {
    let mut guard = slot.inner.lock().await;
    let Some(mut app) = guard.take() else {
        log.notice(Notice::Info, "No application is running.");
        return StopOutcome::NotRunning;
    };

    log.log("Stopping the application...");
    terminate(&mut app.child);

    match timeout(config.stop_timeout, app.child.wait()).await {
        Ok(_) => {
            log.log("The application stopped.");
            StopOutcome::Terminated
        }
        Err(_) => {
            warn!("{} UI ignored terminate; killing it", app.variant);
            let _ = app.child.kill().await;
            log.log("The application was force-killed.");
            StopOutcome::Killed
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{ kill, Signal };
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to pid {}: {}", pid, e);
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{ Path, PathBuf };

    fn script(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ui.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(program: PathBuf) -> LauncherConfig {
        let mut config = LauncherConfig::new(program);
        config.stop_timeout = Duration::from_secs(2);
        config
    }

    #[tokio::test]
    async fn stop_without_start_is_an_info_notice() {
        let slot = AppSlot::default();
        let log = LogView::new(false);
        let outcome = stop(&slot, &config(PathBuf::from("unused")), &log).await;

        assert_eq!(outcome, StopOutcome::NotRunning);
        assert_eq!(log.notices(), vec![(Notice::Info, "No application is running.".to_string())]);
    }

    #[tokio::test]
    async fn second_start_is_rejected_then_stop_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(script(dir.path(), "exec sleep 30"));
        let slot = AppSlot::default();
        let log = Arc::new(LogView::new(false));

        start(&slot, &config, &log, UiVariant::Basic).await.unwrap();
        assert_eq!(slot.variant().await, Some(UiVariant::Basic));

        let second = start(&slot, &config, &log, UiVariant::Advanced).await;
        assert!(matches!(second, Err(LauncherError::AlreadyRunning)));
        assert_eq!(log.notices()[0].0, Notice::Warning);
        assert_eq!(slot.variant().await, Some(UiVariant::Basic));

        assert_eq!(stop(&slot, &config, &log).await, StopOutcome::Terminated);
        assert!(!slot.is_running().await);
    }

    #[tokio::test]
    async fn ignoring_terminate_gets_killed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(script(dir.path(), "trap '' TERM\nwhile true; do sleep 1; done"));
        config.stop_timeout = Duration::from_millis(500);
        let slot = AppSlot::default();
        let log = Arc::new(LogView::new(false));

        start(&slot, &config, &log, UiVariant::Basic).await.unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(stop(&slot, &config, &log).await, StopOutcome::Killed);
    }

    #[tokio::test]
    async fn child_receives_serve_arguments_and_failure_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(script(dir.path(), "echo \"bad args: $*\" >&2\nexit 3"));
        let slot = AppSlot::default();
        let log = Arc::new(LogView::new(false));

        start(&slot, &config, &log, UiVariant::Advanced).await.unwrap();
        for _ in 0..50 {
            if !log.notices().is_empty() {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }

        assert!(!slot.is_running().await);
        assert!(log.contains("bad args: serve --variant advanced"));
        assert!(log.notices().iter().any(|(level, _)| *level == Notice::Error));
    }

    #[test]
    fn stderr_tail_keeps_only_the_last_lines() {
        let mut tail = StderrTail::default();
        for i in 1..=50 {
            tail.push(format!("err-{}", i));
        }
        let text = tail.text();
        assert_eq!(text.lines().count(), STDERR_TAIL_LINES);
        assert!(text.starts_with("err-31\n"));
        assert!(text.ends_with("err-50"));
    }

    #[tokio::test]
    async fn failure_reports_the_end_of_a_long_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(
            script(dir.path(), "i=1\nwhile [ $i -le 200 ]; do echo \"line-$i\" >&2; i=$((i+1)); done\nexit 1")
        );
        let slot = AppSlot::default();
        let log = Arc::new(LogView::new(false));

        start(&slot, &config, &log, UiVariant::Basic).await.unwrap();
        for _ in 0..50 {
            if !log.notices().is_empty() {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }

        let lines = log.lines();
        let failure = lines.iter().find(|l| l.contains("UI failed:")).unwrap();
        assert!(failure.contains("line-181"));
        assert!(failure.ends_with("line-200"));
        assert!(!failure.contains("line-180\n"));
        assert!(!failure.contains("line-1\n"));
    }

    #[tokio::test]
    async fn clean_exit_is_logged_as_normal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(script(dir.path(), "exit 0"));
        let slot = AppSlot::default();
        let log = Arc::new(LogView::new(false));

        start(&slot, &config, &log, UiVariant::Basic).await.unwrap();
        for _ in 0..50 {
            if log.contains("exited normally") {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
        assert!(log.contains("The basic UI exited normally."));
    }
}
