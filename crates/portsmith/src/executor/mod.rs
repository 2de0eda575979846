use std::collections::BTreeMap;
use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

/// Environment handed to a child process. It fully replaces the inherited environment.
pub type EnvMap = BTreeMap<String, String>;

pub fn process_env() -> EnvMap {
    std::env::vars().collect()
}

#[derive(Debug, Clone)]
pub enum ExecEvent {
    StepStarted {
        title: String,
    },
    StepLog {
        title: String,
        line: String,
    },
    StepFinished {
        title: String,
        ok: bool,
        error: Option<String>,
        elapsed_ms: u128,
    },
}

pub trait ExecSink: Send + Sync {
    fn emit(&self, ev: ExecEvent);
}

#[derive(Default)]
pub struct StdoutSink {
    quiet: bool,
}

impl StdoutSink {
    // Only step titles and failures are printed.
    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

impl ExecSink for StdoutSink {
    fn emit(&self, ev: ExecEvent) {
        match ev {
            ExecEvent::StepStarted { title } => println!("{title}"),
            ExecEvent::StepLog { line, .. } => {
                if !self.quiet {
                    println!("{line}");
                }
            }
            ExecEvent::StepFinished {
                title,
                ok,
                error,
                elapsed_ms,
            } => {
                if ok {
                    tracing::debug!(step = %title, elapsed_ms, "step finished");
                } else {
                    println!(
                        "FAIL: {title} ({elapsed_ms}ms) {}",
                        error.unwrap_or_default()
                    );
                }
            }
        }
    }
}

/// Keeps every event in memory; used by tests and by callers that want a transcript.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExecEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ExecEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn started_titles(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|ev| match ev {
                ExecEvent::StepStarted { title } => Some(title),
                _ => None,
            })
            .collect()
    }
}

impl ExecSink for RecordingSink {
    fn emit(&self, ev: ExecEvent) {
        if let Ok(mut g) = self.events.lock() {
            g.push(ev);
        }
    }
}

/// One external command run as a lifecycle step.
#[derive(Debug, Clone)]
pub struct Step {
    pub title: String,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: EnvMap,
    pub log_path: Option<PathBuf>,
    // Continue the log file instead of starting it over.
    pub append_log: bool,
}

impl Step {
    pub fn new(title: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: process_env(),
            log_path: None,
            append_log: false,
        }
    }

    /// Run `script` through the platform shell.
    pub fn shell(title: impl Into<String>, script: &str) -> Self {
        #[cfg(unix)]
        {
            Self::new(title, "sh").args(["-c", script])
        }
        #[cfg(not(unix))]
        {
            Self::new(title, "cmd").args(["/C", script])
        }
    }

    pub fn arg(mut self, a: impl Into<String>) -> Self {
        self.args.push(a.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, env: &EnvMap) -> Self {
        self.env = env.clone();
        self
    }

    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn append_log(mut self) -> Self {
        self.append_log = true;
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Default)]
struct SharedExecState {
    // Running child process group ids, killed on cancellation.
    child_pgroups: Mutex<BTreeMap<u32, String>>,
}

#[derive(Clone)]
pub struct ExecCtx {
    pub dry_run: bool,
    pub cancel: Arc<AtomicBool>,
    pub sink: Arc<dyn ExecSink>,
    shared: Arc<SharedExecState>,
}

impl ExecCtx {
    pub fn new(dry_run: bool, sink: Arc<dyn ExecSink>) -> Self {
        Self {
            dry_run,
            cancel: Arc::new(AtomicBool::new(false)),
            sink,
            shared: Arc::new(SharedExecState::default()),
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
        self.kill_running_children();
    }

    fn register_child_pgroup(&self, pgid: u32, title: &str) {
        if let Ok(mut g) = self.shared.child_pgroups.lock() {
            g.insert(pgid, title.to_string());
        }
    }

    fn unregister_child_pgroup(&self, pgid: u32) {
        if let Ok(mut g) = self.shared.child_pgroups.lock() {
            g.remove(&pgid);
        }
    }

    pub fn kill_running_children(&self) {
        let pgids: Vec<u32> = self
            .shared
            .child_pgroups
            .lock()
            .ok()
            .map(|g| g.keys().copied().collect())
            .unwrap_or_default();
        for pgid in pgids {
            kill_pgroup(pgid, false);
            kill_pgroup(pgid, true);
        }
    }

    /// Run a step to completion. Output goes to the sink (sanitized) and to the step log (raw).
    pub fn run(&self, step: Step) -> Result<()> {
        if self.cancelled() {
            return Err(Error::msg("cancelled"));
        }
        let title = step.title.clone();
        self.sink.emit(ExecEvent::StepStarted {
            title: title.clone(),
        });
        let started = Instant::now();
        let res = self.run_inner(&step);
        self.sink.emit(ExecEvent::StepFinished {
            title,
            ok: res.is_ok(),
            error: res.as_ref().err().map(|e| e.to_string()),
            elapsed_ms: started.elapsed().as_millis(),
        });
        res
    }

    fn run_inner(&self, step: &Step) -> Result<()> {
        let mut log = match &step.log_path {
            Some(p) => Some(open_step_log(p, step)?),
            None => None,
        };

        if self.dry_run {
            self.sink.emit(ExecEvent::StepLog {
                title: step.title.clone(),
                line: format!("DRY-RUN: {}", step.command_line()),
            });
            return Ok(());
        }

        let mut cmd = Command::new(&step.program);
        cmd.args(&step.args).env_clear().envs(&step.env);
        if let Some(dir) = &step.cwd {
            cmd.current_dir(dir);
        }

        // Own process group so cancellation reaches the whole subtree.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    if libc::setpgid(0, 0) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                    Ok(())
                });
            }
        }

        tracing::debug!(step = %step.title, command = %step.command_line(), "spawning");
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::msg(format!("spawn {} failed: {e}", step.program)))?;
        let pgid = child.id();
        self.register_child_pgroup(pgid, &step.title);

        let (tx, rx) = mpsc::channel::<String>();
        if let Some(out) = child.stdout.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(out, tx));
        }
        if let Some(err) = child.stderr.take() {
            let tx = tx.clone();
            std::thread::spawn(move || read_output_stream(err, tx));
        }
        drop(tx);

        for raw in rx {
            if let Some(f) = log.as_mut() {
                let _ = writeln!(f, "{raw}");
            }
            let line = sanitize_log_line(&raw);
            if !line.is_empty() {
                self.sink.emit(ExecEvent::StepLog {
                    title: step.title.clone(),
                    line,
                });
            }
            if self.cancelled() {
                kill_pgroup(pgid, false);
                kill_pgroup(pgid, true);
                break;
            }
        }

        let status = child
            .wait()
            .map_err(|e| Error::msg(format!("wait failed: {e}")))?;
        self.unregister_child_pgroup(pgid);
        if !status.success() {
            let hint = step
                .log_path
                .as_ref()
                .map(|p| format!(" (see {})", p.display()))
                .unwrap_or_default();
            return Err(Error::msg(format!("command failed: {status}{hint}")));
        }
        Ok(())
    }
}

/// Run a command and return trimmed stdout. No sink, no log file.
pub fn capture(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::null());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    let out = cmd
        .output()
        .map_err(|e| Error::msg(format!("spawn {program} failed: {e}")))?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::msg(format!(
            "{program} {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

fn open_step_log(path: &Path, step: &Step) -> Result<fs::File> {
    if let Some(parent) = path.parent() {
        crate::util::ensure_dir(parent)?;
    }
    let mut f = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(step.append_log)
        .truncate(!step.append_log)
        .open(path)
        .map_err(|e| Error::msg(format!("failed to create log {}: {e}", path.display())))?;
    let mut header = String::new();
    if step.append_log {
        header.push('\n');
    }
    header.push_str("# environment\n");
    for (k, v) in &step.env {
        header.push_str(&format!("{k}={v}\n"));
    }
    if let Some(dir) = &step.cwd {
        header.push_str(&format!("\n# cwd\n{}\n", dir.display()));
    }
    header.push_str(&format!("\n# command\n{}\n\n# output\n", step.command_line()));
    f.write_all(header.as_bytes())
        .map_err(|e| Error::msg(format!("failed to write log {}: {e}", path.display())))?;
    Ok(f)
}

fn kill_pgroup(pgid: u32, force: bool) {
    #[cfg(unix)]
    {
        let sig = if force { libc::SIGKILL } else { libc::SIGTERM };
        // Negative PID targets the whole process group.
        let _ = unsafe { libc::kill(-(pgid as i32), sig) };
    }
    #[cfg(not(unix))]
    {
        let _ = (pgid, force);
    }
}

fn read_output_stream<R: Read>(reader: R, tx: mpsc::Sender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::<u8>::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &chunk[..n] {
            // Progress output rewrites the line with '\r'; treat it as a line break.
            if b == b'\n' || b == b'\r' {
                if !buf.is_empty() {
                    let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                    buf.clear();
                }
            } else {
                buf.push(b);
            }
        }
    }
    if !buf.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    }
}
