//! Subprocess-backed scrape core.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use super::{ScrapeConfig, ScrapeCore, ScrapeError, ScrapeRequest, ScrapeSummary, SummaryEvent};
use crate::task::TaskLog;

static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

const EXHAUSTION_MARKERS: &[&str] = &[
    "No space left on device",
    "Disk quota exceeded",
    "Too many open files",
    "Cannot allocate memory",
    "MemoryError",
];

/// Remove ANSI escape sequences.
pub fn strip_ansi(line: &str) -> String {
    ANSI_ESCAPE.replace_all(line, "").into_owned()
}

/// Deletes the per-task configuration file when the run ends, including
/// when the run future is dropped.
struct TaskConfigFile(PathBuf);

impl Drop for TaskConfigFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %self.0.display(), error = %e, "Failed to remove task config");
            }
        }
    }
}

#[derive(Default)]
struct RunState {
    summary: Option<ScrapeSummary>,
    exhaustion: Option<String>,
    last_error: Option<String>,
}

/// Runs an external program once per task.
///
/// The task's effective configuration is written to a JSON file whose path
/// is passed through the `{config}` argument placeholder. Stdout and stderr
/// lines stream into the task log; structured summary events are parsed
/// out of stdout. The child is killed when the run is dropped.
pub struct CommandScrapeCore {
    config: ScrapeConfig,
    identity_re: Option<Regex>,
}

impl CommandScrapeCore {
    pub fn new(config: ScrapeConfig) -> Self {
        let identity_re = config
            .identity_pattern
            .as_deref()
            .and_then(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "Ignoring invalid identity pattern");
                    None
                }
            });

        Self {
            config,
            identity_re,
        }
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    fn build_args(&self, config_path: &Path, paths: &[PathBuf]) -> Vec<String> {
        let config_arg = config_path.to_string_lossy();
        let input_arg = paths
            .first()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{config}", &config_arg)
                    .replace("{input}", &input_arg)
            })
            .collect()
    }

    async fn write_task_config(
        &self,
        request: &ScrapeRequest,
    ) -> Result<TaskConfigFile, ScrapeError> {
        tokio::fs::create_dir_all(&self.config.work_dir)
            .await
            .map_err(|e| {
                ScrapeError::Fatal(format!(
                    "cannot create work directory {}: {}",
                    self.config.work_dir.display(),
                    e
                ))
            })?;

        let path = self
            .config
            .work_dir
            .join(format!("task_{}.json", request.task_id));
        let encoded = serde_json::to_vec_pretty(&request.config)
            .map_err(|e| ScrapeError::Fatal(format!("cannot encode task config: {}", e)))?;

        tokio::fs::write(&path, encoded).await.map_err(|e| {
            if is_exhaustion_io(&e) {
                ScrapeError::ResourceExhausted(e.to_string())
            } else {
                ScrapeError::Fatal(format!("cannot write {}: {}", path.display(), e))
            }
        })?;

        Ok(TaskConfigFile(path))
    }

    fn handle_stdout(&self, raw: &str, log: &TaskLog, state: &mut RunState) {
        let line = visible_segment(raw);
        if let Some(pos) = line.find(&self.config.event_marker) {
            let payload = &line[pos + self.config.event_marker.len()..];
            match parse_event(payload) {
                Some(event) if event.is_title_summary() => {
                    state.summary = Some(event.into_summary());
                }
                Some(_) => {}
                None => debug!(line = %line, "Unparseable scrape event"),
            }
            return;
        }
        self.handle_output(line, log, state);
    }

    fn handle_output(&self, line: String, log: &TaskLog, state: &mut RunState) {
        if line.trim().is_empty() {
            return;
        }
        if let Some(marker) = EXHAUSTION_MARKERS.iter().find(|m| line.contains(*m)) {
            state.exhaustion = Some((*marker).to_string());
        }
        let lower = line.to_lowercase();
        if lower.contains("error") || lower.contains("exception") {
            state.last_error = Some(line.clone());
        }
        log.push(line);
    }
}

/// Progress bars redraw with carriage returns; keep what ends up visible.
fn visible_segment(raw: &str) -> String {
    let stripped = strip_ansi(raw);
    stripped
        .split('\r')
        .filter(|s| !s.trim().is_empty())
        .last()
        .unwrap_or("")
        .trim_end()
        .to_string()
}

fn parse_event(payload: &str) -> Option<SummaryEvent> {
    if let Ok(event) = serde_json::from_str(payload.trim()) {
        return Some(event);
    }
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&payload[start..=end]).ok()
}

/// One output line without its terminator, invalid UTF-8 replaced.
fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

fn is_exhaustion_io(e: &std::io::Error) -> bool {
    let message = e.to_string();
    EXHAUSTION_MARKERS.iter().any(|m| message.contains(m))
}

#[async_trait]
impl ScrapeCore for CommandScrapeCore {
    fn name(&self) -> &str {
        "command"
    }

    async fn run(
        &self,
        request: ScrapeRequest,
        log: Arc<TaskLog>,
    ) -> Result<ScrapeSummary, ScrapeError> {
        let config_file = self.write_task_config(&request).await?;
        let args = self.build_args(&config_file.0, &request.paths);

        debug!(
            task_id = %request.task_id,
            program = %self.config.program.display(),
            args = ?args,
            "Spawning scrape program"
        );

        let mut child = Command::new(&self.config.program)
            .args(&args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ScrapeError::Fatal(format!(
                        "scrape program not found: {}",
                        self.config.program.display()
                    ))
                } else {
                    ScrapeError::Io(e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ScrapeError::Fatal("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ScrapeError::Fatal("stderr not captured".to_string()))?;

        // Output is not guaranteed to be UTF-8 (file names in other
        // locales), so split raw bytes and decode lossily.
        let mut out_lines = BufReader::new(stdout).split(b'\n');
        let mut err_lines = BufReader::new(stderr).split(b'\n');
        let mut out_done = false;
        let mut err_done = false;
        let mut state = RunState::default();

        while !(out_done && err_done) {
            tokio::select! {
                line = out_lines.next_segment(), if !out_done => match line {
                    Ok(Some(raw)) => self.handle_stdout(&decode_line(&raw), &log, &mut state),
                    Ok(None) => out_done = true,
                    Err(e) => {
                        debug!(error = %e, "Scrape stdout closed with error");
                        out_done = true;
                    }
                },
                line = err_lines.next_segment(), if !err_done => match line {
                    Ok(Some(raw)) => {
                        let line = decode_line(&raw);
                        self.handle_output(visible_segment(&line), &log, &mut state)
                    }
                    Ok(None) => err_done = true,
                    Err(e) => {
                        debug!(error = %e, "Scrape stderr closed with error");
                        err_done = true;
                    }
                },
            }
        }

        let status = child.wait().await?;
        drop(config_file);

        if let Some(marker) = state.exhaustion {
            return Err(ScrapeError::ResourceExhausted(marker));
        }

        if !status.success() {
            let detail = state
                .last_error
                .unwrap_or_else(|| format!("scrape program exited with {}", status));
            return Err(ScrapeError::Domain(detail));
        }

        state.summary.ok_or_else(|| {
            ScrapeError::NoMatch(
                request
                    .paths
                    .first()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )
        })
    }

    fn supports_interrupt(&self) -> bool {
        true
    }

    fn identify(&self, paths: &[PathBuf]) -> Option<String> {
        let re = self.identity_re.as_ref()?;
        let stem = paths.iter().min()?.file_stem()?.to_string_lossy().into_owned();
        let caps = re.captures(&stem)?;
        caps.get(1)
            .or_else(|| caps.get(0))
            .map(|m| m.as_str().to_string())
    }
}
