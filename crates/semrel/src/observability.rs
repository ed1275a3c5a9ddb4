//! Structured JSONL logging for a semrel invocation.
//!
//! Every record carries the run id and subcommand, so the lines of one
//! release can be pulled out of a shared daily log with a single filter.
//! Records go to a daily-rolling file, or to stderr when no writable location
//! exists. Stdout carries command output only (`--json` results, release
//! notes piped into other tools), so nothing here writes to it.

use anyhow::Result;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Event;
use tracing::field::{Field, Visit};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "SEMREL_LOG_PATH";
const ENV_LOG_DIR: &str = "SEMREL_LOG_DIR";
const LOG_FILE: &str = "semrel.jsonl";

/// Identity stamped on every log record of one invocation.
#[derive(Clone, Debug)]
pub struct RunInfo {
    /// `<utc timestamp>-<pid>`, unique per invocation on one host.
    pub run_id: String,
    /// The subcommand being run.
    pub command: &'static str,
}

impl RunInfo {
    /// Stamps a new run of `command`.
    pub fn new(command: &'static str) -> Self {
        let started = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        Self {
            run_id: format!("{started}-{}", std::process::id()),
            command,
        }
    }
}

/// Where log records should go, in priority order.
#[derive(Clone, Debug, Default)]
pub struct LogSources {
    /// `SEMREL_LOG_PATH`: an exact file.
    pub path: Option<PathBuf>,
    /// `SEMREL_LOG_DIR`: a directory for `semrel.jsonl`.
    pub dir: Option<PathBuf>,
    /// `log_dir` from the configuration.
    pub config_dir: Option<PathBuf>,
}

impl LogSources {
    /// Reads the environment overrides on top of the configured directory.
    pub fn from_env(config_dir: Option<PathBuf>) -> Self {
        Self {
            path: std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
            dir: std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
            config_dir,
        }
    }

    /// First usable log file. When an explicit source is set but unwritable
    /// the default locations are not tried.
    fn resolve(&self) -> Result<LogFile, String> {
        if let Some(path) = &self.path {
            return LogFile::at_path(path);
        }
        if let Some(dir) = self.dir.as_ref().or(self.config_dir.as_ref()) {
            return LogFile::in_dir(dir);
        }

        let mut candidates = Vec::new();
        if cfg!(unix) {
            candidates.push(PathBuf::from("/var/log"));
        }
        if let Some(dirs) = directories::ProjectDirs::from("", "", "semrel") {
            candidates.push(dirs.data_local_dir().join("logs"));
        }
        if let Ok(dir) = std::env::current_dir() {
            candidates.push(dir);
        }

        candidates
            .iter()
            .find_map(|dir| LogFile::in_dir(dir).ok())
            .ok_or_else(|| "no writable log directory found".to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogFile {
    dir: PathBuf,
    name: String,
}

impl LogFile {
    fn in_dir(dir: &Path) -> Result<Self, String> {
        let file = Self {
            dir: dir.to_path_buf(),
            name: LOG_FILE.to_string(),
        };
        file.touch()?;
        Ok(file)
    }

    fn at_path(path: &Path) -> Result<Self, String> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("{ENV_LOG_PATH} must end in a UTF-8 file name"))?;
        let file = Self {
            dir: path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf(),
            name: name.to_string(),
        };
        file.touch()?;
        Ok(file)
    }

    fn touch(&self) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("failed to create log directory {}: {e}", self.dir.display()))?;
        let path = self.dir.join(&self.name);
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("failed to open log file {}: {e}", path.display()))?;
        Ok(())
    }
}

/// Flushes buffered records on drop; hold it until `main` returns.
pub struct LogGuard {
    _worker: tracing_appender::non_blocking::WorkerGuard,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Currently infallible: an unusable log location falls back to stderr.
pub fn init_logging(run: RunInfo, sources: &LogSources, filter: EnvFilter) -> Result<LogGuard> {
    let (writer, worker) = match sources.resolve() {
        Ok(file) => tracing_appender::non_blocking(tracing_appender::rolling::daily(
            &file.dir, &file.name,
        )),
        Err(err) => {
            eprintln!("Warning: {err}. Falling back to stderr logging.");
            tracing_appender::non_blocking(std::io::stderr())
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(JsonLines { run, writer })
        .init();

    tracing::debug!("logging initialized");
    Ok(LogGuard { _worker: worker })
}

/// Build an `EnvFilter` based on CLI flags and environment.
///
/// Priority: quiet flag > verbose flag > RUST_LOG env > configured level
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// One JSON object per event. Span fields are not copied; the enclosing
/// span names go in `span` (`cmd_release:execute`).
struct JsonLines<W> {
    run: RunInfo,
    writer: W,
}

impl<S, W> tracing_subscriber::Layer<S> for JsonLines<W>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let meta = event.metadata();
        let mut record = Map::new();
        let ts = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        record.insert("ts".into(), ts.into());
        record.insert("level".into(), meta.level().as_str().to_lowercase().into());
        record.insert("run".into(), self.run.run_id.clone().into());
        record.insert("command".into(), self.run.command.into());
        record.insert("target".into(), meta.target().into());

        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            record.insert("span".into(), spans.join(":").into());
        }

        event.record(&mut FieldMap(&mut record));

        let Ok(mut line) = serde_json::to_vec(&record) else {
            return;
        };
        line.push(b'\n');
        let _ = self.writer.make_writer().write_all(&line);
    }
}

struct FieldMap<'a>(&'a mut Map<String, Value>);

impl Visit for FieldMap<'_> {
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().into(), format!("{value:?}").into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'w> MakeWriter<'w> for Captured {
        type Writer = Self;

        fn make_writer(&'w self) -> Self::Writer {
            self.clone()
        }
    }

    fn records(run: RunInfo, emit: impl FnOnce()) -> Vec<Value> {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(JsonLines {
            run,
            writer: captured.clone(),
        });
        tracing::subscriber::with_default(subscriber, emit);

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn records_carry_run_and_command() {
        let run = RunInfo::new("release");
        let run_id = run.run_id.clone();

        let lines = records(run, || {
            let span = tracing::info_span!("cmd_release", dry_run = true);
            let _entered = span.enter();
            tracing::warn!(step = 2, tag = "v1.2.0", halted = true, "step failed");
        });

        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["run"], run_id.as_str());
        assert_eq!(line["command"], "release");
        assert_eq!(line["level"], "warn");
        assert_eq!(line["span"], "cmd_release");
        assert_eq!(line["message"], "step failed");
        assert_eq!(line["step"], 2);
        assert_eq!(line["tag"], "v1.2.0");
        assert_eq!(line["halted"], true);
        assert!(line.get("dry_run").is_none());
        assert!(line["ts"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn nested_spans_are_joined() {
        let lines = records(RunInfo::new("lint"), || {
            let outer = tracing::info_span!("cmd_lint");
            let _outer = outer.enter();
            let inner = tracing::info_span!("classify");
            let _inner = inner.enter();
            tracing::info!("checked");
        });
        assert_eq!(lines[0]["span"], "cmd_lint:classify");
    }

    #[test]
    fn run_id_embeds_the_process() {
        let run = RunInfo::new("analyze");
        assert!(run.run_id.ends_with(&format!("-{}", std::process::id())));
        assert!(run.run_id.contains('T'));
    }

    #[test]
    fn env_filter_quiet_overrides() {
        assert_eq!(env_filter(true, 2, "info").to_string(), "error");
    }

    #[test]
    fn env_filter_verbose_maps_to_debug_and_trace() {
        assert_eq!(env_filter(false, 1, "info").to_string(), "debug");
        assert_eq!(env_filter(false, 3, "info").to_string(), "trace");
    }

    #[test]
    fn path_source_wins() {
        let dir = tempfile::tempdir().unwrap();
        let sources = LogSources {
            path: Some(dir.path().join("custom.jsonl")),
            dir: Some(dir.path().join("ignored")),
            config_dir: None,
        };
        let file = sources.resolve().unwrap();
        assert_eq!(file.dir, dir.path());
        assert_eq!(file.name, "custom.jsonl");
        assert!(!dir.path().join("ignored").exists());
    }

    #[test]
    fn env_dir_beats_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let sources = LogSources {
            path: None,
            dir: Some(dir.path().join("env")),
            config_dir: Some(dir.path().join("config")),
        };
        let file = sources.resolve().unwrap();
        assert_eq!(file.dir, dir.path().join("env"));
        assert_eq!(file.name, LOG_FILE);
        assert!(dir.path().join("env").join(LOG_FILE).exists());
    }

    #[test]
    fn config_dir_is_used_without_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let sources = LogSources {
            config_dir: Some(dir.path().to_path_buf()),
            ..LogSources::default()
        };
        assert_eq!(sources.resolve().unwrap().dir, dir.path());
    }

    #[test]
    fn unwritable_explicit_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let sources = LogSources {
            dir: Some(blocker.join("logs")),
            ..LogSources::default()
        };
        assert!(sources.resolve().is_err());
    }
}
