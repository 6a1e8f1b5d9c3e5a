use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const DEFAULT_LOG_FILTER: &str = "warn,paperchat=info";
// Diagnostics live below the transcript directory, not beside `<name>.log` snapshots.
const DEFAULT_LOG_FILE_PATH: &str = "logs/diagnostics/paperchat.log";
const FALLBACK_FILE_NAME: &str = "paperchat.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogOutput {
    Stderr,
    File,
    Both,
}

impl LogOutput {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("file") => Self::File,
            Some("both") => Self::Both,
            _ => Self::Stderr,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Both => "both",
        }
    }
}

/// Where and how diagnostics are written. Unknown values fall back to
/// pretty output on stderr.
#[derive(Clone, Debug, PartialEq, Eq)]
struct LogSettings {
    format: LogFormat,
    output: LogOutput,
    file_path: PathBuf,
}

impl LogSettings {
    fn from_env_with<F>(get_var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let file_path = get_var("LOG_FILE_PATH")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE_PATH));

        Self {
            format: LogFormat::parse(get_var("LOG_FORMAT").as_deref()),
            output: LogOutput::parse(get_var("LOG_OUTPUT").as_deref()),
            file_path,
        }
    }
}

fn open_rolling_file(path: &Path) -> io::Result<(BoxMakeWriter, WorkerGuard)> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| std::ffi::OsStr::new(FALLBACK_FILE_NAME));

    fs::create_dir_all(dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));
    Ok((BoxMakeWriter::new(writer), guard))
}

/// Picks the writer for `settings`. A file that cannot be opened degrades to
/// stderr with a warning printed directly, since no subscriber exists yet.
fn make_writer(settings: &LogSettings) -> (BoxMakeWriter, Option<WorkerGuard>) {
    if settings.output == LogOutput::Stderr {
        return (BoxMakeWriter::new(io::stderr), None);
    }

    match open_rolling_file(&settings.file_path) {
        Ok((file, guard)) if settings.output == LogOutput::Both => {
            (BoxMakeWriter::new(io::stderr.and(file)), Some(guard))
        }
        Ok((file, guard)) => (file, Some(guard)),
        Err(err) => {
            let fallback = if settings.output == LogOutput::Both {
                "using stderr only"
            } else {
                "using stderr instead"
            };
            eprintln!(
                "paperchat: failed to initialize LOG_OUTPUT={} at '{}': {err}; {fallback}",
                settings.output.label(),
                settings.file_path.display(),
            );
            (BoxMakeWriter::new(io::stderr), None)
        }
    }
}

/// Installs the global subscriber from `LOG_FORMAT`, `LOG_OUTPUT`,
/// `LOG_FILE_PATH` and `RUST_LOG`. Calling it twice is harmless.
pub fn init() {
    let settings = LogSettings::from_env_with(|key| env::var(key).ok());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (writer, guard) = make_writer(&settings);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = match settings.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    match installed {
        Ok(()) => {
            if let Some(guard) = guard {
                let _ = LOG_GUARD.set(guard);
            }
        }
        Err(err) => eprintln!("paperchat: logging already initialized: {err}"),
    }
}
