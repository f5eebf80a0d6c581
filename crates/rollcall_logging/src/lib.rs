//! Shared logging setup for rollcall binaries.
//!
//! A station runs for a whole conference day, so the log file is cut per
//! calendar day (`rollcall.2025-03-04.log`) and only the most recent days are
//! kept. Stderr stays at `warn` unless `-v` is given, since scan feedback is
//! printed on stdout. `RUST_LOG` overrides the default filter.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "rollcall=info,rollcall_station=info,rollcall_db=info";
/// Days of log files kept on disk, one file per day.
const LOG_RETENTION_DAYS: usize = 7;

pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Log directory; defaults to `~/.rollcall/logs`.
    pub log_dir: Option<PathBuf>,
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the tracing subscriber: daily log file plus stderr.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = config
        .log_dir
        .unwrap_or_else(rollcall_protocol::paths::default_logs_dir);
    let daily = DailyLogFile::new(&log_dir, config.app_name, LOG_RETENTION_DAYS)
        .with_context(|| format!("Failed to open log directory {}", log_dir.display()))?;

    let console_filter = if config.verbose {
        default_filter()
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(daily))
                .with_ansi(false)
                .with_filter(default_filter()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Append-only log file that switches to a new file when the local date
/// changes and prunes all but the newest `keep` files.
struct DailyLogFile {
    dir: PathBuf,
    prefix: String,
    keep: usize,
    current: Option<(NaiveDate, File)>,
}

impl DailyLogFile {
    fn new(dir: &Path, app_name: &str, keep: usize) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: file_prefix(app_name),
            keep: keep.max(1),
            current: None,
        })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}.{}.log", self.prefix, date.format("%Y-%m-%d")))
    }

    fn file_for(&mut self, date: NaiveDate) -> io::Result<&mut File> {
        let rolled = !matches!(&self.current, Some((open, _)) if *open == date);
        if rolled {
            if let Some((_, mut previous)) = self.current.take() {
                let _ = previous.flush();
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(date))?;
            self.current = Some((date, file));
            if let Err(e) = self.prune() {
                eprintln!("Warning: could not prune old logs in {}: {}", self.dir.display(), e);
            }
        }
        match self.current.as_mut() {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file unavailable")),
        }
    }

    /// Dated names sort chronologically, so the oldest come first.
    fn prune(&self) -> io::Result<()> {
        let head = format!("{}.", self.prefix);
        let mut logs: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(&head) && n.ends_with(".log"))
            })
            .collect();
        if logs.len() <= self.keep {
            return Ok(());
        }
        logs.sort();
        let excess = logs.len() - self.keep;
        for old in logs.drain(..excess) {
            fs::remove_file(old)?;
        }
        Ok(())
    }

    fn write_on(&mut self, date: NaiveDate, buf: &[u8]) -> io::Result<usize> {
        self.file_for(date)?.write(buf)
    }
}

impl Write for DailyLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_on(Local::now().date_naive(), buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

fn file_prefix(app_name: &str) -> String {
    app_name
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => ch,
            _ => '_',
        })
        .collect()
}
