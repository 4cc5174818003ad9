use anyhow::Result;
use chrono::{Local, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::LogConfig;

pub const LOG_FILE_NAME: &str = "catalog_lineage.log";

/// Installs the global subscriber: stdout plus a log file rotated daily,
/// gzipped once archived and pruned to `max_log_files`.
///
/// The returned guard flushes the file layer on drop and must be kept alive
/// for as long as the process logs.
pub fn init_logging(config: &LogConfig) -> Result<(Arc<Mutex<RotatingLog>>, WorkerGuard)> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log = RotatingLog::open(&config.log_dir, config.max_log_files)?;
    prune_archives(log.dir(), config.max_log_files)?;
    let state = Arc::new(Mutex::new(log));

    let (non_blocking, guard) = tracing_appender::non_blocking(SharedLogWriter {
        state: state.clone(),
    });

    let log_level = config
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(io::stdout))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok((state, guard))
}

/// Checks once a minute whether the active file belongs to a past day.
pub fn start_log_maintenance(state: Arc<Mutex<RotatingLog>>) {
    use tokio::time::{sleep, Duration};

    actix_web::rt::spawn(async move {
        loop {
            sleep(Duration::from_secs(60)).await;
            let mut log = match state.lock() {
                Ok(guard) => guard,
                Err(_) => {
                    tracing::warn!("Log writer state poisoned");
                    continue;
                }
            };
            if let Err(e) = log.ensure_current() {
                tracing::warn!("Failed to rotate active log file: {}", e);
            }
        }
    });
}

struct SharedLogWriter {
    state: Arc<Mutex<RotatingLog>>,
}

impl Write for SharedLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut log = self
            .state
            .lock()
            .map_err(|_| io::Error::other("log writer poisoned"))?;
        log.ensure_current().map_err(io::Error::other)?;
        log.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut log = self
            .state
            .lock()
            .map_err(|_| io::Error::other("log writer poisoned"))?;
        log.file.flush()
    }
}

/// The active log file and the day it collects entries for.
pub struct RotatingLog {
    dir: PathBuf,
    active_path: PathBuf,
    file: File,
    current_date: NaiveDate,
    max_files: usize,
}

impl RotatingLog {
    pub fn open(dir: impl AsRef<Path>, max_files: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let active_path = dir.join(LOG_FILE_NAME);
        let file = append_to(&active_path)?;

        // A non-empty file left by a previous run belongs to the day it was
        // last written.
        let mut current_date = Local::now().date_naive();
        let metadata = fs::metadata(&active_path)?;
        if metadata.len() > 0 {
            if let Ok(modified) = metadata.modified() {
                current_date = chrono::DateTime::<Local>::from(modified).date_naive();
            }
        }

        let mut log = Self {
            dir,
            active_path,
            file,
            current_date,
            max_files,
        };
        log.ensure_current()?;
        Ok(log)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn ensure_current(&mut self) -> Result<()> {
        self.ensure_current_at(Local::now().date_naive())
    }

    /// Rotates if `today` differs from the day of the active file.
    pub fn ensure_current_at(&mut self, today: NaiveDate) -> Result<()> {
        if today != self.current_date {
            self.rotate_to(today)?;
        }
        Ok(())
    }

    fn rotate_to(&mut self, new_date: NaiveDate) -> Result<()> {
        if !self.active_path.exists() {
            self.file = append_to(&self.active_path)?;
            self.current_date = new_date;
            return Ok(());
        }

        self.file.flush()?;
        let archive = archive_path(&self.dir, self.current_date);
        fs::rename(&self.active_path, &archive)?;
        self.file = append_to(&self.active_path)?;

        compress(&archive)?;
        prune_archives(&self.dir, self.max_files)?;

        self.current_date = new_date;
        Ok(())
    }
}

fn append_to(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn archive_path(dir: &Path, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}.{}", LOG_FILE_NAME, date.format("%Y-%m-%d")))
}

/// Replaces `path` with `path.gz`.
fn compress(path: &Path) -> Result<()> {
    let contents = fs::read(path)?;

    let mut gz_path = path.as_os_str().to_owned();
    gz_path.push(".gz");
    let mut encoder = GzEncoder::new(File::create(&gz_path)?, Compression::default());
    encoder.write_all(&contents)?;
    encoder.finish()?;

    fs::remove_file(path)?;
    Ok(())
}

/// Compresses leftover plain archives and keeps the newest `max_files`.
pub fn prune_archives(dir: &Path, max_files: usize) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let prefix = format!("{}.", LOG_FILE_NAME);

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(&prefix) && !name.ends_with(".gz") {
            if let Err(e) = compress(&path) {
                tracing::warn!("Failed to compress log file {:?}: {}", path, e);
            }
        }
    }

    // Archive names embed the date, so name order is age order.
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .collect();
    archives.sort_unstable_by(|a, b| b.cmp(a));

    for path in archives.iter().skip(max_files) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
