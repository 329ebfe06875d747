//! Rotating event log file
//!
//! The gateway task must never wait on disk, so the event file is written as:
//! - a bounded queue (non-blocking `try_send` from the reporter)
//! - a dedicated thread with buffered writes and periodic flush

use super::Event;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::{Duration, Instant};

/// Smallest file size before rotation
const MIN_FILE_BYTES: u64 = 1024;
const DEFAULT_FLUSH: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct EventLogConfig {
    pub path: PathBuf,
    pub max_bytes: u64,
    pub max_files: usize,
    pub flush_interval: Duration,
    pub channel_capacity: usize,
}

/// Start the writer thread and return the queue feeding it
///
/// The thread exits once every sender is dropped.
pub fn spawn_event_log(cfg: EventLogConfig) -> io::Result<SyncSender<Event>> {
    if let Some(parent) = cfg.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let (file, size) = open_append(&cfg.path)?;
    let (tx, rx) = sync_channel::<Event>(cfg.channel_capacity.max(1));

    thread::Builder::new()
        .name("tlm-gateway-event-log".to_string())
        .spawn(move || run_writer(rx, cfg, file, size))?;

    Ok(tx)
}

fn run_writer(rx: Receiver<Event>, cfg: EventLogConfig, file: File, start_size: u64) {
    let max_bytes = cfg.max_bytes.max(MIN_FILE_BYTES);
    let max_files = cfg.max_files.max(1);
    let flush_interval = if cfg.flush_interval.is_zero() {
        DEFAULT_FLUSH
    } else {
        cfg.flush_interval
    };

    let mut writer = BufWriter::new(file);
    let mut size = start_size;
    let mut dirty = false;
    let mut last_flush = Instant::now();

    loop {
        match rx.recv_timeout(flush_interval) {
            Ok(event) => {
                let line = event.to_string();
                if write_line(&mut writer, &line).is_ok() {
                    size = size.saturating_add(line.len() as u64 + 1);
                    dirty = true;
                }

                if size >= max_bytes {
                    let _ = writer.flush();
                    drop(writer);
                    let _ = rotate_files(&cfg.path, max_files);
                    match open_truncate(&cfg.path) {
                        Ok(f) => {
                            writer = BufWriter::new(f);
                            size = 0;
                            dirty = false;
                            last_flush = Instant::now();
                        }
                        Err(e) => {
                            tracing::warn!("Event log stopped, cannot reopen {}: {}", cfg.path.display(), e);
                            break;
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if dirty && last_flush.elapsed() >= flush_interval {
                    let _ = writer.flush();
                    dirty = false;
                    last_flush = Instant::now();
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = writer.flush();
                break;
            }
        }
    }
}

fn write_line(writer: &mut BufWriter<File>, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn open_append(path: &Path) -> io::Result<(File, u64)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    Ok((file, size))
}

fn open_truncate(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
}

/// Shift `name.N-1 -> name.N ... name -> name.1`, dropping the oldest
fn rotate_files(path: &Path, max_files: usize) -> io::Result<()> {
    if max_files == 0 {
        return Ok(());
    }

    let stem = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "events.log".to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let oldest = dir.join(format!("{}.{}", stem, max_files));
    let _ = fs::remove_file(&oldest);

    for i in (1..max_files).rev() {
        let src = dir.join(format!("{}.{}", stem, i));
        let dst = dir.join(format!("{}.{}", stem, i + 1));
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }

    if path.exists() {
        fs::rename(path, dir.join(format!("{}.1", stem)))?;
    }

    Ok(())
}
