use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Extension of archived recordings
const ARCHIVE_EXTENSION: &str = "webm";

/// A finished archive file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRecording {
    pub filename: String,
    pub size: u64,
}

/// Open archive file for one live session
struct ArchiveWriter {
    filename: String,
    path: PathBuf,
    file: BufWriter<File>,
    size: u64,
}

/// Writes every session to `recording_<stream>_<unix-ms>.webm`
pub struct ArchiveStore {
    dir: PathBuf,
    writers: Mutex<HashMap<String, ArchiveWriter>>,
}

impl ArchiveStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a fresh archive file for a session
    pub async fn begin(&self, stream_id: &str) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .await
            .context("Failed to create recordings directory")?;

        let filename = format!(
            "recording_{}_{}.{}",
            stream_id,
            Utc::now().timestamp_millis(),
            ARCHIVE_EXTENSION
        );
        let path = self.dir.join(&filename);

        let file = File::create(&path)
            .await
            .with_context(|| format!("Failed to create archive file: {:?}", path))?;

        let mut writers = self.writers.lock().await;
        if let Some(previous) = writers.remove(stream_id) {
            warn!(
                "Session for {} restarted before stopping; abandoning {}",
                stream_id, previous.filename
            );
        }
        writers.insert(
            stream_id.to_string(),
            ArchiveWriter {
                filename: filename.clone(),
                path,
                file: BufWriter::new(file),
                size: 0,
            },
        );

        info!("Archiving {} to {}", stream_id, filename);

        Ok(filename)
    }

    /// Append a segment to the session's archive file
    pub async fn write(&self, stream_id: &str, segment: &[u8]) -> Result<()> {
        if !self.writers.lock().await.contains_key(stream_id) {
            self.begin(stream_id).await?;
        }

        let mut writers = self.writers.lock().await;
        let writer = writers
            .get_mut(stream_id)
            .with_context(|| format!("No archive open for {}", stream_id))?;

        writer
            .file
            .write_all(segment)
            .await
            .with_context(|| format!("Failed to write archive file: {:?}", writer.path))?;
        writer.size += segment.len() as u64;

        Ok(())
    }

    /// Close the session's archive file
    ///
    /// Sessions that produced no data leave no file behind.
    pub async fn finish(&self, stream_id: &str) -> Result<SavedRecording> {
        let writer = self.writers.lock().await.remove(stream_id);
        let Some(mut writer) = writer else {
            bail!("No recording in progress for {}", stream_id);
        };

        writer
            .file
            .flush()
            .await
            .with_context(|| format!("Failed to finalize archive file: {:?}", writer.path))?;

        if writer.size == 0 {
            drop(writer.file);
            if let Err(e) = fs::remove_file(&writer.path).await {
                warn!("Failed to remove empty archive {:?}: {}", writer.path, e);
            }
            bail!("No data recorded for {}", stream_id);
        }

        info!(
            "Archived {} ({:.2}MB)",
            writer.filename,
            writer.size as f64 / (1024.0 * 1024.0)
        );

        Ok(SavedRecording {
            filename: writer.filename,
            size: writer.size,
        })
    }

    /// Archived recordings, newest first
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to read recordings directory"),
        };

        let in_progress: Vec<String> = self
            .writers
            .lock()
            .await
            .values()
            .map(|w| w.filename.clone())
            .collect();

        let mut recordings = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let filename = entry.file_name().to_string_lossy().to_string();
            if !filename.ends_with(&format!(".{}", ARCHIVE_EXTENSION))
                || in_progress.contains(&filename)
            {
                continue;
            }
            let modified = entry.metadata().await?.modified()?;
            recordings.push((modified, filename));
        }

        recordings.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        Ok(recordings.into_iter().map(|(_, name)| name).collect())
    }

    /// Path of an archived recording, refusing anything outside the directory
    pub fn path_for(&self, filename: &str) -> Option<PathBuf> {
        let plain = !filename.is_empty()
            && !filename.contains(['/', '\\'])
            && !filename.starts_with('.')
            && filename.ends_with(&format!(".{}", ARCHIVE_EXTENSION));

        plain.then(|| self.dir.join(filename))
    }
}
