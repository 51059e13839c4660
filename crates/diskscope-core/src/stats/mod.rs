/// Persistent session statistics.
///
/// One small JSON file under the user's home directory keeps the bytes
/// reclaimed across every run and the default scan target:
///
/// ```json
/// { "freed_lifetime": 123456, "default_drive": "/" }
/// ```
///
/// A missing file means empty state; unknown fields are ignored so newer
/// versions can extend the shape. Writes are debounced — deletions arrive
/// in bursts — and flushed synchronously on [`StatsManager::close`].
/// A failed background write keeps the state dirty and is retried on the
/// next flush.
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Quiet period before a scheduled write hits the disk.
const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedStats {
    #[serde(default)]
    freed_lifetime: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_drive: Option<String>,
}

struct StatsInner {
    path: PathBuf,
    stats: PersistedStats,
    dirty: bool,
    /// Bumped on every change; a sleeping save thread only writes if its
    /// observed generation is still current, which is what makes the last
    /// change in a burst win.
    generation: u64,
}

/// Handle to the statistics store. Clone-cheap; all clones share state.
#[derive(Clone)]
pub struct StatsManager {
    inner: Arc<Mutex<StatsInner>>,
}

impl StatsManager {
    /// Load from the default location (`~/.diskscope/stats.json`).
    pub fn load_default() -> Self {
        Self::load_from(default_path())
    }

    /// Load from an explicit path. Missing file ⇒ empty state; a corrupt
    /// file is logged and replaced by empty state rather than failing
    /// startup.
    pub fn load_from(path: PathBuf) -> Self {
        let stats = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<PersistedStats>(&bytes) {
                Ok(stats) => stats,
                Err(err) => {
                    warn!("unreadable stats file {}: {err}", path.display());
                    PersistedStats::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => PersistedStats::default(),
            Err(err) => {
                warn!("cannot open stats file {}: {err}", path.display());
                PersistedStats::default()
            }
        };

        Self {
            inner: Arc::new(Mutex::new(StatsInner {
                path,
                stats,
                dirty: false,
                generation: 0,
            })),
        }
    }

    pub fn freed_lifetime(&self) -> u64 {
        self.inner.lock().stats.freed_lifetime
    }

    pub fn default_target(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .stats
            .default_drive
            .as_ref()
            .map(PathBuf::from)
    }

    /// Record the preferred scan target and schedule a debounced write.
    pub fn set_default_target(&self, path: &Path) {
        let mut inner = self.inner.lock();
        let value = path.to_string_lossy().into_owned();
        if inner.stats.default_drive.as_deref() == Some(value.as_str()) {
            return;
        }
        inner.stats.default_drive = Some(value);
        self.mark_dirty(&mut inner);
    }

    /// Add reclaimed bytes to the lifetime counter and schedule a
    /// debounced write.
    pub fn add_freed(&self, bytes: u64) {
        let mut inner = self.inner.lock();
        inner.stats.freed_lifetime += bytes;
        self.mark_dirty(&mut inner);
    }

    /// Write immediately if there are unsaved changes. Pending debounced
    /// writes are superseded.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if inner.dirty {
            save_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Synchronous final flush. Idempotent.
    pub fn close(&self) -> Result<()> {
        self.flush()
    }

    fn mark_dirty(&self, inner: &mut StatsInner) {
        inner.dirty = true;
        inner.generation += 1;
        let observed = inner.generation;
        let shared = Arc::clone(&self.inner);

        // One short-lived thread per burst-ending change; earlier threads
        // wake to a newer generation and do nothing.
        std::thread::Builder::new()
            .name("diskscope-stats".into())
            .spawn(move || {
                std::thread::sleep(SAVE_DEBOUNCE);
                let mut inner = shared.lock();
                if inner.generation == observed && inner.dirty {
                    if let Err(err) = save_locked(&mut inner) {
                        warn!("background stats save failed: {err}");
                    }
                }
            })
            .ok();
    }
}

fn save_locked(inner: &mut StatsInner) -> Result<()> {
    if let Some(dir) = inner.path.parent() {
        fs::create_dir_all(dir).map_err(Error::StatsIo)?;
    }
    let json = serde_json::to_vec_pretty(&inner.stats)
        .map_err(|e| Error::StatsIo(std::io::Error::other(e)))?;
    fs::write(&inner.path, json).map_err(Error::StatsIo)?;
    inner.dirty = false;
    debug!("stats saved to {}", inner.path.display());
    Ok(())
}

fn default_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".diskscope")
        .join("stats.json")
}
