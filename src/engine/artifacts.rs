//! Transient artifact files passed across the engine process boundary.
//!
//! Each request owns one group of up to five files sharing a unique id.
//! The group is removed when its `ArtifactSet` drops, whatever the outcome.
//! The registry remembers which groups are live so an exit hook can sweep
//! anything a panic or abort left behind.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// One file role in the engine contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Key,
    Iv,
    Input,
    Output,
    Trace,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Key,
        ArtifactKind::Iv,
        ArtifactKind::Input,
        ArtifactKind::Output,
        ArtifactKind::Trace,
    ];

    /// Fixed base name; the group id is appended.
    pub fn base_name(&self) -> &'static str {
        match self {
            Self::Key => "rabbit_key_",
            Self::Iv => "rabbit_iv_",
            Self::Input => "rabbit_input_",
            Self::Output => "rabbit_output_",
            Self::Trace => "rabbit_viz_",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::Trace => "txt",
            _ => "bin",
        }
    }

    fn file_name(&self, id: &str) -> String {
        format!("{}{}.{}", self.base_name(), id, self.extension())
    }
}

/// Split an artifact file name into its kind and group id.
fn parse_file_name(name: &str) -> Option<(ArtifactKind, &str)> {
    ArtifactKind::ALL.iter().find_map(|kind| {
        let rest = name.strip_prefix(kind.base_name())?;
        let id = rest.strip_suffix(&format!(".{}", kind.extension()))?;
        (!id.is_empty()).then_some((*kind, id))
    })
}

/// Tracks live artifact groups within one directory.
#[derive(Debug)]
pub struct ArtifactRegistry {
    dir: PathBuf,
    live: Mutex<HashSet<String>>,
}

impl ArtifactRegistry {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of groups currently allocated.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Allocate a fresh group with a time+random suffix.
    pub fn allocate(self: &Arc<Self>) -> ArtifactSet {
        let id = unique_id();
        self.live.lock().insert(id.clone());
        debug!(artifact_id = %id, dir = %self.dir.display(), "allocated artifact group");
        ArtifactSet {
            id,
            registry: Arc::clone(self),
        }
    }

    /// Remove files of every group still registered. Returns files removed.
    pub fn sweep_registered(&self) -> usize {
        let ids: Vec<String> = self.live.lock().drain().collect();
        ids.iter().map(|id| remove_group(&self.dir, id)).sum()
    }

    /// Remove unregistered artifact files older than `max_age`.
    ///
    /// Leftovers from a previous process that died mid-request.
    pub fn sweep_stale(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((_, id)) = parse_file_name(name) else { continue };
            if self.live.lock().contains(id) {
                continue;
            }
            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = %name, error = %e, "failed to sweep stale artifact"),
            }
        }
        Ok(removed)
    }

    fn release(&self, id: &str) {
        remove_group(&self.dir, id);
        self.live.lock().remove(id);
    }
}

fn unique_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{:x}_{}", millis, Uuid::new_v4().simple())
}

fn remove_group(dir: &Path, id: &str) -> usize {
    let mut removed = 0;
    for kind in ArtifactKind::ALL {
        let path = dir.join(kind.file_name(id));
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove artifact"),
        }
    }
    removed
}

/// Exit hook: sweeps every still-registered group when dropped.
#[derive(Debug)]
pub struct SweepOnDrop(Arc<ArtifactRegistry>);

impl SweepOnDrop {
    pub fn new(registry: Arc<ArtifactRegistry>) -> Self {
        Self(registry)
    }
}

impl Drop for SweepOnDrop {
    fn drop(&mut self) {
        let removed = self.0.sweep_registered();
        if removed > 0 {
            warn!(removed, "swept orphaned artifacts on exit");
        }
    }
}

/// Per-request artifact group. Dropping it deletes every file in the group.
#[derive(Debug)]
pub struct ArtifactSet {
    id: String,
    registry: Arc<ArtifactRegistry>,
}

impl ArtifactSet {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.registry.dir.join(kind.file_name(&self.id))
    }

    pub async fn write(&self, kind: ArtifactKind, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.path(kind), bytes).await
    }

    /// Read an artifact, `None` if the engine never created it.
    pub async fn read(&self, kind: ArtifactKind) -> io::Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(kind)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        self.registry.release(&self.id);
    }
}
