//! JSON file backed state cache.
//!
//! The whole record is one document:
//!
//! ```json
//! {"version":1,"containers":{"<container id>":{"host":"127.0.0.1","port":9000}}}
//! ```
//!
//! Every change rewrites the document through a temp file in the same
//! directory followed by a rename, so a crash leaves either the old or the
//! new record on disk, never a torn one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{StateCache, StateCacheError};
use crate::domain::{ContainerEndpoints, ContainerId, UdpEndpoint};

/// File name of the record inside the state directory.
pub const STATE_FILE_NAME: &str = "input_assignments.json";

const STATE_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateDocument {
    version: u32,
    containers: BTreeMap<ContainerId, UdpEndpoint>,
}

/// Assignment record persisted under a state directory.
#[derive(Debug)]
pub struct FileStateCache {
    dir: PathBuf,
    path: PathBuf,
    entries: BTreeMap<ContainerId, UdpEndpoint>,
}

impl FileStateCache {
    /// Open the record in `dir`, creating the directory if needed.
    ///
    /// A missing file is an empty record.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StateCacheError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| StateCacheError::io("creating state directory", &dir, e))?;
        let path = dir.join(STATE_FILE_NAME);

        let entries = read_document(&path)?;
        info!(path = %path.display(), containers = entries.len(), "Opened input state cache");

        Ok(Self { dir, path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StateCacheError> {
        let document = StateDocument {
            version: STATE_FILE_VERSION,
            containers: self.entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| StateCacheError::io("creating temp state file", &self.dir, e))?;
        tmp.write_all(&bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StateCacheError::io("writing temp state file", tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StateCacheError::io("replacing state file", &self.path, e.error))?;

        debug!(path = %self.path.display(), containers = self.entries.len(), "Persisted input state");
        Ok(())
    }
}

impl StateCache for FileStateCache {
    fn backing_location(&self) -> String {
        self.path.display().to_string()
    }

    fn load_all(&mut self) -> Result<ContainerEndpoints, StateCacheError> {
        self.entries = read_document(&self.path)?;
        Ok(self
            .entries
            .iter()
            .map(|(id, endpoint)| (id.clone(), endpoint.clone()))
            .collect())
    }

    fn insert(
        &mut self,
        container_id: &ContainerId,
        endpoint: &UdpEndpoint,
    ) -> Result<(), StateCacheError> {
        let previous = self
            .entries
            .insert(container_id.clone(), endpoint.clone());

        if let Err(e) = self.persist() {
            match previous {
                Some(previous) => self.entries.insert(container_id.clone(), previous),
                None => self.entries.remove(container_id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, container_id: &ContainerId) -> Result<(), StateCacheError> {
        let Some(previous) = self.entries.remove(container_id) else {
            return Ok(());
        };

        if let Err(e) = self.persist() {
            self.entries.insert(container_id.clone(), previous);
            return Err(e);
        }
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<ContainerId, UdpEndpoint>, StateCacheError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(StateCacheError::io("reading state file", path, e)),
    };

    let document: StateDocument = serde_json::from_slice(&bytes)?;
    if document.version != STATE_FILE_VERSION {
        return Err(StateCacheError::UnsupportedVersion(document.version));
    }
    Ok(document.containers)
}
