// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Atomic manifest persistence.
//!
//! The manifest is written to a temporary file and renamed over the live
//! one, so a crash mid-write leaves either the old or the new manifest on
//! disk, never a torn one.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use snafu::ResultExt;
use tracing::debug;

use crate::{FlushMode, Result, error::MetadataSnafu, manifest::Manifest};

pub(crate) const MANIFEST_FILE: &str = "info.json";
const MANIFEST_TMP: &str = "info.json.tmp";

pub(crate) struct ManifestWriter {
    path:     PathBuf,
    tmp_path: PathBuf,
}

impl ManifestWriter {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let base_path = base_path.as_ref();
        Self {
            path:     base_path.join(MANIFEST_FILE),
            tmp_path: base_path.join(MANIFEST_TMP),
        }
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn write(&self, manifest: &Manifest, flush_mode: FlushMode) -> Result<()> {
        let data = serde_json::to_vec(manifest).context(MetadataSnafu {
            path: self.path.clone(),
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;
        file.write_all(&data)?;
        flush_mode.sync_file(&file)?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;

        debug!(
            path = ?self.path,
            size = manifest.size,
            head = ?manifest.head,
            tail = ?manifest.tail,
            "Manifest written"
        );
        Ok(())
    }

    /// Reads and validates the manifest, `None` if the queue has never been
    /// closed at this path.
    pub fn read_latest(&self) -> Result<Option<Manifest>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let manifest: Manifest = serde_json::from_slice(&data).context(MetadataSnafu {
            path: self.path.clone(),
        })?;
        manifest.validate(&self.path)?;
        Ok(Some(manifest))
    }

    /// Deletes the manifest and any leftover temporary file.
    pub fn remove(&self) -> Result<()> {
        fs::remove_file(&self.path)?;
        match fs::remove_file(&self.tmp_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
