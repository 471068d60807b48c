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

use std::path::PathBuf;

/// Default number of items per chunk file of a [`FifoDiskQueue`].
///
/// [`FifoDiskQueue`]: crate::FifoDiskQueue
pub const DEFAULT_CHUNK_SIZE: u64 = 100_000;

#[derive(Debug, Clone)]
pub struct DiskQueueConfig {
    pub base_path:  PathBuf,
    /// Items per chunk. Only used when the queue directory has no metadata
    /// yet; an existing queue keeps the chunk size it was created with.
    pub chunk_size: u64,
    pub flush_mode: FlushMode,
}

impl Default for DiskQueueConfig {
    fn default() -> Self {
        Self {
            base_path:  PathBuf::from("./queue_data"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            flush_mode: FlushMode::Async,
        }
    }
}

/// How hard `close` pushes data to stable storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FlushMode {
    /// Leave dirty pages to the OS.
    #[default]
    Async,
    /// `fsync` data files and metadata before returning from `close`.
    Sync,
}

impl FlushMode {
    pub(crate) fn sync_file(self, file: &std::fs::File) -> std::io::Result<()> {
        match self {
            Self::Async => Ok(()),
            Self::Sync => file.sync_all(),
        }
    }
}
