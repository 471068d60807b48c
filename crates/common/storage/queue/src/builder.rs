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

use snafu::ensure;

use crate::{
    DiskQueueConfig, FifoDiskQueue, FlushMode, LifoDiskQueue, Result, error::InvalidConfigSnafu,
};

pub struct DiskQueueBuilder {
    config: DiskQueueConfig,
}

impl DiskQueueBuilder {
    /// `base_path` is the queue directory for a FIFO queue and the queue
    /// file for a LIFO queue.
    pub fn new<P: Into<PathBuf>>(base_path: P) -> Self {
        Self {
            config: DiskQueueConfig {
                base_path: base_path.into(),
                ..Default::default()
            },
        }
    }

    /// Items per chunk file for a new FIFO queue. Ignored when reopening an
    /// existing queue and by LIFO queues.
    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub fn build_fifo(self) -> Result<FifoDiskQueue> {
        ensure!(
            self.config.chunk_size > 0,
            InvalidConfigSnafu {
                reason: "chunk size must be at least 1",
            }
        );
        FifoDiskQueue::with_config(self.config)
    }

    pub fn build_lifo(self) -> Result<LifoDiskQueue> { LifoDiskQueue::with_config(self.config) }
}
