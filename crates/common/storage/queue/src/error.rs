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

use std::{io, path::PathBuf};

use snafu::Snafu;

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(context(false), display("IO error: {source}"))]
    Io { source: io::Error },

    /// The item cannot be framed: its length does not fit the 4-byte length
    /// field. Nothing was written.
    #[snafu(display("Item of {len} bytes exceeds the maximum framed length"))]
    ItemTooLarge { len: usize },

    /// The queue's files were already released by a shutdown.
    #[snafu(display("Queue is closed"))]
    Closed,

    /// The item count no longer fits the on-disk header.
    #[snafu(display("Queue is full"))]
    QueueFull,

    /// A record in a data file is truncated or its length field is garbage.
    #[snafu(display("Corrupted record in {}: {reason}", path.display()))]
    Corrupted { path: PathBuf, reason: String },

    /// Queue metadata (info file or header) cannot be trusted.
    #[snafu(display("Corrupted metadata in {}: {reason}", path.display()))]
    CorruptedMetadata { path: PathBuf, reason: String },

    /// Metadata could not be encoded or decoded.
    #[snafu(display("Metadata serialization failed for {}: {source}", path.display()))]
    Metadata {
        path:   PathBuf,
        source: serde_json::Error,
    },

    /// Embedded database failure.
    #[snafu(context(false), display("SQLite error: {source}"))]
    Sqlite { source: rusqlite::Error },

    /// Rejected builder settings.
    #[snafu(display("Invalid queue configuration: {reason}"))]
    InvalidConfig { reason: String },

    /// A queue factory refused to build a queue.
    #[snafu(display("Queue factory failed: {message}"))]
    Factory { message: String },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
