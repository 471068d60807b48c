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

//! Persistent LIFO queue in a single file.
//!
//! ## File Format
//!
//! ```text
//! ┌────────────┬───────────┬──────────┬───────────┬──────────┬─────
//! │ count (4B) │ payload 0 │ len0 (4B)│ payload 1 │ len1 (4B)│ ...
//! │ big-endian │           │ BE       │           │ BE       │
//! └────────────┴───────────┴──────────┴───────────┴──────────┴─────
//! ```
//!
//! The newest record ends at end-of-file. Pop reads the trailing length,
//! reads the payload in front of it, and truncates the file to where that
//! payload started. The file length is the only record of what is live; the
//! count header is rewritten on close only, so it is stale after a crash.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::{OptionExt, ensure};
use tracing::{info, warn};

use crate::{
    DiskQueueBuilder, DiskQueueConfig, Queue, Result,
    error::{CorruptedMetadataSnafu, CorruptedSnafu, QueueFullSnafu},
    frame::{self, LENGTH_FIELD_SIZE},
};

/// Size of the item count header.
pub(crate) const HEADER_SIZE: u64 = 4;

/// A persistent LIFO queue backed by one file.
pub struct LifoDiskQueue {
    config: DiskQueueConfig,
    file:   File,
    count:  u32,
    closed: bool,
}

impl LifoDiskQueue {
    /// Opens (or creates) a queue file at `path`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> { DiskQueueBuilder::new(path).build_lifo() }

    pub(crate) fn with_config(config: DiskQueueConfig) -> Result<Self> {
        let path = &config.base_path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let (file, count) = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut file) => {
                let count = read_header(&mut file, path)?;
                info!(path = ?path, count, "Reopened LIFO disk queue");
                (file, count)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create_new(true)
                    .open(path)?;
                file.write_all(&0u32.to_be_bytes())?;
                info!(path = ?path, "Created LIFO disk queue");
                (file, 0)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            config,
            file,
            count,
            closed: false,
        })
    }

    /// Queue file.
    pub fn path(&self) -> &Path { &self.config.base_path }

    /// Reads the newest record. Returns the payload and the offset it starts
    /// at, which is the file length after popping it.
    fn read_top(&mut self) -> Result<(Bytes, u64)> {
        let path = &self.config.base_path;
        let corrupted = |reason: String| CorruptedSnafu {
            path: path.clone(),
            reason,
        };

        let end = self.file.seek(SeekFrom::End(0))?;
        let field_size = LENGTH_FIELD_SIZE as u64;
        let body = end
            .checked_sub(HEADER_SIZE + field_size)
            .context(corrupted(format!("file of {end} bytes holds no record")))?;

        self.file.seek(SeekFrom::Start(end - field_size))?;
        let mut field = [0u8; LENGTH_FIELD_SIZE];
        self.file.read_exact(&mut field)?;
        let len = u64::from(frame::decode_length(field));
        ensure!(
            len <= body,
            corrupted(format!("record length {len} exceeds the {body} bytes before it"))
        );

        let start = end - field_size - len;
        self.file.seek(SeekFrom::Start(start))?;
        let mut payload = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
        frame::read_exact_or_corrupt(&mut self.file, &mut payload, path, "truncated payload")?;
        Ok((Bytes::from(payload), start))
    }

    fn append_record(&mut self, record: &[u8]) -> Result<()> {
        let end = self.file.seek(SeekFrom::End(0))?;
        if let Err(e) = self.file.write_all(record) {
            if let Err(truncate_err) = self.file.set_len(end) {
                warn!(error = %truncate_err, "Failed to roll back partial record");
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.closed = true;
        let path = &self.config.base_path;
        if self.count > 0 {
            self.file.seek(SeekFrom::Start(0))?;
            self.file.write_all(&self.count.to_be_bytes())?;
            self.config.flush_mode.sync_file(&self.file)?;
        } else {
            fs::remove_file(path)?;
        }
        info!(path = ?path, count = self.count, "Closed LIFO disk queue");
        Ok(())
    }
}

impl Queue for LifoDiskQueue {
    fn push(&mut self, item: &[u8]) -> Result<()> {
        let record = frame::length_suffixed(item)?;
        let count = self.count.checked_add(1).context(QueueFullSnafu)?;
        self.append_record(&record)?;
        self.count = count;
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Bytes>> {
        if self.count == 0 {
            return Ok(None);
        }
        let (item, start) = self.read_top()?;
        self.file.set_len(start)?;
        self.count -= 1;
        Ok(Some(item))
    }

    fn peek(&mut self) -> Result<Option<Bytes>> {
        if self.count == 0 {
            return Ok(None);
        }
        let (item, _) = self.read_top()?;
        Ok(Some(item))
    }

    fn len(&self) -> usize { self.count as usize }

    fn close(mut self) -> Result<()> { self.shutdown() }
}

impl Drop for LifoDiskQueue {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!(path = ?self.config.base_path, error = %e, "Failed to close LIFO disk queue on drop");
        }
    }
}

fn read_header(file: &mut File, path: &Path) -> Result<u32> {
    let mut header = [0u8; HEADER_SIZE as usize];
    match file.read_exact(&mut header) {
        Ok(()) => Ok(u32::from_be_bytes(header)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => CorruptedMetadataSnafu {
            path:   path.to_path_buf(),
            reason: "file shorter than its count header",
        }
        .fail(),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{FlushMode, QueueError};

    fn file_len(path: &Path) -> u64 { fs::metadata(path).unwrap().len() }

    #[test]
    fn test_new_file_has_zero_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack");
        let q = LifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 0);
        assert_eq!(fs::read(&path).unwrap(), vec![0, 0, 0, 0]);
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_push_pop_order() {
        let dir = TempDir::new().unwrap();
        let mut q = LifoDiskQueue::open(dir.path().join("stack")).unwrap();
        for item in [&b"a"[..], b"", b"ccc"] {
            q.push(item).unwrap();
        }
        assert_eq!(q.peek().unwrap().unwrap(), "ccc");
        assert_eq!(q.pop().unwrap().unwrap(), "ccc");
        assert_eq!(q.pop().unwrap().unwrap(), "");
        assert_eq!(q.pop().unwrap().unwrap(), "a");
        assert!(q.pop().unwrap().is_none());
        assert!(q.peek().unwrap().is_none());
    }

    #[test]
    fn test_file_length_tracks_live_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack");
        let mut q = LifoDiskQueue::open(&path).unwrap();

        let items: [&[u8]; 3] = [b"xx", b"yyyyy", b""];
        let mut expected = HEADER_SIZE;
        for item in items {
            q.push(item).unwrap();
            expected += item.len() as u64 + LENGTH_FIELD_SIZE as u64;
            assert_eq!(file_len(&path), expected);
        }
        for item in items.iter().rev() {
            q.peek().unwrap();
            assert_eq!(file_len(&path), expected);
            assert_eq!(&q.pop().unwrap().unwrap()[..], *item);
            expected -= item.len() as u64 + LENGTH_FIELD_SIZE as u64;
            assert_eq!(file_len(&path), expected);
        }
        assert_eq!(file_len(&path), HEADER_SIZE);
    }

    #[test]
    fn test_reopen_resumes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("stack");
        let mut q = DiskQueueBuilder::new(&path)
            .flush_mode(FlushMode::Sync)
            .build_lifo()
            .unwrap();
        q.push(b"first").unwrap();
        q.push(b"second").unwrap();
        q.close().unwrap();
        assert_eq!(&fs::read(&path).unwrap()[..4], &[0, 0, 0, 2]);

        let mut q = LifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 2);
        q.push(b"third").unwrap();
        assert_eq!(q.pop().unwrap().unwrap(), "third");
        assert_eq!(q.pop().unwrap().unwrap(), "second");
        assert_eq!(q.pop().unwrap().unwrap(), "first");
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_persists_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack");
        {
            let mut q = LifoDiskQueue::open(&path).unwrap();
            q.push(b"kept").unwrap();
        }
        let mut q = LifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().unwrap(), "kept");
        q.close().unwrap();
    }

    #[test]
    fn test_short_header_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack");
        fs::write(&path, [0u8, 1]).unwrap();
        let result = LifoDiskQueue::open(&path);
        assert!(matches!(result, Err(QueueError::CorruptedMetadata { .. })));
    }

    #[test]
    fn test_garbage_length_is_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack");
        // Header claims one item; trailing length claims 255 bytes but only 2
        // precede it.
        fs::write(&path, [0, 0, 0, 1, b'h', b'i', 0, 0, 0, 255]).unwrap();

        let mut q = LifoDiskQueue::open(&path).unwrap();
        assert!(matches!(q.peek(), Err(QueueError::Corrupted { .. })));
        assert!(matches!(q.pop(), Err(QueueError::Corrupted { .. })));
        assert_eq!(file_len(&path), 10);
    }
}
