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

//! Persistent FIFO queue over a directory of chunk files.
//!
//! ## Layout
//!
//! ```text
//! queue_dir/
//! ├── info.json   manifest: chunk size, item count, head and tail cursors
//! ├── q00000      fully pushed chunk, partially popped
//! ├── q00001      fully pushed chunk
//! └── q00002      head chunk, open for appending
//! ```
//!
//! Every chunk holds at most `chunk_size` length-prefixed records. The head
//! cursor rolls to a fresh chunk as soon as the current one is full; the tail
//! deletes a chunk once it has read every record from it. Cleanup is
//! therefore whole-file deletes, never compaction.
//!
//! ## Recovery
//!
//! The manifest is written on close and right before a consumed chunk is
//! deleted, so it never points at a missing tail chunk. After an unclean
//! exit the queue reopens at the last written manifest: records appended
//! past the recorded head are cut from the head chunk, chunks beyond it are
//! removed, and items popped since then are delivered again.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use snafu::OptionExt;
use tracing::{debug, info, warn};

use crate::{
    DiskQueueBuilder, DiskQueueConfig, Queue, Result,
    error::ClosedSnafu,
    frame::{self, LENGTH_FIELD_SIZE},
    manifest::{Manifest, TailCursor},
    manifest_writer::ManifestWriter,
    path::{chunk_file_path, parse_chunk_index, scan_chunk_files},
};

/// Open handles of a live queue.
struct ChunkFiles {
    /// Chunk receiving pushes.
    head: File,
    /// Chunk being popped from.
    tail: File,
}

/// A persistent, chunked FIFO queue.
///
/// Holds at most two open files: the head chunk (append) and the tail chunk
/// (read). Call [`close`](Queue::close) to persist the cursors; dropping the
/// queue does the same on a best-effort basis.
pub struct FifoDiskQueue {
    /// Queue directory and flush mode.
    config:          DiskQueueConfig,
    /// Live cursor state.
    manifest:        Manifest,
    manifest_writer: ManifestWriter,
    /// `None` once the queue has been shut down, so `Drop` does not repeat it.
    files:           Option<ChunkFiles>,
}

impl FifoDiskQueue {
    /// Opens (or creates) a queue at `path` with default settings.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> { DiskQueueBuilder::new(path).build_fifo() }

    /// Create a queue from a config.
    ///
    /// If the directory holds a manifest, the queue resumes from it and keeps
    /// the chunk size recorded there. Otherwise starts empty.
    pub(crate) fn with_config(config: DiskQueueConfig) -> Result<Self> {
        let base_path = &config.base_path;
        fs::create_dir_all(base_path)?;

        let manifest_writer = ManifestWriter::new(base_path);
        let manifest = match manifest_writer.read_latest()? {
            Some(manifest) => {
                if manifest.chunk_size != config.chunk_size {
                    debug!(
                        stored = manifest.chunk_size,
                        configured = config.chunk_size,
                        "Keeping chunk size recorded in manifest"
                    );
                }
                info!(
                    path = ?base_path,
                    size = manifest.size,
                    head = ?manifest.head,
                    tail = ?manifest.tail,
                    "Reopened FIFO disk queue"
                );
                manifest
            }
            None => {
                info!(path = ?base_path, chunk_size = config.chunk_size, "Created FIFO disk queue");
                Manifest::new(config.chunk_size)
            }
        };
        discard_unrecorded(base_path, &manifest)?;

        let head = open_head_chunk(base_path, manifest.head.chunk)?;
        let mut tail = File::open(chunk_file_path(base_path, manifest.tail.chunk))?;
        tail.seek(SeekFrom::Start(manifest.tail.byte_offset))?;

        Ok(Self {
            config,
            manifest,
            manifest_writer,
            files: Some(ChunkFiles { head, tail }),
        })
    }

    /// Queue directory.
    pub fn path(&self) -> &Path { &self.config.base_path }

    /// Items per chunk file.
    pub fn chunk_size(&self) -> u64 { self.manifest.chunk_size }

    fn files(&mut self) -> Result<&mut ChunkFiles> { self.files.as_mut().context(ClosedSnafu) }

    /// Reads the record under the tail cursor without moving it.
    fn read_tail(&mut self) -> Result<Bytes> {
        let tail = self.manifest.tail;
        let path = chunk_file_path(&self.config.base_path, tail.chunk);
        let file = &mut self.files()?.tail;
        file.seek(SeekFrom::Start(tail.byte_offset))?;
        frame::read_length_prefixed(file, &path)
    }

    /// Appends one encoded record to the head chunk.
    ///
    /// A failed write is rolled back by truncating the chunk to its previous
    /// length, so a half-written record never sits in front of later ones.
    fn append_record(&mut self, record: &[u8]) -> Result<()> {
        let file = &mut self.files()?.head;
        let start = file.metadata()?.len();
        if let Err(e) = file.write_all(record) {
            if let Err(truncate_err) = file.set_len(start) {
                warn!(error = %truncate_err, "Failed to roll back partial record");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Persists the manifest, then deletes a chunk the tail has left.
    ///
    /// The item is already off the queue either way; a chunk that cannot be
    /// deleted is swept up when the queue is closed empty.
    fn retire_chunk(&self, index: u64) {
        if let Err(e) = self.manifest_writer.write(&self.manifest, self.config.flush_mode) {
            warn!(chunk = index, error = %e, "Failed to persist manifest, keeping consumed chunk");
            return;
        }
        let path = chunk_file_path(&self.config.base_path, index);
        match fs::remove_file(&path) {
            Ok(()) => debug!(chunk = index, "Deleted consumed chunk"),
            Err(e) => warn!(path = ?path, error = %e, "Failed to delete consumed chunk"),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(files) = self.files.take() else {
            return Ok(());
        };
        let flush_mode = self.config.flush_mode;
        flush_mode.sync_file(&files.head)?;
        drop(files);

        self.manifest_writer.write(&self.manifest, flush_mode)?;
        if self.manifest.size == 0 {
            self.cleanup()?;
        }
        info!(path = ?self.config.base_path, size = self.manifest.size, "Closed FIFO disk queue");
        Ok(())
    }

    /// Removes every chunk, the manifest and, if possible, the directory.
    fn cleanup(&self) -> Result<()> {
        let base_path = &self.config.base_path;
        for chunk in scan_chunk_files(base_path)? {
            fs::remove_file(&chunk)?;
        }
        self.manifest_writer.remove()?;
        if let Err(e) = fs::remove_dir(base_path) {
            debug!(path = ?base_path, error = %e, "Queue directory left in place");
        }
        Ok(())
    }
}

impl Queue for FifoDiskQueue {
    fn push(&mut self, item: &[u8]) -> Result<()> {
        let record = frame::length_prefixed(item)?;

        // Open the next chunk before writing so a failed open leaves the
        // cursors untouched.
        let head = self.manifest.head;
        let rolls = head.offset + 1 == self.manifest.chunk_size;
        let next_file = if rolls {
            Some(open_head_chunk(&self.config.base_path, head.chunk + 1)?)
        } else {
            None
        };

        self.append_record(&record)?;

        if let Some(next_file) = next_file {
            self.files()?.head = next_file;
            let head = &mut self.manifest.head;
            head.chunk += 1;
            head.offset = 0;
            debug!(chunk = head.chunk, "Rolled to new head chunk");
        } else {
            self.manifest.head.offset += 1;
        }
        self.manifest.size += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Bytes>> {
        if self.manifest.is_drained() {
            return Ok(None);
        }
        let item = self.read_tail()?;

        let tail = self.manifest.tail;
        let mut next = TailCursor {
            chunk:       tail.chunk,
            offset:      tail.offset + 1,
            byte_offset: tail.byte_offset + frame::record_size(item.len() as u64),
        };

        let consumed = next.offset == self.manifest.chunk_size && tail.chunk < self.manifest.head.chunk;
        if consumed {
            next = TailCursor {
                chunk:       tail.chunk + 1,
                offset:      0,
                byte_offset: 0,
            };
            let next_file = File::open(chunk_file_path(&self.config.base_path, next.chunk))?;
            self.files()?.tail = next_file;
        }

        self.manifest.tail = next;
        self.manifest.size -= 1;

        if consumed {
            self.retire_chunk(tail.chunk);
        }
        Ok(Some(item))
    }

    fn peek(&mut self) -> Result<Option<Bytes>> {
        if self.manifest.is_drained() {
            return Ok(None);
        }
        self.read_tail().map(Some)
    }

    fn len(&self) -> usize { usize::try_from(self.manifest.size).unwrap_or(usize::MAX) }

    fn close(mut self) -> Result<()> { self.shutdown() }
}

impl Drop for FifoDiskQueue {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(path = ?self.config.base_path, error = %e, "Failed to close FIFO disk queue on drop");
        }
    }
}

fn open_head_chunk(base: &Path, index: u64) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(chunk_file_path(base, index))?;
    Ok(file)
}

/// Drops whatever a session that exited without closing wrote past the head
/// cursor of `manifest`: chunks after the head chunk, and bytes after the
/// head's last record.
///
/// A head chunk shorter than the manifest claims is left alone; reading it
/// reports the corruption.
fn discard_unrecorded(base: &Path, manifest: &Manifest) -> Result<()> {
    let head = manifest.head;
    for chunk in scan_chunk_files(base)? {
        let index = chunk
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(parse_chunk_index);
        if index.is_some_and(|index| index > head.chunk) {
            fs::remove_file(&chunk)?;
            warn!(path = ?chunk, "Removed chunk written after the last manifest");
        }
    }

    let path = chunk_file_path(base, head.chunk);
    let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let tail = manifest.tail;
    let (mut end, records) = if tail.chunk == head.chunk {
        (tail.byte_offset, head.offset.saturating_sub(tail.offset))
    } else {
        (0, head.offset)
    };
    let file_len = file.metadata()?.len();
    for _ in 0..records {
        if end + LENGTH_FIELD_SIZE as u64 > file_len {
            return Ok(());
        }
        let mut field = [0u8; LENGTH_FIELD_SIZE];
        file.seek(SeekFrom::Start(end))?;
        file.read_exact(&mut field)?;
        end += frame::record_size(u64::from(frame::decode_length(field)));
    }

    if file_len > end {
        file.set_len(end)?;
        warn!(
            path = ?path,
            discarded = file_len - end,
            "Cut bytes appended after the last manifest"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;
    use crate::{FlushMode, QueueError, manifest_writer::MANIFEST_FILE};

    fn queue_at(dir: &TempDir, chunk_size: u64) -> FifoDiskQueue {
        DiskQueueBuilder::new(dir.path().join("queue"))
            .chunk_size(chunk_size)
            .build_fifo()
            .unwrap()
    }

    fn chunk_count(path: &Path) -> usize { scan_chunk_files(path).unwrap().len() }

    #[test]
    fn test_empty_queue() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 4);
        assert_eq!(q.len(), 0);
        assert!(q.pop().unwrap().is_none());
        assert!(q.peek().unwrap().is_none());
    }

    #[test]
    fn test_push_pop_order() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 100);
        for item in [&b"a"[..], b"", b"ccc"] {
            q.push(item).unwrap();
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop().unwrap().unwrap(), "a");
        assert_eq!(q.pop().unwrap().unwrap(), "");
        assert_eq!(q.pop().unwrap().unwrap(), "ccc");
        assert!(q.pop().unwrap().is_none());
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_peek_matches_pop() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 2);
        for i in 0..5u8 {
            q.push(&[i; 3]).unwrap();
        }
        for i in 0..5u8 {
            let peeked = q.peek().unwrap().unwrap();
            assert_eq!(q.peek().unwrap().unwrap(), peeked);
            assert_eq!(q.len(), 5 - i as usize);
            assert_eq!(q.pop().unwrap().unwrap(), peeked);
            assert_eq!(&peeked[..], &[i; 3]);
        }
    }

    #[test_case(1 ; "one item per chunk")]
    #[test_case(2 ; "two items per chunk")]
    #[test_case(3 ; "chunk size not dividing item count")]
    fn test_chunk_rollover_and_deletion(chunk_size: u64) {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, chunk_size);
        let path = q.path().to_path_buf();

        for i in 0..10u32 {
            q.push(&i.to_be_bytes()).unwrap();
        }
        // Head always has a fresh chunk open once the previous one is full.
        let expected_chunks = usize::try_from(10 / chunk_size + 1).unwrap();
        assert_eq!(chunk_count(&path), expected_chunks);

        for i in 0..10u32 {
            assert_eq!(&q.pop().unwrap().unwrap()[..], &i.to_be_bytes());
        }
        assert_eq!(chunk_count(&path), 1);
        assert!(q.pop().unwrap().is_none());
    }

    #[test]
    fn test_reopen_resumes() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 3);
        let path = q.path().to_path_buf();
        for i in 0..7u8 {
            q.push(&[i]).unwrap();
        }
        assert_eq!(&q.pop().unwrap().unwrap()[..], &[0]);
        assert_eq!(&q.pop().unwrap().unwrap()[..], &[1]);
        q.close().unwrap();
        assert!(path.join(MANIFEST_FILE).exists());

        // A different configured chunk size does not override the stored one.
        let mut q = DiskQueueBuilder::new(&path)
            .chunk_size(1000)
            .build_fifo()
            .unwrap();
        assert_eq!(q.chunk_size(), 3);
        assert_eq!(q.len(), 5);
        q.push(&[7]).unwrap();
        for i in 2..8u8 {
            assert_eq!(&q.pop().unwrap().unwrap()[..], &[i]);
        }
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_close_empty_removes_storage() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 2);
        let path = q.path().to_path_buf();
        q.push(b"x").unwrap();
        q.pop().unwrap();
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_close_empty_keeps_foreign_files() {
        let dir = TempDir::new().unwrap();
        let q = queue_at(&dir, 2);
        let path = q.path().to_path_buf();
        fs::write(path.join("notes.txt"), b"keep").unwrap();
        q.close().unwrap();

        assert!(path.join("notes.txt").exists());
        assert_eq!(chunk_count(&path), 0);
        assert!(!path.join(MANIFEST_FILE).exists());
    }

    #[test]
    fn test_drop_persists_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");
        {
            let mut q = FifoDiskQueue::open(&path).unwrap();
            q.push(b"survivor").unwrap();
        }
        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.pop().unwrap().unwrap(), "survivor");
        q.close().unwrap();
    }

    #[test]
    fn test_unclosed_session_before_first_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");
        let mut q = FifoDiskQueue::open(&path).unwrap();
        q.push(b"unrecorded-1").unwrap();
        q.push(b"unrecorded-2").unwrap();
        std::mem::forget(q);

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 0);
        q.push(b"new").unwrap();
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop().unwrap().unwrap(), "new");
        assert!(q.pop().unwrap().is_none());
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unclosed_session_after_rollover() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 2);
        let path = q.path().to_path_buf();
        for item in [&b"a"[..], b"b", b"c"] {
            q.push(item).unwrap();
        }
        q.close().unwrap();

        // Rolls into chunks the manifest has never seen.
        let mut q = FifoDiskQueue::open(&path).unwrap();
        for item in [&b"d"[..], b"e", b"f", b"g"] {
            q.push(item).unwrap();
        }
        std::mem::forget(q);
        assert!(chunk_file_path(&path, 3).exists());

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 3);
        assert_eq!(chunk_count(&path), 2);
        q.push(b"h").unwrap();
        let popped: Vec<_> = std::iter::from_fn(|| q.pop().unwrap()).collect();
        assert_eq!(popped, vec!["a", "b", "c", "h"]);
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_unclosed_session_sharing_tail_chunk() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 10);
        let path = q.path().to_path_buf();
        for item in [&b"a"[..], b"bb", b"ccc"] {
            q.push(item).unwrap();
        }
        assert_eq!(q.pop().unwrap().unwrap(), "a");
        q.close().unwrap();

        let mut q = FifoDiskQueue::open(&path).unwrap();
        q.push(b"unrecorded").unwrap();
        std::mem::forget(q);

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 2);
        q.push(b"d").unwrap();
        let popped: Vec<_> = std::iter::from_fn(|| q.pop().unwrap()).collect();
        assert_eq!(popped, vec!["bb", "ccc", "d"]);
        q.close().unwrap();
    }

    #[test]
    fn test_consumed_chunk_persists_manifest() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 2);
        let path = q.path().to_path_buf();
        for i in 0..5u8 {
            q.push(&[i]).unwrap();
        }
        q.close().unwrap();

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(&q.pop().unwrap().unwrap()[..], &[0]);
        assert_eq!(&q.pop().unwrap().unwrap()[..], &[1]);
        assert!(!chunk_file_path(&path, 0).exists());
        std::mem::forget(q);

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.len(), 3);
        for i in 2..5u8 {
            assert_eq!(&q.pop().unwrap().unwrap()[..], &[i]);
        }
        q.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_sync_flush_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");
        let mut q = DiskQueueBuilder::new(&path)
            .flush_mode(FlushMode::Sync)
            .build_fifo()
            .unwrap();
        q.push(b"durable").unwrap();
        q.close().unwrap();

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.pop().unwrap().unwrap(), "durable");
        q.close().unwrap();
    }

    #[test]
    fn test_truncated_chunk_is_corruption() {
        let dir = TempDir::new().unwrap();
        let mut q = queue_at(&dir, 10);
        let path = q.path().to_path_buf();
        q.push(b"hello world").unwrap();
        q.close().unwrap();

        let chunk = chunk_file_path(&path, 0);
        let len = fs::metadata(&chunk).unwrap().len();
        OpenOptions::new()
            .write(true)
            .open(&chunk)
            .unwrap()
            .set_len(len - 3)
            .unwrap();

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert!(matches!(q.peek(), Err(QueueError::Corrupted { .. })));
        assert!(matches!(q.pop(), Err(QueueError::Corrupted { .. })));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_corrupted_manifest_refuses_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(MANIFEST_FILE),
            br#"{"chunksize":10,"size":4,"head":[0,1],"tail":[0,0,0]}"#,
        )
        .unwrap();

        let result = FifoDiskQueue::open(&path);
        assert!(matches!(result, Err(QueueError::CorruptedMetadata { .. })));
    }

    #[test]
    fn test_reads_existing_layout() {
        // Directory written by another implementation of the same format.
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue");
        fs::create_dir_all(&path).unwrap();
        let mut chunk = frame::length_prefixed(b"one").unwrap();
        chunk.extend(frame::length_prefixed(b"two").unwrap());
        fs::write(chunk_file_path(&path, 0), chunk).unwrap();
        fs::write(
            path.join(MANIFEST_FILE),
            br#"{"chunksize": 100000, "size": 2, "tail": [0, 0, 0], "head": [0, 2]}"#,
        )
        .unwrap();

        let mut q = FifoDiskQueue::open(&path).unwrap();
        assert_eq!(q.pop().unwrap().unwrap(), "one");
        assert_eq!(q.pop().unwrap().unwrap(), "two");
        q.close().unwrap();
    }
}
