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

//! Record framing shared by the disk queues.
//!
//! Both disk queues store items as raw payload bytes next to a 4-byte
//! big-endian length field. They differ in where the length sits:
//!
//! ```text
//! FifoDiskQueue chunk:  ┌──────────┬───────────┐
//!                       │ len (4B) │ payload   │  repeated
//!                       └──────────┴───────────┘
//!
//! LifoDiskQueue file:   ┌───────────┬──────────┐
//!                       │ payload   │ len (4B) │  repeated, after a 4B count
//!                       └───────────┴──────────┘
//! ```
//!
//! The FIFO reads forward from the tail cursor, so it needs the length
//! first. The LIFO reads backward from end-of-file, so it needs it last.

use std::{
    io::{self, Read},
    path::Path,
};

use bytes::Bytes;
use snafu::{OptionExt, ensure};

use crate::{
    Result,
    error::{CorruptedSnafu, ItemTooLargeSnafu, QueueError},
};

/// Size of a length field in bytes (u32, big-endian).
pub(crate) const LENGTH_FIELD_SIZE: usize = 4;

/// Encodes `len` as a length field, rejecting lengths that do not fit.
#[inline]
pub(crate) fn encode_length(len: usize) -> Result<[u8; LENGTH_FIELD_SIZE]> {
    let len = u32::try_from(len).ok().context(ItemTooLargeSnafu { len })?;
    Ok(len.to_be_bytes())
}

#[inline]
pub(crate) const fn decode_length(field: [u8; LENGTH_FIELD_SIZE]) -> u32 { u32::from_be_bytes(field) }

/// Builds a `len || payload` record in one buffer so it hits the file in a
/// single write.
pub(crate) fn length_prefixed(item: &[u8]) -> Result<Vec<u8>> {
    let field = encode_length(item.len())?;
    let mut record = Vec::with_capacity(LENGTH_FIELD_SIZE + item.len());
    record.extend_from_slice(&field);
    record.extend_from_slice(item);
    Ok(record)
}

/// Builds a `payload || len` record.
pub(crate) fn length_suffixed(item: &[u8]) -> Result<Vec<u8>> {
    let field = encode_length(item.len())?;
    let mut record = Vec::with_capacity(item.len() + LENGTH_FIELD_SIZE);
    record.extend_from_slice(item);
    record.extend_from_slice(&field);
    Ok(record)
}

/// On-disk size of one record carrying `payload_len` bytes.
#[inline]
pub(crate) const fn record_size(payload_len: u64) -> u64 { LENGTH_FIELD_SIZE as u64 + payload_len }

/// Reads one `len || payload` record.
///
/// A record cut short is reported as [`QueueError::Corrupted`]; the bytes
/// are never reinterpreted as a shorter item.
pub(crate) fn read_length_prefixed<R: Read>(reader: &mut R, path: &Path) -> Result<Bytes> {
    let mut field = [0u8; LENGTH_FIELD_SIZE];
    read_exact_or_corrupt(reader, &mut field, path, "truncated length prefix")?;
    let len = u64::from(decode_length(field));

    // Read through `take` so a garbage length cannot force a huge allocation.
    let mut payload = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    ensure!(
        payload.len() as u64 == len,
        CorruptedSnafu {
            path:   path.to_path_buf(),
            reason: format!("truncated payload: expected {len} bytes, found {}", payload.len()),
        }
    );
    Ok(Bytes::from(payload))
}

pub(crate) fn read_exact_or_corrupt<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    path: &Path,
    reason: &str,
) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => CorruptedSnafu {
            path:   path.to_path_buf(),
            reason: format!("{reason}: expected {} bytes", buf.len()),
        }
        .fail(),
        Err(e) => Err(QueueError::from(e)),
    }
}
