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

use std::path::{Path, PathBuf};

use crate::Result;

/// Generates a chunk file name: `qNNNNN`.
pub fn chunk_file_name(index: u64) -> String { format!("q{index:05}") }

/// Returns full path to a chunk file: `base/qNNNNN`.
pub fn chunk_file_path<P: AsRef<Path>>(base: P, index: u64) -> PathBuf {
    base.as_ref().join(chunk_file_name(index))
}

/// Extracts the chunk index from a chunk file name.
pub fn parse_chunk_index(name: &str) -> Option<u64> {
    let digits = name.strip_prefix('q')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lists the chunk files directly under `base`, ordered by index.
pub fn scan_chunk_files<P: AsRef<Path>>(base: P) -> Result<Vec<PathBuf>> {
    let mut chunks = Vec::new();
    for entry in std::fs::read_dir(base)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(index) = entry.file_name().to_str().and_then(parse_chunk_index) {
            chunks.push((index, entry.path()));
        }
    }
    chunks.sort_unstable_by_key(|(index, _)| *index);
    Ok(chunks.into_iter().map(|(_, path)| path).collect())
}
