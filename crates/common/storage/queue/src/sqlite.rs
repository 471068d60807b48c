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

//! Queue stored as rows of an embedded SQLite database.
//!
//! Each item is one row of `queue(id INTEGER PRIMARY KEY AUTOINCREMENT, item
//! BLOB)`. FIFO pops the lowest id, LIFO the highest. Every pop is a
//! select-then-delete inside one transaction.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use bytes::Bytes;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::{Queue, Result};

const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

const SQL_CREATE: &str =
    "CREATE TABLE IF NOT EXISTS queue (id INTEGER PRIMARY KEY AUTOINCREMENT, item BLOB)";
const SQL_SIZE: &str = "SELECT COUNT(*) FROM queue";
const SQL_PUSH: &str = "INSERT INTO queue (item) VALUES (?1)";
const SQL_DELETE: &str = "DELETE FROM queue WHERE id = ?1";

/// Which end of the table `pop` and `peek` read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqliteOrder {
    Fifo,
    Lifo,
}

impl SqliteOrder {
    const fn select_next(self) -> &'static str {
        match self {
            Self::Fifo => "SELECT id, item FROM queue ORDER BY id LIMIT 1",
            Self::Lifo => "SELECT id, item FROM queue ORDER BY id DESC LIMIT 1",
        }
    }
}

pub struct SqliteQueue {
    conn:  Connection,
    path:  PathBuf,
    order: SqliteOrder,
    /// Row count, loaded on open and maintained by push/pop.
    count: usize,
}

impl SqliteQueue {
    pub fn fifo<P: Into<PathBuf>>(path: P) -> Result<Self> { Self::open(path, SqliteOrder::Fifo) }

    pub fn lifo<P: Into<PathBuf>>(path: P) -> Result<Self> { Self::open(path, SqliteOrder::Lifo) }

    pub fn open<P: Into<PathBuf>>(path: P, order: SqliteOrder) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute(SQL_CREATE, [])?;
        let count: i64 = conn.query_row(SQL_SIZE, [], |row| row.get(0))?;
        let count = usize::try_from(count).unwrap_or_default();

        info!(path = ?path, ?order, count, "Opened SQLite queue");
        Ok(Self {
            conn,
            path,
            order,
            count,
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    fn select_next(&self) -> Result<Option<(i64, Vec<u8>)>> {
        let row = self
            .conn
            .query_row(self.order.select_next(), [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        Ok(row)
    }
}

impl Queue for SqliteQueue {
    fn push(&mut self, item: &[u8]) -> Result<()> {
        self.conn.execute(SQL_PUSH, params![item])?;
        self.count += 1;
        Ok(())
    }

    fn pop(&mut self) -> Result<Option<Bytes>> {
        let order = self.order;
        let tx = self.conn.transaction()?;
        let row: Option<(i64, Vec<u8>)> = tx
            .query_row(order.select_next(), [], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        let Some((id, item)) = row else {
            return Ok(None);
        };
        tx.execute(SQL_DELETE, params![id])?;
        tx.commit()?;

        self.count = self.count.saturating_sub(1);
        Ok(Some(Bytes::from(item)))
    }

    fn peek(&mut self) -> Result<Option<Bytes>> {
        Ok(self.select_next()?.map(|(_, item)| Bytes::from(item)))
    }

    fn len(&self) -> usize { self.count }

    fn close(self) -> Result<()> {
        let Self {
            conn, path, count, ..
        } = self;
        conn.close().map_err(|(_, e)| e)?;
        if count == 0 {
            fs::remove_file(&path)?;
        }
        info!(path = ?path, count, "Closed SQLite queue");
        Ok(())
    }
}
