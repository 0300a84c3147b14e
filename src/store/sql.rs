//! The SQLite store backend.
//!
//! Two tables: `MWPage(PageId, Title)` and `MWRevision(RevId, PageId,
//! Timestamp, Content)`, with indices on `Title` and `PageId`. Content is
//! stored as a blob, gzip-compressed when the store was opened with the
//! flag set.

use super::{Error, RevisionSink, StoreReader, gunzip, gzip};
use rusqlite::Connection;
use std::path::Path;

/// The table schema, created on open if missing.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS MWPage (
    PageId INTEGER PRIMARY KEY,
    Title TEXT
);
CREATE INDEX IF NOT EXISTS MWPageTitleIndex ON MWPage(Title);

CREATE TABLE IF NOT EXISTS MWRevision (
    RevId INTEGER PRIMARY KEY,
    PageId INTEGER NOT NULL,
    Timestamp TEXT,
    Content BLOB
);
CREATE INDEX IF NOT EXISTS MWRevisionPageIdIndex ON MWRevision(PageId);
";

/// A revision store backed by a SQLite database file.
pub struct SqlStore {
    /// The database connection.
    conn: Connection,
    /// Whether content blobs are gzip-compressed.
    gzipped: bool,
}

impl SqlStore {
    /// Opens (or creates) a store at `path`.
    pub fn open(path: impl AsRef<Path>, gzipped: bool) -> Result<Self, Error> {
        Self::from_connection(Connection::open(path)?, gzipped)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory(gzipped: bool) -> Result<Self, Error> {
        Self::from_connection(Connection::open_in_memory()?, gzipped)
    }

    /// Applies the schema to a fresh connection.
    fn from_connection(conn: Connection, gzipped: bool) -> Result<Self, Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, gzipped })
    }
}

impl RevisionSink for SqlStore {
    fn add_page(&mut self, pageid: u64, title: &str) -> Result<(), Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO MWPage VALUES (?1, ?2);",
            (pageid, title),
        )?;
        Ok(())
    }

    fn add_content(
        &mut self,
        pageid: u64,
        revid: u64,
        timestamp: &str,
        content: &str,
    ) -> Result<(), Error> {
        let blob = if self.gzipped {
            gzip(content.as_bytes())?
        } else {
            content.as_bytes().to_vec()
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO MWRevision VALUES (?1, ?2, ?3, ?4);",
            (revid, pageid, timestamp, blob),
        )?;
        Ok(())
    }
}

impl StoreReader for SqlStore {
    fn pages(&mut self) -> Result<Vec<(u64, String)>, Error> {
        let mut stmt = self.conn.prepare("SELECT PageId, Title FROM MWPage;")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn revisions(&mut self, pageid: u64) -> Result<Vec<(u64, String)>, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT RevId, Timestamp FROM MWRevision WHERE PageId = ?1;")?;
        let rows = stmt.query_map([pageid], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn content(&mut self, _pageid: u64, revid: u64) -> Result<String, Error> {
        let mut stmt = self
            .conn
            .prepare("SELECT Content FROM MWRevision WHERE RevId = ?1;")?;
        let mut rows = stmt.query([revid])?;
        let Some(row) = rows.next()? else {
            return Err(Error::NotFound(revid));
        };
        let blob: Vec<u8> = row.get(0)?;
        let bytes = if self.gzipped { gunzip(&blob)? } else { blob };
        String::from_utf8(bytes).map_err(|_| Error::Corrupt(format!("revision {revid} not UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(store: &mut SqlStore) {
        store.add_page(1, "Foo").unwrap();
        store
            .add_content(1, 10, "2004-08-09T01:41:27Z", "first")
            .unwrap();
        store
            .add_content(1, 11, "2004-09-01T00:00:00Z", "second")
            .unwrap();
        store.add_page(2, "Bar").unwrap();
        store
            .add_content(2, 20, "2005-01-01T00:00:00Z", "other")
            .unwrap();
    }

    #[test]
    fn round_trip() {
        let mut store = SqlStore::open_in_memory(false).unwrap();
        fill(&mut store);
        assert_eq!(
            store.pages().unwrap(),
            vec![(1, "Foo".to_string()), (2, "Bar".to_string())]
        );
        assert_eq!(
            store.revisions(1).unwrap(),
            vec![
                (10, "2004-08-09T01:41:27Z".to_string()),
                (11, "2004-09-01T00:00:00Z".to_string()),
            ]
        );
        assert_eq!(store.content(1, 11).unwrap(), "second");
        assert!(matches!(store.content(1, 99), Err(Error::NotFound(99))));
    }

    #[test]
    fn gzipped_round_trip() {
        let mut store = SqlStore::open_in_memory(true).unwrap();
        fill(&mut store);
        assert_eq!(store.content(2, 20).unwrap(), "other");
    }
}
