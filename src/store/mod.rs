//! Content stores for extracted pages and revisions.
//!
//! Two interchangeable persistent backends — a SQLite table pair
//! ([`sql::SqlStore`]) and a constant hash database ([`cdb::CdbStore`]) —
//! plus a plain file writer ([`file::FileWriter`]) for pipelines that do
//! not need random access. Content may be transparently gzip-compressed;
//! the choice is a constructor flag on each backend.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

pub mod cdb;
pub mod file;
pub mod sql;

/// Store errors. These propagate to the caller; the core never tries to
/// recover a broken database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An underlying SQLite error.
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A revision lookup missed.
    #[error("revision {0} not found")]
    NotFound(u64),
    /// The database contents were not what they should be.
    #[error("corrupt store: {0}")]
    Corrupt(String),
}

/// The writer half of a store: receives pages and revision contents in
/// dump order.
pub trait RevisionSink {
    /// Registers a page. Must be called before the page's revisions.
    fn add_page(&mut self, pageid: u64, title: &str) -> Result<(), Error>;

    /// Stores one revision's content.
    fn add_content(
        &mut self,
        pageid: u64,
        revid: u64,
        timestamp: &str,
        content: &str,
    ) -> Result<(), Error>;

    /// Flushes and finalises the store.
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// The reader half of a store.
pub trait StoreReader {
    /// All `(pageid, title)` pairs.
    fn pages(&mut self) -> Result<Vec<(u64, String)>, Error>;

    /// All `(revid, timestamp)` pairs of a page. Backends without
    /// timestamps return empty strings.
    fn revisions(&mut self, pageid: u64) -> Result<Vec<(u64, String)>, Error>;

    /// One revision's content.
    fn content(&mut self, pageid: u64, revid: u64) -> Result<String, Error>;
}

/// Gzip-compresses a content blob.
pub(crate) fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a gzip content blob.
pub(crate) fn gunzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let data = "some wikitext ''content''".as_bytes();
        assert_eq!(gunzip(&gzip(data).unwrap()).unwrap(), data);
    }
}
