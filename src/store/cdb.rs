//! The constant-hash-database store backend.
//!
//! The file layout is the classic cdb format: a 2048-byte header of 256
//! `(table position, slot count)` pairs, then the records
//! (`klen`/`vlen`/key/value, all little-endian), then 256 open-addressed
//! hash tables. Databases are built through a `.tmp` file and renamed
//! into place, so a finished database is always complete.
//!
//! On top of the raw format sits the MediaWiki key scheme:
//! `{pageid}:title`, `{pageid}:revs` (space-joined revision ids) and
//! `{pageid}/{revid}:wiki` / `{pageid}/{revid}:text` for content.

use super::{Error, RevisionSink, StoreReader, gunzip, gzip};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// The fixed size of the bucket pointer header.
const HEADER_SIZE: u64 = 2048;

/// The cdb hash: djb's h = 33·h ⊕ c, seeded with 5381.
fn cdb_hash(key: &[u8]) -> u32 {
    let mut hash = 5381u32;
    for &byte in key {
        hash = hash.wrapping_mul(33) ^ u32::from(byte);
    }
    hash
}

/// Reads a little-endian u32 pair.
fn read_pair(reader: &mut impl Read) -> std::io::Result<(u32, u32)> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok((
        u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
    ))
}

/// A cdb file under construction.
pub struct CdbWriter {
    /// The temporary file being written.
    file: File,
    /// The final database path.
    path: PathBuf,
    /// The temporary path, renamed on [`CdbWriter::finish`].
    tmp: PathBuf,
    /// Offset of the next record.
    pos: u32,
    /// `(hash, record position)` pairs per bucket.
    buckets: Vec<Vec<(u32, u32)>>,
}

impl CdbWriter {
    /// Starts a new database at `path`.
    pub fn create(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp = {
            let mut name = path.as_os_str().to_os_string();
            name.push(".tmp");
            PathBuf::from(name)
        };
        let mut file = File::create(&tmp)?;
        file.write_all(&[0u8; HEADER_SIZE as usize])?;
        Ok(Self {
            file,
            path,
            tmp,
            pos: u32::try_from(HEADER_SIZE).unwrap_or(2048),
            buckets: vec![Vec::new(); 256],
        })
    }

    /// Appends one record.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> std::io::Result<()> {
        let klen = u32::try_from(key.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "key too long"))?;
        let vlen = u32::try_from(value.len())
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "value too long"))?;
        self.file.write_all(&klen.to_le_bytes())?;
        self.file.write_all(&vlen.to_le_bytes())?;
        self.file.write_all(key)?;
        self.file.write_all(value)?;
        let hash = cdb_hash(key);
        self.buckets[(hash as usize) % 256].push((hash, self.pos));
        self.pos = self
            .pos
            .wrapping_add(8)
            .wrapping_add(klen)
            .wrapping_add(vlen);
        Ok(())
    }

    /// Writes the hash tables and header and renames the database into
    /// place.
    pub fn finish(mut self) -> std::io::Result<()> {
        let mut header = Vec::with_capacity(512);
        let mut table_pos = self.pos;
        for bucket in &self.buckets {
            // Twice as many slots as entries keeps probe chains short.
            let slots = bucket.len() * 2;
            header.push((table_pos, u32::try_from(slots).unwrap_or(u32::MAX)));
            let mut table = vec![(0u32, 0u32); slots];
            for &(hash, pos) in bucket {
                let mut index = ((hash >> 8) as usize) % slots;
                while table[index].1 != 0 {
                    index = (index + 1) % slots;
                }
                table[index] = (hash, pos);
            }
            let mut bytes = Vec::with_capacity(slots * 8);
            for (hash, pos) in table {
                bytes.extend_from_slice(&hash.to_le_bytes());
                bytes.extend_from_slice(&pos.to_le_bytes());
            }
            self.file.write_all(&bytes)?;
            table_pos = table_pos.wrapping_add(u32::try_from(slots * 8).unwrap_or(0));
        }
        self.file.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE as usize);
        for (pos, slots) in header {
            bytes.extend_from_slice(&pos.to_le_bytes());
            bytes.extend_from_slice(&slots.to_le_bytes());
        }
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;
        std::fs::rename(&self.tmp, &self.path)
    }
}

/// A finished cdb file, open for lookups and iteration.
pub struct CdbReader {
    /// The database file.
    file: File,
    /// The 256 `(table position, slot count)` header pairs.
    header: Vec<(u32, u32)>,
}

impl CdbReader {
    /// Opens a database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut file = File::open(path)?;
        let mut header = Vec::with_capacity(256);
        for _ in 0..256 {
            header.push(read_pair(&mut file)?);
        }
        Ok(Self { file, header })
    }

    /// Looks up a key.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let hash = cdb_hash(key);
        let (table_pos, slots) = self.header[(hash as usize) % 256];
        if slots == 0 {
            return Ok(None);
        }
        self.file.seek(SeekFrom::Start(u64::from(table_pos)))?;
        let mut table = Vec::with_capacity(slots as usize);
        for _ in 0..slots {
            table.push(read_pair(&mut self.file)?);
        }
        let start = ((hash >> 8) % slots) as usize;
        for step in 0..slots as usize {
            let (slot_hash, record_pos) = table[(start + step) % slots as usize];
            if record_pos == 0 {
                return Ok(None);
            }
            if slot_hash != hash {
                continue;
            }
            self.file.seek(SeekFrom::Start(u64::from(record_pos)))?;
            let (klen, vlen) = read_pair(&mut self.file)?;
            let mut found = vec![0u8; klen as usize];
            self.file.read_exact(&mut found)?;
            if found == key {
                let mut value = vec![0u8; vlen as usize];
                self.file.read_exact(&mut value)?;
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Iterates every record in insertion order.
    pub fn entries(&mut self) -> Entries<'_> {
        let end = self.header.first().map_or(0, |&(pos, _)| pos);
        Entries {
            reader: self,
            pos: u32::try_from(HEADER_SIZE).unwrap_or(2048),
            end,
        }
    }
}

/// Iterator over the records of a [`CdbReader`].
pub struct Entries<'a> {
    /// The underlying reader.
    reader: &'a mut CdbReader,
    /// Offset of the next record.
    pos: u32,
    /// Offset of the first hash table, i.e. the end of record data.
    end: u32,
}

impl Iterator for Entries<'_> {
    type Item = Result<(Vec<u8>, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let result = (|| {
            self.reader
                .file
                .seek(SeekFrom::Start(u64::from(self.pos)))?;
            let (klen, vlen) = read_pair(&mut self.reader.file)?;
            let mut key = vec![0u8; klen as usize];
            self.reader.file.read_exact(&mut key)?;
            let mut value = vec![0u8; vlen as usize];
            self.reader.file.read_exact(&mut value)?;
            self.pos = self
                .pos
                .wrapping_add(8)
                .wrapping_add(klen)
                .wrapping_add(vlen);
            Ok((key, value))
        })();
        Some(result.map_err(Error::Io))
    }
}

/// A revision store writing the MediaWiki key scheme into a cdb file.
pub struct CdbStore {
    /// The database under construction; `None` after close.
    writer: Option<CdbWriter>,
    /// Whether content values are gzip-compressed.
    gzipped: bool,
    /// The page currently receiving revisions.
    pageid: Option<u64>,
    /// Revision ids of the current page, for the `:revs` record.
    revids: Vec<u64>,
}

impl CdbStore {
    /// Starts a new store at `path`.
    pub fn create(path: impl AsRef<Path>, gzipped: bool) -> Result<Self, Error> {
        Ok(Self {
            writer: Some(CdbWriter::create(path)?),
            gzipped,
            pageid: None,
            revids: Vec::new(),
        })
    }

    /// Borrows the writer, failing after close.
    fn writer(&mut self) -> Result<&mut CdbWriter, Error> {
        self.writer
            .as_mut()
            .ok_or_else(|| Error::Corrupt("store already closed".to_string()))
    }

    /// Writes the pending `:revs` record for the finished page.
    fn flush_revs(&mut self) -> Result<(), Error> {
        if let Some(pageid) = self.pageid
            && !self.revids.is_empty()
        {
            let revs = self
                .revids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let key = format!("{pageid}:revs");
            self.writer()?.add(key.as_bytes(), revs.as_bytes())?;
        }
        self.revids.clear();
        Ok(())
    }
}

impl RevisionSink for CdbStore {
    fn add_page(&mut self, pageid: u64, title: &str) -> Result<(), Error> {
        self.flush_revs()?;
        self.pageid = Some(pageid);
        let key = format!("{pageid}:title");
        self.writer()?.add(key.as_bytes(), title.as_bytes())?;
        Ok(())
    }

    fn add_content(
        &mut self,
        pageid: u64,
        revid: u64,
        _timestamp: &str,
        content: &str,
    ) -> Result<(), Error> {
        self.revids.push(revid);
        let key = format!("{pageid}/{revid}:wiki");
        let data = if self.gzipped {
            gzip(content.as_bytes())?
        } else {
            content.as_bytes().to_vec()
        };
        self.writer()?.add(key.as_bytes(), &data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.flush_revs()?;
        if let Some(writer) = self.writer.take() {
            writer.finish()?;
        }
        Ok(())
    }
}

/// Read access to a cdb store written with the MediaWiki key scheme.
pub struct CdbDump {
    /// The underlying database.
    reader: CdbReader,
    /// Whether content values are gzip-compressed.
    gzipped: bool,
}

impl CdbDump {
    /// Opens a store.
    pub fn open(path: impl AsRef<Path>, gzipped: bool) -> Result<Self, Error> {
        Ok(Self {
            reader: CdbReader::open(path)?,
            gzipped,
        })
    }
}

impl StoreReader for CdbDump {
    fn pages(&mut self) -> Result<Vec<(u64, String)>, Error> {
        let mut pages = Vec::new();
        for entry in self.reader.entries() {
            let (key, value) = entry?;
            let Ok(key) = core::str::from_utf8(&key) else {
                continue;
            };
            if let Some(pageid) = key.strip_suffix(":title") {
                let pageid = pageid
                    .parse()
                    .map_err(|_| Error::Corrupt(format!("bad page key {key}")))?;
                pages.push((pageid, String::from_utf8_lossy(&value).into_owned()));
            }
        }
        Ok(pages)
    }

    fn revisions(&mut self, pageid: u64) -> Result<Vec<(u64, String)>, Error> {
        let key = format!("{pageid}:revs");
        let Some(value) = self.reader.get(key.as_bytes())? else {
            return Ok(Vec::new());
        };
        let revs = String::from_utf8_lossy(&value);
        revs.split_whitespace()
            .map(|id| {
                id.parse()
                    .map(|revid| (revid, String::new()))
                    .map_err(|_| Error::Corrupt(format!("bad revs entry {id}")))
            })
            .collect()
    }

    fn content(&mut self, pageid: u64, revid: u64) -> Result<String, Error> {
        let mut data = None;
        for kind in ["wiki", "text"] {
            let key = format!("{pageid}/{revid}:{kind}");
            if let Some(value) = self.reader.get(key.as_bytes())? {
                data = Some(value);
                break;
            }
        }
        let Some(data) = data else {
            return Err(Error::NotFound(revid));
        };
        let bytes = if self.gzipped { gunzip(&data)? } else { data };
        String::from_utf8(bytes).map_err(|_| Error::Corrupt(format!("revision {revid} not UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mwp-cdb-{}-{name}", std::process::id()))
    }

    #[test]
    fn raw_round_trip() {
        let path = temp_path("raw.cdb");
        let mut writer = CdbWriter::create(&path).unwrap();
        for i in 0..100u32 {
            writer
                .add(format!("key{i}").as_bytes(), format!("value{i}").as_bytes())
                .unwrap();
        }
        writer.finish().unwrap();

        let mut reader = CdbReader::open(&path).unwrap();
        for i in 0..100u32 {
            assert_eq!(
                reader.get(format!("key{i}").as_bytes()).unwrap(),
                Some(format!("value{i}").into_bytes()),
            );
        }
        assert_eq!(reader.get(b"missing").unwrap(), None);
        assert_eq!(reader.entries().count(), 100);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_database() {
        let path = temp_path("empty.cdb");
        CdbWriter::create(&path).unwrap().finish().unwrap();
        let mut reader = CdbReader::open(&path).unwrap();
        assert_eq!(reader.get(b"anything").unwrap(), None);
        assert_eq!(reader.entries().count(), 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn store_round_trip() {
        let path = temp_path("store.cdb");
        let mut store = CdbStore::create(&path, true).unwrap();
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
        store.close().unwrap();

        let mut dump = CdbDump::open(&path, true).unwrap();
        assert_eq!(
            dump.pages().unwrap(),
            vec![(1, "Foo".to_string()), (2, "Bar".to_string())]
        );
        assert_eq!(
            dump.revisions(1).unwrap(),
            vec![(10, String::new()), (11, String::new())]
        );
        assert_eq!(dump.content(1, 10).unwrap(), "first");
        assert_eq!(dump.content(2, 20).unwrap(), "other");
        assert!(matches!(dump.content(2, 99), Err(Error::NotFound(99))));
        std::fs::remove_file(&path).unwrap();
    }
}
