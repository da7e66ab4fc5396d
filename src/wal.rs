use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Largest payload a single entry may carry. Longer length prefixes read as corruption.
pub const MAX_ENTRY_BYTES: usize = 64 * 1024 * 1024;

/// Encode one entry as `[len][bincode][crc32]`.
fn encode_entry(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_ENTRY_BYTES {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "WAL entry too large"));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "WAL entry too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one entry. `Ok(None)` at a clean end or at a torn/corrupt tail.
fn decode_entry(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_ENTRY_BYTES {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only log of shop state changes.
///
/// Each entry is `[u32: len][bincode: Event][u32: crc32]`, where `len` counts only the payload.
/// A torn final entry (crash mid-write) fails the length or CRC check and is dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer one entry; durable only after `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_entry(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `events`: write a temp file, fsync, rename over, reopen.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                encode_entry(&mut writer, event)?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact entry in order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = decode_entry(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("shopfloor_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn bay_event(name: &str) -> Event {
        Event::new(
            Op::BayAdded,
            1_000,
            vec![Record::Bay(Bay {
                id: Ulid::new(),
                name: name.into(),
            })],
        )
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![bay_event("a"), bay_event("b")];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            wal.flush_sync().unwrap();
            assert_eq!(wal.appends_since_compact(), 2);
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn missing_file_replays_empty() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn torn_tail_is_discarded() {
        let path = tmp_path("torn_tail.wal");
        let first = bay_event("kept");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&first).unwrap();
            wal.append_buffered(&bay_event("torn")).unwrap();
            wal.flush_sync().unwrap();
        }
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt_crc.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&bay_event("x")).unwrap();
            wal.flush_sync().unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&path, bytes).unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn oversized_length_prefix_is_corrupt_tail() {
        let path = tmp_path("oversized_len.wal");
        let first = bay_event("kept");
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append_buffered(&first).unwrap();
            wal.flush_sync().unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&u32::MAX.to_le_bytes()).unwrap();
        file.write_all(&[0xab; 16]).unwrap();
        drop(file);

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn compact_replaces_contents() {
        let path = tmp_path("compact.wal");
        let mut wal = Wal::open(&path).unwrap();
        for i in 0..5 {
            wal.append_buffered(&bay_event(&format!("bay-{i}"))).unwrap();
        }
        wal.flush_sync().unwrap();

        let snapshot = vec![bay_event("only")];
        wal.compact(&snapshot).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let after = bay_event("after");
        wal.append_buffered(&after).unwrap();
        wal.flush_sync().unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![snapshot[0].clone(), after]);
    }
}
