//! Append-only reservation event log.
//!
//! Frame layout, little-endian: `[u32 payload len][bincode Event][u32 crc32]`.
//! Replay stops at the first frame that is short, fails its checksum or does
//! not decode, and reports where the valid prefix ends. The log must be cut
//! back to that length before it is reopened for append, otherwise new frames
//! land behind the torn one and are never read again.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const HEADER_LEN: usize = 4;
const TRAILER_LEN: usize = 4;

fn frame(event: &Event) -> io::Result<Vec<u8>> {
    let body =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let body_len = u32::try_from(body.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + TRAILER_LEN);
    out.extend_from_slice(&body_len.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    Ok(out)
}

/// The event and its encoded length, or `Ok(None)` when the stream ends,
/// cleanly or not.
fn next_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut header = [0u8; HEADER_LEN];
    if !fill(reader, &mut header)? {
        return Ok(None);
    }
    let mut body = vec![0u8; u32::from_le_bytes(header) as usize];
    let mut trailer = [0u8; TRAILER_LEN];
    if !fill(reader, &mut body)? || !fill(reader, &mut trailer)? {
        return Ok(None);
    }
    if crc32fast::hash(&body) != u32::from_le_bytes(trailer) {
        return Ok(None);
    }
    let frame_len = (HEADER_LEN + body.len() + TRAILER_LEN) as u64;
    Ok(bincode::deserialize(&body).ok().map(|event| (event, frame_len)))
}

fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of reading a log from the start.
#[derive(Debug, Default)]
pub struct Replayed {
    pub events: Vec<Event>,
    /// Bytes covered by `events`. Anything after this is a torn or corrupt tail.
    pub valid_len: u64,
}

pub struct Wal {
    path: PathBuf,
    out: BufWriter<File>,
    /// Frames buffered since the log was opened or last rewritten.
    since_rewrite: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: BufWriter::new(file),
            since_rewrite: 0,
        })
    }

    /// Queue one event. Not durable until [`Wal::sync`].
    pub fn buffer(&mut self, event: &Event) -> io::Result<()> {
        self.out.write_all(&frame(event)?)?;
        self.since_rewrite += 1;
        Ok(())
    }

    pub fn sync(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.out.get_ref().sync_all()
    }

    pub fn since_rewrite(&self) -> u64 {
        self.since_rewrite
    }

    /// Replace the whole log with `events`: write a synced sibling file,
    /// rename it over the live one, reopen for append.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        self.sync()?;
        let staging = self.path.with_extension("wal.tmp");
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            for event in events {
                out.write_all(&frame(event)?)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        let reopened = Self::open(&self.path)?;
        *self = reopened;
        Ok(())
    }

    /// Events in append order. A missing file reads as empty.
    pub fn replay(path: &Path) -> io::Result<Replayed> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replayed::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replayed = Replayed::default();
        while let Some((event, frame_len)) = next_frame(&mut reader)? {
            replayed.events.push(event);
            replayed.valid_len += frame_len;
        }
        Ok(replayed)
    }

    /// Cut the log at `valid_len`, dropping a torn tail. Returns the number of
    /// bytes removed; a missing file or a clean log removes nothing.
    pub fn truncate_tail(path: &Path, valid_len: u64) -> io::Result<u64> {
        let file = match OpenOptions::new().write(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let len = file.metadata()?.len();
        if len <= valid_len {
            return Ok(0);
        }
        file.set_len(valid_len)?;
        file.sync_all()?;
        Ok(len - valid_len)
    }
}
