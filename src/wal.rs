use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Change;

/// Durable log of store changes, one framed record per `Change`:
///
/// `[u32 le: payload len][bincode payload][u32 le: crc32 of payload]`
///
/// Appends are buffered; the group-commit writer calls `flush_sync` once per
/// batch. A torn final record left by a crash fails its length or checksum
/// and is dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

fn write_frame(out: &mut impl Write, change: &Change) -> io::Result<()> {
    let payload =
        bincode::serialize(change).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    out.write_all(&len.to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())
}

enum Frame {
    Record(Change),
    End,
    Torn(&'static str),
}

/// `false` if the input ended before `buf` was filled.
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match input.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_frame(input: &mut impl Read) -> io::Result<Frame> {
    let mut word = [0u8; 4];
    if !read_full(input, &mut word)? {
        return Ok(Frame::End);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_full(input, &mut payload)? {
        return Ok(Frame::Torn("truncated payload"));
    }
    if !read_full(input, &mut word)? {
        return Ok(Frame::Torn("truncated checksum"));
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(Frame::Torn("checksum mismatch"));
    }
    Ok(match bincode::deserialize(&payload) {
        Ok(change) => Frame::Record(change),
        Err(_) => Frame::Torn("undecodable record"),
    })
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

    /// Buffer one record. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, change: &Change) -> io::Result<()> {
        write_frame(&mut self.writer, change)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replace the log with `changes`. The new contents are fsynced to a
    /// sibling file and renamed over the log, so a crash leaves either the
    /// old log or the new one.
    pub fn rewrite(&mut self, changes: &[Change]) -> io::Result<()> {
        self.flush_sync()?;
        let staging = self.path.with_extension("wal.tmp");
        {
            let mut out = BufWriter::new(File::create(&staging)?);
            for change in changes {
                write_frame(&mut out, change)?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&staging, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact record in `path`, in order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Change>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut input = BufReader::new(file);
        let mut changes = Vec::new();
        loop {
            match read_frame(&mut input)? {
                Frame::Record(change) => changes.push(change),
                Frame::End => break,
                Frame::Torn(reason) => {
                    tracing::warn!(
                        path = %path.display(),
                        kept = changes.len(),
                        reason,
                        "discarding torn log tail"
                    );
                    break;
                }
            }
        }
        Ok(changes)
    }
}
