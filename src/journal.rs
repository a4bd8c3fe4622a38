//! Append-only journal for the offline queue.
//!
//! Two record kinds are appended: the full transition event when it is
//! enqueued, and a sync confirmation once every sink has accepted it.
//! Replaying the journal on open reconstructs exactly the unsynced events,
//! so a crash re-delivers at least once; downstream consumers deduplicate
//! by event id. Once confirmations dominate the file, a compaction rewrites
//! it with only the live (unsynced) events.

use crate::error::{PerimeterError, Result};
use crate::types::{LocationFix, SyncMode, SyncPolicy, TransitionEvent, TransitionKind};
use bytes::{BufMut, BytesMut};
use geo::Point;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Journal tuning knobs.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Attempt compaction when file size exceeds this many bytes.
    pub compact_size_threshold: u64,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            compact_size_threshold: 16 * 1024 * 1024,
        }
    }
}

const SCRATCH_INITIAL_CAPACITY: usize = 4 * 1024;

/// A replayed journal record.
#[derive(Debug)]
pub enum JournalCommand {
    Append(TransitionEvent),
    MarkSynced(Uuid),
}

const CMD_APPEND: u8 = 0;
const CMD_SYNCED: u8 = 1;

const KIND_ENTER: u8 = 0;
const KIND_EXIT: u8 = 1;

/// Append-only file of transition records.
pub struct EventJournal {
    file: File,
    writer: BufWriter<File>,
    path: PathBuf,
    size: u64,
    config: JournalConfig,
    scratch: BytesMut,
    last_sync: Instant,
    compaction_in_progress: bool,
}

impl EventJournal {
    /// Open a journal with default configuration, creating the file if
    /// needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, JournalConfig::default())
    }

    /// Open a journal with custom configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: JournalConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let size = file.metadata()?.len();
        let writer_file = file.try_clone()?;
        let writer = BufWriter::new(writer_file);

        Ok(EventJournal {
            file,
            writer,
            path,
            size,
            config,
            scratch: BytesMut::with_capacity(SCRATCH_INITIAL_CAPACITY),
            last_sync: Instant::now(),
            compaction_in_progress: false,
        })
    }

    /// Current file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a newly enqueued event.
    pub fn append_event(&mut self, event: &TransitionEvent) -> Result<()> {
        let len = self.serialize_append(event)?;
        self.write_scratch(len)
    }

    /// Append a sync confirmation for an event id.
    pub fn append_synced(&mut self, id: &Uuid) -> Result<()> {
        self.scratch.clear();
        self.scratch.put_u8(CMD_SYNCED);
        self.scratch.put_slice(id.as_bytes());
        let len = self.scratch.len();
        self.write_scratch(len)
    }

    fn write_scratch(&mut self, len: usize) -> Result<()> {
        if self.compaction_in_progress {
            return Err(PerimeterError::CompactionInProgress);
        }
        self.writer.write_all(&self.scratch[..len])?;
        self.size += len as u64;
        Ok(())
    }

    fn serialize_append(&mut self, event: &TransitionEvent) -> Result<usize> {
        let region_bytes = event.region_id.as_bytes();
        let needed = 1 + 16 + 1 + 4 + region_bytes.len() + 8 * 3 + 8 * 2;
        self.scratch.clear();
        if self.scratch.capacity() < needed {
            self.scratch.reserve(needed - self.scratch.capacity());
        }
        let buf = &mut self.scratch;

        buf.put_u8(CMD_APPEND);
        buf.put_slice(event.id.as_bytes());
        buf.put_u8(match event.kind {
            TransitionKind::Enter => KIND_ENTER,
            TransitionKind::Exit => KIND_EXIT,
        });

        buf.put_u32(region_bytes.len() as u32);
        buf.put(region_bytes);

        buf.put_f64(event.fix.point.x());
        buf.put_f64(event.fix.point.y());
        buf.put_f64(event.fix.accuracy_m);
        buf.put_u64(millis_since_epoch(event.fix.timestamp)?);
        buf.put_u64(millis_since_epoch(event.timestamp)?);

        Ok(buf.len())
    }

    /// Replay all records from the start of the file.
    pub fn replay(&mut self) -> Result<Vec<JournalCommand>> {
        self.writer.flush()?;
        self.file.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut self.file);
        let mut commands = Vec::new();

        loop {
            match Self::deserialize_command(&mut reader) {
                Ok(command) => commands.push(command),
                Err(PerimeterError::UnexpectedEof) => break,
                Err(e) => return Err(e),
            }
        }

        Ok(commands)
    }

    fn deserialize_command(reader: &mut BufReader<&mut File>) -> Result<JournalCommand> {
        let mut cmd_buf = [0u8; 1];
        if reader.read_exact(&mut cmd_buf).is_err() {
            return Err(PerimeterError::UnexpectedEof);
        }

        match cmd_buf[0] {
            CMD_APPEND => {
                let id = Self::read_uuid(reader)?;

                let mut kind_buf = [0u8; 1];
                read_or_eof(reader, &mut kind_buf)?;
                let kind = match kind_buf[0] {
                    KIND_ENTER => TransitionKind::Enter,
                    KIND_EXIT => TransitionKind::Exit,
                    _ => return Err(PerimeterError::InvalidFormat),
                };

                let mut len_buf = [0u8; 4];
                read_or_eof(reader, &mut len_buf)?;
                let len = u32::from_be_bytes(len_buf) as usize;
                let mut region_buf = vec![0u8; len];
                read_or_eof(reader, &mut region_buf)?;
                let region_id =
                    String::from_utf8(region_buf).map_err(|_| PerimeterError::InvalidFormat)?;

                let lon = Self::read_f64(reader)?;
                let lat = Self::read_f64(reader)?;
                let accuracy_m = Self::read_f64(reader)?;
                let fix_ts = Self::read_millis(reader)?;
                let event_ts = Self::read_millis(reader)?;

                Ok(JournalCommand::Append(TransitionEvent {
                    id,
                    region_id,
                    kind,
                    fix: LocationFix {
                        point: Point::new(lon, lat),
                        accuracy_m,
                        timestamp: fix_ts,
                    },
                    timestamp: event_ts,
                    synced: false,
                }))
            }
            CMD_SYNCED => {
                let id = Self::read_uuid(reader)?;
                Ok(JournalCommand::MarkSynced(id))
            }
            _ => Err(PerimeterError::InvalidFormat),
        }
    }

    fn read_uuid(reader: &mut BufReader<&mut File>) -> Result<Uuid> {
        let mut buf = [0u8; 16];
        read_or_eof(reader, &mut buf)?;
        Ok(Uuid::from_bytes(buf))
    }

    fn read_f64(reader: &mut BufReader<&mut File>) -> Result<f64> {
        let mut buf = [0u8; 8];
        read_or_eof(reader, &mut buf)?;
        Ok(f64::from_be_bytes(buf))
    }

    fn read_millis(reader: &mut BufReader<&mut File>) -> Result<SystemTime> {
        let mut buf = [0u8; 8];
        read_or_eof(reader, &mut buf)?;
        let ms = u64::from_be_bytes(buf);
        Ok(UNIX_EPOCH + Duration::from_millis(ms))
    }

    /// Flush buffered writes to the OS.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and fsync everything.
    pub fn sync(&mut self) -> Result<()> {
        self.sync_with_mode(SyncMode::All)
    }

    /// Flush and sync using the provided mode.
    pub fn sync_with_mode(&mut self, mode: SyncMode) -> Result<()> {
        self.writer.flush()?;
        match mode {
            SyncMode::All => self.file.sync_all()?,
            SyncMode::Data => self.file.sync_data()?,
        }
        self.last_sync = Instant::now();
        Ok(())
    }

    /// Apply a sync policy after a write.
    pub fn maybe_sync(&mut self, policy: SyncPolicy, mode: SyncMode) -> Result<()> {
        match policy {
            SyncPolicy::Never => Ok(()),
            SyncPolicy::Always => self.sync_with_mode(mode),
            SyncPolicy::EverySecond => {
                if self.last_sync.elapsed() >= Duration::from_secs(1) {
                    self.sync_with_mode(mode)
                } else {
                    self.flush()
                }
            }
        }
    }

    /// Whether the file has grown past the compaction threshold.
    pub fn should_compact(&self) -> bool {
        !self.compaction_in_progress && self.size >= self.config.compact_size_threshold
    }

    /// Rewrite the journal with only the given live events.
    ///
    /// The rewrite goes to a temporary file, is synced, then atomically
    /// renamed over the old journal before handles are reopened.
    pub fn compact(&mut self, live: &[TransitionEvent]) -> Result<()> {
        if self.compaction_in_progress {
            return Err(PerimeterError::CompactionInProgress);
        }

        self.compaction_in_progress = true;

        let result = (|| {
            self.writer.flush()?;
            self.file.sync_all()?;

            let compact_path = self.path.with_extension("journal.compact");
            // A leftover file from an interrupted compaction must not be
            // appended to.
            let _ = std::fs::remove_file(&compact_path);
            {
                let mut compact =
                    EventJournal::open_with_config(&compact_path, self.config.clone())?;
                for event in live {
                    let len = compact.serialize_append(event)?;
                    compact.writer.write_all(&compact.scratch[..len])?;
                    compact.size += len as u64;
                }
                compact.sync()?;
            }

            std::fs::rename(&compact_path, &self.path)?;

            let new_file = OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(&self.path)?;

            let new_size = new_file.metadata()?.len();
            let writer_file = new_file.try_clone()?;
            self.file = new_file;
            self.writer = BufWriter::new(writer_file);
            self.size = new_size;

            Ok(())
        })();

        self.compaction_in_progress = false;

        result
    }
}

impl Drop for EventJournal {
    fn drop(&mut self) {
        // Best effort flush on drop, ignore errors
        let _ = self.writer.flush();
    }
}

fn millis_since_epoch(at: SystemTime) -> Result<u64> {
    let ms = at
        .duration_since(UNIX_EPOCH)
        .map_err(|_| PerimeterError::InvalidTimestamp)?
        .as_millis();
    u64::try_from(ms).map_err(|_| PerimeterError::InvalidTimestamp)
}

fn read_or_eof(reader: &mut BufReader<&mut File>, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => PerimeterError::UnexpectedEof,
        _ => PerimeterError::from(err),
    })
}
