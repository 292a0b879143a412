//! The tracker's own recoverable event log (spec §4.D, §6): a
//! length-prefixed, tagged-union append log of [`TrackerEvent`]s. Recovery
//! scans forward and discards a partial tail record; a malformed record
//! that is not a partial tail is [`TrackerError::RecoveryCorruption`] and
//! aborts startup (spec §7).
//!
//! Kept synchronous (plain `std::fs`) rather than async so the tracker can
//! append while holding its single exclusive lock (spec §5's "holding it
//! across WAL append is acceptable") without needing to `.await` inside a
//! non-async mutex guard.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::errors::{TrackerError, TrackerResult};
use crate::model::TrackerEvent;

const TAG_BLOCK_ADDED: u8 = 1;
const TAG_BATCH_ALLOCATED: u8 = 2;
const TAG_BATCH_CLEANED_UP: u8 = 3;

fn tag_of(event: &TrackerEvent) -> u8 {
    match event {
        TrackerEvent::BlockAdded(_) => TAG_BLOCK_ADDED,
        TrackerEvent::BatchAllocated(_, _) => TAG_BATCH_ALLOCATED,
        TrackerEvent::BatchCleanedUp(_) => TAG_BATCH_CLEANED_UP,
    }
}

/// The result of [`TrackerEventLog::replay`]: every well-formed event, plus
/// the byte offset of the end of the last well-formed frame. A caller that
/// intends to keep appending to this log must truncate it to `valid_len`
/// first, discarding any torn tail bytes replay stopped at — otherwise a
/// plain append-mode reopen (`O_APPEND`) would write new records behind
/// those torn bytes, corrupting the next replay.
pub struct ReplayedLog {
    pub events: Vec<TrackerEvent>,
    pub valid_len: u64,
}

/// A durable, forward-appendable log of [`TrackerEvent`]s backing the
/// coordinator's [`ReceivedBlockTracker`](crate::tracker::ReceivedBlockTracker).
pub struct TrackerEventLog {
    path: PathBuf,
    file: File,
}

impl TrackerEventLog {
    /// Opens (creating if absent) the event log at `path`.
    pub fn open(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        Ok(Self { path, file })
    }

    /// Truncates the file at `path` to `valid_len` before opening it for
    /// append, so a previous replay's discarded torn tail never reappears
    /// ahead of newly appended records. `valid_len` is normally the
    /// `valid_len` field of the [`ReplayedLog`] that preceded this call.
    pub fn open_truncated(path: impl AsRef<Path>, valid_len: u64) -> TrackerResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        file.set_len(valid_len)
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        Ok(Self { path, file })
    }

    /// Appends `event`, fsync-ing before returning so a crash immediately
    /// after this call cannot lose the record.
    pub fn append(&mut self, event: &TrackerEvent) -> TrackerResult<()> {
        let payload = rmp_serde::to_vec(event)
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        let tag = tag_of(event);
        let frame_len = (payload.len() + 1) as u32;

        self.file
            .write_all(&frame_len.to_le_bytes())
            .and_then(|_| self.file.write_all(&[tag]))
            .and_then(|_| self.file.write_all(&payload))
            .and_then(|_| self.file.sync_data())
            .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Scans the log forward from the beginning, returning every
    /// well-formed event in order along with the byte offset just past the
    /// last well-formed frame. A length prefix present without enough
    /// trailing bytes is treated as a partial tail write and discarded
    /// silently, without advancing past it. A length prefix whose bytes are
    /// present but fail to parse is [`TrackerError::RecoveryCorruption`].
    pub fn replay(path: impl AsRef<Path>) -> TrackerResult<ReplayedLog> {
        let mut file = match File::open(path.as_ref()) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(ReplayedLog { events: Vec::new(), valid_len: 0 })
            }
            Err(e) => return Err(TrackerError::StoreUnavailable(e.to_string())),
        };

        let mut events = Vec::new();
        let mut valid_len: u64 = 0;
        loop {
            let mut len_buf = [0u8; 4];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(TrackerError::StoreUnavailable(e.to_string())),
            }
            let frame_len = u32::from_le_bytes(len_buf) as usize;

            let mut frame = vec![0u8; frame_len];
            match file.read_exact(&mut frame) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // Partial tail: stop without advancing valid_len past
                    // the length prefix we just consumed.
                    break;
                }
                Err(e) => return Err(TrackerError::StoreUnavailable(e.to_string())),
            }

            if frame.is_empty() {
                return Err(TrackerError::RecoveryCorruption(
                    "zero-length frame".to_string(),
                ));
            }
            let (tag, payload) = frame.split_at(1);
            let event = match tag[0] {
                TAG_BLOCK_ADDED | TAG_BATCH_ALLOCATED | TAG_BATCH_CLEANED_UP => {
                    rmp_serde::from_slice::<TrackerEvent>(payload).map_err(|e| {
                        TrackerError::RecoveryCorruption(format!("undecodable record: {e}"))
                    })?
                }
                other => {
                    return Err(TrackerError::RecoveryCorruption(format!(
                        "unknown record tag {other}"
                    )))
                }
            };
            events.push(event);
            valid_len = file
                .stream_position()
                .map_err(|e| TrackerError::StoreUnavailable(e.to_string()))?;
        }
        Ok(ReplayedLog { events, valid_len })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockStoreResult, ReceivedBlockInfo, StorageLevel};
    use std::collections::HashMap;

    fn sample_info(stream_id: u32, seq: u64) -> ReceivedBlockInfo {
        ReceivedBlockInfo {
            stream_id,
            num_records: 3,
            store_result: BlockStoreResult::Direct {
                block_id: crate::model::BlockId { stream_id, sequence: seq },
                storage_level: StorageLevel::default(),
            },
        }
    }

    #[test]
    fn round_trips_all_event_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.log");

        let mut log = TrackerEventLog::open(&path).unwrap();
        log.append(&TrackerEvent::BlockAdded(sample_info(0, 0))).unwrap();
        let mut batch = HashMap::new();
        batch.insert(0u32, vec![sample_info(0, 0)]);
        log.append(&TrackerEvent::BatchAllocated(100, batch)).unwrap();
        log.append(&TrackerEvent::BatchCleanedUp(50)).unwrap();

        let replay = TrackerEventLog::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 3);
        assert!(matches!(replay.events[0], TrackerEvent::BlockAdded(_)));
        assert!(matches!(replay.events[1], TrackerEvent::BatchAllocated(100, _)));
        assert!(matches!(replay.events[2], TrackerEvent::BatchCleanedUp(50)));
        assert_eq!(replay.valid_len, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn discards_partial_tail_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.log");

        let mut log = TrackerEventLog::open(&path).unwrap();
        log.append(&TrackerEvent::BatchCleanedUp(1)).unwrap();
        drop(log);

        // Simulate a crash mid-write: a length prefix with no payload.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&999u32.to_le_bytes()).unwrap();
        file.write_all(&[1, 2, 3]).unwrap();

        let replay = TrackerEventLog::replay(&path).unwrap();
        assert_eq!(replay.events.len(), 1);
        // valid_len must stop before the torn length prefix + garbage, so
        // truncating to it discards exactly the torn bytes.
        assert!(replay.valid_len < std::fs::metadata(&path).unwrap().len());

        TrackerEventLog::open_truncated(&path, replay.valid_len).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), replay.valid_len);
    }

    #[test]
    fn rejects_non_tail_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.log");

        let mut file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        let garbage = vec![0xFFu8; 10];
        file.write_all(&(garbage.len() as u32).to_le_bytes()).unwrap();
        file.write_all(&garbage).unwrap();

        let result = TrackerEventLog::replay(&path);
        assert!(matches!(result, Err(TrackerError::RecoveryCorruption(_))));
    }
}
