//! SQLite-backed append-only observation journal.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    guess::cache::GuessCache,
    observation::{CacheSnapshotV1, OBS_FORMAT_VERSION, ObservationEnvelope, StoredObservation},
    types::ObsSeq,
};

use super::{GuessSink, PersistError, PersistResult};

const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    format_version: u16,
    snapshot: CacheSnapshotV1,
}

/// SQLite implementation of [`crate::persist::GuessSink`].
pub struct SqliteGuessJournal {
    conn: Connection,
}

impl SqliteGuessJournal {
    /// Opens or creates a journal at `path`.
    ///
    /// Enables WAL mode and sets `synchronous=NORMAL`.
    pub fn open(path: impl AsRef<Path>) -> PersistResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(conn)
    }

    /// Opens an in-memory journal.
    pub fn open_in_memory() -> PersistResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(conn)
    }

    fn init_connection(conn: Connection) -> PersistResult<Self> {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(Self { conn })
    }

    /// Replays the latest snapshot plus later rows into `cache`. Returns the
    /// last sequence applied, from which new writes should continue.
    pub fn load_into(&self, cache: &GuessCache) -> PersistResult<ObsSeq> {
        let mut last_seq = 0;
        let mut restored = 0;
        if let Some(snapshot) = self.load_latest_snapshot()? {
            last_seq = snapshot.last_seq;
            restored += cache.restore(snapshot.observations);
        }

        let tail = self.load_after(last_seq)?;
        if let Some(last) = tail.last() {
            last_seq = last.seq;
        }
        restored += cache.restore(tail.into_iter().map(|stored| stored.observation));

        info!(restored, last_seq, "observation journal replayed");
        Ok(last_seq.max(self.latest_seq()?))
    }

    /// Loads rows strictly after `seq`.
    pub fn load_after(&self, seq: ObsSeq) -> PersistResult<Vec<StoredObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, ts_ms, payload FROM observations WHERE seq > ?1 ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map(params![seq as i64], |row| {
            let seq: i64 = row.get(0)?;
            let ts_ms: i64 = row.get(1)?;
            let payload: Vec<u8> = row.get(2)?;
            let mut stored = decode_payload(&payload).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    payload.len(),
                    rusqlite::types::Type::Blob,
                    Box::new(std::io::Error::other(err)),
                )
            })?;
            stored.seq = seq as ObsSeq;
            stored.ts_ms = ts_ms as u64;
            Ok(stored)
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Writes a snapshot covering `snapshot.last_seq`.
    pub fn write_snapshot(&mut self, snapshot: &CacheSnapshotV1) -> PersistResult<()> {
        let env = SnapshotEnvelope {
            format_version: SNAPSHOT_FORMAT_VERSION,
            snapshot: snapshot.clone(),
        };
        let payload = serde_json::to_vec(&env)?;
        self.conn.execute(
            "INSERT INTO snapshots(last_seq, ts_ms, payload) VALUES (?1, ?2, ?3)",
            params![snapshot.last_seq as i64, now_ms() as i64, payload],
        )?;
        Ok(())
    }

    /// Deletes rows up to and including `seq`.
    pub fn compact_through(&mut self, seq: ObsSeq) -> PersistResult<usize> {
        let count = self
            .conn
            .execute("DELETE FROM observations WHERE seq <= ?1", params![seq as i64])?;
        Ok(count)
    }

    /// Highest sequence in the journal or the latest snapshot.
    pub fn latest_seq(&self) -> PersistResult<ObsSeq> {
        let rows: Option<i64> = self
            .conn
            .query_row("SELECT MAX(seq) FROM observations", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        let snap: Option<i64> = self
            .conn
            .query_row("SELECT MAX(last_seq) FROM snapshots", [], |row| {
                row.get::<_, Option<i64>>(0)
            })
            .optional()?
            .flatten();
        Ok(rows.unwrap_or(0).max(snap.unwrap_or(0)) as ObsSeq)
    }

    fn load_latest_snapshot(&self) -> PersistResult<Option<CacheSnapshotV1>> {
        let payload: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT payload FROM snapshots ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        let env: SnapshotEnvelope = serde_json::from_slice(&payload)?;
        if env.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(PersistError::Message(format!(
                "unsupported snapshot format version: {}",
                env.format_version
            )));
        }
        Ok(Some(env.snapshot))
    }
}

impl GuessSink for SqliteGuessJournal {
    fn append(&mut self, observations: &[StoredObservation]) -> PersistResult<ObsSeq> {
        if observations.is_empty() {
            return self.latest_seq();
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO observations(seq, ts_ms, callsign, field, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for stored in observations {
                let payload = serde_json::to_vec(&ObservationEnvelope::new(stored.clone()))?;
                stmt.execute(params![
                    stored.seq as i64,
                    stored.ts_ms as i64,
                    stored.observation.call,
                    stored.observation.field,
                    payload,
                ])?;
            }
        }
        tx.commit()?;

        Ok(observations.last().map(|o| o.seq).unwrap_or(0))
    }

    fn latest_seq(&self) -> PersistResult<ObsSeq> {
        SqliteGuessJournal::latest_seq(self)
    }

    fn flush(&mut self) -> PersistResult<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);")?;
        Ok(())
    }

    fn write_snapshot(&mut self, snapshot: &CacheSnapshotV1) -> PersistResult<()> {
        SqliteGuessJournal::write_snapshot(self, snapshot)
    }

    fn compact_through(&mut self, seq: ObsSeq) -> PersistResult<usize> {
        SqliteGuessJournal::compact_through(self, seq)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn decode_payload(payload: &[u8]) -> Result<StoredObservation, String> {
    let envelope: ObservationEnvelope = serde_json::from_slice(payload)
        .map_err(|e| format!("observation payload decode failed: {e}"))?;
    if envelope.format_version != OBS_FORMAT_VERSION {
        return Err(format!(
            "unsupported observation format version: {}",
            envelope.format_version
        ));
    }
    Ok(envelope.stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;

    fn stored(seq: ObsSeq, call: &str, field: &str, value: &str) -> StoredObservation {
        StoredObservation {
            seq,
            ts_ms: seq * 10,
            observation: Observation::new(call, field, value),
        }
    }

    #[test]
    fn append_then_load_after_preserves_order() {
        let mut journal = SqliteGuessJournal::open_in_memory().unwrap();
        let last = journal
            .append(&[stored(1, "K1AR", "SECTION", "NH"), stored(2, "N2IC", "SECTION", "NM")])
            .unwrap();
        assert_eq!(last, 2);
        assert_eq!(journal.latest_seq().unwrap(), 2);

        let tail = journal.load_after(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].observation.call, "N2IC");
        assert_eq!(tail[0].ts_ms, 20);
    }

    #[test]
    fn compaction_keeps_snapshot_sequence() {
        let mut journal = SqliteGuessJournal::open_in_memory().unwrap();
        journal.append(&[stored(1, "K1AR", "CHECK", "76")]).unwrap();
        journal
            .write_snapshot(&CacheSnapshotV1 {
                last_seq: 1,
                observations: vec![Observation::new("K1AR", "CHECK", "76")],
            })
            .unwrap();
        assert_eq!(journal.compact_through(1).unwrap(), 1);
        assert_eq!(journal.latest_seq().unwrap(), 1);
        assert!(journal.load_after(0).unwrap().is_empty());
    }
}
