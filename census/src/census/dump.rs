//! Streaming census export: newline-delimited JSON, optionally paginated.

use std::io::{self, Read};
use std::time::{SystemTime, UNIX_EPOCH};

use num_bigint::BigUint;
use num_traits::Zero;

use super::CensusTree;
use crate::{
    error::CensusError,
    participant::{CensusDump, CensusParticipant},
};

/// Ranges up to this size are snapshotted under a single read lock.
const SNAPSHOT_THRESHOLD: usize = 10_000;

/// Batch size for the streaming mode.
const BATCH_SIZE: usize = 1_000;

impl CensusTree {
    /// Stream every census entry as newline-delimited JSON, ordered by
    /// tree index. Equivalent to `dump_range(0, -1)`.
    pub fn dump(&self) -> DumpReader<'_> {
        self.dump_range(0, -1)
    }

    /// Stream the entries in `[offset, min(offset + limit, size))` as
    /// newline-delimited JSON. Negative offsets clamp to 0; `limit = -1`
    /// means "to the end". Empty slots are emitted as the zero participant.
    ///
    /// Bounded ranges up to 10 000 entries are snapshotted under one read
    /// lock and then streamed. Larger or unbounded ranges stream in batches
    /// of 1 000, reacquiring the read lock per batch: that mode does NOT
    /// present a single-snapshot view: writes landing between batches may
    /// be reflected. Consumers needing a consistent snapshot should dump
    /// bounded sub-ranges or use [`dump_all`](CensusTree::dump_all).
    pub fn dump_range(&self, offset: i64, limit: i64) -> DumpReader<'_> {
        let size = self.size();
        let offset = offset.max(0) as usize;
        if offset >= size {
            return DumpReader::finished(self);
        }
        let end = if limit >= 0 {
            (offset + limit as usize).min(size)
        } else {
            size
        };

        if limit >= 0 && end - offset <= SNAPSHOT_THRESHOLD {
            match self.collect_range(offset, end) {
                Ok(entries) => DumpReader::snapshot(self, entries),
                Err(err) => DumpReader::failed(self, err),
            }
        } else {
            DumpReader::batched(self, offset, end)
        }
    }

    /// Materialize the whole census as a [`CensusDump`]: root, timestamp,
    /// aggregate weight and every slot. Fails on an empty census.
    pub fn dump_all(&self) -> Result<CensusDump, CensusError> {
        let state = self.read_state();
        let root = state.tree.root().ok_or(CensusError::EmptyCensus)?;
        let size = state.tree.size();

        let mut participants = Vec::with_capacity(size);
        let mut total_weight = BigUint::zero();
        let mut total_entries = 0usize;

        for index in 0..size {
            match state.index_to_address.get(&index) {
                None => participants.push(CensusParticipant::empty_slot(index as u64)),
                Some(address) => {
                    let weight = state
                        .weights
                        .get(address)
                        .ok_or_else(|| {
                            CensusError::DataCorruption(format!("missing weight for {address}"))
                        })?
                        .clone();
                    total_weight += &weight;
                    total_entries += 1;
                    participants.push(CensusParticipant {
                        index: index as u64,
                        address: *address,
                        weight,
                    });
                }
            }
        }

        Ok(CensusDump {
            root,
            timestamp: unix_now(),
            total_entries,
            total_weight,
            participants,
        })
    }

    /// Collect `[start, end)` under one read lock. A known address with no
    /// weight entry is a corruption error.
    pub(super) fn collect_range(
        &self,
        start: usize,
        end: usize,
    ) -> Result<Vec<CensusParticipant>, CensusError> {
        let state = self.read_state();
        let mut entries = Vec::with_capacity(end - start);
        for index in start..end {
            match state.index_to_address.get(&index) {
                None => entries.push(CensusParticipant::empty_slot(index as u64)),
                Some(address) => {
                    let weight = state
                        .weights
                        .get(address)
                        .ok_or_else(|| {
                            CensusError::DataCorruption(format!("missing weight for {address}"))
                        })?
                        .clone();
                    entries.push(CensusParticipant {
                        index: index as u64,
                        address: *address,
                        weight,
                    });
                }
            }
        }
        Ok(entries)
    }
}

enum Mode {
    /// Entries collected upfront, encoded lazily.
    Snapshot(std::vec::IntoIter<CensusParticipant>),
    /// Remaining `[next, end)` range, fetched batch by batch.
    Batched { next: usize, end: usize },
    Finished,
}

/// `Read` adapter streaming census participants as one JSON object per
/// line. Produced by [`CensusTree::dump`] and [`CensusTree::dump_range`].
pub struct DumpReader<'a> {
    census: &'a CensusTree,
    mode: Mode,
    pending_error: Option<CensusError>,
    buf: Vec<u8>,
    pos: usize,
}

impl<'a> DumpReader<'a> {
    fn snapshot(census: &'a CensusTree, entries: Vec<CensusParticipant>) -> Self {
        Self {
            census,
            mode: Mode::Snapshot(entries.into_iter()),
            pending_error: None,
            buf: Vec::new(),
            pos: 0,
        }
    }

    fn batched(census: &'a CensusTree, next: usize, end: usize) -> Self {
        Self {
            census,
            mode: Mode::Batched { next, end },
            pending_error: None,
            buf: Vec::new(),
            pos: 0,
        }
    }

    fn finished(census: &'a CensusTree) -> Self {
        Self {
            census,
            mode: Mode::Finished,
            pending_error: None,
            buf: Vec::new(),
            pos: 0,
        }
    }

    fn failed(census: &'a CensusTree, err: CensusError) -> Self {
        Self {
            census,
            mode: Mode::Finished,
            pending_error: Some(err),
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Refill the line buffer from the next snapshot entry or batch.
    fn refill(&mut self) -> io::Result<bool> {
        self.buf.clear();
        self.pos = 0;

        match &mut self.mode {
            Mode::Snapshot(entries) => match entries.next() {
                Some(participant) => {
                    encode_line(&mut self.buf, &participant)?;
                    Ok(true)
                }
                None => {
                    self.mode = Mode::Finished;
                    Ok(false)
                }
            },
            Mode::Batched { next, end } => {
                if *next >= *end {
                    self.mode = Mode::Finished;
                    return Ok(false);
                }
                let batch_end = (*next + BATCH_SIZE).min(*end);
                let batch = self
                    .census
                    .collect_range(*next, batch_end)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
                *next = batch_end;
                for participant in &batch {
                    encode_line(&mut self.buf, participant)?;
                }
                Ok(true)
            }
            Mode::Finished => Ok(false),
        }
    }
}

impl Read for DumpReader<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.buf.len() {
                let n = out.len().min(self.buf.len() - self.pos);
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if let Some(err) = self.pending_error.take() {
                return Err(io::Error::new(io::ErrorKind::InvalidData, err));
            }
            if !self.refill()? {
                return Ok(0);
            }
        }
    }
}

fn encode_line(buf: &mut Vec<u8>, participant: &CensusParticipant) -> io::Result<()> {
    serde_json::to_writer(&mut *buf, participant)?;
    buf.push(b'\n');
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
