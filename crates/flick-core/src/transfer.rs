//! Chunked file transfers.
//!
//! Outbound files are split into fixed-size chunks and emitted as
//! `file-meta`, one `file-chunk` per chunk in index order, then
//! `file-complete`. Inbound transfers are reassembled from a sparse slot
//! vector so chunks may arrive in any order; completion is `received ==
//! total_chunks`, independent of arrival order.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use flick_shared::constants::MAX_TOTAL_CHUNKS;
use flick_shared::protocol::{FileChunk, FileComplete, FileMeta, WireMessage};
use flick_shared::{EntryId, PeerId, TransferId};

use crate::error::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Receiving,
    Complete,
    /// The owning peer left (or went idle) before `file-complete`.
    Abandoned,
}

/// Outcome of checking an assembled file against the sender's checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Integrity {
    /// The sender declared no checksum.
    Unchecked,
    Verified,
    Mismatch,
}

/// Number of chunks a file of `size` bytes is split into. Never zero.
pub fn chunk_count(size: usize, chunk_size: usize) -> u32 {
    let chunk_size = chunk_size.max(1);
    u32::try_from(size.div_ceil(chunk_size).max(1)).unwrap_or(u32::MAX)
}

/// Split `data` into chunk slices of at most `chunk_size` bytes.
///
/// An empty file yields exactly one empty chunk.
pub fn split_chunks(data: &Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    if data.is_empty() {
        return vec![Bytes::new()];
    }
    (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect()
}

/// BLAKE3 checksum of a whole file, hex encoded.
pub fn file_checksum(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

fn verify_checksum(data: &[u8], declared: Option<&str>) -> Integrity {
    match declared {
        None => Integrity::Unchecked,
        Some(expected) if file_checksum(data).eq_ignore_ascii_case(expected.trim()) => {
            Integrity::Verified
        }
        Some(_) => Integrity::Mismatch,
    }
}

/// A file picked by the user for sending.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    /// MIME type, may be empty.
    pub mime: String,
    pub data: Bytes,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }
}

/// The full message sequence of one outbound transfer, produced lazily.
#[derive(Debug, Clone)]
pub struct OutgoingTransfer {
    peer_id: PeerId,
    meta: FileMeta,
    data: Bytes,
    chunk_size: usize,
}

impl OutgoingTransfer {
    pub(crate) fn new(peer_id: PeerId, meta: FileMeta, data: Bytes, chunk_size: usize) -> Self {
        Self {
            peer_id,
            meta,
            data,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn transfer_id(&self) -> &TransferId {
        &self.meta.transfer_id
    }

    pub fn total_chunks(&self) -> u32 {
        self.meta.total_chunks
    }

    /// `file-meta`, every `file-chunk` in increasing index order, then
    /// `file-complete`.
    pub fn messages(&self) -> impl Iterator<Item = WireMessage> + '_ {
        let transfer_id = self.meta.transfer_id.clone();
        let total_chunks = self.meta.total_chunks;

        let chunks = split_chunks(&self.data, self.chunk_size)
            .into_iter()
            .enumerate()
            .map(move |(index, data)| {
                WireMessage::FileChunk(FileChunk {
                    transfer_id: transfer_id.clone(),
                    index: index as u32,
                    total_chunks,
                    data: data.to_vec(),
                })
            });

        std::iter::once(WireMessage::FileMeta(self.meta.clone()))
            .chain(chunks)
            .chain(std::iter::once(WireMessage::FileComplete(FileComplete {
                transfer_id: self.meta.transfer_id.clone(),
            })))
    }
}

/// Reassembly state of one inbound transfer.
#[derive(Debug, Clone)]
pub struct IncomingTransfer {
    pub transfer_id: TransferId,
    /// Peer whose connection delivered the `file-meta`.
    pub peer_id: PeerId,
    pub sender_name: String,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub checksum: Option<String>,
    slots: Vec<Option<Bytes>>,
    received: u32,
    stored_bytes: u64,
    last_activity: Instant,
}

impl IncomingTransfer {
    pub fn from_meta(peer_id: PeerId, meta: &FileMeta) -> Result<Self, TransferError> {
        if meta.total_chunks == 0 || meta.total_chunks > MAX_TOTAL_CHUNKS {
            return Err(TransferError::InvalidChunkCount(meta.total_chunks));
        }

        Ok(Self {
            transfer_id: meta.transfer_id.clone(),
            peer_id,
            sender_name: meta.sender_name.clone(),
            file_name: meta.file_name.clone(),
            file_size: meta.file_size,
            file_type: meta.file_type.clone(),
            checksum: meta.checksum.clone(),
            slots: vec![None; meta.total_chunks as usize],
            received: 0,
            stored_bytes: 0,
            last_activity: Instant::now(),
        })
    }

    pub fn entry_id(&self) -> EntryId {
        EntryId::from(&self.transfer_id)
    }

    pub fn total_chunks(&self) -> u32 {
        self.slots.len() as u32
    }

    pub fn received(&self) -> u32 {
        self.received
    }

    pub fn missing(&self) -> u32 {
        self.total_chunks() - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.total_chunks()
    }

    pub fn progress(&self) -> f32 {
        self.received as f32 / self.total_chunks() as f32
    }

    /// Store one chunk. A repeated index overwrites its slot but is only
    /// counted once. The stored bytes never exceed the declared file size.
    /// Invalid chunks leave the state untouched.
    pub fn accept_chunk(&mut self, index: u32, declared_total: u32, data: Vec<u8>) -> Result<f32, TransferError> {
        let total = self.total_chunks();
        if declared_total != total {
            return Err(TransferError::TotalMismatch {
                declared: declared_total,
                expected: total,
            });
        }
        let slot = self
            .slots
            .get_mut(index as usize)
            .ok_or(TransferError::IndexOutOfRange { index, total })?;

        let replaced = slot.as_ref().map_or(0, |old| old.len() as u64);
        let stored = self.stored_bytes - replaced + data.len() as u64;
        if stored > self.file_size {
            return Err(TransferError::ExceedsDeclaredSize {
                received: stored,
                declared: self.file_size,
            });
        }

        if slot.replace(Bytes::from(data)).is_none() {
            self.received += 1;
        }
        self.stored_bytes = stored;
        self.last_activity = Instant::now();
        Ok(self.progress())
    }

    /// Concatenate the filled slots in index order, skipping gaps.
    pub fn assemble(&self) -> Vec<u8> {
        let len: usize = self.slots.iter().flatten().map(Bytes::len).sum();
        let mut out = Vec::with_capacity(len);
        for chunk in self.slots.iter().flatten() {
            out.extend_from_slice(chunk);
        }
        out
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }
}

/// Result of [`TransferTable::begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaOutcome {
    Started,
    /// A `file-meta` for a transfer already in progress; state kept.
    AlreadyActive,
}

/// Progress after an accepted chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkProgress {
    pub peer_id: PeerId,
    pub entry_id: EntryId,
    pub progress: f32,
}

/// A finished inbound transfer, removed from the table.
#[derive(Debug)]
pub struct CompletedTransfer {
    pub transfer: IncomingTransfer,
    pub data: Vec<u8>,
    pub integrity: Integrity,
}

/// All inbound transfers in progress, keyed by transfer id.
#[derive(Debug, Default)]
pub struct TransferTable {
    incoming: HashMap<TransferId, IncomingTransfer>,
}

impl TransferTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate reassembly state for a `file-meta`.
    pub fn begin(&mut self, peer_id: &PeerId, meta: &FileMeta) -> Result<MetaOutcome, TransferError> {
        if let Some(existing) = self.incoming.get(&meta.transfer_id) {
            if &existing.peer_id != peer_id {
                return Err(TransferError::NotOwner {
                    transfer: meta.transfer_id.clone(),
                    owner: existing.peer_id.clone(),
                    sender: peer_id.clone(),
                });
            }
            return Ok(MetaOutcome::AlreadyActive);
        }

        let transfer = IncomingTransfer::from_meta(peer_id.clone(), meta)?;
        debug!(
            transfer = %meta.transfer_id,
            peer = %peer_id,
            total_chunks = meta.total_chunks,
            file_size = meta.file_size,
            "Incoming transfer started"
        );
        self.incoming.insert(meta.transfer_id.clone(), transfer);
        Ok(MetaOutcome::Started)
    }

    /// Store a chunk in its slot and report the new progress.
    pub fn apply_chunk(&mut self, peer_id: &PeerId, chunk: FileChunk) -> Result<ChunkProgress, TransferError> {
        let transfer = self.owned_mut(peer_id, &chunk.transfer_id)?;
        let progress = transfer.accept_chunk(chunk.index, chunk.total_chunks, chunk.data)?;

        Ok(ChunkProgress {
            peer_id: transfer.peer_id.clone(),
            entry_id: transfer.entry_id(),
            progress,
        })
    }

    /// Assemble and remove a transfer on `file-complete`.
    pub fn finish(&mut self, peer_id: &PeerId, transfer_id: &TransferId) -> Result<CompletedTransfer, TransferError> {
        self.owned_mut(peer_id, transfer_id)?;
        let transfer = self
            .incoming
            .remove(transfer_id)
            .ok_or_else(|| TransferError::UnknownTransfer(transfer_id.clone()))?;

        if !transfer.is_complete() {
            warn!(
                transfer = %transfer_id,
                received = transfer.received(),
                total = transfer.total_chunks(),
                "Completing transfer with missing chunks"
            );
        }

        let data = transfer.assemble();
        let integrity = verify_checksum(&data, transfer.checksum.as_deref());
        if integrity == Integrity::Mismatch {
            warn!(transfer = %transfer_id, "Assembled file does not match declared checksum");
        }

        Ok(CompletedTransfer {
            transfer,
            data,
            integrity,
        })
    }

    /// Drop every unfinished transfer owned by `peer_id`.
    pub fn abandon_peer(&mut self, peer_id: &PeerId) -> Vec<IncomingTransfer> {
        self.drain_where(|t| &t.peer_id == peer_id)
    }

    /// Drop transfers that saw no chunk for longer than `max_idle`.
    pub fn sweep_idle(&mut self, max_idle: Duration, now: Instant) -> Vec<IncomingTransfer> {
        self.drain_where(|t| t.idle_for(now) > max_idle)
    }

    pub fn get(&self, transfer_id: &TransferId) -> Option<&IncomingTransfer> {
        self.incoming.get(transfer_id)
    }

    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }

    fn owned_mut(&mut self, peer_id: &PeerId, transfer_id: &TransferId) -> Result<&mut IncomingTransfer, TransferError> {
        let transfer = self
            .incoming
            .get_mut(transfer_id)
            .ok_or_else(|| TransferError::UnknownTransfer(transfer_id.clone()))?;
        if &transfer.peer_id != peer_id {
            return Err(TransferError::NotOwner {
                transfer: transfer_id.clone(),
                owner: transfer.peer_id.clone(),
                sender: peer_id.clone(),
            });
        }
        Ok(transfer)
    }

    fn drain_where<F>(&mut self, mut pred: F) -> Vec<IncomingTransfer>
    where
        F: FnMut(&IncomingTransfer) -> bool,
    {
        let ids: Vec<TransferId> = self
            .incoming
            .values()
            .filter(|t| pred(t))
            .map(|t| t.transfer_id.clone())
            .collect();
        ids.iter().filter_map(|id| self.incoming.remove(id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C: usize = 16;

    fn sample(len: usize) -> Bytes {
        Bytes::from((0..len).map(|i| (i * 7 % 251) as u8).collect::<Vec<u8>>())
    }

    fn meta(id: &str, total_chunks: u32) -> FileMeta {
        FileMeta {
            transfer_id: TransferId::from(id),
            sender_id: "sender".into(),
            sender_name: "Clever Signal".into(),
            file_name: "data.bin".into(),
            file_size: 1024,
            file_type: String::new(),
            total_chunks,
            timestamp: None,
            checksum: None,
        }
    }

    fn chunk(id: &str, index: u32, total: u32, data: &[u8]) -> FileChunk {
        FileChunk {
            transfer_id: TransferId::from(id),
            index,
            total_chunks: total,
            data: data.to_vec(),
        }
    }

    #[test]
    fn test_chunking_round_trip() {
        for (n, expected_chunks) in [(0, 1), (C, 1), (C + 1, 2), (10 * C - 1, 10)] {
            let data = sample(n);
            let chunks = split_chunks(&data, C);
            assert_eq!(chunks.len(), expected_chunks, "n = {n}");
            assert_eq!(chunk_count(n, C) as usize, expected_chunks);
            assert!(chunks.iter().all(|c| c.len() <= C));

            let rebuilt: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
            assert_eq!(rebuilt, data.to_vec(), "n = {n}");
        }
    }

    #[test]
    fn test_last_chunk_sizes() {
        assert_eq!(split_chunks(&sample(0), C)[0].len(), 0);
        assert_eq!(split_chunks(&sample(2 * C), C)[1].len(), C);
        assert_eq!(split_chunks(&sample(2 * C + 3), C)[2].len(), 3);
    }

    #[test]
    fn test_outgoing_message_order() {
        let data = sample(3 * C + 1);
        let mut m = meta("t1", chunk_count(data.len(), C));
        m.file_size = data.len() as u64;
        let transfer = OutgoingTransfer::new(PeerId::from("p"), m, data.clone(), C);

        let messages: Vec<WireMessage> = transfer.messages().collect();
        assert_eq!(messages.len(), 1 + 4 + 1);
        assert!(matches!(messages[0], WireMessage::FileMeta(_)));
        assert!(matches!(messages[5], WireMessage::FileComplete(_)));

        let mut rebuilt = Vec::new();
        for (expected, msg) in messages[1..5].iter().enumerate() {
            match msg {
                WireMessage::FileChunk(c) => {
                    assert_eq!(c.index as usize, expected);
                    assert_eq!(c.total_chunks, 4);
                    rebuilt.extend_from_slice(&c.data);
                }
                other => panic!("expected chunk, got {other:?}"),
            }
        }
        assert_eq!(rebuilt, data.to_vec());
    }

    #[test]
    fn test_empty_file_sends_one_empty_chunk() {
        let transfer = OutgoingTransfer::new(PeerId::from("p"), meta("t0", 1), Bytes::new(), C);
        let chunks: Vec<_> = transfer
            .messages()
            .filter_map(|m| match m {
                WireMessage::FileChunk(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
    }

    #[test]
    fn test_reassembly_is_order_independent() {
        let data = sample(5 * C - 3);
        let chunks = split_chunks(&data, C);
        let total = chunks.len() as u32;
        let peer = PeerId::from("p");

        let orders: [Vec<usize>; 3] = [vec![0, 1, 2, 3, 4], vec![4, 3, 2, 1, 0], vec![2, 0, 4, 1, 3]];
        for order in orders {
            let mut table = TransferTable::new();
            table.begin(&peer, &meta("t", total)).unwrap();
            for &i in &order {
                table
                    .apply_chunk(&peer, chunk("t", i as u32, total, &chunks[i]))
                    .unwrap();
            }
            let done = table.finish(&peer, &TransferId::from("t")).unwrap();
            assert_eq!(done.data, data.to_vec(), "order {order:?}");
            assert!(table.is_empty());
        }
    }

    #[test]
    fn test_partial_completion_skips_gaps() {
        let peer = PeerId::from("p");
        let mut table = TransferTable::new();
        table.begin(&peer, &meta("t", 3)).unwrap();
        table.apply_chunk(&peer, chunk("t", 0, 3, b"aa")).unwrap();
        table.apply_chunk(&peer, chunk("t", 2, 3, b"cc")).unwrap();

        let done = table.finish(&peer, &TransferId::from("t")).unwrap();
        assert_eq!(done.data, b"aacc".to_vec());
        assert_eq!(done.transfer.missing(), 1);
    }

    #[test]
    fn test_duplicate_chunk_counted_once() {
        let peer = PeerId::from("p");
        let mut table = TransferTable::new();
        table.begin(&peer, &meta("t", 2)).unwrap();

        let first = table.apply_chunk(&peer, chunk("t", 0, 2, b"old")).unwrap();
        let second = table.apply_chunk(&peer, chunk("t", 0, 2, b"new")).unwrap();
        assert_eq!(first.progress, 0.5);
        assert_eq!(second.progress, 0.5);

        let t = table.get(&TransferId::from("t")).unwrap();
        assert_eq!(t.received(), 1);
        assert_eq!(t.assemble(), b"new".to_vec());
    }

    #[test]
    fn test_invalid_chunks_leave_state_untouched() {
        let peer = PeerId::from("p");
        let mut table = TransferTable::new();
        table.begin(&peer, &meta("t", 2)).unwrap();

        assert_eq!(
            table.apply_chunk(&peer, chunk("t", 2, 2, b"x")),
            Err(TransferError::IndexOutOfRange { index: 2, total: 2 })
        );
        assert_eq!(
            table.apply_chunk(&peer, chunk("t", 0, 5, b"x")),
            Err(TransferError::TotalMismatch { declared: 5, expected: 2 })
        );
        assert!(matches!(
            table.apply_chunk(&PeerId::from("intruder"), chunk("t", 0, 2, b"x")),
            Err(TransferError::NotOwner { .. })
        ));
        assert!(matches!(
            table.apply_chunk(&peer, chunk("nope", 0, 2, b"x")),
            Err(TransferError::UnknownTransfer(_))
        ));

        assert_eq!(table.get(&TransferId::from("t")).unwrap().received(), 0);
    }

    #[test]
    fn test_chunks_bounded_by_declared_size() {
        let peer = PeerId::from("p");
        let mut m = meta("t", 2);
        m.file_size = 6;
        let mut table = TransferTable::new();
        table.begin(&peer, &m).unwrap();

        table.apply_chunk(&peer, chunk("t", 0, 2, b"abcd")).unwrap();
        assert_eq!(
            table.apply_chunk(&peer, chunk("t", 1, 2, b"efg")),
            Err(TransferError::ExceedsDeclaredSize { received: 7, declared: 6 })
        );
        assert_eq!(table.get(&TransferId::from("t")).unwrap().received(), 1);

        // Overwriting a slot only counts the replacement bytes
        table.apply_chunk(&peer, chunk("t", 0, 2, b"abc")).unwrap();
        table.apply_chunk(&peer, chunk("t", 1, 2, b"def")).unwrap();
        let done = table.finish(&peer, &TransferId::from("t")).unwrap();
        assert_eq!(done.data, b"abcdef".to_vec());
    }

    #[test]
    fn test_meta_validation_and_repeat() {
        let peer = PeerId::from("p");
        let mut table = TransferTable::new();

        assert_eq!(
            table.begin(&peer, &meta("zero", 0)),
            Err(TransferError::InvalidChunkCount(0))
        );
        assert_eq!(
            table.begin(&peer, &meta("huge", MAX_TOTAL_CHUNKS + 1)),
            Err(TransferError::InvalidChunkCount(MAX_TOTAL_CHUNKS + 1))
        );

        assert_eq!(table.begin(&peer, &meta("t", 2)), Ok(MetaOutcome::Started));
        table.apply_chunk(&peer, chunk("t", 1, 2, b"b")).unwrap();
        assert_eq!(table.begin(&peer, &meta("t", 2)), Ok(MetaOutcome::AlreadyActive));
        assert_eq!(table.get(&TransferId::from("t")).unwrap().received(), 1);
    }

    #[test]
    fn test_checksum_verification() {
        let peer = PeerId::from("p");
        let data = b"hello flick";

        let mut good = meta("good", 1);
        good.checksum = Some(file_checksum(data));
        let mut bad = meta("bad", 1);
        bad.checksum = Some(file_checksum(b"something else"));

        let mut table = TransferTable::new();
        for m in [&good, &bad] {
            table.begin(&peer, m).unwrap();
            table
                .apply_chunk(&peer, chunk(m.transfer_id.as_str(), 0, 1, data))
                .unwrap();
        }

        let good = table.finish(&peer, &TransferId::from("good")).unwrap();
        let bad = table.finish(&peer, &TransferId::from("bad")).unwrap();
        assert_eq!(good.integrity, Integrity::Verified);
        assert_eq!(bad.integrity, Integrity::Mismatch);
    }

    #[test]
    fn test_abandon_and_sweep() {
        let a = PeerId::from("a");
        let b = PeerId::from("b");
        let mut table = TransferTable::new();
        table.begin(&a, &meta("ta", 2)).unwrap();
        table.begin(&b, &meta("tb", 2)).unwrap();

        let dropped = table.abandon_peer(&a);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].transfer_id, TransferId::from("ta"));
        assert_eq!(table.len(), 1);

        assert!(table.sweep_idle(Duration::from_secs(60), Instant::now()).is_empty());
        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(table.sweep_idle(Duration::from_secs(60), later).len(), 1);
        assert!(table.is_empty());
    }
}
