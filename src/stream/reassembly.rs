use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::trace;

/// A TCP segment waiting to be placed in its stream.
#[derive(Debug, Clone)]
pub struct Segment {
    pub seq: u32,
    pub data: Bytes,
    /// Position of the carrying packet in the input, used to replay
    /// buffered segments of both directions in their original order.
    pub arrival: u64,
    pub timestamp: f64,
}

/// Per-direction reassembly statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub segments: u64,
    pub retransmits: u64,
    pub out_of_order: u64,
    pub bytes_released: u64,
    pub bytes_discarded: u64,
    /// Pending data was dropped; nothing more is released.
    pub gapped: bool,
}

/// Buffer for one direction of a TCP stream.
///
/// Offsets are 64-bit and counted from the anchor (the sequence number
/// following the SYN), so sequence wraparound never reaches the pending map.
/// Pending segments never overlap each other or the released prefix.
#[derive(Debug, Default)]
pub struct StreamBuffer {
    /// Sequence number of offset 0.
    anchor: Option<u32>,
    /// ISN from a SYN, if one was seen.
    syn_isn: Option<u32>,
    /// Next expected offset; everything before it has been released.
    cursor: u64,
    pending: BTreeMap<u64, Bytes>,
    pending_bytes: usize,
    /// Segments seen before the anchor, in arrival order.
    backlog: Vec<Segment>,
    backlog_bytes: usize,
    /// Sequence number just past the last data byte, from a FIN.
    fin_seq: Option<u32>,
    stats: StreamStats,
}

impl StreamBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// ISN of the SYN that anchored this direction.
    pub fn syn_isn(&self) -> Option<u32> {
        self.syn_isn
    }

    /// Anchor at `isn + 1`. Returns the backlog to replay, or `None` when
    /// the direction was already anchored.
    pub fn anchor_syn(&mut self, isn: u32) -> Option<Vec<Segment>> {
        if self.anchor.is_some() {
            return None;
        }
        self.syn_isn = Some(isn);
        self.anchor = Some(isn.wrapping_add(1));
        Some(self.take_backlog())
    }

    /// Anchor at the lowest buffered sequence number.
    ///
    /// Used when no SYN will arrive any more. Returns the backlog to replay.
    pub fn force_anchor(&mut self) -> Vec<Segment> {
        if self.anchor.is_some() {
            return Vec::new();
        }
        let Some(first) = self.backlog.first().map(|s| s.seq).or(self.fin_seq) else {
            return Vec::new();
        };
        let lowest = self
            .backlog
            .iter()
            .map(|s| s.seq)
            .min_by_key(|seq| seq.wrapping_sub(first) as i32)
            .unwrap_or(first);
        trace!(anchor = lowest, "anchoring without SYN");
        self.anchor = Some(lowest);
        self.take_backlog()
    }

    fn take_backlog(&mut self) -> Vec<Segment> {
        self.backlog_bytes = 0;
        std::mem::take(&mut self.backlog)
    }

    /// Stream offset of `seq`, unwrapped around the cursor.
    fn offset_of(&self, anchor: u32, seq: u32) -> i64 {
        let base = anchor.wrapping_add(self.cursor as u32);
        self.cursor as i64 + seq.wrapping_sub(base) as i32 as i64
    }

    /// Add a segment and return the bytes it made contiguous, in order.
    ///
    /// Before the direction is anchored the segment is only buffered.
    pub fn push(&mut self, segment: Segment) -> Vec<Bytes> {
        let mut released = Vec::new();
        if segment.data.is_empty() {
            return released;
        }
        if self.stats.gapped {
            self.stats.segments += 1;
            self.stats.bytes_discarded += segment.data.len() as u64;
            return released;
        }

        let Some(anchor) = self.anchor else {
            // Counted when replayed.
            self.backlog_bytes += segment.data.len();
            self.backlog.push(segment);
            return released;
        };
        self.stats.segments += 1;

        let mut start = self.offset_of(anchor, segment.seq);
        let end = start + segment.data.len() as i64;
        let cursor = self.cursor as i64;

        if end <= cursor {
            self.stats.retransmits += 1;
            trace!(seq = segment.seq, len = segment.data.len(), "retransmission");
            return released;
        }

        let mut data = segment.data;
        if start < cursor {
            // Released bytes win over the retransmitted copy.
            self.stats.retransmits += 1;
            data = data.slice((cursor - start) as usize..);
            start = cursor;
        }

        let start = start as u64;
        let end = end as u64;
        if start > self.cursor {
            self.stats.out_of_order += 1;
        }

        if self.insert_uncovered(start, end, &data) == 0 {
            self.stats.retransmits += 1;
            trace!(offset = start, "duplicate segment");
        }

        self.drain(&mut released);
        released
    }

    /// Insert the parts of `[start, end)` not already pending.
    fn insert_uncovered(&mut self, start: u64, end: u64, data: &Bytes) -> usize {
        let mut covered = Vec::new();
        if let Some((&off, seg)) = self.pending.range(..start).next_back() {
            let seg_end = off + seg.len() as u64;
            if seg_end > start {
                covered.push((off, seg_end));
            }
        }
        for (&off, seg) in self.pending.range(start..end) {
            covered.push((off, off + seg.len() as u64));
        }

        let mut inserted = 0;
        let mut pos = start;
        for (covered_start, covered_end) in covered {
            if covered_start > pos {
                inserted += self.insert_piece(start, pos, covered_start, data);
            }
            pos = pos.max(covered_end);
        }
        if pos < end {
            inserted += self.insert_piece(start, pos, end, data);
        }
        inserted
    }

    fn insert_piece(&mut self, base: u64, from: u64, to: u64, data: &Bytes) -> usize {
        let piece = data.slice((from - base) as usize..(to - base) as usize);
        let len = piece.len();
        self.pending.insert(from, piece);
        self.pending_bytes += len;
        len
    }

    fn drain(&mut self, released: &mut Vec<Bytes>) {
        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() != self.cursor {
                break;
            }
            let data = entry.remove();
            self.pending_bytes -= data.len();
            self.cursor += data.len() as u64;
            self.stats.bytes_released += data.len() as u64;
            released.push(data);
        }
    }

    /// Record the end of this direction's data.
    pub fn set_fin(&mut self, end_seq: u32) {
        if self.fin_seq.is_none() {
            self.fin_seq = Some(end_seq);
        }
    }

    pub fn has_fin(&self) -> bool {
        self.fin_seq.is_some()
    }

    /// Whether every byte up to the FIN has been released (or the direction
    /// gave up on delivery).
    pub fn is_closed(&self) -> bool {
        let Some(fin_seq) = self.fin_seq else {
            return false;
        };
        if self.stats.gapped {
            return true;
        }
        match self.anchor {
            Some(anchor) => self.offset_of(anchor, fin_seq) <= self.cursor as i64,
            None => false,
        }
    }

    /// Bytes held back, anchored or not.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes + self.backlog_bytes
    }

    /// Drop everything pending and stop delivering this direction.
    pub fn drop_pending(&mut self) -> usize {
        let dropped = self.discard_tail();
        self.stats.gapped = true;
        dropped
    }

    /// Discard bytes blocked behind a gap.
    pub fn discard_tail(&mut self) -> usize {
        let dropped = self.pending_bytes + self.backlog_bytes;
        self.pending.clear();
        self.backlog.clear();
        self.pending_bytes = 0;
        self.backlog_bytes = 0;
        self.stats.bytes_discarded += dropped as u64;
        dropped
    }

    /// Bytes released so far.
    pub fn released(&self) -> u64 {
        self.cursor
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }
}
