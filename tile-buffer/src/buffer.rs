use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tile_wire::VideoPacket;

use crate::segment::{Segment, Tile};

/// What happened to one arriving tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileArrival {
    pub segment: u32,
    pub tile: u16,
    /// False when the tile belonged to an evicted segment or had no slot
    pub stored: bool,
    /// Time since the previous tile arrived, if there was one
    pub download_time: Option<Duration>,
}

/// Time-ordered window of segments being reassembled from tiles
#[derive(Debug)]
pub struct ReassemblyBuffer {
    client_id: String,
    segments: VecDeque<Segment>,
    /// Segments permanently evicted or consumed
    base_offset: u32,
    window_limit: usize,
    last_arrival: Option<Instant>,
}

impl ReassemblyBuffer {
    /// Create an empty buffer keeping at most `window_limit` segments (minimum 1)
    pub fn new(client_id: impl Into<String>, window_limit: usize) -> Self {
        let window_limit = window_limit.max(1);
        Self {
            client_id: client_id.into(),
            segments: VecDeque::with_capacity(window_limit),
            base_offset: 0,
            window_limit,
            last_arrival: None,
        }
    }

    /// Slot an arriving tile into its segment
    ///
    /// Segments up to the tile's segment are created as empty placeholders
    /// when missing, never more than the window holds. A repeated
    /// (segment, tile) overwrites the earlier copy.
    pub fn insert_tile(&mut self, packet: VideoPacket, received_at: Instant) -> TileArrival {
        let download_time = self
            .last_arrival
            .map(|prev| received_at.saturating_duration_since(prev));
        self.last_arrival = Some(match self.last_arrival {
            Some(prev) => prev.max(received_at),
            None => received_at,
        });

        let mut arrival = TileArrival {
            segment: packet.segment,
            tile: packet.tile,
            stored: false,
            download_time,
        };

        if packet.segment <= self.base_offset {
            tracing::debug!(
                segment = packet.segment,
                tile = packet.tile,
                base_offset = self.base_offset,
                "dropping tile for evicted segment"
            );
            return arrival;
        }

        let mut slot = (packet.segment - 1 - self.base_offset) as usize;
        if slot >= self.window_limit {
            self.advance_base(packet.segment - self.window_limit as u32);
            slot = (packet.segment - 1 - self.base_offset) as usize;
        }
        while self.segments.len() <= slot {
            let index = self.base_offset + self.segments.len() as u32 + 1;
            self.segments.push_back(Segment::new(index));
        }

        let tile = Tile::new(&self.client_id, packet);
        arrival.stored = self.segments[slot].set(tile);
        if !arrival.stored {
            tracing::debug!(
                segment = arrival.segment,
                tile = arrival.tile,
                "tile number has no slot"
            );
        }

        self.enforce_window();
        arrival
    }

    /// Complete segments in increasing index order
    ///
    /// Nothing is removed; call again at any time for a fresh view.
    pub fn complete_segments_ready_for_playback(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().filter(|s| s.is_complete())
    }

    /// Permanently drop every segment with index `<= index`
    pub fn evict_through(&mut self, index: u32) {
        if index <= self.base_offset {
            return;
        }
        let count = ((index - self.base_offset) as usize).min(self.segments.len());
        self.segments.drain(..count);
        self.base_offset = index;
        self.enforce_window();
    }

    /// Move the window start up to `new_base`, dropping the segments it passes
    fn advance_base(&mut self, new_base: u32) {
        let count = ((new_base - self.base_offset) as usize).min(self.segments.len());
        for evicted in self.segments.drain(..count) {
            tracing::debug!(
                segment = evicted.index(),
                filled = evicted.filled(),
                "evicting segment past window limit"
            );
        }
        self.base_offset = new_base;
    }

    fn enforce_window(&mut self) {
        while self.segments.len() > self.window_limit {
            if let Some(evicted) = self.segments.pop_front() {
                tracing::debug!(
                    segment = evicted.index(),
                    filled = evicted.filled(),
                    "evicting segment past window limit"
                );
            }
            self.base_offset += 1;
        }
    }

    /// Segment by index, if still buffered
    pub fn segment(&self, index: u32) -> Option<&Segment> {
        let slot = index.checked_sub(self.base_offset.checked_add(1)?)?;
        self.segments.get(slot as usize)
    }

    /// Whether a buffered segment has every tile
    pub fn is_complete(&self, index: u32) -> bool {
        self.segment(index).is_some_and(Segment::is_complete)
    }

    pub fn complete_count(&self) -> usize {
        self.complete_segments_ready_for_playback().count()
    }

    /// Playback time held in complete segments
    pub fn buffered_seconds(&self, segment_duration_secs: f64) -> f64 {
        self.complete_count() as f64 * segment_duration_secs
    }

    /// Buffered segments, oldest first
    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn base_offset(&self) -> u32 {
        self.base_offset
    }

    pub fn window_limit(&self) -> usize {
        self.window_limit
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
