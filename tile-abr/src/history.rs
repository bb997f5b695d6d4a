//! Per-segment download and decision records

use std::collections::BTreeMap;

/// What the engine observed and decided for one segment
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SegmentRecord {
    /// Sum of tile download times attributed to the segment, in seconds
    pub download_time_total: f64,
    /// Bitrate chosen when the segment was decided
    pub chosen_bitrate: Option<u32>,
}

/// Records keyed by segment number, pruned as segments leave the buffer
#[derive(Debug, Clone, Default)]
pub struct SegmentHistory {
    records: BTreeMap<u32, SegmentRecord>,
}

impl SegmentHistory {
    pub fn add_download_time(&mut self, segment: u32, seconds: f64) {
        self.records.entry(segment).or_default().download_time_total += seconds;
    }

    pub fn set_bitrate(&mut self, segment: u32, bitrate: u32) {
        self.records.entry(segment).or_default().chosen_bitrate = Some(bitrate);
    }

    pub fn get(&self, segment: u32) -> Option<&SegmentRecord> {
        self.records.get(&segment)
    }

    /// Drop every record for segments `<= segment`
    pub fn prune_through(&mut self, segment: u32) {
        self.records = self.records.split_off(&segment.saturating_add(1));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
