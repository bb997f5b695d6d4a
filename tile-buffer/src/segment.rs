use tile_wire::{VideoPacket, MAX_TILE};

/// One received tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Identifier derived from segment, tile, bitrate and client
    pub name: String,
    pub packet: VideoPacket,
}

impl Tile {
    pub fn new(client_id: &str, packet: VideoPacket) -> Self {
        let name = format!(
            "{}/segment{}_tile{}_{}",
            client_id, packet.segment, packet.tile, packet.bitrate
        );
        Self { name, packet }
    }
}

/// A segment with one slot per tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    index: u32,
    tiles: [Option<Tile>; MAX_TILE as usize],
}

impl Segment {
    /// Empty placeholder for segment `index`
    pub fn new(index: u32) -> Self {
        Self {
            index,
            tiles: std::array::from_fn(|_| None),
        }
    }

    /// Segment number (1-based)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// All slots, tile 1 first
    pub fn tiles(&self) -> &[Option<Tile>] {
        &self.tiles
    }

    /// Tile by 1-based number
    pub fn tile(&self, tile: u16) -> Option<&Tile> {
        let slot = usize::from(tile).checked_sub(1)?;
        self.tiles.get(slot)?.as_ref()
    }

    /// Store a tile in its slot, replacing any earlier copy
    ///
    /// Returns false when the tile number has no slot.
    pub(crate) fn set(&mut self, tile: Tile) -> bool {
        let Some(slot) = usize::from(tile.packet.tile).checked_sub(1) else {
            return false;
        };
        match self.tiles.get_mut(slot) {
            Some(entry) => {
                *entry = Some(tile);
                true
            }
            None => false,
        }
    }

    pub fn filled(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_some()).count()
    }

    /// Every tile slot is filled
    pub fn is_complete(&self) -> bool {
        self.tiles.iter().all(Option::is_some)
    }

    /// Total payload bytes received for this segment
    pub fn payload_bytes(&self) -> usize {
        self.tiles
            .iter()
            .flatten()
            .map(|t| t.packet.payload.len())
            .sum()
    }
}
