//! Tape layout. All formats are held in memory as 18-bit words, six lines per
//! word on the three data tracks. A block is a 5-word header, the data words,
//! and a 5-word trailer. The reels have an end zone at each end.
use std::fmt;
use std::str::FromStr;

pub const LINES_PER_WORD: u32 = 6;
pub const HEADER_WORDS: u32 = 5;
pub const HEADER_LINES: u32 = HEADER_WORDS * LINES_PER_WORD;
pub const END_ZONE_LINES: u32 = 8192 * LINES_PER_WORD;
pub const BUFFER_ZONE_LINES: u32 = 200 * LINES_PER_WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Format {
    /// PDP-8 tapes: 129 12-bit words per block.
    Bits12,
    /// PDP-11 tapes: 16 bits of every 18-bit word are kept on disk.
    Bits16,
    /// PDP-9/15 tapes, the native layout.
    #[default]
    Bits18,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Bits12, Format::Bits16, Format::Bits18];

    pub const fn geometry(self) -> Geometry {
        match self {
            Format::Bits12 => Geometry { block_words: 86, blocks: 1474 },
            Format::Bits16 | Format::Bits18 => Geometry { block_words: 256, blocks: 578 },
        }
    }

    // Size of a full image file in this encoding.
    pub const fn file_bytes(self) -> usize {
        let geo = self.geometry();
        let words = (geo.block_words * geo.blocks) as usize;
        match self {
            // 2 canonical words hold 3 12-bit words, each in a u16 cell.
            Format::Bits12 => words / 2 * 3 * 2,
            Format::Bits16 => words * 2,
            Format::Bits18 => words * 4,
        }
    }

    pub fn from_file_size(len: usize) -> Format {
        if len == Format::Bits12.file_bytes() {
            Format::Bits12
        } else if len == Format::Bits16.file_bytes() {
            Format::Bits16
        } else {
            Format::Bits18
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Bits12 => "12b",
            Format::Bits16 => "16b",
            Format::Bits18 => "18b",
        })
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "12" | "12b" | "pdp8" => Ok(Format::Bits12),
            "16" | "16b" | "pdp11" => Ok(Format::Bits16),
            "18" | "18b" | "pdp9" | "pdp15" => Ok(Format::Bits18),
            _ => Err(format!("unknown tape format '{s}' (expected 12b, 16b or 18b)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_words: u32,
    pub blocks: u32,
}

impl Geometry {
    pub const fn lines_per_word(&self) -> u32 {
        LINES_PER_WORD
    }

    pub const fn header_trailer_lines(&self) -> u32 {
        HEADER_LINES
    }

    pub const fn end_zone_lines(&self) -> u32 {
        END_ZONE_LINES
    }

    pub const fn buffer_zone_lines(&self) -> u32 {
        BUFFER_ZONE_LINES
    }

    pub const fn lines_per_block(&self) -> u32 {
        2 * HEADER_LINES + self.block_words * LINES_PER_WORD
    }

    pub const fn forward_end_zone_line(&self) -> u32 {
        END_ZONE_LINES + self.lines_per_block() * self.blocks
    }

    // Furthest legal position; past it the tape is off the reel.
    pub const fn last_line(&self) -> u32 {
        self.forward_end_zone_line() + END_ZONE_LINES
    }

    pub const fn capacity(&self) -> usize {
        (self.block_words * self.blocks) as usize
    }

    pub const fn in_reverse_end_zone(&self, pos: u32) -> bool {
        pos < END_ZONE_LINES
    }

    pub const fn in_forward_end_zone(&self, pos: u32) -> bool {
        pos >= self.forward_end_zone_line()
    }

    pub const fn in_end_zone(&self, pos: u32) -> bool {
        self.in_reverse_end_zone(pos) || self.in_forward_end_zone(pos)
    }

    // Positions in the reverse end zone count as block 0.
    pub const fn block_of(&self, pos: u32) -> u32 {
        pos.saturating_sub(END_ZONE_LINES) / self.lines_per_block()
    }

    pub const fn offset_in_block(&self, pos: u32) -> u32 {
        pos.saturating_sub(END_ZONE_LINES) % self.lines_per_block()
    }

    // Data word under the head; only meaningful inside the data zone.
    pub const fn word_index(&self, pos: u32) -> u32 {
        self.offset_in_block(pos).saturating_sub(HEADER_LINES) / LINES_PER_WORD
    }

    pub const fn block_start_line(&self, block: u32) -> u32 {
        block * self.lines_per_block() + END_ZONE_LINES
    }

    pub const fn in_data_zone(&self, offset: u32) -> bool {
        offset >= HEADER_LINES && offset < self.lines_per_block() - HEADER_LINES
    }
}
