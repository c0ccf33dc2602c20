//! Work done once a unit is at speed: search, read, write, read all and
//! write all. One event per word; the controller's registers are shared by
//! whichever unit is transferring.
use common::constants::{WORD12_MASK, WORD18_MASK};
use log::{debug, trace};

use super::geometry::{HEADER_LINES, LINES_PER_WORD};
use super::motion::{Direction, OffTape, Operation};
use super::registers::{STA_END, STA_NXM};
use super::{Slot, Tc11};
use crate::BusState;

pub const CHECKSUM_SEED: u32 = 0o77;

// Header/trailer word slots, counting the 5 header words as 0..=4 and the
// trailer as 5..=9.
const SLOT_BLOCK: u32 = 1;
const SLOT_REVERSE_CHECKSUM: u32 = 4;
const SLOT_CHECKSUM: u32 = 5;
const SLOT_REVERSE_BLOCK: u32 = 8;

/// A word as it appears when the tape is read backwards: complemented, with
/// its six 3-bit groups in reverse order.
pub fn obverse_complement(word: u32) -> u32 {
    let w = !word & WORD18_MASK;
    ((w >> 15) & 0o7)
        | ((w >> 9) & 0o70)
        | ((w >> 3) & 0o700)
        | ((w & 0o700) << 3)
        | ((w & 0o70) << 9)
        | ((w & 0o7) << 15)
}

/// XOR of the 12-bit pieces of every complemented data word.
pub fn checksum(data: &[u32]) -> u32 {
    data.iter().fold(CHECKSUM_SEED, |csum, word| {
        let w = !word & WORD18_MASK;
        csum ^ (w >> 12) ^ (w & WORD12_MASK)
    }) & WORD12_MASK
}

/// The header or trailer word recorded at `offset` lines into `block`.
pub fn header_word(block: u32, offset: u32, block_words: u32, data: &[u32]) -> u32 {
    let offset = if offset >= HEADER_LINES {
        offset - LINES_PER_WORD * block_words
    } else {
        offset
    };
    match offset / LINES_PER_WORD {
        SLOT_BLOCK => block,
        SLOT_REVERSE_CHECKSUM => CHECKSUM_SEED,
        SLOT_CHECKSUM => checksum(data),
        SLOT_REVERSE_BLOCK => obverse_complement(block),
        _ => 0,
    }
}

impl Tc11 {
    pub(super) fn transfer(&mut self, u: usize, dir: Direction, op: Operation, mem: &mut BusState) {
        let pos = self.units[u].position;
        if self.units[u].in_end_zone(pos) {
            self.set_error(u, STA_END);
            return;
        }
        let block = self.units[u].block_of(pos);

        match op {
            Operation::Search => {
                debug!("TC11: unit {u} found block {block}");
                self.tcdt = block as u16;
                self.schedule_end_zone(u, dir);
                self.set_done();
            }
            Operation::OffReel => {
                self.force_off_tape(u, OffTape { position: pos as i64 });
            }
            Operation::Read | Operation::Write => {
                self.transfer_word(u, dir, op == Operation::Write, block, mem)
            }
            Operation::ReadAll | Operation::WriteAll => {
                self.transfer_all(u, dir, op == Operation::WriteAll, block, mem)
            }
        }
    }

    fn transfer_word(&mut self, u: usize, dir: Direction, write: bool, block: u32, mem: &mut BusState) {
        let unit = &self.units[u];
        let word = unit.word_index(unit.position);
        let block_words = unit.block_words();
        let index = (block * block_words + word) as usize;

        if !self.substate.overflowed {
            let addr = self.dma_address();
            if write {
                let Ok(val) = mem.read_word(addr) else {
                    self.set_error(u, STA_NXM);
                    return;
                };
                self.tcdt = val;
                let data = self.extended_data() | val as u32;
                trace!("TC11: unit {u} block {block} word {word} <- {data:06o}");
                self.units[u].set_word(index, data);
            } else {
                let data = self.units[u].word(index);
                trace!("TC11: unit {u} block {block} word {word} -> {data:06o}");
                self.load_extended_data(data);
                self.tcdt = data as u16;
                if mem.write_word(addr, data as u16).is_err() {
                    self.set_error(u, STA_NXM);
                    return;
                }
            }
            self.count_word();
        } else if write {
            // Rest of the block after the count runs out.
            self.units[u].set_word(index, 0);
        }

        let last = match dir {
            Direction::Forward => word >= block_words - 1,
            Direction::Reverse => word == 0,
        };
        if !last {
            self.schedule_lines(u, LINES_PER_WORD);
        } else if self.substate.overflowed {
            self.schedule_end_zone(u, dir);
            self.set_done();
        } else {
            // Over the trailer and next header to the next block's data.
            self.schedule_lines(u, 2 * HEADER_LINES + LINES_PER_WORD);
        }
    }

    fn transfer_all(&mut self, u: usize, dir: Direction, write: bool, block: u32, mem: &mut BusState) {
        if self.substate.overflowed {
            self.schedule_end_zone(u, dir);
            self.set_done();
            return;
        }

        let unit = &self.units[u];
        let offset = unit.offset_in_block(unit.position);
        let in_data = unit.in_data_zone(offset);
        let block_words = unit.block_words();
        let index = (block * block_words + unit.word_index(unit.position)) as usize;
        let addr = self.dma_address();

        if write {
            let Ok(val) = mem.read_word(addr) else {
                self.set_error(u, STA_NXM);
                return;
            };
            self.tcdt = val;
            let mut data = self.extended_data() | val as u32;
            if dir.is_reverse() {
                data = obverse_complement(data);
            }
            // Header and trailer words are regenerated, not stored.
            if in_data {
                self.units[u].set_word(index, data);
            }
        } else {
            let mut data = if in_data {
                unit.word(index)
            } else {
                header_word(block, offset, block_words, unit.block_data(block))
            };
            if dir.is_reverse() {
                data = obverse_complement(data);
            }
            self.load_extended_data(data);
            self.tcdt = data as u16;
            if mem.write_word(addr, data as u16).is_err() {
                self.set_error(u, STA_NXM);
                return;
            }
        }
        self.count_word();
        self.schedule_lines(u, LINES_PER_WORD);
    }

    fn schedule_lines(&mut self, u: usize, lines: u32) {
        let ticks = self.config.timing.lines_to_ticks(lines as u64);
        self.events.schedule_after(Slot::Unit(u), self.now, ticks);
    }

    // Keep running into the end zone in the direction of travel.
    pub(super) fn schedule_end_zone(&mut self, u: usize, dir: Direction) {
        let unit = &self.units[u];
        let target = match dir {
            Direction::Reverse => unit.block_start_line(0) as i64 - LINES_PER_WORD as i64,
            Direction::Forward => (unit.forward_end_zone_line() + LINES_PER_WORD) as i64,
        };
        self.schedule_to(u, target);
    }
}
