//! TC11 register file: TCST, TCCM, TCWC, TCBA, TCDT.
use log::{debug, trace};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

use super::motion::{Direction, Operation};
use super::{Slot, Tc11, NUM_UNITS};

pub const TCST: usize = 0;
pub const TCCM: usize = 1;
pub const TCWC: usize = 2;
pub const TCBA: usize = 3;
pub const TCDT: usize = 4;
pub const NUM_REGS: usize = 5;

// TCST
pub const STA_END: u16 = 0o100000;
pub const STA_PAR: u16 = 0o040000;
pub const STA_MRK: u16 = 0o020000;
pub const STA_ILO: u16 = 0o010000;
pub const STA_SEL: u16 = 0o004000;
pub const STA_BLKM: u16 = 0o002000;
pub const STA_DATM: u16 = 0o001000;
pub const STA_NXM: u16 = 0o000400;
pub const STA_UPS: u16 = 0o000200;
pub const STA_XD_MASK: u16 = 0o3;
pub const STA_ALLERR: u16 =
    STA_END | STA_PAR | STA_MRK | STA_ILO | STA_SEL | STA_BLKM | STA_DATM | STA_NXM;
const STA_RW: u16 = STA_XD_MASK;

// TCCM
pub const CSR_ERR: u16 = 0o100000;
pub const CSR_MNT: u16 = 0o020000;
pub const CSR_INH: u16 = 0o010000;
pub const CSR_DIR: u16 = 0o004000;
pub const CSR_UNIT_SHIFT: u16 = 8;
pub const CSR_UNIT_MASK: u16 = 0o7;
pub const CSR_UNIT: u16 = CSR_UNIT_MASK << CSR_UNIT_SHIFT;
pub const CSR_DONE: u16 = 0o000200;
pub const CSR_IE: u16 = 0o000100;
pub const CSR_MEX_SHIFT: u16 = 4;
pub const CSR_MEX_MASK: u16 = 0o3;
pub const CSR_MEX: u16 = CSR_MEX_MASK << CSR_MEX_SHIFT;
pub const CSR_FNC_SHIFT: u16 = 1;
pub const CSR_FNC_MASK: u16 = 0o7;
pub const CSR_GO: u16 = 0o000001;
const CSR_RW: u16 = CSR_MNT | CSR_INH | CSR_DIR | CSR_UNIT | CSR_IE | CSR_MEX | (CSR_FNC_MASK << CSR_FNC_SHIFT);

#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq)]
pub enum Function {
    Stop = 0,
    Search,
    Read,
    ReadAll,
    StopSelected,
    WriteMark,
    Write,
    WriteAll,
}

impl Function {
    pub fn operation(self) -> Option<Operation> {
        match self {
            Function::Search => Some(Operation::Search),
            Function::Read => Some(Operation::Read),
            Function::ReadAll => Some(Operation::ReadAll),
            Function::Write => Some(Operation::Write),
            Function::WriteAll => Some(Operation::WriteAll),
            Function::Stop | Function::StopSelected | Function::WriteMark => None,
        }
    }

    pub fn writes(self) -> bool {
        matches!(self, Function::Write | Function::WriteAll | Function::WriteMark)
    }

    // Command word fields for this function, without GO.
    pub fn command(self, unit: usize, dir: Direction) -> u16 {
        let reverse = if dir.is_reverse() { CSR_DIR } else { 0 };
        reverse | ((unit as u16 & CSR_UNIT_MASK) << CSR_UNIT_SHIFT) | ((self as u16) << CSR_FNC_SHIFT)
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) enum Access {
    Word,
    Byte { high: bool },
}

impl Tc11 {
    pub fn selected_unit(&self) -> usize {
        ((self.tccm >> CSR_UNIT_SHIFT) & CSR_UNIT_MASK) as usize
    }

    pub fn function(&self) -> Function {
        // Every 3-bit code is a function.
        Function::from_u16((self.tccm >> CSR_FNC_SHIFT) & CSR_FNC_MASK).unwrap_or(Function::Stop)
    }

    pub(super) fn direction(&self) -> Direction {
        Direction::from_reverse(self.tccm & CSR_DIR != 0)
    }

    pub fn is_done(&self) -> bool {
        self.tccm & CSR_DONE != 0
    }

    pub fn has_error(&self) -> bool {
        self.tcst & STA_ALLERR != 0
    }

    pub(super) fn dma_address(&self) -> u32 {
        (((self.tccm & CSR_MEX) >> CSR_MEX_SHIFT) as u32) << 16 | self.tcba as u32
    }

    // Steps the word count and bus address after a word moves. The address
    // carries into the memory extension bits.
    pub(super) fn count_word(&mut self) {
        self.tcwc = self.tcwc.wrapping_add(1);
        self.tcba = self.tcba.wrapping_add(2);
        if self.tcba <= 1 {
            let mex = (((self.tccm & CSR_MEX) >> CSR_MEX_SHIFT) + 1) & CSR_MEX_MASK;
            self.tccm = (self.tccm & !CSR_MEX) | (mex << CSR_MEX_SHIFT);
        }
        if self.tcwc == 0 {
            trace!("TC11: word count overflow");
            self.substate.overflowed = true;
        }
    }

    pub(super) fn extended_data(&self) -> u32 {
        ((self.tcst & STA_XD_MASK) as u32) << 16
    }

    pub(super) fn load_extended_data(&mut self, word: u32) {
        self.tcst = (self.tcst & !STA_XD_MASK) | ((word >> 16) as u16 & STA_XD_MASK);
    }

    pub(super) fn read_register(&self, reg: usize) -> u16 {
        let val = match reg {
            TCST => {
                let unit = &self.units[self.selected_unit()];
                let ups = if unit.regime().is_at_speed() { STA_UPS } else { 0 };
                self.tcst | ups
            }
            TCCM => {
                let err = if self.has_error() { CSR_ERR } else { 0 };
                self.tccm | err
            }
            TCWC => self.tcwc,
            TCBA => self.tcba,
            TCDT => self.tcdt,
            _ => panic!("TC11 has no register {reg}"),
        };
        trace!("TC11: read reg {reg} = {val:06o}");
        val
    }

    pub(super) fn write_register(&mut self, reg: usize, val: u16, access: Access) {
        let current = match reg {
            TCST => self.tcst,
            TCCM => self.tccm,
            TCWC => self.tcwc,
            TCBA => self.tcba,
            TCDT => self.tcdt,
            _ => panic!("TC11 has no register {reg}"),
        };
        let data = match access {
            Access::Word => val,
            Access::Byte { high: true } => (current & 0o377) | (val << 8),
            Access::Byte { high: false } => (current & !0o377) | (val & 0o377),
        };
        trace!("TC11: write reg {reg} = {data:06o}");

        match reg {
            TCST => self.tcst = (self.tcst & !STA_RW) | (data & STA_RW),
            TCCM => self.write_command(data),
            TCWC => self.tcwc = data,
            TCBA => self.tcba = data & !0x1,
            TCDT => self.tcdt = data,
            _ => unreachable!(),
        }
    }

    fn write_command(&mut self, data: u16) {
        let old = self.tccm;
        if data & CSR_IE == 0 {
            self.clear_interrupt();
        } else if old & CSR_IE == 0 && old & CSR_DONE != 0 {
            self.request_interrupt();
        }
        self.tccm = (self.tccm & !CSR_RW) | (data & CSR_RW);
        if (old ^ self.tccm) & CSR_UNIT != 0 {
            self.deselect(((old >> CSR_UNIT_SHIFT) & CSR_UNIT_MASK) as usize);
        }

        // GO only takes while the previous command is done.
        if data & CSR_GO == 0 || old & CSR_DONE == 0 {
            return;
        }

        self.tcst &= !STA_ALLERR;
        self.tccm &= !CSR_DONE;
        self.clear_interrupt();

        let u = self.selected_unit();
        let fnc = self.function();
        debug!("TC11: go {fnc:?} unit {u} {:?}", self.direction());

        if fnc == Function::Stop {
            self.events.schedule_after(Slot::Control, self.now, self.config.command_time);
            for u in 0..NUM_UNITS {
                let _ = self.stop_unit(u);
            }
            return;
        }

        if fnc == Function::WriteMark || (fnc.writes() && self.units[u].is_write_locked()) {
            self.set_error(u, STA_ILO);
        }
        if !self.has_error() {
            self.start(u);
        }
    }
}
