//! TC11 DECtape controller with up to eight TU56 transports.
//!
//! Registers sit at five consecutive words from `Tc11Config::base`. Tape
//! motion is not stepped line by line: each unit has at most one pending
//! event, and positions are recomputed from elapsed ticks whenever the unit
//! is looked at.
pub mod geometry;
pub mod image;
pub mod motion;
mod registers;
mod transfer;
pub mod unit;

use std::path::Path;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::BusState;
use crate::io::scheduler::EventQueue;
use crate::io::{Interrupt, MMIOHandler, StopRequest};
use geometry::{Format, LINES_PER_WORD};
use image::{ImageError, TapeImage};
use motion::{plan_start, Direction, OffTape, Operation, Pending, Phase, Plan, Regime, Timing};
use registers::Access;
use unit::{Media, Unit};

pub use registers::*;
pub use transfer::{checksum, header_word, obverse_complement, CHECKSUM_SEED};

pub const NUM_UNITS: usize = 8;

// Distance past the last line an off-reel run aims for.
const OFF_REEL_LINES: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Unit(usize),
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tc11Config {
    pub base: u16,
    pub vector: u16,
    pub priority: u8,
    pub timing: Timing,
    /// Ticks before a stop command reports done.
    pub command_time: u64,
    /// Ask the bus to halt when a tape runs off its reel.
    pub stop_on_off_reel: bool,
}

impl Default for Tc11Config {
    fn default() -> Self {
        Tc11Config {
            base: 0o177340,
            vector: 0o214,
            priority: 6,
            timing: Timing { line_time: 12, decel_time: 40000 },
            command_time: 4,
            stop_on_off_reel: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("no unit {0}")]
    NoSuchUnit(usize),
    #[error("unit {0} already has a tape mounted")]
    AlreadyAttached(usize),
    #[error("unit {0} has no tape mounted")]
    NotAttached(usize),
    #[error(transparent)]
    Image(#[from] ImageError),
}

// Per-command transfer state.
#[derive(Debug, Clone, Copy, Default)]
struct Substate {
    overflowed: bool,
}

pub struct Tc11 {
    config: Tc11Config,
    addrs: [u16; NUM_REGS],
    units: Vec<Unit>,

    tcst: u16,
    tccm: u16,
    tcwc: u16,
    tcba: u16,
    tcdt: u16,
    substate: Substate,
    interrupt_requested: bool,

    events: EventQueue<Slot>,
    now: u64,
    stop: Option<StopRequest>,
}

impl Tc11 {
    pub fn new(config: Tc11Config) -> Self {
        assert!(config.timing.line_time >= 1, "line time must be at least one tick");
        assert!(config.base & 0x1 == 0, "register base {:o} is odd", config.base);
        let addrs = std::array::from_fn(|i| config.base + 2 * i as u16);
        Tc11 {
            config,
            addrs,
            units: (0..NUM_UNITS).map(|_| Unit::new()).collect(),
            tcst: 0,
            tccm: CSR_DONE,
            tcwc: 0,
            tcba: 0,
            tcdt: 0,
            substate: Substate::default(),
            interrupt_requested: false,
            events: EventQueue::new(),
            now: 0,
            stop: None,
        }
    }

    pub fn config(&self) -> &Tc11Config {
        &self.config
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn interrupt_requested(&self) -> bool {
        self.interrupt_requested
    }

    pub fn unit(&self, u: usize) -> &Unit {
        &self.units[u]
    }

    /// Mounts the image at `path` on unit `u`. A missing file mounts a blank
    /// tape, which is written out on detach.
    pub fn attach(
        &mut self,
        u: usize,
        path: &Path,
        format: Option<Format>,
        write_locked: bool,
    ) -> Result<(), AttachError> {
        self.check_detached(u)?;
        let image = TapeImage::load(path, format)?;
        info!("TC11: unit {u} attached {} ({})", path.display(), image.format());
        let media = Media { image, file: Some(path.to_path_buf()) };
        self.units[u].mount(media, write_locked, self.now);
        Ok(())
    }

    pub fn attach_image(&mut self, u: usize, image: TapeImage, write_locked: bool) -> Result<(), AttachError> {
        self.check_detached(u)?;
        info!("TC11: unit {u} attached {} image", image.format());
        self.units[u].mount(Media { image, file: None }, write_locked, self.now);
        Ok(())
    }

    /// Removes the tape from unit `u`, writing it back to its file unless the
    /// unit is write locked.
    pub fn detach(&mut self, u: usize) -> Result<TapeImage, AttachError> {
        if u >= NUM_UNITS {
            return Err(AttachError::NoSuchUnit(u));
        }
        if !self.units[u].is_attached() {
            return Err(AttachError::NotAttached(u));
        }
        // The tape stays mounted if it can't be written back.
        if let Some(Media { image, file: Some(path) }) = &self.units[u].media {
            if !self.units[u].is_write_locked() {
                image.save(path)?;
            }
        }
        if self.is_active_target(u) && !self.is_done() {
            self.set_error(u, STA_SEL);
        }
        let media = self.release(u).ok_or(AttachError::NotAttached(u))?;
        info!("TC11: unit {u} detached");
        Ok(media.image)
    }

    /// Drops everything in flight and detaches every unit, writing images
    /// back. A unit whose image can't be written stays mounted; the first
    /// such failure is returned once every unit has been tried.
    pub fn power_down(&mut self) -> Result<(), AttachError> {
        self.events.clear();
        self.clear_registers();
        let mut failed = None;
        for u in 0..NUM_UNITS {
            let unit = &mut self.units[u];
            unit.regime = Regime::Stopped;
            unit.pending = Pending::none();
            if !unit.is_attached() {
                continue;
            }
            if let Err(e) = self.detach(u) {
                error!("TC11: unit {u}: {e}");
                failed.get_or_insert(e);
            }
        }
        failed.map_or(Ok(()), Err)
    }

    // Unit `u` has work in flight for the current command.
    fn is_active_target(&self, u: usize) -> bool {
        u == self.selected_unit()
            && self.function() != Function::Stop
            && self.events.is_scheduled(Slot::Unit(u))
    }

    fn clear_registers(&mut self) {
        self.tcst = 0;
        self.tccm = CSR_DONE;
        self.tcwc = 0;
        self.tcba = 0;
        self.tcdt = 0;
        self.substate = Substate::default();
        self.clear_interrupt();
    }

    pub fn set_write_locked(&mut self, u: usize, locked: bool) {
        self.units[u].write_locked = locked;
    }

    fn check_detached(&self, u: usize) -> Result<(), AttachError> {
        if u >= NUM_UNITS {
            return Err(AttachError::NoSuchUnit(u));
        }
        if self.units[u].is_attached() {
            return Err(AttachError::AlreadyAttached(u));
        }
        Ok(())
    }

    /// Runs the controller forward `ticks` ticks, servicing every event that
    /// falls due on the way.
    pub fn advance(&mut self, mem: &mut BusState, ticks: u64) {
        let target = self.now + ticks;
        while let Some((slot, due)) = self.events.pop_due(target) {
            self.now = due.max(self.now);
            self.service(slot, mem);
        }
        self.now = target;
    }

    /// Jumps to the next event and services it. False if nothing is pending.
    pub fn step(&mut self, mem: &mut BusState) -> bool {
        match self.events.next_due() {
            Some(due) => {
                self.advance(mem, due.saturating_sub(self.now));
                true
            }
            None => false,
        }
    }

    pub fn next_event(&self) -> Option<u64> {
        self.events.next_due()
    }

    fn service(&mut self, slot: Slot, mem: &mut BusState) {
        match slot {
            Slot::Control => self.set_done(),
            Slot::Unit(u) => {
                // Off-reel is already handled by the time it gets here.
                let _ = self.service_unit(u, mem);
            }
        }
    }

    fn service_unit(&mut self, u: usize, mem: &mut BusState) -> Result<(), OffTape> {
        match self.units[u].regime {
            Regime::Decelerating(_) => {
                self.settle(u)?;
                let unit = &mut self.units[u];
                match unit.pending.pop() {
                    None => {
                        debug!("TC11: unit {u} stopped at line {}", unit.position);
                        unit.regime = Regime::Stopped;
                    }
                    Some(phase) => {
                        unit.regime = phase.regime();
                        let ticks = self.config.timing.accel_time();
                        self.events.schedule_after(Slot::Unit(u), self.now, ticks);
                    }
                }
            }
            Regime::Accelerating(_) => match self.units[u].pending.pop() {
                Some(Phase::Run(dir, op)) => self.new_function(u, dir, op)?,
                _ => self.stop_unit(u)?,
            },
            Regime::AtSpeed(dir, op) => {
                self.settle(u)?;
                self.transfer(u, dir, op, mem);
            }
            Regime::Stopped => warn!("TC11: event for stopped unit {u}"),
        }
        Ok(())
    }

    // Brings the unit's position up to date. Running off the reel unloads it.
    fn settle(&mut self, u: usize) -> Result<(), OffTape> {
        let timing = self.config.timing;
        let res = self.units[u].update_position(self.now, &timing);
        if let Err(off) = res {
            self.force_off_tape(u, off);
        }
        res
    }

    fn force_off_tape(&mut self, u: usize, off: OffTape) {
        warn!("TC11: unit {u}: {off}");
        let locked = self.units[u].is_write_locked();
        if let Some(media) = self.release(u) {
            if let (Some(path), false) = (&media.file, locked) {
                if let Err(e) = media.image.save(path) {
                    error!("TC11: unit {u}: {e}");
                }
            }
        }
        if u == self.selected_unit() && self.function() != Function::Stop {
            self.tcst |= STA_SEL;
            self.set_done();
        }
        if self.config.stop_on_off_reel {
            self.stop = Some(StopRequest { device: "TC11", reason: format!("unit {u}: {off}") });
        }
    }

    fn release(&mut self, u: usize) -> Option<Media> {
        self.events.cancel(Slot::Unit(u));
        self.units[u].unmount()
    }

    /// Latches error `bits`, finishes the command, and starts stopping the
    /// unit if it was being driven.
    pub(super) fn set_error(&mut self, u: usize, bits: u16) {
        warn!("TC11: unit {u} error {bits:06o}");
        self.tcst |= bits;
        if !self.is_done() {
            self.set_done();
        }
        if self.units[u].regime.is_driven() {
            let _ = self.stop_unit(u);
        }
    }

    fn set_done(&mut self) {
        self.tccm |= CSR_DONE;
        if self.tccm & CSR_IE != 0 {
            self.request_interrupt();
        }
    }

    fn request_interrupt(&mut self) {
        self.interrupt_requested = true;
    }

    fn clear_interrupt(&mut self) {
        self.interrupt_requested = false;
    }

    // Begins decelerating, dropping anything deferred.
    fn stop_unit(&mut self, u: usize) -> Result<(), OffTape> {
        match self.units[u].regime {
            Regime::Stopped => {}
            Regime::Decelerating(_) => self.units[u].pending = Pending::none(),
            Regime::Accelerating(dir) | Regime::AtSpeed(dir, _) => {
                self.events.cancel(Slot::Unit(u));
                self.settle(u)?;
                let unit = &mut self.units[u];
                unit.regime = Regime::Decelerating(dir);
                unit.pending = Pending::none();
                let ticks = self.config.timing.decel_time;
                self.events.schedule_after(Slot::Unit(u), self.now, ticks);
            }
        }
        Ok(())
    }

    // A unit losing selection keeps moving but stops doing anything useful.
    fn deselect(&mut self, u: usize) {
        match self.units[u].regime {
            Regime::AtSpeed(dir, _) => {
                let _ = self.new_function(u, dir, Operation::OffReel);
            }
            Regime::Accelerating(dir) => {
                self.units[u].pending = Pending::one(Phase::Run(dir, Operation::OffReel));
            }
            Regime::Decelerating(_) => {
                let unit = &mut self.units[u];
                if let Some(Phase::Accelerate(dir)) = unit.pending.peek() {
                    unit.pending =
                        Pending::two(Phase::Accelerate(dir), Phase::Run(dir, Operation::OffReel));
                }
            }
            Regime::Stopped => {}
        }
    }

    fn start(&mut self, u: usize) {
        if !self.units[u].is_attached() {
            self.set_error(u, STA_SEL);
            return;
        }
        let fnc = self.function();
        let dir = self.direction();
        if fnc == Function::StopSelected {
            self.events.schedule_after(Slot::Control, self.now, self.config.command_time);
            let _ = self.stop_unit(u);
            return;
        }
        let Some(op) = fnc.operation() else {
            return;
        };

        let regime = self.units[u].regime;
        match plan_start(regime, dir, op) {
            Plan::Accelerate(pending) => {
                self.events.cancel(Slot::Unit(u));
                if self.settle(u).is_err() {
                    return;
                }
                let unit = &mut self.units[u];
                unit.regime = Regime::Accelerating(dir);
                unit.pending = pending;
                let ticks = self.config.timing.accel_time();
                self.events.schedule_after(Slot::Unit(u), self.now, ticks);
            }
            Plan::Reverse(pending) => {
                if let Regime::Decelerating(_) = regime {
                    self.units[u].pending = pending;
                    return;
                }
                let _ = self.stop_unit(u);
                // Stopping may have unloaded the tape.
                if self.units[u].is_attached() {
                    self.units[u].pending = pending;
                }
            }
            Plan::Defer(pending) => self.units[u].pending = pending,
            Plan::Execute(phase) => {
                if let Phase::Run(dir, op) = phase {
                    let _ = self.new_function(u, dir, op);
                }
            }
        }
    }

    // The unit is at speed; aims its next event at wherever `op` first has
    // work to do.
    fn new_function(&mut self, u: usize, dir: Direction, op: Operation) -> Result<(), OffTape> {
        let old = self.units[u].position;
        self.settle(u)?;
        let unit = &mut self.units[u];
        unit.regime = Regime::AtSpeed(dir, op);
        unit.pending = Pending::none();
        if unit.position == old {
            unit.position = match dir {
                Direction::Forward => old + 1,
                Direction::Reverse => old.saturating_sub(1),
            };
        }
        self.events.cancel(Slot::Unit(u));

        let unit = &self.units[u];
        let pos = unit.position;
        if op == Operation::OffReel {
            let target = match dir {
                Direction::Reverse => -OFF_REEL_LINES,
                Direction::Forward => unit.last_line() as i64 + OFF_REEL_LINES,
            };
            self.schedule_to(u, target);
            return Ok(());
        }

        let wrong_end = match dir {
            Direction::Reverse => unit.in_reverse_end_zone(pos),
            Direction::Forward => unit.in_forward_end_zone(pos),
        };
        if wrong_end {
            self.set_error(u, STA_END);
            return Ok(());
        }
        self.substate = Substate::default();

        let lpb = unit.lines_per_block();
        let blocks = unit.geometry().blocks;
        let block = unit.block_of(pos);
        let offset = unit.offset_in_block(pos);
        let in_end = unit.in_end_zone(pos);
        let header = unit.geometry().header_trailer_lines();
        let bsl = |b: u32| unit.block_start_line(b) as i64;
        let word = LINES_PER_WORD as i64;

        let target = match op {
            Operation::Search => match dir {
                Direction::Reverse => {
                    let b = if unit.in_forward_end_zone(pos) { blocks } else { block };
                    bsl(b) - 2 * word
                }
                Direction::Forward => {
                    let b = if unit.in_reverse_end_zone(pos) { 0 } else { block + 1 };
                    bsl(b) + 2 * word - 1
                }
            },
            Operation::Read | Operation::Write => {
                if in_end {
                    match dir {
                        Direction::Reverse => unit.forward_end_zone_line() as i64 - header as i64 - word,
                        Direction::Forward => bsl(0) + header as i64 + word - 1,
                    }
                } else if unit.in_data_zone(offset) {
                    self.set_error(u, STA_BLKM);
                    return Ok(());
                } else {
                    match dir {
                        Direction::Reverse => {
                            let b = if offset >= lpb - header { block + 1 } else { block };
                            bsl(b) - header as i64 - word
                        }
                        Direction::Forward => {
                            let b = if offset < header { block } else { block + 1 };
                            bsl(b) + header as i64 + word - 1
                        }
                    }
                }
            }
            Operation::ReadAll | Operation::WriteAll => {
                if in_end {
                    match dir {
                        Direction::Reverse => unit.forward_end_zone_line() as i64 - word,
                        Direction::Forward => bsl(0) + word - 1,
                    }
                } else {
                    let mid_block = match dir {
                        Direction::Reverse => offset < lpb - header,
                        Direction::Forward => offset >= header,
                    };
                    if mid_block {
                        self.set_error(u, STA_BLKM);
                        return Ok(());
                    }
                    match dir {
                        Direction::Reverse => bsl(block + 1) - word,
                        Direction::Forward => bsl(block) + word - 1,
                    }
                }
            }
            Operation::OffReel => unreachable!(),
        };
        self.schedule_to(u, target);
        Ok(())
    }

    fn schedule_to(&mut self, u: usize, target: i64) {
        let lines = (target - self.units[u].position as i64).unsigned_abs();
        let ticks = self.config.timing.lines_to_ticks(lines);
        self.events.schedule_after(Slot::Unit(u), self.now, ticks);
    }

    fn register_index(&self, addr: u16) -> usize {
        let reg = addr.wrapping_sub(self.config.base) as usize / 2;
        if addr < self.config.base || reg >= NUM_REGS {
            panic!("TC11 doesn't handle address {addr:o}");
        }
        reg
    }
}

impl MMIOHandler for Tc11 {
    fn reset(&mut self, _mem: &mut BusState) {
        debug!("TC11: reset");
        for u in 0..NUM_UNITS {
            let _ = self.stop_unit(u);
        }
        self.clear_registers();
        self.events.cancel(Slot::Control);
    }

    fn tick(&mut self, mem: &mut BusState) -> Option<Interrupt> {
        self.advance(mem, 1);
        self.interrupt_requested.then_some(Interrupt {
            prio: self.config.priority,
            vector: self.config.vector,
        })
    }

    fn interrupt_accepted(&mut self) {
        self.clear_interrupt();
    }

    fn take_stop(&mut self) -> Option<StopRequest> {
        self.stop.take()
    }

    fn default_addrs(&self) -> &[u16] {
        &self.addrs
    }

    fn read_byte(&mut self, mem: &mut BusState, addr: u16) -> u8 {
        let val = self.read_word(mem, addr & !0x1);
        if addr & 0x1 == 0 { val as u8 } else { (val >> 8) as u8 }
    }

    fn read_word(&mut self, _mem: &mut BusState, addr: u16) -> u16 {
        let reg = self.register_index(addr);
        self.read_register(reg)
    }

    fn write_byte(&mut self, _mem: &mut BusState, addr: u16, val: u8) {
        let reg = self.register_index(addr);
        self.write_register(reg, val as u16, Access::Byte { high: addr & 0x1 != 0 });
    }

    fn write_word(&mut self, _mem: &mut BusState, addr: u16, val: u16) {
        let reg = self.register_index(addr);
        self.write_register(reg, val, Access::Word);
    }
}
