use tc_lib::io::dectape::geometry::Format;
use tc_lib::io::dectape::motion::{Direction, Regime};
use tc_lib::io::dectape::*;
use tc_lib::io::Interrupt;
use tc_lib::{BusState, MMIOHandler, Tc11, Tc11Config};

use crate::rig::{Rig, BUFFER};

#[test]
fn power_up_state() {
    let mut rig = Rig::new();
    assert_eq!(rig.read(TCST), 0);
    assert_eq!(rig.read(TCCM), CSR_DONE);
    assert_eq!(rig.read(TCWC), 0);
    assert_eq!(rig.read(TCBA), 0);
    assert_eq!(rig.read(TCDT), 0);
    assert!(!rig.tc.interrupt_requested());
}

#[test]
fn status_reads_are_idempotent() {
    let mut rig = Rig::with_tape(Format::Bits16);
    rig.go(Function::Read, 0, Direction::Reverse);
    rig.wait_done();
    let first = rig.read(TCST);
    assert!(first & STA_END != 0);
    assert_eq!(rig.read(TCST), first);
    assert_eq!(rig.read(TCCM), rig.read(TCCM));
}

#[test]
fn registers_sit_at_base() {
    let config = Tc11Config::default();
    let tc = Tc11::new(config);
    assert_eq!(tc.default_addrs(), &[0o177340, 0o177342, 0o177344, 0o177346, 0o177350]);

    let tc = Tc11::new(Tc11Config { base: 0o177000, ..config });
    assert_eq!(tc.default_addrs()[TCDT], 0o177010);
}

#[test]
fn unattached_unit_is_select_error() {
    let mut rig = Rig::new();
    rig.go(Function::Read, 3, Direction::Forward);
    assert!(rig.tc.is_done());
    assert_eq!(rig.read(TCST), STA_SEL);
    assert!(rig.read(TCCM) & CSR_ERR != 0);
    assert_eq!(rig.tc.unit(3).regime(), Regime::Stopped);
}

#[test]
fn write_lock_and_write_mark_are_illegal() {
    let mut rig = Rig::with_tape(Format::Bits18);
    rig.tc.set_write_locked(0, true);
    assert_eq!(rig.command(Function::Write, Direction::Forward), STA_ILO);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Stopped);
    assert_eq!(rig.command(Function::WriteAll, Direction::Forward), STA_ILO);

    // Reads are still fine on a locked unit.
    assert_eq!(rig.command(Function::Search, Direction::Forward) & STA_ALLERR, 0);

    rig.tc.set_write_locked(0, false);
    assert_eq!(rig.command(Function::WriteMark, Direction::Forward) & STA_ILO, STA_ILO);
}

#[test]
fn errors_clear_on_next_go() {
    let mut rig = Rig::new();
    rig.go(Function::Search, 2, Direction::Forward);
    assert_eq!(rig.read(TCST), STA_SEL);
    // A write without GO leaves them alone.
    rig.write(TCCM, Function::Search.command(2, Direction::Forward));
    assert_eq!(rig.read(TCST), STA_SEL);

    rig.tc.attach_image(2, tc_lib::io::dectape::image::TapeImage::blank(Format::Bits16), false).unwrap();
    rig.go(Function::Search, 2, Direction::Forward);
    assert_eq!(rig.read(TCST) & STA_ALLERR, 0);
    assert_eq!(rig.read(TCCM) & (CSR_ERR | CSR_DONE), 0);
}

#[test]
fn interrupt_enable() {
    let mut rig = Rig::new();
    // Enabling with DONE already set interrupts at once.
    rig.write(TCCM, CSR_IE);
    assert!(rig.tc.interrupt_requested());
    let inter = rig.tc.tick(&mut rig.mem);
    assert_eq!(inter, Some(Interrupt { prio: 6, vector: 0o214 }));
    rig.tc.interrupt_accepted();
    assert_eq!(rig.tc.tick(&mut rig.mem), None);

    // Re-writing IE is not a new edge.
    rig.write(TCCM, CSR_IE);
    assert!(!rig.tc.interrupt_requested());

    rig.write(TCCM, 0);
    rig.write(TCCM, CSR_IE);
    assert!(rig.tc.interrupt_requested());
    rig.write(TCCM, 0);
    assert!(!rig.tc.interrupt_requested());
}

#[test]
fn done_interrupts_when_enabled() {
    let mut rig = Rig::with_tape(Format::Bits16);
    rig.write(TCCM, Function::Search.command(0, Direction::Forward) | CSR_IE | CSR_GO);
    assert!(!rig.tc.interrupt_requested());
    rig.wait_done();
    assert!(rig.tc.interrupt_requested());
}

#[test]
fn byte_writes_merge() {
    let mut rig = Rig::new();
    rig.write(TCWC, 0o123456);
    rig.write_byte(TCWC, false, 0o377);
    assert_eq!(rig.read(TCWC), 0o123777);
    rig.write_byte(TCWC, true, 0o001);
    assert_eq!(rig.read(TCWC), 0o000777);

    // Unit select lives in the high byte of TCCM.
    rig.write_byte(TCCM, true, 0o005);
    assert_eq!(rig.tc.selected_unit(), 5);
    assert_eq!(rig.read(TCCM) & CSR_DONE, CSR_DONE);

    let addr = rig.tc.config().base + 2 * TCCM as u16 + 1;
    assert_eq!(rig.tc.read_byte(&mut rig.mem, addr), 0o005);
}

#[test]
fn writable_fields() {
    let mut rig = Rig::new();
    rig.write(TCST, 0o177777);
    assert_eq!(rig.read(TCST), STA_XD_MASK);
    rig.write(TCBA, 0o1235);
    assert_eq!(rig.read(TCBA), 0o1234);
    rig.write(TCDT, 0o7070);
    assert_eq!(rig.read(TCDT), 0o7070);
    // ERR and DONE can't be written.
    rig.write(TCCM, CSR_ERR);
    assert_eq!(rig.read(TCCM), CSR_DONE);
}

#[test]
fn bus_address_carries_into_extension() {
    let mut rig = Rig::with_image(crate::rig::patterned(Format::Bits16));
    rig.position_at(4, Direction::Forward);
    rig.write(TCWC, 2u16.wrapping_neg());
    rig.write(TCBA, 0o177776);
    let tcst = rig.command(Function::Read, Direction::Forward);
    assert_eq!(tcst & STA_ALLERR, 0);

    let block = rig.image().block(4).to_vec();
    assert_eq!(rig.read(TCBA), 2);
    assert_eq!(rig.read(TCCM) & CSR_MEX, 1 << CSR_MEX_SHIFT);
    assert_eq!(rig.mem.read_word(0o177776), Ok(block[0] as u16));
    assert_eq!(rig.mem.read_word(0o200000), Ok(block[1] as u16));
}

#[test]
fn missing_memory_is_nxm() {
    let mut rig = Rig {
        tc: Tc11::new(Tc11Config::default()),
        mem: BusState::with_size(0o10000),
    };
    rig.tc.attach_image(0, tc_lib::io::dectape::image::TapeImage::blank(Format::Bits16), false).unwrap();
    rig.position_at(1, Direction::Forward);
    rig.write(TCWC, 10u16.wrapping_neg());
    rig.write(TCBA, 0o20000);
    let tcst = rig.command(Function::Read, Direction::Forward);
    assert_eq!(tcst & STA_ALLERR, STA_NXM);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));
}

#[test]
fn stop_all_halts_every_unit() {
    let mut rig = Rig::with_tape(Format::Bits16);
    rig.tc.attach_image(1, tc_lib::io::dectape::image::TapeImage::blank(Format::Bits16), false).unwrap();
    assert!(rig.search(Direction::Forward, Some(2)));
    assert_eq!(rig.command(Function::Stop, Direction::Forward) & STA_ALLERR, 0);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));
    assert_eq!(rig.tc.unit(1).regime(), Regime::Stopped);
    rig.advance(rig.tc.config().timing.decel_time);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Stopped);
}

#[test]
fn reset_stops_but_keeps_tapes() {
    let mut rig = Rig::with_tape(Format::Bits16);
    rig.write(TCWC, 0o777);
    rig.go(Function::Search, 0, Direction::Forward);
    rig.advance(100);
    rig.tc.reset(&mut rig.mem);
    assert_eq!(rig.read(TCCM), CSR_DONE);
    assert_eq!(rig.read(TCWC), 0);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));
    assert!(rig.tc.unit(0).is_attached());
    while rig.tc.step(&mut rig.mem) {}
    assert_eq!(rig.tc.unit(0).regime(), Regime::Stopped);
    assert_eq!(rig.read(TCST), 0);
}

#[test]
fn buffer_is_untouched_by_search() {
    let mut rig = Rig::with_image(crate::rig::patterned(Format::Bits18));
    rig.write(TCBA, BUFFER);
    rig.search(Direction::Forward, Some(2));
    assert_eq!(rig.mem.read_word(BUFFER as u32), Ok(0));
    assert_eq!(rig.read(TCBA), BUFFER);
}
