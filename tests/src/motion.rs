use tc_lib::io::dectape::geometry::Format;
use tc_lib::io::dectape::image::TapeImage;
use tc_lib::io::dectape::motion::*;
use tc_lib::io::dectape::*;
use tc_lib::Tc11Config;

use proptest::prelude::*;

use crate::rig::Rig;

proptest! {
    // Ramp up, run D lines at speed, ramp down: the unit ends up within a
    // line of where the ramp equations and the at-speed schedule put it.
    #[test]
    fn travel_matches_schedule(
        d in 0u64..200_000,
        line_time in 1u64..40,
        decel_time in 1_000u64..100_000,
        reverse in any::<bool>(),
    ) {
        let timing = Timing { line_time, decel_time };
        let geo = Format::Bits18.geometry();
        let dir = Direction::from_reverse(reverse);
        let start = geo.last_line() / 2;

        let pos = advance_position(start, Regime::Accelerating(dir), timing.accel_time(), &timing, &geo).unwrap();
        let running = Regime::AtSpeed(dir, Operation::Search);
        let pos = advance_position(pos, running, timing.lines_to_ticks(d), &timing, &geo).unwrap();
        let pos = advance_position(pos, Regime::Decelerating(dir), decel_time, &timing, &geo).unwrap();

        let ramp_up = (timing.accel_time() / line_time).max(1) / 2;
        let ramp_down = (decel_time / line_time).max(1) / 2;
        let expected = (d + ramp_up + ramp_down) as i64;
        let moved = (pos as i64 - start as i64).abs();
        prop_assert!((moved - expected).abs() <= 1, "moved {} expected {}", moved, expected);
    }

    // A ramp never runs past its end no matter how late the update comes.
    #[test]
    fn ramps_saturate(extra in 0u64..1_000_000) {
        let timing = Timing { line_time: 12, decel_time: 40000 };
        let stop = Regime::Decelerating(Direction::Forward);
        prop_assert_eq!(
            timing.lines_moved(stop, timing.decel_time + extra),
            timing.lines_moved(stop, timing.decel_time)
        );
    }
}

#[test]
fn start_and_stop_from_rest() {
    let mut rig = Rig::with_tape(Format::Bits16);
    let timing = rig.tc.config().timing;
    let start = rig.tc.unit(0).position();

    rig.go(Function::Search, 0, Direction::Forward);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Accelerating(Direction::Forward));
    rig.advance(timing.accel_time());
    assert!(rig.tc.unit(0).regime().is_at_speed());
    assert!(rig.read(TCST) & STA_UPS != 0);
    let ramp = rig.tc.unit(0).position() - start;
    assert_eq!(ramp as u64, timing.lines_moved(Regime::Accelerating(Direction::Forward), timing.accel_time()));

    rig.wait_done();
    let at = rig.tc.unit(0).position();
    assert_eq!(rig.command(Function::StopSelected, Direction::Forward) & STA_ALLERR, 0);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));
    rig.advance(timing.decel_time);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Stopped);
    let coast = rig.tc.unit(0).position() - at;
    let expected = timing.lines_moved(Regime::Decelerating(Direction::Forward), timing.decel_time);
    assert!((coast as i64 - expected as i64).abs() <= 1, "coasted {coast}, expected {expected}");
}

#[test]
fn reversing_stops_first() {
    let mut rig = Rig::with_tape(Format::Bits18);
    assert!(rig.search(Direction::Forward, Some(5)));

    rig.go(Function::Search, 0, Direction::Reverse);
    let unit = rig.tc.unit(0);
    assert_eq!(unit.regime(), Regime::Decelerating(Direction::Forward));
    assert_eq!(unit.pending().len(), 2);

    rig.advance(rig.tc.config().timing.decel_time);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Accelerating(Direction::Reverse));
    rig.wait_done();
    assert_eq!(rig.read(TCST) & STA_ALLERR, 0);
}

#[test]
fn go_is_ignored_until_done() {
    let mut rig = Rig::with_tape(Format::Bits18);
    let timing = rig.tc.config().timing;
    rig.go(Function::Search, 0, Direction::Forward);
    rig.advance(timing.accel_time() / 2);
    assert!(!rig.tc.is_done());

    rig.go(Function::StopSelected, 0, Direction::Forward);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Accelerating(Direction::Forward));
    rig.wait_done();
    assert_eq!(rig.read(TCST) & STA_ALLERR, 0);
    // Attaching leaves the head at the start of block 0, so the first block
    // mark seen at speed is block 1's.
    assert_eq!(rig.read(TCDT), 1);
}

#[test]
fn restart_while_stopping() {
    let mut rig = Rig::with_tape(Format::Bits18);
    assert!(rig.search(Direction::Forward, Some(3)));
    assert_eq!(rig.command(Function::StopSelected, Direction::Forward) & STA_ALLERR, 0);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));

    // Same direction: back up to speed straight from the ramp down.
    rig.go(Function::Search, 0, Direction::Forward);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Accelerating(Direction::Forward));
    assert_eq!(rig.tc.unit(0).pending().len(), 1);
    rig.wait_done();
    assert_eq!(rig.read(TCST) & STA_ALLERR, 0);
    assert!(rig.read(TCDT) > 3);
}

#[test]
fn running_off_the_reel_unloads_the_tape() {
    let mut rig = Rig::with_tape(Format::Bits16);
    rig.rewind();
    // Unit 0 loses selection while heading for the reverse leader.
    rig.go(Function::Search, 0, Direction::Reverse);
    rig.write(TCCM, Function::Search.command(1, Direction::Reverse));
    while rig.tc.step(&mut rig.mem) {}
    let unit = rig.tc.unit(0);
    assert!(!unit.is_attached());
    assert_eq!(unit.regime(), Regime::Stopped);
    assert_eq!(unit.position(), 0);
}

#[test]
fn detaching_the_target_while_turning_around_finishes_the_command() {
    let mut rig = Rig::with_tape(Format::Bits16);
    assert!(rig.search(Direction::Forward, Some(5)));
    rig.go(Function::Read, 0, Direction::Reverse);
    assert_eq!(rig.tc.unit(0).regime(), Regime::Decelerating(Direction::Forward));
    assert!(!rig.tc.is_done());

    rig.tc.detach(0).unwrap();
    assert!(rig.tc.is_done());
    assert_eq!(rig.read(TCST), STA_SEL);
    assert_eq!(rig.tc.next_event(), None);

    // The controller takes the next command.
    rig.tc.attach_image(0, TapeImage::blank(Format::Bits16), false).unwrap();
    assert_eq!(rig.command(Function::Search, Direction::Forward) & STA_ALLERR, 0);
    assert_eq!(rig.read(TCDT), 1);
}

#[test]
fn coasting_off_the_reel_after_a_search_reports_select() {
    let config = Tc11Config {
        timing: Timing { line_time: 1, decel_time: 400_000 },
        ..Tc11Config::default()
    };
    let mut rig = Rig::with_config(config);
    rig.tc.attach_image(0, TapeImage::blank(Format::Bits16), false).unwrap();
    assert_eq!(rig.command(Function::Search, Direction::Forward) & STA_ALLERR, 0);

    // Runs into the end zone at speed, then needs more tape to stop than
    // the end zone has.
    while rig.tc.step(&mut rig.mem) {}
    assert!(!rig.tc.unit(0).is_attached());
    assert!(rig.tc.is_done());
    assert_eq!(rig.read(TCST), STA_END | STA_SEL);
}
