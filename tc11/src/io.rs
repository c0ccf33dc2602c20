pub mod dectape;
pub mod scheduler;

use crate::BusState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub prio: u8, // 0o0 through 0o7
    pub vector: u16,
}

// A device asking for the whole simulation to halt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopRequest {
    pub device: &'static str,
    pub reason: String,
}

pub trait MMIOHandler: Send {
    fn reset(&mut self, _mem: &mut BusState) {}
    fn tick(&mut self, _mem: &mut BusState) -> Option<Interrupt> {
        None
    }
    fn interrupt_accepted(&mut self) {}
    fn take_stop(&mut self) -> Option<StopRequest> {
        None
    }
    fn default_addrs(&self) -> &[u16] {
        &[]
    }

    fn read_byte(&mut self, mem: &mut BusState, addr: u16) -> u8;
    fn read_word(&mut self, mem: &mut BusState, addr: u16) -> u16;

    fn write_byte(&mut self, mem: &mut BusState, addr: u16, val: u8);
    fn write_word(&mut self, mem: &mut BusState, addr: u16, val: u16);
}
