use common::constants::*;
use crate::MMIOHandler;
use crate::io::{Interrupt, StopRequest};
use crate::{BusError, BusState};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickRet {
    Ok,
    // An interrupt above the bus priority was taken.
    Interrupt(Interrupt),
    Halt(StopRequest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunRet {
    Done(u64),
    Halted(StopRequest),
    TimedOut,
}

/// A Unibus with memory and MMIO devices, but no processor. Whoever owns the
/// bus plays the processor: it issues register accesses and calls `tick`.
pub struct Bus {
    state: BusState,
    mmio_handlers: HashMap<u16, Arc<Mutex<dyn MMIOHandler>>>,
    // Each device once, in registration order, for ticking.
    devices: Vec<Arc<Mutex<dyn MMIOHandler>>>,
    prio: u8,
    ticks: u64,
}

impl Bus {
    pub fn new() -> Bus {
        Self::with_memory(BusState::new())
    }

    pub fn with_memory(state: BusState) -> Bus {
        Bus {
            state,
            mmio_handlers: HashMap::new(),
            devices: Vec::new(),
            prio: 0,
            ticks: 0,
        }
    }

    // Tick every device once and take the highest-priority interrupt, if it
    // beats the bus priority.
    pub fn tick(&mut self) -> TickRet {
        self.ticks += 1;
        let mut interrupt: Option<(Arc<Mutex<dyn MMIOHandler>>, Interrupt)> = None;
        let mut stop = None;
        for dev in self.devices.iter() {
            let mut locked = dev.lock().unwrap();
            if let Some(inter) = locked.tick(&mut self.state) {
                if interrupt.as_ref().is_none_or(|max| inter.prio > max.1.prio) {
                    interrupt = Some((dev.clone(), inter));
                }
            }
            if stop.is_none() {
                stop = locked.take_stop();
            }
        }

        if let Some(stop) = stop {
            debug!("Bus: halted by {}: {}", stop.device, stop.reason);
            return TickRet::Halt(stop);
        }
        if let Some((dev, inter)) = interrupt {
            if inter.prio > self.prio {
                trace!("Bus: interrupt at vector 0o{:o}", inter.vector);
                dev.lock().unwrap().interrupt_accepted();
                return TickRet::Interrupt(inter);
            }
        }
        TickRet::Ok
    }

    // Tick until `done` holds, a device halts the bus, or `max_ticks` pass.
    pub fn run_until<F>(&mut self, max_ticks: u64, mut done: F) -> RunRet
    where
        F: FnMut(&mut Bus) -> bool,
    {
        for n in 0..max_ticks {
            if done(self) {
                return RunRet::Done(n);
            }
            if let TickRet::Halt(stop) = self.tick() {
                return RunRet::Halted(stop);
            }
        }
        if done(self) { RunRet::Done(max_ticks) } else { RunRet::TimedOut }
    }

    pub fn reset(&mut self) {
        for dev in self.devices.iter() {
            dev.lock().unwrap().reset(&mut self.state);
        }
    }

    pub fn set_prio(&mut self, prio: u8) {
        assert!(prio <= 0o7);
        self.prio = prio;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn set_mmio_handler(&mut self, handler: impl MMIOHandler + 'static) {
        self.set_shared_mmio_handler(Arc::new(Mutex::new(handler)));
    }

    // For callers that want to keep a handle on the device.
    pub fn set_shared_mmio_handler(&mut self, handler: Arc<Mutex<dyn MMIOHandler>>) {
        let addrs = handler.lock().unwrap().default_addrs().to_vec();
        for addr in addrs {
            self.register_handler(handler.clone(), addr);
        }
        self.devices.push(handler);
    }

    fn register_handler(&mut self, handler: Arc<Mutex<dyn MMIOHandler>>, addr: u16) {
        assert!(addr >= MMIO_START);
        assert!(addr & 0x1 == 0, "MMIOHandler addr {addr:o} not aligned");
        let prev = self.mmio_handlers.insert(addr, handler);
        assert!(prev.is_none(), "Duplicate MMIOHandler for {addr:o}");
    }


    ///////////////////////////////////////////////////////////////////////////


    fn handler(&self, addr: u16) -> Result<Arc<Mutex<dyn MMIOHandler>>, BusError> {
        self.mmio_handlers
            .get(&(addr & !0x1))
            .cloned()
            .ok_or(BusError::NonExistent(Self::unibus_addr(addr)))
    }

    // The top 8K of the 16-bit space is the I/O page.
    fn unibus_addr(addr: u16) -> u32 {
        if addr >= MMIO_START {
            IO_PAGE_START + (addr - MMIO_START) as u32
        } else {
            addr as u32
        }
    }

    pub fn read_byte(&mut self, addr: u16) -> Result<u8, BusError> {
        if addr >= MMIO_START {
            let handler = self.handler(addr)?;
            let val = handler.lock().unwrap().read_byte(&mut self.state, addr);
            Ok(val)
        } else {
            self.state.read_byte(addr as u32)
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) -> Result<(), BusError> {
        if addr >= MMIO_START {
            let handler = self.handler(addr)?;
            handler.lock().unwrap().write_byte(&mut self.state, addr, val);
            Ok(())
        } else {
            self.state.write_byte(addr as u32, val)
        }
    }

    pub fn read_word(&mut self, addr: u16) -> Result<u16, BusError> {
        if addr & 1 != 0 {
            return Err(BusError::Odd(Self::unibus_addr(addr)));
        }
        if addr >= MMIO_START {
            let handler = self.handler(addr)?;
            let val = handler.lock().unwrap().read_word(&mut self.state, addr);
            Ok(val)
        } else {
            self.state.read_word(addr as u32)
        }
    }

    pub fn write_word(&mut self, addr: u16, val: u16) -> Result<(), BusError> {
        if addr & 1 != 0 {
            return Err(BusError::Odd(Self::unibus_addr(addr)));
        }
        if addr >= MMIO_START {
            let handler = self.handler(addr)?;
            handler.lock().unwrap().write_word(&mut self.state, addr, val);
            Ok(())
        } else {
            self.state.write_word(addr as u32, val)
        }
    }

    pub fn get_state(&self) -> &BusState {
        &self.state
    }

    pub fn get_state_mut(&mut self) -> &mut BusState {
        &mut self.state
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
