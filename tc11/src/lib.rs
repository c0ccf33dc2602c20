pub mod bus;
pub mod bus_state;
pub mod io;

pub use bus::{Bus, RunRet, TickRet};
pub use bus_state::{BusError, BusState};
pub use io::MMIOHandler;
pub use io::dectape::{Tc11, Tc11Config};
