
use tc_lib::{Bus, BusError, RunRet, Tc11, Tc11Config};
use tc_lib::io::dectape::geometry::Format;
use tc_lib::io::dectape::image::{ImageError, TapeImage};
use tc_lib::io::dectape::motion::{Direction, Timing};
use tc_lib::io::dectape::{AttachError, Function, CSR_DONE, CSR_GO, STA_ALLERR, STA_END, TCBA, TCCM, TCDT, TCST, TCWC};

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand};
use log::debug;
use thiserror::Error;


/// TC11 DECtape image tool
#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show an image's format and geometry.
    Info {
        image: PathBuf,

        /// Image format (12b, 16b or 18b); inferred from size if omitted.
        #[arg(long)]
        format: Option<Format>,
    },

    /// Re-encode an image in another format.
    Convert {
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        to: Format,

        #[arg(long)]
        from: Option<Format>,
    },

    /// Read a block through a simulated TC11 and print it in octal.
    Dump {
        image: PathBuf,

        #[arg(long)]
        block: u32,

        /// Read with the tape moving in reverse.
        #[arg(long)]
        reverse: bool,

        /// Read all: include the header and trailer words.
        #[arg(long)]
        all: bool,

        #[arg(long)]
        format: Option<Format>,

        #[command(flatten)]
        timing: TimingArgs,
    },
}

#[derive(Args)]
struct TimingArgs {
    /// Ticks per line at speed.
    #[arg(long, default_value_t = 12)]
    line_time: u64,

    /// Ticks for a full stop.
    #[arg(long, default_value_t = 40000)]
    decel_time: u64,

    /// Halt instead of quietly unloading a tape that runs off the reel.
    #[arg(long)]
    stop_on_off_reel: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Attach(#[from] AttachError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("block {block} is past the end of a {format} tape ({blocks} blocks)")]
    NoSuchBlock { block: u32, format: Format, blocks: u32 },
    #[error("tape error, TCST = {0:06o}")]
    Tape(u16),
    #[error("simulation halted: {0}")]
    Halted(String),
    #[error("controller never finished")]
    Timeout,
}

// Plays the processor: drives the controller's registers over the bus.
struct Driver {
    bus: Bus,
    base: u16,
    max_ticks: u64,
}

impl Driver {
    const BUFFER: u16 = 0o1000;

    fn reg(&self, reg: usize) -> u16 {
        self.base + 2 * reg as u16
    }

    // Issue a command to unit 0 and wait for DONE. Returns TCST.
    fn command(&mut self, fnc: Function, dir: Direction) -> Result<u16, CliError> {
        let tccm = self.reg(TCCM);
        debug!("issuing {fnc:?} {dir:?}");
        self.bus.write_word(tccm, fnc.command(0, dir) | CSR_GO)?;
        let done = |bus: &mut Bus| bus.read_word(tccm).map_or(true, |v| v & CSR_DONE != 0);
        match self.bus.run_until(self.max_ticks, done) {
            RunRet::Done(_) => Ok(self.bus.read_word(self.reg(TCST))?),
            RunRet::Halted(stop) => Err(CliError::Halted(stop.reason)),
            RunRet::TimedOut => Err(CliError::Timeout),
        }
    }

    // Searches in `dir` until block `target` is reported. Ok(false) if the
    // tape reached an end zone first.
    fn search(&mut self, dir: Direction, target: Option<u32>) -> Result<bool, CliError> {
        loop {
            let tcst = self.command(Function::Search, dir)?;
            if tcst & STA_END != 0 {
                return Ok(false);
            }
            if tcst & STA_ALLERR != 0 {
                return Err(CliError::Tape(tcst));
            }
            let found = self.bus.read_word(self.reg(TCDT))? as u32;
            if Some(found) == target {
                return Ok(true);
            }
        }
    }

    fn read(&mut self, fnc: Function, dir: Direction, words: u16) -> Result<Vec<u16>, CliError> {
        self.bus.write_word(self.reg(TCWC), words.wrapping_neg())?;
        self.bus.write_word(self.reg(TCBA), Self::BUFFER)?;
        let tcst = self.command(fnc, dir)?;
        if tcst & STA_ALLERR != 0 {
            return Err(CliError::Tape(tcst));
        }
        let state = self.bus.get_state();
        Ok(state.read_words(Self::BUFFER as u32, words as usize)?)
    }
}

fn dump(
    image: PathBuf,
    block: u32,
    reverse: bool,
    all: bool,
    format: Option<Format>,
    timing: TimingArgs,
) -> Result<(), CliError> {
    let config = Tc11Config {
        timing: Timing { line_time: timing.line_time, decel_time: timing.decel_time },
        stop_on_off_reel: timing.stop_on_off_reel,
        ..Tc11Config::default()
    };
    let mut tc = Tc11::new(config);
    // Locked so nothing is ever written back.
    tc.attach(0, &image, format, true)?;
    let geometry = tc.unit(0).geometry();
    if block >= geometry.blocks {
        let format = tc.unit(0).format();
        return Err(CliError::NoSuchBlock { block, format, blocks: geometry.blocks });
    }

    let tc = Arc::new(Mutex::new(tc));
    let mut bus = Bus::new();
    bus.set_shared_mmio_handler(tc.clone());
    let lines = (geometry.last_line() as u64) * 2;
    let max_ticks = config.timing.lines_to_ticks(lines) + 4 * config.timing.decel_time;
    let mut drv = Driver { bus, base: config.base, max_ticks };

    // Rewind, then approach the block from the right side.
    drv.search(Direction::Reverse, None)?;
    let dir = Direction::from_reverse(reverse);
    match dir {
        Direction::Forward => {
            if !drv.search(Direction::Forward, Some(block))? {
                return Err(CliError::Tape(drv.bus.read_word(drv.reg(TCST))?));
            }
        }
        Direction::Reverse => {
            drv.search(Direction::Forward, Some(block + 2))?;
            if !drv.search(Direction::Reverse, Some(block))? {
                return Err(CliError::Tape(drv.bus.read_word(drv.reg(TCST))?));
            }
        }
    }

    let (fnc, words) = if all {
        (Function::ReadAll, geometry.block_words + 2 * geometry.header_trailer_lines() / geometry.lines_per_word())
    } else {
        (Function::Read, geometry.block_words)
    };
    let data = drv.read(fnc, dir, words as u16)?;

    println!("block {block} ({} words, {fnc:?} {dir:?})", data.len());
    for (i, chunk) in data.chunks(8).enumerate() {
        let line: Vec<String> = chunk.iter().map(|w| format!("{w:06o}")).collect();
        println!("{:04o}: {}", i * 8, line.join(" "));
    }
    tc.lock().unwrap().power_down()?;
    Ok(())
}

fn info(path: PathBuf, format: Option<Format>) -> Result<(), CliError> {
    let image = TapeImage::load(&path, format)?;
    let geo = image.format().geometry();
    println!("{}: {} tape", path.display(), image.format());
    println!("  {} blocks of {} words", geo.blocks, geo.block_words);
    println!("  {} lines per block, {} lines end to end", geo.lines_per_block(), geo.last_line());
    println!("  {} bytes on disk", image.format().file_bytes());
    Ok(())
}

fn convert(input: PathBuf, output: PathBuf, to: Format, from: Option<Format>) -> Result<(), CliError> {
    let image = TapeImage::load(&input, from)?;
    let converted = image.convert(to);
    converted.save(&output)?;
    println!("{} ({}) -> {} ({to})", input.display(), image.format(), output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let res = match cli.command {
        Command::Info { image, format } => info(image, format),
        Command::Convert { input, output, to, from } => convert(input, output, to, from),
        Command::Dump { image, block, reverse, all, format, timing } => {
            dump(image, block, reverse, all, format, timing)
        }
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tc_cli: {e}");
            ExitCode::FAILURE
        }
    }
}
