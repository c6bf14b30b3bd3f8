extern crate clap;
use crossbeam_channel::{bounded, unbounded, Receiver}; // Inter-thread communication
use log::{debug, error, info, warn};

use std::convert::TryFrom;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::time::{Duration, Instant};

// Internal project modules
use hex_image::load_image;
use r1802_core::constants::{timing, trace::TRACE_DEPTH, MEMORY_SIZE};
use r1802_core::cpu::{Cpu, Halt};
use r1802_core::memory::mods::IoPeriph;
use r1802_core::memory::{IoController, MemoryMap};
use r1802_core::trace::{TraceMode, TraceRecorder, Tracer};
use r1802_peripherals::console::ConsolePeriph;
use r1802_peripherals::profile::Profile;
use r1802_peripherals::sound::{AudioPump, SoundPeriph};
use r1802_peripherals::storage::StoragePeriph;

type Trace = TraceRecorder<TRACE_DEPTH>;

// Pacing slices per overrun summary (one second)
const OVERRUN_REPORT_SLICES: u32 = 100;

/// Runtime settings gathered from the command line
struct Config {
    clock_mhz: u64,
    image: String,
    trace: Option<(String, TraceMode)>,
    pcm: Option<String>,
    symbols: Option<String>,
    storage: Option<String>,
}

/// Configures command-line interface using clap
fn get_cli_config<'a>() -> clap::ArgMatches<'a> {
    let description = "COSMAC 1802 emulator with a 32-channel tone generator";
    clap::App::new("r1802")
        .version("0.1")
        .about(description)
        .arg(
            clap::Arg::with_name("clock")
                .short("c")
                .takes_value(true)
                .value_name("MHz")
                .help("Clock frequency in MHz (default: 1000)"),
        )
        .arg(
            clap::Arg::with_name("trace")
                .long("trace")
                .takes_value(true)
                .value_name("FILE")
                .help("Record the last 10000 instructions and dump them on halt"),
        )
        .arg(
            clap::Arg::with_name("trace-stop")
                .long("trace-stop")
                .requires("trace")
                .help("Stop once the trace buffer is full instead of wrapping"),
        )
        .arg(
            clap::Arg::with_name("pcm")
                .long("pcm")
                .takes_value(true)
                .value_name("FILE")
                .help("Write audio as raw 48 kHz stereo s16le"),
        )
        .arg(
            clap::Arg::with_name("symbols")
                .long("symbols")
                .takes_value(true)
                .value_name("FILE")
                .help("Symbol file (ADDR LABEL) for the execution profile"),
        )
        .arg(
            clap::Arg::with_name("storage")
                .long("storage")
                .takes_value(true)
                .value_name("FILE")
                .help("Byte stream served on input port 2"),
        )
        .arg(
            clap::Arg::with_name("image")
                .required(true)
                .index(1)
                .value_name("HEX FILE")
                .help("Intel-HEX memory image"),
        )
        .get_matches()
}

impl Config {
    fn from_matches(matches: &clap::ArgMatches) -> Result<Config, String> {
        let clock_mhz = match matches.value_of("clock") {
            Some(v) => match v.parse::<u64>() {
                Ok(mhz) if mhz > 0 && slice_budget(mhz).is_some() => mhz,
                _ => return Err(format!("Invalid clock frequency: {}", v)),
            },
            None => timing::DEFAULT_CLOCK_MHZ,
        };

        let mode = if matches.is_present("trace-stop") {
            TraceMode::StopWhenFull
        } else {
            TraceMode::Wrap
        };
        let owned = |name: &str| matches.value_of(name).map(String::from);

        Ok(Config {
            clock_mhz,
            image: owned("image").unwrap_or_default(),
            trace: owned("trace").map(|path| (path, mode)),
            pcm: owned("pcm"),
            symbols: owned("symbols"),
            storage: owned("storage"),
        })
    }
}

/// Clocks per pacing slice, None if the budget plus one instruction's
/// overshoot does not fit the CPU's signed clock count
fn slice_budget(clock_mhz: u64) -> Option<i64> {
    clock_mhz
        .checked_mul(timing::SLICE_MICROS)
        .and_then(|clocks| i64::try_from(clocks).ok())
        .filter(|budget| budget.checked_add(timing::CYCLES_LONG as i64).is_some())
}

/// Keeps emulation in step with wall time, one slice at a time
struct Pacer {
    slice: Duration,
    deadline: Instant,
    now: Instant,
    late: u32,
    worst: f64,
    slices: u32,
}

impl Pacer {
    fn new() -> Self {
        let now = Instant::now();
        Pacer {
            slice: Duration::from_micros(timing::SLICE_MICROS),
            deadline: now,
            now,
            late: 0,
            worst: 0.0,
            slices: 0,
        }
    }

    fn overrun(&self, deadline: Instant) -> f64 {
        100.0 * (self.now - deadline).as_secs_f64() / self.slice.as_secs_f64()
    }

    /// Sleeps until the end of the current slice. Late slices do not sleep
    /// and the deadline keeps its lag, so following slices catch up.
    fn wait(&mut self) {
        self.deadline += self.slice;
        self.now = Instant::now();
        if self.deadline >= self.now {
            std::thread::sleep(self.deadline - self.now);
            self.deadline = Instant::now();
        } else {
            self.late += 1;
            self.worst = self.worst.max(self.overrun(self.deadline));
        }

        self.slices += 1;
        if self.slices == OVERRUN_REPORT_SLICES {
            if self.late > 0 {
                warn!(
                    "time exceeded: {:.0}% ({} of {} slices late)",
                    self.worst, self.late, self.slices
                );
            }
            self.slices = 0;
            self.late = 0;
            self.worst = 0.0;
        }
    }

    /// Reports the final slice if it missed its deadline
    fn finish(&self) {
        let deadline = self.deadline + self.slice;
        if deadline < self.now {
            warn!("time exceeded: {:.0}%", self.overrun(deadline));
        }
    }
}

enum Stop {
    Halted(Halt),
    Interrupted,
}

/// Pacing loop: runs one slice worth of clocks, carrying the overshoot into
/// the next budget, until the CPU halts or Ctrl-C arrives
fn emulate<T: Tracer>(
    cpu: &mut Cpu<'_, T>,
    budget: i64,
    signal: &Receiver<()>,
    mut profile: Option<&mut Profile>,
) -> Stop {
    let mut pacer = Pacer::new();
    let mut carry = 0;

    let stop = loop {
        if !signal.is_empty() {
            break Stop::Interrupted;
        }

        match cpu.run(budget - carry) {
            Ok(overshoot) => carry = overshoot,
            Err(halt) => break Stop::Halted(halt),
        }

        if let Some(profile) = profile.as_deref_mut() {
            profile.sample(cpu.pc());
        }
        pacer.wait();
    };

    pacer.finish();
    debug!("{} clocks executed", cpu.total_cycles);
    stop
}

fn open(path: &str) -> Result<File, i32> {
    File::open(path).map_err(|e| {
        error!("Cannot open {}: {}", path, e);
        1
    })
}

fn create(path: &str) -> Result<File, i32> {
    File::create(path).map_err(|e| {
        error!("Cannot create {}: {}", path, e);
        1
    })
}

fn dump_trace(trace: &Trace, file: File) -> io::Result<()> {
    let mut text = String::new();
    trace
        .dump(&mut text)
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "trace formatting failed"))?;
    let mut out = BufWriter::new(file);
    out.write_all(text.as_bytes())?;
    out.flush()
}

/// Sets up memory and devices, runs the machine and returns the exit code
fn run(cfg: &Config, signal: &Receiver<()>) -> Result<i32, i32> {
    let mut ram = Box::new([0u8; MEMORY_SIZE]);
    let summary = load_image(BufReader::new(open(&cfg.image)?), &mut ram[..]).map_err(|e| {
        error!("Cannot read {}: {}", cfg.image, e);
        1
    })?;
    info!(
        "Loaded {}: {} records, {} bytes",
        cfg.image, summary.records, summary.written
    );
    if summary.dropped > 0 {
        debug!("{} bytes beyond 0xFFFF dropped", summary.dropped);
    }

    let mut profile = match &cfg.symbols {
        Some(path) => Some(Profile::load(BufReader::new(open(path)?)).map_err(|e| {
            error!("Cannot read {}: {}", path, e);
            1
        })?),
        None => None,
    };

    let mut storage = match &cfg.storage {
        Some(path) => Some(StoragePeriph::new(BufReader::new(open(path)?))),
        None => None,
    };

    let mut trace = match &cfg.trace {
        Some((path, mode)) => Some((Box::new(Trace::new(*mode)), create(path)?)),
        None => None,
    };

    let pcm: Option<Box<dyn Write + Send>> = match &cfg.pcm {
        Some(path) => Some(Box::new(BufWriter::new(create(path)?))),
        None => None,
    };

    // Initialize hardware components
    let (psg_tx, psg_rx) = unbounded();
    let pump = AudioPump::spawn(psg_rx, pcm);
    let mut sound = SoundPeriph::new(psg_tx);
    let mut console = ConsolePeriph::stdout();

    let budget = slice_budget(cfg.clock_mhz).ok_or_else(|| {
        error!("Clock of {} MHz is out of range", cfg.clock_mhz);
        1
    })?;
    info!("Running at {} MHz", cfg.clock_mhz);
    let stop = {
        let mut bus = IoController::empty();
        let mut devices: Vec<&mut dyn IoPeriph> = Vec::new();
        devices.push(&mut console);
        devices.push(&mut sound);
        if let Some(dev) = storage.as_mut() {
            devices.push(dev);
        }
        for dev in devices {
            if let Err(e) = bus.attach(dev) {
                error!("{}", e);
                return Err(1);
            }
        }

        let memory_map = MemoryMap::new(&mut ram, bus);
        match trace.as_mut() {
            Some((recorder, _)) => {
                let mut cpu = Cpu::with_tracer(memory_map, &mut **recorder);
                emulate(&mut cpu, budget, signal, profile.as_mut())
            }
            None => {
                let mut cpu = Cpu::new(memory_map);
                emulate(&mut cpu, budget, signal, profile.as_mut())
            }
        }
    };

    // Closes the register queue so the audio thread drains and exits
    drop(sound);

    let mut code = match stop {
        Stop::Halted(halt @ Halt::Idle { .. }) => {
            info!("{}", halt);
            0
        }
        Stop::Halted(halt) => {
            error!("{}", halt);
            1
        }
        Stop::Interrupted => {
            info!("Interrupted");
            0
        }
    };

    if let Some((recorder, file)) = trace {
        match dump_trace(&recorder, file) {
            Ok(()) => info!("trace dumped ({} entries)", recorder.len()),
            Err(e) => {
                error!("Trace dump failed: {}", e);
                code = 1;
            }
        }
    }

    if let Some(profile) = &profile {
        let stdout = io::stdout();
        if let Err(e) = profile.report(&mut stdout.lock()) {
            error!("Profile report failed: {}", e);
        }
    }

    if let Err(e) = pump.join() {
        error!("Audio output failed: {}", e);
        code = 1;
    }
    Ok(code)
}

/// Main entry point for the 1802 emulator
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set up Ctrl-C handler with channel communication
    let (signal_sender, signal_receiver) = bounded(1);
    let handler_result = ctrlc::set_handler(move || {
        if signal_sender.is_full() {
            std::process::exit(-1); // Second Ctrl-C while the loop is stuck
        }
        let _send_result = signal_sender.send(());
    });

    if let Err(e) = handler_result {
        error!("Signal handler failed: {:?}", e);
        std::process::exit(1);
    }

    // Parse command-line arguments
    let cli_matches = get_cli_config();
    let cfg = match Config::from_matches(&cli_matches) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let code = match run(&cfg, &signal_receiver) {
        Ok(code) | Err(code) => code,
    };
    std::process::exit(code);
}
