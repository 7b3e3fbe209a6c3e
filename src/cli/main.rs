use clap::{Parser, ValueEnum};
use simplelog::{ConfigBuilder, LevelFilter, LevelPadding, WriteLogger};
use std::fs::{self, File};

use bus65::bus::{
    Bus, ControlLines, Direction, LoopbackPort, PinMap, BOARD_ADDR_PINS,
    BOARD_DATA_PINS, DEFAULT_CONTROL_PINS,
};
use bus65::disk::{self, Geometry, ImageDiskController};
use bus65::dispatch::{CycleOutcome, Dispatcher};
use bus65::memory::{Memory, MEMORY_SIZE};
use bus65::ports::{Variant, DISK_BASE, TIMER_BASE};
use bus65::timer::{IrqLine, Timer};

/// Possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    /// Two-byte block numbers.
    Legacy,
    /// Four-byte block numbers.
    Extended,
}

impl From<VariantArg> for Variant {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Legacy => Variant::Legacy,
            VariantArg::Extended => Variant::Extended,
        }
    }
}

/// Bring-up diagnostics for the bus controller. Assembles the whole
/// dispatch stack on loop-back GPIO ports and plays the CPU side of
/// the bus against it: bus transceiver sweeps, memory cycles, timer
/// register checks, and disk block access against the given image.
#[derive(Parser)]
#[command(version, about, max_term_width = 100)]
struct Args {
    /// The path to the disk image file.
    #[arg(long, default_value = "filesys.img")]
    disk_image: String,

    /// Optional memory image, loaded at address 0 before the checks.
    #[arg(long)]
    memory_image: Option<String>,

    /// Disk register addressing variant.
    #[arg(long, value_enum, default_value_t = VariantArg::Legacy)]
    variant: VariantArg,

    /// If set, a debug log will be written to the given path.
    #[arg(short, long)]
    log: Option<String>,

    /// Set the log level. Has no effect without --log.
    #[arg(short = 'L', long, value_enum, default_value_t = LogLevel::Trace)]
    log_level: LogLevel,
}

/// Initialise logging to the given file.
fn init_logging(logfile: File, level: LevelFilter) {
    let config = ConfigBuilder::new()
        .set_level_padding(LevelPadding::Right)
        .set_location_level(LevelFilter::Off)
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_format_custom(time::macros::format_description!(
            "[hour]:[minute]:[second].[subsecond digits:6]"
        ))
        .build();

    WriteLogger::init(level, config, logfile).unwrap();
}

/// The assembled board plus handles to the CPU side of its ports.
struct Board {
    address_port: LoopbackPort,
    data_port: LoopbackPort,
    control_port: LoopbackPort,
    dispatcher: Dispatcher<LoopbackPort, ImageDiskController>,
}

impl Board {
    fn new(variant: Variant, memory: Memory, disk: ImageDiskController) -> Self {
        let address_port = LoopbackPort::new();
        let data_port = LoopbackPort::new();
        let control_port = LoopbackPort::new();
        let dispatcher = Dispatcher::new(
            Bus::new(address_port.clone(), BOARD_ADDR_PINS),
            Bus::new(data_port.clone(), BOARD_DATA_PINS),
            ControlLines::new(control_port.clone(), DEFAULT_CONTROL_PINS),
            variant,
            memory,
            Timer::new(IrqLine::new()),
            disk,
        );
        Board {
            address_port,
            data_port,
            control_port,
            dispatcher,
        }
    }

    fn cpu_write(&mut self, address: u16, data: u8) {
        self.control_port.set_lines(1 << DEFAULT_CONTROL_PINS.rw, 0);
        self.address_port
            .set_lines(BOARD_ADDR_PINS.mask(), BOARD_ADDR_PINS.pack(address as u32));
        self.data_port
            .set_lines(BOARD_DATA_PINS.mask(), BOARD_DATA_PINS.pack(data as u32));
        self.dispatcher.bus_cycle();
    }

    fn cpu_read(&mut self, address: u16) -> Result<u8, String> {
        self.control_port
            .set_lines(1 << DEFAULT_CONTROL_PINS.rw, 1 << DEFAULT_CONTROL_PINS.rw);
        self.address_port
            .set_lines(BOARD_ADDR_PINS.mask(), BOARD_ADDR_PINS.pack(address as u32));
        match self.dispatcher.bus_cycle() {
            CycleOutcome::Read(data) => {
                // Cross-check against what the CPU would latch off
                // the lines.
                let latched = BOARD_DATA_PINS.unpack(self.data_port.lines()) as u8;
                if latched != data {
                    return Err(format!(
                        "data bus drove {:02X} but the lines read {:02X}",
                        data, latched
                    ));
                }
                Ok(data)
            }
            outcome => Err(format!("read cycle produced {:?}", outcome)),
        }
    }
}

/// Round-trip every value through a pin map on a loop-back port.
fn check_pin_map<const N: usize>(pins: PinMap<N>, values: u32) -> Result<(), String> {
    let port = LoopbackPort::new();
    let mut bus: Bus<_, N> = Bus::new(port.clone(), pins);
    bus.set_direction(Direction::Drive);
    for v in 0..values {
        bus.drive(v);
        let back = pins.unpack(port.lines());
        if back != v {
            return Err(format!("drove {:#X}, sampled back {:#X}", v, back));
        }
    }
    Ok(())
}

fn check_transceiver() -> Result<(), String> {
    check_pin_map(BOARD_DATA_PINS, 0x100)
        .map_err(|e| format!("data bus loop-back: {}", e))?;
    check_pin_map(BOARD_ADDR_PINS, 0x10000)
        .map_err(|e| format!("address bus loop-back: {}", e))?;
    println!("ok: bus transceiver loop-back");
    Ok(())
}

fn check_memory(board: &mut Board) -> Result<(), String> {
    for (address, data) in [(0x0000u16, 0x55u8), (0x8000, 0xAA), (0xFDFF, 0x01)] {
        board.cpu_write(address, data);
        let back = board.cpu_read(address)?;
        if back != data {
            return Err(format!(
                "memory at {:04X}: wrote {:02X}, read {:02X}",
                address, data, back
            ));
        }
    }
    println!("ok: memory cycles");
    Ok(())
}

fn check_timer(board: &mut Board) -> Result<(), String> {
    board.cpu_write(TIMER_BASE, 10);
    for _ in 0..7 {
        board.dispatcher.timer_mut().tick();
    }
    let count = board.cpu_read(TIMER_BASE + 1)?;
    if count != 7 {
        return Err(format!("timer count read {} after 7 ticks", count));
    }
    // Force a trigger, check the IRQ line, then acknowledge.
    board.cpu_write(TIMER_BASE + 3, 0);
    if !board.dispatcher.timer().irq().is_asserted() {
        return Err("IRQ line not asserted after TRIG".to_string());
    }
    board.cpu_write(TIMER_BASE + 5, 0);
    if board.dispatcher.timer().irq().is_asserted() {
        return Err("IRQ line still asserted after CONT".to_string());
    }
    println!("ok: timer registers and IRQ line");
    Ok(())
}

fn check_disk(board: &mut Board, image: &[u8], variant: Variant) -> Result<(), String> {
    let geometry = Geometry::new(variant);
    let data = DISK_BASE + geometry.data_offset() as u16;
    let status = DISK_BASE + geometry.status_offset() as u16;

    board.cpu_write(DISK_BASE, disk::COMMAND_SELECT);
    if board.cpu_read(status)? != disk::STATUS_OK {
        return Err("disk SELECT reported NOK".to_string());
    }

    // Seek to block 0 and stream out the first bytes.
    for i in 0..geometry.param_count() {
        board.cpu_write(DISK_BASE + 1 + i as u16, 0);
    }
    board.cpu_write(DISK_BASE, disk::COMMAND_SEEK);
    if board.cpu_read(status)? != disk::STATUS_OK {
        return Err("disk SEEK to block 0 reported NOK".to_string());
    }
    let span = image.len().min(16);
    for (i, &expected) in image[..span].iter().enumerate() {
        let byte = board.cpu_read(data)?;
        if byte != expected {
            return Err(format!(
                "disk byte {}: image has {:02X}, stream returned {:02X}",
                i, expected, byte
            ));
        }
    }
    println!("ok: disk SELECT/SEEK/stream ({} bytes compared)", span);
    Ok(())
}

/// Main run function; returns an exit code.
fn run(args: Args) -> u8 {
    return match _run(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    fn _run(args: Args) -> Result<(), String> {
        // Initialise logging if configured.
        if let Some(log_path) = &args.log {
            match File::create(log_path) {
                Ok(logfile) => {
                    let level = match args.log_level {
                        LogLevel::Trace => LevelFilter::Trace,
                        LogLevel::Debug => LevelFilter::Debug,
                        LogLevel::Info => LevelFilter::Info,
                    };
                    init_logging(logfile, level);
                }
                Err(e) => return Err(format!("Failed to create log file: {}", e)),
            }
        }

        let variant = Variant::from(args.variant);

        // Load the memory image, if given.
        let mut memory = Memory::new();
        if let Some(path) = &args.memory_image {
            let image = fs::read(path)
                .map_err(|e| format!("Failed to read memory image: {}", e))?;
            if image.len() > MEMORY_SIZE {
                return Err(format!(
                    "Memory images must be at most {} bytes in size.",
                    MEMORY_SIZE
                ));
            }
            memory.load_image(0, &image);
        }

        // The disk image is allowed to be missing; the peripheral
        // degrades to NOK and the disk check is skipped.
        let image_contents = fs::read(&args.disk_image).ok();
        let disk_controller =
            ImageDiskController::open(&args.disk_image, Geometry::new(variant));

        let mut board = Board::new(variant, memory, disk_controller);

        check_transceiver()?;
        check_memory(&mut board)?;
        check_timer(&mut board)?;
        match image_contents {
            Some(image) => check_disk(&mut board, &image, variant)?,
            None => println!(
                "skipped: disk checks ('{}' not present; peripheral reports NOK)",
                args.disk_image
            ),
        }

        println!("All checks passed.");
        Ok(())
    }
}

fn main() {
    let args = Args::parse();
    std::process::exit(run(args).into());
}
