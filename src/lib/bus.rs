use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Electrical direction of a bus, as seen from the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The CPU drives the lines; the controller samples them.
    Sample,
    /// The controller drives the lines; the CPU samples them.
    Drive,
}

/// A fixed mapping from logical bit index to physical line position
/// within a 32-bit GPIO port word. The board routes neither bus to a
/// contiguous run of lines, so every bus access goes through this
/// table in both directions.
#[derive(Debug, Clone, Copy)]
pub struct PinMap<const N: usize> {
    lines: [u8; N],
}

impl<const N: usize> PinMap<N> {
    pub const fn new(lines: [u8; N]) -> Self {
        PinMap { lines }
    }

    /// Combined mask of all physical lines in this map.
    pub const fn mask(&self) -> u32 {
        let mut m = 0;
        let mut i = 0;
        while i < N {
            m |= 1 << self.lines[i];
            i += 1;
        }
        m
    }

    /// Scatter a logical value onto its physical line positions.
    pub fn pack(&self, value: u32) -> u32 {
        let mut word = 0;
        for (bit, &line) in self.lines.iter().enumerate() {
            if value & (1 << bit) != 0 {
                word |= 1 << line;
            }
        }
        word
    }

    /// Gather the physical line states back into a logical value.
    pub fn unpack(&self, word: u32) -> u32 {
        let mut value = 0;
        for (bit, &line) in self.lines.iter().enumerate() {
            if word & (1 << line) != 0 {
                value |= 1 << bit;
            }
        }
        value
    }
}

/// Data lines D0-D7 as wired on the reference board.
pub const BOARD_DATA_PINS: PinMap<8> = PinMap::new([11, 12, 16, 17, 18, 19, 28, 29]);

/// Address lines A0-A15 as wired on the reference board.
pub const BOARD_ADDR_PINS: PinMap<16> = PinMap::new([
    16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31,
]);

/// The hardware seam: one 32-bit GPIO port with per-line direction
/// control. The real implementation is raw register access on the
/// microcontroller; hosted code and tests use [`LoopbackPort`].
pub trait GpioPort: Send {
    /// Sample the current state of all lines.
    fn read(&self) -> u32;

    /// Drive the masked lines to the given states, leaving the rest
    /// untouched.
    fn write(&mut self, mask: u32, bits: u32);

    /// Switch the masked lines between input (sample) and output
    /// (drive).
    fn set_output(&mut self, mask: u32, output: bool);
}

/// An in-memory [`GpioPort`] whose driven lines read back as written.
/// Cloned handles share the same lines, so a test (or the self-test
/// binary) can stand in for the CPU side of the bus.
#[derive(Clone, Default)]
pub struct LoopbackPort {
    pins: Arc<AtomicU32>,
    dir: Arc<AtomicU32>,
    dir_writes: Arc<AtomicU32>,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set line states from outside the controller, standing in for
    /// the CPU driving the bus.
    pub fn set_lines(&self, mask: u32, bits: u32) {
        self.pins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |w| {
                Some((w & !mask) | (bits & mask))
            })
            .unwrap();
    }

    /// Current state of all lines.
    pub fn lines(&self) -> u32 {
        self.pins.load(Ordering::SeqCst)
    }

    /// Which lines are currently configured as outputs.
    pub fn output_mask(&self) -> u32 {
        self.dir.load(Ordering::SeqCst)
    }

    /// How many times the direction register has been written.
    pub fn direction_writes(&self) -> u32 {
        self.dir_writes.load(Ordering::SeqCst)
    }
}

impl GpioPort for LoopbackPort {
    fn read(&self) -> u32 {
        self.pins.load(Ordering::SeqCst)
    }

    fn write(&mut self, mask: u32, bits: u32) {
        self.set_lines(mask, bits);
    }

    fn set_output(&mut self, mask: u32, output: bool) {
        self.dir
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| {
                Some(if output { d | mask } else { d & !mask })
            })
            .unwrap();
        self.dir_writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// One logical bus (data or address) on top of a GPIO port and a pin
/// map. Tracks the current direction and only touches the direction
/// register on an actual change, since switching has a hardware
/// settle cost.
pub struct Bus<P, const N: usize> {
    port: P,
    pins: PinMap<N>,
    direction: Direction,
}

pub type DataBus<P> = Bus<P, 8>;
pub type AddressBus<P> = Bus<P, 16>;

impl<P: GpioPort, const N: usize> Bus<P, N> {
    /// Construct a bus in sample mode, so the controller never fights
    /// the CPU for the lines at power-on.
    pub fn new(mut port: P, pins: PinMap<N>) -> Self {
        port.set_output(pins.mask(), false);
        Bus {
            port,
            pins,
            direction: Direction::Sample,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Reconfigure the lines. A no-op if the direction is unchanged.
    pub fn set_direction(&mut self, direction: Direction) {
        if self.direction == direction {
            return;
        }
        self.port
            .set_output(self.pins.mask(), direction == Direction::Drive);
        self.direction = direction;
    }

    /// Sample the lines. Only meaningful in sample mode.
    pub fn sample(&self) -> u32 {
        debug_assert_eq!(self.direction, Direction::Sample);
        self.pins.unpack(self.port.read())
    }

    /// Drive a value onto the lines; it is held until overwritten.
    /// Only meaningful in drive mode.
    pub fn drive(&mut self, value: u32) {
        debug_assert_eq!(self.direction, Direction::Drive);
        self.port.write(self.pins.mask(), self.pins.pack(value));
    }
}

/// Positions of the CPU control lines on the control port.
#[derive(Debug, Clone, Copy)]
pub struct ControlPins {
    pub rw: u8,
    pub sync: u8,
}

/// Default control-line positions for hosted use. Unlike the data and
/// address maps these do not mirror the board, where R/W and sync
/// arrive on a separate port; embedders pass their own positions.
pub const DEFAULT_CONTROL_PINS: ControlPins = ControlPins { rw: 4, sync: 6 };

/// Sampled control-line state for one bus cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleControl {
    /// True when the CPU is writing (R/W low on the real part).
    pub write: bool,
    /// True on an opcode-fetch cycle.
    pub sync: bool,
}

/// Sampler for the R/W and sync lines. These are inputs for the whole
/// process lifetime; there is no direction switching to manage.
pub struct ControlLines<P> {
    port: P,
    pins: ControlPins,
}

impl<P: GpioPort> ControlLines<P> {
    pub fn new(port: P, pins: ControlPins) -> Self {
        ControlLines { port, pins }
    }

    pub fn sample(&self) -> CycleControl {
        let word = self.port.read();
        CycleControl {
            // R/W idles high; the CPU pulls it low to write.
            write: word & (1 << self.pins.rw) == 0,
            sync: word & (1 << self.pins.sync) != 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::init_test_logging;

    #[test]
    fn test_pin_map_mask_width() {
        init_test_logging();

        let mask = BOARD_DATA_PINS.mask();
        assert_eq!(mask.count_ones(), 8);
        assert_eq!(BOARD_ADDR_PINS.mask().count_ones(), 16);
    }

    #[test]
    fn test_data_round_trip_all_values() {
        init_test_logging();

        let port = LoopbackPort::new();
        let mut bus: DataBus<_> = Bus::new(port.clone(), BOARD_DATA_PINS);
        bus.set_direction(Direction::Drive);
        for v in 0..=255u32 {
            bus.drive(v);
            // The CPU side sees the packed word; gathering it back
            // must be bit-exact.
            assert_eq!(BOARD_DATA_PINS.unpack(port.lines()), v);
        }
    }

    #[test]
    fn test_data_sample_all_values() {
        init_test_logging();

        let port = LoopbackPort::new();
        let bus: DataBus<_> = Bus::new(port.clone(), BOARD_DATA_PINS);
        for v in 0..=255u32 {
            port.set_lines(BOARD_DATA_PINS.mask(), BOARD_DATA_PINS.pack(v));
            assert_eq!(bus.sample(), v);
        }
    }

    #[test]
    fn test_address_round_trip_all_values() {
        init_test_logging();

        let port = LoopbackPort::new();
        let bus: AddressBus<_> = Bus::new(port.clone(), BOARD_ADDR_PINS);
        for addr in 0..=0xFFFFu32 {
            port.set_lines(BOARD_ADDR_PINS.mask(), BOARD_ADDR_PINS.pack(addr));
            assert_eq!(bus.sample(), addr);
        }
    }

    #[test]
    fn test_drive_does_not_disturb_other_lines() {
        init_test_logging();

        let port = LoopbackPort::new();
        // Light up every line outside the data bus mask.
        port.set_lines(!BOARD_DATA_PINS.mask(), !0);
        let mut bus: DataBus<_> = Bus::new(port.clone(), BOARD_DATA_PINS);
        bus.set_direction(Direction::Drive);
        bus.drive(0xA5);
        assert_eq!(port.lines() & !BOARD_DATA_PINS.mask(), !BOARD_DATA_PINS.mask());
        assert_eq!(BOARD_DATA_PINS.unpack(port.lines()), 0xA5);
    }

    #[test]
    fn test_direction_register_touched_only_on_change() {
        init_test_logging();

        let port = LoopbackPort::new();
        let mut bus: DataBus<_> = Bus::new(port.clone(), BOARD_DATA_PINS);
        let after_init = port.direction_writes();

        // Re-asserting the current direction must not hit the register.
        bus.set_direction(Direction::Sample);
        bus.set_direction(Direction::Sample);
        assert_eq!(port.direction_writes(), after_init);

        bus.set_direction(Direction::Drive);
        assert_eq!(port.direction_writes(), after_init + 1);
        assert_eq!(port.output_mask(), BOARD_DATA_PINS.mask());

        bus.set_direction(Direction::Drive);
        assert_eq!(port.direction_writes(), after_init + 1);

        bus.set_direction(Direction::Sample);
        assert_eq!(port.direction_writes(), after_init + 2);
        assert_eq!(port.output_mask(), 0);
    }

    #[test]
    fn test_control_line_sampling() {
        init_test_logging();

        let port = LoopbackPort::new();
        let controls = ControlLines::new(port.clone(), DEFAULT_CONTROL_PINS);

        // R/W high, sync low: a plain read cycle.
        port.set_lines(!0, 1 << DEFAULT_CONTROL_PINS.rw);
        assert_eq!(
            controls.sample(),
            CycleControl {
                write: false,
                sync: false
            }
        );

        // R/W high, sync high: an opcode fetch.
        port.set_lines(
            !0,
            (1 << DEFAULT_CONTROL_PINS.rw) | (1 << DEFAULT_CONTROL_PINS.sync),
        );
        assert_eq!(
            controls.sample(),
            CycleControl {
                write: false,
                sync: true
            }
        );

        // R/W low: a write cycle.
        port.set_lines(!0, 0);
        assert_eq!(
            controls.sample(),
            CycleControl {
                write: true,
                sync: false
            }
        );
    }
}
