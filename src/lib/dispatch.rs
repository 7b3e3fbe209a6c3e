use log::trace;

use crate::bus::{
    AddressBus, ControlLines, CycleControl, DataBus, Direction, GpioPort,
};
use crate::disk::DiskController;
use crate::memory::Memory;
use crate::ports::{Access, PortMap, Variant};
use crate::timer::{self, Timer};

/// Observability hook invoked after every memory or peripheral
/// access. Installed at runtime; all methods default to no-ops.
pub trait TraceHook: Send {
    fn mem_read(&mut self, _address: u16, _data: u8, _sync: bool) {}
    fn mem_write(&mut self, _address: u16, _data: u8) {}
    fn io_read(&mut self, _address: u16, _data: u8) {}
    fn io_write(&mut self, _address: u16, _data: u8) {}
}

/// What a call to [`Dispatcher::bus_cycle`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Halted with no step pending: nothing was accessed.
    Held,
    /// A read cycle was served; the byte is on the data bus.
    Read(u8),
    /// A write cycle was absorbed.
    Write(u8),
}

/// The bus cycle dispatcher: samples the CPU's address and control
/// lines each cycle, routes the access through the port decoder, and
/// drives the data bus back on reads.
///
/// Everything here is synchronous and bounded; the real CPU stalls
/// the electrical bus waiting for the response, so no operation on
/// this path may block.
pub struct Dispatcher<P, D> {
    address_bus: AddressBus<P>,
    data_bus: DataBus<P>,
    controls: ControlLines<P>,
    ports: PortMap,
    memory: Memory,
    timer: Timer,
    disk: D,
    trace: Option<Box<dyn TraceHook>>,
    halted: bool,
    pending_steps: u32,
}

impl<P: GpioPort, D: DiskController> Dispatcher<P, D> {
    pub fn new(
        address_bus: AddressBus<P>,
        data_bus: DataBus<P>,
        controls: ControlLines<P>,
        variant: Variant,
        memory: Memory,
        timer: Timer,
        disk: D,
    ) -> Self {
        Dispatcher {
            address_bus,
            data_bus,
            controls,
            ports: PortMap::new(variant),
            memory,
            timer,
            disk,
            trace: None,
            halted: false,
            pending_steps: 0,
        }
    }

    /// Install a trace hook. Replaces any previous hook.
    pub fn set_trace(&mut self, hook: Box<dyn TraceHook>) {
        self.trace = Some(hook);
    }

    pub fn clear_trace(&mut self) {
        self.trace = None;
    }

    /// Hold the machine: bus cycles are reported but not served until
    /// `resume` or a pending `step`.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Resume free-running operation, discarding pending steps.
    pub fn resume(&mut self) {
        self.halted = false;
        self.pending_steps = 0;
    }

    /// Allow one bus cycle through while halted.
    pub fn step(&mut self) {
        self.pending_steps += 1;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub fn disk(&self) -> &D {
        &self.disk
    }

    pub fn disk_mut(&mut self) -> &mut D {
        &mut self.disk
    }

    /// Serve one bus cycle. Write cycles sample the data bus into the
    /// decoded target; read cycles fetch from the target and drive
    /// the byte back before the CPU's latch window.
    pub fn bus_cycle(&mut self) -> CycleOutcome {
        if self.halted {
            if self.pending_steps == 0 {
                return CycleOutcome::Held;
            }
            self.pending_steps -= 1;
        }

        let control = self.controls.sample();
        let address = self.address_bus.sample() as u16;
        if control.write {
            // Make sure we are off the data lines before sampling.
            self.data_bus.set_direction(Direction::Sample);
            let data = self.data_bus.sample() as u8;
            self.write(address, data);
            CycleOutcome::Write(data)
        } else {
            let data = self.read(address, control);
            self.data_bus.set_direction(Direction::Drive);
            self.data_bus.drive(data as u32);
            CycleOutcome::Read(data)
        }
    }

    fn read(&mut self, address: u16, control: CycleControl) -> u8 {
        match self.ports.decode(address) {
            Access::Memory => {
                let data = self.memory[address as usize];
                if let Some(hook) = self.trace.as_mut() {
                    hook.mem_read(address, data, control.sync);
                }
                data
            }
            Access::Disk(offset) => {
                let data = self.disk.load(offset);
                trace!("ior {:04X} : {:02X}", address, data);
                if let Some(hook) = self.trace.as_mut() {
                    hook.io_read(address, data);
                }
                data
            }
            Access::Timer(offset) => {
                let data = match offset {
                    timer::ADDRESS_COUNT => self.timer.read_count(),
                    // Write-only registers read as zero.
                    _ => 0,
                };
                trace!("ior {:04X} : {:02X}", address, data);
                if let Some(hook) = self.trace.as_mut() {
                    hook.io_read(address, data);
                }
                data
            }
        }
    }

    fn write(&mut self, address: u16, data: u8) {
        match self.ports.decode(address) {
            Access::Memory => {
                self.memory[address as usize] = data;
                if let Some(hook) = self.trace.as_mut() {
                    hook.mem_write(address, data);
                }
            }
            Access::Disk(offset) => {
                trace!("iow {:04X} : {:02X}", address, data);
                self.disk.store(offset, data);
                if let Some(hook) = self.trace.as_mut() {
                    hook.io_write(address, data);
                }
            }
            Access::Timer(offset) => {
                trace!("iow {:04X} : {:02X}", address, data);
                match offset {
                    timer::ADDRESS_TARGET => self.timer.write_target(data),
                    timer::ADDRESS_RESET => self.timer.reset(),
                    timer::ADDRESS_TRIG => self.timer.trigger(),
                    timer::ADDRESS_PAUSE => self.timer.pause(),
                    timer::ADDRESS_CONT => self.timer.resume(),
                    // COUNT is read-only; other offsets are unmapped.
                    _ => {}
                }
                if let Some(hook) = self.trace.as_mut() {
                    hook.io_write(address, data);
                }
            }
        }
    }
}
