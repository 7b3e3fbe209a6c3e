use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

// Register offsets within the timer window.
pub const ADDRESS_TARGET: u8 = 0;
pub const ADDRESS_COUNT: u8 = 1;
pub const ADDRESS_RESET: u8 = 2;
pub const ADDRESS_TRIG: u8 = 3;
pub const ADDRESS_PAUSE: u8 = 4;
pub const ADDRESS_CONT: u8 = 5;

/// The CPU-visible interrupt line. Level-sensitive: asserted exactly
/// while the timer is triggered, released on acknowledgement. Clones
/// share the same line.
#[derive(Clone, Default)]
pub struct IrqLine(Arc<AtomicBool>);

impl IrqLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_asserted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn assert_line(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    Running,
    Triggered,
    Paused,
}

/// State shared between the bus-cycle domain (register accesses) and
/// the tick domain. The mutex makes every multi-field update atomic
/// with respect to the tick callback.
struct TimerShared {
    ticks: i16,
    target: u8,
    mode: TimerMode,
}

/// Commands that can be sent to the tick thread.
enum TickerCommand {
    JoinThread,
}

/// The interrupt timer peripheral: a counter that fires the IRQ line
/// each time it reaches its programmed target.
pub struct Timer {
    shared: Arc<Mutex<TimerShared>>,
    irq: IrqLine,
    command_tx: Option<Sender<TickerCommand>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl Timer {
    /// Construct a paused timer with a full-scale target and the IRQ
    /// line released.
    pub fn new(irq: IrqLine) -> Self {
        irq.release();
        Timer {
            shared: Arc::new(Mutex::new(TimerShared {
                ticks: 0,
                target: u8::MAX,
                mode: TimerMode::Paused,
            })),
            irq,
            command_tx: None,
            thread_handle: None,
        }
    }

    /// Start the periodic tick thread. Panics if already running.
    pub fn start(&mut self, period: Duration) {
        if self.thread_handle.is_some() {
            panic!("Timer was already running.");
        }
        info!("Timer starting with period {:?}.", period);

        let (command_tx, command_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let irq = self.irq.clone();
        let thread_handle = thread::spawn(move || loop {
            match command_rx.recv_timeout(period) {
                Ok(TickerCommand::JoinThread) => return,
                Err(RecvTimeoutError::Timeout) => tick_shared(&shared, &irq),
                Err(RecvTimeoutError::Disconnected) => panic!(),
            }
        });
        self.command_tx = Some(command_tx);
        self.thread_handle = Some(thread_handle);
    }

    /// Stop the tick thread. Panics if not running.
    pub fn stop(&mut self) {
        let command_tx = self
            .command_tx
            .take()
            .expect("Timer was already stopped.");
        command_tx.send(TickerCommand::JoinThread).unwrap();
        self.thread_handle
            .take()
            .unwrap()
            .join()
            .expect("Timer thread terminated with error.");
        info!("Timer stopping.");
    }

    /// Advance the timer by one tick quantum. The tick thread calls
    /// this on its own cadence; tests call it directly.
    pub fn tick(&mut self) {
        tick_shared(&self.shared, &self.irq);
    }

    /// Set a new period and arm the timer.
    pub fn write_target(&mut self, value: u8) {
        let mut shared = self.shared.lock().unwrap();
        shared.target = value;
        shared.ticks = 0;
        shared.mode = TimerMode::Running;
        self.irq.release();
        debug!("Timer armed with target {}.", value);
    }

    /// Restart the current period without changing the target.
    pub fn reset(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        shared.ticks = 0;
        shared.mode = TimerMode::Running;
        self.irq.release();
    }

    /// Force an immediate trigger.
    pub fn trigger(&mut self) {
        let mut shared = self.shared.lock().unwrap();
        shared.ticks = 0;
        shared.mode = TimerMode::Triggered;
        self.irq.assert_line();
    }

    /// Freeze the tick count. The IRQ line is left as it is.
    pub fn pause(&mut self) {
        self.shared.lock().unwrap().mode = TimerMode::Paused;
    }

    /// Resume after a pause; also acknowledges a trigger.
    pub fn resume(&mut self) {
        self.shared.lock().unwrap().mode = TimerMode::Running;
        self.irq.release();
    }

    /// Current tick count, truncated to the 8-bit register.
    pub fn read_count(&self) -> u8 {
        self.shared.lock().unwrap().ticks as u8
    }

    pub fn mode(&self) -> TimerMode {
        self.shared.lock().unwrap().mode
    }

    /// A shared handle to the interrupt line.
    pub fn irq(&self) -> IrqLine {
        self.irq.clone()
    }
}

fn tick_shared(shared: &Mutex<TimerShared>, irq: &IrqLine) {
    let mut shared = shared.lock().unwrap();
    if shared.mode != TimerMode::Paused {
        shared.ticks += 1;
    }
    // Wrap-subtract rather than reset: leftover ticks carry into the
    // next period, so the interrupt rate stays accurate when the tick
    // cadence and target are not exact multiples. The comparison is
    // not gated on pause, matching the hardware.
    if shared.ticks >= shared.target as i16 {
        // A zero target fires every tick; the subtraction cannot
        // shrink the count then, so clear it instead.
        if shared.target == 0 {
            shared.ticks = 0;
        } else {
            shared.ticks -= shared.target as i16;
        }
        shared.mode = TimerMode::Triggered;
        irq.assert_line();
    }
}
