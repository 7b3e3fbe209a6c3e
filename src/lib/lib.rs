pub mod bus;
pub mod disk;
pub mod dispatch;
pub mod memory;
pub mod ports;
pub mod timer;

pub use crate::dispatch::{CycleOutcome, Dispatcher, TraceHook};
pub use crate::memory::MEMORY_SIZE;
pub use crate::ports::Variant;

/// Initialise logging for tests.
#[cfg(test)]
pub fn init_test_logging() {
    use simplelog::{Config, LevelFilter, TestLogger};

    // The logger can only be initialised once, but we don't know the
    // order of tests, so ignore the result.
    let _ = TestLogger::init(LevelFilter::Trace, Config::default());
}
