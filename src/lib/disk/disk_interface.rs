use crate::ports::Variant;

// Register offsets within the disk window. The parameter registers
// start at PRM_0 and run for `Geometry::param_count` bytes; the data
// and status registers sit directly above them.
pub const ADDRESS_CMD: u8 = 0; // Command trigger (write-only).
pub const ADDRESS_PRM_0: u8 = 1; // Block number, least significant byte first.

// Allowed commands.
pub const COMMAND_SELECT: u8 = 0;
pub const COMMAND_SEEK: u8 = 1;

// Status register values.
pub const STATUS_OK: u8 = 0;
pub const STATUS_NOK: u8 = 1;

/// Bytes per block, both addressing variants.
pub const BLOCK_SIZE: u32 = 512;

/// Shape of the disk register file for one addressing variant.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    param_count: u8,
    block_size: u32,
}

impl Geometry {
    pub fn new(variant: Variant) -> Self {
        Geometry {
            param_count: variant.param_count(),
            block_size: BLOCK_SIZE,
        }
    }

    /// A geometry with a non-standard block size.
    pub fn with_block_size(variant: Variant, block_size: u32) -> Self {
        Geometry {
            param_count: variant.param_count(),
            block_size,
        }
    }

    pub fn param_count(&self) -> u8 {
        self.param_count
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Register offset of the data register.
    pub fn data_offset(&self) -> u8 {
        ADDRESS_PRM_0 + self.param_count
    }

    /// Register offset of the status register.
    pub fn status_offset(&self) -> u8 {
        self.data_offset() + 1
    }
}

/// The register-file interface of the disk peripheral, as seen by the
/// bus cycle dispatcher.
pub trait DiskController: Send {
    /// Handle a CPU write to a disk register.
    fn store(&mut self, offset: u8, value: u8);

    /// Handle a CPU read from a disk register. A data-register read
    /// consumes a byte from the stream, hence `&mut self`.
    fn load(&mut self, offset: u8) -> u8;
}
