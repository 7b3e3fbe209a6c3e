//! The port decoder: routes a sampled 16-bit address either to memory
//! or to a peripheral register. Everything outside the two peripheral
//! windows is plain memory.

// Peripheral window bases.
pub const DISK_BASE: u16 = 0xFE60;
pub const TIMER_BASE: u16 = 0xFE80;

/// Number of registers in the timer window (same in both variants).
pub const TIMER_REGISTERS: u16 = 6;

/// Disk register addressing variant. The two differ only in the
/// number of parameter registers, which shifts the data and status
/// registers up the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variant {
    /// Two-byte block numbers: up to 64K blocks.
    #[default]
    Legacy,
    /// Four-byte block numbers: up to 16M blocks and beyond.
    Extended,
}

impl Variant {
    /// Number of block-number parameter registers.
    pub fn param_count(self) -> u8 {
        match self {
            Variant::Legacy => 2,
            Variant::Extended => 4,
        }
    }

    /// Number of registers in the disk window: command, parameters,
    /// data, status.
    pub fn disk_registers(self) -> u16 {
        self.param_count() as u16 + 3
    }
}

/// Where a sampled address lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Memory,
    Disk(u8),
    Timer(u8),
}

/// The static address-to-peripheral routing table. Built once at
/// startup; `decode` runs every bus cycle and is nothing but two
/// range checks.
pub struct PortMap {
    disk_registers: u16,
}

impl PortMap {
    pub fn new(variant: Variant) -> Self {
        PortMap {
            disk_registers: variant.disk_registers(),
        }
    }

    /// Route an address to memory or a peripheral register offset.
    pub fn decode(&self, address: u16) -> Access {
        if (DISK_BASE..DISK_BASE + self.disk_registers).contains(&address) {
            Access::Disk((address - DISK_BASE) as u8)
        } else if (TIMER_BASE..TIMER_BASE + TIMER_REGISTERS).contains(&address) {
            Access::Timer((address - TIMER_BASE) as u8)
        } else {
            Access::Memory
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::disk;
    use crate::init_test_logging;
    use crate::timer;

    /// Sweep the full 16-bit space: every address resolves to exactly
    /// one region and the two windows never overlap.
    #[test]
    fn test_full_sweep_both_variants() {
        init_test_logging();

        for variant in [Variant::Legacy, Variant::Extended] {
            let map = PortMap::new(variant);
            for address in 0..=0xFFFFu16 {
                let access = map.decode(address);
                let in_disk = (DISK_BASE..DISK_BASE + variant.disk_registers())
                    .contains(&address);
                let in_timer =
                    (TIMER_BASE..TIMER_BASE + TIMER_REGISTERS).contains(&address);
                assert!(!(in_disk && in_timer));
                match access {
                    Access::Disk(offset) => {
                        assert!(in_disk);
                        assert_eq!(offset as u16, address - DISK_BASE);
                    }
                    Access::Timer(offset) => {
                        assert!(in_timer);
                        assert_eq!(offset as u16, address - TIMER_BASE);
                    }
                    Access::Memory => assert!(!in_disk && !in_timer),
                }
            }
        }
    }

    #[test]
    fn test_low_memory_is_memory() {
        init_test_logging();

        let map = PortMap::new(Variant::Extended);
        for address in 0..=0xFDFFu16 {
            assert_eq!(map.decode(address), Access::Memory);
        }
    }

    #[test]
    fn test_legacy_disk_offsets() {
        init_test_logging();

        let map = PortMap::new(Variant::Legacy);
        assert_eq!(map.decode(0xFE60), Access::Disk(disk::ADDRESS_CMD));
        assert_eq!(map.decode(0xFE61), Access::Disk(disk::ADDRESS_PRM_0));
        assert_eq!(map.decode(0xFE62), Access::Disk(disk::ADDRESS_PRM_0 + 1));
        assert_eq!(map.decode(0xFE63), Access::Disk(3));
        assert_eq!(map.decode(0xFE64), Access::Disk(4));
        // Just past the window: plain memory.
        assert_eq!(map.decode(0xFE65), Access::Memory);

        let geometry = disk::Geometry::new(Variant::Legacy);
        assert_eq!(geometry.data_offset(), 3);
        assert_eq!(geometry.status_offset(), 4);
    }

    #[test]
    fn test_extended_disk_offsets() {
        init_test_logging();

        let map = PortMap::new(Variant::Extended);
        assert_eq!(map.decode(0xFE60), Access::Disk(disk::ADDRESS_CMD));
        for i in 0..4u16 {
            assert_eq!(
                map.decode(0xFE61 + i),
                Access::Disk(disk::ADDRESS_PRM_0 + i as u8)
            );
        }
        assert_eq!(map.decode(0xFE65), Access::Disk(5));
        assert_eq!(map.decode(0xFE66), Access::Disk(6));
        assert_eq!(map.decode(0xFE67), Access::Memory);

        let geometry = disk::Geometry::new(Variant::Extended);
        assert_eq!(geometry.data_offset(), 5);
        assert_eq!(geometry.status_offset(), 6);
    }

    #[test]
    fn test_timer_offsets() {
        init_test_logging();

        let map = PortMap::new(Variant::Legacy);
        assert_eq!(map.decode(0xFE80), Access::Timer(timer::ADDRESS_TARGET));
        assert_eq!(map.decode(0xFE81), Access::Timer(timer::ADDRESS_COUNT));
        assert_eq!(map.decode(0xFE82), Access::Timer(timer::ADDRESS_RESET));
        assert_eq!(map.decode(0xFE83), Access::Timer(timer::ADDRESS_TRIG));
        assert_eq!(map.decode(0xFE84), Access::Timer(timer::ADDRESS_PAUSE));
        assert_eq!(map.decode(0xFE85), Access::Timer(timer::ADDRESS_CONT));
        assert_eq!(map.decode(0xFE86), Access::Memory);
    }
}
