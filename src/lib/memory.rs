use std::ops::{Index, IndexMut};

/// Size of the emulated address space.
pub const MEMORY_SIZE: usize = 0x1_0000;

/// The 64 KiB memory image backing every bus access the port decoder
/// does not claim for a peripheral. Eagerly allocated; the whole
/// space is writable, initially zero.
pub struct Memory {
    data: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            data: vec![0; MEMORY_SIZE],
        }
    }

    /// Copy an image into memory starting at the given address.
    /// Panics if it does not fit; callers validate sizes at startup.
    pub fn load_image(&mut self, offset: u16, image: &[u8]) {
        let start = offset as usize;
        assert!(
            start + image.len() <= MEMORY_SIZE,
            "Memory image does not fit."
        );
        self.data[start..start + image.len()].copy_from_slice(image);
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Index<usize> for Memory {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        self.data.index(index)
    }
}

impl IndexMut<usize> for Memory {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        self.data.index_mut(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::init_test_logging;

    #[test]
    fn test_zero_initialised() {
        init_test_logging();

        let memory = Memory::new();
        assert_eq!(memory[0], 0);
        assert_eq!(memory[MEMORY_SIZE / 2], 0);
        assert_eq!(memory[MEMORY_SIZE - 1], 0);
    }

    #[test]
    fn test_load_image() {
        init_test_logging();

        let mut memory = Memory::new();
        memory.load_image(0x0200, &[0xA9, 0x42, 0x8D]);
        assert_eq!(memory[0x01FF], 0);
        assert_eq!(memory[0x0200], 0xA9);
        assert_eq!(memory[0x0201], 0x42);
        assert_eq!(memory[0x0202], 0x8D);
        assert_eq!(memory[0x0203], 0);
    }

    #[test]
    fn test_load_image_at_top() {
        init_test_logging();

        let mut memory = Memory::new();
        // Reset vector right at the top of the address space.
        memory.load_image(0xFFFC, &[0x00, 0x02, 0x00, 0x02]);
        assert_eq!(memory[0xFFFF], 0x02);
    }
}
