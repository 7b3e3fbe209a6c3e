use super::disk_interface::*;

/// A scriptable disk controller used when testing the dispatcher.
/// Records every register access and answers loads with a fixed byte.
pub struct MockDiskController {
    pub stores: Vec<(u8, u8)>,
    pub loads: Vec<u8>,
    pub response: u8,
}

impl MockDiskController {
    pub fn new(response: u8) -> Self {
        MockDiskController {
            stores: Vec::new(),
            loads: Vec::new(),
            response,
        }
    }
}

impl DiskController for MockDiskController {
    fn store(&mut self, offset: u8, value: u8) {
        self.stores.push((offset, value));
    }

    fn load(&mut self, offset: u8) -> u8 {
        self.loads.push(offset);
        self.response
    }
}
