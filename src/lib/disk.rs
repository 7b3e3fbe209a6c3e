mod disk_image;
mod disk_interface;

pub use disk_image::ImageDiskController;
pub use disk_interface::*;

// Mock implementation for testing other components.
#[cfg(test)]
mod disk_mock;
#[cfg(test)]
pub use disk_mock::MockDiskController;
