use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::disk_interface::*;

/// The disk peripheral, backed by a single image file on the host.
///
/// The image is opened once at startup and the handle lives for the
/// process. A missing or unopenable image degrades the peripheral to
/// a permanent NOK status; it never takes the rest of the machine
/// down, so memory and timer emulation keep working with no disk
/// present.
pub struct ImageDiskController {
    image: Option<File>,
    image_len: u64,
    geometry: Geometry,
    params: [u8; 4],
    status: u8,
}

impl ImageDiskController {
    /// Open the backing image at the given path.
    pub fn open(path: impl AsRef<Path>, geometry: Geometry) -> Self {
        let path = path.as_ref();
        let (image, image_len) = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => match file.metadata() {
                Ok(meta) => {
                    info!(
                        "Disk image '{}' opened: {} bytes.",
                        path.display(),
                        meta.len()
                    );
                    (Some(file), meta.len())
                }
                Err(e) => {
                    warn!("Disk image '{}' is unreadable: {}.", path.display(), e);
                    (None, 0)
                }
            },
            Err(e) => {
                warn!("Disk image '{}' failed to open: {}.", path.display(), e);
                (None, 0)
            }
        };
        ImageDiskController {
            image,
            image_len,
            geometry,
            params: [0; 4],
            status: STATUS_NOK,
        }
    }

    /// A controller with no backing image: every operation reports
    /// NOK.
    pub fn detached(geometry: Geometry) -> Self {
        ImageDiskController {
            image: None,
            image_len: 0,
            geometry,
            params: [0; 4],
            status: STATUS_NOK,
        }
    }

    /// Whether the backing image opened successfully.
    pub fn is_attached(&self) -> bool {
        self.image.is_some()
    }

    fn handle_command(&mut self, command: u8) {
        match command {
            COMMAND_SELECT => {
                self.status = if self.image.is_some() {
                    STATUS_OK
                } else {
                    STATUS_NOK
                };
                debug!("disk: SELECT -> {}", self.status);
            }
            COMMAND_SEEK => self.seek(),
            // Unknown commands are ignored; the status register is
            // left alone.
            _ => {}
        }
    }

    fn seek(&mut self) {
        let Some(image) = self.image.as_mut() else {
            self.status = STATUS_NOK;
            return;
        };
        // The parameter registers hold the block number with the
        // lowest-addressed register as the least significant byte.
        let mut block: u64 = 0;
        for i in (0..self.geometry.param_count() as usize).rev() {
            block = (block << 8) | self.params[i] as u64;
        }
        let position = block * self.geometry.block_size() as u64;
        if position > self.image_len {
            self.status = STATUS_NOK;
            debug!("disk: SEEK to block {} rejected (past end).", block);
            return;
        }
        match image.seek(SeekFrom::Start(position)) {
            Ok(_) => {
                self.status = STATUS_OK;
                debug!("disk: SEEK to byte offset {}.", position);
            }
            Err(e) => {
                self.status = STATUS_NOK;
                debug!("disk: SEEK to byte offset {} failed: {}.", position, e);
            }
        }
    }

    fn data_read(&mut self) -> u8 {
        let Some(image) = self.image.as_mut() else {
            self.status = STATUS_NOK;
            return 0;
        };
        let mut byte = [0u8; 1];
        match image.read_exact(&mut byte) {
            Ok(()) => {
                self.status = STATUS_OK;
                byte[0]
            }
            Err(_) => {
                self.status = STATUS_NOK;
                0
            }
        }
    }

    fn data_write(&mut self, value: u8) {
        let Some(image) = self.image.as_mut() else {
            self.status = STATUS_NOK;
            return;
        };
        // The stream must never grow the image: a write at or past
        // the end is rejected, mirroring the seek bound.
        match image.stream_position() {
            Ok(position) if position < self.image_len => {}
            _ => {
                self.status = STATUS_NOK;
                return;
            }
        }
        match image.write_all(&[value]) {
            Ok(()) => self.status = STATUS_OK,
            Err(_) => self.status = STATUS_NOK,
        }
    }
}

impl DiskController for ImageDiskController {
    fn store(&mut self, offset: u8, value: u8) {
        if offset == ADDRESS_CMD {
            self.handle_command(value);
        } else if (ADDRESS_PRM_0..ADDRESS_PRM_0 + self.geometry.param_count())
            .contains(&offset)
        {
            self.params[(offset - ADDRESS_PRM_0) as usize] = value;
        } else if offset == self.geometry.data_offset() {
            self.data_write(value);
        }
        // The status register and unmapped offsets ignore writes.
    }

    fn load(&mut self, offset: u8) -> u8 {
        if offset == self.geometry.data_offset() {
            self.data_read()
        } else if offset == self.geometry.status_offset() {
            self.status
        } else {
            // Write-only and unmapped registers read as zero.
            0
        }
    }
}
