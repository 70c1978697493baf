//! NOR flash device model.
//!
//! The buffer engine reaches storage through the [`NorFlash`] capability
//! trait, so a hardware driver can stand in for the simulator. The model
//! is a fixed array of equal-size sectors addressed by absolute byte
//! address: `addr = sector * sector_size + offset`.
//!
//! Physical write rules:
//!
//! - erasing a sector returns every byte in it to 0xFF
//! - programming can only clear bits (1 → 0); a second program of the same
//!   byte can clear additional bits but never set one back
//!
//! [`SimFlash`] renders those rules exactly: programming ANDs the written
//! bytes into the backing store. Out-of-range reads, programs, and erases
//! are silent no-ops; callers are expected to bounds-check, and the engine
//! never produces an out-of-range address by construction.

/// Sector size of the reference device (64 KiB).
pub const FLASH_SECTOR_SIZE: usize = 64 * 1024;

/// Sector count of the reference device.
pub const FLASH_SECTOR_COUNT: usize = 64;

/// Total capacity of the reference device.
pub const FLASH_SIZE: usize = FLASH_SECTOR_SIZE * FLASH_SECTOR_COUNT;

/// Value every byte reads as after an erase.
pub const ERASED_BYTE: u8 = 0xFF;

/// Capability interface to a sector-erasable, byte-programmable device.
///
/// All operations are infallible at this level: a bounds violation is
/// swallowed. On an out-of-range `read` the buffer contents are undefined
/// (the simulator leaves them untouched).
pub trait NorFlash {
    /// Bytes per sector.
    fn sector_size(&self) -> usize;

    /// Number of sectors.
    fn sector_count(&self) -> usize;

    /// Copies `buf.len()` bytes starting at `addr` into `buf`.
    fn read(&self, addr: u32, buf: &mut [u8]);

    /// Programs `data` starting at `addr`, clearing bits only.
    fn program(&mut self, addr: u32, data: &[u8]);

    /// Erases the sector containing `addr` back to 0xFF. `addr` may be any
    /// address within the target sector.
    fn erase_sector(&mut self, addr: u32);

    /// Erases the whole device.
    fn full_erase(&mut self);
}

/// In-memory NOR flash simulator.
///
/// The backing store starts fully erased, as a factory-fresh part would.
#[derive(Clone, Debug)]
pub struct SimFlash {
    /// Backing store, one byte per flash cell.
    data: Vec<u8>,
    sector_size: usize,
    sector_count: usize,
}

impl Default for SimFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl SimFlash {
    /// Creates a simulator with the reference geometry (64 × 64 KiB).
    #[must_use]
    pub fn new() -> Self {
        Self::with_geometry(FLASH_SECTOR_COUNT, FLASH_SECTOR_SIZE)
    }

    /// Creates a simulator with `sector_count` sectors of `sector_size`
    /// bytes each.
    ///
    /// # Panics
    /// Panics if either dimension is zero.
    #[must_use]
    pub fn with_geometry(sector_count: usize, sector_size: usize) -> Self {
        assert!(
            sector_count > 0 && sector_size > 0,
            "flash geometry must be non-zero"
        );
        Self {
            data: vec![ERASED_BYTE; sector_count * sector_size],
            sector_size,
            sector_count,
        }
    }

    /// Total capacity in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The raw backing store, mainly for media-level assertions.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn in_range(&self, addr: u32, len: usize) -> bool {
        (addr as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.data.len())
    }
}

impl NorFlash for SimFlash {
    fn sector_size(&self) -> usize {
        self.sector_size
    }

    fn sector_count(&self) -> usize {
        self.sector_count
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        if !self.in_range(addr, buf.len()) {
            return;
        }
        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
    }

    fn program(&mut self, addr: u32, data: &[u8]) {
        if !self.in_range(addr, data.len()) {
            return;
        }
        let start = addr as usize;
        for (cell, &byte) in self.data[start..start + data.len()].iter_mut().zip(data) {
            *cell &= byte;
        }
    }

    fn erase_sector(&mut self, addr: u32) {
        if !self.in_range(addr, 1) {
            return;
        }
        let base = addr as usize - addr as usize % self.sector_size;
        self.data[base..base + self.sector_size].fill(ERASED_BYTE);
    }

    fn full_erase(&mut self) {
        self.data.fill(ERASED_BYTE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_device_reads_erased() {
        let flash = SimFlash::with_geometry(2, 128);
        assert_eq!(flash.capacity(), 256);
        assert!(flash.as_bytes().iter().all(|&b| b == ERASED_BYTE));

        let mut buf = [0u8; 4];
        flash.read(100, &mut buf);
        assert_eq!(buf, [0xFF; 4]);
    }

    #[test]
    fn test_program_clears_bits_only() {
        let mut flash = SimFlash::with_geometry(1, 64);

        flash.program(0, &[0xF0]);
        let mut buf = [0u8; 1];
        flash.read(0, &mut buf);
        assert_eq!(buf[0], 0xF0);

        // A second program can clear more bits but cannot set any back.
        flash.program(0, &[0x0F]);
        flash.read(0, &mut buf);
        assert_eq!(buf[0], 0x00);

        flash.program(0, &[0xFF]);
        flash.read(0, &mut buf);
        assert_eq!(buf[0], 0x00);
    }

    #[test]
    fn test_erase_sector_restores_only_that_sector() {
        let mut flash = SimFlash::with_geometry(2, 64);
        flash.program(10, &[0x00]);
        flash.program(70, &[0x00]);

        // Any address inside the sector selects it.
        flash.erase_sector(63);

        let mut buf = [0u8; 1];
        flash.read(10, &mut buf);
        assert_eq!(buf[0], 0xFF);
        flash.read(70, &mut buf);
        assert_eq!(buf[0], 0x00);
    }

    #[test]
    fn test_full_erase() {
        let mut flash = SimFlash::with_geometry(2, 64);
        flash.program(0, &[0u8; 64]);
        flash.program(64, &[0u8; 64]);
        flash.full_erase();
        assert!(flash.as_bytes().iter().all(|&b| b == ERASED_BYTE));
    }

    #[test]
    fn test_out_of_range_operations_are_ignored() {
        let mut flash = SimFlash::with_geometry(1, 64);

        flash.program(60, &[0x00; 8]); // crosses the end
        assert!(flash.as_bytes().iter().all(|&b| b == ERASED_BYTE));

        flash.program(1000, &[0x00]);
        flash.erase_sector(1000);
        assert!(flash.as_bytes().iter().all(|&b| b == ERASED_BYTE));

        // Out-of-range read leaves the buffer untouched.
        let mut buf = [0xABu8; 4];
        flash.read(62, &mut buf);
        assert_eq!(buf, [0xAB; 4]);
    }
}
