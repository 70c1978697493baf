//! The flash circular buffer engine.
//!
//! A contiguous range of sectors is used as a ring: records are appended
//! at the head, the oldest live record sits at the tail, and sectors are
//! recycled in ring order, erase by erase. Nothing is ever overwritten in
//! place; every media write either programs erased bytes or clears
//! additional bits, so the engine obeys the NOR write rule by
//! construction.
//!
//! The control block (`current_sector_id`, `write_addr`, `read_addr`,
//! `delete_addr`) is volatile. [`Fcb::mount`] rebuilds it from media alone:
//! it scans every owned sector, elects the newest and oldest live sectors
//! by signed sequence-ID distance, then walks record headers to recover
//! byte-accurate head and tail positions. There is no clean-unmount marker;
//! every mount treats the media as post-crash.

use std::{error, fmt};

use serde::Serialize;

use crate::flash::{NorFlash, ERASED_BYTE};
use crate::layout::{
    read_item_at, read_sector_header, sector_state, ItemKey, SectorHeader, ITEM_HEADER_SIZE,
    SECTOR_HEADER_SIZE,
};

/// Erased bytes required at an offset before it counts as the head: two
/// record headers' worth. A single stray 0xFFFFFFFF word inside a record
/// must not be mistaken for free space.
pub const FREE_MARGIN: usize = 2 * ITEM_HEADER_SIZE;

/// Errors returned by the engine. Failed operations never mutate the
/// control block or the media.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FcbError {
    /// Rejected input: an invalid sector range at construction, an empty
    /// payload, or a payload that could not fit even in an empty sector.
    InvalidArgument,
    /// The ring is full: rotating to the next sector would land on the
    /// sector holding the read position.
    Full,
}

impl fmt::Display for FcbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::Full => write!(f, "ring full"),
        }
    }
}

impl error::Error for FcbError {}

/// Serial-number ordering of sequence IDs: `a` is newer than `b` when the
/// signed 32-bit distance is positive. Correct across counter rollover as
/// long as live IDs span less than 2^31.
#[must_use]
pub fn newer(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) > 0
}

/// Counterpart of [`newer`].
#[must_use]
pub fn older(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// Control-block snapshot for diagnostics.
#[derive(Clone, Debug, Serialize)]
pub struct FcbStatus {
    pub current_sector_id: u32,
    pub write_addr: u32,
    pub read_addr: u32,
    pub delete_addr: u32,
}

impl FcbStatus {
    /// Renders the snapshot as a JSON object.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Per-sector diagnostic view, as seen by the mount scan.
#[derive(Clone, Debug, Serialize)]
pub struct SectorInfo {
    pub sector: u32,
    pub sequence_id: u32,
    /// Raw lifecycle word for a valid header, the INVALID sentinel
    /// otherwise.
    pub state: u32,
    pub valid: bool,
}

/// A flash circular buffer over the inclusive sector range
/// `first_sector..=last_sector` of a device.
///
/// The engine owns the device for its whole range; other buffers may
/// coexist on disjoint ranges of the same device. Calls must be serialized
/// externally if the buffer is shared across threads.
#[derive(Debug)]
pub struct Fcb<F: NorFlash> {
    flash: F,
    first_sector: u32,
    last_sector: u32,
    sector_size: u32,
    current_sector_id: u32,
    write_addr: u32,
    read_addr: u32,
    delete_addr: u32,
}

impl<F: NorFlash> Fcb<F> {
    /// Creates a control block over `flash`.
    ///
    /// The range must be non-empty, lie within the device, and the sector
    /// size must leave room for a header plus the free-slot margin. The
    /// block starts in the cold-start position; call [`Fcb::mount`] to
    /// recover state from media.
    pub fn new(flash: F, first_sector: u32, last_sector: u32) -> Result<Self, FcbError> {
        if first_sector > last_sector || last_sector as usize >= flash.sector_count() {
            return Err(FcbError::InvalidArgument);
        }
        if flash.sector_size() <= SECTOR_HEADER_SIZE + FREE_MARGIN {
            return Err(FcbError::InvalidArgument);
        }
        let sector_size = flash.sector_size() as u32;
        let start = first_sector * sector_size + SECTOR_HEADER_SIZE as u32;
        Ok(Self {
            flash,
            first_sector,
            last_sector,
            sector_size,
            current_sector_id: 0,
            write_addr: start,
            read_addr: start,
            delete_addr: start,
        })
    }

    /// Rebuilds the control block from media.
    ///
    /// Never programs record data, but erases and allocates a fresh head
    /// sector when the recovered head has no room left. Media damage is
    /// absorbed silently: sectors failing validation are skipped, and a
    /// device with no recognizable sector comes up cold.
    pub fn mount(&mut self) {
        // Scan: collect live sectors (valid header, past FRESH).
        let mut live: Vec<(u32, u32)> = Vec::new();
        for sector in self.first_sector..=self.last_sector {
            let header = read_sector_header(&self.flash, sector);
            if !header.is_valid() || header.state == sector_state::FRESH {
                continue;
            }
            live.push((sector, header.sequence_id));
        }

        let Some(&first_live) = live.first() else {
            // Cold start: nothing recognizable on media.
            self.reset_addresses();
            return;
        };

        // Elect head and tail under serial-number ordering. Sequence IDs
        // are uniquely assigned, so there are no ties.
        let mut head = first_live;
        let mut tail = first_live;
        for &(sector, seq) in &live[1..] {
            if newer(seq, head.1) {
                head = (sector, seq);
            }
            if older(seq, tail.1) {
                tail = (sector, seq);
            }
        }
        self.current_sector_id = head.1;

        // Head offset recovery; rotate now if the head sector is full so
        // the next append has room.
        match self.find_free_offset(head.0) {
            Some(offset) => self.write_addr = self.sector_base(head.0) + offset,
            None => {
                let next = self.next_sector(head.0);
                self.flash.erase_sector(self.sector_base(next));
                self.allocate_sector(next);
                self.write_addr = self.sector_base(next) + SECTOR_HEADER_SIZE as u32;
            }
        }

        // Tail recovery: the first parseable record between tail and head;
        // an empty ring falls back to the write position.
        self.read_addr = self
            .find_tail(tail.0, head.0)
            .unwrap_or(self.write_addr);
        self.delete_addr = self.read_addr;
    }

    /// Erases every owned sector and resets the control block to the ring
    /// start. Idempotent.
    pub fn erase(&mut self) {
        for sector in self.first_sector..=self.last_sector {
            self.flash.erase_sector(self.sector_base(sector));
        }
        self.reset_addresses();
    }

    /// Appends one record: a 12-byte header followed by the payload,
    /// rotating to a freshly erased sector when the current one has no
    /// room.
    ///
    /// # Errors
    /// [`FcbError::InvalidArgument`] for an empty payload or one larger
    /// than [`Fcb::max_payload`]; [`FcbError::Full`] when rotation would
    /// land on the sector holding `read_addr`. Failures leave the control
    /// block and media untouched.
    pub fn append(&mut self, data: &[u8]) -> Result<(), FcbError> {
        if data.is_empty() || data.len() > self.max_payload() {
            return Err(FcbError::InvalidArgument);
        }
        let need = (ITEM_HEADER_SIZE + data.len()) as u32;
        // A record that filled its sector edge to edge leaves write_addr at
        // the next sector base; fold that back onto the filled sector so
        // the rotation check fires.
        let (sector, offset) = {
            let sector = self.write_addr / self.sector_size;
            let offset = self.write_addr % self.sector_size;
            if offset == 0 {
                (sector - 1, self.sector_size)
            } else {
                (sector, offset)
            }
        };

        if offset + need > self.sector_size {
            let next = self.next_sector(sector);
            if next == self.read_addr / self.sector_size {
                return Err(FcbError::Full);
            }
            self.flash.erase_sector(self.sector_base(next));
            self.allocate_sector(next);
            self.write_addr = self.sector_base(next) + SECTOR_HEADER_SIZE as u32;
        } else if !read_sector_header(&self.flash, sector).is_valid() {
            // Cold start or freshly erased ring: claim the current sector
            // in place. A sector with a valid header is never re-stamped;
            // programming over a live header would corrupt it.
            self.allocate_sector(sector);
        }

        let key = ItemKey::new(data);
        self.flash.program(self.write_addr, &key.to_bytes());
        self.flash
            .program(self.write_addr + ITEM_HEADER_SIZE as u32, data);
        self.write_addr += need;
        Ok(())
    }

    /// Largest payload that fits a record in an empty sector.
    #[must_use]
    pub fn max_payload(&self) -> usize {
        self.sector_size as usize - SECTOR_HEADER_SIZE - ITEM_HEADER_SIZE
    }

    /// Absolute address where the next record header will be programmed.
    #[must_use]
    pub fn write_addr(&self) -> u32 {
        self.write_addr
    }

    /// Absolute address of the oldest record still to be consumed.
    #[must_use]
    pub fn read_addr(&self) -> u32 {
        self.read_addr
    }

    /// Absolute address of the next record to be marked consumed.
    #[must_use]
    pub fn delete_addr(&self) -> u32 {
        self.delete_addr
    }

    /// Sequence ID of the most recently allocated sector.
    #[must_use]
    pub fn current_sector_id(&self) -> u32 {
        self.current_sector_id
    }

    /// First sector of the owned range.
    #[must_use]
    pub fn first_sector(&self) -> u32 {
        self.first_sector
    }

    /// Last sector of the owned range.
    #[must_use]
    pub fn last_sector(&self) -> u32 {
        self.last_sector
    }

    /// Shared access to the underlying device.
    #[must_use]
    pub fn flash(&self) -> &F {
        &self.flash
    }

    /// Mutable access to the underlying device, mainly for fault
    /// injection in tests.
    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    /// Consumes the buffer and returns the device, e.g. to simulate a
    /// power cycle followed by a fresh mount.
    #[must_use]
    pub fn into_flash(self) -> F {
        self.flash
    }

    /// Control-block snapshot for diagnostics.
    #[must_use]
    pub fn status(&self) -> FcbStatus {
        FcbStatus {
            current_sector_id: self.current_sector_id,
            write_addr: self.write_addr,
            read_addr: self.read_addr,
            delete_addr: self.delete_addr,
        }
    }

    /// Per-sector diagnostic report over the owned range.
    #[must_use]
    pub fn sector_report(&self) -> Vec<SectorInfo> {
        (self.first_sector..=self.last_sector)
            .map(|sector| {
                let header = read_sector_header(&self.flash, sector);
                SectorInfo {
                    sector,
                    sequence_id: header.sequence_id,
                    state: header.effective_state(),
                    valid: header.is_valid(),
                }
            })
            .collect()
    }

    fn reset_addresses(&mut self) {
        let start = self.sector_base(self.first_sector) + SECTOR_HEADER_SIZE as u32;
        self.current_sector_id = 0;
        self.write_addr = start;
        self.read_addr = start;
        self.delete_addr = start;
    }

    fn sector_base(&self, sector: u32) -> u32 {
        sector * self.sector_size
    }

    /// Ring successor: wraps from `last_sector` back to `first_sector`.
    fn next_sector(&self, sector: u32) -> u32 {
        if sector >= self.last_sector {
            self.first_sector
        } else {
            sector + 1
        }
    }

    /// Stamps `sector` with an ALLOCATED header under the next sequence ID.
    fn allocate_sector(&mut self, sector: u32) {
        self.current_sector_id = self.current_sector_id.wrapping_add(1);
        let header = SectorHeader::allocated(self.current_sector_id);
        self.flash.program(self.sector_base(sector), &header.to_bytes());
    }

    /// True when `len` bytes starting at `addr` all read as erased flash.
    fn erased_run(&self, addr: u32, len: usize) -> bool {
        let mut buf = [0u8; FREE_MARGIN];
        let buf = &mut buf[..len];
        self.flash.read(addr, buf);
        buf.iter().all(|&b| b == ERASED_BYTE)
    }

    /// Scans `sector` for the first free slot at or after the header:
    /// [`FREE_MARGIN`] bytes of erased flash. Parseable records (popped
    /// ones included) are stepped over by their length; anything else
    /// advances a single byte, so short corrupt runs from interrupted
    /// writes cost a few bytes of the sector, not a false full. `None`
    /// means the sector has no usable room left.
    fn find_free_offset(&self, sector: u32) -> Option<u32> {
        let base = self.sector_base(sector);
        let mut offset = SECTOR_HEADER_SIZE as u32;
        while offset + FREE_MARGIN as u32 <= self.sector_size {
            if self.erased_run(base + offset, FREE_MARGIN) {
                return Some(offset);
            }
            match read_item_at(&self.flash, base + offset) {
                Ok(key) => offset += key.record_size() as u32,
                Err(_) => offset += 1,
            }
        }
        None
    }

    /// Walks sectors from `tail_sector` to `head_sector` inclusive in ring
    /// order, returning the absolute address of the first parseable
    /// record.
    fn find_tail(&self, tail_sector: u32, head_sector: u32) -> Option<u32> {
        let mut sector = tail_sector;
        loop {
            let base = self.sector_base(sector);
            let mut offset = SECTOR_HEADER_SIZE as u32;
            while offset + ITEM_HEADER_SIZE as u32 <= self.sector_size {
                if read_item_at(&self.flash, base + offset).is_ok() {
                    return Some(base + offset);
                }
                offset += 1;
            }
            if sector == head_sector {
                return None;
            }
            sector = self.next_sector(sector);
        }
    }
}
