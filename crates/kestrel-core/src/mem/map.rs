//! Dynamic region map: mapping, protection, and permission-checked access.

use tracing::debug;

use crate::error::CoreError;
use crate::mem::page_aligned;
use crate::mem::region::{Access, Prot, Region, RegionInfo};

/// Granularity contract for `map`/`unmap`/`protect` bases and sizes.
pub const PAGE_SIZE: u64 = 0x1000;

/// Owns the set of non-overlapping, permission-tagged address regions.
///
/// Every access is validated against the union of regions before any byte is
/// copied; the map is the engine's safety boundary against untrusted guest
/// code. All operations are atomic: they fully succeed or have no effect.
#[derive(Debug, Default)]
pub struct MemoryMap {
    // Sorted by base address; invariant: no two regions overlap.
    regions: Vec<Region>,
}

impl MemoryMap {
    /// Creates an empty address space with no mappings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Installs a zero-initialized region at `[base, base + size)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] when `base` or `size` is off the page
    /// granularity, `size` is zero, or the range overflows the address space;
    /// [`CoreError::Overlap`] when the range intersects an existing region.
    pub fn map(&mut self, base: u64, size: u64, prot: Prot) -> Result<(), CoreError> {
        let misaligned = !page_aligned(base) || !page_aligned(size) || size == 0;
        if misaligned || base.checked_add(size).is_none() {
            return Err(CoreError::Alignment { base, size });
        }
        let Ok(len) = usize::try_from(size) else {
            return Err(CoreError::Alignment { base, size });
        };

        let end = base + size;
        if self
            .regions
            .iter()
            .any(|region| region.base < end && base < region.end())
        {
            return Err(CoreError::Overlap { base, size });
        }

        let insert_at = self.regions.partition_point(|region| region.base < base);
        self.regions
            .insert(insert_at, Region::zeroed(base, len, prot));
        debug!(base, size, ?prot, "mapped region");
        Ok(())
    }

    /// Removes the regions exactly tiling `[base, base + size)`.
    ///
    /// The range must equal the union of whole regions; unmapping part of a
    /// single region is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] when `base` or `size` is off the page
    /// granularity or `size` is zero; [`CoreError::NotMapped`] when the range
    /// is not exactly covered by whole regions.
    pub fn unmap(&mut self, base: u64, size: u64) -> Result<(), CoreError> {
        if !page_aligned(base) || !page_aligned(size) || size == 0 {
            return Err(CoreError::Alignment { base, size });
        }
        let Some(end) = base.checked_add(size) else {
            return Err(CoreError::Alignment { base, size });
        };

        let first = self.regions.partition_point(|region| region.base < base);
        let mut cursor = base;
        let mut last = first;
        while cursor < end {
            match self.regions.get(last) {
                Some(region) if region.base == cursor && region.end() <= end => {
                    cursor = region.end();
                    last += 1;
                }
                _ => return Err(CoreError::NotMapped { base, size }),
            }
        }

        self.regions.drain(first..last);
        debug!(base, size, "unmapped range");
        Ok(())
    }

    /// Updates permissions for the mapped range `[base, base + size)`.
    ///
    /// The range may cover parts of regions; affected regions are split at
    /// the range boundaries so the new permissions apply exactly.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Alignment`] when `base` or `size` is off the page
    /// granularity or `size` is zero; [`CoreError::NotMapped`] when any byte
    /// of the range is unmapped.
    pub fn protect(&mut self, base: u64, size: u64, prot: Prot) -> Result<(), CoreError> {
        if !page_aligned(base) || !page_aligned(size) || size == 0 {
            return Err(CoreError::Alignment { base, size });
        }
        let Some(end) = base.checked_add(size) else {
            return Err(CoreError::Alignment { base, size });
        };

        // Validate full contiguous coverage before touching anything.
        let mut cursor = base;
        while cursor < end {
            match self.region_at(cursor) {
                Some(region) => cursor = region.end().min(end),
                None => return Err(CoreError::NotMapped { base, size }),
            }
        }

        let mut rebuilt = Vec::with_capacity(self.regions.len() + 2);
        for region in self.regions.drain(..) {
            if region.end() <= base || region.base >= end {
                rebuilt.push(region);
                continue;
            }

            let overlap_start = region.base.max(base);
            let overlap_end = region.end().min(end);
            let Region {
                base: region_base,
                prot: old_prot,
                data,
            } = region;
            let data = data.into_vec();
            let cut = |addr: u64| -> usize {
                usize::try_from(addr - region_base).unwrap_or(data.len())
            };

            if overlap_start > region_base {
                rebuilt.push(Region {
                    base: region_base,
                    prot: old_prot,
                    data: data[..cut(overlap_start)].to_vec().into_boxed_slice(),
                });
            }
            rebuilt.push(Region {
                base: overlap_start,
                prot,
                data: data[cut(overlap_start)..cut(overlap_end)]
                    .to_vec()
                    .into_boxed_slice(),
            });
            if overlap_end < region_base + data.len() as u64 {
                rebuilt.push(Region {
                    base: overlap_end,
                    prot: old_prot,
                    data: data[cut(overlap_end)..].to_vec().into_boxed_slice(),
                });
            }
        }
        self.regions = rebuilt;
        debug!(base, size, ?prot, "updated range permissions");
        Ok(())
    }

    /// Copies `buf.len()` bytes out of the mapped space starting at `addr`.
    ///
    /// The whole span must be mapped with read permission; the copy may cross
    /// adjacent region boundaries transparently.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`] naming
    /// the first offending byte; the buffer is untouched on failure.
    pub fn read(&self, addr: u64, buf: &mut [u8]) -> Result<(), CoreError> {
        self.copy_out(addr, buf, Access::Read)
    }

    /// Copies `bytes` into the mapped space starting at `addr`.
    ///
    /// The whole span must be mapped with write permission; validation
    /// happens before the first byte lands, so a failed write has no effect.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`] naming
    /// the first offending byte.
    pub fn write(&mut self, addr: u64, bytes: &[u8]) -> Result<(), CoreError> {
        self.check(addr, bytes.len() as u64, Access::Write)?;

        let mut cursor = addr;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let region = self
                .region_at_mut(cursor)
                .ok_or(CoreError::Unmapped { addr: cursor })?;
            let offset = usize::try_from(cursor - region.base).unwrap_or(region.data.len());
            let take = remaining.len().min(region.data.len() - offset);
            region.data[offset..offset + take].copy_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            cursor += take as u64;
        }
        Ok(())
    }

    /// Copies bytes with fetch permission, as issued by the execution loop.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`] naming
    /// the first offending byte.
    pub fn fetch(&self, addr: u64, buf: &mut [u8]) -> Result<(), CoreError> {
        self.copy_out(addr, buf, Access::Fetch)
    }

    /// Copies up to `buf.len()` contiguous fetchable bytes starting at `addr`.
    ///
    /// Used for instruction windows near region edges: the first byte must be
    /// fetchable, and the returned count is the checked contiguous prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`] when the
    /// first byte itself cannot be fetched.
    pub fn fetch_window(&self, addr: u64, buf: &mut [u8]) -> Result<usize, CoreError> {
        let mut cursor = addr;
        let mut copied = 0;
        while copied < buf.len() {
            let Some(region) = self.region_at(cursor) else {
                break;
            };
            if !region.prot.contains(Prot::EXEC) {
                break;
            }
            let offset = usize::try_from(cursor - region.base).unwrap_or(region.data.len());
            let take = (buf.len() - copied).min(region.data.len() - offset);
            buf[copied..copied + take].copy_from_slice(&region.data[offset..offset + take]);
            copied += take;
            cursor += take as u64;
        }

        if copied == 0 {
            return Err(match self.region_at(addr) {
                Some(_) => CoreError::Protection {
                    addr,
                    access: Access::Fetch,
                },
                None => CoreError::Unmapped { addr },
            });
        }
        Ok(copied)
    }

    /// Validates that `[addr, addr + len)` is mapped with `access` rights.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Unmapped`] or [`CoreError::Protection`] naming
    /// the first offending byte.
    pub fn check(&self, addr: u64, len: u64, access: Access) -> Result<(), CoreError> {
        let Some(end) = addr.checked_add(len) else {
            return Err(CoreError::Unmapped { addr: u64::MAX });
        };
        let mut cursor = addr;
        while cursor < end {
            let region = self
                .region_at(cursor)
                .ok_or(CoreError::Unmapped { addr: cursor })?;
            if !region.prot.contains(access.required()) {
                return Err(CoreError::Protection {
                    addr: cursor,
                    access,
                });
            }
            cursor = region.end().min(end);
        }
        Ok(())
    }

    /// Returns copies of all region descriptors in ascending base order.
    #[must_use]
    pub fn regions(&self) -> Vec<RegionInfo> {
        self.regions.iter().map(Region::info).collect()
    }

    /// Returns the descriptor of the region containing `addr`, if mapped.
    #[must_use]
    pub fn region_containing(&self, addr: u64) -> Option<RegionInfo> {
        self.region_at(addr).map(Region::info)
    }

    fn copy_out(&self, addr: u64, buf: &mut [u8], access: Access) -> Result<(), CoreError> {
        self.check(addr, buf.len() as u64, access)?;

        let mut cursor = addr;
        let mut copied = 0;
        while copied < buf.len() {
            let region = self
                .region_at(cursor)
                .ok_or(CoreError::Unmapped { addr: cursor })?;
            let offset = usize::try_from(cursor - region.base).unwrap_or(region.data.len());
            let take = (buf.len() - copied).min(region.data.len() - offset);
            buf[copied..copied + take].copy_from_slice(&region.data[offset..offset + take]);
            copied += take;
            cursor += take as u64;
        }
        Ok(())
    }

    fn region_at(&self, addr: u64) -> Option<&Region> {
        let idx = self.regions.partition_point(|region| region.end() <= addr);
        self.regions.get(idx).filter(|region| region.contains(addr))
    }

    fn region_at_mut(&mut self, addr: u64) -> Option<&mut Region> {
        let idx = self.regions.partition_point(|region| region.end() <= addr);
        self.regions
            .get_mut(idx)
            .filter(|region| region.contains(addr))
    }
}
