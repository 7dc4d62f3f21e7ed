// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;

use crate::format::bootimage::BootHeader;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Page size must not be zero")]
    InvalidPageSize,
    #[error("Image layout overflowed integer bounds")]
    IntOverflow,
}

type Result<T> = std::result::Result<T, Error>;

/// Payload regions of a boot image, in their fixed on-disk order. The order
/// never changes, even when a region is absent.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum Region {
    Kernel,
    Ramdisk,
    Second,
    RecoveryDtbo,
    Dtb,
}

impl Region {
    pub const ALL: [Self; 5] = [
        Self::Kernel,
        Self::Ramdisk,
        Self::Second,
        Self::RecoveryDtbo,
        Self::Dtb,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Kernel => "kernel",
            Self::Ramdisk => "ramdisk",
            Self::Second => "second stage",
            Self::RecoveryDtbo => "recovery dtbo",
            Self::Dtb => "dtb",
        }
    }
}

/// Byte range of one payload region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegionLayout {
    pub offset: u64,
    pub size: u32,
}

/// Page-aligned byte offsets for every payload region, derived purely from
/// the header's size fields. The header occupies page 0 and the kernel starts
/// at page 1. An absent region occupies zero pages, but does not shift the
/// regions that follow it out of order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ImageLayout {
    pub page_size: u32,
    pub kernel: RegionLayout,
    pub ramdisk: RegionLayout,
    pub second: RegionLayout,
    pub recovery_dtbo: RegionLayout,
    pub dtb: RegionLayout,
    /// Total container size needed to hold the header and every region,
    /// including the trailing padding of the last present region.
    pub total_size: u64,
}

fn pages(size: u32, page_size: u32) -> u64 {
    u64::from(size).div_ceil(u64::from(page_size))
}

impl ImageLayout {
    pub fn compute(header: &BootHeader) -> Result<Self> {
        Self::from_sizes(
            header.page_size,
            [
                header.kernel_size,
                header.ramdisk_size,
                header.second_size,
                header.recovery_dtbo_size,
                header.dtb_size,
            ],
        )
    }

    pub fn from_sizes(page_size: u32, sizes: [u32; 5]) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidPageSize);
        }

        let mut page = 1u64;
        let mut regions = [RegionLayout { offset: 0, size: 0 }; 5];

        for (region, &size) in regions.iter_mut().zip(&sizes) {
            let offset = page
                .checked_mul(u64::from(page_size))
                .ok_or(Error::IntOverflow)?;

            *region = RegionLayout { offset, size };

            page = page
                .checked_add(pages(size, page_size))
                .ok_or(Error::IntOverflow)?;
        }

        let total_size = page
            .checked_mul(u64::from(page_size))
            .ok_or(Error::IntOverflow)?;

        let [kernel, ramdisk, second, recovery_dtbo, dtb] = regions;

        Ok(Self {
            page_size,
            kernel,
            ramdisk,
            second,
            recovery_dtbo,
            dtb,
            total_size,
        })
    }

    pub fn region(&self, region: Region) -> RegionLayout {
        match region {
            Region::Kernel => self.kernel,
            Region::Ramdisk => self.ramdisk,
            Region::Second => self.second,
            Region::RecoveryDtbo => self.recovery_dtbo,
            Region::Dtb => self.dtb,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn kernel_and_ramdisk_only() {
        let layout = ImageLayout::from_sizes(2048, [5000, 3000, 0, 0, 0]).unwrap();

        // 5000 bytes span pages 1 through 3; the ramdisk starts at page 4 and
        // spans 2 pages.
        assert_eq!(layout.kernel.offset, 2048);
        assert_eq!(layout.ramdisk.offset, 4 * 2048);
        assert_eq!(layout.total_size, (1 + 3 + 2) * 2048);
        assert_eq!(layout.total_size, 12288);

        // Absent regions collapse onto the end without reserving pages.
        assert_eq!(layout.second.offset, 6 * 2048);
        assert_eq!(layout.recovery_dtbo.offset, 6 * 2048);
        assert_eq!(layout.dtb.offset, 6 * 2048);
    }

    #[test]
    fn one_byte_regions() {
        let layout = ImageLayout::from_sizes(4096, [1, 1, 1, 1, 1]).unwrap();

        for (i, region) in Region::ALL.into_iter().enumerate() {
            assert_eq!(layout.region(region).offset, (i as u64 + 1) * 4096);
        }

        assert_eq!(layout.total_size, 6 * 4096);
    }

    #[test]
    fn offsets_are_ordered_and_disjoint() {
        let layout = ImageLayout::from_sizes(2048, [12345, 678, 0, 90, 1]).unwrap();
        let mut end = 2048u64;

        for region in Region::ALL {
            let r = layout.region(region);

            assert!(r.offset >= end);
            assert!(r.offset % 2048 == 0);

            end = r.offset + u64::from(r.size);
        }

        assert!(end <= layout.total_size);
    }

    #[test]
    fn zero_page_size() {
        assert_matches!(
            ImageLayout::from_sizes(0, [1, 1, 0, 0, 0]),
            Err(Error::InvalidPageSize)
        );
    }
}
