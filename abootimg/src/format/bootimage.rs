// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io::{self, Read, Write},
    mem,
    str::{self, Utf8Error},
};

use bstr::ByteSlice;
use thiserror::Error;
use zerocopy::{FromBytes, FromZeros, IntoBytes, little_endian};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::format::{
    layout::{ImageLayout, Region},
    padding::ZeroPadding,
};

pub const BOOT_MAGIC: [u8; 8] = *b"ANDROID!";
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;

/// Highest header version this implementation understands.
pub const MAX_HEADER_VERSION: u32 = 2;

/// Default page size for headers built from scratch.
pub const DEFAULT_PAGE_SIZE: u32 = 2048;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Not an Android boot image magic: {0:?}")]
    BadMagic([u8; 8]),
    #[error("Unsupported boot image header version: {0}")]
    UnsupportedVersion(u32),
    #[error("Invalid header size for version {version}: {actual} != {expected}")]
    HeaderSizeMismatch {
        version: u32,
        actual: u32,
        expected: u32,
    },
    #[error("Kernel size is zero")]
    EmptyKernel,
    #[error("Ramdisk size is zero")]
    EmptyRamdisk,
    #[error("Page size must not be zero")]
    ZeroPageSize,
    #[error("Image requires {required} bytes, but the container holds {available}")]
    ImageTooSmall { required: u64, available: u64 },
    #[error("Boot image header is truncated")]
    TruncatedHeader(#[source] io::Error),
    #[error("{0:?} field is not UTF-8 encoded: {data:?}", data = .2.as_bstr())]
    StringNotUtf8(&'static str, #[source] Utf8Error, Vec<u8>),
    #[error("{0:?} field is too long (>{1}): {2:?}")]
    StringTooLong(&'static str, usize, String),
    #[error("Failed to write boot image header")]
    HeaderWrite(#[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Raw on-disk layout for the v0 image header.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV0 {
    /// Magic value. This should be equal to [`BOOT_MAGIC`].
    magic: [u8; 8],
    kernel_size: little_endian::U32,
    kernel_addr: little_endian::U32,
    ramdisk_size: little_endian::U32,
    ramdisk_addr: little_endian::U32,
    second_size: little_endian::U32,
    second_addr: little_endian::U32,
    tags_addr: little_endian::U32,
    page_size: little_endian::U32,
    header_version: little_endian::U32,
    os_version: little_endian::U32,
    name: [u8; BOOT_NAME_SIZE],
    cmdline: [u8; BOOT_ARGS_SIZE],
    id: [little_endian::U32; 8],
    extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

/// Raw on-disk layout for the extra v1 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV1Extra {
    recovery_dtbo_size: little_endian::U32,
    recovery_dtbo_offset: little_endian::U64,
    header_size: little_endian::U32,
}

/// Raw on-disk layout for the extra v2 image header fields.
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(packed)]
struct RawV2Extra {
    dtb_size: little_endian::U32,
    dtb_addr: little_endian::U64,
}

/// Byte size of the canonical header structure for the given version. Any
/// version above 2 maps to the v2 size; callers must still reject such
/// versions through [`BootHeader::validate`] before trusting the result.
pub fn header_size_for(version: u32) -> u32 {
    let mut size = mem::size_of::<RawV0>();

    if version >= 1 {
        size += mem::size_of::<RawV1Extra>();
    }
    if version >= 2 {
        size += mem::size_of::<RawV2Extra>();
    }

    size as u32
}

/// Packed OS version and security patch level, decoded for presentation
/// only. The codec never interprets this field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct OsVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub patch_year: u16,
    pub patch_month: u8,
}

impl OsVersion {
    pub fn from_packed(value: u32) -> Self {
        Self {
            major: ((value >> 25) & 0x7f) as u8,
            minor: ((value >> 18) & 0x7f) as u8,
            patch: ((value >> 11) & 0x7f) as u8,
            // The year is stored with an offset of 2000.
            patch_year: 2000 + ((value >> 4) & 0x7f) as u16,
            patch_month: (value & 0xf) as u8,
        }
    }
}

/// The versioned fixed header, modeled as one canonical struct holding the
/// superset of all three versions' fields. Fields beyond the declared
/// version are zero after decoding and are ignored when serializing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootHeader {
    // v0+ fields.
    pub magic: [u8; 8],
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub header_version: u32,
    pub os_version: u32,
    pub name: String,
    pub cmdline: String,
    pub id: [u32; 8],
    pub extra_cmdline: String,
    // v1+ fields.
    pub recovery_dtbo_size: u32,
    pub recovery_dtbo_offset: u64,
    pub header_size: u32,
    // v2+ fields.
    pub dtb_size: u32,
    pub dtb_addr: u64,
}

impl Default for BootHeader {
    fn default() -> Self {
        Self {
            magic: BOOT_MAGIC,
            kernel_size: 0,
            kernel_addr: 0,
            ramdisk_size: 0,
            ramdisk_addr: 0,
            second_size: 0,
            second_addr: 0,
            tags_addr: 0,
            page_size: DEFAULT_PAGE_SIZE,
            header_version: 0,
            os_version: 0,
            name: String::new(),
            cmdline: String::new(),
            id: [0; 8],
            extra_cmdline: String::new(),
            recovery_dtbo_size: 0,
            recovery_dtbo_offset: 0,
            header_size: 0,
            dtb_size: 0,
            dtb_addr: 0,
        }
    }
}

impl BootHeader {
    /// Decode the header in stages. The v0-sized prefix is read first to
    /// discover the version, then the version-dependent remainder is read
    /// from the same position, and every unread trailing field is
    /// zero-filled up to the v2 shape. The magic and version are carried
    /// over verbatim; rejecting them is [`BootHeader::validate`]'s job.
    pub fn from_reader(mut reader: impl Read) -> Result<Self> {
        let raw_v0 = RawV0::read_from_io(&mut reader).map_err(Error::TruncatedHeader)?;

        let header_version = raw_v0.header_version.get();

        let mut raw_v1 = RawV1Extra::new_zeroed();
        if header_version >= 1 {
            raw_v1 = RawV1Extra::read_from_io(&mut reader).map_err(Error::TruncatedHeader)?;
        }

        let mut raw_v2 = RawV2Extra::new_zeroed();
        if header_version >= 2 {
            raw_v2 = RawV2Extra::read_from_io(&mut reader).map_err(Error::TruncatedHeader)?;
        }

        let name = raw_v0.name.trim_end_padding();
        let name = str::from_utf8(name)
            .map_err(|e| Error::StringNotUtf8("name", e, name.to_vec()))?;

        let cmdline = raw_v0.cmdline.trim_end_padding();
        let cmdline = str::from_utf8(cmdline)
            .map_err(|e| Error::StringNotUtf8("cmdline", e, cmdline.to_vec()))?;

        let extra_cmdline = raw_v0.extra_cmdline.trim_end_padding();
        let extra_cmdline = str::from_utf8(extra_cmdline)
            .map_err(|e| Error::StringNotUtf8("extra_cmdline", e, extra_cmdline.to_vec()))?;

        Ok(Self {
            magic: raw_v0.magic,
            kernel_size: raw_v0.kernel_size.get(),
            kernel_addr: raw_v0.kernel_addr.get(),
            ramdisk_size: raw_v0.ramdisk_size.get(),
            ramdisk_addr: raw_v0.ramdisk_addr.get(),
            second_size: raw_v0.second_size.get(),
            second_addr: raw_v0.second_addr.get(),
            tags_addr: raw_v0.tags_addr.get(),
            page_size: raw_v0.page_size.get(),
            header_version,
            os_version: raw_v0.os_version.get(),
            name: name.to_owned(),
            cmdline: cmdline.to_owned(),
            id: raw_v0.id.map(|id| id.get()),
            extra_cmdline: extra_cmdline.to_owned(),
            recovery_dtbo_size: raw_v1.recovery_dtbo_size.get(),
            recovery_dtbo_offset: raw_v1.recovery_dtbo_offset.get(),
            header_size: raw_v1.header_size.get(),
            dtb_size: raw_v2.dtb_size.get(),
            dtb_addr: raw_v2.dtb_addr.get(),
        })
    }

    /// Serialize exactly the bytes belonging to the declared version.
    pub fn to_writer(&self, mut writer: impl Write) -> Result<()> {
        let name = self
            .name
            .as_bytes()
            .to_padded_array::<BOOT_NAME_SIZE>()
            .ok_or_else(|| Error::StringTooLong("name", BOOT_NAME_SIZE, self.name.clone()))?;
        let cmdline = self
            .cmdline
            .as_bytes()
            .to_padded_array::<BOOT_ARGS_SIZE>()
            .ok_or_else(|| Error::StringTooLong("cmdline", BOOT_ARGS_SIZE, self.cmdline.clone()))?;
        let extra_cmdline = self
            .extra_cmdline
            .as_bytes()
            .to_padded_array::<BOOT_EXTRA_ARGS_SIZE>()
            .ok_or_else(|| {
                Error::StringTooLong(
                    "extra_cmdline",
                    BOOT_EXTRA_ARGS_SIZE,
                    self.extra_cmdline.clone(),
                )
            })?;

        let raw_v0 = RawV0 {
            magic: self.magic,
            kernel_size: self.kernel_size.into(),
            kernel_addr: self.kernel_addr.into(),
            ramdisk_size: self.ramdisk_size.into(),
            ramdisk_addr: self.ramdisk_addr.into(),
            second_size: self.second_size.into(),
            second_addr: self.second_addr.into(),
            tags_addr: self.tags_addr.into(),
            page_size: self.page_size.into(),
            header_version: self.header_version.into(),
            os_version: self.os_version.into(),
            name,
            cmdline,
            id: self.id.map(|id| id.into()),
            extra_cmdline,
        };

        raw_v0.write_to_io(&mut writer).map_err(Error::HeaderWrite)?;

        if self.header_version >= 1 {
            let raw_v1 = RawV1Extra {
                recovery_dtbo_size: self.recovery_dtbo_size.into(),
                recovery_dtbo_offset: self.recovery_dtbo_offset.into(),
                header_size: header_size_for(self.header_version).into(),
            };

            raw_v1.write_to_io(&mut writer).map_err(Error::HeaderWrite)?;
        }

        if self.header_version >= 2 {
            let raw_v2 = RawV2Extra {
                dtb_size: self.dtb_size.into(),
                dtb_addr: self.dtb_addr.into(),
            };

            raw_v2.write_to_io(&mut writer).map_err(Error::HeaderWrite)?;
        }

        Ok(())
    }

    /// Raise the header version to the minimum required by the payloads that
    /// are actually present. The version never decreases once evaluated, and
    /// `header_size` is synchronized whenever the version rises.
    pub fn promote_version(&mut self) {
        let mut new_version = 0;

        if self.recovery_dtbo_size > 0 {
            new_version = 1;
        }
        if self.dtb_size > 0 {
            new_version = 2;
        }

        if new_version > self.header_version {
            self.header_version = new_version;
            self.header_size = header_size_for(new_version);
        }
    }

    /// Check the structural invariants against a container of the given
    /// size. The first failing check is reported; all variants are distinct
    /// so the caller can decide which failures are recoverable.
    pub fn validate(&self, container_size: u64) -> Result<()> {
        if self.magic != BOOT_MAGIC {
            return Err(Error::BadMagic(self.magic));
        }

        if self.header_version > MAX_HEADER_VERSION {
            return Err(Error::UnsupportedVersion(self.header_version));
        }

        if self.header_version >= 1 {
            let expected = header_size_for(self.header_version);
            if self.header_size != expected {
                return Err(Error::HeaderSizeMismatch {
                    version: self.header_version,
                    actual: self.header_size,
                    expected,
                });
            }
        }

        if self.kernel_size == 0 {
            return Err(Error::EmptyKernel);
        }

        if self.ramdisk_size == 0 {
            return Err(Error::EmptyRamdisk);
        }

        if self.page_size == 0 {
            return Err(Error::ZeroPageSize);
        }

        // The page size was already checked, so the layout can only fail on
        // overflow, which no real container can hold either.
        let required = match ImageLayout::compute(self) {
            Ok(layout) => layout.total_size,
            Err(_) => u64::MAX,
        };

        if required > container_size {
            return Err(Error::ImageTooSmall {
                required,
                available: container_size,
            });
        }

        Ok(())
    }

    pub fn region_size(&self, region: Region) -> u32 {
        match region {
            Region::Kernel => self.kernel_size,
            Region::Ramdisk => self.ramdisk_size,
            Region::Second => self.second_size,
            Region::RecoveryDtbo => self.recovery_dtbo_size,
            Region::Dtb => self.dtb_size,
        }
    }

    pub fn set_region_size(&mut self, region: Region, size: u32) {
        match region {
            Region::Kernel => self.kernel_size = size,
            Region::Ramdisk => self.ramdisk_size = size,
            Region::Second => self.second_size = size,
            Region::RecoveryDtbo => self.recovery_dtbo_size = size,
            Region::Dtb => self.dtb_size = size,
        }
    }
}
