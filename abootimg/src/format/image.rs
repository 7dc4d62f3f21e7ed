// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    io::{self, Read, Seek, SeekFrom, Write},
};

use thiserror::Error;

use crate::{
    format::{
        bootimage::{self, BootHeader, OsVersion},
        layout::{self, ImageLayout, Region},
        padding,
    },
    stream::{ReadFixedSizeExt, ReadSeek, Truncate},
    util::{self, NumBytes, OutOfBoundsError},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Boot image header error")]
    Header(#[from] bootimage::Error),
    #[error("Boot image layout error")]
    Layout(#[from] layout::Error),
    #[error("New {0} payload is too large")]
    PayloadTooLarge(&'static str, #[source] OutOfBoundsError),
    #[error("{0} payload holds {actual} bytes, but the header declares {expected}", actual = .1, expected = .2)]
    PayloadSizeMismatch(&'static str, usize, u32),
    #[error("Image requires {required} bytes, but the block device holds {available}")]
    ContainerTooSmall { required: u64, available: u64 },
    #[error("Failed to read {0} payload")]
    PayloadRead(&'static str, #[source] io::Error),
    #[error("Failed to write {0} payload")]
    PayloadWrite(&'static str, #[source] io::Error),
    #[error("Failed to resize boot image container")]
    ContainerResize(#[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Size and kind of the target holding a boot image. A block device has a
/// fixed capacity and can never grow; a regular file grows on demand. A size
/// of zero means the target does not exist yet and adopts whatever the
/// layout requires.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Container {
    pub size: u64,
    pub block_device: bool,
}

/// In-memory payload data, keyed by region. Regions without an entry keep
/// whatever bytes the backing image already holds.
#[derive(Clone, Default)]
pub struct PayloadSet {
    entries: [Option<Vec<u8>>; Region::ALL.len()],
}

impl PayloadSet {
    pub fn get(&self, region: Region) -> Option<&[u8]> {
        self.entries[region as usize].as_deref()
    }

    pub fn set(&mut self, region: Region, data: Vec<u8>) {
        self.entries[region as usize] = Some(data);
    }

    pub fn take(&mut self, region: Region) -> Option<Vec<u8>> {
        self.entries[region as usize].take()
    }

    pub fn contains(&self, region: Region) -> bool {
        self.entries[region as usize].is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.is_none())
    }
}

impl fmt::Debug for PayloadSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PayloadSet");

        for region in Region::ALL {
            if let Some(data) = self.get(region) {
                s.field(region.name(), &NumBytes(data.len()));
            }
        }

        s.finish_non_exhaustive()
    }
}

/// A boot image: the parsed header, the container it lives in, and loaded
/// payload data for the regions that have been read or replaced.
#[derive(Clone, Debug)]
pub struct BootImage {
    pub header: BootHeader,
    pub container: Container,
    pub payloads: PayloadSet,
    /// Region offsets as they were when the image was decoded. Header edits
    /// shift regions around, so reads of the backing image must keep using
    /// these offsets.
    original_layout: Option<ImageLayout>,
}

impl BootImage {
    /// Parse the header at the start of the reader. No validation happens
    /// here; call [`BootImage::validate`] to decide whether the result is
    /// usable.
    pub fn decode(mut reader: impl Read, container: Container) -> Result<Self> {
        let header = BootHeader::from_reader(&mut reader)?;
        let original_layout = ImageLayout::compute(&header).ok();

        Ok(Self {
            header,
            container,
            payloads: PayloadSet::default(),
            original_layout,
        })
    }

    /// Start from an empty header for a target being created from scratch.
    pub fn create(container: Container) -> Self {
        Self {
            header: BootHeader::default(),
            container,
            payloads: PayloadSet::default(),
            original_layout: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.header.validate(self.container.size)?;
        Ok(())
    }

    /// Read one payload from the backing image. The offsets recorded at
    /// decode time are used, so this stays correct even after the header has
    /// been edited.
    pub fn read_payload(&self, mut reader: impl ReadSeek, region: Region) -> Result<Vec<u8>> {
        let layout = match self.original_layout {
            Some(layout) => layout,
            None => ImageLayout::compute(&self.header)?,
        };
        let r = layout.region(region);

        reader
            .seek(SeekFrom::Start(r.offset))
            .map_err(|e| Error::PayloadRead(region.name(), e))?;

        reader
            .read_vec_exact(r.size as usize)
            .map_err(|e| Error::PayloadRead(region.name(), e))
    }

    /// Install replacement payloads and carry every payload whose on-disk
    /// offset has shifted through memory. Offsets shift when an earlier
    /// region changes size or when the page size changes, and the shifted
    /// data must be read from its old position before the image is
    /// rewritten. The original stream may be `None` when the image is being
    /// created and holds no prior data.
    pub fn assemble(
        &mut self,
        mut replacements: PayloadSet,
        mut original: Option<&mut dyn ReadSeek>,
    ) -> Result<()> {
        for region in Region::ALL {
            if let Some(data) = replacements.take(region) {
                let size = util::check_bounds(data.len() as u64, 0, u64::from(u32::MAX))
                    .map_err(|e| Error::PayloadTooLarge(region.name(), e))?;

                self.header.set_region_size(region, size as u32);
                self.payloads.set(region, data);
            }
        }

        // A fresh image has no prior data to carry.
        let Some(old_layout) = self.original_layout else {
            return Ok(());
        };
        let new_layout = ImageLayout::compute(&self.header)?;

        for region in Region::ALL {
            let size = self.header.region_size(region);

            if size == 0 || self.payloads.contains(region) {
                continue;
            }

            let old = old_layout.region(region);
            if new_layout.region(region).offset == old.offset {
                // Unshifted data stays where it is on disk.
                continue;
            }

            let Some(mut reader) = original.as_deref_mut() else {
                return Err(Error::PayloadRead(
                    region.name(),
                    io::Error::new(io::ErrorKind::NotFound, "No backing image to read from"),
                ));
            };

            reader
                .seek(SeekFrom::Start(old.offset))
                .map_err(|e| Error::PayloadRead(region.name(), e))?;

            let data = reader
                .read_vec_exact(size as usize)
                .map_err(|e| Error::PayloadRead(region.name(), e))?;

            self.payloads.set(region, data);
        }

        Ok(())
    }

    /// Grow the container to fit the current layout. Block devices cannot
    /// grow and fail instead. A zero-sized container simply adopts the
    /// layout's total size.
    pub fn fit_container(&mut self) -> Result<()> {
        let required = ImageLayout::compute(&self.header)?.total_size;

        if required > self.container.size {
            if self.container.block_device && self.container.size != 0 {
                return Err(Error::ContainerTooSmall {
                    required,
                    available: self.container.size,
                });
            }

            self.container.size = required;
        }

        Ok(())
    }

    /// Force the container to a specific size, as requested through the
    /// `bootsize` config key. Shrinking below the layout's needs is caught
    /// by [`BootImage::validate`] later.
    pub fn resize_container(&mut self, size: u64) {
        self.container.size = size;
    }

    /// Write the image to the target. Validation runs before the first byte
    /// is written, so an invalid image never clobbers the target. Only the
    /// header and the loaded payloads are written; untouched regions keep
    /// their bytes since their offsets did not move.
    pub fn encode(&self, mut writer: impl Write + Seek + Truncate) -> Result<()> {
        self.validate()?;

        let layout = ImageLayout::compute(&self.header)?;

        // Every loaded payload must agree with the header before any of them
        // hit the target.
        for region in Region::ALL {
            if let Some(data) = self.payloads.get(region) {
                let expected = self.header.region_size(region);
                if data.len() != expected as usize {
                    return Err(Error::PayloadSizeMismatch(
                        region.name(),
                        data.len(),
                        expected,
                    ));
                }
            }
        }

        writer
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::PayloadWrite("header", e))?;
        self.header.to_writer(&mut writer)?;
        padding::write_zeros(&mut writer, u64::from(layout.page_size))
            .map_err(|e| Error::PayloadWrite("header", e))?;

        for region in Region::ALL {
            let Some(data) = self.payloads.get(region) else {
                continue;
            };
            if data.is_empty() {
                continue;
            }

            let r = layout.region(region);

            writer
                .seek(SeekFrom::Start(r.offset))
                .map_err(|e| Error::PayloadWrite(region.name(), e))?;
            writer
                .write_all(data)
                .map_err(|e| Error::PayloadWrite(region.name(), e))?;
            padding::write_zeros(&mut writer, u64::from(layout.page_size))
                .map_err(|e| Error::PayloadWrite(region.name(), e))?;
        }

        // Block devices have a fixed size and reject ftruncate-style calls.
        if !self.container.block_device {
            writer
                .truncate(self.container.size)
                .map_err(Error::ContainerResize)?;
        }

        Ok(())
    }
}

impl fmt::Display for BootImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = &self.header;
        let mib = |n: u64| n as f64 / f64::from(0x100000u32);

        writeln!(
            f,
            "* image size = {} bytes ({:.2} MB)",
            self.container.size,
            mib(self.container.size),
        )?;
        writeln!(f, "  page size  = {} bytes", header.page_size)?;
        writeln!(f)?;
        writeln!(f, "* header version = {}", header.header_version)?;

        if header.os_version != 0 {
            let os = OsVersion::from_packed(header.os_version);
            writeln!(
                f,
                "* os version = {}.{}.{} (patch level {}-{:02})",
                os.major, os.minor, os.patch, os.patch_year, os.patch_month,
            )?;
        }

        writeln!(f)?;

        for region in Region::ALL {
            let size = header.region_size(region);
            if size == 0 && region != Region::Kernel && region != Region::Ramdisk {
                continue;
            }

            writeln!(
                f,
                "* {:13} = {size} bytes ({:.2} MB)",
                format!("{} size", region.name()),
                mib(u64::from(size)),
            )?;
        }

        writeln!(f)?;
        writeln!(f, "* load addresses:")?;
        writeln!(f, "  kernel:        {:#010x}", header.kernel_addr)?;
        writeln!(f, "  ramdisk:       {:#010x}", header.ramdisk_addr)?;

        if header.second_size != 0 {
            writeln!(f, "  second stage:  {:#010x}", header.second_addr)?;
        }

        writeln!(f, "  tags:          {:#010x}", header.tags_addr)?;

        if header.recovery_dtbo_size != 0 {
            writeln!(f, "  recovery dtbo: {:#018x}", header.recovery_dtbo_offset)?;
        }
        if header.dtb_size != 0 {
            writeln!(f, "  dtb:           {:#018x}", header.dtb_addr)?;
        }

        if !header.name.is_empty() {
            writeln!(f)?;
            writeln!(f, "* name = {}", header.name)?;
        }

        writeln!(f)?;
        writeln!(f, "* cmdline = {}", header.cmdline)?;

        writeln!(f)?;
        write!(f, "* id =")?;
        for word in header.id {
            write!(f, " {word:08x}")?;
        }
        writeln!(f)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    fn test_image(page_size: u32) -> BootImage {
        let mut image = BootImage::create(Container {
            size: 0,
            block_device: false,
        });
        image.header.page_size = page_size;

        let mut payloads = PayloadSet::default();
        payloads.set(Region::Kernel, vec![0xaa; 5000]);
        payloads.set(Region::Ramdisk, vec![0xbb; 3000]);

        image.assemble(payloads, None).unwrap();
        image.fit_container().unwrap();

        image
    }

    #[test]
    fn create_encode_decode() {
        let image = test_image(2048);
        assert_eq!(image.container.size, 12288);

        let mut target = Cursor::new(vec![]);
        image.encode(&mut target).unwrap();

        let buf = target.into_inner();
        assert_eq!(buf.len(), 12288);
        assert_eq!(&buf[2048..2058], &[0xaa; 10]);
        // Trailing kernel padding.
        assert_eq!(&buf[2048 + 5000..4 * 2048], &[0u8; 3 * 2048 - 5000]);
        assert_eq!(&buf[4 * 2048..4 * 2048 + 10], &[0xbb; 10]);

        let mut reader = Cursor::new(buf);
        let decoded = BootImage::decode(
            &mut reader,
            Container {
                size: 12288,
                block_device: false,
            },
        )
        .unwrap();

        decoded.validate().unwrap();
        assert_eq!(decoded.header, image.header);

        let kernel = decoded.read_payload(&mut reader, Region::Kernel).unwrap();
        assert_eq!(kernel, vec![0xaa; 5000]);
    }

    #[test]
    fn replacement_reloads_displaced_payloads() {
        let image = test_image(2048);
        let mut target = Cursor::new(vec![]);
        image.encode(&mut target).unwrap();

        let mut reader = Cursor::new(target.into_inner());
        let mut updated = BootImage::decode(
            &mut reader,
            Container {
                size: 12288,
                block_device: false,
            },
        )
        .unwrap();

        // Growing the kernel shifts the ramdisk, which must be carried over
        // from its old offset.
        let mut payloads = PayloadSet::default();
        payloads.set(Region::Kernel, vec![0xcc; 7000]);
        updated.assemble(payloads, Some(&mut reader)).unwrap();

        assert_eq!(updated.header.kernel_size, 7000);
        assert_eq!(
            updated.payloads.get(Region::Ramdisk),
            Some(vec![0xbb; 3000].as_slice()),
        );

        updated.fit_container().unwrap();
        assert_eq!(updated.container.size, (1 + 4 + 2) * 2048);

        let mut target = Cursor::new(vec![]);
        updated.encode(&mut target).unwrap();

        let buf = target.into_inner();
        assert_eq!(&buf[5 * 2048..5 * 2048 + 10], &[0xbb; 10]);
    }

    #[test]
    fn same_size_replacement_keeps_offsets() {
        let image = test_image(2048);
        let mut target = Cursor::new(vec![]);
        image.encode(&mut target).unwrap();

        let mut reader = Cursor::new(target.into_inner());
        let mut updated = BootImage::decode(
            &mut reader,
            Container {
                size: 12288,
                block_device: false,
            },
        )
        .unwrap();

        let mut payloads = PayloadSet::default();
        payloads.set(Region::Kernel, vec![0xdd; 5000]);
        updated.assemble(payloads, Some(&mut reader)).unwrap();

        // Nothing moved, so the ramdisk stays on disk untouched.
        assert!(!updated.payloads.contains(Region::Ramdisk));
        assert_eq!(updated.container.size, 12288);
    }

    #[test]
    fn page_size_change_reloads_everything() {
        let image = test_image(2048);
        let mut target = Cursor::new(vec![]);
        image.encode(&mut target).unwrap();

        let mut reader = Cursor::new(target.into_inner());
        let mut updated = BootImage::decode(
            &mut reader,
            Container {
                size: 12288,
                block_device: false,
            },
        )
        .unwrap();

        // A page size change shifts every region, even without replacements.
        updated.header.page_size = 4096;
        updated.assemble(PayloadSet::default(), Some(&mut reader)).unwrap();

        assert_eq!(
            updated.payloads.get(Region::Kernel),
            Some(vec![0xaa; 5000].as_slice()),
        );
        assert_eq!(
            updated.payloads.get(Region::Ramdisk),
            Some(vec![0xbb; 3000].as_slice()),
        );

        updated.fit_container().unwrap();
        assert_eq!(updated.container.size, (1 + 2 + 1) * 4096);

        let mut target = Cursor::new(vec![]);
        updated.encode(&mut target).unwrap();

        let buf = target.into_inner();
        assert_eq!(&buf[4096..4106], &[0xaa; 10]);
        assert_eq!(&buf[3 * 4096..3 * 4096 + 10], &[0xbb; 10]);
    }

    #[test]
    fn block_device_cannot_grow() {
        let mut image = test_image(2048);
        image.container = Container {
            size: 8192,
            block_device: true,
        };

        assert_matches!(
            image.fit_container(),
            Err(Error::ContainerTooSmall {
                required: 12288,
                available: 8192,
            })
        );
    }

    #[test]
    fn file_grows_to_fit() {
        let mut image = test_image(2048);
        image.container.size = 8192;

        image.fit_container().unwrap();
        assert_eq!(image.container.size, 12288);
    }

    #[test]
    fn invalid_image_writes_nothing() {
        let mut image = test_image(2048);
        image.header.kernel_size = 0;

        let mut target = Cursor::new(b"do not touch".to_vec());
        assert_matches!(
            image.encode(&mut target),
            Err(Error::Header(bootimage::Error::EmptyKernel))
        );
        assert_eq!(target.into_inner(), b"do not touch");
    }

    #[test]
    fn payload_mismatch_writes_nothing() {
        let mut image = test_image(2048);
        image.header.kernel_size = 4999;

        let mut target = Cursor::new(b"do not touch".to_vec());
        assert_matches!(
            image.encode(&mut target),
            Err(Error::PayloadSizeMismatch("kernel", 5000, 4999))
        );
        assert_eq!(target.into_inner(), b"do not touch");
    }

    #[test]
    fn info_dump_contents() {
        let mut image = test_image(2048);
        image.header.id = [0x00112233, 0, 0, 0, 0, 0, 0, 0x44556677];

        let text = image.to_string();

        assert!(text.contains("* image size = 12288 bytes"));
        assert!(text.contains("* header version = 0\n"));
        assert!(text.contains(
            "* id = 00112233 00000000 00000000 00000000 00000000 00000000 00000000 44556677\n",
        ));

        // An all-zero id is still printed.
        image.header.id = [0; 8];
        assert!(image.to_string().contains("* id = 00000000"));
    }

    #[test]
    fn oversized_container_is_preserved() {
        let mut image = test_image(2048);
        image.resize_container(0x8000);

        let mut target = Cursor::new(vec![]);
        image.encode(&mut target).unwrap();

        assert_eq!(target.into_inner().len(), 0x8000);
    }
}
