// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
};

use crate::util;

/// This is only needed because `dyn Read + Seek` is not a valid construct in
/// Rust yet.
pub trait ReadSeek: Read + Seek {
    // https://github.com/rust-lang/rust/issues/145752
    fn issue_145752(&self) {}
}

impl<R: Read + Seek> ReadSeek for R {}

/// This is only needed because `dyn Write + Seek` is not a valid construct in
/// Rust yet.
pub trait WriteSeek: Write + Seek {
    // https://github.com/rust-lang/rust/issues/145752
    fn issue_145752(&self) {}
}

impl<W: Write + Seek> WriteSeek for W {}

/// Extensions for writers to easily write zeros (eg. for padding).
pub trait WriteZerosExt {
    fn write_zeros(&mut self, size: u64) -> io::Result<u64>;

    fn write_zeros_exact(&mut self, size: u64) -> io::Result<()> {
        let n = self.write_zeros(size)?;
        if n != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("Expected to write {size} bytes, but reached EOF after {n} bytes"),
            ));
        }
        Ok(())
    }
}

impl<W: Write> WriteZerosExt for W {
    fn write_zeros(&mut self, size: u64) -> io::Result<u64> {
        // We don't use std::io::copy() on std::io::repeat(0) because it fails
        // if the writer hits EOF before all data is written.
        let mut written = 0;

        while written < size {
            let to_write = (size - written).min(util::ZEROS.len() as u64) as usize;
            let n = self.write(&util::ZEROS[..to_write])?;
            written += n as u64;

            if n < to_write {
                break;
            }
        }

        Ok(written)
    }
}

/// Extensions for readers to read fixed-size buffers.
pub trait ReadFixedSizeExt {
    /// Read fixed-size array.
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]>;

    /// Read fixed-sized [`Vec`].
    fn read_vec_exact(&mut self, size: usize) -> io::Result<Vec<u8>>;
}

impl<R: Read> ReadFixedSizeExt for R {
    fn read_array_exact<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_vec_exact(&mut self, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Check whether a file handle refers to a block device. Always false on
/// platforms without a block device concept.
pub fn is_block_device(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;

        Ok(file.metadata()?.file_type().is_block_device())
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(false)
    }
}

/// Extensions for file-like types to query the total size of the backing
/// target. Regular files report their metadata length. Block devices report
/// zero there, so their capacity is discovered by seeking to the end instead.
/// No guarantees are made about the file position afterwards.
pub trait FileLen {
    fn file_len(&self) -> io::Result<u64>;
}

impl FileLen for File {
    fn file_len(&self) -> io::Result<u64> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;

            let metadata = self.metadata()?;
            if metadata.file_type().is_block_device() {
                let mut file = self;
                return file.seek(SeekFrom::End(0));
            }

            Ok(metadata.len())
        }
        #[cfg(not(unix))]
        {
            Ok(self.metadata()?.len())
        }
    }
}

/// Extensions for writable targets whose logical size can be set after the
/// data has been written.
pub trait Truncate {
    fn truncate(&mut self, size: u64) -> io::Result<()>;
}

impl Truncate for File {
    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.set_len(size)
    }
}

impl Truncate for io::Cursor<Vec<u8>> {
    fn truncate(&mut self, size: u64) -> io::Result<()> {
        let size = usize::try_from(size)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Size too large"))?;
        self.get_mut().resize(size, 0);
        Ok(())
    }
}

impl<T: Truncate + ?Sized> Truncate for &mut T {
    fn truncate(&mut self, size: u64) -> io::Result<()> {
        (**self).truncate(size)
    }
}
