// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io::{self, Write},
    num::ParseIntError,
};

use thiserror::Error;

use crate::{
    format::bootimage::{BOOT_ARGS_SIZE, BOOT_NAME_SIZE, BootHeader},
    util::{self, OutOfBoundsError},
};

/// Upper bound on accumulated `key=value` parameters per invocation.
pub const MAX_CONFIG_ARGS: usize = 4096;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration entry: {0:?}")]
    BadConfigEntry(String),
    #[error("Invalid numeric value for {key:?}: {value:?}")]
    InvalidNumber {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Kernel command line is too long: {0} > {1}")]
    CmdlineTooLong(usize, usize),
    #[error("Cannot change the size of a block device")]
    ImmutableBlockSize,
    #[error("{0} field is out of bounds")]
    IntOutOfBounds(&'static str, #[source] OutOfBoundsError),
    #[error("Too many configuration parameters: more than {MAX_CONFIG_ARGS}")]
    TooManyConfigParams,
    #[error("Failed to write configuration")]
    ConfigWrite(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Ordered accumulator for `key=value` parameters from config files and
/// command line flags. Later entries override earlier ones because they are
/// applied in order.
#[derive(Clone, Debug, Default)]
pub struct ConfigArgs {
    entries: Vec<String>,
}

impl ConfigArgs {
    pub fn push(&mut self, entry: impl Into<String>) -> Result<()> {
        if self.entries.len() >= MAX_CONFIG_ARGS {
            return Err(Error::TooManyConfigParams);
        }

        self.entries.push(entry.into());

        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.as_str())
    }
}

/// Parse a number the way boot configs conventionally write them: `0x`/`0X`
/// prefixes select hexadecimal, a leading `0` selects octal, and anything
/// else is decimal.
fn parse_number(key: &'static str, value: &str) -> Result<u64> {
    let result = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if value.len() > 1 && value.starts_with('0') {
        u64::from_str_radix(&value[1..], 8)
    } else {
        value.parse::<u64>()
    };

    result.map_err(|source| Error::InvalidNumber {
        key,
        value: value.to_owned(),
        source,
    })
}

fn parse_u32(key: &'static str, value: &str) -> Result<u32> {
    let n = parse_number(key, value)?;
    let n = util::check_bounds(n, 0, u64::from(u32::MAX))
        .map_err(|e| Error::IntOutOfBounds(key, e))?;

    Ok(n as u32)
}

/// Apply one `key=value` entry to the header. `on_block_device` gates the
/// keys that would resize the backing container. Returns the requested image
/// size when the entry was `bootsize`, since that value lives outside the
/// header itself.
pub fn apply_entry(
    header: &mut BootHeader,
    entry: &str,
    current_size: u64,
    on_block_device: bool,
) -> Result<Option<u64>> {
    let Some((key, value)) = entry.split_once('=') else {
        return Err(Error::BadConfigEntry(entry.to_owned()));
    };

    let key = key.trim();
    let value = value.trim();
    let mut new_size = None;

    match key {
        "cmdline" => {
            // The on-disk field must still hold a NUL terminator.
            if value.len() >= BOOT_ARGS_SIZE {
                return Err(Error::CmdlineTooLong(value.len(), BOOT_ARGS_SIZE - 1));
            }

            header.cmdline = value.to_owned();
        }
        "name" => {
            let mut name = value;
            // Truncate on a character boundary to stay valid UTF-8.
            while name.len() >= BOOT_NAME_SIZE {
                let mut end = name.len() - 1;
                while !name.is_char_boundary(end) {
                    end -= 1;
                }
                name = &name[..end];
            }

            header.name = name.to_owned();
        }
        "bootsize" => {
            let size = parse_number("bootsize", value)?;
            if on_block_device && size != current_size {
                return Err(Error::ImmutableBlockSize);
            }

            new_size = Some(size);
        }
        "pagesize" => header.page_size = parse_u32("pagesize", value)?,
        "kerneladdr" => header.kernel_addr = parse_u32("kerneladdr", value)?,
        "ramdiskaddr" => header.ramdisk_addr = parse_u32("ramdiskaddr", value)?,
        "secondaddr" => header.second_addr = parse_u32("secondaddr", value)?,
        "tagsaddr" => header.tags_addr = parse_u32("tagsaddr", value)?,
        "recoverydtobooffs" => {
            header.recovery_dtbo_offset = parse_number("recoverydtobooffs", value)?;
        }
        "dtbaddr" => header.dtb_addr = parse_number("dtbaddr", value)?,
        _ => return Err(Error::BadConfigEntry(entry.to_owned())),
    }

    Ok(new_size)
}

/// Apply accumulated entries in order and report the last requested image
/// size, if any.
pub fn apply_args(
    header: &mut BootHeader,
    args: &ConfigArgs,
    current_size: u64,
    on_block_device: bool,
) -> Result<Option<u64>> {
    let mut new_size = None;

    for entry in args.iter() {
        if let Some(size) = apply_entry(header, entry, current_size, on_block_device)? {
            new_size = Some(size);
        }
    }

    Ok(new_size)
}

/// Dump the header as a config file that [`apply_entry`] can read back.
/// Numeric values are always written in hexadecimal.
pub fn write_config(mut writer: impl Write, header: &BootHeader, image_size: u64) -> Result<()> {
    writeln!(writer, "bootsize = {image_size:#x}")?;
    writeln!(writer, "pagesize = {:#x}", header.page_size)?;
    writeln!(writer, "kerneladdr = {:#x}", header.kernel_addr)?;
    writeln!(writer, "ramdiskaddr = {:#x}", header.ramdisk_addr)?;
    writeln!(writer, "secondaddr = {:#x}", header.second_addr)?;
    writeln!(writer, "tagsaddr = {:#x}", header.tags_addr)?;
    writeln!(writer, "recoverydtobooffs = {:#x}", header.recovery_dtbo_offset)?;
    writeln!(writer, "dtbaddr = {:#x}", header.dtb_addr)?;
    writeln!(writer, "name = {}", header.name)?;
    writeln!(writer, "cmdline = {}", header.cmdline)?;

    Ok(())
}
