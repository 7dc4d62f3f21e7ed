// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::io::Cursor;

use abootimg::format::bootimage::{self, BOOT_MAGIC, BootHeader};
use assert_matches::assert_matches;

fn repeat(s: &str, max_len: usize) -> String {
    assert!(!s.is_empty());

    let mut result = s.repeat(max_len / s.len());
    result.push_str(&s[..max_len % s.len()]);

    result
}

fn round_trip(header: &BootHeader) -> Vec<u8> {
    let mut writer = Cursor::new(Vec::new());
    header.to_writer(&mut writer).unwrap();
    let data = writer.into_inner();

    assert_eq!(
        data.len(),
        bootimage::header_size_for(header.header_version) as usize,
    );

    let decoded = BootHeader::from_reader(Cursor::new(data.clone())).unwrap();
    assert_eq!(&decoded, header);

    data
}

fn base_header() -> BootHeader {
    BootHeader {
        kernel_size: 0x1000,
        kernel_addr: 0x01234567,
        ramdisk_size: 0x2000,
        ramdisk_addr: 0x89abcdef,
        second_size: 0x3000,
        second_addr: 0x02468ace,
        tags_addr: 0x13579bdf,
        page_size: 4096,
        os_version: 0x76543210,
        name: repeat("Name", 16),
        cmdline: repeat("Cmdline", 512),
        id: [
            0x00112233, 0x44556677, 0x8899aabb, 0xccddeeff, 0xffeeddcc, 0xbbaa9988, 0x77665544,
            0x33221100,
        ],
        extra_cmdline: repeat("ExtraCmdline", 1024),
        ..Default::default()
    }
}

#[test]
fn round_trip_v0() {
    let header = base_header();
    let data = round_trip(&header);

    assert_eq!(&data[..8], BOOT_MAGIC.as_slice());
    assert_eq!(&data[8..12], 0x1000u32.to_le_bytes().as_slice());
    assert_eq!(&data[36..40], 4096u32.to_le_bytes().as_slice());
    assert_eq!(&data[40..44], 0u32.to_le_bytes().as_slice());
}

#[test]
fn round_trip_v1() {
    let mut header = base_header();
    header.header_version = 1;
    header.header_size = bootimage::header_size_for(1);
    header.recovery_dtbo_size = 0x4000;
    header.recovery_dtbo_offset = 0x0123456789abcdef;

    let data = round_trip(&header);

    // The v1 extras start right after the v0 fields.
    assert_eq!(&data[1632..1636], 0x4000u32.to_le_bytes().as_slice());
    assert_eq!(
        &data[1636..1644],
        0x0123456789abcdefu64.to_le_bytes().as_slice(),
    );
    assert_eq!(&data[1644..1648], 1648u32.to_le_bytes().as_slice());
}

#[test]
fn round_trip_v2() {
    let mut header = base_header();
    header.header_version = 2;
    header.header_size = bootimage::header_size_for(2);
    header.recovery_dtbo_size = 0x4000;
    header.recovery_dtbo_offset = 0x0123456789abcdef;
    header.dtb_size = 0x5000;
    header.dtb_addr = 0xfedcba9876543210;

    let data = round_trip(&header);

    assert_eq!(&data[1644..1648], 1660u32.to_le_bytes().as_slice());
    assert_eq!(&data[1648..1652], 0x5000u32.to_le_bytes().as_slice());
    assert_eq!(
        &data[1652..1660],
        0xfedcba9876543210u64.to_le_bytes().as_slice(),
    );
}

#[test]
fn v0_serialization_drops_extra_fields() {
    let mut header = base_header();
    header.recovery_dtbo_size = 0x4000;
    header.dtb_size = 0x5000;

    let mut writer = Cursor::new(Vec::new());
    header.to_writer(&mut writer).unwrap();

    assert_eq!(
        writer.into_inner().len(),
        bootimage::header_size_for(0) as usize,
    );
}

#[test]
fn bad_magic_is_rejected_by_validation_only() {
    let mut header = base_header();
    header.magic = *b"IMNOBOOT";

    let data = {
        let mut writer = Cursor::new(Vec::new());
        header.to_writer(&mut writer).unwrap();
        writer.into_inner()
    };

    // Decoding is permissive so callers can inspect broken images.
    let decoded = BootHeader::from_reader(Cursor::new(data)).unwrap();
    assert_eq!(decoded.magic, *b"IMNOBOOT");

    assert_matches!(
        decoded.validate(u64::MAX),
        Err(bootimage::Error::BadMagic(_))
    );
}

#[test]
fn future_version_is_rejected() {
    let mut header = base_header();
    header.header_version = 3;
    header.header_size = bootimage::header_size_for(3);

    let data = {
        let mut writer = Cursor::new(Vec::new());
        header.to_writer(&mut writer).unwrap();
        writer.into_inner()
    };

    let decoded = BootHeader::from_reader(Cursor::new(data)).unwrap();

    assert_matches!(
        decoded.validate(u64::MAX),
        Err(bootimage::Error::UnsupportedVersion(3))
    );
}

#[test]
fn overlong_strings_fail_serialization() {
    let mut header = base_header();
    header.name = repeat("Name", 17);

    assert_matches!(
        header.to_writer(Cursor::new(Vec::new())),
        Err(bootimage::Error::StringTooLong("name", 16, _))
    );
}
