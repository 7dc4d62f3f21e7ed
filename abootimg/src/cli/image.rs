// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::{self, File, OpenOptions},
    io::{BufReader, Seek, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use crate::{
    format::{
        config::{self, ConfigArgs},
        image::{BootImage, Container, PayloadSet},
        layout::Region,
    },
    stream::{self, FileLen},
};

fn query_container(file: &File, path: &Path) -> Result<Container> {
    let block_device = stream::is_block_device(file)
        .with_context(|| format!("Failed to stat: {path:?}"))?;
    let size = file
        .file_len()
        .with_context(|| format!("Failed to query size: {path:?}"))?;

    Ok(Container { size, block_device })
}

fn read_image(file: &mut File, path: &Path) -> Result<BootImage> {
    let container = query_container(file, path)?;

    file.seek(SeekFrom::Start(0))
        .with_context(|| format!("Failed to seek: {path:?}"))?;

    let image = BootImage::decode(BufReader::new(&mut *file), container)
        .with_context(|| format!("Failed to read boot image: {path:?}"))?;
    image
        .validate()
        .with_context(|| format!("Not a valid boot image: {path:?}"))?;

    Ok(image)
}

fn load_config_args(config_path: Option<&Path>, params: &[String]) -> Result<ConfigArgs> {
    let mut args = ConfigArgs::default();

    if let Some(path) = config_path {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            args.push(line)
                .with_context(|| format!("Failed to queue config file entry: {path:?}"))?;
        }
    }

    for param in params {
        args.push(param.as_str())
            .context("Failed to queue config parameter")?;
    }

    Ok(args)
}

/// Apply config entries and load replacement payloads, then rebuild the
/// image so the header, the payloads, and the container size agree. The
/// shared tail of the update and create flows.
fn rebuild_image(
    image: &mut BootImage,
    args: &ConfigArgs,
    replacements: PayloadSet,
    original: Option<&mut File>,
) -> Result<()> {
    let requested_size = config::apply_args(
        &mut image.header,
        args,
        image.container.size,
        image.container.block_device,
    )
    .context("Failed to apply configuration")?;

    image
        .assemble(replacements, original.map(|f| f as &mut dyn stream::ReadSeek))
        .context("Failed to assemble payloads")?;

    image.header.promote_version();

    if let Some(size) = requested_size {
        // An explicit bootsize wins; validation rejects it if too small.
        image.resize_container(size);
    } else {
        image
            .fit_container()
            .context("Image does not fit the container")?;
    }

    Ok(())
}

fn read_replacements(
    kernel: Option<&Path>,
    ramdisk: Option<&Path>,
    second: Option<&Path>,
    recovery_dtbo: Option<&Path>,
    dtb: Option<&Path>,
) -> Result<PayloadSet> {
    let mut replacements = PayloadSet::default();
    let sources = [
        (Region::Kernel, kernel),
        (Region::Ramdisk, ramdisk),
        (Region::Second, second),
        (Region::RecoveryDtbo, recovery_dtbo),
        (Region::Dtb, dtb),
    ];

    for (region, path) in sources {
        let Some(path) = path else {
            continue;
        };

        let data =
            fs::read(path).with_context(|| format!("Failed to read payload: {path:?}"))?;

        debug!("Read {} bytes for the {} from {path:?}", data.len(), region.name());
        replacements.set(region, data);
    }

    Ok(replacements)
}

pub fn info_subcommand(cli: &InfoCli) -> Result<()> {
    let mut file = File::open(&cli.input)
        .with_context(|| format!("Failed to open for reading: {:?}", cli.input))?;
    let image = read_image(&mut file, &cli.input)?;

    let marker = if image.container.block_device {
        " [block device]"
    } else {
        ""
    };

    println!("\nAndroid Boot Image Info:\n");
    println!("* file name = {:?}{marker}\n", cli.input);
    print!("{image}");

    Ok(())
}

pub fn extract_subcommand(cli: &ExtractCli) -> Result<()> {
    let mut file = File::open(&cli.input)
        .with_context(|| format!("Failed to open for reading: {:?}", cli.input))?;
    let image = read_image(&mut file, &cli.input)?;

    info!("Writing boot image config in {:?}", cli.output_config);

    let mut config = vec![];
    config::write_config(&mut config, &image.header, image.container.size)
        .context("Failed to serialize config")?;
    fs::write(&cli.output_config, config)
        .with_context(|| format!("Failed to write config: {:?}", cli.output_config))?;

    let targets = [
        (Region::Kernel, &cli.output_kernel),
        (Region::Ramdisk, &cli.output_ramdisk),
        (Region::Second, &cli.output_second),
        (Region::RecoveryDtbo, &cli.output_recovery_dtbo),
        (Region::Dtb, &cli.output_dtb),
    ];

    for (region, path) in targets {
        if image.header.region_size(region) == 0 {
            continue;
        }

        info!("Extracting {} in {path:?}", region.name());

        let data = image
            .read_payload(&mut file, region)
            .with_context(|| format!("Failed to read {} payload", region.name()))?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write payload: {path:?}"))?;
    }

    Ok(())
}

pub fn update_subcommand(cli: &UpdateCli) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&cli.input)
        .with_context(|| format!("Failed to open for updating: {:?}", cli.input))?;
    let mut image = read_image(&mut file, &cli.input)?;

    let args = load_config_args(cli.config.as_deref(), &cli.param)?;
    let replacements = read_replacements(
        cli.kernel.as_deref(),
        cli.ramdisk.as_deref(),
        cli.second.as_deref(),
        cli.recovery_dtbo.as_deref(),
        cli.dtb.as_deref(),
    )?;

    rebuild_image(&mut image, &args, replacements, Some(&mut file))?;

    info!(
        "Writing boot image (version {}, {} bytes) in {:?}",
        image.header.header_version, image.container.size, cli.input,
    );

    image
        .encode(&mut file)
        .with_context(|| format!("Failed to write boot image: {:?}", cli.input))?;

    Ok(())
}

pub fn create_subcommand(cli: &CreateCli) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&cli.output)
        .with_context(|| format!("Failed to open for writing: {:?}", cli.output))?;
    let container = query_container(&file, &cli.output)?;

    // Regular files are rebuilt from scratch, so stale bytes from a previous
    // image must not survive. Only a block device keeps its fixed capacity as
    // a constraint.
    if !container.block_device {
        file.set_len(0)
            .with_context(|| format!("Failed to truncate: {:?}", cli.output))?;
    }
    let mut image = BootImage::create(Container {
        size: if container.block_device {
            container.size
        } else {
            0
        },
        block_device: container.block_device,
    });

    let args = load_config_args(cli.config.as_deref(), &cli.param)?;
    let replacements = read_replacements(
        Some(&cli.kernel),
        Some(&cli.ramdisk),
        cli.second.as_deref(),
        cli.recovery_dtbo.as_deref(),
        cli.dtb.as_deref(),
    )?;

    rebuild_image(&mut image, &args, replacements, None)?;

    info!(
        "Writing boot image (version {}, {} bytes) in {:?}",
        image.header.header_version, image.container.size, cli.output,
    );

    image
        .encode(&mut file)
        .with_context(|| format!("Failed to write boot image: {:?}", cli.output))?;

    Ok(())
}

/// Display boot image header information.
#[derive(Debug, Parser)]
pub struct InfoCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,
}

/// Extract the config and payloads from a boot image.
#[derive(Debug, Parser)]
pub struct ExtractCli {
    /// Path to input boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to output config file.
    #[arg(long, value_name = "FILE", value_parser, default_value = "bootimg.cfg")]
    output_config: PathBuf,

    /// Path to output kernel image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "zImage")]
    output_kernel: PathBuf,

    /// Path to output ramdisk image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "initrd.img")]
    output_ramdisk: PathBuf,

    /// Path to output second stage bootloader image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "stage2.img")]
    output_second: PathBuf,

    /// Path to output recovery dtbo/acpio image.
    #[arg(
        long,
        value_name = "FILE",
        value_parser,
        default_value = "recovery_dtbo.img"
    )]
    output_recovery_dtbo: PathBuf,

    /// Path to output device tree blob image.
    #[arg(long, value_name = "FILE", value_parser, default_value = "aboot.dtb")]
    output_dtb: PathBuf,
}

/// Update a boot image in place.
#[derive(Debug, Parser)]
pub struct UpdateCli {
    /// Path to boot image to update.
    #[arg(short, long, value_name = "FILE", value_parser)]
    input: PathBuf,

    /// Path to config file with `key = value` entries to apply.
    #[arg(short = 'f', long, value_name = "FILE", value_parser)]
    config: Option<PathBuf>,

    /// Apply a single `key=value` config entry. Can be repeated.
    #[arg(short = 'c', long, value_name = "KEY=VALUE")]
    param: Vec<String>,

    /// Path to replacement kernel image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    kernel: Option<PathBuf>,

    /// Path to replacement ramdisk image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    ramdisk: Option<PathBuf>,

    /// Path to replacement second stage bootloader image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    second: Option<PathBuf>,

    /// Path to replacement recovery dtbo/acpio image.
    #[arg(long, value_name = "FILE", value_parser)]
    recovery_dtbo: Option<PathBuf>,

    /// Path to replacement device tree blob image.
    #[arg(long, value_name = "FILE", value_parser)]
    dtb: Option<PathBuf>,
}

/// Create a boot image from scratch.
#[derive(Debug, Parser)]
pub struct CreateCli {
    /// Path to output boot image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    output: PathBuf,

    /// Path to config file with `key = value` entries to apply.
    #[arg(short = 'f', long, value_name = "FILE", value_parser)]
    config: Option<PathBuf>,

    /// Apply a single `key=value` config entry. Can be repeated.
    #[arg(short = 'c', long, value_name = "KEY=VALUE")]
    param: Vec<String>,

    /// Path to input kernel image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    kernel: PathBuf,

    /// Path to input ramdisk image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    ramdisk: PathBuf,

    /// Path to input second stage bootloader image.
    #[arg(short, long, value_name = "FILE", value_parser)]
    second: Option<PathBuf>,

    /// Path to input recovery dtbo/acpio image.
    #[arg(long, value_name = "FILE", value_parser)]
    recovery_dtbo: Option<PathBuf>,

    /// Path to input device tree blob image.
    #[arg(long, value_name = "FILE", value_parser)]
    dtb: Option<PathBuf>,
}
