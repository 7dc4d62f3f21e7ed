// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt, io,
    sync::atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::image;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // clap always provides a possible value for unskipped variants.
        let value = self.to_possible_value().unwrap();

        f.write_str(value.get_name())
    }
}

impl LogLevel {
    fn to_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
pub enum Command {
    Info(image::InfoCli),
    Extract(image::ExtractCli),
    Update(image::UpdateCli),
    Create(image::CreateCli),
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Lowest log message severity to output.
    #[arg(long, global = true, value_name = "LEVEL", default_value_t)]
    pub log_level: LogLevel,
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(cli.log_level.to_filter())
        .init();
}

pub fn main(logging_initialized: &AtomicBool) -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli);
    logging_initialized.store(true, Ordering::SeqCst);

    match &cli.command {
        Command::Info(c) => image::info_subcommand(c),
        Command::Extract(c) => image::extract_subcommand(c),
        Command::Update(c) => image::update_subcommand(c),
        Command::Create(c) => image::create_subcommand(c),
    }
}
