// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

pub mod bootimage;
pub mod config;
pub mod image;
pub mod layout;
pub mod padding;
