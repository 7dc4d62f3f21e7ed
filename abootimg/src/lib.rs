// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

pub mod cli;
pub mod format;
pub mod stream;
pub mod util;
