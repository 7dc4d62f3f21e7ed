// SPDX-FileCopyrightText: 2026 The abootimg-rs developers
// SPDX-License-Identifier: GPL-3.0-only

use std::fmt;

use num_traits::PrimInt;
use thiserror::Error;

pub const ZEROS: [u8; 16384] = [0u8; 16384];

/// A small wrapper to format a number as a size in bytes.
#[derive(Clone, Copy)]
pub struct NumBytes<T: PrimInt>(pub T);

impl<T: PrimInt + fmt::Debug> fmt::Debug for NumBytes<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == T::one() {
            write!(f, "<{:?} byte>", self.0)
        } else {
            write!(f, "<{:?} bytes>", self.0)
        }
    }
}

#[derive(Clone, Copy, Debug, Error)]
#[error("Value {value} is not within {min}..={max}")]
pub struct OutOfBoundsError {
    pub value: u64,
    pub min: u64,
    pub max: u64,
}

/// Check that a value lies within an inclusive range, returning it unchanged
/// if it does.
pub fn check_bounds(value: u64, min: u64, max: u64) -> Result<u64, OutOfBoundsError> {
    if value < min || value > max {
        return Err(OutOfBoundsError { value, min, max });
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        assert_eq!(check_bounds(0, 0, u64::from(u32::MAX)).unwrap(), 0);
        assert_eq!(
            check_bounds(u64::from(u32::MAX), 0, u64::from(u32::MAX)).unwrap(),
            u64::from(u32::MAX),
        );
        assert!(check_bounds(u64::from(u32::MAX) + 1, 0, u64::from(u32::MAX)).is_err());
    }
}
