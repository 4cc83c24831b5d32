// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Field decoding of the byte streams read from chip and request files.
//!
//! Fields are extracted by offset in the native byte order rather than by
//! casting the buffer to the kernel struct.

use crate::common::{Name, NAME_LEN_MAX};
use lazy_static::lazy_static;

/// The order of bytes within multi-byte integers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

lazy_static! {
    static ref NATIVE: ByteOrder = ByteOrder::probe();
}

impl ByteOrder {
    /// The byte order of the host, as determined on first use.
    #[inline]
    pub fn native() -> ByteOrder {
        *NATIVE
    }

    fn probe() -> ByteOrder {
        if u16::from_ne_bytes([1, 0]) == 1 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// Read a u32 starting at `offset`.
    ///
    /// Panics if the slice is too short, so callers check the length first.
    #[inline]
    pub fn read_u32(self, d: &[u8], offset: usize) -> u32 {
        let mut b = [0; 4];
        b.copy_from_slice(&d[offset..offset + 4]);
        match self {
            ByteOrder::Little => u32::from_le_bytes(b),
            ByteOrder::Big => u32::from_be_bytes(b),
        }
    }

    /// Read a u64 starting at `offset`.
    #[inline]
    pub fn read_u64(self, d: &[u8], offset: usize) -> u64 {
        let mut b = [0; 8];
        b.copy_from_slice(&d[offset..offset + 8]);
        match self {
            ByteOrder::Little => u64::from_le_bytes(b),
            ByteOrder::Big => u64::from_be_bytes(b),
        }
    }
}

/// Read a name field starting at `offset`.
#[inline]
pub(crate) fn read_name(d: &[u8], offset: usize) -> Name {
    let mut b = [0; NAME_LEN_MAX];
    b.copy_from_slice(&d[offset..offset + NAME_LEN_MAX]);
    Name::from_raw(b)
}
