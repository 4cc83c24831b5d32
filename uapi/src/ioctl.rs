// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! GPIO ioctl request codes, synthesised from the struct sizes on first use.

use crate::{v1, v2, Offset};
use lazy_static::lazy_static;
use std::mem::size_of;

/// The ioctl type reserved for GPIO.
pub const IOCTL_MAGIC: u8 = 0xB4;

/// The bit field layout of an ioctl request code.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Layout {
    pub nr_bits: u32,
    pub type_bits: u32,
    pub size_bits: u32,
    pub dir_bits: u32,
    pub write: u64,
    pub read: u64,
}

impl Layout {
    /// The layout used by the host architecture.
    #[cfg(not(any(
        target_arch = "mips",
        target_arch = "mips32r6",
        target_arch = "mips64",
        target_arch = "mips64r6",
        target_arch = "powerpc",
        target_arch = "powerpc64",
        target_arch = "sparc",
        target_arch = "sparc64"
    )))]
    pub const NATIVE: Layout = Layout::GENERIC;

    /// The layout used by the host architecture.
    #[cfg(any(
        target_arch = "mips",
        target_arch = "mips32r6",
        target_arch = "mips64",
        target_arch = "mips64r6",
        target_arch = "powerpc",
        target_arch = "powerpc64",
        target_arch = "sparc",
        target_arch = "sparc64"
    ))]
    pub const NATIVE: Layout = Layout::LEGACY;

    /// The layout used by most architectures.
    pub const GENERIC: Layout = Layout {
        nr_bits: 8,
        type_bits: 8,
        size_bits: 14,
        dir_bits: 2,
        write: 1,
        read: 2,
    };

    /// The layout used by mips, powerpc and sparc.
    pub const LEGACY: Layout = Layout {
        nr_bits: 8,
        type_bits: 8,
        size_bits: 13,
        dir_bits: 3,
        write: 4,
        read: 2,
    };

    #[inline]
    fn type_shift(&self) -> u32 {
        self.nr_bits
    }

    #[inline]
    fn size_shift(&self) -> u32 {
        self.type_shift() + self.type_bits
    }

    #[inline]
    fn dir_shift(&self) -> u32 {
        self.size_shift() + self.size_bits
    }

    /// Build a request code from its fields.
    pub fn code(&self, dir: u64, nr: u8, size: usize) -> u64 {
        debug_assert!((size as u64) < (1 << self.size_bits));
        (dir << self.dir_shift())
            | ((size as u64) << self.size_shift())
            | ((IOCTL_MAGIC as u64) << self.type_shift())
            | nr as u64
    }

    /// A code for an ioctl that only reads from the kernel.
    #[inline]
    pub fn ior(&self, nr: u8, size: usize) -> u64 {
        self.code(self.read, nr, size)
    }

    /// A code for an ioctl that both writes to and reads from the kernel.
    #[inline]
    pub fn iowr(&self, nr: u8, size: usize) -> u64 {
        self.code(self.read | self.write, nr, size)
    }
}

#[repr(u8)]
enum Nr {
    GetChipInfo = 1,
    V1GetLineInfo = 2,
    V1GetLineHandle = 3,
    V1GetLineEvent = 4,
    V2GetLineInfo = 5,
    V2WatchLineInfo = 6,
    V2GetLine = 7,
    V1GetLineValues = 8,
    V1SetLineValues = 9,
    V1SetConfig = 0xA,
    V1WatchLineInfo = 0xB,
    UnwatchLineInfo = 0xC,
    V2SetLineConfig = 0xD,
    V2GetLineValues = 0xE,
    V2SetLineValues = 0xF,
}

/// The request codes for every GPIO ioctl.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Table {
    pub get_chip_info: u64,
    pub unwatch_line_info: u64,
    pub v1_get_line_info: u64,
    pub v1_get_line_handle: u64,
    pub v1_get_line_event: u64,
    pub v1_get_line_values: u64,
    pub v1_set_line_values: u64,
    pub v1_set_config: u64,
    pub v1_watch_line_info: u64,
    pub v2_get_line_info: u64,
    pub v2_watch_line_info: u64,
    pub v2_get_line: u64,
    pub v2_set_line_config: u64,
    pub v2_get_line_values: u64,
    pub v2_set_line_values: u64,
}

impl Table {
    /// Build the table for the given layout.
    pub fn new(l: &Layout) -> Table {
        Table {
            get_chip_info: l.ior(Nr::GetChipInfo as u8, size_of::<crate::ChipInfo>()),
            unwatch_line_info: l.iowr(Nr::UnwatchLineInfo as u8, size_of::<Offset>()),
            v1_get_line_info: l.iowr(Nr::V1GetLineInfo as u8, size_of::<v1::LineInfo>()),
            v1_get_line_handle: l.iowr(
                Nr::V1GetLineHandle as u8,
                size_of::<v1::HandleRequest>(),
            ),
            v1_get_line_event: l.iowr(Nr::V1GetLineEvent as u8, size_of::<v1::EventRequest>()),
            v1_get_line_values: l.iowr(Nr::V1GetLineValues as u8, size_of::<v1::LineValues>()),
            v1_set_line_values: l.iowr(Nr::V1SetLineValues as u8, size_of::<v1::LineValues>()),
            v1_set_config: l.iowr(Nr::V1SetConfig as u8, size_of::<v1::HandleConfig>()),
            v1_watch_line_info: l.iowr(Nr::V1WatchLineInfo as u8, size_of::<v1::LineInfo>()),
            v2_get_line_info: l.iowr(Nr::V2GetLineInfo as u8, size_of::<v2::LineInfo>()),
            v2_watch_line_info: l.iowr(Nr::V2WatchLineInfo as u8, size_of::<v2::LineInfo>()),
            v2_get_line: l.iowr(Nr::V2GetLine as u8, size_of::<v2::LineRequest>()),
            v2_set_line_config: l.iowr(Nr::V2SetLineConfig as u8, size_of::<v2::LineConfig>()),
            v2_get_line_values: l.iowr(Nr::V2GetLineValues as u8, size_of::<v2::LineValues>()),
            v2_set_line_values: l.iowr(Nr::V2SetLineValues as u8, size_of::<v2::LineValues>()),
        }
    }
}

lazy_static! {
    static ref TABLE: Table = Table::new(&Layout::NATIVE);
}

/// The request codes for the host architecture.
#[inline]
pub fn table() -> &'static Table {
    &TABLE
}
