// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A thin but safe Rust layer around the Linux GPIO uAPI.
//!
//! Both ABI versions are always available. The ioctl request codes are
//! computed from the struct layouts on first use, and event streams read
//! from chip and request files are decoded field by field in the host byte
//! order.

mod bitmask;
pub mod codec;
pub(crate) mod common;
pub mod ioctl;

pub use bitmask::{Bitmask, Iter as BitmaskIter};
pub use common::{
    get_chip_info, has_event, read_event, unwatch_line_info, wait_event, ChipInfo, Errno, Error,
    LineEdgeEventKind, LineInfoChangeKind, Name, Offset, Offsets, Result, UnderReadError,
    ValidationError, NAME_LEN_MAX, NUM_LINES_MAX,
};

/// This module implements GPIO ABI v1 which was released in Linux v4.8.
///
/// This ABI version is deprecated.
///
/// ABI v2 adds features and overcomes a number of bugs and limitations present in v1.
/// Use ABI v2 instead where possible.
pub mod v1;

/// This module implements GPIO ABI v2 which is the current version of the ABI,
/// released in Linux v5.10.
pub mod v2;
