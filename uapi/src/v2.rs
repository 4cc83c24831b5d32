// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bitflags::bitflags;
use std::fmt;
use std::fs::File;
use std::os::unix::prelude::{AsRawFd, FromRawFd};
use std::time::Duration;

use crate::codec::{read_name, ByteOrder};
use crate::common::{check_size, ValidationResult};
use crate::ioctl;

// common to ABI v1 and v2.
pub use crate::bitmask::Bitmask;
pub use crate::common::{
    get_chip_info, has_event, read_event, unwatch_line_info, wait_event, ChipInfo, Error,
    LineEdgeEventKind, LineInfoChangeKind, Name, Offset, Offsets, Padding, Result,
    UnderReadError, ValidationError,
};

bitflags! {
    /// Flags indicating the configuration of a line.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct LineFlags: u64 {
        /// The line is in use and is not available for request.
        const USED = 1;

        /// The line active state corresponds to a physical low.
        const ACTIVE_LOW = 2;

        /// The line is an input.
        const INPUT = 4;

        /// The line is an output.
        const OUTPUT = 8;

        /// The line detects rising (*inactive* to *active*) edges.
        const EDGE_RISING = 16;

        /// The line detects falling (*active* to *inactive*) edges.
        const EDGE_FALLING = 32;

        /// The line is an open drain output.
        const OPEN_DRAIN = 64;

        /// The line is an open source output.
        const OPEN_SOURCE = 128;

        /// The line has pull-up bias enabled.
        const BIAS_PULL_UP = 256;

        /// The line has pull-down bias enabled.
        const BIAS_PULL_DOWN = 512;

        /// The line has bias disabled.
        const BIAS_DISABLED = 1024;

        /// The line events contain **CLOCK_REALTIME** timestamps.
        const EVENT_CLOCK_REALTIME = 2048;

        /// The line events contain **HTE** timestamps.
        const EVENT_CLOCK_HTE = 4096;
    }
}

/// Values of GPIO lines.
///
/// Bits in the bitmasks correspond to the index into [`LineRequest.offsets`].
/// The first requested line, `offsets[0]`, is bit 0.
///
/// [`LineRequest.offsets`]: struct@LineRequest
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineValues {
    /// The value of the lines, set to 1 for *active* and 0 for *inactive*.
    pub bits: Bitmask,

    /// The lines in a request to access, set to 1 to access and 0 to ignore.
    pub mask: Bitmask,
}

impl LineValues {
    /// Create values from a slice.
    ///
    /// The values are in the same order as [`LineRequest.offsets`].
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    pub fn from_slice(s: &[bool]) -> Self {
        let mut lv: LineValues = Default::default();
        for (idx, val) in s.iter().take(Bitmask::WIDTH).enumerate() {
            lv.set(idx, *val);
        }
        lv
    }

    /// Return the value of a line.
    ///
    /// Returns None if the line of interest is not set in the mask.
    ///
    /// * `idx` - The index into the [`LineRequest.offsets`] for the line of interest.
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    #[inline]
    pub fn get(&self, idx: usize) -> Option<bool> {
        if !self.mask.get(idx) {
            return None;
        }
        Some(self.bits.get(idx))
    }

    /// Set the value of a line, and add it to the mask.
    ///
    /// * `idx` - The index into the [`LineRequest.offsets`] for the line of interest.
    /// * `active` - The logical state of the line to be set.
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    #[inline]
    pub fn set(&mut self, idx: usize, active: bool) {
        self.mask.set(idx, true);
        self.bits.set(idx, active);
    }

    /// Clear the mask bit for a line.
    ///
    /// The line will be ignored in subsequent calls to [`get_line_values`] and
    /// [`set_line_values`].
    #[inline]
    pub fn unset_mask(&mut self, idx: usize) {
        self.mask.clear(idx);
    }
}

/// Read values of requested lines.
///
/// Only lines selected by `lv.mask` are read.
///
/// * `lf` - The request file returned by [`get_line`].
/// * `lv` - The line values to be populated.
#[inline]
pub fn get_line_values(lf: &File, lv: &mut LineValues) -> Result<()> {
    // SAFETY: returned struct contains raw integers that are safe to decode.
    match unsafe { libc::ioctl(lf.as_raw_fd(), ioctl::table().v2_get_line_values as _, lv) } {
        0 => Ok(()),
        _ => Err(Error::from_errno()),
    }
}

/// Set values of requested output lines.
///
/// Note that requesting a set on an input line is an error.
///
/// * `lf` - The request file returned by [`get_line`].
/// * `lv` - The line values to be set.
#[inline]
pub fn set_line_values(lf: &File, lv: &LineValues) -> Result<()> {
    // SAFETY: lv is not modified.
    match unsafe { libc::ioctl(lf.as_raw_fd(), ioctl::table().v2_set_line_values as _, lv) } {
        0 => Ok(()),
        _ => Err(Error::from_errno()),
    }
}

/// An identifier for which field of the [`LineAttributeValueUnion`] is in use.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LineAttributeKind {
    /// The attribute is *inactive* - no fields are in use.
    #[default]
    Unused = 0,

    /// The flags field is in use.
    Flags = 1,

    /// The values field is in use.
    Values = 2,

    /// The debounce_period_us field is in use.
    Debounce = 3,
}

impl TryFrom<u32> for LineAttributeKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineAttributeKind::*;
        Ok(match v {
            x if x == Unused as u32 => Unused,
            x if x == Flags as u32 => Flags,
            x if x == Values as u32 => Values,
            x if x == Debounce as u32 => Debounce,
            x => return Err(format!("invalid value: {x}")),
        })
    }
}

/// A configurable attribute of a line.
///
/// The `id` is held raw as the kernel may return ids unknown to this crate.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct LineAttribute {
    /// The type of attribute stored in `value`, a [`LineAttributeKind`].
    pub id: u32,

    /// Reserved for future use and must be zero filled.
    #[doc(hidden)]
    pub padding: Padding<1>,

    /// The attribute value.
    pub value: LineAttributeValueUnion,
}

impl LineAttribute {
    /// The kind of the attribute.
    #[inline]
    pub fn kind(&self) -> std::result::Result<LineAttributeKind, String> {
        LineAttributeKind::try_from(self.id)
    }

    /// Set the attribute as debounce period.
    pub fn set_debounce_period_us(&mut self, debounce_period_us: u32) {
        self.id = LineAttributeKind::Debounce as u32;
        self.value.debounce_period_us = debounce_period_us;
    }

    /// Set the attribute as flags.
    pub fn set_flags(&mut self, flags: LineFlags) {
        self.id = LineAttributeKind::Flags as u32;
        self.value.flags = flags;
    }

    /// Set the attribute as output values.
    pub fn set_values(&mut self, values: Bitmask) {
        self.id = LineAttributeKind::Values as u32;
        self.value.values = values;
    }

    /// Get the contained value.
    ///
    /// Converts the unsafe kind/union into a safe enum.
    /// Returns None for unused or unrecognised attributes.
    pub fn to_value(&self) -> Option<LineAttributeValue> {
        // SAFETY: checks kind before accessing union
        unsafe {
            Some(match self.kind().ok()? {
                LineAttributeKind::Unused => return None,
                LineAttributeKind::Flags => LineAttributeValue::Flags(self.value.flags),
                LineAttributeKind::Values => LineAttributeValue::Values(self.value.values),
                LineAttributeKind::Debounce => LineAttributeValue::DebouncePeriod(
                    Duration::from_micros(self.value.debounce_period_us as u64),
                ),
            })
        }
    }

    fn decode(d: &[u8], bo: ByteOrder) -> LineAttribute {
        let mut attr = LineAttribute {
            id: bo.read_u32(d, 0),
            ..Default::default()
        };
        if attr.id == LineAttributeKind::Debounce as u32 {
            attr.value.debounce_period_us = bo.read_u32(d, 8);
        } else {
            attr.value.values = Bitmask::new(bo.read_u64(d, 8));
        }
        attr
    }
}

impl fmt::Debug for LineAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_value() {
            None if self.id == 0 => write!(f, "unused"),
            None => write!(f, "unknown id: {}", self.id),
            Some(LineAttributeValue::Flags(flags)) => write!(f, "flags: {:?}", flags),
            Some(LineAttributeValue::Values(values)) => {
                write!(f, "values: {:016x}", values.bits())
            }
            Some(LineAttributeValue::DebouncePeriod(period)) => {
                write!(f, "debounce_period_us: {}", period.as_micros())
            }
        }
    }
}

impl PartialEq for LineAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.to_value() == other.to_value()
    }
}

impl Eq for LineAttribute {}

/// The value of a particular line attribute.
#[repr(C)]
#[derive(Clone, Copy)]
pub union LineAttributeValueUnion {
    /// The line configuration flags.
    pub flags: LineFlags,

    /// The values to which the lines will be set, with each bit number
    ///  corresponding to the index into [`LineRequest.offsets`].
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    pub values: Bitmask,

    /// The debounce period, in microseconds.
    pub debounce_period_us: u32,
}

impl Default for LineAttributeValueUnion {
    fn default() -> Self {
        LineAttributeValueUnion {
            values: Bitmask::default(),
        }
    }
}

/// The attribute value contained within a [`LineAttribute`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineAttributeValue {
    /// The debounce period attribute as a Duration.
    DebouncePeriod(Duration),

    /// The configuration flags.
    Flags(LineFlags),

    /// The line values.
    Values(Bitmask),
}

/// A configuration attribute associated with one or more of the requested lines.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineConfigAttribute {
    /// The configurable attribute.
    pub attr: LineAttribute,

    /// The lines to which the attribute applies, with each bit number corresponding
    /// to the index into [`LineRequest.offsets`].
    ///
    /// [`LineRequest.offsets`]: struct@LineRequest
    pub mask: Bitmask,
}

/// The set of additional configuration attributes for a line request.
///
/// [`LineConfig.num_attrs`] specifies the number of entries in use.
///
/// Any attribute should only be associated with a particular line once.
/// If an attribute is associated with a line multiple times then the
/// first occurrence (i.e. lowest index) has precedence.
///
/// [`LineConfig.num_attrs`]: struct@LineConfig
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineConfigAttributes(pub [LineConfigAttribute; NUM_ATTRS_MAX]);

/// Configuration for a set of requested lines.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineConfig {
    /// Flags for the GPIO lines.  This is the default for all requested lines but
    /// may be overridden for particular lines using `attrs`.
    pub flags: LineFlags,

    /// The number of attributes active in `attrs`.
    pub num_attrs: u32,

    /// Reserved for future use and must be zero filled.
    #[doc(hidden)]
    pub padding: Padding<5>,

    /// The configuration attributes associated with the requested lines.
    ///
    /// The number of active attributes in the array is specified by `num_attrs`.
    pub attrs: LineConfigAttributes,
}

impl LineConfig {
    /// The nth attribute in the attrs
    #[inline]
    pub fn attr(&self, idx: usize) -> &LineConfigAttribute {
        &self.attrs.0[idx]
    }

    /// The nth attribute in the attrs
    #[inline]
    pub fn attr_mut(&mut self, idx: usize) -> &mut LineConfigAttribute {
        &mut self.attrs.0[idx]
    }

    /// Add a debounce attribute to the config.
    ///
    /// Panics if the attrs are already full.
    pub fn add_debounce(&mut self, period_us: u32, mask: Bitmask) {
        let lca = self.next_attr();
        lca.mask = mask;
        lca.attr.set_debounce_period_us(period_us);
    }

    /// Add a flags attribute to the config.
    ///
    /// Panics if the attrs are already full.
    pub fn add_flags(&mut self, lf: LineFlags, mask: Bitmask) {
        let lca = self.next_attr();
        lca.mask = mask;
        lca.attr.set_flags(lf);
    }

    /// Add a line values attribute to the config.
    ///
    /// Panics if the attrs are already full.
    pub fn add_values(&mut self, values: &LineValues) {
        let lca = self.next_attr();
        lca.mask = values.mask;
        lca.attr.set_values(values.bits);
    }

    fn next_attr(&mut self) -> &mut LineConfigAttribute {
        let idx = self.num_attrs as usize;
        self.num_attrs += 1;
        &mut self.attrs.0[idx]
    }
}

/// Update the configuration of an existing line request.
///
/// * `lf` - The request file returned by [`get_line`].
/// * `lc` - The configuration to be applied.
#[inline]
pub fn set_line_config(lf: &File, mut lc: LineConfig) -> Result<()> {
    // SAFETY: lc is consumed.
    unsafe {
        match libc::ioctl(
            lf.as_raw_fd(),
            ioctl::table().v2_set_line_config as _,
            &mut lc,
        ) {
            0 => Ok(()),
            _ => Err(Error::from_errno()),
        }
    }
}

/// Information about a request for GPIO lines.
#[repr(C)]
#[derive(Clone, Debug, Default)]
pub struct LineRequest {
    /// An array of requested lines, identified by offset on the associated GPIO chip.
    pub offsets: Offsets,

    /// The requested consumer label for the selected GPIO lines such as
    /// "*my-bitbanged-relay*".
    pub consumer: Name,

    /// The requested configuration for the lines.
    pub config: LineConfig,

    /// The number of lines requested in this request.
    /// i.e. the number of valid elements in `offsets`.
    ///
    /// Set to 1 to request a single line.
    pub num_lines: u32,

    /// A suggested minimum number of line events that the kernel should buffer.
    ///
    /// This is only relevant if edge detection is enabled in the configuration.
    ///
    /// Note that this is only a suggested value and the kernel may allocate a
    /// larger buffer or cap the size of the buffer.
    /// If this field is zero then the buffer size defaults to a minimum of `num_lines*16`.
    pub event_buffer_size: u32,

    /// Reserved for future use and must be zero filled.
    #[doc(hidden)]
    pub padding: Padding<5>,

    /// This field is only present for the underlying ioctl call and is only used internally.
    #[doc(hidden)]
    pub fd: i32,
}

/// Request a line or set of lines for exclusive access.
///
/// * `cf` - The open gpiochip device file.
/// * `lr` - The line request.
#[inline]
pub fn get_line(cf: &File, mut lr: LineRequest) -> Result<File> {
    // SAFETY: lr is consumed and the returned file is drawn from the returned fd.
    unsafe {
        match libc::ioctl(cf.as_raw_fd(), ioctl::table().v2_get_line as _, &mut lr) {
            0 => Ok(File::from_raw_fd(lr.fd)),
            _ => Err(Error::from_errno()),
        }
    }
}

/// The set of potential configuration attributes for a line.
///
/// [`LineInfo.num_attrs`] specifies the number of entries in use.
///
/// [`LineInfo.num_attrs`]: struct@LineInfo
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LineAttributes([LineAttribute; NUM_ATTRS_MAX]);

/// The capacity of [`LineAttributes`] and [`LineConfigAttributes`] arrays.
pub const NUM_ATTRS_MAX: usize = 10;

/// Information about a certain GPIO line.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineInfo {
    /// The name of this GPIO line, such as the output pin of the line on the chip,
    /// a rail or a pin header name on a board, as specified by the GPIO chip.
    ///
    /// May be empty.
    pub name: Name,

    /// A functional name for the consumer of this GPIO line as set by whatever is using it.
    ///
    /// Will be empty if there is no current user.
    /// May also be empty if the consumer requests doesn't set this up.
    pub consumer: Name,

    /// The local offset on this GPIO chip.
    pub offset: Offset,

    /// The number of attributes active in `attrs`.
    pub num_attrs: u32,

    /// The configuration flags for this GPIO line.
    pub flags: LineFlags,

    /// Additional configuration attributes associated with the line.
    ///
    /// The number of active attributes in the array is specified by `num_attrs`.
    pub attrs: LineAttributes,

    /// Reserved for future use.
    #[doc(hidden)]
    pub padding: Padding<4>,
}

impl LineInfo {
    const SIZE: usize = 256;
    const ATTRS_OFFSET: usize = 80;
    const ATTR_SIZE: usize = 16;

    /// The nth attribute in the attrs
    #[inline]
    pub fn attr(&self, idx: usize) -> &LineAttribute {
        &self.attrs.0[idx]
    }

    /// The nth attribute in the attrs, for population.
    ///
    /// The caller must keep `num_attrs` consistent with the populated attrs.
    #[inline]
    pub fn attr_mut(&mut self, idx: usize) -> &mut LineAttribute {
        &mut self.attrs.0[idx]
    }

    /// Check that a LineInfo read from the kernel is valid in Rust.
    fn validate(&self) -> ValidationResult {
        if self.num_attrs > NUM_ATTRS_MAX as u32 {
            return Err(ValidationError::new(
                "num_attrs",
                format!("out of range: {}", self.num_attrs),
            ));
        }
        for i in 0..self.num_attrs as usize {
            if let Err(e) = self.attrs.0[i].kind() {
                return Err(ValidationError::new(format!("attrs[{i}].kind"), e));
            }
        }
        Ok(())
    }

    fn decode(d: &[u8], bo: ByteOrder) -> LineInfo {
        let mut li = LineInfo {
            name: read_name(d, 0),
            consumer: read_name(d, 32),
            offset: bo.read_u32(d, 64),
            num_attrs: bo.read_u32(d, 68),
            flags: LineFlags::from_bits_retain(bo.read_u64(d, 72)),
            ..Default::default()
        };
        for (i, attr) in li.attrs.0.iter_mut().enumerate() {
            let start = Self::ATTRS_OFFSET + i * Self::ATTR_SIZE;
            *attr = LineAttribute::decode(&d[start..start + Self::ATTR_SIZE], bo);
        }
        li
    }
}

/// Get the publicly available information for a line.
///
/// This does not include the line value.
/// The line must be requested to access the value.
///
/// * `cf` - The open gpiochip device file.
/// * `offset` - The offset of the line.
#[inline]
pub fn get_line_info(cf: &File, offset: Offset) -> Result<LineInfo> {
    let mut li = LineInfo {
        offset,
        ..Default::default()
    };
    // SAFETY: returned struct is explicitly validated before being returned.
    match unsafe {
        libc::ioctl(
            cf.as_raw_fd(),
            ioctl::table().v2_get_line_info as _,
            &mut li,
        )
    } {
        0 => li.validate().map(|_| li).map_err(Error::from),
        _ => Err(Error::from_errno()),
    }
}

/// Add a watch on changes to the [`LineInfo`] for a line.
///
/// Returns the current state of that information.
///
/// This does not include the line value.
/// The line must be requested to access the value.
///
/// * `cf` - The open gpiochip device file.
/// * `offset` - The offset of the line to watch.
#[inline]
pub fn watch_line_info(cf: &File, offset: Offset) -> Result<LineInfo> {
    let mut li = LineInfo {
        offset,
        ..Default::default()
    };
    // SAFETY: returned struct is explicitly validated before being returned.
    match unsafe {
        libc::ioctl(
            cf.as_raw_fd(),
            ioctl::table().v2_watch_line_info as _,
            &mut li,
        )
    } {
        0 => li.validate().map(|_| li).map_err(Error::from),
        _ => Err(Error::from_errno()),
    }
}

/// An event indicating a change to the info for a line.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineInfoChangeEvent {
    /// The new line info.
    pub info: LineInfo,

    /// The best estimate of time of event occurrence, in nanoseconds.
    pub timestamp_ns: u64,

    /// The trigger for the change.
    pub kind: LineInfoChangeKind,

    /// Reserved for future use.
    #[doc(hidden)]
    pub padding: Padding<5>,
}

impl LineInfoChangeEvent {
    /// The number of bytes the kernel writes for each event.
    pub const SIZE: usize = 288;

    /// Decode an info change event from a buffer.
    ///
    /// The buffer is assumed to have been populated by a read of the chip File,
    /// so the content is validated before being returned.
    pub fn from_slice(d: &[u8]) -> Result<LineInfoChangeEvent> {
        check_size::<LineInfoChangeEvent>("LineInfoChangeEvent", d)?;
        let bo = ByteOrder::native();
        let info = LineInfo::decode(d, bo);
        info.validate()?;
        let kind = LineInfoChangeKind::try_from(bo.read_u32(d, LineInfo::SIZE + 8))
            .map_err(|e| ValidationError::new("kind", e))?;
        Ok(LineInfoChangeEvent {
            info,
            timestamp_ns: bo.read_u64(d, LineInfo::SIZE),
            kind,
            padding: Default::default(),
        })
    }
}

/// Information about an edge event on a requested line.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineEdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds.
    ///
    /// By default the timestamp is read from **CLOCK_MONOTONIC** and is
    /// intended to allow the accurate measurement of the time between events.
    /// It does not provide the wall-clock time.
    ///
    /// If the [`LineFlags::EVENT_CLOCK_REALTIME`] flag is set then the
    /// timestamp is read from **CLOCK_REALTIME**.
    pub timestamp_ns: u64,

    /// The event trigger identifier.
    pub kind: LineEdgeEventKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event in the sequence of events for all
    /// the lines in this line request.
    pub seqno: u32,

    /// The sequence number for this event in the sequence of events on this
    /// particular line.
    pub line_seqno: u32,

    /// Reserved for future use.
    #[doc(hidden)]
    pub padding: Padding<6>,
}

impl LineEdgeEvent {
    /// The number of bytes the kernel writes for each event.
    pub const SIZE: usize = 48;

    /// Decode an edge event from a buffer.
    ///
    /// The buffer is assumed to have been populated by a read of the line request File,
    /// so the content is validated before being returned.
    #[inline]
    pub fn from_slice(d: &[u8]) -> Result<LineEdgeEvent> {
        check_size::<LineEdgeEvent>("LineEdgeEvent", d)?;
        let bo = ByteOrder::native();
        let kind = LineEdgeEventKind::try_from(bo.read_u32(d, 8))
            .map_err(|e| ValidationError::new("kind", e))?;
        Ok(LineEdgeEvent {
            timestamp_ns: bo.read_u64(d, 0),
            kind,
            offset: bo.read_u32(d, 12),
            seqno: bo.read_u32(d, 16),
            line_seqno: bo.read_u32(d, 20),
            padding: Default::default(),
        })
    }
}
