// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::ioctl;
use libc::{c_long, pollfd, ppoll, sigset_t, time_t, timespec, POLLIN};
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::mem::{self, MaybeUninit};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::ptr;
use std::slice;
use std::time::Duration;

/// Check if the file has an event available to read.
#[inline]
pub fn has_event(f: &File) -> Result<bool> {
    wait_event(f, Duration::ZERO)
}

/// Wait for the file to have an event available to read.
pub fn wait_event(f: &File, d: Duration) -> Result<bool> {
    let mut pfd = pollfd {
        fd: f.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };
    let timeout = timespec {
        tv_sec: d.as_secs() as time_t,
        tv_nsec: d.subsec_nanos() as c_long,
    };
    // SAFETY: pfd and timeout outlive the call.
    match unsafe {
        ppoll(
            ptr::addr_of_mut!(pfd),
            1,
            ptr::addr_of!(timeout),
            ptr::null() as *const sigset_t,
        )
    } {
        -1 => Err(Error::from_errno()),
        0 => Ok(false),
        _ => Ok(true),
    }
}

/// Read an event from a chip or request file descriptor.
///
/// Returns the number of bytes read.
///
/// The buffer must be sized to hold at least one event, else the kernel
/// rejects the read with EINVAL.
#[inline]
pub fn read_event(mut f: &File, buf: &mut [u8]) -> Result<usize> {
    f.read(buf).map_err(Error::from)
}

/// Information about a particular GPIO chip.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChipInfo {
    /// The Linux kernel name of this GPIO chip.
    pub name: Name,

    /// A functional name for this GPIO chip, such as a product number.
    ///
    /// May be empty.
    pub label: Name,

    /// The number of GPIO lines on this chip.
    pub num_lines: u32,
}

/// Get the publicly available information for a chip.
///
/// * `cf` - The open chip File.
pub fn get_chip_info(cf: &File) -> Result<ChipInfo> {
    let mut chip = MaybeUninit::<ChipInfo>::uninit();
    // SAFETY: returned struct contains raw byte arrays and ints that are safe to decode.
    match unsafe {
        libc::ioctl(
            cf.as_raw_fd(),
            ioctl::table().get_chip_info as _,
            chip.as_mut_ptr(),
        )
    } {
        0 => Ok(unsafe { chip.assume_init() }),
        _ => Err(Error::from_errno()),
    }
}

/// Remove any watch on changes to the line info for a line.
///
/// Common to ABI v1 and v2.
///
/// * `cf` - The open chip File.
/// * `offset` - The offset of the line to unwatch.
pub fn unwatch_line_info(cf: &File, offset: Offset) -> Result<()> {
    let mut offset = offset;
    // SAFETY: offset is a plain u32 owned by this frame.
    match unsafe {
        libc::ioctl(
            cf.as_raw_fd(),
            ioctl::table().unwatch_line_info as _,
            ptr::addr_of_mut!(offset),
        )
    } {
        0 => Ok(()),
        _ => Err(Error::from_errno()),
    }
}

/// The result returned by [`gpioline_uapi`] functions.
///
/// [`gpioline_uapi`]: crate
pub type Result<T> = std::result::Result<T, Error>;

/// Result returned by struct validators.
pub type ValidationResult = std::result::Result<(), ValidationError>;

/// Errors returned by [`gpioline_uapi`] functions.
///
/// [`gpioline_uapi`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An error returned from an underlying system call.
    #[error(transparent)]
    Os(Errno),

    /// An error indicating insufficient data read for the expected object.
    #[error(transparent)]
    UnderRead(#[from] UnderReadError),

    /// An error validating an data structure retuned from the kernel
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    /// Create an error from the current errno value.
    #[inline]
    pub fn from_errno() -> Error {
        Error::Os(Errno(std::io::Error::last_os_error().raw_os_error().unwrap_or(0)))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Os(Errno(e.raw_os_error().unwrap_or(0)))
    }
}

/// A failure to read sufficient bytes to construct an object.
//
// This should never happen - but is checked to be safe.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Reading {obj} returned {found} bytes, expected {expected}.")]
pub struct UnderReadError {
    /// The struct that under read.
    pub obj: &'static str,
    /// The number of bytes expected.
    pub expected: usize,
    /// The number of bytes read.
    pub found: usize,
}

impl UnderReadError {
    /// Create an UnderReadError.
    pub(crate) fn new(obj: &'static str, expected: usize, found: usize) -> UnderReadError {
        UnderReadError {
            obj,
            expected,
            found,
        }
    }
}

/// A failure to validate a struct returned from a system call.
//
// Should only be seen if a kernel update adds an enum value we are unaware of.
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
#[error("Kernel returned invalid {field}: {msg}")]
pub struct ValidationError {
    /// The field that failed to validate.
    pub field: String,
    /// The details of the validation failure.
    pub msg: String,
}

impl ValidationError {
    /// Create a ValidationError.
    pub fn new<S: Into<String>, T: Into<String>>(field: S, msg: T) -> ValidationError {
        ValidationError {
            field: field.into(),
            msg: msg.into(),
        }
    }
}

/// A raw errno returned by the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Errno(pub i32);

impl Errno {
    /// The line is already in use.
    pub const EBUSY: Errno = Errno(libc::EBUSY);
    /// The operation is not permitted on the descriptor.
    pub const EPERM: Errno = Errno(libc::EPERM);
    /// The kernel rejected an argument.
    pub const EINVAL: Errno = Errno(libc::EINVAL);
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", std::io::Error::from_raw_os_error(self.0))
    }
}

impl std::error::Error for Errno {}

/// The maximum number of bytes stored in a Name.
pub const NAME_LEN_MAX: usize = 32;

/// A uAPI name string, common to ABI v1 and v2.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Name([u8; NAME_LEN_MAX]);

impl Name {
    /// Checks whether the Name is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    /// The length of the contained name.
    #[inline]
    pub fn strlen(&self) -> usize {
        self.0.iter().position(|&x| x == 0).unwrap_or(self.0.len())
    }

    /// Convert the contained name to a OsString slice.
    pub fn as_os_str(&self) -> &OsStr {
        // SAFETY: strlen is bounded by the array.
        unsafe { OsStr::from_bytes(slice::from_raw_parts(&self.0[0], self.strlen())) }
    }

    /// Construct a Name from byte slice.
    ///
    /// Slice will be truncated if longer than the Name size.
    /// Truncation occurs on UTF-8 codepoint boundaries so the resulting
    /// name is still valid UTF-8.
    pub fn from_bytes(s: &[u8]) -> Name {
        let mut d: Name = Default::default();
        // drop any truncated UTF-8 codepoint
        let len = if s.len() < NAME_LEN_MAX {
            s.len()
        } else if s[NAME_LEN_MAX - 3] >= 0xf0 {
            NAME_LEN_MAX - 3
        } else if s[NAME_LEN_MAX - 2] >= 0xe0 {
            NAME_LEN_MAX - 2
        } else if s[NAME_LEN_MAX - 1] >= 0xc0 {
            NAME_LEN_MAX - 1
        } else {
            NAME_LEN_MAX
        };
        for (src, dst) in s.iter().take(len).zip(d.0.iter_mut()) {
            *dst = *src;
        }
        d
    }

    /// The raw bytes of the name, including any trailing nulls.
    pub(crate) fn from_raw(raw: [u8; NAME_LEN_MAX]) -> Name {
        Name(raw)
    }
}

impl From<&Name> for String {
    fn from(s: &Name) -> Self {
        String::from(s.as_os_str().to_string_lossy())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::from_bytes(s.as_bytes())
    }
}

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the [`ChipInfo`].
pub type Offset = u32;

/// The maximum number of lines that may be requested in a single request.
pub const NUM_LINES_MAX: usize = 64;

/// A collection of line offsets.
///
/// Typically used to identify the lines belonging to a particular request.
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Offsets([Offset; NUM_LINES_MAX]);

impl Offsets {
    /// Create offsets from an iterable list.
    pub fn from_slice(s: &[u32]) -> Self {
        let mut n: Offsets = Default::default();
        for (src, dst) in s.iter().zip(n.0.iter_mut()) {
            *dst = *src;
        }
        n
    }

    /// Get the indexed offset from the set.
    #[inline]
    pub fn get(&self, idx: usize) -> Offset {
        self.0[idx]
    }

    /// Set the indexed offset in the set.
    #[inline]
    pub fn set(&mut self, idx: usize, offset: Offset) {
        self.0[idx] = offset;
    }

    /// Copy offsets from an iterable list.
    pub fn copy_from_slice(&mut self, s: &[u32]) {
        let extent = std::cmp::min(NUM_LINES_MAX, s.len());
        self.0[0..extent].copy_from_slice(&s[0..extent]);
    }
}

impl Default for Offsets {
    fn default() -> Self {
        Offsets([0; NUM_LINES_MAX])
    }
}

/// Space reserved for future use.
///
/// Sized in multiples of u32 words.
#[repr(C)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[doc(hidden)]
pub struct Padding<const SIZE: usize>([u32; SIZE]);

impl<const SIZE: usize> Default for Padding<SIZE> {
    fn default() -> Self {
        Padding([0; SIZE])
    }
}

impl<const SIZE: usize> Padding<SIZE> {
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|x| *x == 0)
    }
}

/// The trigger identifier for a line info change event.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineInfoChangeKind {
    /// The line has been requested.
    Requested = 1,

    /// The line has been released.
    Released = 2,

    /// The line has been reconfigured.
    Reconfigured = 3,
}

impl TryFrom<u32> for LineInfoChangeKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineInfoChangeKind::*;
        Ok(match v {
            x if x == Requested as u32 => Requested,
            x if x == Released as u32 => Released,
            x if x == Reconfigured as u32 => Reconfigured,
            x => return Err(format!("invalid value: {x}")),
        })
    }
}

/// The trigger identifier for a line edge event.
#[repr(u32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEdgeEventKind {
    /// Indicates the line transitioned from *inactive* to *active*.
    RisingEdge = 1,

    /// Indicates the line transitioned from *active* to *inactive*.
    FallingEdge = 2,
}

impl TryFrom<u32> for LineEdgeEventKind {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        use LineEdgeEventKind::*;
        Ok(match v {
            x if x == RisingEdge as u32 => RisingEdge,
            x if x == FallingEdge as u32 => FallingEdge,
            x => return Err(format!("invalid value: {x}")),
        })
    }
}

/// Check that a buffer read from the kernel is large enough to hold a `T`.
#[inline]
pub(crate) fn check_size<T>(obj: &'static str, d: &[u8]) -> Result<()> {
    if d.len() < mem::size_of::<T>() {
        return Err(Error::from(UnderReadError::new(
            obj,
            mem::size_of::<T>(),
            d.len(),
        )));
    }
    Ok(())
}
