// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A library for requesting, driving and watching GPIO lines on Linux
//! platforms using the GPIO character device.
//!
//! A [`Chip`] is opened from its path and negotiates the uAPI ABI version
//! used for all subsequent operations.  Lines are requested from the chip
//! as a [`Request`], which provides access to the line values, and to
//! edge events via a watcher thread.
//!
//! ```no_run
//! # fn example() -> gpioline::Result<()> {
//! use gpioline::line::{EdgeDetection, Value};
//! use gpioline::request::Config;
//! use gpioline::Chip;
//!
//! let chip = Chip::open("/dev/gpiochip0")?;
//! let mut cfg = Config::default();
//! cfg.as_output(Value::Inactive);
//! let led = chip.request(&[3], &cfg)?;
//! led.set_value(3, Value::Active)?;
//!
//! let mut cfg = Config::default();
//! cfg.with_edge_detection(EdgeDetection::BothEdges);
//! let button = chip.request(&[5], &cfg)?;
//! button.watch_edges(|edge| println!("{:?}", edge))?;
//! # Ok(())
//! # }
//! ```

use gpioline_uapi as uapi;
use std::fmt;
use std::path::PathBuf;

/// Types and functions specific to chips.
pub mod chip;
pub use chip::Chip;

/// Types specific to lines.
pub mod line;

/// Types and functions related to requesting lines.
///
/// Lines are requested from a [`Chip`] using a [`Config`] that describes
/// how the lines are to be configured.  The resulting [`Request`] provides
/// access to the line values and edge events.
///
/// [`Config`]: request::Config
/// [`Request`]: request::Request
pub mod request;
pub use request::Request;

mod watcher;

/// The uAPI ABI versions available to interact with the kernel.
///
/// Two versions of the Linux GPIO uAPI ABI currently exist, with v1 being released in
/// Linux v4.8 and v2 being released in Linux v5.10.
///
/// * `V2` is the current ABI and is preferred when the kernel supports it.
/// * `V1` is more restrictive than V2, so some information and features are
///   unavailable, but the ABI itself is more widely available.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum AbiVersion {
    V1,
    #[default]
    V2,
}

impl fmt::Display for AbiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbiVersion::V1 => write!(f, "uAPI ABI v1"),
            AbiVersion::V2 => write!(f, "uAPI ABI v2"),
        }
    }
}

/// Errors returned by [`gpioline`] functions.
///
/// [`gpioline`]: crate
#[derive(Clone, Debug, thiserror::Error, Eq, PartialEq)]
pub enum Error {
    /// An operation cannot be performed due to a limitation in the ABI version being used.
    #[error("{0} {1}.")]
    AbiLimitation(AbiVersion, String),

    /// The chip or request has already been closed.
    #[error("already closed")]
    AlreadyClosed,

    /// Problem accessing GPIO chip character devices
    #[error("\"{0}\" {1}.")]
    GpioChip(PathBuf, chip::ErrorKind),

    /// An error returned when there is a problem with an argument.
    #[error("{0}")]
    InvalidArgument(String),

    /// An error returned from an underlying os call.
    #[error(transparent)]
    Os(uapi::Errno),

    /// The operation is not permitted on the request.
    #[error("{0}")]
    Permission(String),

    /// An error returned from an underlying uAPI call.
    #[error("uAPI {0} returned: {1}")]
    Uapi(UapiCall, #[source] uapi::Error),

    /// The response to a uAPI command contained unexpected content.
    #[error("{0}")]
    UnexpectedResponse(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Os(uapi::Errno(e.raw_os_error().unwrap_or(0)))
    }
}

/// Identifiers for the underlying uAPI calls.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UapiCall {
    GetChipInfo,
    GetLine,
    GetLineEvent,
    GetLineHandle,
    GetLineInfo,
    GetLineValues,
    LEEFromBuf,
    LICEFromBuf,
    ReadEvent,
    SetLineConfig,
    SetLineValues,
    UnwatchLineInfo,
    WatchLineInfo,
}

impl fmt::Display for UapiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UapiCall::GetChipInfo => "get_chip_info",
            UapiCall::GetLine => "get_line",
            UapiCall::GetLineEvent => "get_line_event",
            UapiCall::GetLineHandle => "get_line_handle",
            UapiCall::GetLineInfo => "get_line_info",
            UapiCall::GetLineValues => "get_line_values",
            UapiCall::LEEFromBuf => "LineEdgeEvent::from_slice",
            UapiCall::LICEFromBuf => "LineInfoChangeEvent::from_slice",
            UapiCall::ReadEvent => "read_event",
            UapiCall::SetLineConfig => "set_line_config",
            UapiCall::SetLineValues => "set_line_values",
            UapiCall::UnwatchLineInfo => "unwatch_line_info",
            UapiCall::WatchLineInfo => "watch_line_info",
        };
        write!(f, "{}", name)
    }
}

/// The result for [`gpioline`] functions.
///
/// [`gpioline`]: crate
pub type Result<T> = std::result::Result<T, Error>;
