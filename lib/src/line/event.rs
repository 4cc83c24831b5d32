// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Info, Offset};
use gpioline_uapi::{v1, v2, LineEdgeEventKind, LineInfoChangeKind};

/// The details of an edge detected on an input line.
///
/// ABI v1 does not provide the seqno nor line_seqno fields, so they are zero.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EdgeEvent {
    /// The best estimate of time of event occurrence, in nanoseconds.
    ///
    /// The interpretation of this field depends on line [`EventClock`](super::EventClock)
    /// configuration, and so is left raw here.
    ///
    /// **CLOCK_REALTIME** is a Unix UTC timestamp that can be converted to
    /// [`SystemTime`](std::time::SystemTime) or equivalent.
    ///
    /// **CLOCK_MONOTONIC** is intended for comparing times between events and
    /// should be converted to [`Duration`](std::time::Duration).
    pub timestamp_ns: u64,

    /// The event trigger identifier.
    pub kind: EdgeKind,

    /// The offset of the line that triggered the event.
    pub offset: Offset,

    /// The sequence number for this event in the sequence of events for all
    /// the lines in this line request.
    ///
    /// A gap in the sequence indicates the kernel event buffer overflowed.
    pub seqno: u32,

    /// The sequence number for this event in the sequence of events on this
    /// particular line.
    pub line_seqno: u32,
}

impl EdgeEvent {
    /// Build an event from a v1 event, which does not identify the line.
    pub(crate) fn from_v1(le: &v1::LineEdgeEvent, offset: Offset) -> EdgeEvent {
        EdgeEvent {
            timestamp_ns: le.timestamp_ns,
            kind: le.kind.into(),
            offset,
            seqno: 0,
            line_seqno: 0,
        }
    }
}

impl From<&v2::LineEdgeEvent> for EdgeEvent {
    fn from(le: &v2::LineEdgeEvent) -> Self {
        EdgeEvent {
            timestamp_ns: le.timestamp_ns,
            kind: le.kind.into(),
            offset: le.offset,
            seqno: le.seqno,
            line_seqno: le.line_seqno,
        }
    }
}

/// The cause of an [`EdgeEvent`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeKind {
    /// Indicates the line transitioned from inactive to active.
    Rising = 1,

    /// Indicates the line transitioned from active to inactive.
    Falling = 2,
}

impl From<LineEdgeEventKind> for EdgeKind {
    fn from(kind: LineEdgeEventKind) -> Self {
        match kind {
            LineEdgeEventKind::RisingEdge => EdgeKind::Rising,
            LineEdgeEventKind::FallingEdge => EdgeKind::Falling,
        }
    }
}

/// The details of a change to the [`Info`] for a line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InfoChangeEvent {
    /// The updated line info.
    pub info: Info,

    /// The best estimate of time of event occurrence.
    ///
    /// The **CLOCK_MONOTONIC** is used as the source for info change timestamps.
    pub timestamp_ns: u64,

    /// The trigger for the change.
    pub kind: InfoChangeKind,
}

impl From<&v1::LineInfoChangeEvent> for InfoChangeEvent {
    fn from(ice: &v1::LineInfoChangeEvent) -> Self {
        InfoChangeEvent {
            info: Info::from(&ice.info),
            timestamp_ns: ice.timestamp_ns,
            kind: ice.kind.into(),
        }
    }
}

impl From<&v2::LineInfoChangeEvent> for InfoChangeEvent {
    fn from(ice: &v2::LineInfoChangeEvent) -> Self {
        InfoChangeEvent {
            info: Info::from(&ice.info),
            timestamp_ns: ice.timestamp_ns,
            kind: ice.kind.into(),
        }
    }
}

/// The cause of a [`InfoChangeEvent`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InfoChangeKind {
    /// Line has been requested.
    Requested = 1,

    /// Line has been released.
    Released = 2,

    /// Line has been reconfigured.
    Reconfigured = 3,
}

impl From<LineInfoChangeKind> for InfoChangeKind {
    fn from(kind: LineInfoChangeKind) -> Self {
        match kind {
            LineInfoChangeKind::Requested => InfoChangeKind::Requested,
            LineInfoChangeKind::Released => InfoChangeKind::Released,
            LineInfoChangeKind::Reconfigured => InfoChangeKind::Reconfigured,
        }
    }
}
