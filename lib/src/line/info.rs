// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Bias, Direction, Drive, EdgeDetection, EventClock, InfoFlags, Offset};
use gpioline_uapi::{v1, v2};
use std::time::Duration;

/// The publicly available information for a line.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Info {
    /// The line offset on the GPIO chip.
    pub offset: Offset,

    /// The name of this GPIO line, such as the output pin of the line on
    /// the chip, a rail or a pin header name on a board, as specified by the
    /// GPIO chip.
    ///
    /// May be empty.
    pub name: String,

    /// A functional name for the consumer of this GPIO line as set
    /// by whatever is using it.
    ///
    /// May be empty if not set by the user or the line is unused.
    pub consumer: String,

    /// When true the line is used and not available for request.
    pub used: bool,

    /// When true the line active state corresponds to a physical low.
    pub active_low: bool,

    /// The direction of the line.
    pub direction: Direction,

    /// The bias state of the line.
    pub bias: Option<Bias>,

    /// The drive applied to output lines.
    pub drive: Option<Drive>,

    /// The edge detection state for the line.
    ///
    /// Always None with ABI v1.
    pub edge_detection: Option<EdgeDetection>,

    /// The source clock for edge event timestamps.
    ///
    /// Always None with ABI v1.
    pub event_clock: Option<EventClock>,

    /// The debounce period.
    ///
    /// Always None with ABI v1.
    pub debounce_period: Option<Duration>,
}

impl Info {
    fn from_flags(offset: Offset, name: String, consumer: String, flags: InfoFlags) -> Info {
        Info {
            offset,
            name,
            consumer,
            used: flags.used,
            active_low: flags.active_low,
            direction: flags.direction(),
            bias: flags.bias(),
            drive: flags.drive(),
            edge_detection: flags.edge_detection(),
            event_clock: flags.event_clock(),
            debounce_period: None,
        }
    }
}

impl From<&v1::LineInfo> for Info {
    fn from(li: &v1::LineInfo) -> Self {
        Info::from_flags(
            li.offset,
            String::from(&li.name),
            String::from(&li.consumer),
            li.flags.into(),
        )
    }
}

impl From<&v2::LineInfo> for Info {
    // The uAPI has already validated num_attrs and the attribute kinds.
    fn from(li: &v2::LineInfo) -> Self {
        let mut info = Info::from_flags(
            li.offset,
            String::from(&li.name),
            String::from(&li.consumer),
            li.flags.into(),
        );
        for idx in 0..li.num_attrs as usize {
            if let Some(v2::LineAttributeValue::DebouncePeriod(dp)) = li.attr(idx).to_value() {
                info.debounce_period = Some(dp);
            }
        }
        info
    }
}
