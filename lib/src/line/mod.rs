// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod config;
pub use self::config::Config;

mod event;
pub use self::event::{EdgeEvent, EdgeKind, InfoChangeEvent, InfoChangeKind};

mod info;
pub use self::info::Info;

mod value;
pub use self::value::{Value, Values};

use gpioline_uapi::{v1, v2};

/// An identifier for a line on a particular chip.
///
/// Valid offsets are in the range 0..`num_lines` as reported in the chip [`Info`](crate::chip::Info).
pub type Offset = u32;

/// A collection of line offsets.
pub type Offsets = Vec<Offset>;

/// The direction of a line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Direction {
    /// The line is an input.
    #[default]
    Input,

    /// The line is an output.
    Output,
}

/// The bias settings for a line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Bias {
    /// The line has pull-up enabled.
    PullUp,

    /// The line has pull-down enabled.
    PullDown,

    /// The line has bias disabled and will float unless externally driven.
    Disabled,
}

/// The drive policy settings for an output line.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Drive {
    /// The line is driven when both active and inactive.
    ///
    /// This is the default if drive is not specified.
    #[default]
    PushPull,

    /// The line is driven when low and set high impedance when high.
    OpenDrain,

    /// The line is driven when high and set high impedance when low.
    OpenSource,
}

/// The edge detection options for an input line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeDetection {
    /// Edge detection is only enabled on rising edges.
    ///
    /// A rising edge means a transition from an inactive state to an active state.
    RisingEdge,

    /// Edge detection is only enabled on falling edges.
    ///
    /// A falling edge means a transition from an active state to an inactive state.
    FallingEdge,

    /// Edge detection is enabled on both rising and falling edges.
    BothEdges,
}

/// The available clock sources for [`EdgeEvent`] timestamps.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum EventClock {
    /// The **CLOCK_MONOTONIC** is used as the source for edge event timestamps.
    ///
    /// This is the only clock available with ABI v1.
    #[default]
    Monotonic,

    /// The **CLOCK_REALTIME** is used as the source for edge event timestamps.
    Realtime,

    /// The hardware timestamp engine provides event timestamps.
    ///
    /// This source requires a Linux kernel 5.19 or later with CONFIG_HTE
    /// enabled and suitable supporting hardware.
    Hte,
}

// The line state reported by the kernel, independent of ABI version.
//
// v1 has no notion of input, edge detection or event clock, so those fields
// are always false when populated from v1 flags.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct InfoFlags {
    pub used: bool,
    pub active_low: bool,
    pub output: bool,
    pub open_drain: bool,
    pub open_source: bool,
    pub pull_up: bool,
    pub pull_down: bool,
    pub bias_disabled: bool,
    pub edge_rising: bool,
    pub edge_falling: bool,
    pub clock_realtime: bool,
    pub clock_hte: bool,
}

impl InfoFlags {
    pub fn direction(&self) -> Direction {
        if self.output {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    pub fn bias(&self) -> Option<Bias> {
        if self.pull_up {
            Some(Bias::PullUp)
        } else if self.pull_down {
            Some(Bias::PullDown)
        } else if self.bias_disabled {
            Some(Bias::Disabled)
        } else {
            None
        }
    }

    pub fn drive(&self) -> Option<Drive> {
        if self.open_drain {
            Some(Drive::OpenDrain)
        } else if self.open_source {
            Some(Drive::OpenSource)
        } else if self.output {
            Some(Drive::PushPull)
        } else {
            None
        }
    }

    pub fn edge_detection(&self) -> Option<EdgeDetection> {
        match (self.edge_rising, self.edge_falling) {
            (true, true) => Some(EdgeDetection::BothEdges),
            (true, false) => Some(EdgeDetection::RisingEdge),
            (false, true) => Some(EdgeDetection::FallingEdge),
            (false, false) => None,
        }
    }

    // Only meaningful while edge detection is enabled.
    pub fn event_clock(&self) -> Option<EventClock> {
        self.edge_detection()?;
        if self.clock_realtime {
            Some(EventClock::Realtime)
        } else if self.clock_hte {
            Some(EventClock::Hte)
        } else {
            Some(EventClock::Monotonic)
        }
    }
}

impl From<v1::LineInfoFlags> for InfoFlags {
    fn from(flags: v1::LineInfoFlags) -> Self {
        use v1::LineInfoFlags as F;
        InfoFlags {
            used: flags.contains(F::USED),
            active_low: flags.contains(F::ACTIVE_LOW),
            output: flags.contains(F::OUTPUT),
            open_drain: flags.contains(F::OPEN_DRAIN),
            open_source: flags.contains(F::OPEN_SOURCE),
            pull_up: flags.contains(F::BIAS_PULL_UP),
            pull_down: flags.contains(F::BIAS_PULL_DOWN),
            bias_disabled: flags.contains(F::BIAS_DISABLED),
            ..Default::default()
        }
    }
}

impl From<v2::LineFlags> for InfoFlags {
    fn from(flags: v2::LineFlags) -> Self {
        use v2::LineFlags as F;
        InfoFlags {
            used: flags.contains(F::USED),
            active_low: flags.contains(F::ACTIVE_LOW),
            output: flags.contains(F::OUTPUT),
            open_drain: flags.contains(F::OPEN_DRAIN),
            open_source: flags.contains(F::OPEN_SOURCE),
            pull_up: flags.contains(F::BIAS_PULL_UP),
            pull_down: flags.contains(F::BIAS_PULL_DOWN),
            bias_disabled: flags.contains(F::BIAS_DISABLED),
            edge_rising: flags.contains(F::EDGE_RISING),
            edge_falling: flags.contains(F::EDGE_FALLING),
            clock_realtime: flags.contains(F::EVENT_CLOCK_REALTIME),
            clock_hte: flags.contains(F::EVENT_CLOCK_HTE),
        }
    }
}
