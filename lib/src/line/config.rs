// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::{Bias, Direction, Drive, EdgeDetection, EventClock, Value};
use crate::{Error, Result};
use gpioline_uapi::{v1, v2};
use std::time::Duration;

/// The configuration settings for a single line.
///
// Note it does not contain the offset to allow it to be applied to multiple lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// The direction setting for the line.
    ///
    /// None leaves the direction as is.
    pub direction: Option<Direction>,

    /// The active low setting for the line.
    pub active_low: bool,

    /// The bias setting for the line.
    pub bias: Option<Bias>,

    /// The drive setting for the line.
    ///
    /// Only relevant for output lines.
    pub drive: Option<Drive>,

    /// The edge detection setting for the line.
    ///
    /// Only relevant for input lines.
    pub edge_detection: Option<EdgeDetection>,

    /// The source clock for edge event timestamps.
    ///
    /// Only relevant for input lines with edge detection enabled.
    pub event_clock: Option<EventClock>,

    /// The debounce period.
    ///
    /// Transitions that are not stable for at least this period are filtered.
    ///
    /// Only relevant for input lines.
    pub debounce_period: Option<Duration>,

    /// The logical value to be applied to the line if it is an output.
    pub value: Option<Value>,
}

impl Config {
    /// Check that two configs are equivalent, ignoring the line value.
    pub(crate) fn equivalent(&self, right: &Config) -> bool {
        self.direction == right.direction
            && self.active_low == right.active_low
            && self.bias == right.bias
            && self.drive == right.drive
            && self.edge_detection == right.edge_detection
            && self.event_clock == right.event_clock
            && self.debounce_period == right.debounce_period
    }

    /// The effective value specified by the config.
    pub(crate) fn value(&self) -> Value {
        self.value.unwrap_or_default()
    }

    pub(crate) fn is_output(&self) -> bool {
        self.direction == Some(Direction::Output)
    }

    pub(crate) fn is_input(&self) -> bool {
        self.direction == Some(Direction::Input)
    }

    /// Reject settings that cannot be encoded for the line.
    ///
    /// Edge detection, debounce and the event clock only apply to input lines.
    /// The request mutators never produce such a config, but the fields are public.
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.is_input() {
            if self.edge_detection.is_some() {
                return Err(Error::InvalidArgument(
                    "edge detection requires an input line.".into(),
                ));
            }
            if self.debounce_period.is_some_and(|dp| !dp.is_zero()) {
                return Err(Error::InvalidArgument(
                    "debounce requires an input line.".into(),
                ));
            }
            if self
                .event_clock
                .is_some_and(|clk| clk != EventClock::Monotonic)
            {
                return Err(Error::InvalidArgument(
                    "event clock requires an input line.".into(),
                ));
            }
        }
        self.debounce_period_us()?;
        Ok(())
    }

    /// The debounce period in microseconds, rounded up.
    ///
    /// Periods that do not fit the 32-bit uAPI field are rejected.
    pub(crate) fn debounce_period_us(&self) -> Result<Option<u32>> {
        let dp = match self.debounce_period.filter(|dp| !dp.is_zero()) {
            Some(dp) => dp,
            None => return Ok(None),
        };
        dp.checked_add(Duration::from_nanos(999))
            .and_then(|dp| u32::try_from(dp.as_micros()).ok())
            .map(Some)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "debounce period {:?} exceeds the maximum of {} microseconds.",
                    dp,
                    u32::MAX
                ))
            })
    }
}

impl From<&Config> for v2::LineFlags {
    fn from(cfg: &Config) -> v2::LineFlags {
        use v2::LineFlags as F;
        let mut flags = F::empty();
        flags.set(F::ACTIVE_LOW, cfg.active_low);
        flags |= match cfg.bias {
            None => F::empty(),
            Some(Bias::PullUp) => F::BIAS_PULL_UP,
            Some(Bias::PullDown) => F::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => F::BIAS_DISABLED,
        };
        match cfg.direction {
            None => {}
            Some(Direction::Output) => {
                flags |= F::OUTPUT
                    | match cfg.drive {
                        Some(Drive::OpenDrain) => F::OPEN_DRAIN,
                        Some(Drive::OpenSource) => F::OPEN_SOURCE,
                        _ => F::empty(),
                    };
            }
            Some(Direction::Input) => {
                flags |= F::INPUT;
                flags |= match cfg.edge_detection {
                    None => F::empty(),
                    Some(EdgeDetection::RisingEdge) => F::EDGE_RISING,
                    Some(EdgeDetection::FallingEdge) => F::EDGE_FALLING,
                    Some(EdgeDetection::BothEdges) => F::EDGE_RISING | F::EDGE_FALLING,
                };
                if cfg.edge_detection.is_some() {
                    flags |= match cfg.event_clock {
                        Some(EventClock::Realtime) => F::EVENT_CLOCK_REALTIME,
                        Some(EventClock::Hte) => F::EVENT_CLOCK_HTE,
                        _ => F::empty(),
                    };
                }
            }
        }
        flags
    }
}

impl From<&Config> for v1::EventRequestFlags {
    fn from(cfg: &Config) -> v1::EventRequestFlags {
        match cfg.edge_detection {
            Some(EdgeDetection::RisingEdge) => v1::EventRequestFlags::RISING_EDGE,
            Some(EdgeDetection::FallingEdge) => v1::EventRequestFlags::FALLING_EDGE,
            Some(EdgeDetection::BothEdges) => v1::EventRequestFlags::BOTH_EDGES,
            None => v1::EventRequestFlags::empty(),
        }
    }
}

impl From<&Config> for v1::HandleRequestFlags {
    fn from(cfg: &Config) -> v1::HandleRequestFlags {
        use v1::HandleRequestFlags as F;
        let mut flags = match cfg.direction {
            None => F::empty(),
            Some(Direction::Input) => F::INPUT,
            Some(Direction::Output) => match cfg.drive {
                Some(Drive::OpenDrain) => F::OUTPUT | F::OPEN_DRAIN,
                Some(Drive::OpenSource) => F::OUTPUT | F::OPEN_SOURCE,
                _ => F::OUTPUT,
            },
        };
        flags.set(F::ACTIVE_LOW, cfg.active_low);
        flags |= match cfg.bias {
            None => F::empty(),
            Some(Bias::PullUp) => F::BIAS_PULL_UP,
            Some(Bias::PullDown) => F::BIAS_PULL_DOWN,
            Some(Bias::Disabled) => F::BIAS_DISABLED,
        };
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default() {
        let cfg = Config::default();
        assert_eq!(cfg.direction, None);
        assert!(!cfg.active_low);
        assert!(cfg.bias.is_none());
        assert!(cfg.drive.is_none());
        assert!(cfg.edge_detection.is_none());
        assert!(cfg.event_clock.is_none());
        assert!(cfg.debounce_period.is_none());
        assert!(cfg.value.is_none());
    }

    #[test]
    fn equivalent() {
        let mut lcfg = Config::default();
        let mut rcfg = Config::default();
        assert!(lcfg.equivalent(&rcfg));

        // value is ignored
        rcfg.value = Some(Value::Active);
        assert!(lcfg.equivalent(&rcfg));

        lcfg.active_low = true;
        assert!(!lcfg.equivalent(&rcfg));
        rcfg.active_low = true;
        assert!(lcfg.equivalent(&rcfg));

        lcfg.bias = Some(Bias::PullDown);
        assert!(!lcfg.equivalent(&rcfg));
        rcfg.bias = Some(Bias::PullDown);
        assert!(lcfg.equivalent(&rcfg));

        lcfg.edge_detection = Some(EdgeDetection::RisingEdge);
        assert!(!lcfg.equivalent(&rcfg));
        rcfg.edge_detection = Some(EdgeDetection::RisingEdge);
        assert!(lcfg.equivalent(&rcfg));

        lcfg.debounce_period = Some(Duration::from_millis(5));
        assert!(!lcfg.equivalent(&rcfg));
        rcfg.debounce_period = Some(Duration::from_millis(5));
        assert!(lcfg.equivalent(&rcfg));
    }

    #[test]
    fn value() {
        let mut cfg = Config::default();
        assert_eq!(cfg.value(), Value::Inactive);
        cfg.value = Some(Value::Active);
        assert_eq!(cfg.value(), Value::Active);
    }

    #[test]
    fn validate() {
        let mut cfg = Config {
            direction: Some(Direction::Output),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());

        cfg.edge_detection = Some(EdgeDetection::BothEdges);
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument(
                "edge detection requires an input line.".into()
            ))
        );

        cfg.edge_detection = None;
        cfg.debounce_period = Some(Duration::from_millis(1));
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument("debounce requires an input line.".into()))
        );

        // zero period is no debounce
        cfg.debounce_period = Some(Duration::ZERO);
        assert!(cfg.validate().is_ok());

        cfg.event_clock = Some(EventClock::Realtime);
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument(
                "event clock requires an input line.".into()
            ))
        );
        cfg.event_clock = Some(EventClock::Monotonic);
        assert!(cfg.validate().is_ok());

        cfg.direction = Some(Direction::Input);
        cfg.event_clock = Some(EventClock::Realtime);
        cfg.debounce_period = Some(Duration::from_millis(1));
        cfg.edge_detection = Some(EdgeDetection::BothEdges);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_as_is() {
        // direction left as is cannot carry input features
        let mut cfg = Config {
            edge_detection: Some(EdgeDetection::BothEdges),
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument(
                "edge detection requires an input line.".into()
            ))
        );

        cfg.edge_detection = None;
        cfg.debounce_period = Some(Duration::from_millis(5));
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument("debounce requires an input line.".into()))
        );

        cfg.debounce_period = None;
        cfg.event_clock = Some(EventClock::Hte);
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument(
                "event clock requires an input line.".into()
            ))
        );
    }

    #[test]
    fn validate_debounce_range() {
        let mut cfg = Config {
            direction: Some(Direction::Input),
            ..Default::default()
        };

        cfg.debounce_period = Some(Duration::MAX);
        assert_eq!(
            cfg.validate(),
            Err(Error::InvalidArgument(format!(
                "debounce period {:?} exceeds the maximum of 4294967295 microseconds.",
                Duration::MAX
            )))
        );

        cfg.debounce_period = Some(Duration::from_secs(5000));
        assert!(cfg.validate().is_err());
        assert!(cfg.debounce_period_us().is_err());

        cfg.debounce_period = Some(Duration::from_micros(u32::MAX as u64));
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.debounce_period_us(), Ok(Some(u32::MAX)));

        // rounding up must also fit
        cfg.debounce_period =
            Some(Duration::from_micros(u32::MAX as u64) + Duration::from_nanos(1));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debounce_period_us() {
        let mut cfg = Config::default();
        assert_eq!(cfg.debounce_period_us(), Ok(None));

        cfg.debounce_period = Some(Duration::ZERO);
        assert_eq!(cfg.debounce_period_us(), Ok(None));

        cfg.debounce_period = Some(Duration::from_micros(42));
        assert_eq!(cfg.debounce_period_us(), Ok(Some(42)));

        // rounds up to the next microsecond
        cfg.debounce_period = Some(Duration::from_nanos(42_001));
        assert_eq!(cfg.debounce_period_us(), Ok(Some(43)));
    }

    #[test]
    fn v2_line_flags_from_config() {
        use v2::LineFlags as F;

        let mut cfg = Config::default();
        assert!(v2::LineFlags::from(&cfg).is_empty());

        cfg.active_low = true;
        cfg.bias = Some(Bias::PullUp);
        assert_eq!(F::from(&cfg), F::ACTIVE_LOW | F::BIAS_PULL_UP);

        cfg.direction = Some(Direction::Output);
        cfg.drive = Some(Drive::OpenSource);
        cfg.bias = Some(Bias::Disabled);
        assert_eq!(
            F::from(&cfg),
            F::ACTIVE_LOW | F::OUTPUT | F::OPEN_SOURCE | F::BIAS_DISABLED
        );

        // drive ignored for inputs, clock ignored without edges
        cfg.direction = Some(Direction::Input);
        cfg.active_low = false;
        cfg.bias = None;
        cfg.event_clock = Some(EventClock::Realtime);
        assert_eq!(F::from(&cfg), F::INPUT);

        cfg.edge_detection = Some(EdgeDetection::BothEdges);
        assert_eq!(
            F::from(&cfg),
            F::INPUT | F::EDGE_RISING | F::EDGE_FALLING | F::EVENT_CLOCK_REALTIME
        );

        cfg.edge_detection = Some(EdgeDetection::FallingEdge);
        cfg.event_clock = Some(EventClock::Hte);
        assert_eq!(
            F::from(&cfg),
            F::INPUT | F::EDGE_FALLING | F::EVENT_CLOCK_HTE
        );

        cfg.edge_detection = Some(EdgeDetection::RisingEdge);
        cfg.event_clock = Some(EventClock::Monotonic);
        assert_eq!(F::from(&cfg), F::INPUT | F::EDGE_RISING);
    }

    #[test]
    fn v1_event_request_flags_from_config() {
        use v1::EventRequestFlags as F;

        let mut cfg = Config::default();
        assert!(F::from(&cfg).is_empty());

        cfg.edge_detection = Some(EdgeDetection::RisingEdge);
        assert_eq!(F::from(&cfg), F::RISING_EDGE);

        cfg.edge_detection = Some(EdgeDetection::FallingEdge);
        assert_eq!(F::from(&cfg), F::FALLING_EDGE);

        cfg.edge_detection = Some(EdgeDetection::BothEdges);
        assert_eq!(F::from(&cfg), F::BOTH_EDGES);
    }

    #[test]
    fn v1_handle_request_flags_from_config() {
        use v1::HandleRequestFlags as F;

        let mut cfg = Config::default();
        assert!(F::from(&cfg).is_empty());

        cfg.direction = Some(Direction::Input);
        cfg.bias = Some(Bias::PullDown);
        cfg.drive = Some(Drive::OpenDrain);
        assert_eq!(F::from(&cfg), F::INPUT | F::BIAS_PULL_DOWN);

        cfg.direction = Some(Direction::Output);
        cfg.active_low = true;
        assert_eq!(
            F::from(&cfg),
            F::OUTPUT | F::OPEN_DRAIN | F::ACTIVE_LOW | F::BIAS_PULL_DOWN
        );

        cfg.drive = Some(Drive::PushPull);
        cfg.bias = Some(Bias::PullUp);
        assert_eq!(
            F::from(&cfg),
            F::OUTPUT | F::ACTIVE_LOW | F::BIAS_PULL_UP
        );
    }
}
