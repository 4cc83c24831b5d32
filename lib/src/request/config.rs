// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::{
    self, Bias, Direction, Drive, EdgeDetection, EventClock, Offset, Offsets, Value, Values,
};
use crate::{AbiVersion, Error, Result};
use gpioline_uapi::{v1, v2, Bitmask};
use nohash_hasher::IntMap;
use std::time::Duration;

/// The configuration for a request for one or more lines.
///
/// The configuration for a subset of lines is updated by selecting the lines and then calling
/// the appropriate mutators. If no lines are selected then the mutators modify the base configuration
/// that lines inherit when they are first added, and that applies to any requested line
/// without a configuration of its own.
///
/// # Examples
/// ```
///    use gpioline::line::{Bias::*, Value::*};
///    use gpioline::request::Config;
///
///    let mut cfg = Config::default();
///    cfg.as_input()
///        .with_bias(PullUp)
///        // -- base config ends here - just before lines are added.
///        .with_lines(&[3, 5, 8]) // lines 3,5,8 will be input with pull-up bias...
///        // -- config added here would apply to lines 3,5 and 8
///        .with_line(3) // make line 3 pull-down instead...
///        .with_bias(PullDown)
///        .with_line(4) // and line 4 an output set inactive (and pull-up from the base)
///        .as_output(Inactive);
/// ```
///
/// The configuration is applied to hardware via a call to [`Chip::request`] or
/// [`Request::reconfigure`].  Changes to the `Config` object, either before or after that,
/// only update the configuration in memory in preparation for the next application.
///
/// [`Chip::request`]: crate::Chip::request
/// [`Request::reconfigure`]: crate::Request::reconfigure
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Config {
    /// The base configuration that applies to a line when it is first added.
    ///
    /// Prior to adding lines this config is the receiver for all mutations.
    pub(crate) base: line::Config,

    /// The configuration for the lines.
    pub(crate) lcfg: IntMap<Offset, line::Config>,

    /// The set of lines described by this configuration, in order added.
    pub(crate) offsets: Vec<Offset>,

    /// The current subset of lines being configured.
    ///
    /// If empty then the base config is selected.
    pub(crate) selected: Vec<Offset>,

    /// The requested kernel edge event buffer size.
    ///
    /// Zero leaves the kernel default.
    pub(crate) kernel_event_buffer_size: u32,
}

impl Config {
    /// Set the selected lines to input.
    ///
    /// This is a short form of [`with_direction(Input)`].
    ///
    /// [`with_direction(Input)`]: #method.with_direction
    pub fn as_input(&mut self) -> &mut Self {
        self.for_selected(|cfg| {
            cfg.direction = Some(Direction::Input);
            // set output specific options back to default
            cfg.drive = None;
            cfg.value = None;
        })
    }

    /// Do not set the direction of the selected lines.
    pub fn as_is(&mut self) -> &mut Self {
        self.for_selected(|cfg| {
            cfg.direction = None;
            // set input/output specific options back to default
            cfg.drive = None;
            cfg.value = None;
            cfg.edge_detection = None;
            cfg.debounce_period = None;
            cfg.event_clock = None;
        })
    }

    /// Set the selected lines to output with the given value.
    ///
    /// This is a long form of [`with_direction(Output)`] that allows the
    /// value to be set in the same call.
    ///
    /// [`with_direction(Output)`]: #method.with_direction
    pub fn as_output(&mut self, value: Value) -> &mut Self {
        self.for_selected(|cfg| {
            cfg.direction = Some(Direction::Output);
            cfg.value = Some(value);
            // set input specific options back to default
            cfg.edge_detection = None;
            cfg.debounce_period = None;
            cfg.event_clock = None;
        })
    }

    /// Set the selected lines to active low.
    pub fn as_active_low(&mut self) -> &mut Self {
        self.for_selected(|cfg| cfg.active_low = true)
    }

    /// Set the selected lines to active high.
    ///
    /// This is the default active level setting.
    pub fn as_active_high(&mut self) -> &mut Self {
        self.for_selected(|cfg| cfg.active_low = false)
    }

    /// Set the bias setting for the selected lines.
    pub fn with_bias<B: Into<Option<Bias>>>(&mut self, bias: B) -> &mut Self {
        let bias = bias.into();
        self.for_selected(|cfg| cfg.bias = bias)
    }

    /// Set the debounce period for the selected lines.
    ///
    /// A zero period disables debouncing.
    ///
    /// Implicitly selects the lines as inputs, if they weren't already, and removes
    /// any output specific settings.
    ///
    /// Requires ABI v2.
    pub fn with_debounce_period(&mut self, period: Duration) -> &mut Self {
        let dp = if period.is_zero() { None } else { Some(period) };
        self.for_selected(|cfg| {
            cfg.debounce_period = dp;
            cfg.direction = Some(Direction::Input);
            cfg.drive = None;
            cfg.value = None;
        })
    }

    /// Set the direction of the selected lines.
    ///
    /// Setting to input removes any output specific settings.
    ///
    /// Setting to output removes any input specific settings.
    ///
    /// Note that selecting a line as output will default its value to inactive.
    /// To provide a value use [`with_value`], or use [`as_output(value)`] instead.
    ///
    /// [`with_value`]: #method.with_value
    /// [`as_output(value)`]: #method.as_output
    pub fn with_direction(&mut self, direction: Direction) -> &mut Self {
        self.for_selected(|cfg| {
            cfg.direction = Some(direction);
            match direction {
                Direction::Output => {
                    cfg.edge_detection = None;
                    cfg.debounce_period = None;
                    cfg.event_clock = None;
                }
                Direction::Input => {
                    cfg.drive = None;
                    cfg.value = None;
                }
            }
        })
    }

    /// Set the drive setting for the selected lines.
    ///
    /// Implicitly sets the lines as outputs, if they weren't already, and removes any
    /// input specific settings.
    pub fn with_drive(&mut self, drive: Drive) -> &mut Self {
        self.for_selected(|cfg| {
            cfg.drive = Some(drive);
            cfg.direction = Some(Direction::Output);
            cfg.edge_detection = None;
            cfg.debounce_period = None;
            cfg.event_clock = None;
        })
    }

    /// Set the edge detection for the selected lines.
    ///
    /// Implicitly sets the lines as inputs and removes any output specific settings.
    pub fn with_edge_detection<E: Into<Option<EdgeDetection>>>(&mut self, edge: E) -> &mut Self {
        let edge = edge.into();
        self.for_selected(|cfg| {
            cfg.edge_detection = edge;
            cfg.direction = Some(Direction::Input);
            cfg.drive = None;
            cfg.value = None;
        })
    }

    /// Set the clock source for edge events on the selected lines.
    ///
    /// Only [`EventClock::Monotonic`] is available with ABI v1.
    ///
    /// Other clocks are only valid on input lines.
    pub fn with_event_clock(&mut self, event_clock: EventClock) -> &mut Self {
        // does not imply anything about edge detection or direction
        self.for_selected(|cfg| cfg.event_clock = Some(event_clock))
    }

    /// Set the size of the kernel buffer for edge events.
    ///
    /// This applies to the request as a whole and is a hint that the kernel may cap.
    /// Zero leaves the kernel default, which is 16 events per requested line.
    ///
    /// Requires ABI v2.
    pub fn with_kernel_event_buffer_size(&mut self, event_buffer_size: u32) -> &mut Self {
        self.kernel_event_buffer_size = event_buffer_size;
        self
    }

    /// Add a line to the config.
    ///
    /// Note that all configuration mutators applied subsequently only apply to this line.
    pub fn with_line(&mut self, offset: Offset) -> &mut Self {
        self.selected.clear();
        self.select_line(offset);
        self
    }

    /// Remove a line from the config.
    pub fn without_line(&mut self, offset: Offset) -> &mut Self {
        self.remove_line(offset);
        self
    }

    /// Add a set of lines to the config.
    ///
    /// Note that all configuration mutators applied subsequently only
    /// apply to this subset of lines.
    ///
    /// Passing empty offsets re-selects the base config for subsequent mutations.
    pub fn with_lines(&mut self, offsets: &[Offset]) -> &mut Self {
        self.selected.clear();
        for offset in offsets {
            self.select_line(*offset);
        }
        self
    }

    /// Remove a set of lines from the config.
    pub fn without_lines(&mut self, offsets: &[Offset]) -> &mut Self {
        for offset in offsets {
            self.remove_line(*offset);
        }
        self
    }

    /// Add a set of output lines, with values, to the config.
    ///
    /// Note that all configuration mutators applied subsequently only
    /// apply to this subset of lines.
    ///
    /// Passing empty values re-selects the base config for subsequent mutations.
    pub fn with_output_lines(&mut self, values: &Values) -> &mut Self {
        self.selected.clear();
        for (offset, value) in values.iter() {
            self.select_line(*offset);
            if let Some(cfg) = self.lcfg.get_mut(offset) {
                cfg.direction = Some(Direction::Output);
                cfg.value = Some(*value);
                cfg.edge_detection = None;
                cfg.debounce_period = None;
                cfg.event_clock = None;
            }
        }
        self
    }

    /// Set the value of the selected lines.
    ///
    /// This is only relevant for output lines and is ignored for input lines.
    pub fn with_value(&mut self, value: Value) -> &mut Self {
        self.for_selected(|cfg| cfg.value = Some(value))
    }

    /// Apply the configuration based on the snapshot from a single line.
    pub fn from_line_config(&mut self, lc: &line::Config) -> &mut Self {
        self.for_selected(|cfg| *cfg = lc.clone())
    }

    /// Get the configuration for a particular line.
    ///
    /// Returns None if the line has not been added to the config.
    pub fn line_config(&self, offset: Offset) -> Option<&line::Config> {
        self.lcfg.get(&offset)
    }

    /// The configuration applied to lines without their own configuration.
    pub fn base_config(&self) -> &line::Config {
        &self.base
    }

    /// Returns the set of lines described by the Config.
    ///
    /// Lines are in the order first added by calls to [`with_line`] or [`with_lines`].
    ///
    /// [`with_line`]: #method.with_line
    /// [`with_lines`]: #method.with_lines
    pub fn lines(&self) -> &Offsets {
        &self.offsets
    }

    /// Returns the number of lines currently described by the Config.
    pub fn num_lines(&self) -> usize {
        self.lcfg.len()
    }

    /// The requested kernel edge event buffer size.
    pub fn kernel_event_buffer_size(&self) -> u32 {
        self.kernel_event_buffer_size
    }

    fn for_selected<F: Fn(&mut line::Config)>(&mut self, f: F) -> &mut Self {
        if self.selected.is_empty() {
            f(&mut self.base);
        } else {
            for offset in &self.selected {
                if let Some(cfg) = self.lcfg.get_mut(offset) {
                    f(cfg);
                }
            }
        }
        self
    }

    fn remove_line(&mut self, offset: Offset) {
        self.lcfg.remove(&offset);
        self.selected.retain(|x| *x != offset);
        self.offsets.retain(|x| *x != offset);
    }

    fn select_line(&mut self, offset: Offset) {
        if !self.lcfg.contains_key(&offset) {
            self.lcfg.insert(offset, self.base.clone());
        }
        if !self.selected.contains(&offset) {
            self.selected.push(offset);
        }
        if !self.offsets.contains(&offset) {
            self.offsets.push(offset);
        }
    }

    fn line_config_or_base(&self, offset: &Offset) -> &line::Config {
        self.lcfg.get(offset).unwrap_or(&self.base)
    }

    /// Bind the config to the requested lines.
    ///
    /// The resolved config contains exactly the requested lines, in request order,
    /// each with its own config or a copy of the base.
    pub(crate) fn resolve(&self, offsets: &[Offset]) -> Result<Config> {
        if let Some(offset) = self.offsets.iter().find(|o| !offsets.contains(o)) {
            return Err(Error::InvalidArgument(format!(
                "line {} is configured but not requested.",
                offset
            )));
        }
        let mut cfg = Config {
            base: self.base.clone(),
            offsets: offsets.to_vec(),
            kernel_event_buffer_size: self.kernel_event_buffer_size,
            ..Default::default()
        };
        for offset in offsets {
            let lc = self.line_config_or_base(offset);
            lc.validate()?;
            cfg.lcfg.insert(*offset, lc.clone());
        }
        Ok(cfg)
    }

    /// Overlay one config over the applied config of a request.
    ///
    /// Lines configured in `top` take their config from `top`, other lines retain
    /// their existing config.  If `top` describes no lines then its base config
    /// applies to all lines.
    /// Lines cannot be added or removed.
    pub(crate) fn overlay(&self, top: &Config) -> Result<Config> {
        if let Some(offset) = top.offsets.iter().find(|o| !self.offsets.contains(o)) {
            return Err(Error::InvalidArgument(format!(
                "line {} is not in the request.",
                offset
            )));
        }
        let mut cfg = Config {
            base: self.base.clone(),
            offsets: self.offsets.clone(),
            kernel_event_buffer_size: self.kernel_event_buffer_size,
            ..Default::default()
        };
        for offset in &self.offsets {
            let lc = if top.offsets.is_empty() {
                &top.base
            } else {
                top.lcfg
                    .get(offset)
                    .unwrap_or_else(|| self.line_config_or_base(offset))
            };
            lc.validate()?;
            cfg.lcfg.insert(*offset, lc.clone());
        }
        Ok(cfg)
    }

    /// True if any line has edge detection enabled.
    pub(crate) fn has_edge_detection(&self) -> bool {
        self.offsets
            .iter()
            .any(|o| self.line_config_or_base(o).edge_detection.is_some())
    }

    /// The logical values of the output lines, indexed by position in the request.
    pub(crate) fn output_values(&self) -> Bitmask {
        let mut bits = Bitmask::default();
        for (idx, offset) in self.offsets.iter().enumerate() {
            let lc = self.line_config_or_base(offset);
            if lc.is_output() {
                bits.set(idx, lc.value().into());
            }
        }
        bits
    }

    /// Returns the config that applies to all lines, or an error if the lines have
    /// distinct configurations.
    pub(crate) fn unique(&self) -> Result<&line::Config> {
        let lcfg = match self.offsets.first() {
            Some(offset) => self.line_config_or_base(offset),
            None => &self.base,
        };
        for offset in self.offsets.iter().skip(1) {
            if !lcfg.equivalent(self.line_config_or_base(offset)) {
                return Err(Error::AbiLimitation(
                    AbiVersion::V1,
                    "requires all lines to share the same configuration".to_string(),
                ));
            }
        }
        Ok(lcfg)
    }

    // conversions to uapi

    // v1

    /// Check the config only uses features supported by ABI v1.
    ///
    /// Returns the config common to all lines.
    pub(crate) fn validate_v1(&self) -> Result<&line::Config> {
        if self.kernel_event_buffer_size != 0 {
            return Err(Error::AbiLimitation(
                AbiVersion::V1,
                "does not support setting event buffer size".to_string(),
            ));
        }
        let lcfg = self.unique()?;
        if lcfg.debounce_period_us()?.is_some() {
            return Err(Error::AbiLimitation(
                AbiVersion::V1,
                "does not support debounce".to_string(),
            ));
        }
        if lcfg
            .event_clock
            .is_some_and(|clk| clk != EventClock::Monotonic)
        {
            return Err(Error::AbiLimitation(
                AbiVersion::V1,
                "does not support selecting the event clock source".to_string(),
            ));
        }
        Ok(lcfg)
    }

    pub(crate) fn to_v1(&self) -> Result<v1::HandleConfig> {
        let lcfg = self.validate_v1()?;
        Ok(v1::HandleConfig {
            flags: lcfg.into(),
            values: self.to_v1_values(),
            ..Default::default()
        })
    }

    pub(crate) fn to_v1_values(&self) -> v1::LineValues {
        let mut values = v1::LineValues::default();
        for (idx, offset) in self.offsets.iter().enumerate() {
            values.set(idx, self.line_config_or_base(offset).value().into());
        }
        values
    }

    pub(crate) fn to_v1_handle_request(&self, consumer: &str) -> Result<v1::HandleRequest> {
        let lcfg = self.validate_v1()?;
        Ok(v1::HandleRequest {
            offsets: gpioline_uapi::Offsets::from_slice(&self.offsets),
            flags: lcfg.into(),
            values: self.to_v1_values(),
            consumer: consumer.into(),
            num_lines: self.offsets.len() as u32,
            ..Default::default()
        })
    }

    /// One event request per line, as v1 event requests are restricted to a single line.
    pub(crate) fn to_v1_event_requests(&self, consumer: &str) -> Result<Vec<v1::EventRequest>> {
        let lcfg = self.validate_v1()?;
        Ok(self
            .offsets
            .iter()
            .map(|offset| v1::EventRequest {
                offset: *offset,
                handleflags: lcfg.into(),
                eventflags: lcfg.into(),
                consumer: consumer.into(),
                ..Default::default()
            })
            .collect())
    }

    // v2
    pub(crate) fn to_v2(&self) -> Result<v2::LineConfig> {
        // Groups of lines sharing attribute values, in the order first seen.
        let mut flags: Vec<(v2::LineFlags, Bitmask)> = Vec::new();
        let mut debounced: Vec<(u32, Bitmask)> = Vec::new();
        let mut values = v2::LineValues::default();
        for (idx, offset) in self.offsets.iter().enumerate() {
            let lcfg = self.line_config_or_base(offset);
            let lflags = v2::LineFlags::from(lcfg);
            match flags.iter_mut().find(|(f, _)| *f == lflags) {
                Some((_, mask)) => mask.set(idx, true),
                None => flags.push((lflags, Bitmask::from_indices([idx]))),
            }
            if let Some(dp_us) = lcfg.debounce_period_us()? {
                match debounced.iter_mut().find(|(dp, _)| *dp == dp_us) {
                    Some((_, mask)) => mask.set(idx, true),
                    None => debounced.push((dp_us, Bitmask::from_indices([idx]))),
                }
            }
            if lcfg.is_output() {
                values.set(idx, lcfg.value().into());
            }
        }
        // one set of flags is carried as the base flags, not as an attr
        let mut num_attrs = flags.len().saturating_sub(1) + debounced.len();
        // Check bits, not mask, as kernel defaults values to 0 if not specified,
        // so all outputs set to inactive can be skipped.
        if !values.bits.is_empty() {
            num_attrs += 1;
        }
        if num_attrs > v2::NUM_ATTRS_MAX {
            return Err(Error::AbiLimitation(
                AbiVersion::V2,
                format!(
                    "supports {} attrs, configuration requires {}",
                    v2::NUM_ATTRS_MAX,
                    num_attrs
                ),
            ));
        }
        // flags with most lines set => base flags, first seen wins ties
        let mut max_lines = 0;
        let mut base_flags = v2::LineFlags::default();
        for (flg, mask) in &flags {
            if mask.len() > max_lines {
                max_lines = mask.len();
                base_flags = *flg;
            }
        }
        let mut cfg = v2::LineConfig {
            flags: base_flags,
            ..Default::default()
        };
        for (flg, mask) in &flags {
            if *flg != base_flags {
                cfg.add_flags(*flg, *mask);
            }
        }
        if !values.bits.is_empty() {
            cfg.add_values(&values);
        }
        for (dp_us, mask) in &debounced {
            cfg.add_debounce(*dp_us, *mask);
        }
        Ok(cfg)
    }

    pub(crate) fn to_v2_request(&self, consumer: &str) -> Result<v2::LineRequest> {
        Ok(v2::LineRequest {
            offsets: gpioline_uapi::Offsets::from_slice(&self.offsets),
            consumer: consumer.into(),
            config: self.to_v2()?,
            num_lines: self.offsets.len() as u32,
            event_buffer_size: self.kernel_event_buffer_size,
            ..Default::default()
        })
    }
}
