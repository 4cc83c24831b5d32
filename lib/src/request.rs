// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod config;
pub use self::config::Config;

use crate::line::{self, EdgeEvent, Offset, Value, Values};
use crate::watcher::Watcher;
use crate::{AbiVersion, Error, Result, UapiCall};
use gpioline_uapi::{v1, v2, Bitmask};
use log::{debug, warn};
use std::fmt;
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard};

/// An active request of a set of lines.
///
/// Requests are issued by [`Chip::request`](crate::Chip::request), and inherit the
/// ABI version of the chip.
///
/// # Output Lifetime
///
/// The value of an output line is only guaranteed for the lifetime of the request.
/// If the request is closed or dropped then the output value becomes indeterminate - it may
/// remain unchanged or it may reset to the default value (depending on a number of factors
/// including the kernel driver for your hardware and whether other lines on the chip are
/// still requested).
///
/// So keep the request alive to be sure of the output value.
///
/// # Edge Events
///
/// Edge events are delivered to a handler registered with [`watch_edges`], which is called
/// from a watcher thread.  Under ABI v2 the events carry sequence numbers, and a gap in
/// the sequence indicates the kernel event buffer overflowed.
///
/// # Reading Output Values
///
/// Note that reading back output values using [`value`] or [`values`] is dependent on driver
/// and hardware support and so cannot be guaranteed to work, though frequently it does.
/// Test with your particular hardware to be sure.
///
/// [`watch_edges`]: #method.watch_edges
/// [`value`]: #method.value
/// [`values`]: #method.values
pub struct Request {
    /// The lines in the request, in request order.
    offsets: Vec<Offset>,

    /// The ABI version of the chip the request was issued from.
    abiv: AbiVersion,

    state: Mutex<RequestState>,
}

struct RequestState {
    /// None once the request is closed.
    files: Option<RequestFiles>,

    /// The configuration applied to the lines.
    cfg: Config,

    /// The last logical values set on output lines, indexed by position.
    cache: Bitmask,

    watcher: Option<Watcher>,
}

/// The kernel files backing a request.
enum RequestFiles {
    /// A v1 line handle covering all lines.
    Handle(Arc<File>),

    /// v1 event requests, one per line, in request order.
    Events(Vec<Arc<File>>),

    /// A v2 line request covering all lines.
    Line(Arc<File>),
}

impl Request {
    /// Issue a request for lines from the chip.
    ///
    /// The config must have been resolved for the offsets.
    pub(crate) fn issue(
        cf: &File,
        abiv: AbiVersion,
        consumer: &str,
        cfg: Config,
    ) -> Result<Request> {
        let files = match abiv {
            AbiVersion::V1 => {
                if cfg.has_edge_detection() {
                    let mut files = Vec::with_capacity(cfg.offsets.len());
                    for er in cfg.to_v1_event_requests(consumer)? {
                        let f = v1::get_line_event(cf, er)
                            .map_err(|e| Error::Uapi(UapiCall::GetLineEvent, e))?;
                        files.push(Arc::new(f));
                    }
                    RequestFiles::Events(files)
                } else {
                    let f = v1::get_line_handle(cf, cfg.to_v1_handle_request(consumer)?)
                        .map_err(|e| Error::Uapi(UapiCall::GetLineHandle, e))?;
                    RequestFiles::Handle(Arc::new(f))
                }
            }
            AbiVersion::V2 => {
                let f = v2::get_line(cf, cfg.to_v2_request(consumer)?)
                    .map_err(|e| Error::Uapi(UapiCall::GetLine, e))?;
                RequestFiles::Line(Arc::new(f))
            }
        };
        debug!("requested lines {:?} using {}", cfg.offsets, abiv);
        Ok(Request {
            offsets: cfg.offsets.clone(),
            abiv,
            state: Mutex::new(RequestState {
                files: Some(files),
                cache: cfg.output_values(),
                cfg,
                watcher: None,
            }),
        })
    }

    /// The offsets of the requested lines, in request order.
    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    /// The ABI version used by the request.
    pub fn abi_version(&self) -> AbiVersion {
        self.abiv
    }

    /// Get a snapshot of the requested configuration.
    ///
    /// This is the configuration currently applied to the hardware.
    pub fn config(&self) -> Config {
        self.lock().cfg.clone()
    }

    /// Get a snapshot of the requested configuration for a particular line.
    ///
    /// This is the configuration currently applied to the line.
    pub fn line_config(&self, offset: Offset) -> Option<line::Config> {
        self.lock().cfg.line_config(offset).cloned()
    }

    /// Return true if the request has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().files.is_none()
    }

    /// Get the value for one line in the request.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let req = chip.request(&[3, 5], &Config::default())?;
    /// let v5 = req.value(5)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn value(&self, offset: Offset) -> Result<Value> {
        let idx = self.position(offset)?;
        let state = self.lock();
        let bits = self.get_values(&state, Bitmask::from_indices([idx]))?;
        Ok(bits.get(idx).into())
    }

    /// Get the value for the lone line in the request.
    ///
    /// This is a simplified version of [`value`] for single line requests,
    /// so the line offset is not required.
    ///
    /// [`value`]: #method.value
    pub fn lone_value(&self) -> Result<Value> {
        let offset = self.lone_offset()?;
        self.value(offset)
    }

    /// Get the values of all the requested lines, in request order.
    pub fn values(&self) -> Result<Vec<Value>> {
        let state = self.lock();
        let bits = self.get_values(&state, Bitmask::lower(self.offsets.len()))?;
        Ok((0..self.offsets.len())
            .map(|idx| bits.get(idx).into())
            .collect())
    }

    /// Get the values for a subset of the requested lines.
    ///
    /// The keys of `values` indicate the lines to get, and must all be
    /// requested lines.  If no keys are set then all requested lines are returned.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{line::Values, request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let req = chip.request(&[3, 5, 6, 8], &Config::default())?;
    /// // subset of lines
    /// let mut values = Values::from_offsets(&[3, 8]);
    /// req.values_into(&mut values)?;
    /// // all requested lines
    /// let mut values = Values::default();
    /// req.values_into(&mut values)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn values_into(&self, values: &mut Values) -> Result<()> {
        if values.is_empty() {
            *values = Values::from_offsets(&self.offsets);
        }
        let mask = self.mask_of(values)?;
        let state = self.lock();
        let bits = self.get_values(&state, mask)?;
        for idx in mask {
            values.set(self.offsets[idx], bits.get(idx).into());
        }
        Ok(())
    }

    /// Set the value for one line in the request.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{line::Value, request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let mut cfg = Config::default();
    /// cfg.as_output(Value::Active);
    /// let req = chip.request(&[5, 6], &cfg)?;
    /// req.set_value(5, Value::Inactive)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_value(&self, offset: Offset, value: Value) -> Result<()> {
        let idx = self.position(offset)?;
        let mut bits = Bitmask::default();
        bits.set(idx, value.into());
        let mut state = self.lock();
        self.set_masked_values(&mut state, Bitmask::from_indices([idx]), bits)
    }

    /// Set the value for the lone line in the request.
    ///
    /// This is a simplified version of [`set_value`] intended for single line requests,
    /// so the line offset is not required.
    ///
    /// [`set_value`]: #method.set_value
    pub fn set_lone_value(&self, value: Value) -> Result<()> {
        let offset = self.lone_offset()?;
        self.set_value(offset, value)
    }

    /// Set the values for a subset of the requested lines.
    ///
    /// Lines not contained in `values` are left unchanged.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{line::{Value::{Active, Inactive}, Values}, request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let mut cfg = Config::default();
    /// cfg.as_output(Active);
    /// let req = chip.request(&[3, 5, 6, 8], &cfg)?;
    /// let mut values = Values::default();
    /// values.set(5, Inactive).set(6, Inactive);
    /// req.set_values(&values)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn set_values(&self, values: &Values) -> Result<()> {
        if values.is_empty() {
            return Err(Error::InvalidArgument("no lines to set.".into()));
        }
        let mask = self.mask_of(values)?;
        let mut bits = Bitmask::default();
        for idx in mask {
            bits.set(idx, values.get(self.offsets[idx]).unwrap_or_default().into());
        }
        let mut state = self.lock();
        self.set_masked_values(&mut state, mask, bits)
    }

    /// Reconfigure the request with an updated configuration.
    ///
    /// Lines configured in `new_cfg` take that configuration, while lines it does not
    /// describe retain their existing configuration.  If `new_cfg` describes no lines
    /// then its base configuration is applied to all lines.
    /// Lines cannot be added to or removed from the request.
    ///
    /// Requests for edge events cannot be reconfigured with ABI v1.
    pub fn reconfigure(&self, new_cfg: &Config) -> Result<()> {
        let mut state = self.lock();
        let cfg = match state.files.as_ref() {
            None => return Err(Error::AlreadyClosed),
            Some(RequestFiles::Events(_)) => {
                return Err(Error::Permission(
                    "cannot reconfigure a v1 edge event request.".into(),
                ))
            }
            Some(RequestFiles::Handle(f)) => {
                let cfg = state.cfg.overlay(new_cfg)?;
                if cfg.has_edge_detection() {
                    return Err(Error::AbiLimitation(
                        AbiVersion::V1,
                        "cannot enable edge detection on a line handle".into(),
                    ));
                }
                v1::set_line_config(f, cfg.to_v1()?)
                    .map_err(|e| Error::Uapi(UapiCall::SetLineConfig, e))?;
                cfg
            }
            Some(RequestFiles::Line(f)) => {
                let cfg = state.cfg.overlay(new_cfg)?;
                v2::set_line_config(f, cfg.to_v2()?)
                    .map_err(|e| Error::Uapi(UapiCall::SetLineConfig, e))?;
                cfg
            }
        };
        // only update request config if reconfigure succeeds.
        state.cache = cfg.output_values();
        state.cfg = cfg;
        debug!("reconfigured lines {:?}", self.offsets);
        Ok(())
    }

    /// Watch the request for edge events.
    ///
    /// The handler is called from a watcher thread for each edge event, in the order
    /// the kernel reports them.
    /// The handler may call back into the request, other than to [`close`] it.
    ///
    /// Requires edge detection to be enabled on at least one line.
    /// Only one handler may be registered at a time.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{line::EdgeDetection, request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let mut cfg = Config::default();
    /// cfg.with_edge_detection(EdgeDetection::BothEdges);
    /// let req = chip.request(&[5], &cfg)?;
    /// req.watch_edges(|edge| println!("{:?}", edge))?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// [`close`]: #method.close
    pub fn watch_edges<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(EdgeEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let files = state.files.as_ref().ok_or(Error::AlreadyClosed)?;
        if state.watcher.is_some() {
            return Err(Error::InvalidArgument(
                "an edge handler is already registered.".into(),
            ));
        }
        if !state.cfg.has_edge_detection() {
            return Err(Error::InvalidArgument(
                "edge detection is not enabled on any requested line.".into(),
            ));
        }
        let watcher = match files {
            RequestFiles::Events(files) => {
                let offsets = self.offsets.clone();
                Watcher::spawn(
                    AbiVersion::V1,
                    files.clone(),
                    v1::LineEdgeEvent::SIZE,
                    move |idx, buf| {
                        let le = v1::LineEdgeEvent::from_slice(buf)
                            .map_err(|e| Error::Uapi(UapiCall::LEEFromBuf, e))?;
                        let offset = offsets.get(idx).copied().ok_or_else(|| {
                            Error::UnexpectedResponse(format!("event from unknown file {}", idx))
                        })?;
                        handler(EdgeEvent::from_v1(&le, offset));
                        Ok(())
                    },
                )?
            }
            RequestFiles::Line(f) => Watcher::spawn(
                AbiVersion::V2,
                vec![f.clone()],
                v2::LineEdgeEvent::SIZE,
                move |_, buf| {
                    let le = v2::LineEdgeEvent::from_slice(buf)
                        .map_err(|e| Error::Uapi(UapiCall::LEEFromBuf, e))?;
                    handler(EdgeEvent::from(&le));
                    Ok(())
                },
            )?,
            RequestFiles::Handle(_) => {
                return Err(Error::InvalidArgument(
                    "edge detection is not enabled on any requested line.".into(),
                ))
            }
        };
        state.watcher = Some(watcher);
        Ok(())
    }

    /// Stop watching the request for edge events.
    ///
    /// Blocks until any in-progress handler call returns.
    /// Cannot be called from the handler itself.
    pub fn unwatch_edges(&self) -> Result<()> {
        let watcher = {
            let mut state = self.lock();
            if state.files.is_none() {
                return Err(Error::AlreadyClosed);
            }
            if state.watcher.as_ref().is_some_and(|w| w.is_current_thread()) {
                return Err(Error::InvalidArgument(
                    "cannot unwatch edges from within the edge handler.".into(),
                ));
            }
            state.watcher.take()
        };
        if let Some(mut w) = watcher {
            if let Err(e) = w.close() {
                // still running, so keep it bound to the request
                let mut state = self.lock();
                if state.watcher.is_none() {
                    state.watcher = Some(w);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Release the requested lines.
    ///
    /// Stops any edge watcher, then closes the request files.
    /// Subsequent operations on the request return [`Error::AlreadyClosed`].
    ///
    /// Cannot be called from the edge handler.
    pub fn close(&self) -> Result<()> {
        let (watcher, files) = {
            let mut state = self.lock();
            if state.files.is_none() {
                return Err(Error::AlreadyClosed);
            }
            if state.watcher.as_ref().is_some_and(|w| w.is_current_thread()) {
                return Err(Error::InvalidArgument(
                    "cannot close a request from within its edge handler.".into(),
                ));
            }
            (state.watcher.take(), state.files.take())
        };
        // the watcher must be stopped before the files are closed
        if let Some(mut w) = watcher {
            if let Err(e) = w.close() {
                // the request remains open
                let mut state = self.lock();
                state.watcher = Some(w);
                state.files = files;
                return Err(e);
            }
        }
        drop(files);
        debug!("released lines {:?}", self.offsets);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, RequestState> {
        self.state
            .lock()
            .expect("failed to acquire request state lock")
    }

    fn position(&self, offset: Offset) -> Result<usize> {
        self.offsets
            .iter()
            .position(|o| *o == offset)
            .ok_or_else(|| Error::InvalidArgument(format!("line {} is not in the request.", offset)))
    }

    fn lone_offset(&self) -> Result<Offset> {
        match self.offsets.as_slice() {
            [offset] => Ok(*offset),
            _ => Err(Error::InvalidArgument(
                "request contains multiple lines.".into(),
            )),
        }
    }

    // The positions of the lines in values.
    fn mask_of(&self, values: &Values) -> Result<Bitmask> {
        let mut mask = Bitmask::default();
        for (offset, _) in values.iter() {
            mask.set(self.position(*offset)?, true);
        }
        Ok(mask)
    }

    // Read the values of the lines selected by mask.
    fn get_values(&self, state: &RequestState, mask: Bitmask) -> Result<Bitmask> {
        let mut bits = Bitmask::default();
        match state.files.as_ref().ok_or(Error::AlreadyClosed)? {
            RequestFiles::Handle(f) => {
                let mut vals = v1::LineValues::default();
                v1::get_line_values(f, &mut vals)
                    .map_err(|e| Error::Uapi(UapiCall::GetLineValues, e))?;
                for idx in mask {
                    bits.set(idx, vals.get(idx) != 0);
                }
            }
            RequestFiles::Events(files) => {
                for idx in mask {
                    let f = files.get(idx).ok_or(Error::AlreadyClosed)?;
                    let mut vals = v1::LineValues::default();
                    v1::get_line_values(f, &mut vals)
                        .map_err(|e| Error::Uapi(UapiCall::GetLineValues, e))?;
                    bits.set(idx, vals.get(0) != 0);
                }
            }
            RequestFiles::Line(f) => {
                let mut vals = v2::LineValues {
                    mask,
                    ..Default::default()
                };
                v2::get_line_values(f, &mut vals)
                    .map_err(|e| Error::Uapi(UapiCall::GetLineValues, e))?;
                bits = vals.bits & mask;
            }
        }
        Ok(bits)
    }

    // Set the values of the lines selected by mask, and update the cache.
    fn set_masked_values(
        &self,
        state: &mut RequestState,
        mask: Bitmask,
        bits: Bitmask,
    ) -> Result<()> {
        let cache = (state.cache & !mask) | (bits & mask);
        match state.files.as_ref().ok_or(Error::AlreadyClosed)? {
            RequestFiles::Events(_) => {
                return Err(Error::Permission(
                    "cannot set values on a v1 edge event request.".into(),
                ))
            }
            RequestFiles::Handle(f) => {
                // v1 sets all lines, so unchanged lines take their cached value
                let mut vals = v1::LineValues::default();
                for idx in 0..self.offsets.len() {
                    vals.set(idx, cache.get(idx).into());
                }
                v1::set_line_values(f, &vals)
                    .map_err(|e| Error::Uapi(UapiCall::SetLineValues, e))?;
            }
            RequestFiles::Line(f) => {
                let vals = v2::LineValues { bits, mask };
                v2::set_line_values(f, &vals)
                    .map_err(|e| Error::Uapi(UapiCall::SetLineValues, e))?;
            }
        }
        state.cache = cache;
        Ok(())
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("offsets", &self.offsets)
            .field("abiv", &self.abiv)
            .finish_non_exhaustive()
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("failed to close request for lines {:?}: {}", self.offsets, e);
        }
    }
}
