// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::line::{self, InfoChangeEvent, Offset};
use crate::request::{Config, Request};
use crate::watcher::Watcher;
use crate::{AbiVersion, Error, Result, UapiCall};
use gpioline_uapi::{self as uapi, v1, v2, NUM_LINES_MAX};
use log::{debug, trace, warn};
use nohash_hasher::IntMap;
use std::fmt;
use std::fs::{self, File};
use std::ops::Range;
use std::os::linux::fs::MetadataExt;
use std::os::unix::prelude::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

const CHARDEV_MODE: u32 = 0x2000;

/// Check if a path corresponds to a GPIO character device.
///
/// Returns the resolved path to the character device.
pub fn is_chip<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let pb = fs::canonicalize(&path)?;
    let m = fs::metadata(&pb)?;
    if m.st_mode() & CHARDEV_MODE == 0 {
        return Err(Error::GpioChip(pb, ErrorKind::NotCharacterDevice));
    }
    let name = match pb.file_name() {
        Some(name) => name,
        None => return Err(Error::GpioChip(pb, ErrorKind::NotGpioDevice)),
    };
    let mut sysfs_dev = PathBuf::from("/sys/bus/gpio/devices");
    sysfs_dev.push(name);
    sysfs_dev.push("dev");
    if let Ok(rdev) = fs::read_to_string(sysfs_dev) {
        let (major, minor) = dev_numbers(m.st_rdev());
        if rdev.trim_end() == format!("{}:{}", major, minor) {
            return Ok(pb);
        }
    }
    Err(Error::GpioChip(pb, ErrorKind::NotGpioDevice))
}

// Split a device number into its major and minor numbers.
fn dev_numbers(rdev: u64) -> (u32, u32) {
    (libc::major(rdev as libc::dev_t), libc::minor(rdev as libc::dev_t))
}

/// Compare two chip paths.
///
// Sorts paths naturally, assuming any chip numbering is at the end of the path - as it is for gpiochips.
pub fn path_compare(a: &Path, b: &Path) -> std::cmp::Ordering {
    let a = a.as_os_str().as_bytes();
    let b = b.as_os_str().as_bytes();

    if a.len() == b.len() {
        return a.cmp(b);
    }
    for (ai, bi) in a.iter().zip(b.iter()) {
        if *ai != *bi {
            if !ai.is_ascii_digit() || !bi.is_ascii_digit() {
                // a non-digit difference is definitive
                return ai.cmp(bi);
            }
            break;
        }
    }
    // shorter numbers are smaller
    a.len().cmp(&b.len())
}

/// Returns the paths of all the GPIO character devices on the system.
///
/// The returned paths are sorted in name order and are confirmed to be GPIO character devices,
/// so there is no need to check them with [`is_chip`].
pub fn chips() -> Result<Vec<PathBuf>> {
    let mut chips = fs::read_dir("/dev")?
        .filter_map(|x| x.ok())
        .flat_map(|de| is_chip(de.path()))
        .collect::<Vec<PathBuf>>();
    chips.sort_unstable_by(|a, b| path_compare(a, b));
    chips.dedup();
    Ok(chips)
}

/// An iterator that returns the info for each line on the [`Chip`].
pub struct LineInfoIterator<'a> {
    chip: &'a Chip,
    offsets: Range<Offset>,
}

impl Iterator for LineInfoIterator<'_> {
    type Item = Result<line::Info>;

    fn next(&mut self) -> Option<Result<line::Info>> {
        self.offsets
            .next()
            .map(|offset| self.chip.line_info(offset))
    }
}

type InfoHandler = dyn Fn(InfoChangeEvent) + Send + Sync;

/// A GPIO character device.
///
/// The uAPI ABI version is determined when the chip is opened and is used
/// for all subsequent operations on the chip, including the requests it issues.
///
/// Line info queries and info watch registration are serialised by the chip.
/// Info change handlers are called from a watcher thread, without the chip lock held,
/// so they may call back into the chip.
pub struct Chip {
    /// The resolved path of the GPIO character device.
    path: PathBuf,

    /// The info read when the chip was opened.
    info: Info,

    abiv: AbiVersion,

    /// The consumer label applied to requests.
    consumer: String,

    state: Arc<Mutex<ChipState>>,
}

struct ChipState {
    /// None once the chip is closed.
    f: Option<Arc<File>>,

    /// The info change handlers, keyed by line offset.
    handlers: IntMap<Offset, Arc<InfoHandler>>,

    /// Started by the first info watch.
    watcher: Option<Watcher>,
}

impl Chip {
    /// Open the chip at the given path.
    ///
    /// The path must resolve to a valid GPIO character device.
    /// The most recent ABI version supported by the kernel is used.
    ///
    /// # Examples
    ///```no_run
    /// # fn example() -> gpioline::Result<gpioline::Chip>{
    /// let chip = gpioline::Chip::open("/dev/gpiochip0")?;
    /// # Ok(chip)
    /// # }
    ///```
    pub fn open<P: AsRef<Path>>(p: P) -> Result<Chip> {
        Chip::do_open(p.as_ref(), None)
    }

    /// Open the chip at the given path, using a particular ABI version.
    ///
    /// The kernel is not probed so the ABI version is assumed to be supported.
    pub fn open_with_abi<P: AsRef<Path>>(p: P, abiv: AbiVersion) -> Result<Chip> {
        Chip::do_open(p.as_ref(), Some(abiv))
    }

    /// Open the chip using its name, such as "*gpiochip0*".
    ///
    /// The name must resolve to a valid GPIO character device.
    ///
    /// # Examples
    ///```no_run
    /// # fn example() -> gpioline::Result<gpioline::Chip>{
    /// let chip = gpioline::Chip::from_name("gpiochip0")?;
    /// # Ok(chip)
    /// # }
    ///```
    pub fn from_name(n: &str) -> Result<Chip> {
        Chip::open(format!("/dev/{}", n))
    }

    fn do_open(p: &Path, abiv: Option<AbiVersion>) -> Result<Chip> {
        let path = is_chip(p)?;
        let f = File::open(&path)?;
        let info = Info::from(
            uapi::get_chip_info(&f).map_err(|e| Error::Uapi(UapiCall::GetChipInfo, e))?,
        );
        let abiv = match abiv {
            Some(abiv) => abiv,
            None => detect_abi_version(&f),
        };
        debug!("opened {:?} using {}", path, abiv);
        Ok(Chip {
            path,
            info,
            abiv,
            consumer: format!("gpioline-p{}", std::process::id()),
            state: Arc::new(Mutex::new(ChipState {
                f: Some(Arc::new(f)),
                handlers: IntMap::default(),
                watcher: None,
            })),
        })
    }

    /// Get the information for the chip.
    ///
    /// This is read when the chip is opened, so does not involve any system calls.
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Return the system name of the chip, such as "*gpiochip0*".
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Return the functional name of the chip.
    pub fn label(&self) -> &str {
        &self.info.label
    }

    /// Return the number of lines on the chip.
    pub fn num_lines(&self) -> u32 {
        self.info.num_lines
    }

    /// Return the resolved path of the chip.
    pub fn path(&self) -> &Path {
        self.path.as_ref()
    }

    /// Return the ABI version used by the chip and its requests.
    pub fn abi_version(&self) -> AbiVersion {
        self.abiv
    }

    /// Return the consumer label applied to requests issued by the chip.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Set the consumer label applied to subsequent requests.
    ///
    /// The kernel truncates labels longer than 31 characters.
    pub fn with_consumer(&mut self, consumer: &str) -> &mut Self {
        self.consumer = consumer.into();
        self
    }

    /// Return true if the chip has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().f.is_none()
    }

    /// Get the information for a line on the chip.
    pub fn line_info(&self, offset: Offset) -> Result<line::Info> {
        let state = self.lock();
        let f = state.f.as_ref().ok_or(Error::AlreadyClosed)?;
        match self.abiv {
            AbiVersion::V1 => v1::get_line_info(f, offset).map(|li| line::Info::from(&li)),
            AbiVersion::V2 => v2::get_line_info(f, offset).map(|li| line::Info::from(&li)),
        }
        .map_err(|e| Error::Uapi(UapiCall::GetLineInfo, e))
    }

    /// An iterator that returns the info for each line on the chip.
    pub fn line_info_iter(&self) -> LineInfoIterator<'_> {
        LineInfoIterator {
            chip: self,
            offsets: 0..self.info.num_lines,
        }
    }

    /// Find the info for the named line.
    ///
    /// Returns the first matching line.
    pub fn find_line_info(&self, name: &str) -> Option<line::Info> {
        self.line_info_iter()
            .filter_map(|x| x.ok())
            .find(|li| li.name == name)
    }

    /// Request a set of lines.
    ///
    /// The offsets must be unique, within the range of the chip, and there may be
    /// no more than 64 of them.  Lines configured in `cfg` must all be requested.
    ///
    /// Lines that are already requested, by this or any other process, cause the
    /// request to fail with the kernel error.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// # use gpioline::{line::{Bias, Value}, request::Config, Chip};
    /// let chip = Chip::open("/dev/gpiochip0")?;
    /// let mut cfg = Config::default();
    /// cfg.as_input()
    ///     .with_bias(Bias::PullUp)
    ///     .with_line(6)
    ///     .as_output(Value::Active);
    /// let req = chip.request(&[3, 5, 6], &cfg)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn request(&self, offsets: &[Offset], cfg: &Config) -> Result<Request> {
        self.validate_offsets(offsets)?;
        let cfg = cfg.resolve(offsets)?;
        let f = self.lock().f.clone().ok_or(Error::AlreadyClosed)?;
        Request::issue(&f, self.abiv, &self.consumer, cfg)
    }

    fn validate_offsets(&self, offsets: &[Offset]) -> Result<()> {
        if offsets.is_empty() {
            return Err(Error::InvalidArgument("no lines requested.".into()));
        }
        if offsets.len() > NUM_LINES_MAX {
            return Err(Error::InvalidArgument(format!(
                "requests are limited to {} lines, {} requested.",
                NUM_LINES_MAX,
                offsets.len()
            )));
        }
        for (idx, offset) in offsets.iter().enumerate() {
            if *offset >= self.info.num_lines {
                return Err(Error::InvalidArgument(format!(
                    "line {} is out of range for a chip with {} lines.",
                    offset, self.info.num_lines
                )));
            }
            if offsets[..idx].contains(offset) {
                return Err(Error::InvalidArgument(format!(
                    "line {} is requested more than once.",
                    offset
                )));
            }
        }
        Ok(())
    }

    /// Watch a line for changes to its info.
    ///
    /// The handler is called from the chip's info watcher thread for each change,
    /// in the order the kernel reports them.
    /// The info watcher is started by the first watch on the chip.
    ///
    /// Returns the current info for the line.
    ///
    /// # Examples
    /// ```no_run
    /// # fn example() -> gpioline::Result<()> {
    /// let chip = gpioline::Chip::open("/dev/gpiochip0")?;
    /// let info = chip.watch_line_info(4, |ice| println!("{:?}", ice))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn watch_line_info<F>(&self, offset: Offset, handler: F) -> Result<line::Info>
    where
        F: Fn(InfoChangeEvent) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let f = state.f.clone().ok_or(Error::AlreadyClosed)?;
        if state.handlers.contains_key(&offset) {
            return Err(Error::InvalidArgument(format!(
                "line {} is already watched.",
                offset
            )));
        }
        if state.watcher.is_none() {
            state.watcher = Some(self.spawn_info_watcher(f.clone())?);
        }
        let info = match self.abiv {
            AbiVersion::V1 => v1::watch_line_info(&f, offset).map(|li| line::Info::from(&li)),
            AbiVersion::V2 => v2::watch_line_info(&f, offset).map(|li| line::Info::from(&li)),
        }
        .map_err(|e| Error::Uapi(UapiCall::WatchLineInfo, e))?;
        state.handlers.insert(offset, Arc::new(handler));
        Ok(info)
    }

    /// Stop watching a line for changes to its info.
    ///
    /// This is a null operation if the line is not watched.
    pub fn unwatch_line_info(&self, offset: Offset) -> Result<()> {
        let mut state = self.lock();
        let f = state.f.clone().ok_or(Error::AlreadyClosed)?;
        if !state.handlers.contains_key(&offset) {
            return Ok(());
        }
        // the handler remains registered while the kernel still has the watch
        uapi::unwatch_line_info(&f, offset)
            .map_err(|e| Error::Uapi(UapiCall::UnwatchLineInfo, e))?;
        state.handlers.remove(&offset);
        Ok(())
    }

    fn spawn_info_watcher(&self, f: Arc<File>) -> Result<Watcher> {
        let state: Weak<Mutex<ChipState>> = Arc::downgrade(&self.state);
        let abiv = self.abiv;
        let event_size = match abiv {
            AbiVersion::V1 => v1::LineInfoChangeEvent::SIZE,
            AbiVersion::V2 => v2::LineInfoChangeEvent::SIZE,
        };
        Watcher::spawn(abiv, vec![f], event_size, move |_, buf| {
            let ice = match abiv {
                AbiVersion::V1 => v1::LineInfoChangeEvent::from_slice(buf)
                    .map(|ice| InfoChangeEvent::from(&ice)),
                AbiVersion::V2 => v2::LineInfoChangeEvent::from_slice(buf)
                    .map(|ice| InfoChangeEvent::from(&ice)),
            }
            .map_err(|e| Error::Uapi(UapiCall::LICEFromBuf, e))?;
            // the handler is called without the chip lock held
            match info_handler(&state, ice.info.offset) {
                Some(handler) => handler(ice),
                None => trace!("no handler for info change on line {}", ice.info.offset),
            }
            Ok(())
        })
    }

    /// Close the chip.
    ///
    /// Stops the info watcher, if any, then closes the chip file.
    /// Requests issued by the chip are unaffected.
    ///
    /// Cannot be called from an info change handler.
    pub fn close(&self) -> Result<()> {
        let (watcher, f) = {
            let mut state = self.lock();
            if state.f.is_none() {
                return Err(Error::AlreadyClosed);
            }
            if state.watcher.as_ref().is_some_and(|w| w.is_current_thread()) {
                return Err(Error::InvalidArgument(
                    "cannot close a chip from within its info change handler.".into(),
                ));
            }
            (state.watcher.take(), state.f.take())
        };
        if let Some(mut w) = watcher {
            if let Err(e) = w.close() {
                // the chip remains open
                let mut state = self.lock();
                state.watcher = Some(w);
                state.f = f;
                return Err(e);
            }
        }
        self.lock().handlers.clear();
        drop(f);
        debug!("closed {:?}", self.path);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, ChipState> {
        self.state.lock().expect("failed to acquire chip state lock")
    }
}

fn info_handler(state: &Weak<Mutex<ChipState>>, offset: Offset) -> Option<Arc<InfoHandler>> {
    let chip = state.upgrade()?;
    let guard = chip.lock().expect("failed to acquire chip state lock");
    guard.handlers.get(&offset).cloned()
}

// Prefer v2, falling back to v1 if the kernel cannot answer a v2 query.
fn detect_abi_version(f: &File) -> AbiVersion {
    match v2::get_line_info(f, 0) {
        Ok(_) => AbiVersion::V2,
        Err(e) => {
            debug!("v2 line info probe failed ({}), falling back to v1", e);
            AbiVersion::V1
        }
    }
}

impl fmt::Debug for Chip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chip")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("abiv", &self.abiv)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

impl Drop for Chip {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!("failed to close {:?}: {}", self.path, e);
        }
    }
}

/// The publicly available information for a GPIO chip.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Info {
    /// The system name for the chip, such as "*gpiochip0*".
    pub name: String,

    /// A functional name for the chip.
    ///
    /// This typically identifies the type of GPIO chip.
    pub label: String,

    /// The number of lines provided by the chip.
    pub num_lines: u32,
}

impl From<uapi::ChipInfo> for Info {
    fn from(ci: uapi::ChipInfo) -> Self {
        Info {
            name: String::from(&ci.name),
            label: String::from(&ci.label),
            num_lines: ci.num_lines,
        }
    }
}

/// Reasons a file cannot be opened as a GPIO character device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// File is not a character device.
    NotCharacterDevice,

    /// File is not a GPIO character device.
    NotGpioDevice,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            ErrorKind::NotCharacterDevice => "is not a character device",
            ErrorKind::NotGpioDevice => "is not a GPIO character device",
        };
        write!(f, "{}", msg)
    }
}
