// SPDX-FileCopyrightText: 2021 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{uapi, AbiVersion, Error, Result};
use log::{debug, trace, warn};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use std::fs::File;
use std::io::Write;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

// Token for the shutdown descriptor.  Watched files use their index + 1.
const SHUTDOWN: Token = Token(0);

// The number of events read from a file in one read.
const EVENT_BATCH: usize = 16;

/// The lifecycle of a watcher.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum State {
    /// The poll set is built but the thread is not yet polling.
    Created,
    /// The thread is waiting on, or dispatching, events.
    Polling,
    /// Shutdown has been signalled.
    Closing,
    /// The thread has exited.
    Terminated,
}

// The descriptor used to unblock the poll on shutdown.
enum Shutdown {
    // Write end of a self-pipe.  The read end is owned by the thread.
    Pipe(File),
    // An eventfd registered with the poll.
    Waker(Waker),
}

impl Shutdown {
    fn signal(&self) -> std::io::Result<()> {
        match self {
            Shutdown::Pipe(tx) => {
                let mut tx = tx;
                tx.write_all(&[1])
            }
            Shutdown::Waker(waker) => waker.wake(),
        }
    }
}

/// A thread dispatching the events read from one or more files.
///
/// The thread blocks in a poll on the files and a shutdown descriptor.
/// Events are decoded and dispatched by the `dispatch` closure provided at spawn,
/// which is called on the watcher thread.
pub(crate) struct Watcher {
    shutdown: Shutdown,
    thread: Option<JoinHandle<()>>,
    state: Arc<Mutex<State>>,
}

impl Watcher {
    /// Start a thread watching the files.
    ///
    /// `event_size` is the size of the events read from the files.
    /// `dispatch` is called with the index of the file in `files` and the raw event,
    /// for each event read.
    ///
    /// The shutdown descriptor is a self-pipe for ABI v1 and an eventfd for v2.
    pub(crate) fn spawn<D>(
        abiv: AbiVersion,
        files: Vec<Arc<File>>,
        event_size: usize,
        dispatch: D,
    ) -> Result<Watcher>
    where
        D: FnMut(usize, &[u8]) -> Result<()> + Send + 'static,
    {
        let poll = Poll::new()?;
        for (idx, f) in files.iter().enumerate() {
            poll.registry().register(
                &mut SourceFd(&f.as_raw_fd()),
                Token(idx + 1),
                Interest::READABLE,
            )?;
        }
        let (shutdown, rx) = match abiv {
            AbiVersion::V1 => {
                let (rx, tx) = pipe()?;
                poll.registry().register(
                    &mut SourceFd(&rx.as_raw_fd()),
                    SHUTDOWN,
                    Interest::READABLE,
                )?;
                (Shutdown::Pipe(tx), Some(rx))
            }
            AbiVersion::V2 => (Shutdown::Waker(Waker::new(poll.registry(), SHUTDOWN)?), None),
        };
        let state = Arc::new(Mutex::new(State::Created));
        let tstate = state.clone();
        let thread = thread::Builder::new()
            .name("gpioline-watcher".into())
            .spawn(move || run(poll, files, event_size, dispatch, tstate, rx))?;
        debug!("watcher started using {}", abiv);
        Ok(Watcher {
            shutdown,
            thread: Some(thread),
            state,
        })
    }

    /// The current state of the watcher.
    pub(crate) fn state(&self) -> State {
        *self.state.lock().expect("failed to acquire watcher state lock")
    }

    /// Return true if called from the watcher thread, i.e. from within a handler.
    pub(crate) fn is_current_thread(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|t| t.thread().id() == thread::current().id())
    }

    /// Stop the watcher thread.
    ///
    /// Blocks until any in-progress dispatch completes and the thread exits.
    /// Cannot be called from the watcher thread.
    pub(crate) fn close(&mut self) -> Result<()> {
        if self.is_current_thread() {
            return Err(Error::InvalidArgument(
                "cannot close a watcher from within its own handler.".into(),
            ));
        }
        if self.thread.is_none() {
            return Ok(());
        }
        let prev = self.state();
        self.set_state(State::Closing);
        if let Err(e) = self.shutdown.signal() {
            // the thread is still running, and still owned by the watcher
            *self.state.lock().expect("failed to acquire watcher state lock") = prev;
            return Err(e.into());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watcher thread panicked");
                self.set_state(State::Terminated);
            }
        }
        debug!("watcher closed");
        Ok(())
    }

    fn set_state(&self, state: State) {
        set_state(&self.state, state);
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        if self.is_current_thread() {
            // Dropped from a handler, so the thread exits once the handler returns.
            self.set_state(State::Closing);
            if let Err(e) = self.shutdown.signal() {
                warn!("failed to signal watcher shutdown: {}", e);
            }
            self.thread = None;
            return;
        }
        if let Err(e) = self.close() {
            warn!("failed to close watcher: {}", e);
        }
    }
}

fn set_state(state: &Mutex<State>, new: State) {
    let mut state = state.lock().expect("failed to acquire watcher state lock");
    // closing takes precedence over polling, as the thread may start late
    if !(new == State::Polling && *state != State::Created) {
        *state = new;
    }
}

fn pipe() -> Result<(File, File)> {
    let mut fds = [0; 2];
    // SAFETY: fds is sized for the two descriptors returned.
    match unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } {
        // SAFETY: the descriptors are newly created and owned by the returned files.
        0 => Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) }),
        _ => Err(std::io::Error::last_os_error().into()),
    }
}

fn run<D>(
    mut poll: Poll,
    files: Vec<Arc<File>>,
    event_size: usize,
    mut dispatch: D,
    state: Arc<Mutex<State>>,
    // Held until the thread exits so the shutdown pipe remains open.
    _shutdown_rx: Option<File>,
) where
    D: FnMut(usize, &[u8]) -> Result<()>,
{
    set_state(&state, State::Polling);
    let mut events = Events::with_capacity(files.len() + 1);
    let mut buf = vec![0_u8; event_size * EVENT_BATCH];
    'poll: loop {
        match poll.poll(&mut events, None) {
            Err(e) => {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    warn!("watcher poll failed: {}", e);
                    break;
                }
            }
            Ok(()) => {
                for event in &events {
                    if event.token() == SHUTDOWN {
                        break 'poll;
                    }
                    let idx = usize::from(event.token()) - 1;
                    if let Some(f) = files.get(idx) {
                        drain(f, idx, event_size, &mut buf, &mut dispatch);
                    }
                }
            }
        }
    }
    set_state(&state, State::Terminated);
    debug!("watcher terminated");
}

// Read and dispatch events until the file has none available.
fn drain<D>(f: &File, idx: usize, event_size: usize, buf: &mut [u8], dispatch: &mut D)
where
    D: FnMut(usize, &[u8]) -> Result<()>,
{
    while uapi::has_event(f).unwrap_or(false) {
        let n = match uapi::read_event(f, buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(uapi::Error::Os(errno)) if errno.0 == libc::EAGAIN => return,
            Err(e) => {
                warn!("failed to read event: {}", e);
                return;
            }
        };
        let chunks = buf[..n].chunks_exact(event_size);
        if !chunks.remainder().is_empty() {
            warn!(
                "read {} bytes, not a multiple of the {} byte event size",
                n, event_size
            );
        }
        for chunk in chunks {
            trace!("dispatching event from file {}", idx);
            if let Err(e) = dispatch(idx, chunk) {
                warn!("skipped undecodable event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn wait_for_state(w: &Watcher, state: State) {
        let start = std::time::Instant::now();
        while w.state() != state {
            assert!(start.elapsed() < TIMEOUT, "timeout waiting for {:?}", state);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn dispatches(abiv: AbiVersion) {
        let (rx0, mut tx0) = pipe().unwrap();
        let (rx1, mut tx1) = pipe().unwrap();
        // keep the read ends open after the watcher exits
        let files = vec![Arc::new(rx0), Arc::new(rx1)];
        let (sender, receiver) = mpsc::channel();
        let mut w = Watcher::spawn(
            abiv,
            files.clone(),
            2,
            move |idx, evt| {
                sender.send((idx, evt.to_vec())).unwrap();
                Ok(())
            },
        )
        .unwrap();
        wait_for_state(&w, State::Polling);

        tx1.write_all(&[1, 2]).unwrap();
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), (1, vec![1, 2]));

        // multiple events in one read, dispatched in order
        tx0.write_all(&[3, 4, 5, 6]).unwrap();
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), (0, vec![3, 4]));
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), (0, vec![5, 6]));

        assert!(w.close().is_ok());
        assert_eq!(w.state(), State::Terminated);
        // no further dispatch
        tx0.write_all(&[7, 8]).unwrap();
        assert!(receiver.recv_timeout(Duration::from_millis(20)).is_err());

        // second close is a no-op
        assert!(w.close().is_ok());
    }

    #[test]
    fn dispatches_v1() {
        dispatches(AbiVersion::V1);
    }

    #[test]
    fn dispatches_v2() {
        dispatches(AbiVersion::V2);
    }

    #[test]
    fn dispatch_errors_are_skipped() {
        let (rx, mut tx) = pipe().unwrap();
        let (sender, receiver) = mpsc::channel();
        let mut w = Watcher::spawn(AbiVersion::V2, vec![Arc::new(rx)], 1, move |_, evt| {
            if evt[0] == 0 {
                return Err(Error::UnexpectedResponse("bad event".into()));
            }
            sender.send(evt[0]).unwrap();
            Ok(())
        })
        .unwrap();
        tx.write_all(&[0, 1, 0, 2]).unwrap();
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), 1);
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), 2);
        assert_eq!(w.state(), State::Polling);
        assert!(w.close().is_ok());
    }

    #[test]
    fn close_from_handler() {
        let (rx, mut tx) = pipe().unwrap();
        let (sender, receiver) = mpsc::channel();
        let shared: Arc<Mutex<Option<Watcher>>> = Arc::default();
        let hshared = shared.clone();
        let w = Watcher::spawn(AbiVersion::V1, vec![Arc::new(rx)], 1, move |_, _| {
            let mut guard = hshared.lock().unwrap();
            let res = guard.as_mut().map(|w| w.close());
            sender.send(res).unwrap();
            Ok(())
        })
        .unwrap();
        *shared.lock().unwrap() = Some(w);

        tx.write_all(&[1]).unwrap();
        let res = receiver.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(
            res,
            Some(Err(Error::InvalidArgument(
                "cannot close a watcher from within its own handler.".into()
            )))
        );
        let mut w = shared.lock().unwrap().take().unwrap();
        assert_eq!(w.state(), State::Polling);
        assert!(w.close().is_ok());
        assert_eq!(w.state(), State::Terminated);
    }

    #[test]
    fn close_retains_thread_if_signal_fails() {
        let (rx, mut tx) = pipe().unwrap();
        let (sender, receiver) = mpsc::channel();
        let mut w = Watcher::spawn(AbiVersion::V1, vec![Arc::new(rx)], 1, move |_, evt| {
            sender.send(evt[0]).unwrap();
            Ok(())
        })
        .unwrap();
        wait_for_state(&w, State::Polling);

        // the read end of a pipe cannot be written
        let (bad, _bad_tx) = pipe().unwrap();
        let shutdown = std::mem::replace(&mut w.shutdown, Shutdown::Pipe(bad));
        assert!(w.close().is_err());
        assert!(w.thread.is_some());
        assert_eq!(w.state(), State::Polling);

        // still dispatching
        tx.write_all(&[3]).unwrap();
        assert_eq!(receiver.recv_timeout(TIMEOUT).unwrap(), 3);

        w.shutdown = shutdown;
        assert!(w.close().is_ok());
        assert!(w.thread.is_none());
        assert_eq!(w.state(), State::Terminated);
    }

    #[test]
    fn drop_stops_thread() {
        let (rx, _tx) = pipe().unwrap();
        let rx = Arc::new(rx);
        let w = Watcher::spawn(AbiVersion::V2, vec![rx.clone()], 1, |_, _| Ok(())).unwrap();
        wait_for_state(&w, State::Polling);
        assert_eq!(Arc::strong_count(&rx), 2);
        drop(w);
        // the thread has released its reference
        assert_eq!(Arc::strong_count(&rx), 1);
    }
}
