// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(dead_code)]

use gpioline::{AbiVersion, Chip};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::time::Duration;

// max time to allow events to propagate from the sim to cdev
const PROPAGATION_DELAY: Duration = Duration::from_millis(10);

// max time to wait for an event - expected or not
pub const EVENT_WAIT_TIMEOUT: Duration = Duration::from_millis(50);

pub fn wait_propagation_delay() {
    std::thread::sleep(PROPAGATION_DELAY);
}

pub fn new_chip<P: AsRef<Path>>(path: P, abiv: AbiVersion) -> Chip {
    Chip::open_with_abi(path, abiv).unwrap()
}

/// A handler that forwards events to a channel, and the receiving end of that channel.
pub fn event_channel<T: Send + 'static>() -> (impl Fn(T) + Send + Sync + 'static, Receiver<T>) {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let handler = move |evt: T| {
        // the receiver may already be gone at the end of a test
        _ = tx.lock().unwrap().send(evt);
    };
    (handler, rx)
}

/// Assert no further events arrive.
pub fn assert_no_event<T: std::fmt::Debug>(rx: &Receiver<T>) {
    match rx.recv_timeout(EVENT_WAIT_TIMEOUT) {
        Err(RecvTimeoutError::Timeout) => {}
        res => panic!("unexpected event: {:?}", res),
    }
}

// Run each named test against the given ABI version.
macro_rules! common_tests {
    ($abiv:expr, $($name:ident),*) => {
        $(
            #[test]
            fn $name() {
                super::$name($abiv)
            }
        )*
    }
}
