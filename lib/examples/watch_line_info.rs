// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of watching for info changes on multiple lines.

use gpioline::Chip;
use std::thread;
use std::time::Duration;

fn main() -> gpioline::Result<()> {
    let chip = Chip::open("/dev/gpiochip0")?;
    for offset in [10, 11, 12] {
        let info = chip.watch_line_info(offset, |event| {
            println!("{:?} {:?}", event.kind, event.info);
        })?;
        println!("{:?}", info);
    }

    // events are handled by the chip's watcher until the chip is dropped
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
