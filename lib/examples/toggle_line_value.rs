// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of toggling a single line.

use anyhow::Context;
use gpioline::line::Value;
use gpioline::request::Config;
use gpioline::Chip;
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let offset = 22;
    let mut value = Value::Active;

    let mut chip = Chip::open("/dev/gpiochip0").context("Failed to open chip")?;
    chip.with_consumer("toggle-line-value");
    let mut cfg = Config::default();
    cfg.as_output(value);
    let req = chip
        .request(&[offset], &cfg)
        .context("Failed to request line")?;

    loop {
        println!("{}={}", offset, value);
        thread::sleep(Duration::from_millis(500));
        value = value.not();
        req.set_value(offset, value)
            .context("Failed to set value")?;
    }
}
