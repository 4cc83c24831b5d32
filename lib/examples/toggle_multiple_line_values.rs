// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of toggling multiple lines.

use anyhow::Context;
use gpioline::line::{Value, Values};
use gpioline::request::Config;
use gpioline::Chip;
use std::thread;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    let mut values: Values = [(22, Value::Active), (12, Value::Inactive)]
        .into_iter()
        .collect();
    // or equivalently...
    //let mut values = Values::default();
    //values.set(22, Value::Active).set(12, Value::Inactive);

    let mut chip = Chip::open("/dev/gpiochip0").context("Failed to open chip")?;
    chip.with_consumer("toggle-multiple-line-values");
    let mut cfg = Config::default();
    cfg.with_output_lines(&values);
    let req = chip
        .request(&[22, 12], &cfg)
        .context("Failed to request lines")?;

    loop {
        println!("{values:?}");
        thread::sleep(Duration::from_millis(500));
        for offset in [22, 12] {
            values.toggle(offset);
        }
        req.set_values(&values).context("Failed to set values")?;
    }
}
