// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of reading a single line.

use gpioline::line::Bias;
use gpioline::request::Config;
use gpioline::Chip;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let offset = 22;
    let mut chip = Chip::open("/dev/gpiochip0")?;
    chip.with_consumer("get-line-value");

    // request the line as an input
    let mut cfg = Config::default();
    cfg.as_input().with_bias(Bias::PullUp); // optionally set a pull-up or other attribute
    let req = chip.request(&[offset], &cfg)?;

    let value = req.value(offset)?;
    println!("{offset}={value}");

    Ok(())
}
