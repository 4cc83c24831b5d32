// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of reading multiple lines.

use gpioline::request::Config;
use gpioline::Chip;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let offsets = [5, 3, 7];
    let mut chip = Chip::open("/dev/gpiochip0")?;
    chip.with_consumer("get-multiple-line-values");

    let req = chip.request(&offsets, Config::default().as_input())?;

    // values are returned in request order
    let values = req.values()?;
    for (offset, value) in offsets.iter().zip(values) {
        print!("{offset}={value} ");
    }
    println!();

    Ok(())
}
