// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of finding a line with the given name.

fn main() -> gpioline::Result<()> {
    let line_name = "GPIO22";
    for path in gpioline::chip::chips()? {
        let chip = gpioline::Chip::open(&path)?;
        if let Some(info) = chip.find_line_info(line_name) {
            println!("{}: {} {}", line_name, chip.name(), info.offset);
            return Ok(());
        }
    }
    println!("line {} not found", line_name);
    Ok(())
}
