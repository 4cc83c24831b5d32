// SPDX-FileCopyrightText: 2022 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// Basic example of watching for edge events on a single line.

use anyhow::Context;
use gpioline::line::EdgeDetection;
use gpioline::request::Config;
use gpioline::Chip;
use std::sync::mpsc;
use std::sync::Mutex;

fn main() -> anyhow::Result<()> {
    let mut chip = Chip::open("/dev/gpiochip0").context("Failed to open chip")?;
    chip.with_consumer("watch-line-value");

    // request the line with edge detection to receive events
    let mut cfg = Config::default();
    cfg.with_edge_detection(EdgeDetection::BothEdges);
    let req = chip
        .request(&[23], &cfg)
        .context("Failed to request line")?;

    // the handler is called from the watcher thread, so forward events to main
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    req.watch_edges(move |event| {
        _ = tx.lock().unwrap().send(event);
    })
    .context("Failed to watch line")?;

    for event in rx {
        println!("{:?}", event);
    }
    Ok(())
}
