// SPDX-FileCopyrightText: 2023 Kent Gibson <warthog618@gmail.com>
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

// ALL IT as watchers require GPIO files to watch.
//
// Assumptions:
//  - kernel supports both uAPI v1 and v2

#[macro_use]
mod common;

use common::{assert_no_event, event_channel, new_chip, wait_propagation_delay, EVENT_WAIT_TIMEOUT};
use gpioline::line::{EdgeDetection, EdgeEvent, EdgeKind, InfoChangeEvent, InfoChangeKind, Value};
use gpioline::request::Config;
use gpioline::{AbiVersion, Error};
use gpiosim::Simpleton;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod edges {
    use super::*;

    mod uapi_v1 {
        use super::*;
        use gpioline::AbiVersion::V1;

        common_tests! {
            gpioline::AbiVersion::V1,
            edge_events,
            rising_edge_only,
            multiple_lines,
            watch_requires_edge_detection,
            watch_twice,
            unwatch,
            handler_calls_request,
            close_from_handler,
            close_stops_handler
        }

        #[test]
        fn no_sequence_numbers() {
            let s = Simpleton::new(4);
            let c = new_chip(s.dev_path(), V1);
            let mut cfg = Config::default();
            cfg.with_edge_detection(EdgeDetection::BothEdges);
            let (handler, rx) = event_channel::<EdgeEvent>();
            let req = c.request(&[1], &cfg).unwrap();
            req.watch_edges(handler).unwrap();

            s.toggle(1).unwrap();
            let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
            assert_eq!(evt.offset, 1);
            assert_eq!(evt.seqno, 0);
            assert_eq!(evt.line_seqno, 0);
        }
    }

    mod uapi_v2 {
        use super::*;
        use gpioline::AbiVersion::V2;

        common_tests! {
            gpioline::AbiVersion::V2,
            edge_events,
            rising_edge_only,
            multiple_lines,
            watch_requires_edge_detection,
            watch_twice,
            unwatch,
            handler_calls_request,
            close_from_handler,
            close_stops_handler
        }

        #[test]
        fn sequence_numbers() {
            let s = Simpleton::new(4);
            let c = new_chip(s.dev_path(), V2);
            let mut cfg = Config::default();
            cfg.with_edge_detection(EdgeDetection::BothEdges);
            let (handler, rx) = event_channel::<EdgeEvent>();
            let req = c.request(&[1, 2], &cfg).unwrap();
            req.watch_edges(handler).unwrap();

            for offset in [1, 2, 2, 1, 2] {
                s.toggle(offset).unwrap();
                wait_propagation_delay();
            }
            let evts: Vec<EdgeEvent> = (0..5)
                .map(|_| rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap())
                .collect();
            let offsets: Vec<u32> = evts.iter().map(|e| e.offset).collect();
            assert_eq!(offsets, vec![1, 2, 2, 1, 2]);
            let seqnos: Vec<u32> = evts.iter().map(|e| e.seqno).collect();
            assert_eq!(seqnos, vec![1, 2, 3, 4, 5]);
            let line_seqnos: Vec<u32> = evts.iter().map(|e| e.line_seqno).collect();
            assert_eq!(line_seqnos, vec![1, 1, 2, 2, 3]);
        }

        #[test]
        fn sequence_numbers_restart_with_request() {
            let s = Simpleton::new(4);
            let c = new_chip(s.dev_path(), V2);
            let mut cfg = Config::default();
            cfg.with_edge_detection(EdgeDetection::BothEdges);

            for _ in 0..2 {
                let (handler, rx) = event_channel::<EdgeEvent>();
                let req = c.request(&[2], &cfg).unwrap();
                req.watch_edges(handler).unwrap();
                s.toggle(2).unwrap();
                let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
                assert_eq!(evt.seqno, 1);
                assert_eq!(evt.line_seqno, 1);
                req.close().unwrap();
            }
        }

        #[test]
        fn debounce() {
            let s = Simpleton::new(4);
            let c = new_chip(s.dev_path(), V2);
            let mut cfg = Config::default();
            cfg.with_edge_detection(EdgeDetection::BothEdges)
                .with_debounce_period(Duration::from_millis(20));
            let (handler, rx) = event_channel::<EdgeEvent>();
            let req = c.request(&[1], &cfg).unwrap();
            req.watch_edges(handler).unwrap();

            // toggles faster than the debounce period are filtered
            s.toggle(1).unwrap();
            std::thread::sleep(Duration::from_millis(2));
            s.toggle(1).unwrap();
            std::thread::sleep(Duration::from_millis(2));
            s.toggle(1).unwrap();

            // the settled transition is reported once
            let evt = rx.recv_timeout(Duration::from_millis(100)).unwrap();
            assert_eq!(evt.kind, EdgeKind::Rising);
            assert_no_event(&rx);
        }

        #[test]
        fn reconfigure_while_watching() {
            let s = Simpleton::new(4);
            let c = new_chip(s.dev_path(), V2);
            let mut cfg = Config::default();
            cfg.with_edge_detection(EdgeDetection::BothEdges);
            let (handler, rx) = event_channel::<EdgeEvent>();
            let req = c.request(&[1], &cfg).unwrap();
            req.watch_edges(handler).unwrap();

            cfg.with_edge_detection(EdgeDetection::FallingEdge);
            req.reconfigure(&cfg).unwrap();

            s.toggle(1).unwrap();
            assert_no_event(&rx);
            s.toggle(1).unwrap();
            let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
            assert_eq!(evt.kind, EdgeKind::Falling);
        }
    }

    fn edge_request(s: &Simpleton, abiv: AbiVersion, offsets: &[u32]) -> gpioline::Request {
        let c = new_chip(s.dev_path(), abiv);
        let mut cfg = Config::default();
        cfg.with_edge_detection(EdgeDetection::BothEdges);
        c.request(offsets, &cfg).unwrap()
    }

    fn edge_events(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let offset = 2;
        let (handler, rx) = event_channel::<EdgeEvent>();
        let req = edge_request(&s, abiv, &[offset]);
        req.watch_edges(handler).unwrap();

        // 0 -> 1 -> 0 -> 1 -> 0
        for _ in 0..4 {
            s.toggle(offset).unwrap();
            wait_propagation_delay();
        }

        let mut last_ts = 0;
        for (idx, kind) in [
            EdgeKind::Rising,
            EdgeKind::Falling,
            EdgeKind::Rising,
            EdgeKind::Falling,
        ]
        .into_iter()
        .enumerate()
        {
            let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
            assert_eq!(evt.offset, offset);
            assert_eq!(evt.kind, kind);
            assert!(evt.timestamp_ns > last_ts);
            last_ts = evt.timestamp_ns;
            if abiv == AbiVersion::V2 {
                assert_eq!(evt.seqno, idx as u32 + 1);
                assert_eq!(evt.line_seqno, idx as u32 + 1);
            }
        }
        assert_no_event(&rx);
    }

    fn rising_edge_only(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let c = new_chip(s.dev_path(), abiv);
        let mut cfg = Config::default();
        cfg.with_edge_detection(EdgeDetection::RisingEdge);
        let (handler, rx) = event_channel::<EdgeEvent>();
        let req = c.request(&[1], &cfg).unwrap();
        req.watch_edges(handler).unwrap();

        for _ in 0..4 {
            s.toggle(1).unwrap();
            wait_propagation_delay();
        }
        for _ in 0..2 {
            let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
            assert_eq!(evt.kind, EdgeKind::Rising);
        }
        assert_no_event(&rx);
    }

    fn multiple_lines(abiv: AbiVersion) {
        let s = Simpleton::new(6);
        let offsets = [1, 3, 4];
        let (handler, rx) = event_channel::<EdgeEvent>();
        let req = edge_request(&s, abiv, &offsets);
        req.watch_edges(handler).unwrap();

        for offset in [4, 1, 3, 4] {
            s.toggle(offset).unwrap();
            wait_propagation_delay();
        }
        let evts: Vec<(u32, EdgeKind)> = (0..4)
            .map(|_| rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap())
            .map(|e| (e.offset, e.kind))
            .collect();
        assert_eq!(
            evts,
            vec![
                (4, EdgeKind::Rising),
                (1, EdgeKind::Rising),
                (3, EdgeKind::Rising),
                (4, EdgeKind::Falling)
            ]
        );
        assert_no_event(&rx);
    }

    fn watch_requires_edge_detection(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let c = new_chip(s.dev_path(), abiv);
        let req = c.request(&[1], Config::default().as_input()).unwrap();
        assert_eq!(
            req.watch_edges(|_| {}),
            Err(Error::InvalidArgument(
                "edge detection is not enabled on any requested line.".into()
            ))
        );
    }

    fn watch_twice(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let req = edge_request(&s, abiv, &[1]);
        req.watch_edges(|_| {}).unwrap();
        assert_eq!(
            req.watch_edges(|_| {}),
            Err(Error::InvalidArgument(
                "an edge handler is already registered.".into()
            ))
        );
    }

    fn unwatch(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let req = edge_request(&s, abiv, &[1]);

        // null operation if not watched
        req.unwatch_edges().unwrap();

        let (handler, rx) = event_channel::<EdgeEvent>();
        req.watch_edges(handler).unwrap();
        s.toggle(1).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, EdgeKind::Rising);

        req.unwatch_edges().unwrap();
        s.toggle(1).unwrap();
        assert_no_event(&rx);

        // and a new handler can then be registered
        let (handler, rx) = event_channel::<EdgeEvent>();
        req.watch_edges(handler).unwrap();
        s.toggle(1).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, EdgeKind::Rising);
    }

    fn handler_calls_request(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let req = Arc::new(edge_request(&s, abiv, &[1]));
        let (tx, rx) = event_channel::<(EdgeKind, Value)>();
        let wreq = Arc::downgrade(&req);
        req.watch_edges(move |evt| {
            if let Some(req) = wreq.upgrade() {
                tx((evt.kind, req.value(1).unwrap()));
            }
        })
        .unwrap();

        s.toggle(1).unwrap();
        assert_eq!(
            rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap(),
            (EdgeKind::Rising, Value::Active)
        );
        req.close().unwrap();
    }

    fn close_from_handler(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let req = Arc::new(edge_request(&s, abiv, &[1]));
        let (tx, rx) = event_channel::<Result<(), Error>>();
        let wreq = Arc::downgrade(&req);
        req.watch_edges(move |_| {
            if let Some(req) = wreq.upgrade() {
                tx(req.close());
                tx(req.unwatch_edges());
            }
        })
        .unwrap();

        s.toggle(1).unwrap();
        assert_eq!(
            rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap(),
            Err(Error::InvalidArgument(
                "cannot close a request from within its edge handler.".into()
            ))
        );
        assert_eq!(
            rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap(),
            Err(Error::InvalidArgument(
                "cannot unwatch edges from within the edge handler.".into()
            ))
        );
        // still usable
        assert_eq!(req.value(1).unwrap(), Value::Active);
        req.close().unwrap();
    }

    fn close_stops_handler(abiv: AbiVersion) {
        let s = Simpleton::new(3);
        let count = Arc::new(Mutex::new(0));
        let hcount = count.clone();
        let req = edge_request(&s, abiv, &[1]);
        req.watch_edges(move |_| {
            *hcount.lock().unwrap() += 1;
        })
        .unwrap();

        s.toggle(1).unwrap();
        wait_propagation_delay();
        s.toggle(1).unwrap();
        std::thread::sleep(EVENT_WAIT_TIMEOUT);
        req.close().unwrap();
        let seen = *count.lock().unwrap();
        assert_eq!(seen, 2);

        s.toggle(1).unwrap();
        wait_propagation_delay();
        assert_eq!(*count.lock().unwrap(), seen);
    }
}

mod info {
    use super::*;

    mod uapi_v1 {
        common_tests! {
            gpioline::AbiVersion::V1,
            info_changes,
            watch_twice,
            unwatch,
            handler_calls_chip,
            close
        }
    }

    mod uapi_v2 {
        common_tests! {
            gpioline::AbiVersion::V2,
            info_changes,
            watch_twice,
            unwatch,
            handler_calls_chip,
            close
        }
    }

    fn info_changes(abiv: AbiVersion) {
        let s = Simpleton::new(4);
        let c = new_chip(s.dev_path(), abiv);
        let offset = 2;
        let (handler, rx) = event_channel::<InfoChangeEvent>();

        let info = c.watch_line_info(offset, handler).unwrap();
        assert_eq!(info.offset, offset);
        assert!(!info.used);

        // requests from another chip
        let rc = new_chip(s.dev_path(), abiv);
        let mut cfg = Config::default();
        cfg.as_input();
        let req = rc.request(&[offset], &cfg).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, InfoChangeKind::Requested);
        assert_eq!(evt.info.offset, offset);
        assert!(evt.info.used);
        assert_eq!(evt.info.consumer, rc.consumer());

        cfg.as_output(Value::Active);
        req.reconfigure(&cfg).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, InfoChangeKind::Reconfigured);
        assert_eq!(evt.info.direction, gpioline::line::Direction::Output);

        req.close().unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, InfoChangeKind::Released);
        assert!(!evt.info.used);

        // lines not watched are not reported
        let req = rc.request(&[1], &Config::default()).unwrap();
        assert_no_event(&rx);
        drop(req);
    }

    fn watch_twice(abiv: AbiVersion) {
        let s = Simpleton::new(4);
        let c = new_chip(s.dev_path(), abiv);
        c.watch_line_info(1, |_| {}).unwrap();
        assert_eq!(
            c.watch_line_info(1, |_| {}).unwrap_err(),
            Error::InvalidArgument("line 1 is already watched.".into())
        );
        // other lines are independent
        c.watch_line_info(2, |_| {}).unwrap();
    }

    fn unwatch(abiv: AbiVersion) {
        let s = Simpleton::new(4);
        let c = new_chip(s.dev_path(), abiv);
        let rc = new_chip(s.dev_path(), abiv);
        let (handler, rx) = event_channel::<InfoChangeEvent>();

        // null operation if not watched
        c.unwatch_line_info(1).unwrap();

        c.watch_line_info(1, handler).unwrap();
        let req = rc.request(&[1], &Config::default()).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, InfoChangeKind::Requested);

        c.unwatch_line_info(1).unwrap();
        drop(req);
        assert_no_event(&rx);

        // and can be watched again
        let (handler, rx) = event_channel::<InfoChangeEvent>();
        c.watch_line_info(1, handler).unwrap();
        let req = rc.request(&[1], &Config::default()).unwrap();
        let evt = rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap();
        assert_eq!(evt.kind, InfoChangeKind::Requested);
        drop(req);
    }

    fn handler_calls_chip(abiv: AbiVersion) {
        let s = Simpleton::new(4);
        let c = Arc::new(new_chip(s.dev_path(), abiv));
        let rc = new_chip(s.dev_path(), abiv);
        let (tx, rx) = event_channel::<(InfoChangeKind, bool, Result<(), Error>)>();
        let wc = Arc::downgrade(&c);
        c.watch_line_info(3, move |evt| {
            if let Some(c) = wc.upgrade() {
                let used = c.line_info(3).is_ok_and(|info| info.used);
                tx((evt.kind, used, c.close()));
            }
        })
        .unwrap();

        let req = rc.request(&[3], &Config::default()).unwrap();
        assert_eq!(
            rx.recv_timeout(EVENT_WAIT_TIMEOUT).unwrap(),
            (
                InfoChangeKind::Requested,
                true,
                Err(Error::InvalidArgument(
                    "cannot close a chip from within its info change handler.".into()
                ))
            )
        );
        c.unwatch_line_info(3).unwrap();
        drop(req);
        c.close().unwrap();
    }

    fn close(abiv: AbiVersion) {
        let s = Simpleton::new(4);
        let c = new_chip(s.dev_path(), abiv);
        let rc = new_chip(s.dev_path(), abiv);
        let (handler, rx) = event_channel::<InfoChangeEvent>();

        c.watch_line_info(1, handler).unwrap();
        c.close().unwrap();
        assert_eq!(c.unwatch_line_info(1), Err(Error::AlreadyClosed));

        let req = rc.request(&[1], &Config::default()).unwrap();
        assert_no_event(&rx);
        drop(req);
    }
}
