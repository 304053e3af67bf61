mod common;

use common::{ManualTimer, loader, pattern, uf2};
use moto::logging::{LogRing, RingSubscriber};
use moto_common::memory::FIRMWARE_ADDRESS;
use tracing::Dispatch;
use tracing::dispatcher;
use tracing::level_filters::LevelFilter;

fn fetch_text<const N: usize>(ring: &LogRing<N>) -> String {
    let mut out = vec![0; N];
    let n = ring.fetch(&mut out);
    out.truncate(n);
    String::from_utf8(out).unwrap()
}

#[test]
fn refused_blocks_are_logged() {
    static RING: LogRing<1024> = LogRing::new();
    static SUBSCRIBER: RingSubscriber<1024> = RingSubscriber::new(&RING, LevelFilter::INFO);

    dispatcher::with_default(&Dispatch::new(SUBSCRIBER), || {
        let timer = ManualTimer::new();
        let mut loader = loader(&timer);
        let _ = loader.write_sector(7, &uf2(FIRMWARE_ADDRESS, 0, 473, &pattern(0)).0);
    });

    let text = fetch_text(&RING);
    assert!(text.starts_with("INFO moto::bootloader: bootloader started\r\n"), "{text}");
    let refused = text.lines().find(|l| l.contains("block refused")).unwrap();
    assert!(refused.starts_with("WARN moto::bootloader:"), "{refused}");
    assert!(refused.contains("sector=7"), "{refused}");
    assert!(refused.contains("block_no=0"), "{refused}");
}

#[test]
fn level_filter_drops_debug_events() {
    static RING: LogRing<1024> = LogRing::new();
    static SUBSCRIBER: RingSubscriber<1024> = RingSubscriber::new(&RING, LevelFilter::INFO);

    dispatcher::with_default(&Dispatch::new(SUBSCRIBER), || {
        let timer = ManualTimer::new();
        let mut loader = loader(&timer);
        loader.write_sector(0, &uf2(FIRMWARE_ADDRESS, 0, 2, &pattern(0)).0).unwrap();
    });

    let text = fetch_text(&RING);
    assert!(text.contains("transfer started"), "{text}");
    assert!(text.contains("target=firmware"), "{text}");
    assert!(!text.contains("programmed"), "{text}");
}
