mod common;

use std::time::Duration;

use common::{ManualTimer, loader, pattern, uf2};
use moto::Action;
use moto::bootloader::Lights;
use moto_common::memory::FIRMWARE_ADDRESS;

const OFF: Lights = Lights { backlight: false, flashlight: false };

#[test]
fn flashlight_is_on_at_startup() {
    let timer = ManualTimer::new();
    let mut loader = loader(&timer);
    assert_eq!(loader.poll(), Action::Continue);
    assert_eq!(loader.lights(), Lights { flashlight: true, ..OFF });
}

#[test]
fn ready_light_follows_first_configuration_only() {
    let timer = ManualTimer::new();
    let mut loader = loader(&timer);

    loader.on_configured();
    assert!(loader.lights().backlight);

    timer.advance(Duration::from_secs(19));
    loader.on_configured();
    loader.poll();
    assert!(loader.lights().backlight);

    timer.advance(Duration::from_secs(1));
    loader.poll();
    assert!(!loader.lights().backlight);

    loader.on_configured();
    loader.poll();
    assert!(!loader.lights().backlight);
}

#[test]
fn flashlight_blinks_during_transfer_then_holds() {
    let timer = ManualTimer::new();
    let mut loader = loader(&timer);
    loader.write_sector(0, &uf2(FIRMWARE_ADDRESS, 0, 2, &pattern(0)).0).unwrap();

    let mut levels = Vec::new();
    for _ in 0..4 {
        timer.advance(Duration::from_millis(50));
        loader.poll();
        levels.push(loader.lights().flashlight);
    }
    assert_eq!(levels, [false, true, false, true]);

    timer.advance(Duration::from_millis(20));
    loader.poll();
    assert!(loader.lights().flashlight);

    timer.advance(Duration::from_millis(50));
    loader.poll();
    assert!(!loader.lights().flashlight);

    loader
        .write_sector(0, &uf2(FIRMWARE_ADDRESS + 256, 1, 2, &pattern(1)).0)
        .unwrap();
    for _ in 0..3 {
        timer.advance(Duration::from_millis(50));
        loader.poll();
        assert!(loader.lights().flashlight);
    }
}

#[test]
fn reset_follows_firmware_completion_after_grace_period() {
    let timer = ManualTimer::new();
    let mut loader = loader(&timer);
    loader.write_sector(0, &uf2(FIRMWARE_ADDRESS, 0, 1, &pattern(0)).0).unwrap();
    assert!(loader.reset_pending());

    timer.advance(Duration::from_millis(499));
    assert_eq!(loader.poll(), Action::Continue);

    // a second transfer does not push the deadline out
    loader.write_sector(0, &uf2(FIRMWARE_ADDRESS, 0, 1, &pattern(1)).0).unwrap();

    timer.advance(Duration::from_millis(1));
    assert_eq!(loader.poll(), Action::Reset);
    assert!(!loader.lights().flashlight);
    assert_eq!(loader.poll(), Action::Reset);
}

#[test]
fn data_completion_never_resets() {
    let timer = ManualTimer::new();
    let mut loader = loader(&timer);
    loader.write_sector(0, &uf2(0x4000, 0, 1, &pattern(0)).0).unwrap();

    timer.advance(Duration::from_secs(5));
    assert_eq!(loader.poll(), Action::Continue);
    assert!(loader.lights().flashlight);
}
