mod common;

use common::{manager, manager_with, KEYFRAME_INTERVAL};
use crossbeam_channel::Receiver;
use myy_engine::core::{PlaybackState, PlayerConfig, PlayerError, PlayerEvent};
use std::thread;
use std::time::{Duration, Instant};

/// 收集事件直到 Finished 或超时，返回 (进度列表, Finished 次数)
fn collect_until_finished(events: &Receiver<PlayerEvent>, timeout: Duration) -> (Vec<f64>, usize) {
    let deadline = Instant::now() + timeout;
    let mut progress = Vec::new();
    let mut finished = 0;
    while Instant::now() < deadline {
        match events.recv_timeout(Duration::from_millis(50)) {
            Ok(PlayerEvent::Progress { current, .. }) => progress.push(current),
            Ok(PlayerEvent::Finished) => {
                finished += 1;
                break;
            }
            Err(_) => {}
        }
    }
    (progress, finished)
}

fn first_progress(events: &Receiver<PlayerEvent>, timeout: Duration) -> Option<f64> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(PlayerEvent::Progress { current, .. }) = events.recv_timeout(Duration::from_millis(50)) {
            return Some(current);
        }
    }
    None
}

#[test]
fn test_state_machine_transitions() {
    let (manager, _renderer) = manager();
    assert_eq!(manager.state(), PlaybackState::Stopped);

    // Stopped 时暂停不做任何事
    manager.pause();
    assert_eq!(manager.state(), PlaybackState::Stopped);

    // 没有打开文件
    assert!(matches!(manager.play(), Err(PlayerError::NoMedia)));

    let info = manager.open_file("synthetic:10").unwrap();
    assert_eq!(info.duration, 10.0);
    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert_eq!(manager.active_workers(), 0);

    manager.play().unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);
    assert_eq!(manager.active_workers(), 3);

    // 重复 play 不做任何事
    manager.play().unwrap();
    assert_eq!(manager.active_workers(), 3);

    manager.pause();
    assert_eq!(manager.state(), PlaybackState::Paused);
    manager.pause();
    assert_eq!(manager.state(), PlaybackState::Playing);

    manager.stop();
    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert_eq!(manager.active_workers(), 0);
    assert_eq!(manager.position(), 0.0);

    // 重复 stop 不做任何事
    manager.stop();
    assert_eq!(manager.state(), PlaybackState::Stopped);

    // 停止后再次播放会重新打开
    manager.play().unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);
    assert_eq!(manager.active_workers(), 3);
    manager.stop();
    assert_eq!(manager.active_workers(), 0);
}

#[test]
fn test_pause_freezes_clock() {
    let (manager, _renderer) = manager();
    manager.open_file("synthetic:10").unwrap();
    manager.play().unwrap();
    thread::sleep(Duration::from_millis(200));
    assert!(manager.position() > 0.0);

    manager.pause();
    thread::sleep(Duration::from_millis(50));
    let frozen = manager.position();
    thread::sleep(Duration::from_millis(150));
    assert_eq!(manager.position(), frozen);
    assert_eq!(manager.active_workers(), 3);

    manager.pause();
    thread::sleep(Duration::from_millis(150));
    assert!(manager.position() > frozen);

    manager.stop();
}

#[test]
fn test_seek_resets_clock_to_target() {
    let (manager, _renderer) = manager();
    let events = manager.events();
    manager.open_file("synthetic:10").unwrap();

    manager.seek(0.5).unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);
    assert_eq!(manager.active_workers(), 3);

    let position = manager.position();
    assert!((position - 5.0).abs() <= 0.05, "position = {}", position);

    let current = first_progress(&events, Duration::from_secs(3)).expect("没有收到进度");
    assert!(current >= 5.0, "current = {}", current);

    manager.stop();
    assert_eq!(manager.active_workers(), 0);
}

#[test]
fn test_seek_rebases_clock_on_keyframe() {
    let (manager, _renderer) = manager();
    manager.open_file("synthetic:10").unwrap();

    // 3.7s 之前最近的关键帧是 3.5s
    manager.seek(0.37).unwrap();
    thread::sleep(Duration::from_millis(50));

    let keyframe = (3.7f64 / KEYFRAME_INTERVAL).floor() * KEYFRAME_INTERVAL;
    let position = manager.position();
    assert!(
        position >= keyframe - 1e-6 && position < 3.7 + 0.2,
        "position = {}",
        position
    );

    manager.stop();
}

#[test]
fn test_seek_while_paused_resumes_playing() {
    let (manager, _renderer) = manager();
    manager.open_file("synthetic:10").unwrap();
    manager.play().unwrap();
    manager.pause();
    assert_eq!(manager.state(), PlaybackState::Paused);

    manager.seek(0.2).unwrap();
    assert_eq!(manager.state(), PlaybackState::Playing);
    assert_eq!(manager.active_workers(), 3);
    manager.stop();
}

#[test]
fn test_seek_without_media_is_noop() {
    let (manager, _renderer) = manager();
    manager.seek(0.5).unwrap();
    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert_eq!(manager.active_workers(), 0);
}

#[test]
fn test_end_to_end_finishes_exactly_once() {
    let (manager, renderer) = manager();
    let events = manager.events();
    manager.open_file("synthetic:1").unwrap();
    manager.play().unwrap();

    let (progress, finished) = collect_until_finished(&events, Duration::from_secs(10));
    assert_eq!(finished, 1);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[1] >= w[0]), "progress = {:?}", progress);
    assert!(progress.last().unwrap() > progress.first().unwrap());

    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert_eq!(manager.active_workers(), 0);
    assert!(renderer.frames_delivered() > 0);
    // 停止时清空画面
    assert!(!renderer.has_frame());

    // 不会再收到第二个 Finished
    thread::sleep(Duration::from_millis(300));
    assert!(events.try_iter().all(|e| e != PlayerEvent::Finished));
}

#[test]
fn test_stop_before_end_emits_no_finish() {
    let (manager, _renderer) = manager();
    let events = manager.events();
    manager.open_file("synthetic:1").unwrap();
    manager.play().unwrap();
    thread::sleep(Duration::from_millis(100));
    manager.stop();

    thread::sleep(Duration::from_millis(1500));
    assert!(events.try_iter().all(|e| e != PlayerEvent::Finished));
    assert_eq!(manager.state(), PlaybackState::Stopped);
}

#[test]
fn test_open_failures_leave_stopped() {
    let (manager, _renderer) = manager();

    let err = manager.open_file("missing").unwrap_err();
    assert!(matches!(err, PlayerError::OpenError(_)));
    assert!(err.is_open_error());
    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert!(manager.media_info().is_none());

    let err = manager.open_file("synthetic:no-audio").unwrap_err();
    assert!(matches!(err, PlayerError::NoAudioStream));

    // play 会尝试重新打开，同样失败
    assert!(manager.play().is_err());
    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert_eq!(manager.active_workers(), 0);
}

#[test]
fn test_corrupt_packets_are_skipped() {
    let (manager, renderer) = manager();
    let events = manager.events();
    manager.open_file("synthetic:1:corrupt").unwrap();
    manager.play().unwrap();

    let (progress, finished) = collect_until_finished(&events, Duration::from_secs(10));
    assert_eq!(finished, 1);
    assert!(!progress.is_empty());
    // 25 个视频包里有损坏的，它们的帧不会显示
    assert!(renderer.frames_delivered() < 25);
    assert_eq!(manager.active_workers(), 0);
}

#[test]
fn test_volume_is_clamped_and_remembered() {
    let (manager, _renderer) = manager();
    assert_eq!(manager.volume(), 1.0);

    manager.set_volume(1.5);
    assert_eq!(manager.volume(), 1.0);
    manager.set_volume(-0.5);
    assert_eq!(manager.volume(), 0.0);
    manager.set_volume(0.3);

    manager.open_file("synthetic:2").unwrap();
    manager.play().unwrap();
    assert_eq!(manager.volume(), 0.3);
    manager.stop();
}

#[test]
fn test_volume_change_reaches_live_sink() {
    let (manager, _renderer, sinks) = manager_with(PlayerConfig::default());
    manager.open_file("synthetic:5").unwrap();
    manager.play().unwrap();
    thread::sleep(Duration::from_millis(50));

    manager.set_volume(0.4);
    assert_eq!(sinks.latest().unwrap().volume(), 0.4);
    manager.set_volume(2.0);
    assert_eq!(sinks.latest().unwrap().volume(), 1.0);

    // 新会话沿用上次的音量
    manager.set_volume(0.25);
    manager.stop();
    let opened = sinks.count();
    manager.play().unwrap();
    assert_eq!(sinks.count(), opened + 1);
    assert_eq!(sinks.latest().unwrap().volume(), 0.25);
    manager.stop();
}

#[test]
fn test_undrained_events_stay_bounded() {
    let config = PlayerConfig {
        event_capacity: 4,
        ..PlayerConfig::default()
    };
    let (manager, renderer, _sinks) = manager_with(config);
    let events = manager.events();
    manager.open_file("synthetic:1").unwrap();
    manager.play().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.state() != PlaybackState::Stopped && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }
    // Finished 在状态切换之后才发出
    thread::sleep(Duration::from_millis(200));

    assert_eq!(manager.state(), PlaybackState::Stopped);
    assert!(renderer.frames_delivered() > 4);
    let pending: Vec<PlayerEvent> = events.try_iter().collect();
    assert!(pending.len() <= 4, "pending = {:?}", pending);
    assert_eq!(pending.last(), Some(&PlayerEvent::Finished));
    assert_eq!(pending.iter().filter(|e| **e == PlayerEvent::Finished).count(), 1);
}

#[test]
fn test_drop_joins_workers() {
    let (manager, _renderer) = manager();
    manager.open_file("synthetic:10").unwrap();
    manager.play().unwrap();
    thread::sleep(Duration::from_millis(50));

    let start = Instant::now();
    drop(manager);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_url_and_media_info() {
    let (manager, _renderer) = manager();
    assert!(manager.url().is_none());
    manager.open_file("synthetic:3").unwrap();
    assert_eq!(manager.url().as_deref(), Some("synthetic:3"));
    let info = manager.media_info().unwrap();
    assert_eq!(info.duration, 3.0);
    assert_eq!((info.width, info.height), (4, 4));
}
