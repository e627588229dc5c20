//! Integration tests for the frameplayer media player
//!
//! These tests drive complete players through their public API:
//! - Loading, readiness and notification order
//! - Frame delivery on both render paths
//! - Seeking, looping and rate control
//! - Error reporting, construction failures and teardown

use anyhow::Result;
use frameplayer::engine::affinity::WORKER_THREAD_NAME;
use frameplayer::engine::{
    EngineAttributes, EngineCreateFlags, EngineEvent, EngineFactory, MediaEngine, SeekMode,
    SyntheticEngineFactory, SyntheticOptions,
};
use frameplayer::player::live_player_count;
use frameplayer::utils::Config;
use frameplayer::{
    error_to_string, Bounds, ErrorCode, MediaFormat, MediaPlayerBuilder, MediaSource, PlayerError,
    PlayerEvent, UpdateSignal,
};
use frameplayer_integration_tests::{expected_pattern, surface_image, ConfigDir, EventLog, PlayerFixture};
use mockall::mock;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

mock! {
    pub Factory {}

    impl EngineFactory for Factory {
        fn create_engine(
            &self,
            flags: EngineCreateFlags,
            attributes: EngineAttributes,
            source: &MediaSource,
        ) -> frameplayer::Result<Arc<dyn MediaEngine>>;
    }
}

fn short_clip(duration: f64) -> SyntheticOptions {
    SyntheticOptions {
        duration,
        ..SyntheticOptions::default()
    }
}

fn software() -> MediaFormat {
    MediaFormat::default().hardware_accelerated(false)
}

#[test]
#[serial]
fn test_player_initialization() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let player = &fixture.player;

    assert!(fixture.control.is_loaded());
    assert!(!player.is_ready());
    assert!(!player.is_playing());
    assert!(player.is_paused());
    assert_eq!(player.duration_in_seconds(), 0.0);
    assert_eq!(player.bounds(), Bounds::default());
    assert!(!player.check_new_frame());
    assert!(!player.texture().is_valid());
    assert_eq!(player.last_error(), ErrorCode::NoError);

    Ok(())
}

#[test]
#[serial]
fn test_ready_arrives_first_in_fifo_order() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let (log, _subscription) = EventLog::attach(&fixture.player);

    fixture.player.play();
    fixture.player.pause();
    assert!(log.events().is_empty(), "nothing is delivered between ticks");

    fixture.tick(1);
    assert_eq!(
        log.take(),
        vec![PlayerEvent::Ready, PlayerEvent::Play, PlayerEvent::Pause]
    );
    assert!(fixture.player.is_ready());
    assert_eq!(fixture.player.duration_in_seconds(), 10.0);
    assert_eq!(fixture.player.size(), (320, 240));

    fixture.tick(3);
    assert!(log.events().is_empty());

    Ok(())
}

#[test]
#[serial]
fn test_engine_threads_only_queue_events() -> Result<()> {
    let fixture = PlayerFixture::with(
        SyntheticOptions {
            emit_load_events: false,
            ..SyntheticOptions::default()
        },
        software(),
    )?;
    let (log, _subscription) = EventLog::attach(&fixture.player);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let control = fixture.control.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    control.emit(EngineEvent::BufferingStarted);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("emitter thread panicked");
    }

    assert!(log.events().is_empty());
    fixture.tick(1);
    assert_eq!(log.count(PlayerEvent::BufferingStart), 100);

    Ok(())
}

#[test]
#[serial]
fn test_cpu_frame_is_pixel_identical() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    fixture.ready_with_frame();

    assert!(fixture.player.check_new_frame());
    let surface = fixture.player.surface().expect("bitmap path has a surface");
    assert!(!fixture.player.check_new_frame());

    let frame = fixture.control.current_frame();
    assert_eq!(surface_image(&surface)?, expected_pattern(320, 240, frame));

    Ok(())
}

#[test]
#[serial]
fn test_lease_survives_later_frames() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    fixture.ready_with_frame();

    let lease = fixture.player.texture();
    let leased_frame = fixture.control.current_frame();

    fixture.control.push_frame();
    fixture.tick(1);
    assert!(fixture.player.check_new_frame());

    let leased = surface_image(lease.surface().expect("bitmap lease"))?;
    assert_eq!(leased, expected_pattern(320, 240, leased_frame));

    let latest = fixture.player.surface().expect("latest surface");
    assert_eq!(surface_image(&latest)?, expected_pattern(320, 240, leased_frame + 1));

    Ok(())
}

#[test]
#[serial]
fn test_repeated_metadata_keeps_render_target() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let (log, _subscription) = EventLog::attach(&fixture.player);
    fixture.ready_with_frame();
    let before = fixture.player.surface().expect("first frame");

    fixture.control.emit(EngineEvent::LoadedMetadata);
    fixture.tick(1);

    assert_eq!(log.count(PlayerEvent::Ready), 2);
    assert!(fixture.player.is_ready());
    let after = fixture.player.surface().expect("surface survives a second metadata load");
    assert_eq!(after.size(), before.size());
    assert_eq!(after.data(), before.data());

    Ok(())
}

#[test]
#[serial]
fn test_audio_only_player_has_no_frames() -> Result<()> {
    let fixture = PlayerFixture::with(SyntheticOptions::default(), software().audio_only(true))?;
    let (log, _subscription) = EventLog::attach(&fixture.player);

    fixture.control.push_frame();
    fixture.tick(2);

    assert_eq!(log.events(), vec![PlayerEvent::Ready]);
    assert!(fixture.player.has_audio());
    assert!(!fixture.player.has_video());
    assert_eq!(fixture.player.size(), (0, 0));
    assert!(!fixture.player.check_new_frame());
    assert!(fixture.player.surface().is_none());

    Ok(())
}

#[test]
#[serial]
fn test_hardware_request_delivers_frames_on_either_path() -> Result<()> {
    let fixture = PlayerFixture::with(SyntheticOptions::default(), MediaFormat::default())?;
    fixture.ready_with_frame();
    assert!(fixture.player.check_new_frame());

    let lease = fixture.player.texture();
    assert!(lease.is_valid());
    assert_eq!(lease.size(), Some((320, 240)));

    if fixture.player.is_hardware_accelerated() {
        assert!(lease.texture().is_some());
        assert!(lease.surface().is_none());
        assert!(fixture.control.attributes().and_then(|a| a.shared_device).is_some());
    } else {
        let surface = lease.surface().expect("bitmap fallback");
        let frame = fixture.control.current_frame();
        assert_eq!(surface_image(surface)?, expected_pattern(320, 240, frame));
    }

    Ok(())
}

#[test]
#[serial]
fn test_percentage_seeks_are_monotonic() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let (log, _subscription) = EventLog::attach(&fixture.player);
    fixture.tick(1);
    log.take();

    for percentage in [0.1, 0.25, 0.5, 0.9, 1.5] {
        fixture.player.seek_to_percentage(percentage, false);
    }
    let targets: Vec<f64> = fixture.control.seek_log().iter().map(|(t, _)| *t).collect();
    assert_eq!(targets, vec![1.0, 2.5, 5.0, 9.0, 10.0]);
    assert!(targets.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fixture.player.position_in_seconds(), 10.0);

    fixture.tick(1);
    let events = log.take();
    assert_eq!(events.len(), 10);
    assert!(events
        .chunks(2)
        .all(|pair| pair == [PlayerEvent::SeekStart, PlayerEvent::SeekEnd]));

    Ok(())
}

#[test]
#[serial]
fn test_seek_modes_reach_engine() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    fixture.tick(1);

    fixture.player.seek_to_seconds(3.0, true);
    fixture.player.seek_to_seconds(4.0, false);

    assert_eq!(
        fixture.control.seek_log(),
        vec![(3.0, Some(SeekMode::Approximate)), (4.0, Some(SeekMode::Normal))]
    );

    Ok(())
}

#[test]
#[serial]
fn test_percentage_seek_is_noop_without_duration() -> Result<()> {
    let fixture = PlayerFixture::with(short_clip(0.0), software())?;
    let (log, _subscription) = EventLog::attach(&fixture.player);
    fixture.tick(1);
    assert!(fixture.player.is_ready());
    assert_eq!(fixture.player.duration_in_seconds(), 0.0);
    log.take();

    fixture.player.seek_to_percentage(0.5, false);
    fixture.tick(1);

    assert!(fixture.control.seek_log().is_empty());
    assert!(log.events().is_empty());

    Ok(())
}

#[test]
#[serial]
fn test_frame_step_direction() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    fixture.tick(1);

    fixture.player.frame_step(1);
    fixture.player.frame_step(-1);
    fixture.player.frame_step(5);

    assert_eq!(fixture.control.frame_steps(), vec![true, false, true]);

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_loop_raises_complete() -> Result<()> {
    let fixture = PlayerFixture::with(short_clip(0.2), software())?;
    let (log, _subscription) = EventLog::attach(&fixture.player);
    fixture.player.set_loop(true);
    assert!(fixture.player.is_looping());

    fixture.player.play();
    sleep(Duration::from_millis(300)).await;
    fixture.tick(1);

    assert_eq!(
        log.take(),
        vec![
            PlayerEvent::Ready,
            PlayerEvent::Play,
            PlayerEvent::SeekStart,
            PlayerEvent::SeekEnd,
            PlayerEvent::Complete,
        ]
    );
    assert!(fixture.player.is_playing());
    assert!(!fixture.player.is_complete());

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_end_without_loop_completes_once() -> Result<()> {
    let fixture = PlayerFixture::with(short_clip(0.2), software())?;
    let (log, _subscription) = EventLog::attach(&fixture.player);

    fixture.player.play();
    sleep(Duration::from_millis(300)).await;
    fixture.tick(2);

    assert_eq!(
        log.take(),
        vec![
            PlayerEvent::Ready,
            PlayerEvent::Play,
            PlayerEvent::Pause,
            PlayerEvent::Complete,
        ]
    );
    assert!(fixture.player.is_complete());
    assert!(!fixture.player.is_playing());
    assert_eq!(fixture.player.position_in_seconds(), 0.2);

    Ok(())
}

#[tokio::test]
#[serial]
async fn test_ticked_playback_advances() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    fixture.player.play();

    let mut frames = 0;
    let mut ticker = tokio::time::interval(Duration::from_millis(10));
    for _ in 0..30 {
        ticker.tick().await;
        fixture.signal.emit();
        if fixture.player.check_new_frame() && fixture.player.texture().is_valid() {
            frames += 1;
        }
    }

    assert!(frames > 0);
    assert!(fixture.player.position_in_seconds() > 0.0);

    fixture.player.pause();
    let paused_at = fixture.player.position_in_seconds();
    sleep(Duration::from_millis(50)).await;
    assert_eq!(fixture.player.position_in_seconds(), paused_at);

    Ok(())
}

#[test]
#[serial]
fn test_volume_and_mute_apply_on_worker() -> Result<()> {
    let fixture = PlayerFixture::new()?;

    fixture.player.set_volume(0.42);
    assert_eq!(fixture.player.volume(), 0.42);
    assert_eq!(fixture.control.audio_thread().as_deref(), Some(WORKER_THREAD_NAME));

    fixture.player.set_muted(true);
    assert!(fixture.player.is_muted());
    fixture.player.set_muted(false);
    assert!(!fixture.player.is_muted());

    fixture.player.set_volume(3.0);
    assert_eq!(fixture.player.volume(), 1.0);

    Ok(())
}

#[test]
#[serial]
fn test_unsupported_rate_is_rejected() -> Result<()> {
    let fixture = PlayerFixture::new()?;

    assert!(!fixture.player.is_playback_rate_supported(8.0));
    assert!(!fixture.player.set_playback_rate(8.0));
    assert_eq!(fixture.player.playback_rate(), 1.0);

    assert!(fixture.player.is_playback_rate_supported(2.0));
    assert!(fixture.player.set_playback_rate(2.0));
    assert_eq!(fixture.player.playback_rate(), 2.0);

    Ok(())
}

#[test]
#[serial]
fn test_rate_rejected_without_extension() -> Result<()> {
    let fixture = PlayerFixture::with(
        SyntheticOptions {
            extended: false,
            ..SyntheticOptions::default()
        },
        software(),
    )?;

    assert!(!fixture.player.is_playback_rate_supported(2.0));
    assert!(!fixture.player.set_playback_rate(2.0));
    assert!(!fixture.player.set_playback_rate(8.0));
    assert_eq!(fixture.player.playback_rate(), 1.0);

    fixture.player.frame_step(1);
    assert!(fixture.control.frame_steps().is_empty());

    Ok(())
}

#[test]
#[serial]
fn test_engine_error_is_reported() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let (log, _subscription) = EventLog::attach(&fixture.player);
    fixture.tick(1);
    log.take();

    fixture.control.emit_with(EngineEvent::Error, 2, 0);
    fixture.control.emit_with(EngineEvent::Error, 99, 7);
    fixture.tick(1);

    assert_eq!(
        log.take(),
        vec![
            PlayerEvent::Error(ErrorCode::NetworkError),
            PlayerEvent::Error(ErrorCode::Unknown),
        ]
    );
    assert_eq!(fixture.player.last_error(), ErrorCode::Unknown);
    assert_eq!(error_to_string(ErrorCode::NetworkError), "Network Error");

    Ok(())
}

#[test]
#[serial]
fn test_handlers_may_call_back_into_player() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let weak = Arc::downgrade(&fixture.player);
    let (log, _log_subscription) = EventLog::attach(&fixture.player);
    let _subscription = fixture.player.subscribe(move |event| {
        if event == PlayerEvent::Play {
            if let Some(player) = weak.upgrade() {
                player.pause();
            }
        }
    });

    fixture.player.play();
    fixture.tick(1);
    assert!(fixture.player.is_paused());
    assert_eq!(log.take(), vec![PlayerEvent::Ready, PlayerEvent::Play]);

    fixture.tick(1);
    assert_eq!(log.take(), vec![PlayerEvent::Pause]);

    Ok(())
}

#[test]
#[serial]
fn test_dropped_subscription_stops_delivery() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let subscription = fixture.player.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    fixture.tick(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    drop(subscription);
    fixture.player.play();
    fixture.tick(1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[test]
#[serial]
fn test_failing_factory_yields_no_player() {
    let mut factory = MockFactory::new();
    factory
        .expect_create_engine()
        .times(1)
        .returning(|_, _, _| Err(PlayerError::Engine("no decoder".to_string())));

    let live = live_player_count();
    let signal = UpdateSignal::new();
    let player = MediaPlayerBuilder::new(MediaSource::url("mock://clip"))
        .with_format(software())
        .with_engine_factory(Arc::new(factory))
        .with_update_signal(Arc::clone(&signal))
        .build();

    assert!(player.is_none());
    assert_eq!(live_player_count(), live);
    assert_eq!(signal.connection_count(), 0);
}

#[test]
#[serial]
fn test_factory_receives_format_settings() -> Result<()> {
    let synthetic = SyntheticEngineFactory::new(SyntheticOptions::default());
    let control = synthetic.control();

    let mut factory = MockFactory::new();
    factory
        .expect_create_engine()
        .withf(|flags, attributes, source| {
            flags.real_time
                && flags.force_mute
                && !flags.audio_only
                && attributes.audio_endpoint_id.as_deref() == Some("Headset")
                && attributes.shared_device.is_none()
                && source.is_url()
        })
        .times(1)
        .returning(move |flags, attributes, source| synthetic.create_engine(flags, attributes, source));

    let signal = UpdateSignal::new();
    let player = MediaPlayerBuilder::new(MediaSource::url("mock://clip"))
        .with_format(
            software()
                .audio(false)
                .audio_device_id(Some("Headset".to_string())),
        )
        .with_engine_factory(Arc::new(factory))
        .with_update_signal(Arc::clone(&signal))
        .build()
        .expect("player");

    assert!(player.is_muted());
    signal.emit();
    assert!(player.is_ready());
    assert!(control.flags().map(|f| f.force_mute).unwrap_or(false));

    Ok(())
}

#[test]
#[serial]
fn test_missing_file_yields_no_player() -> Result<()> {
    let config_dir = ConfigDir::new()?;
    let missing = config_dir.temp_dir.path().join("missing.mp4");

    let live = live_player_count();
    let player = MediaPlayerBuilder::new(MediaSource::file(&missing))
        .with_engine_factory(Arc::new(SyntheticEngineFactory::default()))
        .with_update_signal(UpdateSignal::new())
        .build();

    assert!(player.is_none());
    assert_eq!(live_player_count(), live);

    Ok(())
}

#[test]
#[serial]
fn test_global_signal_registration() -> Result<()> {
    let global = UpdateSignal::global();
    let connected = global.connection_count();
    let live = live_player_count();

    let factory = SyntheticEngineFactory::default();
    let control = factory.control();
    let player = MediaPlayerBuilder::new(MediaSource::url("synthetic://global"))
        .with_format(software())
        .with_engine_factory(Arc::new(factory))
        .build()
        .expect("player");

    assert!(player.is_connected());
    assert_eq!(global.connection_count(), connected + 1);
    assert_eq!(live_player_count(), live + 1);

    assert!(global.emit() >= 1);
    assert!(player.is_ready());

    drop(player);
    assert_eq!(global.connection_count(), connected);
    assert_eq!(live_player_count(), live);
    assert!(control.is_shut_down());

    Ok(())
}

#[test]
#[serial]
fn test_player_outlives_its_signal() -> Result<()> {
    let fixture = PlayerFixture::new()?;
    let PlayerFixture { player, control, signal } = fixture;

    drop(signal);
    assert!(!player.is_connected());

    // Manual updates still work without a tick source
    assert!(!player.update());
    assert!(player.is_ready());
    assert!(!control.is_shut_down());

    drop(player);
    assert!(control.is_shut_down());

    Ok(())
}

#[test]
#[serial]
fn test_config_file_drives_player_format() -> Result<()> {
    let config_dir = ConfigDir::new()?;
    let path = config_dir.write(
        "config.toml",
        "[player]\nhardware_accelerated = false\naudio_enabled = false\nvolume = 0.5\nloop_playback = true\n",
    )?;
    let config = Config::load_from(&path)?;

    let factory = SyntheticEngineFactory::default();
    let control = factory.control();
    let player = MediaPlayerBuilder::new(MediaSource::url("synthetic://config"))
        .with_format(config.player.media_format())
        .with_engine_factory(Arc::new(factory))
        .with_update_signal(UpdateSignal::new())
        .build()
        .expect("player");

    player.set_volume(config.player.volume);
    player.set_loop(config.player.loop_playback);

    assert!(!player.is_hardware_accelerated());
    assert!(player.is_muted());
    assert_eq!(player.volume(), 0.5);
    assert!(player.is_looping());
    assert!(control.flags().map(|f| f.force_mute).unwrap_or(false));

    Ok(())
}
