//! End-to-end ducking scenarios through the audio runtime task.
//!
//! These run against headless `MemorySound`s in real time, so the sleeps leave generous
//! headroom over the configured fade times (duck 300ms, restore 600ms for navigation).

use roadtrip_audio::{
    spawn, AudioCategory, AudioEvent, DuckState, MemorySound, MixerConfig, Priority, PriorityMode,
    TriggerKind,
};
use std::time::Duration;
use tokio::time::{sleep, timeout};

const TOL: f32 = 1e-4;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn navigation_instruction_ducks_and_restores_music() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let (music, monitor) = MemorySound::new();
    let music_id = audio
        .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music))
        .await
        .unwrap();

    audio.navigation_instruction_start().await.unwrap();
    sleep(Duration::from_millis(500)).await;

    let snap = audio.snapshot(music_id).await.unwrap().unwrap();
    assert!(snap.ducked);
    assert!((snap.volume - 0.16).abs() < TOL);
    assert!((monitor.volume() - 0.16).abs() < TOL);
    assert_eq!(
        audio.trigger_state(TriggerKind::NavigationInstruction).await.unwrap(),
        DuckState::Ducked
    );

    audio.navigation_instruction_end().await.unwrap();
    sleep(Duration::from_millis(900)).await;

    let snap = audio.snapshot(music_id).await.unwrap().unwrap();
    assert!(!snap.ducked);
    assert!((snap.volume - 0.8).abs() < TOL);
    assert!((monitor.volume() - 0.8).abs() < TOL);
    assert_eq!(
        audio.trigger_state(TriggerKind::NavigationInstruction).await.unwrap(),
        DuckState::Idle
    );

    // Every intermediate write moved downwards then upwards, never past the endpoints.
    let writes = monitor.volume_writes();
    assert!(writes.len() >= 10);
    assert!(writes.iter().all(|v| (0.16 - TOL..=0.8 + TOL).contains(v)));

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn navigation_stream_pauses_story_until_it_stops() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let (story, story_monitor) = MemorySound::new();
    let story_id = audio
        .start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story))
        .await
        .unwrap();

    let (instruction, _) = MemorySound::new();
    let nav_id = audio
        .start_stream(AudioCategory::Navigation, Priority(5), 1.0, Box::new(instruction))
        .await
        .unwrap();
    assert!(story_monitor.is_paused());
    assert!(!audio.snapshot(story_id).await.unwrap().unwrap().playing);

    assert!(audio.stop_stream(nav_id).await.unwrap());
    assert!(!story_monitor.is_paused());
    sleep(Duration::from_millis(1200)).await;
    let snap = audio.snapshot(story_id).await.unwrap().unwrap();
    assert!(snap.playing);
    assert!((snap.volume - 1.0).abs() < TOL);

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn balanced_mode_keeps_story_playing_under_navigation() {
    init_logging();
    let config = MixerConfig {
        priority_mode: PriorityMode::Balanced,
        ..Default::default()
    };
    let (audio, task) = spawn(config).unwrap();
    let (story, story_monitor) = MemorySound::new();
    let story_id = audio
        .start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story))
        .await
        .unwrap();

    audio.navigation_instruction_start().await.unwrap();
    sleep(Duration::from_millis(500)).await;
    assert!(!story_monitor.is_paused());
    let snap = audio.snapshot(story_id).await.unwrap().unwrap();
    assert!(snap.playing);
    assert!((snap.volume - 0.2).abs() < TOL);

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn trigger_states_are_published_in_order() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let mut events = audio.subscribe();
    let (music, _) = MemorySound::new();
    audio
        .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music))
        .await
        .unwrap();

    audio.navigation_instruction_start().await.unwrap();
    sleep(Duration::from_millis(500)).await;
    audio.navigation_instruction_end().await.unwrap();

    let mut states = Vec::new();
    while states.len() < 4 {
        let event = timeout(Duration::from_secs(3), events.recv())
            .await
            .expect("trigger events within the restore window")
            .unwrap();
        if let AudioEvent::TriggerStateChanged { trigger, state } = event {
            assert_eq!(trigger, TriggerKind::NavigationInstruction);
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![DuckState::Ducking, DuckState::Ducked, DuckState::Restoring, DuckState::Idle]
    );

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn finished_sounds_leave_the_registry() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let (effect, monitor) = MemorySound::with_duration(Duration::from_millis(50));
    let id = audio
        .start_stream(AudioCategory::Effect, Priority(3), 1.0, Box::new(effect))
        .await
        .unwrap();

    sleep(Duration::from_millis(300)).await;
    assert!(audio.snapshot(id).await.unwrap().is_none());
    assert_eq!(monitor.release_count(), 1);

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

async fn music_volume(audio: &roadtrip_audio::AudioHandle, id: roadtrip_audio::StreamId) -> f32 {
    audio.snapshot(id).await.unwrap().unwrap().volume
}

#[tokio::test]
async fn navigation_over_story_goes_lower_then_back_to_story_level() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let (music, monitor) = MemorySound::new();
    let music_id = audio
        .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music))
        .await
        .unwrap();
    let (story, _) = MemorySound::new();
    let story_id = audio
        .start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story))
        .await
        .unwrap();
    sleep(Duration::from_millis(800)).await;
    assert!((music_volume(&audio, music_id).await - 0.24).abs() < TOL);

    audio.navigation_instruction_start().await.unwrap();
    sleep(Duration::from_millis(600)).await;
    assert!((music_volume(&audio, music_id).await - 0.16).abs() < TOL);
    assert!((monitor.volume() - 0.16).abs() < TOL);

    audio.navigation_instruction_end().await.unwrap();
    sleep(Duration::from_millis(1000)).await;
    assert!((music_volume(&audio, music_id).await - 0.24).abs() < TOL);
    assert_eq!(
        audio.trigger_state(TriggerKind::StoryPlayback).await.unwrap(),
        DuckState::Ducked
    );

    audio.stop_stream(story_id).await.unwrap();
    sleep(Duration::from_millis(1200)).await;
    assert!((music_volume(&audio, music_id).await - 0.8).abs() < TOL);
    assert!((monitor.volume() - 0.8).abs() < TOL);

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn story_ending_under_navigation_keeps_music_at_navigation_level() {
    init_logging();
    let (audio, task) = spawn(MixerConfig::default()).unwrap();
    let (music, _) = MemorySound::new();
    let music_id = audio
        .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music))
        .await
        .unwrap();
    let (story, _) = MemorySound::new();
    let story_id = audio
        .start_stream(AudioCategory::Voice, Priority(4), 1.0, Box::new(story))
        .await
        .unwrap();
    sleep(Duration::from_millis(800)).await;

    audio.navigation_instruction_start().await.unwrap();
    sleep(Duration::from_millis(600)).await;

    audio.stop_stream(story_id).await.unwrap();
    sleep(Duration::from_millis(1200)).await;
    assert!((music_volume(&audio, music_id).await - 0.16).abs() < TOL);

    audio.navigation_instruction_end().await.unwrap();
    sleep(Duration::from_millis(1000)).await;
    assert!((music_volume(&audio, music_id).await - 0.8).abs() < TOL);

    audio.shutdown().await.unwrap();
    task.await.unwrap();
}
