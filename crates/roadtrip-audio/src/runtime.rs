//! Audio runtime: one task owns the orchestration service.
//!
//! Callers talk to it through a cloneable [`AudioHandle`]. Commands arrive on an mpsc
//! channel and fades advance on an interval tick, both inside the same `select!` loop, so
//! volume writes for a stream never race.

use crate::config::MixerConfig;
use crate::error::{AudioError, AudioResult};
use crate::events::{AudioEvent, EventBus};
use crate::orchestration::{AudioOrchestrationService, DuckState, TriggerKind};
use crate::sound::{PlaybackBackend, SoundHandle};
use crate::stream::{AudioCategory, Priority, StreamId, StreamSnapshot};
use crate::tts::SynthesizedAudio;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

const COMMAND_BUFFER: usize = 64;

enum AudioCommand {
    StartStream {
        category: AudioCategory,
        priority: Priority,
        volume: f32,
        sound: Box<dyn SoundHandle>,
        reply: oneshot::Sender<StreamId>,
    },
    StopStream {
        id: StreamId,
        reply: oneshot::Sender<bool>,
    },
    Trigger {
        trigger: TriggerKind,
        start: bool,
    },
    RestoreAll,
    Fade {
        id: StreamId,
        target: f32,
        duration: Duration,
        reply: oneshot::Sender<AudioResult<bool>>,
    },
    SetMasterVolume {
        volume: f32,
        reply: oneshot::Sender<f32>,
    },
    SetCategoryVolume {
        category: AudioCategory,
        volume: f32,
        reply: oneshot::Sender<f32>,
    },
    Snapshot {
        id: StreamId,
        reply: oneshot::Sender<Option<StreamSnapshot>>,
    },
    Snapshots {
        reply: oneshot::Sender<Vec<StreamSnapshot>>,
    },
    TriggerState {
        trigger: TriggerKind,
        reply: oneshot::Sender<DuckState>,
    },
    Shutdown,
}

/// Spawn the audio task on the current tokio runtime.
pub fn spawn(config: MixerConfig) -> AudioResult<(AudioHandle, JoinHandle<()>)> {
    let tick = config.fade_tick();
    let events = EventBus::new();
    let service = AudioOrchestrationService::with_events(config, events.clone())?;
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(service, rx, tick));
    Ok((AudioHandle { tx, events }, task))
}

async fn run(
    mut service: AudioOrchestrationService,
    mut rx: mpsc::Receiver<AudioCommand>,
    tick: Duration,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("🔊 Audio runtime started (tick {:?})", tick);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let now = Instant::now().into_std();
                match cmd {
                    Some(AudioCommand::Shutdown) | None => break,
                    Some(cmd) => handle(&mut service, cmd, now),
                }
            }
            _ = interval.tick() => {
                service.tick(Instant::now().into_std());
            }
        }
    }

    service.stop_all(Instant::now().into_std());
    info!("Audio runtime stopped");
}

fn handle(service: &mut AudioOrchestrationService, cmd: AudioCommand, now: std::time::Instant) {
    // A dropped reply receiver only means the caller stopped waiting.
    match cmd {
        AudioCommand::StartStream { category, priority, volume, sound, reply } => {
            let id = service.start_stream(category, priority, volume, sound, now);
            let _ = reply.send(id);
        }
        AudioCommand::StopStream { id, reply } => {
            let _ = reply.send(service.stop_stream(id, now));
        }
        AudioCommand::Trigger { trigger, start } => {
            debug!(?trigger, start, "trigger command");
            match (trigger, start) {
                (TriggerKind::NavigationInstruction, true) => {
                    service.on_navigation_instruction_start(now)
                }
                (TriggerKind::NavigationInstruction, false) => {
                    service.on_navigation_instruction_end(now)
                }
                (TriggerKind::StoryPlayback, true) => service.on_story_playback_start(now),
                (TriggerKind::StoryPlayback, false) => service.on_story_playback_end(now),
            }
        }
        AudioCommand::RestoreAll => service.restore_all(now),
        AudioCommand::Fade { id, target, duration, reply } => {
            let _ = reply.send(service.fade_stream(id, target, duration, now));
        }
        AudioCommand::SetMasterVolume { volume, reply } => {
            let _ = reply.send(service.set_master_volume(volume));
        }
        AudioCommand::SetCategoryVolume { category, volume, reply } => {
            let _ = reply.send(service.set_category_volume(category, volume));
        }
        AudioCommand::Snapshot { id, reply } => {
            let _ = reply.send(service.snapshot(id));
        }
        AudioCommand::Snapshots { reply } => {
            let _ = reply.send(service.snapshots());
        }
        AudioCommand::TriggerState { trigger, reply } => {
            let _ = reply.send(service.state(trigger));
        }
        AudioCommand::Shutdown => {}
    }
}

/// Cloneable handle to the audio task. Every call fails with `RuntimeClosed` once the task
/// has stopped.
#[derive(Clone)]
pub struct AudioHandle {
    tx: mpsc::Sender<AudioCommand>,
    events: EventBus,
}

impl AudioHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn start_stream(
        &self,
        category: AudioCategory,
        priority: Priority,
        volume: f32,
        sound: Box<dyn SoundHandle>,
    ) -> AudioResult<StreamId> {
        self.request(|reply| AudioCommand::StartStream {
            category,
            priority,
            volume,
            sound,
            reply,
        })
        .await
    }

    /// Open synthesized audio on `backend` and register it as a stream.
    pub async fn play(
        &self,
        backend: &dyn PlaybackBackend,
        audio: &SynthesizedAudio,
        category: AudioCategory,
        priority: Priority,
        volume: f32,
    ) -> AudioResult<StreamId> {
        let sound = backend.open(audio)?;
        self.start_stream(category, priority, volume, sound).await
    }

    /// Returns false for unknown ids.
    pub async fn stop_stream(&self, id: StreamId) -> AudioResult<bool> {
        self.request(|reply| AudioCommand::StopStream { id, reply }).await
    }

    pub async fn navigation_instruction_start(&self) -> AudioResult<()> {
        self.trigger(TriggerKind::NavigationInstruction, true).await
    }

    pub async fn navigation_instruction_end(&self) -> AudioResult<()> {
        self.trigger(TriggerKind::NavigationInstruction, false).await
    }

    pub async fn story_playback_start(&self) -> AudioResult<()> {
        self.trigger(TriggerKind::StoryPlayback, true).await
    }

    pub async fn story_playback_end(&self) -> AudioResult<()> {
        self.trigger(TriggerKind::StoryPlayback, false).await
    }

    pub async fn restore_all(&self) -> AudioResult<()> {
        self.tx.send(AudioCommand::RestoreAll).await?;
        Ok(())
    }

    /// Fade one stream. `Ok(false)` when it is already fading.
    pub async fn fade_stream(
        &self,
        id: StreamId,
        target: f32,
        duration: Duration,
    ) -> AudioResult<bool> {
        self.request(|reply| AudioCommand::Fade {
            id,
            target,
            duration,
            reply,
        })
        .await?
    }

    /// Returns the stored (clamped) value.
    pub async fn set_master_volume(&self, volume: f32) -> AudioResult<f32> {
        self.request(|reply| AudioCommand::SetMasterVolume { volume, reply }).await
    }

    pub async fn set_category_volume(
        &self,
        category: AudioCategory,
        volume: f32,
    ) -> AudioResult<f32> {
        self.request(|reply| AudioCommand::SetCategoryVolume {
            category,
            volume,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self, id: StreamId) -> AudioResult<Option<StreamSnapshot>> {
        self.request(|reply| AudioCommand::Snapshot { id, reply }).await
    }

    pub async fn snapshots(&self) -> AudioResult<Vec<StreamSnapshot>> {
        self.request(|reply| AudioCommand::Snapshots { reply }).await
    }

    pub async fn trigger_state(&self, trigger: TriggerKind) -> AudioResult<DuckState> {
        self.request(|reply| AudioCommand::TriggerState { trigger, reply }).await
    }

    /// Stop the task. Remaining streams are released before it exits.
    pub async fn shutdown(&self) -> AudioResult<()> {
        self.tx
            .send(AudioCommand::Shutdown)
            .await
            .map_err(|_| AudioError::RuntimeClosed)
    }

    async fn trigger(&self, trigger: TriggerKind, start: bool) -> AudioResult<()> {
        self.tx.send(AudioCommand::Trigger { trigger, start }).await?;
        Ok(())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> AudioCommand,
    ) -> AudioResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await?;
        Ok(rx.await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::MemorySound;

    #[tokio::test]
    async fn commands_round_trip_through_the_task() {
        let (audio, task) = spawn(MixerConfig::default()).unwrap();
        let (sound, monitor) = MemorySound::new();
        let id = audio
            .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(sound))
            .await
            .unwrap();

        let snap = audio.snapshot(id).await.unwrap().unwrap();
        assert_eq!(snap.category, AudioCategory::Music);
        assert!((monitor.volume() - 0.8).abs() < 1e-6);

        assert_eq!(audio.set_master_volume(2.0).await.unwrap(), 1.0);
        assert!(audio.stop_stream(id).await.unwrap());
        assert!(!audio.stop_stream(id).await.unwrap());
        assert!(monitor.is_released());

        audio.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn closed_runtime_reports_runtime_closed() {
        let (audio, task) = spawn(MixerConfig::default()).unwrap();
        audio.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            audio.navigation_instruction_start().await,
            Err(AudioError::RuntimeClosed)
        ));
        assert!(matches!(audio.snapshots().await, Err(AudioError::RuntimeClosed)));
    }

    #[tokio::test]
    async fn shutdown_releases_remaining_streams() {
        let (audio, task) = spawn(MixerConfig::default()).unwrap();
        let (sound, monitor) = MemorySound::new();
        audio
            .start_stream(AudioCategory::Ambient, Priority(1), 0.4, Box::new(sound))
            .await
            .unwrap();
        audio.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(monitor.release_count(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = MixerConfig {
            fade_tick_ms: 0,
            ..Default::default()
        };
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            assert!(matches!(spawn(config), Err(AudioError::Config(_))));
        });
    }
}
