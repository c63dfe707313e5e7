//! **Sound handles**: the device-side resource behind every stream.
//!
//! The registry owns one `SoundHandle` per stream and is the only code that releases it.
//! `MemorySound` is a headless implementation (tests, simulators, CI without audio devices);
//! `RodioSound` plays on the default output device when the `playback` feature is enabled.

use crate::error::AudioResult;
use crate::tts::SynthesizedAudio;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A playing sound on some output. Implementations must tolerate calls after `release()`.
pub trait SoundHandle: Send {
    /// Set the output gain in [0, 1] (already scaled by category and master volume).
    fn set_volume(&mut self, volume: f32) -> AudioResult<()>;

    fn pause(&mut self) -> AudioResult<()>;

    fn resume(&mut self) -> AudioResult<()>;

    /// True once playback has naturally reached its end.
    fn is_finished(&self) -> bool {
        false
    }

    /// True when the sound was torn down outside the registry (device lost, user stop).
    fn is_released(&self) -> bool {
        false
    }

    /// Free the device resource. Called exactly once by the registry.
    fn release(&mut self);
}

/// Opens a `SoundHandle` for synthesized speech on some output.
pub trait PlaybackBackend: Send + Sync {
    fn open(&self, audio: &SynthesizedAudio) -> AudioResult<Box<dyn SoundHandle>>;
}

#[derive(Debug)]
struct MemorySoundState {
    volume: f32,
    volume_writes: Vec<f32>,
    paused: bool,
    paused_at: Option<Instant>,
    finish_at: Option<Instant>,
    finished: bool,
    released: bool,
    release_count: u32,
}

/// In-memory sound. Records every call so the owner of the matching monitor can inspect it.
#[derive(Debug)]
pub struct MemorySound {
    state: Arc<Mutex<MemorySoundState>>,
}

/// Observer side of a `MemorySound`.
#[derive(Debug, Clone)]
pub struct MemorySoundMonitor {
    state: Arc<Mutex<MemorySoundState>>,
}

impl MemorySound {
    /// A sound that plays until stopped.
    pub fn new() -> (Self, MemorySoundMonitor) {
        Self::build(None)
    }

    /// A sound that finishes on its own after `duration` of unpaused playback.
    pub fn with_duration(duration: Duration) -> (Self, MemorySoundMonitor) {
        Self::build(Some(Instant::now() + duration))
    }

    fn build(finish_at: Option<Instant>) -> (Self, MemorySoundMonitor) {
        let state = Arc::new(Mutex::new(MemorySoundState {
            volume: 1.0,
            volume_writes: Vec::new(),
            paused: false,
            paused_at: None,
            finish_at,
            finished: false,
            released: false,
            release_count: 0,
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            MemorySoundMonitor { state },
        )
    }
}

impl SoundHandle for MemorySound {
    fn set_volume(&mut self, volume: f32) -> AudioResult<()> {
        let mut state = self.state.lock();
        state.volume = volume;
        state.volume_writes.push(volume);
        Ok(())
    }

    fn pause(&mut self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if !state.paused {
            state.paused = true;
            state.paused_at = Some(Instant::now());
        }
        Ok(())
    }

    fn resume(&mut self) -> AudioResult<()> {
        let mut state = self.state.lock();
        if state.paused {
            state.paused = false;
            if let (Some(finish_at), Some(paused_at)) = (state.finish_at, state.paused_at.take()) {
                state.finish_at = Some(finish_at + paused_at.elapsed());
            }
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        let state = self.state.lock();
        if state.finished {
            return true;
        }
        match state.finish_at {
            Some(at) => !state.paused && Instant::now() >= at,
            None => false,
        }
    }

    fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.released = true;
        state.release_count += 1;
    }
}

impl MemorySoundMonitor {
    /// Last output gain written to the sound.
    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Every gain written, in order.
    pub fn volume_writes(&self) -> Vec<f32> {
        self.state.lock().volume_writes.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn release_count(&self) -> u32 {
        self.state.lock().release_count
    }

    /// Simulate the device dropping the sound behind the registry's back.
    pub fn release_externally(&self) {
        self.state.lock().released = true;
    }

    /// Mark playback as having reached its end.
    pub fn finish(&self) {
        self.state.lock().finished = true;
    }
}

/// Playback backend with no device: every sound is a `MemorySound` lasting the
/// estimated speech duration.
#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl PlaybackBackend for HeadlessBackend {
    fn open(&self, audio: &SynthesizedAudio) -> AudioResult<Box<dyn SoundHandle>> {
        let (sound, _monitor) = MemorySound::with_duration(audio.estimated_duration);
        Ok(Box::new(sound))
    }
}

#[cfg(feature = "playback")]
pub use self::rodio_backend::{RodioBackend, RodioSound};

#[cfg(feature = "playback")]
mod rodio_backend {
    use super::{PlaybackBackend, SoundHandle};
    use crate::error::{AudioError, AudioResult};
    use crate::tts::SynthesizedAudio;
    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::thread;
    use tracing::{info, warn};

    /// Sound backed by its own `rodio::Sink`.
    pub struct RodioSound {
        sink: Sink,
    }

    impl SoundHandle for RodioSound {
        fn set_volume(&mut self, volume: f32) -> AudioResult<()> {
            self.sink.set_volume(volume);
            Ok(())
        }

        fn pause(&mut self) -> AudioResult<()> {
            self.sink.pause();
            Ok(())
        }

        fn resume(&mut self) -> AudioResult<()> {
            self.sink.play();
            Ok(())
        }

        fn is_finished(&self) -> bool {
            self.sink.empty()
        }

        fn release(&mut self) {
            self.sink.stop();
        }
    }

    /// Default output device. `OutputStream` is not `Send`, so it lives on a parked keeper
    /// thread for the life of the process and only the handle is shared.
    pub struct RodioBackend {
        handle: OutputStreamHandle,
    }

    impl RodioBackend {
        pub fn new() -> AudioResult<Self> {
            let (tx, rx) = mpsc::channel();
            thread::Builder::new()
                .name("roadtrip-audio-output".to_string())
                .spawn(move || match OutputStream::try_default() {
                    Ok((stream, handle)) => {
                        if tx.send(Ok(handle)).is_err() {
                            return;
                        }
                        let _stream = stream;
                        loop {
                            thread::park();
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(AudioError::Playback(e.to_string())));
                    }
                })
                .map_err(|e| AudioError::Playback(e.to_string()))?;

            let handle = rx
                .recv()
                .map_err(|e| AudioError::Playback(e.to_string()))??;
            info!("🔊 Rodio output ready");
            Ok(Self { handle })
        }
    }

    impl PlaybackBackend for RodioBackend {
        fn open(&self, audio: &SynthesizedAudio) -> AudioResult<Box<dyn SoundHandle>> {
            let sink =
                Sink::try_new(&self.handle).map_err(|e| AudioError::Playback(e.to_string()))?;
            if audio.bytes.is_empty() {
                warn!("Empty TTS audio; opening a silent sound");
            } else {
                let source = rodio::Decoder::new(Cursor::new(audio.bytes.clone()))
                    .map_err(|e| AudioError::Playback(format!("Decode failed: {}", e)))?;
                sink.append(source.convert_samples::<f32>());
            }
            Ok(Box::new(RodioSound { sink }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sound_records_writes() {
        let (mut sound, monitor) = MemorySound::new();
        sound.set_volume(0.5).unwrap();
        sound.set_volume(0.25).unwrap();
        assert_eq!(monitor.volume_writes(), vec![0.5, 0.25]);
        assert!((monitor.volume() - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn memory_sound_finishes_after_duration() {
        let (sound, monitor) = MemorySound::with_duration(Duration::ZERO);
        assert!(sound.is_finished());
        assert!(!monitor.is_released());
    }

    #[test]
    fn paused_sound_never_finishes() {
        let (mut sound, _monitor) = MemorySound::with_duration(Duration::ZERO);
        sound.pause().unwrap();
        assert!(!sound.is_finished());
    }
}
