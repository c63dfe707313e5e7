//! Short scripted drive down the coast.
//!
//! ```text
//! cargo run -p roadtrip-core --example drive_demo
//! ```
//!
//! Uses the directions, OpenRouter and TTS services when their keys are in the environment
//! (or `.env`); otherwise the sample booking catalog and placeholder speech keep it offline.

use anyhow::Result;
use roadtrip_audio::{AudioCategory, AudioEvent, HeadlessBackend, MemorySound, Priority};
use roadtrip_core::{
    CatalogBookingService, DirectionsRouteService, MasterBlender, OpenRouterNarrative,
    ProactiveTrigger, RoadTripConfig, TtsSpeechSynthesizer,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RoadTripConfig::load()?;
    let personalities = config.personalities()?;
    let (audio, audio_task) = roadtrip_audio::spawn(config.audio.clone())?;

    let mut events = audio.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let AudioEvent::TriggerStateChanged { trigger, state } = event {
                info!(?trigger, ?state, "trigger");
            }
        }
    });

    let mut blender = MasterBlender::new(config.blender.clone(), personalities)
        .with_booking(Arc::new(CatalogBookingService::sample()))
        .with_speech(
            Arc::new(TtsSpeechSynthesizer::from_env(Arc::new(HeadlessBackend))),
            audio.clone(),
        );
    if let Some(route) = DirectionsRouteService::from_env() {
        blender = blender.with_route(Arc::new(route));
    }
    if let Some(narrative) = OpenRouterNarrative::from_env() {
        blender = blender.with_narrative(Arc::new(narrative));
    }

    let (music, _monitor) = MemorySound::new();
    audio
        .start_stream(AudioCategory::Music, Priority(2), 0.8, Box::new(music))
        .await?;

    let mut ctx = blender.new_context().with_location("San Francisco");
    for utterance in [
        "Navigate to Big Sur",
        "Tell me about Bixby Bridge",
        "Find me a hotel near Monterey",
        "Yes, book it",
    ] {
        let response = blender.handle_user_utterance(utterance, &mut ctx).await;
        println!("you> {}", utterance);
        println!("companion> {} (confidence {:.2})", response.text, response.confidence);
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    let response = blender
        .handle_proactive(
            &ProactiveTrigger::Arrival {
                destination: "Big Sur".to_string(),
            },
            &mut ctx,
        )
        .await;
    println!("companion> {}", response.text);

    audio.shutdown().await?;
    audio_task.await?;
    Ok(())
}
