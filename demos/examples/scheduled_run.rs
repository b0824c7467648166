use std::time::Duration;

use cdc_stage::prelude::*;
use cdc_stage_demos::get_sample_event;
use tracing_subscriber::FmtSubscriber;

/// Drives the pipeline the way an external scheduler would: a sensor waits until a batch is
/// collected, then the remaining stages run and the artifact is announced on the handoff
/// channel.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_log::LogTracer::init().expect("Failed to set up log tracer");
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut source = MemorySource::new("inventory.inventory.products");
    for _ in 0..3 {
        source.push_json(&get_sample_event());
    }

    let staging_dir = std::env::temp_dir();
    let config = PipelineConfig::builder()
        .with_batch_size(3)
        .with_window(Duration::from_secs(5))
        .with_staging_dir(&staging_dir)
        .build()?;

    let (tx, rx) = create_channel(0);
    let mut pipeline = Pipeline::new(source, config).with_handoff(tx);
    let handle = pipeline.state_handle();

    let collecting = tokio::spawn(async move {
        let collected = pipeline.collect().await;
        (pipeline, collected)
    });

    let sensor = Sensor::new(Duration::from_millis(100), Duration::from_secs(10));
    let outcome = sensor.wait_for(|| handle.is_ready()).await;
    let (mut pipeline, collected) = collecting.await.map_err(join_error)?;
    println!("collected {} events, sensor {:?}", collected?, outcome);

    if outcome == SensorOutcome::TimedOut {
        pipeline.abandon().await?;
        return Ok(());
    }

    pipeline.normalize()?;
    pipeline.stage().await?;
    let artifact = pipeline.handoff()?;

    while let Ok(msg) = rx.try_recv() {
        println!("handoff: {:?}", msg);
    }

    println!("{}", std::fs::read_to_string(artifact.path())?);
    pipeline.confirm_loaded(artifact)?;
    Ok(())
}

fn join_error(err: tokio::task::JoinError) -> CdcStageError {
    CdcStageError::Other(err.into())
}
