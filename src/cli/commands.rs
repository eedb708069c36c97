use crate::config::Config;
use crate::device::NvmlSession;
use crate::identity::{InstanceIdentity, MetadataClient};
use crate::metrics::{CloudWatchSink, MetricSink, StdoutSink};
use crate::poll::PollLoop;
use crate::Result;
use std::future::Future;
use tracing::info;

/// Initialize and run the collector until a shutdown signal, or for a
/// single tick with `--once`.
///
/// Identity is resolved before the device session is opened.
pub async fn run(config: Config) -> Result<()> {
    let shutdown = shutdown_signal()?;

    let identity = MetadataClient::new(config.metadata_url.clone())?
        .resolve()
        .await?;

    if config.dry_run {
        info!("Dry run: metric batches will be printed, not submitted");
        return run_with(&config, StdoutSink, &identity, shutdown).await;
    }

    let region = config
        .region
        .clone()
        .unwrap_or_else(|| identity.region.clone());
    let sink = CloudWatchSink::new(region).await;
    run_with(&config, sink, &identity, shutdown).await
}

async fn run_with<S, F>(
    config: &Config,
    sink: S,
    identity: &InstanceIdentity,
    shutdown: F,
) -> Result<()>
where
    S: MetricSink,
    F: Future<Output = ()>,
{
    let session = NvmlSession::init()?;

    PollLoop::new(config, sink)
        .run(session, identity, shutdown)
        .await
        .map(|_| ())
}

/// Resolves on SIGINT or SIGTERM. Listeners are registered immediately so a
/// signal that arrives during startup is seen before the first tick, and one
/// that arrives mid-tick is seen at the next sleep.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    })
}
