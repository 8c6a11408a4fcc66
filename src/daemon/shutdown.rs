use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels `cancelation` on ctrl-c. Returns as soon as anything else cancels it too.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received interrupt, shutting down"),
                Err(e) => warn!("Failed to listen for interrupts {e:?}, shutting down"),
            }
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
