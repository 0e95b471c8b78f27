use std::time::Duration;

/// Waits for `duration` on the tokio timer. Zero durations return immediately.
pub async fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}
