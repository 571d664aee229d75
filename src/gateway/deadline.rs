use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use super::{GatewayError, GatewayResult};

/// Bounds a gateway call; an elapsed deadline surfaces as [`GatewayError::Timeout`].
pub async fn with_deadline<T, F>(timeout: Duration, request: F) -> GatewayResult<T>
where
    F: Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(timeout, request).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(timeout)),
    }
}

/// A slot for equivalent requests where only the newest one matters.
///
/// Starting a request through the slot aborts whichever request was started
/// before it; the aborted call resolves with [`GatewayError::Aborted`].
#[derive(Debug)]
pub struct RequestSlot {
    latest: watch::Sender<u64>,
}

impl Default for RequestSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestSlot {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(0);
        Self { latest }
    }

    pub async fn run<T, F>(&self, timeout: Duration, request: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        let mut ticket = 0;
        self.latest.send_modify(|current| {
            *current += 1;
            ticket = *current;
        });
        let mut newest = self.latest.subscribe();
        tokio::select! {
            result = with_deadline(timeout, request) => result,
            _ = wait_superseded(&mut newest, ticket) => Err(GatewayError::Aborted),
        }
    }

    /// Aborts the in-flight request, if any, without starting a new one.
    pub fn cancel(&self) {
        self.latest.send_modify(|current| *current += 1);
    }
}

async fn wait_superseded(newest: &mut watch::Receiver<u64>, ticket: u64) {
    if newest.wait_for(|current| *current != ticket).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout() {
        let result = with_deadline(Duration::from_secs(30), async {
            sleep(Duration::from_secs(60)).await;
            Ok::<_, GatewayError>(())
        })
        .await;
        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_secs(30))));
    }

    #[tokio::test(start_paused = true)]
    async fn newer_request_aborts_older_one() {
        let slot = Arc::new(RequestSlot::new());
        let first = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move {
                slot.run(Duration::from_secs(30), async {
                    sleep(Duration::from_secs(5)).await;
                    Ok::<_, GatewayError>(1)
                })
                .await
            }
        });
        sleep(Duration::from_millis(1)).await;

        let second = slot
            .run(Duration::from_secs(30), async { Ok::<_, GatewayError>(2) })
            .await;

        assert_eq!(second, Ok(2));
        assert_eq!(first.await.expect("join"), Err(GatewayError::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_in_flight_request() {
        let slot = Arc::new(RequestSlot::new());
        let pending = tokio::spawn({
            let slot = Arc::clone(&slot);
            async move {
                slot.run(Duration::from_secs(30), async {
                    sleep(Duration::from_secs(5)).await;
                    Ok::<_, GatewayError>(())
                })
                .await
            }
        });
        sleep(Duration::from_millis(1)).await;
        slot.cancel();
        let result = pending.await.expect("join");
        assert!(result.as_ref().is_err_and(GatewayError::is_interrupted));
    }
}
