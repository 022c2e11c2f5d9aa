use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Caps the number of in-flight calls to one external service.
///
/// Wrap each outbound call with [`ConcurrencyLimiter::run`]; excess calls
/// wait for a free slot.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    name: &'static str,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl ConcurrencyLimiter {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            name,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn run<F>(&self, call: F) -> F::Output
    where
        F: Future,
    {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!("{} limiter closed, running call unlimited", self.name);
                None
            }
        };
        call.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let limiter = ConcurrencyLimiter::new("test", 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let calls = (0..20).map(|_| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            limiter.run(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
        });
        join_all(calls).await;

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ConcurrencyLimiter::new("test", 0).capacity(), 1);
    }
}
