use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pick a random duration in `[lo_mult, hi_mult] * base`.
pub fn random_window(base: Duration, lo_mult: u64, hi_mult: u64) -> Duration {
    let base_ms = base.as_millis() as u64;
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(base_ms * lo_mult..=base_ms * hi_mult))
}

/// Generic repeating scheduler: wait for the produced interval, invoke the
/// callback, repeat until stopped. The interval function is re-evaluated
/// (and typically re-randomized) every cycle. The callback receives the
/// interval that just elapsed (`Duration::ZERO` for an immediate fire).
pub struct RandomizedTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl RandomizedTimer {
    /// Spawn a timer with its own cancellation scope.
    pub fn spawn<I, C>(interval: I, callback: C, fire_immediately: bool) -> Self
    where
        I: FnMut() -> Duration + Send + 'static,
        C: FnMut(Duration) + Send + 'static,
    {
        Self::spawn_scoped(CancellationToken::new(), interval, callback, fire_immediately)
    }

    /// Spawn a timer whose lifetime is bound to `token`; cancelling the
    /// token stops the timer. Used by roles so `stop()` kills every timer
    /// they own.
    pub fn spawn_scoped<I, C>(
        token: CancellationToken,
        mut interval: I,
        mut callback: C,
        fire_immediately: bool,
    ) -> Self
    where
        I: FnMut() -> Duration + Send + 'static,
        C: FnMut(Duration) + Send + 'static,
    {
        let child = token.clone();
        let handle = tokio::spawn(async move {
            if fire_immediately {
                callback(Duration::ZERO);
            }
            loop {
                let wait = interval();
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = tokio::time::sleep(wait) => callback(wait),
                }
            }
        });
        Self { token, handle }
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for RandomizedTimer {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn random_window_stays_in_range() {
        let base = Duration::from_millis(50);
        for _ in 0..100 {
            let window = random_window(base, 3, 6);
            assert!(window >= Duration::from_millis(150));
            assert!(window <= Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn timer_fires_repeatedly() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = RandomizedTimer::spawn(
            || Duration::from_millis(5),
            move |_| {
                let _ = tx.send(());
            },
            false,
        );

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timer should fire")
                .expect("sender alive");
        }
    }

    #[tokio::test]
    async fn immediate_fire_reports_zero_elapsed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = RandomizedTimer::spawn(
            || Duration::from_secs(60),
            move |elapsed| {
                let _ = tx.send(elapsed);
            },
            true,
        );

        let elapsed = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("immediate fire")
            .unwrap();
        assert_eq!(elapsed, Duration::ZERO);
    }

    #[tokio::test]
    async fn stop_cancels_future_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timer = RandomizedTimer::spawn(
            || Duration::from_millis(5),
            move |_| {
                let _ = tx.send(());
            },
            false,
        );

        rx.recv().await.expect("fires at least once");
        timer.stop();
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelling_the_scope_token_stops_the_timer() {
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _timer = RandomizedTimer::spawn_scoped(
            token.clone(),
            || Duration::from_millis(5),
            move |_| {
                let _ = tx.send(());
            },
            false,
        );

        rx.recv().await.expect("fires at least once");
        token.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err());
    }
}
