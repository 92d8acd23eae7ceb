/*!
Async helpers for tests driving the background tasks

The connection manager and the fleet poller run on spawned tasks, so a test
has to give them a chance to run before asserting.
*/

use std::time::Duration;

/// Init logging once for the test binary (`RUST_LOG` applies).
pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Yield to the scheduler a number of times without advancing the clock.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` until it holds or `within` elapses (on the tokio clock,
/// so paused-time tests advance instantly). Returns whether it held.
pub async fn wait_until<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        settle().await;
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            log::warn!("condition not met within {:?}", within);
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
