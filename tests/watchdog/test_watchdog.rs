//! Unit tests for the inactivity watchdog
//!
//! Run on a paused Tokio clock so time only advances when every task idles.

use std::sync::Arc;
use std::time::Duration;

use kodegen_claude_session::Watchdog;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(10);

fn watchdog(window: Option<Duration>) -> (Watchdog, Arc<Mutex<Vec<u64>>>) {
    let fired = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&fired);
    let watchdog = Watchdog::new(
        window,
        &Handle::current(),
        Arc::new(move |generation| sink.lock().push(generation)),
    );
    (watchdog, fired)
}

#[tokio::test(start_paused = true)]
async fn test_fires_exactly_once() {
    let (mut watchdog, fired) = watchdog(Some(WINDOW));
    watchdog.start();

    sleep(WINDOW * 5).await;

    let generations = fired.lock().clone();
    assert_eq!(generations.len(), 1);
    assert!(watchdog.is_current(generations[0]));
    // Consumed: a second look is stale
    assert!(!watchdog.is_current(generations[0]));
    assert!(!watchdog.is_armed());
}

#[tokio::test(start_paused = true)]
async fn test_stop_prevents_fire() {
    let (mut watchdog, fired) = watchdog(Some(WINDOW));
    watchdog.start();

    sleep(WINDOW / 2).await;
    watchdog.stop();
    sleep(WINDOW * 3).await;

    assert!(fired.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reset_pushes_deadline() {
    let (mut watchdog, fired) = watchdog(Some(WINDOW));
    watchdog.start();

    sleep(Duration::from_secs(6)).await;
    watchdog.reset();
    sleep(Duration::from_secs(6)).await;
    assert!(fired.lock().is_empty(), "reset must restart the countdown");

    sleep(Duration::from_secs(5)).await;
    assert_eq!(fired.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_does_not_arm() {
    let (mut watchdog, fired) = watchdog(Some(WINDOW));
    watchdog.reset();
    sleep(WINDOW * 2).await;

    assert!(!watchdog.is_armed());
    assert!(fired.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stale_generation_after_restart() {
    let (mut watchdog, fired) = watchdog(Some(WINDOW));
    watchdog.start();
    sleep(WINDOW * 2).await;
    let first = fired.lock()[0];

    // Re-armed before the owner looked at the first fire
    watchdog.start();
    assert!(!watchdog.is_current(first));

    sleep(WINDOW * 2).await;
    let generations = fired.lock().clone();
    assert_eq!(generations.len(), 2);
    assert!(watchdog.is_current(generations[1]));
}

#[tokio::test(start_paused = true)]
async fn test_zero_window_disables() {
    for window in [None, Some(Duration::ZERO)] {
        let (mut watchdog, fired) = watchdog(window);
        assert!(watchdog.window().is_none());

        watchdog.start();
        assert!(!watchdog.is_armed());
        sleep(Duration::from_secs(3600)).await;
        assert!(fired.lock().is_empty());
    }
}
