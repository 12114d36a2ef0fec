use async_trait::async_trait;
use chatsweep::marquee::{MarqueeRegistry, RenderError, RenderTarget};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Render target that records every render for later inspection.
#[derive(Clone, Default)]
struct SharedTarget {
    rendered: Arc<Mutex<Vec<String>>>,
}

impl SharedTarget {
    fn rendered(&self) -> Vec<String> {
        self.rendered.lock().expect("lock").clone()
    }
}

#[async_trait]
impl RenderTarget for SharedTarget {
    async fn render(&self, text: &str) -> Result<(), RenderError> {
        self.rendered.lock().expect("lock").push(text.to_string());
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn set_window_takes_effect_on_the_next_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    std::fs::write(&path, "one\ntwo\nthree\nfour\nfive\nsix\n").expect("write log");

    let registry = MarqueeRegistry::new(path.clone(), 2, 1);
    let state = registry.state();
    let target = SharedTarget::default();

    assert!(registry.start(target.clone()));
    assert!(state.is_active());

    // First cycle renders lines 1-2; widen the window before the second.
    tokio::time::sleep(Duration::from_millis(500)).await;
    state.set_window(3);

    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(registry.stop());
    // Give the loop its next boundary to observe the stop.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let rendered = target.rendered();
    assert!(rendered.len() >= 4);
    assert!(rendered[0].contains("one\ntwo"));
    // 3-line window starting where the 2-line window left off.
    assert!(rendered[1].contains("three\nfour\nfive"));
    assert!(rendered[2].contains("six"));
    assert!(
        rendered.last().expect("non-empty").contains("остановлен"),
        "stop must produce a final render"
    );
}

#[tokio::test(start_paused = true)]
async fn growing_log_is_reread_every_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    std::fs::write(&path, "first\n").expect("write log");

    let registry = MarqueeRegistry::new(path.clone(), 5, 1);
    let target = SharedTarget::default();
    assert!(registry.start(target.clone()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    std::fs::write(&path, "first\nsecond\n").expect("append log");

    tokio::time::sleep(Duration::from_millis(1000)).await;
    registry.stop();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let rendered = target.rendered();
    assert!(rendered[0].contains("first"));
    assert!(!rendered[0].contains("second"));
    assert!(rendered[1].contains("second"));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_waits_exactly_then_retries_the_same_window() {
    struct FlakyTarget {
        rendered: Arc<Mutex<Vec<String>>>,
        fail_first: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl RenderTarget for FlakyTarget {
        async fn render(&self, text: &str) -> Result<(), RenderError> {
            let mut fail = self.fail_first.lock().expect("lock");
            if *fail {
                *fail = false;
                return Err(RenderError::RateLimited(Duration::from_secs(9)));
            }
            self.rendered.lock().expect("lock").push(text.to_string());
            Ok(())
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("app.log");
    std::fs::write(&path, "alpha\nbeta\n").expect("write log");

    let rendered = Arc::new(Mutex::new(Vec::new()));
    let target = FlakyTarget {
        rendered: rendered.clone(),
        fail_first: Arc::new(Mutex::new(true)),
    };

    let registry = MarqueeRegistry::new(path, 1, 1);
    let state = registry.state();
    state.set_delay(1);
    assert!(registry.start(target));

    let start = tokio::time::Instant::now();
    // Rate-limit wait (9s) + regular delay (1s) before the retried render.
    while rendered.lock().expect("lock").is_empty() {
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(
            start.elapsed() < Duration::from_secs(30),
            "marquee never recovered from the rate limit"
        );
    }
    assert!(
        start.elapsed() >= Duration::from_secs(9),
        "retry happened before the mandated wait"
    );
    // The retried render is still the first window.
    assert!(rendered.lock().expect("lock")[0].contains("alpha"));

    registry.stop();
}
