use async_trait::async_trait;
use chatsweep::sweeper::{
    run_sweep, DeleteMessages, DeleteOutcome, DeletionJob, SweepRegistry,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::{ChatId, MessageId, UserId};

/// Platform stub that deletes everything and counts calls.
#[derive(Default)]
struct CountingApi {
    calls: AtomicU32,
}

#[async_trait]
impl DeleteMessages for CountingApi {
    async fn delete_message(&self, _chat: ChatId, _id: MessageId) -> DeleteOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DeleteOutcome::Deleted
    }
}

fn job(start: i32, pause_ms: u64) -> DeletionJob {
    DeletionJob {
        chat_id: ChatId(10),
        requester_id: UserId(1),
        start_message_id: start,
        end_message_id: 0,
        pause: Duration::from_millis(pause_ms),
    }
}

#[tokio::test(start_paused = true)]
async fn registry_cancel_interrupts_a_running_sweep() {
    let registry = Arc::new(SweepRegistry::new());
    let api = Arc::new(CountingApi::default());
    let chat = ChatId(10);

    let token = registry.begin(chat).await.expect("chat is free");
    assert!(registry.is_active(chat).await);

    let sweep = {
        let api = api.clone();
        let token = token.clone();
        tokio::spawn(async move { run_sweep(api.as_ref(), &job(50, 100), &token).await })
    };

    // Let a handful of attempts happen, then cancel through the registry.
    tokio::time::sleep(Duration::from_millis(550)).await;
    assert!(registry.cancel(chat).await);

    let result = sweep.await.expect("sweep join");
    registry.finish(chat).await;

    assert!(result.cancelled);
    assert!(result.attempted >= 1);
    assert!(result.attempted < 50, "cancel must cut the range short");
    assert_eq!(result.attempted, api.calls.load(Ordering::SeqCst));
    assert!(!registry.is_active(chat).await);
}

#[tokio::test(start_paused = true)]
async fn second_delete_all_is_rejected_until_the_first_finishes() {
    let registry = SweepRegistry::new();
    let chat = ChatId(10);

    let token = registry.begin(chat).await.expect("chat is free");
    assert!(registry.begin(chat).await.is_none());

    let api = CountingApi::default();
    let result = run_sweep(&api, &job(3, 100), &token).await;
    registry.finish(chat).await;

    assert_eq!(result.attempted, 3);
    assert_eq!(result.deleted, 3);
    assert!(registry.begin(chat).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn deletion_job_below_covers_exactly_the_prior_messages() {
    // Confirmation message N+1 sweeps the range [1, N].
    let api = CountingApi::default();
    let job = DeletionJob::below(ChatId(10), UserId(1), MessageId(25), Duration::from_millis(10));
    let result = run_sweep(&api, &job, &tokio_util::sync::CancellationToken::new()).await;

    assert_eq!(result.attempted, 24);
    assert_eq!(result.deleted, 24);
    assert!(!result.cancelled);
}
