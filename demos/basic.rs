//! Basic example wiring a coalescer and a dispatcher to a fake service.
//!
//! The fake service resolves even ids only and accepts three posts before it
//! starts answering with a rate-limit error. Watch the log: lookups requested
//! together share one batch call, and once posting is limited the remaining
//! replies are dropped while the display name switches to its "resting" form.

use async_trait::async_trait;
use lookup_throttle::{
    DisplayNames, GateConfig, Keyed, LookupKey, LookupService, MemoryStore, OutboundDispatcher,
    OutboundMessage, PostingService, RateLimitGate, RequestCoalescer, Sender, ServiceError,
    SystemClock, TracingSink,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
struct Status {
    id: LookupKey,
    author: String,
}

impl Keyed for Status {
    fn key(&self) -> LookupKey {
        self.id
    }
}

#[derive(Default)]
struct FakeApi {
    posts: AtomicUsize,
}

#[async_trait]
impl LookupService<Status> for FakeApi {
    async fn lookup(&self, keys: &[LookupKey]) -> Result<Vec<Status>, ServiceError> {
        info!(?keys, "batch lookup");
        Ok(keys
            .iter()
            .filter(|id| *id % 2 == 0)
            .map(|&id| Status {
                id,
                author: format!("user{}", id),
            })
            .collect())
    }

    async fn lookup_one(&self, key: LookupKey) -> Result<Status, ServiceError> {
        self.lookup(&[key])
            .await?
            .pop()
            .ok_or(ServiceError::NotFound)
    }
}

#[async_trait]
impl PostingService for FakeApi {
    async fn post(&self, message: &OutboundMessage) -> Result<(), ServiceError> {
        if self.posts.fetch_add(1, Ordering::SeqCst) >= 3 {
            return Err(ServiceError::RateLimited { reset_at: None });
        }
        info!(body = %message.body, "posted");
        Ok(())
    }

    async fn set_display_name(&self, name: &str) -> Result<(), ServiceError> {
        info!(name, "display name set");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("info,lookup_throttle=debug")
        .init();

    println!("=== Lookup Coalescing Example ===\n");

    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock::new());
    let sink = Arc::new(TracingSink::new());
    let api = Arc::new(FakeApi::default());

    let lookup_gate = RateLimitGate::with_config(
        store.clone(),
        clock.clone(),
        sink.clone(),
        GateConfig::new("lookup-cooldown")?,
    );
    let post_gate = RateLimitGate::with_config(
        store,
        clock,
        sink,
        GateConfig::new("post-cooldown")?.with_default_cooldown(Duration::from_secs(60))?,
    );

    let coalescer = RequestCoalescer::<Status>::builder(api.clone(), lookup_gate)
        .with_tick_interval(Duration::from_millis(200))
        .build()?;
    let ticker = coalescer.start();

    let (outbox, dispatcher) = OutboundDispatcher::builder(api, post_gate)
        .with_display_names(DisplayNames::new("dicebot", "dicebot (resting)"))
        .build()
        .spawn();

    println!("Requesting 8 lookups (ids 1..=4, twice each) within one tick:");
    for round in 0..2 {
        for id in 1..=4 {
            let outbox = outbox.clone();
            coalescer.enqueue(id, move |status: Status| {
                let sender = Sender::Timeline {
                    status_id: status.id,
                    screen_name: status.author.clone(),
                    name: status.author,
                };
                let _ = outbox.send_as(&sender, &format!("found you (round {})", round));
            });
        }
    }

    tokio::time::sleep(Duration::from_secs(1)).await;

    ticker.shutdown().await?;
    drop(outbox);
    dispatcher.shutdown().await?;

    println!("\n=== Example Complete ===");
    println!("Notice: one batch call served every request; odd ids were never answered.");
    Ok(())
}
