use std::sync::Arc;
use std::time::Duration;
use handoff_queue::{AsyncConsumer, AsyncProducer, HandoffQueue, QueueConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("handoff_queue=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let frontier = Arc::new(HandoffQueue::<String>::with_config(
        QueueConfig::default().named("frontier").recording(true),
    ));
    let shutdown = CancellationToken::new();

    // Producers: each "site" pushes a seed page, then a batch of discovered links
    let mut producers = Vec::new();
    for site in 0..4 {
        let frontier = frontier.clone();
        let shutdown = shutdown.clone();
        producers.push(tokio::spawn(async move {
            frontier
                .produce(format!("https://site{site}.example/"), &shutdown)
                .await?;
            for page in 0..3 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let links = (0..5).map(|link| format!("https://site{site}.example/p{page}/l{link}"));
                frontier.produce_all(links.collect::<Vec<_>>(), &shutdown).await?;
            }
            Ok::<_, handoff_queue::QueueError>(())
        }));
    }

    // Consumers poll until the frontier is finished and drained
    let mut consumers = Vec::new();
    for worker in 0..3 {
        let frontier = frontier.clone();
        consumers.push(tokio::spawn(async move {
            let mut fetched = 0usize;
            while !frontier.is_finished_and_empty().await {
                match frontier.get().await {
                    Some(_url) => fetched += 1,
                    None => tokio::task::yield_now().await,
                }
            }
            info!(worker, fetched, "worker done");
            fetched
        }));
    }

    for producer in producers {
        producer.await??;
    }
    frontier.finish().await;

    let mut fetched = 0;
    for consumer in consumers {
        fetched += consumer.await?;
    }

    let stats = frontier.close().await;
    info!(fetched, produced = stats.produced, consumed = stats.consumed, "crawl finished");

    let written = frontier.export_journal("output.ndjson").await?;
    info!(written, "journal appended to output.ndjson");
    Ok(())
}
