use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use topicgraph_analyzer::coordinator::{DeliveryCoordinator, DeliveryPolicy};
use topicgraph_analyzer::extractor::KeywordExtractor;
use topicgraph_analyzer::ingest::GraphIngestor;
use topicgraph_analyzer::pipeline::PostPipeline;
use topicgraph_analyzer::queue::AmqpQueue;
use topicgraph_common::Config;
use topicgraph_graph::{migrate::migrate, GraphClient, TopicWriter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("topicgraph=info".parse()?))
        .init();

    info!("Topic graph analyzer starting...");

    let config = Config::from_env()?;
    config.log_redacted();

    let concurrency = usize::from(config.prefetch_count.max(1));

    // Connect to Neo4j
    let client = GraphClient::connect(
        &config.neo4j_uri,
        &config.neo4j_user,
        &config.neo4j_password,
        concurrency,
    )
    .await?;

    migrate(&client).await?;

    let writer = TopicWriter::new(client);
    let counts = writer.counts().await?;
    info!(
        authors = counts.authors,
        topics = counts.topics,
        authored = counts.authored,
        reshared = counts.reshared,
        "Graph ready"
    );

    let pipeline = PostPipeline::new(
        Arc::new(KeywordExtractor::default()),
        GraphIngestor::new(Arc::new(writer)),
    );
    let coordinator =
        DeliveryCoordinator::new(pipeline, concurrency, DeliveryPolicy::from_config(&config));

    let queue = AmqpQueue::connect(&config.broker_url, &config.queue_name, config.prefetch_count)
        .await?;

    let stats = coordinator.run(queue.deliveries(), shutdown_signal()).await;
    info!(
        settled = stats.settled(),
        crashed = stats.crashed,
        stream_errors = stats.stream_errors,
        "Consumer stopped"
    );

    queue.close().await?;
    info!("Topic graph analyzer stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Received shutdown signal, draining in-flight messages");
}
