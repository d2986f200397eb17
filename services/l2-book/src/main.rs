use l2_book::config::ServiceConfig;
use l2_book::metrics::AlertThresholds;
use l2_book::processor::{run_lines, BookProcessor};
use l2_book::sink::JsonLinesSink;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    dotenvy::dotenv().ok();

    // Initialize tracing on stderr; stdout carries the frames
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = ServiceConfig::from_env()?;
    tracing::info!(
        version = l2_book::SERVICE_VERSION,
        product = %config.product_id,
        channel = %config.channel,
        agg_level = %config.agg_level,
        depth_limit = ?config.depth_limit,
        row_count = config.row_count,
        "Starting L2 book service"
    );

    let mut processor = BookProcessor::new(&config)?;
    let metrics = processor.metrics();
    let mut sink = JsonLinesSink::new(std::io::stdout().lock(), config.product_id.clone(), config.row_count);

    let reader = BufReader::new(tokio::io::stdin());
    let summary = run_lines(reader, &mut processor, &mut sink).await?;

    for alert in metrics.check_thresholds(&AlertThresholds::default()) {
        tracing::warn!(metric = %alert.metric, level = ?alert.level, "{}", alert.message);
    }
    tracing::info!(
        published = summary.published,
        metrics = ?metrics.export(),
        "Shutting down"
    );

    Ok(())
}
