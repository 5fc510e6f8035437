use sales_lens::config::{load_config, AppConfig};
use sales_lens::pipeline;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());

    let config: Arc<AppConfig> = match load_config(&config_path) {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            error!("Config load error: {}", e);
            std::process::exit(1);
        }
    };

    match pipeline::run(config).await {
        Ok(summary) => {
            if !summary.unmapped.is_empty() {
                info!(
                    "{} geography values were not mapped to a region.",
                    summary.unmapped.len()
                );
            }
            if let Some(run_id) = summary.run_id {
                info!("Results stored as run {}.", run_id);
            }
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            std::process::exit(1);
        }
    }
}
