/// procweave: lightweight business-process execution engine
///
/// Main entry point. Loads configuration from the environment and starts the
/// HTTP server:
/// - Definition deploy and lookup at /api/definitions/*
/// - Instance start and audit trail at /api/instances/*
/// - Task inbox and completion at /api/tasks/*
/// - Health check at /healthz

use procweave::{config::Config, server::start_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // defaults to 0.0.0.0:3004 and sqlite://data/procweave.db
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
