use clap::Parser;
use metaguru::app::App;
use metaguru::cli::Args;
use metaguru::config::Config;
use metaguru::logging::setup_logging;
use std::process::ExitCode;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Load config and setup logging before App::new() so startup logs are never silently dropped
    let early_config = Config::from_env().expect("Failed to load config for logging setup");
    setup_logging(&early_config, args.tracing);

    // Create and initialize the application
    let mut app = App::new().await.expect("Failed to initialize application");

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting metaguru"
    );

    app.start_services();
    app.run().await
}
