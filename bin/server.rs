// Home Sales Map - Web Server
// Serves the choropleth page and the JSON API behind it.

use anyhow::{Context, Result};
use clap::Parser;

use home_sales_map::api::{router, AppState};
use home_sales_map::config::{DataArgs, ServerArgs};
use home_sales_map::logging::init_tracing;
use home_sales_map::{SharedDataset, VERSION};

#[derive(Parser)]
#[command(name = "home-sales-server", version, about = "Home sales choropleth web server")]
struct Args {
    #[command(flatten)]
    data: DataArgs,

    #[command(flatten)]
    server: ServerArgs,

    /// Log level when RUST_LOG is not set.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    println!("🌐 Home Sales Map v{} - Web Server", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let source = args.data.source();
    let data = SharedDataset::load(source.clone()).with_context(|| {
        format!(
            "Failed to load {} and {}",
            source.sales_path.display(),
            source.geometry_path.display()
        )
    })?;

    let snapshot = data.snapshot();
    println!(
        "✓ Loaded {} sales and {} block groups across {} counties",
        snapshot.info.sales_rows,
        snapshot.info.block_groups,
        snapshot.counties.len()
    );

    if args.server.mapbox_token.is_none() {
        tracing::warn!("no Mapbox token configured, falling back to OpenStreetMap tiles");
    }

    let mut state = AppState::new(data, args.server.mapbox_token.clone());
    state.web_dir = args.server.web_dir.clone();

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&args.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", args.server.bind))?;

    let local = listener.local_addr()?;
    println!("\n🚀 Server running on http://{}", local);
    println!("   API: http://{}/api/map", local);
    println!("   UI:  http://{}/", local);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server exited with an error")?;

    Ok(())
}
