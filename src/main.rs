// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use home_sales_map::config::{DataArgs, FilterArgs};
use home_sales_map::logging::init_tracing;
use home_sales_map::{aggregate, write_sales, Dataset};

#[derive(Parser)]
#[command(name = "home-sales", version, about = "Home sales by census block group")]
struct Cli {
    #[command(flatten)]
    data: DataArgs,

    /// Log level when RUST_LOG is not set.
    #[arg(long = "log-level", global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive terminal dashboard (default).
    Tui,

    /// Print the block group table for the given filters.
    Summary {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the filtered sales as CSV to stdout.
    Dump {
        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Write the joined block groups as GeoJSON.
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file.
        #[arg(long = "out", default_value = "block_groups.geojson")]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let dataset = Dataset::load(&cli.data.source())?;

    match cli.command.unwrap_or(Command::Tui) {
        Command::Tui => run_ui_mode(dataset)?,
        Command::Summary { filter } => run_summary(&dataset, &filter)?,
        Command::Dump { filter } => run_dump(&dataset, &filter)?,
        Command::Export { filter, out } => run_export(&dataset, &filter, &out)?,
    }

    Ok(())
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "-".to_string(),
    }
}

fn run_summary(dataset: &Dataset, args: &FilterArgs) -> Result<()> {
    let (filter, _) = args.resolve()?;

    let filtered = dataset.filtered_sales(&filter);
    let aggregates = aggregate::aggregate_by_block_group(&filtered, &dataset.counties);
    let totals = aggregate::totals(&filtered, &aggregates);

    println!("🏠 Home Sales - {}", filter.summary());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "{:<14} {:<11} {:>6} {:>13} {:>10} {:>10}",
        "BG_ID", "County", "Sales", "Median price", "Price/SF", "Median SF"
    );

    for row in &aggregates {
        println!(
            "{:<14} {:<11} {:>6} {:>13} {:>10} {:>10}",
            row.bg_id,
            row.county_name.as_deref().unwrap_or("-"),
            row.total_sales,
            fmt_opt(row.median_price, 0),
            fmt_opt(row.median_price_sf, 2),
            fmt_opt(row.median_sf, 0),
        );
    }

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ {} sales in {} block groups (median price {})",
        totals.total_sales,
        totals.block_groups,
        fmt_opt(totals.median_price, 0)
    );
    println!("  {}", home_sales_map::pages::SOURCE_NOTE);

    Ok(())
}

fn run_dump(dataset: &Dataset, args: &FilterArgs) -> Result<()> {
    let (filter, _) = args.resolve()?;
    let sales = dataset.filtered_sales(&filter);
    write_sales(std::io::stdout().lock(), &sales)
}

fn run_export(dataset: &Dataset, args: &FilterArgs, out: &Path) -> Result<()> {
    let (filter, metric) = args.resolve()?;
    let map = dataset.map(&filter, metric)?;
    let feature_count = map.features.features.len();
    let unmatched = map.unmatched_block_groups.len();

    let geojson = geojson::GeoJson::from(map.features);
    std::fs::write(out, geojson.to_string())
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!(
        "✓ Wrote {} block groups colored by {} to {}",
        feature_count,
        metric.label(),
        out.display()
    );
    if unmatched > 0 {
        println!("  {} block groups with sales had no polygon", unmatched);
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(dataset: Dataset) -> Result<()> {
    println!("🖥️  Loading Home Sales dashboard...\n");

    let mut app = ui::App::new(dataset);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_dataset: Dataset) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: home-sales summary");
    std::process::exit(1);
}
