use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod analytics;
mod db;
mod models;
mod predict;
mod report;
mod rules;
mod status;

#[derive(Parser)]
#[command(name = "ro-tracker")]
#[command(about = "Repair order turnaround tracker and shop performance predictor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import status events from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List ROs with follow-ups due soon, overdue first
    Due {
        #[arg(long, default_value_t = 7)]
        within_days: i64,
    },
    /// Show per-shop turnaround profiles
    Shops {
        #[arg(long)]
        shop: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Predict completion for in-flight ROs
    #[command(group(
        ArgGroup::new("scope")
            .args(["shop", "ro"])
            .multiple(false)
    ))]
    Predict {
        #[arg(long)]
        shop: Option<String>,
        #[arg(long)]
        ro: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        shop: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    let today = Utc::now().date_naive();

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Appended {inserted} status events from {}.", csv.display());
        }
        Commands::Due { within_days } => {
            let orders = db::fetch_repair_orders(&pool, None).await?;
            let mut due: Vec<_> = orders
                .iter()
                .filter_map(|ro| {
                    let next = rules::ro_next_update_date(ro);
                    if rules::is_due_within(next, today, within_days) {
                        next.map(|date| (ro, date))
                    } else {
                        None
                    }
                })
                .collect();
            due.sort_by(|a, b| a.1.cmp(&b.1));

            if due.is_empty() {
                println!("Nothing due in the next {within_days} days.");
                return Ok(());
            }

            println!("Follow-ups due within {within_days} days:");
            for (ro, next) in due {
                let lapsed = rules::days_overdue(Some(next), today);
                if lapsed > 0 {
                    println!(
                        "- {} ({}) {} due {} ({} days overdue)",
                        ro.ro_number, ro.shop_name, ro.current_status, next, lapsed
                    );
                } else {
                    println!(
                        "- {} ({}) {} due {}",
                        ro.ro_number, ro.shop_name, ro.current_status, next
                    );
                }
            }

            let on_track = orders
                .iter()
                .filter(|ro| rules::is_on_track(rules::ro_next_update_date(ro), today))
                .count();
            println!("{on_track} ROs are on track.");
        }
        Commands::Shops { shop, json } => {
            let orders = db::fetch_repair_orders(&pool, shop.as_deref()).await?;
            let profiles = analytics::build_profiles(&orders, today);

            if json {
                let mut sorted: Vec<_> = profiles.values().collect();
                sorted.sort_by(|a, b| a.shop_name.cmp(&b.shop_name));
                println!("{}", serde_json::to_string_pretty(&sorted)?);
                return Ok(());
            }

            let shops: Vec<_> = db::fetch_shops(&pool)
                .await?
                .into_iter()
                .filter(|record| shop.as_deref().map_or(true, |name| record.name == name))
                .collect();

            if shops.is_empty() {
                println!("No shops on file.");
                return Ok(());
            }

            for record in shops {
                let terms = record.payment_terms.as_deref().unwrap_or("no terms");
                match profiles.get(&record.name) {
                    Some(profile) => match profile.median_turnaround {
                        Some(median) => println!(
                            "- {} ({}): {} ROs ({} active), median turnaround {:.1} days, trend {}",
                            record.name,
                            terms,
                            profile.total_ros,
                            profile.active_ros.len(),
                            median,
                            profile.trend,
                        ),
                        None => println!(
                            "- {} ({}): {} ROs ({} active), no completed history yet",
                            record.name,
                            terms,
                            profile.total_ros,
                            profile.active_ros.len(),
                        ),
                    },
                    None => println!("- {} ({}): no repair orders on file", record.name, terms),
                }
            }
        }
        Commands::Predict { shop, ro, json } => {
            let orders = db::fetch_repair_orders(&pool, shop.as_deref()).await?;
            let profiles = analytics::build_profiles(&orders, today);
            let mut predictions: Vec<_> = orders
                .iter()
                .filter(|order| {
                    ro.as_deref()
                        .map_or(true, |number| order.ro_number == number)
                })
                .filter_map(|order| predict::predict_completion(order, &profiles, today))
                .collect();
            predictions.sort_by(|a, b| a.estimated_date.cmp(&b.estimated_date));

            if predictions.is_empty() {
                println!("No in-flight ROs with enough shop history to predict.");
                return Ok(());
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&predictions)?);
                return Ok(());
            }

            for prediction in predictions {
                println!(
                    "- {} ({}): estimated completion {} +/- {:.1} days, {}",
                    prediction.ro_number,
                    prediction.shop_name,
                    prediction.estimated_date,
                    prediction.confidence_days,
                    prediction.status,
                );
            }
        }
        Commands::Report { shop, out } => {
            let orders = db::fetch_repair_orders(&pool, shop.as_deref()).await?;
            let profiles = analytics::build_profiles(&orders, today);
            let report = report::build_report(shop.as_deref(), today, &orders, &profiles);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
