use anyhow::Context;
use clap::{Parser, Subcommand};
use fruitreel_core::{simulate_parallel, summarize, SlotConfig, Symbol};
use fruitreel_server::{auth::hash_password, db};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fruitreel-cli", about = "Admin CLI for the fruitreel server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Database URL, default sqlite://fruitreel.db
    #[arg(long, value_parser, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// View last N spin log entries
    ViewLogs {
        #[arg(default_value_t = 20)]
        n: i64,
    },
    /// Export the spin log to a CSV file
    ExportCsv { path: String },
    /// Print the stored machine configuration and its RTP figures
    ShowConfig,
    /// Simulate spins against the stored configuration
    Simulate {
        #[arg(long, default_value_t = 100_000)]
        spins: u64,
        #[arg(long, default_value_t = 1)]
        bet: i64,
        /// Fixed seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Restore the default fruit machine
    ResetConfig,
    /// Print the ADMIN_PASSWORD_HASH value for a password
    HashPassword { password: String },
}

async fn get_pool(url: Option<String>) -> anyhow::Result<SqlitePool> {
    let url = url.unwrap_or_else(|| "sqlite://fruitreel.db".into());
    let options = SqliteConnectOptions::from_str(&url)
        .with_context(|| format!("bad database url {url}"))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    db::migrate(&pool).await?;
    Ok(pool)
}

async fn stored_config(pool: &SqlitePool) -> anyhow::Result<SlotConfig> {
    Ok(db::load_config(pool)
        .await?
        .unwrap_or_else(SlotConfig::default_fruit))
}

fn format_symbols(symbols: &[Symbol]) -> String {
    symbols
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_config(config: &SlotConfig) -> anyhow::Result<()> {
    let summary = summarize(config)?;
    println!("reels: {}", summary.reel_count);
    println!("{:<6} {:>6} {:>9} {:>6} {:>9}", "symbol", "weight", "prob", "mult", "ev");
    for row in &summary.symbol_analysis {
        println!(
            "{:<6} {:>6} {:>8.2}% {:>5}x {:>9.4}",
            row.symbol,
            row.weight,
            row.probability * 100.0,
            row.payout_multiplier,
            row.expected_contribution
        );
    }
    println!("theoretical RTP: {:.3}%", summary.theoretical_rtp);
    println!("exact RTP:       {:.3}%", summary.exact_rtp);
    println!("win probability: {:.3}%", summary.win_probability);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let cli = Cli::parse();

    if let Commands::HashPassword { password } = &cli.command {
        println!("ADMIN_PASSWORD_HASH={}", hash_password(password));
        return Ok(());
    }

    let pool = get_pool(cli.database_url).await?;

    match cli.command {
        Commands::ViewLogs { n } => {
            for entry in db::spin_log(&pool, Some(n), true).await? {
                println!(
                    "#{:>6} {} session={} bet={} [{}] payout={}",
                    entry.id,
                    db::stamp(entry.ts),
                    entry.session_id,
                    entry.bet_amount,
                    format_symbols(&entry.symbols),
                    entry.payout
                );
            }
        }
        Commands::ExportCsv { path } => {
            let mut wtr = csv::Writer::from_path(&path)?;
            wtr.write_record(["id", "ts", "session_id", "bet_amount", "symbols", "payout"])?;
            let entries = db::spin_log(&pool, None, false).await?;
            for entry in &entries {
                wtr.write_record(&[
                    entry.id.to_string(),
                    db::stamp(entry.ts),
                    entry.session_id.clone(),
                    entry.bet_amount.to_string(),
                    format_symbols(&entry.symbols),
                    entry.payout.to_string(),
                ])?;
            }
            wtr.flush()?;
            println!("Exported {} rows to {}", entries.len(), path);
        }
        Commands::ShowConfig => {
            print_config(&stored_config(&pool).await?)?;
        }
        Commands::Simulate { spins, bet, seed } => {
            let config = stored_config(&pool).await?;
            let seed = seed.unwrap_or_else(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or_default()
            });
            info!(spins, bet, seed, "running simulation");
            let stats = simulate_parallel(&config, spins, bet, seed, None)?;
            println!("seed:            {seed}");
            println!("spins:           {}", stats.completed_spins);
            println!("total bet:       {}", stats.total_bet);
            println!("total payout:    {}", stats.total_payout);
            println!("win rate:        {:.3}%", stats.win_rate);
            println!("actual RTP:      {:.3}%", stats.actual_rtp);
            println!("theoretical RTP: {:.3}%", stats.theoretical_rtp);
            println!("difference:      {:+.3}pp", stats.rtp_difference);
            println!("biggest win:     {}", stats.biggest_win);
        }
        Commands::ResetConfig => {
            let config = SlotConfig::default_fruit();
            db::save_config(&pool, &config).await?;
            println!("Configuration reset to the default machine; restart the server to load it.");
            print_config(&config)?;
        }
        Commands::HashPassword { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}
