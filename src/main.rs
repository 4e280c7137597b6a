mod config;
mod db;
mod error;
mod parser;
mod wiki;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use config::ExtractOptions;

#[derive(Parser)]
#[command(name = "tourney_scraper", about = "Tournament roster and bracket extractor for Liquipedia wikis")]
struct Cli {
    /// TOML file with extraction options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a wiki, fetch the top hit and print its structured data
    Fetch {
        /// Tournament name or search keywords
        query: String,
        /// Wiki to search (e.g. valorant, counterstrike, dota2)
        #[arg(short, long)]
        game: String,
        /// Do not archive the raw wikitext
        #[arg(long)]
        no_store: bool,
    },
    /// Extract structured data from a local wikitext file
    Parse {
        file: PathBuf,
    },
    /// Re-extract archived pages
    Process {
        /// Max pages to process (default: all pending)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Reprocess every archived page, not just pending ones
        #[arg(long)]
        all: bool,
    },
    /// Archived pages overview table
    List {
        /// Filter by wiki
        #[arg(short, long)]
        game: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show archive statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let opts = match &cli.config {
        Some(path) => ExtractOptions::load(path)?,
        None => ExtractOptions::default(),
    };

    let result = match cli.command {
        Commands::Fetch { query, game, no_store } => {
            let page = match wiki::lookup(&game, &query).await {
                Ok(page) => page,
                Err(e) if e.is_not_found() => {
                    eprintln!("Not found: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            };

            let data = parser::extract_tournament(&page.content, &opts);
            info!(
                "Extracted {} teams, {} matches [{}]",
                data.participants.len(),
                data.results.match_count(),
                data.results.keys().collect::<Vec<_>>().join(", ")
            );
            if !no_store {
                let conn = db::connect()?;
                db::init_schema(&conn)?;
                let id = db::save_page(
                    &conn,
                    &db::PageRow {
                        game: page.game.clone(),
                        query: page.query.clone(),
                        title: page.title.clone(),
                        pageid: page.pageid,
                        wikitext: page.content.clone(),
                    },
                )?;
                db::save_extractions(
                    &conn,
                    &[db::ExtractionRow {
                        page_id: id,
                        teams: data.participants.len(),
                        matches: data.results.match_count(),
                        data_json: serde_json::to_string(&data)?,
                    }],
                )?;
                info!("Archived '{}' as page {}", page.title, id);
            }

            let out = serde_json::json!({
                "title": page.title,
                "pageid": page.pageid,
                "structured_data": data,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Parse { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let data = parser::extract_tournament(&text, &opts);
            println!("{}", serde_json::to_string_pretty(&data)?);
            Ok(())
        }
        Commands::Process { limit, all } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let pages = if all {
                db::fetch_pages(&conn, limit)?
            } else {
                db::fetch_unprocessed(&conn, limit)?
            };
            if pages.is_empty() {
                println!("No pages to process. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &pages, &opts)?;
            counts.print();
            Ok(())
        }
        Commands::List { game, limit } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let rows = db::fetch_overview(&conn, game.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No pages archived.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<48} | {:<14} | {:>8} | {:>5} | {:>7} | {:<19}",
                "#", "Title", "Game", "Page ID", "Teams", "Matches", "Fetched"
            );
            println!("{}", "-".repeat(120));

            for (i, r) in rows.iter().enumerate() {
                let count = |v: Option<usize>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<48} | {:<14} | {:>8} | {:>5} | {:>7} | {:<19}",
                    i + 1,
                    truncate(&r.title, 48),
                    truncate(&r.game, 14),
                    r.pageid,
                    count(r.teams),
                    count(r.matches),
                    r.fetched_at
                );
            }

            println!("\n{} pages", rows.len());
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Pages:       {}", s.pages);
            println!("Processed:   {}", s.processed);
            println!("Unprocessed: {}", s.unprocessed);
            println!("Teams:       {}", s.teams);
            println!("Matches:     {}", s.matches);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct ProcessCounts {
    pages: usize,
    teams: usize,
    matches: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} pages: {} teams, {} matches.",
            self.pages, self.teams, self.matches,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    pages: &[db::StoredPage],
    opts: &ExtractOptions,
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        pages: 0,
        teams: 0,
        matches: 0,
    };

    for chunk in pages.chunks(500) {
        let rows: Vec<_> = chunk
            .par_iter()
            .map(|page| parser::process_page(page, opts))
            .collect();

        for r in &rows {
            counts.teams += r.teams;
            counts.matches += r.matches;
        }
        counts.pages += db::save_extractions(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(truncate("Leviatán Esports", 16), "Leviatán Esports");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(std::time::Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_fetch() {
        let cli = Cli::try_parse_from(["tourney_scraper", "fetch", "VCT 2025", "--game", "valorant"]).unwrap();
        match cli.command {
            Commands::Fetch { query, game, no_store } => {
                assert_eq!(query, "VCT 2025");
                assert_eq!(game, "valorant");
                assert!(!no_store);
            }
            _ => panic!("expected fetch"),
        }
    }
}
