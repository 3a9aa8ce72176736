//! Diagnostic tool: run one search against a live catalog and print the
//! rows once the loading flag settles. Exercises both transports.
//!
//! Usage: cargo run --bin packdex -- "lib curl" --host localhost:8080

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use packdex_client::{
    Depth, PollingSearchService, ResultList, SearchMethod, SearchService,
    StreamingSearchService,
};

#[derive(Parser)]
#[command(name = "packdex", about = "Progressive package catalog search")]
struct Cli {
    /// Search terms
    query: String,

    /// Catalog host, host[:port]
    #[arg(long, default_value = "localhost:8080")]
    host: String,

    /// Hold a persistent search channel instead of polling
    #[arg(long)]
    streaming: bool,

    /// List shallow rows only, skip the deep enrichment pass
    #[arg(long)]
    no_autofill: bool,

    /// Match algorithm: fast, like, levenshtein
    #[arg(long, default_value = "fast")]
    method: String,

    /// Network timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("packdex=info".parse()?))
        .init();

    let cli = Cli::parse();
    let method = SearchMethod::from_str_loose(&cli.method);
    let timeout = Duration::from_secs(cli.timeout_secs);
    let autofill = !cli.no_autofill;

    let service: Arc<dyn SearchService> = if cli.streaming {
        Arc::new(StreamingSearchService::with_timeout(&cli.host, timeout).with_method(method))
    } else {
        Arc::new(PollingSearchService::with_timeout(&cli.host, timeout).with_method(method))
    };

    info!(
        host = cli.host.as_str(),
        streaming = cli.streaming,
        method = %method,
        "Searching"
    );

    let results = ResultList::new();
    service.search(results.clone(), &cli.query, autofill);

    let mut loading = service.loading();
    loading.wait_for(|l| !*l).await?;

    let rows = results.snapshot();
    println!("{} rows for \"{}\"\n", rows.len(), cli.query);

    for (i, row) in rows.iter().enumerate() {
        println!(
            "  {:>3}. {:<40} count={:<8} packages={:<4} [{}] {}",
            i + 1,
            trunc(&row.name, 40),
            row.count,
            row.packages,
            row.depth,
            row.date,
        );
    }

    let shallow = rows.iter().filter(|r| r.depth == Depth::Shallow && r.id > 0).count();
    if autofill && shallow > 0 {
        println!("\n  {} rows still shallow (enrichment did not finish)", shallow);
    }

    Ok(())
}

fn trunc(s: &str, max: usize) -> String {
    // Cut by character, not byte: backend names are arbitrary UTF-8.
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}
