mod api;
mod clean;
mod collect;
mod regions;
mod table;
mod text;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use api::{Credentials, NaverClient};
use collect::CollectorConfig;

#[derive(Parser)]
#[command(
    name = "library_scraper",
    about = "Library open-data cleaner + Naver blog review collector"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw library table (dedupe, winsorize, derive regions)
    Clean {
        /// Raw open-data CSV (cp949/euc-kr/utf-8 detected)
        #[arg(short, long, default_value = "전국도서관표준데이터.csv")]
        input: PathBuf,
        /// Cleaned CSV to write
        #[arg(short, long, default_value = "library_info_cleaned.csv")]
        output: PathBuf,
    },
    /// Collect blog reviews for every library in a cleaned table
    Collect {
        /// Cleaned library CSV
        #[arg(short, long, default_value = "library_info_cleaned.csv")]
        input: PathBuf,
        /// Review CSV to append to
        #[arg(short, long, default_value = "library_blog_reviews_api.csv")]
        output: PathBuf,
        #[command(flatten)]
        opts: CollectArgs,
    },
    /// Clean + collect in one pipeline
    Run {
        /// Raw open-data CSV
        #[arg(long, default_value = "전국도서관표준데이터.csv")]
        input: PathBuf,
        /// Intermediate cleaned CSV
        #[arg(long, default_value = "library_info_cleaned.csv")]
        cleaned: PathBuf,
        /// Review CSV to append to
        #[arg(long, default_value = "library_blog_reviews_api.csv")]
        output: PathBuf,
        #[command(flatten)]
        opts: CollectArgs,
    },
}

#[derive(Args)]
struct CollectArgs {
    /// Reviews to collect per library
    #[arg(short = 'n', long, default_value = "5")]
    reviews_per_library: usize,
    /// Delay between result pages (ms)
    #[arg(long, default_value = "500")]
    page_delay_ms: u64,
    /// Delay between libraries (ms)
    #[arg(long, default_value = "1000")]
    library_delay_ms: u64,
    /// Naver API client id (falls back to NAVER_CLIENT_ID)
    #[arg(long)]
    client_id: Option<String>,
    /// Naver API client secret (falls back to NAVER_CLIENT_SECRET)
    #[arg(long)]
    client_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Clean { input, output } => run_clean(&input, &output),
        Commands::Collect { input, output, opts } => run_collect(&input, &output, opts).await,
        Commands::Run {
            input,
            cleaned,
            output,
            opts,
        } => {
            run_clean(&input, &cleaned)?;
            run_collect(&cleaned, &output, opts).await
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_clean(input: &Path, output: &Path) -> Result<()> {
    let report = clean::clean_file(input, output)?;
    report.print();
    println!("Cleaned table written to {}", output.display());
    Ok(())
}

async fn run_collect(input: &Path, output: &Path, opts: CollectArgs) -> Result<()> {
    // Fail on missing credentials before touching any file.
    let credentials = Credentials::resolve(opts.client_id, opts.client_secret)?;

    let libraries = collect::load_libraries(input)?;
    if libraries.is_empty() {
        println!("No libraries in {}. Run 'clean' first.", input.display());
        return Ok(());
    }
    println!("Collecting reviews for {} libraries...", libraries.len());

    let client = NaverClient::new(credentials);
    let config = CollectorConfig {
        reviews_per_library: opts.reviews_per_library,
        page_delay: Duration::from_millis(opts.page_delay_ms),
        library_delay: Duration::from_millis(opts.library_delay_ms),
    };

    let written = collect::collect_all(&client, &libraries, output, &config).await?;
    println!("Wrote {} new review rows to {}.", written, output.display());
    Ok(())
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
