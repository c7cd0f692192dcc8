use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dblp_load::config::{COMMIT_INTERVAL, DEFAULT_DATABASE};
use dblp_load::load::{self, LoadOptions, LoadReport};
use dblp_load::models::Table;
use dblp_load::store::{DryRunSession, Session, SqliteSession};
use dblp_load::text::DecodePolicy;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "dblp-load")]
#[command(about = "Load DBLP XML dumps into a relational database")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a DBLP dump into an existing database
    Load(LoadArgs),
    /// Verify foreign keys on a database whose load has finished
    Constrain(ConstrainArgs),
}

#[derive(Args)]
struct LoadArgs {
    /// Path to the DBLP dump (.xml or .xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// SQLite database with the target schema already created
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// DTD declaring the dump's character entities (default: DOCTYPE SYSTEM id)
    #[arg(long)]
    dtd: Option<PathBuf>,

    /// Commit after this many top-level records
    #[arg(long, default_value_t = COMMIT_INTERVAL, value_parser = clap::value_parser!(u32).range(1..))]
    commit_interval: u32,

    /// Handling of bytes that are not valid UTF-8
    #[arg(long, value_enum, default_value_t = DecodePolicy::DropInvalid)]
    decode: DecodePolicy,

    /// Limit number of records to process (for testing)
    #[arg(long)]
    limit: Option<u64>,

    /// Dry run - parse and count rows without a database
    #[arg(long)]
    dry_run: bool,

    /// Skip the foreign key check after the load
    #[arg(long)]
    skip_constraints: bool,
}

#[derive(Args)]
struct ConstrainArgs {
    /// SQLite database to verify
    #[arg(short, long, default_value = DEFAULT_DATABASE)]
    database: PathBuf,
}

fn run_load(args: LoadArgs) -> Result<()> {
    let options = LoadOptions {
        commit_interval: args.commit_interval,
        limit: args.limit,
        add_constraints: !args.skip_constraints,
    };

    let start = Instant::now();
    let report = if args.dry_run {
        info!("Dry run, no database writes");
        let mut session = DryRunSession::new();
        load::run_load(
            &args.input,
            args.dtd.as_deref(),
            args.decode,
            &mut session,
            &options,
        )?
    } else {
        let mut session = SqliteSession::open(&args.database)?;
        load::run_load(
            &args.input,
            args.dtd.as_deref(),
            args.decode,
            &mut session,
            &options,
        )?
    };

    print_summary(&report, start.elapsed());
    Ok(())
}

fn run_constrain(args: ConstrainArgs) -> Result<()> {
    let mut session = SqliteSession::open(&args.database)?;
    session.add_foreign_keys()?;
    session.commit()
}

fn print_summary(report: &LoadReport, elapsed: Duration) {
    let stats = &report.stats;
    println!();
    println!("=== Summary ===");
    println!("Load time:            {:.2}s", elapsed.as_secs_f64());
    println!();
    println!("Records read:         {}", stats.records());
    println!("Publications loaded:  {}", stats.publications());
    println!("Records skipped:      {}", stats.skipped());
    println!("Anomalies:            {}", report.anomalies.total());
    println!("Unresolved entities:  {}", stats.unresolved_entities());
    println!("Commits:              {}", stats.commits());
    println!();
    for table in Table::ALL {
        println!("{:<21} {}", format!("{table}:"), stats.rows(table));
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Load(args) => run_load(args),
        Commands::Constrain(args) => run_constrain(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
