use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use ordercursor::bookmark::load_bookmark;
use ordercursor::{
    BatchReport, FileBookmarkStore, HttpSourceFactory, InMemoryBookmarkStore,
    InMemoryOrderSource, LocalOrderIndex, MemorySourceFactory, RateLimitPolicy, RecoveryConfig,
    RecoveryOrchestrator, StaticOrderIndex, StoreConfig, TracingObserver, load_batch_file,
    load_local_index,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ordercursor")]
#[command(about = "Recovers order sync bookmarks for cursor-paginated order APIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recover bookmarks for every active store of a batch file
    Recover {
        /// JSON batch file with `stores` and optional `recovery` settings
        #[arg(long)]
        config: PathBuf,
        /// JSON map of store identifier to newest local order id
        #[arg(long)]
        local_ids: Option<PathBuf>,
        /// Use this order id for every selected store instead of --local-ids
        #[arg(long)]
        target_id: Option<u64>,
        #[arg(long, default_value = "bookmarks.json")]
        bookmarks: PathBuf,
        /// Directory for the JSON report backup
        #[arg(long, default_value = "reports")]
        report_dir: PathBuf,
        /// Only recover these stores
        #[arg(long)]
        store: Vec<String>,
        #[arg(long)]
        page_size: Option<usize>,
        /// Keep a stored bookmark when its page still holds the order
        #[arg(long)]
        reuse_bookmarks: bool,
        /// Print the report as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print the stored bookmark of a store
    Show {
        #[arg(long, default_value = "bookmarks.json")]
        bookmarks: PathBuf,
        #[arg(long)]
        store: String,
    },
    /// Run a recovery against a generated in-memory listing
    Demo {
        #[arg(long, default_value_t = 250)]
        orders: usize,
        #[arg(long, default_value_t = 5200)]
        newest: u64,
        #[arg(long, default_value_t = 5050)]
        target_id: u64,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
        /// Answer the first N requests with HTTP 429
        #[arg(long, default_value_t = 0)]
        throttle: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Recover {
            config,
            local_ids,
            target_id,
            bookmarks,
            report_dir,
            store,
            page_size,
            reuse_bookmarks,
            json,
        } => {
            let options = RecoverOptions {
                local_ids,
                target_id,
                bookmarks,
                report_dir,
                stores: store,
                page_size,
                reuse_bookmarks,
                json,
            };
            recover(&config, options).await
        }
        Command::Show { bookmarks, store } => show(&bookmarks, &store).await,
        Command::Demo {
            orders,
            newest,
            target_id,
            page_size,
            throttle,
        } => demo(orders, newest, target_id, page_size, throttle).await,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

struct RecoverOptions {
    local_ids: Option<PathBuf>,
    target_id: Option<u64>,
    bookmarks: PathBuf,
    report_dir: PathBuf,
    stores: Vec<String>,
    page_size: Option<usize>,
    reuse_bookmarks: bool,
    json: bool,
}

async fn recover(config: &Path, options: RecoverOptions) -> Result<()> {
    let batch = load_batch_file(config)
        .await
        .with_context(|| format!("Failed to load batch file '{}'", config.display()))?;

    let mut recovery = batch.recovery.clone();
    if let Some(page_size) = options.page_size {
        recovery = recovery.page_size(page_size);
    }
    if options.reuse_bookmarks {
        recovery = recovery.reuse_valid_bookmarks(true);
    }
    recovery.validate().map_err(|err| anyhow!(err))?;

    let stores: Vec<StoreConfig> = if options.stores.is_empty() {
        batch.stores.clone()
    } else {
        let selected: Vec<StoreConfig> = batch
            .stores
            .iter()
            .filter(|s| options.stores.contains(&s.identifier))
            .cloned()
            .collect();
        if selected.is_empty() {
            bail!("None of the requested stores are in '{}'", config.display());
        }
        selected
    };

    let local_index: Arc<dyn LocalOrderIndex> = match (options.target_id, &options.local_ids) {
        (Some(target), _) => Arc::new(
            stores
                .iter()
                .fold(StaticOrderIndex::new(), |index, s| index.with(&s.identifier, target)),
        ),
        (None, Some(path)) => Arc::new(
            load_local_index(path)
                .await
                .with_context(|| format!("Failed to load local ids '{}'", path.display()))?,
        ),
        (None, None) => bail!("Either --local-ids or --target-id is required"),
    };

    let orchestrator = RecoveryOrchestrator::new(
        recovery,
        Arc::new(FileBookmarkStore::new(&options.bookmarks)),
        local_index,
        Arc::new(HttpSourceFactory),
    )
    .with_observer(Arc::new(TracingObserver));

    let report = orchestrator
        .run_batch(&stores)
        .await
        .context("Recovery batch failed")?;

    print_report(&report, options.json)?;

    let dir = &options.report_dir;
    let path = report
        .save_json(dir)
        .await
        .with_context(|| format!("Failed to save report into '{}'", dir.display()))?;
    println!("Report saved: {}", path.display());
    Ok(())
}

async fn show(bookmarks: &Path, store: &str) -> Result<()> {
    let file = FileBookmarkStore::new(bookmarks);
    match load_bookmark(&file, store).await? {
        Some(bookmark) => println!("{}", serde_json::to_string_pretty(&bookmark)?),
        None => println!("No bookmark stored for '{}'", store),
    }
    Ok(())
}

async fn demo(
    orders: usize,
    newest: u64,
    target_id: u64,
    page_size: usize,
    throttle: usize,
) -> Result<()> {
    let source = Arc::new(InMemoryOrderSource::descending(newest, orders));
    source.rate_limit_next(throttle).await;

    let recovery = RecoveryConfig::default()
        .page_size(page_size)
        .rate_limit(RateLimitPolicy::escalating(50, 400, throttle + 1));
    let bookmarks = Arc::new(InMemoryBookmarkStore::new());

    let orchestrator = RecoveryOrchestrator::new(
        recovery,
        bookmarks.clone(),
        Arc::new(StaticOrderIndex::new().with("demo", target_id)),
        Arc::new(MemorySourceFactory::new().with_source("demo", source)),
    )
    .with_observer(Arc::new(TracingObserver));

    let store = StoreConfig::new("demo", "memory://demo", "demo-token");
    let report = orchestrator
        .run_batch(&[store])
        .await
        .context("Demo recovery failed")?;
    print_report(&report, false)?;

    if let Some(bookmark) = load_bookmark(bookmarks.as_ref(), "demo").await? {
        println!("{}", serde_json::to_string_pretty(&bookmark)?);
    }
    Ok(())
}

fn print_report(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render_table());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recover_writes_report_backup_by_default() {
        let cli = Cli::try_parse_from(["ordercursor", "recover", "--config", "stores.json"]).unwrap();
        let Command::Recover { report_dir, .. } = cli.command else {
            panic!("expected the recover command");
        };
        assert_eq!(report_dir, PathBuf::from("reports"));
    }

    #[test]
    fn test_report_dir_can_be_overridden() {
        let cli = Cli::try_parse_from([
            "ordercursor",
            "recover",
            "--config",
            "stores.json",
            "--report-dir",
            "backups",
        ])
        .unwrap();
        let Command::Recover { report_dir, .. } = cli.command else {
            panic!("expected the recover command");
        };
        assert_eq!(report_dir, PathBuf::from("backups"));
    }
}
