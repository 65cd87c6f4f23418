//! resvault CLI - Command line interface for resource vaults.
//!
//! This tool builds vaults from directories, inspects their index, and
//! imports, exports and verifies individual entries.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use resvault_common::format_size;
use resvault_crypto::digest_file;
use resvault_storage::INDEX_FILE_NAME;
use resvault_vault::{BatchReport, EngineConfig, ProgressEvent, SortBy, VaultEngine};

#[derive(Parser)]
#[command(name = "resvault")]
#[command(about = "resvault - Resource archive builder and browser")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Engine configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack a directory into a new vault.
    Build {
        /// Directory of loose files.
        #[arg(short, long)]
        source: PathBuf,

        /// Directory receiving the containers and index.
        #[arg(short, long)]
        dest: PathBuf,
    },

    /// Show vault information.
    Info {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,
    },

    /// List entries, optionally of one extension.
    List {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Only entries with this extension.
        #[arg(short, long)]
        ext: Option<String>,

        /// Ordering when filtering by extension.
        #[arg(long, value_enum, default_value = "name")]
        sort: SortArg,
    },

    /// Find entries whose name contains a fragment.
    Search {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Name fragment. Short fragments list everything.
        fragment: String,
    },

    /// Show per-extension statistics.
    Extensions {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Compute total sizes as well as counts.
        #[arg(long)]
        sizes: bool,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Export one entry.
    Export {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Entry name.
        name: String,

        /// Destination file (default: build directory).
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Export every entry.
    ExportAll {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Destination directory (default: build directory).
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Export the entries of one extension into `<dest>/<ext>/`.
    ExportExt {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Extension to export.
        ext: String,

        /// Destination directory (default: build directory).
        #[arg(short, long)]
        dest: Option<PathBuf>,
    },

    /// Add files to a vault and save its index.
    Import {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Files to add.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Check whether an entry matches a file on disk.
    Compare {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: PathBuf,

        /// Entry name.
        name: String,

        /// File to compare against.
        file: PathBuf,
    },

    /// Print the BLAKE2b-512 digest of a file, or of an entry with --index.
    Hash {
        /// Vault directory or index file.
        #[arg(short, long)]
        index: Option<PathBuf>,

        /// File path, or entry name when --index is given.
        target: String,
    },

    /// Print the effective engine configuration.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Name,
    Size,
}

impl From<SortArg> for SortBy {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortBy::Name,
            SortArg::Size => SortBy::Size,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build { source, dest } => cmd_build(config, source, dest).await,

        Commands::Info { index } => cmd_info(config, &index).await,

        Commands::List { index, ext, sort } => cmd_list(config, &index, ext, sort).await,

        Commands::Search { index, fragment } => cmd_search(config, &index, fragment).await,

        Commands::Extensions { index, sizes, json } => {
            cmd_extensions(config, &index, sizes, json).await
        }

        Commands::Export { index, name, dest } => cmd_export(config, &index, name, dest).await,

        Commands::ExportAll { index, dest } => cmd_export_all(config, &index, dest).await,

        Commands::ExportExt { index, ext, dest } => {
            cmd_export_ext(config, &index, ext, dest).await
        }

        Commands::Import { index, files } => cmd_import(config, &index, files).await,

        Commands::Compare { index, name, file } => cmd_compare(config, &index, name, file).await,

        Commands::Hash { index, target } => cmd_hash(config, index, target).await,

        Commands::Config => cmd_config(&config),
    }
}

/// Accept either a vault directory or the index file itself.
fn resolve_index(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(INDEX_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// Pick the explicit destination or fall back to the configured one.
fn destination(config: &EngineConfig, dest: Option<PathBuf>) -> Result<PathBuf> {
    dest.or_else(|| config.build_directory.clone())
        .context("No destination given and no build_directory configured")
}

/// Renders progress events on stderr.
#[derive(Default)]
struct ProgressLine {
    maximum: u64,
    drawn: bool,
}

impl ProgressLine {
    fn render(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::MaximumDetermined(total) => self.maximum = total,
            ProgressEvent::ProgressChanged(current) => {
                eprint!("\r  {}/{}", current, self.maximum);
                let _ = std::io::stderr().flush();
                self.drawn = true;
            }
            ProgressEvent::ProgressReset => {
                if self.drawn {
                    eprintln!();
                }
                self.maximum = 0;
                self.drawn = false;
            }
            // Messages are already logged by the engine.
            ProgressEvent::Message(_) => {}
        }
    }
}

/// Run `job` on a blocking worker while progress is drawn here.
async fn run_engine<T, F>(config: EngineConfig, what: &'static str, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&mut VaultEngine) -> resvault_common::Result<T> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut engine = VaultEngine::with_observer(config, move |event: ProgressEvent| {
        let _ = tx.send(event);
    })
    .context("Invalid engine configuration")?;

    let worker = tokio::task::spawn_blocking(move || job(&mut engine));

    let mut line = ProgressLine::default();
    while let Some(event) = rx.recv().await {
        line.render(event);
    }

    let result = worker.await.context("Engine worker panicked")?;
    result.context(what)
}

fn print_report(verb: &str, report: &BatchReport) {
    println!("{} {} of {} entries", verb, report.succeeded.len(), report.total());
    for failure in &report.failed {
        println!("  FAILED {}: {}", failure.name, failure.error);
    }
}

/// Build a vault.
async fn cmd_build(config: EngineConfig, source: PathBuf, dest: PathBuf) -> Result<()> {
    info!("Building vault from {} into {}", source.display(), dest.display());

    let (rows, containers, size) = run_engine(config, "Failed to build vault", {
        let dest = dest.clone();
        move |engine| {
            engine.build(&source, &dest)?;
            Ok((engine.row_count(), engine.container_count(), engine.total_size()))
        }
    })
    .await?;

    println!("Vault built successfully!");
    println!("  Location: {}", dest.display());
    println!("  Entries: {}", rows);
    println!("  Containers: {}", containers);
    println!("  Size: {}", format_size(size));

    Ok(())
}

/// Show vault information.
async fn cmd_info(config: EngineConfig, index: &Path) -> Result<()> {
    let index = resolve_index(index);
    let shown = index.clone();

    let (rows, containers, size, encoding, extensions) =
        run_engine(config, "Failed to load vault", move |engine| {
            engine.load(&index)?;
            Ok((
                engine.row_count(),
                engine.container_count(),
                engine.total_size(),
                engine.encoding().label(),
                engine.extension_list().len(),
            ))
        })
        .await?;

    println!("Vault Information:");
    println!("  Index: {}", shown.display());
    println!("  Entries: {}", rows);
    println!("  Containers: {}", containers);
    println!("  Extensions: {}", extensions);
    println!("  Size: {}", format_size(size));
    println!("  Code page: {}", encoding);

    Ok(())
}

/// List entries.
async fn cmd_list(
    config: EngineConfig,
    index: &Path,
    ext: Option<String>,
    sort: SortArg,
) -> Result<()> {
    let index = resolve_index(index);

    let entries = run_engine(config, "Failed to list entries", move |engine| {
        engine.load(&index)?;
        Ok(match ext {
            Some(ext) => engine.get_entries_by_extension(&ext, sort.into()),
            None => engine.entries().to_vec(),
        })
    })
    .await?;

    if entries.is_empty() {
        println!("No entries.");
    }
    for entry in entries {
        println!(
            "  {:<40} data.{:03} @ {:>12}  {}",
            entry.name,
            entry.data_id + 1,
            entry.offset,
            format_size(entry.length)
        );
    }

    Ok(())
}

/// Search entries by name fragment.
async fn cmd_search(config: EngineConfig, index: &Path, fragment: String) -> Result<()> {
    let index = resolve_index(index);

    let hits = run_engine(config, "Failed to search entries", move |engine| {
        engine.load(&index)?;
        Ok(engine.get_entries_by_partial_name(&fragment))
    })
    .await?;

    println!("{} matching entries", hits.len());
    for entry in hits {
        println!("  {} ({})", entry.name, format_size(entry.length));
    }

    Ok(())
}

/// Show per-extension statistics.
async fn cmd_extensions(config: EngineConfig, index: &Path, sizes: bool, json: bool) -> Result<()> {
    let index = resolve_index(index);

    let list = run_engine(config, "Failed to read extensions", move |engine| {
        engine.load(&index)?;
        if sizes {
            let kinds: Vec<String> = engine
                .extension_list()
                .into_iter()
                .map(|info| info.kind)
                .collect();
            for kind in kinds {
                engine.get_extension_size(&kind);
            }
        }
        Ok(engine.extension_list())
    })
    .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&list).context("Failed to render JSON")?
        );
        return Ok(());
    }

    for info in list {
        let kind = if info.kind.is_empty() {
            "(none)"
        } else {
            info.kind.as_str()
        };
        let size = info.size_bytes.map(format_size).unwrap_or_default();
        let flag = if info.encrypted { "encrypted" } else { "" };
        println!("  {:<10} {:>8}  {:>12}  {}", kind, info.count, size, flag);
    }

    Ok(())
}

/// Export one entry.
async fn cmd_export(
    config: EngineConfig,
    index: &Path,
    name: String,
    dest: Option<PathBuf>,
) -> Result<()> {
    let index = resolve_index(index);
    let dest = match dest {
        Some(dest) => dest,
        None => destination(&config, None)?.join(&name),
    };
    let written = dest.clone();

    run_engine(config, "Failed to export entry", move |engine| {
        engine.load(&index)?;
        let entry = engine
            .get_entry(&name)
            .ok_or_else(|| resvault_common::Error::NotFound(name.clone()))?;
        engine.export_file_entry(&dest, &entry)
    })
    .await?;

    println!("Entry exported to {}", written.display());
    Ok(())
}

/// Export every entry.
async fn cmd_export_all(config: EngineConfig, index: &Path, dest: Option<PathBuf>) -> Result<()> {
    let index = resolve_index(index);
    let dest = destination(&config, dest)?;

    let report = run_engine(config, "Failed to export entries", move |engine| {
        engine.load(&index)?;
        engine.export_all_entries(&dest)
    })
    .await?;

    print_report("Exported", &report);
    Ok(())
}

/// Export the entries of one extension.
async fn cmd_export_ext(
    config: EngineConfig,
    index: &Path,
    ext: String,
    dest: Option<PathBuf>,
) -> Result<()> {
    let index = resolve_index(index);
    let dest = destination(&config, dest)?;

    let report = run_engine(config, "Failed to export entries", move |engine| {
        engine.load(&index)?;
        engine.export_ext_entries(&dest, &ext)
    })
    .await?;

    print_report("Exported", &report);
    Ok(())
}

/// Import files and save the index.
async fn cmd_import(config: EngineConfig, index: &Path, files: Vec<PathBuf>) -> Result<()> {
    let index = resolve_index(index);

    let report = run_engine(config, "Failed to import files", move |engine| {
        engine.load(&index)?;
        let report = engine.import_file_entries(&files)?;
        if !report.succeeded.is_empty() {
            let root = engine
                .root()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            engine.save(&root)?;
        }
        Ok(report)
    })
    .await?;

    print_report("Imported", &report);
    Ok(())
}

/// Compare an entry with a file.
async fn cmd_compare(config: EngineConfig, index: &Path, name: String, file: PathBuf) -> Result<()> {
    let index = resolve_index(index);
    let label = format!("{} vs {}", name, file.display());

    let same = run_engine(config, "Failed to compare", move |engine| {
        engine.load(&index)?;
        engine.compare_with_file(&name, &file)
    })
    .await?;

    if same {
        println!("Identical: {}", label);
    } else {
        println!("Different: {}", label);
    }
    Ok(())
}

/// Print a digest.
async fn cmd_hash(config: EngineConfig, index: Option<PathBuf>, target: String) -> Result<()> {
    let digest = match index {
        Some(index) => {
            let index = resolve_index(&index);
            let name = target.clone();
            run_engine(config, "Failed to hash entry", move |engine| {
                engine.load(&index)?;
                engine.entry_digest(&name)
            })
            .await?
        }
        None => digest_file(Path::new(&target))
            .with_context(|| format!("Failed to hash {}", target))?,
    };

    println!("{}  {}", digest, target);
    Ok(())
}

/// Print the configuration in effect.
fn cmd_config(config: &EngineConfig) -> Result<()> {
    println!("{}", config.to_json().context("Failed to render config")?);
    Ok(())
}
