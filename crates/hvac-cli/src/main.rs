mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hvac_core::filters::{DEFAULT_ANNOTATION_FAMILY, DEFAULT_ANNOTATION_TYPE};
use hvac_core::{
    BatchReport, DocumentEdit, ElementId, ElementKind, FilterRegistry, HostDocument, Point,
    SchemeRequest, SpaceCluster, TickOutcome, params,
};

use session::{OpenDocument, Session};

#[derive(Parser)]
#[command(name = "hvac", about = "Space annotation sync and ventilation scheme engine")]
struct Cli {
    /// Stored document to work on (defaults to the only one)
    #[arg(long, global = true)]
    document: Option<String>,

    /// Annotation family recognized as space annotations
    #[arg(long, global = true, default_value = DEFAULT_ANNOTATION_FAMILY)]
    annotation_family: String,

    /// Annotation type recognized as space annotations
    #[arg(long, global = true, default_value = DEFAULT_ANNOTATION_TYPE)]
    annotation_type: String,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a document snapshot (JSON) and initialize its links
    Import {
        /// Snapshot file path
        path: PathBuf,
    },

    /// Show document, link and trigger state
    Status,

    /// Show or set the sync setting
    Sync {
        /// New state; omit to show the current one
        state: Option<Toggle>,
    },

    /// Apply user edits (JSON array) and process the resulting changes
    Edit {
        /// Edits file path
        path: PathBuf,
    },

    /// Place and link annotations for every eligible space
    BuildScheme {
        /// Only place annotations for spaces that have none
        #[arg(long)]
        extend: bool,

        /// Insertion point X
        #[arg(long, default_value_t = 0.0)]
        x: f64,

        /// Insertion point Y
        #[arg(long, default_value_t = 0.0)]
        y: f64,
    },

    /// Show the system clusters a scheme build would lay out
    Clusters,

    /// Export the document snapshot to a JSON file
    Export {
        /// Output file path
        path: PathBuf,
    },

    /// Show recent session log entries
    Log {
        /// Number of entries
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn data_dir() -> Option<PathBuf> {
    std::env::var(hvac_store::DATA_DIR_ENV)
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let filters = FilterRegistry::new(&cli.annotation_family, &cli.annotation_type);
    let mut session = Session::open(data_dir().as_deref(), filters)?;

    let result = match &cli.command {
        Commands::Import { path } => cmd_import(&mut session, path),
        Commands::Status => cmd_status(&cli, &mut session),
        Commands::Sync { state } => cmd_sync(&mut session, *state),
        Commands::Edit { path } => cmd_edit(&cli, &mut session, path),
        Commands::BuildScheme { extend, x, y } => cmd_build_scheme(
            &cli,
            &mut session,
            SchemeRequest {
                origin: Point::new(*x, *y),
                extend: *extend,
            },
        ),
        Commands::Clusters => cmd_clusters(&cli, &mut session),
        Commands::Export { path } => cmd_export(&cli, &session, path),
        Commands::Log { limit } => cmd_log(&session, *limit),
    };

    // Diagnostics from a failed command still reach the session log.
    let finished = session.finish();
    result?;
    finished
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn join_kinds(kinds: &[ElementKind]) -> String {
    kinds
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_tick(tick: &TickOutcome) -> String {
    match tick {
        TickOutcome::Idle => "idle".to_string(),
        TickOutcome::Waiting { waiting, .. } => {
            format!("waiting for a sample {}", join_kinds(waiting))
        }
        TickOutcome::Complete { .. } => "complete".to_string(),
        TickOutcome::MissingParameters {
            kind,
            element,
            names,
        } => format!(
            "{kind} {element} is missing {}; sync disabled",
            names.join(", ")
        ),
    }
}

fn space_label(open: &OpenDocument, id: ElementId) -> String {
    open.doc
        .parameter(id, params::NUMBER)
        .and_then(|v| v.as_text().map(str::to_string))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| id.to_string())
}

fn print_clusters(open: &OpenDocument, clusters: &[SpaceCluster]) {
    for cluster in clusters {
        let key = if cluster.labels.is_empty() {
            "(no system)".to_string()
        } else {
            cluster.labels.join(", ")
        };
        let spaces: Vec<String> = cluster
            .spaces
            .iter()
            .map(|&id| space_label(open, id))
            .collect();
        println!("[{key}] {}", spaces.join(" "));
    }
}

fn summarize(reports: &[BatchReport]) -> String {
    let sum = |f: fn(&BatchReport) -> usize| reports.iter().map(f).sum::<usize>();
    format!(
        "{} batches, {} parameters written, {} terminal flows written, {} cascaded, {} not synchronized, {} errors",
        reports.len(),
        sum(|r| r.parameters_written),
        sum(|r| r.terminal_flows_written),
        sum(|r| r.cascaded.len()),
        sum(|r| r.not_synchronized.len()),
        sum(|r| r.errors.len()),
    )
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_import(session: &mut Session, path: &Path) -> Result<()> {
    let snapshot = session
        .workspace
        .store()
        .import_document_file(path)
        .with_context(|| format!("failed to import {}", path.display()))?;

    let open = session.open_document(&snapshot.path)?;
    session.save(&open)?;

    println!(
        "imported {} as {}: {} elements, {} links, {} stale links cleared",
        path.display(),
        snapshot.path,
        open.doc.len(),
        open.init.links,
        open.init.stale_cleared.len()
    );
    if let TickOutcome::MissingParameters { .. } = open.tick {
        println!("triggers:    {}", describe_tick(&open.tick));
    }
    Ok(())
}

fn cmd_status(cli: &Cli, session: &mut Session) -> Result<()> {
    let document = session.resolve_document(cli.document.as_deref())?;
    let open = session.open_document(&document)?;
    let filters = session.engine.filters();
    let links = session
        .engine
        .links(&open.handle)
        .context("document is not open")?;

    println!("document:    {}", open.doc.path());
    println!("elements:    {}", open.doc.len());
    println!(
        "spaces:      {}",
        filters.collect(&open.doc, ElementKind::Space).len()
    );
    println!(
        "annotations: {}",
        filters.collect(&open.doc, ElementKind::Annotation).len()
    );
    println!(
        "terminals:   {} ({} unassigned)",
        open.init.terminals, open.init.unassigned_terminals
    );
    println!("links:       {}", links.link_count());
    println!("sync:        {}", on_off(session.engine.sync_enabled()));
    println!("triggers:    {}", describe_tick(&open.tick));

    if !open.init.stale_cleared.is_empty() {
        session.save(&open)?;
    }
    Ok(())
}

fn cmd_sync(session: &mut Session, state: Option<Toggle>) -> Result<()> {
    if let Some(state) = state {
        session.engine.set_sync_enabled(matches!(state, Toggle::On));
    }
    println!("sync: {}", on_off(session.engine.sync_enabled()));
    Ok(())
}

fn cmd_edit(cli: &Cli, session: &mut Session, path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let edits: Vec<DocumentEdit> =
        serde_json::from_str(&json).context("failed to parse edits")?;

    let document = session.resolve_document(cli.document.as_deref())?;
    let mut open = session.open_document(&document)?;

    let mut all = Vec::new();
    for (n, edit) in edits.into_iter().enumerate() {
        open.doc
            .apply_edit(edit)
            .with_context(|| format!("edit {} failed", n + 1))?;
        let reports = session.settle(&mut open)?;
        for report in &reports {
            for error in &report.errors {
                eprintln!("edit {}: {error}", n + 1);
            }
        }
        all.extend(reports);
    }
    session.save(&open)?;

    println!("applied edits: {}", summarize(&all));
    Ok(())
}

fn cmd_build_scheme(cli: &Cli, session: &mut Session, request: SchemeRequest) -> Result<()> {
    let document = session.resolve_document(cli.document.as_deref())?;
    let mut open = session.open_document(&document)?;

    let report = session
        .engine
        .build_scheme(&open.handle, &mut open.doc, request)
        .context("scheme build failed")?;
    let reports = session.settle(&mut open)?;
    session.save(&open)?;

    println!(
        "placed {} annotations in {} clusters, {} parameters written",
        report.placed.len(),
        report.clusters.len(),
        report.parameters_written
    );
    print_clusters(&open, &report.clusters);
    if cli.verbose {
        eprintln!("--- settle: {} ---", summarize(&reports));
    }
    Ok(())
}

fn cmd_clusters(cli: &Cli, session: &mut Session) -> Result<()> {
    let document = session.resolve_document(cli.document.as_deref())?;
    let open = session.open_document(&document)?;
    let clusters = session
        .engine
        .system_clusters(&open.handle, &open.doc)
        .context("clustering failed")?;

    if clusters.is_empty() {
        println!("(no spaces with an area)");
    } else {
        print_clusters(&open, &clusters);
    }
    Ok(())
}

fn cmd_export(cli: &Cli, session: &Session, path: &Path) -> Result<()> {
    let document = session.resolve_document(cli.document.as_deref())?;
    session
        .workspace
        .store()
        .export_document_file(&document, path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("exported {document} to {}", path.display());
    Ok(())
}

fn cmd_log(session: &Session, limit: usize) -> Result<()> {
    let entries = session
        .workspace
        .store()
        .recent_log(limit)
        .context("failed to read session log")?;

    if entries.is_empty() {
        println!("(no log entries)");
    }
    for logged in entries {
        let e = logged.entry;
        println!(
            "{} {:<7} {:<14} {}: {}",
            e.timestamp,
            e.severity.to_string(),
            e.component.to_string(),
            e.document,
            e.message
        );
    }
    Ok(())
}
