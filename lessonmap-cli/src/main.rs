use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lessonmap::{collect_inputs, resolve_config};
use lessonmap::{BatchOptions, BatchRunner, ConfigManager, DocumentOutcome, ExportFormat, ExtractionCoordinator, FileSink};

#[derive(Parser)]
#[command(name = "lessonmap")]
#[command(about = "Recover lessons and sessions from page-by-page curriculum text")]
struct Args {
    /// Page dumps (.json or form-feed .txt) or directories holding them
    #[arg(short, long, required_unless_present = "show_configs")]
    input: Vec<PathBuf>,

    /// Directory for export files
    #[arg(short, long, default_value = "lessonmap_output")]
    output_dir: PathBuf,

    /// Path to custom config file (YAML format)
    #[arg(short, long)]
    config: Option<String>,

    /// Built-in config preset (default, strict, lenient)
    #[arg(long)]
    preset: Option<String>,

    /// Export format: hierarchy, relational, or summary
    #[arg(short, long, default_value = "hierarchy")]
    format: ExportFormat,

    /// Documents processed in parallel (0 = one per CPU)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Give up on a document after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Print per-stage timings for every document
    #[arg(long)]
    profile: bool,

    /// Dump all intermediate pipeline stage outputs to a directory
    /// Captures: page classes, markers, lesson outline, and lessons as separate files
    #[arg(long)]
    dump_stages: bool,

    /// Directory for stage dump output
    #[arg(long, default_value = "lessonmap_output/stages")]
    stages_dir: PathBuf,

    /// Show available config presets and exit
    #[arg(long)]
    show_configs: bool,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    println!("🦀 Lessonmap Curriculum Extractor");

    if args.show_configs {
        show_help();
        return Ok(());
    }

    let config = resolve_config(args.config.as_deref(), args.preset.as_deref())?;
    match &args.config {
        Some(path) => println!("📋 Loaded config from: {path}"),
        None => println!("📋 Using {} config", config.name),
    }

    let inputs = collect_inputs(&args.input)?;
    if inputs.is_empty() {
        println!("⚠️  No page dumps found in the given inputs");
        std::process::exit(1);
    }
    tracing::debug!("Resolved inputs: {inputs:?}");
    println!("📄 Processing {} documents", inputs.len());

    let sink = FileSink::new(&args.output_dir)
        .with_context(|| format!("cannot create output directory {}", args.output_dir.display()))?;

    let options = BatchOptions {
        format: args.format,
        jobs: args.jobs,
        timeout: args.timeout_secs.map(Duration::from_secs),
        profile: args.profile,
        stages_dir: args.dump_stages.then(|| args.stages_dir.clone()),
    };

    let runner = BatchRunner::new(ExtractionCoordinator::new(config), Arc::new(sink), options);
    let summary = runner.run(&inputs)?;

    println!();
    for outcome in &summary.outcomes {
        match outcome {
            DocumentOutcome::Succeeded {
                document,
                lessons,
                sessions,
                quality,
                export,
            } => {
                let marker = if *lessons == 0 { "⚠️ " } else { "✅" };
                println!("{marker} {document}: {lessons} lessons, {sessions} sessions, quality {quality:.2}");
                if let Some(path) = export {
                    println!("   💾 {}", path.display());
                }
            }
            DocumentOutcome::Failed {
                document,
                kind,
                message,
            } => {
                println!("❌ {document}: {kind:?}: {message}");
            }
        }
    }

    let summary_path = args.output_dir.join("batch_summary.json");
    let summary_json = serde_json::json!({
        "finished_at": chrono::Utc::now().to_rfc3339(),
        "succeeded": summary.succeeded(),
        "failed": summary.failures().count(),
        "empty": summary.empty_documents().count(),
        "outcomes": &summary.outcomes,
    });
    std::fs::write(&summary_path, serde_json::to_string_pretty(&summary_json)?)
        .with_context(|| format!("cannot write {}", summary_path.display()))?;

    println!(
        "\n📊 {} succeeded, {} failed, {} without lessons",
        summary.succeeded(),
        summary.failures().count(),
        summary.empty_documents().count()
    );
    if args.dump_stages {
        println!("🔬 Stage dumps in: {}", args.stages_dir.display());
    }

    std::process::exit(summary.exit_code());
}

fn show_help() {
    let manager = ConfigManager::new();
    println!("\n📋 Available Config Presets:");
    for name in manager.preset_names() {
        let config = manager.get_or_default(name);
        println!(
            "  {:<10} default span {}, anomalous above {} pages, {} page rules",
            name,
            config.sessions.default_span,
            config.sessions.anomalous_span_threshold,
            config.classifier.rules.iter().filter(|r| r.enabled).count()
        );
    }

    println!("\n📄 Export Formats:");
    println!("  hierarchy   - Nested document → lessons → sessions tree plus run report (default)");
    println!("  relational  - Flat tables with document/lesson/session foreign keys");
    println!("  summary     - Markdown brief per lesson for manual review");

    println!("\n🚦 Exit Codes:");
    println!("  0  all documents succeeded");
    println!("  1  one or more documents failed");
    println!("  2  one or more documents produced no lessons");

    println!("\n📝 Usage Examples:");
    println!("  lessonmap -i RCM07_NA_SW_V1.json");
    println!("  lessonmap -i pages/ -o out/ --preset strict -f relational -j 4");
    println!("  lessonmap -i RCM06_V2.txt --dump-stages --profile");
}
