//! qp2cache - extract question papers into a cache directory.
//!
//! A command line driver for the extraction pipeline: one or more question
//! paper PDFs in, per-question composite images plus structured region
//! metadata out. Multiple PDFs are extracted in parallel; the shared cache
//! files are lock-protected so concurrent runs are safe.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Extract exam question papers into a per-question image cache.
#[derive(Debug, Parser)]
#[command(name = "qp2cache", version, about)]
struct Cli {
    /// Question paper PDFs to extract.
    #[arg(required = true)]
    pdfs: Vec<PathBuf>,

    /// Cache root directory.
    #[arg(short, long, default_value = "cache")]
    output: PathBuf,

    /// Render resolution in DPI.
    #[arg(long, default_value_t = 200)]
    dpi: u32,

    /// Worker threads for PDF-level parallelism. 0 uses all cores.
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,

    /// Additional directories to search for mark-scheme PDFs.
    #[arg(long)]
    ms_dir: Vec<PathBuf>,

    /// Skip mark-scheme extraction.
    #[arg(long)]
    no_markschemes: bool,

    /// Skip whitespace trimming of rendered clips.
    #[arg(long)]
    no_trim: bool,

    /// Collect detection diagnostics and write a report per exam code.
    #[arg(long)]
    diagnostics: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// Verbose (debug) logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    run(cli)
}

#[cfg(not(feature = "pdfium"))]
fn run(_cli: Cli) -> anyhow::Result<()> {
    bail!("this build has no PDF backend; rebuild with --features pdfium");
}

#[cfg(feature = "pdfium")]
fn run(cli: Cli) -> anyhow::Result<()> {
    use anyhow::Context;
    use qslice_core::classify::NullClassifier;
    use qslice_core::diagnostics::DiagnosticsCollector;
    use qslice_core::model::PaperIdent;
    use qslice_core::pdf::pdfium::PdfiumOpener;
    use qslice_core::ExtractionConfig;
    use rayon::prelude::*;

    let config = ExtractionConfig {
        dpi: cli.dpi,
        trim_whitespace: !cli.no_trim,
        extract_markschemes: !cli.no_markschemes,
        ..ExtractionConfig::default()
    };
    let collector = cli.diagnostics.then(DiagnosticsCollector::new);

    if cli.jobs > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.jobs)
            .build_global()
            .context("failed to configure thread pool")?;
    }

    let outcomes: Vec<(PathBuf, anyhow::Result<qslice_core::ExtractionResult>)> = cli
        .pdfs
        .par_iter()
        .map(|pdf| {
            let result = qslice_core::extract_question_paper(
                &PdfiumOpener,
                pdf,
                &cli.output,
                &config,
                &NullClassifier,
                &cli.ms_dir,
                collector.as_ref(),
            )
            .map_err(anyhow::Error::from);
            (pdf.clone(), result)
        })
        .collect();

    let mut failed = 0usize;
    let mut total_questions = 0usize;
    for (pdf, outcome) in &outcomes {
        match outcome {
            Ok(result) => {
                total_questions += result.question_count;
                println!(
                    "{}: {} questions{}",
                    pdf.display(),
                    result.question_count,
                    if result.warnings.is_empty() {
                        String::new()
                    } else {
                        format!(" ({} warnings)", result.warnings.len())
                    }
                );
                for warning in &result.warnings {
                    eprintln!("  warning: {warning}");
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}: extraction failed: {e:#}", pdf.display());
            }
        }
    }

    if let Some(collector) = &collector {
        if collector.issue_count() > 0 {
            let report = collector.report();
            let mut exam_codes: Vec<String> = cli
                .pdfs
                .iter()
                .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
                .map(|stem| PaperIdent::from_stem(stem).exam_code)
                .collect();
            exam_codes.sort();
            exam_codes.dedup();
            for exam_code in exam_codes {
                let path = cli
                    .output
                    .join(&exam_code)
                    .join("_metadata")
                    .join("detection_diagnostics.json");
                report.save(&path)?;
            }
            eprintln!("detection diagnostics: {} issues", report.total_issues);
        }
    }

    println!(
        "extracted {total_questions} questions from {} PDFs into {}",
        cli.pdfs.len() - failed,
        cli.output.display()
    );
    if failed > 0 {
        bail!("{failed} PDF(s) failed to extract");
    }
    Ok(())
}
