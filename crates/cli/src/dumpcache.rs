//! dumpcache - inspect an extraction cache.
//!
//! Reads `questions.jsonl` and per-question `regions.json` files back and
//! prints summaries. Readers refuse schema-version mismatches, so this is
//! also the quickest way to check a cache's health.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use qslice_core::cache::{read_questions_jsonl, read_regions};

/// Inspect a question cache produced by qp2cache.
#[derive(Debug, Parser)]
#[command(name = "dumpcache", version, about)]
struct Cli {
    /// Cache root directory.
    cache_root: PathBuf,

    /// Restrict to one exam code.
    #[arg(long)]
    exam_code: Option<String>,

    /// Dump the regions of one question id in full.
    #[arg(long)]
    question: Option<String>,

    /// Emit raw JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let exam_dirs = exam_dirs(&cli)?;
    if exam_dirs.is_empty() {
        bail!("no exam directories found under {}", cli.cache_root.display());
    }

    for exam_dir in exam_dirs {
        let jsonl = exam_dir.join("_metadata").join("questions.jsonl");
        if !jsonl.exists() {
            continue;
        }
        let records = read_questions_jsonl(&jsonl)
            .with_context(|| format!("reading {}", jsonl.display()))?;

        for record in &records {
            if let Some(wanted) = &cli.question {
                if &record.question_id != wanted {
                    continue;
                }
            }

            if cli.question.is_some() {
                let regions_path = cli
                    .cache_root
                    .join(&record.relative_path)
                    .join("regions.json");
                let regions = read_regions(&regions_path)
                    .with_context(|| format!("reading {}", regions_path.display()))?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&regions)?);
                } else {
                    println!(
                        "{}  {}x{}  offset {:+}",
                        regions.question_id,
                        regions.composite_size.width,
                        regions.composite_size.height,
                        regions.horizontal_offset,
                    );
                    for (label, region) in &regions.regions {
                        let marks = region
                            .marks
                            .map_or(String::from("   "), |m| format!("{m:3}"));
                        let validity = match region.is_valid {
                            Some(false) => "  INVALID",
                            _ => "",
                        };
                        println!(
                            "  {label:12} {kind:8} [{top:5}..{bottom:5}) x [{left:5}..{right:5}) marks {marks}{validity}",
                            kind = region.kind,
                            top = region.bounds.top,
                            bottom = region.bounds.bottom,
                            left = region.bounds.left,
                            right = region.bounds.right,
                        );
                        for issue in region.validation_issues.iter().flatten() {
                            println!("      issue: {issue}");
                        }
                    }
                }
            } else if cli.json {
                println!("{}", serde_json::to_string(record)?);
            } else {
                println!(
                    "{}  q{} {:2} marks, {} part(s), topic {:?}{}",
                    record.question_id,
                    record.question_number,
                    record.total_marks,
                    record.part_count,
                    record.topic,
                    if record.is_valid { "" } else { "  INVALID" },
                );
            }
        }
    }
    Ok(())
}

fn exam_dirs(cli: &Cli) -> anyhow::Result<Vec<PathBuf>> {
    if let Some(exam_code) = &cli.exam_code {
        return Ok(vec![cli.cache_root.join(exam_code)]);
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(&cli.cache_root)
        .with_context(|| format!("reading {}", cli.cache_root.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}
