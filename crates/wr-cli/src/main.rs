//! WebRefiner CLI
//!
//! CLI tool for checking rule lists and replaying page loads through the
//! filter engine.

mod config;
mod replay;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use wr_core::Category;
use wr_rules::{compile_source, load_rule_sets, LoadOptions, RuleSource};

use crate::config::EngineConfig;
use crate::replay::{parse_pages, replay, PageOutcome};

#[derive(Parser)]
#[command(name = "wr-cli")]
#[command(about = "WebRefiner rule checker and page replay tool")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load rule sets from a config and replay page loads through the engine
    Check {
        /// Engine config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Page loads to replay (JSON)
        #[arg(short, long)]
        pages: PathBuf,

        /// Print reports as JSON
        #[arg(long)]
        json: bool,

        /// Include every evaluated request in the report
        #[arg(long)]
        details: bool,
    },

    /// Parse rule files and report per-file statistics
    Validate {
        /// Rule list files
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Category to tag the lists with
        #[arg(short, long, default_value = "ads")]
        category: String,

        /// Largest tolerated share of rejected lines
        #[arg(long, default_value_t = 0.5)]
        max_rejected: f64,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Check {
            config,
            pages,
            json,
            details,
        } => cmd_check(&config, &pages, json, details),
        Commands::Validate {
            input,
            category,
            max_rejected,
        } => cmd_validate(&input, &category, max_rejected),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn cmd_check(config_path: &Path, pages_path: &Path, json: bool, details: bool) -> Result<(), String> {
    let start = Instant::now();

    let config = EngineConfig::load(config_path).map_err(|e| e.to_string())?;
    let engine = config.build_engine();

    let report = load_rule_sets(&config.rule_sources(), &config.load_options());
    for (name, err) in &report.failed {
        eprintln!("Skipped rule source '{}': {}", name, err);
    }
    if report.sets.is_empty() {
        return Err("No rule sets could be loaded".to_string());
    }
    let sources = report.loaded.len();
    let sets = report.install(&engine);
    let load_time = start.elapsed();

    let text = fs::read_to_string(pages_path)
        .map_err(|e| format!("Failed to read '{}': {}", pages_path.display(), e))?;
    let pages = parse_pages(&text)
        .map_err(|e| format!("Invalid pages file '{}': {}", pages_path.display(), e))?;
    let outcomes = replay(&engine, &pages, details);

    if json {
        let out = serde_json::to_string_pretty(&outcomes)
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    println!(
        "Loaded {} rule sets from {} sources in {:.1}ms",
        sets,
        sources,
        load_time.as_secs_f64() * 1000.0
    );
    for outcome in &outcomes {
        println!();
        print_outcome(outcome);
    }

    Ok(())
}

fn print_outcome(outcome: &PageOutcome) {
    let r = &outcome.report;
    let mode = if outcome.incognito { " (incognito)" } else { "" };
    println!("page#{} {}{}", outcome.page, outcome.origin, mode);
    println!("  Total:        {}", r.total);
    println!("  Blocked:      {}", r.blocked);
    println!("  Whitelisted:  {}", r.whitelisted);
    println!(
        "  By category:  ads={} trackers={} malware={}",
        r.by_category.ads, r.by_category.trackers, r.by_category.malware
    );
    println!(
        "  By type:      images={} scripts={} stylesheets={} subframes={} other={}",
        r.by_type.images, r.by_type.scripts, r.by_type.stylesheets, r.by_type.subframes, r.by_type.other
    );
    println!(
        "  Summary:      {}",
        outcome.summary.as_deref().unwrap_or("nothing blocked")
    );
    if let Some(overview) = outcome.protection.overview() {
        let v = outcome.protection.vector_counts();
        println!("  Trackers:     {}", overview);
        println!(
            "  Vectors:      cookies={} storage={} fingerprinting={} fonts={}",
            v.cookies, v.local_storage, v.fingerprinting, v.font_enumeration
        );
    }

    if let Some(info) = &outcome.details {
        for m in &info.matched {
            let category = m.category.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string());
            let action = format!("{:?}", m.action);
            println!("    {:<11} {:<10} {:<8} {}", action, m.resource_type.to_string(), category, m.url);
        }
    }
}

fn cmd_validate(inputs: &[PathBuf], category: &str, max_rejected: f64) -> Result<(), String> {
    let category = Category::from_name(category)
        .ok_or_else(|| format!("Unknown category '{}'", category))?;
    let options = LoadOptions {
        max_rejected_ratio: max_rejected,
    };

    let mut failed = 0usize;
    for path in inputs {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let compiled = match compile_source(&RuleSource::file(name.clone(), category, 0, path), &options) {
            Ok(compiled) => compiled,
            Err(e) => {
                println!("{}: rejected: {}", name, e);
                failed += 1;
                continue;
            }
        };

        let stats = &compiled.stats;
        println!("{}: ok", name);
        println!("  Rule lines:  {}", stats.rule_lines());
        println!(
            "  Rules:       {} -> {} (dedupe removed {})",
            stats.rules + stats.deduped,
            stats.rules,
            stats.deduped
        );
        println!("  Rule sets:   {}", compiled.sets.len());
        println!("  Rejected:    {}", stats.rejected);
        println!("  Skipped:     {}", stats.skipped);
        for line in stats.rejected_lines.iter().take(10) {
            println!("    line {}: {} ({})", line.line_no, line.error, line.text);
        }
        if stats.rejected > 10 {
            println!("    ... {} more", stats.rejected - 10);
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} rule files rejected", failed, inputs.len()));
    }
    Ok(())
}
