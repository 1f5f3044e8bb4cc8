use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};

use tankobon_core::{
    AppConfig, CoreError, ExitCode, RecordSet, load_record_set, save_backup, save_entries,
};
use tankobon_recon::anilist::{self, AniListExport, StatusFilter};
use tankobon_recon::{
    CleanupMode, DecisionLog, LogEvent, MergeMode, ReconError, ReconcileMode, ReconcileOptions,
    Reconciliation, ReportOptions, reconcile, render_markdown,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "tankobon",
    about = "Merge, deduplicate and convert manga reading backups",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting TANKOBON_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Use this config file instead of the default location.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_file: Option<PathBuf>,

    /// Debug logging (overridden by TANKOBON_LOG).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge several backups into one.
    Merge {
        /// Backups in priority order; later ones are newer.
        #[arg(required = true)]
        backups: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// replace, keep_first or keep_both (default from config).
        #[arg(long)]
        mode: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Remove duplicates inside one backup.
    Cleanup {
        backup: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// keep_first or keep_last (default from config).
        #[arg(long)]
        mode: Option<String>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Report likely duplicates without changing anything.
    Dupes {
        backup: PathBuf,
        /// AniList export whose titles help match entries.
        #[arg(long)]
        anilist: Option<PathBuf>,
        #[command(flatten)]
        run: RunArgs,
    },

    /// Convert an AniList list export into a backup.
    Convert {
        anilist: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Comma-separated AniList list statuses, or "all".
        #[arg(long, default_value = "all")]
        lists: String,
        /// Skip entries already present in this backup.
        #[arg(long)]
        compare: Option<PathBuf>,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options shared by every command that runs the engine.
#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    min_confidence: Option<f64>,
    #[arg(long)]
    fuzzy_threshold: Option<f64>,
    /// Write a Markdown review report here.
    #[arg(long)]
    report: Option<PathBuf>,
    /// Write the full decision log as JSON here.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Fail with exit code 7 instead of writing output when a group is ambiguous.
    #[arg(long)]
    strict: bool,
}

// ─── Config Actions ──────────────────────────────────────────────────────────

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Get a specific config key.
    Get { key: String },
    /// Print the config file location.
    Path,
    /// Write a config file with default values if none exists.
    Init,
}

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err).code());
    }
}

fn run(cli: Cli) -> Result<()> {
    let start = Instant::now();
    init_tracing(cli.quiet, cli.verbose)?;

    let json_output = cli.json || std::env::var("TANKOBON_JSON").as_deref() == Ok("1");
    let config_path = cli.config_file.clone().unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    debug!(path = %config_path.display(), "config loaded");

    match cli.command {
        // ── Merge / Cleanup ────────────────────────────────────────────────

        Commands::Merge {
            backups,
            output,
            mode,
            run,
        } => {
            let mode: MergeMode = mode
                .as_deref()
                .unwrap_or(config.merge.default_mode.as_str())
                .parse()?;
            let sets = load_backups(&backups)?;
            let result = run_engine(&sets, ReconcileMode::Merge(mode), &config, &run)?;
            finish(&result, &output, &config, &run, json_output, start)?;
        }

        Commands::Cleanup {
            backup,
            output,
            mode,
            run,
        } => {
            let mode: CleanupMode = mode
                .as_deref()
                .unwrap_or(config.cleanup.default_mode.as_str())
                .parse()?;
            let sets = load_backups(std::slice::from_ref(&backup))?;
            let result = run_engine(&sets, ReconcileMode::Cleanup(mode), &config, &run)?;
            finish(&result, &output, &config, &run, json_output, start)?;
        }

        // ── Dupes ──────────────────────────────────────────────────────────

        Commands::Dupes {
            backup,
            anilist,
            run,
        } => {
            let mut set = load_record_set(&backup)?;
            if let Some(path) = anilist {
                let export = read_anilist(&path)?;
                let enriched = anilist::enrich_alternate_titles(&mut set.entries, export.media());
                debug!(enriched, "added AniList titles to backup entries");
            }

            // keep_both only logs groups, so the backup is never rewritten.
            let result = run_engine(
                std::slice::from_ref(&set),
                ReconcileMode::Merge(MergeMode::KeepBoth),
                &config,
                &run,
            )?;
            write_side_outputs(&result.log, &config, &run)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "summary": result.log.summary, "events": result.log.events },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                print_groups(&result.log);
            }
        }

        // ── Convert ────────────────────────────────────────────────────────

        Commands::Convert {
            anilist,
            output,
            lists,
            compare,
        } => {
            let export = read_anilist(&anilist)?;
            let existing = compare.as_deref().map(load_record_set).transpose()?;
            let filter = StatusFilter::parse(&lists);
            let conversion = anilist::convert(&export, &filter, existing.as_ref());
            save_entries(&output, &conversion.entries, config.output.pretty_json)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "converted": conversion.entries.len(),
                        "already_present": conversion.already_present,
                        "output": output,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!(
                    "Converted {} AniList entries into {}",
                    conversion.entries.len(),
                    output.display()
                );
                for (title, id) in &conversion.already_present {
                    println!("  skipped {title} (AniList {id}): already in backup");
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::List => {
                    let kv = config_key_values(&config);
                    if json_output {
                        print_ok(serde_json::json!(kv), dur)?;
                    } else {
                        for (k, v) in &kv {
                            println!("{k} = {v}");
                        }
                    }
                }
                ConfigAction::Get { key } => {
                    let kv = config_key_values(&config);
                    let Some(val) = kv.get(key.as_str()) else {
                        eprintln!("Unknown config key: {key}");
                        std::process::exit(ExitCode::NotFound.code());
                    };
                    if json_output {
                        print_ok(serde_json::json!({ "key": key, "value": val }), dur)?;
                    } else {
                        println!("{val}");
                    }
                }
                ConfigAction::Path => {
                    if json_output {
                        print_ok(serde_json::json!({ "path": config_path }), dur)?;
                    } else {
                        println!("{}", config_path.display());
                    }
                }
                ConfigAction::Init => {
                    let created = !config_path.exists();
                    if created {
                        AppConfig::default().save_to(&config_path)?;
                    }
                    if json_output {
                        let data = serde_json::json!({ "path": config_path, "created": created });
                        print_ok(data, dur)?;
                    } else if created {
                        println!("Wrote default config to {}", config_path.display());
                    } else {
                        println!("Config already exists: {}", config_path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TANKOBON_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

/// Maps the root cause onto the documented process exit codes.
fn exit_code(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(core) = cause.downcast_ref::<CoreError>() {
            return ExitCode::from(core);
        }
        if let Some(recon) = cause.downcast_ref::<ReconError>() {
            return match recon {
                ReconError::AmbiguousGroup { .. } => ExitCode::Conflict,
                ReconError::Configuration(_) | ReconError::InvalidRecord { .. } => {
                    ExitCode::InvalidArgs
                }
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ExitCode::FileSystemError;
        }
    }
    ExitCode::GeneralError
}

fn load_backups(paths: &[PathBuf]) -> Result<Vec<RecordSet>> {
    paths
        .iter()
        .map(|path| {
            load_record_set(path).with_context(|| format!("reading backup {}", path.display()))
        })
        .collect()
}

fn read_anilist(path: &Path) -> Result<AniListExport> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading AniList export {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("parsing AniList export {}", path.display()))?;
    Ok(AniListExport::from_json(&value))
}

fn run_engine(
    sets: &[RecordSet],
    mode: ReconcileMode,
    config: &AppConfig,
    run: &RunArgs,
) -> Result<Reconciliation> {
    let mut options = ReconcileOptions::from(&config.matching);
    if let Some(value) = run.min_confidence {
        options = options.with_min_confidence(value);
    }
    if let Some(value) = run.fuzzy_threshold {
        options = options.with_fuzzy_threshold(value);
    }

    let result = reconcile(sets, mode, &options)?;

    if let Some(group) = result.log.rejected_groups().next() {
        for event in result.log.iter() {
            if let LogEvent::GroupRejected {
                group: id, reason, ..
            } = event
            {
                warn!(group = id, %reason, "group left unmerged");
            }
        }
        if run.strict {
            // The report still helps when the run is refused.
            write_side_outputs(&result.log, config, run)?;
            return Err(ReconError::AmbiguousGroup {
                group,
                reason: format!(
                    "{} ambiguous group(s); rerun without --strict to keep them unmerged",
                    result.log.summary.groups_rejected
                ),
            }
            .into());
        }
    }

    Ok(result)
}

fn write_side_outputs(log: &DecisionLog, config: &AppConfig, run: &RunArgs) -> Result<()> {
    if let Some(path) = &run.report {
        let options = ReportOptions {
            review_threshold: config.matching.review_threshold,
            generated_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        std::fs::write(path, render_markdown(log, &options))
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    if let Some(path) = &run.log {
        let json = if config.output.pretty_json {
            log.to_json_pretty()?
        } else {
            serde_json::to_string(log)?
        };
        std::fs::write(path, json).with_context(|| format!("writing log {}", path.display()))?;
    }
    Ok(())
}

fn finish(
    result: &Reconciliation,
    output: &Path,
    config: &AppConfig,
    run: &RunArgs,
    json_output: bool,
    start: Instant,
) -> Result<()> {
    save_backup(
        output,
        &result.entries,
        &result.extras,
        config.output.pretty_json,
    )?;
    write_side_outputs(&result.log, config, run)?;
    let summary = &result.log.summary;
    let dur = start.elapsed().as_millis();

    if json_output {
        print_json(&serde_json::json!({
            "status": "ok",
            "data": { "mode": result.log.mode.to_string(), "summary": summary, "output": output },
            "meta": { "duration_ms": dur }
        }))?;
    } else {
        println!(
            "{}: {} entries in, {} out -> {}",
            result.log.mode,
            summary.entries_in,
            summary.entries_out,
            output.display()
        );
        println!(
            "  groups: {} formed, {} resolved, {} left unmerged; {} records skipped",
            summary.groups_formed, summary.groups_resolved, summary.groups_rejected, summary.skipped
        );
    }
    Ok(())
}

fn print_groups(log: &DecisionLog) {
    let mut groups: BTreeMap<usize, (Vec<String>, f64)> = BTreeMap::new();
    for event in log.iter() {
        if let LogEvent::GroupFormed {
            group,
            members,
            weakest_edge,
            ..
        } = event
        {
            let keys = members.iter().map(ToString::to_string).collect();
            groups.insert(*group, (keys, *weakest_edge));
        }
    }

    if groups.is_empty() {
        println!("No duplicates found.");
        return;
    }
    println!("Found {} potential duplicate groups:", groups.len());
    for (id, (members, weakest)) in &groups {
        println!("\n  #{id} (weakest link {weakest:.2})");
        for key in members {
            println!("    {key}");
        }
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn print_ok(data: serde_json::Value, dur: u128) -> Result<()> {
    print_json(&serde_json::json!({
        "status": "ok",
        "data": data,
        "meta": { "duration_ms": dur }
    }))
}

fn config_key_values(config: &AppConfig) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("matching.min_confidence", config.matching.min_confidence.to_string());
    map.insert("matching.fuzzy_threshold", config.matching.fuzzy_threshold.to_string());
    map.insert("matching.review_threshold", config.matching.review_threshold.to_string());
    map.insert("merge.default_mode", config.merge.default_mode.clone());
    map.insert("cleanup.default_mode", config.cleanup.default_mode.clone());
    map.insert("output.pretty_json", config.output.pretty_json.to_string());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn merge_arguments_parse() {
        let cli = Cli::try_parse_from([
            "tankobon", "merge", "a.json", "b.json", "-o", "out.json", "--mode", "keep_first",
            "--report", "r.md", "--strict",
        ])
        .unwrap();
        let Commands::Merge {
            backups,
            mode,
            run,
            ..
        } = cli.command
        else {
            panic!("expected merge");
        };
        assert_eq!(backups.len(), 2);
        assert_eq!(mode.as_deref(), Some("keep_first"));
        assert!(run.strict);
        assert_eq!(run.report, Some(PathBuf::from("r.md")));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["tankobon", "-v", "-q", "config", "list"]).is_err());
    }

    #[test]
    fn exit_codes_follow_the_root_cause() {
        let err = anyhow::Error::from(ReconError::Configuration("bad".into()));
        assert_eq!(exit_code(&err), ExitCode::InvalidArgs);

        let err = anyhow::Error::from(CoreError::BackupNotFound("x".into())).context("reading");
        assert_eq!(exit_code(&err), ExitCode::NotFound);

        let err = anyhow::Error::from(ReconError::AmbiguousGroup {
            group: 1,
            reason: "r".into(),
        });
        assert_eq!(exit_code(&err), ExitCode::Conflict);

        assert_eq!(exit_code(&anyhow::anyhow!("other")), ExitCode::GeneralError);
    }

    #[test]
    fn config_keys_cover_every_section() {
        let kv = config_key_values(&AppConfig::default());
        assert_eq!(kv["merge.default_mode"], "replace");
        assert_eq!(kv["cleanup.default_mode"], "keep_first");
        assert_eq!(kv["matching.min_confidence"], "0.85");
        assert_eq!(kv.len(), 6);
    }
}
