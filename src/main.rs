//! docanchor CLI
//!
//! Entry point for the `docanchor` command-line tool. Works against the
//! local file backends under the configured state directory.

use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use docanchor::backend::{LocalContentStore, LocalLedger, LocalPinningService};
use docanchor::config::DEFAULT_CONFIG_FILE;
use docanchor::{
    Artifact, Backends, BatchSummary, Cid, ContentDigest, EffectiveConfig, Manifest, Metadata,
    PublisherConfig, Publisher, VerificationReport, Verifier,
};

/// Exit code when a verification report is not VERIFIED
const EXIT_NOT_VERIFIED: i32 = 2;

#[derive(Parser)]
#[command(name = "docanchor")]
#[command(about = "Publish, pin, anchor and re-verify documents", version)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file (default: docanchor.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Directory holding the local store, pin set and ledger
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish files through upload, pin, integrity check and anchor
    Publish {
        /// Files to publish
        files: Vec<PathBuf>,

        /// Publish every file under a directory, in sorted order
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Glob patterns to skip when walking --dir
        #[arg(long)]
        exclude: Vec<String>,

        /// Metadata attached to every artifact (key=value)
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, String)>,

        /// Write the session manifest here when done
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Skip the delay between artifacts
        #[arg(long)]
        no_spacing: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Independently re-verify a CID or every entry of a manifest
    Verify {
        /// CID to verify
        #[arg(required_unless_present = "manifest")]
        cid: Option<String>,

        /// Verify every entry of a manifest file instead
        #[arg(long, conflicts_with = "cid")]
        manifest: Option<PathBuf>,

        /// Expected SHA-256 (hex) of the content
        #[arg(long, requires = "cid")]
        digest: Option<String>,

        /// Write the report to this file
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration and where it came from
    Config {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    let no_spacing = matches!(cli.command, Commands::Publish { no_spacing: true, .. });
    let effective = match load_config(cli.config.as_deref(), cli.state_dir.as_deref(), no_spacing) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Commands::Publish {
            files,
            dir,
            exclude,
            meta,
            manifest,
            no_spacing: _,
            json,
        } => {
            let metadata: Metadata = meta.into_iter().collect();
            run_publish(&effective, files, dir, &exclude, metadata, manifest, json);
        }
        Commands::Verify {
            cid,
            manifest,
            digest,
            out,
            json,
        } => match manifest {
            Some(path) => run_verify_manifest(&effective, &path, out, json),
            None => run_verify(&effective, cid.unwrap_or_default(), digest, out, json),
        },
        Commands::Config { json } => run_config(&effective, json),
    }
}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn load_config(
    config_path: Option<&Path>,
    state_dir: Option<&Path>,
    no_spacing: bool,
) -> Result<EffectiveConfig, String> {
    if let Some(path) = config_path {
        if !path.exists() {
            return Err(format!("config file not found: {}", path.display()));
        }
    }
    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    let mut overrides = serde_json::Map::new();
    if let Some(dir) = state_dir {
        overrides.insert(
            "state_dir".to_string(),
            serde_json::json!(dir.to_string_lossy()),
        );
    }
    if no_spacing {
        overrides.insert("batch".to_string(), serde_json::json!({ "spacing_ms": 0 }));
    }
    let cli_overrides = (!overrides.is_empty()).then(|| serde_json::Value::Object(overrides));

    EffectiveConfig::build(Some(path), cli_overrides).map_err(|e| e.to_string())
}

fn publisher_config(effective: &EffectiveConfig) -> PublisherConfig {
    match effective.publisher_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn open_backends(state_dir: &Path) -> Backends {
    let opened = LocalContentStore::open(state_dir).and_then(|store| {
        Ok(Backends::new(
            Arc::new(store),
            Arc::new(LocalPinningService::open(state_dir)?),
            Arc::new(LocalLedger::open(state_dir)?),
        ))
    });
    match opened {
        Ok(backends) => backends,
        Err(e) => {
            eprintln!("Error opening state directory {}: {}", state_dir.display(), e);
            process::exit(1);
        }
    }
}

fn collect_artifacts(
    files: Vec<PathBuf>,
    dir: Option<PathBuf>,
    exclude: &[String],
    metadata: &Metadata,
) -> Result<Vec<Artifact>, String> {
    let mut artifacts = Vec::new();

    for path in files {
        let bytes = fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        artifacts.push(artifact_with(name, bytes, metadata));
    }

    if let Some(root) = dir {
        let excludes = build_globset(exclude)?;
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| e.to_string())?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&root).unwrap_or(entry.path());
            if excludes.is_match(rel) {
                tracing::debug!(path = %rel.display(), "excluded");
                continue;
            }
            let bytes = fs::read(entry.path()).map_err(|e| format!("{}: {}", rel.display(), e))?;
            let name = rel.to_string_lossy().replace('\\', "/");
            artifacts.push(artifact_with(name, bytes, metadata));
        }
    }

    Ok(artifacts)
}

fn artifact_with(name: String, bytes: Vec<u8>, metadata: &Metadata) -> Artifact {
    let mut artifact = Artifact::new(name, bytes);
    artifact.metadata = metadata.clone();
    artifact
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, String> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| format!("invalid exclude '{}': {}", pattern, e))?;
        builder.add(glob);
    }
    builder.build().map_err(|e| e.to_string())
}

fn run_publish(
    effective: &EffectiveConfig,
    files: Vec<PathBuf>,
    dir: Option<PathBuf>,
    exclude: &[String],
    metadata: Metadata,
    manifest_path: Option<PathBuf>,
    json: bool,
) {
    let config = publisher_config(effective);

    let artifacts = match collect_artifacts(files, dir, exclude, &metadata) {
        Ok(a) if a.is_empty() => {
            eprintln!("Nothing to publish");
            process::exit(1);
        }
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error reading input: {}", e);
            process::exit(1);
        }
    };

    let backends = open_backends(&config.state_dir);
    let publisher = match Publisher::new(config, backends) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let outcomes = publisher.publish_all(artifacts);
    let summary = BatchSummary::from_outcomes(&outcomes);

    if json {
        let rows: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|outcome| match outcome {
                Ok(p) => serde_json::json!({
                    "name": p.name,
                    "status": "published",
                    "cid": p.cid(),
                    "document_id": p.document_id(),
                    "verified": p.verified,
                    "pinned": p.pinned,
                    "warnings": p.warnings,
                }),
                Err(e) => serde_json::json!({
                    "name": e.name,
                    "status": "failed",
                    "stage": e.stage(),
                    "kind": e.kind(),
                    "cid": e.error.cid(),
                    "error": e.error.cause.to_string(),
                }),
            })
            .collect();
        let out = serde_json::json!({ "outcomes": rows, "summary": summary });
        match serde_json::to_string_pretty(&out) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing output: {}", e),
        }
    } else {
        for outcome in &outcomes {
            match outcome {
                Ok(p) => {
                    println!("published  {}  {}  document {}", p.name, p.cid(), p.document_id());
                    for warning in &p.warnings {
                        println!("  warning [{:?}] {}: {}", warning.kind, warning.stage, warning.message);
                    }
                }
                Err(e) => println!("FAILED     {}  at {}: {}", e.name, e.stage(), e.error.cause),
            }
        }
        println!();
        println!("{}", summary.human_summary);
    }

    if let Some(path) = manifest_path {
        match publisher.write_manifest(&path) {
            Ok(manifest) => {
                if !json {
                    println!("Manifest: {} ({} entries)", path.display(), manifest.len());
                }
            }
            Err(e) => {
                eprintln!("Error writing manifest: {}", e);
                process::exit(1);
            }
        }
    }

    process::exit(summary.exit_code);
}

fn print_report(report: &VerificationReport, json: bool) {
    if json {
        match report.to_json() {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing output: {}", e),
        }
        return;
    }

    println!("{}", report.cid);
    for check in &report.checks {
        println!("  {:<8} {:<13} {}", check.status, check.name, check.message);
    }
    println!(
        "  => {:?} ({} passed, {} failed, {} warnings, {} errors)",
        report.overall_status(),
        report.summary.passed,
        report.summary.failed,
        report.summary.warnings,
        report.summary.errors
    );
}

fn run_verify(
    effective: &EffectiveConfig,
    cid: String,
    digest: Option<String>,
    out: Option<PathBuf>,
    json: bool,
) {
    let config = publisher_config(effective);
    let verifier = Verifier::new(&config, open_backends(&config.state_dir));
    let cid = Cid::new(cid);

    let report = match digest {
        Some(hex) => match ContentDigest::from_hex(&hex) {
            Some(expected) => verifier.verify_with_digest(&cid, &expected),
            None => {
                eprintln!("Invalid digest: expected 64 hex characters");
                process::exit(1);
            }
        },
        None => verifier.verify(&cid),
    };

    print_report(&report, json);

    if let Some(path) = out {
        if let Err(e) = report.write_to_file(&path) {
            eprintln!("Error writing report: {}", e);
            process::exit(1);
        }
    }

    process::exit(if report.is_verified() { 0 } else { EXIT_NOT_VERIFIED });
}

fn run_verify_manifest(effective: &EffectiveConfig, path: &Path, out: Option<PathBuf>, json: bool) {
    let manifest = match Manifest::load(path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error reading manifest {}: {}", path.display(), e);
            process::exit(1);
        }
    };

    let config = publisher_config(effective);
    let verifier = Verifier::new(&config, open_backends(&config.state_dir));
    let reports = verifier.verify_manifest(&manifest);

    if json {
        match serde_json::to_string_pretty(&reports) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing output: {}", e),
        }
    } else {
        for (entry, report) in manifest.entries().iter().zip(&reports) {
            println!("{}:", entry.name);
            print_report(report, false);
        }
    }

    if let Some(out) = out {
        let written = serde_json::to_string_pretty(&reports)
            .map_err(|e| e.to_string())
            .and_then(|s| fs::write(&out, s).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error writing report: {}", e);
            process::exit(1);
        }
    }

    let all_verified = reports.iter().all(VerificationReport::is_verified);
    process::exit(if all_verified { 0 } else { EXIT_NOT_VERIFIED });
}

fn run_config(effective: &EffectiveConfig, json: bool) {
    if json {
        match effective.to_json() {
            Ok(s) => println!("{}", s),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Sources:");
    for source in &effective.sources {
        match (&source.path, &source.digest) {
            (Some(path), Some(digest)) => {
                println!("  {:?}: {} (sha256 {})", source.origin, path, &digest[..12])
            }
            _ => println!("  {:?}", source.origin),
        }
    }
    if !effective.redactions.is_empty() {
        println!("Redacted: {}", effective.redactions.join(", "));
    }
    println!();
    match serde_json::to_string_pretty(&effective.config) {
        Ok(s) => println!("{}", s),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}
