//! Void asset compiler
//!
//! Compiles sources into the compiled cache and optionally keeps watching.
//!
//! ```text
//! void-assetc [--config FILE] [--root NAME=DIR]... <--key KEY|--all|--watch>...
//! ```
//!
//! Run with: cargo run -p void_asset_compiler --bin void-assetc -- --all

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgGroup, Parser};
use void_asset::{AssetKey, PipelineConfig, PipelineContext};
use void_asset_compiler::{compile_script_library, CompileContext, CompilerRegistry, SourceWatcher};

#[derive(Debug, Parser)]
#[command(name = "void-assetc")]
#[command(about = "Compile engine assets into the compiled cache")]
#[command(group(ArgGroup::new("action").required(true).multiple(true).args(["keys", "all", "watch"])))]
struct Args {
    /// Pipeline config file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Map a protocol root to a directory
    #[arg(long = "root", value_name = "NAME=DIR", value_parser = parse_root)]
    roots: Vec<(String, PathBuf)>,

    /// Compile a single asset key
    #[arg(long = "key", value_name = "KEY")]
    keys: Vec<String>,

    /// Compile every source under every root
    #[arg(long)]
    all: bool,

    /// Keep watching sources after compiling
    #[arg(long)]
    watch: bool,
}

fn parse_root(value: &str) -> Result<(String, PathBuf), String> {
    let (name, dir) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid root '{}', expected NAME=DIR", value))?;
    if name.is_empty() {
        return Err(format!("invalid root '{}', empty name", value));
    }
    Ok((name.to_string(), PathBuf::from(dir)))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            log::error!("{} assets failed to compile", failed);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<usize, Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    for (name, dir) in args.roots {
        config.protocols.insert(name, dir);
    }

    let pipeline = Arc::new(PipelineContext::new(config)?);
    let registry = Arc::new(CompilerRegistry::new(CompileContext::with_system_runner(pipeline.clone())));
    registry.install();

    let mut failed = 0;
    for raw in &args.keys {
        let key = AssetKey::parse(raw)?;
        if !registry.compile_key(&key) {
            failed += 1;
        }
    }

    if args.all {
        let roots: Vec<String> = pipeline.protocols.roots().map(|(name, _)| name.to_string()).collect();
        for root in &roots {
            failed += registry.compile_root(root);
        }
        // Other libraries reference the engine library, so it builds first
        let mut ordered: Vec<&String> = roots.iter().filter(|r| r.as_str() == "engine").collect();
        ordered.extend(roots.iter().filter(|r| r.as_str() != "engine"));
        for root in ordered {
            if !pipeline.assets.source_keys(root, void_asset::AssetType::Script).is_empty()
                && !compile_script_library(registry.context(), root, false)
            {
                failed += 1;
            }
        }
    }

    if args.watch {
        watch(registry)?;
    }
    Ok(failed)
}

fn watch(registry: Arc<CompilerRegistry>) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = registry.context().pipeline().clone();
    let mut watcher = SourceWatcher::new(registry.clone())?;
    watcher.watch_all_roots()?;
    log::info!("Watching {} directories, Ctrl+C to stop", watcher.watch_dirs().len());

    loop {
        for future in watcher.poll() {
            if let Ok(false) = future.wait() {
                log::warn!("A watched asset failed to compile");
            }
        }
        for root in pipeline.recompile.take_pending() {
            compile_script_library(registry.context(), &root, false);
        }
        std::thread::sleep(Duration::from_millis(250));
    }
}
