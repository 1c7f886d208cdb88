use crate::build::{
    build_once, write_output, BuildCache, BuildOptions, BuildReport, Severity, SharedCache,
};
use crate::errors::BuildError;
use crate::logger;
use crate::GlobalOpts;
use clap::Parser;
use crxpack_bundler::{Compiler, PassthroughCompiler};
use crxpack_config::BuildConfig;
use notify_debouncer_full::{
    new_debouncer,
    notify::{EventKind, RecursiveMode, Watcher},
    DebounceEventResult,
};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

const WATCH_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Parser, Debug, Default)]
pub struct BuildCommand {
    /// Manifest to build (overrides `manifest` in crxpack.toml)
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,
    /// Output directory (overrides `out_dir` in crxpack.toml)
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,
    /// Rebuild whenever a source file changes
    #[arg(short, long)]
    pub watch: bool,
}

pub fn handle_build(cmd: BuildCommand, _opts: GlobalOpts) -> Result<(), BuildError> {
    let options = resolve_options(&cmd)?;
    logger::debug(&format!(
        "Building {} into {}",
        options.manifest_path.display(),
        options.out_dir.display()
    ));

    let compiler = PassthroughCompiler::new();
    let cache = BuildCache::shared();

    let result = build_and_write(&compiler, &options, &cache);
    if !cmd.watch {
        return result;
    }
    if let Err(e) = result {
        logger::error(&e.to_string());
    }
    watch(&compiler, &options, &cache)
}

/// Options from the configuration file with command line overrides applied
fn resolve_options(cmd: &BuildCommand) -> Result<BuildOptions, BuildError> {
    let mut config = BuildConfig::load()?;
    // command line paths are relative to the working directory, not the config
    if let Some(manifest) = &cmd.manifest {
        config.manifest = Some(std::path::absolute(manifest)?);
    }
    if let Some(out_dir) = &cmd.out_dir {
        config.out_dir = Some(std::path::absolute(out_dir)?);
    }
    BuildOptions::from_config(&config)
}

fn build_and_write(
    compiler: &dyn Compiler,
    options: &BuildOptions,
    cache: &SharedCache,
) -> Result<(), BuildError> {
    logger::spinner_start("Building extension");
    let run = build_once(compiler, options, cache);
    logger::spinner_stop();
    print_report(&run.report);

    let graph = run.result?;
    let mut report = BuildReport::new();
    let written = write_output(&graph, &options.out_dir, &mut report);
    print_report(&report);
    logger::success(&format!(
        "Built {} file(s) into {}",
        written,
        options.out_dir.display()
    ));
    Ok(())
}

fn print_report(report: &BuildReport) {
    for diagnostic in report.diagnostics() {
        match diagnostic.severity {
            Severity::Info => logger::notice(&diagnostic.message),
            Severity::Warning => logger::warn(&diagnostic.message),
        }
    }
}

/// Rebuild on every change below the manifest directory.
///
/// Each batch of changes is applied to the cache under one lock before the
/// rebuild is triggered. Runs until the process is interrupted.
fn watch(
    compiler: &dyn Compiler,
    options: &BuildOptions,
    cache: &SharedCache,
) -> Result<(), BuildError> {
    let src_dir = options.src_dir();
    let manifest_path = options.manifest_path.clone();
    let out_dir = options.out_dir.clone();
    let (tx, rx) = mpsc::channel::<usize>();

    let handler_cache = SharedCache::clone(cache);
    let mut debouncer = new_debouncer(WATCH_DEBOUNCE, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                let changed: Vec<PathBuf> = events
                    .iter()
                    .filter(|event| {
                        matches!(
                            event.event.kind,
                            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                        )
                    })
                    .flat_map(|event| event.paths.iter().cloned())
                    .filter(|path| !path.starts_with(&out_dir))
                    .collect();
                if changed.is_empty() {
                    return;
                }

                let mut cache = handler_cache.lock();
                for path in &changed {
                    cache.on_file_change(path, &manifest_path);
                }
                drop(cache);
                let _ = tx.send(changed.len());
            }
            Err(errors) => {
                for error in errors {
                    logger::warn(&format!("Watch error: {}", error));
                }
            }
        }
    })
    .map_err(|e| BuildError::Watch(e.to_string()))?;

    debouncer
        .watcher()
        .watch(&src_dir, RecursiveMode::Recursive)
        .map_err(|e| BuildError::Watch(format!("{}: {}", src_dir.display(), e)))?;
    logger::notice(&format!(
        "Watching {} for changes (Ctrl+C to stop)",
        src_dir.display()
    ));

    while let Ok(count) = rx.recv() {
        logger::info(&format!("{} file(s) changed, rebuilding", count));
        if let Err(e) = build_and_write(compiler, options, cache) {
            logger::error(&e.to_string());
        }
    }
    Ok(())
}
