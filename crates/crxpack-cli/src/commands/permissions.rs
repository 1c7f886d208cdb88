use crate::errors::BuildError;
use crate::logger;
use crate::GlobalOpts;
use clap::Parser;
use crxpack_manifest::{classify, FileClass};
use crxpack_scan::infer_permissions;
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Parser, Debug, Default)]
pub struct PermissionsCommand {
    /// Compiled script files or directories to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,
}

/// Print the permissions the detector table finds in compiled scripts
pub fn handle_permissions(cmd: PermissionsCommand, _opts: GlobalOpts) -> Result<(), BuildError> {
    let files = collect_scripts(&cmd.paths);
    logger::debug(&format!("Scanning {} script(s)", files.len()));

    let sources: Vec<String> = files
        .par_iter()
        .map(fs::read_to_string)
        .collect::<Result<_, _>>()?;
    let permissions = infer_permissions(&sources);

    if permissions.is_empty() {
        logger::notice("No permissions detected");
        return Ok(());
    }
    for permission in &permissions {
        println!("{}", permission);
    }
    Ok(())
}

/// Files named directly plus every script below named directories
fn collect_scripts(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        files.extend(
            WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(walkdir::DirEntry::into_path)
                .filter(|file| classify(&file.to_string_lossy()) == FileClass::Script),
        );
    }
    files.sort();
    files
}
