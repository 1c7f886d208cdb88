use crate::build::BuildOptions;
use crate::errors::BuildError;
use crate::logger;
use crate::GlobalOpts;
use clap::Parser;
use crxpack_config::BuildConfig;
use crxpack_manifest::{derive_entries, derive_files, load_manifest, ManifestError};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
pub struct ValidateCommand {
    /// Manifest to validate (defaults to `manifest` in crxpack.toml)
    #[arg(value_name = "MANIFEST")]
    pub manifest: Option<PathBuf>,
}

/// Validate a manifest the way a build would load it, reporting every
/// violation
pub fn handle_validate(cmd: ValidateCommand, _opts: GlobalOpts) -> Result<(), BuildError> {
    let mut config = BuildConfig::load()?;
    if let Some(manifest) = cmd.manifest {
        config.manifest = Some(std::path::absolute(manifest)?);
    }
    let options = BuildOptions::from_config(&config)?;
    logger::debug(&format!("Validating {}", options.manifest_path.display()));

    let manifest = match load_manifest(&options.manifest_path, &options.load_options()) {
        Ok(manifest) => manifest,
        Err(ManifestError::Validation { violations }) => {
            for violation in &violations {
                logger::warn(violation);
            }
            return Err(BuildError::Validation {
                count: violations.len(),
            });
        }
        Err(e) => return Err(e.into()),
    };

    let files = derive_files(&manifest)?;
    let entries = derive_entries(&manifest.src_dir, &files)?;
    logger::success(&format!(
        "{} is valid (manifest version {}, {} entr(ies), {} asset(s))",
        options.manifest_path.display(),
        manifest.manifest_version(),
        entries.len(),
        files.assets().count()
    ));
    Ok(())
}
