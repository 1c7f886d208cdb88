use clap::{Parser, Subcommand};
use crxpack::{
    commands::{build, init, permissions, validate},
    logger, GlobalOpts,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "crxpack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Browser extension build orchestrator",
    long_about = "crxpack builds a browser extension from its manifest: entries and assets are derived from the manifest, permissions are inferred from the compiled code and a loadable package is written."
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the extension described by the manifest
    Build(build::BuildCommand),
    /// Validate a manifest and report every problem
    Validate(validate::ValidateCommand),
    /// List the permissions detected in compiled scripts
    Permissions(permissions::PermissionsCommand),
    /// Initialize a new crxpack.toml
    Init {
        /// Optional filename for the configuration (default: crxpack.toml)
        file: Option<String>,
    },
}

fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crxpack=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init();
}

fn main() {
    let cli = Cli::parse();

    init_tracing();
    if let Err(e) = logger::init_with_verbosity(cli.global.verbosity_level(), cli.global.no_stdout)
    {
        eprintln!("Warning: Failed to initialize logger: {}", e);
    }

    match cli.command {
        Commands::Build(cmd) => {
            if let Err(e) = build::handle_build(cmd, cli.global) {
                logger::error(&format!("Build failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::Validate(cmd) => {
            if let Err(e) = validate::handle_validate(cmd, cli.global) {
                logger::error(&format!("Validation failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::Permissions(cmd) => {
            if let Err(e) = permissions::handle_permissions(cmd, cli.global) {
                logger::error(&format!("Permission scan failed: {}", e));
                std::process::exit(1);
            }
        }
        Commands::Init { file } => {
            init::handle_init(file, cli.global);
        }
    }
}
