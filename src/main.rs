// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use parcel::config::ConfigFile;
use parcel::install::{ChrootHookRunner, InstallEngine};
use parcel::repository::{LocalFolderRepository, Repository, RepositoryEngine};
use parcel::uninstall::UninstallEngine;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "parcel")]
#[command(author, version, about = "Simple local package manager with dependency resolution", long_about = None)]
struct Cli {
    /// Root folder to install to
    #[arg(long, default_value = "/", global = true)]
    install_root: PathBuf,

    /// Path to the parcel config file
    #[arg(long, default_value = "/etc/parcel/parcel.cfg", global = true)]
    config_file: PathBuf,

    /// Skip asking for permission to perform actions
    #[arg(short = 'y', long = "yes", global = true)]
    assume_yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages from archive files or configured repositories
    Install {
        /// Package archive paths or repository package names
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Uninstall installed packages (and everything that depends on them)
    Remove {
        /// Package names to remove
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Query installed package versions
    Query {
        /// Package names (all installed packages if omitted)
        packages: Vec<String>,
    },
    /// Manage local folder repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a package archive to a local folder repository
    Add {
        /// Repository root folder
        repository: PathBuf,
        /// Package archive to add
        package_file: PathBuf,
    },
    /// Remove a package from a local folder repository
    Remove {
        /// Repository root folder
        repository: PathBuf,
        /// Package name to remove
        package_name: String,
    },
}

fn load_repositories(config_file: &Path) -> RepositoryEngine {
    let config = ConfigFile::read(config_file);
    if !config.ok() {
        warn!(
            "failed to read config file {}; continuing without repositories",
            config_file.display()
        );
        return RepositoryEngine::new();
    }
    RepositoryEngine::from_config(&config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install { packages } => {
            let repos = load_repositories(&cli.config_file);
            let mut engine = InstallEngine::new(&cli.install_root);

            for package in &packages {
                let path = Path::new(package);
                if path.is_file() {
                    info!("adding package file {}", package);
                    engine.add_package_file(path)?;
                } else {
                    info!("adding package {} from repositories", package);
                    engine.add_package_name(package, &repos)?;
                }
            }

            if engine.is_empty() {
                // Everything requested was already installed
                println!("Nothing to do.");
                return Ok(());
            }

            engine.verify_integrity()?;
            engine.verify_possible(&repos)?;

            if !cli.assume_yes {
                let mut stdin = std::io::stdin().lock();
                if !engine.request_permission(&mut stdin)? {
                    return Err(parcel::Error::Declined.into());
                }
            }

            engine.execute(&repos, &ChrootHookRunner)?;
            println!("Operations complete");
            Ok(())
        }
        Commands::Remove { packages } => {
            let mut engine = UninstallEngine::new(&cli.install_root);

            for package in &packages {
                engine.add_to_list(package)?;
            }

            if engine.is_empty() {
                println!("Nothing to do.");
                return Ok(());
            }

            if !cli.assume_yes {
                let mut stdin = std::io::stdin().lock();
                if !engine.request_permission(&mut stdin)? {
                    return Err(parcel::Error::Declined.into());
                }
            }

            engine.execute()?;
            println!("Operations complete");
            Ok(())
        }
        Commands::Query { packages } => {
            let index = parcel::index::InstalledIndex::load(&cli.install_root);

            if packages.is_empty() {
                if index.packages().is_empty() {
                    println!("No packages installed.");
                } else {
                    for (name, version) in index.packages() {
                        println!("{}: {}", name, version);
                    }
                    println!("\nTotal: {} package(s)", index.packages().len());
                }
                return Ok(());
            }

            let mut not_found = 0;
            for package in &packages {
                match index.version_of(package) {
                    Some(version) => println!("{}: {}", package, version),
                    None => {
                        println!("package {} not installed", package);
                        not_found += 1;
                    }
                }
            }
            if not_found > 0 {
                std::process::exit(not_found);
            }
            Ok(())
        }
        Commands::Repo { command } => match command {
            RepoCommands::Add {
                repository,
                package_file,
            } => {
                let repo = LocalFolderRepository::open(&repository);
                if !repo.good() {
                    return Err(parcel::Error::Repository(format!(
                        "repository at {} is not usable",
                        repository.display()
                    ))
                    .into());
                }
                repo.add_package_file(&package_file)?;
                println!("Added {} to repository", package_file.display());
                Ok(())
            }
            RepoCommands::Remove {
                repository,
                package_name,
            } => {
                let repo = LocalFolderRepository::open(&repository);
                if !repo.good() || !repo.remove_package(&package_name) {
                    return Err(parcel::Error::PackageNotFound(package_name).into());
                }
                println!("Removed {} from repository", package_name);
                Ok(())
            }
        },
        Commands::Completions { shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "parcel", &mut std::io::stdout());
            Ok(())
        }
    }
}
