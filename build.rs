// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    let global_args = [
        Arg::new("install_root")
            .long("install-root")
            .value_name("PATH")
            .default_value("/")
            .help("Root folder to install to"),
        Arg::new("config_file")
            .long("config-file")
            .value_name("PATH")
            .default_value("/etc/parcel/parcel.cfg")
            .help("Path to the parcel config file"),
        Arg::new("assume_yes")
            .short('y')
            .long("yes")
            .action(ArgAction::SetTrue)
            .help("Skip asking for permission to perform actions"),
    ];

    Command::new("parcel")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Parcel Contributors")
        .about("Simple local package manager with dependency resolution")
        .args(global_args)
        .subcommand(
            Command::new("install")
                .about("Install packages from archive files or configured repositories")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package archive paths or repository package names"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Uninstall installed packages (and everything that depends on them)")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package names to remove"),
                ),
        )
        .subcommand(
            Command::new("query")
                .about("Query installed package versions")
                .arg(
                    Arg::new("packages")
                        .num_args(0..)
                        .help("Package names (all installed packages if omitted)"),
                ),
        )
        .subcommand(
            Command::new("repo")
                .about("Manage local folder repositories")
                .subcommand(
                    Command::new("add")
                        .about("Add a package archive to a local folder repository")
                        .arg(Arg::new("repository").required(true))
                        .arg(Arg::new("package_file").required(true)),
                )
                .subcommand(
                    Command::new("remove")
                        .about("Remove a package from a local folder repository")
                        .arg(Arg::new("repository").required(true))
                        .arg(Arg::new("package_name").required(true)),
                ),
        )
}

fn main() -> std::io::Result<()> {
    let out_dir = match env::var_os("OUT_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => return Ok(()),
    };

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let cmd = build_cli();
    let man = Man::new(cmd.clone());
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    fs::write(man_dir.join("parcel.1"), &buffer)?;

    for subcommand in cmd.get_subcommands() {
        let name = format!("parcel-{}", subcommand.get_name());
        let man = Man::new(subcommand.clone().name(name.clone()));
        let mut buffer = Vec::new();
        man.render(&mut buffer)?;
        fs::write(man_dir.join(format!("{}.1", name)), &buffer)?;
    }

    println!("cargo:rerun-if-changed=build.rs");
    Ok(())
}
