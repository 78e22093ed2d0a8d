// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("libshelf")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Libshelf Contributors")
        .about("Declarative library asset installer with manifest reconciliation")
        .subcommand_required(false)
        .arg(
            Arg::new("project_dir")
                .short('p')
                .long("project-dir")
                .value_name("DIR")
                .default_value(".")
                .global(true)
                .help("Project directory containing libshelf.json"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .global(true)
                .help("Enable verbose output"),
        )
        .subcommand(
            Command::new("sync")
                .about("Reconcile on-disk library assets with the declared manifest"),
        )
        .subcommand(Command::new("list").about("List the libraries recorded as installed"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("libshelf.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
