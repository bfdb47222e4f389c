// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("xcli")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Xcer Contributors")
        .about("Minimal package manager with dependency resolution and conflict detection")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file (default: search ~/.config/xology, /etc, ./)"),
        )
        .arg(
            Arg::new("noconfirm")
                .short('y')
                .long("noconfirm")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Do not ask for confirmation"),
        )
        .subcommand(
            Command::new("add")
                .about("Install packages and their dependencies")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(
            Command::new("del")
                .about("Remove installed packages")
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Package names"),
                ),
        )
        .subcommand(Command::new("upd").about("Upgrade every installed package with a newer index version"))
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("search")
                .about("Search the remote index by package name")
                .arg(
                    Arg::new("terms")
                        .required(true)
                        .num_args(1..)
                        .help("Search terms"),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    fs::write(man_dir.join("xcli.1"), buffer).expect("Failed to write man page");
}
