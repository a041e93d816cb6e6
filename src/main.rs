use anyhow::Result;
use clap::Parser;
use console::style;

use buildver::config::Configuration;
use buildver::git::CliGit;
use buildver::resolve::{get_version, ResolveOptions};
use buildver::version::{format_debian, format_pep440};

#[derive(clap::Parser)]
#[command(
    name = "buildver",
    about = "Derive a build version string from the primary and enterprise repositories"
)]
struct Args {
    #[arg(long, help = "Resolve the version of a specific commit instead of the working copy")]
    commit: Option<String>,

    #[arg(long, help = "Build variant recorded in the local version segment")]
    variant: Option<String>,

    #[arg(long, help = "Count commits as if the commit were on the master line")]
    pretend_master: bool,

    #[arg(long, help = "Ignore uncommitted changes when hashing")]
    pretend_clean: bool,

    #[arg(long, value_enum, default_value = "pep440", help = "Output syntax")]
    format: Format,

    #[arg(short, long, help = "Custom configuration file path")]
    config: Option<String>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Format {
    Pep440,
    Debian,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let git = CliGit::new();
    let cwd = std::env::current_dir()?;

    let config = match Configuration::discover(&git, &cwd, args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let opts = ResolveOptions {
        commit: args.commit,
        variant: args.variant,
        pretend_master: args.pretend_master,
        pretend_clean: args.pretend_clean,
        cwd: Some(cwd),
    };

    let version = match get_version(&git, &config, &opts) {
        Ok(version) => version,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{}",
        match args.format {
            Format::Pep440 => format_pep440(&version),
            Format::Debian => format_debian(&version),
        }
    );

    Ok(())
}
