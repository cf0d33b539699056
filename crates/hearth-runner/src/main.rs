mod echo;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use hearth_core::input::spawn_stdin_poller;
use hearth_core::vfs::mount::MountTable;
use hearth_core::{GuestTask, MachineConfig};

use crate::echo::EchoGuest;

#[derive(Parser)]
#[command(name = "hearth-runner", about = "Boot and inspect hearth machines")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a machine config, validate it, and print the effective result.
    Check {
        #[arg(long)]
        config: PathBuf,
    },
    /// Print the mount table and, optionally, where virtual paths resolve.
    Mounts {
        #[arg(long)]
        config: PathBuf,
        /// Virtual paths to resolve against the table.
        paths: Vec<String>,
    },
    /// Boot a machine with the built-in echo guest on stdin.
    Run {
        #[arg(long)]
        config: PathBuf,
        /// Stop cleanly after this many echoed events.
        #[arg(long)]
        echo_limit: Option<u64>,
        /// Do not attach the stdin poller.
        #[arg(long)]
        no_stdin: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Check { config } => cmd_check(&config),
        Command::Mounts { config, paths } => cmd_mounts(&config, &paths),
        Command::Run {
            config,
            echo_limit,
            no_stdin,
        } => cmd_run(&config, echo_limit, no_stdin),
    }
}

fn load(path: &Path) -> anyhow::Result<MachineConfig> {
    let config = MachineConfig::load(path)?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(config)
}

fn cmd_check(path: &Path) -> anyhow::Result<ExitCode> {
    let config = load(path)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_mounts(path: &Path, paths: &[String]) -> anyhow::Result<ExitCode> {
    let config = load(path)?;
    let mut table = MountTable::new(config.root.clone());
    for spec in &config.mounts {
        if !table.mount(&spec.real_path, &spec.virtual_path, spec.read_only) {
            anyhow::bail!(
                "cannot mount {} at {}",
                spec.real_path.display(),
                spec.virtual_path
            );
        }
    }
    table.finish_init();

    println!("/ -> {} (rw)", table.root().display());
    for mount in table.list() {
        println!(
            "{} -> {} ({})",
            mount.virtual_path(),
            mount.real_path().display(),
            if mount.is_read_only() { "ro" } else { "rw" }
        );
    }
    for vpath in paths {
        match table.resolve(vpath) {
            Some(real) => println!("{vpath} resolves to {}", real.display()),
            None => println!("{vpath} is invalid"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_run(path: &Path, echo_limit: Option<u64>, no_stdin: bool) -> anyhow::Result<ExitCode> {
    let config = load(path)?;
    let status = hearth_core::run(
        &config,
        move || Box::new(EchoGuest::new(echo_limit)) as Box<dyn GuestTask>,
        |machine| {
            if !no_stdin {
                if let Err(err) = spawn_stdin_poller(machine.sender()) {
                    log::warn!("stdin poller did not start: {err}");
                }
            }
        },
    )?;
    if let hearth_core::ExitStatus::Fault(message) = &status {
        eprintln!("guest fault: {message}");
    }
    Ok(ExitCode::from(status.code() as u8))
}
