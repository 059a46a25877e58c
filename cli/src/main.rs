use clap::{Args, Parser, Subcommand};
use laemu_core::debug::GdbConfig;
use laemu_core::emulator::Emulator;
use laemu_core::log::{self, Level};
use laemu_core::{InsnSet, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "laemu", version = "0.1.0",
    about = "A LoongArch64 system emulator with a gdb stub", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Log every executed instruction and packet
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Boot a LoongArch kernel elf
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the kernel elf
    path: PathBuf,
    /// Guest RAM in GiB
    #[arg(short, long, default_value = "1")]
    memory: usize,
    /// Wait for gdb on this port before running
    #[arg(long)]
    gdb: Option<u16>,
    /// Reply '-' to malformed packets instead of closing the session
    #[arg(long, requires = "gdb")]
    gdb_nack: bool,
    /// Stop after this many steps when running without gdb
    #[arg(long)]
    max_insns: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    log::log_init(if cli.verbose { Level::Trace } else { Level::Warn });

    match cli.command {
        Commands::Run(args) => cmd_run(args),
    }
}

fn cmd_run(args: RunArgs) -> Result<()> {
    let mut emulator = Emulator::new()
        .ram_size(args.memory << 30)
        .decoder(InsnSet::Base)
        .decoder(InsnSet::Privileged)
        .build()?;

    let elf_data = std::fs::read(&args.path)?;
    emulator.load_elf(&elf_data)?;

    let res = match args.gdb {
        Some(port) => emulator.serve_gdb(GdbConfig {
            port,
            nack_on_error: args.gdb_nack,
        }),
        None => emulator.run(args.max_insns),
    };

    println!("[laemu] execution statistics:\n{}", emulator.counters());
    match res {
        Ok(()) => Ok(()),
        Err(e) => {
            eprintln!("[laemu] stopped with error: {}", e);
            Err(e)
        }
    }
}
