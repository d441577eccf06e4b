mod backend;
mod cpu;
#[cfg(test)]
mod cpu_tests;
mod frontend;
mod instructions;
mod loader;

use std::error::Error;
use std::io;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cpu::{CPUConfig, CPU};
use crate::loader::loader::TraceReader;

#[derive(Parser, Debug)]
#[command(
    name = "sim",
    about = "Cycle-accurate simulator of a superscalar out-of-order pipeline"
)]
struct Args {
    /// Reorder buffer capacity.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    rob_size: u32,

    /// Issue queue capacity.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    iq_size: u32,

    /// Pipeline width: instructions per stage per cycle.
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Instruction trace to simulate.
    trace_file: PathBuf,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.use_stderr() {
                eprintln!("{err}");
                process::exit(1);
            }
            // --help and --version land here
            let _ = err.print();
            process::exit(0);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if let Err(err) = run(&args) {
        eprintln!("Error: {err}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let trace_reader = TraceReader::open(&args.trace_file)?;

    let cpu_config = CPUConfig {
        rob_size: args.rob_size,
        iq_size: args.iq_size,
        width: args.width,
    };

    let mut cpu = CPU::new(&cpu_config, trace_reader);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let mut write_result = Ok(());
    cpu.run(|instr| {
        if write_result.is_ok() {
            write_result = writeln!(out, "{instr}");
        }
    });
    write_result?;

    let perf_counters = cpu.perf_counters.borrow();
    writeln!(out, "# === Simulator Command =========")?;
    writeln!(
        out,
        "# ./sim {} {} {} {}",
        args.rob_size,
        args.iq_size,
        args.width,
        args.trace_file.display()
    )?;
    writeln!(out, "# === Processor Configuration ===")?;
    writeln!(out, "# ROB_SIZE  = {}", args.rob_size)?;
    writeln!(out, "# IQ_SIZE   = {}", args.iq_size)?;
    writeln!(out, "# WIDTH     = {}", args.width)?;
    writeln!(out, "# === Simulation Results ========")?;
    writeln!(out, "# Dynamic Instruction Count      = {}", perf_counters.instr_cnt)?;
    writeln!(out, "# Cycles                         = {}", perf_counters.cycle_cnt)?;
    writeln!(out, "# Instructions Per Cycle (IPC)   = {:.2}", perf_counters.ipc())?;
    out.flush()?;

    Ok(())
}
