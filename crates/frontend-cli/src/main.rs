//! spipwm command-line front end.
//!
//! Subcommands:
//!
//! - **run**: execute a JSON scenario, optionally dumping a VCD, watching
//!   bus addresses and saving/restoring peripheral state.
//! - **selftest**: run the built-in regression scenarios.
//! - **measure**: program a duty cycle and report the measured carrier.
//! - **regs**: print the register map (fresh or from a save state), or
//!   diff it against another save state.
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` or pass `-v`.

use clap::{Parser, Subcommand};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use spipwm_core::bench::{DEFAULT_EDGE_TIMEOUT_TICKS, DEFAULT_RESET_TICKS};
use spipwm_core::debugger::{dump_registers, dump_registers_diff, WatchKind};
use spipwm_core::savestate::SaveState;
use spipwm_core::scenario::{self, builtin};
use spipwm_core::{
    savestate, Bench, Config, Error, Peripheral, RegisterFile, Report, Result, Scenario,
};

#[derive(Parser, Debug)]
#[command(
    name = "spipwm",
    author,
    version,
    about = "SPI-controlled PWM peripheral model",
    long_about = "Tick-accurate model of an SPI register interface driving static outputs and a 3 kHz PWM carrier.\n\nExamples:\n  spipwm selftest\n  spipwm run scenario.json --vcd trace.vcd --watch 0x04\n  spipwm measure --duty 0x80"
)]
struct Cli {
    /// JSON configuration file (defaults: 10 MHz clock, 3 kHz carrier).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a JSON scenario file.
    Run {
        scenario: PathBuf,

        /// Write a VCD waveform dump.
        #[arg(long)]
        vcd: Option<PathBuf>,

        /// Save peripheral state when the scenario finishes
        /// (default path: the scenario file with a `.state` extension).
        #[arg(long, value_name = "PATH")]
        save_state: Option<Option<PathBuf>>,

        /// Restore peripheral state before the first step.
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Report frames addressed to ADDR (hex with 0x, or decimal). Repeatable.
        #[arg(long = "watch", value_parser = parse_u8)]
        watch: Vec<u8>,
    },

    /// Run the built-in regression scenarios.
    Selftest {
        /// Write one VCD per scenario into this directory.
        #[arg(long)]
        vcd_dir: Option<PathBuf>,
    },

    /// Program a duty cycle and measure the carrier.
    Measure {
        /// Duty register value (hex with 0x, or decimal).
        #[arg(long, value_parser = parse_u8)]
        duty: u8,

        /// uo_out bit to route the carrier to.
        #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..8))]
        bit: u8,
    },

    /// Print the register map.
    Regs {
        #[arg(long)]
        load_state: Option<PathBuf>,

        /// Show only the registers that differ from this save state.
        #[arg(long, value_name = "STATE")]
        diff: Option<PathBuf>,
    },
}

fn parse_hex(s: &str) -> std::result::Result<u64, std::num::ParseIntError> {
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(s, 16)
}

/// `0x`-prefixed hex or plain decimal, 0..=255.
fn parse_u8(s: &str) -> std::result::Result<u8, String> {
    let v = if s.starts_with("0x") || s.starts_with("0X") {
        parse_hex(s).map_err(|e| e.to_string())?
    } else {
        s.parse::<u64>().map_err(|e| e.to_string())?
    };
    u8::try_from(v).map_err(|_| format!("{} does not fit in a byte", s))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => {
            info!(path = %p.display(), "loading configuration");
            Config::load(p)
        }
        None => Ok(Config::default()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Run { scenario, vcd, save_state, load_state, watch } => {
            let save_state = save_state_path(&scenario, save_state);
            cmd_run(config, &scenario, vcd, save_state, load_state, &watch)
        }
        Commands::Selftest { vcd_dir } => cmd_selftest(config, vcd_dir),
        Commands::Measure { duty, bit } => cmd_measure(config, duty, bit),
        Commands::Regs { load_state, diff } => cmd_regs(config, load_state, diff),
    });

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

// ─── Subcommands ────────────────────────────────────────────────────────────

/// `--save-state` given without a path saves next to the scenario file.
fn save_state_path(scenario: &Path, arg: Option<Option<PathBuf>>) -> Option<PathBuf> {
    arg.map(|p| p.unwrap_or_else(|| savestate::state_path(scenario)))
}

fn bench_with_vcd(config: Config, vcd: Option<&Path>) -> Result<Bench> {
    let bench = Bench::new(config)?;
    match vcd {
        Some(path) => {
            info!(path = %path.display(), "writing VCD");
            bench.with_vcd(Box::new(BufWriter::new(File::create(path)?)))
        }
        None => Ok(bench),
    }
}

fn print_report(report: &Report) {
    println!("{}: {} steps, {} ticks", report.name, report.steps, report.ticks);
    for m in &report.measurements {
        println!("  pwm: {}", m);
    }
    for hit in &report.watch_hits {
        println!(
            "  watch [{}] 0x{:02X} {:?}: 0x{:02X} -> 0x{:02X} @ tick {}",
            hit.index, hit.addr, hit.access, hit.old_val, hit.new_val, hit.tick
        );
    }
}

fn cmd_run(
    config: Config,
    path: &Path,
    vcd: Option<PathBuf>,
    save_state: Option<PathBuf>,
    load_state: Option<PathBuf>,
    watch: &[u8],
) -> Result<bool> {
    let script = Scenario::load(path)?;
    let mut bench = bench_with_vcd(config, vcd.as_deref())?;

    if let Some(p) = load_state {
        bench.dut.load_state(&savestate::load_from_file(&p)?);
        info!(path = %p.display(), tick = bench.dut.ticks(), "state loaded");
    }
    for &addr in watch {
        if addr > spipwm_core::MAX_ADDR {
            return Err(Error::AddressOutOfRange(addr));
        }
        bench.dut.debugger.add_watchpoint(addr, WatchKind::Any);
    }

    let outcome = scenario::run(&mut bench, &script);
    let dut = bench.finish()?;
    let report = match outcome {
        Ok(r) => r,
        Err(e @ Error::Expectation { .. }) | Err(e @ Error::EdgeTimeout { .. }) => {
            println!("{}: FAIL: {}", script.name, e);
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    print_report(&report);
    if !watch.is_empty() {
        print!("{}", dut.debugger.list_watchpoints());
    }

    if let Some(p) = save_state {
        savestate::save_to_file(&dut.save_state(), &p)?;
        info!(path = %p.display(), "state saved");
    }
    Ok(true)
}

fn cmd_selftest(config: Config, vcd_dir: Option<PathBuf>) -> Result<bool> {
    if let Some(dir) = &vcd_dir {
        fs::create_dir_all(dir)?;
    }
    let mut passed = 0;
    let all = builtin::all();
    for s in &all {
        let vcd = vcd_dir.as_ref().map(|d| d.join(format!("{}.vcd", s.name)));
        let mut bench = bench_with_vcd(config.clone(), vcd.as_deref())?;
        let outcome = scenario::run(&mut bench, s);
        bench.finish()?;
        match outcome {
            Ok(report) => {
                passed += 1;
                print!("PASS ");
                print_report(&report);
            }
            Err(e) => println!("FAIL {}: {}", s.name, e),
        }
    }
    println!("{}/{} scenarios passed", passed, all.len());
    Ok(passed == all.len())
}

fn cmd_measure(config: Config, duty: u8, bit: u8) -> Result<bool> {
    let mask = 1u8 << bit;
    let mut bench = Bench::new(config)?;
    bench.reset(DEFAULT_RESET_TICKS)?;
    bench.write(0x00, mask)?;
    bench.write(0x02, mask)?;
    bench.write(0x04, duty)?;

    match bench.measure_pwm(bit, DEFAULT_EDGE_TIMEOUT_TICKS) {
        Ok(m) => {
            println!("duty 0x{:02X} on uo_out[{}]: {}", duty, bit, m);
            Ok(true)
        }
        Err(Error::EdgeTimeout { ticks, .. }) => {
            let level = if bench.outputs().bit(bit) { "high" } else { "low" };
            println!("duty 0x{:02X} on uo_out[{}]: no edges in {} ticks, held {}", duty, bit, ticks, level);
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

fn cmd_regs(config: Config, load_state: Option<PathBuf>, diff: Option<PathBuf>) -> Result<bool> {
    let mut dut = Peripheral::with_config(config)?;
    if let Some(p) = load_state {
        dut.load_state(&savestate::load_from_file(&p)?);
        println!("state from {} (tick {})", p.display(), dut.ticks());
    }
    let other = match diff {
        Some(p) => {
            let s = savestate::load_from_file(&p)?;
            println!("diff against {} (tick {})", p.display(), s.tick);
            Some(s)
        }
        None => None,
    };
    print!("{}", format_regs(&dut, other.as_ref()));
    Ok(true)
}

fn format_regs(dut: &Peripheral, diff: Option<&SaveState>) -> String {
    match diff {
        Some(s) => {
            let mut other = RegisterFile::new();
            other.load_values(s.registers);
            dump_registers_diff(&dut.regs, &other)
        }
        None => {
            let out = dut.outputs();
            format!(
                "{}  uo_out = 0x{:02X}  uio_out = 0x{:02X}  uio_oe = 0x{:02X}\n",
                dump_registers(&dut.regs),
                out.uo_out,
                out.uio_out,
                out.uio_oe
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u8() {
        assert_eq!(parse_u8("0x80"), Ok(0x80));
        assert_eq!(parse_u8("0XfF"), Ok(0xFF));
        assert_eq!(parse_u8("128"), Ok(128));
        assert!(parse_u8("256").is_err());
        assert!(parse_u8("0x1FF").is_err());
        assert!(parse_u8("zz").is_err());
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "spipwm", "run", "s.json", "--watch", "0x04", "--watch", "48", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Run { watch, .. } => assert_eq!(watch, vec![0x04, 48]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["spipwm", "measure", "--duty", "0x80", "--bit", "8"]).is_err());
    }

    #[test]
    fn test_save_state_defaults_next_to_scenario() {
        let cli = Cli::try_parse_from(["spipwm", "run", "dir/s.json", "--save-state"]).unwrap();
        match cli.command {
            Commands::Run { scenario, save_state, .. } => {
                assert_eq!(save_state_path(&scenario, save_state), Some(PathBuf::from("dir/s.state")));
            }
            other => panic!("unexpected {:?}", other),
        }
        let cli =
            Cli::try_parse_from(["spipwm", "run", "s.json", "--save-state", "out.bin"]).unwrap();
        match cli.command {
            Commands::Run { scenario, save_state, .. } => {
                assert_eq!(save_state_path(&scenario, save_state), Some(PathBuf::from("out.bin")));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(save_state_path(Path::new("s.json"), None), None);
    }

    #[test]
    fn test_regs_diff_against_state() {
        let mut dut = Peripheral::new();
        let mut state = dut.save_state();
        state.registers = [0x01, 0x00, 0x01, 0x80];
        let diff = format_regs(&dut, Some(&state));
        assert!(diff.contains("EN_OUT (0x00): 00 → 01"));
        assert!(diff.contains("DUTY (0x04): 00 → 80"));
        assert!(!diff.contains("DIRECT"));

        dut.regs.load_values(state.registers);
        assert!(format_regs(&dut, Some(&state)).contains("no changes"));
        assert!(format_regs(&dut, None).contains("uio_oe = 0x00"));
    }
}
