use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use tracing::info;
use vasm::config::JitConfig;
use vasm::jit::probe::{self, AddThunk};
use vasm::jit::{CodePage, HostProcessor};

#[derive(Parser)]
#[command(name = "vasm")]
#[command(about = "JIT code page and calling-convention toolkit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the host calling convention and page size
    Info {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Build, finalize and call an add thunk on this machine
    Probe {
        #[arg(allow_negative_numbers = true)]
        lhs: i64,
        #[arg(allow_negative_numbers = true)]
        rhs: i64,

        /// Configuration file (vasm.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Trace page mapping, writes and finalize
        #[arg(long)]
        trace_jit: bool,
    },
    /// Write disjoint patterns into one page from many threads and verify them
    Stress {
        /// Number of writer threads
        #[arg(long, default_value = "8")]
        threads: usize,

        /// Bytes written per thread
        #[arg(long, default_value = "256")]
        chunk: usize,

        /// Configuration file (vasm.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Trace page mapping, writes and finalize
        #[arg(long)]
        trace_jit: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<JitConfig, String> {
    match path {
        Some(path) => JitConfig::load(path),
        None => Ok(JitConfig::default()),
    }
}

fn hint(config: &JitConfig) -> Option<*const u8> {
    config.placement_hint.map(|addr| addr as *const u8)
}

fn run_info(json: bool) -> Result<(), String> {
    let cpu = HostProcessor::host();
    let report = cpu.describe();
    if json {
        let value = serde_json::json!({
            "abi": report,
            "page_size": CodePage::minimum_page_size(),
        });
        let text = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    let join = |regs: &[vasm::Register]| {
        regs.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
    };
    println!("isa:          {}", report.isa);
    println!("convention:   {}", report.convention);
    println!("int args:     {} ({})", report.int_args.len(), join(&report.int_args));
    println!("float args:   {} ({})", report.float_args.len(), join(&report.float_args));
    println!("int return:   {}", report.int_return);
    println!("float return: {}", report.float_return);
    println!("page size:    {}", CodePage::minimum_page_size());
    Ok(())
}

fn run_probe(lhs: i64, rhs: i64, config: &JitConfig) -> Result<(), String> {
    let cpu = HostProcessor::host();
    let page = CodePage::new(config.page_size, hint(config));
    let offset = probe::install_add_thunk(&cpu, &page).map_err(|e| e.to_string())?;
    page.finalize().map_err(|e| e.to_string())?;

    // SAFETY: the bytes at `offset` are the add thunk for this host.
    let add: AddThunk = unsafe { page.entry(offset) }
        .ok_or_else(|| "thunk is not executable".to_string())?;
    let result = add(lhs, rhs);
    info!(lhs, rhs, result, base = ?page.base(), "probe thunk returned");

    let expected = lhs.wrapping_add(rhs);
    if result != expected {
        return Err(format!("probe returned {}, expected {}", result, expected));
    }
    println!("{}", result);
    Ok(())
}

fn run_stress(threads: usize, chunk: usize, config: &JitConfig) -> Result<(), String> {
    if threads == 0 || chunk == 0 {
        return Err("threads and chunk must be greater than zero".to_string());
    }
    let total = threads
        .checked_mul(chunk)
        .ok_or_else(|| "threads * chunk overflows".to_string())?;
    let page = CodePage::new(total.max(config.page_size), hint(config));

    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let page = page.grab();
            thread::spawn(move || {
                let pattern = vec![pattern_byte(i); chunk];
                page.writer().write_at(i * chunk, &pattern)
            })
        })
        .collect();

    for handle in handles {
        handle
            .join()
            .map_err(|_| "writer thread panicked".to_string())?
            .map_err(|e| e.to_string())?;
    }
    page.finalize().map_err(|e| e.to_string())?;

    for i in 0..threads {
        let bytes = page.read(i * chunk, chunk).map_err(|e| e.to_string())?;
        if let Some(pos) = bytes.iter().position(|&b| b != pattern_byte(i)) {
            return Err(format!("corruption at offset {}", i * chunk + pos));
        }
    }
    println!("ok: {} threads x {} bytes", threads, chunk);
    Ok(())
}

fn pattern_byte(i: usize) -> u8 {
    (i as u8).wrapping_mul(31).wrapping_add(7)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { json } => {
            vasm::logging::init(&JitConfig::default(), false);
            run_info(json)
        }
        Commands::Probe {
            lhs,
            rhs,
            config,
            trace_jit,
        } => load_config(config.as_ref()).and_then(|config| {
            vasm::logging::init(&config, trace_jit);
            run_probe(lhs, rhs, &config)
        }),
        Commands::Stress {
            threads,
            chunk,
            config,
            trace_jit,
        } => load_config(config.as_ref()).and_then(|config| {
            vasm::logging::init(&config, trace_jit);
            run_stress(threads, chunk, &config)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
