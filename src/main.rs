//! bit16 - CLI Entry Point
//!
//! Commands:
//! - `bit16 asm -i <source>...` - Assemble to `.bin` images
//! - `bit16 run -i <image.bin>` - Run an image until it halts
//! - `bit16 debug -i <image.bin>` - Interactive debugger
//! - `bit16 disasm <image.bin>` - Disassemble an image

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bit16::asm::{assemble_file, disassemble, load_image, save_image};
use bit16::asm::literal::parse_literal;
use bit16::config::EmulatorConfig;
use bit16::devices::{Device, KeyBuffer, Keyboard, Machine, RunOutcome, Screen};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "bit16")]
#[command(version)]
#[command(about = "Assembler and emulator for a small 16-bit instruction set")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble source files to binary images
    Asm {
        /// Source file to assemble (repeatable)
        #[arg(short, long = "input", required = true)]
        inputs: Vec<PathBuf>,
        /// Pad the image with NOPs to this many KiB
        #[arg(short, long)]
        size: Option<u32>,
        /// Echo the assembled words to the console
        #[arg(short = 'v', long = "print")]
        print: bool,
        /// Also write a clean mnemonic listing (<stem>_clean.txt)
        #[arg(short, long)]
        clean: bool,
        /// Also write the label and constant tables (<stem>.sym.json)
        #[arg(long)]
        symbols: bool,
        /// Directory for output files (default: next to each source)
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },
    /// Run an image until it halts
    Run {
        /// Image to execute (.bin)
        #[arg(short, long)]
        input: PathBuf,
        /// Initial PC (at most 0x7FFF)
        #[arg(short, long, value_parser = parse_address)]
        load_address: Option<u16>,
        /// Cycle ceiling (default: 1000000000)
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Bytes to feed the keyboard, one per interrupt
        #[arg(short, long)]
        keys: Option<String>,
        /// Read the keyboard from the terminal instead
        #[arg(long, conflicts_with = "keys")]
        live_keys: bool,
        /// Print the screen contents after the run
        #[arg(long)]
        show_screen: bool,
        /// Print the final CPU state as JSON
        #[arg(long)]
        dump_state: bool,
        /// JSON configuration file; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,
        /// Log every executed instruction
        #[arg(short, long)]
        trace: bool,
    },
    /// Interactive debugger
    Debug {
        /// Image to debug (.bin)
        #[arg(short, long)]
        input: PathBuf,
        /// Initial PC (at most 0x7FFF)
        #[arg(short, long, value_parser = parse_address, default_value = "0")]
        load_address: u16,
    },
    /// Disassemble an image to readable text
    Disasm {
        /// Image to disassemble (.bin)
        image: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        // Log output would tear the debugger's screen
        Commands::Debug { .. } => {}
        Commands::Run { trace, .. } => init_logging(*trace),
        _ => init_logging(false),
    }

    let result = match cli.command {
        Commands::Asm { inputs, size, print, clean, symbols, out_dir } => {
            let options = AsmOptions { size, print, clean, symbols, out_dir };
            assemble_all(&inputs, &options)
        }
        Commands::Run {
            input,
            load_address,
            max_cycles,
            keys,
            live_keys,
            show_screen,
            dump_state,
            config,
            trace: _,
        } => {
            let overrides = RunOverrides { load_address, max_cycles, keys, show_screen };
            run_image(&input, config.as_deref(), overrides, live_keys, dump_state)
        }
        Commands::Debug { input, load_address } => debug_image(&input, load_address),
        Commands::Disasm { image } => disassemble_image(&image),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(trace: bool) {
    let default = if trace { "trace" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_address(text: &str) -> Result<u16, String> {
    parse_literal::<u16>(text).map_err(|e| format!("`{}`: {}", text, e))
}

fn require_bin(path: &Path) -> CliResult {
    if path.extension().and_then(|ext| ext.to_str()) != Some("bin") {
        return Err(format!("{}: expected a .bin image", path.display()).into());
    }
    Ok(())
}

struct AsmOptions {
    size: Option<u32>,
    print: bool,
    clean: bool,
    symbols: bool,
    out_dir: Option<PathBuf>,
}

/// Assemble every input independently; fail if any of them failed.
fn assemble_all(inputs: &[PathBuf], options: &AsmOptions) -> CliResult {
    let mut failed = 0;

    for source in inputs {
        if let Err(e) = assemble_one(source, options) {
            eprintln!("{}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} file(s) failed to assemble", failed, inputs.len()).into());
    }
    Ok(())
}

fn assemble_one(source: &Path, options: &AsmOptions) -> CliResult {
    let program = assemble_file(source)?;
    let image = program.image(options.size)?;

    let stem = source
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| format!("{}: cannot derive an output name", source.display()))?;
    let dir = match &options.out_dir {
        Some(dir) => dir.clone(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };

    let bin_path = dir.join(format!("{}.bin", stem));
    save_image(&bin_path, &image)?;
    println!("✓ {} → {} ({} words)", source.display(), bin_path.display(), image.len());

    if options.print {
        print!("{}", disassemble(&program.words()));
    }

    if options.clean {
        let clean_path = dir.join(format!("{}_clean.txt", stem));
        std::fs::write(&clean_path, program.listing())
            .map_err(|e| format!("{}: {}", clean_path.display(), e))?;
        println!("✓ Listing saved to {}", clean_path.display());
    }

    if options.symbols {
        let sym_path = dir.join(format!("{}.sym.json", stem));
        let json = serde_json::to_string_pretty(&program.symbols())?;
        std::fs::write(&sym_path, json).map_err(|e| format!("{}: {}", sym_path.display(), e))?;
        println!("✓ Symbols saved to {}", sym_path.display());
    }

    Ok(())
}

struct RunOverrides {
    load_address: Option<u16>,
    max_cycles: Option<u64>,
    keys: Option<String>,
    show_screen: bool,
}

fn run_image(
    path: &Path,
    config_path: Option<&Path>,
    overrides: RunOverrides,
    live_keys: bool,
    dump_state: bool,
) -> CliResult {
    require_bin(path)?;

    let mut config = match config_path {
        Some(config_path) => EmulatorConfig::load(config_path)?,
        None => EmulatorConfig::default(),
    };
    if let Some(addr) = overrides.load_address {
        config.load_address = addr;
    }
    if let Some(max) = overrides.max_cycles {
        config.max_cycles = max;
    }
    if let Some(keys) = overrides.keys {
        config.keyboard_input = keys;
    }
    config.show_screen |= overrides.show_screen;
    config.validate()?;

    let words = load_image(path)?;
    tracing::info!(path = %path.display(), words = words.len(), "image loaded");

    let mut machine = Machine::with_program(&words, config.load_address)?;
    machine.add_device(keyboard(live_keys, &config.keyboard_input)?)?;
    machine.add_device(Box::new(Screen::new(config.screen_refresh)))?;

    let summary = machine.run(config.max_cycles)?;

    println!("━━━ Result ━━━");
    println!("Cycles: {}", summary.cycles);
    println!("State: {:?}", machine.cpu.state);
    println!("{}", machine.cpu.regs);

    if summary.outcome == RunOutcome::CycleLimit {
        println!();
        println!("⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.", config.max_cycles);
    }

    if config.show_screen {
        println!("━━━ Screen ━━━");
        println!("{}", Screen::text(&machine.bus));
    }

    if dump_state {
        println!("{}", serde_json::to_string_pretty(&machine.cpu)?);
    }

    Ok(())
}

fn keyboard(live: bool, scripted: &str) -> Result<Box<dyn Device>, Box<dyn Error>> {
    if live {
        #[cfg(feature = "tui")]
        return Ok(Box::new(Keyboard::new(bit16::devices::TerminalKeys)));
        #[cfg(not(feature = "tui"))]
        return Err("--live-keys needs the `tui` feature".into());
    }
    Ok(Box::new(Keyboard::new(KeyBuffer::from_bytes(scripted.as_bytes()))))
}

#[cfg(feature = "tui")]
fn debug_image(path: &Path, load_address: u16) -> CliResult {
    require_bin(path)?;
    EmulatorConfig { load_address, ..Default::default() }.validate()?;

    let words = load_image(path)?;
    bit16::tui::run_debugger(words, load_address)?;
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn debug_image(_path: &Path, _load_address: u16) -> CliResult {
    Err("the debugger needs the `tui` feature".into())
}

fn disassemble_image(path: &Path) -> CliResult {
    require_bin(path)?;
    let words = load_image(path)?;
    print!("{}", disassemble(&words));
    Ok(())
}
