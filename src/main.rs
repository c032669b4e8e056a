use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use hackchain::{vm, Assembler, Machine, Program, Source};

/// Hackchain translates stack-machine `.vm` programs to Hack assembly, assembles them and runs the result.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.vm`, `.asm` or directory to build
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into `.hack` machine code
    Assemble {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination to output `.hack` file
        dest: Option<PathBuf>,
        /// Print the symbol table after assembling
        #[arg(short, long)]
        symbols: bool,
    },
    /// Translate a `.vm` file or a directory of them into a single `.asm` file
    Translate {
        /// `.vm` file or directory to translate
        name: PathBuf,
        /// Destination to output `.asm` file
        dest: Option<PathBuf>,
        /// Emit code that sets up the stack and calls `Sys.init` (default for directories)
        #[arg(short, long)]
        bootstrap: bool,
        /// Leave out the bootstrap code, even for directories
        #[arg(long, conflicts_with = "bootstrap")]
        no_bootstrap: bool,
        /// Precede each command's code with a comment holding the command
        #[arg(short, long)]
        annotate: bool,
    },
    /// Translate if needed, then assemble into `.hack` machine code
    Build {
        /// `.vm` file, `.asm` file or directory to build
        name: PathBuf,
        /// Destination to output `.hack` file
        dest: Option<PathBuf>,
    },
    /// Check a file or directory for errors without writing output
    Check {
        /// `.vm`, `.asm` or `.hack` file, or directory, to check
        name: PathBuf,
    },
    /// Run a program on the Hack emulator and print the final state
    Run {
        /// `.hack`, `.asm` or `.vm` file, or directory, to run
        name: PathBuf,
        /// Maximum number of instructions to execute
        #[arg(short, long)]
        cycles: Option<u64>,
        /// RAM addresses to print, as `start..end`
        #[arg(short, long, value_parser = parse_range, default_value = "0..16")]
        ram: Range<u16>,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    hackchain::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(hackchain::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Assemble {
                name,
                dest,
                symbols,
            } => {
                file_message(Green, "Assembling", &name);
                let src = Source::read(&name)?;
                let mut asm = Assembler::new();
                let program = asm.assemble(&src)?;
                message(Green, "Finished", &format!("{} instructions", program.len()));
                if symbols {
                    for (name, entry) in asm.symbols().iter() {
                        println!("{:>12} {name} = {}", entry.binding.to_string().cyan(), entry.addr);
                    }
                }
                let dest = dest.unwrap_or_else(|| name.with_extension("hack"));
                write(&dest, &program.to_string())
            }
            Command::Translate {
                name,
                dest,
                bootstrap,
                no_bootstrap,
                annotate,
            } => {
                file_message(Green, "Translating", &name);
                let bootstrap = match (bootstrap, no_bootstrap) {
                    (true, _) => true,
                    (_, true) => false,
                    _ => name.is_dir(),
                };
                let annotate = annotate || hackchain::env::is_annotate_enabled();
                let asm = translate(&name, bootstrap, annotate)?;
                message(Green, "Finished", "translate to assembly");
                let dest = match dest {
                    Some(dest) => dest,
                    None => output_path(&name, "asm")?,
                };
                write(&dest, &asm)
            }
            Command::Build { name, dest } => {
                file_message(Green, "Building", &name);
                let program = build(&name)?;
                message(Green, "Finished", &format!("{} instructions", program.len()));
                let dest = match dest {
                    Some(dest) => dest,
                    None => output_path(&name, "hack")?,
                };
                write(&dest, &program.to_string())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let _ = load(&name)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Run { name, cycles, ram } => run(&name, cycles, ram),
        }
    } else if let Some(path) = args.path {
        file_message(Green, "Building", &path);
        let program = build(&path)?;
        message(Green, "Finished", &format!("{} instructions", program.len()));
        write(&output_path(&path, "hack")?, &program.to_string())
    } else {
        println!("\n~ hackchain v{VERSION} ~");
        println!("{}", LOGO.truecolor(120, 200, 160).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn write(dest: &Path, contents: &str) -> Result<()> {
    fs::write(dest, contents).into_diagnostic()?;
    file_message(MsgColor::Green, "Saved", dest);
    Ok(())
}

/// Kinds of input the toolchain accepts, decided by path.
enum Input {
    Vm(Vec<Source>),
    Asm(Source),
    Hack(Source),
}

impl Input {
    fn read(path: &Path) -> Result<Input> {
        if path.is_dir() {
            return Ok(Input::Vm(vm_sources(path)?));
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("vm") => Ok(Input::Vm(vec![Source::read(path)?])),
            Some("asm") => Ok(Input::Asm(Source::read(path)?)),
            Some("hack") => Ok(Input::Hack(Source::read(path)?)),
            Some(_) => bail!("File has unknown extension. Exiting..."),
            None => bail!("File has no extension. Exiting..."),
        }
    }
}

/// Every `.vm` file directly inside `dir`, sorted by name.
fn vm_sources(dir: &Path) -> Result<Vec<Source>> {
    let pattern = format!("{}/*.vm", glob::Pattern::escape(&dir.to_string_lossy()));
    let mut paths = glob::glob(&pattern)
        .into_diagnostic()?
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;
    if paths.is_empty() {
        bail!("Directory {} contains no `.vm` files", dir.display());
    }
    paths.sort();
    paths.iter().map(|path| Source::read(path)).collect()
}

/// Default output next to the input. A directory `Foo` gets `Foo/Foo.<ext>`.
fn output_path(path: &Path, ext: &str) -> Result<PathBuf> {
    if path.is_dir() {
        let full = fs::canonicalize(path).into_diagnostic()?;
        let Some(stem) = full.file_name() else {
            bail!("Cannot name output for directory {}", path.display());
        };
        Ok(path.join(stem).with_extension(ext))
    } else {
        Ok(path.with_extension(ext))
    }
}

fn translate(path: &Path, bootstrap: bool, annotate: bool) -> Result<String> {
    match Input::read(path)? {
        Input::Vm(sources) => vm::translate(&sources, bootstrap, annotate),
        _ => bail!("Only `.vm` files and directories can be translated"),
    }
}

/// Translate and assemble in memory, bootstrapping whole directories.
fn build(path: &Path) -> Result<Program> {
    load(path)?.ok_or_else(|| miette::miette!("`.hack` files are already built"))
}

/// Run the pipeline up to machine code. `None` for input that already is machine code.
fn load(path: &Path) -> Result<Option<Program>> {
    match Input::read(path)? {
        Input::Vm(sources) => {
            let asm = vm::translate(&sources, path.is_dir(), false)?;
            let src = Source::new(format!("{}.asm", sources_name(path)), asm);
            Ok(Some(Assembler::new().assemble(&src)?))
        }
        Input::Asm(src) => Ok(Some(Assembler::new().assemble(&src)?)),
        Input::Hack(src) => {
            let _ = Program::from_hack(&src)?;
            Ok(None)
        }
    }
}

fn sources_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string())
}

fn run(name: &Path, cycles: Option<u64>, ram: Range<u16>) -> Result<()> {
    file_message(MsgColor::Green, "Loading", name);
    let program = match Input::read(name)? {
        Input::Hack(src) => Program::from_hack(&src)?,
        _ => build(name)?,
    };
    let mut machine = Machine::from_program(&program)?;
    // Single VM files expect the stack to be set up already
    if name.extension().is_some_and(|ext| ext == "vm") {
        machine.poke(0, 256);
    }

    message(MsgColor::Green, "Running", &format!("{} instructions", program.len()));
    let budget = cycles.unwrap_or_else(hackchain::env::cycle_budget);
    let status = machine.run(budget)?;
    let color = match status.exit {
        hackchain::Exit::Budget => MsgColor::Red,
        _ => MsgColor::Green,
    };
    message(color, "Stopped", &format!("{} after {} cycles", status.exit, status.cycles));
    message(
        MsgColor::Cyan,
        "Registers",
        &format!("A={} D={} PC={}", machine.a(), machine.d(), machine.pc()),
    );
    for addr in ram {
        println!("RAM[{addr}] = {}", machine.peek(addr) as i16);
    }
    Ok(())
}

fn parse_range(s: &str) -> Result<Range<u16>, String> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| format!("`{s}` is not a range like 256..260"))?;
    let start: u16 = start.trim().parse().map_err(|_| format!("bad start `{start}`"))?;
    let end: u16 = end.trim().parse().map_err(|_| format!("bad end `{end}`"))?;
    if start > end || end as usize > hackchain::MEMORY_MAX {
        return Err(format!("`{s}` is not within RAM"));
    }
    Ok(start..end)
}

const LOGO: &str = r#"
  _                _          _           _
 | |__   __ _  ___| | __  ___| |__   __ _(_)_ __
 | '_ \ / _` |/ __| |/ / / __| '_ \ / _` | | '_ \
 | | | | (_| | (__|   < | (__| | | | (_| | | | | |
 |_| |_|\__,_|\___|_|\_\ \___|_| |_|\__,_|_|_| |_|"#;

const SHORT_INFO: &str = r"
Welcome to hackchain, a toolchain for the Hack computer:
VM translator, assembler and emulator in one binary.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
