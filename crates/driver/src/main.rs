use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser as _;
use tracing::info;

#[derive(clap::Parser, Debug)]
#[command(
    name = "rv32cc",
    about = "rv32cc: compiles a C subset to RV32 assembly",
    version
)]
struct Cli {
    /// Input C file (`-` reads standard input)
    input: PathBuf,
    /// Write assembly to FILE instead of standard output
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
    /// Print each declaration's AST to standard error
    #[arg(long = "dump-ast")]
    dump_ast: bool,
    /// Print the token stream to standard error before parsing
    #[arg(long = "dump-tokens")]
    dump_tokens: bool,
    /// More logging (-v debug, -vv trace); RV32CC_LOG overrides
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // usage errors exit 1; --help and --version are not errors
            let _ = e.print();
            return if e.use_stderr() { ExitCode::from(1) } else { ExitCode::SUCCESS };
        }
    };
    init_tracing(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("RV32CC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Whole input, newline-terminated.
fn read_source(path: &Path) -> Result<String> {
    let mut src = if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("failed to read standard input")?;
        buf
    } else {
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    if !src.ends_with('\n') {
        src.push('\n');
    }
    Ok(src)
}

fn dump_tokens(src: &str) -> Result<()> {
    for tok in lex::tokenize(src)? {
        let (line, col) = lex::line_col(src, tok.span.start);
        eprintln!("{}:{}\t{:?}\t{}", line, col, tok.kind, tok.text);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let src = read_source(&cli.input)?;
    let file_name = if cli.input.as_os_str() == "-" {
        "<stdin>".to_string()
    } else {
        cli.input.display().to_string()
    };
    info!(input = %file_name, bytes = src.len(), "compiling");

    if cli.dump_tokens {
        dump_tokens(&src)?;
    }

    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => {
            let file = fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(io::BufWriter::new(file))
        }
        None => Box::new(io::stdout().lock()),
    };

    // Assembly is written declaration by declaration; a later error does not
    // retract what was already emitted.
    let dump_ast = cli.dump_ast;
    backend::compile_to(&src, &file_name, &mut out, |decl| {
        if dump_ast {
            eprintln!("{}", decl);
        }
    })?;
    out.flush().context("failed to write assembly")?;
    Ok(())
}
