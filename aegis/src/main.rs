#![forbid(unsafe_code)]

mod manifest;
mod report;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use aegis_ast::{Diagnostic, Diagnostics, SourceFile};
use aegis_core::{CompileOutput, Compiler, SourceUnit};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, miette};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const SOURCE_EXT: &str = "ae";
const LOG_ENV: &str = "AEGIS_LOG";

#[derive(Parser, Debug)]
#[command(name = "aegis", version, about = "Aegis compiler front end")]
struct Cli {
    /// Raise log verbosity (repeatable). `AEGIS_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Deepest nesting the parser accepts. Overrides `aegis.toml`.
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Lex, parse, check and lower every unit; report diagnostics
    Check {
        /// Source files or directories (default: manifest sources, else `.`)
        paths: Vec<PathBuf>,

        /// Print a JSON report on stdout instead of rendered diagnostics
        #[arg(long)]
        json: bool,
    },

    /// Print the lowered IR of every unit
    Ir {
        /// Source files or directories (default: manifest sources, else `.`)
        paths: Vec<PathBuf>,

        /// Write the IR to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Dump the token stream of one file, layout tokens included
    Tokens {
        path: PathBuf,
    },

    /// Pretty-print one file
    Fmt {
        path: PathBuf,

        /// Fail if the file is not already formatted
        #[arg(long)]
        check: bool,

        /// Rewrite the file in place
        #[arg(long)]
        write: bool,
    },
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Cmd::Check { paths, json } => {
            let (compiler, units) = prepare(&paths, cli.max_depth)?;
            let out = compiler.compile_units(&units);
            if json {
                let report = report::check_report(&out);
                println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
            } else {
                render_output(&units, &out);
            }
            finish(&out)?;
            if !json {
                println!("checked {} unit(s)", out.units.len());
            }
            Ok(())
        }

        Cmd::Ir { paths, out: out_path } => {
            let (compiler, units) = prepare(&paths, cli.max_depth)?;
            let out = compiler.compile_units(&units);
            render_output(&units, &out);
            finish(&out)?;

            let mut text = String::new();
            for (i, ir) in out.units.iter().filter_map(|u| u.ir.as_ref()).enumerate() {
                if i > 0 {
                    text.push('\n');
                }
                text.push_str(&ir.to_string());
            }
            match out_path {
                Some(p) => {
                    fs::write(&p, text).into_diagnostic()?;
                    info!(path = %display_path(&p), "wrote IR");
                }
                None => print!("{text}"),
            }
            Ok(())
        }

        Cmd::Tokens { path } => {
            let text = read_source(&path)?;
            let file = SourceFile::new(display_path(&path), text.clone());
            let lexed = aegis_lex::Lexer::new(&text).lex();
            for t in &lexed.tokens {
                let shown = if t.lexeme.is_empty() {
                    t.kind.describe()
                } else {
                    t.lexeme.clone()
                };
                println!("{}:{}\t{:?}\t{shown}", t.pos.line, t.pos.column, t.kind.category());
            }

            let diags = Diagnostics::new();
            for e in &lexed.errors {
                diags.report(&file, e);
            }
            fail_on(&file, diags.into_sorted())
        }

        Cmd::Fmt { path, check, write } => {
            let resolved = manifest::load_resolved_manifest(&path)?;
            let config = resolved.compiler_config(cli.max_depth)?;
            let text = read_source(&path)?;
            let file = SourceFile::new(display_path(&path), text.clone());

            let parsed = aegis_parse::parse_with_recovery(&text, config.max_depth);
            let diags = Diagnostics::new();
            for e in &parsed.lex_errors {
                diags.report(&file, e);
            }
            for e in &parsed.parse_errors {
                diags.report(&file, e);
            }
            fail_on(&file, diags.into_sorted())?;

            let formatted = aegis_parse::format_program(&parsed.program);
            if check {
                if formatted != text {
                    return Err(miette!("{} is not formatted", file.name));
                }
                return Ok(());
            }

            if write {
                fs::write(&path, formatted).into_diagnostic()?;
                return Ok(());
            }

            print!("{formatted}");
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolves the manifest, builds the compiler configuration and reads every
/// source file named on the command line (or by the manifest).
fn prepare(
    paths: &[PathBuf],
    max_depth: Option<usize>,
) -> miette::Result<(Compiler, Vec<SourceUnit>)> {
    let start = paths.first().cloned().unwrap_or_else(|| PathBuf::from("."));
    let resolved = manifest::load_resolved_manifest(&start)?;
    if let Some(m) = &resolved.manifest_path {
        debug!(manifest = %display_path(m), "loaded manifest");
    }
    let config = resolved.compiler_config(max_depth)?;

    let roots = if !paths.is_empty() {
        paths.to_vec()
    } else if !resolved.sources.is_empty() {
        resolved.sources.clone()
    } else {
        vec![resolved.project_root.clone()]
    };

    let files = collect_sources(&roots)?;
    if files.is_empty() {
        return Err(miette!("no `.{SOURCE_EXT}` files found"));
    }

    let units = files
        .iter()
        .map(|f| Ok(SourceUnit::new(display_path(f), read_source(f)?)))
        .collect::<miette::Result<Vec<_>>>()?;
    info!(units = units.len(), max_depth = config.max_depth, "compiling");
    Ok((Compiler::new(config), units))
}

fn collect_sources(roots: &[PathBuf]) -> miette::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for root in roots {
        if root.is_dir() {
            walk_dir(root, &mut out)?;
        } else if root.is_file() {
            out.push(root.clone());
        } else {
            return Err(miette!("no such file or directory: {}", display_path(root)));
        }
    }
    let mut seen = HashSet::new();
    out.retain(|p| seen.insert(p.clone()));
    Ok(out)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> miette::Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .into_diagnostic()?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .into_diagnostic()?;
    entries.sort();

    for path in entries {
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') || n == "target");
        if hidden {
            continue;
        }
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some(SOURCE_EXT) {
            out.push(path);
        }
    }
    Ok(())
}

fn read_source(path: &Path) -> miette::Result<String> {
    fs::read_to_string(path).map_err(|e| miette!("failed to read {}: {e}", display_path(path)))
}

fn render(diag: &Diagnostic, file: Option<&SourceFile>) {
    let report = miette::Report::new(diag.clone());
    match file {
        Some(f) => eprintln!("{:?}", report.with_source_code(f.named_source())),
        None => eprintln!("{report:?}"),
    }
}

fn render_output(units: &[SourceUnit], out: &CompileOutput) {
    let files: HashMap<&str, SourceFile> = units
        .iter()
        .map(|u| (u.name.as_str(), SourceFile::new(u.name.clone(), u.text.clone())))
        .collect();
    for d in &out.diagnostics {
        render(d, files.get(d.file.as_str()));
    }
}

fn finish(out: &CompileOutput) -> miette::Result<()> {
    if out.succeeded() {
        return Ok(());
    }
    let failed = out.units.iter().filter(|u| u.ir.is_none()).count();
    Err(miette!(
        "{} error(s); {failed} of {} unit(s) failed",
        out.error_count(),
        out.units.len()
    ))
}

/// Renders single-file diagnostics and fails if any of them is an error.
fn fail_on(file: &SourceFile, diags: Vec<Diagnostic>) -> miette::Result<()> {
    for d in &diags {
        render(d, Some(file));
    }
    let errors = diags.iter().filter(|d| d.is_error()).count();
    if errors > 0 {
        return Err(miette!("{errors} error(s) in {}", file.name));
    }
    Ok(())
}

fn display_path(p: &Path) -> String {
    p.to_string_lossy().to_string()
}
