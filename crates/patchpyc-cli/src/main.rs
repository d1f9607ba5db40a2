//! `patchpyc` — réécrit `co_filename` dans un `.pyc`
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation du logger, et
//! délégation à `patchpyc_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::Result;
use clap::{error::ErrorKind, ArgAction, Parser};

use patchpyc_cli as cli;
use patchpyc_core::Target;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "patchpyc", version, about = "Rewrite co_filename in every code object of a .pyc file", long_about = None)]
struct Opt {
    /// .pyc à lire
    oldpyc: PathBuf,

    /// .pyc à écrire (peut être le même fichier)
    newpyc: PathBuf,

    /// Nouveau chemin source enregistré dans les code objects
    newpath: String,

    /// Version CPython attendue (auto, 2.7, 3.0 … 3.7)
    #[arg(long, env = "PATCHPYC_TARGET", default_value = "auto")]
    target: Target,

    /// Écrire dans un fichier temporaire puis renommer
    #[arg(long)]
    atomic: bool,

    /// Décoder et réécrire sans écrire la sortie
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

fn main() -> ExitCode {
    let opt = match Opt::try_parse() {
        Ok(opt) => opt,
        Err(e) if is_usage_error(e.kind()) => {
            let prog = std::env::args_os()
                .next()
                .map_or_else(|| "patchpyc".to_owned(), |p| p.to_string_lossy().into_owned());
            println!("{}", cli::usage(&prog));
            return ExitCode::from(1);
        },
        Err(e) => e.exit(),
    };
    if let Err(e) = real_main(opt) {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

/// Mauvais nombre d'arguments positionnels.
fn is_usage_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::MissingRequiredArgument | ErrorKind::UnknownArgument | ErrorKind::TooManyValues
    )
}

fn real_main(opt: Opt) -> Result<()> {
    cli::init_logger(cli::level_for(opt.verbose, opt.quiet));

    let task = cli::PatchTask {
        input: opt.oldpyc,
        output: opt.newpyc,
        new_filename: opt.newpath,
        target: opt.target,
        atomic: opt.atomic,
        dry_run: opt.dry_run,
    };
    cli::execute(&task)?;
    Ok(())
}
