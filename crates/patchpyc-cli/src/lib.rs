//! patchpyc-cli — bibliothèque interne du binaire `patchpyc`
//!
//! Le binaire ne fait que parser les arguments et initialiser le logger ;
//! tout le travail (lecture, réécriture, écriture atomique ou non) est ici,
//! testable sans processus.

#![forbid(unsafe_code)]

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    thread,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, info};

use patchpyc_core::{patch_container, patch_file, PatchReport, PycCodec, Target};

// ───────────────────────────── Tâche ─────────────────────────────

/// Un patch à effectuer.
#[derive(Debug, Clone)]
pub struct PatchTask {
    /// `.pyc` à lire.
    pub input: PathBuf,
    /// `.pyc` à écrire (peut être `input`).
    pub output: PathBuf,
    /// Nouveau `co_filename`.
    pub new_filename: String,
    /// Version attendue du fichier d'entrée.
    pub target: Target,
    /// Écrire dans un fichier temporaire voisin puis renommer.
    pub atomic: bool,
    /// Décoder et réécrire sans rien écrire.
    pub dry_run: bool,
}

impl PatchTask {
    /// Tâche par défaut : cible auto, écriture directe.
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, new_filename: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            new_filename: new_filename.into(),
            target: Target::Auto,
            atomic: false,
            dry_run: false,
        }
    }
}

/// Message d'usage (deux lignes séparées par une ligne vide).
pub fn usage(prog: &str) -> String {
    format!("{prog} <oldpyc> <newpyc> <newpath>\n\nRewrite co_filename in every code object of the .pyc file")
}

// ───────────────────────────── Logger ─────────────────────────────

/// Initialise `env_logger` ; `RUST_LOG` l'emporte sur `default_level`.
pub fn init_logger(default_level: &str) {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_secs()
            .try_init();
    }
    #[cfg(not(feature = "trace"))]
    let _ = default_level;
}

/// Niveau de log pour `-v`/`-q`.
pub fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Pile du thread de travail : décodeur et encodeur sont récursifs et
/// descendent jusqu'à `MAX_DEPTH` niveaux, ce qu'une pile principale de
/// 8 Mio ne tient pas en build debug.
pub const WORKER_STACK: usize = 64 * 1024 * 1024;

/// Exécute un patch sur un thread dédié de [`WORKER_STACK`] octets de pile.
pub fn execute(task: &PatchTask) -> Result<PatchReport> {
    let owned = task.clone();
    thread::Builder::new()
        .name("patchpyc".into())
        .stack_size(WORKER_STACK)
        .spawn(move || run(&owned))
        .context("lancement du thread de travail")?
        .join()
        .map_err(|_| anyhow!("le thread de travail a paniqué"))?
}

fn run(task: &PatchTask) -> Result<PatchReport> {
    let codec = PycCodec::new(task.target);
    debug!(
        "patch: {} → {} (target {}, atomic={}, dry_run={})",
        display(&task.input),
        display(&task.output),
        task.target,
        task.atomic,
        task.dry_run
    );

    if !task.atomic && !task.dry_run {
        return patch_file(&codec, &task.input, &task.output, &task.new_filename)
            .with_context(|| format!("patch de {} vers {}", display(&task.input), display(&task.output)));
    }

    let container = codec.decode_file(&task.input).with_context(|| format!("lecture de {}", display(&task.input)))?;
    let (patched, report) = patch_container(&container, &task.new_filename)?;
    let bytes = codec.encode_to_vec(&patched).context("encodage du .pyc réécrit")?;

    if task.dry_run {
        info!(
            "dry-run: {} units réécrits, {} octets non écrits dans {}",
            report.units,
            bytes.len(),
            display(&task.output)
        );
        return Ok(report);
    }

    write_bytes_atomic(&task.output, &bytes).with_context(|| format!("écriture de {}", display(&task.output)))?;
    info!("patched {} → {} ({} units, atomic)", display(&task.input), display(&task.output), report.units);
    Ok(report)
}

// ───────────────────────────── Écriture atomique ─────────────────────────────

fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        Some(_) => Path::new("."),
        None => return Err(anyhow!("chemin de sortie sans parent: {}", display(path))),
    };
    let base = path.file_name().ok_or_else(|| anyhow!("chemin de sortie sans nom: {}", display(path)))?;
    let tmp = unique_tmp_path(parent, base);
    commit(&tmp, path, |f| {
        let mut w = BufWriter::new(f);
        w.write_all(bytes)?;
        w.flush()
    })?;
    Ok(())
}

/// Remplit `tmp` puis le renomme en `path` ; en cas d'échec, `tmp` est supprimé.
fn commit(tmp: &Path, path: &Path, fill: impl FnOnce(File) -> io::Result<()>) -> io::Result<()> {
    let file = File::create(tmp)?;
    if let Err(e) = fill(file).and_then(|()| fs::rename(tmp, path)) {
        let _ = fs::remove_file(tmp);
        return Err(e);
    }
    Ok(())
}

fn unique_tmp_path(dir: &Path, base: &std::ffi::OsStr) -> PathBuf {
    let mut i = 0u32;
    loop {
        let candidate = dir.join(format!(".{}.tmp{}", base.to_string_lossy(), i));
        if !candidate.exists() {
            return candidate;
        }
        i = i.wrapping_add(1);
    }
}

fn display(p: &Path) -> String {
    p.to_string_lossy().to_string()
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use patchpyc_core::{CodeObject, FormatVersion, PyStr, StrKind, Value};
    use pretty_assertions::assert_eq;

    fn module_pyc(version: FormatVersion) -> Vec<u8> {
        let root = CodeObject {
            argcount: 0,
            kwonlyargcount: Some(0),
            nlocals: 0,
            stacksize: 1,
            flags: 0x40,
            code: PyStr::bytes(vec![0x64, 0x00, 0x53, 0x00]),
            consts: vec![Value::None],
            names: vec![],
            varnames: vec![],
            freevars: vec![],
            cellvars: vec![],
            filename: PyStr::new(StrKind::Ascii, "/old/m.py"),
            name: PyStr::new(StrKind::AsciiInterned, "<module>"),
            firstlineno: 1,
            lnotab: PyStr::bytes(vec![]),
        };
        let mut out = version.magic().to_vec();
        out.resize(version.header_len(), 0);
        out.extend(patchpyc_core::marshal::encode_code(&root, version).unwrap());
        out
    }

    #[test]
    fn levels() {
        assert_eq!(level_for(0, false), "warn");
        assert_eq!(level_for(2, false), "debug");
        assert_eq!(level_for(9, false), "trace");
        assert_eq!(level_for(3, true), "error");
    }

    #[test]
    fn usage_has_two_lines() {
        let u = usage("patchpyc");
        let lines: Vec<&str> = u.lines().collect();
        assert_eq!(lines[0], "patchpyc <oldpyc> <newpyc> <newpath>");
        assert_eq!(lines[1], "");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn dry_run_writes_nothing() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("m.pyc");
        let output = dir.path().join("out.pyc");
        fs::write(&input, module_pyc(FormatVersion::Py36))?;
        let task = PatchTask { dry_run: true, ..PatchTask::new(&input, &output, "/new/m.py") };
        let report = execute(&task)?;
        assert_eq!(report.units, 1);
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn atomic_leaves_no_temporary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("m.pyc");
        fs::write(&input, module_pyc(FormatVersion::Py37))?;
        let task = PatchTask { atomic: true, ..PatchTask::new(&input, &input, "/new/m.py") };
        execute(&task)?;
        let names: Vec<_> = fs::read_dir(dir.path())?.map(|e| e.map(|e| e.file_name())).collect::<Result<_, _>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("m.pyc")]);
        let patched = fs::read(&input)?;
        assert!(patched.windows(9).any(|w| w == b"/new/m.py"));
        Ok(())
    }

    fn entries(dir: &Path) -> io::Result<Vec<std::ffi::OsString>> {
        let mut names: Vec<_> = fs::read_dir(dir)?.map(|e| e.map(|e| e.file_name())).collect::<Result<_, _>>()?;
        names.sort();
        Ok(names)
    }

    #[test]
    fn failed_write_removes_the_temporary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("out.pyc");
        let tmp = unique_tmp_path(dir.path(), "out.pyc".as_ref());
        let err = commit(&tmp, &out, |mut f| {
            f.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::WriteZero, "disk full"))
        })
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
        assert_eq!(entries(dir.path())?, Vec::<std::ffi::OsString>::new());
        Ok(())
    }

    #[test]
    fn failed_rename_removes_the_temporary() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // une cible qui est un répertoire non vide refuse le rename
        let out = dir.path().join("out.pyc");
        fs::create_dir(&out)?;
        fs::write(out.join("keep"), b"x")?;
        assert!(write_bytes_atomic(&out, b"data").is_err());
        assert_eq!(entries(dir.path())?, vec![std::ffi::OsString::from("out.pyc")]);
        Ok(())
    }

    #[test]
    fn failures_carry_the_path() {
        let task = PatchTask::new("/nonexistent/a.pyc", "/nonexistent/b.pyc", "x.py");
        let err = execute(&task).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/a.pyc"));
    }
}
