//! Réécriture de `co_filename` dans tout un arbre de code objects.

use log::debug;

use crate::error::PycResult;
use crate::marshal::{CodeObject, PyStr, StrKind, Value};
use crate::version::FormatVersion;

/// Compteurs d'une réécriture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Code objects réécrits (racine comprise).
    pub units: usize,
    /// Profondeur maximale rencontrée (racine = 0).
    pub max_depth: usize,
}

/// Réécrit récursivement un arbre pour une version et un nom donnés.
#[derive(Debug)]
pub struct Rewriter<'a> {
    version: FormatVersion,
    filename: &'a str,
    stats: RewriteStats,
}

impl<'a> Rewriter<'a> {
    /// Prépare une réécriture vers `filename`.
    pub fn new(version: FormatVersion, filename: &'a str) -> Self {
        Self { version, filename, stats: RewriteStats::default() }
    }

    /// Compteurs accumulés.
    pub const fn stats(&self) -> RewriteStats { self.stats }

    /// Construit la copie réécrite de `unit` ; l'original n'est pas modifié.
    pub fn rewrite(&mut self, unit: &CodeObject) -> PycResult<CodeObject> { self.rewrite_at(unit, 0) }

    fn rewrite_at(&mut self, unit: &CodeObject, depth: usize) -> PycResult<CodeObject> {
        self.stats.units += 1;
        self.stats.max_depth = self.stats.max_depth.max(depth);

        let consts = unit
            .consts
            .iter()
            .map(|c| match c {
                Value::Code(inner) => self.rewrite_at(inner, depth + 1).map(Value::from),
                other => Ok(other.clone()),
            })
            .collect::<PycResult<Vec<_>>>()?;

        let rebuilt = CodeObject {
            argcount: unit.argcount,
            kwonlyargcount: unit.kwonlyargcount,
            nlocals: unit.nlocals,
            stacksize: unit.stacksize,
            flags: unit.flags,
            code: unit.code.clone(),
            consts,
            names: unit.names.clone(),
            varnames: unit.varnames.clone(),
            freevars: unit.freevars.clone(),
            cellvars: unit.cellvars.clone(),
            filename: filename_for(self.version, &unit.filename, self.filename),
            name: unit.name.clone(),
            firstlineno: unit.firstlineno,
            lnotab: unit.lnotab.clone(),
        };
        rebuilt.check_shape(self.version.code_shape())?;
        debug!(
            "rewrite: {} (line {}) at depth {depth}",
            rebuilt.name.to_string_lossy(),
            rebuilt.firstlineno
        );
        Ok(rebuilt)
    }
}

/// Réécrit `unit` et tous ses descendants vers `new_filename`.
pub fn rewrite(unit: &CodeObject, new_filename: &str, version: FormatVersion) -> PycResult<CodeObject> {
    Rewriter::new(version, new_filename).rewrite(unit)
}

/// Chaîne `co_filename` pour `version`, en gardant l'internement de l'ancienne.
pub fn filename_for(version: FormatVersion, old: &PyStr, new: &str) -> PyStr {
    let interned = old.kind.is_interned();
    let kind = if version.is_python2() {
        if interned { StrKind::Interned } else { StrKind::Bytes }
    } else if !version.uses_refs() {
        StrKind::Unicode
    } else if new.is_ascii() {
        if interned { StrKind::AsciiInterned } else { StrKind::Ascii }
    } else if interned {
        StrKind::Interned
    } else {
        StrKind::Unicode
    };
    PyStr::new(kind, new)
}

/* ─────────────────────────── Tests ─────────────────────────── */
