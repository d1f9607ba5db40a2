//! patchpyc-core — réécriture de `co_filename` dans les `.pyc` CPython
//!
//! Fournit :
//! - `FormatVersion` / `Target` : versions supportées (2.7, 3.0 … 3.7) et gate du magic
//! - `marshal` : arbre de valeurs, décodeur (références résolues) et encodeur
//! - `PycCodec` / `Container` : en-tête versionné + racine
//! - `Rewriter` / `rewrite` : copie de l'arbre avec un nouveau nom de fichier
//! - `patch_file` : décodage → réécriture → encodage
//! - Erreurs `PycError` + alias `PycResult<T>`

#![deny(missing_docs)]

/* ─────────────────────────── Modules publics ─────────────────────────── */

/// Lecture/écriture little-endian en mémoire.
pub mod bytes;
/// Conteneur `.pyc`.
pub mod container;
/// Erreurs du cœur.
pub mod error;
/// Format marshal.
pub mod marshal;
/// Réécriture de l'arbre.
pub mod rewrite;
/// Versions et magics.
pub mod version;

pub use container::{Container, Header, HeaderField, PycCodec};
pub use error::{PycError, PycResult};
pub use marshal::{CodeObject, PyStr, StrKind, Value};
pub use rewrite::{rewrite, RewriteStats, Rewriter};
pub use version::{CodeShape, FormatVersion, HeaderFieldKind, Target};

use std::path::Path;

use log::{debug, info};

/* ─────────────────────────── Orchestration ─────────────────────────── */

/// Résumé d'un patch réussi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    /// Version du fichier traité.
    pub version: FormatVersion,
    /// Nombre de code objects réécrits.
    pub units: usize,
    /// Profondeur maximale de l'arbre (racine = 0).
    pub max_depth: usize,
}

/// Décode `old`, réécrit tous les `co_filename` en `new_filename`, écrit `new`.
///
/// `old` et `new` peuvent désigner le même fichier : la lecture est complète
/// avant que l'écriture ne tronque la destination.
pub fn patch_file(
    codec: &PycCodec,
    old: impl AsRef<Path>,
    new: impl AsRef<Path>,
    new_filename: &str,
) -> PycResult<PatchReport> {
    let (old, new) = (old.as_ref(), new.as_ref());
    let (patched, report) = patch_container(&codec.decode_file(old)?, new_filename)?;
    codec.encode_file(new, &patched)?;
    info!(
        "patched {} → {} ({} units, CPython {})",
        old.display(),
        new.display(),
        report.units,
        report.version
    );
    Ok(report)
}

/// Variante mémoire de [`patch_file`] : renvoie le conteneur réécrit sans rien écrire.
pub fn patch_container(container: &Container, new_filename: &str) -> PycResult<(Container, PatchReport)> {
    let mut rw = Rewriter::new(container.version, new_filename);
    let root = rw.rewrite(&container.root)?;
    let stats = rw.stats();
    debug!("rewrite: {} units, max depth {}", stats.units, stats.max_depth);
    let report = PatchReport { version: container.version, units: stats.units, max_depth: stats.max_depth };
    Ok((container.with_root(root), report))
}

/* ─────────────────────────── Prelude ─────────────────────────── */

/// Prelude pratique.
pub mod prelude {
    pub use crate::container::{Container, PycCodec};
    pub use crate::error::{PycError, PycResult};
    pub use crate::marshal::{CodeObject, PyStr, StrKind, Value};
    pub use crate::rewrite::{rewrite, Rewriter};
    pub use crate::version::{FormatVersion, Target};
    pub use crate::{patch_container, patch_file, PatchReport};
}
