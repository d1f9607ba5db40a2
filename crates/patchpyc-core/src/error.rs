//! Erreurs communes du cœur patchpyc.

use std::io;

use thiserror::Error;

use crate::version::CodeShape;

/// Résultat commun au cœur.
pub type PycResult<T> = std::result::Result<T, PycError>;

/// Erreurs de décodage, de réécriture et d'E/S.
///
/// Aucune n'est transitoire : un fichier refusé le restera tant qu'il n'aura
/// pas été reproduit par la bonne version de CPython.
#[derive(Debug, Error)]
pub enum PycError {
    /// Magic number inconnu ou différent de la cible configurée.
    #[error("incompatible format: found magic {found}, expected {expected}")]
    IncompatibleFormat {
        /// Magic lu dans le fichier (u16 LE + suffixe), en hexadécimal.
        found: String,
        /// Ce que la cible attendait (version ou liste de magics).
        expected: String,
    },

    /// En-tête tronqué, flux marshal invalide, octets en trop, racine non-code.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// Arité du code object différente de celle de la version cible.
    #[error("shape mismatch: target expects {expected} code objects, got {found}")]
    ShapeMismatch {
        /// Forme imposée par la version cible.
        expected: CodeShape,
        /// Forme portée par le code object.
        found: CodeShape,
    },

    /// I/O hôte (ouverture, lecture, écriture).
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

impl PycError {
    /// Construit une erreur « conteneur malformé ».
    pub fn malformed(msg: impl Into<String>) -> Self { PycError::MalformedContainer(msg.into()) }
}
