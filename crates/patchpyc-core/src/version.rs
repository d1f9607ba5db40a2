//! Table des versions CPython supportées (l'« oracle » de compatibilité).
//!
//! Tout ce qui dépend de la version est résolu ici, une seule fois, au moment
//! où le magic number est lu :
//! - disposition de l'en-tête (`flags` en 3.7+, `source size` en 3.3+) ;
//! - dialecte marshal (références `FLAG_REF` / `r` et formes courtes en 3.4+) ;
//! - arité des code objects (`kwonlyargcount` en Python 3).
//!
//! Python 3.8 ajoute `posonlyargcount` : volontairement non supporté.

use core::fmt;
use core::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// Suffixe fixe des magic numbers CPython.
pub const MAGIC_SUFFIX: [u8; 2] = *b"\r\n";

/// Forme (arité) d'un code object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeShape {
    /// argcount, nlocals, stacksize, flags, … (pas de kwonlyargcount).
    Python2,
    /// argcount, kwonlyargcount, nlocals, stacksize, flags, …
    Python3,
}

impl CodeShape {
    /// Vrai si le champ `kwonlyargcount` fait partie de la forme.
    pub const fn has_kwonlyargcount(self) -> bool { matches!(self, CodeShape::Python3) }
}

impl fmt::Display for CodeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeShape::Python2 => f.write_str("python2-shaped"),
            CodeShape::Python3 => f.write_str("python3-shaped"),
        }
    }
}

/// Nature d'un champ d'en-tête (toujours 4 octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderFieldKind {
    /// Magic number : u16 LE + `\r\n`.
    Magic,
    /// Bits de validation PEP 552 (3.7+).
    Flags,
    /// Horodatage de la source.
    Mtime,
    /// Taille de la source modulo 2³² (3.3+).
    SourceSize,
    /// Moitié du hash SipHash de la source (pyc « hash-based », 3.7+).
    SourceHash,
}

/// Versions CPython dont le format `.pyc` est supporté.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatVersion {
    /// CPython 2.7
    Py27,
    /// CPython 3.0
    Py30,
    /// CPython 3.1
    Py31,
    /// CPython 3.2
    Py32,
    /// CPython 3.3
    Py33,
    /// CPython 3.4
    Py34,
    /// CPython 3.5
    Py35,
    /// CPython 3.6
    Py36,
    /// CPython 3.7
    Py37,
}

impl FormatVersion {
    /// Toutes les versions, de la plus ancienne à la plus récente.
    pub const ALL: [FormatVersion; 9] = [
        FormatVersion::Py27,
        FormatVersion::Py30,
        FormatVersion::Py31,
        FormatVersion::Py32,
        FormatVersion::Py33,
        FormatVersion::Py34,
        FormatVersion::Py35,
        FormatVersion::Py36,
        FormatVersion::Py37,
    ];

    /// Magic numbers (u16) acceptés pour cette version ; le dernier est canonique.
    pub const fn magic_numbers(self) -> &'static [u16] {
        match self {
            FormatVersion::Py27 => &[62211],
            FormatVersion::Py30 => &[3131],
            FormatVersion::Py31 => &[3151],
            FormatVersion::Py32 => &[3180],
            FormatVersion::Py33 => &[3230],
            FormatVersion::Py34 => &[3310],
            // 3.5.0–3.5.1 : 3350, 3.5.2+ : 3351
            FormatVersion::Py35 => &[3350, 3351],
            FormatVersion::Py36 => &[3379],
            FormatVersion::Py37 => &[3394],
        }
    }

    /// Tag canonique (4 octets) écrit par cette version.
    pub fn magic(self) -> [u8; 4] {
        let numbers = self.magic_numbers();
        let n = numbers[numbers.len() - 1];
        let mut out = [0u8; 4];
        LittleEndian::write_u16(&mut out[..2], n);
        out[2..].copy_from_slice(&MAGIC_SUFFIX);
        out
    }

    /// Vrai si `tag` est l'un des magics de cette version.
    pub fn accepts(self, tag: [u8; 4]) -> bool {
        tag[2..] == MAGIC_SUFFIX && self.magic_numbers().contains(&LittleEndian::read_u16(&tag[..2]))
    }

    /// Résout un tag vers la version qui l'a produit.
    pub fn from_magic(tag: [u8; 4]) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.accepts(tag))
    }

    /// Champ `flags` (PEP 552) présent ?
    pub const fn has_flags_field(self) -> bool { matches!(self, FormatVersion::Py37) }

    /// Champ `source size` présent ?
    pub const fn has_source_size(self) -> bool {
        matches!(
            self,
            FormatVersion::Py33
                | FormatVersion::Py34
                | FormatVersion::Py35
                | FormatVersion::Py36
                | FormatVersion::Py37
        )
    }

    /// Longueur totale de l'en-tête, en octets.
    pub const fn header_len(self) -> usize {
        let mut n = 8;
        if self.has_flags_field() {
            n += 4;
        }
        if self.has_source_size() {
            n += 4;
        }
        n
    }

    /// Dialecte marshal ≥ 3 : `FLAG_REF`, `r`, `a`/`z`/`)`…
    pub const fn uses_refs(self) -> bool {
        matches!(
            self,
            FormatVersion::Py34 | FormatVersion::Py35 | FormatVersion::Py36 | FormatVersion::Py37
        )
    }

    /// Vrai pour la famille Python 2 (chaînes `str` = octets).
    pub const fn is_python2(self) -> bool { matches!(self, FormatVersion::Py27) }

    /// Arité des code objects pour cette version.
    pub const fn code_shape(self) -> CodeShape {
        if self.is_python2() {
            CodeShape::Python2
        } else {
            CodeShape::Python3
        }
    }

    /// Libellé `major.minor`.
    pub const fn as_str(self) -> &'static str {
        match self {
            FormatVersion::Py27 => "2.7",
            FormatVersion::Py30 => "3.0",
            FormatVersion::Py31 => "3.1",
            FormatVersion::Py32 => "3.2",
            FormatVersion::Py33 => "3.3",
            FormatVersion::Py34 => "3.4",
            FormatVersion::Py35 => "3.5",
            FormatVersion::Py36 => "3.6",
            FormatVersion::Py37 => "3.7",
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Version cible passée au codec à la construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    /// Déduite du magic du fichier lu (toute version supportée).
    #[default]
    Auto,
    /// Le fichier doit avoir été produit par exactement cette version.
    Exact(FormatVersion),
}

impl Target {
    /// Résout la version à partir du tag lu, ou `None` si incompatible.
    pub fn resolve(self, tag: [u8; 4]) -> Option<FormatVersion> {
        match self {
            Target::Auto => FormatVersion::from_magic(tag),
            Target::Exact(v) => v.accepts(tag).then_some(v),
        }
    }

    /// Description de ce qui est attendu (pour les messages d'erreur).
    pub fn describe(self) -> String {
        match self {
            Target::Auto => {
                let all: Vec<&str> = FormatVersion::ALL.iter().map(|v| v.as_str()).collect();
                format!("one of CPython {}", all.join(", "))
            }
            Target::Exact(v) => format!("CPython {v} ({})", hex_tag(v.magic())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Auto => f.write_str("auto"),
            Target::Exact(v) => write!(f, "{v}"),
        }
    }
}

/// Cible inconnue (`--target` / `PATCHPYC_TARGET`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown target `{0}` (expected `auto` or one of 2.7, 3.0 … 3.7)")]
pub struct ParseTargetError(pub String);

impl FromStr for Target {
    type Err = ParseTargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Target::Auto);
        }
        let wanted = s.strip_prefix("py").unwrap_or(s);
        FormatVersion::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .map(Target::Exact)
            .ok_or_else(|| ParseTargetError(s.to_owned()))
    }
}

/// Formate un tag en hexadécimal (`0x33 0x0d 0x0d 0x0a`).
pub fn hex_tag(tag: [u8; 4]) -> String {
    format!("0x{:02x} 0x{:02x} 0x{:02x} 0x{:02x}", tag[0], tag[1], tag[2], tag[3])
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_magics_match_cpython() {
        assert_eq!(FormatVersion::Py27.magic(), [0x03, 0xf3, 0x0d, 0x0a]);
        assert_eq!(FormatVersion::Py36.magic(), [0x33, 0x0d, 0x0d, 0x0a]);
        assert_eq!(FormatVersion::Py37.magic(), [0x42, 0x0d, 0x0d, 0x0a]);
    }

    #[test]
    fn every_magic_resolves_to_its_version() {
        for v in FormatVersion::ALL {
            assert_eq!(FormatVersion::from_magic(v.magic()), Some(v));
        }
        assert_eq!(FormatVersion::from_magic([0x16, 0x0d, 0x0d, 0x0a]), Some(FormatVersion::Py35));
    }

    #[test]
    fn python38_is_rejected() {
        // 3413 = CPython 3.8
        assert_eq!(FormatVersion::from_magic([0x55, 0x0d, 0x0d, 0x0a]), None);
    }

    #[test]
    fn suffix_is_part_of_the_tag() {
        let mut tag = FormatVersion::Py36.magic();
        tag[3] = 0;
        assert!(!FormatVersion::Py36.accepts(tag));
    }

    #[test]
    fn header_layouts() {
        assert_eq!(FormatVersion::Py27.header_len(), 8);
        assert_eq!(FormatVersion::Py32.header_len(), 8);
        assert_eq!(FormatVersion::Py33.header_len(), 12);
        assert_eq!(FormatVersion::Py36.header_len(), 12);
        assert_eq!(FormatVersion::Py37.header_len(), 16);
    }

    #[test]
    fn shapes_and_dialects() {
        assert_eq!(FormatVersion::Py27.code_shape(), CodeShape::Python2);
        assert_eq!(FormatVersion::Py30.code_shape(), CodeShape::Python3);
        assert!(!FormatVersion::Py33.uses_refs());
        assert!(FormatVersion::Py34.uses_refs());
    }

    #[test]
    fn exact_target_does_not_cross_versions() {
        let t = Target::Exact(FormatVersion::Py36);
        assert_eq!(t.resolve(FormatVersion::Py36.magic()), Some(FormatVersion::Py36));
        assert_eq!(t.resolve(FormatVersion::Py37.magic()), None);
        assert_eq!(Target::Auto.resolve(FormatVersion::Py37.magic()), Some(FormatVersion::Py37));
    }

    #[test]
    fn parse_targets() {
        assert_eq!("auto".parse::<Target>(), Ok(Target::Auto));
        assert_eq!("3.6".parse::<Target>(), Ok(Target::Exact(FormatVersion::Py36)));
        assert_eq!("py2.7".parse::<Target>(), Ok(Target::Exact(FormatVersion::Py27)));
        assert!("3.8".parse::<Target>().is_err());
    }
}
