//! Conteneur `.pyc` : en-tête versionné + flux marshal.
//!
//! ```text
//! magic[4] (flags[4] 3.7+) mtime[4] (size[4] 3.3+) marshal…
//! ```
//!
//! Les champs d'en-tête sont recopiés tels quels ; seule la racine est
//! décodée/réencodée.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::error::{PycError, PycResult};
use crate::marshal::{decode_code, encode_code, CodeObject};
use crate::version::{hex_tag, FormatVersion, HeaderFieldKind, Target};

/// Bit « hash-based » du champ flags (PEP 552).
const FLAG_HASH_BASED: u32 = 0b01;

/* ─────────────────────────── En-tête ─────────────────────────── */

/// Un champ d'en-tête de 4 octets, gardé brut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderField {
    /// Nature du champ.
    pub kind: HeaderFieldKind,
    /// Octets tels que lus.
    pub raw: [u8; 4],
}

impl HeaderField {
    /// Valeur little-endian du champ.
    pub fn as_u32(&self) -> u32 { LittleEndian::read_u32(&self.raw) }
}

/// En-tête complet, dans l'ordre du fichier (magic compris).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Champs dans l'ordre.
    pub fields: Vec<HeaderField>,
}

impl Header {
    /// Sérialise l'en-tête (concaténation des champs).
    pub fn to_bytes(&self) -> Vec<u8> { self.fields.iter().flat_map(|f| f.raw).collect() }

    /// Longueur en octets.
    pub fn len(&self) -> usize { self.fields.len() * 4 }

    /// Vrai si aucun champ.
    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Premier champ de cette nature.
    pub fn field(&self, kind: HeaderFieldKind) -> Option<&HeaderField> {
        self.fields.iter().find(|f| f.kind == kind)
    }

    /// Horodatage de la source, s'il existe (absent des pyc « hash-based »).
    pub fn mtime(&self) -> Option<u32> { self.field(HeaderFieldKind::Mtime).map(HeaderField::as_u32) }

    /// Taille de la source (3.3+).
    pub fn source_size(&self) -> Option<u32> {
        self.field(HeaderFieldKind::SourceSize).map(HeaderField::as_u32)
    }
}

/// Un fichier `.pyc` décodé.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Version résolue à la lecture.
    pub version: FormatVersion,
    /// En-tête recopié tel quel à l'écriture.
    pub header: Header,
    /// Code object racine (le module).
    pub root: CodeObject,
}

impl Container {
    /// Même conteneur, autre racine.
    pub fn with_root(&self, root: CodeObject) -> Self {
        Self { version: self.version, header: self.header.clone(), root }
    }
}

/* ─────────────────────────── Codec ─────────────────────────── */

/// Lecture/écriture de conteneurs pour une [`Target`] donnée.
#[derive(Debug, Clone, Copy, Default)]
pub struct PycCodec {
    target: Target,
}

impl PycCodec {
    /// Codec acceptant les fichiers conformes à `target`.
    pub const fn new(target: Target) -> Self { Self { target } }

    /// Cible configurée.
    pub const fn target(&self) -> Target { self.target }

    /// Décode depuis un lecteur.
    ///
    /// Seuls les 4 octets du magic sont consommés si celui-ci est refusé.
    pub fn decode_reader<R: Read>(&self, mut reader: R) -> PycResult<Container> {
        let mut tag = [0u8; 4];
        read_header_field(&mut reader, &mut tag, HeaderFieldKind::Magic)?;
        let version = self.target.resolve(tag).ok_or_else(|| PycError::IncompatibleFormat {
            found: hex_tag(tag),
            expected: self.target.describe(),
        })?;
        debug!("container: magic {} → CPython {version}", hex_tag(tag));

        let mut fields = vec![HeaderField { kind: HeaderFieldKind::Magic, raw: tag }];
        let mut hash_based = false;
        if version.has_flags_field() {
            let mut raw = [0u8; 4];
            read_header_field(&mut reader, &mut raw, HeaderFieldKind::Flags)?;
            hash_based = LittleEndian::read_u32(&raw) & FLAG_HASH_BASED != 0;
            fields.push(HeaderField { kind: HeaderFieldKind::Flags, raw });
        }
        let mut kinds = vec![];
        if hash_based {
            kinds.extend([HeaderFieldKind::SourceHash, HeaderFieldKind::SourceHash]);
        } else {
            kinds.push(HeaderFieldKind::Mtime);
            if version.has_source_size() {
                kinds.push(HeaderFieldKind::SourceSize);
            }
        }
        for kind in kinds {
            let mut raw = [0u8; 4];
            read_header_field(&mut reader, &mut raw, kind)?;
            fields.push(HeaderField { kind, raw });
        }
        let header = Header { fields };
        debug_assert_eq!(header.len(), version.header_len());

        let mut body = Vec::new();
        reader.read_to_end(&mut body)?;
        let root = decode_code(&body, version)?;
        debug!("container: {} header bytes, {} marshal bytes", header.len(), body.len());
        Ok(Container { version, header, root })
    }

    /// Décode un fichier ; le descripteur est fermé avant le retour.
    pub fn decode_file(&self, path: impl AsRef<Path>) -> PycResult<Container> {
        let file = File::open(path.as_ref())?;
        self.decode_reader(file)
    }

    /// Décode une image mémoire.
    pub fn decode_bytes(&self, data: &[u8]) -> PycResult<Container> { self.decode_reader(data) }

    /// Sérialise un conteneur en mémoire.
    pub fn encode_to_vec(&self, container: &Container) -> PycResult<Vec<u8>> {
        let mut out = container.header.to_bytes();
        out.extend(encode_code(&container.root, container.version)?);
        Ok(out)
    }

    /// Écrit un conteneur (fichier tronqué, écriture tamponnée puis vidée).
    pub fn encode_file(&self, path: impl AsRef<Path>, container: &Container) -> PycResult<()> {
        let bytes = self.encode_to_vec(container)?;
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        w.write_all(&bytes)?;
        w.flush()?;
        Ok(())
    }
}

fn read_header_field<R: Read>(reader: &mut R, buf: &mut [u8; 4], kind: HeaderFieldKind) -> PycResult<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => PycError::malformed(format!("header truncated in {kind:?} field")),
        _ => PycError::Io(e),
    })
}

/* ─────────────────────────── Tests ─────────────────────────── */
