//! IO mémoire little-endian : `ByteReader`, `ByteWriter`.
//!
//! Le flux marshal est entièrement bufferisé avant décodage ; ces deux types
//! travaillent donc sur des slices/vecs, sans `std::io`.

use crate::error::{PycError, PycResult};

/* ─────────────────────────── Byte Writer (LE) ─────────────────────────── */

/// Buffer d’écriture (croît automatiquement).
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Crée un writer vide.
    pub fn new() -> Self { Self { buf: Vec::new() } }
    /// Crée un writer avec une capacité initiale.
    pub fn with_capacity(cap: usize) -> Self { Self { buf: Vec::with_capacity(cap) } }
    /// Accès en lecture au contenu.
    pub fn as_slice(&self) -> &[u8] { &self.buf }
    /// Nombre d'octets écrits.
    pub fn len(&self) -> usize { self.buf.len() }
    /// Vrai si rien n'a été écrit.
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }
    /// Récupère le buffer (consomme).
    pub fn into_vec(self) -> Vec<u8> { self.buf }
    /// Ajoute un octet.
    pub fn write_u8(&mut self, v: u8) { self.buf.push(v); }
    /// Ajoute des octets bruts.
    pub fn write_bytes(&mut self, bytes: &[u8]) { self.buf.extend_from_slice(bytes); }
    /// Écrit un u16 little-endian.
    pub fn write_u16_le(&mut self, v: u16) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    /// Écrit un i32 little-endian.
    pub fn write_i32_le(&mut self, v: i32) { self.buf.extend_from_slice(&v.to_le_bytes()); }
    /// Écrit un i64 little-endian.
    pub fn write_i64_le(&mut self, v: i64) { self.buf.extend_from_slice(&v.to_le_bytes()); }
}

/* ─────────────────────────── Byte Reader (LE) ─────────────────────────── */

/// Lecteur séquentiel sur un slice d’octets (helpers LE).
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    off: usize,
}

impl<'a> ByteReader<'a> {
    /// Construit un lecteur.
    pub fn new(data: &'a [u8]) -> Self { Self { data, off: 0 } }
    /// Offset courant.
    pub fn offset(&self) -> usize { self.off }
    /// Taille restante.
    pub fn remaining(&self) -> usize { self.data.len().saturating_sub(self.off) }

    /// Lit `n` octets (ou erreur si EOF).
    pub fn read_bytes(&mut self, n: usize) -> PycResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(PycError::malformed(format!(
                "unexpected end of data: need {n} bytes at offset {}",
                self.off
            )));
        }
        let start = self.off;
        self.off += n;
        Ok(&self.data[start..self.off])
    }

    /// Lit un octet.
    pub fn read_u8(&mut self) -> PycResult<u8> { Ok(self.read_bytes(1)?[0]) }

    /// Lit un u16 LE.
    pub fn read_u16_le(&mut self) -> PycResult<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Lit un i32 LE.
    pub fn read_i32_le(&mut self) -> PycResult<i32> {
        let b = self.read_bytes(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Lit un i64 LE.
    pub fn read_i64_le(&mut self) -> PycResult<i64> {
        let b = self.read_bytes(8)?;
        Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Lit un tableau de taille fixe.
    pub fn read_array<const N: usize>(&mut self) -> PycResult<[u8; N]> {
        let b = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(b);
        Ok(out)
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_reader_le() -> PycResult<()> {
        let mut w = ByteWriter::new();
        w.write_u8(0x7A);
        w.write_u16_le(0xBEEF);
        w.write_i32_le(-42);
        w.write_i64_le(i64::MIN + 1);
        w.write_bytes(b"CHNK");

        let mut r = ByteReader::new(w.as_slice());
        assert_eq!(r.read_u8()?, 0x7A);
        assert_eq!(r.read_u16_le()?, 0xBEEF);
        assert_eq!(r.read_i32_le()?, -42);
        assert_eq!(r.read_i64_le()?, i64::MIN + 1);
        assert_eq!(&r.read_array::<4>()?, b"CHNK");
        assert_eq!(r.remaining(), 0);
        Ok(())
    }

    #[test]
    fn eof_is_malformed_and_does_not_advance() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        let err = r.read_i32_le().unwrap_err();
        assert!(matches!(err, PycError::MalformedContainer(_)), "{err}");
        assert_eq!(r.offset(), 0);
    }
}
