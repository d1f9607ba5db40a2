//! Encodeur marshal : [`Value`] → octets, sans références.

use crate::bytes::ByteWriter;
use crate::error::{PycError, PycResult};
use crate::version::FormatVersion;

use super::code::CodeObject;
use super::decode::MAX_DEPTH;
use super::value::{PyStr, StrKind, Value};
use super::*;

/// Encodeur pour le dialecte d'une version donnée.
#[derive(Debug)]
pub struct Encoder {
    w: ByteWriter,
    version: FormatVersion,
    depth: usize,
}

impl Encoder {
    /// Crée un encodeur vide.
    pub fn new(version: FormatVersion) -> Self { Self { w: ByteWriter::new(), version, depth: 0 } }

    /// Récupère les octets produits.
    pub fn into_vec(self) -> Vec<u8> { self.w.into_vec() }

    /// Écrit un objet (et ses enfants).
    pub fn write_value(&mut self, value: &Value) -> PycResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(PycError::malformed(format!("object nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let out = self.write_value_inner(value);
        self.depth -= 1;
        out
    }

    fn write_value_inner(&mut self, value: &Value) -> PycResult<()> {
        match value {
            Value::None => self.w.write_u8(TYPE_NONE),
            Value::True => self.w.write_u8(TYPE_TRUE),
            Value::False => self.w.write_u8(TYPE_FALSE),
            Value::StopIteration => self.w.write_u8(TYPE_STOPITER),
            Value::Ellipsis => self.w.write_u8(TYPE_ELLIPSIS),
            Value::Int(v) => {
                self.w.write_u8(TYPE_INT);
                self.w.write_i32_le(*v);
            }
            Value::Int64(v) => {
                self.w.write_u8(TYPE_INT64);
                self.w.write_i64_le(*v);
            }
            Value::Long(l) => {
                self.w.write_u8(TYPE_LONG);
                self.w.write_i32_le(l.size);
                for d in &l.digits {
                    self.w.write_u16_le(*d);
                }
            }
            Value::BinaryFloat(bits) => {
                self.w.write_u8(TYPE_BINARY_FLOAT);
                self.w.write_bytes(&bits.to_le_bytes());
            }
            Value::TextFloat(text) => {
                self.w.write_u8(TYPE_FLOAT);
                self.write_short_blob(text)?;
            }
            Value::BinaryComplex(re, im) => {
                self.w.write_u8(TYPE_BINARY_COMPLEX);
                self.w.write_bytes(&re.to_le_bytes());
                self.w.write_bytes(&im.to_le_bytes());
            }
            Value::TextComplex(re, im) => {
                self.w.write_u8(TYPE_COMPLEX);
                self.write_short_blob(re)?;
                self.write_short_blob(im)?;
            }
            Value::Str(s) => self.write_str(s)?,
            Value::Tuple(items) => self.write_tuple(items)?,
            Value::List(items) => self.write_sequence(TYPE_LIST, items)?,
            Value::Set(items) => self.write_sequence(TYPE_SET, items)?,
            Value::FrozenSet(items) => self.write_sequence(TYPE_FROZENSET, items)?,
            Value::Dict(pairs) => {
                self.w.write_u8(TYPE_DICT);
                for (k, v) in pairs {
                    self.write_value(k)?;
                    self.write_value(v)?;
                }
                self.w.write_u8(TYPE_NULL);
            }
            Value::Code(code) => self.write_code(code)?,
        }
        Ok(())
    }

    /// Écrit un code object ; son arité doit être celle de la version.
    pub fn write_code(&mut self, code: &CodeObject) -> PycResult<()> {
        code.check_shape(self.version.code_shape())?;
        self.w.write_u8(TYPE_CODE);
        self.w.write_i32_le(code.argcount);
        if let Some(kwonly) = code.kwonlyargcount {
            self.w.write_i32_le(kwonly);
        }
        self.w.write_i32_le(code.nlocals);
        self.w.write_i32_le(code.stacksize);
        self.w.write_i32_le(code.flags);
        self.write_str(&code.code)?;
        self.write_tuple(&code.consts)?;
        self.write_names(&code.names)?;
        self.write_names(&code.varnames)?;
        self.write_names(&code.freevars)?;
        self.write_names(&code.cellvars)?;
        self.write_str(&code.filename)?;
        self.write_str(&code.name)?;
        self.w.write_i32_le(code.firstlineno);
        self.write_str(&code.lnotab)
    }

    fn write_str(&mut self, s: &PyStr) -> PycResult<()> {
        let short = self.version.uses_refs() && s.len() < 256;
        match s.kind {
            StrKind::Ascii | StrKind::AsciiInterned if !self.version.uses_refs() => {
                self.w.write_u8(TYPE_UNICODE);
                self.write_len(s.len())?;
            }
            StrKind::Ascii if short => self.write_short_len(TYPE_SHORT_ASCII, s.len()),
            StrKind::AsciiInterned if short => self.write_short_len(TYPE_SHORT_ASCII_INTERNED, s.len()),
            StrKind::Ascii => {
                self.w.write_u8(TYPE_ASCII);
                self.write_len(s.len())?;
            }
            StrKind::AsciiInterned => {
                self.w.write_u8(TYPE_ASCII_INTERNED);
                self.write_len(s.len())?;
            }
            StrKind::Bytes => {
                self.w.write_u8(TYPE_STRING);
                self.write_len(s.len())?;
            }
            StrKind::Interned => {
                self.w.write_u8(TYPE_INTERNED);
                self.write_len(s.len())?;
            }
            StrKind::Unicode => {
                self.w.write_u8(TYPE_UNICODE);
                self.write_len(s.len())?;
            }
        }
        self.w.write_bytes(s.as_bytes());
        Ok(())
    }

    fn write_names(&mut self, names: &[PyStr]) -> PycResult<()> {
        self.write_tuple_header(names.len())?;
        for n in names {
            self.write_str(n)?;
        }
        Ok(())
    }

    fn write_tuple(&mut self, items: &[Value]) -> PycResult<()> {
        self.write_tuple_header(items.len())?;
        for item in items {
            self.write_value(item)?;
        }
        Ok(())
    }

    fn write_tuple_header(&mut self, n: usize) -> PycResult<()> {
        if self.version.uses_refs() && n < 256 {
            self.write_short_len(TYPE_SMALL_TUPLE, n);
            Ok(())
        } else {
            self.w.write_u8(TYPE_TUPLE);
            self.write_len(n)
        }
    }

    fn write_sequence(&mut self, code: u8, items: &[Value]) -> PycResult<()> {
        self.w.write_u8(code);
        self.write_len(items.len())?;
        for item in items {
            self.write_value(item)?;
        }
        Ok(())
    }

    fn write_short_blob(&mut self, blob: &[u8]) -> PycResult<()> {
        let n = u8::try_from(blob.len())
            .map_err(|_| PycError::malformed(format!("text number of {} bytes exceeds 255", blob.len())))?;
        self.w.write_u8(n);
        self.w.write_bytes(blob);
        Ok(())
    }

    fn write_short_len(&mut self, code: u8, n: usize) {
        debug_assert!(n < 256);
        self.w.write_u8(code);
        self.w.write_u8(n as u8);
    }

    fn write_len(&mut self, n: usize) -> PycResult<()> {
        let n = i32::try_from(n)
            .map_err(|_| PycError::malformed(format!("object of {n} elements is too large to marshal")))?;
        self.w.write_i32_le(n);
        Ok(())
    }
}

/// Encode une valeur pour `version`.
pub fn encode(value: &Value, version: FormatVersion) -> PycResult<Vec<u8>> {
    let mut e = Encoder::new(version);
    e.write_value(value)?;
    Ok(e.into_vec())
}

/// Encode un code object racine pour `version`.
pub fn encode_code(code: &CodeObject, version: FormatVersion) -> PycResult<Vec<u8>> {
    let mut e = Encoder::new(version);
    e.write_code(code)?;
    Ok(e.into_vec())
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::decode;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_forms_only_from_34() -> PycResult<()> {
        let v = Value::Tuple(vec![Value::Str(PyStr::new(StrKind::Ascii, "ab"))]);
        assert_eq!(encode(&v, FormatVersion::Py36)?, vec![b')', 1, b'z', 2, b'a', b'b']);
        assert_eq!(
            encode(&v, FormatVersion::Py33)?,
            vec![b'(', 1, 0, 0, 0, b'u', 2, 0, 0, 0, b'a', b'b']
        );
        Ok(())
    }

    #[test]
    fn long_ascii_uses_four_byte_length() -> PycResult<()> {
        let text = "x".repeat(300);
        let bytes = encode(&Value::Str(PyStr::new(StrKind::AsciiInterned, text.as_str())), FormatVersion::Py37)?;
        assert_eq!(&bytes[..5], &[b'A', 0x2C, 0x01, 0, 0]);
        assert_eq!(bytes.len(), 5 + 300);
        Ok(())
    }

    #[test]
    fn big_tuple_is_not_small() -> PycResult<()> {
        let v = Value::Tuple(vec![Value::None; 256]);
        let bytes = encode(&v, FormatVersion::Py36)?;
        assert_eq!(&bytes[..5], &[b'(', 0, 1, 0, 0]);
        Ok(())
    }

    #[test]
    fn no_reference_flags_are_written() -> PycResult<()> {
        // flux 3.6 avec FLAG_REF et `r` → réécrit entièrement en ligne
        let data = [0xA9, 2, 0xFA, 3, b'a', b'b', b'c', b'r', 1, 0, 0, 0];
        let v = decode(&data, FormatVersion::Py36)?;
        let out = encode(&v, FormatVersion::Py36)?;
        assert_eq!(out, vec![b')', 2, b'z', 3, b'a', b'b', b'c', b'z', 3, b'a', b'b', b'c']);
        assert!(out.iter().all(|b| b & FLAG_REF == 0));
        Ok(())
    }

    #[test]
    fn dict_is_null_terminated() -> PycResult<()> {
        let v = Value::Dict(vec![(Value::Int(1), Value::False)]);
        assert_eq!(encode(&v, FormatVersion::Py27)?, vec![b'{', b'i', 1, 0, 0, 0, b'F', b'0']);
        Ok(())
    }

    #[test]
    fn text_numbers_keep_their_spelling() -> PycResult<()> {
        let v = Value::TextComplex(b"1.0".to_vec(), b"-2".to_vec());
        let bytes = encode(&v, FormatVersion::Py27)?;
        assert_eq!(bytes, vec![b'x', 3, b'1', b'.', b'0', 2, b'-', b'2']);
        assert_eq!(decode(&bytes, FormatVersion::Py27)?, v);
        Ok(())
    }
}
