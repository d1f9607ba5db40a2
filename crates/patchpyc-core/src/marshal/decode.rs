//! Décodeur marshal : octets → [`Value`], références résolues.

use log::debug;

use crate::bytes::ByteReader;
use crate::error::{PycError, PycResult};
use crate::version::FormatVersion;

use super::code::CodeObject;
use super::value::{PyLong, PyStr, StrKind, Value};
use super::*;

/// Profondeur d'imbrication maximale acceptée.
pub const MAX_DEPTH: usize = 1000;

/// Poids décodé maximal, en multiple de la taille du flux.
///
/// Chaque objet pèse 1 plus la taille de son contenu ; une référence `r`/`R`
/// pèse ce que pèse sa cible. Sans borne, des références imbriquées
/// doublent le résultat à chaque niveau.
pub const EXPANSION_LIMIT: usize = 32;

/// Plancher du budget, pour les petits flux.
const MIN_BUDGET: usize = 4096;

/// Décodeur séquentiel sur un flux marshal complet.
#[derive(Debug)]
pub struct Decoder<'a> {
    r: ByteReader<'a>,
    version: FormatVersion,
    /// Slots `FLAG_REF` (3.4+) avec leur poids ; `None` tant que l'objet est en cours de lecture.
    refs: Vec<Option<(Value, usize)>>,
    /// Chaînes `t` vues jusqu'ici (cible des `R` en 2.7).
    interned: Vec<PyStr>,
    depth: usize,
    /// Poids produit jusqu'ici.
    weight: usize,
    budget: usize,
}

impl<'a> Decoder<'a> {
    /// Construit un décodeur pour le dialecte de `version`.
    pub fn new(data: &'a [u8], version: FormatVersion) -> Self {
        Self {
            r: ByteReader::new(data),
            version,
            refs: Vec::new(),
            interned: Vec::new(),
            depth: 0,
            weight: 0,
            budget: data.len().saturating_mul(EXPANSION_LIMIT).max(MIN_BUDGET),
        }
    }

    /// Offset courant.
    pub fn offset(&self) -> usize { self.r.offset() }

    /// Lit un objet non-NULL.
    pub fn read_value(&mut self) -> PycResult<Value> {
        let at = self.r.offset();
        self.read_object()?
            .ok_or_else(|| PycError::malformed(format!("unexpected NULL object at offset {at}")))
    }

    /// Vérifie qu'il ne reste rien après le dernier objet lu.
    pub fn finish(self) -> PycResult<()> {
        if self.r.remaining() > 0 {
            return Err(PycError::malformed(format!(
                "{} trailing bytes after marshal data at offset {}",
                self.r.remaining(),
                self.r.offset()
            )));
        }
        debug!(
            "marshal: decoded {} bytes ({} refs, {} interned)",
            self.r.offset(),
            self.refs.len(),
            self.interned.len()
        );
        Ok(())
    }

    fn read_object(&mut self) -> PycResult<Option<Value>> {
        if self.depth >= MAX_DEPTH {
            return Err(PycError::malformed(format!(
                "object nesting deeper than {MAX_DEPTH} levels at offset {}",
                self.r.offset()
            )));
        }
        self.depth += 1;
        let out = self.read_object_inner();
        self.depth -= 1;
        out
    }

    fn read_object_inner(&mut self) -> PycResult<Option<Value>> {
        let at = self.r.offset();
        let byte = self.r.read_u8()?;
        let flagged = byte & FLAG_REF != 0;
        if flagged && !self.version.uses_refs() {
            return Err(PycError::malformed(format!(
                "reference flag on type byte 0x{byte:02x} at offset {at} (not valid for CPython {})",
                self.version
            )));
        }
        let code = byte & !FLAG_REF;

        // Singletons et références : jamais de slot.
        match code {
            TYPE_NULL => return Ok(None),
            TYPE_NONE => return Ok(Some(Value::None)),
            TYPE_TRUE => return Ok(Some(Value::True)),
            TYPE_FALSE => return Ok(Some(Value::False)),
            TYPE_STOPITER => return Ok(Some(Value::StopIteration)),
            TYPE_ELLIPSIS => return Ok(Some(Value::Ellipsis)),
            TYPE_REF if self.version.uses_refs() => return self.read_ref(at).map(Some),
            TYPE_STRINGREF if self.version.is_python2() => return self.read_stringref(at).map(Some),
            _ => {}
        }

        // Slot réservé avant les enfants (ordre préfixe, comme CPython).
        let slot = flagged.then(|| {
            self.refs.push(None);
            (self.refs.len() - 1, self.weight)
        });

        let value = match code {
            TYPE_INT => Value::Int(self.r.read_i32_le()?),
            TYPE_INT64 => Value::Int64(self.r.read_i64_le()?),
            TYPE_LONG => Value::Long(self.read_long()?),
            TYPE_BINARY_FLOAT => Value::BinaryFloat(u64::from_le_bytes(self.r.read_array()?)),
            TYPE_FLOAT => Value::TextFloat(self.read_short_blob()?),
            TYPE_BINARY_COMPLEX => {
                let re = u64::from_le_bytes(self.r.read_array()?);
                let im = u64::from_le_bytes(self.r.read_array()?);
                Value::BinaryComplex(re, im)
            }
            TYPE_COMPLEX => {
                let re = self.read_short_blob()?;
                let im = self.read_short_blob()?;
                Value::TextComplex(re, im)
            }
            TYPE_STRING => Value::Str(self.read_string(StrKind::Bytes)?),
            TYPE_INTERNED => {
                let s = self.read_string(StrKind::Interned)?;
                if self.version.is_python2() {
                    self.interned.push(s.clone());
                }
                Value::Str(s)
            }
            TYPE_UNICODE => Value::Str(self.read_string(StrKind::Unicode)?),
            TYPE_ASCII => Value::Str(self.read_string(StrKind::Ascii)?),
            TYPE_ASCII_INTERNED => Value::Str(self.read_string(StrKind::AsciiInterned)?),
            TYPE_SHORT_ASCII => Value::Str(self.read_short_string(StrKind::Ascii)?),
            TYPE_SHORT_ASCII_INTERNED => Value::Str(self.read_short_string(StrKind::AsciiInterned)?),
            TYPE_TUPLE => {
                let n = self.read_len("tuple")?;
                Value::Tuple(self.read_items(n)?)
            }
            TYPE_SMALL_TUPLE => {
                let n = usize::from(self.r.read_u8()?);
                Value::Tuple(self.read_items(n)?)
            }
            TYPE_LIST => {
                let n = self.read_len("list")?;
                Value::List(self.read_items(n)?)
            }
            TYPE_SET => {
                let n = self.read_len("set")?;
                Value::Set(self.read_items(n)?)
            }
            TYPE_FROZENSET => {
                let n = self.read_len("frozenset")?;
                Value::FrozenSet(self.read_items(n)?)
            }
            TYPE_DICT => Value::Dict(self.read_dict()?),
            TYPE_CODE => Value::Code(Box::new(self.read_code()?)),
            other => {
                return Err(PycError::malformed(format!(
                    "unknown type code 0x{other:02x} at offset {at} for CPython {}",
                    self.version
                )))
            }
        };

        self.charge(1 + payload_len(&value), at)?;
        if let Some((slot, start)) = slot {
            self.refs[slot] = Some((value.clone(), self.weight - start));
        }
        Ok(Some(value))
    }

    fn read_ref(&mut self, at: usize) -> PycResult<Value> {
        let raw = self.r.read_i32_le()?;
        let idx = usize::try_from(raw).ok().filter(|&i| i < self.refs.len());
        match idx.map(|i| (i, self.refs[i].as_ref().map(|(_, w)| *w))) {
            Some((i, Some(weight))) => {
                // budget vérifié avant la copie
                self.charge(weight, at)?;
                Ok(self.refs[i].as_ref().map_or(Value::None, |(v, _)| v.clone()))
            }
            Some((_, None)) => Err(PycError::malformed(format!(
                "reference {raw} at offset {at} points to an object still being decoded"
            ))),
            None => Err(PycError::malformed(format!("invalid reference index {raw} at offset {at}"))),
        }
    }

    fn read_stringref(&mut self, at: usize) -> PycResult<Value> {
        let raw = self.r.read_i32_le()?;
        let idx = usize::try_from(raw)
            .ok()
            .filter(|&i| i < self.interned.len())
            .ok_or_else(|| PycError::malformed(format!("invalid string reference {raw} at offset {at}")))?;
        self.charge(1 + self.interned[idx].as_bytes().len(), at)?;
        Ok(Value::Str(self.interned[idx].clone()))
    }

    fn charge(&mut self, weight: usize, at: usize) -> PycResult<()> {
        self.weight = self.weight.saturating_add(weight);
        if self.weight > self.budget {
            return Err(PycError::malformed(format!(
                "decoded data expands beyond {EXPANSION_LIMIT}x its input size at offset {at}"
            )));
        }
        Ok(())
    }

    fn read_len(&mut self, what: &str) -> PycResult<usize> {
        let at = self.r.offset();
        let n = self.r.read_i32_le()?;
        usize::try_from(n)
            .map_err(|_| PycError::malformed(format!("negative {what} length {n} at offset {at}")))
    }

    fn read_string(&mut self, kind: StrKind) -> PycResult<PyStr> {
        let n = self.read_len("string")?;
        Ok(PyStr::new(kind, self.r.read_bytes(n)?))
    }

    fn read_short_string(&mut self, kind: StrKind) -> PycResult<PyStr> {
        let n = usize::from(self.r.read_u8()?);
        Ok(PyStr::new(kind, self.r.read_bytes(n)?))
    }

    fn read_short_blob(&mut self) -> PycResult<Vec<u8>> {
        let n = usize::from(self.r.read_u8()?);
        Ok(self.r.read_bytes(n)?.to_vec())
    }

    fn read_long(&mut self) -> PycResult<PyLong> {
        let at = self.r.offset();
        let size = self.r.read_i32_le()?;
        let n = size.unsigned_abs() as usize;
        if n > self.r.remaining() / 2 {
            return Err(PycError::malformed(format!("long with {n} digits at offset {at} exceeds data")));
        }
        let mut digits = Vec::with_capacity(n);
        for _ in 0..n {
            let d = self.r.read_u16_le()?;
            if d >= LONG_DIGIT_LIMIT {
                return Err(PycError::malformed(format!("digit out of range in long at offset {at}")));
            }
            digits.push(d);
        }
        if digits.last() == Some(&0) {
            return Err(PycError::malformed(format!("unnormalized long data at offset {at}")));
        }
        Ok(PyLong { size, digits })
    }

    fn read_items(&mut self, n: usize) -> PycResult<Vec<Value>> {
        // chaque objet occupe au moins un octet
        if n > self.r.remaining() {
            return Err(PycError::malformed(format!(
                "sequence of {n} items at offset {} exceeds data",
                self.r.offset()
            )));
        }
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            items.push(self.read_value()?);
        }
        Ok(items)
    }

    fn read_dict(&mut self) -> PycResult<Vec<(Value, Value)>> {
        let mut pairs = Vec::new();
        while let Some(key) = self.read_object()? {
            let value = self.read_value()?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    fn read_code(&mut self) -> PycResult<CodeObject> {
        let shape = self.version.code_shape();
        let argcount = self.r.read_i32_le()?;
        let kwonlyargcount =
            if shape.has_kwonlyargcount() { Some(self.r.read_i32_le()?) } else { None };
        let nlocals = self.r.read_i32_le()?;
        let stacksize = self.r.read_i32_le()?;
        let flags = self.r.read_i32_le()?;
        let code = self.read_str_field("co_code")?;
        let consts = self.read_tuple_field("co_consts")?;
        let names = self.read_names_field("co_names")?;
        let varnames = self.read_names_field("co_varnames")?;
        let freevars = self.read_names_field("co_freevars")?;
        let cellvars = self.read_names_field("co_cellvars")?;
        let filename = self.read_str_field("co_filename")?;
        let name = self.read_str_field("co_name")?;
        let firstlineno = self.r.read_i32_le()?;
        let lnotab = self.read_str_field("co_lnotab")?;

        Ok(CodeObject {
            argcount,
            kwonlyargcount,
            nlocals,
            stacksize,
            flags,
            code,
            consts,
            names,
            varnames,
            freevars,
            cellvars,
            filename,
            name,
            firstlineno,
            lnotab,
        })
    }

    fn read_str_field(&mut self, field: &str) -> PycResult<PyStr> {
        match self.read_value()? {
            Value::Str(s) => Ok(s),
            other => Err(PycError::malformed(format!("{field} must be a string, got {}", other.type_name()))),
        }
    }

    fn read_tuple_field(&mut self, field: &str) -> PycResult<Vec<Value>> {
        match self.read_value()? {
            Value::Tuple(items) => Ok(items),
            other => Err(PycError::malformed(format!("{field} must be a tuple, got {}", other.type_name()))),
        }
    }

    fn read_names_field(&mut self, field: &str) -> PycResult<Vec<PyStr>> {
        self.read_tuple_field(field)?
            .into_iter()
            .map(|v| match v {
                Value::Str(s) => Ok(s),
                other => Err(PycError::malformed(format!(
                    "{field} entries must be strings, got {}",
                    other.type_name()
                ))),
            })
            .collect()
    }
}

/// Octets portés par l'objet lui-même, hors enfants.
fn payload_len(value: &Value) -> usize {
    match value {
        Value::Str(s) => s.as_bytes().len(),
        Value::TextFloat(b) => b.len(),
        Value::TextComplex(re, im) => re.len() + im.len(),
        Value::Long(l) => l.digits.len() * 2,
        _ => 0,
    }
}

/// Décode exactement un objet ; les octets restants sont une erreur.
///
/// Récursif : jusqu'à [`MAX_DEPTH`] niveaux demandent une pile bien plus grande
/// que celle d'un thread par défaut en build debug.
pub fn decode(data: &[u8], version: FormatVersion) -> PycResult<Value> {
    let mut d = Decoder::new(data, version);
    let value = d.read_value()?;
    d.finish()?;
    Ok(value)
}

/// Décode un flux dont la racine doit être un code object.
pub fn decode_code(data: &[u8], version: FormatVersion) -> PycResult<CodeObject> {
    match decode(data, version)? {
        Value::Code(code) => Ok(*code),
        other => Err(PycError::malformed(format!(
            "root object is a {}, expected a code object",
            other.type_name()
        ))),
    }
}

/* ─────────────────────────── Tests ─────────────────────────── */
