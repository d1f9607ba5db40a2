//! Arbre de valeurs marshal, références déjà résolues.

use core::fmt;

use super::code::CodeObject;

/// Façon dont une chaîne était encodée dans le flux d'origine.
///
/// Le contenu est toujours conservé en octets bruts (UTF-8 pour les chaînes
/// texte) ; seul le type-code change selon le genre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrKind {
    /// `s` : `str` en Python 2, `bytes` en Python 3.
    Bytes,
    /// `t` : chaîne internée (octets en Python 2, UTF-8 en Python 3).
    Interned,
    /// `u` : unicode UTF-8.
    Unicode,
    /// `a` / `z` : ASCII (3.4+).
    Ascii,
    /// `A` / `Z` : ASCII interné (3.4+).
    AsciiInterned,
}

impl StrKind {
    /// Vrai si la chaîne était internée.
    pub const fn is_interned(self) -> bool { matches!(self, StrKind::Interned | StrKind::AsciiInterned) }
}

/// Chaîne marshal : genre + octets bruts.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PyStr {
    /// Genre d'encodage.
    pub kind: StrKind,
    /// Contenu brut.
    pub data: Vec<u8>,
}

impl PyStr {
    /// Construit une chaîne.
    pub fn new(kind: StrKind, data: impl Into<Vec<u8>>) -> Self { Self { kind, data: data.into() } }
    /// Raccourci : chaîne d'octets (`s`).
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self { Self::new(StrKind::Bytes, data) }
    /// Contenu lu comme UTF-8 (remplacement des séquences invalides).
    pub fn to_string_lossy(&self) -> String { String::from_utf8_lossy(&self.data).into_owned() }
    /// Contenu brut.
    pub fn as_bytes(&self) -> &[u8] { &self.data }
    /// Longueur en octets.
    pub fn len(&self) -> usize { self.data.len() }
    /// Vrai si vide.
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

impl fmt::Debug for PyStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StrKind::Bytes => write!(f, "b{:?}", self.to_string_lossy()),
            kind => write!(f, "{kind:?}({:?})", self.to_string_lossy()),
        }
    }
}

/// Entier long : nombre de chiffres signé + chiffres de 15 bits (poids faible d'abord).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PyLong {
    /// Nombre de chiffres ; son signe est celui de l'entier.
    pub size: i32,
    /// Chiffres base 2¹⁵.
    pub digits: Vec<u16>,
}

impl PyLong {
    /// Vrai si l'entier est négatif.
    pub const fn is_negative(&self) -> bool { self.size < 0 }
}

/// Valeur marshal quelconque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `N`
    None,
    /// `T`
    True,
    /// `F`
    False,
    /// `S`
    StopIteration,
    /// `.`
    Ellipsis,
    /// `i` : entier 32 bits.
    Int(i32),
    /// `I` : entier 64 bits (Python 2 sur plateformes 64 bits).
    Int64(i64),
    /// `l`
    Long(PyLong),
    /// `g` : flottant binaire (bits IEEE 754).
    BinaryFloat(u64),
    /// `f` : flottant en texte.
    TextFloat(Vec<u8>),
    /// `y` : complexe binaire (réel, imaginaire).
    BinaryComplex(u64, u64),
    /// `x` : complexe en texte.
    TextComplex(Vec<u8>, Vec<u8>),
    /// `s`, `t`, `u`, `a`, `A`, `z`, `Z`
    Str(PyStr),
    /// `(` / `)`
    Tuple(Vec<Value>),
    /// `[`
    List(Vec<Value>),
    /// `{` : paires dans l'ordre du flux.
    Dict(Vec<(Value, Value)>),
    /// `<`
    Set(Vec<Value>),
    /// `>`
    FrozenSet(Vec<Value>),
    /// `c`
    Code(Box<CodeObject>),
}

impl Value {
    /// Flottant binaire depuis un `f64`.
    pub fn float(v: f64) -> Self { Value::BinaryFloat(v.to_bits()) }

    /// Chaîne, si c'en est une.
    pub fn as_str(&self) -> Option<&PyStr> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Code object, si c'en est un.
    pub fn as_code(&self) -> Option<&CodeObject> {
        match self {
            Value::Code(c) => Some(c),
            _ => None,
        }
    }

    /// Nom court du type (messages d'erreur).
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::True | Value::False => "bool",
            Value::StopIteration => "StopIteration",
            Value::Ellipsis => "Ellipsis",
            Value::Int(_) | Value::Int64(_) | Value::Long(_) => "int",
            Value::BinaryFloat(_) | Value::TextFloat(_) => "float",
            Value::BinaryComplex(..) | Value::TextComplex(..) => "complex",
            Value::Str(_) => "str",
            Value::Tuple(_) => "tuple",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::FrozenSet(_) => "frozenset",
            Value::Code(_) => "code",
        }
    }
}

impl From<PyStr> for Value {
    fn from(s: PyStr) -> Self { Value::Str(s) }
}

impl From<CodeObject> for Value {
    fn from(c: CodeObject) -> Self { Value::Code(Box::new(c)) }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self { Value::Int(v) }
}
