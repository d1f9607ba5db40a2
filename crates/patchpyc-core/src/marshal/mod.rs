//! Codec marshal (format de sérialisation des `.pyc`).
//!
//! Format :
//! ```text
//! objet = type[1] payload
//!   type & 0x80 = FLAG_REF (3.4+) : l'objet reçoit un index de référence
//!   'r' idx:u32        → objet déjà vu (3.4+)
//!   'R' idx:u32        → chaîne internée déjà vue (2.7)
//!   'c' …              → code object (arité selon la version)
//! ```
//!
//! Le décodeur résout toutes les références et produit un arbre ; l'encodeur
//! n'en émet aucune (tout est écrit en ligne), ce que CPython relit sans
//! différence.

/// Code objects et parcours.
pub mod code;
/// Décodeur.
pub mod decode;
/// Encodeur.
pub mod encode;
/// Arbre de valeurs.
pub mod value;

pub use code::{CodeObject, UnitIter};
pub use decode::{decode, decode_code, Decoder, EXPANSION_LIMIT, MAX_DEPTH};
pub use encode::{encode, encode_code, Encoder};
pub use value::{PyLong, PyStr, StrKind, Value};

/* ─────────────────────────── Type-codes ─────────────────────────── */

pub(crate) const TYPE_NULL: u8 = b'0';
pub(crate) const TYPE_NONE: u8 = b'N';
pub(crate) const TYPE_FALSE: u8 = b'F';
pub(crate) const TYPE_TRUE: u8 = b'T';
pub(crate) const TYPE_STOPITER: u8 = b'S';
pub(crate) const TYPE_ELLIPSIS: u8 = b'.';
pub(crate) const TYPE_INT: u8 = b'i';
pub(crate) const TYPE_INT64: u8 = b'I';
pub(crate) const TYPE_FLOAT: u8 = b'f';
pub(crate) const TYPE_BINARY_FLOAT: u8 = b'g';
pub(crate) const TYPE_COMPLEX: u8 = b'x';
pub(crate) const TYPE_BINARY_COMPLEX: u8 = b'y';
pub(crate) const TYPE_LONG: u8 = b'l';
pub(crate) const TYPE_STRING: u8 = b's';
pub(crate) const TYPE_INTERNED: u8 = b't';
pub(crate) const TYPE_STRINGREF: u8 = b'R';
pub(crate) const TYPE_REF: u8 = b'r';
pub(crate) const TYPE_TUPLE: u8 = b'(';
pub(crate) const TYPE_LIST: u8 = b'[';
pub(crate) const TYPE_DICT: u8 = b'{';
pub(crate) const TYPE_CODE: u8 = b'c';
pub(crate) const TYPE_UNICODE: u8 = b'u';
pub(crate) const TYPE_SET: u8 = b'<';
pub(crate) const TYPE_FROZENSET: u8 = b'>';
pub(crate) const TYPE_ASCII: u8 = b'a';
pub(crate) const TYPE_ASCII_INTERNED: u8 = b'A';
pub(crate) const TYPE_SMALL_TUPLE: u8 = b')';
pub(crate) const TYPE_SHORT_ASCII: u8 = b'z';
pub(crate) const TYPE_SHORT_ASCII_INTERNED: u8 = b'Z';

pub(crate) const FLAG_REF: u8 = 0x80;

/// Base des chiffres des entiers longs marshal.
pub(crate) const LONG_DIGIT_LIMIT: u16 = 1 << 15;
