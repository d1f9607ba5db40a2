//! Code objects (une portée lexicale compilée).

use crate::error::{PycError, PycResult};
use crate::version::CodeShape;

use super::value::{PyStr, Value};

/// Code object tel que sérialisé par marshal.
///
/// Les champs entiers sont gardés bruts (i32 signés) ; `kwonlyargcount` n'existe
/// que pour la forme Python 3. `consts` peut contenir d'autres code objects :
/// c'est l'arête récursive de l'arbre.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeObject {
    /// co_argcount
    pub argcount: i32,
    /// co_kwonlyargcount (Python 3 uniquement)
    pub kwonlyargcount: Option<i32>,
    /// co_nlocals
    pub nlocals: i32,
    /// co_stacksize
    pub stacksize: i32,
    /// co_flags
    pub flags: i32,
    /// co_code : instructions brutes.
    pub code: PyStr,
    /// co_consts
    pub consts: Vec<Value>,
    /// co_names
    pub names: Vec<PyStr>,
    /// co_varnames
    pub varnames: Vec<PyStr>,
    /// co_freevars
    pub freevars: Vec<PyStr>,
    /// co_cellvars
    pub cellvars: Vec<PyStr>,
    /// co_filename : le seul champ réécrit par patchpyc.
    pub filename: PyStr,
    /// co_name
    pub name: PyStr,
    /// co_firstlineno
    pub firstlineno: i32,
    /// co_lnotab
    pub lnotab: PyStr,
}

impl CodeObject {
    /// Forme portée par ce code object.
    pub const fn shape(&self) -> CodeShape {
        if self.kwonlyargcount.is_some() {
            CodeShape::Python3
        } else {
            CodeShape::Python2
        }
    }

    /// Vérifie que l'arité correspond à `expected`.
    pub fn check_shape(&self, expected: CodeShape) -> PycResult<()> {
        let found = self.shape();
        if found == expected {
            Ok(())
        } else {
            Err(PycError::ShapeMismatch { expected, found })
        }
    }

    /// Code objects imbriqués directement dans `consts`.
    pub fn nested(&self) -> impl Iterator<Item = &CodeObject> + '_ {
        self.consts.iter().filter_map(Value::as_code)
    }

    /// Parcours préfixe de l'arbre (self compris), sans récursion.
    pub fn iter_units(&self) -> UnitIter<'_> { UnitIter { stack: vec![(self, 0)] } }
}

/// Itérateur préfixe renvoyé par [`CodeObject::iter_units`] : `(depth, &unit)`.
pub struct UnitIter<'a> {
    stack: Vec<(&'a CodeObject, usize)>,
}

impl<'a> Iterator for UnitIter<'a> {
    type Item = (usize, &'a CodeObject);

    fn next(&mut self) -> Option<Self::Item> {
        let (unit, depth) = self.stack.pop()?;
        let before = self.stack.len();
        self.stack.extend(unit.nested().map(|c| (c, depth + 1)));
        self.stack[before..].reverse();
        Some((depth, unit))
    }
}
