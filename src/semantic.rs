//! Verificaciones semánticas durante la traducción.
//!
//! La tabla de símbolos registra las variables declaradas y las que han
//! recibido algún valor. Los errores semánticos no detienen la
//! traducción: el traductor los acumula y los reporta al final.

use std::{
    collections::{BTreeSet, HashSet},
    rc::Rc,
};

use thiserror::Error;

use crate::source::{Located, Location};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

/// Distancia de edición máxima para sugerir un nombre.
const MAX_SUGGESTION_DISTANCE: usize = 2;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SemanticError {
    #[error("Symbol `{name}` is undefined{}", suggest(.suggestion))]
    Undefined {
        name: Rc<str>,
        suggestion: Option<Rc<str>>,
    },

    #[error("Redeclaration of `{0}`")]
    Redeclared(Rc<str>),

    #[error("Expected a value, found `{0}`")]
    MissingValue(String),
}

fn suggest(suggestion: &Option<Rc<str>>) -> String {
    match suggestion {
        Some(name) => format!(", did you mean `{}`?", name),
        None => String::new(),
    }
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    declared: HashSet<Rc<str>>,
    defined: BTreeSet<Rc<str>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable::default()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains(name)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    /// Registra una declaración explícita.
    pub fn declare(&mut self, name: &Rc<str>, location: &Location) -> Semantic<()> {
        if !self.declared.insert(Rc::clone(name)) {
            return Err(Located::at(
                SemanticError::Redeclared(Rc::clone(name)),
                location.clone(),
            ));
        }

        Ok(())
    }

    /// Registra que la variable recibió un valor.
    pub fn define(&mut self, name: &Rc<str>) {
        self.defined.insert(Rc::clone(name));
    }

    /// Verifica que una variable leída haya sido declarada o asignada.
    pub fn lookup(&self, name: &Rc<str>, location: &Location) -> Semantic<()> {
        if self.is_defined(name) || self.is_declared(name) {
            return Ok(());
        }

        Err(self.undefined(name, location))
    }

    /// Verifica que el destino de una asignación haya sido declarado.
    pub fn check_declared(&self, name: &Rc<str>, location: &Location) -> Semantic<()> {
        if self.is_declared(name) {
            return Ok(());
        }

        Err(self.undefined(name, location))
    }

    fn undefined(&self, name: &Rc<str>, location: &Location) -> Located<SemanticError> {
        let known: BTreeSet<&Rc<str>> = self.declared.iter().chain(&self.defined).collect();
        let error = SemanticError::Undefined {
            name: Rc::clone(name),
            suggestion: closest(name, known),
        };

        Located::at(error, location.clone())
    }
}

/// Nombre más parecido entre los candidatos, sin distinguir mayúsculas.
///
/// Ante un empate gana el menor en orden lexicográfico.
pub fn closest<'a, I>(name: &str, candidates: I) -> Option<Rc<str>>
where
    I: IntoIterator<Item = &'a Rc<str>>,
{
    let name = name.to_lowercase();
    candidates
        .into_iter()
        .map(|candidate| (levenshtein(&name, &candidate.to_lowercase()), candidate))
        .filter(|&(distance, _)| distance <= MAX_SUGGESTION_DISTANCE)
        .min_by(|(left, a), (right, b)| left.cmp(right).then_with(|| a.cmp(b)))
        .map(|(_, candidate)| Rc::clone(candidate))
}

/// Distancia de edición entre dos cadenas, por caracteres.
pub fn levenshtein(left: &str, right: &str) -> usize {
    let right: Vec<char> = right.chars().collect();
    let mut previous: Vec<usize> = (0..=right.len()).collect();

    for (i, a) in left.chars().enumerate() {
        let mut current = Vec::with_capacity(right.len() + 1);
        current.push(i + 1);

        for (j, &b) in right.iter().enumerate() {
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            let substitution = previous[j] + usize::from(a != b);
            current.push(insertion.min(deletion).min(substitution));
        }

        previous = current;
    }

    previous[right.len()]
}
