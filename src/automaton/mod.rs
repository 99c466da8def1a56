//! Compilación de reglas léxicas a un autómata determinista.
//!
//! Cada regla es un par (tipo de token, patrón). Los patrones se
//! interpretan en [`regex`], se convierten a fragmentos de un mismo
//! NFA en [`nfa`] y finalmente se determinizan en [`dfa`]. El orden
//! de declaración de las reglas define su prioridad: ante un empate en
//! longitud, la regla declarada primero gana, de forma que las palabras
//! clave se declaran antes que los identificadores.

pub mod dfa;
pub mod nfa;
pub mod regex;

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::lex::TokenType;

pub use dfa::CombinedDfa;
pub use regex::PatternErrorKind;

/// Una regla léxica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalRule {
    pub name: TokenType,
    pub pattern: String,
    /// Los lexemas de reglas descartadas no llegan al flujo de tokens.
    pub skip: bool,
}

impl LexicalRule {
    pub fn new<N, P>(name: N, pattern: P) -> Self
    where
        N: Into<TokenType>,
        P: Into<String>,
    {
        LexicalRule {
            name: name.into(),
            pattern: pattern.into(),
            skip: false,
        }
    }

    /// Marca la regla como espacio en blanco o comentario.
    pub fn skipped(self) -> Self {
        LexicalRule { skip: true, ..self }
    }
}

impl<N: Into<TokenType>, P: Into<String>> From<(N, P)> for LexicalRule {
    fn from((name, pattern): (N, P)) -> Self {
        LexicalRule::new(name, pattern)
    }
}

/// Patrón inválido en una regla léxica.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Bad pattern `{pattern}` for rule `{rule}` at offset {offset}: {kind}")]
pub struct PatternError {
    /// Nombre de la regla.
    pub rule: TokenType,
    /// Posición de la regla en la lista de entrada.
    pub index: usize,
    pub pattern: String,
    /// Desplazamiento en caracteres dentro del patrón.
    pub offset: usize,
    pub kind: PatternErrorKind,
}

/// Compila un conjunto ordenado de reglas.
///
/// Basta con un patrón inválido para que falle la compilación completa.
pub fn compile(rules: &[LexicalRule]) -> Result<CombinedDfa, PatternError> {
    let mut regexes = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let fail = |offset, kind| PatternError {
            rule: rule.name.clone(),
            index,
            pattern: rule.pattern.clone(),
            offset,
            kind,
        };

        if rule.name.is_eof() {
            return Err(fail(0, PatternErrorKind::ReservedName));
        }

        let regex = regex::parse(&rule.pattern).map_err(|(offset, kind)| fail(offset, kind))?;
        if regex.nullable() {
            return Err(fail(0, PatternErrorKind::MatchesEmpty));
        }

        regexes.push((&rule.name, regex));
    }

    let nfa = nfa::Nfa::build(regexes.iter().map(|(name, regex)| (*name, regex)));
    let skip: HashSet<_> = rules
        .iter()
        .filter(|rule| rule.skip)
        .map(|rule| rule.name.clone())
        .collect();

    debug!(rules = rules.len(), skipped = skip.len(), "Compiling lexical rules");
    Ok(CombinedDfa::from_nfa(&nfa, skip))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unterminated_class_names_the_rule() {
        let rules = [
            LexicalRule::new("NUM", "[0-9]+"),
            LexicalRule::new("ID", "[a-z"),
        ];

        let error = compile(&rules).unwrap_err();
        assert_eq!(error.rule.as_str(), "ID");
        assert_eq!(error.index, 1);
        assert_eq!(error.pattern, "[a-z");
        assert_eq!(error.kind, PatternErrorKind::UnterminatedClass);
        assert!(error.to_string().contains("`ID`"));
    }

    #[test]
    fn nullable_patterns_are_rejected() {
        let error = compile(&[LexicalRule::new("WS", "[ ]*")]).unwrap_err();
        assert_eq!(error.kind, PatternErrorKind::MatchesEmpty);
    }

    #[test]
    fn eof_is_reserved() {
        let error = compile(&[LexicalRule::new("EOF", "\\$")]).unwrap_err();
        assert_eq!(error.kind, PatternErrorKind::ReservedName);
    }

    #[test]
    fn skipped_rules_are_recorded() {
        let dfa = compile(&[
            LexicalRule::new("WS", "[ \\t]+").skipped(),
            ("NUM", "[0-9]+").into(),
        ])
        .unwrap();

        assert!(dfa.is_skipped(&TokenType::new("WS")));
        assert!(!dfa.is_skipped(&TokenType::new("NUM")));
    }

    #[test]
    fn no_rules_match_nothing() {
        let dfa = compile(&[]).unwrap();
        assert_eq!(dfa.states().len(), 1);
        assert!(dfa.longest_match("abc").is_none());
    }
}
