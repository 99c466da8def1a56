//! Generador de compiladores.
//!
//! A partir de un conjunto ordenado de reglas léxicas y de una gramática
//! libre de contexto, este crate construye un escáner y un traductor de
//! una sola pasada que emite código de tres direcciones.
//!
//! # Escáner
//! Los patrones de las reglas léxicas se compilan en [`automaton`] a un
//! único DFA combinado, en el cual la regla declarada primero gana los
//! empates. El escáner de [`lex`] recorre el texto de entrada con ese
//! autómata bajo la política de "maximal munch".
//!
//! # Traductor
//! La gramática se normaliza en [`grammar`]: se elimina la recursión
//! izquierda, se factorizan prefijos comunes y se calculan los conjuntos
//! selectores que permiten predecir cada alternativa con un único token
//! de lookahead. El traductor de [`parse`] ejecuta los planes de emisión
//! de cada alternativa, emitiendo instrucciones de [`ir`] y verificando
//! el uso de variables con [`semantic`].
//!
//! # Uso
//! Las cuatro funciones de este módulo exponen cada etapa por separado.
//! Ninguna de ellas realiza E/S; los archivos de reglas se leen con
//! [`rules`] y los errores se presentan con [`error::Diagnostics`].

pub mod automaton;
pub mod error;
pub mod grammar;
pub mod ir;
pub mod lex;
pub mod parse;
pub mod rules;
pub mod semantic;
pub mod source;

pub use automaton::{CombinedDfa, LexicalRule, PatternError};
pub use grammar::{Grammar, GrammarError, Normalized};
pub use lex::{LexicalError, Token, TokenType};
pub use parse::{Options, TranslateError, Translation};

use source::{Located, Source};

/// Compila reglas léxicas, en orden de prioridad.
pub fn compile_lexer(rules: &[LexicalRule]) -> Result<CombinedDfa, PatternError> {
    automaton::compile(rules)
}

/// Escanea un texto sin nombre de origen.
///
/// Para conservar el nombre de un archivo en los diagnósticos, ver
/// [`lex::tokenize`].
pub fn tokenize(dfa: &CombinedDfa, text: &str) -> Result<Vec<Token>, Located<LexicalError>> {
    lex::tokenize(dfa, &Source::new("<input>", text))
}

/// Normaliza una gramática a LL(1) y calcula sus selectores.
pub fn normalize_grammar(grammar: &Grammar) -> Result<Normalized, GrammarError> {
    grammar::normalize(grammar)
}

/// Traduce un flujo de tokens desde el símbolo inicial de la gramática.
pub fn translate(
    tokens: &[Token],
    grammar: &Normalized,
    options: Options,
) -> Result<Translation, TranslateError> {
    parse::translate(tokens, grammar, options)
}
