//! Análisis léxico.
//!
//! # Tokenization
//! El escáner recorre el texto de entrada con el autómata combinado que
//! produce [`crate::automaton`]. En cada posición avanza por el DFA tanto
//! como existan transiciones, recordando el último estado de aceptación
//! visitado ("maximal munch"). Al llegar a un callejón sin salida se
//! regresa a esa última aceptación y se emite el token correspondiente.
//!
//! # Trivia
//! Los lexemas de reglas marcadas como descartadas (espacios, comentarios)
//! se reconocen pero no llegan al flujo de tokens. Los espacios en blanco
//! que ninguna regla reconoce se consumen implícitamente como trivia de
//! tipo `WHITESPACE`. [`Scanner`] expone todos los lexemas, incluyendo
//! trivia, de modo que concatenarlos reconstruye la entrada original.
//!
//! # Errores
//! El primer carácter que no inicia ningún token detiene el escaneo con
//! un [`LexicalError`] ubicado en su línea y columna.

use crate::{
    automaton::CombinedDfa,
    source::{Located, Location, Position, Source},
};

use std::{
    borrow::Borrow,
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;
use tracing::trace;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Nombre reservado del token de fin de entrada.
const EOF: &str = "EOF";

/// Nombre de la trivia implícita.
const WHITESPACE: &str = "WHITESPACE";

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexicalError {
    /// Ninguna regla reconoce un lexema que inicie con este carácter.
    #[error("Unexpected character {0:?} in input")]
    UnexpectedChar(char),
}

/// Tipo de token, identificado por el nombre de su regla léxica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenType(Rc<str>);

impl TokenType {
    pub fn new(name: &str) -> Self {
        TokenType(Rc::from(name))
    }

    /// Tipo del token de fin de entrada.
    pub fn eof() -> Self {
        TokenType::new(EOF)
    }

    pub fn is_eof(&self) -> bool {
        &*self.0 == EOF
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TokenType {
    fn from(name: &str) -> Self {
        TokenType::new(name)
    }
}

impl From<String> for TokenType {
    fn from(name: String) -> Self {
        TokenType(Rc::from(name))
    }
}

impl Borrow<str> for TokenType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TokenType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for TokenType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(&self.0)
    }
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone)]
pub struct Token {
    ty: TokenType,
    value: Rc<str>,
    location: Location,
}

impl Token {
    pub fn new(ty: TokenType, value: &str, location: Location) -> Self {
        Token {
            ty,
            value: Rc::from(value),
            location,
        }
    }

    /// Tipo de token.
    pub fn ty(&self) -> &TokenType {
        &self.ty
    }

    /// Lexema reconocido.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Lexema compartido, útil para construir operandos sin copiar.
    pub fn lexeme(&self) -> Rc<str> {
        Rc::clone(&self.value)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Línea del primer carácter.
    pub fn line(&self) -> u32 {
        self.location.start().line()
    }

    /// Columna del primer carácter.
    pub fn column(&self) -> u32 {
        self.location.start().column()
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ty.is_eof() {
            fmt.write_str("end of input")
        } else {
            write!(fmt, "{} `{}`", self.ty, self.value.escape_debug())
        }
    }
}

/// Un lexema escaneado, posiblemente descartable.
#[derive(Debug, Clone)]
pub struct Scanned {
    pub token: Token,
    pub discarded: bool,
}

/// Iterador de lexemas sobre un texto fuente.
///
/// Tras el primer error el iterador no produce más elementos.
pub struct Scanner<'a> {
    dfa: &'a CombinedDfa,
    source: Rc<Source>,
    offset: usize,
    position: Position,
    failed: bool,
}

impl<'a> Scanner<'a> {
    /// Crea un escáner al inicio del texto.
    pub fn new(dfa: &'a CombinedDfa, source: &Rc<Source>) -> Self {
        Scanner {
            dfa,
            source: Rc::clone(source),
            offset: 0,
            position: Position::default(),
            failed: false,
        }
    }

    /// Posición siguiente al último lexema.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Produce la secuencia de tokens, sin trivia y terminada en `EOF`.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Located<LexicalError>> {
        let mut tokens = Vec::new();
        for scanned in &mut self {
            let scanned = scanned?;
            if !scanned.discarded {
                tokens.push(scanned.token);
            }
        }

        let end = Location::point(&self.source, self.position);
        tokens.push(Token::new(TokenType::eof(), "", end));

        trace!(count = tokens.len(), "Tokenized input");
        Ok(tokens)
    }

    /// Consume `length` bytes como un lexema.
    fn take(&mut self, ty: TokenType, length: usize, discarded: bool) -> Scanned {
        let start = self.position;
        let text = &self.source.text()[self.offset..self.offset + length];

        self.offset += length;
        self.position = start.after_str(text);

        let location = Location::new(&self.source, start..self.position);
        let token = Token::new(ty, text, location);

        trace!(%token, discarded, "Scanned lexeme");
        Scanned { token, discarded }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Scanned, Located<LexicalError>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let source = Rc::clone(&self.source);
        let rest = &source.text()[self.offset..];
        let next_char = rest.chars().next()?;

        if let Some((ty, length)) = self.dfa.longest_match(rest) {
            let discarded = self.dfa.is_skipped(ty);
            return Some(Ok(self.take(ty.clone(), length, discarded)));
        }

        if !next_char.is_whitespace() {
            self.failed = true;

            let location = Location::point(&self.source, self.position);
            return Some(Err(Located::at(
                LexicalError::UnexpectedChar(next_char),
                location,
            )));
        }

        // Espacio en blanco que ninguna regla reconoce
        let mut length = 0;
        for (offset, c) in rest.char_indices() {
            if !c.is_whitespace() || (offset > 0 && self.dfa.longest_match(&rest[offset..]).is_some()) {
                break;
            }

            length = offset + c.len_utf8();
        }

        Some(Ok(self.take(TokenType::new(WHITESPACE), length, true)))
    }
}

/// Escanea un texto completo.
pub fn tokenize(dfa: &CombinedDfa, source: &Rc<Source>) -> Result<Vec<Token>, Located<LexicalError>> {
    Scanner::new(dfa, source).tokenize()
}
