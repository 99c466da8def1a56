//! Árbol sintáctico de expresiones regulares.
//!
//! # Sintaxis aceptada
//! - Literales y escapes (`\n`, `\t`, `\r`, `\0`, `\\` y cualquier
//!   signo de puntuación escapado).
//! - Clases abreviadas `\d`, `\w`, `\s` y sus negaciones `\D`, `\W`, `\S`.
//! - `.` para cualquier carácter excepto `'\n'`.
//! - Clases `[...]` con rangos y negación `[^...]`. Un `-` al inicio o
//!   al final de la clase es literal.
//! - Grupos `(...)` y `(?:...)`, alternación `|` y los cuantificadores
//!   posfijos `*`, `+` y `?`, que pueden apilarse.
//!
//! `x+` se reescribe como `concat(x, star(x))` y `x?` como `alt(x, ε)`,
//! por lo que el árbol solo conoce una forma de clausura.

use std::fmt::{self, Display};

use thiserror::Error;

/// Mayor punto de código representable.
const MAX_CHAR: u32 = char::MAX as u32;

/// Causa de fallo al interpretar un patrón.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternErrorKind {
    #[error("unmatched `)`")]
    UnbalancedGroup,

    #[error("unclosed group, expected `)`")]
    UnclosedGroup,

    #[error("unterminated character class, expected `]`")]
    UnterminatedClass,

    #[error("character class matches nothing")]
    EmptyClass,

    #[error("invalid range `{0}-{1}`")]
    BadRange(char, char),

    #[error("invalid escape sequence `\\{0}`")]
    InvalidEscape(char),

    #[error("pattern ends with a dangling `\\`")]
    DanglingEscape,

    #[error("empty alternative")]
    EmptyAlternative,

    #[error("quantifier `{0}` has nothing to repeat")]
    NothingToRepeat(char),

    #[error("pattern matches the empty string")]
    MatchesEmpty,

    #[error("token name `EOF` is reserved")]
    ReservedName,
}

/// Conjunto de caracteres como lista ordenada de intervalos disjuntos.
///
/// Los extremos son inclusivos y se almacenan como puntos de código.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CharSet {
    ranges: Vec<(u32, u32)>,
}

impl CharSet {
    /// Conjunto de un único carácter.
    pub fn single(c: char) -> Self {
        CharSet::range(c, c)
    }

    /// Conjunto de un rango inclusivo.
    pub fn range(from: char, to: char) -> Self {
        CharSet {
            ranges: vec![(from as u32, to as u32)],
        }
    }

    /// Cualquier carácter excepto fin de línea.
    pub fn any() -> Self {
        CharSet::single('\n').negate()
    }

    /// `\d`
    pub fn digit() -> Self {
        CharSet::range('0', '9')
    }

    /// `\w`
    pub fn word() -> Self {
        let mut set = CharSet::digit();
        set.add(CharSet::range('a', 'z'));
        set.add(CharSet::range('A', 'Z'));
        set.add(CharSet::single('_'));
        set
    }

    /// `\s`
    pub fn space() -> Self {
        let mut set = CharSet::default();
        for c in [' ', '\t', '\n', '\r', '\x0b', '\x0c'] {
            set.add(CharSet::single(c));
        }

        set
    }

    /// Une otro conjunto a este.
    pub fn add(&mut self, other: CharSet) {
        self.ranges.extend(other.ranges);
        self.normalize();
    }

    /// Complemento respecto a todos los puntos de código.
    pub fn negate(&self) -> Self {
        let mut ranges = Vec::new();
        let mut next = 0;

        for &(from, to) in &self.ranges {
            if from > next {
                ranges.push((next, from - 1));
            }

            next = to + 1;
        }

        if next <= MAX_CHAR {
            ranges.push((next, MAX_CHAR));
        }

        CharSet { ranges }
    }

    pub fn contains(&self, c: char) -> bool {
        self.contains_point(c as u32)
    }

    pub(crate) fn contains_point(&self, point: u32) -> bool {
        self.ranges
            .binary_search_by(|&(from, to)| {
                if to < point {
                    std::cmp::Ordering::Less
                } else if from > point {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Intervalos que componen el conjunto.
    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }

    fn normalize(&mut self) {
        self.ranges.sort_unstable();

        let mut merged: Vec<(u32, u32)> = Vec::with_capacity(self.ranges.len());
        for &(from, to) in &self.ranges {
            match merged.last_mut() {
                Some((_, last)) if from <= last.saturating_add(1) => *last = (*last).max(to),
                _ => merged.push((from, to)),
            }
        }

        self.ranges = merged;
    }
}

impl Display for CharSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |point: u32| match char::from_u32(point) {
            Some(c) => format!("{}", c.escape_debug()),
            None => format!("\\u{{{:x}}}", point),
        };

        fmt.write_str("[")?;
        for &(from, to) in &self.ranges {
            if from == to {
                fmt.write_str(&show(from))?;
            } else {
                write!(fmt, "{}-{}", show(from), show(to))?;
            }
        }

        fmt.write_str("]")
    }
}

/// Nodo de una expresión regular.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Regex {
    /// Cadena vacía (ε).
    Empty,
    Literal(char),
    Class(CharSet),
    Concat(Box<Regex>, Box<Regex>),
    Alternate(Box<Regex>, Box<Regex>),
    /// Clausura de Kleene.
    Closure(Box<Regex>),
}

impl Regex {
    /// Determina si la expresión acepta la cadena vacía.
    pub fn nullable(&self) -> bool {
        match self {
            Regex::Empty | Regex::Closure(_) => true,
            Regex::Literal(_) => false,
            Regex::Class(set) => set.is_empty(),
            Regex::Concat(left, right) => left.nullable() && right.nullable(),
            Regex::Alternate(left, right) => left.nullable() || right.nullable(),
        }
    }

    fn concat(left: Regex, right: Regex) -> Regex {
        Regex::Concat(Box::new(left), Box::new(right))
    }

    fn alternate(left: Regex, right: Regex) -> Regex {
        Regex::Alternate(Box::new(left), Box::new(right))
    }
}

/// Interpreta un patrón.
///
/// En caso de error se retorna el desplazamiento (en caracteres)
/// donde se detectó la falla junto a su causa.
pub fn parse(pattern: &str) -> Result<Regex, (usize, PatternErrorKind)> {
    let mut parser = Parser {
        chars: pattern.chars().collect(),
        position: 0,
    };

    if parser.chars.is_empty() {
        return Err((0, PatternErrorKind::MatchesEmpty));
    }

    let regex = parser.alternation()?;
    match parser.peek() {
        None => Ok(regex),
        Some(_) => Err((parser.position, PatternErrorKind::UnbalancedGroup)),
    }
}

type Parse<T> = Result<T, (usize, PatternErrorKind)>;

/// Parser descendente recursivo sobre los caracteres del patrón.
struct Parser {
    chars: Vec<char>,
    position: usize,
}

impl Parser {
    /// `alternation -> sequence ('|' sequence)*`
    fn alternation(&mut self) -> Parse<Regex> {
        let mut regex = self.sequence()?;
        while self.peek() == Some('|') {
            self.position += 1;
            regex = Regex::alternate(regex, self.sequence()?);
        }

        Ok(regex)
    }

    /// `sequence -> repetition+`
    fn sequence(&mut self) -> Parse<Regex> {
        let mut regex = None;
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }

            let next = self.repetition()?;
            regex = Some(match regex {
                None => next,
                Some(regex) => Regex::concat(regex, next),
            });
        }

        regex.ok_or((self.position, PatternErrorKind::EmptyAlternative))
    }

    /// `repetition -> atom ('*' | '+' | '?')*`
    fn repetition(&mut self) -> Parse<Regex> {
        let mut regex = self.atom()?;
        loop {
            regex = match self.peek() {
                Some('*') => Regex::Closure(Box::new(regex)),
                Some('+') => Regex::concat(regex.clone(), Regex::Closure(Box::new(regex))),
                Some('?') => Regex::alternate(regex, Regex::Empty),
                _ => break Ok(regex),
            };

            self.position += 1;
        }
    }

    fn atom(&mut self) -> Parse<Regex> {
        let start = self.position;
        let c = match self.bump() {
            Some(c) => c,
            None => return Err((start, PatternErrorKind::EmptyAlternative)),
        };

        match c {
            '(' => {
                if self.peek() == Some('?') && self.chars.get(self.position + 1) == Some(&':') {
                    self.position += 2;
                }

                let inner = self.alternation()?;
                match self.bump() {
                    Some(')') => Ok(inner),
                    _ => Err((start, PatternErrorKind::UnclosedGroup)),
                }
            }

            '*' | '+' | '?' => Err((start, PatternErrorKind::NothingToRepeat(c))),
            '[' => self.class(start).map(Regex::Class),
            '.' => Ok(Regex::Class(CharSet::any())),
            '\\' => self.escape(start).map(|escape| match escape {
                Escape::Char(c) => Regex::Literal(c),
                Escape::Set(set) => Regex::Class(set),
            }),

            c => Ok(Regex::Literal(c)),
        }
    }

    /// Interpreta lo que sigue a `\`, ya consumido.
    fn escape(&mut self, start: usize) -> Parse<Escape> {
        let c = self
            .bump()
            .ok_or((start, PatternErrorKind::DanglingEscape))?;

        let escape = match c {
            'n' => Escape::Char('\n'),
            't' => Escape::Char('\t'),
            'r' => Escape::Char('\r'),
            '0' => Escape::Char('\0'),
            'd' => Escape::Set(CharSet::digit()),
            'w' => Escape::Set(CharSet::word()),
            's' => Escape::Set(CharSet::space()),
            'D' => Escape::Set(CharSet::digit().negate()),
            'W' => Escape::Set(CharSet::word().negate()),
            'S' => Escape::Set(CharSet::space().negate()),
            c if c.is_alphanumeric() => return Err((start, PatternErrorKind::InvalidEscape(c))),
            c => Escape::Char(c),
        };

        Ok(escape)
    }

    /// Clase de caracteres; `[` ya fue consumido en `start`.
    fn class(&mut self, start: usize) -> Parse<CharSet> {
        let negated = self.peek() == Some('^');
        if negated {
            self.position += 1;
        }

        let mut set = CharSet::default();
        let mut first = true;

        loop {
            let item_start = self.position;
            let c = self
                .bump()
                .ok_or((start, PatternErrorKind::UnterminatedClass))?;

            let low = match c {
                ']' if first => return Err((start, PatternErrorKind::EmptyClass)),
                ']' => break,
                '\\' => self.escape(item_start)?,
                c => Escape::Char(c),
            };

            first = false;

            let low = match low {
                Escape::Set(escaped) => {
                    set.add(escaped);
                    continue;
                }

                Escape::Char(low) => low,
            };

            // Un `-` final o inicial se toma de forma literal
            let is_range = self.peek() == Some('-')
                && !matches!(self.chars.get(self.position + 1), None | Some(']'));

            if !is_range {
                set.add(CharSet::single(low));
                continue;
            }

            self.position += 1;
            let high_start = self.position;
            let high = match self.bump() {
                Some('\\') => self.escape(high_start)?,
                Some(c) => Escape::Char(c),
                None => return Err((start, PatternErrorKind::UnterminatedClass)),
            };

            match high {
                Escape::Char(high) if high >= low => set.add(CharSet::range(low, high)),
                Escape::Char(high) => {
                    return Err((item_start, PatternErrorKind::BadRange(low, high)))
                }
                Escape::Set(_) => {
                    let high = self.chars[high_start + 1];
                    return Err((item_start, PatternErrorKind::BadRange(low, high)));
                }
            }
        }

        let set = if negated { set.negate() } else { set };
        if set.is_empty() {
            Err((start, PatternErrorKind::EmptyClass))
        } else {
            Ok(set)
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += 1;
        Some(c)
    }
}

/// Resultado de una secuencia de escape.
enum Escape {
    Char(char),
    Set(CharSet),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(pattern: &str) -> PatternErrorKind {
        parse(pattern).unwrap_err().1
    }

    #[test]
    fn plus_and_optional_are_desugared() {
        let a = || Box::new(Regex::Literal('a'));
        assert_eq!(
            parse("a+").unwrap(),
            Regex::Concat(a(), Box::new(Regex::Closure(a())))
        );

        assert_eq!(
            parse("a?").unwrap(),
            Regex::Alternate(a(), Box::new(Regex::Empty))
        );
    }

    #[test]
    fn classes_merge_ranges() {
        let regex = parse("[a-zA-Z_]").unwrap();
        let set = match regex {
            Regex::Class(set) => set,
            other => panic!("expected a class, got {:?}", other),
        };

        assert!(set.contains('q') && set.contains('Q') && set.contains('_'));
        assert!(!set.contains('0'));
        assert_eq!(set.ranges().len(), 3);
    }

    #[test]
    fn negated_class_and_dot() {
        let set = match parse("[^0-9]").unwrap() {
            Regex::Class(set) => set,
            other => panic!("expected a class, got {:?}", other),
        };

        assert!(set.contains('x') && !set.contains('5'));
        assert!(CharSet::any().contains('é'));
        assert!(!CharSet::any().contains('\n'));
    }

    #[test]
    fn dash_at_class_edges_is_literal() {
        let set = match parse("[-+]").unwrap() {
            Regex::Class(set) => set,
            other => panic!("expected a class, got {:?}", other),
        };

        assert!(set.contains('-') && set.contains('+') && !set.contains(','));
    }

    #[test]
    fn malformed_patterns() {
        assert_eq!(parse("[a-z").unwrap_err(), (0, PatternErrorKind::UnterminatedClass));
        assert_eq!(error("(ab"), PatternErrorKind::UnclosedGroup);
        assert_eq!(error("ab)"), PatternErrorKind::UnbalancedGroup);
        assert_eq!(error("a|"), PatternErrorKind::EmptyAlternative);
        assert_eq!(error("|a"), PatternErrorKind::EmptyAlternative);
        assert_eq!(error("()"), PatternErrorKind::EmptyAlternative);
        assert_eq!(error("*a"), PatternErrorKind::NothingToRepeat('*'));
        assert_eq!(error("\\q"), PatternErrorKind::InvalidEscape('q'));
        assert_eq!(error("ab\\"), PatternErrorKind::DanglingEscape);
        assert_eq!(error("[z-a]"), PatternErrorKind::BadRange('z', 'a'));
        assert_eq!(error("[]"), PatternErrorKind::EmptyClass);
        assert_eq!(error(""), PatternErrorKind::MatchesEmpty);
    }

    #[test]
    fn escaped_punctuation_is_literal() {
        assert_eq!(parse("\\+").unwrap(), Regex::Literal('+'));
        assert_eq!(parse("\\n").unwrap(), Regex::Literal('\n'));
    }

    #[test]
    fn nullability() {
        assert!(parse("a*").unwrap().nullable());
        assert!(parse("a?b?").unwrap().nullable());
        assert!(!parse("a+").unwrap().nullable());
        assert!(!parse("(?:ab|c)*d").unwrap().nullable());
    }
}
