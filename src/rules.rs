//! Lectura de archivos de reglas.
//!
//! # Reglas léxicas
//! Una regla por línea con la forma `NOMBRE = patrón`. El orden de las
//! líneas define la prioridad. Las líneas vacías y las que inician con
//! `#` se ignoran, excepto las directivas:
//!
//! ```text
//! # @SKIP: WS, COMMENT
//! ```
//!
//! # Reglas gramaticales
//! Producciones en BNF, `Lhs -> a b | c`. Una línea que inicia con `|`
//! continúa las alternativas de la producción anterior. Las palabras
//! entre comillas simples (`'NUM'`) son terminales, al igual que las
//! palabras sueltas que coinciden con un tipo de token conocido; el
//! resto son no terminales. `ε`, `EPSILON` o una alternativa vacía
//! denotan la producción vacía. Una palabra final `@loop`, `@declare`,
//! `@read`, `@write` o `@assign` anota la alternativa. Directivas:
//!
//! ```text
//! # @START: Program
//! # @REQUIRE_EXPLICIT_DECLARATION: true
//! ```
//!
//! Las claves de directivas y las anotaciones no distinguen mayúsculas.

use std::{collections::HashSet, rc::Rc};

use thiserror::Error;

use crate::{
    automaton::{LexicalRule, PatternError},
    grammar::{Grammar, Hint, Production, Symbol},
    lex::{NoCase, TokenType},
    source::{Located, Location, Position, Source},
};

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Expected `NAME = pattern`")]
    MissingEquals,

    #[error("Expected `Nonterminal -> symbols`")]
    MissingArrow,

    #[error("Invalid name `{0}`")]
    BadName(String),

    #[error("Token `{0}` is defined more than once")]
    DuplicateToken(String),

    #[error("Token `{0}` is not defined")]
    UnknownToken(String),

    #[error("Empty pattern")]
    EmptyPattern,

    #[error("Alternative continuation without a preceding production")]
    DanglingAlternative,

    #[error("Missing closing quote")]
    UnterminatedQuote,

    #[error("Unknown annotation `@{0}`")]
    UnknownHint(String),

    #[error("Annotation must be the last word of an alternative")]
    MisplacedHint,

    #[error("`ε` must be the only symbol of an alternative")]
    MisplacedEpsilon,

    #[error("Unknown directive `@{0}`")]
    UnknownDirective(String),

    #[error("Expected `# @KEY: value`")]
    MalformedDirective,

    #[error("Invalid value `{value}` for directive `@{key}`")]
    BadDirectiveValue { key: String, value: String },

    #[error("No productions were found")]
    EmptyGrammar,
}

pub type Rules<T> = Result<T, Located<RuleError>>;

/// Reglas léxicas leídas de un archivo.
#[derive(Debug)]
pub struct LexerRules {
    pub rules: Vec<LexicalRule>,
    source: Rc<Source>,
    /// Ubicación del patrón de cada regla.
    patterns: Vec<Location>,
}

impl LexerRules {
    /// Tipos de token definidos.
    pub fn token_types(&self) -> HashSet<TokenType> {
        self.rules.iter().map(|rule| rule.name.clone()).collect()
    }

    /// Ubica un error de patrón en el archivo de origen.
    pub fn locate(&self, error: PatternError) -> Located<PatternError> {
        let position = match self.patterns.get(error.index) {
            Some(pattern) => {
                let start = pattern.start();
                let offset = u32::try_from(error.offset).unwrap_or(u32::MAX);
                let column = start.column().saturating_add(offset).min(pattern.end().column());

                Position::new(start.line(), column)
            }

            None => Position::default(),
        };

        Located::at(error, Location::point(&self.source, position))
    }
}

/// Gramática leída de un archivo, con sus directivas.
#[derive(Debug)]
pub struct GrammarRules {
    pub grammar: Grammar,
    pub explicit_declarations: bool,
}

/// Lee un archivo de reglas léxicas.
pub fn read_lexer(source: &Rc<Source>) -> Rules<LexerRules> {
    let mut rules: Vec<LexicalRule> = Vec::new();
    let mut patterns = Vec::new();
    let mut skip = Vec::new();

    for line in lines(source) {
        if let Some(Directive { key, value }) = line.directive()? {
            if NoCase::new(*key.val()) != NoCase::new("SKIP") {
                return Err(unknown_directive(&key));
            }

            let names = value.split(',').map(str::trim).filter(|name| !name.is_empty());
            skip.extend(names.map(|name| (name.to_owned(), line.locate(name))));
            continue;
        }

        if line.is_comment() {
            continue;
        }

        let text = line.text;
        let (name, pattern) = text
            .split_once('=')
            .ok_or_else(|| Located::at(RuleError::MissingEquals, line.whole()))?;

        let (name, pattern) = (name.trim(), pattern.trim());
        check_name(name, &line)?;

        if rules.iter().any(|rule| rule.name.as_str() == name) {
            return Err(Located::at(
                RuleError::DuplicateToken(name.to_owned()),
                line.locate(name),
            ));
        }

        if pattern.is_empty() {
            return Err(Located::at(RuleError::EmptyPattern, line.whole()));
        }

        rules.push(LexicalRule::new(name, pattern));
        patterns.push(line.locate(pattern));
    }

    for (name, location) in skip {
        match rules.iter_mut().find(|rule| rule.name.as_str() == name) {
            Some(rule) => rule.skip = true,
            None => return Err(Located::at(RuleError::UnknownToken(name), location)),
        }
    }

    Ok(LexerRules {
        rules,
        source: Rc::clone(source),
        patterns,
    })
}

/// Lee un archivo de reglas gramaticales.
///
/// Las palabras sueltas presentes en `terminals` se leen como terminales.
pub fn read_grammar(source: &Rc<Source>, terminals: &HashSet<TokenType>) -> Rules<GrammarRules> {
    let mut grammar: Option<Grammar> = None;
    let mut current: Option<Rc<str>> = None;
    let mut start: Option<String> = None;
    let mut explicit = None;

    for line in lines(source) {
        if let Some(Directive { key, value }) = line.directive()? {
            let name = NoCase::new(*key.val());
            if name == NoCase::new("START") {
                check_name(value, &line)?;
                start = Some(value.to_owned());
            } else if name == NoCase::new("REQUIRE_EXPLICIT_DECLARATION") {
                explicit = Some(parse_bool(value).ok_or_else(|| {
                    let error = RuleError::BadDirectiveValue {
                        key: key.val().to_string(),
                        value: value.to_owned(),
                    };

                    Located::at(error, line.locate(value))
                })?);
            } else {
                return Err(unknown_directive(&key));
            }

            continue;
        }

        if line.is_comment() {
            continue;
        }

        let text = line.text;
        let (lhs, rhs) = match text.strip_prefix('|') {
            Some(rhs) => {
                let lhs = current
                    .clone()
                    .ok_or_else(|| Located::at(RuleError::DanglingAlternative, line.whole()))?;

                (lhs, rhs)
            }

            None => {
                let (lhs, rhs) = text
                    .split_once("->")
                    .ok_or_else(|| Located::at(RuleError::MissingArrow, line.whole()))?;

                let lhs = lhs.trim();
                check_name(lhs, &line)?;
                (Rc::from(lhs), rhs)
            }
        };

        let grammar = grammar.get_or_insert_with(|| Grammar::new(&lhs));
        for alternative in rhs.split('|') {
            let production = read_production(alternative, &line, terminals)?;
            grammar.add(&lhs, production);
        }

        current = Some(lhs);
    }

    let mut grammar =
        grammar.ok_or_else(|| Located::at(RuleError::EmptyGrammar, Location::point(source, Position::default())))?;

    if let Some(start) = start {
        grammar.set_start(&start);
    }

    let declares = grammar
        .rules()
        .flat_map(|(_, productions)| productions)
        .any(|production| production.hint == Some(Hint::Declare));

    Ok(GrammarRules {
        grammar,
        explicit_declarations: explicit.unwrap_or(declares),
    })
}

fn read_production(text: &str, line: &Line<'_>, terminals: &HashSet<TokenType>) -> Rules<Production> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut symbols = Vec::with_capacity(words.len());
    let mut hint = None;
    let mut epsilon = false;

    for (index, &word) in words.iter().enumerate() {
        let fail = |error| Err(Located::at(error, line.locate(word)));

        if let Some(name) = word.strip_prefix('@') {
            if index + 1 != words.len() {
                return fail(RuleError::MisplacedHint);
            }

            match name.parse::<Hint>() {
                Ok(parsed) => hint = Some(parsed),
                Err(()) => return fail(RuleError::UnknownHint(name.to_owned())),
            }
        } else if word == "ε" || NoCase::new(word) == NoCase::new("EPSILON") {
            epsilon = true;
        } else if let Some(quoted) = word.strip_prefix('\'') {
            let name = match quoted.strip_suffix('\'') {
                Some(name) => name,
                None => return fail(RuleError::UnterminatedQuote),
            };

            check_name(name, line)?;
            symbols.push(Symbol::terminal(name));
        } else {
            check_name(word, line)?;
            if terminals.contains(word) {
                symbols.push(Symbol::terminal(word));
            } else {
                symbols.push(Symbol::nonterminal(word));
            }
        }
    }

    if epsilon && !symbols.is_empty() {
        return Err(Located::at(RuleError::MisplacedEpsilon, line.locate(text.trim())));
    }

    let production = Production::new(symbols);
    Ok(match hint {
        Some(hint) => production.with_hint(hint),
        None => production,
    })
}

/// Una línea no vacía de un archivo de reglas.
struct Line<'s> {
    source: &'s Rc<Source>,
    number: u32,
    /// Línea completa, tal como aparece en el archivo.
    raw: &'s str,
    /// Línea sin espacios en los extremos.
    text: &'s str,
}

struct Directive<'s> {
    key: Located<&'s str>,
    value: &'s str,
}

impl<'s> Line<'s> {
    fn is_comment(&self) -> bool {
        self.text.starts_with('#')
    }

    fn directive(&self) -> Rules<Option<Directive<'s>>> {
        let body = match self.text.strip_prefix('#').map(str::trim_start) {
            Some(body) if body.starts_with('@') => &body[1..],
            _ => return Ok(None),
        };

        let (key, value) = body
            .split_once(':')
            .ok_or_else(|| Located::at(RuleError::MalformedDirective, self.whole()))?;

        let key = key.trim();
        Ok(Some(Directive {
            key: Located::at(key, self.locate(key)),
            value: value.trim(),
        }))
    }

    /// Ubica un fragmento de la línea.
    fn locate(&self, fragment: &str) -> Location {
        let offset = (fragment.as_ptr() as usize)
            .checked_sub(self.raw.as_ptr() as usize)
            .filter(|&offset| offset + fragment.len() <= self.raw.len())
            .unwrap_or(0);

        let column = |bytes: usize| {
            let chars = self.raw[..bytes].chars().count();
            u32::try_from(chars).unwrap_or(u32::MAX).saturating_add(1)
        };

        let start = Position::new(self.number, column(offset));
        let end = Position::new(self.number, column(offset + fragment.len()));

        if end > start {
            Location::new(self.source, start..end)
        } else {
            Location::point(self.source, start)
        }
    }

    fn whole(&self) -> Location {
        self.locate(self.text)
    }
}

fn lines(source: &Rc<Source>) -> impl Iterator<Item = Line<'_>> {
    source
        .text()
        .lines()
        .zip(1..)
        .map(move |(raw, number)| Line {
            source,
            number,
            raw,
            text: raw.trim(),
        })
        .filter(|line| !line.text.is_empty())
}

fn check_name(name: &str, line: &Line<'_>) -> Rules<()> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .map_or(false, |first| first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Located::at(RuleError::BadName(name.to_owned()), line.locate(name)))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    const VALUES: &[(NoCase<&str>, bool)] = &[
        (NoCase::new("true"),  true),
        (NoCase::new("yes"),   true),
        (NoCase::new("1"),     true),
        (NoCase::new("false"), false),
        (NoCase::new("no"),    false),
        (NoCase::new("0"),     false),
    ];

    VALUES
        .iter()
        .find(|&&(name, _)| name == NoCase::new(value))
        .map(|&(_, value)| value)
}

fn unknown_directive(key: &Located<&str>) -> Located<RuleError> {
    Located::at(
        RuleError::UnknownDirective(key.val().to_string()),
        key.location().clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::{compile, PatternErrorKind};

    const LEXER: &str = "\
# Palabras clave antes que identificadores
# @SKIP: WS, COMMENT
PRINT = print
ID    = [a-zA-Z_][a-zA-Z0-9_]*
NUM   = [0-9]+
ASSIGN = =
EQ = ==
WS = [ \\t\\n]+
COMMENT = //[^\\n]*
";

    fn lexer() -> LexerRules {
        read_lexer(&Source::new("lexer.rules", LEXER)).unwrap()
    }

    #[test]
    fn lexer_rules_keep_order_and_skip() {
        let lexer = lexer();
        let names: Vec<&str> = lexer.rules.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, ["PRINT", "ID", "NUM", "ASSIGN", "EQ", "WS", "COMMENT"]);

        assert_eq!(lexer.rules[3].pattern, "=");
        assert_eq!(lexer.rules[4].pattern, "==");
        assert_eq!(lexer.rules[5].pattern, "[ \\t\\n]+");

        let skipped: Vec<&str> = lexer
            .rules
            .iter()
            .filter(|rule| rule.skip)
            .map(|rule| rule.name.as_str())
            .collect();

        assert_eq!(skipped, ["WS", "COMMENT"]);
    }

    #[test]
    fn pattern_errors_point_into_the_file() {
        let source = Source::new("lexer.rules", "NUM = [0-9]+\nID = [a-z\n");
        let lexer = read_lexer(&source).unwrap();

        let error = lexer.locate(compile(&lexer.rules).unwrap_err());
        assert_eq!(error.val().kind, PatternErrorKind::UnterminatedClass);
        assert_eq!(error.val().rule.as_str(), "ID");
        assert_eq!(error.location().start().line(), 2);
    }

    #[test]
    fn lexer_errors() {
        let read = |text: &str| read_lexer(&Source::new("lexer.rules", text)).unwrap_err().into_inner();

        assert_eq!(read("NUM [0-9]+"), RuleError::MissingEquals);
        assert_eq!(read("1X = a"), RuleError::BadName("1X".to_owned()));
        assert_eq!(read("A = a\nA = b"), RuleError::DuplicateToken("A".to_owned()));
        assert_eq!(read("# @SKIP: WS\nA = a"), RuleError::UnknownToken("WS".to_owned()));
        assert_eq!(read("# @START: A"), RuleError::UnknownDirective("START".to_owned()));
    }

    #[test]
    fn grammar_symbols_and_continuations() {
        let source = Source::new(
            "grammar.rules",
            "\
# @start: Program
Stmt -> ID ASSIGN Expr SEMI
      | 'PRINT' LPAREN Expr RPAREN SEMI @write
Program -> Stmt Program | ε
Expr -> NUM |
",
        );

        let terminals = ["ID", "ASSIGN", "SEMI", "PRINT", "LPAREN", "RPAREN", "NUM"]
            .iter()
            .map(|&name| TokenType::new(name))
            .collect();

        let GrammarRules {
            grammar,
            explicit_declarations,
        } = read_grammar(&source, &terminals).unwrap();

        assert_eq!(grammar.start(), "Program");
        assert!(!explicit_declarations);

        let stmt = grammar.productions("Stmt").unwrap();
        assert_eq!(stmt.len(), 2);
        assert_eq!(stmt[0].to_string(), "'ID' 'ASSIGN' Expr 'SEMI'");
        assert_eq!(stmt[1].hint, Some(Hint::Write));

        let program = grammar.productions("Program").unwrap();
        assert_eq!(program[1], Production::empty());

        let expr = grammar.productions("Expr").unwrap();
        assert_eq!(expr[1], Production::empty());
    }

    #[test]
    fn declarations_enable_explicit_mode() {
        let terminals = HashSet::new();
        let read = |text: &str| read_grammar(&Source::new("g", text), &terminals).unwrap();

        let implied = read("Decl -> 'VAR' 'ID' 'SEMI' @declare");
        assert!(implied.explicit_declarations);

        let overridden = read("# @REQUIRE_EXPLICIT_DECLARATION: no\nDecl -> 'VAR' 'ID' 'SEMI' @DECLARE");
        assert!(!overridden.explicit_declarations);

        let requested = read("# @require_explicit_declaration: TRUE\nS -> 'NUM'");
        assert!(requested.explicit_declarations);
    }

    #[test]
    fn grammar_errors() {
        let terminals = HashSet::new();
        let read = |text: &str| {
            read_grammar(&Source::new("g", text), &terminals)
                .unwrap_err()
                .into_inner()
        };

        assert_eq!(read("S 'NUM'"), RuleError::MissingArrow);
        assert_eq!(read("| 'NUM'"), RuleError::DanglingAlternative);
        assert_eq!(read("S -> 'NUM"), RuleError::UnterminatedQuote);
        assert_eq!(read("S -> 'NUM' @forever"), RuleError::UnknownHint("forever".to_owned()));
        assert_eq!(read("S -> @loop 'NUM'"), RuleError::MisplacedHint);
        assert_eq!(read("S -> ε 'NUM'"), RuleError::MisplacedEpsilon);
        assert_eq!(read("# comment only"), RuleError::EmptyGrammar);
        assert_eq!(
            read("# @REQUIRE_EXPLICIT_DECLARATION: maybe\nS -> 'NUM'"),
            RuleError::BadDirectiveValue {
                key: "REQUIRE_EXPLICIT_DECLARATION".to_owned(),
                value: "maybe".to_owned()
            }
        );
    }

    #[test]
    fn errors_are_located_by_line_and_column() {
        let error = read_grammar(&Source::new("g", "S -> 'NUM'\nT ->  A-B"), &HashSet::new()).unwrap_err();
        assert_eq!(error.val(), &RuleError::BadName("A-B".to_owned()));
        assert_eq!(error.location().start(), Position::new(2, 7));
    }
}
