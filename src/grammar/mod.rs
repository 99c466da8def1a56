//! Gramáticas libres de contexto y su normalización a LL(1).
//!
//! # Normalización
//! Una [`Grammar`] arbitraria en BNF se transforma en una gramática
//! apta para predicción descendente con un token de lookahead:
//!
//! 1. Se valida que todo no terminal referenciado tenga producciones.
//! 2. Cada alternativa se clasifica según su forma estructural en
//!    [`shape`], de lo cual se deriva su plan de emisión.
//! 3. Los ciclos de recursión izquierda indirecta se convierten en
//!    recursión inmediata por sustitución, y esta se elimina en
//!    [`rewrite`]. Los ciclos que no admiten sustitución se reportan.
//! 4. Se factorizan por la izquierda los prefijos comunes compatibles.
//! 5. Se calculan FIRST, FOLLOW y el conjunto selector de cada
//!    alternativa en [`sets`]. Si dos alternativas de un mismo no
//!    terminal comparten un token selector la gramática no es LL(1).
//!
//! El resultado es un [`Normalized`], del cual se alimenta el traductor
//! en [`crate::parse`].

pub mod rewrite;
pub mod sets;
pub mod shape;

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::lex::{NoCase, TokenType};

pub use sets::FirstSet;
pub use shape::{Carry, Shape, Step};

/// Error de normalización.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Start symbol `{0}` has no productions")]
    UndefinedStart(Rc<str>),

    #[error("Nonterminal `{name}` is used in `{rule}` but never defined")]
    UndefinedNonterminal { name: Rc<str>, rule: Rc<str> },

    #[error("Nonterminal `{0}` has no alternatives")]
    EmptyRule(Rc<str>),

    #[error("Left-recursive nonterminal `{0}` has no non-recursive alternative")]
    LeftRecursionWithoutBase(Rc<str>),

    #[error("Production `{0} -> {0}` derives only itself")]
    CyclicProduction(Rc<str>),

    #[error("Indirect left recursion through {}", .0.join(" -> "))]
    IndirectLeftRecursion(Vec<Rc<str>>),

    #[error("Left recursion in `{rule} -> {production}` is unsupported: guarded or declaring alternatives cannot be folded")]
    UnsupportedLeftRecursion { rule: Rc<str>, production: String },

    #[error("Hint `@{hint}` does not fit `{rule} -> {production}`")]
    HintMismatch {
        rule: Rc<str>,
        hint: Hint,
        production: String,
    },

    #[error("Grammar is not LL(1): `{nonterminal}` has alternatives `{first}` and `{second}` both predicted by `{token}`")]
    Conflict {
        nonterminal: Rc<str>,
        token: TokenType,
        first: String,
        second: String,
    },
}

/// Símbolo gramatical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(TokenType),
    Nonterminal(Rc<str>),
}

impl Symbol {
    pub fn terminal(name: &str) -> Self {
        Symbol::Terminal(TokenType::new(name))
    }

    pub fn nonterminal(name: &str) -> Self {
        Symbol::Nonterminal(Rc::from(name))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn as_terminal(&self) -> Option<&TokenType> {
        match self {
            Symbol::Terminal(ty) => Some(ty),
            Symbol::Nonterminal(_) => None,
        }
    }

    pub fn as_nonterminal(&self) -> Option<&Rc<str>> {
        match self {
            Symbol::Terminal(_) => None,
            Symbol::Nonterminal(name) => Some(name),
        }
    }
}

impl Display for Symbol {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Terminal(ty) => write!(fmt, "'{}'", ty),
            Symbol::Nonterminal(name) => fmt.write_str(name),
        }
    }
}

/// Anotación explícita de traducción para una alternativa.
///
/// Solo hace falta para construcciones que no se distinguen por forma,
/// como un ciclo frente a un condicional.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Hint {
    Loop,
    Declare,
    Read,
    Write,
    Assign,
}

impl Display for Hint {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = match self {
            Hint::Loop    => "loop",
            Hint::Declare => "declare",
            Hint::Read    => "read",
            Hint::Write   => "write",
            Hint::Assign  => "assign",
        };

        fmt.write_str(string)
    }
}

impl FromStr for Hint {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        const HINTS: &[(NoCase<&str>, Hint)] = &[
            (NoCase::new("loop"),    Hint::Loop),
            (NoCase::new("declare"), Hint::Declare),
            (NoCase::new("read"),    Hint::Read),
            (NoCase::new("write"),   Hint::Write),
            (NoCase::new("assign"),  Hint::Assign),
        ];

        HINTS
            .iter()
            .find(|&&(name, _)| name == NoCase::new(string))
            .map(|&(_, hint)| hint)
            .ok_or(())
    }
}

/// Secuencia ordenada de símbolos, posiblemente vacía.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub symbols: Vec<Symbol>,
    pub hint: Option<Hint>,
}

impl Production {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Production {
            symbols,
            hint: None,
        }
    }

    /// Producción ε.
    pub fn empty() -> Self {
        Production::new(Vec::new())
    }

    pub fn with_hint(self, hint: Hint) -> Self {
        Production {
            hint: Some(hint),
            ..self
        }
    }
}

impl Display for Production {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbols(fmt, &self.symbols)?;
        match self.hint {
            Some(hint) => write!(fmt, " @{}", hint),
            None => Ok(()),
        }
    }
}

/// Gramática tal como se declara.
///
/// Los no terminales conservan su orden de declaración, el cual
/// solo afecta la detección de recursión izquierda y los mensajes.
#[derive(Debug, Clone)]
pub struct Grammar {
    start: Rc<str>,
    rules: Vec<(Rc<str>, Vec<Production>)>,
}

impl Grammar {
    pub fn new(start: &str) -> Self {
        Grammar {
            start: Rc::from(start),
            rules: Vec::new(),
        }
    }

    /// Agrega alternativas a un no terminal, creándolo si no existe.
    pub fn rule<I>(mut self, lhs: &str, productions: I) -> Self
    where
        I: IntoIterator<Item = Production>,
    {
        for production in productions {
            self.add(lhs, production);
        }

        self
    }

    /// Agrega una alternativa al final de las de `lhs`.
    pub fn add(&mut self, lhs: &str, production: Production) {
        match self.rules.iter_mut().find(|(name, _)| &**name == lhs) {
            Some((_, productions)) => productions.push(production),
            None => self.rules.push((Rc::from(lhs), vec![production])),
        }
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn set_start(&mut self, start: &str) {
        self.start = Rc::from(start);
    }

    pub fn rules(&self) -> impl Iterator<Item = (&Rc<str>, &[Production])> {
        self.rules
            .iter()
            .map(|(name, productions)| (name, productions.as_slice()))
    }

    pub fn productions(&self, lhs: &str) -> Option<&[Production]> {
        self.rules
            .iter()
            .find(|(name, _)| &**name == lhs)
            .map(|(_, productions)| productions.as_slice())
    }

    /// Tipos de token mencionados en alguna producción.
    pub fn terminals(&self) -> BTreeSet<TokenType> {
        self.rules
            .iter()
            .flat_map(|(_, productions)| productions)
            .flat_map(|production| &production.symbols)
            .filter_map(Symbol::as_terminal)
            .cloned()
            .collect()
    }

    fn validate(&self) -> Result<(), GrammarError> {
        if self.productions(&self.start).is_none() {
            return Err(GrammarError::UndefinedStart(Rc::clone(&self.start)));
        }

        let defined: HashSet<&str> = self.rules.iter().map(|(name, _)| &**name).collect();
        for (rule, productions) in &self.rules {
            if productions.is_empty() {
                return Err(GrammarError::EmptyRule(Rc::clone(rule)));
            }

            let undefined = productions
                .iter()
                .flat_map(|production| &production.symbols)
                .filter_map(Symbol::as_nonterminal)
                .find(|name| !defined.contains(&***name));

            if let Some(name) = undefined {
                return Err(GrammarError::UndefinedNonterminal {
                    name: Rc::clone(name),
                    rule: Rc::clone(rule),
                });
            }
        }

        Ok(())
    }
}

/// No terminal de la gramática normalizada.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Rc<str>,
    /// No terminal de la gramática declarada del cual deriva este.
    pub origin: Rc<str>,
    pub alternatives: Vec<Alternative>,
}

/// Alternativa de la gramática normalizada.
///
/// Las primeras `inherited` ranuras de operandos no corresponden a
/// símbolos propios, sino que las provee la alternativa que desciende
/// a esta (acumulador de recursión izquierda o prefijo factorizado).
/// El símbolo de la ranura `i` es `symbols[i - inherited]`.
#[derive(Debug, Clone)]
pub struct Alternative {
    pub symbols: Vec<Symbol>,
    pub inherited: usize,
    pub shape: Shape,
    pub plan: Vec<Step>,
    /// Tokens de lookahead que predicen esta alternativa.
    pub selector: BTreeSet<TokenType>,
}

impl Alternative {
    fn new(symbols: Vec<Symbol>, inherited: usize, shape: Shape, plan: Vec<Step>) -> Self {
        Alternative {
            symbols,
            inherited,
            shape,
            plan,
            selector: BTreeSet::new(),
        }
    }

    /// Símbolo de una ranura de operando propia.
    pub fn symbol(&self, slot: usize) -> &Symbol {
        &self.symbols[slot - self.inherited]
    }
}

impl Display for Alternative {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_symbols(fmt, &self.symbols)
    }
}

/// Gramática LL(1) con sus tablas de predicción.
#[derive(Debug, Clone)]
pub struct Normalized {
    start: usize,
    rules: Vec<Rule>,
    index: HashMap<Rc<str>, usize>,
    first: HashMap<Rc<str>, FirstSet>,
    follow: HashMap<Rc<str>, BTreeSet<TokenType>>,
    variables: BTreeSet<TokenType>,
}

impl Normalized {
    /// No terminal inicial.
    pub fn start(&self) -> &Rule {
        &self.rules[self.start]
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&index| &self.rules[index])
    }

    pub fn first(&self, name: &str) -> Option<&FirstSet> {
        self.first.get(name)
    }

    pub fn follow(&self, name: &str) -> Option<&BTreeSet<TokenType>> {
        self.follow.get(name)
    }

    /// Tipos de token que nombran variables (destinos de asignación o lectura).
    pub fn variables(&self) -> &BTreeSet<TokenType> {
        &self.variables
    }

    pub fn is_variable(&self, ty: &TokenType) -> bool {
        self.variables.contains(ty)
    }

    /// Alternativa predicha por un token de lookahead.
    pub fn select(&self, rule: &Rule, lookahead: &TokenType) -> Option<usize> {
        rule.alternatives
            .iter()
            .position(|alternative| alternative.selector.contains(lookahead))
    }

    /// Vista de la gramática reescrita, sin anotaciones.
    pub fn grammar(&self) -> Grammar {
        let mut grammar = Grammar::new(&self.start().name);
        for rule in &self.rules {
            for alternative in &rule.alternatives {
                grammar.add(&rule.name, Production::new(alternative.symbols.clone()));
            }
        }

        grammar
    }
}

impl Display for Normalized {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |fmt: &mut fmt::Formatter<'_>, set: &BTreeSet<TokenType>| {
            let names: Vec<&str> = set.iter().map(TokenType::as_str).collect();
            write!(fmt, "{{{}}}", names.join(", "))
        };

        writeln!(fmt, "# Productions")?;
        for rule in &self.rules {
            for (index, alternative) in rule.alternatives.iter().enumerate() {
                let arrow = if index == 0 { "->" } else { " |" };
                let lhs = if index == 0 { &*rule.name } else { "" };
                write!(fmt, "{:width$} {} {:40} ", lhs, arrow, alternative.to_string(), width = rule.name.len())?;
                show(fmt, &alternative.selector)?;
                writeln!(fmt)?;
            }
        }

        writeln!(fmt, "\n# FIRST / FOLLOW")?;
        for rule in &self.rules {
            write!(fmt, "{}: FIRST = ", rule.name)?;
            if let Some(first) = self.first.get(&rule.name) {
                show(fmt, &first.tokens)?;
                if first.nullable {
                    fmt.write_str(" + ε")?;
                }
            }

            fmt.write_str(", FOLLOW = ")?;
            if let Some(follow) = self.follow.get(&rule.name) {
                show(fmt, follow)?;
            }

            writeln!(fmt)?;
        }

        Ok(())
    }
}

/// Normaliza una gramática a LL(1).
pub fn normalize(grammar: &Grammar) -> Result<Normalized, GrammarError> {
    grammar.validate()?;

    let substituted = rewrite::substitute_indirect_recursion(grammar);
    let mut classifier = shape::Classifier::new(&substituted);
    let mut rules = Vec::new();
    for (name, productions) in substituted.rules() {
        let mut alternatives = Vec::with_capacity(productions.len());
        for production in productions {
            let shape = classifier.classify(name, production)?;
            let plan = shape.plan(production.symbols.len());
            alternatives.push(Alternative::new(production.symbols.clone(), 0, shape, plan));
        }

        rules.push(Rule {
            name: Rc::clone(name),
            origin: Rc::clone(name),
            alternatives,
        });
    }

    let mut rules = rewrite::eliminate_left_recursion(rules)?;

    let first = sets::first_sets(&rules);
    rewrite::check_indirect_left_recursion(&rules, &first)?;

    rewrite::left_factor(&mut rules);

    let first = sets::first_sets(&rules);
    let follow = sets::follow_sets(&rules, grammar.start(), &first);
    sets::assign_selectors(&mut rules, &first, &follow);
    sets::check_conflicts(&rules)?;

    let index: HashMap<Rc<str>, usize> = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| (Rc::clone(&rule.name), index))
        .collect();

    let start = index[grammar.start()];
    for rule in unreachable(&rules, &index, start) {
        warn!(nonterminal = %rule, "Nonterminal is unreachable from the start symbol");
    }

    debug!(
        declared = grammar.rules.len(),
        normalized = rules.len(),
        "Normalized grammar"
    );

    Ok(Normalized {
        start,
        rules,
        index,
        first,
        follow,
        variables: classifier.variables(),
    })
}

fn unreachable<'r>(
    rules: &'r [Rule],
    index: &HashMap<Rc<str>, usize>,
    start: usize,
) -> impl Iterator<Item = &'r Rc<str>> {
    let mut reached = vec![false; rules.len()];
    let mut pending = vec![start];

    while let Some(current) = pending.pop() {
        if std::mem::replace(&mut reached[current], true) {
            continue;
        }

        let symbols = rules[current]
            .alternatives
            .iter()
            .flat_map(|alternative| &alternative.symbols);

        pending.extend(
            symbols
                .filter_map(Symbol::as_nonterminal)
                .filter_map(|name| index.get(name).copied()),
        );
    }

    rules
        .iter()
        .zip(reached)
        .filter(|(_, reached)| !reached)
        .map(|(rule, _)| &rule.name)
}

fn write_symbols(fmt: &mut fmt::Formatter<'_>, symbols: &[Symbol]) -> fmt::Result {
    if symbols.is_empty() {
        return fmt.write_str("ε");
    }

    for (index, symbol) in symbols.iter().enumerate() {
        if index > 0 {
            fmt.write_str(" ")?;
        }

        write!(fmt, "{}", symbol)?;
    }

    Ok(())
}
