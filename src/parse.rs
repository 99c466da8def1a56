//! Traducción dirigida por sintaxis en una sola pasada.
//!
//! # Predicción
//! El traductor es un analizador descendente recursivo guiado por las
//! tablas de un [`Normalized`]. Para expandir un no terminal se elige la
//! alternativa cuyo selector contiene el token de lookahead; si ninguna
//! lo contiene el análisis falla con un [`SyntaxError`].
//!
//! # Planes de emisión
//! La alternativa elegida no se recorre símbolo por símbolo, sino que se
//! ejecuta su plan (ver [`crate::grammar::shape`]). Los pasos de análisis
//! consumen símbolos y acumulan operandos; los pasos de control emiten
//! pruebas, saltos y etiquetas; el paso de reducción aplica la regla de
//! traducción de la forma y sintetiza el valor del nodo.
//!
//! # Backpatching
//! Un condicional `if ( c ) s` emite la prueba negada de `c` y el salto
//! hacia la etiqueta de salida *antes* de analizar `s`, de modo que el
//! código del cuerpo queda detrás del salto:
//!
//! ```text
//! t2 = not t1
//! if t2 goto L1
//! <cuerpo>
//! L1:
//! ```
//!
//! En un ciclo la etiqueta de entrada se inserta retroactivamente en la
//! posición marcada antes de la condición, y el salto de regreso se emite
//! tras el cuerpo.
//!
//! # Errores
//! Los errores sintácticos detienen la traducción. Los semánticos se
//! acumulan y se reportan juntos al final.

use std::{
    collections::BTreeSet,
    fmt::{self, Display},
    mem,
    rc::Rc,
};

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    grammar::{Alternative, Carry, Normalized, Rule, Shape, Step, Symbol},
    ir::{self, Emitter, Instruction, Label, Value},
    lex::{Token, TokenType},
    semantic::{SemanticError, SymbolTable},
    source::{Located, Location, Position, Source},
};

bitflags! {
    /// Opciones de traducción.
    pub struct Options: u32 {
        /// Reportar lecturas de variables que nunca recibieron valor.
        const CHECK_VARIABLES = 0x01;

        /// Exigir que toda variable asignada o leída se declare antes.
        const EXPLICIT_DECLARATIONS = 0x02;

        /// Conservar el árbol de traducción completo.
        ///
        /// Por defecto los hijos de un nodo se descartan en cuanto el
        /// padre consume sus valores.
        const RETAIN_TREE = 0x04;
    }
}

impl Default for Options {
    fn default() -> Self {
        Options::CHECK_VARIABLES
    }
}

#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SyntaxError {
    #[error("Expected `{expected}`, found {found}")]
    Unexpected { expected: TokenType, found: Token },

    #[error("Expected {} to begin `{nonterminal}`, found {found}", one_of(.expected))]
    NoAlternative {
        nonterminal: Rc<str>,
        expected: Vec<TokenType>,
        found: Token,
    },

    #[error("Expected end of input, found {0}")]
    TrailingInput(Token),
}

fn one_of(expected: &[TokenType]) -> String {
    let names: Vec<String> = expected.iter().map(|ty| format!("`{}`", ty)).collect();
    match names.as_slice() {
        [single] => single.clone(),
        _ => format!("one of {}", names.join(", ")),
    }
}

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error(transparent)]
    Syntax(#[from] Located<SyntaxError>),

    #[error("Translation found {} semantic error(s)", .0.len())]
    Semantic(Vec<Located<SemanticError>>),
}

/// Nodo del árbol de traducción.
#[derive(Debug, Clone)]
pub struct Node {
    /// No terminal expandido o tipo del token consumido.
    pub symbol: Rc<str>,
    pub children: Vec<Node>,
    pub token: Option<Token>,
    /// Atributo sintetizado.
    pub value: Option<Value>,
    pub location: Location,
}

impl Node {
    fn branch(symbol: &Rc<str>, location: Location) -> Self {
        Node {
            symbol: Rc::clone(symbol),
            children: Vec::new(),
            token: None,
            value: None,
            location,
        }
    }

    fn leaf(token: &Token) -> Self {
        Node {
            symbol: Rc::from(token.ty().as_str()),
            children: Vec::new(),
            token: Some(token.clone()),
            value: Some(Value::Name(token.lexeme())),
            location: token.location().clone(),
        }
    }

    fn write(&self, fmt: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(fmt, "{:indent$}", "", indent = depth * 2)?;
        match (&self.token, &self.value) {
            (Some(token), _) => writeln!(fmt, "{}", token)?,
            (None, Some(value)) => writeln!(fmt, "{} => {}", self.symbol, value)?,
            (None, None) => writeln!(fmt, "{}", self.symbol)?,
        }

        for child in &self.children {
            child.write(fmt, depth + 1)?;
        }

        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(fmt, 0)
    }
}

/// Resultado de una traducción exitosa.
#[derive(Debug)]
pub struct Translation {
    instructions: Vec<Instruction>,
    tree: Option<Node>,
}

impl Translation {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instrucciones en texto, una por línea.
    pub fn lines(&self) -> Vec<String> {
        self.instructions.iter().map(ToString::to_string).collect()
    }

    /// Grafo de flujo de control de las instrucciones, en Mermaid.
    pub fn flow_graph(&self) -> String {
        ir::flow_graph(&self.instructions)
    }

    /// Árbol de traducción, solo con [`Options::RETAIN_TREE`].
    pub fn tree(&self) -> Option<&Node> {
        self.tree.as_ref()
    }
}

impl Display for Translation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            writeln!(fmt, "{}", instruction)?;
        }

        Ok(())
    }
}

/// Traduce un flujo de tokens a partir del símbolo inicial.
///
/// Si el flujo no termina en `EOF` se asume uno tras el último token.
/// Cada llamada parte de contadores y tabla de símbolos nuevos.
pub fn translate(
    tokens: &[Token],
    grammar: &Normalized,
    options: Options,
) -> Result<Translation, TranslateError> {
    let terminated;
    let tokens = match tokens.last() {
        Some(last) if last.ty().is_eof() => tokens,

        last => {
            let location = match last {
                Some(last) => last.location().after(),
                None => Location::point(&Source::new("<input>", ""), Position::default()),
            };

            let mut owned = tokens.to_vec();
            owned.push(Token::new(TokenType::eof(), "", location));

            terminated = owned;
            &terminated
        }
    };

    let mut translator = Translator {
        grammar,
        tokens,
        cursor: 0,
        options,
        emitter: Emitter::new(),
        symbols: SymbolTable::new(),
        errors: Vec::new(),
        declaring: 0,
    };

    let root = translator.nonterminal(grammar.start(), Vec::new(), Frame::default())?;

    let last = translator.peek();
    if !last.ty().is_eof() {
        let error = SyntaxError::TrailingInput(last.clone());
        return Err(Located::at(error, last.location().clone()).into());
    }

    let Translator {
        emitter, errors, ..
    } = translator;

    debug!(
        instructions = emitter.position(),
        errors = errors.len(),
        "Translated input"
    );

    if !errors.is_empty() {
        return Err(TranslateError::Semantic(errors));
    }

    Ok(Translation {
        instructions: emitter.finish(),
        tree: options.contains(Options::RETAIN_TREE).then(|| root),
    })
}

type Parse<T> = Result<T, Located<SyntaxError>>;

/// Operando de una regla de traducción, por ranura.
#[derive(Debug, Clone)]
struct Operand {
    symbol: Rc<str>,
    value: Option<Value>,
    location: Location,
}

impl Operand {
    fn of(node: &Node) -> Self {
        Operand {
            symbol: Rc::clone(&node.symbol),
            value: node.value.clone(),
            location: node.location.clone(),
        }
    }
}

/// Cómo se verifica un terminal al analizarlo.
#[derive(Debug, Copy, Clone)]
enum Access {
    Read,
    Write,
    Plain,
}

/// Etiquetas de una construcción de control en curso.
#[derive(Debug, Default)]
struct Frame {
    /// Posición marcada y etiqueta de entrada de un ciclo.
    entry: Option<(usize, Label)>,
    exit: Option<Label>,
    end: Option<Label>,
}

struct Translator<'a> {
    grammar: &'a Normalized,
    tokens: &'a [Token],
    cursor: usize,
    options: Options,
    emitter: Emitter,
    symbols: SymbolTable,
    errors: Vec<Located<SemanticError>>,
    declaring: u32,
}

/// Expansión suspendida mientras se analiza un no terminal en posición
/// de cola de su plan.
struct Suspended<'a> {
    rule: &'a Rule,
    alternative: &'a Alternative,
    operands: Vec<Option<Operand>>,
    children: Vec<Node>,
    first: usize,
    /// Ranura que recibe el valor del hijo; `None` si es un descenso.
    slot: Option<usize>,
    /// Si aún falta reducir tras el hijo.
    reduce: bool,
}

enum Expansion<'a> {
    Done(Node),
    Tail {
        parent: Suspended<'a>,
        rule: &'a Rule,
        inherited: Vec<Option<Operand>>,
        frame: Frame,
    },
}

/// Determina si un paso seguido de `rest` está en posición de cola.
fn is_tail(rest: &[Step]) -> bool {
    matches!(rest, [] | [Step::Reduce])
}

impl<'a> Translator<'a> {
    /// Expande un no terminal.
    ///
    /// Los no terminales en posición de cola (listas recursivas por la
    /// derecha y colas de recursión izquierda) se encadenan en un ciclo,
    /// de modo que la profundidad de la pila solo crece con el anidamiento.
    fn nonterminal(
        &mut self,
        rule: &'a Rule,
        inherited: Vec<Option<Operand>>,
        frame: Frame,
    ) -> Parse<Node> {
        let mut pending = Vec::new();
        let mut next = (rule, inherited, frame);

        let mut node = loop {
            let (rule, inherited, frame) = next;
            match self.expand(rule, inherited, frame)? {
                Expansion::Done(node) => break node,
                Expansion::Tail {
                    parent,
                    rule,
                    inherited,
                    frame,
                } => {
                    pending.push(parent);
                    next = (rule, inherited, frame);
                }
            }
        };

        while let Some(parent) = pending.pop() {
            node = self.resume(parent, node);
        }

        Ok(node)
    }

    /// Ejecuta el plan de la alternativa elegida hasta su final o hasta
    /// un no terminal en posición de cola.
    fn expand(
        &mut self,
        rule: &'a Rule,
        inherited: Vec<Option<Operand>>,
        mut frame: Frame,
    ) -> Parse<Expansion<'a>> {
        let lookahead = self.peek();
        let alternative = match self.grammar.select(rule, lookahead.ty()) {
            Some(index) => &rule.alternatives[index],
            None => return Err(self.no_alternative(rule)),
        };

        trace!(
            nonterminal = %rule.name,
            %alternative,
            lookahead = %lookahead.ty(),
            "Selected alternative"
        );

        let first = self.cursor;
        let mut operands = inherited;
        operands.resize(alternative.inherited + alternative.symbols.len(), None);

        let mut children = Vec::new();
        let mut value = None;

        for (index, step) in alternative.plan.iter().enumerate() {
            let rest = &alternative.plan[index + 1..];
            match *step {
                Step::Parse(slot) => {
                    let symbol = alternative.symbol(slot);
                    if let (Symbol::Nonterminal(name), true) = (symbol, is_tail(rest)) {
                        return Ok(Expansion::Tail {
                            parent: Suspended {
                                rule,
                                alternative,
                                operands,
                                children,
                                first,
                                slot: Some(slot),
                                reduce: !rest.is_empty(),
                            },
                            rule: self.rule(name),
                            inherited: Vec::new(),
                            frame: Frame::default(),
                        });
                    }

                    let (operand, child) = self.symbol(symbol, Access::Read)?;
                    operands[slot] = Some(operand);
                    children.push(child);
                }

                Step::Target(slot) => {
                    let (operand, child) = self.symbol(alternative.symbol(slot), Access::Write)?;
                    operands[slot] = Some(operand);
                    children.push(child);
                }

                Step::Shift(slot) => {
                    let (operand, child) = self.symbol(alternative.symbol(slot), Access::Plain)?;
                    operands[slot] = Some(operand);
                    children.push(child);
                }

                Step::Verify(slot) => {
                    let target = alternative.shape.is_target(slot);
                    if let Some(operand) = &operands[slot] {
                        self.verify(operand, target);
                    }
                }

                Step::Declaring(true) => self.declaring += 1,
                Step::Declaring(false) => self.declaring -= 1,

                Step::Mark => {
                    let entry = self.emitter.new_label();
                    frame.entry = Some((self.emitter.position(), entry));
                }

                Step::Guard { condition, .. } => {
                    let exit = self.emitter.new_label();
                    if let Some(test) = self.required(&operands, condition) {
                        let negated = self.emitter.new_temp();
                        self.emitter.emit(Instruction::Not {
                            target: negated,
                            operand: test,
                        });

                        self.emitter.emit(Instruction::JumpIf(negated.into(), exit));
                    }

                    frame.exit = Some(exit);
                }

                Step::Repeat => {
                    if let Some((mark, entry)) = frame.entry {
                        self.emitter.emit(Instruction::Jump(entry));
                        self.emitter.insert_at(mark, Instruction::SetLabel(entry));
                    }
                }

                Step::Exit => {
                    if let Some(exit) = frame.exit {
                        self.emitter.emit(Instruction::SetLabel(exit));
                    }
                }

                Step::Skip => {
                    let end = self.emitter.new_label();
                    self.emitter.emit(Instruction::Jump(end));
                    if let Some(exit) = frame.exit {
                        self.emitter.emit(Instruction::SetLabel(exit));
                    }

                    frame.end = Some(end);
                }

                Step::Join => {
                    if let Some(end) = frame.end {
                        self.emitter.emit(Instruction::SetLabel(end));
                    }
                }

                Step::Reduce => value = self.reduce(alternative, &operands),

                Step::Descend { index, carry } => {
                    let name = match alternative.symbol(index) {
                        Symbol::Nonterminal(name) => name,
                        Symbol::Terminal(ty) => unreachable!("descent into terminal `{}`", ty),
                    };

                    let (inherited, frame) = match carry {
                        Carry::Value => {
                            let accumulator = Operand {
                                symbol: Rc::clone(&rule.origin),
                                value: value.take(),
                                location: self.span_from(first),
                            };

                            (vec![Some(accumulator)], Frame::default())
                        }

                        Carry::Operands => (operands[..index].to_vec(), mem::take(&mut frame)),
                    };

                    if is_tail(rest) {
                        return Ok(Expansion::Tail {
                            parent: Suspended {
                                rule,
                                alternative,
                                operands,
                                children,
                                first,
                                slot: None,
                                reduce: !rest.is_empty(),
                            },
                            rule: self.rule(name),
                            inherited,
                            frame,
                        });
                    }

                    let child = self.nonterminal(self.rule(name), inherited, frame)?;
                    value = child.value.clone();
                    children.push(child);
                }
            }
        }

        Ok(Expansion::Done(self.build(rule, first, value, children)))
    }

    /// Completa una expansión suspendida con el nodo de su hijo de cola.
    fn resume(&mut self, parent: Suspended<'a>, child: Node) -> Node {
        let Suspended {
            rule,
            alternative,
            mut operands,
            mut children,
            first,
            slot,
            reduce,
        } = parent;

        let mut value = match slot {
            Some(slot) => {
                operands[slot] = Some(Operand::of(&child));
                None
            }

            None => child.value.clone(),
        };

        children.push(child);
        if reduce {
            value = self.reduce(alternative, &operands);
        }

        self.build(rule, first, value, children)
    }

    fn build(&self, rule: &Rule, first: usize, value: Option<Value>, children: Vec<Node>) -> Node {
        let mut node = Node::branch(&rule.name, self.span_from(first));
        node.value = value;
        if self.options.contains(Options::RETAIN_TREE) {
            node.children = children;
        }

        node
    }

    fn symbol(&mut self, symbol: &'a Symbol, access: Access) -> Parse<(Operand, Node)> {
        let node = match symbol {
            Symbol::Terminal(ty) => {
                let token = self.expect(ty)?;
                let name = token.lexeme();
                match access {
                    Access::Read => self.check_read(token.ty(), &name, token.location()),
                    Access::Write => self.check_target(&name, token.location()),
                    Access::Plain => (),
                }

                Node::leaf(token)
            }

            Symbol::Nonterminal(name) => {
                self.nonterminal(self.rule(name), Vec::new(), Frame::default())?
            }
        };

        Ok((Operand::of(&node), node))
    }

    /// Verifica un terminal analizado antes de conocer su papel.
    fn verify(&mut self, operand: &Operand, target: bool) {
        let name = match &operand.value {
            Some(Value::Name(name)) => Rc::clone(name),
            _ => return,
        };

        if target {
            self.check_target(&name, &operand.location);
        } else {
            self.check_read(&TokenType::new(&operand.symbol), &name, &operand.location);
        }
    }

    /// Aplica la regla de traducción de la forma de una alternativa.
    fn reduce(&mut self, alternative: &Alternative, operands: &[Option<Operand>]) -> Option<Value> {
        match alternative.shape {
            Shape::Empty | Shape::Sequence | Shape::Declare | Shape::Guarded { .. } => None,

            Shape::Pass(slot) | Shape::Group(slot) => {
                operands[slot].as_ref().and_then(|operand| operand.value.clone())
            }

            Shape::Binary { left, op, right } => {
                let left = self.required(operands, left);
                let op = self.required(operands, op);
                let right = self.required(operands, right);

                let (left, op, right) = (left?, op?, right?);
                let target = self.emitter.new_temp();

                self.emitter.emit(Instruction::Binary {
                    target,
                    left,
                    op: Rc::from(op.to_string()),
                    right,
                });

                Some(Value::Temp(target))
            }

            Shape::Assignment { target, value } => {
                let source = self.required(operands, value)?;
                let target = self.define(operands, target)?;

                self.emitter.emit(Instruction::Copy { target, source });
                None
            }

            Shape::Input { keyword, target } => {
                let callee = self.required(operands, keyword)?;
                let target = self.define(operands, target)?;
                let temp = self.emitter.new_temp();

                self.emitter.emit(Instruction::Call {
                    target: Some(temp),
                    callee: Rc::from(callee.to_string()),
                    arguments: 0,
                });

                self.emitter.emit(Instruction::Copy {
                    target,
                    source: temp.into(),
                });

                None
            }

            Shape::Output { keyword, argument } => {
                let callee = self.required(operands, keyword)?;
                let argument = self.required(operands, argument)?;

                self.emitter.emit(Instruction::Param(argument));
                self.emitter.emit(Instruction::Call {
                    target: None,
                    callee: Rc::from(callee.to_string()),
                    arguments: 1,
                });

                None
            }
        }
    }

    /// Valor de un operando que la regla no puede omitir.
    fn required(&mut self, operands: &[Option<Operand>], slot: usize) -> Option<Value> {
        let operand = operands.get(slot)?.as_ref()?;
        if operand.value.is_none() {
            let error = SemanticError::MissingValue(operand.symbol.to_string());
            self.errors.push(Located::at(error, operand.location.clone()));
        }

        operand.value.clone()
    }

    /// Registra que el destino de una ranura recibe un valor.
    fn define(&mut self, operands: &[Option<Operand>], slot: usize) -> Option<Value> {
        let target = self.required(operands, slot)?;
        if let Value::Name(name) = &target {
            self.symbols.define(name);
        }

        Some(target)
    }

    fn check_read(&mut self, ty: &TokenType, name: &Rc<str>, location: &Location) {
        if !self.grammar.is_variable(ty) {
            return;
        }

        let result = if self.declaring > 0 {
            self.symbols.declare(name, location)
        } else if self.options.contains(Options::CHECK_VARIABLES) {
            self.symbols.lookup(name, location)
        } else {
            Ok(())
        };

        self.errors.extend(result.err());
    }

    fn check_target(&mut self, name: &Rc<str>, location: &Location) {
        let result = if self.declaring > 0 {
            self.symbols.declare(name, location)
        } else if self.options.contains(Options::EXPLICIT_DECLARATIONS) {
            self.symbols.check_declared(name, location)
        } else {
            Ok(())
        };

        self.errors.extend(result.err());
    }

    fn rule(&self, name: &str) -> &'a Rule {
        let grammar = self.grammar;
        grammar
            .rule(name)
            .expect("normalized grammars only reference defined nonterminals")
    }

    fn peek(&self) -> &'a Token {
        let tokens = self.tokens;
        &tokens[self.cursor]
    }

    /// Consume el token actual si es del tipo esperado.
    ///
    /// El `EOF` final nunca se consume, de modo que siempre hay lookahead.
    fn expect(&mut self, expected: &TokenType) -> Parse<&'a Token> {
        let token = self.peek();
        if token.ty() != expected {
            let error = SyntaxError::Unexpected {
                expected: expected.clone(),
                found: token.clone(),
            };

            return Err(Located::at(error, token.location().clone()));
        }

        if !token.ty().is_eof() {
            self.cursor += 1;
        }

        Ok(token)
    }

    fn no_alternative(&self, rule: &Rule) -> Located<SyntaxError> {
        let expected: BTreeSet<&TokenType> = rule
            .alternatives
            .iter()
            .flat_map(|alternative| &alternative.selector)
            .collect();

        let found = self.peek();
        let error = SyntaxError::NoAlternative {
            nonterminal: Rc::clone(&rule.origin),
            expected: expected.into_iter().cloned().collect(),
            found: found.clone(),
        };

        Located::at(error, found.location().clone())
    }

    /// Ubicación de los tokens consumidos desde `first`.
    fn span_from(&self, first: usize) -> Location {
        let start = self.tokens[first].location().clone();
        if self.cursor > first {
            Location::span(start, self.tokens[self.cursor - 1].location())
        } else {
            start
        }
    }
}
