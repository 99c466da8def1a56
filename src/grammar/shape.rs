//! Formas de producción y planes de emisión.
//!
//! La traducción de una alternativa depende únicamente de su forma
//! estructural (o de una [`Hint`] explícita), nunca de nombres de tokens
//! en particular. La forma se calcula una única vez durante la
//! normalización y de ella se deriva un plan: una lista ordenada de
//! pasos que el traductor ejecuta sin conocer la construcción original.
//!
//! # Ranuras
//! Cada símbolo de una alternativa ocupa una ranura de operando. Los
//! índices de [`Shape`] y [`Step`] se refieren a ranuras, no a
//! posiciones dentro de la lista de símbolos; ver
//! [`super::Alternative`].

use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use super::{Grammar, GrammarError, Hint, Production, Symbol};
use crate::lex::TokenType;

/// Forma estructural de una alternativa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// `ε`, sin valor.
    Empty,

    /// Un único símbolo cuyo valor se propaga.
    Pass(usize),

    /// `( x )`, delimitadores alrededor de un valor.
    Group(usize),

    /// `a op b`
    Binary {
        left: usize,
        op: usize,
        right: usize,
    },

    /// `x = v`
    Assignment { target: usize, value: usize },

    /// `kw ( c ) s [else s]`, condicional o ciclo.
    Guarded {
        condition: usize,
        body: usize,
        otherwise: Option<usize>,
        looping: bool,
    },

    /// Declaración de variables.
    Declare,

    /// Lectura hacia una variable.
    Input { keyword: usize, target: usize },

    /// Escritura de un valor.
    Output { keyword: usize, argument: usize },

    /// Cualquier otra secuencia, sin valor.
    Sequence,
}

/// Paso de un plan de emisión.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Step {
    /// Analiza el símbolo de una ranura como operando.
    Parse(usize),

    /// Analiza un terminal que recibirá un valor.
    Target(usize),

    /// Analiza un terminal sin verificarlo como variable, como la palabra
    /// clave de una lectura o escritura.
    Shift(usize),

    /// Verifica como lectura o destino, según la forma, un terminal que
    /// un prefijo factorizado ya analizó con [`Step::Shift`].
    Verify(usize),

    /// Entra o sale de una zona de declaración de variables.
    Declaring(bool),

    /// Recuerda la posición actual del búfer de instrucciones.
    Mark,

    /// Emite la prueba negada y el salto hacia la salida.
    Guard { condition: usize, looping: bool },

    /// Salto incondicional de regreso a la entrada del ciclo.
    Repeat,

    /// Etiqueta de salida.
    Exit,

    /// Salta sobre la rama alternativa y emite la etiqueta de salida.
    Skip,

    /// Etiqueta de fin de la rama alternativa.
    Join,

    /// Aplica la regla de traducción de la forma.
    Reduce,

    /// Desciende al no terminal de una ranura, pasándole contexto.
    Descend { index: usize, carry: Carry },
}

/// Contexto que hereda una alternativa al descender a otra.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Carry {
    /// El valor reducido, como acumulador de recursión izquierda.
    Value,

    /// Todos los operandos y el marco de control, como prefijo factorizado.
    Operands,
}

impl Shape {
    /// Construye el plan de una alternativa de `length` símbolos propios.
    pub fn plan(&self, length: usize) -> Vec<Step> {
        let parse = |slot| {
            if self.is_target(slot) {
                Step::Target(slot)
            } else if self.is_keyword(slot) {
                Step::Shift(slot)
            } else {
                Step::Parse(slot)
            }
        };

        let mut plan = Vec::with_capacity(length + 4);
        match *self {
            Shape::Guarded {
                condition,
                body,
                otherwise,
                looping,
            } => {
                if looping {
                    plan.push(Step::Mark);
                }

                plan.extend((0..=condition).map(parse));
                plan.push(Step::Guard { condition, looping });
                plan.extend((condition + 1..=body).map(parse));

                if otherwise.is_some() {
                    plan.push(Step::Skip);
                    plan.extend((body + 1..length).map(parse));
                    plan.push(Step::Join);
                } else {
                    plan.extend((body + 1..length).map(parse));
                    if looping {
                        plan.push(Step::Repeat);
                    }

                    plan.push(Step::Exit);
                }
            }

            Shape::Declare => {
                plan.push(Step::Declaring(true));
                plan.extend((0..length).map(parse));
                plan.push(Step::Declaring(false));
            }

            _ => plan.extend((0..length).map(parse)),
        }

        plan.push(Step::Reduce);
        plan
    }

    /// Determina si las alternativas con esta forma pueden plegarse
    /// como repeticiones de recursión izquierda.
    pub fn foldable(&self) -> bool {
        !matches!(self, Shape::Guarded { .. } | Shape::Declare)
    }

    /// Determina si la ranura recibe un valor al reducir.
    pub fn is_target(&self, slot: usize) -> bool {
        match *self {
            Shape::Assignment { target, .. } | Shape::Input { target, .. } => target == slot,
            _ => false,
        }
    }

    fn is_keyword(&self, slot: usize) -> bool {
        match *self {
            Shape::Input { keyword, .. } | Shape::Output { keyword, .. } => keyword == slot,
            _ => false,
        }
    }
}

/// Clasificador de alternativas para una gramática en particular.
///
/// Distingue terminales de valor (los que aparecen solos en una
/// alternativa, como literales e identificadores) de operadores, y
/// no terminales de operador (todas sus alternativas son un único
/// terminal y aparecen entre dos operandos).
pub struct Classifier {
    values: HashSet<TokenType>,
    operators: HashSet<Rc<str>>,
    variables: BTreeSet<TokenType>,
}

impl Classifier {
    pub fn new(grammar: &Grammar) -> Self {
        let single_terminals = |productions: &[Production]| {
            productions
                .iter()
                .all(|production| matches!(production.symbols.as_slice(), [Symbol::Terminal(_)]))
        };

        let between_operands: HashSet<&Rc<str>> = grammar
            .rules()
            .flat_map(|(_, productions)| productions)
            .filter_map(|production| match production.symbols.as_slice() {
                [Symbol::Nonterminal(_), Symbol::Nonterminal(op), _] => Some(op),
                _ => None,
            })
            .collect();

        let operators: HashSet<Rc<str>> = grammar
            .rules()
            .filter(|(name, productions)| {
                between_operands.contains(name) && single_terminals(*productions)
            })
            .map(|(name, _)| Rc::clone(name))
            .collect();

        let values = grammar
            .rules()
            .filter(|(name, _)| !operators.contains(*name))
            .flat_map(|(_, productions)| productions)
            .filter_map(|production| match production.symbols.as_slice() {
                [Symbol::Terminal(ty)] => Some(ty.clone()),
                _ => None,
            })
            .collect();

        Classifier {
            values,
            operators,
            variables: BTreeSet::new(),
        }
    }

    /// Tipos de token asignados o leídos en alguna alternativa.
    pub fn variables(self) -> BTreeSet<TokenType> {
        self.variables
    }

    /// Calcula la forma de una alternativa.
    pub fn classify(&mut self, rule: &Rc<str>, production: &Production) -> Result<Shape, GrammarError> {
        let symbols = production.symbols.as_slice();
        let shape = match production.hint {
            None => self.structural(symbols),
            Some(hint) => self.hinted(hint, symbols).ok_or_else(|| GrammarError::HintMismatch {
                rule: Rc::clone(rule),
                hint,
                production: production.to_string(),
            })?,
        };

        if let Shape::Assignment { target, .. } | Shape::Input { target, .. } = shape {
            if let Some(ty) = symbols[target].as_terminal() {
                self.variables.insert(ty.clone());
            }
        }

        Ok(shape)
    }

    fn structural(&self, symbols: &[Symbol]) -> Shape {
        use Symbol::Nonterminal as N;
        use Symbol::Terminal as T;

        match symbols {
            [] => Shape::Empty,
            [_] => Shape::Pass(0),

            [left, op, right]
                if self.is_operand(left) && self.is_operator(op) && self.is_operand(right) =>
            {
                Shape::Binary {
                    left: 0,
                    op: 1,
                    right: 2,
                }
            }

            [T(_), N(_), T(_)] => Shape::Group(1),
            [T(_), T(_), N(_), T(_)] => Shape::Assignment {
                target: 0,
                value: 2,
            },

            [T(_), T(_), N(_), T(_), N(_)] => Shape::Guarded {
                condition: 2,
                body: 4,
                otherwise: None,
                looping: false,
            },

            [T(_), T(_), N(_), T(_), T(_)] => Shape::Output {
                keyword: 0,
                argument: 2,
            },

            [T(_), T(_), N(_), T(_), N(_), T(_), N(_)] => Shape::Guarded {
                condition: 2,
                body: 4,
                otherwise: Some(6),
                looping: false,
            },

            _ => Shape::Sequence,
        }
    }

    fn hinted(&self, hint: Hint, symbols: &[Symbol]) -> Option<Shape> {
        if hint != Hint::Declare {
            symbols.first().filter(|symbol| symbol.is_terminal())?;
        }

        let nonterminals = || (1..symbols.len()).filter(|&slot| !symbols[slot].is_terminal());
        let shape = match hint {
            Hint::Declare => Shape::Declare,

            Hint::Loop => {
                let condition = nonterminals().next()?;
                let body = nonterminals().last().filter(|&body| body > condition)?;

                Shape::Guarded {
                    condition,
                    body,
                    otherwise: None,
                    looping: true,
                }
            }

            Hint::Read => {
                let target = (1..symbols.len())
                    .find(|&slot| self.is_value(&symbols[slot]))
                    .or_else(|| symbols.get(1).filter(|symbol| symbol.is_terminal()).map(|_| 1))?;

                Shape::Input { keyword: 0, target }
            }

            Hint::Write => {
                let argument = (1..symbols.len()).find(|&slot| self.is_operand(&symbols[slot]))?;
                Shape::Output {
                    keyword: 0,
                    argument,
                }
            }

            Hint::Assign => Shape::Assignment {
                target: 0,
                value: nonterminals().next()?,
            },
        };

        Some(shape)
    }

    fn is_value(&self, symbol: &Symbol) -> bool {
        matches!(symbol, Symbol::Terminal(ty) if self.values.contains(ty))
    }

    fn is_operand(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Terminal(ty) => self.values.contains(ty),
            Symbol::Nonterminal(name) => !self.operators.contains(name),
        }
    }

    fn is_operator(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Terminal(ty) => !self.values.contains(ty),
            Symbol::Nonterminal(name) => self.operators.contains(name),
        }
    }
}
