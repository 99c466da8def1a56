//! Construcción de subconjuntos y autómata combinado.
//!
//! # Alfabeto
//! Las transiciones del NFA se etiquetan con conjuntos de caracteres,
//! algunos de ellos enormes (`.`, clases negadas). En vez de iterar sobre
//! cada carácter posible, se parte el espacio de puntos de código en
//! intervalos disjuntos tales que todo carácter de un mismo intervalo se
//! comporta igual en cada transición. Cada intervalo es un símbolo del
//! alfabeto de entrada del DFA.
//!
//! # Prioridad
//! Si un estado del DFA contiene aceptaciones de varias reglas, gana
//! la de menor orden de declaración.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::debug;

use super::nfa::{Accept, Nfa, StateId};
use crate::lex::TokenType;

/// Índice de un símbolo del alfabeto particionado.
pub type SymbolClass = usize;

/// Partición del espacio de caracteres en intervalos equivalentes.
///
/// Solo se conservan intervalos que aparecen en alguna transición;
/// cualquier otro carácter carece de transiciones en todo estado.
#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    intervals: Vec<(u32, u32)>,
}

impl Alphabet {
    /// Calcula la partición a partir de las etiquetas del NFA.
    pub fn partition(nfa: &Nfa) -> Self {
        let mut bounds = BTreeSet::new();
        for state in &nfa.states {
            for (label, _) in &state.transitions {
                for &(from, to) in label.ranges() {
                    bounds.insert(from);
                    bounds.insert(to + 1);
                }
            }
        }

        let bounds: Vec<u32> = bounds.into_iter().collect();
        let intervals = bounds
            .windows(2)
            .map(|window| (window[0], window[1] - 1))
            .filter(|&(from, _)| {
                nfa.states.iter().any(|state| {
                    state
                        .transitions
                        .iter()
                        .any(|(label, _)| label.contains_point(from))
                })
            })
            .collect();

        Alphabet { intervals }
    }

    /// Símbolo al que pertenece un carácter, si alguno.
    pub fn classify(&self, c: char) -> Option<SymbolClass> {
        let point = c as u32;
        let index = self.intervals.partition_point(|&(_, to)| to < point);

        match self.intervals.get(index) {
            Some(&(from, _)) if from <= point => Some(index),
            _ => None,
        }
    }

    /// Cantidad de símbolos.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Punto de código representativo de un símbolo.
    fn representative(&self, class: SymbolClass) -> u32 {
        self.intervals[class].0
    }
}

/// Estado del DFA.
#[derive(Debug, Clone)]
pub struct DfaState {
    /// Identidad de construcción: conjunto de estados del NFA.
    pub nfa_states: BTreeSet<StateId>,
    pub transitions: BTreeMap<SymbolClass, usize>,
    /// Aceptación resuelta por prioridad.
    pub accept: Option<Accept>,
}

/// Autómata determinista que reconoce todas las reglas léxicas a la vez.
#[derive(Debug, Clone)]
pub struct CombinedDfa {
    alphabet: Alphabet,
    states: Vec<DfaState>,
    skip: HashSet<TokenType>,
}

impl CombinedDfa {
    /// Determiniza un NFA ya combinado.
    pub fn from_nfa(nfa: &Nfa, skip: HashSet<TokenType>) -> Self {
        let alphabet = Alphabet::partition(nfa);
        let states = subset_construction(nfa, &alphabet);

        debug!(
            nfa_states = nfa.states.len(),
            dfa_states = states.len(),
            symbols = alphabet.len(),
            "Built combined DFA"
        );

        CombinedDfa {
            alphabet,
            states,
            skip,
        }
    }

    /// Estado inicial; siempre el primero.
    pub fn start(&self) -> usize {
        0
    }

    pub fn states(&self) -> &[DfaState] {
        &self.states
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    /// Transición desde `state` con el carácter `c`.
    pub fn step(&self, state: usize, c: char) -> Option<usize> {
        let class = self.alphabet.classify(c)?;
        self.states[state].transitions.get(&class).copied()
    }

    /// Tipo de token aceptado en un estado.
    pub fn accepting(&self, state: usize) -> Option<&TokenType> {
        self.states[state].accept.as_ref().map(|accept| &accept.token)
    }

    /// Determina si un tipo de token se descarta al escanear.
    pub fn is_skipped(&self, token: &TokenType) -> bool {
        self.skip.contains(token)
    }

    /// Tipo de token que reconoce exactamente a `text`, si alguno.
    pub fn accepts(&self, text: &str) -> Option<&TokenType> {
        let mut state = self.start();
        for c in text.chars() {
            state = self.step(state, c)?;
        }

        self.accepting(state)
    }

    /// Prefijo aceptado más largo de `text`.
    ///
    /// Retorna el tipo de token y la longitud en bytes del lexema.
    pub fn longest_match(&self, text: &str) -> Option<(&TokenType, usize)> {
        let mut state = self.start();
        let mut last = None;

        for (offset, c) in text.char_indices() {
            state = match self.step(state, c) {
                Some(next) => next,
                None => break,
            };

            if let Some(token) = self.accepting(state) {
                last = Some((token, offset + c.len_utf8()));
            }
        }

        last
    }
}

/// Construcción de subconjuntos.
///
/// Los estados se numeran en orden de descubrimiento desde el inicio,
/// por lo que todos son alcanzables.
fn subset_construction(nfa: &Nfa, alphabet: &Alphabet) -> Vec<DfaState> {
    let start = nfa.epsilon_closure([nfa.start]);

    let mut ids: BTreeMap<BTreeSet<StateId>, usize> = BTreeMap::new();
    let mut states = vec![DfaState {
        accept: resolve_accept(nfa, &start),
        nfa_states: start.clone(),
        transitions: BTreeMap::new(),
    }];

    ids.insert(start.clone(), 0);
    let mut pending = VecDeque::from([start]);

    while let Some(current) = pending.pop_front() {
        let current_id = ids[&current];

        for class in 0..alphabet.len() {
            let point = alphabet.representative(class);
            let moved: Vec<StateId> = current
                .iter()
                .flat_map(|&state| nfa.states[state].transitions.iter())
                .filter(|(label, _)| label.contains_point(point))
                .map(|&(_, target)| target)
                .collect();

            if moved.is_empty() {
                continue;
            }

            let target = nfa.epsilon_closure(moved);
            let target_id = match ids.get(&target) {
                Some(&id) => id,
                None => {
                    let id = states.len();
                    states.push(DfaState {
                        accept: resolve_accept(nfa, &target),
                        nfa_states: target.clone(),
                        transitions: BTreeMap::new(),
                    });

                    ids.insert(target.clone(), id);
                    pending.push_back(target);
                    id
                }
            };

            states[current_id].transitions.insert(class, target_id);
        }
    }

    states
}

/// La regla declarada primero gana.
fn resolve_accept(nfa: &Nfa, states: &BTreeSet<StateId>) -> Option<Accept> {
    states
        .iter()
        .filter_map(|&state| nfa.states[state].accept.as_ref())
        .min_by_key(|accept| accept.priority)
        .cloned()
}
