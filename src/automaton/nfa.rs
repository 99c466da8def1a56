//! Autómata finito no determinista por construcción de Thompson.
//!
//! Los estados viven en una arena y se referencian por índice. Cada
//! regla léxica produce un fragmento con un único estado de aceptación,
//! el cual se marca con el tipo de token y el orden de declaración de
//! la regla. Todos los fragmentos cuelgan de un inicio sintético por
//! medio de transiciones ε.

use std::collections::BTreeSet;

use super::regex::{CharSet, Regex};
use crate::lex::TokenType;

pub type StateId = usize;

/// Marca de aceptación de un estado.
///
/// Una prioridad menor corresponde a una regla declarada antes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accept {
    pub token: TokenType,
    pub priority: usize,
}

#[derive(Debug, Default, Clone)]
pub struct State {
    pub epsilon: Vec<StateId>,
    pub transitions: Vec<(CharSet, StateId)>,
    pub accept: Option<Accept>,
}

#[derive(Debug, Clone)]
pub struct Nfa {
    pub states: Vec<State>,
    pub start: StateId,
}

/// Subautómata con un inicio y una aceptación.
#[derive(Copy, Clone)]
struct Fragment {
    start: StateId,
    accept: StateId,
}

impl Nfa {
    /// Une todas las reglas bajo un inicio sintético.
    ///
    /// El orden del iterador define las prioridades.
    pub fn build<'a, I>(rules: I) -> Nfa
    where
        I: IntoIterator<Item = (&'a TokenType, &'a Regex)>,
    {
        let mut nfa = Nfa {
            states: vec![State::default()],
            start: 0,
        };

        for (priority, (token, regex)) in rules.into_iter().enumerate() {
            let fragment = nfa.thompson(regex);
            nfa.states[fragment.accept].accept = Some(Accept {
                token: token.clone(),
                priority,
            });

            nfa.states[nfa.start].epsilon.push(fragment.start);
        }

        nfa
    }

    /// Clausura ε de un conjunto de estados.
    pub fn epsilon_closure<I>(&self, seeds: I) -> BTreeSet<StateId>
    where
        I: IntoIterator<Item = StateId>,
    {
        let mut closure = BTreeSet::new();
        let mut pending: Vec<StateId> = seeds.into_iter().collect();

        while let Some(state) = pending.pop() {
            if closure.insert(state) {
                pending.extend(self.states[state].epsilon.iter().copied());
            }
        }

        closure
    }

    fn add_state(&mut self) -> StateId {
        self.states.push(State::default());
        self.states.len() - 1
    }

    fn link(&mut self, from: StateId, to: StateId) {
        self.states[from].epsilon.push(to);
    }

    /// Construcción local por tipo de nodo.
    fn thompson(&mut self, regex: &Regex) -> Fragment {
        match regex {
            Regex::Empty => {
                let start = self.add_state();
                let accept = self.add_state();
                self.link(start, accept);

                Fragment { start, accept }
            }

            Regex::Literal(c) => self.labeled(CharSet::single(*c)),
            Regex::Class(set) => self.labeled(set.clone()),

            Regex::Concat(left, right) => {
                let left = self.thompson(left);
                let right = self.thompson(right);
                self.link(left.accept, right.start);

                Fragment {
                    start: left.start,
                    accept: right.accept,
                }
            }

            Regex::Alternate(left, right) => {
                let start = self.add_state();
                let left = self.thompson(left);
                let right = self.thompson(right);
                let accept = self.add_state();

                self.link(start, left.start);
                self.link(start, right.start);
                self.link(left.accept, accept);
                self.link(right.accept, accept);

                Fragment { start, accept }
            }

            Regex::Closure(inner) => {
                let start = self.add_state();
                let inner = self.thompson(inner);
                let accept = self.add_state();

                self.link(start, inner.start);
                self.link(start, accept);
                self.link(inner.accept, inner.start);
                self.link(inner.accept, accept);

                Fragment { start, accept }
            }
        }
    }

    fn labeled(&mut self, label: CharSet) -> Fragment {
        let start = self.add_state();
        let accept = self.add_state();
        self.states[start].transitions.push((label, accept));

        Fragment { start, accept }
    }
}
