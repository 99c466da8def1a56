//! Conjuntos FIRST, FOLLOW y selectores de predicción.

use std::{
    collections::{BTreeSet, HashMap},
    rc::Rc,
};

use tracing::debug;

use super::{GrammarError, Rule, Symbol};
use crate::lex::TokenType;

/// Conjunto FIRST de un no terminal o secuencia.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstSet {
    pub tokens: BTreeSet<TokenType>,
    /// Si la secuencia puede derivar ε.
    pub nullable: bool,
}

/// Calcula FIRST de cada no terminal por punto fijo.
pub fn first_sets(rules: &[Rule]) -> HashMap<Rc<str>, FirstSet> {
    let mut first: HashMap<Rc<str>, FirstSet> = rules
        .iter()
        .map(|rule| (Rc::clone(&rule.name), FirstSet::default()))
        .collect();

    let mut iterations = 0;
    let mut changed = true;
    while changed {
        changed = false;
        iterations += 1;

        for rule in rules {
            for alternative in &rule.alternatives {
                let computed = sequence_first(&alternative.symbols, &first);
                let entry = first
                    .get_mut(&rule.name)
                    .expect("every rule has a FIRST entry");

                let before = (entry.tokens.len(), entry.nullable);
                entry.tokens.extend(computed.tokens);
                entry.nullable |= computed.nullable;

                changed |= before != (entry.tokens.len(), entry.nullable);
            }
        }
    }

    debug!(iterations, "Computed FIRST sets");
    first
}

/// FIRST de una secuencia de símbolos.
///
/// Un no terminal ausente de `first` se trata como no anulable y vacío.
pub fn sequence_first(symbols: &[Symbol], first: &HashMap<Rc<str>, FirstSet>) -> FirstSet {
    let mut result = FirstSet::default();
    for symbol in symbols {
        match symbol {
            Symbol::Terminal(ty) => {
                result.tokens.insert(ty.clone());
                return result;
            }

            Symbol::Nonterminal(name) => match first.get(name) {
                Some(set) => {
                    result.tokens.extend(set.tokens.iter().cloned());
                    if !set.nullable {
                        return result;
                    }
                }

                None => return result,
            },
        }
    }

    result.nullable = true;
    result
}

/// Calcula FOLLOW de cada no terminal por punto fijo.
///
/// FOLLOW del símbolo inicial siempre contiene `EOF`.
pub fn follow_sets(
    rules: &[Rule],
    start: &str,
    first: &HashMap<Rc<str>, FirstSet>,
) -> HashMap<Rc<str>, BTreeSet<TokenType>> {
    let mut follow: HashMap<Rc<str>, BTreeSet<TokenType>> = rules
        .iter()
        .map(|rule| (Rc::clone(&rule.name), BTreeSet::new()))
        .collect();

    if let Some(set) = follow.get_mut(start) {
        set.insert(TokenType::eof());
    }

    let mut iterations = 0;
    let mut changed = true;
    while changed {
        changed = false;
        iterations += 1;

        for rule in rules {
            for alternative in &rule.alternatives {
                let symbols = &alternative.symbols;
                for (position, symbol) in symbols.iter().enumerate() {
                    let name = match symbol {
                        Symbol::Nonterminal(name) => name,
                        Symbol::Terminal(_) => continue,
                    };

                    let rest = sequence_first(&symbols[position + 1..], first);
                    let mut additions = rest.tokens;
                    if rest.nullable {
                        if let Some(inherited) = follow.get(&rule.name) {
                            additions.extend(inherited.iter().cloned());
                        }
                    }

                    if let Some(set) = follow.get_mut(name) {
                        let before = set.len();
                        set.extend(additions);
                        changed |= set.len() != before;
                    }
                }
            }
        }
    }

    debug!(iterations, "Computed FOLLOW sets");
    follow
}

/// Calcula el selector de cada alternativa.
///
/// Es FIRST de la alternativa, más FOLLOW del no terminal si es anulable.
pub fn assign_selectors(
    rules: &mut [Rule],
    first: &HashMap<Rc<str>, FirstSet>,
    follow: &HashMap<Rc<str>, BTreeSet<TokenType>>,
) {
    for rule in rules {
        for alternative in &mut rule.alternatives {
            let computed = sequence_first(&alternative.symbols, first);
            let mut selector = computed.tokens;

            if computed.nullable {
                if let Some(set) = follow.get(&rule.name) {
                    selector.extend(set.iter().cloned());
                }
            }

            alternative.selector = selector;
        }
    }
}

/// Verifica que los selectores de cada no terminal sean disjuntos.
pub fn check_conflicts(rules: &[Rule]) -> Result<(), GrammarError> {
    for rule in rules {
        let alternatives = &rule.alternatives;
        for (index, first) in alternatives.iter().enumerate() {
            for second in &alternatives[index + 1..] {
                let shared = first.selector.intersection(&second.selector).next();
                if let Some(token) = shared {
                    return Err(GrammarError::Conflict {
                        nonterminal: Rc::clone(&rule.origin),
                        token: token.clone(),
                        first: first.to_string(),
                        second: second.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}
