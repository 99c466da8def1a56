//! Reescrituras de la gramática: recursión izquierda y factorización.
//!
//! # Recursión izquierda indirecta
//! Antes de clasificar, los no terminales se recorren en orden de
//! declaración. Si `Ai -> Aj γ` con `j < i` y `Aj` lleva de vuelta a `Ai`
//! por primeros símbolos, cada producción `δ` de `Aj` reemplaza a `Aj`,
//! dando `Ai -> δ γ`. El ciclo queda como recursión inmediata de `Ai`,
//! que se elimina como se describe abajo. Los ciclos que cruzan prefijos
//! anulables o no terminales con recursión inmediata propia no se
//! reescriben y se reportan.
//!
//! # Recursión izquierda inmediata
//! `A -> A α | β` se reescribe como `A -> β A_TAIL` y
//! `A_TAIL -> α A_TAIL | ε`. El valor reducido de `β` desciende a
//! `A_TAIL` como operando heredado en la ranura 0, de modo que cada
//! repetición de `α` lo pliega de izquierda a derecha y pasa el nuevo
//! acumulador a la siguiente. Así `10 - 3 - 2` produce `(10 - 3) - 2`.
//!
//! # Factorización por la izquierda
//! Alternativas con un prefijo común se unen en una sola que analiza el
//! prefijo y desciende a un nuevo no terminal con los restos. Solo se
//! factoriza cuando los planes de emisión coinciden en el prefijo; los
//! operandos ya analizados y el marco de control pasan a la alternativa
//! elegida, que continúa su plan original donde quedó.
//!
//! Un terminal que una alternativa asigna y otra lee (`x = ...` frente a
//! `x ( ... )`) se analiza en el prefijo sin verificarlo, y cada resto
//! lo verifica según su propia forma al comenzar.

use std::{
    collections::{HashMap, HashSet},
    mem,
    rc::Rc,
};

use tracing::debug;

use super::{Alternative, FirstSet, Grammar, GrammarError, Production, Rule, Shape, Step, Symbol};
use super::shape::Carry;

/// Sustituye no terminales iniciales para convertir ciclos de recursión
/// izquierda indirecta en recursión inmediata.
///
/// Solo se sustituye `Aj` en `Ai` cuando `Aj` lleva de vuelta a `Ai`; el
/// resto de la gramática conserva su estructura.
pub fn substitute_indirect_recursion(grammar: &Grammar) -> Grammar {
    let mut rules = grammar.rules.clone();

    for i in 0..rules.len() {
        for j in 0..i {
            let source = Rc::clone(&rules[j].0);
            let target = Rc::clone(&rules[i].0);
            let leads_with = |production: &Production, name: &Rc<str>| {
                matches!(production.symbols.first(), Some(Symbol::Nonterminal(first)) if first == name)
            };

            if !rules[i].1.iter().any(|production| leads_with(production, &source))
                || !leads_to(&rules, &source, &target)
            {
                continue;
            }

            // Sustituir un no terminal con recursión inmediata no elimina el ciclo
            if rules[j].1.iter().any(|production| leads_with(production, &source)) {
                continue;
            }

            let replacements = rules[j].1.clone();
            let (substituted, mut kept): (Vec<_>, Vec<_>) = mem::take(&mut rules[i].1)
                .into_iter()
                .partition(|production| leads_with(production, &source));

            for production in substituted {
                for replacement in &replacements {
                    let mut symbols = replacement.symbols.clone();
                    symbols.extend_from_slice(&production.symbols[1..]);
                    kept.push(Production {
                        symbols,
                        hint: production.hint,
                    });
                }
            }

            debug!(nonterminal = %target, substituted = %source, "Substituted leading nonterminal");
            rules[i].1 = kept;
        }
    }

    Grammar {
        start: Rc::clone(&grammar.start),
        rules,
    }
}

/// Determina si `from` deriva una forma que comienza con `to`.
fn leads_to(rules: &[(Rc<str>, Vec<Production>)], from: &Rc<str>, to: &Rc<str>) -> bool {
    let mut visited = HashSet::new();
    let mut pending = vec![from];

    while let Some(current) = pending.pop() {
        if current == to {
            return true;
        }

        if !visited.insert(current) {
            continue;
        }

        let productions = rules
            .iter()
            .find(|(name, _)| name == current)
            .map_or(&[][..], |(_, productions)| productions.as_slice());

        pending.extend(
            productions
                .iter()
                .filter_map(|production| production.symbols.first())
                .filter_map(Symbol::as_nonterminal),
        );
    }

    false
}

/// Elimina la recursión izquierda inmediata de cada no terminal.
///
/// Los no terminales `_TAIL` nuevos se agregan al final.
pub fn eliminate_left_recursion(rules: Vec<Rule>) -> Result<Vec<Rule>, GrammarError> {
    let mut names: Vec<Rc<str>> = rules.iter().map(|rule| Rc::clone(&rule.name)).collect();
    let mut output = Vec::with_capacity(rules.len());
    let mut tails = Vec::new();

    for rule in rules {
        let is_recursive = |alternative: &Alternative| {
            matches!(alternative.symbols.first(), Some(Symbol::Nonterminal(name)) if *name == rule.name)
        };

        if !rule.alternatives.iter().any(is_recursive) {
            output.push(rule);
            continue;
        }

        let (recursive, bases): (Vec<_>, Vec<_>) =
            rule.alternatives.iter().cloned().partition(is_recursive);

        for alternative in &recursive {
            if alternative.symbols.len() == 1 {
                return Err(GrammarError::CyclicProduction(Rc::clone(&rule.name)));
            }

            if !alternative.shape.foldable() {
                return Err(GrammarError::UnsupportedLeftRecursion {
                    rule: Rc::clone(&rule.name),
                    production: alternative.to_string(),
                });
            }
        }

        if bases.is_empty() {
            return Err(GrammarError::LeftRecursionWithoutBase(Rc::clone(&rule.name)));
        }

        let tail = fresh(&mut names, &format!("{}_TAIL", rule.name));
        let descend = |alternative: &Alternative| Step::Descend {
            index: alternative.inherited + alternative.symbols.len(),
            carry: Carry::Value,
        };

        let heads = bases
            .into_iter()
            .map(|mut base| {
                let step = descend(&base);
                base.plan.push(step);
                base.symbols.push(Symbol::Nonterminal(Rc::clone(&tail)));
                base
            })
            .collect();

        let mut repetitions: Vec<Alternative> = recursive
            .into_iter()
            .map(|mut repetition| {
                // La ranura 0 es ahora el acumulador heredado
                repetition.symbols.remove(0);
                repetition.inherited = 1;
                repetition.plan.retain(|step| *step != Step::Parse(0));

                let step = descend(&repetition);
                repetition.plan.push(step);
                repetition.symbols.push(Symbol::Nonterminal(Rc::clone(&tail)));
                repetition
            })
            .collect();

        repetitions.push(Alternative::new(Vec::new(), 1, Shape::Pass(0), vec![Step::Reduce]));

        debug!(nonterminal = %rule.name, tail = %tail, "Eliminated immediate left recursion");

        tails.push(Rule {
            name: tail,
            origin: Rc::clone(&rule.origin),
            alternatives: repetitions,
        });

        output.push(Rule {
            alternatives: heads,
            ..rule
        });
    }

    output.extend(tails);
    Ok(output)
}

/// Reporta ciclos de recursión izquierda que atraviesan varios no terminales
/// o prefijos anulables.
pub fn check_indirect_left_recursion(
    rules: &[Rule],
    first: &HashMap<Rc<str>, FirstSet>,
) -> Result<(), GrammarError> {
    let index: HashMap<&str, usize> = rules
        .iter()
        .enumerate()
        .map(|(index, rule)| (&*rule.name, index))
        .collect();

    // Aristas A -> B si B puede aparecer al inicio de una derivación de A
    let edges: Vec<Vec<usize>> = rules
        .iter()
        .map(|rule| {
            let mut targets = Vec::new();
            for alternative in &rule.alternatives {
                for symbol in &alternative.symbols {
                    let name = match symbol {
                        Symbol::Terminal(_) => break,
                        Symbol::Nonterminal(name) => name,
                    };

                    targets.extend(index.get(&**name).copied());
                    if !first.get(name).map_or(false, |set| set.nullable) {
                        break;
                    }
                }
            }

            targets
        })
        .collect();

    #[derive(Copy, Clone, PartialEq)]
    enum Visit {
        Pending,
        Active,
        Done,
    }

    fn visit(
        node: usize,
        edges: &[Vec<usize>],
        marks: &mut [Visit],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[node] = Visit::Active;
        path.push(node);

        for &next in &edges[node] {
            match marks[next] {
                Visit::Active => {
                    let from = path.iter().position(|&on_path| on_path == next).unwrap_or(0);
                    let mut cycle = path[from..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }

                Visit::Pending => {
                    if let Some(cycle) = visit(next, edges, marks, path) {
                        return Some(cycle);
                    }
                }

                Visit::Done => (),
            }
        }

        path.pop();
        marks[node] = Visit::Done;
        None
    }

    let mut marks = vec![Visit::Pending; rules.len()];
    for node in 0..rules.len() {
        if marks[node] == Visit::Pending {
            if let Some(cycle) = visit(node, &edges, &mut marks, &mut Vec::new()) {
                let names = cycle.into_iter().map(|node| Rc::clone(&rules[node].name)).collect();
                return Err(GrammarError::IndirectLeftRecursion(names));
            }
        }
    }

    Ok(())
}

/// Factoriza prefijos comunes hasta alcanzar un punto fijo.
///
/// Los no terminales `_LFn` nuevos se agregan al final y a su vez
/// se someten a factorización.
pub fn left_factor(rules: &mut Vec<Rule>) {
    let mut names: Vec<Rc<str>> = rules.iter().map(|rule| Rc::clone(&rule.name)).collect();
    let mut counters: HashMap<Rc<str>, usize> = HashMap::new();

    let mut current = 0;
    while current < rules.len() {
        match factor_once(&rules[current]) {
            None => current += 1,

            Some(factoring) => {
                let origin = Rc::clone(&rules[current].origin);
                let counter = counters.entry(Rc::clone(&origin)).or_insert(0);
                *counter += 1;

                let tail = fresh(&mut names, &format!("{}_LF{}", origin, counter));
                debug!(
                    nonterminal = %rules[current].name,
                    tail = %tail,
                    prefix = factoring.prefix,
                    "Left-factored common prefix"
                );

                let tail_rule = apply(&mut rules[current], factoring, Rc::clone(&tail));
                rules.push(tail_rule);
            }
        }
    }
}

/// Un grupo factorizable dentro de un no terminal.
struct Factoring {
    /// Índices de las alternativas del grupo.
    members: Vec<usize>,
    /// Cantidad de símbolos compartidos.
    prefix: usize,
    /// Cantidad de pasos de plan compartidos.
    steps: usize,
}

fn factor_once(rule: &Rule) -> Option<Factoring> {
    let alternatives = &rule.alternatives;

    for (leader, alternative) in alternatives.iter().enumerate() {
        let head = match alternative.symbols.first() {
            Some(head) => head,
            None => continue,
        };

        let members: Vec<usize> = (leader..alternatives.len())
            .filter(|&other| alternatives[other].symbols.first() == Some(head))
            .collect();

        if members.len() < 2 || members[0] != leader {
            continue;
        }

        let common = members
            .iter()
            .map(|&member| shared_length(&alternative.symbols, &alternatives[member].symbols))
            .min()
            .unwrap_or(0);

        for prefix in (1..=common).rev() {
            let last_slot = alternative.inherited + prefix - 1;
            let steps = match prefix_steps(&alternative.plan, last_slot) {
                Some(steps) => steps,
                None => continue,
            };

            let agree = members.iter().all(|&member| {
                let plan = &alternatives[member].plan;
                prefix_steps(plan, last_slot) == Some(steps)
                    && plan[..steps]
                        .iter()
                        .zip(&alternative.plan[..steps])
                        .all(|(&left, &right)| compatible(left, right))
            });

            if agree {
                return Some(Factoring {
                    members,
                    prefix,
                    steps,
                });
            }
        }
    }

    None
}

/// Pasos que pueden compartirse en un prefijo.
///
/// Analizar la misma ranura coincide aunque difiera la verificación.
fn compatible(left: Step, right: Step) -> bool {
    match (parsed(left), parsed(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

/// Ranura que analiza un paso, si lo hace.
fn parsed(step: Step) -> Option<usize> {
    match step {
        Step::Parse(slot) | Step::Target(slot) | Step::Shift(slot) => Some(slot),
        _ => None,
    }
}

/// Cantidad de pasos hasta analizar la ranura `slot`, inclusive.
///
/// Falla si antes de ello el plan reduce o desciende.
fn prefix_steps(plan: &[Step], slot: usize) -> Option<usize> {
    for (index, step) in plan.iter().enumerate() {
        match *step {
            step if parsed(step) == Some(slot) => return Some(index + 1),
            Step::Reduce | Step::Descend { .. } => return None,
            _ => (),
        }
    }

    None
}

fn shared_length(left: &[Symbol], right: &[Symbol]) -> usize {
    left.iter()
        .zip(right)
        .take_while(|(left, right)| left == right)
        .count()
}

/// Reemplaza el grupo por una alternativa que desciende a `tail`.
fn apply(rule: &mut Rule, factoring: Factoring, tail: Rc<str>) -> Rule {
    let Factoring {
        members,
        prefix,
        steps,
    } = factoring;

    let leader = &rule.alternatives[members[0]];
    let inherited = leader.inherited;

    let mut symbols = leader.symbols[..prefix].to_vec();
    symbols.push(Symbol::Nonterminal(Rc::clone(&tail)));

    // Pasos de análisis en los que los miembros difieren
    let deferred: Vec<usize> = (0..steps)
        .filter(|&index| {
            members
                .iter()
                .any(|&member| rule.alternatives[member].plan[index] != leader.plan[index])
        })
        .collect();

    let mut plan = leader.plan[..steps].to_vec();
    for &index in &deferred {
        if let Some(slot) = parsed(plan[index]) {
            plan[index] = Step::Shift(slot);
        }
    }

    plan.push(Step::Descend {
        index: inherited + prefix,
        carry: Carry::Operands,
    });

    let head = Alternative::new(symbols, inherited, Shape::Sequence, plan);

    let remainders = members
        .iter()
        .map(|&member| {
            let alternative = &rule.alternatives[member];
            let checks = deferred.iter().filter_map(|&index| match alternative.plan[index] {
                Step::Parse(slot) | Step::Target(slot) => Some(Step::Verify(slot)),
                _ => None,
            });

            let plan = checks.chain(alternative.plan[steps..].iter().copied()).collect();
            Alternative::new(
                alternative.symbols[prefix..].to_vec(),
                inherited + prefix,
                alternative.shape.clone(),
                plan,
            )
        })
        .collect();

    let mut position = 0;
    rule.alternatives.retain(|_| {
        let keep = !members[1..].contains(&position);
        position += 1;
        keep
    });

    rule.alternatives[members[0]] = head;

    Rule {
        name: tail,
        origin: Rc::clone(&rule.origin),
        alternatives: remainders,
    }
}

/// Nombre sin colisiones con los existentes.
fn fresh(names: &mut Vec<Rc<str>>, base: &str) -> Rc<str> {
    let mut candidate = base.to_owned();
    let mut suffix = 1;
    while names.iter().any(|name| **name == *candidate) {
        suffix += 1;
        candidate = format!("{}{}", base, suffix);
    }

    let name: Rc<str> = Rc::from(candidate);
    names.push(Rc::clone(&name));
    name
}

#[cfg(test)]
mod tests {
    use super::super::{
        normalize,
        tests::{grammar, production},
        Hint, Normalized,
    };
    use super::*;

    fn rule<'a>(normalized: &'a Normalized, name: &str) -> &'a Rule {
        normalized
            .rule(name)
            .unwrap_or_else(|| panic!("missing rule {}", name))
    }

    #[test]
    fn left_recursion_becomes_a_tail() {
        let grammar = grammar(
            "Expr",
            &[("Expr", &["Expr MINUS Term", "Term"]), ("Term", &["NUM"])],
        );

        let normalized = normalize(&grammar).unwrap();
        let expr = rule(&normalized, "Expr");
        assert_eq!(expr.alternatives.len(), 1);
        assert_eq!(expr.alternatives[0].to_string(), "Term Expr_TAIL");
        assert_eq!(
            expr.alternatives[0].plan,
            [
                Step::Parse(0),
                Step::Reduce,
                Step::Descend {
                    index: 1,
                    carry: Carry::Value
                }
            ]
        );

        let tail = rule(&normalized, "Expr_TAIL");
        let texts: Vec<String> = tail.alternatives.iter().map(ToString::to_string).collect();
        assert_eq!(texts, ["'MINUS' Term Expr_TAIL", "ε"]);

        let repetition = &tail.alternatives[0];
        assert_eq!(repetition.inherited, 1);
        assert_eq!(
            repetition.plan,
            [
                Step::Parse(1),
                Step::Parse(2),
                Step::Reduce,
                Step::Descend {
                    index: 3,
                    carry: Carry::Value
                }
            ]
        );

        assert_eq!(tail.alternatives[1].shape, Shape::Pass(0));
    }

    #[test]
    fn recursion_without_base_fails() {
        let no_base = grammar("A", &[("A", &["A PLUS"])]);
        assert_eq!(
            normalize(&no_base).unwrap_err(),
            GrammarError::LeftRecursionWithoutBase(Rc::from("A"))
        );

        let cyclic = grammar("A", &[("A", &["A", "NUM"])]);
        assert_eq!(
            normalize(&cyclic).unwrap_err(),
            GrammarError::CyclicProduction(Rc::from("A"))
        );
    }

    #[test]
    fn indirect_recursion_becomes_immediate() {
        let grammar = grammar(
            "Expr",
            &[("Expr", &["Diff"]), ("Diff", &["Expr MINUS NUM", "NUM"])],
        );

        let normalized = normalize(&grammar).unwrap();
        let diff = rule(&normalized, "Diff");
        assert_eq!(diff.alternatives[0].to_string(), "'NUM' Diff_TAIL");

        let tail = rule(&normalized, "Diff_TAIL");
        let texts: Vec<String> = tail.alternatives.iter().map(ToString::to_string).collect();
        assert_eq!(texts, ["'MINUS' 'NUM' Diff_TAIL", "ε"]);
        assert_eq!(
            tail.alternatives[0].shape,
            Shape::Binary {
                left: 0,
                op: 1,
                right: 2
            }
        );
    }

    #[test]
    fn substitution_only_touches_cycles() {
        let cyclic = grammar(
            "A",
            &[("A", &["B PLUS", "NUM"]), ("B", &["A MINUS", "ID"]), ("C", &["B SEMI"])],
        );

        let substituted = substitute_indirect_recursion(&cyclic);
        let texts = |name: &str| -> Vec<String> {
            substituted
                .productions(name)
                .unwrap()
                .iter()
                .map(ToString::to_string)
                .collect()
        };

        assert_eq!(texts("A"), ["B 'PLUS'", "'NUM'"]);
        assert_eq!(texts("B"), ["'ID'", "B 'PLUS' 'MINUS'", "'NUM' 'MINUS'"]);

        // `B` encabeza a `C` sin formar un ciclo
        assert_eq!(texts("C"), ["B 'SEMI'"]);

        // El ciclo se elimina, pero `A` sigue sin ser LL(1)
        match normalize(&cyclic).unwrap_err() {
            GrammarError::Conflict {
                nonterminal, token, ..
            } => {
                assert_eq!(&*nonterminal, "A");
                assert_eq!(token.as_str(), "NUM");
            }

            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[test]
    fn recursive_cycle_member_is_reported() {
        let grammar = grammar(
            "A",
            &[("A", &["A PLUS", "B PLUS", "NUM"]), ("B", &["A MINUS", "ID"])],
        );

        match normalize(&grammar).unwrap_err() {
            GrammarError::IndirectLeftRecursion(cycle) => {
                let names: Vec<&str> = cycle.iter().map(|name| &**name).collect();
                assert!(names.contains(&"B"));
            }

            other => panic!("expected indirect recursion, got {:?}", other),
        }
    }

    #[test]
    fn nullable_prefix_hides_recursion() {
        let grammar = grammar(
            "A",
            &[("A", &["Opt A PLUS", "NUM"]), ("Opt", &["MINUS", ""])],
        );

        assert!(matches!(
            normalize(&grammar).unwrap_err(),
            GrammarError::IndirectLeftRecursion(_)
        ));
    }

    #[test]
    fn folding_statement_shapes() {
        let sequence = grammar(
            "S",
            &[("S", &["S IF LPAREN E RPAREN", "SEMI"]), ("E", &["NUM"])],
        );

        // `S IF ( E )` no es un condicional por forma, así que se pliega
        assert!(normalize(&sequence).is_ok());

        let mut declarations = grammar("Decls", &[]);
        declarations.add("Decls", production("Decls VAR ID SEMI").with_hint(Hint::Declare));
        declarations.add("Decls", production("VAR ID SEMI").with_hint(Hint::Declare));

        assert!(matches!(
            normalize(&declarations).unwrap_err(),
            GrammarError::UnsupportedLeftRecursion { .. }
        ));
    }

    #[test]
    fn conditional_and_branching_share_a_prefix() {
        let grammar = grammar(
            "S",
            &[
                (
                    "S",
                    &[
                        "IF LPAREN E RPAREN Block",
                        "IF LPAREN E RPAREN Block ELSE Block",
                        "SEMI",
                    ],
                ),
                ("Block", &["LBRACE S RBRACE"]),
                ("E", &["NUM"]),
            ],
        );

        let normalized = normalize(&grammar).unwrap();
        let s = rule(&normalized, "S");
        assert_eq!(s.alternatives[0].to_string(), "'IF' 'LPAREN' E 'RPAREN' Block S_LF1");
        assert_eq!(
            s.alternatives[0].plan.last(),
            Some(&Step::Descend {
                index: 5,
                carry: Carry::Operands
            })
        );

        let tail = rule(&normalized, "S_LF1");
        assert_eq!(tail.alternatives[0].inherited, 5);
        assert_eq!(tail.alternatives[0].plan, [Step::Exit, Step::Reduce]);
        assert_eq!(
            tail.alternatives[1].plan,
            [Step::Skip, Step::Parse(5), Step::Parse(6), Step::Join, Step::Reduce]
        );
    }

    #[test]
    fn assignment_and_call_share_an_identifier() {
        let grammar = grammar(
            "Stmt",
            &[
                ("Stmt", &["ID ASSIGN Term SEMI", "ID LPAREN Term RPAREN SEMI"]),
                ("Term", &["NUM", "ID"]),
            ],
        );

        let normalized = normalize(&grammar).unwrap();
        let stmt = rule(&normalized, "Stmt");
        assert_eq!(
            stmt.alternatives[0].plan,
            [
                Step::Shift(0),
                Step::Descend {
                    index: 1,
                    carry: Carry::Operands
                }
            ]
        );

        // Cada resto verifica el identificador según su forma
        let tail = rule(&normalized, "Stmt_LF1");
        assert_eq!(tail.alternatives[0].plan[..2], [Step::Verify(0), Step::Parse(1)]);
        assert_eq!(tail.alternatives[1].plan[0], Step::Parse(1));
        assert!(tail.alternatives[0].shape.is_target(0));
    }

    #[test]
    fn fresh_names_avoid_collisions() {
        let mut names = vec![Rc::from("A_TAIL")];
        assert_eq!(&*fresh(&mut names, "A_TAIL"), "A_TAIL2");
        assert_eq!(&*fresh(&mut names, "B_TAIL"), "B_TAIL");
    }
}
