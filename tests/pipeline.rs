use std::collections::HashSet;

use ccgen::{
    automaton::PatternErrorKind,
    parse::SyntaxError,
    rules::{self, GrammarRules},
    semantic::SemanticError,
    source::{Position, Source},
    CombinedDfa, GrammarError, LexicalRule, Normalized, Options, TokenType, TranslateError,
};

const LEXER: &str = r"
# @SKIP: WS
VAR    = var
IF     = if
ELSE   = else
WHILE  = while
PRINT  = print
ID     = [a-zA-Z_][a-zA-Z0-9_]*
NUM    = [0-9]+
PLUS   = \+
MINUS  = -
LT     = <
ASSIGN = =
LPAREN = \(
RPAREN = \)
LBRACE = {
RBRACE = }
SEMI   = ;
WS     = [ \t\r\n]+
";

struct Pipeline {
    dfa: CombinedDfa,
    grammar: Normalized,
}

impl Pipeline {
    fn new(grammar: &str) -> Self {
        let GrammarRules { grammar, .. } = Self::read(grammar);
        let dfa = compile(LEXER);
        let grammar = ccgen::normalize_grammar(&grammar).unwrap();

        Pipeline { dfa, grammar }
    }

    fn read(grammar: &str) -> GrammarRules {
        let lexer = rules::read_lexer(&Source::new("lexer.rules", LEXER)).unwrap();
        rules::read_grammar(&Source::new("grammar.rules", grammar), &lexer.token_types()).unwrap()
    }

    fn run(&self, text: &str, options: Options) -> Result<Vec<String>, TranslateError> {
        let tokens = ccgen::tokenize(&self.dfa, text).unwrap();
        ccgen::translate(&tokens, &self.grammar, options).map(|translation| translation.lines())
    }

    fn lines(&self, text: &str) -> Vec<String> {
        self.run(text, Options::default()).unwrap()
    }
}

fn compile(lexer: &str) -> CombinedDfa {
    let lexer = rules::read_lexer(&Source::new("lexer.rules", lexer)).unwrap();
    ccgen::compile_lexer(&lexer.rules).unwrap()
}

const STATEMENTS: &str = "
Program -> Stmt Program | ε
Stmt -> ID ASSIGN Expr SEMI
      | IF LPAREN Cond RPAREN Stmt
      | WHILE LPAREN Cond RPAREN Stmt @loop
      | PRINT LPAREN Expr RPAREN SEMI
      | LBRACE Program RBRACE
Cond -> Expr RelOp Expr
RelOp -> LT
Expr -> Expr AddOp Term | Term
AddOp -> PLUS | MINUS
Term -> NUM | ID
";

#[test]
fn assignment_of_a_sum() {
    let pipeline = Pipeline::new(
        "
Stmt -> ID ASSIGN Expr SEMI
Expr -> NUM PLUS NUM | NUM
",
    );

    assert_eq!(pipeline.lines("x = 10 + 20 ;"), ["t1 = 10 + 20", "x = t1"]);
    assert_eq!(pipeline.lines("x = 10 ;"), ["x = 10"]);
}

#[test]
fn subtraction_folds_to_the_left() {
    let pipeline = Pipeline::new("Expr -> Expr MINUS NUM | NUM");
    assert_eq!(pipeline.lines("10 - 3 - 2"), ["t1 = 10 - 3", "t2 = t1 - 2"]);
}

#[test]
fn conditional_jumps_over_its_body() {
    let pipeline = Pipeline::new(STATEMENTS);
    assert_eq!(
        pipeline.lines("a = 5 ; if ( a < 10 ) b = a + 1 ;"),
        [
            "a = 5",
            "t1 = a < 10",
            "t2 = not t1",
            "if t2 goto L1",
            "t3 = a + 1",
            "b = t3",
            "L1:"
        ]
    );
}

#[test]
fn loop_entry_label_precedes_the_condition() {
    let pipeline = Pipeline::new(STATEMENTS);
    assert_eq!(
        pipeline.lines("i = 0 ; while ( i < 3 ) { i = i + 1 ; print ( i ) ; }"),
        [
            "i = 0",
            "L1:",
            "t1 = i < 3",
            "t2 = not t1",
            "if t2 goto L2",
            "t3 = i + 1",
            "i = t3",
            "param i",
            "call print, 1",
            "goto L1",
            "L2:"
        ]
    );
}

#[test]
fn branches_join_after_the_alternative() {
    let pipeline = Pipeline::new(
        "
Program -> Stmt Program | ε
Stmt -> ID ASSIGN Term SEMI
      | IF LPAREN Cond RPAREN Stmt ELSE Stmt
Cond -> Term RelOp Term
RelOp -> LT
Term -> NUM | ID
",
    );

    assert_eq!(
        pipeline.lines("a = 0 ; if ( a < 1 ) b = 1 ; else b = 2 ;"),
        [
            "a = 0",
            "t1 = a < 1",
            "t2 = not t1",
            "if t2 goto L1",
            "b = 1",
            "goto L2",
            "L1:",
            "b = 2",
            "L2:"
        ]
    );
}

#[test]
fn counters_restart_on_every_translation() {
    let pipeline = Pipeline::new(STATEMENTS);
    let text = "a = 1 + 2 ; if ( a < 3 ) a = 0 ;";

    let first = pipeline.lines(text);
    assert_eq!(first[0], "t1 = 1 + 2");
    assert_eq!(pipeline.lines(text), first);
}

#[test]
fn keywords_win_over_identifiers() {
    let dfa = compile(LEXER);
    let tokens = ccgen::tokenize(&dfa, "print printer").unwrap();
    let kinds: Vec<&str> = tokens.iter().map(|token| token.ty().as_str()).collect();

    assert_eq!(kinds, ["PRINT", "ID", "EOF"]);
    assert_eq!(tokens[1].value(), "printer");
    assert_eq!((tokens[1].line(), tokens[1].column()), (1, 7));
}

#[test]
fn bad_pattern_names_its_rule() {
    let error = ccgen::compile_lexer(&[
        LexicalRule::new("NUM", "[0-9]+"),
        LexicalRule::new("ID", "[a-z"),
    ])
    .unwrap_err();

    assert_eq!(error.rule.as_str(), "ID");
    assert_eq!(error.index, 1);
    assert_eq!(error.kind, PatternErrorKind::UnterminatedClass);
}

#[test]
fn overlapping_predictions_are_a_conflict() {
    let GrammarRules { grammar, .. } = Pipeline::read(
        "
S -> A | B
A -> NUM PLUS NUM
B -> NUM MINUS NUM
",
    );

    match ccgen::normalize_grammar(&grammar).unwrap_err() {
        GrammarError::Conflict {
            nonterminal, token, ..
        } => {
            assert_eq!(&*nonterminal, "S");
            assert_eq!(token, TokenType::new("NUM"));
        }

        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[test]
fn unexpected_token_stops_translation() {
    let pipeline = Pipeline::new(STATEMENTS);
    let error = match pipeline.run("a = 1 ;\nb = ( 2 ;", Options::default()) {
        Err(TranslateError::Syntax(error)) => error,
        other => panic!("expected a syntax error, got {:?}", other),
    };

    match error.val() {
        SyntaxError::NoAlternative {
            nonterminal, found, ..
        } => {
            assert_eq!(&**nonterminal, "Expr");
            assert_eq!(found.ty().as_str(), "LPAREN");
        }

        other => panic!("unexpected error {:?}", other),
    }

    assert_eq!(error.location().start(), Position::new(2, 5));
}

#[test]
fn declarations_are_checked_together() {
    let rules = Pipeline::read(
        "
Program -> Item Program | ε
Item -> VAR ID SEMI @declare
      | ID ASSIGN Term SEMI
Term -> NUM | ID
",
    );

    assert!(rules.explicit_declarations);

    let pipeline = Pipeline {
        dfa: compile(LEXER),
        grammar: ccgen::normalize_grammar(&rules.grammar).unwrap(),
    };

    let options = Options::default() | Options::EXPLICIT_DECLARATIONS;
    assert_eq!(
        pipeline.run("var a ; a = 1 ; var b ; b = a ;", options).unwrap(),
        ["a = 1", "b = a"]
    );

    let errors = match pipeline.run("var a ; a = 1 ; b = a ; var a ;", options) {
        Err(TranslateError::Semantic(errors)) => errors,
        other => panic!("expected semantic errors, got {:?}", other),
    };

    let errors: Vec<&SemanticError> = errors.iter().map(|error| error.val()).collect();
    assert_eq!(
        errors,
        [
            &SemanticError::Undefined {
                name: "b".into(),
                suggestion: Some("a".into()),
            },
            &SemanticError::Redeclared("a".into()),
        ]
    );

    // Sin declaraciones explícitas solo se verifican lecturas
    assert_eq!(
        pipeline.run("a = 1 ; b = a ;", Options::default()).unwrap(),
        ["a = 1", "b = a"]
    );
}

#[test]
fn token_types_come_from_the_lexer() {
    let lexer = rules::read_lexer(&Source::new("lexer.rules", LEXER)).unwrap();
    let types = lexer.token_types();

    let expected: HashSet<TokenType> = ["VAR", "ID", "WS", "SEMI"]
        .iter()
        .map(|&name| TokenType::new(name))
        .collect();
    assert!(types.is_superset(&expected));
    assert!(!types.contains(&TokenType::eof()));
}

#[test]
fn thousands_of_statements_translate() {
    let lexer = rules::read_lexer(&Source::new("toy.lex", include_str!("../grammars/toy.lex"))).unwrap();
    let rules = rules::read_grammar(
        &Source::new("toy.grammar", include_str!("../grammars/toy.grammar")),
        &lexer.token_types(),
    )
    .unwrap();

    let dfa = ccgen::compile_lexer(&lexer.rules).unwrap();
    let grammar = ccgen::normalize_grammar(&rules.grammar).unwrap();

    let mut program = String::from("var n; n = 0;\n");
    for _ in 0..5000 {
        program.push_str("n = n + 1;\n");
    }

    let tokens = ccgen::tokenize(&dfa, &program).unwrap();
    let options = Options::default() | Options::EXPLICIT_DECLARATIONS;
    let lines = ccgen::translate(&tokens, &grammar, options).unwrap().lines();

    assert_eq!(lines.len(), 1 + 2 * 5000);
    assert_eq!(lines[lines.len() - 2], "t5000 = n + 1");
    assert_eq!(lines[lines.len() - 1], "n = t5000");
}

#[test]
fn assignment_and_call_share_a_prefix() {
    let pipeline = Pipeline::new(
        "
Program -> Stmt Program | ε
Stmt -> ID ASSIGN Term SEMI
      | ID LPAREN Term RPAREN SEMI
Term -> NUM | ID
",
    );

    assert_eq!(
        pipeline.lines("x = 1 ; f ( x ) ;"),
        ["x = 1", "param x", "call f, 1"]
    );

    // `f` no se verifica como variable, pero su argumento sí
    let errors = match pipeline.run("y = 1 ; f ( z ) ;", Options::default()) {
        Err(TranslateError::Semantic(errors)) => errors,
        other => panic!("expected semantic errors, got {:?}", other),
    };

    let messages: Vec<String> = errors.iter().map(|error| error.val().to_string()).collect();
    assert_eq!(messages, ["Symbol `z` is undefined, did you mean `y`?"]);

    // El destino se verifica una vez elegida la asignación
    let explicit = Options::default() | Options::EXPLICIT_DECLARATIONS;
    let errors = match pipeline.run("w = 1 ;", explicit) {
        Err(TranslateError::Semantic(errors)) => errors,
        other => panic!("expected semantic errors, got {:?}", other),
    };

    assert_eq!(errors.len(), 1);
    assert!(errors[0].val().to_string().contains("`w`"));
}

#[test]
fn indirect_recursion_folds_to_the_left() {
    let pipeline = Pipeline::new(
        "
Expr -> Diff
Diff -> Expr MINUS NUM | NUM
",
    );

    assert_eq!(pipeline.lines("10 - 3 - 2"), ["t1 = 10 - 3", "t2 = t1 - 2"]);
}
