//! Punto de entrada ("driver").
//!
//! Este módulo lee los archivos de reglas, orquesta las etapas de
//! generación y traducción, y expone una CLI.

use anyhow::{anyhow, Context};
use ccgen::{
    error::Diagnostics,
    lex,
    parse::{self, Options},
    rules,
    source::{Located, Source},
};
use clap::{crate_version, Arg, Command};
use tracing::info;

use std::{
    error::Error,
    fs::{self, File},
    io::{self, Read, Write},
    rc::Rc,
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("ccgen")
        .version(crate_version!())
        .about("Generates a scanner and a one-pass three-address translator from rule files")
        .arg(
            Arg::new("lexer")
                .required(true)
                .value_name("LEXER_RULES")
                .help("Lexical rules, one `NAME = pattern` per line"),
        )
        .arg(
            Arg::new("grammar")
                .required(true)
                .value_name("GRAMMAR_RULES")
                .help("Grammar rules in BNF"),
        )
        .arg(
            Arg::new("source")
                .value_name("SOURCE")
                .help("Program to translate ('-' for stdin); omit to only check the rules"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .default_value("-")
                .help("Output file ('-' for stdout)"),
        )
        .arg(Arg::new("tokens").long("tokens").help("Print the token stream"))
        .arg(
            Arg::new("tables")
                .long("tables")
                .help("Print the normalized grammar, FIRST/FOLLOW and selector sets"),
        )
        .arg(Arg::new("tree").long("tree").help("Print the translation tree"))
        .arg(
            Arg::new("flow")
                .long("flow")
                .help("Print the control flow graph of the generated code as Mermaid"),
        )
        .arg(
            Arg::new("explicit")
                .long("explicit-declarations")
                .help("Require variables to be declared before use"),
        )
        .arg(
            Arg::new("no-check")
                .long("no-check")
                .help("Do not report reads of undefined variables"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .takes_value(true)
                .value_name("SYMBOL")
                .help("Start symbol (defaults to the first nonterminal)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .takes_value(true)
                .value_name("LEVEL")
                .default_value("warn")
                .help("Log filter, written to stderr"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(args.value_of("log-level").unwrap_or("warn"))
        .with_writer(io::stderr)
        .init();

    // Se extraen argumentos necesarios
    let lexer_path = args.value_of("lexer").context("Missing lexer rules")?;
    let grammar_path = args.value_of("grammar").context("Missing grammar rules")?;
    let output = args.value_of("output").unwrap_or("-");

    // Reglas léxicas
    let lexer_source = read_source(lexer_path)?;
    let lexer_rules = rules::read_lexer(&lexer_source).map_err(|error| fail("rule error", error))?;
    let dfa = ccgen::compile_lexer(&lexer_rules.rules)
        .map_err(|error| fail("pattern error", lexer_rules.locate(error)))?;

    info!(
        rules = lexer_rules.rules.len(),
        states = dfa.states().len(),
        "Compiled lexer"
    );

    // Reglas gramaticales
    let grammar_source = read_source(grammar_path)?;
    let mut grammar_rules = rules::read_grammar(&grammar_source, &lexer_rules.token_types())
        .map_err(|error| fail("rule error", error))?;

    if let Some(start) = args.value_of("start") {
        grammar_rules.grammar.set_start(start);
    }

    let normalized = ccgen::normalize_grammar(&grammar_rules.grammar)
        .map_err(|error| anyhow!("{}", error))
        .with_context(|| format!("Failed to normalize grammar: {}", grammar_path))?;

    let mut report = String::new();
    if args.is_present("tables") {
        report.push_str(&normalized.to_string());
    }

    if let Some(path) = args.value_of("source") {
        let source = read_source(path)?;
        let tokens = lex::tokenize(&dfa, &source).map_err(|error| fail("lexical error", error))?;

        if args.is_present("tokens") {
            for token in &tokens {
                let location = token.location().start();
                report.push_str(&format!(
                    "{}:{}\t{}\t{}\n",
                    location.line(),
                    location.column(),
                    token.ty(),
                    token.value().escape_debug()
                ));
            }
        }

        let mut options = Options::default();
        if args.is_present("no-check") {
            options.remove(Options::CHECK_VARIABLES);
        }

        if grammar_rules.explicit_declarations || args.is_present("explicit") {
            options |= Options::EXPLICIT_DECLARATIONS;
        }

        if args.is_present("tree") {
            options |= Options::RETAIN_TREE;
        }

        let translation = ccgen::translate(&tokens, &normalized, options).map_err(|error| match error {
            parse::TranslateError::Syntax(error) => fail("syntax error", error),
            parse::TranslateError::Semantic(errors) => {
                anyhow!("{}", Diagnostics::from(errors).kind("semantic error"))
            }
        })?;

        if let Some(tree) = translation.tree() {
            report.push_str(&tree.to_string());
        }

        report.push_str(&translation.to_string());
        if args.is_present("flow") {
            report.push_str(&translation.flow_graph());
        }
    }

    match output {
        "-" => io::stdout()
            .write_all(report.as_bytes())
            .context("Failed to write to stdout")?,

        path => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to open for writing: {}", path))?;

            file.write_all(report.as_bytes())
                .with_context(|| format!("Failed to write to file: {}", path))?;
        }
    }

    Ok(())
}

fn read_source(path: &str) -> anyhow::Result<Rc<Source>> {
    let text = match path {
        "-" => {
            let mut text = String::new();
            io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read from stdin")?;

            text
        }

        path => fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path))?,
    };

    Ok(Source::new(path, text))
}

fn fail<E: 'static + Error>(kind: &'static str, error: Located<E>) -> anyhow::Error {
    anyhow!("{}", Diagnostics::from(error).kind(kind))
}
