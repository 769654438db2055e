//=============================================
// src/main.rs
//=============================================
// Goal: anka CLI entrypoint for running .ank scripts
// Objective: Parse, optionally dump the AST, and evaluate with
//            runtime errors rendered against the source
//=============================================

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use clap::Parser as ClapParser;

use anka::environment::{Environment, Writer};
use anka::interpreter::Interpreter;
use anka::lexer::Lexer;
use anka::parser::Parser;

#[derive(Debug, ClapParser)]
#[command(name = "anka", about = "Runs anka script files.", version)]
struct Args {
    /// Path to the script to execute.
    script: PathBuf,

    /// Pretty-print the parsed AST instead of evaluating.
    #[arg(long)]
    print_ast: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    run_script(&args)
}

fn run_script(args: &Args) -> Result<()> {
    let source = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read {}", args.script.display()))?;

    let mut parser = Parser::new(Lexer::new(&source));
    let program = parser.parse_program();
    if !parser.errors().is_empty() {
        return Err(anyhow!(
            "parser errors:\n\t{}",
            parser.errors().join("\n\t")
        ));
    }

    if args.print_ast {
        println!("{:#?}", program);
        return Ok(());
    }

    let dir = args
        .script
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let writer: Writer = Rc::new(RefCell::new(std::io::stdout()));
    let env = Environment::new(writer, dir, env!("CARGO_PKG_VERSION"));

    let mut interpreter = Interpreter::new(parser.into_lexer());
    let result = interpreter.eval_program(&program, &env);

    if result.is_error() {
        eprintln!("{}", result.inspect());
        process::exit(1);
    }

    Ok(())
}

//=============================================
// End of file
//=============================================
