pub mod ast;
pub mod builtins;
pub mod environment;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod token;
pub mod util;

pub use environment::{Env, Environment, Writer};
pub use interpreter::Interpreter;
pub use lexer::Lexer;
pub use object::Object;
pub use parser::Parser;

/// Parses and evaluates a source string against the given environment.
/// A non-empty parser error list prevents evaluation.
pub fn run_source(source: &str, env: &Env) -> Result<Object, Vec<String>> {
    let mut parser = Parser::new(Lexer::new(source));
    let program = parser.parse_program();
    if !parser.errors().is_empty() {
        return Err(parser.errors().to_vec());
    }

    let mut interpreter = Interpreter::new(parser.into_lexer());
    Ok(interpreter.eval_program(&program, env))
}
