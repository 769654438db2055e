use std::rc::Rc;

use crate::ast::{
    AssignTarget, Block, Expr, FunctionLiteral, Parameter, Program, Scenario, Stmt,
};
use crate::lexer::Lexer;
use crate::token::{number_abbreviation, Token, TokenKind};

/// Binding powers, ascending. Unary `+` and `-` parse their operand at
/// `Highest` so `-x.y` negates the whole dotted expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest,
    And,
    Equals,
    LessGreater,
    Sum,
    Product,
    Range,
    Prefix,
    Call,
    Index,
    Question,
    Dot,
    Highest,
}

fn precedence_of(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        And | Or | BitAnd | BitXor | RShift | LShift | Pipe => Precedence::And,
        Eq | NotEq | Tilde | In | NotIn => Precedence::Equals,
        CompPlus | CompMinus | CompSlash | CompAsterisk | CompExponent | CompModulo => {
            Precedence::Equals
        }
        Lt | LtEq | Gt | GtEq | CombinedComp => Precedence::LessGreater,
        Plus | Minus => Precedence::Sum,
        Slash | Asterisk | Exponent | Modulo => Precedence::Product,
        Range => Precedence::Range,
        LParen => Precedence::Call,
        LBracket => Precedence::Index,
        Question => Precedence::Question,
        Dot => Precedence::Dot,
        _ => Precedence::Lowest,
    }
}

fn has_infix(kind: TokenKind) -> bool {
    use TokenKind::*;
    matches!(
        kind,
        Plus | Minus
            | Slash
            | Asterisk
            | Exponent
            | Modulo
            | Eq
            | NotEq
            | Tilde
            | In
            | NotIn
            | Lt
            | LtEq
            | Gt
            | GtEq
            | CombinedComp
            | And
            | Or
            | BitAnd
            | BitXor
            | Pipe
            | RShift
            | LShift
            | Range
            | CompPlus
            | CompMinus
            | CompSlash
            | CompAsterisk
            | CompExponent
            | CompModulo
            | Question
            | Dot
            | LParen
            | LBracket
    )
}

/// Pratt parser over the lexer's token stream.
///
/// Parse errors accumulate; callers check [`Parser::errors`] after
/// [`Parser::parse_program`] and a non-empty list prevents evaluation.
pub struct Parser {
    lexer: Lexer,
    cur_token: Token,
    peek_token: Token,
    errors: Vec<String>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        let mut parser = Parser {
            lexer,
            cur_token: Token::default(),
            peek_token: Token::default(),
            errors: Vec::new(),
        };
        parser.next_token();
        parser.next_token();
        parser
    }

    /// Hands the lexer back once parsing is done, for error-line
    /// rendering during evaluation.
    pub fn into_lexer(self) -> Lexer {
        self.lexer
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn next_token(&mut self) {
        self.cur_token = std::mem::take(&mut self.peek_token);
        self.peek_token = self.lexer.next_token();

        if self.cur_token_is(TokenKind::Illegal) {
            let msg = format!("illegal token '{}'", self.cur_token.literal);
            let token = self.cur_token.clone();
            self.report_error(&msg, &token);
        }
    }

    fn cur_token_is(&self, kind: TokenKind) -> bool {
        self.cur_token.kind == kind
    }

    fn peek_token_is(&self, kind: TokenKind) -> bool {
        self.peek_token.kind == kind
    }

    fn expect_peek(&mut self, kind: TokenKind) -> bool {
        if self.peek_token_is(kind) {
            self.next_token();
            return true;
        }
        let msg = format!(
            "expected next token to be {}, got {} instead",
            kind, self.peek_token.kind
        );
        let token = self.cur_token.clone();
        self.report_error(&msg, &token);
        false
    }

    fn report_error(&mut self, msg: &str, token: &Token) {
        let (line, column, text) = self.lexer.error_line(token.position);
        self.errors
            .push(format!("{}\n{}:{}> {}", msg, line, column, text));
    }

    fn no_prefix_error(&mut self) {
        let msg = format!(
            "no prefix parse function found for '{}'",
            self.cur_token.literal
        );
        let token = self.cur_token.clone();
        self.report_error(&msg, &token);
    }

    fn peek_precedence(&self) -> Precedence {
        precedence_of(self.peek_token.kind)
    }

    fn cur_precedence(&self) -> Precedence {
        precedence_of(self.cur_token.kind)
    }

    /// Resets the lexer and re-scans until the saved position, leaving
    /// the parser looking at the same tokens it saw the first time.
    fn rewind(&mut self, pos: usize) {
        let error_count = self.errors.len();
        self.lexer.rewind(0);
        while self.lexer.current_position() < pos {
            self.next_token();
        }
        self.errors.truncate(error_count);
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::default();

        while !self.cur_token_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                program.statements.push(stmt);
            }
            self.next_token();
        }

        program
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        match self.cur_token.kind {
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Ident if self.peek_token_is(TokenKind::Assign) => self.parse_name_assign(),
            TokenKind::Ident if self.peek_token_is(TokenKind::Comma) => {
                self.parse_destructuring_or_expression()
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `name = value`
    fn parse_name_assign(&mut self) -> Option<Stmt> {
        let name = self.cur_token.literal.clone();
        self.next_token();
        let token = self.cur_token.clone();
        self.next_token();
        let value = self.parse_expression(Precedence::Lowest)?;

        if self.peek_token_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Stmt::Assign {
            token,
            target: AssignTarget::Name(name),
            value,
        })
    }

    /// Tentatively parses `a, b, c = value`; when the identifier list
    /// does not end at `=`, the lexer rewinds and the statement parses
    /// as an ordinary expression.
    fn parse_destructuring_or_expression(&mut self) -> Option<Stmt> {
        let lexer_position = self.lexer.current_position();

        if let Some(names) = self.parse_destructuring_identifiers() {
            if self.peek_token_is(TokenKind::Assign) {
                self.next_token();
                let token = self.cur_token.clone();
                self.next_token();
                let value = self.parse_expression(Precedence::Lowest)?;

                if self.peek_token_is(TokenKind::Semicolon) {
                    self.next_token();
                }

                return Some(Stmt::Assign {
                    token,
                    target: AssignTarget::Names(names),
                    value,
                });
            }
        }

        self.rewind(lexer_position);
        self.parse_expression_statement()
    }

    fn parse_destructuring_identifiers(&mut self) -> Option<Vec<String>> {
        let mut names = vec![self.cur_token.literal.clone()];

        while self.peek_token_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            if !self.cur_token_is(TokenKind::Ident) {
                return None;
            }
            names.push(self.cur_token.literal.clone());
        }

        Some(names)
    }

    fn parse_return_statement(&mut self) -> Option<Stmt> {
        let token = self.cur_token.clone();

        let value = if self.peek_token_is(TokenKind::Semicolon)
            || self.peek_token_is(TokenKind::RBrace)
            || self.peek_token_is(TokenKind::Eof)
        {
            // A bare return yields null.
            Expr::Null {
                token: token.clone(),
            }
        } else {
            self.next_token();
            self.parse_expression(Precedence::Lowest)?
        };

        if self.peek_token_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Stmt::Return { token, value })
    }

    fn parse_expression_statement(&mut self) -> Option<Stmt> {
        let token = self.cur_token.clone();
        let expression = self.parse_expression(Precedence::Lowest)?;

        // An index or property expression followed by `=` is an
        // assignment target.
        if self.peek_token_is(TokenKind::Assign) {
            if let Some(target) = assignment_target(&expression) {
                self.next_token();
                let token = self.cur_token.clone();
                self.next_token();
                let value = self.parse_expression(Precedence::Lowest)?;

                if self.peek_token_is(TokenKind::Semicolon) {
                    self.next_token();
                }

                return Some(Stmt::Assign {
                    token,
                    target,
                    value,
                });
            }
        }

        if self.peek_token_is(TokenKind::Semicolon) {
            self.next_token();
        }

        Some(Stmt::Expression { token, expression })
    }

    fn parse_expression(&mut self, precedence: Precedence) -> Option<Expr> {
        let mut left = self.parse_prefix()?;

        while !self.peek_token_is(TokenKind::Semicolon) && precedence < self.peek_precedence() {
            if !has_infix(self.peek_token.kind) {
                return Some(left);
            }
            self.next_token();
            left = self.parse_infix(left)?;
        }

        Some(left)
    }

    fn parse_prefix(&mut self) -> Option<Expr> {
        match self.cur_token.kind {
            TokenKind::Ident => Some(Expr::Identifier {
                token: self.cur_token.clone(),
                value: self.cur_token.literal.clone(),
            }),
            TokenKind::Number => self.parse_number_literal(),
            TokenKind::Str => Some(Expr::Str {
                token: self.cur_token.clone(),
                value: self.cur_token.literal.clone(),
            }),
            TokenKind::Null => Some(Expr::Null {
                token: self.cur_token.clone(),
            }),
            TokenKind::Bang | TokenKind::Plus | TokenKind::Minus | TokenKind::Tilde => {
                self.parse_prefix_expression()
            }
            TokenKind::True | TokenKind::False => Some(Expr::Boolean {
                token: self.cur_token.clone(),
                value: self.cur_token_is(TokenKind::True),
            }),
            TokenKind::LParen => self.parse_grouped_expression(),
            TokenKind::If => self.parse_if_expression(),
            TokenKind::While => self.parse_while_expression(),
            TokenKind::For => self.parse_for_expression(),
            TokenKind::Function => self.parse_function_literal(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_hash_literal(),
            TokenKind::Command => Some(Expr::Command {
                token: self.cur_token.clone(),
                value: self.cur_token.literal.clone(),
                deferred: false,
            }),
            TokenKind::Break => Some(Expr::Break {
                token: self.cur_token.clone(),
            }),
            TokenKind::Continue => Some(Expr::Continue {
                token: self.cur_token.clone(),
            }),
            TokenKind::CurrentArgs => Some(Expr::CurrentArgs {
                token: self.cur_token.clone(),
            }),
            TokenKind::At => self.parse_decorator(),
            TokenKind::Defer => self.parse_defer(),
            _ => {
                self.no_prefix_error();
                None
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Option<Expr> {
        match self.cur_token.kind {
            TokenKind::CompPlus
            | TokenKind::CompMinus
            | TokenKind::CompSlash
            | TokenKind::CompAsterisk
            | TokenKind::CompExponent
            | TokenKind::CompModulo => self.parse_compound_assignment(left),
            TokenKind::Question => self.parse_question_expression(left),
            TokenKind::Dot => self.parse_dotted_expression(left),
            TokenKind::LParen => self.parse_call_expression(left),
            TokenKind::LBracket => self.parse_index_expression(left),
            _ => self.parse_infix_expression(left),
        }
    }

    fn parse_number_literal(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        let mut literal = token.literal.clone();
        let mut abbreviation = None;

        if let Some(last) = literal.chars().last() {
            if let Some(multiplier) = number_abbreviation(last) {
                literal.pop();
                abbreviation = Some(multiplier);
            }
        }

        let value: f64 = match literal.parse() {
            Ok(value) => value,
            Err(_) => {
                let msg = format!("could not parse '{}' as a number", literal);
                self.report_error(&msg, &token);
                return None;
            }
        };

        Some(Expr::Number {
            token,
            value: value * abbreviation.unwrap_or(1.0),
        })
    }

    fn parse_prefix_expression(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        let operator = self.cur_token.literal.clone();

        // Unary +/- bind the whole postfix chain after them.
        let precedence = if self.cur_token_is(TokenKind::Plus) || self.cur_token_is(TokenKind::Minus)
        {
            Precedence::Highest
        } else {
            Precedence::Prefix
        };
        self.next_token();

        let right = self.parse_expression(precedence)?;
        Some(Expr::Prefix {
            token,
            operator,
            right: Box::new(right),
        })
    }

    fn parse_infix_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur_token.clone();
        let operator = self.cur_token.literal.clone();
        let precedence = self.cur_precedence();
        self.next_token();
        let right = self.parse_expression(precedence)?;

        Some(Expr::Infix {
            token,
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_compound_assignment(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur_token.clone();
        let operator = self.cur_token.literal.clone();
        let precedence = self.cur_precedence();
        self.next_token();
        let right = self.parse_expression(precedence)?;

        Some(Expr::CompoundAssign {
            token,
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    /// `x.y` is a property access, `x.y(...)` a method call.
    fn parse_dotted_expression(&mut self, object: Expr) -> Option<Expr> {
        let token = self.cur_token.clone();
        self.next_token();

        if !self.cur_token_is(TokenKind::Ident) {
            let msg = format!(
                "expected a property or method name, got {} instead",
                self.cur_token.kind
            );
            let err_token = self.cur_token.clone();
            self.report_error(&msg, &err_token);
            return None;
        }

        let name = self.cur_token.literal.clone();

        if self.peek_token_is(TokenKind::LParen) {
            self.next_token();
            let arguments = self.parse_expression_list(TokenKind::RParen)?;
            return Some(Expr::Method {
                token,
                object: Box::new(object),
                method: name,
                arguments,
                optional: false,
                deferred: false,
            });
        }

        Some(Expr::Property {
            token,
            object: Box::new(object),
            property: name,
            optional: false,
        })
    }

    /// `x?.y` and `x?.y(...)` set the optional flag on the result.
    fn parse_question_expression(&mut self, object: Expr) -> Option<Expr> {
        self.next_token();

        if !self.cur_token_is(TokenKind::Dot) {
            let msg = format!("expected . after ?, got {} instead", self.cur_token.kind);
            let token = self.cur_token.clone();
            self.report_error(&msg, &token);
            return None;
        }

        let mut expr = self.parse_dotted_expression(object)?;
        match &mut expr {
            Expr::Property { optional, .. } | Expr::Method { optional, .. } => *optional = true,
            _ => {}
        }
        Some(expr)
    }

    fn parse_grouped_expression(&mut self) -> Option<Expr> {
        self.next_token();
        let expr = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }
        Some(expr)
    }

    /// `eğer cond {}` with any number of `yoksa eğer cond {}` arms and an
    /// optional bare `yoksa {}` arm, which gets an always-true condition.
    fn parse_if_expression(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        let mut scenarios = Vec::new();

        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        scenarios.push(Scenario {
            condition,
            consequence: self.parse_block_statement(),
        });

        while self.peek_token_is(TokenKind::Else) {
            self.next_token();
            self.next_token();

            let condition = if self.cur_token_is(TokenKind::If) {
                self.next_token();
                let condition = self.parse_expression(Precedence::Lowest)?;
                if !self.expect_peek(TokenKind::LBrace) {
                    return None;
                }
                condition
            } else {
                Expr::Boolean {
                    token: Token::new(TokenKind::True, token.position, "doğru"),
                    value: true,
                }
            };

            scenarios.push(Scenario {
                condition,
                consequence: self.parse_block_statement(),
            });
        }

        Some(Expr::If { token, scenarios })
    }

    fn parse_while_expression(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();

        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        Some(Expr::While {
            token,
            condition: Box::new(condition),
            consequence: self.parse_block_statement(),
        })
    }

    /// Dispatches between the C-style `döngü i = 0; cond; closer {}` and
    /// the `döngü k, v in iterable {}` forms.
    fn parse_for_expression(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        self.next_token();

        if !self.cur_token_is(TokenKind::Ident) {
            let msg = format!(
                "expected an identifier after döngü, got {} instead",
                self.cur_token.kind
            );
            let err_token = self.cur_token.clone();
            self.report_error(&msg, &err_token);
            return None;
        }

        if !self.peek_token_is(TokenKind::Assign) {
            return self.parse_for_in_expression(token);
        }

        let identifier = self.cur_token.literal.clone();
        let starter = self.parse_name_assign()?;
        self.next_token();
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.next_token();
        self.next_token();
        let closer = match self.parse_statement()? {
            closer @ Stmt::Assign { .. } => closer,
            _ => {
                let msg = "expected an assignment to close the loop".to_string();
                let err_token = self.cur_token.clone();
                self.report_error(&msg, &err_token);
                return None;
            }
        };

        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        Some(Expr::For {
            token,
            identifier,
            starter: Box::new(starter),
            condition: Box::new(condition),
            closer: Box::new(closer),
            block: self.parse_block_statement(),
        })
    }

    fn parse_for_in_expression(&mut self, token: Token) -> Option<Expr> {
        let mut value = self.cur_token.literal.clone();
        let mut key = None;
        self.next_token();

        if self.cur_token_is(TokenKind::Comma) {
            self.next_token();

            if !self.cur_token_is(TokenKind::Ident) {
                let msg = format!(
                    "expected an identifier after the loop key, got {} instead",
                    self.cur_token.kind
                );
                let err_token = self.cur_token.clone();
                self.report_error(&msg, &err_token);
                return None;
            }

            key = Some(value);
            value = self.cur_token.literal.clone();
            self.next_token();
        }

        if !self.cur_token_is(TokenKind::In) {
            let msg = format!("expected in, got {} instead", self.cur_token.kind);
            let err_token = self.cur_token.clone();
            self.report_error(&msg, &err_token);
            return None;
        }
        self.next_token();

        let iterable = self.parse_expression(Precedence::Lowest)?;

        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }
        let block = self.parse_block_statement();

        // An else block runs when the iterable produced no iterations.
        let alternative = if self.peek_token_is(TokenKind::Else) {
            self.next_token();
            if !self.expect_peek(TokenKind::LBrace) {
                return None;
            }
            Some(self.parse_block_statement())
        } else {
            None
        };

        Some(Expr::ForIn {
            token,
            key,
            value,
            iterable: Box::new(iterable),
            block,
            alternative,
        })
    }

    fn parse_block_statement(&mut self) -> Block {
        let token = self.cur_token.clone();
        let mut statements = Vec::new();

        self.next_token();

        while !self.cur_token_is(TokenKind::RBrace) && !self.cur_token_is(TokenKind::Eof) {
            if let Some(stmt) = self.parse_statement() {
                statements.push(stmt);
            }
            self.next_token();
        }

        Block { token, statements }
    }

    fn parse_function_literal(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();

        let name = if self.peek_token_is(TokenKind::Ident) {
            self.next_token();
            Some(self.cur_token.literal.clone())
        } else {
            None
        };

        if !self.expect_peek(TokenKind::LParen) {
            return None;
        }
        let parameters = self.parse_function_parameters()?;
        if !self.expect_peek(TokenKind::LBrace) {
            return None;
        }

        Some(Expr::Function(Rc::new(FunctionLiteral {
            token,
            name,
            parameters,
            body: self.parse_block_statement(),
        })))
    }

    fn parse_function_parameters(&mut self) -> Option<Vec<Parameter>> {
        let mut parameters = Vec::new();

        if self.peek_token_is(TokenKind::RParen) {
            self.next_token();
            return Some(parameters);
        }

        self.next_token();

        let (param, mut found_optional) = self.parse_function_parameter()?;
        parameters.push(param);

        while self.peek_token_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();

            let (param, optional) = self.parse_function_parameter()?;

            // Once a default appears every later parameter needs one too.
            if found_optional && !optional {
                let msg = "found a mandatory parameter after an optional one".to_string();
                let token = self.cur_token.clone();
                self.report_error(&msg, &token);
            }

            if optional {
                found_optional = true;
            }

            parameters.push(param);
        }

        if !self.expect_peek(TokenKind::RParen) {
            return None;
        }

        Some(parameters)
    }

    fn parse_function_parameter(&mut self) -> Option<(Parameter, bool)> {
        let name = self.cur_token.literal.clone();

        if self.peek_token_is(TokenKind::Comma) || self.peek_token_is(TokenKind::RParen) {
            return Some((
                Parameter {
                    name,
                    default: None,
                },
                false,
            ));
        }

        if !self.peek_token_is(TokenKind::Assign) {
            let msg = "invalid optional parameter syntax".to_string();
            let token = self.cur_token.clone();
            self.report_error(&msg, &token);
            return Some((
                Parameter {
                    name,
                    default: None,
                },
                false,
            ));
        }

        self.next_token();
        self.next_token();
        let default = self.parse_expression(Precedence::Lowest)?;

        Some((
            Parameter {
                name,
                default: Some(default),
            },
            true,
        ))
    }

    /// `@decorator` must be followed by a named function literal or
    /// another decorator.
    fn parse_decorator(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        self.next_token();
        let expression = self.parse_expression_statement_expression()?;

        self.next_token();
        let decorated = self.parse_expression_statement_expression()?;

        match &decorated {
            Expr::Function(function) => {
                if function.name.is_none() {
                    self.report_error(
                        "decorators cannot be applied to anonymous functions",
                        &token,
                    );
                }
            }
            Expr::Decorator { .. } => {}
            _ => {
                self.report_error(
                    "a decorator must decorate a named function or another decorator",
                    &token,
                );
            }
        }

        Some(Expr::Decorator {
            token,
            expression: Box::new(expression),
            decorated: Box::new(decorated),
        })
    }

    fn parse_expression_statement_expression(&mut self) -> Option<Expr> {
        let expr = self.parse_expression(Precedence::Lowest)?;
        if self.peek_token_is(TokenKind::Semicolon) {
            self.next_token();
        }
        Some(expr)
    }

    /// `bekle expr` marks a call, method call or command as deferred.
    fn parse_defer(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        self.next_token();
        let mut expr = self.parse_expression(Precedence::Lowest)?;

        if !expr.set_deferred() {
            self.report_error(
                "only calls can be deferred: bekle f() | bekle `komut` | bekle x.m()",
                &token,
            );
        }

        Some(expr)
    }

    fn parse_call_expression(&mut self, function: Expr) -> Option<Expr> {
        let token = self.cur_token.clone();
        let arguments = self.parse_expression_list(TokenKind::RParen)?;

        Some(Expr::Call {
            token,
            function: Box::new(function),
            arguments,
            deferred: false,
        })
    }

    fn parse_expression_list(&mut self, end: TokenKind) -> Option<Vec<Expr>> {
        let mut list = Vec::new();

        if self.peek_token_is(end) {
            self.next_token();
            return Some(list);
        }

        self.next_token();
        list.push(self.parse_expression(Precedence::Lowest)?);

        while self.peek_token_is(TokenKind::Comma) {
            self.next_token();
            self.next_token();
            list.push(self.parse_expression(Precedence::Lowest)?);
        }

        if !self.expect_peek(end) {
            return None;
        }

        Some(list)
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        let elements = self.parse_expression_list(TokenKind::RBracket)?;
        Some(Expr::Array { token, elements })
    }

    /// `a[i]`, the slice `a[i:j]`, and `a[:j]` where the missing start
    /// means index 0. Any colon sets the range flag.
    fn parse_index_expression(&mut self, left: Expr) -> Option<Expr> {
        let token = self.cur_token.clone();
        let mut is_range = false;

        let index = if self.peek_token_is(TokenKind::Colon) {
            is_range = true;
            Expr::Number {
                token: Token::new(TokenKind::Number, token.position, "0"),
                value: 0.0,
            }
        } else {
            self.next_token();
            self.parse_expression(Precedence::Lowest)?
        };

        let mut end = None;
        if self.peek_token_is(TokenKind::Colon) {
            is_range = true;
            self.next_token();

            if !self.peek_token_is(TokenKind::RBracket) {
                self.next_token();
                end = Some(Box::new(self.parse_expression(Precedence::Lowest)?));
            }
        }

        if !self.expect_peek(TokenKind::RBracket) {
            return None;
        }

        Some(Expr::Index {
            token,
            left: Box::new(left),
            index: Box::new(index),
            end,
            is_range,
        })
    }

    fn parse_hash_literal(&mut self) -> Option<Expr> {
        let token = self.cur_token.clone();
        let mut pairs = Vec::new();

        while !self.peek_token_is(TokenKind::RBrace) {
            self.next_token();
            let key = self.parse_expression(Precedence::Lowest)?;

            if !self.expect_peek(TokenKind::Colon) {
                return None;
            }

            self.next_token();
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.peek_token_is(TokenKind::RBrace) && !self.expect_peek(TokenKind::Comma) {
                return None;
            }
        }

        if !self.expect_peek(TokenKind::RBrace) {
            return None;
        }

        Some(Expr::Hash { token, pairs })
    }
}

fn assignment_target(expr: &Expr) -> Option<AssignTarget> {
    match expr {
        Expr::Index { .. } => Some(AssignTarget::Index(Box::new(expr.clone()))),
        Expr::Property { .. } => Some(AssignTarget::Property(Box::new(expr.clone()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Program {
        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "parser errors for {:?}: {:?}",
            input,
            parser.errors()
        );
        program
    }

    fn parse_display(input: &str) -> String {
        parse(input).to_string()
    }

    #[test]
    fn test_operator_precedence() {
        let cases = vec![
            ("1 + 2 * 3", "(1 + (2 * 3))"),
            ("-a * b", "((-a) * b)"),
            ("!doğru == yanlış", "((!doğru) == yanlış)"),
            ("a + b - c", "((a + b) - c)"),
            ("a * b / c", "((a * b) / c)"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("5 < 4 != 3 > 4", "((5 < 4) != (3 > 4))"),
            ("1 .. 5 * 2", "(1 .. (5 * 2))"),
            ("a && b || c", "((a && b) || c)"),
            ("1 <=> 2 == 0", "((1 <=> 2) == 0)"),
            ("(1 + 2) * 3", "((1 + 2) * 3)"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_display(input), expected);
        }
    }

    #[test]
    fn test_unary_minus_binds_dotted_expression() {
        assert_eq!(parse_display("-a.b"), "(-a.b)");
    }

    #[test]
    fn test_assign_statements() {
        let program = parse("x = 5;");
        match &program.statements[0] {
            Stmt::Assign {
                target: AssignTarget::Name(name),
                value,
                ..
            } => {
                assert_eq!(name, "x");
                assert_eq!(value.to_string(), "5");
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_destructuring_assignment() {
        let program = parse("a, b, c = [1, 2, 3]");
        match &program.statements[0] {
            Stmt::Assign {
                target: AssignTarget::Names(names),
                ..
            } => assert_eq!(names, &["a", "b", "c"]),
            other => panic!("expected destructuring assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_destructuring_rewind_falls_back_to_expression() {
        // Not a destructuring assignment: the list does not end at `=`,
        // so the lexer rewinds and `eko` parses as a lone identifier.
        let mut parser = Parser::new(Lexer::new("eko, 1"));
        let program = parser.parse_program();
        assert!(matches!(
            program.statements.first(),
            Some(Stmt::Expression { .. })
        ));
    }

    #[test]
    fn test_index_assignment_target() {
        let program = parse("a[0] = 1");
        match &program.statements[0] {
            Stmt::Assign {
                target: AssignTarget::Index(index),
                ..
            } => assert_eq!(index.to_string(), "(a[0])"),
            other => panic!("expected index assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_property_assignment_target() {
        let program = parse("h.x = 2");
        match &program.statements[0] {
            Stmt::Assign {
                target: AssignTarget::Property(property),
                ..
            } => assert_eq!(property.to_string(), "h.x"),
            other => panic!("expected property assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_if_else_chain() {
        let program = parse("eğer a { 1 } yoksa eğer b { 2 } yoksa { 3 }");
        match &program.statements[0] {
            Stmt::Expression {
                expression: Expr::If { scenarios, .. },
                ..
            } => {
                assert_eq!(scenarios.len(), 3);
                // The bare else arm carries a synthesized true condition.
                assert_eq!(scenarios[2].condition.to_string(), "doğru");
            }
            other => panic!("expected if expression, got {:?}", other),
        }
    }

    #[test]
    fn test_function_literal_with_defaults() {
        let program = parse("f topla(x, y = 10) { dön x + y }");
        match &program.statements[0] {
            Stmt::Expression {
                expression: Expr::Function(function),
                ..
            } => {
                assert_eq!(function.name.as_deref(), Some("topla"));
                assert_eq!(function.parameters.len(), 2);
                assert!(function.parameters[0].default.is_none());
                assert_eq!(
                    function.parameters[1].default.as_ref().unwrap().to_string(),
                    "10"
                );
            }
            other => panic!("expected function literal, got {:?}", other),
        }
    }

    #[test]
    fn test_mandatory_after_optional_parameter_errors() {
        let mut parser = Parser::new(Lexer::new("f(x = 1, y) { x }"));
        parser.parse_program();
        assert!(!parser.errors().is_empty());
    }

    #[test]
    fn test_for_variants() {
        assert_eq!(
            parse_display("döngü i = 0; i < 3; i = i + 1 { eko(i) }"),
            "döngü i = 0; (i < 3); i = (i + 1) {eko(i)}"
        );
        assert_eq!(
            parse_display("döngü k, v in h { eko(k) }"),
            "döngü k, v in h {eko(k)}"
        );
        assert_eq!(
            parse_display("döngü v in a { eko(v) } yoksa { eko(0) }"),
            "döngü v in a {eko(v)}"
        );
    }

    #[test]
    fn test_for_in_else_block() {
        let program = parse("döngü v in [] { 1 } yoksa { 2 }");
        match &program.statements[0] {
            Stmt::Expression {
                expression: Expr::ForIn { alternative, .. },
                ..
            } => assert!(alternative.is_some()),
            other => panic!("expected for-in, got {:?}", other),
        }
    }

    #[test]
    fn test_method_property_optional() {
        assert_eq!(parse_display("a.b(1, 2)"), "a.b(1, 2)");
        assert_eq!(parse_display("a.b"), "a.b");
        let program = parse("a?.b");
        match &program.statements[0] {
            Stmt::Expression {
                expression: Expr::Property { optional, .. },
                ..
            } => assert!(optional),
            other => panic!("expected optional property, got {:?}", other),
        }
    }

    #[test]
    fn test_slices() {
        assert_eq!(parse_display("a[1:2]"), "(a[1:2])");
        assert_eq!(parse_display("a[:2]"), "(a[0:2])");
        assert_eq!(parse_display("a[1:]"), "(a[1:])");
        assert_eq!(parse_display("a[1]"), "(a[1])");
    }

    #[test]
    fn test_defer_marks_calls() {
        let program = parse("bekle eko(1)");
        match &program.statements[0] {
            Stmt::Expression { expression, .. } => assert!(expression.is_deferred()),
            other => panic!("expected deferred call, got {:?}", other),
        }
    }

    #[test]
    fn test_defer_rejects_non_calls() {
        let mut parser = Parser::new(Lexer::new("bekle 1"));
        parser.parse_program();
        assert!(!parser.errors().is_empty());
    }

    #[test]
    fn test_decorator() {
        let program = parse("@iki_kere f g() { dön 1 }");
        match &program.statements[0] {
            Stmt::Expression {
                expression:
                    Expr::Decorator {
                        expression,
                        decorated,
                        ..
                    },
                ..
            } => {
                assert_eq!(expression.to_string(), "iki_kere");
                assert!(matches!(**decorated, Expr::Function(_)));
            }
            other => panic!("expected decorator, got {:?}", other),
        }
    }

    #[test]
    fn test_decorator_requires_named_function() {
        let mut parser = Parser::new(Lexer::new("@deko f() { dön 1 }"));
        parser.parse_program();
        assert!(!parser.errors().is_empty());
    }

    #[test]
    fn test_current_args_literal() {
        let program = parse("f g() { topla(...) }");
        assert_eq!(program.to_string(), "f g() {topla(...)}");
    }

    #[test]
    fn test_number_abbreviations() {
        let program = parse("10k");
        match &program.statements[0] {
            Stmt::Expression {
                expression: Expr::Number { value, .. },
                ..
            } => assert_eq!(*value, 10_000.0),
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn test_compound_assignment() {
        assert_eq!(parse_display("a += 1"), "(a += 1)");
        assert_eq!(parse_display("a **= 2"), "(a **= 2)");
    }

    #[test]
    fn test_illegal_token_reports_error_but_parsing_continues() {
        let mut parser = Parser::new(Lexer::new("1.2.3; a = 1"));
        let program = parser.parse_program();
        assert!(!parser.errors().is_empty());
        assert!(!program.statements.is_empty());
    }

    #[test]
    fn test_hash_literal() {
        assert_eq!(parse_display("{\"a\": 1, \"b\": 2}"), "{\"a\": 1, \"b\": 2}");
    }
}
