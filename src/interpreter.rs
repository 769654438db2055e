use std::collections::{BTreeMap, HashMap};
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use crate::ast::{AssignTarget, Block, Expr, Program, Stmt};
use crate::builtins;
use crate::environment::{Env, Environment};
use crate::lexer::Lexer;
use crate::object::{
    CmdResult, ErrorKind, ErrorObj, FunctionObj, HashObj, HashPair, Object,
    ObjectKind,
};
use crate::parser::Parser;
use crate::token::Token;
use crate::util;

/// The tree walker. Owns the current source lexer so runtime errors can
/// be rendered with their line and column; `source`, `require` and
/// `eval` swap the lexer for the duration of the nested program.
pub struct Interpreter {
    lexer: Lexer,
    pub(crate) require_cache: HashMap<String, Object>,
    pub(crate) package_aliases: Option<HashMap<String, String>>,
    pub(crate) source_level: usize,
}

impl Interpreter {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            require_cache: HashMap::new(),
            package_aliases: None,
            source_level: 0,
        }
    }

    pub(crate) fn new_error(&self, token: &Token, message: impl Into<String>) -> Object {
        let (line, column, text) = self.lexer.error_line(token.position);
        Object::Error(ErrorObj {
            kind: ErrorKind::Generic,
            message: format!("{}\n{}:{}> {}", message.into(), line, column, text),
        })
    }

    fn new_control_error(&self, kind: ErrorKind, token: &Token, message: &str) -> Object {
        match self.new_error(token, message) {
            Object::Error(err) => Object::Error(ErrorObj { kind, ..err }),
            other => other,
        }
    }

    /// Evaluates a whole program. Deferred expression statements are
    /// hoisted and run in order after everything else, regardless of
    /// returns or errors; a `ReturnValue` unwraps at this boundary.
    pub fn eval_program(&mut self, program: &Program, env: &Env) -> Object {
        let mut result = Object::Null;
        let mut deferred = Vec::new();

        for statement in &program.statements {
            if let Stmt::Expression { expression, .. } = statement {
                if expression.is_deferred() {
                    deferred.push(statement);
                    continue;
                }
            }

            let evaluated = self.eval_statement(statement, env);
            match evaluated {
                Object::ReturnValue(value) => {
                    result = *value;
                    break;
                }
                Object::Error(_) => {
                    result = evaluated;
                    break;
                }
                other => result = other,
            }
        }

        for statement in deferred {
            self.eval_statement(statement, env);
        }

        result
    }

    /// Evaluates a block. Unlike programs, returns and errors propagate
    /// unchanged so outer scopes can observe them; deferred statements
    /// still run last.
    fn eval_block(&mut self, block: &Block, env: &Env) -> Object {
        let mut result = Object::Null;
        let mut deferred = Vec::new();

        for statement in &block.statements {
            if let Stmt::Expression { expression, .. } = statement {
                if expression.is_deferred() {
                    deferred.push(statement);
                    continue;
                }
            }

            result = self.eval_statement(statement, env);
            if matches!(result, Object::ReturnValue(_) | Object::Error(_)) {
                break;
            }
        }

        for statement in deferred {
            self.eval_statement(statement, env);
        }

        result
    }

    fn eval_statement(&mut self, statement: &Stmt, env: &Env) -> Object {
        match statement {
            Stmt::Expression { expression, .. } => self.eval_expression(expression, env),
            Stmt::Return { value, .. } => {
                let value = self.eval_expression(value, env);
                if value.is_error() {
                    return value;
                }
                Object::ReturnValue(Box::new(value))
            }
            Stmt::Assign { token, target, value } => {
                let result = self.eval_assignment(token, target, value, env);
                if result.is_error() {
                    return result;
                }
                Object::Null
            }
        }
    }

    pub fn eval_expression(&mut self, expression: &Expr, env: &Env) -> Object {
        match expression {
            Expr::Identifier { token, value } => self.eval_identifier(token, value, env),
            Expr::Number { value, .. } => Object::Number(*value),
            Expr::Str { value, .. } => {
                Object::Str(util::interpolate_string_vars(value, env))
            }
            Expr::Null { .. } => Object::Null,
            Expr::Boolean { value, .. } => Object::Boolean(*value),
            Expr::CurrentArgs { .. } => {
                Object::current_args(env.borrow().current_args.clone())
            }
            Expr::Array { elements, .. } => match self.eval_expressions(elements, env) {
                Ok(elements) => Object::array(elements),
                Err(err) => err,
            },
            Expr::Hash { token, pairs, .. } => self.eval_hash_literal(token, pairs, env),
            Expr::Prefix {
                token,
                operator,
                right,
            } => {
                let right = self.eval_expression(right, env);
                if right.is_error() {
                    return right;
                }
                self.eval_prefix(token, operator, right)
            }
            Expr::Infix {
                token,
                operator,
                left,
                right,
            } => self.eval_infix(token, operator, left, right, env),
            Expr::CompoundAssign {
                token,
                operator,
                left,
                right,
            } => self.eval_compound_assignment(token, operator, left, right, env),
            Expr::If { scenarios, .. } => self.eval_if(scenarios, env),
            Expr::While {
                condition,
                consequence,
                ..
            } => self.eval_while(condition, consequence, env),
            Expr::For {
                identifier,
                starter,
                condition,
                closer,
                block,
                ..
            } => self.eval_for(identifier, starter, condition, closer, block, env),
            Expr::ForIn {
                token,
                key,
                value,
                iterable,
                block,
                alternative,
            } => self.eval_for_in(token, key, value, iterable, block, alternative, env),
            Expr::Function(literal) => {
                let function = Object::Function(Rc::new(FunctionObj {
                    node: literal.clone(),
                    name: literal.name.clone(),
                    env: env.clone(),
                }));
                if let Some(name) = &literal.name {
                    env.borrow_mut().set(name.as_str(), function.clone());
                }
                function
            }
            Expr::Decorator {
                token,
                expression,
                decorated,
            } => self.eval_decorator(token, expression, decorated, env),
            Expr::Call {
                token,
                function,
                arguments,
                ..
            } => {
                let function = self.eval_expression(function, env);
                if function.is_error() {
                    return function;
                }

                let mut args = match self.eval_expressions(arguments, env) {
                    Ok(args) => args,
                    Err(err) => return err,
                };

                // A leading `...` forwards the caller's argument vector,
                // concatenated with the remaining arguments.
                let expands = matches!(
                    args.first(),
                    Some(Object::Array(arr)) if arr.borrow().is_current_args
                );
                if expands {
                    let mut forwarded = env.borrow().current_args.clone();
                    forwarded.extend(args.drain(..).skip(1));
                    args = forwarded;
                }

                self.apply_function(token, function, env, args)
            }
            Expr::Method {
                token,
                object,
                method,
                arguments,
                optional,
                ..
            } => {
                let object = self.eval_expression(object, env);
                if object.is_error() {
                    return object;
                }

                let args = match self.eval_expressions(arguments, env) {
                    Ok(args) => args,
                    Err(err) => return err,
                };

                self.apply_method(token, object, method, *optional, env, args)
            }
            Expr::Property {
                token,
                object,
                property,
                optional,
            } => self.eval_property(token, object, property, *optional, env),
            Expr::Index {
                token,
                left,
                index,
                end,
                is_range,
            } => self.eval_index(token, left, index, end.as_deref(), *is_range, env),
            Expr::Command { token, value, .. } => {
                self.eval_command_expression(token, value, env)
            }
            Expr::Break { token } => {
                self.new_control_error(ErrorKind::Break, token, "\"dur\" used outside of a loop")
            }
            Expr::Continue { token } => self.new_control_error(
                ErrorKind::Continue,
                token,
                "\"devam\" used outside of a loop",
            ),
        }
    }

    fn eval_expressions(
        &mut self,
        expressions: &[Expr],
        env: &Env,
    ) -> Result<Vec<Object>, Object> {
        let mut result = Vec::with_capacity(expressions.len());
        for expression in expressions {
            let evaluated = self.eval_expression(expression, env);
            if evaluated.is_error() {
                return Err(evaluated);
            }
            result.push(evaluated);
        }
        Ok(result)
    }

    fn eval_identifier(&mut self, token: &Token, name: &str, env: &Env) -> Object {
        if let Some(value) = env.borrow().get(name) {
            return value;
        }
        if let Some(builtin) = builtins::registry().get(name) {
            return Object::Builtin(builtin);
        }
        self.new_error(token, format!("identifier not found: {}", name))
    }

    fn eval_assignment(
        &mut self,
        token: &Token,
        target: &AssignTarget,
        value: &Expr,
        env: &Env,
    ) -> Object {
        let value = self.eval_expression(value, env);
        if value.is_error() {
            return value;
        }

        match target {
            AssignTarget::Name(name) => {
                env.borrow_mut().set(name.as_str(), value);
                Object::Null
            }
            AssignTarget::Names(names) => match &value {
                Object::Array(arr) => {
                    let elements = arr.borrow().elements.clone();
                    for (i, name) in names.iter().enumerate() {
                        let element = elements.get(i).cloned().unwrap_or(Object::Null);
                        env.borrow_mut().set(name.as_str(), element);
                    }
                    Object::Null
                }
                Object::Hash(hash) => {
                    for name in names {
                        let element = hash
                            .borrow()
                            .get_pair(name)
                            .map(|pair| pair.value.clone())
                            .unwrap_or(Object::Null);
                        env.borrow_mut().set(name.as_str(), element);
                    }
                    Object::Null
                }
                other => self.new_error(
                    token,
                    format!(
                        "expected an array or hash to destructure, got {}",
                        other.kind()
                    ),
                ),
            },
            AssignTarget::Index(index) => self.eval_index_assignment(index, value, env),
            AssignTarget::Property(property) => {
                self.eval_property_assignment(property, value, env)
            }
        }
    }

    /// `a[i] = v`. Arrays grow with null padding when the index is past
    /// the end; negative indexes are an error. Hash keys must be hashable.
    fn eval_index_assignment(&mut self, index_expr: &Expr, value: Object, env: &Env) -> Object {
        let (token, left, index) = match index_expr {
            Expr::Index {
                token, left, index, ..
            } => (token, left, index),
            _ => return Object::Null,
        };

        let left = self.eval_expression(left, env);
        if left.is_error() {
            return left;
        }
        let index = self.eval_expression(index, env);
        if index.is_error() {
            return index;
        }

        match &left {
            Object::Array(arr) => {
                let idx = match index {
                    Object::Number(n) => n as i64,
                    other => {
                        return self.new_error(
                            token,
                            format!("array index must be a number, got {}", other.kind()),
                        )
                    }
                };
                if idx < 0 {
                    return self.new_error(token, format!("index out of range: {}", idx));
                }
                let idx = idx as usize;
                let mut arr = arr.borrow_mut();
                if idx >= arr.elements.len() {
                    arr.elements.resize(idx + 1, Object::Null);
                }
                arr.elements[idx] = value;
                Object::Null
            }
            Object::Hash(hash) => {
                let key = match index.hash_key() {
                    Some(key) => key,
                    None => {
                        return self.new_error(
                            token,
                            "only strings, numbers and booleans can be used as hash keys",
                        )
                    }
                };
                hash.borrow_mut()
                    .pairs
                    .insert(key, HashPair { key: index, value });
                Object::Null
            }
            _ => Object::Null,
        }
    }

    /// `h.x = v`, valid on hashes only; the property name becomes a
    /// string key.
    fn eval_property_assignment(
        &mut self,
        property_expr: &Expr,
        value: Object,
        env: &Env,
    ) -> Object {
        let (token, object, property) = match property_expr {
            Expr::Property {
                token,
                object,
                property,
                ..
            } => (token, object, property),
            _ => return Object::Null,
        };

        let target = self.eval_expression(object, env);
        if target.is_error() {
            return target;
        }

        match &target {
            Object::Hash(hash) => {
                let key = Object::Str(property.clone());
                let hash_key = key.hash_key().expect("strings are hashable");
                hash.borrow_mut()
                    .pairs
                    .insert(hash_key, HashPair { key, value });
                Object::Null
            }
            _ => self.new_error(token, "values can only be assigned to hash properties"),
        }
    }

    /// `a op= b` evaluates `a op b` and assigns the result back to the
    /// same target.
    fn eval_compound_assignment(
        &mut self,
        token: &Token,
        operator: &str,
        left: &Expr,
        right: &Expr,
        env: &Env,
    ) -> Object {
        let left_value = self.eval_expression(left, env);
        if left_value.is_error() {
            return left_value;
        }
        let right_value = self.eval_expression(right, env);
        if right_value.is_error() {
            return right_value;
        }

        let op = operator.trim_end_matches('=');
        let result = self.eval_infix_values(token, op, left_value, right_value, env);
        if result.is_error() {
            return result;
        }

        match left {
            Expr::Identifier { value, .. } => {
                env.borrow_mut().set(value.as_str(), result);
                Object::Null
            }
            Expr::Index { .. } => self.eval_index_assignment(left, result, env),
            Expr::Property { .. } => self.eval_property_assignment(left, result, env),
            other => {
                env.borrow_mut().set(other.to_string(), result);
                Object::Null
            }
        }
    }

    fn eval_prefix(&mut self, token: &Token, operator: &str, right: Object) -> Object {
        match operator {
            "!" => Object::Boolean(!is_truthy(&right)),
            "-" => match right {
                Object::Number(n) => Object::Number(-n),
                other => {
                    self.new_error(token, format!("unknown operator: -{}", other.kind()))
                }
            },
            "+" => match right {
                Object::Number(_) => right,
                other => {
                    self.new_error(token, format!("unknown operator: +{}", other.kind()))
                }
            },
            "~" => match right {
                Object::Number(n) => Object::Number(!(n as i64) as f64),
                other => self.new_error(
                    token,
                    format!(
                        "(~) can only be used on numbers, got {} ({})",
                        other.kind(),
                        other.inspect()
                    ),
                ),
            },
            _ => self.new_error(
                token,
                format!("unknown operator: {}{}", operator, right.kind()),
            ),
        }
    }

    fn eval_infix(
        &mut self,
        token: &Token,
        operator: &str,
        left_expr: &Expr,
        right_expr: &Expr,
        env: &Env,
    ) -> Object {
        let left = self.eval_expression(left_expr, env);
        if left.is_error() {
            return left;
        }

        // Short-circuit operators return the deciding operand itself,
        // not a coerced boolean.
        if operator == "&&" {
            if !is_truthy(&left) {
                return left;
            }
            return self.eval_expression(right_expr, env);
        }
        if operator == "||" {
            if is_truthy(&left) {
                return left;
            }
            return self.eval_expression(right_expr, env);
        }

        let right = self.eval_expression(right_expr, env);
        if right.is_error() {
            return right;
        }

        self.eval_infix_values(token, operator, left, right, env)
    }

    fn eval_infix_values(
        &mut self,
        token: &Token,
        operator: &str,
        left: Object,
        right: Object,
        _env: &Env,
    ) -> Object {
        match (left.kind(), right.kind()) {
            (ObjectKind::Number, ObjectKind::Number) => {
                self.eval_number_infix(token, operator, &left, &right)
            }
            (ObjectKind::Str, ObjectKind::Str) => {
                self.eval_string_infix(token, operator, &left, &right)
            }
            (ObjectKind::Array, ObjectKind::Array) => {
                self.eval_array_infix(token, operator, &left, &right)
            }
            (ObjectKind::Hash, ObjectKind::Hash) => {
                self.eval_hash_infix(token, operator, &left, &right)
            }
            _ => match operator {
                "in" => self.eval_in(token, &left, &right),
                "!in" => self.eval_not_in(token, &left, &right),
                "==" => Object::Boolean(identity_equal(&left, &right)),
                "!=" => Object::Boolean(!identity_equal(&left, &right)),
                _ if left.kind() != right.kind() => self.new_error(
                    token,
                    format!("type mismatch: {} {} {}", left.kind(), operator, right.kind()),
                ),
                _ => self.new_error(
                    token,
                    format!(
                        "unknown operator: {} {} {}",
                        left.kind(),
                        operator,
                        right.kind()
                    ),
                ),
            },
        }
    }

    fn eval_number_infix(
        &mut self,
        token: &Token,
        operator: &str,
        left: &Object,
        right: &Object,
    ) -> Object {
        let l = match left {
            Object::Number(n) => *n,
            _ => unreachable!(),
        };
        let r = match right {
            Object::Number(n) => *n,
            _ => unreachable!(),
        };

        match operator {
            "+" => Object::Number(l + r),
            "-" => Object::Number(l - r),
            "*" => Object::Number(l * r),
            "/" => Object::Number(l / r),
            "**" => Object::Number(l.powf(r)),
            "%" => Object::Number(l % r),
            "<" => Object::Boolean(l < r),
            ">" => Object::Boolean(l > r),
            "<=" => Object::Boolean(l <= r),
            ">=" => Object::Boolean(l >= r),
            "<=>" => {
                let ordering = if l == r {
                    0.0
                } else if l > r {
                    1.0
                } else {
                    -1.0
                };
                Object::Number(ordering)
            }
            "==" => Object::Boolean(l == r),
            "!=" => Object::Boolean(l != r),
            "&" => Object::Number(((l as i64) & (r as i64)) as f64),
            "|" => Object::Number(((l as i64) | (r as i64)) as f64),
            ">>" => Object::Number(((l as u64) >> (r as u64)) as f64),
            "<<" => Object::Number(((l as u64) << (r as u64)) as f64),
            "^" => Object::Number(((l as i64) ^ (r as i64)) as f64),
            // Equality over the integer casts.
            "~" => Object::Boolean((l as i64) == (r as i64)),
            // Inclusive range, ascending or descending.
            ".." => {
                let mut elements = Vec::new();
                if l <= r {
                    let mut i = l;
                    while i <= r {
                        elements.push(Object::Number(i));
                        i += 1.0;
                    }
                } else {
                    let mut i = l;
                    while i >= r {
                        elements.push(Object::Number(i));
                        i -= 1.0;
                    }
                }
                Object::array(elements)
            }
            _ => self.new_error(
                token,
                format!("unknown operator: NUMBER {} NUMBER", operator),
            ),
        }
    }

    fn eval_string_infix(
        &mut self,
        token: &Token,
        operator: &str,
        left: &Object,
        right: &Object,
    ) -> Object {
        let l = left.str_value().unwrap_or_default();
        let r = right.str_value().unwrap_or_default();

        match operator {
            "+" => Object::Str(format!("{}{}", l, r)),
            "==" => Object::Boolean(l == r),
            "!=" => Object::Boolean(l != r),
            // Case-insensitive equality.
            "~" => Object::Boolean(l.to_lowercase() == r.to_lowercase()),
            "in" => self.eval_in(token, left, right),
            "!in" => self.eval_not_in(token, left, right),
            // `content > file` truncates, `content >> file` appends.
            ">" => match std::fs::write(&r, &l) {
                Ok(()) => Object::Boolean(true),
                Err(err) => {
                    self.new_error(token, format!("failed writing to {}: {}", r, err))
                }
            },
            ">>" => {
                let result = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&r)
                    .and_then(|mut file| file.write_all(l.as_bytes()));
                match result {
                    Ok(()) => Object::Boolean(true),
                    Err(err) => {
                        self.new_error(token, format!("failed writing to {}: {}", r, err))
                    }
                }
            }
            _ => self.new_error(
                token,
                format!("unknown operator: STRING {} STRING", operator),
            ),
        }
    }

    fn eval_array_infix(
        &mut self,
        token: &Token,
        operator: &str,
        left: &Object,
        right: &Object,
    ) -> Object {
        if operator == "+" {
            if let (Object::Array(l), Object::Array(r)) = (left, right) {
                let mut elements = l.borrow().elements.clone();
                elements.extend(r.borrow().elements.clone());
                return Object::array(elements);
            }
        }

        self.new_error(
            token,
            format!("unknown operator: ARRAY {} ARRAY", operator),
        )
    }

    /// Hash `+` is a right-biased merge into a fresh hash.
    fn eval_hash_infix(
        &mut self,
        token: &Token,
        operator: &str,
        left: &Object,
        right: &Object,
    ) -> Object {
        if operator == "+" {
            if let (Object::Hash(l), Object::Hash(r)) = (left, right) {
                let mut pairs = l.borrow().pairs.clone();
                for (key, pair) in r.borrow().pairs.iter() {
                    pairs.insert(key.clone(), pair.clone());
                }
                return Object::Hash(Rc::new(std::cell::RefCell::new(HashObj::new(pairs))));
            }
        }

        self.new_error(token, format!("unknown operator: HASH {} HASH", operator))
    }

    fn eval_in(&mut self, token: &Token, left: &Object, right: &Object) -> Object {
        let found = match right {
            Object::Array(arr) => match left {
                Object::Str(_) | Object::Cmd(_) => {
                    let needle = left.str_value().unwrap_or_default();
                    arr.borrow()
                        .elements
                        .iter()
                        .any(|e| e.kind() == ObjectKind::Str && e.inspect() == needle)
                }
                Object::Number(n) => {
                    // Membership compares the integer cast of the needle
                    // against element inspect strings.
                    let needle = (*n as i64).to_string();
                    arr.borrow()
                        .elements
                        .iter()
                        .any(|e| e.kind() == ObjectKind::Number && e.inspect() == needle)
                }
                _ => false,
            },
            Object::Str(_) | Object::Cmd(_) => {
                if left.kind() == ObjectKind::Str {
                    right.inspect().contains(&left.inspect())
                } else {
                    false
                }
            }
            Object::Hash(hash) => {
                if left.kind() == ObjectKind::Str {
                    let key = left.str_value().unwrap_or_default();
                    hash.borrow().get_pair(&key).is_some()
                } else {
                    false
                }
            }
            other => {
                return self.new_error(
                    token,
                    format!("'in' operator not supported for {}", other.kind()),
                )
            }
        };

        Object::Boolean(found)
    }

    fn eval_not_in(&mut self, token: &Token, left: &Object, right: &Object) -> Object {
        match self.eval_in(token, left, right) {
            Object::Boolean(found) => Object::Boolean(!found),
            other => other,
        }
    }

    /// The first truthy scenario wins; none truthy yields null.
    fn eval_if(&mut self, scenarios: &[crate::ast::Scenario], env: &Env) -> Object {
        for scenario in scenarios {
            let condition = self.eval_expression(&scenario.condition, env);
            if condition.is_error() {
                return condition;
            }
            if is_truthy(&condition) {
                return self.eval_block(&scenario.consequence, env);
            }
        }
        Object::Null
    }

    fn eval_while(&mut self, condition: &Expr, consequence: &Block, env: &Env) -> Object {
        loop {
            let evaluated = self.eval_expression(condition, env);
            if evaluated.is_error() {
                return evaluated;
            }
            if !is_truthy(&evaluated) {
                return Object::Null;
            }

            let result = self.eval_block(consequence, env);
            match &result {
                Object::Error(err) => match err.kind {
                    ErrorKind::Break => return Object::Null,
                    ErrorKind::Continue => {}
                    ErrorKind::Generic => return result,
                },
                Object::ReturnValue(_) => return result,
                _ => {}
            }
        }
    }

    fn eval_for(
        &mut self,
        identifier: &str,
        starter: &Stmt,
        condition: &Expr,
        closer: &Stmt,
        block: &Block,
        env: &Env,
    ) -> Object {
        // The loop identifier is scoped to the loop: a prior binding in
        // the current frame is restored on exit, otherwise the binding
        // is removed. Enclosing frames are never touched.
        let saved = env.borrow().get_local(identifier);

        let result = self.run_for_loop(starter, condition, closer, block, env);

        let mut env_mut = env.borrow_mut();
        match saved {
            Some(value) => env_mut.set(identifier, value),
            None => env_mut.delete(identifier),
        }

        result
    }

    fn run_for_loop(
        &mut self,
        starter: &Stmt,
        condition: &Expr,
        closer: &Stmt,
        block: &Block,
        env: &Env,
    ) -> Object {
        let started = self.eval_statement(starter, env);
        if started.is_error() {
            return started;
        }

        loop {
            let evaluated = self.eval_expression(condition, env);
            if evaluated.is_error() {
                return evaluated;
            }
            if !is_truthy(&evaluated) {
                return Object::Null;
            }

            let result = self.eval_block(block, env);
            match &result {
                Object::Error(err) => match err.kind {
                    ErrorKind::Break => return Object::Null,
                    ErrorKind::Continue => {}
                    ErrorKind::Generic => return result,
                },
                Object::ReturnValue(_) => return result,
                _ => {}
            }

            let closed = self.eval_statement(closer, env);
            if closed.is_error() {
                return closed;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_for_in(
        &mut self,
        token: &Token,
        key: &Option<String>,
        value: &str,
        iterable: &Expr,
        block: &Block,
        alternative: &Option<Block>,
        env: &Env,
    ) -> Object {
        let evaluated = self.eval_expression(iterable, env);
        if evaluated.is_error() {
            return evaluated;
        }

        let mut source = match &evaluated {
            Object::Array(arr) => IterSource::Array(arr.clone()),
            Object::Hash(hash) => IterSource::Hash(hash.clone()),
            Object::Str(s) => IterSource::Chars(s.chars().collect(), 0),
            Object::Cmd(cmd) => IterSource::Chars(cmd.value().chars().collect(), 0),
            Object::Builtin(builtin) if builtin.iterable => IterSource::Stdin(0),
            Object::Builtin(_) => {
                return self.new_error(token, "builtin function is not iterable")
            }
            other => {
                return self.new_error(
                    token,
                    format!(
                        "'{}' is a {} which is not iterable",
                        other.inspect(),
                        other.kind()
                    ),
                )
            }
        };

        let saved_key = key
            .as_ref()
            .map(|name| env.borrow().get_local(name));
        let saved_value = env.borrow().get_local(value);

        let result = self.loop_iterable(&mut source, key, value, block, alternative, env);
        source.reset();

        let mut env_mut = env.borrow_mut();
        if let (Some(name), Some(saved)) = (key.as_ref(), saved_key) {
            match saved {
                Some(previous) => env_mut.set(name.as_str(), previous),
                None => env_mut.delete(name),
            }
        }
        match saved_value {
            Some(previous) => env_mut.set(value, previous),
            None => env_mut.delete(value),
        }

        result
    }

    fn loop_iterable(
        &mut self,
        source: &mut IterSource,
        key: &Option<String>,
        value: &str,
        block: &Block,
        alternative: &Option<Block>,
        env: &Env,
    ) -> Object {
        let mut iterations = 0u64;

        while let Some((k, v)) = source.next() {
            if let Some(name) = key {
                env.borrow_mut().set(name.as_str(), k);
            }
            env.borrow_mut().set(value, v);

            let result = self.eval_block(block, env);
            match &result {
                Object::Error(err) => match err.kind {
                    ErrorKind::Break => return Object::Null,
                    ErrorKind::Continue => {}
                    ErrorKind::Generic => return result,
                },
                Object::ReturnValue(_) => return result,
                _ => {}
            }

            iterations += 1;
        }

        // The else block runs only when the loop body never ran.
        if iterations == 0 {
            if let Some(alternative) = alternative {
                return self.eval_block(alternative, env);
            }
        }

        Object::Null
    }

    fn eval_hash_literal(
        &mut self,
        token: &Token,
        pairs: &[(Expr, Expr)],
        env: &Env,
    ) -> Object {
        let mut evaluated = BTreeMap::new();

        for (key_expr, value_expr) in pairs {
            let key = self.eval_expression(key_expr, env);
            if key.is_error() {
                return key;
            }

            let hash_key = match key.hash_key() {
                Some(hash_key) => hash_key,
                None => {
                    return self.new_error(
                        token,
                        "only strings, numbers and booleans can be used as hash keys",
                    )
                }
            };

            let value = self.eval_expression(value_expr, env);
            if value.is_error() {
                return value;
            }

            evaluated.insert(hash_key, HashPair { key, value });
        }

        Object::hash(evaluated)
    }

    fn eval_property(
        &mut self,
        token: &Token,
        object: &Expr,
        property: &str,
        optional: bool,
        env: &Env,
    ) -> Object {
        let object = self.eval_expression(object, env);
        if object.is_error() {
            return object;
        }

        match &object {
            // Plain strings expose the subprocess flags as false.
            Object::Str(_) => {
                if property == "ok" || property == "done" {
                    return Object::Boolean(false);
                }
            }
            Object::Cmd(cmd) => {
                if property == "ok" {
                    return Object::Boolean(cmd.ok_flag().unwrap_or(false));
                }
                if property == "done" {
                    return Object::Boolean(cmd.is_done());
                }
            }
            Object::Hash(hash) => {
                return self.eval_hash_index(token, hash, &Object::Str(property.to_string()));
            }
            _ => {}
        }

        if optional {
            return Object::Null;
        }

        self.new_error(
            token,
            format!("'{}' is an invalid property on type {}", property, object.kind()),
        )
    }

    pub(crate) fn apply_function(
        &mut self,
        token: &Token,
        function: Object,
        env: &Env,
        args: Vec<Object>,
    ) -> Object {
        match function {
            Object::Function(func) => {
                let extended = match self.extend_function_env(&func, &args) {
                    Ok(extended) => extended,
                    Err(err) => return err,
                };
                let evaluated = self.eval_block(&func.node.body, &extended);
                unwrap_return_value(evaluated)
            }
            Object::Builtin(builtin) => (builtin.func)(self, token, env, args),
            other => self.new_error(token, format!("not a function: {}", other.kind())),
        }
    }

    fn extend_function_env(
        &mut self,
        func: &FunctionObj,
        args: &[Object],
    ) -> Result<Env, Object> {
        let env = Environment::new_enclosed(&func.env, args.to_vec());

        for (idx, param) in func.node.parameters.iter().enumerate() {
            let arg = if idx < args.len() {
                args[idx].clone()
            } else if let Some(default) = &param.default {
                self.eval_expression(default, &env)
            } else {
                return Err(self.new_error(
                    &func.node.token,
                    format!(
                        "argument {} missing in call to {}",
                        param.name,
                        func.inspect()
                    ),
                ));
            };
            env.borrow_mut().set(param.name.as_str(), arg);
        }

        Ok(env)
    }

    /// `x.m(...)`: a hash member holding a function wins; otherwise the
    /// builtin registry is consulted, honoring declared receiver types.
    pub(crate) fn apply_method(
        &mut self,
        token: &Token,
        object: Object,
        method: &str,
        optional: bool,
        env: &Env,
        args: Vec<Object>,
    ) -> Object {
        if let Object::Hash(hash) = &object {
            if hash.borrow().get_key_kind(method) == ObjectKind::Function {
                let function = hash
                    .borrow()
                    .get_pair(method)
                    .map(|pair| pair.value.clone())
                    .expect("pair exists");
                return self.apply_function(token, function, env, args);
            }
        }

        let builtin = match builtins::registry().get(method) {
            Some(builtin) => builtin,
            None => {
                if optional {
                    return Object::Null;
                }
                return self.new_error(
                    token,
                    format!("{}() method does not exist for {}", method, object.kind()),
                );
            }
        };

        if !builtin.types.is_empty() && !builtin.types.contains(&object.kind()) {
            return self.new_error(
                token,
                format!("'{}()' method cannot be called on '{}'", method, object.kind()),
            );
        }

        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(object);
        full_args.extend(args);
        (builtin.func)(self, token, env, full_args)
    }

    fn eval_index(
        &mut self,
        token: &Token,
        left: &Expr,
        index: &Expr,
        end: Option<&Expr>,
        is_range: bool,
        env: &Env,
    ) -> Object {
        let left = self.eval_expression(left, env);
        if left.is_error() {
            return left;
        }
        let index = self.eval_expression(index, env);
        if index.is_error() {
            return index;
        }
        let end = match end {
            Some(end) => {
                let end = self.eval_expression(end, env);
                if end.is_error() {
                    return end;
                }
                end
            }
            None => Object::Null,
        };

        match (&left, &index) {
            (Object::Array(arr), Object::Number(idx)) => {
                let elements = arr.borrow().elements.clone();
                self.eval_array_index(token, elements, *idx as i64, &end, is_range)
            }
            (Object::Hash(hash), Object::Str(_) | Object::Cmd(_)) => {
                self.eval_hash_index(token, hash, &index)
            }
            (Object::Str(_) | Object::Cmd(_), Object::Number(idx)) => {
                let chars: Vec<char> = left.str_value().unwrap_or_default().chars().collect();
                self.eval_string_index(token, chars, *idx as i64, &end, is_range)
            }
            _ => self.new_error(token, "index operator not supported for this type"),
        }
    }

    fn eval_array_index(
        &mut self,
        token: &Token,
        elements: Vec<Object>,
        idx: i64,
        end: &Object,
        is_range: bool,
    ) -> Object {
        let len = elements.len() as i64;

        if is_range {
            let idx = idx.max(0);
            let max = match self.slice_end(token, end, len) {
                Ok(max) => max,
                Err(err) => return err,
            };
            if idx > max {
                return Object::array(Vec::new());
            }
            return Object::array(elements[idx as usize..max as usize].to_vec());
        }

        if idx > len - 1 {
            return Object::Null;
        }
        let idx = if idx < 0 {
            if idx.abs() > len {
                return Object::Null;
            }
            len + idx
        } else {
            idx
        };

        elements[idx as usize].clone()
    }

    fn eval_string_index(
        &mut self,
        token: &Token,
        chars: Vec<char>,
        idx: i64,
        end: &Object,
        is_range: bool,
    ) -> Object {
        let len = chars.len() as i64;

        if is_range {
            let idx = idx.max(0);
            let max = match self.slice_end(token, end, len) {
                Ok(max) => max,
                Err(err) => return err,
            };
            if idx > max {
                return Object::Str(String::new());
            }
            return Object::Str(chars[idx as usize..max as usize].iter().collect());
        }

        if idx > len - 1 {
            return Object::Str(String::new());
        }
        let idx = if idx < 0 {
            if idx.abs() > len {
                return Object::Str(String::new());
            }
            len + idx
        } else {
            idx
        };

        Object::Str(chars[idx as usize].to_string())
    }

    /// Clamp a slice's end: absent means the full length, negative counts
    /// back from the end, anything else must be a number.
    fn slice_end(&mut self, token: &Token, end: &Object, len: i64) -> Result<i64, Object> {
        match end {
            Object::Number(e) => {
                let e = *e as i64;
                if e < 0 {
                    Ok((len + e).max(0))
                } else if e < len {
                    Ok(e)
                } else {
                    Ok(len)
                }
            }
            Object::Null => Ok(len),
            other => Err(self.new_error(
                token,
                format!(
                    "indexes must be numbers, got \"{}\" (type {})",
                    other.inspect(),
                    other.kind()
                ),
            )),
        }
    }

    fn eval_hash_index(
        &mut self,
        token: &Token,
        hash: &Rc<std::cell::RefCell<HashObj>>,
        index: &Object,
    ) -> Object {
        let key = match index.hash_key() {
            Some(key) => key,
            None => {
                return self.new_error(
                    token,
                    format!("cannot use {} as a hash key", index.kind()),
                )
            }
        };

        hash.borrow()
            .pairs
            .get(&key)
            .map(|pair| pair.value.clone())
            .unwrap_or(Object::Null)
    }

    fn eval_decorator(
        &mut self,
        token: &Token,
        expression: &Expr,
        decorated: &Expr,
        env: &Env,
    ) -> Object {
        match self.do_eval_decorator(token, expression, decorated, env) {
            Ok((name, function)) => {
                env.borrow_mut().set(name, function);
                Object::Null
            }
            Err(err) => err,
        }
    }

    /// Applies the decorator to the decorated function (or to the result
    /// of the inner decorator); the innermost function's name becomes the
    /// binding in the enclosing scope.
    fn do_eval_decorator(
        &mut self,
        token: &Token,
        expression: &Expr,
        decorated: &Expr,
        env: &Env,
    ) -> Result<(String, Object), Object> {
        let decorator = self.eval_expression(expression, env);
        match &decorator {
            Object::Function(_) => {}
            Object::Error(_) => return Err(decorator),
            other => {
                return Err(self.new_error(
                    token,
                    format!("'{}' is not a decorator", other.inspect()),
                ))
            }
        }

        let name = match decorated_name(decorated) {
            Some(name) => name,
            None => {
                return Err(
                    self.new_error(token, "could not find the function being decorated")
                )
            }
        };

        match decorated {
            Expr::Function(literal) => {
                let function = Object::Function(Rc::new(FunctionObj {
                    node: literal.clone(),
                    name: literal.name.clone(),
                    env: env.clone(),
                }));
                Ok((
                    name,
                    self.apply_function(&literal.token, decorator, env, vec![function]),
                ))
            }
            Expr::Decorator {
                token: inner_token,
                expression: inner_expression,
                decorated: inner_decorated,
            } => {
                let (_, inner) = self.do_eval_decorator(
                    inner_token,
                    inner_expression,
                    inner_decorated,
                    env,
                )?;
                Ok((name, self.apply_function(token, decorator, env, vec![inner])))
            }
            _ => Err(self.new_error(
                token,
                "a decorator must decorate a named function or another decorator",
            )),
        }
    }

    /// Runs a command through the configured executor. `$name` and
    /// `${name}` interpolate from the environment first; a trailing `&`
    /// launches the command in the background.
    fn eval_command_expression(&mut self, _token: &Token, value: &str, env: &Env) -> Object {
        let mut cmd = util::interpolate_string_vars(value.trim(), env);

        let background = cmd.len() > 1 && cmd.ends_with('&');
        if background {
            cmd.pop();
            cmd.pop();
        }

        let parts = util::command_executor();
        debug!(command = %cmd, background, "spawning command");

        if background {
            let mut command = Command::new(&parts[0]);
            command
                .args(&parts[1..])
                .arg(&cmd)
                .stdin(Stdio::inherit())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(_) => return Object::Boolean(false),
            };

            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let result = Arc::new(CmdResult::pending(Some(child)));

            let waiter = result.clone();
            thread::spawn(move || {
                let stderr_reader = thread::spawn(move || {
                    let mut buf = String::new();
                    if let Some(mut pipe) = stderr {
                        let _ = pipe.read_to_string(&mut buf);
                    }
                    buf
                });

                let mut stdout_buf = String::new();
                if let Some(mut pipe) = stdout {
                    let _ = pipe.read_to_string(&mut stdout_buf);
                }
                let stderr_buf = stderr_reader.join().unwrap_or_default();

                let ok = match waiter.take_child() {
                    Some(mut child) => {
                        child.wait().map(|status| status.success()).unwrap_or(false)
                    }
                    None => false,
                };
                waiter.set_result(ok, &stdout_buf, &stderr_buf);
            });

            return Object::Cmd(result);
        }

        let output = Command::new(&parts[0])
            .args(&parts[1..])
            .arg(&cmd)
            .stdin(Stdio::inherit())
            .output();

        match output {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                Object::Cmd(CmdResult::completed(
                    output.status.success(),
                    &stdout,
                    &stderr,
                ))
            }
            Err(err) => Object::Cmd(CmdResult::completed(false, "", &err.to_string())),
        }
    }

    /// Parses and evaluates a nested source string, temporarily swapping
    /// the lexer so error locations point into the nested source.
    pub(crate) fn eval_source_code(
        &mut self,
        code: &str,
        env: &Env,
    ) -> Result<Object, Vec<String>> {
        let mut parser = Parser::new(Lexer::new(code));
        let program = parser.parse_program();
        if !parser.errors().is_empty() {
            return Err(parser.errors().to_vec());
        }

        let saved = std::mem::replace(&mut self.lexer, parser.into_lexer());
        let evaluated = self.eval_program(&program, env);
        self.lexer = saved;

        Ok(evaluated)
    }
}

/// Iteration sources for `döngü ... in`, each yielding (key, value)
/// pairs until exhausted.
enum IterSource {
    Array(Rc<std::cell::RefCell<crate::object::ArrayObj>>),
    Hash(Rc<std::cell::RefCell<HashObj>>),
    Chars(Vec<char>, usize),
    Stdin(usize),
}

impl IterSource {
    fn next(&mut self) -> Option<(Object, Object)> {
        match self {
            IterSource::Array(arr) => arr.borrow_mut().next(),
            IterSource::Hash(hash) => hash.borrow_mut().next(),
            IterSource::Chars(chars, position) => {
                if *position < chars.len() {
                    let i = *position;
                    *position += 1;
                    Some((
                        Object::Number(i as f64),
                        Object::Str(chars[i].to_string()),
                    ))
                } else {
                    None
                }
            }
            IterSource::Stdin(line_number) => {
                let mut line = String::new();
                match std::io::stdin().read_line(&mut line) {
                    Ok(0) | Err(_) => None,
                    Ok(_) => {
                        let n = *line_number;
                        *line_number += 1;
                        while line.ends_with(['\n', '\r']) {
                            line.pop();
                        }
                        Some((Object::Number(n as f64), Object::Str(line)))
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        match self {
            IterSource::Array(arr) => arr.borrow_mut().reset(),
            IterSource::Hash(hash) => hash.borrow_mut().reset(),
            IterSource::Chars(_, position) => *position = 0,
            IterSource::Stdin(_) => {}
        }
    }
}

/// Null and false are falsy; numbers and strings are falsy when zero or
/// empty; everything else is truthy.
pub(crate) fn is_truthy(obj: &Object) -> bool {
    match obj {
        Object::Null => false,
        Object::Boolean(b) => *b,
        Object::Number(n) => *n != 0.0,
        Object::Str(_) | Object::Cmd(_) => !obj.str_value().unwrap_or_default().is_empty(),
        _ => true,
    }
}

fn unwrap_return_value(obj: Object) -> Object {
    match obj {
        Object::ReturnValue(value) => *value,
        other => other,
    }
}

/// Mixed-type and reference equality: value equality for booleans and
/// null, pointer identity for functions; everything else is unequal.
fn identity_equal(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Null, Object::Null) => true,
        (Object::Boolean(x), Object::Boolean(y)) => x == y,
        (Object::Function(x), Object::Function(y)) => Rc::ptr_eq(x, y),
        (Object::Array(x), Object::Array(y)) => Rc::ptr_eq(x, y),
        (Object::Hash(x), Object::Hash(y)) => Rc::ptr_eq(x, y),
        (Object::Builtin(x), Object::Builtin(y)) => std::ptr::eq(*x, *y),
        _ => false,
    }
}

fn decorated_name(decorated: &Expr) -> Option<String> {
    match decorated {
        Expr::Function(function) => function.name.clone(),
        Expr::Decorator { decorated, .. } => decorated_name(decorated),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Writer;
    use std::cell::RefCell;
    use std::path::PathBuf;

    fn run(input: &str) -> (Object, String) {
        let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
        let writer: Writer = buffer.clone();
        let env = Environment::new(writer, PathBuf::from("."), "test");

        let mut parser = Parser::new(Lexer::new(input));
        let program = parser.parse_program();
        assert!(
            parser.errors().is_empty(),
            "parser errors for {:?}: {:?}",
            input,
            parser.errors()
        );

        let mut interpreter = Interpreter::new(parser.into_lexer());
        let result = interpreter.eval_program(&program, &env);
        let output = String::from_utf8(buffer.borrow().clone()).unwrap();
        (result, output)
    }

    fn eval_to(input: &str, expected: &str) {
        let (result, _) = run(input);
        assert_eq!(result.inspect(), expected, "input: {}", input);
    }

    #[test]
    fn test_number_arithmetic() {
        eval_to("1 + 2 * 3", "7");
        eval_to("10 / 4", "2.5");
        eval_to("2 ** 10", "1024");
        eval_to("7 % 3", "1");
        eval_to("-(-5)", "5");
        eval_to("+5", "5");
        eval_to("1 <=> 2", "-1");
        eval_to("2 <=> 2", "0");
        eval_to("3 <=> 2", "1");
    }

    #[test]
    fn test_bitwise_operators() {
        eval_to("6 & 3", "2");
        eval_to("6 | 3", "7");
        eval_to("6 ^ 3", "5");
        eval_to("1 << 3", "8");
        eval_to("16 >> 2", "4");
        eval_to("~0", "-1");
    }

    #[test]
    fn test_tilde_equality() {
        eval_to("1.2 ~ 1.9", "true");
        eval_to("1 ~ 2", "false");
        eval_to("\"ABC\" ~ \"abc\"", "true");
    }

    #[test]
    fn test_range_operator() {
        eval_to("1..4", "[1, 2, 3, 4]");
        eval_to("4..1", "[4, 3, 2, 1]");
        eval_to("2..2", "[2]");
    }

    #[test]
    fn test_truthiness_and_bang() {
        eval_to("!0", "true");
        eval_to("!1", "false");
        eval_to("!\"\"", "true");
        eval_to("!null", "true");
        eval_to("!!\"x\"", "true");
    }

    #[test]
    fn test_short_circuit_returns_operand() {
        eval_to("0 && tanımsız_isim", "0");
        eval_to("1 || tanımsız_isim", "1");
        eval_to("1 && 2", "2");
        eval_to("0 || 3", "3");
    }

    #[test]
    fn test_string_operators() {
        eval_to("\"a\" + \"b\"", "ab");
        eval_to("\"a\" == \"a\"", "true");
        eval_to("\"a\" != \"b\"", "true");
        eval_to("\"se\" in \"selam\"", "true");
        eval_to("\"xy\" !in \"selam\"", "true");
    }

    #[test]
    fn test_string_interpolation() {
        eval_to("ad = \"dünya\"; \"selam $ad\"", "selam dünya");
        eval_to("\"selam $yok!\"", "selam !");
    }

    #[test]
    fn test_in_operator() {
        eval_to("1 in [1, 2]", "true");
        eval_to("3 in [1, 2]", "false");
        eval_to("\"a\" in [\"a\"]", "true");
        eval_to("\"x\" in {\"x\": 1}", "true");
        eval_to("\"y\" !in {\"x\": 1}", "true");
    }

    #[test]
    fn test_mixed_equality_is_identity() {
        eval_to("1 == \"1\"", "false");
        eval_to("null == null", "true");
        eval_to("doğru == doğru", "true");
        eval_to("doğru != yanlış", "true");
    }

    #[test]
    fn test_if_expression() {
        eval_to("eğer 1 { 10 }", "10");
        eval_to("eğer 0 { 10 }", "null");
        eval_to("eğer 0 { 10 } yoksa { 20 }", "20");
        eval_to("eğer 0 { 1 } yoksa eğer 1 { 2 } yoksa { 3 }", "2");
    }

    #[test]
    fn test_while_loop_is_iterative() {
        eval_to("i = 0; iken i < 10000 { i = i + 1 }; i", "10000");
    }

    #[test]
    fn test_while_break_continue() {
        eval_to("i = 0; iken doğru { i = i + 1; eğer i == 3 { dur } }; i", "3");
        eval_to(
            "i = 0; t = 0; iken i < 5 { i = i + 1; eğer i == 2 { devam }; t = t + i }; t",
            "13",
        );
    }

    #[test]
    fn test_for_loop() {
        let (_, output) = run("döngü i = 0; i < 3; i = i + 1 { echo(i) }");
        assert_eq!(output, "0\n1\n2\n");
    }

    #[test]
    fn test_for_loop_scoping() {
        eval_to("i = 99; döngü i = 0; i < 3; i = i + 1 { 1 }; i", "99");
        // The loop identifier is removed once the loop exits.
        let (result, _) = run("döngü j = 0; j < 3; j = j + 1 { 1 }; j");
        assert!(result.is_error());
    }

    #[test]
    fn test_for_in_array() {
        let (_, output) = run("döngü k, v in [\"a\", \"b\"] { echo(str(k) + v) }");
        assert_eq!(output, "0a\n1b\n");
    }

    #[test]
    fn test_for_in_hash_is_sorted() {
        let (_, output) = run("döngü k, v in {\"b\": 2, \"a\": 1} { echo(k + \"=\" + str(v)) }");
        assert_eq!(output, "a=1\nb=2\n");
    }

    #[test]
    fn test_for_in_string() {
        let (_, output) = run("döngü c in \"ab\" { echo(c) }");
        assert_eq!(output, "a\nb\n");
    }

    #[test]
    fn test_for_in_else_only_on_empty() {
        let (_, output) = run("döngü v in [] { echo(v) } yoksa { echo(\"boş\") }");
        assert_eq!(output, "boş\n");
        let (_, output) = run("döngü v in [1] { echo(v) } yoksa { echo(\"boş\") }");
        assert_eq!(output, "1\n");
    }

    #[test]
    fn test_break_outside_loop_is_error() {
        let (result, _) = run("dur");
        match result {
            Object::Error(err) => assert_eq!(err.kind, ErrorKind::Break),
            other => panic!("expected break error, got {:?}", other),
        }
    }

    #[test]
    fn test_functions_and_closures() {
        eval_to("f topla(x, y) { dön x + y }; topla(2, 3)", "5");
        eval_to(
            "f sayaç() { n = 0; dön f() { n = n + 1; dön n } }; s = sayaç(); s(); s()",
            "2",
        );
        eval_to("çarp = f(x) { dön x * 2 }; çarp(21)", "42");
    }

    #[test]
    fn test_function_default_parameters() {
        eval_to("f topla(x, y = 10) { dön x + y }; topla(5)", "15");
        eval_to("f topla(x, y = 10) { dön x + y }; topla(5, 20)", "25");
    }

    #[test]
    fn test_missing_argument_is_error() {
        let (result, _) = run("f topla(x, y) { dön x + y }; topla(1)");
        assert!(result.is_error());
    }

    #[test]
    fn test_return_propagates_through_blocks() {
        eval_to("f g() { eğer doğru { eğer doğru { dön 1 } }; dön 2 }; g()", "1");
        eval_to("f g() { dön }; g()", "null");
    }

    #[test]
    fn test_current_args_forwarding() {
        eval_to(
            "f topla3(a, b, c) { dön a + b + c } f ilet() { dön topla3(...) }; ilet(1, 2, 3)",
            "6",
        );
    }

    #[test]
    fn test_current_args_concatenates_like_an_array() {
        eval_to("f say() { dön len([0] + ...) }; say(7, 8)", "3");
    }

    #[test]
    fn test_current_args_spread_concatenates() {
        eval_to(
            "f kuyruk(a, b, c) { dön c } f ekle() { dön kuyruk(..., 9) }; ekle(1, 2)",
            "9",
        );
    }

    #[test]
    fn test_decorator() {
        let (_, output) = run(
            "f iki_kere(fn) { dön f() { dön fn() + fn() } } @iki_kere f g() { dön 1 } echo(g())",
        );
        assert_eq!(output, "2\n");
    }

    #[test]
    fn test_chained_decorators() {
        let (_, output) = run(
            "f arti_bir(fn) { dön f() { dön fn() + 1 } } f iki_kat(fn) { dön f() { dön fn() * 2 } } @arti_bir @iki_kat f g() { dön 10 } echo(g())",
        );
        assert_eq!(output, "21\n");
    }

    #[test]
    fn test_assignments() {
        eval_to("a = [1, 2, 3]; a[0] = 9; a[0]", "9");
        eval_to("a = [1]; a[3] = 9; a", "[1, null, null, 9]");
        eval_to("h = {\"x\": 1}; h.x = 2; h.x", "2");
        eval_to("h = {}; h[\"k\"] = 1; h[\"k\"]", "1");
    }

    #[test]
    fn test_negative_index_assignment_is_error() {
        let (result, _) = run("a = [1]; a[-1] = 2");
        assert!(result.is_error());
    }

    #[test]
    fn test_destructuring() {
        eval_to("a, b = [1, 2]; a + b", "3");
        eval_to("a, b, c = [1, 2]; c", "null");
        eval_to("x, y = {\"x\": 1, \"y\": 2}; x + y", "3");
        eval_to("x, z = {\"x\": 1}; z", "null");
    }

    #[test]
    fn test_compound_assignment() {
        eval_to("a = 1; a += 4; a", "5");
        eval_to("a = 10; a /= 4; a", "2.5");
        eval_to("a = 2; a **= 3; a", "8");
        eval_to("h = {\"n\": 1}; h.n += 1; h.n", "2");
        eval_to("a = [1]; a[0] += 5; a[0]", "6");
    }

    #[test]
    fn test_indexing_and_slicing() {
        eval_to("[1, 2, 3][1]", "2");
        eval_to("[1, 2, 3][-1]", "3");
        eval_to("[1, 2, 3][9]", "null");
        eval_to("[1, 2, 3][1:2]", "[2]");
        eval_to("[1, 2, 3][:2]", "[1, 2]");
        eval_to("[1, 2, 3][1:]", "[2, 3]");
        eval_to("[1, 2, 3][0:-1]", "[1, 2]");
        eval_to("\"selam\"[0]", "s");
        eval_to("\"selam\"[-1]", "m");
        eval_to("\"selam\"[1:3]", "el");
        eval_to("{\"a\": 1}[\"a\"]", "1");
        eval_to("{\"a\": 1}[\"yok\"]", "null");
    }

    #[test]
    fn test_hash_plus_merges_right_biased() {
        eval_to("({\"a\": 1} + {\"a\": 2, \"b\": 3})[\"a\"]", "2");
        eval_to("h = {\"a\": 1}; g = h + {\"b\": 2}; h[\"b\"]", "null");
    }

    #[test]
    fn test_array_equality_is_unknown_operator() {
        let (result, _) = run("[1] == [1]");
        assert!(result.is_error());
    }

    #[test]
    fn test_deferred_statements_run_last_in_order() {
        let (_, output) = run("bekle echo(\"b\"); echo(\"a\")");
        assert_eq!(output, "a\nb\n");
        let (_, output) = run("bekle echo(1); bekle echo(2); echo(3)");
        assert_eq!(output, "3\n1\n2\n");
    }

    #[test]
    fn test_deferred_runs_after_return() {
        let (_, output) = run("f g() { bekle echo(\"son\"); echo(\"ilk\"); dön 1 } g()");
        assert_eq!(output, "ilk\nson\n");
    }

    #[test]
    fn test_deferred_runs_after_error() {
        let (_, output) = run("bekle echo(\"temizlik\"); tanımsız_isim");
        assert_eq!(output, "temizlik\n");
    }

    #[test]
    fn test_error_short_circuits() {
        let (result, output) = run("tanımsız; echo(\"asla\")");
        assert!(result.is_error());
        assert_eq!(output, "");
    }

    #[test]
    fn test_optional_chaining() {
        eval_to("\"s\"?.olmayan_özellik", "null");
        eval_to("[1]?.olmayan_metod()", "null");
    }

    #[test]
    fn test_method_on_hash_function_member() {
        eval_to("h = {\"f\": f(x) { dön x * 2 }}; h.f(21)", "42");
    }

    #[test]
    fn test_property_access() {
        eval_to("{\"x\": 5}.x", "5");
        eval_to("\"s\".ok", "false");
        eval_to("\"s\".done", "false");
    }

    #[test]
    fn test_eval_builtin() {
        eval_to("eval(\"1 + 2\")", "3");
    }
}
