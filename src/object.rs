use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::process::Child;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};

use crate::ast::FunctionLiteral;
use crate::builtins::Builtin;
use crate::environment::Env;

/// Type tags for the runtime value universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Null,
    Error,
    Number,
    Boolean,
    Str,
    ReturnValue,
    Any,
    Function,
    Builtin,
    Array,
    Hash,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Null => "NULL",
            ObjectKind::Error => "ERROR",
            ObjectKind::Number => "NUMBER",
            ObjectKind::Boolean => "BOOLEAN",
            ObjectKind::Str => "STRING",
            ObjectKind::ReturnValue => "RETURN_VALUE",
            ObjectKind::Any => "ANY",
            ObjectKind::Function => "FUNCTION",
            ObjectKind::Builtin => "BUILTIN",
            ObjectKind::Array => "ARRAY",
            ObjectKind::Hash => "HASH",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error values double as control-flow sentinels: `dur` and `devam`
/// raise the Break and Continue kinds, intercepted by the nearest loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Generic,
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct ErrorObj {
    pub kind: ErrorKind,
    pub message: String,
}

/// Hash keys carry the inspect string of the key value; only numbers,
/// booleans and strings are hashable. Ordering by the inspect string
/// first keeps hash iteration deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HashKey {
    pub value: String,
    pub kind: ObjectKind,
}

#[derive(Debug, Clone)]
pub struct HashPair {
    pub key: Object,
    pub value: Object,
}

#[derive(Debug, Clone, Default)]
pub struct HashObj {
    pub pairs: BTreeMap<HashKey, HashPair>,
    position: usize,
}

impl HashObj {
    pub fn new(pairs: BTreeMap<HashKey, HashPair>) -> Self {
        Self { pairs, position: 0 }
    }

    pub fn get_pair(&self, key: &str) -> Option<&HashPair> {
        self.pairs.get(&HashKey {
            value: key.to_string(),
            kind: ObjectKind::Str,
        })
    }

    pub fn get_key_kind(&self, key: &str) -> ObjectKind {
        self.get_pair(key)
            .map(|pair| pair.value.kind())
            .unwrap_or(ObjectKind::Null)
    }

    /// Iteration in ascending key inspect-string order.
    pub fn next(&mut self) -> Option<(Object, Object)> {
        let pair = self.pairs.values().nth(self.position)?;
        self.position += 1;
        Some((pair.key.clone(), pair.value.clone()))
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArrayObj {
    pub elements: Vec<Object>,
    pub is_current_args: bool,
    position: usize,
}

impl ArrayObj {
    pub fn new(elements: Vec<Object>) -> Self {
        Self {
            elements,
            is_current_args: false,
            position: 0,
        }
    }

    pub fn next(&mut self) -> Option<(Object, Object)> {
        let position = self.position;
        if position < self.elements.len() {
            self.position += 1;
            return Some((Object::Number(position as f64), self.elements[position].clone()));
        }
        None
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn homogeneous(&self) -> bool {
        match self.elements.first() {
            None => true,
            Some(first) => {
                let kind = first.kind();
                self.elements.iter().all(|e| e.kind() == kind)
            }
        }
    }
}

/// A user function together with its captured environment.
#[derive(Debug, Clone)]
pub struct FunctionObj {
    pub node: Rc<FunctionLiteral>,
    pub name: Option<String>,
    pub env: Env,
}

impl FunctionObj {
    pub fn inspect(&self) -> String {
        let params: Vec<String> = self.node.parameters.iter().map(|p| p.to_string()).collect();
        let name = match &self.name {
            Some(name) => format!(" {}", name),
            None => String::new(),
        };
        format!("f{}({}) {{{}}}", name, params.join(", "), self.node.body)
    }
}

#[derive(Debug)]
struct CmdState {
    value: String,
    ok: Option<bool>,
    done: bool,
}

/// The result of a command expression. Shares the string surface with
/// plain strings but additionally carries the ok/done flags and, for
/// background commands, the subprocess handle.
///
/// The state mutex plus condvar implement the completion gate: the state
/// starts not-done at launch and the background waiter flips it exactly
/// once, after writing the output buffers. `wait` blocks on the gate.
#[derive(Debug)]
pub struct CmdResult {
    state: Mutex<CmdState>,
    finished: Condvar,
    child: Mutex<Option<Child>>,
}

impl CmdResult {
    /// A command that already ran to completion.
    pub fn completed(ok: bool, stdout: &str, stderr: &str) -> Arc<Self> {
        let cmd = Arc::new(Self::pending(None));
        cmd.set_result(ok, stdout, stderr);
        cmd
    }

    /// A command still running in the background.
    pub fn pending(child: Option<Child>) -> Self {
        Self {
            state: Mutex::new(CmdState {
                value: String::new(),
                ok: None,
                done: false,
            }),
            finished: Condvar::new(),
            child: Mutex::new(child),
        }
    }

    pub fn value(&self) -> String {
        self.state.lock().unwrap().value.clone()
    }

    pub fn ok_flag(&self) -> Option<bool> {
        self.state.lock().unwrap().ok
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().unwrap().done
    }

    /// Finalize the result. Output buffers must be written before the
    /// done flag flips; readers only look after `wait` returns.
    pub fn set_result(&self, ok: bool, stdout: &str, stderr: &str) {
        let mut state = self.state.lock().unwrap();
        let output = if ok { stdout } else { stderr };
        state.value = output.trim().to_string();
        state.ok = Some(ok);
        state.done = true;
        self.finished.notify_all();
    }

    /// Block until the background waiter signals completion.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !state.done {
            state = self.finished.wait(state).unwrap();
        }
    }

    /// Signal the child to terminate, then wait for the waiter to
    /// finalize the buffers.
    pub fn kill(&self) -> std::io::Result<()> {
        {
            let mut child = self.child.lock().unwrap();
            match child.as_mut() {
                Some(c) => c.kill()?,
                None => return Ok(()),
            }
        }
        self.wait();
        Ok(())
    }

    pub fn take_child(&self) -> Option<Child> {
        self.child.lock().unwrap().take()
    }

    pub fn has_child(&self) -> bool {
        self.child.lock().unwrap().is_some()
    }
}

/// The runtime value universe.
#[derive(Debug, Clone)]
pub enum Object {
    Null,
    Boolean(bool),
    Number(f64),
    Str(String),
    Cmd(Arc<CmdResult>),
    Array(Rc<RefCell<ArrayObj>>),
    Hash(Rc<RefCell<HashObj>>),
    Function(Rc<FunctionObj>),
    Builtin(&'static Builtin),
    ReturnValue(Box<Object>),
    Error(ErrorObj),
}

impl Object {
    pub fn array(elements: Vec<Object>) -> Object {
        Object::Array(Rc::new(RefCell::new(ArrayObj::new(elements))))
    }

    /// The `...` literal: an array flagged as the current-args vector so
    /// calls can recognize and expand it.
    pub fn current_args(elements: Vec<Object>) -> Object {
        Object::Array(Rc::new(RefCell::new(ArrayObj {
            elements,
            is_current_args: true,
            position: 0,
        })))
    }

    pub fn hash(pairs: BTreeMap<HashKey, HashPair>) -> Object {
        Object::Hash(Rc::new(RefCell::new(HashObj::new(pairs))))
    }

    pub fn error(message: impl Into<String>) -> Object {
        Object::Error(ErrorObj {
            kind: ErrorKind::Generic,
            message: message.into(),
        })
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Null => ObjectKind::Null,
            Object::Boolean(_) => ObjectKind::Boolean,
            Object::Number(_) => ObjectKind::Number,
            Object::Str(_) | Object::Cmd(_) => ObjectKind::Str,
            Object::Array(_) => ObjectKind::Array,
            Object::Hash(_) => ObjectKind::Hash,
            Object::Function(_) => ObjectKind::Function,
            Object::Builtin(_) => ObjectKind::Builtin,
            Object::ReturnValue(_) => ObjectKind::ReturnValue,
            Object::Error(_) => ObjectKind::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Object::Error(_))
    }

    /// The text surface shared by plain strings and command results.
    pub fn str_value(&self) -> Option<String> {
        match self {
            Object::Str(s) => Some(s.clone()),
            Object::Cmd(c) => Some(c.value()),
            _ => None,
        }
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Number(_) | Object::Boolean(_) | Object::Str(_) | Object::Cmd(_) => {
                Some(HashKey {
                    value: self.inspect(),
                    kind: self.kind(),
                })
            }
            _ => None,
        }
    }

    /// Canonical text rendering, used for display and equality hashing.
    pub fn inspect(&self) -> String {
        match self {
            Object::Null => "null".to_string(),
            Object::Boolean(b) => b.to_string(),
            Object::Number(n) => format_number(*n),
            Object::Str(s) => s.clone(),
            Object::Cmd(c) => c.value(),
            Object::Array(arr) => {
                let elements: Vec<String> =
                    arr.borrow().elements.iter().map(|e| e.json()).collect();
                format!("[{}]", elements.join(", "))
            }
            Object::Hash(hash) => {
                let pairs: Vec<String> = hash
                    .borrow()
                    .pairs
                    .values()
                    .map(|pair| format!("{}: {}", pair.key.json(), pair.value.json()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Object::Function(function) => function.inspect(),
            Object::Builtin(_) => "builtin function".to_string(),
            Object::ReturnValue(value) => value.inspect(),
            Object::Error(err) => format!("ERROR: {}", err.message),
        }
    }

    /// JSON-flavored rendering: like inspect, but strings are quoted.
    pub fn json(&self) -> String {
        match self {
            Object::Str(_) | Object::Cmd(_) => {
                format!("\"{}\"", self.inspect().replace('"', "\\\""))
            }
            _ => self.inspect(),
        }
    }
}

/// The canonical `type:inspect` string the container builtins use to
/// compare values across types.
pub fn equality_string(obj: &Object) -> String {
    format!("{}:{}", obj.kind().as_str(), obj.inspect())
}

pub fn objects_equal(a: &Object, b: &Object) -> bool {
    equality_string(a) == equality_string(b)
}

/// Integral numbers render without a decimal part.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value == (value as i64) as f64 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_inspect() {
        assert_eq!(Object::Number(6.0).inspect(), "6");
        assert_eq!(Object::Number(1.5).inspect(), "1.5");
        assert_eq!(Object::Number(-3.0).inspect(), "-3");
    }

    #[test]
    fn test_array_inspect_quotes_strings() {
        let arr = Object::array(vec![Object::Number(1.0), Object::Str("a".into())]);
        assert_eq!(arr.inspect(), "[1, \"a\"]");
    }

    #[test]
    fn test_hash_inspect_is_sorted() {
        let mut pairs = BTreeMap::new();
        for key in ["b", "a", "c"] {
            let k = Object::Str(key.to_string());
            pairs.insert(
                k.hash_key().unwrap(),
                HashPair {
                    key: k.clone(),
                    value: Object::Number(1.0),
                },
            );
        }
        let hash = Object::hash(pairs);
        assert_eq!(hash.inspect(), "{\"a\": 1, \"b\": 1, \"c\": 1}");
    }

    #[test]
    fn test_equality_string_separates_types() {
        assert_ne!(
            equality_string(&Object::Number(1.0)),
            equality_string(&Object::Str("1".into()))
        );
        assert!(objects_equal(&Object::Number(2.0), &Object::Number(2.0)));
    }

    #[test]
    fn test_cmd_result_gate() {
        let cmd = CmdResult::completed(true, "  out  ", "");
        assert_eq!(cmd.value(), "out");
        assert_eq!(cmd.ok_flag(), Some(true));
        assert!(cmd.is_done());
        cmd.wait();
    }
}
