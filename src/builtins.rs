use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::environment::{Env, Environment};
use crate::interpreter::{is_truthy, Interpreter};
use crate::object::{
    equality_string, objects_equal, CmdResult, HashPair, Object, ObjectKind,
};
use crate::token::Token;
use crate::util;

pub type BuiltinFn = fn(&mut Interpreter, &Token, &Env, Vec<Object>) -> Object;

/// A native function in the registry: the callable, the receiver types
/// accepted for method-call dispatch (empty means any), and whether the
/// builtin can drive a for-in loop.
pub struct Builtin {
    pub name: &'static str,
    pub types: &'static [ObjectKind],
    pub iterable: bool,
    pub func: BuiltinFn,
}

impl std::fmt::Debug for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

const fn builtin(name: &'static str, types: &'static [ObjectKind], func: BuiltinFn) -> Builtin {
    Builtin {
        name,
        types,
        iterable: false,
        func,
    }
}

use ObjectKind::{Any, Array, Boolean, Builtin as BuiltinKind, Function, Hash, Null, Number, Str};

pub fn registry() -> &'static HashMap<&'static str, Builtin> {
    static REGISTRY: OnceLock<HashMap<&'static str, Builtin>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let builtins = [
            // Container
            builtin("len", &[Str, Array], len_fn),
            builtin("push", &[Array], push_fn),
            builtin("pop", &[Array, Hash], pop_fn),
            builtin("shift", &[Array], shift_fn),
            builtin("reverse", &[Array, Str], reverse_fn),
            builtin("shuffle", &[Array], shuffle_fn),
            builtin("sort", &[Array], sort_fn),
            builtin("unique", &[Array], unique_fn),
            builtin("keys", &[Array, Hash], keys_fn),
            builtin("values", &[Hash], values_fn),
            builtin("items", &[Hash], items_fn),
            builtin("chunk", &[Array], chunk_fn),
            builtin("partition", &[Array], partition_fn),
            builtin("map", &[Array], map_fn),
            builtin("filter", &[Array], filter_fn),
            builtin("find", &[Array], find_fn),
            builtin("reduce", &[Array], reduce_fn),
            builtin("some", &[Array], some_fn),
            builtin("every", &[Array], every_fn),
            builtin("flatten", &[Array], flatten_fn),
            builtin("flatten_deep", &[Array], flatten_deep_fn),
            builtin("intersect", &[Array], intersect_fn),
            builtin("diff", &[Array], diff_fn),
            builtin("diff_symmetric", &[Array], diff_symmetric_fn),
            builtin("union", &[Array], union_fn),
            builtin("join", &[Array], join_fn),
            builtin("sum", &[Array], sum_fn),
            builtin("min", &[Array], min_fn),
            builtin("max", &[Array], max_fn),
            // String
            builtin("split", &[Str], split_fn),
            builtin("lines", &[Str], lines_fn),
            builtin("trim", &[Str], trim_fn),
            builtin("trim_by", &[Str], trim_by_fn),
            builtin("index", &[Str], index_fn),
            builtin("last_index", &[Str], last_index_fn),
            builtin("replace", &[Str], replace_fn),
            builtin("upper", &[Str], upper_fn),
            builtin("lower", &[Str], lower_fn),
            builtin("title", &[Str], title_fn),
            builtin("prefix", &[Str], prefix_fn),
            builtin("suffix", &[Str], suffix_fn),
            builtin("repeat", &[Str], repeat_fn),
            builtin("any", &[Str], any_fn),
            // Conversion
            builtin("int", &[Str, Number], int_fn),
            builtin("round", &[Str, Number], round_fn),
            builtin("floor", &[Str, Number], floor_fn),
            builtin("ceil", &[Str, Number], ceil_fn),
            builtin("num", &[Str, Number], num_fn),
            builtin("str", &[], str_fn),
            builtin("is_number", &[Str, Number], is_number_fn),
            builtin("between", &[Number], between_fn),
            builtin("type", &[], type_fn),
            builtin("json", &[Str], json_fn),
            builtin("fmt", &[Str], fmt_fn),
            builtin("tsv", &[Array], tsv_fn),
            // I/O and system
            builtin("echo", &[], echo_fn),
            Builtin {
                name: "stdin",
                types: &[],
                iterable: true,
                func: stdin_fn,
            },
            builtin("env", &[], env_fn),
            builtin("arg", &[Number], arg_fn),
            builtin("args", &[], args_fn),
            builtin("pwd", &[], pwd_fn),
            builtin("cd", &[], cd_fn),
            builtin("exit", &[Number], exit_fn),
            builtin("sleep", &[Number], sleep_fn),
            builtin("unix_ms", &[], unix_ms_fn),
            builtin("flag", &[Str], flag_fn),
            builtin("rand", &[Number], rand_fn),
            builtin("exec", &[Str], exec_fn),
            builtin("wait", &[Str], wait_fn),
            builtin("kill", &[Str], kill_fn),
            // Meta
            builtin("call", &[Function, BuiltinKind], call_fn),
            builtin("eval", &[Str], eval_fn),
            builtin("source", &[Str], source_fn),
            builtin("require", &[Str], require_fn),
        ];

        builtins.into_iter().map(|b| (b.name, b)).collect()
    })
}

/// Fixed-arity validation with per-position type whitelists.
fn validate_args(
    interp: &mut Interpreter,
    tok: &Token,
    name: &str,
    args: &[Object],
    size: usize,
    types: &[&[ObjectKind]],
) -> Option<Object> {
    if args.is_empty() || args.len() != size {
        return Some(interp.new_error(
            tok,
            format!(
                "wrong number of arguments to {}(...): got={}, want={}",
                name,
                args.len(),
                size
            ),
        ));
    }

    for (i, allowed) in types.iter().enumerate() {
        if i >= args.len() {
            break;
        }
        if !allowed.contains(&args[i].kind()) && !allowed.contains(&Any) {
            let supported: Vec<&str> = allowed.iter().map(|k| k.as_str()).collect();
            return Some(interp.new_error(
                tok,
                format!(
                    "argument {} to {}(...) is not supported (got: {}, allowed: {})",
                    i,
                    name,
                    args[i].inspect(),
                    supported.join(", ")
                ),
            ));
        }
    }

    None
}

/// Variadic validation against a list of alternative signatures; returns
/// the index of the matching signature.
fn validate_var_args(
    interp: &mut Interpreter,
    tok: &Token,
    name: &str,
    args: &[Object],
    specs: &[&[&[ObjectKind]]],
) -> Result<usize, Object> {
    let required = specs.iter().map(|s| s.len()).min().unwrap_or(0);
    let max = specs.iter().map(|s| s.len()).max().unwrap_or(0);

    if args.len() < required || args.len() > max {
        return Err(interp.new_error(
            tok,
            format!(
                "wrong number of arguments to {}(...): got={}, min={}, max={}",
                name,
                args.len(),
                required,
                max
            ),
        ));
    }

    for (which, spec) in specs.iter().enumerate() {
        if args.len() != spec.len() {
            continue;
        }
        let matches = spec
            .iter()
            .enumerate()
            .all(|(i, types)| types.contains(&args[i].kind()));
        if matches {
            return Ok(which);
        }
    }

    let mut signatures = vec![format!("wrong arguments to {}(...), usage:", name)];
    for spec in specs {
        let shown: Vec<String> = spec
            .iter()
            .map(|types| {
                types
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect();
        signatures.push(format!("{}({})", name, shown.join(", ")));
    }
    Err(interp.new_error(tok, signatures.join("\n")))
}

fn write_line(env: &Env, line: &str) {
    let writer = env.borrow().writer.clone();
    let _ = writeln!(writer.borrow_mut(), "{}", line);
}

// ---------------------------------------------------------------------
// Container builtins
// ---------------------------------------------------------------------

fn len_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "len", &args, 1, &[&[Str, Array]]) {
        return err;
    }

    match &args[0] {
        Object::Array(arr) => Object::Number(arr.borrow().elements.len() as f64),
        other => Object::Number(other.str_value().unwrap_or_default().chars().count() as f64),
    }
}

fn push_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "push",
        &args,
        2,
        &[&[Array], &[Null, Array, Number, Str, Hash]],
    ) {
        return err;
    }

    if let Object::Array(arr) = &args[0] {
        arr.borrow_mut().elements.push(args[1].clone());
    }
    args[0].clone()
}

fn pop_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let err = match args.first().map(|a| a.kind()) {
        Some(ObjectKind::Array) => validate_args(interp, tok, "pop", &args, 1, &[&[Array]]),
        Some(ObjectKind::Hash) => {
            validate_args(interp, tok, "pop", &args, 2, &[&[Hash], &[Str, Number, Boolean]])
        }
        _ => None,
    };
    if let Some(err) = err {
        return err;
    }
    if args.is_empty() {
        return Object::Null;
    }

    match &args[0] {
        Object::Array(arr) => {
            let mut arr = arr.borrow_mut();
            arr.elements.pop().unwrap_or(Object::Null)
        }
        Object::Hash(hash) => {
            if args.len() == 2 {
                if let Some(key) = args[1].hash_key() {
                    let removed = hash.borrow_mut().pairs.remove(&key);
                    if let Some(pair) = removed {
                        let mut pairs = BTreeMap::new();
                        pairs.insert(key, pair);
                        return Object::hash(pairs);
                    }
                }
            }
            Object::Null
        }
        _ => Object::Null,
    }
}

fn shift_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "shift", &args, 1, &[&[Array]]) {
        return err;
    }

    if let Object::Array(arr) = &args[0] {
        let mut arr = arr.borrow_mut();
        if arr.elements.is_empty() {
            return Object::Null;
        }
        return arr.elements.remove(0);
    }
    Object::Null
}

fn reverse_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let spec = match validate_var_args(interp, tok, "reverse", &args, &[&[&[Array]], &[&[Str]]]) {
        Ok(spec) => spec,
        Err(err) => return err,
    };

    if spec == 0 {
        if let Object::Array(arr) = &args[0] {
            let mut elements = arr.borrow().elements.clone();
            elements.reverse();
            return Object::array(elements);
        }
        Object::Null
    } else {
        let reversed: String = args[0]
            .str_value()
            .unwrap_or_default()
            .chars()
            .rev()
            .collect();
        Object::Str(reversed)
    }
}

fn shuffle_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "shuffle", &args, 1, &[&[Array]]) {
        return err;
    }

    if let Object::Array(arr) = &args[0] {
        let mut elements = arr.borrow().elements.clone();
        elements.shuffle(&mut rand::thread_rng());
        return Object::array(elements);
    }
    Object::Null
}

fn sort_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "sort", &args, 1, &[&[Array]]) {
        return err;
    }

    let arr = match &args[0] {
        Object::Array(arr) => arr,
        _ => return Object::Null,
    };
    let elements = arr.borrow().elements.clone();
    if elements.is_empty() {
        return args[0].clone();
    }
    if !arr.borrow().homogeneous() {
        return interp.new_error(
            tok,
            format!(
                "argument to sort must be a homogeneous array, got {}",
                args[0].inspect()
            ),
        );
    }

    match elements[0].kind() {
        ObjectKind::Number => {
            let mut numbers: Vec<f64> = elements
                .iter()
                .filter_map(|e| match e {
                    Object::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            numbers.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            Object::array(numbers.into_iter().map(Object::Number).collect())
        }
        ObjectKind::Str => {
            let mut strings: Vec<String> = elements
                .iter()
                .map(|e| e.str_value().unwrap_or_default())
                .collect();
            strings.sort();
            Object::array(strings.into_iter().map(Object::Str).collect())
        }
        _ => interp.new_error(
            tok,
            format!("cannot sort an array with these elements ({})", args[0].inspect()),
        ),
    }
}

fn unique_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "unique", &args, 1, &[&[Array]]) {
        return err;
    }

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    if let Object::Array(arr) = &args[0] {
        for element in arr.borrow().elements.iter() {
            if seen.insert(equality_string(element)) {
                result.push(element.clone());
            }
        }
    }
    Object::array(result)
}

fn keys_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "keys", &args, 1, &[&[Array, Hash]]) {
        return err;
    }

    match &args[0] {
        Object::Array(arr) => {
            let len = arr.borrow().elements.len();
            Object::array((0..len).map(|i| Object::Number(i as f64)).collect())
        }
        Object::Hash(hash) => Object::array(
            hash.borrow()
                .pairs
                .values()
                .map(|pair| pair.key.clone())
                .collect(),
        ),
        _ => Object::Null,
    }
}

fn values_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "values", &args, 1, &[&[Hash]]) {
        return err;
    }

    match &args[0] {
        Object::Hash(hash) => Object::array(
            hash.borrow()
                .pairs
                .values()
                .map(|pair| pair.value.clone())
                .collect(),
        ),
        _ => Object::Null,
    }
}

fn items_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "items", &args, 1, &[&[Hash]]) {
        return err;
    }

    match &args[0] {
        Object::Hash(hash) => Object::array(
            hash.borrow()
                .pairs
                .values()
                .map(|pair| Object::array(vec![pair.key.clone(), pair.value.clone()]))
                .collect(),
        ),
        _ => Object::Null,
    }
}

fn chunk_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "chunk", &args, 2, &[&[Array], &[Number]]) {
        return err;
    }

    let size = match &args[1] {
        Object::Number(n) if *n >= 1.0 && n.fract() == 0.0 => *n as usize,
        other => {
            return interp.new_error(
                tok,
                format!(
                    "chunk size must be a positive integer, got '{}'",
                    other.inspect()
                ),
            )
        }
    };

    let mut chunks = Vec::new();
    if let Object::Array(arr) = &args[0] {
        for chunk in arr.borrow().elements.chunks(size) {
            chunks.push(Object::array(chunk.to_vec()));
        }
    }
    Object::array(chunks)
}

fn partition_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "partition",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    // First-seen order of partition keys is preserved.
    let mut partitions: HashMap<String, Vec<Object>> = HashMap::new();
    let mut order = Vec::new();

    for element in elements {
        let result = interp.apply_function(tok, args[1].clone(), env, vec![element.clone()]);
        let key = equality_string(&result);
        if !partitions.contains_key(&key) {
            order.push(key.clone());
        }
        partitions.entry(key).or_default().push(element);
    }

    Object::array(
        order
            .into_iter()
            .map(|key| Object::array(partitions.remove(&key).unwrap_or_default()))
            .collect(),
    )
}

fn map_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "map",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        let evaluated = interp.apply_function(tok, args[1].clone(), env, vec![element]);
        if evaluated.is_error() {
            return evaluated;
        }
        mapped.push(evaluated);
    }
    Object::array(mapped)
}

fn filter_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "filter",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    let mut kept = Vec::new();
    for element in elements {
        let evaluated = interp.apply_function(tok, args[1].clone(), env, vec![element.clone()]);
        if evaluated.is_error() {
            return evaluated;
        }
        if is_truthy(&evaluated) {
            kept.push(element);
        }
    }
    Object::array(kept)
}

fn find_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "find",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind, Hash]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    match &args[1] {
        // A hash predicate matches elements whose pairs all equal it.
        Object::Hash(predicate) => {
            let predicate_pairs: Vec<(String, Object)> = predicate
                .borrow()
                .pairs
                .iter()
                .map(|(key, pair)| (key.value.clone(), pair.value.clone()))
                .collect();

            for element in elements {
                let hash = match &element {
                    Object::Hash(hash) => hash.clone(),
                    _ => continue,
                };
                let matches = predicate_pairs.iter().all(|(key, expected)| {
                    hash.borrow()
                        .get_pair(key)
                        .map(|pair| objects_equal(expected, &pair.value))
                        .unwrap_or(false)
                });
                if matches {
                    return element;
                }
            }
            Object::Null
        }
        predicate => {
            for element in elements {
                let evaluated =
                    interp.apply_function(tok, predicate.clone(), env, vec![element.clone()]);
                if is_truthy(&evaluated) {
                    return element;
                }
            }
            Object::Null
        }
    }
}

fn reduce_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "reduce",
        &args,
        3,
        &[&[Array], &[Function], &[Any]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    let mut accumulator = args[2].clone();
    for element in elements {
        accumulator =
            interp.apply_function(tok, args[1].clone(), env, vec![accumulator, element]);
    }
    accumulator
}

fn some_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "some",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    for element in elements {
        let evaluated = interp.apply_function(tok, args[1].clone(), env, vec![element]);
        if is_truthy(&evaluated) {
            return Object::Boolean(true);
        }
    }
    Object::Boolean(false)
}

fn every_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "every",
        &args,
        2,
        &[&[Array], &[Function, BuiltinKind]],
    ) {
        return err;
    }

    let elements = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    let mut result = true;
    for element in elements {
        let evaluated = interp.apply_function(tok, args[1].clone(), env, vec![element]);
        if !is_truthy(&evaluated) {
            result = false;
        }
    }
    Object::Boolean(result)
}

fn flatten_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    flatten(interp, tok, env, args, "flatten", false)
}

fn flatten_deep_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    flatten(interp, tok, env, args, "flatten_deep", true)
}

fn flatten(
    interp: &mut Interpreter,
    tok: &Token,
    env: &Env,
    args: Vec<Object>,
    name: &str,
    deep: bool,
) -> Object {
    if let Some(err) = validate_args(interp, tok, name, &args, 1, &[&[Array]]) {
        return err;
    }

    let original = match &args[0] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => return Object::Null,
    };

    let mut elements = Vec::new();
    for element in original {
        match &element {
            Object::Array(inner) => {
                if deep {
                    let flattened =
                        flatten(interp, tok, env, vec![element.clone()], name, true);
                    if let Object::Array(flat) = flattened {
                        elements.extend(flat.borrow().elements.clone());
                    }
                } else {
                    elements.extend(inner.borrow().elements.clone());
                }
            }
            _ => elements.push(element),
        }
    }
    Object::array(elements)
}

fn intersect_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "intersect", &args, 2, &[&[Array], &[Array]]) {
        return err;
    }

    let (left, right) = match (&args[0], &args[1]) {
        (Object::Array(l), Object::Array(r)) => {
            (l.borrow().elements.clone(), r.borrow().elements.clone())
        }
        _ => return Object::Null,
    };

    let found: std::collections::HashSet<String> =
        right.iter().map(equality_string).collect();

    Object::array(
        left.into_iter()
            .filter(|element| found.contains(&equality_string(element)))
            .collect(),
    )
}

fn diff_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    diff(interp, tok, env, args, "diff", false)
}

fn diff_symmetric_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    diff(interp, tok, env, args, "diff_symmetric", true)
}

fn diff(
    interp: &mut Interpreter,
    tok: &Token,
    env: &Env,
    args: Vec<Object>,
    name: &str,
    symmetric: bool,
) -> Object {
    if let Some(err) = validate_args(interp, tok, name, &args, 2, &[&[Array], &[Array]]) {
        return err;
    }

    let (left, right) = match (&args[0], &args[1]) {
        (Object::Array(l), Object::Array(r)) => {
            (l.borrow().elements.clone(), r.borrow().elements.clone())
        }
        _ => return Object::Null,
    };

    let found_right: std::collections::HashSet<String> =
        right.iter().map(equality_string).collect();

    let mut difference: Vec<Object> = left
        .into_iter()
        .filter(|element| !found_right.contains(&equality_string(element)))
        .collect();

    if symmetric {
        let reversed = diff(
            interp,
            tok,
            env,
            vec![args[1].clone(), args[0].clone()],
            name,
            false,
        );
        if let Object::Array(arr) = reversed {
            difference.extend(arr.borrow().elements.clone());
        }
    }

    Object::array(difference)
}

fn union_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "union", &args, 2, &[&[Array], &[Array]]) {
        return err;
    }

    let (left, right) = match (&args[0], &args[1]) {
        (Object::Array(l), Object::Array(r)) => {
            (l.borrow().elements.clone(), r.borrow().elements.clone())
        }
        _ => return Object::Null,
    };

    let seen: std::collections::HashSet<String> = left.iter().map(equality_string).collect();

    let mut union = left.clone();
    for element in right {
        if !seen.contains(&equality_string(&element)) {
            union.push(element);
        }
    }
    Object::array(union)
}

fn join_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let spec = match validate_var_args(
        interp,
        tok,
        "join",
        &args,
        &[&[&[Array], &[Str]], &[&[Array]]],
    ) {
        Ok(spec) => spec,
        Err(err) => return err,
    };

    let glue = if spec == 0 {
        args[1].str_value().unwrap_or_default()
    } else {
        String::new()
    };

    if let Object::Array(arr) = &args[0] {
        let parts: Vec<String> = arr.borrow().elements.iter().map(|e| e.inspect()).collect();
        return Object::Str(parts.join(&glue));
    }
    Object::Null
}

fn sum_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "sum", &args, 1, &[&[Array]]) {
        return err;
    }

    let arr = match &args[0] {
        Object::Array(arr) => arr,
        _ => return Object::Null,
    };
    if arr.borrow().is_empty() {
        return Object::Number(0.0);
    }
    if !arr.borrow().homogeneous() || arr.borrow().elements[0].kind() != ObjectKind::Number {
        return interp.new_error(
            tok,
            format!(
                "sum(...) can only be called on an array of numbers, got {}",
                args[0].inspect()
            ),
        );
    }

    let total: f64 = arr
        .borrow()
        .elements
        .iter()
        .filter_map(|e| match e {
            Object::Number(n) => Some(*n),
            _ => None,
        })
        .sum();
    Object::Number(total)
}

fn min_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    min_max(interp, tok, args, "min", false)
}

fn max_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    min_max(interp, tok, args, "max", true)
}

fn min_max(
    interp: &mut Interpreter,
    tok: &Token,
    args: Vec<Object>,
    name: &str,
    want_max: bool,
) -> Object {
    if let Some(err) = validate_args(interp, tok, name, &args, 1, &[&[Array]]) {
        return err;
    }

    let arr = match &args[0] {
        Object::Array(arr) => arr,
        _ => return Object::Null,
    };
    if arr.borrow().is_empty() {
        return Object::Null;
    }
    if !arr.borrow().homogeneous() || arr.borrow().elements[0].kind() != ObjectKind::Number {
        return interp.new_error(
            tok,
            format!(
                "{}(...) can only be called on an array of numbers, got {}",
                name,
                args[0].inspect()
            ),
        );
    }

    let mut best = match &arr.borrow().elements[0] {
        Object::Number(n) => *n,
        _ => return Object::Null,
    };
    for element in arr.borrow().elements.iter().skip(1) {
        if let Object::Number(n) = element {
            if (want_max && *n > best) || (!want_max && *n < best) {
                best = *n;
            }
        }
    }
    Object::Number(best)
}

// ---------------------------------------------------------------------
// String builtins
// ---------------------------------------------------------------------

fn split_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let spec = match validate_var_args(
        interp,
        tok,
        "split",
        &args,
        &[&[&[Str], &[Str]], &[&[Str]]],
    ) {
        Ok(spec) => spec,
        Err(err) => return err,
    };

    let s = args[0].str_value().unwrap_or_default();
    let sep = if spec == 0 {
        args[1].str_value().unwrap_or_default()
    } else {
        " ".to_string()
    };

    Object::array(
        s.split(sep.as_str())
            .map(|part| Object::Str(part.to_string()))
            .collect(),
    )
}

fn lines_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "lines", &args, 1, &[&[Str]]) {
        return err;
    }

    let s = args[0].str_value().unwrap_or_default();
    Object::array(
        s.split(['\n', '\r', '\x0c'])
            .filter(|part| !part.is_empty())
            .map(|part| Object::Str(part.to_string()))
            .collect(),
    )
}

fn trim_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "trim", &args, 1, &[&[Str]]) {
        return err;
    }

    let s = args[0].str_value().unwrap_or_default();
    Object::Str(s.trim_matches(' ').to_string())
}

fn trim_by_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "trim_by", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }

    let s = args[0].str_value().unwrap_or_default();
    let cutset = args[1].str_value().unwrap_or_default();
    Object::Str(s.trim_matches(|c| cutset.contains(c)).to_string())
}

fn index_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "index", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }

    let haystack = args[0].str_value().unwrap_or_default();
    let needle = args[1].str_value().unwrap_or_default();
    match haystack.find(&needle) {
        Some(byte_index) => {
            Object::Number(haystack[..byte_index].chars().count() as f64)
        }
        None => Object::Null,
    }
}

fn last_index_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "last_index", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }

    let haystack = args[0].str_value().unwrap_or_default();
    let needle = args[1].str_value().unwrap_or_default();
    match haystack.rfind(&needle) {
        Some(byte_index) => {
            Object::Number(haystack[..byte_index].chars().count() as f64)
        }
        None => Object::Null,
    }
}

/// `replace(s, search, replacement)` where search is a string or an
/// array of strings, with an optional occurrence count.
fn replace_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let err = if args.len() == 3 {
        validate_args(
            interp,
            tok,
            "replace",
            &args,
            3,
            &[&[Str], &[Str, Array], &[Str]],
        )
    } else {
        validate_args(
            interp,
            tok,
            "replace",
            &args,
            4,
            &[&[Str], &[Str, Array], &[Str], &[Number]],
        )
    };
    if let Some(err) = err {
        return err;
    }

    let mut original = args[0].str_value().unwrap_or_default();
    let replacement = args[2].str_value().unwrap_or_default();
    let count = if args.len() == 4 {
        match &args[3] {
            Object::Number(n) if *n >= 0.0 => Some(*n as usize),
            _ => None,
        }
    } else {
        None
    };

    let apply = |original: &str, search: &str| match count {
        Some(n) => original.replacen(search, &replacement, n),
        None => original.replace(search, &replacement),
    };

    if let Object::Array(searches) = &args[1] {
        for search in searches.borrow().elements.iter() {
            original = apply(&original, &search.inspect());
        }
        return Object::Str(original);
    }

    let search = args[1].str_value().unwrap_or_default();
    Object::Str(apply(&original, &search))
}

fn upper_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "upper", &args, 1, &[&[Str]]) {
        return err;
    }
    Object::Str(args[0].str_value().unwrap_or_default().to_uppercase())
}

fn lower_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "lower", &args, 1, &[&[Str]]) {
        return err;
    }
    Object::Str(args[0].str_value().unwrap_or_default().to_lowercase())
}

fn title_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "title", &args, 1, &[&[Str]]) {
        return err;
    }
    Object::Str(util::title_case(&args[0].str_value().unwrap_or_default()))
}

fn prefix_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "prefix", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }
    let s = args[0].str_value().unwrap_or_default();
    let prefix = args[1].str_value().unwrap_or_default();
    Object::Boolean(s.starts_with(&prefix))
}

fn suffix_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "suffix", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }
    let s = args[0].str_value().unwrap_or_default();
    let suffix = args[1].str_value().unwrap_or_default();
    Object::Boolean(s.ends_with(&suffix))
}

fn repeat_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "repeat", &args, 2, &[&[Str], &[Number]]) {
        return err;
    }

    let count = match &args[1] {
        Object::Number(n) if *n >= 0.0 => *n as usize,
        other => {
            return interp.new_error(
                tok,
                format!("repeat count must be a non-negative number, got {}", other.inspect()),
            )
        }
    };
    Object::Str(args[0].str_value().unwrap_or_default().repeat(count))
}

fn any_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "any", &args, 2, &[&[Str], &[Str]]) {
        return err;
    }

    let s = args[0].str_value().unwrap_or_default();
    let chars = args[1].str_value().unwrap_or_default();
    Object::Boolean(s.chars().any(|c| chars.contains(c)))
}

// ---------------------------------------------------------------------
// Conversion builtins
// ---------------------------------------------------------------------

fn apply_math_function(
    interp: &mut Interpreter,
    tok: &Token,
    arg: &Object,
    f: fn(f64) -> f64,
    name: &str,
) -> Object {
    match arg {
        Object::Number(n) => Object::Number(f(*n)),
        Object::Str(_) | Object::Cmd(_) => {
            let s = arg.str_value().unwrap_or_default();
            match s.parse::<f64>() {
                Ok(n) => Object::Number(f(n)),
                Err(_) => interp.new_error(
                    tok,
                    format!("{}(...) can only be called on numeric strings, got '{}'", name, s),
                ),
            }
        }
        other => interp.new_error(
            tok,
            format!("argument to {} is not supported, got {}", name, other.kind()),
        ),
    }
}

fn int_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "int", &args, 1, &[&[Number, Str]]) {
        return err;
    }
    apply_math_function(interp, tok, &args[0], |n| n.trunc(), "int")
}

fn round_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if args.is_empty() {
        return interp.new_error(tok, "wrong number of arguments to round(...): got=0, want=1");
    }
    if let Some(err) = validate_args(interp, tok, "round", &args[..1], 1, &[&[Number, Str]]) {
        return err;
    }

    let mut decimal = 1.0;
    if args.len() > 1 {
        if let Some(err) = validate_args(interp, tok, "round", &args[1..], 1, &[&[Number]]) {
            return err;
        }
        if let Object::Number(digits) = &args[1] {
            decimal = 10f64.powf(*digits);
        }
    }

    match &args[0] {
        Object::Number(n) => Object::Number((n * decimal).round() / decimal),
        other => {
            let rounded = apply_math_function(interp, tok, other, |n| n, "round");
            match rounded {
                Object::Number(n) => Object::Number((n * decimal).round() / decimal),
                err => err,
            }
        }
    }
}

fn floor_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "floor", &args, 1, &[&[Number, Str]]) {
        return err;
    }
    apply_math_function(interp, tok, &args[0], f64::floor, "floor")
}

fn ceil_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "ceil", &args, 1, &[&[Number, Str]]) {
        return err;
    }
    apply_math_function(interp, tok, &args[0], f64::ceil, "ceil")
}

fn num_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "num", &args, 1, &[&[Number, Str]]) {
        return err;
    }

    match &args[0] {
        Object::Number(_) => args[0].clone(),
        other => {
            let s = other.str_value().unwrap_or_default();
            match s.parse::<f64>() {
                Ok(n) => Object::Number(n),
                Err(_) => interp.new_error(
                    tok,
                    format!("num(...) can only be called on numeric strings, got '{}'", s),
                ),
            }
        }
    }
}

fn str_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "str", &args, 1, &[]) {
        return err;
    }
    Object::Str(args[0].inspect())
}

fn is_number_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "is_number", &args, 1, &[&[Number, Str]]) {
        return err;
    }

    match &args[0] {
        Object::Number(_) => Object::Boolean(true),
        other => Object::Boolean(util::is_number(&other.str_value().unwrap_or_default())),
    }
}

fn between_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "between",
        &args,
        3,
        &[&[Number], &[Number], &[Number]],
    ) {
        return err;
    }

    let (n, min, max) = match (&args[0], &args[1], &args[2]) {
        (Object::Number(n), Object::Number(min), Object::Number(max)) => (*n, *min, *max),
        _ => return Object::Null,
    };

    if min >= max {
        return interp.new_error(
            tok,
            format!(
                "arguments to between must form a range ({} < {} expected)",
                crate::object::format_number(min),
                crate::object::format_number(max)
            ),
        );
    }

    Object::Boolean(min <= n && n <= max)
}

fn type_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "type", &args, 1, &[]) {
        return err;
    }
    Object::Str(args[0].kind().as_str().to_string())
}

fn json_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "json", &args, 1, &[&[Str]]) {
        return err;
    }

    let s = args[0].str_value().unwrap_or_default();
    match serde_json::from_str::<serde_json::Value>(s.trim()) {
        Ok(value) => json_to_object(&value),
        Err(_) => interp.new_error(
            tok,
            format!("argument to json must be valid JSON, got '{}'", s),
        ),
    }
}

fn json_to_object(value: &serde_json::Value) -> Object {
    match value {
        serde_json::Value::Null => Object::Null,
        serde_json::Value::Bool(b) => Object::Boolean(*b),
        serde_json::Value::Number(n) => Object::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Object::Str(s.clone()),
        serde_json::Value::Array(values) => {
            Object::array(values.iter().map(json_to_object).collect())
        }
        serde_json::Value::Object(map) => {
            let mut pairs = BTreeMap::new();
            for (key, value) in map {
                let key_obj = Object::Str(key.clone());
                pairs.insert(
                    key_obj.hash_key().expect("strings are hashable"),
                    HashPair {
                        key: key_obj,
                        value: json_to_object(value),
                    },
                );
            }
            Object::hash(pairs)
        }
    }
}

fn fmt_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if args.is_empty() || args[0].kind() != ObjectKind::Str {
        return interp.new_error(tok, "fmt(...) requires a format string as its first argument");
    }

    let format = args[0].str_value().unwrap_or_default();
    Object::Str(util::sprintf(&format, &args[1..]))
}

fn tsv_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let err = match args.len() {
        3 => validate_args(interp, tok, "tsv", &args, 3, &[&[Array], &[Str], &[Array]]),
        2 => validate_args(interp, tok, "tsv", &args, 2, &[&[Array], &[Str]]),
        _ => validate_args(interp, tok, "tsv", &args, 1, &[&[Array]]),
    };
    if let Some(err) = err {
        return err;
    }

    let separator = if args.len() >= 2 {
        args[1].str_value().unwrap_or_default()
    } else {
        "\t".to_string()
    };
    let separator = match separator.chars().next() {
        Some(c) => c,
        None => {
            return interp.new_error(
                tok,
                "the separator argument to tsv() must be a valid character",
            )
        }
    };

    let arr = match &args[0] {
        Object::Array(arr) => arr,
        _ => return Object::Null,
    };
    let rows = arr.borrow().elements.clone();
    let homogeneous = arr.borrow().homogeneous();
    let is_array = matches!(rows.first(), Some(Object::Array(_)));
    let is_hash = matches!(rows.first(), Some(Object::Hash(_)));

    if !homogeneous || (!is_array && !is_hash) {
        return interp.new_error(
            tok,
            format!(
                "tsv() must be called on an array of arrays or hashes, eg. [[1, 2, 3]], got {}",
                args[0].inspect()
            ),
        );
    }

    let mut header: Vec<String> = match args.get(2) {
        Some(Object::Array(header)) => header
            .borrow()
            .elements
            .iter()
            .map(|e| e.inspect())
            .collect(),
        _ => Vec::new(),
    };

    // Hash rows default to the union of keys, sorted.
    if header.is_empty() && is_hash {
        let mut keys = Vec::new();
        for row in &rows {
            if let Object::Hash(hash) = row {
                for pair in hash.borrow().pairs.values() {
                    keys.push(pair.key.inspect());
                }
            }
        }
        header = util::unique_strings(&keys);
        header.sort();
    }

    let mut out = String::new();
    if !header.is_empty() {
        out.push_str(&tsv_row(&header, separator));
    }

    for row in &rows {
        let values: Vec<String> = match row {
            Object::Array(cells) => {
                cells.borrow().elements.iter().map(|e| e.inspect()).collect()
            }
            Object::Hash(hash) => header
                .iter()
                .map(|key| {
                    hash.borrow()
                        .get_pair(key)
                        .map(|pair| pair.value.inspect())
                        .unwrap_or_else(|| "null".to_string())
                })
                .collect(),
            _ => Vec::new(),
        };
        out.push_str(&tsv_row(&values, separator));
    }

    Object::Str(out.trim().to_string())
}

fn tsv_row(fields: &[String], separator: char) -> String {
    let mut quoted = Vec::with_capacity(fields.len());
    for field in fields {
        let leading_space = field
            .chars()
            .next()
            .map(|c| c.is_whitespace())
            .unwrap_or(false);
        if field.contains(separator)
            || field.contains('"')
            || field.contains('\n')
            || field.contains('\r')
            || leading_space
        {
            quoted.push(format!("\"{}\"", field.replace('"', "\"\"")));
        } else {
            quoted.push(field.clone());
        }
    }
    format!("{}\n", quoted.join(&separator.to_string()))
}

// ---------------------------------------------------------------------
// I/O and system builtins
// ---------------------------------------------------------------------

fn echo_fn(_interp: &mut Interpreter, _tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if args.is_empty() {
        write_line(env, "");
        return Object::Null;
    }

    let format = args[0].inspect();
    write_line(env, &util::sprintf(&format, &args[1..]));
    Object::Null
}

fn stdin_fn(_interp: &mut Interpreter, _tok: &Token, _env: &Env, _args: Vec<Object>) -> Object {
    let mut line = String::new();
    match std::io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => Object::error("EOF"),
        Ok(_) => {
            while line.ends_with(['\n', '\r']) {
                line.pop();
            }
            Object::Str(line)
        }
    }
}

fn env_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let spec = match validate_var_args(
        interp,
        tok,
        "env",
        &args,
        &[&[&[Str], &[Str]], &[&[Str]]],
    ) {
        Ok(spec) => spec,
        Err(err) => return err,
    };

    let key = args[0].str_value().unwrap_or_default();
    if spec == 0 {
        env::set_var(&key, args[1].str_value().unwrap_or_default());
    }

    Object::Str(env::var(&key).unwrap_or_default())
}

fn arg_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "arg", &args, 1, &[&[Number]]) {
        return err;
    }

    let i = match &args[0] {
        Object::Number(n) => *n as i64,
        _ => return Object::Str(String::new()),
    };
    if i < 0 {
        return Object::Str(String::new());
    }

    Object::Str(env::args().nth(i as usize).unwrap_or_default())
}

fn args_fn(_interp: &mut Interpreter, _tok: &Token, _env: &Env, _args: Vec<Object>) -> Object {
    Object::array(env::args().map(Object::Str).collect())
}

fn pwd_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, _args: Vec<Object>) -> Object {
    match env::current_dir() {
        Ok(dir) => Object::Str(dir.to_string_lossy().to_string()),
        Err(err) => interp.new_error(tok, err.to_string()),
    }
}

/// `cd(path?)` changes the working directory, defaulting to home. The
/// result string carries an ok flag reporting success.
fn cd_fn(_interp: &mut Interpreter, _tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    let path = match args.first() {
        Some(arg) => util::expand_path(&arg.str_value().unwrap_or_default()),
        None => dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")),
    };

    match env::set_current_dir(&path) {
        Ok(()) => {
            let dir = env::current_dir()
                .map(|d| d.to_string_lossy().to_string())
                .unwrap_or_default();
            Object::Cmd(CmdResult::completed(true, &dir, ""))
        }
        Err(err) => Object::Cmd(CmdResult::completed(false, "", &err.to_string())),
    }
}

fn exit_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    let err = if args.len() == 2 {
        validate_args(interp, tok, "exit", &args, 2, &[&[Number], &[Str]])
    } else {
        validate_args(interp, tok, "exit", &args, 1, &[&[Number]])
    };
    if let Some(err) = err {
        return err;
    }

    if args.len() == 2 {
        let writer = env.borrow().writer.clone();
        let _ = write!(writer.borrow_mut(), "{}", args[1].inspect());
    }

    let code = match &args[0] {
        Object::Number(n) => *n as i32,
        _ => 0,
    };
    std::process::exit(code);
}

fn sleep_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "sleep", &args, 1, &[&[Number]]) {
        return err;
    }

    if let Object::Number(ms) = &args[0] {
        if *ms > 0.0 {
            thread::sleep(Duration::from_millis(*ms as u64));
        }
    }
    Object::Null
}

fn unix_ms_fn(_interp: &mut Interpreter, _tok: &Token, _env: &Env, _args: Vec<Object>) -> Object {
    Object::Number(Utc::now().timestamp_millis() as f64)
}

/// `flag("name")` parses `-name` / `--name` occurrences from the host
/// arguments, supporting both `-name=value` and `-name value`.
fn flag_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "flag", &args, 1, &[&[Str]]) {
        return err;
    }

    let name = args[0].str_value().unwrap_or_default();
    let mut found = false;

    for arg in env::args() {
        if found {
            // The previous argument was the bare flag: a following
            // non-flag token is its value.
            if arg.starts_with('-') {
                break;
            }
            return Object::Str(arg);
        }

        let mut parts = arg.splitn(2, '=');
        let left = parts.next().unwrap_or("");
        let value = parts.next();

        let matches = left.get(1..).map(|s| s == name).unwrap_or(false)
            || left.get(2..).map(|s| s == name).unwrap_or(false);
        if matches {
            match value {
                Some(value) => return Object::Str(value.to_string()),
                None => found = true,
            }
        }
    }

    if found {
        return Object::Boolean(true);
    }
    Object::Null
}

fn rand_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "rand", &args, 1, &[&[Number]]) {
        return err;
    }

    let max = match &args[0] {
        Object::Number(n) => *n as i64,
        _ => 0,
    };
    if max <= 0 {
        return interp.new_error(
            tok,
            format!("rand(...) requires a positive number, got {}", args[0].inspect()),
        );
    }

    Object::Number(rand::thread_rng().gen_range(0..max) as f64)
}

/// `exec(cmd)` runs a command with the interpreter's standard streams
/// attached, returning null on success or the failure text.
fn exec_fn(_interp: &mut Interpreter, _tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    let cmd = args
        .first()
        .and_then(|a| a.str_value())
        .unwrap_or_default();
    let cmd = util::interpolate_string_vars(cmd.trim(), env);

    let parts = util::command_executor();
    debug!(command = %cmd, "exec");

    let status = Command::new(&parts[0])
        .args(&parts[1..])
        .arg(&cmd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status();

    match status {
        Ok(status) if status.success() => Object::Null,
        Ok(status) => Object::Str(format!("exit status {}", status.code().unwrap_or(-1))),
        Err(err) => Object::Str(err.to_string()),
    }
}

fn wait_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "wait", &args, 1, &[&[Str]]) {
        return err;
    }

    if let Object::Cmd(cmd) = &args[0] {
        cmd.wait();
    }
    args[0].clone()
}

fn kill_fn(interp: &mut Interpreter, tok: &Token, _env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "kill", &args, 1, &[&[Str]]) {
        return err;
    }

    if let Object::Cmd(cmd) = &args[0] {
        if cmd.has_child() {
            if let Err(err) = cmd.kill() {
                return interp.new_error(
                    tok,
                    format!("error killing command {}: {}", args[0].inspect(), err),
                );
            }
        }
    }
    args[0].clone()
}

// ---------------------------------------------------------------------
// Meta builtins
// ---------------------------------------------------------------------

fn call_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(
        interp,
        tok,
        "call",
        &args,
        2,
        &[&[Function, BuiltinKind], &[Array]],
    ) {
        return err;
    }

    let call_args = match &args[1] {
        Object::Array(arr) => arr.borrow().elements.clone(),
        _ => Vec::new(),
    };
    interp.apply_function(tok, args[0].clone(), env, call_args)
}

fn eval_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "eval", &args, 1, &[&[Str]]) {
        return err;
    }

    let code = args[0].str_value().unwrap_or_default();
    match interp.eval_source_code(&code, env) {
        Err(errors) => interp.new_error(
            tok,
            format!(
                "error found in eval block: {}\n parser errors:\n\t{}",
                code,
                errors.join("\n\t")
            ),
        ),
        Ok(evaluated) => {
            if let Object::Error(inner) = &evaluated {
                let outer = match interp
                    .new_error(tok, format!("error found in eval block: {}", code))
                {
                    Object::Error(outer) => outer,
                    _ => return evaluated,
                };
                return Object::error(format!("{}\n\t{}", outer.message, inner.message));
            }
            evaluated
        }
    }
}

fn source_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "source", &args, 1, &[&[Str]]) {
        interp.source_level = 0;
        return err;
    }

    let file = util::expand_path(&args[0].inspect());
    do_source(interp, tok, env, &file)
}

/// `require` resolves through the package alias file, caches by resolved
/// path, and evaluates the file in a fresh environment rooted at the
/// file's directory.
fn require_fn(interp: &mut Interpreter, tok: &Token, env: &Env, args: Vec<Object>) -> Object {
    if let Some(err) = validate_args(interp, tok, "require", &args, 1, &[&[Str]]) {
        interp.source_level = 0;
        return err;
    }

    if interp.package_aliases.is_none() {
        let aliases = fs::read_to_string("./paketler.json")
            .ok()
            .and_then(|content| serde_json::from_str::<HashMap<String, String>>(&content).ok())
            .unwrap_or_default();
        interp.package_aliases = Some(aliases);
    }
    let aliases = interp.package_aliases.clone().unwrap_or_default();

    let requested = args[0].inspect();
    let unaliased = util::unalias_path(&requested, &aliases);
    let is_asset = unaliased.to_string_lossy().starts_with('@');

    let file = if is_asset {
        unaliased
    } else {
        env.borrow().dir.join(unaliased)
    };
    let cache_key = file.to_string_lossy().to_string();

    if let Some(cached) = interp.require_cache.get(&cache_key) {
        return cached.clone();
    }

    let parent = file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    let nested_env = {
        let env_ref = env.borrow();
        Environment::new(env_ref.writer.clone(), parent, &env_ref.version)
    };

    let evaluated = do_source(interp, tok, &nested_env, &file);
    if !evaluated.is_error() {
        interp
            .require_cache
            .insert(cache_key, evaluated.clone());
    }
    evaluated
}

fn do_source(interp: &mut Interpreter, tok: &Token, env: &Env, file: &Path) -> Object {
    let depth: usize = util::get_env_var(env, "ANK_SOURCE_DEPTH", "10")
        .parse()
        .unwrap_or(10);

    if interp.source_level >= depth {
        interp.source_level = 0;
        return interp.new_error(tok, format!("maximum source depth reached ({})", depth));
    }
    interp.source_level += 1;

    let file_display = file.display().to_string();
    debug!(file = %file_display, "sourcing file");

    let code = {
        let name = file.to_string_lossy();
        if let Some(asset) = name.strip_prefix('@') {
            util::stdlib_asset(Path::new(asset))
        } else {
            fs::read_to_string(file).map_err(|err| err.to_string())
        }
    };
    let code = match code {
        Ok(code) => code,
        Err(err) => {
            interp.source_level = 0;
            return interp.new_error(
                tok,
                format!("could not read source file {}: {}", file_display, err),
            );
        }
    };

    match interp.eval_source_code(&code, env) {
        Err(errors) => {
            interp.source_level = 0;
            interp.new_error(
                tok,
                format!(
                    "error in source: {}\n parser errors:\n\t{}",
                    file_display,
                    errors.join("\n\t")
                ),
            )
        }
        Ok(evaluated) => {
            if let Object::Error(inner) = &evaluated {
                let outer = match interp
                    .new_error(tok, format!("error in source: {}", file_display))
                {
                    Object::Error(outer) => outer,
                    _ => return evaluated,
                };
                return Object::error(format!("{}\n\t{}", outer.message, inner.message));
            }
            interp.source_level -= 1;
            evaluated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_the_catalog() {
        let registry = registry();
        for name in [
            "len", "push", "pop", "shift", "reverse", "shuffle", "sort", "unique", "keys",
            "values", "items", "chunk", "partition", "map", "filter", "find", "reduce", "some",
            "every", "flatten", "flatten_deep", "intersect", "diff", "diff_symmetric", "union",
            "join", "sum", "min", "max", "split", "lines", "trim", "trim_by", "index",
            "last_index", "replace", "upper", "lower", "title", "prefix", "suffix", "repeat",
            "any", "int", "round", "floor", "ceil", "num", "str", "is_number", "between",
            "type", "json", "fmt", "tsv", "echo", "stdin", "env", "arg", "args", "pwd", "cd",
            "exit", "sleep", "unix_ms", "flag", "rand", "exec", "wait", "kill", "call", "eval",
            "source", "require",
        ] {
            assert!(registry.contains_key(name), "missing builtin: {}", name);
        }
    }

    #[test]
    fn test_stdin_is_the_only_iterable_builtin() {
        let registry = registry();
        for (name, builtin) in registry.iter() {
            assert_eq!(builtin.iterable, *name == "stdin");
        }
    }

    #[test]
    fn test_receiver_types() {
        let registry = registry();
        assert_eq!(registry["len"].types, &[Str, Array]);
        assert_eq!(registry["values"].types, &[Hash]);
        assert!(registry["echo"].types.is_empty());
    }
}
