use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anka::environment::{Env, Environment, Writer};
use anka::object::Object;
use anka::run_source;

fn run(input: &str) -> (Object, String) {
    let buffer = Rc::new(RefCell::new(Vec::<u8>::new()));
    let writer: Writer = buffer.clone();
    let env: Env = Environment::new(writer, PathBuf::from("."), "test");
    let result = run_source(input, &env).unwrap_or_else(|errors| {
        panic!("parser errors for {:?}: {:?}", input, errors);
    });
    let output = String::from_utf8(buffer.borrow().clone()).unwrap();
    (result, output)
}

fn eval_to(input: &str, expected: &str) {
    let (result, _) = run(input);
    assert_eq!(result.inspect(), expected, "input: {}", input);
}

fn eval_to_error(input: &str) {
    let (result, _) = run(input);
    assert!(result.is_error(), "expected error for input: {}", input);
}

#[test]
fn test_len() {
    eval_to("len([1, 2, 3])", "3");
    eval_to("len(\"selam\")", "5");
    eval_to("len(\"\")", "0");
    eval_to_error("len(1)");
    eval_to_error("len()");
}

#[test]
fn test_push_pop_shift() {
    eval_to("a = [1]; push(a, 2); a", "[1, 2]");
    eval_to("a = [1, 2]; pop(a)", "2");
    eval_to("a = [1, 2]; pop(a); a", "[1]");
    eval_to("a = []; pop(a)", "null");
    eval_to("a = [1, 2]; shift(a)", "1");
    eval_to("a = [1, 2]; shift(a); a", "[2]");
    eval_to("a = []; shift(a)", "null");
}

#[test]
fn test_pop_on_hash_removes_key() {
    eval_to("h = {\"a\": 1, \"b\": 2}; pop(h, \"a\")", "{\"a\": 1}");
    eval_to("h = {\"a\": 1}; pop(h, \"a\"); h", "{}");
    eval_to("h = {\"a\": 1}; pop(h, \"yok\")", "null");
}

#[test]
fn test_reverse() {
    eval_to("reverse([1, 2, 3])", "[3, 2, 1]");
    eval_to("reverse(\"abc\")", "cba");
    // reverse returns a copy.
    eval_to("a = [1, 2]; reverse(a); a", "[1, 2]");
}

#[test]
fn test_sort() {
    eval_to("sort([3, 1, 2])", "[1, 2, 3]");
    eval_to("sort([\"b\", \"a\"])", "[\"a\", \"b\"]");
    eval_to("sort([])", "[]");
    eval_to_error("sort([1, \"a\"])");
}

#[test]
fn test_unique() {
    eval_to("unique([1, 1, 2, \"a\", \"a\"])", "[1, 2, \"a\"]");
}

#[test]
fn test_keys_values_items() {
    eval_to("keys([9, 8])", "[0, 1]");
    eval_to("keys({\"b\": 2, \"a\": 1})", "[\"a\", \"b\"]");
    eval_to("values({\"b\": 2, \"a\": 1})", "[1, 2]");
    eval_to("items({\"a\": 1})", "[[\"a\", 1]]");
}

#[test]
fn test_chunk() {
    eval_to("chunk([1, 2, 3, 4, 5], 2)", "[[1, 2], [3, 4], [5]]");
    eval_to_error("chunk([1], 0)");
    eval_to_error("chunk([1], 1.5)");
}

#[test]
fn test_partition() {
    eval_to(
        "partition([1, 2, 3, 4], f(x) { dön x % 2 })",
        "[[1, 3], [2, 4]]",
    );
}

#[test]
fn test_map_filter() {
    eval_to("map([1, 2, 3], f(x) { dön x * 2 })", "[2, 4, 6]");
    eval_to("filter([1, 2, 3, 4], f(x) { dön x > 2 })", "[3, 4]");
}

#[test]
fn test_find() {
    eval_to("find([1, 2, 3], f(x) { dön x > 1 })", "2");
    eval_to("find([1], f(x) { dön x > 9 })", "null");
    eval_to(
        "find([{\"ad\": \"x\"}, {\"ad\": \"y\", \"n\": 1}], {\"ad\": \"y\"})",
        "{\"ad\": \"y\", \"n\": 1}",
    );
}

#[test]
fn test_reduce() {
    eval_to("reduce([1, 2, 3], f(acc, x) { dön acc + x }, 10)", "16");
}

#[test]
fn test_some_every() {
    eval_to("some([1, 2], f(x) { dön x > 1 })", "true");
    eval_to("some([], f(x) { dön doğru })", "false");
    eval_to("every([1, 2], f(x) { dön x > 0 })", "true");
    eval_to("every([1, 2], f(x) { dön x > 1 })", "false");
    eval_to("every([], f(x) { dön yanlış })", "true");
}

#[test]
fn test_flatten() {
    eval_to("flatten([[1, 2], [3], 4])", "[1, 2, 3, 4]");
    eval_to("flatten([[1, [2]]])", "[1, [2]]");
    eval_to("flatten_deep([[1, [2, [3]]]])", "[1, 2, 3]");
}

#[test]
fn test_set_operations() {
    eval_to("intersect([1, 2, 3], [2, 3, 4])", "[2, 3]");
    eval_to("diff([1, 2, 3], [2])", "[1, 3]");
    eval_to("diff_symmetric([1, 2], [2, 3])", "[1, 3]");
    eval_to("union([1, 2], [2, 3])", "[1, 2, 3]");
}

#[test]
fn test_join() {
    eval_to("join([1, 2, 3], \"-\")", "1-2-3");
    eval_to("join([\"a\", \"b\"])", "ab");
}

#[test]
fn test_sum_min_max() {
    eval_to("sum([1, 2, 3])", "6");
    eval_to("sum([])", "0");
    eval_to_error("sum([1, \"a\"])");
    eval_to("min([3, 1, 2])", "1");
    eval_to("max([3, 1, 2])", "3");
    eval_to("min([])", "null");
    eval_to("max([])", "null");
}

#[test]
fn test_split_lines() {
    eval_to("split(\"a,b,c\", \",\")", "[\"a\", \"b\", \"c\"]");
    eval_to("split(\"a b\")", "[\"a\", \"b\"]");
    eval_to("lines(\"a\nb\n\nc\")", "[\"a\", \"b\", \"c\"]");
}

#[test]
fn test_trim() {
    eval_to("trim(\"  selam  \")", "selam");
    eval_to("trim_by(\"xxselamxx\", \"x\")", "selam");
}

#[test]
fn test_index_last_index() {
    eval_to("index(\"selam\", \"l\")", "2");
    eval_to("index(\"selam\", \"q\")", "null");
    eval_to("last_index(\"ababa\", \"a\")", "4");
}

#[test]
fn test_replace() {
    eval_to("replace(\"a-b-c\", \"-\", \"+\")", "a+b+c");
    eval_to("replace(\"a-b-c\", \"-\", \"+\", 1)", "a+b-c");
    eval_to("replace(\"aXbYc\", [\"X\", \"Y\"], \"\")", "abc");
}

#[test]
fn test_case_functions() {
    eval_to("upper(\"selam\")", "SELAM");
    eval_to("lower(\"SELAM\")", "selam");
    eval_to("title(\"merhaba güzel dünya\")", "Merhaba Güzel Dünya");
}

#[test]
fn test_prefix_suffix_repeat_any() {
    eval_to("prefix(\"selam\", \"se\")", "true");
    eval_to("suffix(\"selam\", \"am\")", "true");
    eval_to("repeat(\"ab\", 3)", "ababab");
    eval_to("any(\"selam\", \"xyzl\")", "true");
    eval_to("any(\"selam\", \"xyz\")", "false");
}

#[test]
fn test_numeric_conversions() {
    eval_to("int(2.9)", "2");
    eval_to("int(-2.9)", "-2");
    eval_to("int(\"7\")", "7");
    eval_to("round(2.5)", "3");
    eval_to("round(1.25, 1)", "1.3");
    eval_to("floor(2.9)", "2");
    eval_to("ceil(2.1)", "3");
    eval_to("num(\"1.5\")", "1.5");
    eval_to_error("num(\"bir\")");
}

#[test]
fn test_str_type_is_number() {
    eval_to("str(42)", "42");
    eval_to("str([1, 2])", "[1, 2]");
    eval_to("type(1)", "NUMBER");
    eval_to("type(\"x\")", "STRING");
    eval_to("type([])", "ARRAY");
    eval_to("type({})", "HASH");
    eval_to("type(null)", "NULL");
    eval_to("is_number(1)", "true");
    eval_to("is_number(\"1.5\")", "true");
    eval_to("is_number(\"x\")", "false");
}

#[test]
fn test_between() {
    eval_to("between(5, 1, 10)", "true");
    eval_to("between(0, 1, 10)", "false");
    eval_to_error("between(5, 10, 1)");
}

#[test]
fn test_json() {
    eval_to("json(\"{\\\"a\\\": [1, true]}\")", "{\"a\": [1, true]}");
    eval_to("json(\"[1, 2]\")[1]", "2");
    eval_to("json(\"42\")", "42");
    eval_to("json(\"\\\"x\\\"\")", "x");
    eval_to("json(\"null\")", "null");
    eval_to_error("json(\"{bozuk\")");
}

#[test]
fn test_fmt_and_echo_formatting() {
    eval_to("fmt(\"%s-%d\", \"a\", 42)", "a-42");
    let (_, output) = run("echo(\"x: %s\", 9)");
    assert_eq!(output, "x: 9\n");
    let (_, output) = run("echo()");
    assert_eq!(output, "\n");
}

#[test]
fn test_tsv() {
    eval_to("tsv([[1, 2], [3, 4]])", "1\t2\n3\t4");
    eval_to("tsv([[1, 2]], \",\")", "1,2");
    eval_to(
        "tsv([{\"a\": 1, \"b\": 2}, {\"b\": 3}])",
        "a\tb\n1\t2\nnull\t3",
    );
    eval_to_error("tsv([1, 2])");
}

#[test]
fn test_tsv_quotes_awkward_fields() {
    eval_to("tsv([[\"a,b\", \"c\"]], \",\")", "\"a,b\",c");
    // Carriage returns and leading whitespace force quoting.
    eval_to("tsv([[\"\\ra\", \"b\"]], \",\")", "\"\ra\",b");
    eval_to("tsv([[\" lead\", \"b\"]], \",\")", "\" lead\",b");
}

#[test]
fn test_env_roundtrip() {
    eval_to(
        "env(\"ANKA_TEST_DEGISKEN\", \"deger\"); env(\"ANKA_TEST_DEGISKEN\")",
        "deger",
    );
    eval_to("env(\"ANKA_OLMAYAN_DEGISKEN_X\")", "");
}

#[test]
fn test_call() {
    eval_to("call(f(x, y) { dön x + y }, [1, 2])", "3");
    eval_to("call(len, [[1, 2, 3]])", "3");
}

#[test]
fn test_eval() {
    eval_to("eval(\"1 + 2\")", "3");
    eval_to("a = 5; eval(\"a * 2\")", "10");
    eval_to_error("eval(\"eğer {\")");
}

#[test]
fn test_method_dispatch_respects_types() {
    eval_to("[3, 1].sort()", "[1, 3]");
    eval_to("\"a,b\".split(\",\")", "[\"a\", \"b\"]");
    eval_to("\"selam\".len()", "5");
    eval_to_error("\"selam\".sort()");
    eval_to_error("[1].upper()");
}

#[test]
fn test_method_chaining() {
    eval_to("\" a,b \".trim().split(\",\")", "[\"a\", \"b\"]");
    eval_to("[1, 2, 3].map(f(x) { dön x * 10 }).sum()", "60");
}

#[test]
fn test_arg_and_args() {
    // The test binary always has a zeroth host argument.
    let (result, _) = run("arg(0)");
    assert!(!result.inspect().is_empty());
    eval_to("arg(-1)", "");
    eval_to("arg(99999)", "");
    let (result, _) = run("len(args()) > 0");
    assert_eq!(result.inspect(), "true");
}

#[test]
fn test_rand() {
    eval_to("between(rand(10), 0, 9) || rand(10) == 0", "true");
    eval_to_error("rand(0)");
}

#[test]
fn test_wait_and_kill_on_plain_strings_are_noops() {
    eval_to("wait(\"s\")", "s");
    eval_to("kill(\"s\")", "s");
}

#[test]
fn test_unix_ms_is_a_number() {
    let (result, _) = run("unix_ms() > 0");
    assert_eq!(result.inspect(), "true");
}

#[test]
fn test_pwd() {
    let (result, _) = run("pwd()");
    assert!(!result.inspect().is_empty());
}
