use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use crate::environment::Env;
use crate::object::Object;

/// Substitutes `$name` / `${name}` with the inspected value of `name`
/// in the environment, or the empty string when unbound. `\$name` is a
/// literal `$name`; an unterminated `${name` stays as-is. Identifier
/// characters are `[a-zA-Z_0-9]`.
pub fn interpolate_string_vars(input: &str, env: &Env) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '\\' && i + 1 < chars.len() && chars[i + 1] == '$' {
            if let Some((_, end)) = scan_var(&chars, i + 1) {
                // Escaped: emit the variable reference verbatim, minus
                // the backslash.
                for &ch in &chars[i + 1..end] {
                    out.push(ch);
                }
                i = end;
                continue;
            }
            out.push(c);
            i += 1;
            continue;
        }

        if c == '$' {
            if let Some((name, end)) = scan_var(&chars, i) {
                match env.borrow().get(&name) {
                    Some(value) => out.push_str(&value.inspect()),
                    None => {}
                }
                i = end;
                continue;
            }
        }

        out.push(c);
        i += 1;
    }

    out
}

/// Parses a variable reference starting at `start` (which must point at
/// `$`). Returns the variable name and the index one past the match.
fn scan_var(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let braced = chars.get(i) == Some(&'{');
    if braced {
        i += 1;
    }

    let name_start = i;
    while i < chars.len() && is_var_char(chars[i]) {
        i += 1;
    }
    if i == name_start {
        return None;
    }

    let name: String = chars[name_start..i].iter().collect();
    if braced {
        if chars.get(i) == Some(&'}') {
            return Some((name, i + 1));
        }
        return None;
    }
    Some((name, i))
}

fn is_var_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

pub fn is_number(s: &str) -> bool {
    s.parse::<f64>().is_ok()
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches(MAIN_SEPARATOR).trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

/// Reads a configuration value: an interpreter binding wins over the
/// process environment, which wins over the default.
pub fn get_env_var(env: &Env, name: &str, default: &str) -> String {
    if let Some(value) = env.borrow().get(name) {
        return value.inspect();
    }
    match env::var(name) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Resolves the first path segment through the package alias map, then
/// appends `index.ank` to extension-less paths.
pub fn unalias_path(path: &str, aliases: &HashMap<String, String>) -> PathBuf {
    let mut parts = path.split(['/', MAIN_SEPARATOR]);
    let resolved = match parts.next() {
        Some(first) => match aliases.get(first) {
            Some(target) => {
                let mut p = PathBuf::from(target);
                for part in parts {
                    p.push(part);
                }
                p
            }
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    };
    append_index_file(resolved)
}

fn append_index_file(path: PathBuf) -> PathBuf {
    if path.extension().map(|e| e == "ank").unwrap_or(false) {
        path
    } else {
        path.join("index.ank")
    }
}

/// The external command executor, split into program + fixed args. The
/// command string is appended as the final argument.
pub fn command_executor() -> Vec<String> {
    let default = if cfg!(windows) { "cmd.exe /C" } else { "bash -c" };
    let executor = match env::var("ANK_COMMAND_EXECUTOR") {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    };
    executor.split(' ').map(|s| s.to_string()).collect()
}

/// Bundled standard-library assets are an external collaborator: when
/// `ANK_STDLIB_DIR` points somewhere, `@`-paths resolve inside it;
/// otherwise the asset is reported unavailable.
pub fn stdlib_asset(name: &Path) -> Result<String, String> {
    match env::var("ANK_STDLIB_DIR") {
        Ok(dir) if !dir.is_empty() => {
            let path = PathBuf::from(dir).join(name);
            std::fs::read_to_string(&path)
                .map_err(|err| format!("{}: {}", path.display(), err))
        }
        _ => Err(format!(
            "standard library asset '{}' is not available (ANK_STDLIB_DIR is not set)",
            name.display()
        )),
    }
}

/// Go-style percent formatting over inspect strings: `%s`, `%v`, `%d`,
/// `%f` and `%%`. Directives beyond the argument list stay literal.
pub fn sprintf(format: &str, args: &[Object]) -> String {
    let mut out = String::new();
    let mut arg_index = 0;
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(spec @ ('s' | 'v' | 'd' | 'f')) => match args.get(arg_index) {
                Some(arg) => {
                    arg_index += 1;
                    match (spec, arg) {
                        ('d', Object::Number(n)) => out.push_str(&format!("{}", *n as i64)),
                        ('f', Object::Number(n)) => out.push_str(&format!("{}", n)),
                        _ => out.push_str(&arg.inspect()),
                    }
                }
                None => {
                    out.push('%');
                    out.push(spec);
                }
            },
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    out
}

/// Capitalizes the first letter of every word.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = !c.is_alphanumeric();
    }
    out
}

pub fn unique_strings(list: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in list {
        if seen.insert(item.clone()) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{Environment, Writer};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn env_with(name: &str, value: &str) -> Env {
        let writer: Writer = Rc::new(RefCell::new(Vec::<u8>::new()));
        let env = Environment::new(writer, PathBuf::from("."), "0.1.0");
        env.borrow_mut().set(name, Object::Str(value.to_string()));
        env
    }

    #[test]
    fn test_interpolation() {
        let env = env_with("ad", "dünya");
        assert_eq!(interpolate_string_vars("selam $ad!", &env), "selam dünya!");
        assert_eq!(interpolate_string_vars("selam ${ad}!", &env), "selam dünya!");
        assert_eq!(interpolate_string_vars("selam $yok!", &env), "selam !");
        assert_eq!(interpolate_string_vars(r"selam \$ad!", &env), "selam $ad!");
        assert_eq!(interpolate_string_vars("fiyat: 5$", &env), "fiyat: 5$");
        assert_eq!(interpolate_string_vars("açık ${ad", &env), "açık ${ad");
    }

    #[test]
    fn test_sprintf() {
        let args = vec![Object::Str("dünya".into()), Object::Number(42.9)];
        assert_eq!(sprintf("selam %s: %d", &args), "selam dünya: 42");
        assert_eq!(sprintf("yüzde %%", &[]), "yüzde %");
        assert_eq!(sprintf("eksik %s", &[]), "eksik %s");
    }

    #[test]
    fn test_unalias_path() {
        let mut aliases = HashMap::new();
        aliases.insert("paket".to_string(), "/tmp/paketler/paket".to_string());
        assert_eq!(
            unalias_path("paket/alt", &aliases),
            PathBuf::from("/tmp/paketler/paket/alt/index.ank")
        );
        assert_eq!(
            unalias_path("yerel/dosya.ank", &aliases),
            PathBuf::from("yerel/dosya.ank")
        );
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("merhaba güzel dünya"), "Merhaba Güzel Dünya");
    }
}
