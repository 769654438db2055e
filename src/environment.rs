use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::rc::Rc;

use crate::object::Object;

pub type Env = Rc<RefCell<Environment>>;
pub type Writer = Rc<RefCell<dyn Write>>;

/// Lexically nested name bindings. Lookup walks outward; writes always
/// land in the current frame. Each environment also points at the output
/// sink, the working directory module loading resolves against, and the
/// interpreter version.
pub struct Environment {
    store: HashMap<String, Object>,
    outer: Option<Env>,
    /// The argument vector of the innermost enclosing call, exposed to
    /// function bodies through the `...` literal.
    pub current_args: Vec<Object>,
    pub writer: Writer,
    pub dir: PathBuf,
    pub version: String,
}

impl Environment {
    pub fn new(writer: Writer, dir: PathBuf, version: &str) -> Env {
        let env = Environment {
            store: HashMap::new(),
            outer: None,
            current_args: Vec::new(),
            writer,
            dir,
            version: version.to_string(),
        };
        let env = Rc::new(RefCell::new(env));
        env.borrow_mut()
            .set("ANK_VERSION", Object::Str(version.to_string()));
        env
    }

    /// A child environment for a function invocation, carrying the
    /// caller-supplied argument vector.
    pub fn new_enclosed(outer: &Env, args: Vec<Object>) -> Env {
        let (writer, dir, version) = {
            let outer_ref = outer.borrow();
            (
                outer_ref.writer.clone(),
                outer_ref.dir.clone(),
                outer_ref.version.clone(),
            )
        };
        let env = Environment::new(writer, dir, &version);
        env.borrow_mut().outer = Some(outer.clone());
        env.borrow_mut().current_args = args;
        env
    }

    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(value) = self.store.get(name) {
            return Some(value.clone());
        }
        match &self.outer {
            Some(outer) => outer.borrow().get(name),
            None => None,
        }
    }

    /// Like `get`, but only consults the current frame.
    pub fn get_local(&self, name: &str) -> Option<Object> {
        self.store.get(name).cloned()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Object) {
        self.store.insert(name.into(), value);
    }

    pub fn delete(&mut self, name: &str) {
        self.store.remove(name);
    }

    /// Sorted own keys of the current frame.
    pub fn get_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.store.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("store", &self.store.keys())
            .field("has_outer", &self.outer.is_some())
            .field("dir", &self.dir)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_env() -> Env {
        let writer: Writer = Rc::new(RefCell::new(Vec::<u8>::new()));
        Environment::new(writer, PathBuf::from("."), "0.1.0")
    }

    #[test]
    fn test_version_preset() {
        let env = test_env();
        let version = env.borrow().get("ANK_VERSION").unwrap();
        assert_eq!(version.inspect(), "0.1.0");
    }

    #[test]
    fn test_lookup_walks_outward() {
        let outer = test_env();
        outer.borrow_mut().set("a", Object::Number(1.0));
        let inner = Environment::new_enclosed(&outer, Vec::new());
        assert_eq!(inner.borrow().get("a").unwrap().inspect(), "1");
        assert!(inner.borrow().get_local("a").is_none());
    }

    #[test]
    fn test_writes_are_local() {
        let outer = test_env();
        outer.borrow_mut().set("a", Object::Number(1.0));
        let inner = Environment::new_enclosed(&outer, Vec::new());
        inner.borrow_mut().set("a", Object::Number(2.0));
        assert_eq!(outer.borrow().get("a").unwrap().inspect(), "1");
        assert_eq!(inner.borrow().get("a").unwrap().inspect(), "2");
    }

    #[test]
    fn test_get_keys_sorted() {
        let env = test_env();
        env.borrow_mut().set("b", Object::Null);
        env.borrow_mut().set("a", Object::Null);
        assert_eq!(env.borrow().get_keys(), vec!["ANK_VERSION", "a", "b"]);
    }
}
