//! Nested-scope name lookup.

use std::collections::HashMap;

use crate::types::Type;

/// Fully qualified candidates for `name` written inside `scope`, innermost
/// first.
///
/// `scope` is a leading-dot path such as `.pkg.Outer` (or empty for the
/// root). A name written with a leading dot has exactly one candidate.
pub fn candidates(name: &str, scope: &str) -> Vec<String> {
    if name.starts_with('.') {
        return vec![name.to_string()];
    }
    let mut out = Vec::new();
    let mut prefix = scope;
    loop {
        out.push(format!("{}.{}", prefix, name));
        match prefix.rfind('.') {
            Some(pos) => prefix = &prefix[..pos],
            None => break,
        }
    }
    out
}

/// The first candidate for `name` in `scope` that `exists` accepts.
pub fn resolve_with(name: &str, scope: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    candidates(name, scope).into_iter().find(|c| exists(c))
}

/// Resolve against a type registry.
pub fn resolve(name: &str, scope: &str, types: &HashMap<String, Type>) -> Option<String> {
    resolve_with(name, scope, |c| types.contains_key(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_candidates_innermost_first() {
        assert_eq!(
            candidates("Foo", ".pkg.Outer.Inner"),
            vec![".pkg.Outer.Inner.Foo", ".pkg.Outer.Foo", ".pkg.Foo", ".Foo"]
        );
        assert_eq!(candidates("a.B", ""), vec![".a.B"]);
        assert_eq!(candidates(".x.Y", ".pkg"), vec![".x.Y"]);
    }

    #[test]
    fn test_nearest_scope_wins() {
        let known = [".pkg.Foo", ".pkg.Outer.Foo", ".Foo"];
        let exists = |c: &str| known.contains(&c);
        assert_eq!(
            resolve_with("Foo", ".pkg.Outer.Inner", exists).as_deref(),
            Some(".pkg.Outer.Foo")
        );
        assert_eq!(resolve_with("Foo", ".other", exists).as_deref(), Some(".Foo"));
        assert_eq!(resolve_with("Bar", ".pkg", exists), None);
    }
}
