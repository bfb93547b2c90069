//! Unit names embedded in constant-pool class entries.

/// Unit named by a class entry or member owner.
///
/// Array descriptors (`[[Lapp/Foo;`) yield their element type; primitive
/// arrays (`[I`) name no unit.
#[must_use]
pub fn referenced_unit(name: &str) -> Option<&str> {
    let element = name.trim_start_matches('[');
    if element.len() == name.len() {
        return (!name.is_empty()).then_some(name);
    }
    element
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .filter(|inner| !inner.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(referenced_unit("clojure/lang/Var"), Some("clojure/lang/Var"));
        assert_eq!(referenced_unit(""), None);
    }

    #[test]
    fn test_array_element_types() {
        assert_eq!(referenced_unit("[Ljava/lang/Object;"), Some("java/lang/Object"));
        assert_eq!(referenced_unit("[[Lapp/core$f;"), Some("app/core$f"));
        assert_eq!(referenced_unit("[I"), None);
        assert_eq!(referenced_unit("[[J"), None);
    }
}
