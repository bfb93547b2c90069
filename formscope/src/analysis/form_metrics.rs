//! Size and nesting of a form tree.

use serde::Serialize;

use formscope_common::Form;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FormMetrics {
    /// Every node in the tree, collections and atoms alike
    pub expressions: usize,
    /// Collection nesting depth; an atom is 0, `()` is 1
    pub depth: usize,
}

#[must_use]
pub fn measure(form: &Form) -> FormMetrics {
    FormMetrics { expressions: expression_count(form), depth: max_depth(form) }
}

#[must_use]
pub fn expression_count(form: &Form) -> usize {
    1 + form.children().into_iter().map(|child| expression_count(child)).sum::<usize>()
}

#[must_use]
pub fn max_depth(form: &Form) -> usize {
    let is_collection = matches!(form, Form::List(_) | Form::Vector(_) | Form::Map(_) | Form::Set(_));
    if !is_collection {
        return 0;
    }
    1 + form.children().into_iter().map(|child| max_depth(child)).max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::read_one;

    #[test]
    fn test_atom() {
        let form = read_one("x").unwrap();
        assert_eq!(measure(&form), FormMetrics { expressions: 1, depth: 0 });
    }

    #[test]
    fn test_nested() {
        let form = read_one("(defn f [x] (inc x))").unwrap();
        // defn f [x] x (inc x) inc x + outer list
        assert_eq!(expression_count(&form), 8);
        assert_eq!(max_depth(&form), 2);
    }

    #[test]
    fn test_empty_collection() {
        assert_eq!(max_depth(&read_one("()").unwrap()), 1);
        assert_eq!(expression_count(&read_one("{:a 1}").unwrap()), 3);
    }
}
