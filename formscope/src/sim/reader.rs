//! S-expression reader with source positions.
//!
//! Lists and vectors carry their start and end line; symbols carry their
//! start line. `^:flag` and `^{:flag true}` attach boolean flags to the
//! next symbol or collection.

use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use formscope_common::{Form, FormRef, Meta, Seq, Symbol};

use crate::domain::ReadError;

type Result<T> = std::result::Result<T, ReadError>;

/// Read every top-level form in `source`.
///
/// # Errors
/// Returns [`ReadError`] on unbalanced delimiters, bad tokens or early end of input.
pub fn read_all(source: &str) -> Result<Vec<FormRef>> {
    let mut reader = Reader::new(source);
    let mut forms = Vec::new();
    loop {
        reader.skip_whitespace();
        if reader.peek().is_none() {
            return Ok(forms);
        }
        forms.push(reader.read_form()?);
    }
}

/// Read exactly one form.
///
/// # Errors
/// Returns [`ReadError`] if `source` holds no form or more than one.
pub fn read_one(source: &str) -> Result<FormRef> {
    let mut forms = read_all(source)?;
    match forms.len() {
        1 => Ok(forms.remove(0)),
        0 => Err(ReadError::UnexpectedEof { line: 1 }),
        _ => Err(ReadError::InvalidToken { token: forms[1].to_string(), line: 1 }),
    }
}

struct Reader<'a> {
    chars: Peekable<Chars<'a>>,
    line: u32,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | ',' | ';')
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), line: 1 }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                while let Some(c) = self.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() || c == ',' {
                self.next();
            } else {
                break;
            }
        }
    }

    fn read_token(&mut self, first: char) -> String {
        let mut token = String::from(first);
        while let Some(c) = self.peek() {
            if is_delimiter(c) {
                break;
            }
            token.push(c);
            self.next();
        }
        token
    }

    fn read_form(&mut self) -> Result<FormRef> {
        self.skip_whitespace();
        let line = self.line;
        let Some(c) = self.next() else {
            return Err(ReadError::UnexpectedEof { line });
        };

        match c {
            '(' => {
                let (items, end_line) = self.read_seq(')')?;
                Ok(Arc::new(Form::List(Seq { items, meta: span(line, end_line) })))
            }
            '[' => {
                let (items, end_line) = self.read_seq(']')?;
                Ok(Arc::new(Form::Vector(Seq { items, meta: span(line, end_line) })))
            }
            '{' => {
                let (items, _) = self.read_seq('}')?;
                map_from(items, line)
            }
            ')' | ']' | '}' => Err(ReadError::Unbalanced { delimiter: c, line }),
            '"' => self.read_string(line),
            '\'' => {
                let quoted = self.read_form()?;
                Ok(Form::list(vec![Form::symbol("quote"), quoted]))
            }
            '^' => self.read_with_meta(line),
            '#' => match self.next() {
                Some('{') => {
                    let (items, _) = self.read_seq('}')?;
                    Ok(Arc::new(Form::Set(items)))
                }
                Some('_') => {
                    self.read_form()?;
                    self.read_form()
                }
                other => Err(ReadError::InvalidToken {
                    token: format!("#{}", other.map(String::from).unwrap_or_default()),
                    line,
                }),
            },
            '\\' => {
                let Some(first) = self.next() else {
                    return Err(ReadError::UnexpectedEof { line });
                };
                let token = self.read_token(first);
                let ch = match token.as_str() {
                    "newline" => '\n',
                    "space" => ' ',
                    "tab" => '\t',
                    _ if token.chars().count() == 1 => first,
                    _ => return Err(ReadError::InvalidToken { token: format!("\\{token}"), line }),
                };
                Ok(Arc::new(Form::Char(ch)))
            }
            ':' => {
                let Some(first) = self.next().filter(|c| !is_delimiter(*c)) else {
                    return Err(ReadError::InvalidToken { token: ":".to_string(), line });
                };
                Ok(Form::keyword(self.read_token(first)))
            }
            _ => {
                let token = self.read_token(c);
                atom(&token, line)
            }
        }
    }

    fn read_seq(&mut self, close: char) -> Result<(Vec<FormRef>, u32)> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                None => return Err(ReadError::UnexpectedEof { line: self.line }),
                Some(c) if c == close => {
                    self.next();
                    return Ok((items, self.line));
                }
                Some(c @ (')' | ']' | '}')) => {
                    return Err(ReadError::Unbalanced { delimiter: c, line: self.line })
                }
                Some(_) => items.push(self.read_form()?),
            }
        }
    }

    fn read_string(&mut self, line: u32) -> Result<FormRef> {
        let mut text = String::new();
        loop {
            match self.next() {
                None => return Err(ReadError::UnexpectedEof { line }),
                Some('"') => return Ok(Form::string(text)),
                Some('\\') => match self.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c @ ('"' | '\\')) => text.push(c),
                    Some(c) => {
                        return Err(ReadError::InvalidToken { token: format!("\\{c}"), line: self.line })
                    }
                    None => return Err(ReadError::UnexpectedEof { line }),
                },
                Some(c) => text.push(c),
            }
        }
    }

    fn read_with_meta(&mut self, line: u32) -> Result<FormRef> {
        let meta = self.read_form()?;
        let flags: Vec<String> = match &*meta {
            Form::Keyword(k) => vec![k.clone()],
            Form::Map(entries) => entries
                .iter()
                .filter(|(_, v)| matches!(**v, Form::Bool(true)))
                .filter_map(|(k, _)| match &**k {
                    Form::Keyword(name) => Some(name.clone()),
                    _ => None,
                })
                .collect(),
            _ => return Err(ReadError::DanglingMetadata { line }),
        };

        let target = self.read_form()?;
        let with_flags = |meta: &Meta| {
            let mut meta = meta.clone();
            meta.flags.extend(flags.iter().cloned());
            meta
        };
        let form = match &*target {
            Form::Symbol(sym) => {
                let meta = with_flags(&sym.meta);
                Form::Symbol(sym.clone().with_meta(meta))
            }
            Form::List(seq) => Form::List(Seq { items: seq.items.clone(), meta: with_flags(&seq.meta) }),
            Form::Vector(seq) => {
                Form::Vector(Seq { items: seq.items.clone(), meta: with_flags(&seq.meta) })
            }
            _ => return Err(ReadError::DanglingMetadata { line }),
        };
        Ok(Arc::new(form))
    }
}

fn span(line: u32, end_line: u32) -> Meta {
    Meta { line: Some(line), end_line: Some(end_line), flags: Vec::new() }
}

fn map_from(items: Vec<FormRef>, line: u32) -> Result<FormRef> {
    if items.len() % 2 != 0 {
        return Err(ReadError::InvalidToken { token: "map with odd number of forms".to_string(), line });
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut iter = items.into_iter();
    while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        entries.push((k, v));
    }
    Ok(Arc::new(Form::Map(entries)))
}

fn atom(token: &str, line: u32) -> Result<FormRef> {
    match token {
        "nil" => return Ok(Arc::new(Form::Nil)),
        "true" => return Ok(Arc::new(Form::Bool(true))),
        "false" => return Ok(Arc::new(Form::Bool(false))),
        _ => {}
    }

    let numeric = token.starts_with(|c: char| c.is_ascii_digit())
        || (token.len() > 1
            && token.starts_with(['-', '+'])
            && token[1..].starts_with(|c: char| c.is_ascii_digit()));
    if numeric {
        if let Ok(i) = token.parse::<i64>() {
            return Ok(Form::int(i));
        }
        if let Ok(x) = token.parse::<f64>() {
            return Ok(Arc::new(Form::Float(x)));
        }
        return Err(ReadError::InvalidToken { token: token.to_string(), line });
    }

    let symbol = match token.split_once('/') {
        Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Symbol::qualified(ns, name),
        _ => Symbol::new(token),
    };
    Ok(Arc::new(Form::Symbol(symbol.with_meta(Meta::at_line(line)))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_positions() {
        let form = read_one("\n(defn f\n  [x]\n  x)").unwrap();
        let meta = form.meta().unwrap();
        assert_eq!(meta.line, Some(2));
        assert_eq!(meta.end_line, Some(4));
        assert_eq!(form.nth(1).unwrap().meta().unwrap().line, Some(2));
    }

    #[test]
    fn test_round_trip_display() {
        let source = r#"(defn f [x] (str "hi" :k 1 2.5 nil true \a))"#;
        assert_eq!(read_one(source).unwrap().to_string(), source);
    }

    #[test]
    fn test_const_flag() {
        let form = read_one("(def ^:const limit 10)").unwrap();
        let name = form.nth(1).unwrap().as_symbol().unwrap();
        assert_eq!(name.name, "limit");
        assert!(name.meta.has_flag("const"));
    }

    #[test]
    fn test_map_metadata_flags() {
        let form = read_one("(def ^{:private true :dynamic false} x 1)").unwrap();
        let meta = &form.nth(1).unwrap().as_symbol().unwrap().meta;
        assert!(meta.has_flag("private"));
        assert!(!meta.has_flag("dynamic"));
    }

    #[test]
    fn test_qualified_symbol() {
        let form = read_one("lib.core/helper").unwrap();
        let sym = form.as_symbol().unwrap();
        assert_eq!(sym.namespace.as_deref(), Some("lib.core"));
        assert_eq!(sym.name, "helper");

        let slash = read_one("/").unwrap();
        assert_eq!(slash.as_symbol().unwrap().name, "/");
    }

    #[test]
    fn test_comments_and_quote() {
        let forms = read_all("; header\n'(a b) ; trailing\n#_ignored [1]").unwrap();
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].to_string(), "(quote (a b))");
    }

    #[test]
    fn test_errors() {
        assert_eq!(read_all("(a b"), Err(ReadError::UnexpectedEof { line: 1 }));
        assert_eq!(read_all("(a]"), Err(ReadError::Unbalanced { delimiter: ']', line: 1 }));
        assert_eq!(read_all(")"), Err(ReadError::Unbalanced { delimiter: ')', line: 1 }));
        assert_eq!(read_all("^:const 1"), Err(ReadError::DanglingMetadata { line: 1 }));
    }

    #[test]
    fn test_negative_numbers_and_minus_symbol() {
        let form = read_one("(- -3 x)").unwrap();
        assert_eq!(form.nth(1).unwrap().as_ref(), &Form::Int(-3));
        assert_eq!(form.nth(0).unwrap().as_symbol().unwrap().name, "-");
    }
}
