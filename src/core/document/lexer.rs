//! Lexical pass over a document: comment/string regions and delimiter pairs.
//!
//! Braces and parentheses are paired with an explicit stack so that nested
//! bodies (dictionaries inside dictionaries, lists inside bodies) resolve to
//! the correct closing delimiter. Delimiters inside comments and quoted
//! strings are not structural.

use serde::Serialize;
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delimiter {
    Brace,
    Paren,
}

/// A matched open/close delimiter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub kind: Delimiter,
    pub open: usize,
    pub close: usize,
    /// Open offset of the innermost pair enclosing this one.
    pub parent: Option<usize>,
}

impl Pair {
    /// Byte range from the opening to the closing delimiter, inclusive.
    pub fn span(&self) -> Range<usize> {
        self.open..self.close + 1
    }

    fn contains(&self, offset: usize) -> bool {
        self.open < offset && offset < self.close
    }
}

/// Signed open-minus-close counts for each delimiter kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DelimiterBalance {
    pub braces: i64,
    pub parens: i64,
}

impl DelimiterBalance {
    pub fn is_balanced(&self) -> bool {
        self.braces == 0 && self.parens == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Structure {
    opaque: Vec<Range<usize>>,
    pairs: BTreeMap<usize, Pair>,
    balance: DelimiterBalance,
}

impl Structure {
    pub fn scan(text: &str) -> Self {
        let bytes = text.as_bytes();
        let len = bytes.len();
        let mut structure = Structure::default();
        let mut stack: Vec<(Delimiter, usize)> = Vec::new();
        let mut i = 0;

        while i < len {
            match bytes[i] {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    let end = text[i + 2..]
                        .find("*/")
                        .map(|p| i + 2 + p + 2)
                        .unwrap_or(len);
                    structure.opaque.push(i..end);
                    i = end;
                }
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    let end = text[i..].find('\n').map(|p| i + p).unwrap_or(len);
                    structure.opaque.push(i..end);
                    i = end;
                }
                b'"' => {
                    let mut j = i + 1;
                    while j < len {
                        match bytes[j] {
                            b'\\' => j += 2,
                            b'"' => {
                                j += 1;
                                break;
                            }
                            _ => j += 1,
                        }
                    }
                    let end = j.min(len);
                    structure.opaque.push(i..end);
                    i = end;
                }
                b'{' | b'(' => {
                    let kind = if bytes[i] == b'{' {
                        structure.balance.braces += 1;
                        Delimiter::Brace
                    } else {
                        structure.balance.parens += 1;
                        Delimiter::Paren
                    };
                    stack.push((kind, i));
                    i += 1;
                }
                b'}' | b')' => {
                    let kind = if bytes[i] == b'}' {
                        structure.balance.braces -= 1;
                        Delimiter::Brace
                    } else {
                        structure.balance.parens -= 1;
                        Delimiter::Paren
                    };
                    // A mismatched closer is left unpaired; the balance counts report it.
                    if stack.last().is_some_and(|(top, _)| *top == kind) {
                        if let Some((_, open)) = stack.pop() {
                            let parent = stack.last().map(|(_, o)| *o);
                            structure.pairs.insert(
                                open,
                                Pair {
                                    kind,
                                    open,
                                    close: i,
                                    parent,
                                },
                            );
                        }
                    }
                    i += 1;
                }
                _ => i += 1,
            }
        }

        structure
    }

    /// Whether `offset` falls inside a comment or quoted string.
    pub fn is_opaque(&self, offset: usize) -> bool {
        let idx = self.opaque.partition_point(|r| r.start <= offset);
        idx > 0 && self.opaque[idx - 1].contains(&offset)
    }

    pub fn pair_at(&self, open: usize) -> Option<&Pair> {
        self.pairs.get(&open)
    }

    /// Innermost pair of `kind` strictly enclosing `offset`.
    pub fn enclosing(&self, offset: usize, kind: Delimiter) -> Option<&Pair> {
        self.pairs
            .range(..offset)
            .rev()
            .map(|(_, pair)| pair)
            .find(|pair| pair.kind == kind && pair.contains(offset))
    }

    pub fn balance(&self) -> DelimiterBalance {
        self.balance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_braces_pair_with_their_own_closer() {
        let text = "a = { b = { c = 1; }; d = (x, y); };";
        let structure = Structure::scan(text);

        let outer = structure.pair_at(4).unwrap();
        assert_eq!(outer.close, text.len() - 2);
        assert_eq!(outer.parent, None);

        let inner = structure.pair_at(10).unwrap();
        assert_eq!(&text[inner.span()], "{ c = 1; }");
        assert_eq!(inner.parent, Some(4));
    }

    #[test]
    fn delimiters_in_comments_and_strings_are_ignored() {
        let text = "x = { name = \"a { b\"; /* ( */ };\n// }\n";
        let structure = Structure::scan(text);
        assert!(structure.balance().is_balanced());
        assert!(structure.is_opaque(text.find("a {").unwrap()));
        assert!(!structure.is_opaque(text.find("name").unwrap()));
    }

    #[test]
    fn escaped_quote_does_not_end_string() {
        let text = r#"k = "say \"hi\" {"; }"#;
        let structure = Structure::scan(text);
        assert_eq!(structure.balance(), DelimiterBalance { braces: -1, parens: 0 });
    }

    #[test]
    fn extra_open_brace_counts_one() {
        let structure = Structure::scan("{ { }");
        assert_eq!(structure.balance().braces, 1);
        assert_eq!(structure.balance().parens, 0);
    }

    #[test]
    fn enclosing_finds_innermost_list() {
        let text = "g = { children = ( A, B ); };";
        let structure = Structure::scan(text);
        let offset = text.find('B').unwrap();

        let list = structure.enclosing(offset, Delimiter::Paren).unwrap();
        assert_eq!(&text[list.span()], "( A, B )");

        let body = structure.enclosing(offset, Delimiter::Brace).unwrap();
        assert_eq!(body.open, 4);
    }
}
