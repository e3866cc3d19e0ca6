//! Minimal structural reader over an ID-keyed project document.
//!
//! Indexes every identifier token with its byte offset, whether it is a
//! definition header (`ID /* label */ = { ... };`) or a reference, the label
//! comment next to it, the object that owns it, and the field it sits in.
//! No parse tree is built; anything else in the text is left alone.

mod lexer;

pub use lexer::{Delimiter, DelimiterBalance};

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use crate::config::RepairConfig;
use crate::error::{Error, Result};
use crate::identifier::{IdFormat, ObjectId};
use lexer::Structure;

/// Token shape plus the key of the object table.
#[derive(Debug, Clone)]
pub struct Dialect {
    format: IdFormat,
    object_table_key: String,
    table_pattern: Regex,
}

impl Dialect {
    pub fn new(format: IdFormat, object_table_key: &str) -> Result<Self> {
        let table_pattern = Regex::new(&format!(r"\b{}\s*=\s*\{{", regex::escape(object_table_key)))
            .map_err(|e| {
                Error::config_invalid_value(
                    "object_table_key",
                    Some(object_table_key.to_string()),
                    e.to_string(),
                )
            })?;

        Ok(Self {
            format,
            object_table_key: object_table_key.to_string(),
            table_pattern,
        })
    }

    pub fn from_config(config: &RepairConfig) -> Result<Self> {
        Self::new(
            IdFormat::from_config(&config.identifier)?,
            &config.object_table_key,
        )
    }

    pub fn format(&self) -> &IdFormat {
        &self.format
    }

    pub fn object_table_key(&self) -> &str {
        &self.object_table_key
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceKind {
    Definition,
    Reference,
}

/// One appearance of an identifier token in structural text.
#[derive(Debug, Clone, Serialize)]
pub struct Occurrence {
    pub id: ObjectId,
    pub offset: usize,
    pub kind: OccurrenceKind,
    /// Trimmed text of the `/* ... */` comment directly after the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Innermost object definition containing a reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ObjectId>,
    /// Key of the field or list holding a reference (`children`, `fileRef`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// For definitions: byte range from the token to the closing brace.
    #[serde(skip)]
    pub body: Option<Range<usize>>,
}

impl Occurrence {
    pub fn is_definition(&self) -> bool {
        self.kind == OccurrenceKind::Definition
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label.as_deref() == Some(label)
    }
}

/// An ordered list field, e.g. `children = ( ... );`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub range: Range<usize>,
}

/// An indexed snapshot of document text.
#[derive(Debug, Clone)]
pub struct Document {
    text: String,
    dialect: Dialect,
    structure: Structure,
    occurrences: Vec<Occurrence>,
    by_id: BTreeMap<ObjectId, Vec<usize>>,
    all_tokens: HashSet<ObjectId>,
    object_table: Option<usize>,
}

impl Document {
    /// Index `text`. Any input is accepted; problems surface in validation.
    pub fn load(text: impl Into<String>, dialect: &Dialect) -> Self {
        let text = text.into();
        let structure = Structure::scan(&text);
        let object_table = find_object_table(&text, dialect, &structure);

        let mut document = Document {
            text,
            dialect: dialect.clone(),
            structure,
            occurrences: Vec::new(),
            by_id: BTreeMap::new(),
            all_tokens: HashSet::new(),
            object_table,
        };
        document.index();
        document
    }

    /// Re-index new text under the same dialect.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self::load(text, &self.dialect)
    }

    fn index(&mut self) {
        let pattern = self.dialect.format.pattern().clone();
        let mut occurrences = Vec::new();

        for m in pattern.find_iter(&self.text) {
            let id = ObjectId::new_unchecked(m.as_str());
            self.all_tokens.insert(id.clone());

            if self.structure.is_opaque(m.start()) {
                continue;
            }

            let (label, after_label) = label_after(&self.text, m.end());
            let header_brace = header_brace_at(&self.text, after_label);

            let is_definition = header_brace.is_some_and(|brace| match self.object_table {
                Some(table) => self
                    .structure
                    .pair_at(brace)
                    .is_some_and(|pair| pair.parent == Some(table)),
                None => true,
            });

            let body = header_brace
                .filter(|_| is_definition)
                .and_then(|brace| self.structure.pair_at(brace))
                .map(|pair| m.start()..pair.close + 1);

            occurrences.push(Occurrence {
                id,
                offset: m.start(),
                kind: if is_definition {
                    OccurrenceKind::Definition
                } else {
                    OccurrenceKind::Reference
                },
                label,
                owner: None,
                field: None,
                body,
            });
        }

        let mut definitions: Vec<(Range<usize>, ObjectId)> = occurrences
            .iter()
            .filter_map(|o| o.body.clone().map(|b| (b, o.id.clone())))
            .collect();
        definitions.sort_by_key(|(range, _)| range.start);

        for occurrence in occurrences.iter_mut() {
            if occurrence.is_definition() {
                continue;
            }
            occurrence.owner = owner_at(&definitions, occurrence.offset);
            occurrence.field = self.field_at(occurrence.offset);
        }

        for (idx, occurrence) in occurrences.iter().enumerate() {
            self.by_id
                .entry(occurrence.id.clone())
                .or_default()
                .push(idx);
        }
        self.occurrences = occurrences;
    }

    /// Key whose value holds the token at `offset`: the list key for list
    /// members, otherwise the key of the `key = TOKEN` assignment.
    fn field_at(&self, offset: usize) -> Option<String> {
        if let Some(list) = self.structure.enclosing(offset, Delimiter::Paren) {
            let inside_body = self
                .structure
                .enclosing(offset, Delimiter::Brace)
                .is_none_or(|brace| brace.open < list.open);
            if inside_body {
                return key_before(&self.text, list.open);
            }
        }
        key_before(&self.text, offset)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    pub fn format(&self) -> &IdFormat {
        &self.dialect.format
    }

    /// Every structural occurrence, in document order.
    pub fn occurrences(&self) -> &[Occurrence] {
        &self.occurrences
    }

    /// Distinct identifiers with structural occurrences, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.by_id.keys()
    }

    /// Occurrence records for `id`, in document order.
    pub fn occurrence_records(&self, id: &ObjectId) -> Vec<&Occurrence> {
        self.by_id
            .get(id)
            .map(|idxs| idxs.iter().map(|&i| &self.occurrences[i]).collect())
            .unwrap_or_default()
    }

    /// Byte offsets of every occurrence of `id`, in document order.
    pub fn occurrences_of(&self, id: &ObjectId) -> Vec<usize> {
        self.occurrence_records(id)
            .into_iter()
            .map(|o| o.offset)
            .collect()
    }

    pub fn occurrence_count(&self, id: &ObjectId) -> usize {
        self.by_id.get(id).map_or(0, Vec::len)
    }

    pub fn definitions_of(&self, id: &ObjectId) -> Vec<&Occurrence> {
        self.occurrence_records(id)
            .into_iter()
            .filter(|o| o.is_definition())
            .collect()
    }

    /// Range from the first definition header of `id` to its matching `}`.
    pub fn definition_body_of(&self, id: &ObjectId) -> Option<Range<usize>> {
        self.definitions_of(id)
            .into_iter()
            .find_map(|o| o.body.clone())
    }

    /// The innermost `( ... )` list containing the first listed reference to `id`.
    pub fn children_list_containing(&self, id: &ObjectId) -> Option<ListSite> {
        self.occurrence_records(id)
            .into_iter()
            .filter(|o| !o.is_definition())
            .find_map(|o| self.structure.enclosing(o.offset, Delimiter::Paren))
            .map(|pair| ListSite {
                field: key_before(&self.text, pair.open),
                range: pair.span(),
            })
    }

    /// Innermost object definition whose body contains `offset`.
    pub fn owner_of(&self, offset: usize) -> Option<ObjectId> {
        self.occurrences
            .iter()
            .filter_map(|o| o.body.as_ref().map(|b| (b, &o.id)))
            .filter(|(body, _)| body.start < offset && offset < body.end)
            .max_by_key(|(body, _)| body.start)
            .map(|(_, id)| id.clone())
    }

    /// Distinct labels attached to `id`, with counts, in order of first appearance.
    pub fn labels_of(&self, id: &ObjectId) -> Vec<(String, usize)> {
        let mut labels: Vec<(String, usize)> = Vec::new();
        for occurrence in self.occurrence_records(id) {
            let Some(label) = &occurrence.label else {
                continue;
            };
            match labels.iter_mut().find(|(l, _)| l == label) {
                Some((_, count)) => *count += 1,
                None => labels.push((label.clone(), 1)),
            }
        }
        labels
    }

    /// Every token of identifier shape anywhere in the text, including
    /// comments and strings.
    pub fn all_tokens(&self) -> &HashSet<ObjectId> {
        &self.all_tokens
    }

    pub fn has_object_table(&self) -> bool {
        self.object_table.is_some()
    }

    /// Whether both `/* Begin NAME section */` and `/* End NAME section */` exist.
    pub fn has_section(&self, name: &str) -> bool {
        self.text.contains(&format!("/* Begin {} section */", name))
            && self.text.contains(&format!("/* End {} section */", name))
    }

    pub fn delimiter_balance(&self) -> DelimiterBalance {
        self.structure.balance()
    }
}

fn find_object_table(text: &str, dialect: &Dialect, structure: &Structure) -> Option<usize> {
    dialect
        .table_pattern
        .find_iter(text)
        .find(|m| !structure.is_opaque(m.start()))
        .map(|m| m.end() - 1)
}

fn skip_inline_space(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && (bytes[pos] == b' ' || bytes[pos] == b'\t') {
        pos += 1;
    }
    pos
}

fn skip_space(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

/// Read a `/* label */` comment starting after inline whitespace at `pos`.
/// Returns the label and the offset just past the comment (or `pos` when none).
fn label_after(text: &str, pos: usize) -> (Option<String>, usize) {
    let start = skip_inline_space(text, pos);
    if !text[start..].starts_with("/*") {
        return (None, pos);
    }
    match text[start + 2..].find("*/") {
        Some(rel) => {
            let label = text[start + 2..start + 2 + rel].trim().to_string();
            (Some(label), start + 2 + rel + 2)
        }
        None => (None, pos),
    }
}

/// If `= {` follows `pos`, return the offset of the brace.
fn header_brace_at(text: &str, pos: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let eq = skip_space(text, pos);
    if bytes.get(eq) != Some(&b'=') {
        return None;
    }
    let brace = skip_space(text, eq + 1);
    (bytes.get(brace) == Some(&b'{')).then_some(brace)
}

/// Read the `key` of a `key = ` assignment ending right before `pos`.
fn key_before(text: &str, pos: usize) -> Option<String> {
    let bytes = text.as_bytes();
    let mut end = pos;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end == 0 || bytes[end - 1] != b'=' {
        return None;
    }
    end -= 1;
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && (bytes[start - 1].is_ascii_alphanumeric() || bytes[start - 1] == b'_') {
        start -= 1;
    }
    (start < end).then(|| text[start..end].to_string())
}

fn owner_at(definitions: &[(Range<usize>, ObjectId)], offset: usize) -> Option<ObjectId> {
    let idx = definitions.partition_point(|(range, _)| range.start < offset);
    definitions[..idx]
        .iter()
        .rev()
        .find(|(range, _)| offset < range.end)
        .map(|(_, id)| id.clone())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::RepairConfig;

    pub(crate) fn dialect() -> Dialect {
        Dialect::from_config(&RepairConfig::default()).unwrap()
    }

    pub(crate) const GROUP: &str = "A1000001000000000000001A";
    pub(crate) const ROOT: &str = "B2000000000000000000000B";
    pub(crate) const FILE: &str = "C3000000000000000000000C";

    fn sample() -> String {
        format!(
            "// !$*UTF8*$!\n{{\n\tobjects = {{\n\n\
/* Begin PBXGroup section */\n\
\t\t{ROOT} = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\t{GROUP} /* Core */,\n\t\t\t);\n\t\t\tsourceTree = \"<group>\";\n\t\t}};\n\
\t\t{GROUP} /* Core */ = {{\n\t\t\tisa = PBXGroup;\n\t\t\tchildren = (\n\t\t\t\t{FILE} /* App.swift */,\n\t\t\t);\n\t\t\tname = Core;\n\t\t}};\n\
/* End PBXGroup section */\n\
\t\t{FILE} /* App.swift */ = {{isa = PBXFileReference; path = App.swift; }};\n\
\t}};\n\trootObject = {ROOT} /* Project object */;\n}}\n"
        )
    }

    fn id(token: &str) -> ObjectId {
        ObjectId::new_unchecked(token)
    }

    #[test]
    fn load_classifies_definitions_and_references() {
        let doc = Document::load(sample(), &dialect());

        let group = doc.occurrence_records(&id(GROUP));
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].kind, OccurrenceKind::Reference);
        assert_eq!(group[0].owner, Some(id(ROOT)));
        assert_eq!(group[0].field.as_deref(), Some("children"));
        assert_eq!(group[1].kind, OccurrenceKind::Definition);
        assert_eq!(group[1].label.as_deref(), Some("Core"));

        let root = doc.occurrence_records(&id(ROOT));
        assert_eq!(root.len(), 2);
        assert!(root[0].is_definition());
        assert_eq!(root[1].field.as_deref(), Some("rootObject"));
        assert_eq!(root[1].owner, None);
    }

    #[test]
    fn definition_body_tracks_nested_delimiters() {
        let text = sample();
        let doc = Document::load(text.clone(), &dialect());
        let body = doc.definition_body_of(&id(GROUP)).unwrap();

        let slice = &text[body];
        assert!(slice.starts_with(GROUP));
        assert!(slice.ends_with('}'));
        assert!(slice.contains("name = Core;"));
        assert!(doc.definition_body_of(&id("D4000000000000000000000D")).is_none());
    }

    #[test]
    fn children_list_containing_reports_field() {
        let text = sample();
        let doc = Document::load(text.clone(), &dialect());
        let site = doc.children_list_containing(&id(FILE)).unwrap();

        assert_eq!(site.field.as_deref(), Some("children"));
        assert!(text[site.range].contains(FILE));
        assert!(doc.children_list_containing(&id(ROOT)).is_none());
    }

    #[test]
    fn occurrences_of_is_in_document_order() {
        let doc = Document::load(sample(), &dialect());
        let offsets = doc.occurrences_of(&id(GROUP));
        assert_eq!(offsets.len(), 2);
        assert!(offsets[0] < offsets[1]);
    }

    #[test]
    fn tokens_in_comments_are_not_occurrences() {
        let text = format!("{{ objects = {{ }}; /* {GROUP} */ }}");
        let doc = Document::load(text, &dialect());
        assert_eq!(doc.occurrence_count(&id(GROUP)), 0);
        assert!(doc.all_tokens().contains(&id(GROUP)));
    }

    #[test]
    fn headers_outside_object_table_are_references() {
        let text = format!(
            "{{ objects = {{ {ROOT} = {{ attributes = {{ TargetAttributes = {{ {GROUP} = {{ x = 1; }}; }}; }}; }}; {GROUP} = {{ isa = PBXNativeTarget; }}; }}; }}"
        );
        let doc = Document::load(text, &dialect());
        let group = doc.occurrence_records(&id(GROUP));

        assert_eq!(group.len(), 2);
        assert_eq!(group[0].kind, OccurrenceKind::Reference);
        assert_eq!(group[0].owner, Some(id(ROOT)));
        assert_eq!(group[1].kind, OccurrenceKind::Definition);
    }

    #[test]
    fn without_object_table_every_header_defines() {
        let text = format!("{GROUP} = {{ a = 1; }};\n{FILE} = {{ b = {GROUP}; }};\n");
        let doc = Document::load(text, &dialect());
        assert_eq!(doc.definitions_of(&id(GROUP)).len(), 1);
        assert_eq!(doc.definitions_of(&id(FILE)).len(), 1);
        assert_eq!(doc.owner_of(doc.occurrences_of(&id(GROUP))[1]), Some(id(FILE)));
    }

    #[test]
    fn labels_of_counts_each_label() {
        let text = format!(
            "{{ objects = {{ {GROUP} /* Core */ = {{ }}; {ROOT} = {{ a = ( {GROUP} /* Core */, {GROUP} /* Main.swift */ ); }}; }}; }}"
        );
        let doc = Document::load(text, &dialect());
        assert_eq!(
            doc.labels_of(&id(GROUP)),
            vec![("Core".to_string(), 2), ("Main.swift".to_string(), 1)]
        );
    }

    #[test]
    fn section_requires_both_markers() {
        let doc = Document::load(sample(), &dialect());
        assert!(doc.has_section("PBXGroup"));
        assert!(!doc.has_section("PBXFileReference"));
    }
}
