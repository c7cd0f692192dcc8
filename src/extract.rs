//! Field extraction for the leaf-level elements of a publication.
//!
//! Every leaf kind is described by an [`ExtractRule`]: which column the
//! element's own text goes to, and which attributes and child elements are
//! recognized. Extraction is best-effort; anything outside the rule is
//! reported and skipped.

use crate::models::{ChildKind, Element, Record, ReferenceKind, Table, Value};
use crate::report::{AnomalyKind, AnomalyLog};

#[derive(Debug)]
pub struct ExtractRule {
    pub table: Table,
    /// Column receiving the element's own text. Lowest precedence: an
    /// attribute or child mapped to the same column wins.
    pub text_column: &'static str,
    /// (attribute name, column)
    pub attributes: &'static [(&'static str, &'static str)],
    /// (child tag, column); each may occur once
    pub children: &'static [(&'static str, &'static str)],
    /// Formatting children absorbed into the text instead of being reported.
    /// A non-empty list switches the text source to the full inner text.
    pub inline_markup: &'static [&'static str],
}

pub static TITLE: ExtractRule = ExtractRule {
    table: Table::Title,
    text_column: "title",
    attributes: &[("bibtex", "bibtex")],
    children: &[],
    inline_markup: &["i", "sub", "sup", "tt"],
};

pub static NOTE: ExtractRule = ExtractRule {
    table: Table::Note,
    text_column: "label",
    attributes: &[("type", "type")],
    children: &[],
    inline_markup: &[],
};

pub static SERIES: ExtractRule = ExtractRule {
    table: Table::Series,
    text_column: "name",
    attributes: &[("href", "href")],
    children: &[],
    inline_markup: &[],
};

pub static EDITOR: ExtractRule = ExtractRule {
    table: Table::Editor,
    text_column: "editor",
    attributes: &[],
    children: &[("aux", "aux"), ("orcid", "orcid")],
    inline_markup: &[],
};

pub static PUBLISHER: ExtractRule = ExtractRule {
    table: Table::Publisher,
    text_column: "publisher",
    attributes: &[],
    children: &[("href", "href")],
    inline_markup: &[],
};

pub static AUTHOR: ExtractRule = ExtractRule {
    table: Table::Author,
    text_column: "name",
    attributes: &[],
    children: &[("aux", "aux"), ("bibtex", "bibtex"), ("orcid", "orcid")],
    inline_markup: &[],
};

pub static CITE: ExtractRule = ExtractRule {
    table: Table::PublicationCite,
    text_column: "label",
    attributes: &[("label", "label")],
    children: &[("ref", "ref")],
    inline_markup: &[],
};

pub static URL: ExtractRule = ExtractRule {
    table: Table::Url,
    text_column: "url",
    attributes: &[],
    children: &[("aux", "aux")],
    inline_markup: &[],
};

pub static EE: ExtractRule = ExtractRule {
    table: Table::Ee,
    text_column: "ee",
    attributes: &[],
    children: &[("aux", "aux")],
    inline_markup: &[],
};

impl ReferenceKind {
    pub fn rule(&self) -> &'static ExtractRule {
        match self {
            ReferenceKind::Title => &TITLE,
            ReferenceKind::Note => &NOTE,
            ReferenceKind::Series => &SERIES,
            ReferenceKind::Editor => &EDITOR,
            ReferenceKind::Publisher => &PUBLISHER,
        }
    }
}

impl ChildKind {
    pub fn rule(&self) -> &'static ExtractRule {
        match self {
            ChildKind::Author => &AUTHOR,
            ChildKind::Cite => &CITE,
            ChildKind::Url => &URL,
            ChildKind::Ee => &EE,
        }
    }
}

/// Builds the record for `element` according to `rule`. `owner` is the key
/// of the enclosing publication, used only to give reports context.
pub fn extract(
    element: &Element,
    rule: &ExtractRule,
    owner: Option<&str>,
    log: &mut AnomalyLog,
) -> Record {
    let mut record = Record::new(rule.table);

    for (name, value) in &element.attributes {
        match rule.attributes.iter().find(|(attr, _)| attr == name) {
            Some((_, column)) => {
                record.fill(*column, Value::Text(value.clone()));
            }
            None => log.report(
                owner,
                AnomalyKind::UnexpectedAttribute {
                    element: element.tag.clone(),
                    attribute: name.clone(),
                },
            ),
        }
    }

    for child in &element.children {
        if let Some((_, column)) = rule.children.iter().find(|(tag, _)| *tag == child.tag) {
            let text = clean(child.text().as_deref()).unwrap_or_default();
            if !record.fill(*column, Value::Text(text)) {
                log.report(
                    owner,
                    AnomalyKind::DuplicateField {
                        field: child.tag.clone(),
                        parent: element.tag.clone(),
                    },
                );
            }
        } else if !rule.inline_markup.contains(&child.tag.as_str()) {
            log.report(
                owner,
                AnomalyKind::UnrecognizedElement {
                    tag: child.tag.clone(),
                    parent: element.tag.clone(),
                },
            );
        }
    }

    let text = if rule.inline_markup.is_empty() {
        clean(element.text().as_deref())
    } else {
        clean(Some(&element.inner_text()))
    };
    if let Some(text) = text {
        record.fill(rule.text_column, Value::Text(text));
    }

    record
}

/// Trims surrounding whitespace; blank text counts as absent.
pub(crate) fn clean(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
