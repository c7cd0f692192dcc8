use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::debug;

static ENTITY_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<!ENTITY\s+([A-Za-z_:][\w.:-]*)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).unwrap()
});

static SYSTEM_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bSYSTEM\s+(?:"([^"]+)"|'([^']+)')"#).unwrap());

static CHAR_REF_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(?:x([0-9A-Fa-f]+)|([0-9]+));").unwrap());

static COMMENT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());

const PREDEFINED: &[(&str, &str)] = &[
    ("lt", "<"),
    ("gt", ">"),
    ("amp", "&"),
    ("apos", "'"),
    ("quot", "\""),
];

/// General entities declared by the document's DTD, with character
/// references in their replacement text already expanded.
#[derive(Debug, Default, Clone)]
pub struct EntityTable {
    entities: HashMap<String, String>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves an entity name to its replacement text. Predefined XML
    /// entities always resolve; document declarations cannot shadow them.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        PREDEFINED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .or_else(|| self.entities.get(name).map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Adds every `<!ENTITY name "value">` declaration found in `dtd`.
    /// Parameter entities are skipped. The first declaration of a name wins,
    /// as in XML.
    pub fn add_declarations(&mut self, dtd: &str) -> usize {
        let stripped = COMMENT_REGEX.replace_all(dtd, "");
        let mut added = 0;
        for caps in ENTITY_DECL_REGEX.captures_iter(&stripped) {
            let name = &caps[1];
            let raw = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            if !self.entities.contains_key(name) {
                self.entities
                    .insert(name.to_string(), expand_char_refs(raw));
                added += 1;
            }
        }
        added
    }

    pub fn load_dtd(&mut self, path: &Path) -> Result<usize> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read DTD: {}", path.display()))?;
        let added = self.add_declarations(&String::from_utf8_lossy(&bytes));
        debug!(path = %path.display(), entities = added, "Loaded DTD entities");
        Ok(added)
    }
}

/// Returns the SYSTEM identifier of a DOCTYPE declaration body, if any.
pub fn system_id(doctype: &str) -> Option<&str> {
    // Only the part before the internal subset can carry the external id.
    let head = doctype.split('[').next().unwrap_or(doctype);
    SYSTEM_ID_REGEX
        .captures(head)
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str())
}

/// Returns the internal subset (between `[` and `]`) of a DOCTYPE body.
pub fn internal_subset(doctype: &str) -> Option<&str> {
    let start = doctype.find('[')?;
    let end = doctype.rfind(']')?;
    (end > start).then(|| &doctype[start + 1..end])
}

fn expand_char_refs(value: &str) -> String {
    if !value.contains("&#") {
        return value.to_string();
    }
    CHAR_REF_REGEX
        .replace_all(value, |caps: &regex::Captures| {
            let code = match (caps.get(1), caps.get(2)) {
                (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
                (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
                _ => None,
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
