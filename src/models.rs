use std::borrow::Cow;
use std::fmt;

/// One element of the source document, owned together with its subtree.
///
/// Character data is split the way lxml splits it: `text` holds what comes
/// before the first child, and each child's `tail` holds what follows its
/// end tag, up to the next sibling. `None` when there is none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Appends character data after the children added so far.
    pub fn with_text(mut self, text: impl AsRef<str>) -> Self {
        self.push_text(text.as_ref());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Character data directly inside the element, excluding its children's
    /// content.
    pub fn text(&self) -> Option<Cow<'_, str>> {
        let mut parts = self
            .text
            .as_deref()
            .into_iter()
            .chain(self.children.iter().filter_map(|c| c.tail.as_deref()));
        let first = parts.next()?;
        match parts.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = String::from(first);
                joined.push_str(second);
                parts.for_each(|part| joined.push_str(part));
                Some(Cow::Owned(joined))
            }
        }
    }

    /// Concatenated character data of the element and all its descendants,
    /// in document order.
    pub fn inner_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text(out);
            if let Some(tail) = &child.tail {
                out.push_str(tail);
            }
        }
    }

    /// Appends character data at the current end of the element: to `text`
    /// before any child exists, to the last child's `tail` after.
    pub(crate) fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let slot = match self.children.last_mut() {
            Some(child) => &mut child.tail,
            None => &mut self.text,
        };
        match slot {
            Some(existing) => existing.push_str(text),
            None => *slot = Some(text.to_string()),
        }
    }
}

/// Record types that become a `publication` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublicationKind {
    Article,
    Inproceedings,
    Proceedings,
    Book,
    Incollection,
    Phdthesis,
    Mastersthesis,
    Www,
}

impl PublicationKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "article" => Self::Article,
            "inproceedings" => Self::Inproceedings,
            "proceedings" => Self::Proceedings,
            "book" => Self::Book,
            "incollection" => Self::Incollection,
            "phdthesis" => Self::Phdthesis,
            "mastersthesis" => Self::Mastersthesis,
            "www" => Self::Www,
            _ => return None,
        })
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::Inproceedings => "inproceedings",
            Self::Proceedings => "proceedings",
            Self::Book => "book",
            Self::Incollection => "incollection",
            Self::Phdthesis => "phdthesis",
            Self::Mastersthesis => "mastersthesis",
            Self::Www => "www",
        }
    }
}

/// Scalar `publication` columns that may appear as child elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarColumn {
    Booktitle,
    Volume,
    Year,
    Journal,
    Month,
    School,
    Isbn,
    Chapter,
    Cdrom,
    Crossref,
    Number,
    Pages,
}

impl ScalarColumn {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "booktitle" => Self::Booktitle,
            "volume" => Self::Volume,
            "year" => Self::Year,
            "journal" => Self::Journal,
            "month" => Self::Month,
            "school" => Self::School,
            "isbn" => Self::Isbn,
            "chapter" => Self::Chapter,
            "cdrom" => Self::Cdrom,
            "crossref" => Self::Crossref,
            "number" => Self::Number,
            "pages" => Self::Pages,
            _ => return None,
        })
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Booktitle => "booktitle",
            Self::Volume => "volume",
            Self::Year => "year",
            Self::Journal => "journal",
            Self::Month => "month",
            Self::School => "school",
            Self::Isbn => "isbn",
            Self::Chapter => "chapter",
            Self::Cdrom => "cdrom",
            Self::Crossref => "crossref",
            Self::Number => "number",
            Self::Pages => "pages",
        }
    }

    /// Only string-bearing columns are copied into the publication row.
    /// `volume`, `year`, `number` and `pages` are recognized but not loaded.
    pub fn is_string_bearing(&self) -> bool {
        !matches!(
            self,
            Self::Volume | Self::Year | Self::Number | Self::Pages
        )
    }
}

/// Shared entities a publication points to by surrogate id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Title,
    Note,
    Series,
    Editor,
    Publisher,
}

impl ReferenceKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "title" => Self::Title,
            "note" => Self::Note,
            "series" => Self::Series,
            "editor" => Self::Editor,
            "publisher" => Self::Publisher,
            _ => return None,
        })
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Title => Table::Title,
            Self::Note => Table::Note,
            Self::Series => Table::Series,
            Self::Editor => Table::Editor,
            Self::Publisher => Table::Publisher,
        }
    }

    /// Name of the foreign-key column in `publication`.
    pub fn column(&self) -> &'static str {
        self.table().name()
    }
}

/// Rows owned by one publication through its natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Author,
    Cite,
    Url,
    Ee,
}

impl ChildKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "author" => Self::Author,
            "cite" => Self::Cite,
            "url" => Self::Url,
            "ee" => Self::Ee,
            _ => return None,
        })
    }
}

/// Routing decision for an immediate child of a publication element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationField {
    Scalar(ScalarColumn),
    Reference(ReferenceKind),
    Child(ChildKind),
}

impl PublicationField {
    pub fn from_tag(tag: &str) -> Option<Self> {
        ScalarColumn::from_tag(tag)
            .map(Self::Scalar)
            .or_else(|| ReferenceKind::from_tag(tag).map(Self::Reference))
            .or_else(|| ChildKind::from_tag(tag).map(Self::Child))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Publication,
    Author,
    PublicationAuthor,
    PublicationCite,
    Url,
    Ee,
    Title,
    Note,
    Series,
    Editor,
    Publisher,
}

impl Table {
    pub const ALL: [Table; 11] = [
        Table::Publication,
        Table::Author,
        Table::PublicationAuthor,
        Table::PublicationCite,
        Table::Url,
        Table::Ee,
        Table::Title,
        Table::Note,
        Table::Series,
        Table::Editor,
        Table::Publisher,
    ];

    /// Tables whose `publication` column references `publication(key)`.
    pub const PUBLICATION_REFERENCING: [Table; 4] = [
        Table::PublicationCite,
        Table::Url,
        Table::PublicationAuthor,
        Table::Ee,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Publication => "publication",
            Table::Author => "author",
            Table::PublicationAuthor => "publication_author",
            Table::PublicationCite => "publication_cite",
            Table::Url => "url",
            Table::Ee => "ee",
            Table::Title => "title",
            Table::Note => "note",
            Table::Series => "series",
            Table::Editor => "editor",
            Table::Publisher => "publisher",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Id(i64),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<i64> {
        match self {
            Value::Id(id) => Some(*id),
            Value::Text(_) => None,
        }
    }
}

/// One row to insert: the target table and the populated columns in the
/// order they were filled. Columns not present are left to the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub table: Table,
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            fields: Vec::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Sets `column` unless it is already filled. Returns false when the
    /// column already had a value, which is left untouched.
    pub fn fill(&mut self, column: &'static str, value: Value) -> bool {
        if self.contains(column) {
            return false;
        }
        self.fields.push((column, value));
        true
    }

    pub fn fields(&self) -> &[(&'static str, Value)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
