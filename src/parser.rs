use crate::config::ROOT_TAG;
use crate::entities::{self, EntityTable};
use crate::models::Element;
use crate::text::DecodePolicy;
use anyhow::{bail, Context, Result};
use bzip2::read::MultiBzDecoder;
use quick_xml::escape::unescape_with;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Streams the records of a DBLP dump: every child element of the `dblp`
/// element, materialized one subtree at a time. Wrapper elements around
/// `dblp` are descended through.
pub struct DblpReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    entities: EntityTable,
    policy: DecodePolicy,
    /// Directory used to resolve a relative DOCTYPE SYSTEM id
    base_dir: Option<PathBuf>,
    /// An explicit DTD was supplied; the DOCTYPE SYSTEM id is ignored
    dtd_loaded: bool,
    in_root: bool,
    seen_root: bool,
    done: bool,
    unresolved_entities: u64,
}

impl DblpReader<Box<dyn BufRead>> {
    /// Opens a dump on disk; `.bz2` files are decompressed on the fly.
    pub fn open(path: &Path, dtd: Option<&Path>, policy: DecodePolicy) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Cannot open input {}", path.display()))?;
        let inner: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "bz2") {
            Box::new(BufReader::new(MultiBzDecoder::new(file)))
        } else {
            Box::new(BufReader::with_capacity(256 * 1024, file))
        };

        let mut reader = Self::from_reader(inner, policy);
        reader.base_dir = path.parent().map(Path::to_path_buf);
        if let Some(dtd) = dtd {
            let count = reader.entities.load_dtd(dtd)?;
            info!(path = %dtd.display(), entities = count, "Loaded DTD");
            reader.dtd_loaded = true;
        }
        Ok(reader)
    }
}

impl<R: BufRead> DblpReader<R> {
    pub fn from_reader(inner: R, policy: DecodePolicy) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.trim_text(false);
        reader.expand_empty_elements(false);
        Self {
            reader,
            buf: Vec::with_capacity(8 * 1024),
            entities: EntityTable::new(),
            policy,
            base_dir: None,
            dtd_loaded: false,
            in_root: false,
            seen_root: false,
            done: false,
            unresolved_entities: 0,
        }
    }

    pub fn entities(&self) -> &EntityTable {
        &self.entities
    }

    /// Entity references that could not be resolved; their text was kept raw.
    pub fn unresolved_entities(&self) -> u64 {
        self.unresolved_entities
    }

    fn next_event(&mut self) -> Result<Event<'static>> {
        self.buf.clear();
        let event = self
            .reader
            .read_event_into(&mut self.buf)
            .with_context(|| format!("Malformed XML near byte {}", self.reader.buffer_position()))?;
        Ok(event.into_owned())
    }

    fn handle_doctype(&mut self, body: &str) {
        if let Some(subset) = entities::internal_subset(body) {
            let added = self.entities.add_declarations(subset);
            debug!(entities = added, "Loaded internal DTD subset");
        }
        if self.dtd_loaded {
            return;
        }
        let Some(system_id) = entities::system_id(body) else {
            return;
        };
        let path = match &self.base_dir {
            Some(dir) => dir.join(system_id),
            None => PathBuf::from(system_id),
        };
        match self.entities.load_dtd(&path) {
            Ok(count) => info!(path = %path.display(), entities = count, "Loaded DTD"),
            Err(e) => warn!(error = %e, "External DTD unavailable, entities may not resolve"),
        }
        self.dtd_loaded = true;
    }

    fn decode_text(&mut self, raw: &[u8]) -> Result<String> {
        let decoded = self.policy.decode(raw)?;
        let (text, unresolved) = expand_references(&decoded, &self.entities);
        self.unresolved_entities += unresolved;
        Ok(text)
    }

    fn start_element(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        let tag = self.policy.decode(start.name().as_ref())?.into_owned();
        let mut element = Element::new(tag);
        for attr in start.attributes().flatten() {
            let name = self.policy.decode(attr.key.as_ref())?.into_owned();
            let value = self.decode_text(&attr.value)?;
            element.attributes.push((name, value));
        }
        Ok(element)
    }

    /// Reads the rest of an element whose start tag was just consumed.
    fn read_subtree(&mut self, start: &BytesStart<'_>) -> Result<Element> {
        let mut element = self.start_element(start)?;
        loop {
            match self.next_event()? {
                Event::Start(child) => {
                    let child = self.read_subtree(&child)?;
                    element.children.push(child);
                }
                Event::Empty(child) => {
                    let child = self.start_element(&child)?;
                    element.children.push(child);
                }
                Event::Text(text) => {
                    let text = self.decode_text(&text)?;
                    element.push_text(&text);
                }
                Event::CData(data) => {
                    let text = self.policy.decode(&data)?.into_owned();
                    element.push_text(&text);
                }
                Event::End(_) => return Ok(element),
                Event::Eof => bail!("Unexpected end of input inside <{}>", element.tag),
                _ => {}
            }
        }
    }

    fn next_record(&mut self) -> Result<Option<Element>> {
        loop {
            match self.next_event()? {
                Event::DocType(body) => {
                    let body = self.policy.decode(&body)?.into_owned();
                    self.handle_doctype(&body);
                }
                Event::Start(start) => {
                    if self.in_root {
                        return self.read_subtree(&start).map(Some);
                    }
                    if start.name().as_ref() == ROOT_TAG.as_bytes() {
                        self.in_root = true;
                        self.seen_root = true;
                    }
                }
                Event::Empty(start) => {
                    if self.in_root {
                        return self.start_element(&start).map(Some);
                    }
                    if start.name().as_ref() == ROOT_TAG.as_bytes() {
                        self.seen_root = true;
                        return Ok(None);
                    }
                }
                Event::End(end) => {
                    if self.in_root && end.name().as_ref() == ROOT_TAG.as_bytes() {
                        return Ok(None);
                    }
                }
                Event::Eof => {
                    if !self.seen_root {
                        bail!("No <{ROOT_TAG}> element found in input");
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

/// Replaces each `&...;` reference in `text`. A reference that does not
/// resolve is kept verbatim and counted; its neighbours still resolve.
fn expand_references(text: &str, entities: &EntityTable) -> (String, u64) {
    if !text.contains('&') {
        return (text.to_string(), 0);
    }
    let mut out = String::with_capacity(text.len());
    let mut unresolved = 0;
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let end = tail.find(';').map_or(tail.len(), |i| i + 1);
        let reference = &tail[..end];
        match unescape_with(reference, |name| entities.resolve(name)) {
            Ok(resolved) => out.push_str(&resolved),
            Err(e) => {
                unresolved += 1;
                warn!(reference, error = %e, "Unresolved entity, keeping raw text");
                out.push_str(reference);
            }
        }
        rest = &tail[end..];
    }
    out.push_str(rest);
    (out, unresolved)
}

impl<R: BufRead> Iterator for DblpReader<R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
