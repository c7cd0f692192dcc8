//! The normalization pipeline.
//!
//! A top-level record is routed by tag. Publication records are assembled in
//! three steps: their own attributes are read, each immediate child is
//! dispatched, and one `publication` row is inserted from whatever was
//! collected. Children are dispatched to one of:
//!
//! - a scalar column of the publication row,
//! - the reference resolver, which inserts a shared entity (title, note,
//!   series, editor, publisher) and hands back its surrogate id for the
//!   publication's foreign-key column,
//! - the child-table writer, which inserts rows owned by the publication's
//!   natural key (author links, citations, urls, ees).
//!
//! Reference rows are always submitted before the publication row that points
//! at them. Unknown input is reported and skipped; database errors abort.

use crate::config::{COMMIT_INTERVAL, PROGRESS_INTERVAL};
use crate::extract::{clean, extract};
use crate::models::{
    ChildKind, Element, PublicationField, PublicationKind, Record, ReferenceKind, Table, Value,
};
use crate::parser::DblpReader;
use crate::report::{AnomalyKind, AnomalyLog};
use crate::stats::LoadStats;
use crate::store::Session;
use crate::text::DecodePolicy;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, trace};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Commit after this many top-level records
    pub commit_interval: u32,
    /// Stop after this many top-level records
    pub limit: Option<u64>,
    /// Enforce foreign keys once the load is committed
    pub add_constraints: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            commit_interval: COMMIT_INTERVAL,
            limit: None,
            add_constraints: true,
        }
    }
}

/// Outcome of a completed load.
#[derive(Debug)]
pub struct LoadReport {
    pub stats: LoadStats,
    pub anomalies: AnomalyLog,
}

/// Routes elements to rows on one session.
pub struct Loader<'s, S: Session + ?Sized> {
    session: &'s mut S,
    anomalies: AnomalyLog,
    stats: LoadStats,
}

impl<'s, S: Session + ?Sized> Loader<'s, S> {
    pub fn new(session: &'s mut S) -> Self {
        Self {
            session,
            anomalies: AnomalyLog::new(),
            stats: LoadStats::new(),
        }
    }

    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    pub fn into_report(self) -> LoadReport {
        LoadReport {
            stats: self.stats,
            anomalies: self.anomalies,
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        self.session.commit()?;
        self.stats.inc_commits();
        Ok(())
    }

    /// Inserts the shared entity `element` describes and returns its id.
    /// Returns `None`, after reporting, for a tag that is not a reference
    /// entity.
    pub fn resolve_reference(&mut self, element: &Element, owner: &str) -> Result<Option<i64>> {
        match ReferenceKind::from_tag(&element.tag) {
            Some(kind) => self.insert_reference(kind, element, owner).map(Some),
            None => {
                self.anomalies.report(
                    Some(owner),
                    AnomalyKind::UnknownReferenceTag {
                        tag: element.tag.clone(),
                    },
                );
                Ok(None)
            }
        }
    }

    /// Inserts the rows `element` contributes to the publication `owner`.
    /// A tag that is not a child-table tag is reported and writes nothing.
    pub fn write_child(&mut self, element: &Element, owner: &str) -> Result<()> {
        match ChildKind::from_tag(&element.tag) {
            Some(kind) => self.insert_child(kind, element, owner),
            None => {
                self.anomalies.report(
                    Some(owner),
                    AnomalyKind::UnknownChildTag {
                        tag: element.tag.clone(),
                    },
                );
                Ok(())
            }
        }
    }

    fn insert_reference(
        &mut self,
        kind: ReferenceKind,
        element: &Element,
        owner: &str,
    ) -> Result<i64> {
        let record = extract(element, kind.rule(), Some(owner), &mut self.anomalies);
        let id = self.session.insert_returning_id(&record)?;
        self.stats.add_row(record.table);
        trace!(table = %record.table, id, publication = owner, "Inserted reference row");
        Ok(id)
    }

    fn insert_child(&mut self, kind: ChildKind, element: &Element, owner: &str) -> Result<()> {
        let mut record = extract(element, kind.rule(), Some(owner), &mut self.anomalies);
        if kind == ChildKind::Author {
            let author_id = self.session.insert_returning_id(&record)?;
            self.stats.add_row(Table::Author);

            let mut link = Record::new(Table::PublicationAuthor);
            link.fill("publication", Value::Text(owner.to_string()));
            link.fill("author", Value::Id(author_id));
            self.session.insert(&link)?;
            self.stats.add_row(Table::PublicationAuthor);
        } else {
            record.fill("publication", Value::Text(owner.to_string()));
            self.session.insert(&record)?;
            self.stats.add_row(record.table);
        }
        Ok(())
    }

    /// Loads one top-level record. Returns whether a publication row was
    /// written; records that are not publications, or have no key, are
    /// reported and skipped without touching the database.
    pub fn load_publication(&mut self, element: &Element) -> Result<bool> {
        let Some(kind) = PublicationKind::from_tag(&element.tag) else {
            self.anomalies.report(
                None,
                AnomalyKind::UnknownPublicationType {
                    tag: element.tag.clone(),
                },
            );
            self.stats.inc_skipped();
            return Ok(false);
        };

        let Some(key) = element.attribute("key").filter(|k| !k.trim().is_empty()) else {
            self.anomalies.report(
                None,
                AnomalyKind::MissingKey {
                    tag: element.tag.clone(),
                },
            );
            self.stats.inc_skipped();
            return Ok(false);
        };

        let mut record = Record::new(Table::Publication);
        record.fill("key", Value::Text(key.to_string()));
        record.fill("type", Value::Text(kind.tag().to_string()));
        for (name, value) in &element.attributes {
            match name.as_str() {
                "key" => {}
                "mdate" => {
                    record.fill("mdate", Value::Text(value.clone()));
                }
                "publtype" => {
                    record.fill("publtype", Value::Text(value.clone()));
                }
                _ => self.anomalies.report(
                    Some(key),
                    AnomalyKind::UnexpectedAttribute {
                        element: element.tag.clone(),
                        attribute: name.clone(),
                    },
                ),
            }
        }

        for child in &element.children {
            match PublicationField::from_tag(&child.tag) {
                Some(PublicationField::Scalar(column)) if column.is_string_bearing() => {
                    let value = clean(child.text().as_deref()).unwrap_or_default();
                    if !record.fill(column.column(), Value::Text(value)) {
                        self.report_duplicate(key, &child.tag, &element.tag);
                    }
                }
                Some(PublicationField::Scalar(column)) => {
                    trace!(column = column.column(), publication = key, "Column not loaded");
                }
                Some(PublicationField::Reference(reference)) => {
                    if record.contains(reference.column()) {
                        self.report_duplicate(key, &child.tag, &element.tag);
                        continue;
                    }
                    let id = self.insert_reference(reference, child, key)?;
                    record.fill(reference.column(), Value::Id(id));
                }
                Some(PublicationField::Child(child_kind)) => {
                    self.insert_child(child_kind, child, key)?;
                }
                None => self.anomalies.report(
                    Some(key),
                    AnomalyKind::UnrecognizedElement {
                        tag: child.tag.clone(),
                        parent: element.tag.clone(),
                    },
                ),
            }
        }

        self.session
            .insert(&record)
            .with_context(|| format!("Failed to insert publication {key}"))?;
        self.stats.add_row(Table::Publication);
        self.stats.inc_publications();
        debug!(key, kind = kind.tag(), columns = record.fields().len(), "Loaded publication");
        Ok(true)
    }

    fn report_duplicate(&mut self, key: &str, field: &str, parent: &str) {
        self.anomalies.report(
            Some(key),
            AnomalyKind::DuplicateField {
                field: field.to_string(),
                parent: parent.to_string(),
            },
        );
    }
}

/// Loads every record of `records`, committing after each
/// `options.commit_interval` records and once at the end. The first error,
/// from the input or the database, aborts the load; work since the last
/// commit is left to the session to discard.
pub fn load_records<S, I>(records: I, session: &mut S, options: &LoadOptions) -> Result<LoadReport>
where
    S: Session + ?Sized,
    I: IntoIterator<Item = Result<Element>>,
{
    let mut loader = Loader::new(session);
    let pb = make_spinner();
    let mut since_commit = 0u32;

    for record in records {
        if options.limit.is_some_and(|limit| loader.stats.records() >= limit) {
            info!(limit = options.limit, "Record limit reached");
            break;
        }
        let element = record?;
        loader.load_publication(&element)?;
        loader.stats.inc_records();

        since_commit += 1;
        if since_commit == options.commit_interval {
            loader.commit()?;
            since_commit = 0;
        }

        let seen = loader.stats.records();
        if seen % PROGRESS_INTERVAL == 0 {
            pb.set_message(format!("{seen} records"));
        }
    }

    loader.commit()?;
    pb.finish_and_clear();

    let report = loader.into_report();
    info!(
        records = report.stats.records(),
        publications = report.stats.publications(),
        anomalies = report.anomalies.total(),
        "Load complete"
    );
    Ok(report)
}

/// Loads the dump at `input` into `session`, then runs the deferred
/// constraint step unless disabled.
pub fn run_load<S: Session + ?Sized>(
    input: &Path,
    dtd: Option<&Path>,
    policy: DecodePolicy,
    session: &mut S,
    options: &LoadOptions,
) -> Result<LoadReport> {
    let mut reader = DblpReader::open(input, dtd, policy)?;
    info!(input = %input.display(), "Loading records");

    let mut report = load_records(&mut reader, session, options)?;
    report
        .stats
        .set_unresolved_entities(reader.unresolved_entities());

    if options.add_constraints {
        info!("Adding foreign key constraints");
        session
            .add_foreign_keys()
            .context("Deferred foreign key constraints failed")?;
        session.commit()?;
    }
    Ok(report)
}

fn make_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message("0 records");
    pb
}
