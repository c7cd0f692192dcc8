//! Integration tests for the dblp-load pipeline.
//!
//! These tests drive the full path from XML input (plain or BZ2-compressed)
//! through record assembly to rows in a SQLite database. Tests are organized
//! into logical sections:
//!
//! - **Assembly Tests** -- Publication rows, reference ids, child rows
//! - **Ordering Tests** -- Statement order and commit batching, via a recording session
//! - **Database Tests** -- End-to-end loads, deferred foreign keys, re-runs
//!
//! # Test Strategy
//!
//! All tests use a shared `sample_xml()` fixture representing a small DBLP dump.
//! Database tests create a fresh SQLite file from `tests/fixtures/schema.sql`
//! inside their own TempDir.
//!
//! # Sample Data
//!
//! The test fixture includes:
//! - `a1`: article titled "Foo" by Alice and Bob
//! - `conf/x/1`: inproceedings with an unrecognized `weirdstuff` child
//! - `books/x/b1`: book with editor, publisher, series, note, url, ee and a citation
//! - a `person` record, which is not a publication type

use bzip2::write::BzEncoder;
use bzip2::Compression;
use dblp_load::load::{load_records, run_load, LoadOptions};
use dblp_load::models::{Element, Record, Table, Value};
use dblp_load::parser::DblpReader;
use dblp_load::report::AnomalyKind;
use dblp_load::store::{Session, SqliteSession};
use dblp_load::text::DecodePolicy;
use rusqlite::Connection;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA: &str = include_str!("fixtures/schema.sql");

fn sample_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE dblp [
<!ENTITY uuml "&#252;">
]>
<dblp>
<article key="a1" mdate="2021-03-04">
<title>Foo</title>
<author>Alice</author>
<author>Bob</author>
<journal>CACM</journal>
<year>2021</year>
</article>
<inproceedings key="conf/x/1" mdate="2020-06-01">
<author>Carol M&uuml;ller</author>
<title>On the <i>k</i>-SAT Problem</title>
<booktitle>X Conference</booktitle>
<weirdstuff>???</weirdstuff>
<pages>1-10</pages>
</inproceedings>
<book key="books/x/b1" publtype="edited">
<editor orcid="ignored">Dave</editor>
<publisher>Springer</publisher>
<series href="db/series/lncs/index.html">LNCS</series>
<note type="isbn">second printing</note>
<url>db/books/x/b1.html</url>
<ee>https://doi.org/10.1/b1</ee>
<cite label="Foo21">a1</cite>
<isbn>978-3-16-148410-0</isbn>
</book>
<person key="homepages/x"><author>Nobody</author></person>
</dblp>
"#
}

fn write_input(dir: &Path, name: &str, xml: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, xml).unwrap();
    path
}

fn write_bz2_input(dir: &Path, xml: &str) -> PathBuf {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(xml.as_bytes()).unwrap();
    let compressed = encoder.finish().unwrap();
    let path = dir.join("dblp.xml.bz2");
    std::fs::write(&path, compressed).unwrap();
    path
}

fn create_database(dir: &Path) -> PathBuf {
    let path = dir.join("dblp.sqlite");
    Connection::open(&path).unwrap().execute_batch(SCHEMA).unwrap();
    path
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}

fn sample_records() -> Vec<Element> {
    DblpReader::from_reader(sample_xml().as_bytes(), DecodePolicy::default())
        .collect::<anyhow::Result<Vec<_>>>()
        .unwrap()
}

/// A session that records every statement in order and hands out
/// sequential ids.
#[derive(Default)]
struct RecordingSession {
    events: Vec<Event>,
    next_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Insert(Record),
    InsertReturning(Record, i64),
    Commit,
    ForeignKeys,
}

impl RecordingSession {
    fn inserts(&self, table: Table) -> Vec<&Record> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Insert(r) | Event::InsertReturning(r, _) if r.table == table => Some(r),
                _ => None,
            })
            .collect()
    }

    fn commits(&self) -> usize {
        self.events.iter().filter(|e| **e == Event::Commit).count()
    }
}

impl Session for RecordingSession {
    fn insert(&mut self, record: &Record) -> anyhow::Result<()> {
        self.events.push(Event::Insert(record.clone()));
        Ok(())
    }

    fn insert_returning_id(&mut self, record: &Record) -> anyhow::Result<i64> {
        self.next_id += 1;
        self.events
            .push(Event::InsertReturning(record.clone(), self.next_id));
        Ok(self.next_id)
    }

    fn commit(&mut self) -> anyhow::Result<()> {
        self.events.push(Event::Commit);
        Ok(())
    }

    fn add_foreign_keys(&mut self) -> anyhow::Result<()> {
        self.events.push(Event::ForeignKeys);
        Ok(())
    }
}

fn text(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(Value::as_text).map(str::to_string)
}

// ============================================================================
// Assembly Tests
// ============================================================================

#[test]
fn test_article_with_title_and_two_authors() {
    let mut session = RecordingSession::default();
    let records = sample_records().into_iter().take(1).map(Ok);
    load_records(records, &mut session, &LoadOptions::default()).unwrap();

    let titles = session.inserts(Table::Title);
    assert_eq!(titles.len(), 1);
    assert_eq!(text(titles[0], "title").as_deref(), Some("Foo"));

    let authors = session.inserts(Table::Author);
    let names: Vec<_> = authors.iter().filter_map(|r| text(r, "name")).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);

    let links = session.inserts(Table::PublicationAuthor);
    assert_eq!(links.len(), 2);
    assert!(links
        .iter()
        .all(|r| text(r, "publication").as_deref() == Some("a1")));

    let publications = session.inserts(Table::Publication);
    assert_eq!(publications.len(), 1);
    let publication = publications[0];
    assert_eq!(text(publication, "key").as_deref(), Some("a1"));
    assert_eq!(text(publication, "type").as_deref(), Some("article"));
    assert_eq!(text(publication, "journal").as_deref(), Some("CACM"));
    assert!(!publication.contains("year"));
}

#[test]
fn test_reference_id_stored_and_submitted_first() {
    let mut session = RecordingSession::default();
    let records = sample_records().into_iter().map(Ok);
    load_records(records, &mut session, &LoadOptions::default()).unwrap();

    for (i, event) in session.events.iter().enumerate() {
        let Event::Insert(publication) = event else {
            continue;
        };
        if publication.table != Table::Publication {
            continue;
        }
        for column in ["title", "note", "series", "editor", "publisher"] {
            let Some(id) = publication.get(column).and_then(Value::as_id) else {
                continue;
            };
            let position = session
                .events
                .iter()
                .position(|e| matches!(e, Event::InsertReturning(r, rid) if *rid == id && r.table.name() == column))
                .unwrap();
            assert!(position < i, "{column} row must precede its publication");
        }
    }

    let book = session
        .inserts(Table::Publication)
        .into_iter()
        .find(|r| text(r, "key").as_deref() == Some("books/x/b1"))
        .unwrap()
        .clone();
    for column in ["note", "series", "editor", "publisher"] {
        assert!(book.contains(column), "book should reference its {column}");
    }
    assert_eq!(text(&book, "publtype").as_deref(), Some("edited"));
    assert_eq!(text(&book, "isbn").as_deref(), Some("978-3-16-148410-0"));
}

#[test]
fn test_child_rows_carry_owner_key() {
    let mut session = RecordingSession::default();
    let records = sample_records().into_iter().map(Ok);
    load_records(records, &mut session, &LoadOptions::default()).unwrap();

    for table in [Table::Url, Table::Ee, Table::PublicationCite] {
        let rows = session.inserts(table);
        assert_eq!(rows.len(), 1, "{table}");
        assert_eq!(text(rows[0], "publication").as_deref(), Some("books/x/b1"));
    }
    let cite = session.inserts(Table::PublicationCite)[0];
    assert_eq!(text(cite, "label").as_deref(), Some("Foo21"));
}

#[test]
fn test_unrecognized_child_does_not_abort() {
    let mut session = RecordingSession::default();
    let records = sample_records().into_iter().map(Ok);
    let report = load_records(records, &mut session, &LoadOptions::default()).unwrap();

    let inproceedings = session
        .inserts(Table::Publication)
        .into_iter()
        .find(|r| text(r, "key").as_deref() == Some("conf/x/1"))
        .unwrap()
        .clone();
    assert_eq!(text(&inproceedings, "booktitle").as_deref(), Some("X Conference"));
    assert!(inproceedings.contains("title"));
    assert!(!inproceedings.contains("pages"));

    let weird: Vec<_> = report
        .anomalies
        .anomalies()
        .iter()
        .filter(|a| matches!(&a.kind, AnomalyKind::UnrecognizedElement { tag, .. } if tag == "weirdstuff"))
        .collect();
    assert_eq!(weird.len(), 1);
    assert_eq!(weird[0].publication.as_deref(), Some("conf/x/1"));
}

#[test]
fn test_non_publication_record_skipped() {
    let mut session = RecordingSession::default();
    let records = sample_records().into_iter().map(Ok);
    let report = load_records(records, &mut session, &LoadOptions::default()).unwrap();

    assert_eq!(report.stats.records(), 4);
    assert_eq!(report.stats.publications(), 3);
    assert_eq!(report.stats.skipped(), 1);
    assert!(session
        .inserts(Table::Author)
        .iter()
        .all(|r| text(r, "name").as_deref() != Some("Nobody")));
}

// ============================================================================
// Ordering Tests
// ============================================================================

fn many_articles(n: usize) -> String {
    let mut xml = String::from("<dblp>\n");
    for i in 0..n {
        xml.push_str(&format!(
            "<article key=\"journals/x/{i}\"><author>Author {i}</author></article>\n"
        ));
    }
    xml.push_str("</dblp>\n");
    xml
}

#[test]
fn test_250_records_commit_three_times() {
    let xml = many_articles(250);
    let reader = DblpReader::from_reader(xml.as_bytes(), DecodePolicy::default());
    let mut session = RecordingSession::default();
    let report = load_records(reader, &mut session, &LoadOptions::default()).unwrap();

    assert_eq!(session.commits(), 3);
    assert_eq!(report.stats.commits(), 3);

    // first commit directly follows the 100th publication
    let published_before_first_commit = session
        .events
        .iter()
        .take_while(|e| **e != Event::Commit)
        .filter(|e| matches!(e, Event::Insert(r) if r.table == Table::Publication))
        .count();
    assert_eq!(published_before_first_commit, 100);
    assert_eq!(session.events.last(), Some(&Event::Commit));
}

#[test]
fn test_rerun_inserts_duplicates() {
    let mut session = RecordingSession::default();
    for _ in 0..2 {
        let records = sample_records().into_iter().map(Ok);
        load_records(records, &mut session, &LoadOptions::default()).unwrap();
    }

    let a1_rows = session
        .inserts(Table::Publication)
        .into_iter()
        .filter(|r| text(r, "key").as_deref() == Some("a1"))
        .count();
    assert_eq!(a1_rows, 2);
    assert_eq!(session.inserts(Table::Title).len(), 4);
    assert_eq!(session.inserts(Table::Author).len(), 6);
}

// ============================================================================
// Database Tests
// ============================================================================

#[test]
fn test_end_to_end_sqlite_load() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dblp.xml", sample_xml());
    let db = create_database(dir.path());

    let mut session = SqliteSession::open(&db).unwrap();
    let report = run_load(
        &input,
        None,
        DecodePolicy::default(),
        &mut session,
        &LoadOptions::default(),
    )
    .unwrap();

    assert_eq!(report.stats.publications(), 3);
    let enabled = count(session.connection(), "PRAGMA foreign_keys");
    assert_eq!(enabled, 1);
    drop(session);

    let conn = Connection::open(&db).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM publication"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM author"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM title"), 2);

    let title: String = conn
        .query_row(
            "SELECT t.title FROM publication p JOIN title t ON p.title = t.id WHERE p.key = 'a1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(title, "Foo");

    let sat: String = conn
        .query_row(
            "SELECT t.title FROM publication p JOIN title t ON p.title = t.id WHERE p.key = 'conf/x/1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(sat, "On the k-SAT Problem");

    let carol: String = conn
        .query_row(
            "SELECT a.name FROM publication_author pa JOIN author a ON pa.author = a.id WHERE pa.publication = 'conf/x/1'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(carol, "Carol M\u{fc}ller");

    let (year, volume): (Option<String>, Option<String>) = conn
        .query_row(
            "SELECT year, volume FROM publication WHERE key = 'a1'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(year, None);
    assert_eq!(volume, None);
}

#[test]
fn test_bz2_input() {
    let dir = TempDir::new().unwrap();
    let input = write_bz2_input(dir.path(), sample_xml());
    let db = create_database(dir.path());

    let mut session = SqliteSession::open(&db).unwrap();
    let report = run_load(
        &input,
        None,
        DecodePolicy::default(),
        &mut session,
        &LoadOptions::default(),
    )
    .unwrap();
    assert_eq!(report.stats.publications(), 3);
    assert_eq!(count(session.connection(), "SELECT COUNT(*) FROM ee"), 1);
}

#[test]
fn test_identical_references_not_deduplicated() {
    let xml = r#"<dblp>
<book key="b1"><publisher>Springer</publisher></book>
<book key="b2"><publisher>Springer</publisher></book>
</dblp>"#;
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dblp.xml", xml);
    let db = create_database(dir.path());

    let mut session = SqliteSession::open(&db).unwrap();
    run_load(
        &input,
        None,
        DecodePolicy::default(),
        &mut session,
        &LoadOptions::default(),
    )
    .unwrap();

    let conn = session.connection();
    assert_eq!(
        count(conn, "SELECT COUNT(*) FROM publisher WHERE publisher = 'Springer'"),
        2
    );
    assert_eq!(
        count(conn, "SELECT COUNT(DISTINCT publisher) FROM publication"),
        2
    );
}

#[test]
fn test_rerun_into_same_database_rejected_by_key() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dblp.xml", sample_xml());
    let db = create_database(dir.path());

    let mut session = SqliteSession::open(&db).unwrap();
    run_load(
        &input,
        None,
        DecodePolicy::default(),
        &mut session,
        &LoadOptions::default(),
    )
    .unwrap();
    drop(session);

    let mut session = SqliteSession::open(&db).unwrap();
    let err = run_load(
        &input,
        None,
        DecodePolicy::default(),
        &mut session,
        &LoadOptions::default(),
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("a1"));
    drop(session);

    // the failed run's uncommitted rows were rolled back
    let conn = Connection::open(&db).unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM publication"), 3);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM title"), 2);
}

#[test]
fn test_deferred_constraint_detects_dangling_rows() {
    let dir = TempDir::new().unwrap();
    let input = write_input(dir.path(), "dblp.xml", sample_xml());
    let db = create_database(dir.path());

    let options = LoadOptions {
        add_constraints: false,
        ..LoadOptions::default()
    };
    let mut session = SqliteSession::open(&db).unwrap();
    run_load(&input, None, DecodePolicy::default(), &mut session, &options).unwrap();
    drop(session);

    // the bundled SQLite enforces foreign keys by default
    Connection::open(&db)
        .unwrap()
        .execute_batch(
            "PRAGMA foreign_keys = OFF;
             DELETE FROM publication WHERE key = 'books/x/b1';",
        )
        .unwrap();

    let mut session = SqliteSession::open(&db).unwrap();
    let err = session.add_foreign_keys().unwrap_err();
    assert!(err.to_string().contains("reference a missing publication"));
}

#[test]
fn test_missing_schema_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.sqlite");
    Connection::open(&path).unwrap();
    assert!(SqliteSession::open(&path).is_err());
}
