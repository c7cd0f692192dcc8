use crate::models::{Record, Table, Value};
use anyhow::{bail, Context, Result};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// The database side of a load.
///
/// Every write of a run goes through one session, in program order. Writes
/// are pending until [`Session::commit`]; an implementation must discard
/// pending writes if it is dropped without a commit.
pub trait Session {
    /// Inserts a row that nothing references by id.
    fn insert(&mut self, record: &Record) -> Result<()>;

    /// Inserts a row and returns its generated surrogate id.
    fn insert_returning_id(&mut self, record: &Record) -> Result<i64>;

    fn commit(&mut self) -> Result<()>;

    /// Enforces the foreign keys from the publication-owned tables to
    /// `publication(key)`. Runs once, after the whole load is committed.
    fn add_foreign_keys(&mut self) -> Result<()>;
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Id(id) => ToSqlOutput::from(*id),
        })
    }
}

/// Builds the INSERT statement for a record. Identifiers come from the
/// closed table/column sets and are quoted; values are always bound.
pub fn insert_sql(record: &Record) -> String {
    if record.is_empty() {
        return format!("INSERT INTO \"{}\" DEFAULT VALUES", record.table);
    }
    let columns = record
        .fields()
        .iter()
        .map(|(c, _)| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=record.fields().len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders})",
        record.table
    )
}

/// A session on an existing SQLite database.
///
/// The database file and its tables must already exist. Foreign-key
/// enforcement is off while loading and switched on by
/// [`Session::add_foreign_keys`] once every dangling reference has been ruled
/// out.
pub struct SqliteSession {
    conn: Connection,
    in_transaction: bool,
}

impl SqliteSession {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Cannot open database at {}", path.display()))?;
        debug!(path = %path.display(), "Opened database");
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = OFF;")
            .context("Failed to disable foreign keys for the load")?;
        let session = Self {
            conn,
            in_transaction: false,
        };
        session.check_tables()?;
        Ok(session)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn check_tables(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
        let missing: Vec<&str> = Table::ALL
            .iter()
            .map(Table::name)
            .filter(|name| !stmt.exists([name]).unwrap_or(false))
            .collect();
        if !missing.is_empty() {
            bail!(
                "Database is missing tables: {}. The schema must exist before loading.",
                missing.join(", ")
            );
        }
        Ok(())
    }

    fn begin_if_needed(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn execute(&mut self, record: &Record) -> Result<()> {
        self.begin_if_needed()?;
        let sql = insert_sql(record);
        let mut stmt = self
            .conn
            .prepare_cached(&sql)
            .with_context(|| format!("Failed to prepare: {sql}"))?;
        stmt.execute(params_from_iter(record.fields().iter().map(|(_, v)| v)))
            .with_context(|| format!("Insert into {} failed", record.table))?;
        Ok(())
    }

    fn dangling_rows(&self, table: Table) -> Result<u64> {
        let sql = format!("PRAGMA foreign_key_check({table})");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut count = 0u64;
        while rows.next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}

impl Session for SqliteSession {
    fn insert(&mut self, record: &Record) -> Result<()> {
        self.execute(record)
    }

    fn insert_returning_id(&mut self, record: &Record) -> Result<i64> {
        self.execute(record)?;
        Ok(self.conn.last_insert_rowid())
    }

    fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.conn.execute_batch("COMMIT").context("Commit failed")?;
            self.in_transaction = false;
        }
        Ok(())
    }

    fn add_foreign_keys(&mut self) -> Result<()> {
        self.commit()?;
        for table in Table::PUBLICATION_REFERENCING {
            let dangling = self.dangling_rows(table)?;
            if dangling > 0 {
                bail!("{dangling} rows in {table} reference a missing publication");
            }
            debug!(%table, "Foreign key check passed");
        }
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        info!("Foreign key constraints enforced");
        Ok(())
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Rolling back uncommitted writes");
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "Rollback failed");
            }
        }
    }
}

/// A session that writes nothing: it counts rows per table and hands out
/// sequential ids. Used for `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRunSession {
    rows: BTreeMap<Table, u64>,
    next_id: i64,
    commits: u64,
    constraints_added: bool,
}

impl DryRunSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: Table) -> u64 {
        self.rows.get(&table).copied().unwrap_or(0)
    }

    pub fn commits(&self) -> u64 {
        self.commits
    }

    pub fn constraints_added(&self) -> bool {
        self.constraints_added
    }
}

impl Session for DryRunSession {
    fn insert(&mut self, record: &Record) -> Result<()> {
        *self.rows.entry(record.table).or_insert(0) += 1;
        Ok(())
    }

    fn insert_returning_id(&mut self, record: &Record) -> Result<i64> {
        self.insert(record)?;
        self.next_id += 1;
        Ok(self.next_id)
    }

    fn commit(&mut self) -> Result<()> {
        self.commits += 1;
        Ok(())
    }

    fn add_foreign_keys(&mut self) -> Result<()> {
        self.constraints_added = true;
        Ok(())
    }
}
