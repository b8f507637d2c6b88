//! Customer-import collaborators: the delimited-file reader, the
//! validating processor, and the SQLite batch writer wired into the
//! demo jobs.
//!
//! A record that fails validation is not dropped: it is written with a
//! `failed` status so downstream auditing can see what arrived but
//! didn't pass.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use chunkflow_engine::{ItemError, ItemProcessor, ItemReader, ItemWriter, Processed};
use chunkflow_types::ExecutionContext;
use rusqlite::Connection;

/// Raw delimited row, untyped. Parsing and validation happen in the
/// processor so a malformed row is a processing failure, never a
/// source crash.
#[derive(Debug, Clone, Default)]
pub struct CustomerRecord {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: String,
    pub city: String,
}

impl CustomerRecord {
    fn from_row(row: &csv::StringRecord) -> Self {
        let field = |index: usize| row.get(index).unwrap_or_default().to_string();
        Self {
            first_name: field(0),
            last_name: field(1),
            email: field(2),
            age: field(3),
            city: field(4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerStatus {
    Processed,
    Failed,
}

impl CustomerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

/// Transformed output record.
#[derive(Debug, Clone)]
pub struct Customer {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub city: Option<String>,
    pub status: CustomerStatus,
    pub processed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Streaming delimited-file reader with restart and partition support.
///
/// `open` positions the stream from the step context: a partition's
/// `range.start`/`range.end` select a disjoint row window, and
/// `read.count` resumes past rows committed by a previous execution.
pub struct CustomerFileReader {
    rows: csv::StringRecordsIntoIter<std::fs::File>,
    index: usize,
    end: usize,
}

impl CustomerFileReader {
    /// Open `path` for reading.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`ItemError`] if the file cannot be opened.
    pub fn open_file(path: &Path, delimiter: char, has_header: bool) -> Result<Self, ItemError> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .delimiter(delimiter as u8)
            .from_path(path)
            .map_err(|e| {
                ItemError::fatal("INPUT_OPEN", format!("{}: {e}", path.display()))
            })?;
        Ok(Self {
            rows: reader.into_records(),
            index: 0,
            end: usize::MAX,
        })
    }

    fn skip_rows(&mut self, count: usize) {
        for _ in 0..count {
            if self.rows.next().is_none() {
                break;
            }
            self.index += 1;
        }
    }
}

impl ItemReader<CustomerRecord> for CustomerFileReader {
    #[allow(clippy::cast_sign_loss)]
    fn open(&mut self, context: &ExecutionContext) -> Result<(), ItemError> {
        let range_start = context.get_int("range.start").unwrap_or(0).max(0) as usize;
        if let Some(range_end) = context.get_int("range.end") {
            self.end = range_end.max(0) as usize;
        }
        let resume = context.get_int("read.count").unwrap_or(0).max(0) as usize;
        self.skip_rows(range_start + resume);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<CustomerRecord>, ItemError> {
        if self.index >= self.end {
            return Ok(None);
        }
        match self.rows.next() {
            None => Ok(None),
            Some(Ok(row)) => {
                self.index += 1;
                Ok(Some(CustomerRecord::from_row(&row)))
            }
            Some(Err(e)) => {
                self.index += 1;
                Err(ItemError::skippable("MALFORMED_ROW", e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Normalizes and validates raw customer rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerProcessor;

impl CustomerProcessor {
    fn transform_name(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let mut chars = trimmed.chars();
        let first = chars.next()?.to_uppercase().collect::<String>();
        Some(format!("{first}{}", chars.as_str().to_lowercase()))
    }

    fn normalize_email(raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    fn parse_age(raw: &str) -> Option<i64> {
        let age = raw.trim().parse::<i64>().ok()?;
        (0..=150).contains(&age).then_some(age)
    }

    fn violations(customer: &Customer) -> Vec<String> {
        let mut violations = Vec::new();
        if customer.first_name.is_none() {
            violations.push("first name is required".to_string());
        }
        if customer.last_name.is_none() {
            violations.push("last name is required".to_string());
        }
        match &customer.email {
            None => violations.push("email is required".to_string()),
            Some(email) if !email.contains('@') => {
                violations.push(format!("invalid email '{email}'"));
            }
            Some(_) => {}
        }
        violations
    }
}

impl ItemProcessor<CustomerRecord, Customer> for CustomerProcessor {
    fn process(&self, record: &CustomerRecord) -> Result<Processed<Customer>, ItemError> {
        let mut customer = Customer {
            first_name: Self::transform_name(&record.first_name),
            last_name: Self::transform_name(&record.last_name),
            email: Self::normalize_email(&record.email),
            age: Self::parse_age(&record.age),
            city: Self::transform_name(&record.city),
            status: CustomerStatus::Processed,
            processed_at: Utc::now(),
        };

        let violations = Self::violations(&customer);
        if !violations.is_empty() {
            tracing::warn!(
                email = record.email,
                "Validation failed: {}",
                violations.join("; ")
            );
            customer.status = CustomerStatus::Failed;
            return Ok(Processed::EmitFailed {
                item: customer,
                reason: violations.join("; "),
            });
        }

        if customer.age.is_some_and(|age| age >= 65) {
            tracing::info!(
                first_name = customer.first_name.as_deref().unwrap_or_default(),
                last_name = customer.last_name.as_deref().unwrap_or_default(),
                "Senior customer identified"
            );
        }
        Ok(Processed::Emit(customer))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// SQLite batch sink: one transaction per chunk, all-or-nothing.
pub struct SqliteCustomerWriter {
    conn: Mutex<Connection>,
}

const CREATE_CUSTOMERS: &str = r"
CREATE TABLE IF NOT EXISTS customers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT,
    last_name TEXT,
    email TEXT,
    age INTEGER,
    city TEXT,
    status TEXT NOT NULL,
    processed_at TEXT NOT NULL
);
";

impl SqliteCustomerWriter {
    /// Open (or create) the output database at `path`.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`ItemError`] when the database can't be
    /// opened.
    pub fn open_path(path: &Path) -> Result<Self, ItemError> {
        let conn = Connection::open(path)
            .map_err(|e| ItemError::fatal("OUTPUT_OPEN", e.to_string()))?;
        Self::with_connection(conn)
    }

    /// In-memory sink, for demos and tests.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`ItemError`] when the database can't be
    /// initialized.
    pub fn in_memory() -> Result<Self, ItemError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ItemError::fatal("OUTPUT_OPEN", e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, ItemError> {
        conn.execute_batch(CREATE_CUSTOMERS)
            .map_err(|e| ItemError::fatal("OUTPUT_DDL", e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total rows written.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`ItemError`] on a storage failure.
    pub fn count(&self) -> Result<i64, ItemError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ItemError::fatal("OUTPUT_LOCK", "writer lock poisoned"))?;
        conn.query_row("SELECT COUNT(*) FROM customers", [], |row| row.get(0))
            .map_err(|e| ItemError::fatal("OUTPUT_QUERY", e.to_string()))
    }

    /// Rows with the given status.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`ItemError`] on a storage failure.
    pub fn count_by_status(&self, status: CustomerStatus) -> Result<i64, ItemError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ItemError::fatal("OUTPUT_LOCK", "writer lock poisoned"))?;
        conn.query_row(
            "SELECT COUNT(*) FROM customers WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| ItemError::fatal("OUTPUT_QUERY", e.to_string()))
    }
}

impl ItemWriter<Customer> for SqliteCustomerWriter {
    fn write(&self, items: &[Customer]) -> Result<(), ItemError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ItemError::fatal("OUTPUT_LOCK", "writer lock poisoned"))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| ItemError::retryable("OUTPUT_TX", e.to_string()))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO customers \
                     (first_name, last_name, email, age, city, status, processed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(|e| ItemError::retryable("OUTPUT_WRITE", e.to_string()))?;
            for customer in items {
                stmt.execute(rusqlite::params![
                    customer.first_name,
                    customer.last_name,
                    customer.email,
                    customer.age,
                    customer.city,
                    customer.status.as_str(),
                    customer.processed_at.to_rfc3339(),
                ])
                .map_err(|e| ItemError::retryable("OUTPUT_WRITE", e.to_string()))?;
            }
        }
        tx.commit()
            .map_err(|e| ItemError::retryable("OUTPUT_COMMIT", e.to_string()))?;
        tracing::debug!(batch = items.len(), "Customer batch committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: [&str; 5]) -> CustomerRecord {
        CustomerRecord {
            first_name: fields[0].to_string(),
            last_name: fields[1].to_string(),
            email: fields[2].to_string(),
            age: fields[3].to_string(),
            city: fields[4].to_string(),
        }
    }

    #[test]
    fn processor_normalizes_fields() {
        let processed = CustomerProcessor
            .process(&record(["aLIce", "  SMITH ", "Alice@Example.COM", "34", "london"]))
            .unwrap();
        let Processed::Emit(customer) = processed else {
            panic!("expected emit");
        };
        assert_eq!(customer.first_name.as_deref(), Some("Alice"));
        assert_eq!(customer.last_name.as_deref(), Some("Smith"));
        assert_eq!(customer.email.as_deref(), Some("alice@example.com"));
        assert_eq!(customer.age, Some(34));
        assert_eq!(customer.city.as_deref(), Some("London"));
        assert_eq!(customer.status, CustomerStatus::Processed);
    }

    #[test]
    fn missing_email_is_tagged_failed_not_dropped() {
        let processed = CustomerProcessor
            .process(&record(["Bob", "Jones", "", "41", "leeds"]))
            .unwrap();
        let Processed::EmitFailed { item, reason } = processed else {
            panic!("expected tagged failure");
        };
        assert_eq!(item.status, CustomerStatus::Failed);
        assert!(reason.contains("email is required"));
    }

    #[test]
    fn invalid_email_and_names_collect_all_violations() {
        let processed = CustomerProcessor
            .process(&record(["", "", "not-an-email", "x", ""]))
            .unwrap();
        let Processed::EmitFailed { item, reason } = processed else {
            panic!("expected tagged failure");
        };
        assert!(reason.contains("first name"));
        assert!(reason.contains("last name"));
        assert!(reason.contains("invalid email"));
        assert!(item.age.is_none());
    }

    #[test]
    fn out_of_range_age_becomes_none() {
        assert_eq!(CustomerProcessor::parse_age("200"), None);
        assert_eq!(CustomerProcessor::parse_age("-3"), None);
        assert_eq!(CustomerProcessor::parse_age("abc"), None);
        assert_eq!(CustomerProcessor::parse_age(" 67 "), Some(67));
    }

    #[test]
    fn writer_batch_is_atomic_and_queryable() {
        let writer = SqliteCustomerWriter::in_memory().unwrap();
        let customer = |status| Customer {
            first_name: Some("A".to_string()),
            last_name: Some("B".to_string()),
            email: Some("a@b.c".to_string()),
            age: Some(30),
            city: None,
            status,
            processed_at: Utc::now(),
        };
        writer
            .write(&[
                customer(CustomerStatus::Processed),
                customer(CustomerStatus::Failed),
                customer(CustomerStatus::Processed),
            ])
            .unwrap();

        assert_eq!(writer.count().unwrap(), 3);
        assert_eq!(
            writer.count_by_status(CustomerStatus::Processed).unwrap(),
            2
        );
        assert_eq!(writer.count_by_status(CustomerStatus::Failed).unwrap(), 1);
    }

    #[test]
    fn reader_honors_restart_and_range_window() {
        let dir = std::env::temp_dir().join("chunkflow_reader_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("customers.csv");
        let mut content = String::from("first_name,last_name,email,age,city\n");
        for i in 0..10 {
            content.push_str(&format!("First{i},Last{i},user{i}@example.com,30,Town\n"));
        }
        std::fs::write(&path, content).unwrap();

        // Partition window rows [4, 8), resuming after 2 committed.
        let mut context = ExecutionContext::new();
        context.put_int("range.start", 4);
        context.put_int("range.end", 8);
        context.put_int("read.count", 2);

        let mut reader = CustomerFileReader::open_file(&path, ',', true).unwrap();
        reader.open(&context).unwrap();

        let first = reader.read().unwrap().unwrap();
        assert_eq!(first.first_name, "First6");
        let second = reader.read().unwrap().unwrap();
        assert_eq!(second.first_name, "First7");
        assert!(reader.read().unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
