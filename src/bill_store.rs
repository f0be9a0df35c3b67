use rusqlite::{Connection, Result as SqliteResult, params};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

pub struct BillStore {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct BillRecord {
    pub id: String,
    pub inbox_id: String,
    pub thread_id: Option<String>,
    pub message_id: String,
    pub from_email: Option<String>,
    pub subject: Option<String>,
    pub payee: Option<String>,
    pub amount_cents: Option<i64>,
    pub due_date_iso: Option<String>,
    /// One of: autopay | approval | failed
    pub status: String,
    pub agent_reply_sent: bool,
    pub user_notification_sent: bool,
}

#[derive(Debug)]
pub struct PaymentRecord {
    pub bill_id: String,
    pub provider_payment_id: Option<String>,
    pub amount_cents: i64,
    pub dry_run: bool,
    /// One of: simulated | pending | succeeded | failed
    pub status: String,
}

impl BillStore {
    /// Create a new bill store with SQLite backend
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS bills (
                id TEXT PRIMARY KEY,
                inbox_id TEXT NOT NULL,
                thread_id TEXT,
                message_id TEXT UNIQUE NOT NULL,
                from_email TEXT,
                subject TEXT,
                payee TEXT,
                amount_cents INTEGER,
                due_date_iso TEXT,
                status TEXT NOT NULL DEFAULT 'failed',
                agent_reply_sent INTEGER NOT NULL DEFAULT 0,
                user_notification_sent INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                bill_id TEXT NOT NULL,
                provider_payment_id TEXT,
                amount_cents INTEGER NOT NULL,
                dry_run INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'simulated',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (bill_id) REFERENCES bills(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS event_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                message_id TEXT,
                payload TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bills_message_id ON bills(message_id)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bills_status ON bills(status)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_payments_bill_id ON payments(bill_id)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Deterministic bill id from the inbox and message identifiers, so
    /// re-processing the same message can never mint a second bill.
    pub fn generate_bill_id(inbox_id: &str, message_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(inbox_id.as_bytes());
        hasher.update(message_id.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn insert_bill(&self, bill: &BillRecord) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO bills
                (id, inbox_id, thread_id, message_id, from_email, subject,
                 payee, amount_cents, due_date_iso, status,
                 agent_reply_sent, user_notification_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                bill.id,
                bill.inbox_id,
                bill.thread_id,
                bill.message_id,
                bill.from_email,
                bill.subject,
                bill.payee,
                bill.amount_cents,
                bill.due_date_iso,
                bill.status,
                bill.agent_reply_sent,
                bill.user_notification_sent,
            ],
        )?;
        info!(bill_id = %bill.id, status = %bill.status, "Bill stored");
        Ok(())
    }

    /// Idempotency lookup: a message already recorded must not be
    /// processed again.
    pub fn find_by_message_id(&self, message_id: &str) -> SqliteResult<Option<BillRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, inbox_id, thread_id, message_id, from_email, subject,
                    payee, amount_cents, due_date_iso, status,
                    agent_reply_sent, user_notification_sent
             FROM bills
             WHERE message_id = ?1",
        )?;

        let mut rows = stmt.query(params![message_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_bill(row)?)),
            None => Ok(None),
        }
    }

    pub fn set_reply_sent(&self, bill_id: &str) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE bills SET agent_reply_sent = 1, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            params![bill_id],
        )?;
        Ok(())
    }

    pub fn set_notification_sent(&self, bill_id: &str) -> SqliteResult<()> {
        self.conn.execute(
            "UPDATE bills SET user_notification_sent = 1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            params![bill_id],
        )?;
        Ok(())
    }

    pub fn insert_payment(&self, payment: &PaymentRecord) -> SqliteResult<i64> {
        self.conn.execute(
            "INSERT INTO payments (bill_id, provider_payment_id, amount_cents, dry_run, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                payment.bill_id,
                payment.provider_payment_id,
                payment.amount_cents,
                payment.dry_run,
                payment.status,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        info!(payment_id = id, bill_id = %payment.bill_id, "Payment stored");
        Ok(id)
    }

    /// Append to the audit trail; payload is a JSON blob.
    pub fn log_event(
        &self,
        kind: &str,
        message_id: Option<&str>,
        payload: Option<&str>,
    ) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO event_logs (kind, message_id, payload) VALUES (?1, ?2, ?3)",
            params![kind, message_id, payload],
        )?;
        Ok(())
    }

    /// Get counts of bills by outcome: (total, autopay, approval)
    pub fn counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let total: usize = self
            .conn
            .query_row("SELECT COUNT(*) FROM bills", [], |row| row.get(0))?;

        let autopay: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM bills WHERE status = 'autopay'",
            [],
            |row| row.get(0),
        )?;

        let approval: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM bills WHERE status = 'approval'",
            [],
            |row| row.get(0),
        )?;

        Ok((total, autopay, approval))
    }

    fn row_to_bill(row: &rusqlite::Row<'_>) -> rusqlite::Result<BillRecord> {
        Ok(BillRecord {
            id: row.get(0)?,
            inbox_id: row.get(1)?,
            thread_id: row.get(2)?,
            message_id: row.get(3)?,
            from_email: row.get(4)?,
            subject: row.get(5)?,
            payee: row.get(6)?,
            amount_cents: row.get(7)?,
            due_date_iso: row.get(8)?,
            status: row.get(9)?,
            agent_reply_sent: row.get(10)?,
            user_notification_sent: row.get(11)?,
        })
    }
}
