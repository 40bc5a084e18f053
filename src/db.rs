use crate::cache::{PartyRole, VendorProfile, VendorRoleCache};
use crate::error::{Result, ScanError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed vendor-role store, shared across runs.
pub struct VendorDb {
    conn: Mutex<Connection>,
}

/// One stored vendor row.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorRow {
    pub tax_id: String,
    pub profile: VendorProfile,
    pub usage_count: i64,
    pub last_used: String,
}

impl VendorDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            INSERT INTO schema_version (version) SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_version LIMIT 1);
            CREATE TABLE IF NOT EXISTS vendor_roles (
                tax_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL DEFAULT '',
                role TEXT NOT NULL,
                usage_count INTEGER DEFAULT 1,
                last_used TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn get(&self, tax_id: &str) -> Result<Option<VendorRow>> {
        let conn = self.conn.lock().map_err(|_| ScanError::CachePoisoned)?;
        let row = conn
            .query_row(
                "SELECT tax_id, display_name, role, usage_count, last_used FROM vendor_roles WHERE tax_id = ?",
                params![tax_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(tax_id, display_name, role, usage_count, last_used)| {
            let role = PartyRole::parse(&role)?;
            Some(VendorRow {
                tax_id,
                profile: VendorProfile { display_name, role },
                usage_count,
                last_used,
            })
        }))
    }

    /// Insert or overwrite (last writer wins). An empty display name keeps the stored one.
    pub fn upsert(&self, tax_id: &str, profile: &VendorProfile) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| ScanError::CachePoisoned)?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO vendor_roles (tax_id, display_name, role, usage_count, last_used)
             VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(tax_id) DO UPDATE SET
               display_name = CASE WHEN excluded.display_name = '' THEN display_name ELSE excluded.display_name END,
               role = excluded.role,
               usage_count = usage_count + 1,
               last_used = excluded.last_used",
            params![tax_id, profile.display_name, profile.role.as_str(), now],
        )?;
        Ok(())
    }

    pub fn all(&self) -> Result<Vec<VendorRow>> {
        let conn = self.conn.lock().map_err(|_| ScanError::CachePoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT tax_id, display_name, role, usage_count, last_used FROM vendor_roles ORDER BY tax_id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (tax_id, display_name, role, usage_count, last_used) = row?;
            match PartyRole::parse(&role) {
                Some(role) => out.push(VendorRow {
                    tax_id,
                    profile: VendorProfile { display_name, role },
                    usage_count,
                    last_used,
                }),
                None => log::warn!("vendor_roles: skipping {} with unknown role '{}'", tax_id, role),
            }
        }
        Ok(out)
    }

    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| ScanError::CachePoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vendor_roles", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| ScanError::CachePoisoned)?;
        let count = conn.execute("DELETE FROM vendor_roles", [])?;
        Ok(count as u64)
    }
}

impl VendorRoleCache for VendorDb {
    fn lookup(&self, tax_id: &str) -> Option<VendorProfile> {
        match self.get(tax_id) {
            Ok(row) => row.map(|r| r.profile),
            Err(e) => {
                log::warn!("vendor lookup for {} failed: {}", tax_id, e);
                None
            }
        }
    }

    fn remember(&self, tax_id: &str, profile: VendorProfile) -> Result<()> {
        self.upsert(tax_id, &profile)
    }
}
