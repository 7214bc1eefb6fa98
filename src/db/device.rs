//! Device repository

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A persisted device record
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Persistence port for device records.
///
/// The core calls `upsert` when a device identifies and `delete` when an
/// operator forgets a device; `find_all` serves the external surface.
pub trait DeviceRepository: Send + Sync {
    /// List every known device
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    fn find_all(&self) -> Result<Vec<DeviceRecord>>;

    /// Insert or refresh a device record
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written
    fn upsert(&self, id: &str, name: &str, device_type: &str) -> Result<()>;

    /// Remove a device record. Removing an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be written
    fn delete(&self, id: &str) -> Result<()>;
}

/// SQLite realisation of the repository port
#[derive(Clone)]
pub struct SqliteDeviceRepository {
    pool: DbPool,
}

impl SqliteDeviceRepository {
    /// Create a repository over a pool
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl DeviceRepository for SqliteDeviceRepository {
    fn find_all(&self) -> Result<Vec<DeviceRecord>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, name, device_type, first_seen, last_seen
                 FROM devices ORDER BY last_seen DESC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let records = stmt
            .query_map([], |row| {
                Ok(DeviceRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    device_type: row.get(2)?,
                    first_seen: parse_datetime(&row.get::<_, String>(3)?),
                    last_seen: parse_datetime(&row.get::<_, String>(4)?),
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(records)
    }

    fn upsert(&self, id: &str, name: &str, device_type: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO devices (id, name, device_type, first_seen, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 device_type = excluded.device_type,
                 last_seen = excluded.last_seen",
            [id, name, device_type, &now],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    fn delete(&self, id: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute("DELETE FROM devices WHERE id = ?1", [id])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

/// Parse an RFC 3339 timestamp, falling back to now on corruption
fn parse_datetime(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn repo() -> SqliteDeviceRepository {
        SqliteDeviceRepository::new(db::init_memory().unwrap())
    }

    #[test]
    fn upsert_inserts_then_refreshes() {
        let repo = repo();
        repo.upsert("/dev/ttyACM0", "GenericBoard", "Generic").unwrap();
        repo.upsert("/dev/ttyACM0", "LedController_01", "LedController")
            .unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "LedController_01");
        assert_eq!(all[0].device_type, "LedController");
    }

    #[test]
    fn delete_is_idempotent() {
        let repo = repo();
        repo.upsert("192.0.2.7:3030", "GenericBoard", "Generic").unwrap();
        repo.delete("192.0.2.7:3030").unwrap();
        repo.delete("192.0.2.7:3030").unwrap();
        assert!(repo.find_all().unwrap().is_empty());
    }
}
