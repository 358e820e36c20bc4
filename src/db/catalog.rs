use std::collections::HashMap;

use sqlx::SqlitePool;
use tracing::info;

use crate::db::{connection, schema};

/// Map of database name to connection pool, built once at startup from the
/// `.db` files found in the data directory. Jobs are addressed by
/// `(database, id)`, so every pool also gets the bookkeeping tables.
pub struct Catalog {
    databases: HashMap<String, SqlitePool>,
}

impl Catalog {
    /// Scan `data_dir` for `*.db` files and open a pool for each
    pub async fn open(data_dir: &str) -> Result<Self, sqlx::Error> {
        let mut databases = HashMap::new();

        let entries = std::fs::read_dir(data_dir).map_err(sqlx::Error::Io)?;
        for entry in entries {
            let entry = entry.map_err(sqlx::Error::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let pool = connection::get_connection(&path).await?;
            schema::ensure_tables(&pool).await?;
            info!("Opened database '{}' from {}", name, path.display());
            databases.insert(name.to_string(), pool);
        }

        Ok(Self { databases })
    }

    /// Build a catalog from already-open pools. Ensures bookkeeping tables.
    pub async fn from_pools(
        pools: Vec<(String, SqlitePool)>,
    ) -> Result<Self, sqlx::Error> {
        let mut databases = HashMap::new();
        for (name, pool) in pools {
            schema::ensure_tables(&pool).await?;
            databases.insert(name, pool);
        }
        Ok(Self { databases })
    }

    pub fn get(&self, name: &str) -> Option<&SqlitePool> {
        self.databases.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.databases.keys().cloned().collect()
    }

    pub async fn close_all(&self) {
        for (name, pool) in &self.databases {
            pool.close().await;
            info!("Closed database '{}'", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_skips_non_db_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::write(dir.path().join("items.db"), []).unwrap();

        let catalog = Catalog::open(dir.path().to_str().unwrap()).await.unwrap();
        assert!(catalog.get("items").is_some());
        assert!(catalog.get("notes").is_none());
        catalog.close_all().await;
    }
}
