//! SQLiteを使用したキー・バリューストア
use super::KeyValueStore;
use crate::shared::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLiteキー・バリューストア
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// データベースファイルを開き、テーブルを作成する
    ///
    /// # 引数
    /// * `database_path` - データベースファイルのパス（親ディレクトリが無ければ作成）
    ///
    /// # 戻り値
    /// ストア、または失敗時はエラー
    pub fn open(database_path: &Path) -> AppResult<Self> {
        if let Some(parent) = database_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                log::info!("アプリケーションデータディレクトリを作成: {parent:?}");
            }
        }

        let conn = Connection::open(database_path)?;
        create_tables(&conn)?;

        log::info!("キー・バリューストアを初期化しました: {database_path:?}");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// メモリ上のデータベースでストアを作成する
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::concurrency(format!("データベースロックエラー: {e}")))
    }
}

/// キー・バリューテーブルを作成する
fn create_tables(conn: &Connection) -> AppResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv_store (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        log::debug!("値を保存しました: key={key}");
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();

        store.set("premium_coupon_mode", "false").await.unwrap();
        store.set("premium_coupon_mode", "true").await.unwrap();

        let value = store.get("premium_coupon_mode").await.unwrap();
        assert_eq!(value.as_deref(), Some("true"));
        assert_eq!(store.get("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = SqliteKeyValueStore::open_in_memory().unwrap();
        store.set("key", "value").await.unwrap();
        store.remove("key").await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dev_petcare.db");

        {
            let store = SqliteKeyValueStore::open(&path).unwrap();
            store
                .set("premium_redeemed_coupons", r##"["#CARNAVAU#"]"##)
                .await
                .unwrap();
        }

        let reopened = SqliteKeyValueStore::open(&path).unwrap();
        let value = reopened.get("premium_redeemed_coupons").await.unwrap();
        assert_eq!(value.as_deref(), Some(r##"["#CARNAVAU#"]"##));
    }
}
