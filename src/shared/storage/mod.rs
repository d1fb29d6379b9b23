//! ローカルキー・バリューストア
//!
//! 端末ごとに永続化される小さな値（"true"/"false" やJSON文字列）を保存する。
//! キーをまたいだトランザクションは提供しない。
use crate::shared::errors::{AppError, AppResult};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

pub mod sqlite;

pub use sqlite::SqliteKeyValueStore;

/// キー・バリューストアのインターフェース
pub trait KeyValueStore: Send + Sync {
    /// 値を取得する（存在しない場合はNone）
    fn get(&self, key: &str) -> impl Future<Output = AppResult<Option<String>>> + Send;

    /// 値を保存する（既存の値は上書き）
    fn set(&self, key: &str, value: &str) -> impl Future<Output = AppResult<()>> + Send;

    /// 値を削除する
    fn remove(&self, key: &str) -> impl Future<Output = AppResult<()>> + Send;
}

/// 真偽値を保存する際の文字列表現
pub fn encode_flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// 保存された文字列を真偽値として解釈する（"true" 以外はfalse）
pub fn decode_flag(value: Option<&str>) -> bool {
    value == Some("true")
}

/// メモリ上のキー・バリューストア
///
/// テストやプレビューで使用する。`fail_reads` / `fail_writes` で障害を再現できる。
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 読み込みを失敗させるかどうかを切り替える
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// 書き込みを失敗させるかどうかを切り替える
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 保存されている値を同期的に覗く
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!("読み込みに失敗しました: {key}")));
        }
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: &str) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!("書き込みに失敗しました: {key}")));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!("削除に失敗しました: {key}")));
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}
