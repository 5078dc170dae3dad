// ==========================================
// 学校档案管理系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 规则: 配置缺失或格式错误时回退到默认值
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::schema::{field_definitions, field_keys};
use crate::domain::types::{DuplicateStrategy, TargetSchema};
use crate::importer::data_cleaner::DEFAULT_MAX_SCORE;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// 默认下载超时（秒）
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;

/// 默认代理前缀
pub const DEFAULT_PROXY_PREFIXES: [&str; 2] = [
    "https://corsproxy.io/?url=",
    "https://api.allorigins.win/raw?url=",
];

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 从 config_kv 表读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string()))
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_default_strategy(&self) -> RepositoryResult<DuplicateStrategy> {
        let value = self.get_config_or_default(config_keys::DEFAULT_STRATEGY, "MERGE_UPDATE")?;
        Ok(DuplicateStrategy::from_str(&value).unwrap_or_else(|| {
            warn!(value = %value, "未知的重复处理策略, 使用默认值");
            DuplicateStrategy::default()
        }))
    }

    async fn get_student_primary_key(&self) -> RepositoryResult<String> {
        let value =
            self.get_config_or_default(config_keys::STUDENT_PRIMARY_KEY, field_keys::NATIONAL_ID)?;
        let is_candidate = field_definitions(TargetSchema::Students)
            .iter()
            .any(|f| f.key == value && f.is_unique_candidate);
        if is_candidate {
            Ok(value)
        } else {
            warn!(value = %value, "学生主键不是唯一候选字段, 使用默认值");
            Ok(field_keys::NATIONAL_ID.to_string())
        }
    }

    async fn get_default_max_score(&self) -> RepositoryResult<f64> {
        let value = self.get_config_or_default(config_keys::DEFAULT_MAX_SCORE, "20")?;
        Ok(value
            .parse::<f64>()
            .ok()
            .filter(|v| *v > 0.0)
            .unwrap_or(DEFAULT_MAX_SCORE))
    }

    async fn get_fetch_timeout_secs(&self) -> RepositoryResult<u64> {
        let value = self.get_config_or_default(config_keys::FETCH_TIMEOUT_SECS, "15")?;
        Ok(value
            .parse::<u64>()
            .ok()
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS))
    }

    async fn get_proxy_prefixes(&self) -> RepositoryResult<Vec<String>> {
        // 配置格式为 JSON 数组: ["https://proxy-a/?url=", "https://proxy-b/?u="]
        let defaults = || DEFAULT_PROXY_PREFIXES.iter().map(|s| s.to_string()).collect();
        let Some(raw) = self.get_config_value(config_keys::PROXY_PREFIXES)? else {
            return Ok(defaults());
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(list) => Ok(list
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()),
            Err(e) => {
                warn!(error = %e, "代理前缀配置格式错误, 使用默认值");
                Ok(defaults())
            }
        }
    }

    async fn get_locale(&self) -> RepositoryResult<String> {
        self.get_config_or_default(config_keys::LOCALE, "en")
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 匹配与合并
    pub const DEFAULT_STRATEGY: &str = "import_default_strategy";
    pub const STUDENT_PRIMARY_KEY: &str = "import_student_primary_key";

    // 标准化
    pub const DEFAULT_MAX_SCORE: &str = "import_default_max_score";

    // 工作簿获取
    pub const FETCH_TIMEOUT_SECS: &str = "import_fetch_timeout_secs";
    pub const PROXY_PREFIXES: &str = "import_proxy_prefixes"; // JSON 数组

    // 界面
    pub const LOCALE: &str = "ui_locale";
}

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 SCHOOL_IMPORT_DB_PATH（非空时）
/// - 用户数据目录/school-records-import/school_records.db
/// - 以上均不可用时: ./school_records.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("SCHOOL_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./school_records.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("school-records-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("school_records.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(path.ends_with("school_records.db") || std::env::var("SCHOOL_IMPORT_DB_PATH").is_ok());
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let config = manager();
        assert_eq!(config.get_default_strategy().await.unwrap(), DuplicateStrategy::MergeUpdate);
        assert_eq!(config.get_student_primary_key().await.unwrap(), "nationalId");
        assert_eq!(config.get_default_max_score().await.unwrap(), 20.0);
        assert_eq!(config.get_fetch_timeout_secs().await.unwrap(), 15);
        assert_eq!(config.get_proxy_prefixes().await.unwrap().len(), 2);
        assert_eq!(config.get_locale().await.unwrap(), "en");
    }

    #[tokio::test]
    async fn test_overrides_and_malformed_values() {
        let config = manager();
        config.set_config_value(config_keys::DEFAULT_STRATEGY, "skip_existing").unwrap();
        config.set_config_value(config_keys::STUDENT_PRIMARY_KEY, "studentNumber").unwrap();
        config.set_config_value(config_keys::DEFAULT_MAX_SCORE, "abc").unwrap();
        config.set_config_value(config_keys::PROXY_PREFIXES, r#"["https://p/?u="]"#).unwrap();

        assert_eq!(config.get_default_strategy().await.unwrap(), DuplicateStrategy::SkipExisting);
        assert_eq!(config.get_student_primary_key().await.unwrap(), "studentNumber");
        assert_eq!(config.get_default_max_score().await.unwrap(), 20.0);
        assert_eq!(config.get_proxy_prefixes().await.unwrap(), vec!["https://p/?u="]);

        // 非唯一候选字段不可作为主键
        config.set_config_value(config_keys::STUDENT_PRIMARY_KEY, "phone").unwrap();
        assert_eq!(config.get_student_primary_key().await.unwrap(), "nationalId");

        config.set_config_value(config_keys::PROXY_PREFIXES, "not json").unwrap();
        assert_eq!(config.get_proxy_prefixes().await.unwrap().len(), 2);
    }
}
