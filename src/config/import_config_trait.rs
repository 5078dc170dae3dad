// ==========================================
// 学校档案管理系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::DuplicateStrategy;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    // ===== 匹配与合并 =====

    /// 获取默认重复处理策略
    ///
    /// # 默认值
    /// - MERGE_UPDATE
    async fn get_default_strategy(&self) -> RepositoryResult<DuplicateStrategy>;

    /// 获取学生主键字段（必须是学生模式的唯一候选字段）
    ///
    /// # 默认值
    /// - nationalId
    async fn get_student_primary_key(&self) -> RepositoryResult<String>;

    // ===== 标准化 =====

    /// 获取成绩满分默认值（满分无法解析时使用）
    ///
    /// # 默认值
    /// - 20
    async fn get_default_max_score(&self) -> RepositoryResult<f64>;

    // ===== 工作簿获取 =====

    /// 获取单次下载超时（秒）
    ///
    /// # 默认值
    /// - 15
    async fn get_fetch_timeout_secs(&self) -> RepositoryResult<u64>;

    /// 获取代理前缀列表（直连失败后按顺序尝试）
    ///
    /// # 返回
    /// - Vec<String>: 前缀，目标 URL 编码后直接拼接
    async fn get_proxy_prefixes(&self) -> RepositoryResult<Vec<String>>;

    // ===== 界面 =====

    /// 获取界面语言
    ///
    /// # 默认值
    /// - en
    async fn get_locale(&self) -> RepositoryResult<String>;
}
