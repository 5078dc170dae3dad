// ==========================================
// 学校档案管理系统 - 导入向导（状态机）
// ==========================================
// 流程: UPLOAD → MAPPING → PREVIEW_SELECT → COMMITTED
// 回退: PREVIEW_SELECT → MAPPING（重新映射）；任意状态 → UPLOAD（重置）
// 关口: MAPPING → PREVIEW_SELECT 需通过映射校验（失败不致命，停留在 MAPPING）
// 并发: 异步步骤持有 &mut self，同一时刻只有一个操作在执行
// ==========================================

use crate::config::ImportConfigReader;
use crate::domain::types::{DuplicateStrategy, ImportStep, TargetSchema};
use crate::i18n;
use crate::importer::column_mapper::{ColumnMapper, ColumnMapping, KeywordPolicyTable};
use crate::importer::commit_executor::{CommitExecutor, CommitReport};
use crate::importer::data_cleaner::DEFAULT_MAX_SCORE;
use crate::importer::entity_matcher::EntityMatcher;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::preview_session::{PreviewSession, PreviewSummary};
use crate::importer::row_normalizer::RowNormalizer;
use crate::importer::workbook_source::{FetchedWorkbook, SheetData, SourceInput, WorkbookSource};
use crate::repository::record_store::RecordStore;
use chrono::{Local, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 导入参数（来自配置）
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub strategy: DuplicateStrategy,
    pub primary_key: String,
    pub default_max_score: f64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            strategy: DuplicateStrategy::default(),
            primary_key: crate::domain::schema::field_keys::NATIONAL_ID.to_string(),
            default_max_score: DEFAULT_MAX_SCORE,
        }
    }
}

impl ImportSettings {
    pub async fn from_config(config: &dyn ImportConfigReader) -> ImportResult<Self> {
        Ok(Self {
            strategy: config.get_default_strategy().await?,
            primary_key: config.get_student_primary_key().await?,
            default_max_score: config.get_default_max_score().await?,
        })
    }
}

/// 预览统计的本地化描述
pub fn describe_summary(summary: &PreviewSummary) -> String {
    i18n::t_with_args(
        "summary.preview",
        &[
            ("total", &(summary.total - summary.removed).to_string()),
            ("new", &summary.new.to_string()),
            ("update", &summary.update.to_string()),
            ("skip", &summary.skip.to_string()),
        ],
    )
}

// ==========================================
// ImportWizard
// ==========================================
pub struct ImportWizard<W, R>
where
    W: WorkbookSource,
    R: RecordStore + ?Sized,
{
    source: W,
    store: Arc<R>,
    settings: ImportSettings,
    policies: KeywordPolicyTable,
    import_date: Option<NaiveDate>,

    step: ImportStep,
    schema: TargetSchema,
    fetched: Option<FetchedWorkbook>,
    sheet_name: Option<String>,
    sheet: Option<SheetData>,
    mapping: Option<ColumnMapping>,
    session: Option<PreviewSession>,
    skipped_rows: usize,
    unresolved_rows: usize,
    last_report: Option<CommitReport>,
}

impl<W, R> ImportWizard<W, R>
where
    W: WorkbookSource,
    R: RecordStore + ?Sized,
{
    /// 创建向导（初始状态 UPLOAD）
    pub fn new(source: W, store: Arc<R>, settings: ImportSettings) -> Self {
        Self {
            source,
            store,
            settings,
            policies: KeywordPolicyTable::default(),
            import_date: None,
            step: ImportStep::Upload,
            schema: TargetSchema::Students,
            fetched: None,
            sheet_name: None,
            sheet: None,
            mapping: None,
            session: None,
            skipped_rows: 0,
            unresolved_rows: 0,
            last_report: None,
        }
    }

    /// 固定导入日期（日期无法解析时的回退值；默认为当天）
    pub fn with_import_date(mut self, date: NaiveDate) -> Self {
        self.import_date = Some(date);
        self
    }

    fn ensure_step(&self, expected: ImportStep) -> ImportResult<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(ImportError::InvalidStep {
                expected,
                actual: self.step,
            })
        }
    }

    // ===== 只读访问 =====

    pub fn step(&self) -> ImportStep {
        self.step
    }

    pub fn schema(&self) -> TargetSchema {
        self.schema
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    pub fn sheet_names(&self) -> &[String] {
        self.fetched
            .as_ref()
            .map(|f| f.sheet_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn current_sheet(&self) -> Option<&str> {
        self.sheet_name.as_deref()
    }

    pub fn headers(&self) -> &[String] {
        self.sheet.as_ref().map(|s| s.headers.as_slice()).unwrap_or(&[])
    }

    pub fn mapping(&self) -> Option<&ColumnMapping> {
        self.mapping.as_ref()
    }

    /// 尚未映射的表头（供人工选择）
    pub fn unmapped_headers(&self) -> Vec<&str> {
        match (&self.mapping, &self.sheet) {
            (Some(mapping), Some(sheet)) => mapping.unmapped_headers(&sheet.headers),
            _ => Vec::new(),
        }
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        self.session.as_ref()
    }

    /// 预览会话的可变访问（选择/删除/排序/策略）
    pub fn session_mut(&mut self) -> ImportResult<&mut PreviewSession> {
        self.ensure_step(ImportStep::PreviewSelect)?;
        self.session
            .as_mut()
            .ok_or_else(|| ImportError::InternalError("预览会话缺失".to_string()))
    }

    /// 标准化阶段丢弃的行数
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// 无法关联学生的行数（成绩/考勤）
    pub fn unresolved_rows(&self) -> usize {
        self.unresolved_rows
    }

    pub fn last_report(&self) -> Option<&CommitReport> {
        self.last_report.as_ref()
    }

    // ===== UPLOAD =====

    /// 获取工作簿并进入 MAPPING（默认选中第一个工作表）
    ///
    /// # 错误
    /// 获取错误对当前步骤致命，状态保持 UPLOAD
    #[instrument(skip(self), fields(source = %input.describe()))]
    pub async fn load(&mut self, input: &SourceInput, schema: TargetSchema) -> ImportResult<()> {
        self.ensure_step(ImportStep::Upload)?;

        let fetched = self.source.fetch(input).await.map_err(|e| {
            warn!(error = %e, "工作簿获取失败");
            e
        })?;
        let first_sheet = fetched
            .sheet_names
            .first()
            .cloned()
            .ok_or(ImportError::EmptyWorkbook)?;

        info!(sheets = fetched.sheet_names.len(), schema = %schema, "工作簿已加载");
        let sheet = self.source.read_sheet(&fetched.workbook, &first_sheet)?;

        self.schema = schema;
        self.fetched = Some(fetched);
        self.apply_sheet(first_sheet, sheet);
        self.step = ImportStep::Mapping;
        Ok(())
    }

    fn apply_sheet(&mut self, name: String, sheet: SheetData) {
        let mapping = ColumnMapper::new(&self.policies).guess(&sheet.headers, self.schema);
        info!(
            sheet = %name,
            headers = sheet.headers.len(),
            rows = sheet.rows.len(),
            mapped = mapping.mapped_fields().len(),
            "列映射已推断"
        );
        self.sheet_name = Some(name);
        self.sheet = Some(sheet);
        self.mapping = Some(mapping);
    }

    // ===== MAPPING =====

    /// 切换工作表（重新推断映射）
    pub fn select_sheet(&mut self, name: &str) -> ImportResult<()> {
        self.ensure_step(ImportStep::Mapping)?;
        let fetched = self
            .fetched
            .as_ref()
            .ok_or_else(|| ImportError::InternalError("工作簿缺失".to_string()))?;
        let sheet = self.source.read_sheet(&fetched.workbook, name)?;
        self.apply_sheet(name.to_string(), sheet);
        Ok(())
    }

    /// 人工设置/取消单个字段的映射
    pub fn set_mapping(&mut self, field_key: &str, header: Option<&str>) -> ImportResult<()> {
        self.ensure_step(ImportStep::Mapping)?;
        let mapping = self
            .mapping
            .as_mut()
            .ok_or_else(|| ImportError::InternalError("映射缺失".to_string()))?;
        mapping.set(field_key, header);
        Ok(())
    }

    /// 校验映射并生成预览，进入 PREVIEW_SELECT
    ///
    /// # 错误
    /// - MappingIncomplete: 非致命，状态保持 MAPPING
    #[instrument(skip(self), fields(schema = %self.schema))]
    pub async fn build_preview(&mut self) -> ImportResult<PreviewSummary> {
        self.ensure_step(ImportStep::Mapping)?;
        let (Some(mapping), Some(sheet)) = (self.mapping.as_ref(), self.sheet.as_ref()) else {
            return Err(ImportError::InternalError("映射缺失".to_string()));
        };
        mapping.validate(&self.settings.primary_key)?;

        let students = self.store.list_existing(TargetSchema::Students).await?;
        let existing = if self.schema == TargetSchema::Students {
            Vec::new()
        } else {
            self.store.list_existing(self.schema).await?
        };
        let existing = if self.schema == TargetSchema::Students {
            &students
        } else {
            &existing
        };

        let import_date = self.import_date.unwrap_or_else(|| Local::now().date_naive());
        let normalized = RowNormalizer::new(mapping, &self.settings.primary_key, import_date)
            .with_default_max_score(self.settings.default_max_score)
            .normalize_all(&sheet.rows);

        let matcher = EntityMatcher::new(&self.settings.primary_key, &students, existing);
        let skipped_rows = normalized.skipped_rows();
        let matched = matcher.match_all(normalized.records);

        let allowed: BTreeSet<String> = mapping
            .mapped_fields()
            .into_iter()
            .map(str::to_string)
            .collect();
        let session = PreviewSession::new(
            self.schema,
            &self.settings.primary_key,
            matched.matched,
            self.settings.strategy,
            allowed,
        );
        let summary = session.summary();

        info!(
            total = summary.total,
            new = summary.new,
            update = summary.update,
            skip = summary.skip,
            skipped_rows,
            unresolved_rows = matched.unresolved.len(),
            "预览已生成"
        );

        self.skipped_rows = skipped_rows;
        self.unresolved_rows = matched.unresolved.len();
        self.session = Some(session);
        self.step = ImportStep::PreviewSelect;
        Ok(summary)
    }

    // ===== PREVIEW_SELECT =====

    /// 返回映射步骤（丢弃预览会话，保留映射）
    pub fn back_to_mapping(&mut self) -> ImportResult<()> {
        self.ensure_step(ImportStep::PreviewSelect)?;
        self.session = None;
        self.skipped_rows = 0;
        self.unresolved_rows = 0;
        self.step = ImportStep::Mapping;
        Ok(())
    }

    /// 提交已选行
    ///
    /// # 返回
    /// - Ok: 进入 COMMITTED，预览会话被丢弃
    /// - Err(CommitFailed): 状态与选择保持不变，可直接重试
    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> ImportResult<CommitReport> {
        self.ensure_step(ImportStep::PreviewSelect)?;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ImportError::InternalError("预览会话缺失".to_string()))?;

        let report = CommitExecutor::new(Arc::clone(&self.store))
            .commit(session)
            .await?;

        info!(
            "{}",
            i18n::t_with_args(
                "summary.committed",
                &[("count", &(report.inserted + report.updated).to_string())]
            )
        );
        self.session = None;
        self.last_report = Some(report);
        self.step = ImportStep::Committed;
        Ok(report)
    }

    // ===== 任意状态 =====

    /// 完全重置到 UPLOAD
    pub fn reset(&mut self) {
        self.fetched = None;
        self.sheet_name = None;
        self.sheet = None;
        self.mapping = None;
        self.session = None;
        self.skipped_rows = 0;
        self.unresolved_rows = 0;
        self.last_report = None;
        self.step = ImportStep::Upload;
        info!("导入向导已重置");
    }
}
