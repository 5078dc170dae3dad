// ==========================================
// 学校档案管理系统 - 命令行导入入口
// ==========================================
// 用法:
//   school-import <文件或URL> [students|performance|attendance] [工作表] [--commit]
// 流程: 上传 → 自动列映射 → 预览（日志输出）→ 可选提交
// 环境变量: SCHOOL_IMPORT_DB_PATH / RUST_LOG / SCHOOL_IMPORT_LOG_FORMAT
// ==========================================

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use school_records_import::config::{get_default_db_path, ConfigManager, ImportConfigReader};
use school_records_import::db::{ensure_schema, open_sqlite_connection};
use school_records_import::domain::schema::find_field;
use school_records_import::i18n;
use school_records_import::importer::{
    describe_summary, ImportSettings, ImportWizard, SourceInput, SpreadsheetSource,
};
use school_records_import::{logging, SqliteRecordStore, TargetSchema};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

const USAGE: &str =
    "用法: school-import <文件或URL> [students|performance|attendance] [工作表] [--commit]";

/// 命令行参数
#[derive(Debug, PartialEq)]
struct CliArgs {
    source: String,
    schema: TargetSchema,
    sheet: Option<String>,
    commit: bool,
}

/// 解析命令行参数（不含程序名）
fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut commit = false;
    let mut positional = Vec::new();
    for arg in args {
        match arg.as_str() {
            "--commit" => commit = true,
            flag if flag.starts_with("--") => bail!("未知参数: {} ({})", flag, USAGE),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let Some(source) = positional.next() else {
        bail!(USAGE);
    };
    let schema = match positional.next() {
        Some(raw) => TargetSchema::from_str(&raw)
            .with_context(|| format!("未知的目标模式: {} ({})", raw, USAGE))?,
        None => TargetSchema::Students,
    };
    let sheet = positional.next();
    if let Some(extra) = positional.next() {
        bail!("多余参数: {} ({})", extra, USAGE);
    }

    Ok(CliArgs {
        source,
        schema,
        sheet,
        commit,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let CliArgs {
        source: source_arg,
        schema,
        sheet,
        commit,
    } = parse_args(std::env::args().skip(1))?;

    info!("==================================================");
    info!("{} v{}", school_records_import::APP_NAME, school_records_import::VERSION);
    info!("==================================================");

    // 共享同一个数据库连接
    let db_path = get_default_db_path();
    info!("使用数据库: {}", db_path);
    let conn: Connection =
        open_sqlite_connection(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?;
    ensure_schema(&conn).context("建表失败")?;
    let conn = Arc::new(Mutex::new(conn));

    let config = ConfigManager::from_connection(conn.clone())?;
    i18n::set_locale(&config.get_locale().await?);
    let settings = ImportSettings::from_config(&config).await?;
    let source = SpreadsheetSource::from_config(&config).await?;
    let store = Arc::new(SqliteRecordStore::from_connection(conn));

    let mut wizard = ImportWizard::new(source, store, settings);

    // ===== 上传 =====
    wizard
        .load(&SourceInput::from_arg(&source_arg), schema)
        .await
        .with_context(|| format!("无法读取: {}", source_arg))?;
    info!(sheets = ?wizard.sheet_names(), "可用工作表");
    if let Some(sheet) = &sheet {
        wizard.select_sheet(sheet)?;
    }

    // ===== 映射 =====
    if let Some(mapping) = wizard.mapping() {
        for field in mapping.mapped_fields() {
            let label = find_field(schema, field).map(|f| f.label).unwrap_or(field);
            info!(field = label, header = mapping.get(field).unwrap_or(""), "列映射");
        }
    }
    let unmapped = wizard.unmapped_headers();
    if !unmapped.is_empty() {
        info!(headers = ?unmapped, "未使用的列");
    }

    // ===== 预览 =====
    let summary = match wizard.build_preview().await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("{}", e);
            return Err(e.into());
        }
    };
    info!("{}", describe_summary(&summary));
    if wizard.skipped_rows() > 0 || wizard.unresolved_rows() > 0 {
        warn!(
            skipped_rows = wizard.skipped_rows(),
            unresolved_rows = wizard.unresolved_rows(),
            "部分行未进入预览"
        );
    }

    if let Some(session) = wizard.session() {
        for row in session.visible_rows() {
            let changed: Vec<&str> = row.simulated_record.changed_fields().collect();
            info!(
                row = row.original_index + 1,
                status = %i18n::t(row.status().label_key()),
                key_collision = row.simulated_record.key_collision,
                changed = ?changed,
                "预览行"
            );
        }
    }

    // ===== 提交 =====
    if commit {
        let report = wizard.commit().await?;
        let written = (report.inserted + report.updated).to_string();
        info!(
            inserted = report.inserted,
            updated = report.updated,
            skipped = report.skipped,
            "{}",
            i18n::t_with_args("summary.committed", &[("count", written.as_str())])
        );
    } else {
        info!("预览模式, 未写入数据库（追加 --commit 以提交）");
    }

    Ok(())
}
