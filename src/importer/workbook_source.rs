// ==========================================
// 学校档案管理系统 - 工作簿来源
// ==========================================
// 职责: 将本地文件或远程 URL 转换为工作簿（工作表名 + 表头/数据行）
// 支持: Excel (.xlsx/.xlsm/.xlsb/.xls) / ODS / CSV
// 远程获取:
// - 先规范化云盘分享链接（Google Sheets/Drive、Dropbox、OneDrive/SharePoint）
// - 直连 → 依次尝试代理前缀，每次尝试受超时约束
// - 全部失败 → 单一 Fetch 错误（不自动重试）
// ==========================================

use crate::config::config_manager::DEFAULT_FETCH_TIMEOUT_SECS;
use crate::config::ImportConfigReader;
use crate::domain::record::{CellValue, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use async_trait::async_trait;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use csv::ReaderBuilder;
use reqwest::Url;
use serde::Serialize;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const WORKBOOK_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xlsb", "xls", "xla", "ods"];
const CSV_EXTENSIONS: [&str; 2] = ["csv", "txt"];

// ==========================================
// SourceInput - 导入来源
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    File(PathBuf),
    Url(String),
}

impl SourceInput {
    /// 以 http(s):// 开头视为 URL，否则视为本地路径
    pub fn from_arg(arg: &str) -> Self {
        let trimmed = arg.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceInput::Url(trimmed.to_string())
        } else {
            SourceInput::File(PathBuf::from(trimmed))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SourceInput::File(path) => path.display().to_string(),
            SourceInput::Url(url) => url.clone(),
        }
    }
}

// ==========================================
// Workbook - 已解析的工作簿（对调用方不透明）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<(String, Vec<Vec<CellValue>>)>,
}

impl Workbook {
    /// 由单元格网格构造（每个工作表: 名称 + 行）
    pub fn from_grid(sheets: Vec<(String, Vec<Vec<CellValue>>)>) -> Self {
        Self { sheets }
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.clone()).collect()
    }

    /// 读取工作表: 首个非空行为表头，跳过全空数据行
    pub fn read_sheet(&self, sheet_name: &str) -> ImportResult<SheetData> {
        let (_, grid) = self
            .sheets
            .iter()
            .find(|(name, _)| name == sheet_name)
            .ok_or_else(|| ImportError::SheetNotFound(sheet_name.to_string()))?;

        let mut rows_iter = grid
            .iter()
            .skip_while(|row| row.iter().all(CellValue::is_blank));

        let Some(header_row) = rows_iter.next() else {
            return Ok(SheetData::default());
        };
        let headers = dedupe_headers(header_row);

        let rows: Vec<RawRow> = rows_iter
            .filter(|row| !row.iter().all(CellValue::is_blank))
            .enumerate()
            .map(|(index, cells)| {
                headers
                    .iter()
                    .zip(cells.iter())
                    .fold(RawRow::new(index), |row, (header, cell)| {
                        row.with_cell(header, cell.clone())
                    })
            })
            .collect();

        debug!(sheet = sheet_name, headers = headers.len(), rows = rows.len(), "读取工作表");
        Ok(SheetData { headers, rows })
    }
}

/// 空表头 → "Column N"；重复表头 → "name (2)"、"name (3)"…
fn dedupe_headers(header_row: &[CellValue]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    header_row
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let base = match cell.as_text() {
                text if text.is_empty() => format!("Column {}", i + 1),
                text => text,
            };
            let mut name = base.clone();
            let mut n = 2;
            while seen.contains(&name) {
                name = format!("{} ({})", base, n);
                n += 1;
            }
            seen.insert(name.clone());
            name
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FetchedWorkbook {
    pub sheet_names: Vec<String>,
    pub workbook: Workbook,
}

impl FetchedWorkbook {
    fn new(workbook: Workbook) -> ImportResult<Self> {
        let sheet_names = workbook.sheet_names();
        if sheet_names.is_empty() {
            return Err(ImportError::EmptyWorkbook);
        }
        Ok(Self {
            sheet_names,
            workbook,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

// ==========================================
// WorkbookSource Trait
// ==========================================
#[async_trait]
pub trait WorkbookSource: Send + Sync {
    /// 获取并解析工作簿
    ///
    /// # 错误
    /// - EmptyWorkbook: 无工作表
    /// - Fetch: 直连与代理均失败
    /// - Parse: 内容损坏或不支持
    async fn fetch(&self, input: &SourceInput) -> ImportResult<FetchedWorkbook>;

    /// 读取指定工作表
    fn read_sheet(&self, workbook: &Workbook, sheet_name: &str) -> ImportResult<SheetData> {
        workbook.read_sheet(sheet_name)
    }
}

// ==========================================
// 分享链接规范化
// ==========================================

/// 将常见云盘分享链接转换为可直接下载的地址；无法识别时原样返回
pub fn normalize_share_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.trim().to_string();
    };
    let host = url.host_str().unwrap_or("").to_lowercase();

    if host == "docs.google.com" {
        if let Some(id) = path_segment_after(&url, "d") {
            if url.path().contains("/spreadsheets/") && !url.path().ends_with("/export") {
                let gid = query_value(&url, "gid").or_else(|| {
                    url.fragment()
                        .and_then(|f| f.strip_prefix("gid="))
                        .map(str::to_string)
                });
                let mut export = format!(
                    "https://docs.google.com/spreadsheets/d/{}/export?format=xlsx",
                    id
                );
                if let Some(gid) = gid {
                    export.push_str(&format!("&gid={}", gid));
                }
                return export;
            }
        }
    } else if host == "drive.google.com" {
        if let Some(id) = path_segment_after(&url, "d").or_else(|| query_value(&url, "id")) {
            return format!("https://drive.google.com/uc?export=download&id={}", id);
        }
    } else if host.ends_with("dropbox.com") {
        set_query_value(&mut url, "dl", "1");
        return url.to_string();
    } else if host == "1drv.ms" || host.ends_with("onedrive.live.com") || host.ends_with("sharepoint.com") {
        set_query_value(&mut url, "download", "1");
        return url.to_string();
    }

    url.to_string()
}

fn path_segment_after(url: &Url, marker: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|s| *s == marker)?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

fn set_query_value(url: &mut Url, key: &str, value: &str) {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair(key, value);
}

// ==========================================
// 内容解析
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentFormat {
    Csv,
    Workbook,
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
}

/// 根据扩展名或内容判断格式（ZIP / OLE 头为二进制工作簿）
fn detect_format(bytes: &[u8], ext: Option<&str>) -> ImportResult<ContentFormat> {
    if let Some(ext) = ext {
        if CSV_EXTENSIONS.contains(&ext) {
            return Ok(ContentFormat::Csv);
        }
        if WORKBOOK_EXTENSIONS.contains(&ext) {
            return Ok(ContentFormat::Workbook);
        }
    }
    if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0]) {
        return Ok(ContentFormat::Workbook);
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_lowercase();
    if head.trim_start().starts_with("<!doctype html") || head.trim_start().starts_with("<html") {
        return Err(ImportError::Parse("收到的是网页而不是表格文件".to_string()));
    }
    if std::str::from_utf8(bytes).is_ok() {
        return Ok(ContentFormat::Csv);
    }
    Err(ImportError::Parse("无法识别的表格格式".to_string()))
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Blank,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
    }
}

fn parse_workbook_bytes(bytes: Vec<u8>) -> ImportResult<Workbook> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names().to_vec();
    let mut sheets = Vec::with_capacity(names.len());
    for name in names {
        let range = workbook.worksheet_range(&name)?;
        let grid = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        sheets.push((name, grid));
    }
    Ok(Workbook::from_grid(sheets))
}

fn parse_csv_bytes(bytes: &[u8], sheet_name: &str) -> ImportResult<Workbook> {
    let content = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // 允许行长度不一致
        .from_reader(content);

    let mut grid = Vec::new();
    for result in reader.records() {
        let record = result?;
        grid.push(record.iter().map(CellValue::from).collect());
    }
    Ok(Workbook::from_grid(vec![(sheet_name.to_string(), grid)]))
}

/// 解析原始字节
///
/// # 参数
/// - bytes: 文件内容
/// - name_hint: 文件名或 URL（用于扩展名与 CSV 工作表名）
pub fn parse_workbook(bytes: Vec<u8>, name_hint: &str) -> ImportResult<FetchedWorkbook> {
    if bytes.is_empty() {
        return Err(ImportError::Parse("文件内容为空".to_string()));
    }
    let ext = extension_of(name_hint.split(['?', '#']).next().unwrap_or(name_hint));
    let workbook = match detect_format(&bytes, ext.as_deref())? {
        ContentFormat::Csv => {
            let sheet_name = Path::new(name_hint)
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.is_empty() && !name_hint.contains("://"))
                .unwrap_or("Sheet1");
            parse_csv_bytes(&bytes, sheet_name)?
        }
        ContentFormat::Workbook => parse_workbook_bytes(bytes)?,
    };
    FetchedWorkbook::new(workbook)
}

// ==========================================
// SpreadsheetSource - 默认实现（reqwest + calamine + csv）
// ==========================================
pub struct SpreadsheetSource {
    client: reqwest::Client,
    timeout: Duration,
    proxy_prefixes: Vec<String>,
}

impl SpreadsheetSource {
    /// 创建来源
    ///
    /// # 参数
    /// - timeout: 单次下载超时
    /// - proxy_prefixes: 直连失败后依次尝试的代理前缀
    pub fn new(timeout: Duration, proxy_prefixes: Vec<String>) -> ImportResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("school-import/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            timeout,
            proxy_prefixes,
        })
    }

    /// 从配置创建
    pub async fn from_config(config: &dyn ImportConfigReader) -> ImportResult<Self> {
        let timeout = config
            .get_fetch_timeout_secs()
            .await
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        let prefixes = config.get_proxy_prefixes().await?;
        Self::new(Duration::from_secs(timeout), prefixes)
    }

    /// 下载地址顺序: 直连在前，代理在后
    pub fn candidate_urls(&self, url: &str) -> Vec<String> {
        std::iter::once(url.to_string())
            .chain(
                self.proxy_prefixes
                    .iter()
                    .map(|prefix| format!("{}{}", prefix, urlencoding::encode(url))),
            )
            .collect()
    }

    async fn download_once(&self, url: &str) -> ImportResult<Vec<u8>> {
        let request = async {
            let response = self.client.get(url).send().await?.error_for_status()?;
            let bytes = response.bytes().await?;
            Ok::<_, ImportError>(bytes.to_vec())
        };
        let bytes = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ImportError::Fetch {
                url: url.to_string(),
                message: format!("超时 ({}s)", self.timeout.as_secs()),
            })??;
        if bytes.is_empty() {
            return Err(ImportError::Fetch {
                url: url.to_string(),
                message: "响应内容为空".to_string(),
            });
        }
        Ok(bytes)
    }

    #[instrument(skip(self))]
    async fn download(&self, url: &str) -> ImportResult<Vec<u8>> {
        let mut last_error = String::new();
        for (attempt, candidate) in self.candidate_urls(url).iter().enumerate() {
            match self.download_once(candidate).await {
                Ok(bytes) => {
                    info!(attempt, size = bytes.len(), "下载成功");
                    return Ok(bytes);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "下载失败");
                    last_error = e.to_string();
                }
            }
        }
        Err(ImportError::Fetch {
            url: url.to_string(),
            message: last_error,
        })
    }
}

#[async_trait]
impl WorkbookSource for SpreadsheetSource {
    async fn fetch(&self, input: &SourceInput) -> ImportResult<FetchedWorkbook> {
        match input {
            SourceInput::File(path) => {
                let name = path.display().to_string();
                if let Some(ext) = extension_of(&name) {
                    if !WORKBOOK_EXTENSIONS.contains(&ext.as_str())
                        && !CSV_EXTENSIONS.contains(&ext.as_str())
                    {
                        return Err(ImportError::UnsupportedFormat(ext));
                    }
                }
                let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => ImportError::FileNotFound(name.clone()),
                    _ => ImportError::from(e),
                })?;
                parse_workbook(bytes, &name)
            }
            SourceInput::Url(raw) => {
                let url = normalize_share_url(raw);
                if &url != raw {
                    debug!(from = %raw, to = %url, "分享链接已规范化");
                }
                let bytes = self.download(&url).await?;
                parse_workbook(bytes, &url)
            }
        }
    }
}
