use std::path::{Path, PathBuf};

use log::info;

use crate::cases::{aggregate_cases, CaseItemsRow, SurgeryTotalRow, OPTIONAL_COLUMNS};
use crate::combos::{aggregate_combinations, CombinationRow};
use crate::error::{PipelineError, Result};
use crate::intake::{archive_processed, extract_archives, find_datasets};
use crate::outcomes::{outcome_lookup, score_cases, OutcomeScoreRow, ScoringConfig};
use crate::schema::{normalize, ColumnMap, Field};
use crate::store::load_summaries;
use crate::surgeons::{group_surgeons, SurgeonAvgRow};
use crate::table::{write_csv, DataTable};

// 五个输出文件的固定后缀
const SURGERY_TOTALS_SUFFIX: &str = "case-surgery-totals.csv";
const SURGEON_AVG_SUFFIX: &str = "surgeon-avg-prices.csv";
const CASE_ITEMS_SUFFIX: &str = "case-items-detail.csv";
const COMBINATIONS_SUFFIX: &str = "item-combinations.csv";
const OUTCOME_SCORES_SUFFIX: &str = "case-outcome-scores.csv";

// 运行参数===========================================================================================
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub data_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub summary_dir: PathBuf,
    pub db_path: Option<PathBuf>, // 给了才把汇总灌进库
    pub threshold: Option<f64>,   // 医生分组阈值覆盖值
    pub scoring: ScoringConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            archive_dir: PathBuf::from("archive"),
            summary_dir: PathBuf::from("summary_files"),
            db_path: None,
            threshold: None,
            scoring: ScoringConfig::default(),
        }
    }
}

// 槽化: 保留字母数字和keep里的字符, 其余连续段压成一个下划线
fn slugify(value: &str, keep: &str) -> String {
    let mut slug = String::new();
    let mut gap = false;
    for c in value.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() || keep.contains(c) {
            slug.push(c);
            gap = false;
        } else if !gap {
            slug.push('_');
            gap = true;
        }
    }
    slug.trim_matches('_').to_string()
}

// 输出前缀来自数据内容而不是文件名: 第一个非空的活动名和活动编码
fn build_prefix(table: &DataTable, cols: &ColumnMap) -> String {
    let first = |field: Field| -> Option<String> {
        (0..table.n_rows()).find_map(|row| cols.value(table, row, field).map(|v| v.to_string()))
    };
    let activity = first(Field::ActualActivity)
        .map(|v| slugify(&v, ""))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "activity".to_string());
    // 编码里的小数点要留住, 像54.01
    let code = first(Field::ActualActivityCode)
        .map(|v| slugify(&v, "."))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "code".to_string());
    format!("{activity}_{code}")
}

fn output_path(summary_dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    summary_dir.join(format!("{prefix}_{suffix}"))
}

// 单数据集处理=======================================================================================
// 读入 -> 规整 -> 病例聚合 -> 医生分组/结局评分 -> 组合汇总 -> 写五个汇总文件
pub fn process_file(input: &Path, options: &PipelineOptions) -> Result<Vec<PathBuf>> {
    if !input.is_file() {
        return Err(PipelineError::InputNotFound(input.to_path_buf()));
    }
    info!("processing {}", input.display());
    let mut table = DataTable::from_csv_path(input)?;
    if table.is_empty() {
        info!("{} has no data rows", input.display());
    }
    normalize(&mut table);

    let prefix_cols = ColumnMap::with_optional(&table, &[], OPTIONAL_COLUMNS)?;
    let prefix = build_prefix(&table, &prefix_cols);

    let cases = aggregate_cases(&table)?;
    let summary = group_surgeons(&cases, options.threshold);
    info!(
        "{} cases, {} surgeons, price threshold {}",
        cases.len(),
        summary.surgeons.len(),
        summary.threshold
    );
    let outcomes = score_cases(&table, &options.scoring)?;
    let tiers = summary.tier_lookup();
    let outcome_groups = outcome_lookup(&outcomes);
    let combos = aggregate_combinations(&cases, &tiers, &outcome_groups);

    let totals: Vec<SurgeryTotalRow> = cases.iter().map(SurgeryTotalRow::new).collect();
    let averages: Vec<SurgeonAvgRow> = summary.surgeons.iter().map(SurgeonAvgRow::new).collect();
    let items: Vec<CaseItemsRow> = cases
        .iter()
        .map(|case| {
            let tier = case
                .surgeon_name
                .as_deref()
                .and_then(|name| tiers.get(name))
                .map(|tier| tier.as_str());
            CaseItemsRow::new(case, tier)
        })
        .collect();
    let combo_rows: Vec<CombinationRow> = combos.iter().map(CombinationRow::new).collect();
    let score_rows: Vec<OutcomeScoreRow> = outcomes.iter().map(OutcomeScoreRow::new).collect();

    let mut written = Vec::new();
    let path = output_path(&options.summary_dir, &prefix, SURGERY_TOTALS_SUFFIX);
    write_csv(&totals, &path)?;
    written.push(path);
    let path = output_path(&options.summary_dir, &prefix, SURGEON_AVG_SUFFIX);
    write_csv(&averages, &path)?;
    written.push(path);
    let path = output_path(&options.summary_dir, &prefix, CASE_ITEMS_SUFFIX);
    write_csv(&items, &path)?;
    written.push(path);
    let path = output_path(&options.summary_dir, &prefix, COMBINATIONS_SUFFIX);
    write_csv(&combo_rows, &path)?;
    written.push(path);
    let path = output_path(&options.summary_dir, &prefix, OUTCOME_SCORES_SUFFIX);
    write_csv(&score_rows, &path)?;
    written.push(path);

    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(written)
}

// 整轮运行===========================================================================================
// 先解压, 再按文件名顺序处理每个数据集, 处理完挪档, 最后按需入库
pub fn run_all(options: &PipelineOptions) -> Result<()> {
    extract_archives(&options.data_dir, &options.archive_dir)?;
    let datasets = find_datasets(&options.data_dir)?;
    if datasets.is_empty() {
        info!("no datasets in {}, nothing to process", options.data_dir.display());
        return Ok(());
    }
    for dataset in datasets {
        process_file(&dataset, options)?;
        archive_processed(&dataset, &options.archive_dir)?;
    }
    if let Some(db_path) = &options.db_path {
        load_summaries(db_path, &options.summary_dir)?;
    }
    Ok(())
}
