use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cases::{first_non_null, partition_by_case};
use crate::error::{PipelineError, Result};
use crate::schema::{ColumnMap, Field};
use crate::stats::quantile;
use crate::table::{parse_f64_opt, DataTable};

// 固定判定线
const VAS_LIMIT: f64 = 7.0;
const VITAL_DIFF_LIMIT: f64 = 25.0; // 血压和心率变化幅度(%)
const SPO2_DIFF_LIMIT: f64 = 10.0;
const POPULATION_QUANTILE: f64 = 0.75;

// 分档线按13项因子的固定比例划, 与权重无关
const GOOD_LIMIT: f64 = 3.0 / 13.0;
const MODERATE_LIMIT: f64 = 6.0 / 13.0;

// 结局评分需要的列, 临床列缺失直接报错
pub const REQUIRED_COLUMNS: &[Field] = &[
    Field::CaseNumber,
    Field::ErAdmission,
    Field::Revision,
    Field::OtherHospital,
    Field::Readmission,
    Field::BloodInAdmission,
    Field::AntibioticInAdmission,
    Field::FirstVas,
    Field::SurgeryLength,
    Field::RecoveryLength,
    Field::StayHours,
    Field::BpDiff,
    Field::HrDiff,
    Field::Spo2Diff,
];

const OPTIONAL_COLUMNS: &[Field] = &[Field::ActualActivity, Field::ActualActivityCode];

// 评分权重===========================================================================================
// 13项风险因子的权重, JSON文件里可以只写要覆盖的那几项
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    #[serde(rename = "er addmission")]
    pub er_admission: f64,
    pub revision: f64,
    #[serde(rename = "moving to other hospital")]
    pub other_hospital: f64,
    #[serde(rename = "re-addmission")]
    pub readmission: f64,
    #[serde(rename = "blood in addmission")]
    pub blood_in_admission: f64,
    #[serde(rename = "antibiotic in addmission")]
    pub antibiotic_in_admission: f64,
    #[serde(rename = "first vas")]
    pub first_vas: f64,
    #[serde(rename = "surgery length(min)")]
    pub surgery_length: f64,
    #[serde(rename = "recovery lentgh (min)")]
    pub recovery_length: f64,
    #[serde(rename = "calculate length of stay (hours)")]
    pub stay_hours: f64,
    #[serde(rename = "blood pressure diff %")]
    pub bp_diff: f64,
    #[serde(rename = "hr diff %")]
    pub hr_diff: f64,
    #[serde(rename = "spo2 diff %")]
    pub spo2_diff: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            er_admission: 0.08,
            revision: 0.08,
            other_hospital: 0.08,
            readmission: 0.08,
            blood_in_admission: 0.06,
            antibiotic_in_admission: 0.06,
            first_vas: 0.04,
            surgery_length: 0.16,
            recovery_length: 0.04,
            stay_hours: 0.12,
            bp_diff: 0.04,
            hr_diff: 0.04,
            spo2_diff: 0.04,
        }
    }
}

impl ScoringConfig {
    pub fn total_weight(&self) -> f64 {
        self.er_admission
            + self.revision
            + self.other_hospital
            + self.readmission
            + self.blood_in_admission
            + self.antibiotic_in_admission
            + self.first_vas
            + self.surgery_length
            + self.recovery_length
            + self.stay_hours
            + self.bp_diff
            + self.hr_diff
            + self.spo2_diff
    }

    // 从JSON文件读入覆盖值, 权重合计必须为正
    pub fn from_json_path(path: &Path) -> Result<ScoringConfig> {
        let file = File::open(path)?;
        let config: ScoringConfig = serde_json::from_reader(BufReader::new(file))?;
        let total = config.total_weight();
        if total <= 0.0 {
            return Err(PipelineError::InvalidWeights(format!(
                "weights sum to {total}, must be positive"
            )));
        }
        Ok(config)
    }
}

// 人群阈值: 三项时长指标的75分位, 在全部耗材行上算而不是按病例
#[derive(Debug, Clone, Copy)]
struct PopulationThresholds {
    surgery_length: Option<f64>,
    recovery_length: Option<f64>,
    stay_hours: Option<f64>,
}

fn column_values(table: &DataTable, cols: &ColumnMap, field: Field) -> Vec<f64> {
    (0..table.n_rows())
        .filter_map(|row| parse_f64_opt(cols.value(table, row, field)))
        .collect()
}

impl PopulationThresholds {
    fn compute(table: &DataTable, cols: &ColumnMap) -> Self {
        let q75 = |field| quantile(&column_values(table, cols, field), POPULATION_QUANTILE);
        Self {
            surgery_length: q75(Field::SurgeryLength),
            recovery_length: q75(Field::RecoveryLength),
            stay_hours: q75(Field::StayHours),
        }
    }
}

// 结局分组==========================================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeGroup {
    Good,
    Moderate,
    Bad,
}

impl OutcomeGroup {
    // 用四舍五入后的分数定档
    pub fn from_score(score: f64) -> OutcomeGroup {
        if score < GOOD_LIMIT {
            OutcomeGroup::Good
        } else if score <= MODERATE_LIMIT {
            OutcomeGroup::Moderate
        } else {
            OutcomeGroup::Bad
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeGroup::Good => "good outcome",
            OutcomeGroup::Moderate => "moderate outcome",
            OutcomeGroup::Bad => "bad outcome",
        }
    }
}

// 每病例的评分结果
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub case_number: String,
    pub activity: Option<String>,
    pub activity_code: Option<String>,
    pub positive_count: usize, // 命中的因子个数
    pub score: f64,            // 加权占比, 保留4位
    pub normalized: f64,       // (1-score)*100, 保留2位, 越高越好
    pub group: OutcomeGroup,
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// 结局评分===========================================================================================
// 每项指标取病例各行里的最大值, 最危险的行代表整个病例
pub fn score_cases(table: &DataTable, config: &ScoringConfig) -> Result<Vec<OutcomeRecord>> {
    let cols = ColumnMap::with_optional(table, REQUIRED_COLUMNS, OPTIONAL_COLUMNS)?;
    let thresholds = PopulationThresholds::compute(table, &cols);
    let total_weight = config.total_weight();

    let mut records = Vec::new();
    for (case_number, rows) in partition_by_case(table, &cols) {
        let max_of = |field: Field| -> Option<f64> {
            rows.iter()
                .filter_map(|&row| parse_f64_opt(cols.value(table, row, field)))
                .max_by(f64::total_cmp)
        };
        // 值缺失或阈值缺失都判否, 不报错
        let eq_one = |value: Option<f64>| value == Some(1.0);
        let above = |value: Option<f64>, limit: Option<f64>| match (value, limit) {
            (Some(v), Some(l)) => v > l,
            _ => false,
        };

        let factors = [
            (eq_one(max_of(Field::ErAdmission)), config.er_admission),
            (eq_one(max_of(Field::Revision)), config.revision),
            (eq_one(max_of(Field::OtherHospital)), config.other_hospital),
            (eq_one(max_of(Field::Readmission)), config.readmission),
            (eq_one(max_of(Field::BloodInAdmission)), config.blood_in_admission),
            (
                eq_one(max_of(Field::AntibioticInAdmission)),
                config.antibiotic_in_admission,
            ),
            (
                above(max_of(Field::FirstVas), Some(VAS_LIMIT)),
                config.first_vas,
            ),
            (
                above(max_of(Field::SurgeryLength), thresholds.surgery_length),
                config.surgery_length,
            ),
            (
                above(max_of(Field::RecoveryLength), thresholds.recovery_length),
                config.recovery_length,
            ),
            (
                above(max_of(Field::StayHours), thresholds.stay_hours),
                config.stay_hours,
            ),
            (
                above(max_of(Field::BpDiff), Some(VITAL_DIFF_LIMIT)),
                config.bp_diff,
            ),
            (
                above(max_of(Field::HrDiff), Some(VITAL_DIFF_LIMIT)),
                config.hr_diff,
            ),
            (
                above(max_of(Field::Spo2Diff), Some(SPO2_DIFF_LIMIT)),
                config.spo2_diff,
            ),
        ];

        let positive_count = factors.iter().filter(|(hit, _)| *hit).count();
        // 从+0.0起步求和, 避免空和在新标准库里返回-0.0
        let weighted: f64 = factors
            .iter()
            .filter(|(hit, _)| *hit)
            .map(|(_, weight)| *weight)
            .fold(0.0, |acc, w| acc + w);
        let score = round_to(weighted / total_weight, 4);
        let normalized = round_to((1.0 - score) * 100.0, 2);

        records.push(OutcomeRecord {
            activity: first_non_null(table, &cols, &rows, Field::ActualActivity),
            activity_code: first_non_null(table, &cols, &rows, Field::ActualActivityCode),
            case_number,
            positive_count,
            score,
            normalized,
            group: OutcomeGroup::from_score(score),
        });
    }
    Ok(records)
}

// 组合汇总回填结局分组时用
pub fn outcome_lookup(records: &[OutcomeRecord]) -> HashMap<String, OutcomeGroup> {
    records
        .iter()
        .map(|record| (record.case_number.clone(), record.group))
        .collect()
}

// 结局评分输出行
#[derive(Debug, Serialize)]
pub struct OutcomeScoreRow {
    #[serde(rename = "case number")]
    pub case_number: String,
    #[serde(rename = "actual activity")]
    pub activity: Option<String>,
    #[serde(rename = "actual activity code")]
    pub activity_code: Option<String>,
    #[serde(rename = "positive parameters")]
    pub positive_count: usize,
    pub score: f64,
    #[serde(rename = "normalized score (0-100)")]
    pub normalized: f64,
    #[serde(rename = "outcome group")]
    pub group: &'static str,
}

impl OutcomeScoreRow {
    pub fn new(record: &OutcomeRecord) -> Self {
        Self {
            case_number: record.case_number.clone(),
            activity: record.activity.clone(),
            activity_code: record.activity_code.clone(),
            positive_count: record.positive_count,
            score: record.score,
            normalized: record.normalized,
            group: record.group.as_str(),
        }
    }
}

// 功能测试=======================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::normalize;
    use std::io::Write;

    const HEADERS: [&str; 14] = [
        "case number",
        "er addmission",
        "revision",
        "moving to other hospital",
        "re-addmission",
        "blood in addmission",
        "antibiotic in addmission",
        "first vas",
        "surgery length(min)",
        "recovery lentgh (min)",
        "calculate length of stay (hours)",
        "blood pressure diff %",
        "hr diff %",
        "spo2 diff %",
    ];

    fn build_table(rows: Vec<Vec<&str>>) -> DataTable {
        let headers = HEADERS.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|cell| cell.to_string()).collect())
            .collect();
        let mut table = DataTable::new(headers, rows);
        normalize(&mut table);
        table
    }

    #[test]
    fn test_score_extremes() {
        // C1全部命中, C2全不命中; 时长阈值来自两行的75分位
        let table = build_table(vec![
            vec![
                "C1", "1", "1", "1", "1", "1", "1", "8", "100", "100", "100", "30", "30", "15",
            ],
            vec![
                "C2", "0", "0", "0", "0", "0", "0", "2", "10", "10", "10", "5", "5", "2",
            ],
        ]);
        let records = score_cases(&table, &ScoringConfig::default()).unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].case_number, "C1");
        assert_eq!(records[0].positive_count, 13);
        assert_eq!(records[0].score, 1.0);
        assert_eq!(records[0].normalized, 0.0);
        assert_eq!(records[0].group, OutcomeGroup::Bad);

        assert_eq!(records[1].case_number, "C2");
        assert_eq!(records[1].positive_count, 0);
        assert_eq!(records[1].score, 0.0);
        assert_eq!(records[1].normalized, 100.0);
        assert_eq!(records[1].group, OutcomeGroup::Good);
    }

    #[test]
    fn test_single_factor_score() {
        let table = build_table(vec![
            vec![
                "C1", "1", "0", "0", "0", "0", "0", "2", "", "", "", "", "", "",
            ],
        ]);
        let records = score_cases(&table, &ScoringConfig::default()).unwrap();
        // 0.08 / 0.92
        assert_eq!(records[0].positive_count, 1);
        assert_eq!(records[0].score, 0.087);
        assert_eq!(records[0].normalized, 91.3);
        assert_eq!(records[0].group, OutcomeGroup::Good);
    }

    #[test]
    fn test_moderate_band() {
        // 四个入院类因子命中: 0.32 / 0.92 = 0.3478
        let table = build_table(vec![
            vec![
                "C1", "1", "1", "1", "1", "0", "0", "2", "", "", "", "", "", "",
            ],
        ]);
        let records = score_cases(&table, &ScoringConfig::default()).unwrap();
        assert_eq!(records[0].positive_count, 4);
        assert_eq!(records[0].score, 0.3478);
        assert_eq!(records[0].normalized, 65.22);
        assert_eq!(records[0].group, OutcomeGroup::Moderate);
    }

    #[test]
    fn test_riskiest_row_wins() {
        // 标志位只出现在第二行, 病例仍算命中; 取值2不等于1, 不算
        let table = build_table(vec![
            vec!["C1", "", "2", "0", "0", "0", "0", "", "", "", "", "", "", ""],
            vec!["C1", "1", "0", "0", "0", "0", "0", "", "", "", "", "", "", ""],
        ]);
        let records = score_cases(&table, &ScoringConfig::default()).unwrap();
        assert_eq!(records[0].positive_count, 1);
    }

    #[test]
    fn test_population_quantile_over_rows() {
        // 手术时长按行收集: [10, 100, 40] 的75分位是70
        let table = build_table(vec![
            vec!["C1", "0", "0", "0", "0", "0", "0", "", "10", "", "", "", "", ""],
            vec!["C1", "0", "0", "0", "0", "0", "0", "", "100", "", "", "", "", ""],
            vec!["C2", "0", "0", "0", "0", "0", "0", "", "40", "", "", "", "", ""],
        ]);
        let records = score_cases(&table, &ScoringConfig::default()).unwrap();
        assert_eq!(records[0].case_number, "C1");
        assert_eq!(records[0].positive_count, 1);
        assert_eq!(records[0].score, 0.1739);
        assert_eq!(records[1].case_number, "C2");
        assert_eq!(records[1].positive_count, 0);
    }

    #[test]
    fn test_missing_clinical_column_is_fatal() {
        let mut table = build_table(vec![]);
        let idx = table.headers().iter().position(|h| h == "revision").unwrap();
        table.headers_mut()[idx] = "unrelated".to_string();
        let err = score_cases(&table, &ScoringConfig::default()).unwrap_err();
        match err {
            PipelineError::MissingColumns(missing) => {
                assert_eq!(missing, vec!["revision"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_group_boundaries_on_rounded_score() {
        assert_eq!(OutcomeGroup::from_score(0.2307), OutcomeGroup::Good);
        assert_eq!(OutcomeGroup::from_score(0.2308), OutcomeGroup::Moderate);
        assert_eq!(OutcomeGroup::from_score(0.4615), OutcomeGroup::Moderate);
        assert_eq!(OutcomeGroup::from_score(0.4616), OutcomeGroup::Bad);
    }

    #[test]
    fn test_default_total_weight() {
        let total = ScoringConfig::default().total_weight();
        assert!((total - 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_partial_weight_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let mut f = File::create(&path).unwrap();
        write!(f, "{{\"er addmission\": 0.5}}").unwrap();
        drop(f);

        let config = ScoringConfig::from_json_path(&path).unwrap();
        assert_eq!(config.er_admission, 0.5);
        assert_eq!(config.revision, 0.08);
        assert!((config.total_weight() - 1.34).abs() < 1e-9);
    }

    #[test]
    fn test_four_factors_against_unit_total() {
        // 手术时长权重抬到0.24让合计正好是1.0, 四个入院类因子合计0.32
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let mut f = File::create(&path).unwrap();
        write!(f, "{{\"surgery length(min)\": 0.24}}").unwrap();
        drop(f);
        let config = ScoringConfig::from_json_path(&path).unwrap();
        assert!((config.total_weight() - 1.0).abs() < 1e-9);

        let table = build_table(vec![
            vec![
                "C1", "1", "1", "1", "1", "0", "0", "2", "", "", "", "", "", "",
            ],
        ]);
        let records = score_cases(&table, &config).unwrap();
        assert_eq!(records[0].score, 0.32);
        assert_eq!(records[0].normalized, 68.0);
        assert_eq!(records[0].group, OutcomeGroup::Moderate);
    }

    #[test]
    fn test_zero_weights_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.json");
        let mut f = File::create(&path).unwrap();
        let keys: Vec<String> = HEADERS[1..].iter().map(|h| format!("\"{h}\": 0")).collect();
        write!(f, "{{{}}}", keys.join(", ")).unwrap();
        drop(f);

        let err = ScoringConfig::from_json_path(&path).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidWeights(_)));
    }
}
