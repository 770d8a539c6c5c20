use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::cases::CaseRecord;
use crate::stats::{mean, median};

// 价格分组==========================================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceTier {
    Cheap,
    Expensive,
}

impl PriceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceTier::Cheap => "cheap",
            PriceTier::Expensive => "expensive",
        }
    }
}

// 医生汇总结构
#[derive(Debug, Clone)]
pub struct SurgeonRecord {
    pub surgeon_name: String,
    pub avg_price: f64,               // 每台手术总额的均值
    pub case_count: usize,            // 手术台数
    pub surgeon_score: Option<String>,
    pub hospital: Option<String>,
    pub procedures: String,           // 各病例术式去重排序后合并
    pub procedure_codes: String,
    pub activities: String,
    pub activity_codes: String,
    pub tier: PriceTier,
}

#[derive(Debug)]
pub struct SurgeonSummary {
    pub surgeons: Vec<SurgeonRecord>,
    pub threshold: f64, // 实际使用的分组阈值
}

impl SurgeonSummary {
    // 病例明细和组合汇总回填价格分组时用
    pub fn tier_lookup(&self) -> HashMap<String, PriceTier> {
        self.surgeons
            .iter()
            .map(|record| (record.surgeon_name.clone(), record.tier))
            .collect()
    }
}

// 非空值去重排序后用", "合并
fn join_unique<'a, I>(values: I) -> String
where
    I: Iterator<Item = Option<&'a str>>,
{
    let set: BTreeSet<&str> = values.flatten().collect();
    set.into_iter().collect::<Vec<_>>().join(", ")
}

// 医生分组===========================================================================================
// 阈值取各医生均价的中位数(可用覆盖值代替), 均价不高于阈值算cheap
pub fn group_surgeons(cases: &[CaseRecord], threshold_override: Option<f64>) -> SurgeonSummary {
    let mut groups: HashMap<&str, Vec<&CaseRecord>> = HashMap::new();
    for case in cases {
        if let Some(name) = case.surgeon_name.as_deref() {
            groups.entry(name).or_default().push(case);
        }
    }
    let mut names: Vec<&str> = groups.keys().copied().collect();
    names.sort();

    let avg_prices: Vec<f64> = names
        .iter()
        .map(|name| {
            let prices: Vec<f64> = groups[name].iter().map(|c| c.total_price).collect();
            mean(&prices)
        })
        .collect();
    let threshold = threshold_override.unwrap_or_else(|| median(&avg_prices).unwrap_or(0.0));

    let surgeons = names
        .iter()
        .zip(avg_prices)
        .map(|(name, avg_price)| {
            let group = &groups[name];
            let tier = if avg_price <= threshold {
                PriceTier::Cheap
            } else {
                PriceTier::Expensive
            };
            SurgeonRecord {
                surgeon_name: name.to_string(),
                avg_price,
                case_count: group.len(),
                surgeon_score: group.iter().find_map(|c| c.surgeon_score.clone()),
                hospital: group.iter().find_map(|c| c.hospital.clone()),
                procedures: join_unique(group.iter().map(|c| c.procedures.as_deref())),
                procedure_codes: join_unique(group.iter().map(|c| c.procedure_codes.as_deref())),
                activities: join_unique(group.iter().map(|c| c.activity.as_deref())),
                activity_codes: join_unique(group.iter().map(|c| c.activity_code.as_deref())),
                tier,
            }
        })
        .collect();

    SurgeonSummary { surgeons, threshold }
}

// 医生均价输出行
#[derive(Debug, Serialize)]
pub struct SurgeonAvgRow {
    #[serde(rename = "surgeon name")]
    pub surgeon_name: String,
    #[serde(rename = "avg price for surgery")]
    pub avg_price: f64,
    #[serde(rename = "number of surgeries")]
    pub case_count: usize,
    #[serde(rename = "surgeon score")]
    pub surgeon_score: Option<String>,
    pub hospital: Option<String>,
    #[serde(rename = "all procedures")]
    pub procedures: String,
    #[serde(rename = "all procedures code")]
    pub procedure_codes: String,
    #[serde(rename = "actual activity")]
    pub activities: String,
    #[serde(rename = "actual activity code")]
    pub activity_codes: String,
    #[serde(rename = "cost group")]
    pub cost_group: &'static str,
}

impl SurgeonAvgRow {
    pub fn new(record: &SurgeonRecord) -> Self {
        Self {
            surgeon_name: record.surgeon_name.clone(),
            avg_price: record.avg_price,
            case_count: record.case_count,
            surgeon_score: record.surgeon_score.clone(),
            hospital: record.hospital.clone(),
            procedures: record.procedures.clone(),
            procedure_codes: record.procedure_codes.clone(),
            activities: record.activities.clone(),
            activity_codes: record.activity_codes.clone(),
            cost_group: record.tier.as_str(),
        }
    }
}

// 功能测试=======================================
#[cfg(test)]
mod tests {
    use super::*;

    fn case(case_number: &str, surgeon: Option<&str>, price: f64) -> CaseRecord {
        CaseRecord {
            case_number: case_number.to_string(),
            surgeon_name: surgeon.map(|s| s.to_string()),
            surgeon_score: None,
            hospital: None,
            procedures: None,
            procedure_codes: None,
            activity: None,
            activity_code: None,
            total_price: price,
            total_quantity: 0.0,
            items_display: String::new(),
            items_key: String::new(),
        }
    }

    #[test]
    fn test_median_threshold_splits_tiers() {
        let cases = vec![
            case("C1", Some("Dr A"), 1000.0),
            case("C2", Some("Dr B"), 3000.0),
        ];
        let summary = group_surgeons(&cases, None);
        assert_eq!(summary.threshold, 2000.0);
        assert_eq!(summary.surgeons[0].surgeon_name, "Dr A");
        assert_eq!(summary.surgeons[0].tier, PriceTier::Cheap);
        assert_eq!(summary.surgeons[1].tier, PriceTier::Expensive);
    }

    #[test]
    fn test_avg_price_over_case_totals() {
        let cases = vec![
            case("C1", Some("Dr A"), 100.0),
            case("C2", Some("Dr A"), 200.0),
        ];
        let summary = group_surgeons(&cases, None);
        assert_eq!(summary.surgeons.len(), 1);
        assert_eq!(summary.surgeons[0].avg_price, 150.0);
        assert_eq!(summary.surgeons[0].case_count, 2);
    }

    #[test]
    fn test_single_surgeon_is_cheap() {
        // 中位数等于该医生自己的均价, 不高于阈值归入cheap
        let cases = vec![case("C1", Some("Dr A"), 500.0)];
        let summary = group_surgeons(&cases, None);
        assert_eq!(summary.surgeons[0].tier, PriceTier::Cheap);
    }

    #[test]
    fn test_threshold_override() {
        let cases = vec![
            case("C1", Some("Dr A"), 1000.0),
            case("C2", Some("Dr B"), 3000.0),
        ];
        let summary = group_surgeons(&cases, Some(500.0));
        assert_eq!(summary.threshold, 500.0);
        assert_eq!(summary.surgeons[0].tier, PriceTier::Expensive);
        assert_eq!(summary.surgeons[1].tier, PriceTier::Expensive);
        // 阈值抬高只会往cheap方向挪
        let raised = group_surgeons(&cases, Some(5000.0));
        assert_eq!(raised.surgeons[0].tier, PriceTier::Cheap);
        assert_eq!(raised.surgeons[1].tier, PriceTier::Cheap);
    }

    #[test]
    fn test_null_surgeons_excluded() {
        let cases = vec![
            case("C1", None, 1000.0),
            case("C2", Some("Dr B"), 3000.0),
        ];
        let summary = group_surgeons(&cases, None);
        assert_eq!(summary.surgeons.len(), 1);
        assert_eq!(summary.surgeons[0].surgeon_name, "Dr B");
    }

    #[test]
    fn test_empty_input_gives_zero_threshold() {
        let summary = group_surgeons(&[], None);
        assert!(summary.surgeons.is_empty());
        assert_eq!(summary.threshold, 0.0);
    }

    #[test]
    fn test_joined_fields_deduped_and_sorted() {
        let mut a = case("C1", Some("Dr A"), 100.0);
        a.procedures = Some("Repair".to_string());
        a.surgeon_score = None;
        let mut b = case("C2", Some("Dr A"), 100.0);
        b.procedures = Some("Biopsy".to_string());
        b.surgeon_score = Some("90".to_string());
        let mut c = case("C3", Some("Dr A"), 100.0);
        c.procedures = Some("Repair".to_string());
        let summary = group_surgeons(&[a, b, c], None);
        let record = &summary.surgeons[0];
        assert_eq!(record.procedures, "Biopsy, Repair");
        assert_eq!(record.surgeon_score.as_deref(), Some("90"));
    }

    #[test]
    fn test_tier_lookup() {
        let cases = vec![
            case("C1", Some("Dr A"), 1000.0),
            case("C2", Some("Dr B"), 3000.0),
        ];
        let lookup = group_surgeons(&cases, None).tier_lookup();
        assert_eq!(lookup["Dr A"], PriceTier::Cheap);
        assert_eq!(lookup["Dr B"], PriceTier::Expensive);
    }
}
