use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::cases::CaseRecord;
use crate::outcomes::OutcomeGroup;
use crate::stats::mean;
use crate::surgeons::PriceTier;

// 组合结构===========================================================================================
// 同一套耗材组合(排序签名相同)的病例折叠成一行
#[derive(Debug, Clone)]
pub struct CombinationRecord {
    pub combination: String,     // 排序后的清单签名
    pub frequency: usize,        // 病例数
    pub surgeons: String,        // "姓名 (评分)", 按首次出现顺序去重
    pub tiers: String,           // 出现过的价格分组
    pub avg_price: f64,
    pub procedures: String,      // 术式并集, 去重排序
    pub procedure_codes: String,
    pub outcomes: String,        // 出现过的结局分组
}

// 按首次出现顺序去重后用", "合并
fn join_first_seen(values: impl Iterator<Item = String>) -> String {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for value in values {
        if seen.insert(value.clone()) {
            ordered.push(value);
        }
    }
    ordered.join(", ")
}

fn join_sorted<'a>(values: impl Iterator<Item = Option<&'a str>>) -> String {
    let set: BTreeSet<&str> = values.flatten().collect();
    set.into_iter().collect::<Vec<_>>().join(", ")
}

// 组合汇总===========================================================================================
// 医生没有分组或病例没有评分结果时直接略过, 不写空占位
pub fn aggregate_combinations(
    cases: &[CaseRecord],
    tiers: &HashMap<String, PriceTier>,
    outcomes: &HashMap<String, OutcomeGroup>,
) -> Vec<CombinationRecord> {
    let mut groups: HashMap<&str, Vec<&CaseRecord>> = HashMap::new();
    for case in cases {
        groups.entry(case.items_key.as_str()).or_default().push(case);
    }
    let mut keys: Vec<&str> = groups.keys().copied().collect();
    keys.sort();

    keys.into_iter()
        .map(|key| {
            let group = &groups[key];
            let prices: Vec<f64> = group.iter().map(|c| c.total_price).collect();
            let surgeons = join_first_seen(group.iter().filter_map(|c| {
                let name = c.surgeon_name.as_deref()?;
                Some(format!("{} ({})", name, c.surgeon_score.as_deref().unwrap_or("")))
            }));
            let tier_labels = join_first_seen(group.iter().filter_map(|c| {
                let name = c.surgeon_name.as_deref()?;
                tiers.get(name).map(|tier| tier.as_str().to_string())
            }));
            let outcome_labels = join_first_seen(group.iter().filter_map(|c| {
                outcomes
                    .get(&c.case_number)
                    .map(|outcome| outcome.as_str().to_string())
            }));
            CombinationRecord {
                combination: key.to_string(),
                frequency: group.len(),
                surgeons,
                tiers: tier_labels,
                avg_price: mean(&prices),
                procedures: join_sorted(group.iter().map(|c| c.procedures.as_deref())),
                procedure_codes: join_sorted(group.iter().map(|c| c.procedure_codes.as_deref())),
                outcomes: outcome_labels,
            }
        })
        .collect()
}

// 组合汇总输出行
#[derive(Debug, Serialize)]
pub struct CombinationRow {
    pub combination: String,
    pub frequency: usize,
    #[serde(rename = "surgeons (score)")]
    pub surgeons: String,
    #[serde(rename = "surgeon price group")]
    pub tiers: String,
    #[serde(rename = "avg total price")]
    pub avg_price: f64,
    #[serde(rename = "all procedures")]
    pub procedures: String,
    #[serde(rename = "all procedures code")]
    pub procedure_codes: String,
    #[serde(rename = "outcome group")]
    pub outcomes: String,
}

impl CombinationRow {
    pub fn new(record: &CombinationRecord) -> Self {
        Self {
            combination: record.combination.clone(),
            frequency: record.frequency,
            surgeons: record.surgeons.clone(),
            tiers: record.tiers.clone(),
            avg_price: record.avg_price,
            procedures: record.procedures.clone(),
            procedure_codes: record.procedure_codes.clone(),
            outcomes: record.outcomes.clone(),
        }
    }
}
