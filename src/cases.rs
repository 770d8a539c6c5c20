use std::collections::HashMap;

use serde::Serialize;

use crate::error::Result;
use crate::schema::{ColumnMap, Field};
use crate::table::{parse_f64_lossy, DataTable};

// 病例聚合需要的列
pub const REQUIRED_COLUMNS: &[Field] = &[
    Field::CaseNumber,
    Field::SurgeonName,
    Field::SurgeonScore,
    Field::ItemName,
    Field::Quantity,
    Field::TotalPrice,
    Field::Hospital,
    Field::Procedures,
    Field::ProcedureCodes,
];

// 活动列缺失时不报错, 按整列空值处理
pub const OPTIONAL_COLUMNS: &[Field] = &[Field::ActualActivity, Field::ActualActivityCode];

// 病例结构===========================================================================================
#[derive(Debug, Clone)]
pub struct CaseRecord {
    pub case_number: String,              // 病例号
    pub surgeon_name: Option<String>,     // 主刀医生(行序第一个非空)
    pub surgeon_score: Option<String>,    // 医生评分
    pub hospital: Option<String>,         // 医院
    pub procedures: Option<String>,       // 全部术式
    pub procedure_codes: Option<String>,  // 全部术式编码
    pub activity: Option<String>,         // 实际活动
    pub activity_code: Option<String>,    // 实际活动编码
    pub total_price: f64,                 // 金额合计(坏值按0计)
    pub total_quantity: f64,              // 数量合计
    pub items_display: String,            // 耗材清单, 保持原始行序
    pub items_key: String,                // 排序后的清单, 作为组合签名
}

// 按病例号划分行号, 病例号为空的行不参与任何分组
pub(crate) fn partition_by_case(
    table: &DataTable,
    cols: &ColumnMap,
) -> Vec<(String, Vec<usize>)> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for row in 0..table.n_rows() {
        if let Some(case) = cols.value(table, row, Field::CaseNumber) {
            groups.entry(case.to_string()).or_default().push(row);
        }
    }
    let mut keys: Vec<String> = groups.keys().cloned().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let rows = groups.remove(&key).unwrap_or_default();
            (key, rows)
        })
        .collect()
}

// 行序扫描取第一个非空值
pub(crate) fn first_non_null(
    table: &DataTable,
    cols: &ColumnMap,
    rows: &[usize],
    field: Field,
) -> Option<String> {
    rows.iter()
        .find_map(|&row| cols.value(table, row, field))
        .map(|value| value.to_string())
}

// 数量没有小数部分时按整数显示
pub(crate) fn format_quantity(qty: f64) -> String {
    if qty.fract() == 0.0 {
        format!("{}", qty as i64)
    } else {
        qty.to_string()
    }
}

// 病例聚合===========================================================================================
// 每个病例号折叠成一行: 数量和金额求和, 分类字段取行序里第一个非空值
pub fn aggregate_cases(table: &DataTable) -> Result<Vec<CaseRecord>> {
    let cols = ColumnMap::with_optional(table, REQUIRED_COLUMNS, OPTIONAL_COLUMNS)?;
    let mut records = Vec::new();
    for (case_number, rows) in partition_by_case(table, &cols) {
        let mut total_price = 0.0;
        let mut total_quantity = 0.0;
        let mut parts: Vec<String> = Vec::new();
        for &row in &rows {
            total_price += parse_f64_lossy(cols.value(table, row, Field::TotalPrice));
            let qty = parse_f64_lossy(cols.value(table, row, Field::Quantity));
            total_quantity += qty;
            let name = cols.value(table, row, Field::ItemName).unwrap_or("");
            parts.push(format!("{} ({})", name, format_quantity(qty)));
        }
        let items_display = parts.join(", ");
        parts.sort();
        let items_key = parts.join(", ");
        records.push(CaseRecord {
            case_number,
            surgeon_name: first_non_null(table, &cols, &rows, Field::SurgeonName),
            surgeon_score: first_non_null(table, &cols, &rows, Field::SurgeonScore),
            hospital: first_non_null(table, &cols, &rows, Field::Hospital),
            procedures: first_non_null(table, &cols, &rows, Field::Procedures),
            procedure_codes: first_non_null(table, &cols, &rows, Field::ProcedureCodes),
            activity: first_non_null(table, &cols, &rows, Field::ActualActivity),
            activity_code: first_non_null(table, &cols, &rows, Field::ActualActivityCode),
            total_price,
            total_quantity,
            items_display,
            items_key,
        });
    }
    Ok(records)
}

// 每病例汇总输出行
#[derive(Debug, Serialize)]
pub struct SurgeryTotalRow {
    #[serde(rename = "case number")]
    pub case_number: String,
    #[serde(rename = "surgeon name")]
    pub surgeon_name: Option<String>,
    #[serde(rename = "surgeon score")]
    pub surgeon_score: Option<String>,
    #[serde(rename = "all procedures")]
    pub procedures: Option<String>,
    #[serde(rename = "all procedures code")]
    pub procedure_codes: Option<String>,
    #[serde(rename = "total quantity")]
    pub total_quantity: f64,
    #[serde(rename = "total price")]
    pub total_price: f64,
}

impl SurgeryTotalRow {
    pub fn new(case: &CaseRecord) -> Self {
        Self {
            case_number: case.case_number.clone(),
            surgeon_name: case.surgeon_name.clone(),
            surgeon_score: case.surgeon_score.clone(),
            procedures: case.procedures.clone(),
            procedure_codes: case.procedure_codes.clone(),
            total_quantity: case.total_quantity,
            total_price: case.total_price,
        }
    }
}

// 病例耗材明细输出行, 价格分组由医生分组结果回填
#[derive(Debug, Serialize)]
pub struct CaseItemsRow {
    #[serde(rename = "case number")]
    pub case_number: String,
    #[serde(rename = "surgeon name")]
    pub surgeon_name: Option<String>,
    #[serde(rename = "surgeon score")]
    pub surgeon_score: Option<String>,
    #[serde(rename = "total price")]
    pub total_price: f64,
    #[serde(rename = "total item quantity")]
    pub total_quantity: f64,
    pub items: String,
    #[serde(rename = "surgeon price group")]
    pub price_group: Option<&'static str>,
}

impl CaseItemsRow {
    pub fn new(case: &CaseRecord, price_group: Option<&'static str>) -> Self {
        Self {
            case_number: case.case_number.clone(),
            surgeon_name: case.surgeon_name.clone(),
            surgeon_score: case.surgeon_score.clone(),
            total_price: case.total_price,
            total_quantity: case.total_quantity,
            items: case.items_display.clone(),
            price_group,
        }
    }
}
