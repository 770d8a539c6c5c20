use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::table::DataTable;

// 列的规范名=========================================================================================
// 数据集里用到的列收敛到这个有限枚举, 标准标签按数据源原样保留(包括源头的拼写错误)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    CaseNumber,
    SurgeonName,
    SurgeonScore,
    ItemName,
    Quantity,
    TotalPrice,
    Hospital,
    Procedures,
    ProcedureCodes,
    ActualActivity,
    ActualActivityCode,
    ErAdmission,
    Revision,
    OtherHospital,
    Readmission,
    BloodInAdmission,
    AntibioticInAdmission,
    FirstVas,
    SurgeryLength,
    RecoveryLength,
    StayHours,
    BpDiff,
    HrDiff,
    Spo2Diff,
}

impl Field {
    // 规范化之后用来精确匹配的标准标签
    pub fn label(self) -> &'static str {
        match self {
            Field::CaseNumber => "case number",
            Field::SurgeonName => "surgeon name",
            Field::SurgeonScore => "surgeon score",
            Field::ItemName => "item name",
            Field::Quantity => "quantity",
            Field::TotalPrice => "total price",
            Field::Hospital => "hospital",
            Field::Procedures => "all_ procedures",
            Field::ProcedureCodes => "all_ procedures code",
            Field::ActualActivity => "actual activity",
            Field::ActualActivityCode => "actual activity code",
            Field::ErAdmission => "er addmission",
            Field::Revision => "revision",
            Field::OtherHospital => "moving to other hospital",
            Field::Readmission => "re-addmission",
            Field::BloodInAdmission => "blood in addmission",
            Field::AntibioticInAdmission => "antibiotic in addmission",
            Field::FirstVas => "first vas",
            Field::SurgeryLength => "surgery length(min)",
            Field::RecoveryLength => "recovery lentgh (min)",
            Field::StayHours => "calculate length of stay (hours)",
            Field::BpDiff => "blood pressure diff %",
            Field::HrDiff => "hr diff %",
            Field::Spo2Diff => "spo2 diff %",
        }
    }

    // 历史数据里出现过的别名, 标准标签没命中时按这些匹配
    // 临床列只认标准标签
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::CaseNumber => &[
                "case_number",
                "case",
                "case no",
                "case_no",
                "case id",
                "case_id",
                "or items-case number",
            ],
            Field::SurgeonName => &["surgen name", "surgen", "surgeon"],
            Field::SurgeonScore => &["surgen score", "score"],
            Field::Quantity => &[
                "total quantity",
                "qty",
                "total qty",
                "items quantity",
                "total items quantity",
                "total items used",
                "items used",
                "used quantity",
                "item count",
                "count",
                "qutitem",
            ],
            Field::TotalPrice => &[
                "item price",
                "price",
                "unit price",
                "unit_price",
                "price total",
                "item total price",
                "items total price",
                "total item price",
                "surgery total price",
                "total cost",
                "cost",
                "effective price",
            ],
            _ => &[],
        }
    }
}

// 在表头里找字段所在列, 标准标签优先, 其次按别名
fn resolve_index(table: &DataTable, field: Field) -> Option<usize> {
    table.column_index(field.label()).or_else(|| {
        table
            .headers()
            .iter()
            .position(|h| field.aliases().contains(&h.as_str()))
    })
}

// 规范化表头==========================================================================================
// 标签去两端空白并转小写, 缺失的可选活动列注入为全空列, 其余变换都不在这里做
pub fn normalize(table: &mut DataTable) {
    for h in table.headers_mut() {
        *h = h.trim().to_lowercase();
    }
    for field in [Field::ActualActivity, Field::ActualActivityCode] {
        if resolve_index(table, field).is_none() {
            table.push_null_column(field.label());
        }
    }
}

// 已解析的列映射======================================================================================
// 每个组件进场时解析一次, 后面按行取值不再重复找列
#[derive(Debug)]
pub struct ColumnMap {
    idx: HashMap<Field, usize>,
}

impl ColumnMap {
    // 必需列缺了哪些一次性全部报出来(按名称排序); 可选列缺失不报错, 读的时候整列按空值处理
    pub fn with_optional(
        table: &DataTable,
        required: &[Field],
        optional: &[Field],
    ) -> Result<ColumnMap> {
        let mut idx = HashMap::new();
        let mut missing: Vec<String> = Vec::new();
        for &field in required {
            match resolve_index(table, field) {
                Some(i) => {
                    idx.insert(field, i);
                }
                None => missing.push(field.label().to_string()),
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(PipelineError::MissingColumns(missing));
        }
        for &field in optional {
            if let Some(i) = resolve_index(table, field) {
                idx.insert(field, i);
            }
        }
        Ok(ColumnMap { idx })
    }

    // 取某一行上某个字段的值
    pub fn value<'a>(&self, table: &'a DataTable, row: usize, field: Field) -> Option<&'a str> {
        let &col = self.idx.get(&field)?;
        table.value(row, col)
    }
}
