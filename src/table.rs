use std::fs::File;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

// 表格数据模型=======================================================================================
// 列名加按行存放的单元格文本, 单元格保持原始文本, 数值转换推迟到需要的组件里做
#[derive(Debug, Clone)]
pub struct DataTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl DataTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        DataTable { headers, rows }
    }

    // 读取CSV数据, 保留原始行顺序
    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path)?;
        let headers = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let mut rows: Vec<Vec<String>> = Vec::new();
        for result in rdr.records() {
            let record = result?;
            rows.push(record.iter().map(|c| c.to_string()).collect());
        }
        Ok(DataTable::new(headers, rows))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut [String] {
        &mut self.headers
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // 按列名查找列下标
    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }

    // 取单元格文本, 两端空白去掉, 空白单元格视为空值
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        let cell = self.rows.get(row)?.get(col)?.trim();
        if cell.is_empty() {
            None
        } else {
            Some(cell)
        }
    }

    // 追加一个全空列
    pub fn push_null_column(&mut self, label: &str) {
        self.headers.push(label.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
    }
}

// 数值的宽松转换===================================================================================
// 解析不了和NaN都得到None
pub fn parse_f64_opt(raw: Option<&str>) -> Option<f64> {
    raw?.parse::<f64>().ok().filter(|v| !v.is_nan())
}

// 求和用的转换, 空白或者非数值一律按0计, 不报错
pub fn parse_f64_lossy(raw: Option<&str>) -> f64 {
    parse_f64_opt(raw).unwrap_or(0.0)
}

// 写入CSV数据, 输出目录不存在就先建出来
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    let mut wrt = csv::Writer::from_writer(file);
    for row in rows {
        // 逐行写入
        wrt.serialize(row)?;
    }
    wrt.flush()?;
    Ok(())
}
