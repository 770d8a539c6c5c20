use std::path::Path;

use log::info;
use rusqlite::{params_from_iter, Connection};

use crate::error::{PipelineError, Result};
use crate::intake::find_datasets;
use crate::table::DataTable;

// 表名槽化: 非字母数字的连续段压成一个下划线, 全小写, 空了就叫table
pub fn slugify_table_name(stem: &str) -> String {
    let mut slug = String::new();
    let mut gap = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            gap = false;
        } else if !gap {
            slug.push('_');
            gap = true;
        }
    }
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "table".to_string()
    } else {
        slug.to_string()
    }
}

// 单个汇总文件灌成一张表, 已存在就整表替换
fn load_file(conn: &mut Connection, path: &Path) -> Result<()> {
    let table = DataTable::from_csv_path(path)?;
    if table.headers().is_empty() {
        info!("skipping {}, no columns", path.display());
        return Ok(());
    }
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let name = slugify_table_name(stem);
    // 列一律按TEXT存, 标题里的引号翻倍转义
    let columns: Vec<String> = table
        .headers()
        .iter()
        .map(|h| format!("\"{}\" TEXT", h.replace('"', "\"\"")))
        .collect();

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS \"{name}\"; CREATE TABLE \"{name}\" ({});",
        columns.join(", ")
    ))?;
    {
        let placeholders = vec!["?"; table.headers().len()].join(", ");
        let mut stmt = tx.prepare(&format!("INSERT INTO \"{name}\" VALUES ({placeholders})"))?;
        for row in 0..table.n_rows() {
            let values = (0..table.headers().len()).map(|col| table.value(row, col));
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    info!("loaded {} rows into table '{}'", table.n_rows(), name);
    Ok(())
}

// 汇总入库===========================================================================================
// 汇总目录里每个csv一张表, 按文件名顺序加载
pub fn load_summaries(db_path: &Path, summary_dir: &Path) -> Result<()> {
    if !summary_dir.is_dir() {
        return Err(PipelineError::InputNotFound(summary_dir.to_path_buf()));
    }
    let files = find_datasets(summary_dir)?;
    if files.is_empty() {
        info!("no summary files in {}", summary_dir.display());
        return Ok(());
    }
    let mut conn = Connection::open(db_path)?;
    for file in files {
        load_file(&mut conn, &file)?;
    }
    Ok(())
}
