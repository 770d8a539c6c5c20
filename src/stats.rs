// 统计辅助函数=======================================================================================

// 算术平均
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

// 分位数, 排序后在相邻次序统计量之间线性插值, 空集合没有分位数
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let q = q.clamp(0.0, 1.0);
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let frac = pos - lower as f64;
    if lower + 1 < sorted.len() {
        Some(sorted[lower] + frac * (sorted[lower + 1] - sorted[lower]))
    } else {
        Some(sorted[lower])
    }
}

// 中位数
pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}
