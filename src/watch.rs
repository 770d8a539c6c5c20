use std::collections::HashSet;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::intake::find_datasets;
use crate::pipeline::{run_all, PipelineOptions};

fn current_set(options: &PipelineOptions) -> HashSet<PathBuf> {
    match find_datasets(&options.data_dir) {
        Ok(files) => files.into_iter().collect(),
        Err(err) => {
            error!("failed to list {}: {err}", options.data_dir.display());
            HashSet::new()
        }
    }
}

fn run_once(options: &PipelineOptions) {
    if let Err(err) = run_all(options) {
        error!("pipeline run failed: {err}");
    }
}

// 轮询守望===========================================================================================
// 固定间隔轮询数据目录, 出现新csv就跑一整轮; 跑完的文件已经挪走, 刷新已见集合即可.
// 单轮失败只记日志, 守望不退出.
pub fn watch(options: &PipelineOptions, interval: Duration) {
    let mut seen = current_set(options);
    if !seen.is_empty() {
        info!("{} dataset(s) already present, processing now", seen.len());
        run_once(options);
        seen = current_set(options);
    }
    info!(
        "watching {} every {}s for new datasets",
        options.data_dir.display(),
        interval.as_secs_f64()
    );
    loop {
        thread::sleep(interval);
        let current = current_set(options);
        let fresh = current.difference(&seen).count();
        if fresh > 0 {
            info!("detected {fresh} new dataset(s)");
            run_once(options);
            seen = current_set(options);
        } else {
            seen = current;
        }
    }
}
