use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use log::info;
use tar::Archive;

use crate::error::{PipelineError, Result};

// 压缩包识别=========================================================================================
pub fn is_supported_archive(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_ascii_lowercase(),
        None => return false,
    };
    name.ends_with(".tar") || name.ends_with(".tar.gz") || name.ends_with(".tgz") || name.ends_with(".gz")
}

// 去掉压缩扩展后的主干, 多段扩展先匹配
fn archive_stem(name: &str) -> &str {
    let lower = name.to_ascii_lowercase();
    for suffix in [".tar.gz", ".tgz", ".tar", ".gz"] {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

fn unpack_tar(path: &Path, dest: &Path) -> Result<()> {
    let mut archive = Archive::new(File::open(path)?);
    archive.unpack(dest)?;
    Ok(())
}

fn unpack_tar_gz(path: &Path, dest: &Path) -> Result<()> {
    let gz = GzDecoder::new(File::open(path)?);
    let mut archive = Archive::new(gz);
    archive.unpack(dest)?;
    Ok(())
}

// 单文件gz解压回去掉后缀的原名
fn unpack_gz(path: &Path, dest: &Path, stem: &str) -> Result<()> {
    let mut gz = GzDecoder::new(File::open(path)?);
    let mut out = File::create(dest.join(stem))?;
    io::copy(&mut gz, &mut out)?;
    Ok(())
}

// 解压===============================================================================================
// 每个压缩包解到以主干命名的子目录里, 避免文件互相覆盖; 失败时清掉空目录再上报
pub fn extract_file(archive_path: &Path, dest_root: &Path) -> Result<PathBuf> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::UnsupportedArchive(archive_path.to_path_buf()))?;
    let lower = name.to_ascii_lowercase();
    let dest = dest_root.join(archive_stem(name));
    fs::create_dir_all(&dest)?;

    let outcome = if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        unpack_tar_gz(archive_path, &dest)
    } else if lower.ends_with(".tar") {
        unpack_tar(archive_path, &dest)
    } else if lower.ends_with(".gz") {
        unpack_gz(archive_path, &dest, archive_stem(name))
    } else {
        Err(PipelineError::UnsupportedArchive(archive_path.to_path_buf()))
    };
    if outcome.is_err() {
        let _ = fs::remove_dir(&dest);
    }
    outcome.map(|_| dest)
}

// 把数据目录里所有支持的压缩包解开, 按文件名顺序处理
pub fn extract_archives(data_dir: &Path, dest_root: &Path) -> Result<Vec<PathBuf>> {
    let mut extracted = Vec::new();
    if !data_dir.is_dir() {
        return Ok(extracted);
    }
    let mut archives: Vec<PathBuf> = fs::read_dir(data_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_supported_archive(path))
        .collect();
    archives.sort();
    for archive in archives {
        info!("extracting {}", archive.display());
        extracted.push(extract_file(&archive, dest_root)?);
    }
    Ok(extracted)
}

// 数据发现===========================================================================================
// 数据目录里的csv就是待处理数据集, 目录不存在当作空
pub fn find_datasets(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !data_dir.is_dir() {
        return Ok(files);
    }
    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// 归档===============================================================================================
// 处理完的文件挪进档案目录, 重名时给主干加数字后缀, 绝不覆盖
pub fn archive_processed(input: &Path, archive_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(archive_dir)?;
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::InputNotFound(input.to_path_buf()))?;
    let mut dest = archive_dir.join(file_name);
    if dest.exists() {
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("input");
        let ext = input.extension().and_then(|e| e.to_str());
        let mut counter = 1;
        loop {
            let candidate = match ext {
                Some(ext) => archive_dir.join(format!("{stem}_{counter}.{ext}")),
                None => archive_dir.join(format!("{stem}_{counter}")),
            };
            if !candidate.exists() {
                dest = candidate;
                break;
            }
            counter += 1;
        }
    }
    if fs::rename(input, &dest).is_err() {
        // 跨文件系统移动时退回拷贝加删除
        fs::copy(input, &dest)?;
        fs::remove_file(input)?;
    }
    info!("moved {} -> {}", input.display(), dest.display());
    Ok(dest)
}
