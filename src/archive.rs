//! 目录打包/解包。
//!
//! 目录加密走「先打包成单个归档文件，再按普通文件加密」的路线，
//! 加密核心因此不需要区分文件与目录。
//!
//! 归档是私有格式，只承诺 pack / unpack round-trip：
//!
//! ```text
//! 条目序列，按路径排序，读到 EOF 为止：
//! [kind 1B: 0=目录 1=文件][path_len 2B LE][相对路径 UTF-8, '/' 分隔]
//! [仅文件: data_len 8B LE][data]
//! ```
//!
//! 设计要点：
//! - 递归遍历目录，保持相对路径结构，空目录也入档
//! - 文件内容流式拷贝，不整读进内存
//! - 解包时严格校验相对路径组件，防止路径穿越写出到目标目录之外

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use walkdir::WalkDir;

use crate::error::{KryptorError, Result};

const KIND_DIR: u8 = 0;
const KIND_FILE: u8 = 1;

static PACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 把目录打包为同级隐藏归档文件，返回归档路径。
///
/// 调用方负责在用毕后删除归档。
pub fn pack_directory(dir: &Path) -> Result<PathBuf> {
    if !dir.is_dir() {
        return Err(KryptorError::Validation(format!(
            "不是目录: {}",
            dir.display()
        )));
    }

    let archive_path = build_archive_path(dir);
    let file = File::create(&archive_path)?;
    let mut writer = BufWriter::new(file);

    let mut result = write_entries(dir, &mut writer);
    if result.is_ok() {
        result = writer.flush().map_err(Into::into);
    }
    if let Err(err) = result {
        let _ = fs::remove_file(&archive_path);
        return Err(err);
    }

    Ok(archive_path)
}

/// 把归档解包到 `dest` 目录（不存在则创建）。
pub fn unpack_archive(archive: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut reader = BufReader::new(File::open(archive)?);

    loop {
        let mut kind = [0u8; 1];
        match reader.read_exact(&mut kind) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let rel = read_entry_path(&mut reader)?;
        let target = safe_join(dest, &rel)?;

        match kind[0] {
            KIND_DIR => fs::create_dir_all(&target)?,
            KIND_FILE => {
                let mut len_buf = [0u8; 8];
                reader.read_exact(&mut len_buf)?;
                let len = u64::from_le_bytes(len_buf);

                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                let copied = io::copy(&mut (&mut reader).take(len), &mut out)?;
                if copied != len {
                    return Err(KryptorError::Internal);
                }
            }
            _ => return Err(KryptorError::Internal),
        }
    }

    Ok(())
}

fn write_entries<W: Write>(dir: &Path, writer: &mut W) -> Result<()> {
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(walkdir_to_io)?;
        let rel = entry.path().strip_prefix(dir).map_err(|e| {
            KryptorError::Validation(format!("无法计算相对路径: {e}"))
        })?;
        if rel.as_os_str().is_empty() {
            // 根目录自身
            continue;
        }

        let rel_str = encode_rel_path(rel)?;

        if entry.file_type().is_dir() {
            write_entry_header(writer, KIND_DIR, &rel_str)?;
        } else if entry.file_type().is_file() {
            write_entry_header(writer, KIND_FILE, &rel_str)?;
            let len = entry.metadata().map_err(walkdir_to_io)?.len();
            writer.write_all(&len.to_le_bytes())?;

            let mut input = File::open(entry.path())?;
            let copied = io::copy(&mut input, writer)?;
            if copied != len {
                return Err(KryptorError::Validation(format!(
                    "文件在打包期间被修改: {}",
                    entry.path().display()
                )));
            }
        }
        // 符号链接等其他类型跳过
    }
    Ok(())
}

fn write_entry_header<W: Write>(writer: &mut W, kind: u8, rel: &str) -> Result<()> {
    writer.write_all(&[kind])?;
    writer.write_all(&(rel.len() as u16).to_le_bytes())?;
    writer.write_all(rel.as_bytes())?;
    Ok(())
}

fn read_entry_path<R: Read>(reader: &mut R) -> Result<PathBuf> {
    let mut len_buf = [0u8; 2];
    reader.read_exact(&mut len_buf)?;
    let len = u16::from_le_bytes(len_buf) as usize;

    let mut raw = vec![0u8; len];
    reader.read_exact(&mut raw)?;
    let raw = String::from_utf8(raw).map_err(|_| KryptorError::Internal)?;
    decode_rel_path(&raw)
}

/// 相对路径 → 归档内的 '/' 分隔表示；只允许普通组件。
fn encode_rel_path(rel: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for comp in rel.components() {
        match comp {
            Component::Normal(v) => {
                let part = v.to_str().ok_or_else(|| {
                    KryptorError::Validation(format!("路径不是 UTF-8: {rel:?}"))
                })?;
                parts.push(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(KryptorError::Validation(format!(
                    "检测到不安全路径组件: {rel:?}"
                )));
            }
        }
    }
    let joined = parts.join("/");
    if joined.len() > u16::MAX as usize {
        return Err(KryptorError::Validation(format!("路径过长: {rel:?}")));
    }
    Ok(joined)
}

/// 归档内路径 → 安全相对路径；拒绝空组件、`.`、`..`、反斜杠。
fn decode_rel_path(raw: &str) -> Result<PathBuf> {
    let mut safe = PathBuf::new();
    for part in raw.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return Err(KryptorError::Validation(format!(
                "归档内路径非法: {raw:?}"
            )));
        }
        safe.push(part);
    }
    if safe.as_os_str().is_empty() {
        return Err(KryptorError::Validation("归档内路径为空".into()));
    }
    Ok(safe)
}

/// 在目标根目录下拼接已校验的相对路径，并再次确认结果不越界。
fn safe_join(root: &Path, rel: &Path) -> Result<PathBuf> {
    let joined = root.join(rel);
    if !joined.starts_with(root) {
        return Err(KryptorError::Validation(format!(
            "目标路径越界: {joined:?}"
        )));
    }
    Ok(joined)
}

fn build_archive_path(dir: &Path) -> PathBuf {
    let base_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("kryptor-archive");
    let counter = PACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = format!(".{base_name}.pack-{}-{counter}", std::process::id());
    dir.with_file_name(file_name)
}

fn walkdir_to_io(err: walkdir::Error) -> KryptorError {
    KryptorError::Io(io::Error::other(err.to_string()))
}
