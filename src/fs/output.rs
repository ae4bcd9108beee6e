//! 输出文件暂存工具。
//!
//! 提供「先写同目录临时文件，成功后 rename 到最终路径」的写出语义：
//! - 任何失败路径下临时文件都被删除，磁盘上不留半成品
//! - rename 之前目标路径不存在，崩溃不会留下看似合法的密文文件

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 暂存中的输出文件。
///
/// Drop 时若尚未 [`commit`](StagedFile::commit)，临时文件被删除。
pub struct StagedFile {
    file: Option<File>,
    tmp_path: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// 在目标路径所在目录创建临时文件。
    pub fn create(target: &Path) -> io::Result<Self> {
        let parent = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp_path = build_tmp_path(parent, target.file_name());
        let file = File::create(&tmp_path)?;
        Ok(Self {
            file: Some(file),
            tmp_path,
            committed: false,
        })
    }

    pub fn file(&mut self) -> &mut File {
        self.file.as_mut().expect("暂存文件已被提交")
    }

    /// 确保已写数据落盘；用于提交前，或提交前需要回读临时文件的场景。
    pub fn finish(&mut self) -> io::Result<()> {
        self.file().sync_all()
    }

    /// 未提交状态下的临时路径（目录解包需要直接回读归档）。
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// 落盘并 rename 到最终路径。
    pub fn commit(mut self, target: &Path) -> io::Result<()> {
        let file = self.file.take().expect("暂存文件已被提交");
        file.sync_all()?;
        drop(file);
        fs::rename(&self.tmp_path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            self.file.take();
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// 解决输出路径冲突：不存在则原样返回，否则在扩展名前追加 ` (n)`，
/// 取最小的不冲突 n ≥ 1。必须在打开输出前调用。
pub fn resolve_collision(desired: &Path) -> PathBuf {
    if !desired.exists() {
        return desired.to_path_buf();
    }

    let stem = desired
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let extension = desired.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = desired.with_file_name(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn build_tmp_path(parent: &Path, file_name: Option<&std::ffi::OsStr>) -> PathBuf {
    let base_name = file_name
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("kryptor-output");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);

    parent.join(format!(
        ".{base_name}.tmp-{}-{timestamp}-{counter}",
        std::process::id()
    ))
}
