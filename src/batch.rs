//! 批量驱动。
//!
//! 顺序处理一组输入路径：
//! - 开始前统一校验，校验失败的路径计入失败，但不阻塞其余文件
//! - 单个文件失败不会中止整批
//! - 计数以显式 [`BatchStats`] 值返回，不依赖任何全局可变状态
//! - 处理结束时，所有文件级 KEK / DEK 均已随作用域清零

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::crypto::kdf::{DecryptionKeys, EncryptionKeys};
use crate::decrypt::{self, DecryptOptions};
use crate::encrypt::{self, EncryptOptions};
use crate::error::KryptorError;

/// 一批处理的汇总计数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// 逐文件进度回调，由 CLI 或上层 UI 实现。
pub trait ProgressSink {
    fn file_started(&mut self, _path: &Path) {}
    fn file_completed(&mut self, _input: &Path, _output: &Path) {}
    fn file_failed(&mut self, _path: &Path, _error: &KryptorError) {}
}

/// 默认空实现。
pub struct NullSink;

impl ProgressSink for NullSink {}

/// 批量加密。
pub fn encrypt_batch(
    paths: &[PathBuf],
    keys: &EncryptionKeys,
    opts: &EncryptOptions,
    sink: &mut dyn ProgressSink,
) -> BatchStats {
    run_batch(
        paths,
        sink,
        |path| encrypt::validate_input(path, keys),
        |path| encrypt::encrypt_file(path, keys, opts),
    )
}

/// 批量解密。
pub fn decrypt_batch(
    paths: &[PathBuf],
    keys: &DecryptionKeys,
    opts: &DecryptOptions,
    sink: &mut dyn ProgressSink,
) -> BatchStats {
    run_batch(
        paths,
        sink,
        decrypt::validate_input,
        |path| decrypt::decrypt_file(path, keys, opts),
    )
}

fn run_batch<V, F>(
    paths: &[PathBuf],
    sink: &mut dyn ProgressSink,
    validate: V,
    mut process: F,
) -> BatchStats
where
    V: Fn(&Path) -> Result<(), KryptorError>,
    F: FnMut(&Path) -> Result<PathBuf, KryptorError>,
{
    let mut stats = BatchStats {
        total: paths.len(),
        succeeded: 0,
        failed: 0,
    };

    // ---------- 先整体校验 ----------
    let mut valid = Vec::with_capacity(paths.len());
    for path in paths {
        match validate(path) {
            Ok(()) => valid.push(path.as_path()),
            Err(err) => {
                warn!(input = %path.display(), error = %err, "校验失败，跳过");
                sink.file_failed(path, &err);
                stats.failed += 1;
            }
        }
    }

    // ---------- 逐个处理 ----------
    for path in valid {
        sink.file_started(path);
        match process(path) {
            Ok(output) => {
                info!(input = %path.display(), output = %output.display(), "处理完成");
                sink.file_completed(path, &output);
                stats.succeeded += 1;
            }
            Err(err) => {
                warn!(input = %path.display(), error = %err, "处理失败");
                sink.file_failed(path, &err);
                stats.failed += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::secret::SecretKey;
    use std::fs;
    use tempfile::tempdir;

    struct RecordingSink {
        completed: usize,
        failed: usize,
    }

    impl ProgressSink for RecordingSink {
        fn file_completed(&mut self, _input: &Path, _output: &Path) {
            self.completed += 1;
        }
        fn file_failed(&mut self, _path: &Path, _error: &KryptorError) {
            self.failed += 1;
        }
    }

    #[test]
    fn one_bad_path_does_not_abort_batch() {
        let dir = tempdir().expect("create temp dir");
        let good_a = dir.path().join("a.txt");
        let good_b = dir.path().join("b.txt");
        fs::write(&good_a, b"a").unwrap();
        fs::write(&good_b, b"b").unwrap();

        let paths = vec![good_a, dir.path().join("missing.txt"), good_b];
        let keys = EncryptionKeys::Symmetric {
            key: SecretKey::from_bytes([1; 32]),
        };
        let mut sink = RecordingSink {
            completed: 0,
            failed: 0,
        };

        let stats = encrypt_batch(&paths, &keys, &EncryptOptions::default(), &mut sink);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(sink.completed, 2);
        assert_eq!(sink.failed, 1);
        assert!(!stats.all_succeeded());
    }

    #[test]
    fn empty_password_fails_validation_before_processing() {
        let dir = tempdir().expect("create temp dir");
        let input = dir.path().join("a.txt");
        fs::write(&input, b"a").unwrap();

        let keys = EncryptionKeys::password("");
        let mut sink = NullSink;
        let stats = encrypt_batch(
            &[input.clone()],
            &keys,
            &EncryptOptions::default(),
            &mut sink,
        );

        assert_eq!(stats.failed, 1);
        // 校验阶段失败，不应产生任何输出文件。
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
