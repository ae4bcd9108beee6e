mod archive;
mod decrypt;
mod encrypt;

pub mod batch;
pub mod crypto;
pub mod error;
pub mod format;
pub mod fs;

pub use batch::{BatchStats, NullSink, ProgressSink};
pub use crypto::kdf::{DecryptionKeys, EncryptionKeys};
pub use crypto::secret::SecretKey;
pub use decrypt::DecryptOptions;
pub use encrypt::{EncryptOptions, ENCRYPTED_EXTENSION};
pub use error::KryptorError;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消令牌。
///
/// 编排器在块与块之间轮询；触发后当前文件按 I/O 错误同样的
/// 清理规则中止（删除暂存输出、清零秘密），返回 `Cancelled`。
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// 加密单个文件或目录。
pub fn encrypt_file(
    input: &Path,
    keys: &EncryptionKeys,
    opts: &EncryptOptions,
) -> error::Result<PathBuf> {
    encrypt::encrypt_file(input, keys, opts)
}

/// 解密单个 .kryptor 文件。
pub fn decrypt_file(
    input: &Path,
    keys: &DecryptionKeys,
    opts: &DecryptOptions,
) -> error::Result<PathBuf> {
    decrypt::decrypt_file(input, keys, opts)
}

/// 批量加密。
pub fn encrypt_batch(
    paths: &[PathBuf],
    keys: &EncryptionKeys,
    opts: &EncryptOptions,
    sink: &mut dyn ProgressSink,
) -> BatchStats {
    batch::encrypt_batch(paths, keys, opts, sink)
}

/// 批量解密。
pub fn decrypt_batch(
    paths: &[PathBuf],
    keys: &DecryptionKeys,
    opts: &DecryptOptions,
    sink: &mut dyn ProgressSink,
) -> BatchStats {
    batch::decrypt_batch(paths, keys, opts, sink)
}
