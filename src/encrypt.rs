//! Kryptor 加密流程实现
//!
//! 本模块负责把单个文件或目录加密为 .kryptor 文件。
//!
//! 加密流程（严格顺序）：
//! 1. 目录先打包为归档文件，之后与普通文件走同一条路
//! 2. 由输入大小预先算出 padding 与密文体长度
//! 3. 生成随机 header_nonce，按凭据模式派生 KEK
//! 4. 生成随机 DEK，密封内层头并率先写入
//! 5. 分块加密写入，nonce 逐块递增
//! 6. 全部成功后才 rename 到最终路径 / 删除输入
//!
//! 注意：
//! - 任何失败路径：暂存输出被删除，KEK / DEK 随作用域清零
//! - 本模块不负责批量调度与进度上报

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::crypto::aead;
use crate::crypto::kdf::{self, EncryptionKeys};
use crate::crypto::secret::SecretKey;
use crate::error::{KryptorError, Result};
use crate::format::header::{self, InnerHeader};
use crate::format::stream::{self, ChunkEncryptor};
use crate::fs::output::{resolve_collision, StagedFile};
use crate::CancelToken;

/// 加密输出扩展名
pub const ENCRYPTED_EXTENSION: &str = "kryptor";

/// 隐藏文件名时随机 id 的字节数
const RANDOM_NAME_LEN: usize = 16;

#[derive(Clone, Default)]
pub struct EncryptOptions {
    /// 成功后删除输入文件/目录
    pub overwrite_input: bool,
    /// 文件名写入加密头，输出改用随机名
    pub encrypt_file_names: bool,
    pub cancel: CancelToken,
}

/// 加密单个文件或目录，返回输出路径。
pub fn encrypt_file(
    input: &Path,
    keys: &EncryptionKeys,
    opts: &EncryptOptions,
) -> Result<PathBuf> {
    validate_input(input, keys)?;

    // ---------- 目录先打包 ----------
    let is_directory = input.is_dir();
    let source = if is_directory {
        archive::pack_directory(input)?
    } else {
        input.to_path_buf()
    };

    let result = encrypt_packed(input, &source, is_directory, keys, opts);
    if is_directory {
        // 明文归档无论成败都不能留在磁盘上。
        let _ = fs::remove_file(&source);
    }
    let output = result?;

    // ---------- 完整成功后才删除输入 ----------
    if opts.overwrite_input {
        if is_directory {
            fs::remove_dir_all(input)?;
        } else {
            fs::remove_file(input)?;
        }
    }

    Ok(output)
}

pub(crate) fn validate_input(input: &Path, keys: &EncryptionKeys) -> Result<()> {
    if !input.exists() {
        return Err(KryptorError::Validation(format!(
            "输入不存在: {}",
            input.display()
        )));
    }
    if !input.is_file() && !input.is_dir() {
        return Err(KryptorError::Validation(format!(
            "既不是普通文件也不是目录: {}",
            input.display()
        )));
    }
    if let EncryptionKeys::Password { password, .. } = keys {
        if password.is_empty() {
            return Err(KryptorError::Validation("密码不能为空".into()));
        }
    }
    Ok(())
}

fn encrypt_packed(
    original: &Path,
    source: &Path,
    is_directory: bool,
    keys: &EncryptionKeys,
    opts: &EncryptOptions,
) -> Result<PathBuf> {
    let plaintext_len = fs::metadata(source)?.len();
    let body_len = stream::body_length(plaintext_len);
    let padding_length = stream::padding_length(plaintext_len);

    // ---------- 凭据派生 KEK ----------
    let header_nonce = aead::random_nonce();
    let (kek, ephemeral_public) = kdf::encrypt_kek(keys, &header_nonce)?;

    // ---------- 随机 DEK 与内层头 ----------
    let inner = InnerHeader {
        padding_length,
        is_directory,
        file_name: stored_file_name(original, opts),
        dek: SecretKey::random(),
    };
    let header_bytes = header::seal_header(&kek, &header_nonce, &ephemeral_public, body_len, &inner)?;
    drop(kek);

    // ---------- 输出路径（冲突在打开前解决） ----------
    let output_path = output_path_for(original, opts)?;

    // ---------- 先写头，再流式写密文块 ----------
    let reader = BufReader::new(File::open(source)?);
    let mut staged = StagedFile::create(&output_path)?;
    {
        let mut writer = BufWriter::new(staged.file());
        writer.write_all(&header_bytes)?;
        ChunkEncryptor::new(&inner.dek, header_nonce).encrypt(
            reader,
            &mut writer,
            plaintext_len,
            &opts.cancel,
        )?;
        writer.flush()?;
    }
    staged.commit(&output_path)?;

    Ok(output_path)
}

fn stored_file_name(original: &Path, opts: &EncryptOptions) -> Option<String> {
    if !opts.encrypt_file_names {
        return None;
    }
    original
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn output_path_for(input: &Path, opts: &EncryptOptions) -> Result<PathBuf> {
    let file_name = if opts.encrypt_file_names {
        let mut id = [0u8; RANDOM_NAME_LEN];
        aead::random_bytes(&mut id);
        format!("{}.bin.{ENCRYPTED_EXTENSION}", hex::encode(id))
    } else {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                KryptorError::Validation(format!("无法取得输入文件名: {}", input.display()))
            })?;
        format!("{name}.{ENCRYPTED_EXTENSION}")
    };

    Ok(resolve_collision(&input.with_file_name(file_name)))
}
