//! Kryptor 解密流程实现
//!
//! 本模块负责把 .kryptor 文件解密还原为原始文件或目录树。
//!
//! 解密流程（严格顺序）：
//! 1. 读取并校验外层头（magic / 版本）
//! 2. 按凭据模式派生 KEK，解封内层头取出 DEK
//! 3. 分块解密到暂存文件，末块去除 padding
//! 4. 头里带文件名则改名为原名；目录归档则解包后删除归档
//!
//! 注意：
//! - 任一认证失败立即中止，磁盘上不留任何明文
//! - magic / 版本不匹配时输入文件保持原样

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::crypto::kdf::{self, DecryptionKeys};
use crate::error::{KryptorError, Result};
use crate::format::header;
use crate::format::stream::ChunkDecryptor;
use crate::fs::output::{resolve_collision, StagedFile};
use crate::encrypt::ENCRYPTED_EXTENSION;
use crate::CancelToken;

#[derive(Clone, Default)]
pub struct DecryptOptions {
    pub cancel: CancelToken,
}

/// 解密单个 .kryptor 文件，返回输出路径（文件或还原出的目录）。
pub fn decrypt_file(
    input: &Path,
    keys: &DecryptionKeys,
    opts: &DecryptOptions,
) -> Result<PathBuf> {
    validate_input(input)?;
    let file_len = fs::metadata(input)?.len();

    let mut reader = BufReader::new(File::open(input)?);

    // ---------- 外层头 ----------
    let file_header = header::read_header(&mut reader)?;
    let body_len = file_len - header::HEADER_SIZE as u64;

    // ---------- KEK 与内层头 ----------
    let kek = kdf::decrypt_kek(keys, &file_header.header_nonce, &file_header.ephemeral_public)?;
    let inner = header::open_inner(&file_header, &kek, body_len)?;
    drop(kek);

    // ---------- 输出命名（冲突在打开前解决） ----------
    let output_name = match &inner.file_name {
        Some(name) => name.clone(),
        None => default_output_name(input)?,
    };
    let final_path = resolve_collision(&input.with_file_name(output_name));

    // ---------- 分块解密到暂存文件 ----------
    let mut staged = StagedFile::create(&final_path)?;
    {
        let mut writer = BufWriter::new(staged.file());
        ChunkDecryptor::new(&inner.dek, file_header.header_nonce).decrypt(
            &mut reader,
            &mut writer,
            body_len,
            inner.padding_length,
            &opts.cancel,
        )?;
        writer.flush()?;
    }

    if inner.is_directory {
        // 归档不落最终名，直接从暂存文件解包；暂存归档随 Drop 删除。
        staged.finish()?;
        if let Err(err) = archive::unpack_archive(staged.tmp_path(), &final_path) {
            let _ = fs::remove_dir_all(&final_path);
            return Err(err);
        }
    } else {
        staged.commit(&final_path)?;
    }

    Ok(final_path)
}

pub(crate) fn validate_input(input: &Path) -> Result<()> {
    if !input.is_file() {
        return Err(KryptorError::Validation(format!(
            "输入不存在或不是普通文件: {}",
            input.display()
        )));
    }
    Ok(())
}

/// 头里没有文件名时，输出名 = 输入名去掉 .kryptor 扩展名。
fn default_output_name(input: &Path) -> Result<String> {
    if input.extension().and_then(OsStr::to_str) != Some(ENCRYPTED_EXTENSION) {
        return Err(KryptorError::Validation(format!(
            "输入没有 .{ENCRYPTED_EXTENSION} 扩展名: {}",
            input.display()
        )));
    }
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            KryptorError::Validation(format!(
                "去掉 .{ENCRYPTED_EXTENSION} 后文件名为空: {}",
                input.display()
            ))
        })?;
    Ok(stem)
}
