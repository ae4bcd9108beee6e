//! Kryptor v1 文件头实现
//!
//! 磁盘布局（多字节整数一律小端）：
//!
//! ```text
//! [magic 4B][version 2B][ephemeral_public_key 32B][header_nonce 24B]
//! [encrypted_inner_header 312B][chunk_0][chunk_1]...
//! ```
//!
//! 内层头明文（定长 296 字节，密封后 312 字节）：
//!
//! ```text
//! [padding_length 4B][is_directory 1B][file_name_length 4B]
//! [file_name 255B 零填充][data_encryption_key 32B]
//! ```
//!
//! 内层头的附加认证数据为
//! `le64(密文体长度) ‖ magic ‖ version ‖ ephemeral_public_key`，
//! 密文体长度 = 文件长度 − 固定头长度。任何截断或拼接都会导致
//! 内层头认证失败。
//!
//! Header 是整个 .kryptor 文件的格式锚点：
//! - 解密前必须完整读取并校验外层头
//! - magic / version 不匹配时立即拒绝，输入文件保持原样
//! - 内层头解封成功后，其明文缓冲区随即清零，只有解析后的
//!   字段与 DEK 离开本模块
//!
//! 后续版本只能 bump version，不允许就地改布局。

use std::io::{self, Read};

use zeroize::Zeroizing;

use crate::crypto::aead::{self, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::crypto::secret::SecretKey;
use crate::error::{KryptorError, Result};

/// Kryptor 文件魔数（ASCII）
pub const MAGIC: &[u8; 4] = b"KRYP";

/// 当前格式版本，逐字节精确比较
pub const VERSION: [u8; 2] = [1, 0];

/// 文件名字段上限（字节）
pub const FILE_NAME_MAX: usize = 255;

// 内层头偏移。唯一的布局定义点，其余代码不得出现裸偏移。
const INNER_PADDING_OFFSET: usize = 0;
const INNER_IS_DIR_OFFSET: usize = 4;
const INNER_NAME_LEN_OFFSET: usize = 5;
const INNER_NAME_OFFSET: usize = 9;
const INNER_DEK_OFFSET: usize = INNER_NAME_OFFSET + FILE_NAME_MAX;

/// 内层头明文长度
pub const INNER_HEADER_SIZE: usize = INNER_DEK_OFFSET + KEY_SIZE;

/// 内层头密封后长度
pub const SEALED_INNER_SIZE: usize = INNER_HEADER_SIZE + TAG_SIZE;

// 外层头偏移。
const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const EPK_OFFSET: usize = 6;
const NONCE_OFFSET: usize = 38;
const SEALED_INNER_OFFSET: usize = 62;

/// 固定头总长度（外层字段 + 密封内层头）
pub const HEADER_SIZE: usize = SEALED_INNER_OFFSET + SEALED_INNER_SIZE;

/// 外层头的语义内容；密封的内层头原样保留，供 [`open_inner`] 解封。
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub ephemeral_public: [u8; KEY_SIZE],
    pub header_nonce: [u8; NONCE_SIZE],
    sealed_inner: [u8; SEALED_INNER_SIZE],
}

/// 内层头的语义内容。
///
/// `file_name` 只有在加密时选择隐藏文件名才会写入；
/// DEK 由 [`SecretKey`] 持有，Drop 时清零。
pub struct InnerHeader {
    pub padding_length: u32,
    pub is_directory: bool,
    pub file_name: Option<String>,
    pub dek: SecretKey,
}

/// 组装并密封完整的 374 字节文件头。
///
/// `body_len` 是其后密文块的总长度，加密前就能由输入大小算出，
/// 因此文件头可以先于密文块写入，无需回填。
pub fn seal_header(
    kek: &SecretKey,
    header_nonce: &[u8; NONCE_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
    body_len: u64,
    inner: &InnerHeader,
) -> Result<Vec<u8>> {
    let mut plain = Zeroizing::new([0u8; INNER_HEADER_SIZE]);
    plain[INNER_PADDING_OFFSET..INNER_IS_DIR_OFFSET]
        .copy_from_slice(&inner.padding_length.to_le_bytes());
    plain[INNER_IS_DIR_OFFSET] = inner.is_directory as u8;
    if let Some(name) = &inner.file_name {
        let bytes = truncate_name(name);
        plain[INNER_NAME_LEN_OFFSET..INNER_NAME_OFFSET]
            .copy_from_slice(&(bytes.len() as u32).to_le_bytes());
        plain[INNER_NAME_OFFSET..INNER_NAME_OFFSET + bytes.len()].copy_from_slice(bytes);
    }
    plain[INNER_DEK_OFFSET..INNER_HEADER_SIZE].copy_from_slice(inner.dek.as_bytes());

    let ad = associated_data(body_len, ephemeral_public);
    let sealed = aead::seal(kek.as_bytes(), header_nonce, &plain[..], &ad)?;

    let mut out = Vec::with_capacity(HEADER_SIZE);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION);
    out.extend_from_slice(ephemeral_public);
    out.extend_from_slice(header_nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// 从输入流读取并校验外层头。
///
/// #### 错误
/// - 文件过短、magic 或版本不匹配：`UnsupportedFormat`，输入保持原样
pub fn read_header<R: Read>(mut reader: R) -> Result<FileHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            KryptorError::UnsupportedFormat
        } else {
            KryptorError::Io(e)
        }
    })?;

    if buf[MAGIC_OFFSET..VERSION_OFFSET] != MAGIC[..] {
        return Err(KryptorError::UnsupportedFormat);
    }
    if buf[VERSION_OFFSET..EPK_OFFSET] != VERSION {
        return Err(KryptorError::UnsupportedFormat);
    }

    let mut ephemeral_public = [0u8; KEY_SIZE];
    ephemeral_public.copy_from_slice(&buf[EPK_OFFSET..NONCE_OFFSET]);
    let mut header_nonce = [0u8; NONCE_SIZE];
    header_nonce.copy_from_slice(&buf[NONCE_OFFSET..SEALED_INNER_OFFSET]);
    let mut sealed_inner = [0u8; SEALED_INNER_SIZE];
    sealed_inner.copy_from_slice(&buf[SEALED_INNER_OFFSET..HEADER_SIZE]);

    Ok(FileHeader {
        ephemeral_public,
        header_nonce,
        sealed_inner,
    })
}

/// 解封内层头。
///
/// #### 错误
/// - KEK 错误或文件被篡改（包括截断改变 `body_len`）：`TamperOrWrongKey`
///
/// #### 安全保证
/// - 认证失败不返回任何明文字段
/// - 成功路径上内层头明文缓冲区在返回前清零
pub fn open_inner(header: &FileHeader, kek: &SecretKey, body_len: u64) -> Result<InnerHeader> {
    let ad = associated_data(body_len, &header.ephemeral_public);
    let plain = Zeroizing::new(aead::open(
        kek.as_bytes(),
        &header.header_nonce,
        &header.sealed_inner,
        &ad,
    )?);
    debug_assert_eq!(plain.len(), INNER_HEADER_SIZE);

    let mut padding = [0u8; 4];
    padding.copy_from_slice(&plain[INNER_PADDING_OFFSET..INNER_IS_DIR_OFFSET]);
    let padding_length = u32::from_le_bytes(padding);

    let is_directory = match plain[INNER_IS_DIR_OFFSET] {
        0 => false,
        1 => true,
        _ => return Err(KryptorError::TamperOrWrongKey),
    };

    let mut name_len = [0u8; 4];
    name_len.copy_from_slice(&plain[INNER_NAME_LEN_OFFSET..INNER_NAME_OFFSET]);
    let name_len = u32::from_le_bytes(name_len) as usize;
    if name_len > FILE_NAME_MAX {
        return Err(KryptorError::TamperOrWrongKey);
    }

    let file_name = if name_len == 0 {
        None
    } else {
        let raw = plain[INNER_NAME_OFFSET..INNER_NAME_OFFSET + name_len].to_vec();
        let name = String::from_utf8(raw).map_err(|_| KryptorError::TamperOrWrongKey)?;
        // 内层头只允许纯文件名，任何路径组件都视为篡改。
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(KryptorError::TamperOrWrongKey);
        }
        Some(name)
    };

    let mut dek = [0u8; KEY_SIZE];
    dek.copy_from_slice(&plain[INNER_DEK_OFFSET..INNER_HEADER_SIZE]);

    Ok(InnerHeader {
        padding_length,
        is_directory,
        file_name,
        dek: SecretKey::from_bytes(dek),
    })
}

/// 内层头的附加认证数据：
/// `le64(body_len) ‖ magic ‖ version ‖ ephemeral_public_key`。
fn associated_data(body_len: u64, ephemeral_public: &[u8; KEY_SIZE]) -> [u8; 8 + 4 + 2 + KEY_SIZE] {
    let mut ad = [0u8; 8 + 4 + 2 + KEY_SIZE];
    ad[..8].copy_from_slice(&body_len.to_le_bytes());
    ad[8..12].copy_from_slice(MAGIC);
    ad[12..14].copy_from_slice(&VERSION);
    ad[14..].copy_from_slice(ephemeral_public);
    ad
}

/// 按 UTF-8 字符边界把文件名截断到 FILE_NAME_MAX 字节以内。
fn truncate_name(name: &str) -> &[u8] {
    if name.len() <= FILE_NAME_MAX {
        return name.as_bytes();
    }
    let mut end = FILE_NAME_MAX;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name.as_bytes()[..end]
}
