//! 分块加密管线：按 CHUNK_SIZE 切块逐块 AEAD，nonce 自 header_nonce 单调递增。

use std::io::{self, Read, Write};

use crate::crypto::aead::{self, NONCE_SIZE, TAG_SIZE};
use crate::crypto::secret::SecretKey;
use crate::error::{KryptorError, Result};
use crate::CancelToken;

/// 明文块大小
pub const CHUNK_SIZE: usize = 16 * 1024;

/// 密文块大小（明文块 + tag）
pub const SEALED_CHUNK_SIZE: usize = CHUNK_SIZE + TAG_SIZE;

/// 明文大小 → 块数。空文件也占一个整块，密文长度不暴露「是否为空」之外的信息。
pub fn chunk_count(plaintext_len: u64) -> u64 {
    if plaintext_len == 0 {
        1
    } else {
        plaintext_len.div_ceil(CHUNK_SIZE as u64)
    }
}

/// 末块补零的字节数，写入内层头。
pub fn padding_length(plaintext_len: u64) -> u32 {
    (chunk_count(plaintext_len) * CHUNK_SIZE as u64 - plaintext_len) as u32
}

/// 密文体总长度。加密前即可由输入大小算出，文件头因此能先写。
pub fn body_length(plaintext_len: u64) -> u64 {
    chunk_count(plaintext_len) * SEALED_CHUNK_SIZE as u64
}

/// 小端 192-bit +1，全部字节无条件参与进位；最高位进位溢出视为 nonce 耗尽。
fn increment_nonce(nonce: &mut [u8; NONCE_SIZE]) -> Result<()> {
    let mut carry = 1u16;
    for byte in nonce.iter_mut() {
        let sum = *byte as u16 + carry;
        *byte = sum as u8;
        carry = sum >> 8;
    }
    if carry != 0 {
        return Err(KryptorError::Internal);
    }
    Ok(())
}

pub struct ChunkEncryptor<'a> {
    dek: &'a SecretKey,
    nonce: [u8; NONCE_SIZE],
}

impl<'a> ChunkEncryptor<'a> {
    /// 第一块使用 `header_nonce + 1`；`header_nonce` 本身已被文件头占用。
    pub fn new(dek: &'a SecretKey, header_nonce: [u8; NONCE_SIZE]) -> Self {
        Self {
            dek,
            nonce: header_nonce,
        }
    }

    pub fn encrypt<R: Read, W: Write>(
        mut self,
        mut reader: R,
        writer: &mut W,
        plaintext_len: u64,
        cancel: &CancelToken,
    ) -> Result<()> {
        let chunks = chunk_count(plaintext_len);
        let mut remaining = plaintext_len;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        for _ in 0..chunks {
            if cancel.is_cancelled() {
                return Err(KryptorError::Cancelled);
            }

            let take = remaining.min(CHUNK_SIZE as u64) as usize;
            reader.read_exact(&mut buffer[..take])?;
            buffer[take..].fill(0);

            increment_nonce(&mut self.nonce)?;
            let sealed = aead::seal(self.dek.as_bytes(), &self.nonce, &buffer, &[])?;
            writer.write_all(&sealed)?;

            remaining -= take as u64;
        }

        Ok(())
    }
}

pub struct ChunkDecryptor<'a> {
    dek: &'a SecretKey,
    nonce: [u8; NONCE_SIZE],
}

impl<'a> ChunkDecryptor<'a> {
    pub fn new(dek: &'a SecretKey, header_nonce: [u8; NONCE_SIZE]) -> Self {
        Self {
            dek,
            nonce: header_nonce,
        }
    }

    /// 逐块解密；末块按 `padding` 丢弃补零部分，输出即原始明文长度。
    pub fn decrypt<R: Read, W: Write>(
        mut self,
        mut reader: R,
        writer: &mut W,
        body_len: u64,
        padding: u32,
        cancel: &CancelToken,
    ) -> Result<()> {
        if body_len == 0 || body_len % SEALED_CHUNK_SIZE as u64 != 0 {
            return Err(KryptorError::TamperOrWrongKey);
        }
        if padding as usize > CHUNK_SIZE {
            return Err(KryptorError::TamperOrWrongKey);
        }

        let chunks = body_len / SEALED_CHUNK_SIZE as u64;
        let mut sealed = vec![0u8; SEALED_CHUNK_SIZE];

        for index in 0..chunks {
            if cancel.is_cancelled() {
                return Err(KryptorError::Cancelled);
            }

            reader.read_exact(&mut sealed).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    KryptorError::TamperOrWrongKey
                } else {
                    KryptorError::Io(e)
                }
            })?;

            increment_nonce(&mut self.nonce)?;
            let plain = aead::open(self.dek.as_bytes(), &self.nonce, &sealed, &[])?;

            let keep = if index + 1 == chunks {
                CHUNK_SIZE - padding as usize
            } else {
                CHUNK_SIZE
            };
            writer.write_all(&plain[..keep])?;
        }

        Ok(())
    }
}
