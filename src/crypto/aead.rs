//! XChaCha20-BLAKE2b AEAD 实现
//!
//! 本模块用 XChaCha20 流加密与带密钥 BLAKE2b MAC 组合出
//! Encrypt-then-MAC 形式的 AEAD。
//!
//! 构造方式（与磁盘格式绑定，严禁改动）：
//! - 一次性 MAC 子密钥取自 (key, nonce) 对应密钥流的前 32 字节
//! - 负载从密钥流第 1 块（字节偏移 64）开始加密
//! - tag = BLAKE2b-128(key = 子密钥, ad ‖ 密文 ‖ le64(|ad|) ‖ le64(|密文|))
//!
//! 安全约束：
//! - 同一 (key, nonce) 严禁加密两次
//! - 认证未通过前，不允许输出任何明文

use blake2::digest::consts::U16;
use blake2::digest::Mac;
use blake2::Blake2bMac;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{Key, XChaCha20, XNonce};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::KryptorError;

/// 对称密钥长度（256-bit）
pub const KEY_SIZE: usize = 32;

/// XChaCha20 nonce 长度（192-bit）
pub const NONCE_SIZE: usize = 24;

/// BLAKE2b 认证标签长度
pub const TAG_SIZE: usize = 16;

type TagMac = Blake2bMac<U16>;

/// AEAD 加密
///
/// #### 参数
/// - `key`：32 字节对称密钥
/// - `nonce`：24 字节 nonce，每次调用必须唯一
/// - `plaintext`：待加密数据
/// - `ad`：附加认证数据（仅认证，不加密）
///
/// #### 返回
/// - `密文 ‖ tag`，长度为 `plaintext.len() + TAG_SIZE`
pub fn seal(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    ad: &[u8],
) -> Result<Vec<u8>, KryptorError> {
    let mut cipher = XChaCha20::new(Key::from_slice(key), XNonce::from_slice(nonce));
    let mac_key = mac_subkey(&mut cipher);

    let mut out = Vec::with_capacity(plaintext.len() + TAG_SIZE);
    out.extend_from_slice(plaintext);
    cipher.apply_keystream(&mut out);

    let mut mac =
        TagMac::new_from_slice(&mac_key[..]).map_err(|_| KryptorError::Internal)?;
    mac.update(ad);
    mac.update(&out);
    mac.update(&(ad.len() as u64).to_le_bytes());
    mac.update(&(out.len() as u64).to_le_bytes());
    out.extend_from_slice(&mac.finalize().into_bytes());

    Ok(out)
}

/// AEAD 解密
///
/// #### 参数
/// - `ciphertext`：`密文 ‖ tag`（`seal` 的输出）
///
/// #### 返回
/// - 明文
///
/// #### 错误
/// - 密钥错误或数据被篡改时返回 `TamperOrWrongKey`
///
/// #### 安全保证
/// - tag 以常量时间比较，认证未通过前不产生任何明文
pub fn open(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    ad: &[u8],
) -> Result<Vec<u8>, KryptorError> {
    if ciphertext.len() < TAG_SIZE {
        return Err(KryptorError::TamperOrWrongKey);
    }
    let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_SIZE);

    let mut cipher = XChaCha20::new(Key::from_slice(key), XNonce::from_slice(nonce));
    let mac_key = mac_subkey(&mut cipher);

    let mut mac =
        TagMac::new_from_slice(&mac_key[..]).map_err(|_| KryptorError::Internal)?;
    mac.update(ad);
    mac.update(body);
    mac.update(&(ad.len() as u64).to_le_bytes());
    mac.update(&(body.len() as u64).to_le_bytes());
    mac.verify_slice(tag)
        .map_err(|_| KryptorError::TamperOrWrongKey)?;

    let mut out = body.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

/// 取密钥流前 32 字节作为一次性 MAC 子密钥，
/// 并把密钥流游标推进到下一个块边界（偏移 64）。
fn mac_subkey(cipher: &mut XChaCha20) -> Zeroizing<[u8; KEY_SIZE]> {
    let mut subkey = Zeroizing::new([0u8; KEY_SIZE]);
    cipher.apply_keystream(&mut subkey[..]);
    cipher.seek(64u64);
    subkey
}

/// 填充密码学随机字节。
pub fn random_bytes(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// 生成随机 nonce。
pub fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
