//! 秘密字节容器。
//!
//! KEK / DEK / 对称密钥等 32 字节秘密统一由 [`SecretKey`] 持有：
//! - 不实现 Clone，秘密不能被随意复制
//! - Drop 时自动清零
//! - 只读访问只通过 `as_bytes()` 暴露
//! - Debug 输出不包含密钥内容

use std::fmt;

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::crypto::aead::KEY_SIZE;

/// 32 字节秘密密钥。
///
/// 内容放在堆上，move 不会在栈上留下额外副本。
pub struct SecretKey {
    bytes: Box<[u8; KEY_SIZE]>,
}

impl SecretKey {
    /// 从现有字节构造；入参副本随即清零。
    pub fn from_bytes(mut bytes: [u8; KEY_SIZE]) -> Self {
        let boxed = Box::new(bytes);
        bytes.zeroize();
        Self { bytes: boxed }
    }

    /// 生成随机密钥（密码学 RNG）。
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}
