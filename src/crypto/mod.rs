//! Kryptor 密码学层。
//!
//! 统一封装底层原语（AEAD / KDF / X25519）与秘密内存管理，
//! 上层模块不直接接触第三方密码学 crate。

pub mod aead;
pub mod kdf;
pub mod secret;
