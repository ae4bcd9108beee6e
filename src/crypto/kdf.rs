//! Kryptor 密钥派生模块
//!
//! 把用户侧凭据（密码 / 对称密钥 / X25519 密钥对）统一派生为
//! 32 字节 KEK（Key-Encryption-Key），KEK 只用于密封文件头内层。
//!
//! 设计目标：
//! - 密码模式用 Argon2id 抵抗暴力破解与 GPU / ASIC 攻击
//! - 盐直接取 header_nonce 前 16 字节，随文件而异，严禁复用
//! - 非对称模式的转录哈希把双方公钥与可选 pre-shared key 一并认证
//! - 所有中间秘密（Argon2 输出、DH 共享秘密、临时私钥）离开作用域即清零
//!
//! Argon2id 参数是磁盘格式的一部分：加密与解密必须使用完全相同的
//! 常量，不允许运行时配置。

use argon2::{Algorithm, Argon2, Params, Version};
use blake2::digest::consts::U32;
use blake2::digest::{Digest, Mac};
use blake2::{Blake2b, Blake2bMac};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::aead::{self, KEY_SIZE, NONCE_SIZE};
use crate::crypto::secret::SecretKey;
use crate::error::{KryptorError, Result};

/// Argon2id 内存成本（KiB）：256 MiB
pub const ARGON2_MEMORY_KIB: u32 = 262_144;

/// Argon2id 迭代次数
pub const ARGON2_ITERATIONS: u32 = 12;

/// Argon2id 并行度
pub const ARGON2_PARALLELISM: u32 = 1;

/// 密码盐长度：header_nonce 的前 16 字节
pub const SALT_SIZE: usize = 16;

type Blake2b256 = Blake2b<U32>;
type KeyedBlake2b = Blake2bMac<U32>;

const ZERO_KEY: [u8; KEY_SIZE] = [0u8; KEY_SIZE];

/// 加密时的凭据模式。
///
/// 自加密（只有自己的私钥）用 [`EncryptionKeys::private_only`] 构造，
/// 等价于「收件人公钥 = 自己的公钥」。
pub enum EncryptionKeys {
    Password {
        password: Zeroizing<String>,
        pepper: Option<SecretKey>,
    },
    Symmetric {
        key: SecretKey,
    },
    Recipient {
        sender_secret: SecretKey,
        recipient_public: [u8; KEY_SIZE],
        pre_shared: Option<SecretKey>,
    },
}

impl EncryptionKeys {
    pub fn password(password: &str) -> Self {
        Self::Password {
            password: Zeroizing::new(password.to_owned()),
            pepper: None,
        }
    }

    pub fn private_only(secret: SecretKey) -> Self {
        let own_public = public_key(&secret);
        Self::Recipient {
            sender_secret: secret,
            recipient_public: own_public,
            pre_shared: None,
        }
    }
}

/// 解密时的凭据模式，与 [`EncryptionKeys`] 一一对应。
pub enum DecryptionKeys {
    Password {
        password: Zeroizing<String>,
        pepper: Option<SecretKey>,
    },
    Symmetric {
        key: SecretKey,
    },
    Sender {
        recipient_secret: SecretKey,
        sender_public: [u8; KEY_SIZE],
        pre_shared: Option<SecretKey>,
    },
}

impl DecryptionKeys {
    pub fn password(password: &str) -> Self {
        Self::Password {
            password: Zeroizing::new(password.to_owned()),
            pepper: None,
        }
    }

    pub fn private_only(secret: SecretKey) -> Self {
        let own_public = public_key(&secret);
        Self::Sender {
            recipient_secret: secret,
            sender_public: own_public,
            pre_shared: None,
        }
    }
}

/// 由私钥计算 X25519 公钥。
pub fn public_key(secret: &SecretKey) -> [u8; KEY_SIZE] {
    let scalar = StaticSecret::from(*secret.as_bytes());
    *PublicKey::from(&scalar).as_bytes()
}

/// 对 keyfile 内容做无密钥 BLAKE2b-256，得到可作对称密钥或
/// pepper 使用的 32 字节密钥。
pub fn key_from_keyfile(path: &std::path::Path) -> Result<SecretKey> {
    let contents = Zeroizing::new(std::fs::read(path)?);
    let mut hasher = Blake2b256::new();
    hasher.update(&contents[..]);
    Ok(SecretKey::from_bytes(hasher.finalize().into()))
}

/// 加密侧 KEK 派生。
///
/// #### 返回
/// - `(kek, ephemeral_public)`；非对称模式外的 ephemeral_public 为 32 个零字节
pub(crate) fn encrypt_kek(
    keys: &EncryptionKeys,
    header_nonce: &[u8; NONCE_SIZE],
) -> Result<(SecretKey, [u8; KEY_SIZE])> {
    match keys {
        EncryptionKeys::Password { password, pepper } => Ok((
            password_kek(password, pepper.as_ref(), header_nonce)?,
            ZERO_KEY,
        )),
        EncryptionKeys::Symmetric { key } => Ok((symmetric_kek(key, header_nonce), ZERO_KEY)),
        EncryptionKeys::Recipient {
            sender_secret,
            recipient_public,
            pre_shared,
        } => {
            // 每个文件一把临时密钥对；临时私钥在本函数结束即销毁。
            let mut seed = [0u8; KEY_SIZE];
            aead::random_bytes(&mut seed);
            let ephemeral_secret = StaticSecret::from(seed);
            seed.zeroize();
            let ephemeral_public = PublicKey::from(&ephemeral_secret);

            let s1 = shared_secret(&ephemeral_secret, recipient_public)?;
            let sender_scalar = StaticSecret::from(*sender_secret.as_bytes());
            let s2 = shared_secret(&sender_scalar, recipient_public)?;

            let kek = transcript_kek(
                &s1,
                &s2,
                ephemeral_public.as_bytes(),
                recipient_public,
                pre_shared.as_ref(),
            );
            Ok((kek, *ephemeral_public.as_bytes()))
        }
    }
}

/// 解密侧 KEK 派生；非对称模式需要文件头里的 ephemeral_public。
pub(crate) fn decrypt_kek(
    keys: &DecryptionKeys,
    header_nonce: &[u8; NONCE_SIZE],
    ephemeral_public: &[u8; KEY_SIZE],
) -> Result<SecretKey> {
    match keys {
        DecryptionKeys::Password { password, pepper } => {
            password_kek(password, pepper.as_ref(), header_nonce)
        }
        DecryptionKeys::Symmetric { key } => Ok(symmetric_kek(key, header_nonce)),
        DecryptionKeys::Sender {
            recipient_secret,
            sender_public,
            pre_shared,
        } => {
            let recipient_scalar = StaticSecret::from(*recipient_secret.as_bytes());
            let recipient_public = PublicKey::from(&recipient_scalar);

            let s1 = shared_secret(&recipient_scalar, ephemeral_public)?;
            let s2 = shared_secret(&recipient_scalar, sender_public)?;

            Ok(transcript_kek(
                &s1,
                &s2,
                ephemeral_public,
                recipient_public.as_bytes(),
                pre_shared.as_ref(),
            ))
        }
    }
}

/// 密码模式：
/// `kek = blake2b(key = argon2id(password, nonce[0..16]), msg = pepper)`。
/// pepper 缺省为 32 个零字节，因此「有无 pepper」也被认证。
fn password_kek(
    password: &str,
    pepper: Option<&SecretKey>,
    header_nonce: &[u8; NONCE_SIZE],
) -> Result<SecretKey> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        Some(KEY_SIZE),
    )
    .map_err(|_| KryptorError::Internal)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut prk = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(
            password.as_bytes(),
            &header_nonce[..SALT_SIZE],
            &mut prk[..],
        )
        .map_err(|_| KryptorError::Internal)?;

    let pepper_bytes: &[u8] = match pepper {
        Some(key) => key.as_bytes(),
        None => &ZERO_KEY,
    };
    Ok(keyed_hash(&prk[..], pepper_bytes))
}

/// 对称密钥模式：`kek = blake2b(key = sym, msg = header_nonce)`。
fn symmetric_kek(key: &SecretKey, header_nonce: &[u8; NONCE_SIZE]) -> SecretKey {
    keyed_hash(key.as_bytes(), header_nonce)
}

/// 非对称模式的转录哈希：
/// `kek = blake2b(s1 ‖ s2 ‖ epk ‖ recipient_pk ‖ psk)`。
fn transcript_kek(
    s1: &Zeroizing<[u8; KEY_SIZE]>,
    s2: &Zeroizing<[u8; KEY_SIZE]>,
    ephemeral_public: &[u8; KEY_SIZE],
    recipient_public: &[u8; KEY_SIZE],
    pre_shared: Option<&SecretKey>,
) -> SecretKey {
    let psk_bytes: &[u8] = match pre_shared {
        Some(key) => key.as_bytes(),
        None => &ZERO_KEY,
    };

    let mut hasher = Blake2b256::new();
    hasher.update(&s1[..]);
    hasher.update(&s2[..]);
    hasher.update(ephemeral_public);
    hasher.update(recipient_public);
    hasher.update(psk_bytes);
    SecretKey::from_bytes(hasher.finalize().into())
}

/// X25519 标量乘；低阶公钥导致的全零共享秘密一律拒绝。
fn shared_secret(
    secret: &StaticSecret,
    public: &[u8; KEY_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let shared = secret.diffie_hellman(&PublicKey::from(*public));
    if !shared.was_contributory() {
        return Err(KryptorError::Validation(
            "X25519 公钥非法（低阶点）".into(),
        ));
    }
    Ok(Zeroizing::new(shared.to_bytes()))
}

fn keyed_hash(key: &[u8], message: &[u8]) -> SecretKey {
    let mut mac = KeyedBlake2b::new_from_slice(key).expect("BLAKE2b 密钥长度非法");
    mac.update(message);
    SecretKey::from_bytes(mac.finalize().into_bytes().into())
}
