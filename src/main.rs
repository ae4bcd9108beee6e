//! Kryptor 命令行入口
//!
//! 提供最小可用的 CLI：
//!
//! 用法：
//!   kryptor encrypt [选项] <文件或目录...>
//!   kryptor decrypt [选项] <文件...>
//!
//! 选项：
//!   --password <密码>   密码模式
//!   --key <hex32>       对称密钥模式（32 字节十六进制）
//!   --keyfile <路径>    keyfile；单独使用等价于对称密钥，
//!                       与 --password 同用时作为 pepper
//!   --private <hex32>   X25519 私钥（非对称模式）
//!   --public <hex32>    对方 X25519 公钥；缺省为自加密
//!   --names             加密文件名（输出改用随机名）
//!   --overwrite         成功后删除输入
//!
//! 设计原则：
//! - 不依赖 clap / structopt
//! - 参数解析保持一眼能懂
//! - 所有实际逻辑都委托给库模块

use std::env;
use std::path::PathBuf;
use std::process::exit;

use kryptor::{
    DecryptOptions, DecryptionKeys, EncryptOptions, EncryptionKeys, NullSink, SecretKey,
};

fn print_usage() {
    eprintln!(
        "Usage:\n  \
         kryptor encrypt [--password <pw> | --key <hex32> | --keyfile <path> | --private <hex32> [--public <hex32>]] [--names] [--overwrite] <paths...>\n  \
         kryptor decrypt [--password <pw> | --key <hex32> | --keyfile <path> | --private <hex32> [--public <hex32>]] <paths...>"
    );
}

#[derive(Default)]
struct RawOptions {
    password: Option<String>,
    key_hex: Option<String>,
    keyfile: Option<PathBuf>,
    private_hex: Option<String>,
    public_hex: Option<String>,
    names: bool,
    overwrite: bool,
    paths: Vec<PathBuf>,
}

fn parse_options(args: &[String]) -> Result<RawOptions, String> {
    let mut opts = RawOptions::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut take_value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{name} 缺少参数值"))
        };
        match arg.as_str() {
            "--password" => opts.password = Some(take_value("--password")?),
            "--key" => opts.key_hex = Some(take_value("--key")?),
            "--keyfile" => opts.keyfile = Some(PathBuf::from(take_value("--keyfile")?)),
            "--private" => opts.private_hex = Some(take_value("--private")?),
            "--public" => opts.public_hex = Some(take_value("--public")?),
            "--names" => opts.names = true,
            "--overwrite" => opts.overwrite = true,
            other if other.starts_with("--") => return Err(format!("未知选项: {other}")),
            path => opts.paths.push(PathBuf::from(path)),
        }
    }

    if opts.paths.is_empty() {
        return Err("没有输入路径".into());
    }
    Ok(opts)
}

fn decode_key(hex_str: &str, what: &str) -> Result<SecretKey, String> {
    let bytes = hex::decode(hex_str).map_err(|_| format!("{what} 不是合法十六进制"))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| format!("{what} 必须是 32 字节"))?;
    Ok(SecretKey::from_bytes(array))
}

fn decode_public(hex_str: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(hex_str).map_err(|_| "--public 不是合法十六进制".to_owned())?;
    bytes.try_into().map_err(|_| "--public 必须是 32 字节".to_owned())
}

fn symmetric_key(opts: &RawOptions) -> Result<Option<SecretKey>, String> {
    if let Some(hex_str) = &opts.key_hex {
        return Ok(Some(decode_key(hex_str, "--key")?));
    }
    if let Some(path) = &opts.keyfile {
        let key = kryptor::crypto::kdf::key_from_keyfile(path)
            .map_err(|e| format!("读取 keyfile 失败: {e}"))?;
        return Ok(Some(key));
    }
    Ok(None)
}

fn encryption_keys(opts: &RawOptions) -> Result<EncryptionKeys, String> {
    if let Some(private_hex) = &opts.private_hex {
        let sender_secret = decode_key(private_hex, "--private")?;
        return Ok(match &opts.public_hex {
            Some(public_hex) => EncryptionKeys::Recipient {
                sender_secret,
                recipient_public: decode_public(public_hex)?,
                pre_shared: symmetric_key(opts)?,
            },
            None => EncryptionKeys::private_only(sender_secret),
        });
    }
    if let Some(password) = &opts.password {
        return Ok(EncryptionKeys::Password {
            password: zeroize::Zeroizing::new(password.clone()),
            pepper: symmetric_key(opts)?,
        });
    }
    if let Some(key) = symmetric_key(opts)? {
        return Ok(EncryptionKeys::Symmetric { key });
    }
    Err("缺少凭据：--password / --key / --keyfile / --private 至少其一".into())
}

fn decryption_keys(opts: &RawOptions) -> Result<DecryptionKeys, String> {
    if let Some(private_hex) = &opts.private_hex {
        let recipient_secret = decode_key(private_hex, "--private")?;
        return Ok(match &opts.public_hex {
            Some(public_hex) => DecryptionKeys::Sender {
                recipient_secret,
                sender_public: decode_public(public_hex)?,
                pre_shared: symmetric_key(opts)?,
            },
            None => DecryptionKeys::private_only(recipient_secret),
        });
    }
    if let Some(password) = &opts.password {
        return Ok(DecryptionKeys::Password {
            password: zeroize::Zeroizing::new(password.clone()),
            pepper: symmetric_key(opts)?,
        });
    }
    if let Some(key) = symmetric_key(opts)? {
        return Ok(DecryptionKeys::Symmetric { key });
    }
    Err("缺少凭据：--password / --key / --keyfile / --private 至少其一".into())
}

fn run(command: &str, raw: RawOptions) -> Result<kryptor::BatchStats, String> {
    let mut sink = NullSink;
    match command {
        "encrypt" => {
            let keys = encryption_keys(&raw)?;
            let opts = EncryptOptions {
                overwrite_input: raw.overwrite,
                encrypt_file_names: raw.names,
                ..Default::default()
            };
            Ok(kryptor::encrypt_batch(&raw.paths, &keys, &opts, &mut sink))
        }
        "decrypt" => {
            let keys = decryption_keys(&raw)?;
            Ok(kryptor::decrypt_batch(
                &raw.paths,
                &keys,
                &DecryptOptions::default(),
                &mut sink,
            ))
        }
        _ => Err(format!("未知命令: {command}")),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 2 {
        print_usage();
        exit(1);
    }

    let command = args[0].as_str();
    let raw = match parse_options(&args[1..]) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage();
            exit(1);
        }
    };

    match run(command, raw) {
        Ok(stats) => {
            eprintln!(
                "完成: {} 成功 / {} 失败 / 共 {}",
                stats.succeeded, stats.failed, stats.total
            );
            if !stats.all_succeeded() {
                exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e}");
            print_usage();
            exit(1);
        }
    }
}
