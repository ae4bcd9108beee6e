use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use kryptor::crypto::kdf::public_key;
use kryptor::format::header::HEADER_SIZE;
use kryptor::format::stream::{CHUNK_SIZE, SEALED_CHUNK_SIZE};
use kryptor::{
    CancelToken, DecryptOptions, DecryptionKeys, EncryptOptions, EncryptionKeys, KryptorError,
    SecretKey,
};

fn sym_encrypt_keys() -> EncryptionKeys {
    EncryptionKeys::Symmetric {
        key: SecretKey::from_bytes([0x55; 32]),
    }
}

fn sym_decrypt_keys() -> DecryptionKeys {
    DecryptionKeys::Symmetric {
        key: SecretKey::from_bytes([0x55; 32]),
    }
}

fn write_input(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write input");
    path
}

fn dir_entry_count(dir: &Path) -> usize {
    fs::read_dir(dir).expect("read dir").count()
}

#[test]
fn roundtrip_boundary_sizes() {
    // 大小覆盖空文件、块边界两侧与多块；密文长度必须与块数精确对应。
    let temp = tempdir().expect("create temp dir");

    for size in [0usize, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, CHUNK_SIZE * 10] {
        let plaintext: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let input = write_input(temp.path(), &format!("input-{size}.bin"), &plaintext);

        let encrypted = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
            .expect("encrypt file");

        let chunks = if size == 0 { 1 } else { size.div_ceil(CHUNK_SIZE) };
        let expected_len = HEADER_SIZE + chunks * SEALED_CHUNK_SIZE;
        assert_eq!(
            fs::metadata(&encrypted).expect("stat ciphertext").len(),
            expected_len as u64,
            "ciphertext length for size {size}"
        );

        fs::remove_file(&input).expect("remove input");
        let decrypted =
            kryptor::decrypt_file(&encrypted, &sym_decrypt_keys(), &DecryptOptions::default())
                .expect("decrypt file");

        assert_eq!(fs::read(&decrypted).expect("read decrypted"), plaintext);
    }
}

#[test]
fn exact_chunk_boundary_has_no_padding_overhead() {
    // CHUNK_SIZE 整块输入：密文体恰为一个密封块。
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "block.bin", &vec![0x41u8; CHUNK_SIZE]);

    let encrypted = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt file");
    assert_eq!(
        fs::metadata(&encrypted).unwrap().len(),
        (HEADER_SIZE + SEALED_CHUNK_SIZE) as u64
    );

    let decrypted =
        kryptor::decrypt_file(&encrypted, &sym_decrypt_keys(), &DecryptOptions::default())
            .expect("decrypt file");
    assert_eq!(fs::read(decrypted).unwrap(), vec![0x41u8; CHUNK_SIZE]);
}

#[test]
fn wrong_key_fails_without_output() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "secret.txt", b"wrong key test");

    let encrypted = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt file");

    let before = dir_entry_count(temp.path());
    let wrong = DecryptionKeys::Symmetric {
        key: SecretKey::from_bytes([0x56; 32]),
    };
    let result = kryptor::decrypt_file(&encrypted, &wrong, &DecryptOptions::default());

    assert!(matches!(result, Err(KryptorError::TamperOrWrongKey)));
    // 失败后不能留下任何输出（包括暂存文件）。
    assert_eq!(dir_entry_count(temp.path()), before);
}

#[test]
fn any_flipped_byte_is_detected() {
    // 在 magic、版本、epk、nonce、内层头、密文块与末字节各翻转一位。
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "tamper.bin", &vec![0x42u8; CHUNK_SIZE]);

    let encrypted = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt file");
    let original = fs::read(&encrypted).expect("read ciphertext");
    let last = original.len() - 1;

    for offset in [0usize, 4, 10, 40, 70, HEADER_SIZE + 5, last] {
        let mut tampered = original.clone();
        tampered[offset] ^= 1;
        let tampered_path = temp.path().join("tampered.kryptor");
        fs::write(&tampered_path, &tampered).expect("write tampered");

        let before = dir_entry_count(temp.path());
        let result =
            kryptor::decrypt_file(&tampered_path, &sym_decrypt_keys(), &DecryptOptions::default());

        match result {
            // magic / 版本区域的破坏表现为格式不受支持，其余一律是篡改。
            Err(KryptorError::TamperOrWrongKey) | Err(KryptorError::UnsupportedFormat) => {}
            other => panic!("offset {offset}: expected failure, got {other:?}"),
        }
        assert_eq!(dir_entry_count(temp.path()), before, "offset {offset}");

        fs::remove_file(&tampered_path).expect("cleanup tampered");
    }
}

#[test]
fn bumped_format_version_is_unsupported_and_input_untouched() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "versioned.txt", b"payload");

    let encrypted = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt file");

    let mut bytes = fs::read(&encrypted).expect("read ciphertext");
    bytes[4] = bytes[4].wrapping_add(1);
    fs::write(&encrypted, &bytes).expect("write bumped version");

    let result = kryptor::decrypt_file(&encrypted, &sym_decrypt_keys(), &DecryptOptions::default());
    assert!(matches!(result, Err(KryptorError::UnsupportedFormat)));
    // 输入文件必须原样保留。
    assert_eq!(fs::read(&encrypted).expect("re-read"), bytes);
}

#[test]
fn asymmetric_roundtrip_and_wrong_sender_public() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "hello.txt", b"hello");

    let sender_secret = [0x01u8; 32];
    let recipient_secret = [0x02u8; 32];
    let sender_public = public_key(&SecretKey::from_bytes(sender_secret));
    let recipient_public = public_key(&SecretKey::from_bytes(recipient_secret));

    let enc = EncryptionKeys::Recipient {
        sender_secret: SecretKey::from_bytes(sender_secret),
        recipient_public,
        pre_shared: None,
    };
    let encrypted =
        kryptor::encrypt_file(&input, &enc, &EncryptOptions::default()).expect("encrypt file");
    fs::remove_file(&input).expect("remove input");

    // 收件人用自己的私钥 + 发送者公钥解密。
    let dec = DecryptionKeys::Sender {
        recipient_secret: SecretKey::from_bytes(recipient_secret),
        sender_public,
        pre_shared: None,
    };
    let decrypted =
        kryptor::decrypt_file(&encrypted, &dec, &DecryptOptions::default()).expect("decrypt file");
    assert_eq!(fs::read(&decrypted).unwrap(), b"hello");
    fs::remove_file(&decrypted).expect("cleanup");

    // 发送者公钥换成别的值必须失败。
    let wrong_sender = public_key(&SecretKey::from_bytes([0x03u8; 32]));
    let wrong = DecryptionKeys::Sender {
        recipient_secret: SecretKey::from_bytes(recipient_secret),
        sender_public: wrong_sender,
        pre_shared: None,
    };
    assert!(matches!(
        kryptor::decrypt_file(&encrypted, &wrong, &DecryptOptions::default()),
        Err(KryptorError::TamperOrWrongKey)
    ));
}

#[test]
fn private_only_self_encryption_roundtrips() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "self.txt", b"note to self");

    let encrypted = kryptor::encrypt_file(
        &input,
        &EncryptionKeys::private_only(SecretKey::from_bytes([0x09; 32])),
        &EncryptOptions::default(),
    )
    .expect("encrypt file");
    fs::remove_file(&input).expect("remove input");

    let decrypted = kryptor::decrypt_file(
        &encrypted,
        &DecryptionKeys::private_only(SecretKey::from_bytes([0x09; 32])),
        &DecryptOptions::default(),
    )
    .expect("decrypt file");
    assert_eq!(fs::read(decrypted).unwrap(), b"note to self");
}

#[test]
fn password_mode_roundtrips_empty_file() {
    // 密码模式端到端（Argon2id 参数较重，只跑一个空文件用例）。
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "empty.bin", b"");

    let encrypted = kryptor::encrypt_file(
        &input,
        &EncryptionKeys::password("correct horse"),
        &EncryptOptions::default(),
    )
    .expect("encrypt file");

    // 空文件也占一个整块。
    assert_eq!(
        fs::metadata(&encrypted).unwrap().len(),
        (HEADER_SIZE + SEALED_CHUNK_SIZE) as u64
    );

    fs::remove_file(&input).expect("remove input");
    let decrypted = kryptor::decrypt_file(
        &encrypted,
        &DecryptionKeys::password("correct horse"),
        &DecryptOptions::default(),
    )
    .expect("decrypt file");
    assert_eq!(fs::metadata(decrypted).unwrap().len(), 0);
}

#[test]
fn encrypted_file_names_hide_input_name_and_restore_it() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "secret_document.txt", b"named payload");

    let opts = EncryptOptions {
        encrypt_file_names: true,
        ..Default::default()
    };
    let encrypted =
        kryptor::encrypt_file(&input, &sym_encrypt_keys(), &opts).expect("encrypt file");

    // 输出名不得含输入名任何超过 3 字节的子串。
    let output_name = encrypted.file_name().unwrap().to_str().unwrap();
    let input_name = "secret_document.txt";
    for start in 0..input_name.len() - 3 {
        let window = &input_name[start..start + 4];
        assert!(
            !output_name.contains(window),
            "output {output_name} leaks {window}"
        );
    }

    fs::remove_file(&input).expect("remove input");
    let decrypted =
        kryptor::decrypt_file(&encrypted, &sym_decrypt_keys(), &DecryptOptions::default())
            .expect("decrypt file");

    // 解密后恢复原名与内容。
    assert_eq!(
        decrypted.file_name().unwrap().to_str().unwrap(),
        "secret_document.txt"
    );
    assert_eq!(fs::read(&decrypted).unwrap(), b"named payload");
}

#[test]
fn output_collisions_get_numbered() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "dup.txt", b"payload");

    let first = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt once");
    let second = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &EncryptOptions::default())
        .expect("encrypt twice");

    assert_eq!(first, temp.path().join("dup.txt.kryptor"));
    assert_eq!(second, temp.path().join("dup.txt (1).kryptor"));
}

#[test]
fn overwrite_input_removes_source_only_on_success() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "gone.txt", b"payload");

    let opts = EncryptOptions {
        overwrite_input: true,
        ..Default::default()
    };
    let encrypted =
        kryptor::encrypt_file(&input, &sym_encrypt_keys(), &opts).expect("encrypt file");

    assert!(!input.exists(), "input must be unlinked after success");
    let decrypted =
        kryptor::decrypt_file(&encrypted, &sym_decrypt_keys(), &DecryptOptions::default())
            .expect("decrypt file");
    assert_eq!(fs::read(decrypted).unwrap(), b"payload");
}

#[test]
fn cancelled_token_aborts_without_output() {
    let temp = tempdir().expect("create temp dir");
    let input = write_input(temp.path(), "cancel.bin", &vec![0u8; CHUNK_SIZE * 4]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = EncryptOptions {
        cancel,
        ..Default::default()
    };

    let before = dir_entry_count(temp.path());
    let result = kryptor::encrypt_file(&input, &sym_encrypt_keys(), &opts);
    assert!(matches!(result, Err(KryptorError::Cancelled)));
    assert_eq!(dir_entry_count(temp.path()), before);
}

#[test]
fn garbage_file_is_rejected_as_unsupported() {
    let temp = tempdir().expect("create temp dir");
    let bad = write_input(temp.path(), "bad.kryptor", b"not a kryptor file");

    assert!(matches!(
        kryptor::decrypt_file(&bad, &sym_decrypt_keys(), &DecryptOptions::default()),
        Err(KryptorError::UnsupportedFormat)
    ));
}
