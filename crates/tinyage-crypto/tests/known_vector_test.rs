//! Fixed-randomness encryption must reproduce the reference file byte for byte.

mod common;

use std::io::Write;

use common::{decrypt_all, hex, FixedRng};
use tinyage_crypto::{Encryptor, Identity, Recipient, X25519Identity};

const SECRET: &str = "d8b501c669cfacb1dcc174f462eb5787ce3a444ead0b915559770ca7d7a9915e";

const EXPECTED_HEADER: &str = "age-encryption.org/v1\n\
-> X25519 FMqeTTh7zPNXRuBAfaqsxrKKT4RF71pRWIlNuYPiQHA\n\
CtufbJCyj2JplnG6Rg3RHy6rJOUOE+Rqv8RGWoYWXlg\n\
--- gY9WMTjF1pksYSXC7xCFZGpiQH8frzkzKj1EG6Ql+gI\n";

const EXPECTED_PAYLOAD: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\
cb589584a3b51348f292714ab0d51537e404d9882f9b03aa3d7fedfd";

fn identity() -> X25519Identity {
    let secret: [u8; 32] = hex(SECRET).try_into().unwrap();
    X25519Identity::from_bytes(secret)
}

fn expected_file() -> Vec<u8> {
    let mut expected = EXPECTED_HEADER.as_bytes().to_vec();
    expected.extend_from_slice(&hex(EXPECTED_PAYLOAD));
    expected
}

#[test]
fn encrypt_with_fixed_randomness_matches_reference() {
    let recipient = Recipient::from(identity().to_public());
    let mut writer = Encryptor::with_rng(vec![recipient], FixedRng(0xaa))
        .unwrap()
        .wrap_output(Vec::new())
        .unwrap();
    writer.write_all(b"Hello World!").unwrap();
    let ciphertext = writer.finish().unwrap();

    let header_len = EXPECTED_HEADER.len();
    assert_eq!(
        String::from_utf8_lossy(&ciphertext[..header_len]),
        EXPECTED_HEADER,
        "header text differs"
    );
    assert_eq!(ciphertext, expected_file());
}

#[test]
fn reference_file_decrypts() {
    let plaintext = decrypt_all(&[Identity::from(identity())], &expected_file()).unwrap();
    assert_eq!(plaintext, b"Hello World!");
}
