mod common;

use std::io::Write;

use common::{assemble, decrypt_all, rewrite_stanzas, rsa_key};
use ed25519_dalek::SigningKey;
use proptest::prelude::*;
use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use secrecy::SecretString;
use tinyage_core::AgeError;
use tinyage_crypto::armor::{self, ArmoredWriter};
use tinyage_crypto::format::Stanza;
use tinyage_crypto::{
    encrypt, Decryptor, Encryptor, FileKey, Identity, Recipient, ScryptIdentity, ScryptRecipient,
    SshEd25519Identity, SshRsaIdentity, X25519Identity, CHUNK_SIZE, TAG_SIZE,
};

const PASSPHRASE: &str = "correct horse battery staple";

fn passphrase() -> SecretString {
    SecretString::from(PASSPHRASE.to_owned())
}

fn plaintext(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

fn x25519_pair() -> (Recipient, Identity) {
    let identity = X25519Identity::generate(&mut OsRng);
    (identity.to_public().into(), identity.into())
}

fn scrypt_pair() -> (Recipient, Identity) {
    (
        ScryptRecipient::new(passphrase()).with_log_cost(4).into(),
        ScryptIdentity::new(passphrase()).into(),
    )
}

fn ssh_rsa_pair() -> (Recipient, Identity) {
    let identity = SshRsaIdentity::new(rsa_key(0));
    (identity.to_public().into(), identity.into())
}

fn ssh_ed25519_pair() -> (Recipient, Identity) {
    let identity = SshEd25519Identity::new(SigningKey::generate(&mut OsRng)).unwrap();
    (identity.to_public().into(), identity.into())
}

fn roundtrip(pair: (Recipient, Identity), data: &[u8]) -> Vec<u8> {
    let (recipient, identity) = pair;
    let ciphertext = encrypt(vec![recipient], data).unwrap();
    decrypt_all(&[identity], &ciphertext).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn x25519_roundtrip(len in 0usize..=1 << 20, seed in any::<u64>()) {
        let data = plaintext(len, seed);
        prop_assert_eq!(roundtrip(x25519_pair(), &data), data);
    }

    #[test]
    fn scrypt_roundtrip(len in 0usize..=1 << 20, seed in any::<u64>()) {
        let data = plaintext(len, seed);
        prop_assert_eq!(roundtrip(scrypt_pair(), &data), data);
    }

    #[test]
    fn ssh_rsa_roundtrip(len in 0usize..=1 << 20, seed in any::<u64>()) {
        let data = plaintext(len, seed);
        prop_assert_eq!(roundtrip(ssh_rsa_pair(), &data), data);
    }

    #[test]
    fn ssh_ed25519_roundtrip(len in 0usize..=1 << 20, seed in any::<u64>()) {
        let data = plaintext(len, seed);
        prop_assert_eq!(roundtrip(ssh_ed25519_pair(), &data), data);
    }
}

#[test]
fn chunk_boundaries_through_full_protocol() {
    for len in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 2 * CHUNK_SIZE] {
        let data = plaintext(len, len as u64);
        assert_eq!(roundtrip(x25519_pair(), &data), data, "length {len}");
    }
}

#[test]
fn any_of_several_recipients_can_decrypt() {
    let (r1, i1) = x25519_pair();
    let (r2, i2) = ssh_ed25519_pair();
    let (r3, i3) = ssh_rsa_pair();
    let ciphertext = encrypt(vec![r1, r2, r3], b"shared").unwrap();

    for identity in [i1, i2, i3] {
        assert_eq!(decrypt_all(&[identity], &ciphertext).unwrap(), b"shared");
    }
}

#[test]
fn identity_order_does_not_matter() {
    let (recipient, ours) = x25519_pair();
    let (_, other) = x25519_pair();
    let ciphertext = encrypt(vec![recipient], b"ordered").unwrap();
    assert_eq!(decrypt_all(&[other, ours], &ciphertext).unwrap(), b"ordered");
}

#[test]
fn wrong_identity_reports_no_identity() {
    let (recipient, _) = x25519_pair();
    let (_, stranger) = x25519_pair();
    let ciphertext = encrypt(vec![recipient], b"secret").unwrap();
    assert!(matches!(
        decrypt_all(&[stranger], &ciphertext),
        Err(AgeError::NoIdentity)
    ));
}

#[test]
fn no_identities_reports_no_identity() {
    let (recipient, _) = x25519_pair();
    let ciphertext = encrypt(vec![recipient], b"secret").unwrap();
    assert!(matches!(decrypt_all(&[], &ciphertext), Err(AgeError::NoIdentity)));
}

#[test]
fn wrong_passphrase_reports_no_identity() {
    let ciphertext = encrypt(vec![scrypt_pair().0], b"secret").unwrap();
    let wrong = ScryptIdentity::new(SecretString::from("hunter2".to_owned()));
    assert!(matches!(
        decrypt_all(&[Identity::from(wrong)], &ciphertext),
        Err(AgeError::NoIdentity)
    ));
}

#[test]
fn ssh_fingerprint_binds_the_key() {
    let ciphertext = encrypt(vec![ssh_rsa_pair().0], b"bound").unwrap();
    let other_rsa = SshRsaIdentity::new(rsa_key(1));
    assert!(matches!(
        decrypt_all(&[Identity::from(other_rsa)], &ciphertext),
        Err(AgeError::NoIdentity)
    ));

    let ciphertext = encrypt(vec![ssh_ed25519_pair().0], b"bound").unwrap();
    let (_, other_ed) = ssh_ed25519_pair();
    assert!(matches!(
        decrypt_all(&[other_ed], &ciphertext),
        Err(AgeError::NoIdentity)
    ));
}

#[test]
fn empty_recipient_list_rejected() {
    assert!(matches!(
        Encryptor::new(Vec::new()),
        Err(AgeError::Validation(_))
    ));
}

#[test]
fn scrypt_cost_above_bound_rejected_on_encrypt() {
    let recipient = ScryptRecipient::new(passphrase()).with_log_cost(23);
    assert!(matches!(
        encrypt(vec![Recipient::from(recipient)], b"x"),
        Err(AgeError::Validation(_))
    ));
}

#[test]
fn scrypt_cost_above_bound_rejected_on_decrypt() {
    let ciphertext = encrypt(vec![scrypt_pair().0], b"x").unwrap();
    let tampered = rewrite_stanzas(&ciphertext, |stanzas| {
        stanzas[0].args[1] = "23".to_owned();
    });
    let result = decrypt_all(&[scrypt_pair().1], &tampered);
    assert!(matches!(result, Err(AgeError::Validation(_))), "{result:?}");
}

#[test]
fn scrypt_cost_above_local_limit_rejected() {
    let ciphertext = encrypt(vec![scrypt_pair().0], b"x").unwrap();
    let strict = ScryptIdentity::new(passphrase()).with_max_log_cost(2);
    assert!(matches!(
        decrypt_all(&[Identity::from(strict)], &ciphertext),
        Err(AgeError::Validation(_))
    ));
}

#[test]
fn passphrase_only_detection() {
    let ciphertext = encrypt(vec![scrypt_pair().0], b"x").unwrap();
    assert!(Decryptor::new(&ciphertext[..]).unwrap().is_passphrase_only());

    let ciphertext = encrypt(vec![x25519_pair().0], b"x").unwrap();
    assert!(!Decryptor::new(&ciphertext[..]).unwrap().is_passphrase_only());
}

#[test]
fn unknown_stanzas_are_skipped() {
    let ours = X25519Identity::generate(&mut OsRng);
    let file_key = FileKey::generate(&mut OsRng);
    let wrapped = Recipient::from(ours.to_public())
        .wrap(&file_key, &mut OsRng)
        .unwrap()
        .to_stanza();
    let stanzas = vec![
        Stanza::new("piv-p256", vec!["abc".into()], vec![0x42; 32]),
        wrapped,
        Stanza::new("empty-body", Vec::new(), Vec::new()),
    ];
    let ciphertext = assemble(&stanzas, &file_key, b"forward compatible");

    let decryptor = Decryptor::new(&ciphertext[..]).unwrap();
    assert_eq!(decryptor.stanzas().len(), 3);
    assert_eq!(decryptor.stanzas()[0].tag(), "piv-p256");

    let plaintext = decrypt_all(&[Identity::from(ours)], &ciphertext).unwrap();
    assert_eq!(plaintext, b"forward compatible");
}

#[test]
fn truncated_before_payload_nonce() {
    let (recipient, identity) = x25519_pair();
    let ciphertext = encrypt(vec![recipient], b"").unwrap();
    let header_len = Decryptor::new(&ciphertext[..])
        .unwrap()
        .header()
        .encoded_len();
    let cut = &ciphertext[..header_len + 8];
    assert!(matches!(
        decrypt_all(&[identity], cut),
        Err(AgeError::Truncated)
    ));
}

#[test]
fn payload_framing_faults_are_stream_corruption() {
    let (recipient, identity) = x25519_pair();
    let plaintext = vec![0x5a; CHUNK_SIZE + 10];
    let ciphertext = encrypt(vec![recipient], &plaintext).unwrap();

    let without_final = &ciphertext[..ciphertext.len() - (10 + TAG_SIZE)];
    assert!(matches!(
        decrypt_all(&[identity.clone()], without_final),
        Err(AgeError::StreamCorruption { chunk: 1 })
    ));

    let mut trailing = ciphertext.clone();
    trailing.extend_from_slice(b"junk");
    assert!(matches!(
        decrypt_all(&[identity], &trailing),
        Err(AgeError::StreamCorruption { chunk: 1 })
    ));
}

#[test]
fn armored_roundtrip() {
    let (recipient, identity) = x25519_pair();
    let data = plaintext(3 * CHUNK_SIZE / 2, 7);

    let armored = ArmoredWriter::new(Vec::new());
    let mut writer = Encryptor::new(vec![recipient])
        .unwrap()
        .wrap_output(armored)
        .unwrap();
    writer.write_all(&data).unwrap();
    let text = writer.finish().unwrap().finish().unwrap();
    let text = String::from_utf8(text).unwrap();

    assert!(armor::is_armored(text.as_bytes()));
    let binary = armor::dearmor(&text).unwrap();
    assert_eq!(decrypt_all(&[identity], &binary).unwrap(), data);
}
