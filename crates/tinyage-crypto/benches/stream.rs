use std::io::{Read, Write};

use rand::rngs::OsRng;
use tinyage_crypto::{
    Decryptor, Encryptor, Identity, Recipient, StreamReader, StreamWriter, X25519Identity,
};

const KEY: [u8; 32] = [0x42; 32];

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

fn seal(data: &[u8]) -> Vec<u8> {
    let mut writer = StreamWriter::new(Vec::new(), &KEY);
    writer.write_all(data).unwrap();
    writer.finish().unwrap()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_stream_encrypt(bencher: divan::Bencher, size: usize) {
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| seal(divan::black_box(&data)));
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_stream_decrypt(bencher: divan::Bencher, size: usize) {
    let sealed = seal(&make_data(size));
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut reader = StreamReader::new(divan::black_box(&sealed[..]), &KEY);
            let mut out = Vec::with_capacity(size);
            reader.read_to_end(&mut out).unwrap();
            out
        });
}

#[divan::bench]
fn bench_x25519_file_roundtrip(bencher: divan::Bencher) {
    let identity = X25519Identity::generate(&mut OsRng);
    let recipient = Recipient::from(identity.to_public());
    let identities = [Identity::from(identity)];
    let data = make_data(4096);
    bencher.bench(|| {
        let mut writer = Encryptor::new(vec![recipient.clone()])
            .unwrap()
            .wrap_output(Vec::new())
            .unwrap();
        writer.write_all(&data).unwrap();
        let ciphertext = writer.finish().unwrap();

        let mut reader = Decryptor::new(&ciphertext[..])
            .unwrap()
            .decrypt(&identities)
            .unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    });
}

fn main() {
    divan::main();
}
