#![cfg(feature = "tokio")]

use std::io::{Read, Write};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use sealed_stream::{CipherSuite, Config, Encryption};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

fn data() -> Vec<u8> {
    let mut data = vec![0; 16384 + 3];
    StdRng::seed_from_u64(16384).fill_bytes(&mut data);
    data
}

fn encryption(cipher: CipherSuite) -> Encryption {
    Encryption::new(
        Config::default()
            .with_key(&[1; 32])
            .with_cipher(cipher)
            .with_chunk_size(4096),
    )
    .unwrap()
}

#[tokio::test]
async fn async_writer_output_is_readable_synchronously() -> TestResult {
    let data = data();
    for cipher in CipherSuite::ALL {
        let encryption = encryption(cipher);

        let mut async_writer = encryption.writer(Vec::new());
        for piece in data.chunks(1000) {
            AsyncWriteExt::write_all(&mut async_writer, piece).await?;
        }
        async_writer.shutdown().await?;
        assert!(async_writer.is_closed());
        let sealed = async_writer.into_inner();

        let mut output = vec![];
        Read::read_to_end(&mut encryption.reader(&sealed[..]), &mut output)?;
        assert_eq!(output, data);
    }
    Ok(())
}

#[tokio::test]
async fn sync_writer_output_is_readable_asynchronously() -> TestResult {
    let data = data();
    for cipher in CipherSuite::ALL {
        let encryption = encryption(cipher);

        let mut sync_writer = encryption.writer(Vec::new());
        Write::write_all(&mut sync_writer, &data)?;
        let sealed = sync_writer.finish()?;

        let mut output = vec![];
        AsyncReadExt::read_to_end(&mut encryption.reader(&sealed[..]), &mut output).await?;
        assert_eq!(output, data);
    }
    Ok(())
}

#[tokio::test]
async fn writers_produce_the_same_shape() -> TestResult {
    let data = data();
    let encryption = encryption(CipherSuite::ChaCha20Poly1305);

    let mut sync_writer = encryption.writer(Vec::new());
    Write::write_all(&mut sync_writer, &data)?;
    let sync_sealed = sync_writer.finish()?;

    let mut async_writer = encryption.writer(Vec::new());
    AsyncWriteExt::write_all(&mut async_writer, &data).await?;
    async_writer.shutdown().await?;
    let async_sealed = async_writer.into_inner();

    assert_eq!(sync_sealed.len(), async_sealed.len());
    assert_ne!(sync_sealed, async_sealed);
    Ok(())
}
