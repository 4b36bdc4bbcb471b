//! Chunked password-based authenticated encryption for archives.
//!
//! # Design
//! - AES-256-GCM over fixed-size plaintext chunks, each chunk its own frame,
//!   so archives never need to fit in memory.
//! - Key derived from the password with Argon2id and a random per-file salt.
//! - Nonces are an 8-byte random prefix plus a big-endian chunk counter; the
//!   prefix is fresh per file, so counter reuse across files is harmless.
//!
//! File layout: magic, salt, nonce prefix, chunk size, then length-prefixed
//! ciphertext frames (each carrying the 16-byte GCM tag).

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use argon2::Argon2;
use rand::RngCore;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

const MAGIC: [u8; 8] = *b"CARTAGE\x01";
const SALT_LEN: usize = 16;
const NONCE_PREFIX_LEN: usize = 8;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Default plaintext chunk size, 64 KiB.
pub const DEFAULT_CHUNK_BYTES: u32 = 64 * 1024;

/// Encrypt `input` into `output` with a key derived from `password`.
///
/// # Errors
///
/// Returns an error on IO failure, key derivation failure, or chunk
/// encryption failure. A partial output file may remain for the caller to
/// clean up.
pub fn encrypt_file(
    input: &Path,
    output: &Path,
    password: &str,
    chunk_bytes: u32,
) -> PipelineResult<()> {
    if chunk_bytes == 0 {
        return Err(PipelineError::crypto(
            "encrypt.header",
            output,
            "chunk size must be positive",
        ));
    }
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_prefix);
    let cipher = build_cipher(password, &salt, output)?;

    let source =
        File::open(input).map_err(|err| PipelineError::io("encrypt.open_input", input, err))?;
    let mut reader = BufReader::new(source);
    let sink = File::create(output)
        .map_err(|err| PipelineError::io("encrypt.create_output", output, err))?;
    let mut writer = BufWriter::new(sink);

    writer
        .write_all(&MAGIC)
        .and_then(|()| writer.write_all(&salt))
        .and_then(|()| writer.write_all(&nonce_prefix))
        .and_then(|()| writer.write_all(&chunk_bytes.to_be_bytes()))
        .map_err(|err| PipelineError::io("encrypt.write_header", output, err))?;

    let mut buffer = vec![0u8; usize::try_from(chunk_bytes).unwrap_or(usize::MAX)];
    let mut counter = 0u32;
    loop {
        let filled = fill_chunk(&mut reader, &mut buffer, input)?;
        if filled == 0 {
            break;
        }
        let nonce = chunk_nonce(&nonce_prefix, counter);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), &buffer[..filled])
            .map_err(|_| {
                PipelineError::crypto("encrypt.chunk", output, "chunk encryption failed")
            })?;
        let frame_len = u32::try_from(ciphertext.len()).map_err(|_| {
            PipelineError::crypto("encrypt.chunk", output, "ciphertext frame too large")
        })?;
        writer
            .write_all(&frame_len.to_be_bytes())
            .and_then(|()| writer.write_all(&ciphertext))
            .map_err(|err| PipelineError::io("encrypt.write_frame", output, err))?;
        counter = counter.checked_add(1).ok_or_else(|| {
            PipelineError::crypto("encrypt.chunk", output, "chunk counter overflow")
        })?;
    }
    writer
        .flush()
        .map_err(|err| PipelineError::io("encrypt.flush", output, err))?;
    info!(
        input = %input.display(),
        output = %output.display(),
        chunk_count = counter,
        "encrypted archive"
    );
    Ok(())
}

/// Decrypt a file produced by [`encrypt_file`] back into plaintext.
///
/// # Errors
///
/// Returns an error on IO failure, a malformed header, or authentication
/// failure of any chunk (wrong password or tampered data).
pub fn decrypt_file(input: &Path, output: &Path, password: &str) -> PipelineResult<()> {
    let source =
        File::open(input).map_err(|err| PipelineError::io("decrypt.open_input", input, err))?;
    let mut reader = BufReader::new(source);

    // The magic is validated before the rest of the header is read; a foreign
    // or truncated file must surface as unrecognized, not as an IO error.
    let mut magic = [0u8; MAGIC.len()];
    match reader.read_exact(&mut magic) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
            return Err(PipelineError::crypto(
                "decrypt.header",
                input,
                "unrecognized archive header",
            ));
        }
        Err(err) => return Err(PipelineError::io("decrypt.read_header", input, err)),
    }
    if magic != MAGIC {
        return Err(PipelineError::crypto(
            "decrypt.header",
            input,
            "unrecognized archive header",
        ));
    }
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_prefix = [0u8; NONCE_PREFIX_LEN];
    let mut chunk_bytes = [0u8; 4];
    reader
        .read_exact(&mut salt)
        .and_then(|()| reader.read_exact(&mut nonce_prefix))
        .and_then(|()| reader.read_exact(&mut chunk_bytes))
        .map_err(|err| PipelineError::io("decrypt.read_header", input, err))?;
    let chunk_bytes = u32::from_be_bytes(chunk_bytes);
    if chunk_bytes == 0 {
        return Err(PipelineError::crypto(
            "decrypt.header",
            input,
            "chunk size must be positive",
        ));
    }
    let cipher = build_cipher(password, &salt, input)?;

    let sink = File::create(output)
        .map_err(|err| PipelineError::io("decrypt.create_output", output, err))?;
    let mut writer = BufWriter::new(sink);
    let mut counter = 0u32;
    let max_frame = usize::try_from(chunk_bytes).unwrap_or(usize::MAX).saturating_add(TAG_LEN);
    while let Some(frame_len) = read_frame_len(&mut reader, input)? {
        let frame_len = usize::try_from(frame_len).unwrap_or(usize::MAX);
        if frame_len < TAG_LEN || frame_len > max_frame {
            return Err(PipelineError::crypto(
                "decrypt.frame",
                input,
                "ciphertext frame length out of range",
            ));
        }
        let mut ciphertext = vec![0u8; frame_len];
        reader
            .read_exact(&mut ciphertext)
            .map_err(|err| PipelineError::io("decrypt.read_frame", input, err))?;
        let nonce = chunk_nonce(&nonce_prefix, counter);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| {
                PipelineError::crypto("decrypt.chunk", input, "chunk authentication failed")
            })?;
        writer
            .write_all(&plaintext)
            .map_err(|err| PipelineError::io("decrypt.write", output, err))?;
        counter = counter.checked_add(1).ok_or_else(|| {
            PipelineError::crypto("decrypt.chunk", input, "chunk counter overflow")
        })?;
    }
    writer
        .flush()
        .map_err(|err| PipelineError::io("decrypt.flush", output, err))?;
    Ok(())
}

fn build_cipher(password: &str, salt: &[u8], path: &Path) -> PipelineResult<Aes256Gcm> {
    let mut key = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|_| PipelineError::crypto("derive_key", path, "key derivation failed"))?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)))
}

fn chunk_nonce(prefix: &[u8; NONCE_PREFIX_LEN], counter: u32) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..NONCE_PREFIX_LEN].copy_from_slice(prefix);
    nonce[NONCE_PREFIX_LEN..].copy_from_slice(&counter.to_be_bytes());
    nonce
}

/// Fill `buffer` from the reader, tolerating short reads. Returns bytes read.
fn fill_chunk(reader: &mut impl Read, buffer: &mut [u8], path: &Path) -> PipelineResult<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = reader
            .read(&mut buffer[filled..])
            .map_err(|err| PipelineError::io("encrypt.read_input", path, err))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Read the next frame length, or `None` at a clean end of file.
fn read_frame_len(reader: &mut impl Read, path: &Path) -> PipelineResult<Option<u32>> {
    let mut len = [0u8; 4];
    let first = reader
        .read(&mut len[..1])
        .map_err(|err| PipelineError::io("decrypt.read_frame", path, err))?;
    if first == 0 {
        return Ok(None);
    }
    reader
        .read_exact(&mut len[1..])
        .map_err(|err| PipelineError::io("decrypt.read_frame", path, err))?;
    Ok(Some(u32::from_be_bytes(len)))
}
