//! Chunked stream cipher: encrypt-on-write, random-access decrypt-on-read
//!
//! Encrypt is a lazy pull pipeline: header first, then one sealed chunk per
//! 64 KiB of plaintext, so a file can be streamed straight into an upload
//! without materializing the ciphertext.
//!
//! Decrypt works against any [`RangeSource`] (the Range-Read Adapter in
//! cloak-remote) and positions itself at an arbitrary plaintext offset by
//! mapping it to the covering chunk. Only the header and the chunks that
//! overlap the requested range are ever fetched, which is what makes video
//! seeking and partial downloads cheap.
//!
//! Per-chunk nonce = file nonce + chunk index (little-endian add with carry
//! across all 24 bytes); AAD = chunk index. A reordered, substituted, or
//! tampered chunk fails authentication instead of decrypting to garbage.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use cloak_core::{CloakError, CloakResult};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

use crate::{BLOCK_SIZE, HEADER_SIZE, KEY_SIZE, MAGIC, NONCE_SIZE, TAG_SIZE};

const CHUNK_TOTAL: u64 = (BLOCK_SIZE + TAG_SIZE) as u64;

/// Absolute-offset byte-range reads over one ciphertext object.
///
/// This is the single capability the decrypt path needs; the Range-Read
/// Adapter normalizes every remote link shape (native range reader,
/// seekable stream, plain URL) into it. Implementations must start exactly
/// at `offset` and deliver at least `length` bytes when the object has
/// them; `None` means read to end-of-object.
#[async_trait]
pub trait RangeSource: Send + Sync {
    async fn open(
        &self,
        offset: u64,
        length: Option<u64>,
    ) -> io::Result<Box<dyn AsyncRead + Send + Unpin>>;
}

/// Content encryption for file byte streams.
///
/// Immutable and cheap to clone; any number of concurrent encrypt/decrypt
/// operations may share one instance.
#[derive(Clone)]
pub struct ContentCipher {
    aead: XChaCha20Poly1305,
}

impl ContentCipher {
    pub fn new(content_key: &[u8; KEY_SIZE]) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(content_key.into()),
        }
    }

    /// Wrap a plaintext reader into a ciphertext reader.
    ///
    /// Emits the 32-byte header (with a freshly generated random file
    /// nonce), then seals and emits one chunk per `BLOCK_SIZE` plaintext
    /// bytes as the consumer pulls. The final chunk may be shorter.
    pub fn encrypt<R>(&self, plaintext: R) -> impl AsyncRead + Send + Unpin
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let mut file_nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut file_nonce);

        struct State<R> {
            reader: R,
            aead: XChaCha20Poly1305,
            file_nonce: [u8; NONCE_SIZE],
            index: u64,
            header_sent: bool,
            done: bool,
        }

        let state = State {
            reader: plaintext,
            aead: self.aead.clone(),
            file_nonce,
            index: 0,
            header_sent: false,
            done: false,
        };

        let stream = futures::stream::try_unfold(state, |mut st| async move {
            if !st.header_sent {
                st.header_sent = true;
                let mut header = Vec::with_capacity(HEADER_SIZE);
                header.extend_from_slice(MAGIC);
                header.extend_from_slice(&st.file_nonce);
                return Ok::<_, io::Error>(Some((Bytes::from(header), st)));
            }
            if st.done {
                return Ok(None);
            }
            let mut block = vec![0u8; BLOCK_SIZE];
            let n = read_full(&mut st.reader, &mut block).await?;
            if n == 0 {
                st.done = true;
                return Ok(None);
            }
            if n < BLOCK_SIZE {
                st.done = true;
            }
            let sealed = seal_chunk(&st.aead, &st.file_nonce, st.index, &block[..n])
                .map_err(io::Error::other)?;
            st.index += 1;
            Ok(Some((Bytes::from(sealed), st)))
        });

        StreamReader::new(Box::pin(stream))
    }

    /// Open a plaintext reader over `[offset, offset + length)` of the
    /// file, or to end when `length` is `None`.
    ///
    /// The header is always fetched first (the file nonce lives there),
    /// then only the chunks covering the requested range. Authentication
    /// failure on any chunk surfaces as an `InvalidData` I/O error wrapping
    /// [`CloakError::Integrity`], never as silently truncated output.
    pub async fn open_range(
        &self,
        source: &dyn RangeSource,
        offset: u64,
        length: Option<u64>,
    ) -> CloakResult<Box<dyn AsyncRead + Send + Unpin>> {
        let mut header_reader = source.open(0, Some(HEADER_SIZE as u64)).await?;
        let mut header = [0u8; HEADER_SIZE];
        let got = read_full(&mut header_reader, &mut header).await?;
        if got != HEADER_SIZE {
            return Err(CloakError::Integrity(format!(
                "header truncated: {got} of {HEADER_SIZE} bytes"
            )));
        }
        if &header[..MAGIC.len()] != MAGIC {
            return Err(CloakError::Integrity("bad magic, not an encrypted file".into()));
        }
        let mut file_nonce = [0u8; NONCE_SIZE];
        file_nonce.copy_from_slice(&header[MAGIC.len()..]);

        if length == Some(0) {
            return Ok(Box::new(tokio::io::empty()));
        }

        let first_chunk = offset / BLOCK_SIZE as u64;
        let skip = (offset % BLOCK_SIZE as u64) as usize;
        let cipher_offset = HEADER_SIZE as u64 + first_chunk * CHUNK_TOTAL;
        let cipher_length = length.map(|len| {
            let end_chunk = (offset + len).div_ceil(BLOCK_SIZE as u64);
            (end_chunk - first_chunk) * CHUNK_TOTAL
        });

        tracing::trace!(offset, ?length, first_chunk, skip, "opening decrypt range");
        let reader = source.open(cipher_offset, cipher_length).await?;

        struct State {
            reader: Box<dyn AsyncRead + Send + Unpin>,
            aead: XChaCha20Poly1305,
            file_nonce: [u8; NONCE_SIZE],
            index: u64,
            skip: usize,
            remaining: Option<u64>,
            done: bool,
        }

        let state = State {
            reader,
            aead: self.aead.clone(),
            file_nonce,
            index: first_chunk,
            skip,
            remaining: length,
            done: false,
        };

        let stream = futures::stream::try_unfold(state, |mut st| async move {
            if st.done {
                return Ok::<_, io::Error>(None);
            }
            let mut buf = vec![0u8; CHUNK_TOTAL as usize];
            let n = read_full(&mut st.reader, &mut buf).await?;
            if n == 0 {
                if st.remaining.is_some_and(|rem| rem > 0) {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "ciphertext ended before the requested range",
                    ));
                }
                return Ok(None);
            }
            if n <= TAG_SIZE {
                return Err(CloakError::Integrity(format!(
                    "truncated chunk {}: {n} bytes",
                    st.index
                ))
                .into());
            }
            let plain = open_chunk(&st.aead, &st.file_nonce, st.index, &buf[..n])
                .map_err(io::Error::from)?;
            st.index += 1;

            let start = st.skip.min(plain.len());
            st.skip = 0;
            let mut chunk = Bytes::from(plain).slice(start..);
            if let Some(rem) = st.remaining.as_mut() {
                if chunk.len() as u64 > *rem {
                    chunk = chunk.slice(..*rem as usize);
                }
                *rem -= chunk.len() as u64;
                if *rem == 0 {
                    st.done = true;
                }
            }
            Ok(Some((chunk, st)))
        });

        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

/// Per-chunk nonce: file nonce plus chunk index, little-endian with carry.
fn chunk_nonce(file_nonce: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *file_nonce;
    let index_bytes = index.to_le_bytes();
    let mut carry = 0u16;
    for (i, byte) in nonce.iter_mut().enumerate() {
        let add = if i < index_bytes.len() {
            u16::from(index_bytes[i])
        } else {
            0
        };
        let sum = u16::from(*byte) + add + carry;
        *byte = (sum & 0xff) as u8;
        carry = sum >> 8;
    }
    nonce
}

fn seal_chunk(
    aead: &XChaCha20Poly1305,
    file_nonce: &[u8; NONCE_SIZE],
    index: u64,
    plaintext: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let nonce = chunk_nonce(file_nonce, index);
    let aad = index.to_be_bytes();
    aead.encrypt(
        XNonce::from_slice(&nonce),
        Payload {
            msg: plaintext,
            aad: &aad,
        },
    )
    .map_err(|e| anyhow::anyhow!("chunk {index} encryption failed: {e}"))
}

fn open_chunk(
    aead: &XChaCha20Poly1305,
    file_nonce: &[u8; NONCE_SIZE],
    index: u64,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CloakError> {
    let nonce = chunk_nonce(file_nonce, index);
    let aad = index.to_be_bytes();
    aead.decrypt(
        XNonce::from_slice(&nonce),
        Payload {
            msg: ciphertext,
            aad: &aad,
        },
    )
    .map_err(|_| CloakError::Integrity(format!("chunk {index} failed authentication")))
}

/// Read until `buf` is full or the reader hits EOF; returns bytes read.
async fn read_full<R: AsyncRead + Unpin + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
