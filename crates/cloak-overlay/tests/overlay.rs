//! End-to-end overlay tests against the in-memory remote

use std::io::Cursor;
use std::sync::Arc;

use cloak_core::{CipherSettings, CloakError, KdfSettings, NameMode};
use cloak_crypto::{Cipher, BLOCK_SIZE, HEADER_SIZE};
use cloak_overlay::Overlay;
use cloak_remote::{MemoryRemote, Remote};
use tokio::io::AsyncReadExt;

fn test_cipher(filename_mode: NameMode, encrypt_dir_names: bool) -> Arc<Cipher> {
    let settings = CipherSettings {
        password: "overlay-test-password".into(),
        salt: "overlay-test-salt".into(),
        filename_mode,
        encrypt_dir_names,
        ..CipherSettings::default()
    };
    let kdf = KdfSettings {
        mem_cost_kib: 1024,
        time_cost: 1,
        parallelism: 1,
    };
    Arc::new(Cipher::new(&settings, &kdf).unwrap())
}

fn overlay_over(remote: Arc<MemoryRemote>) -> Overlay {
    Overlay::new(test_cipher(NameMode::Standard, true), remote, "")
}

fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

async fn put_bytes(overlay: &Overlay, dir: &str, name: &str, data: &[u8]) {
    overlay
        .put(dir, name, data.len() as u64, Cursor::new(data.to_vec()))
        .await
        .unwrap();
}

async fn read_all(overlay: &Overlay, path: &str, offset: u64, length: Option<u64>) -> Vec<u8> {
    let reader = overlay.open(path).await.unwrap();
    let mut stream = reader.read_range(offset, length).await.unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn put_then_list_shows_plaintext_view() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));
    let data = patterned(1234);

    put_bytes(&overlay, "/", "hello.txt", &data).await;

    let listing = overlay.list("/").await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "hello.txt");
    assert_eq!(listing[0].path, "/hello.txt");
    assert_eq!(listing[0].size, data.len() as u64);
    assert!(!listing[0].is_dir);

    // the remote only ever sees ciphertext names and sizes
    let raw = remote.list("/").await.unwrap();
    assert_eq!(raw.len(), 1);
    assert_ne!(raw[0].name, "hello.txt");
    assert!(raw[0].name.ends_with(".bin"));
    assert!(raw[0].size > data.len() as u64);
}

#[tokio::test]
async fn get_root_never_contacts_the_remote() {
    // a remote with nothing in it still answers for "/"
    let overlay = overlay_over(Arc::new(MemoryRemote::new()));
    let root = overlay.get("/").await.unwrap();
    assert_eq!(root.name, "Root");
    assert!(root.is_dir);
}

#[tokio::test]
async fn get_resolves_files_and_dirs() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));

    overlay.make_dir("/", "docs").await.unwrap();
    put_bytes(&overlay, "/docs", "a.txt", b"abc").await;

    let dir = overlay.get("/docs").await.unwrap();
    assert!(dir.is_dir);
    assert_eq!(dir.name, "docs");

    let file = overlay.get("/docs/a.txt").await.unwrap();
    assert!(!file.is_dir);
    assert_eq!(file.size, 3);
}

#[tokio::test]
async fn get_retries_the_opposite_type_guess() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));

    // a directory whose name looks like a file
    overlay.make_dir("/", "archive.tar").await.unwrap();
    let obj = overlay.get("/archive.tar").await.unwrap();
    assert!(obj.is_dir, "second guess (directory) must win");
    assert_eq!(obj.name, "archive.tar");

    // a file whose name looks like a directory
    put_bytes(&overlay, "/", "README", b"hi").await;
    let obj = overlay.get("/README").await.unwrap();
    assert!(!obj.is_dir, "second guess (file) must win");
    assert_eq!(obj.size, 2);
}

#[tokio::test]
async fn get_missing_surfaces_not_found() {
    let overlay = overlay_over(Arc::new(MemoryRemote::new()));
    let err = overlay.get("/no/such.file").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn range_reads_are_byte_exact_through_the_overlay() {
    let overlay = overlay_over(Arc::new(MemoryRemote::new()));
    let data = patterned(3 * BLOCK_SIZE + 777);
    put_bytes(&overlay, "/", "big.bin", &data).await;

    assert_eq!(read_all(&overlay, "/big.bin", 0, None).await, data);
    assert_eq!(
        read_all(&overlay, "/big.bin", 1000, Some(500)).await,
        &data[1000..1500]
    );
    // crossing a chunk boundary
    let edge = BLOCK_SIZE as u64 - 7;
    assert_eq!(
        read_all(&overlay, "/big.bin", edge, Some(20)).await,
        &data[edge as usize..edge as usize + 20]
    );
    // a request past the end is clamped to the end
    let near_end = data.len() as u64 - 10;
    assert_eq!(
        read_all(&overlay, "/big.bin", near_end, Some(1000)).await,
        &data[data.len() - 10..]
    );
}

#[tokio::test]
async fn range_link_backend_works_too() {
    let remote = Arc::new(MemoryRemote::with_range_links());
    let overlay = overlay_over(remote);
    let data = patterned(2 * BLOCK_SIZE);
    put_bytes(&overlay, "/", "ranged.bin", &data).await;

    assert_eq!(
        read_all(&overlay, "/ranged.bin", 70_000, Some(100)).await,
        &data[70_000..70_100]
    );
}

#[tokio::test]
async fn concurrent_reads_do_not_interfere() {
    let overlay = overlay_over(Arc::new(MemoryRemote::new()));
    let data = patterned(2 * BLOCK_SIZE + 99);
    put_bytes(&overlay, "/", "shared.bin", &data).await;

    let reader = overlay.open("/shared.bin").await.unwrap();
    let (a, b) = tokio::join!(
        async {
            let mut stream = reader.read_range(10, Some(1000)).await.unwrap();
            let mut out = Vec::new();
            stream.read_to_end(&mut out).await.unwrap();
            out
        },
        async {
            let mut stream = reader.read_range(BLOCK_SIZE as u64, Some(2000)).await.unwrap();
            let mut out = Vec::new();
            stream.read_to_end(&mut out).await.unwrap();
            out
        },
    );
    assert_eq!(a, &data[10..1010]);
    assert_eq!(b, &data[BLOCK_SIZE..BLOCK_SIZE + 2000]);
}

#[tokio::test]
async fn empty_file_roundtrip() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));

    put_bytes(&overlay, "/", "empty.txt", b"").await;

    let obj = overlay.get("/empty.txt").await.unwrap();
    assert_eq!(obj.size, 0);

    let raw = remote.list("/").await.unwrap();
    assert_eq!(raw[0].size, HEADER_SIZE as u64, "empty file is header-only");

    assert!(read_all(&overlay, "/empty.txt", 0, None).await.is_empty());
}

#[tokio::test]
async fn foreign_entries_vanish_from_listings() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));

    put_bytes(&overlay, "/", "mine.txt", b"legitimate").await;
    // planted directly on the remote: no suffix, undecodable name, bad size
    remote.insert_raw("/stray-notes.txt", b"plaintext interloper".to_vec());
    remote.insert_raw("/aaaaaaaa.bin", b"xx".to_vec());

    let listing = overlay.list("/").await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "mine.txt");
}

#[tokio::test]
async fn structural_operations_roundtrip() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));

    overlay.make_dir("/", "src").await.unwrap();
    overlay.make_dir("/", "dst").await.unwrap();
    put_bytes(&overlay, "/src", "doc.txt", b"contents").await;

    // rename
    overlay.rename("/src/doc.txt", false, "renamed.txt").await.unwrap();
    assert!(overlay.get("/src/doc.txt").await.is_err());
    assert_eq!(overlay.get("/src/renamed.txt").await.unwrap().size, 8);

    // copy keeps the source
    overlay.copy_to("/src/renamed.txt", false, "/dst").await.unwrap();
    assert!(overlay.get("/src/renamed.txt").await.is_ok());
    assert_eq!(
        read_all(&overlay, "/dst/renamed.txt", 0, None).await,
        b"contents"
    );

    // move removes the source
    overlay.move_to("/src/renamed.txt", false, "/dst").await.unwrap();
    assert!(overlay.get("/src/renamed.txt").await.is_err());

    // remove a directory tree
    overlay.remove("/dst", true).await.unwrap();
    assert!(overlay.list("/").await.unwrap().iter().all(|o| o.name != "dst"));
}

#[tokio::test]
async fn directory_names_stay_plaintext_when_flag_is_off() {
    let remote = Arc::new(MemoryRemote::new());
    let cipher = test_cipher(NameMode::Standard, false);
    let overlay = Overlay::new(cipher, remote.clone(), "");

    overlay.make_dir("/", "photos").await.unwrap();
    put_bytes(&overlay, "/photos", "img.jpg", b"jpeg").await;

    let raw = remote.list("/").await.unwrap();
    assert_eq!(raw[0].name, "photos", "dir name must not be encrypted");

    let inner = remote.list("/photos").await.unwrap();
    assert_ne!(inner[0].name, "img.jpg", "file name must still be encrypted");

    assert_eq!(
        read_all(&overlay, "/photos/img.jpg", 0, None).await,
        b"jpeg"
    );
}

#[tokio::test]
async fn obfuscate_mode_end_to_end() {
    let remote = Arc::new(MemoryRemote::new());
    let cipher = test_cipher(NameMode::Obfuscate, true);
    let overlay = Overlay::new(cipher, remote.clone(), "");

    put_bytes(&overlay, "/", "Casual Secret.txt", b"data").await;

    let raw = remote.list("/").await.unwrap();
    assert_ne!(raw[0].name, "Casual Secret.txt.bin");

    let listing = overlay.list("/").await.unwrap();
    assert_eq!(listing[0].name, "Casual Secret.txt");
}

#[tokio::test]
async fn overlay_under_a_remote_root_prefix() {
    let remote = Arc::new(MemoryRemote::new());
    let cipher = test_cipher(NameMode::Standard, true);
    let overlay = Overlay::new(cipher, remote.clone(), "/vault");

    put_bytes(&overlay, "/", "f.txt", b"rooted").await;

    // everything lands under the (unencrypted) root prefix
    let top = remote.list("/").await.unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].name, "vault");

    assert_eq!(read_all(&overlay, "/f.txt", 0, None).await, b"rooted");
}

#[tokio::test]
async fn link_without_capability_fails_loudly() {
    let remote = Arc::new(MemoryRemote::with_empty_url_links());
    let overlay = overlay_over(remote);
    put_bytes(&overlay, "/", "f.txt", b"data").await;

    let err = match overlay.open("/f.txt").await {
        Ok(_) => panic!("expected error"),
        Err(e) => e,
    };
    assert!(matches!(err, CloakError::NoCapability));
}

#[tokio::test]
async fn tampered_remote_object_fails_with_integrity_error() {
    let remote = Arc::new(MemoryRemote::new());
    let overlay = overlay_over(Arc::clone(&remote));
    let data = patterned(1000);
    put_bytes(&overlay, "/", "victim.txt", &data).await;

    // corrupt one ciphertext byte in place, keeping the size valid
    let raw_name = remote.list("/").await.unwrap()[0].name.clone();
    let link = remote.link(&format!("/{raw_name}")).await.unwrap();
    let mut ciphertext = Vec::new();
    match link {
        cloak_remote::RemoteLink::Seekable(handle) => {
            let mut guard = handle.lock().await;
            guard.read_to_end(&mut ciphertext).await.unwrap();
        }
        _ => unreachable!(),
    }
    ciphertext[HEADER_SIZE + 3] ^= 0x01;
    remote.insert_raw(&format!("/{raw_name}"), ciphertext);

    let reader = overlay.open("/victim.txt").await.unwrap();
    let mut stream = reader.read_range(0, None).await.unwrap();
    let mut out = Vec::new();
    let err = stream.read_to_end(&mut out).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}
