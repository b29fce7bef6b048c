//! Logical-path → remote-path translation, and the type-guess heuristic
//!
//! The remote namespace carries no plaintext index, so a logical path alone
//! does not say whether it names a file or a directory, and the encrypted
//! leaf differs between the two (files carry the suffix, and may use a
//! different codec state). `guess` picks the likely type from the path
//! shape; `candidates` turns that into the ordered list of remote paths a
//! bounded two-attempt lookup walks through.

use cloak_core::CloakResult;
use cloak_crypto::Cipher;

/// Guess whether `path` names a directory.
///
/// Returns `(first_guess_is_dir, second_guess_is_legitimate)`. A trailing
/// slash is unambiguous; otherwise a leaf without a dot is probably a
/// directory, with a dot probably a file; both are worth a second try.
pub fn guess(path: &str) -> (bool, bool) {
    if path.ends_with('/') {
        return (true, false);
    }
    let leaf = path.rsplit('/').next().unwrap_or(path);
    if leaf.contains('.') {
        (false, true)
    } else {
        (true, true)
    }
}

/// Encrypt a logical path into its remote form under `root`.
///
/// Every intermediate segment goes through the directory codec; the final
/// segment through the file or directory codec per `is_dir`.
pub fn to_remote_path(
    cipher: &Cipher,
    root: &str,
    logical: &str,
    is_dir: bool,
) -> CloakResult<String> {
    let mut remote = String::from("/");
    let root = root.trim_matches('/');
    if !root.is_empty() {
        remote.push_str(root);
    }

    let trimmed = logical.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(remote);
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        let encrypted = if last && !is_dir {
            cipher.encrypt_file_name(segment)?
        } else {
            cipher.encrypt_dir_name(segment)?
        };
        if !remote.ends_with('/') {
            remote.push('/');
        }
        remote.push_str(&encrypted);
    }
    Ok(remote)
}

/// Ordered remote-path candidates for a `get`, one per type guess.
///
/// The bounded retry loop in the driver walks these in order; there are
/// never more than two.
pub fn candidates(
    cipher: &Cipher,
    root: &str,
    logical: &str,
) -> CloakResult<Vec<(String, bool)>> {
    let (first_is_dir, second_try) = guess(logical);
    let mut list = Vec::with_capacity(2);
    list.push((to_remote_path(cipher, root, logical, first_is_dir)?, first_is_dir));
    if second_try {
        list.push((
            to_remote_path(cipher, root, logical, !first_is_dir)?,
            !first_is_dir,
        ));
    }
    Ok(list)
}
