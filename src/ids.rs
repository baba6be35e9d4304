//! Deterministic entry ids and filename sanitization.

use sha2::{Digest, Sha256};

/// Derive the stable catalog id for a source URL.
///
/// The id is a name-based UUID built from the SHA-256 of the URL, so the same
/// URL always maps to the same id across runs and machines.
pub fn entry_id_from_url(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    uuid::Builder::from_sha1_bytes(bytes).into_uuid().to_string()
}

/// Turn a track title into a name that is safe to use as a filename.
///
/// Replaces characters that are invalid on common filesystems, strips leading
/// and trailing spaces/dots, and caps the length.
pub fn safe_filename(title: &str) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let mut name: String = title
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();

    name = name.trim_matches(|c| c == ' ' || c == '.').to_string();
    while name.ends_with('_') {
        name.pop();
    }

    if name.len() > 200 {
        name.truncate(200);
    }

    name
}

/// Extract the final path segment of a URL, percent-decoded.
///
/// Returns an empty string when the URL has no usable filename component.
pub fn filename_from_url(url: &str) -> String {
    let tail = url
        .split('?')
        .next()
        .unwrap_or("")
        .rsplit('/')
        .next()
        .unwrap_or("");
    percent_decode(tail)
}

fn percent_decode(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = &encoded[i + 1..i + 3];
                if let Ok(value) = u8::from_str_radix(hex, 16) {
                    out.push(value);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
