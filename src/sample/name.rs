// Sample name derivation
//
// Names are cut from the tail of the sample directory so that the most
// specific path components survive, and have to fit in a Cloud Run service
// name together with whatever suffix the caller appends.

use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;

/// Maximum length of a Cloud Run service name we generate.
///
/// Cloud Run accepts 63 characters; the rest is headroom for revision suffixes.
pub const MAX_SERVICE_NAME_LEN: usize = 53;

/// Length of the random part appended to sample names
pub const RANDOM_SUFFIX_LEN: usize = 6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("suffix length {suffix_len} leaves no room in a {max_len} character name")]
    SuffixTooLong { suffix_len: usize, max_len: usize },

    #[error("sample directory '{dir}' has {len} characters, a name needs the last {window}")]
    DirTooShort {
        dir: String,
        len: usize,
        window: usize,
    },

    #[error("sample directory '{dir}' reduces to an empty name")]
    Empty { dir: String },

    #[error("name '{name}' derived from '{dir}' grows past {window} characters when lowercased")]
    TooLong {
        dir: String,
        name: String,
        window: usize,
    },
}

/// Derive the name for a sample directory, leaving room for `suffix_len` characters.
///
/// Takes the trailing window of `dir`, turns path separators into hyphens,
/// drops a single trailing and a single leading hyphen, and lowercases.
/// Lowercasing can expand some characters (`İ` becomes two), so the result
/// is checked against the window once more.
pub fn derive_name(dir: &str, suffix_len: usize) -> Result<String, NameError> {
    let window = name_window(dir, MAX_SERVICE_NAME_LEN, suffix_len)?;
    let replaced = replace_separators(window);
    let trimmed = trim_hyphens(&replaced).ok_or_else(|| NameError::Empty {
        dir: dir.to_string(),
    })?;

    let name = trimmed.to_lowercase();
    let max_len = MAX_SERVICE_NAME_LEN - suffix_len;
    if name.chars().count() > max_len {
        return Err(NameError::TooLong {
            dir: dir.to_string(),
            name,
            window: max_len,
        });
    }
    Ok(name)
}

/// The trailing `max_len - suffix_len` characters of `dir`.
///
/// Fails instead of returning a shorter window when `dir` is too short.
pub fn name_window(dir: &str, max_len: usize, suffix_len: usize) -> Result<&str, NameError> {
    if suffix_len >= max_len {
        return Err(NameError::SuffixTooLong {
            suffix_len,
            max_len,
        });
    }
    let window = max_len - suffix_len;

    let len = dir.chars().count();
    if len < window {
        return Err(NameError::DirTooShort {
            dir: dir.to_string(),
            len,
            window,
        });
    }

    let start = dir
        .char_indices()
        .nth(len - window)
        .map(|(idx, _)| idx)
        .unwrap_or(dir.len());
    Ok(&dir[start..])
}

pub fn replace_separators(s: &str) -> String {
    s.replace('/', "-")
}

/// Drop one trailing hyphen, then one leading hyphen.
///
/// Returns None when the string is or becomes empty before a check.
pub fn trim_hyphens(s: &str) -> Option<&str> {
    if s.is_empty() {
        return None;
    }
    let s = s.strip_suffix('-').unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    Some(s.strip_prefix('-').unwrap_or(s))
}

/// Random lowercase alphanumeric suffix
pub fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: &str = "/home/ci/workspace/GoogleCloudPlatform/samples/run/hello-World";

    #[test]
    fn test_window_takes_trailing_characters() {
        assert_eq!(
            name_window("/workspace/my-sample/run", 20, 5).unwrap(),
            "e/my-sample/run"
        );
        assert_eq!(name_window("abcdef", 6, 0).unwrap(), "abcdef");
        assert_eq!(name_window("abcdef", 6, 3).unwrap(), "def");
    }

    #[test]
    fn test_window_counts_characters_not_bytes() {
        assert_eq!(name_window("/tmp/über", 20, 16).unwrap(), "über");
    }

    #[test]
    fn test_window_rejects_short_dir() {
        assert_eq!(
            name_window("ab", 20, 0),
            Err(NameError::DirTooShort {
                dir: "ab".to_string(),
                len: 2,
                window: 20,
            })
        );
    }

    #[test]
    fn test_window_rejects_oversized_suffix() {
        assert_eq!(
            name_window(DIR, 20, 20),
            Err(NameError::SuffixTooLong {
                suffix_len: 20,
                max_len: 20,
            })
        );
        assert!(name_window(DIR, 20, 21).is_err());
    }

    #[test]
    fn test_replace_separators() {
        assert_eq!(replace_separators("e/my-sample/run"), "e-my-sample-run");
        assert_eq!(replace_separators("/a//b/"), "-a--b-");
    }

    #[test]
    fn test_trim_is_single_pass() {
        assert_eq!(trim_hyphens("-sample-"), Some("sample"));
        assert_eq!(trim_hyphens("--sample--"), Some("-sample-"));
        assert_eq!(trim_hyphens("sample"), Some("sample"));
        assert_eq!(trim_hyphens("-"), None);
        assert_eq!(trim_hyphens("--"), Some(""));
        assert_eq!(trim_hyphens("---"), Some("-"));
        assert_eq!(trim_hyphens(""), None);
    }

    #[test]
    fn test_derive_name_steps() {
        let name = derive_name("/workspace/My-Sample/run/", 33).unwrap();
        // window of 20 is "space/My-Sample/run/"
        assert_eq!(name, "space-my-sample-run");

        let name = derive_name("/workspace/My-Sample/Run", 29).unwrap();
        assert_eq!(name, "workspace-my-sample-run");
    }

    #[test]
    fn test_derive_name_properties() {
        for suffix_len in 0..MAX_SERVICE_NAME_LEN {
            let dir = format!("/{}", DIR.repeat(2));
            let name = derive_name(&dir, suffix_len).unwrap();
            let window = MAX_SERVICE_NAME_LEN - suffix_len;

            assert!(name.len() <= window, "{} longer than {}", name, window);
            assert!(!name.contains('/'));
            assert_eq!(name, name.to_lowercase());
            if !name.is_empty() {
                assert!(!name.starts_with('-'), "{}", name);
                assert!(!name.ends_with('-'), "{}", name);
            }
            assert!(name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            // Pure
            assert_eq!(name, derive_name(&dir, suffix_len).unwrap());
        }
    }

    #[test]
    fn test_derive_name_zero_suffix_uses_full_window() {
        let name = derive_name(&DIR.to_lowercase(), 0).unwrap();
        assert_eq!(name.len(), MAX_SERVICE_NAME_LEN);
    }

    #[test]
    fn test_derive_name_errors() {
        assert!(matches!(
            derive_name("ab", 0),
            Err(NameError::DirTooShort { .. })
        ));
        assert!(matches!(
            derive_name("/", MAX_SERVICE_NAME_LEN - 1),
            Err(NameError::Empty { .. })
        ));
    }

    #[test]
    fn test_derive_name_rejects_lowercase_expansion() {
        // U+0130 lowercases to "i" plus a combining dot
        let dir = "\u{130}".repeat(MAX_SERVICE_NAME_LEN);
        assert!(matches!(
            derive_name(&dir, 0),
            Err(NameError::TooLong { window: MAX_SERVICE_NAME_LEN, .. })
        ));

        // Multi-byte characters that stay one character are fine
        let dir = format!("/tmp/{}", "\u{dc}".repeat(10));
        assert_eq!(
            derive_name(&dir, MAX_SERVICE_NAME_LEN - 10).unwrap(),
            "\u{fc}".repeat(10)
        );
    }

    #[test]
    fn test_random_suffix() {
        let suffix = random_suffix(RANDOM_SUFFIX_LEN);
        assert_eq!(suffix.len(), RANDOM_SUFFIX_LEN);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
