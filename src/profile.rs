/// Profile store for the launcher.
///
/// Profiles live in a `profiles.json` file next to the launcher executable
/// (the installation root). The file is a JSON object mapping a profile name
/// to its argument specification for the worker executable:
///
/// ```json
/// {
///     "general": { "args": "--wf-tcp=80,443 --hostlist=\"list-general.txt\" ..." },
///     "discord": { "args": "--wf-tcp=443 ..." }
/// }
/// ```
///
/// The argument string is tokenized once at load time; the resulting store is
/// immutable for the rest of the run. A missing, unreadable or malformed file
/// is a fatal startup error — distinct from a file that defines zero
/// profiles, which is fine.
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the profile definitions, relative to the install root.
pub const PROFILES_FILE: &str = "profiles.json";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("profile '{name}' has an unbalanced quote in its arguments")]
    UnbalancedQuote { name: String },
}

/// A named, fixed set of command-line arguments for the worker executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub args: Vec<String>,
}

/// On-disk shape of a single profile entry.
#[derive(Debug, Deserialize)]
struct ProfileSpec {
    args: String,
}

/// Immutable set of profiles, in file order.
#[derive(Debug)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

impl ProfileStore {
    /// Load and validate `profiles.json` from the given path.
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path).map_err(|source| ProfileError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        // serde_json's preserve_order feature keeps the file order, so the
        // UI shows buttons in the same order the user wrote them.
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&contents)
            .map_err(|source| ProfileError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut profiles = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let spec: ProfileSpec =
                serde_json::from_value(value).map_err(|source| ProfileError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            let args = split_args(&spec.args)
                .ok_or_else(|| ProfileError::UnbalancedQuote { name: name.clone() })?;
            profiles.push(Profile { name, args });
        }

        tracing::info!("Loaded {} profiles from {}", profiles.len(), path.display());

        Ok(ProfileStore { profiles })
    }

    /// Build a store directly from profiles; test seam for the supervisor.
    #[cfg(test)]
    pub(crate) fn from_profiles(profiles: Vec<Profile>) -> Self {
        ProfileStore { profiles }
    }

    /// Look up a profile by name.
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All profiles, in file order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// The launcher's installation root: the directory holding the executable.
/// `profiles.json` and the worker's `bin\` directory both live here.
pub fn install_root() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow::anyhow!("executable path has no parent directory"))?;
    Ok(dir.to_path_buf())
}

/// Split an argument string into tokens.
///
/// Whitespace separates tokens; double quotes group whitespace into one
/// token and are stripped, so `--hostlist="list general.txt"` becomes the
/// single token `--hostlist=list general.txt`. Returns `None` when a quote
/// is left unbalanced.
fn split_args(raw: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                // A quote starts a token even when empty ("" is a token).
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return None;
    }
    if has_token {
        tokens.push(current);
    }
    Some(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_profiles_file(tag: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "zapret_launcher_test_{}_{}.json",
            tag,
            std::process::id()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_split_plain_args() {
        let tokens = split_args("--wf-tcp=80,443 --wf-udp=443,50000-50100").unwrap();
        assert_eq!(tokens, vec!["--wf-tcp=80,443", "--wf-udp=443,50000-50100"]);
    }

    #[test]
    fn test_split_quoted_args() {
        let tokens = split_args(r#"--hostlist="list general.txt" --new"#).unwrap();
        assert_eq!(tokens, vec!["--hostlist=list general.txt", "--new"]);
    }

    #[test]
    fn test_split_collapses_whitespace() {
        let tokens = split_args("  --a \n\t --b  ").unwrap();
        assert_eq!(tokens, vec!["--a", "--b"]);
    }

    #[test]
    fn test_split_unbalanced_quote() {
        assert!(split_args(r#"--hostlist="list.txt"#).is_none());
    }

    #[test]
    fn test_load_keeps_file_order() {
        let path = temp_profiles_file(
            "order",
            r#"{
                "general": { "args": "--wf-tcp=80,443" },
                "discord": { "args": "--wf-tcp=443" }
            }"#,
        );
        let store = ProfileStore::load(&path).unwrap();
        let names: Vec<_> = store.profiles().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["general", "discord"]);
        assert_eq!(store.get("discord").unwrap().args, vec!["--wf-tcp=443"]);
        assert!(store.contains("general"));
        assert!(!store.contains("unknown"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let path = std::env::temp_dir().join("zapret_launcher_test_does_not_exist.json");
        assert!(matches!(
            ProfileStore::load(&path),
            Err(ProfileError::Read { .. })
        ));
    }

    #[test]
    fn test_load_malformed_json_is_error() {
        let path = temp_profiles_file("malformed", "{ not json");
        assert!(matches!(
            ProfileStore::load(&path),
            Err(ProfileError::Parse { .. })
        ));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_non_string_args_is_error() {
        let path = temp_profiles_file("badargs", r#"{ "general": { "args": 42 } }"#);
        assert!(matches!(
            ProfileStore::load(&path),
            Err(ProfileError::Parse { .. })
        ));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_load_empty_object_is_zero_profiles() {
        let path = temp_profiles_file("empty", "{}");
        let store = ProfileStore::load(&path).unwrap();
        assert!(store.is_empty());
        let _ = fs::remove_file(path);
    }
}
