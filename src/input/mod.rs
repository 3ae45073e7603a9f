//! Expansion of command-line inputs into a concrete file list

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ConvertError, Result};
use crate::processing::formats::has_supported_extension;

/// Prefix marking an input as a list file
pub const LIST_FILE_SENTINEL: char = '@';

/// Turns files, directories and `@list` references into an ordered,
/// deduplicated list of image files.
///
/// Relative paths, including those inside list files, resolve against the
/// current working directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct PathExpander;

#[derive(Default)]
struct Expansion {
    files: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    /// Canonical paths of the list files currently being read
    open_lists: Vec<PathBuf>,
}

impl Expansion {
    fn add(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.files.push(path);
        } else {
            debug!("Skipping repeated input {}", path.display());
        }
    }
}

impl PathExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand `inputs` in order.
    ///
    /// Fails when a list file is unreadable or cyclic, or when nothing
    /// convertible is left.
    pub fn expand<I, S>(&self, inputs: I) -> Result<Vec<PathBuf>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut expansion = Expansion::default();
        for input in inputs {
            self.expand_input(input.as_ref(), &mut expansion)?;
        }

        if expansion.files.is_empty() {
            return Err(ConvertError::InputsEmpty);
        }

        info!("Expanded inputs to {} files", expansion.files.len());
        Ok(expansion.files)
    }

    fn expand_input(&self, input: &str, expansion: &mut Expansion) -> Result<()> {
        match input.strip_prefix(LIST_FILE_SENTINEL) {
            Some(list) => self.expand_list_file(Path::new(list.trim()), expansion),
            None => {
                self.expand_path(Path::new(input), expansion);
                Ok(())
            }
        }
    }

    fn expand_list_file(&self, path: &Path, expansion: &mut Expansion) -> Result<()> {
        let list_error = |source| ConvertError::ListFile {
            path: path.to_path_buf(),
            source,
        };

        let canonical = fs::canonicalize(path).map_err(list_error)?;
        if let Some(pos) = expansion.open_lists.iter().position(|p| *p == canonical) {
            let mut chain = expansion.open_lists[pos..].to_vec();
            chain.push(canonical);
            return Err(ConvertError::CyclicListFile { chain });
        }

        let content = fs::read_to_string(&canonical).map_err(list_error)?;
        debug!("Reading list file {}", canonical.display());

        expansion.open_lists.push(canonical);
        for entry in content.lines().filter_map(parse_list_line) {
            self.expand_input(entry, expansion)?;
        }
        expansion.open_lists.pop();

        Ok(())
    }

    fn expand_path(&self, path: &Path, expansion: &mut Expansion) {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                match entry {
                    Ok(entry) if entry.file_type().is_file() => {
                        if has_supported_extension(entry.path()) {
                            expansion.add(entry.into_path());
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Skipping unreadable entry under {}: {}", path.display(), e),
                }
            }
        } else if path.is_file() {
            if has_supported_extension(path) {
                expansion.add(path.to_path_buf());
            } else {
                warn!("Skipping {}: unsupported file type", path.display());
            }
        } else {
            warn!("Skipping {}: no such file or directory", path.display());
        }
    }
}

/// One list-file line as an input, or None for blanks and comments
fn parse_list_line(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let unquoted = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .unwrap_or(line)
        .trim();
    (!unquoted.is_empty()).then_some(unquoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"x").unwrap();
        path
    }

    fn arg(path: &Path) -> String {
        path.to_string_lossy().into_owned()
    }

    fn list_arg(path: &Path) -> String {
        format!("@{}", path.display())
    }

    #[test]
    fn test_parse_list_line() {
        assert_eq!(parse_list_line("  a.png  "), Some("a.png"));
        assert_eq!(parse_list_line("\"my photo.jpg\""), Some("my photo.jpg"));
        assert_eq!(parse_list_line("# comment"), None);
        assert_eq!(parse_list_line("   "), None);
        assert_eq!(parse_list_line("\"\""), None);
        assert_eq!(parse_list_line("@nested.txt"), Some("@nested.txt"));
    }

    #[test]
    fn test_directory_walk_is_recursive_and_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.png");
        let b = touch(dir.path(), "sub/deeper/b.JPG");
        let c = touch(dir.path(), "sub/c.Avif");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "sub/d.gif");

        let files = PathExpander::new().expand([arg(dir.path())]).unwrap();
        assert_eq!(files, vec![a, c, b]);
    }

    #[test]
    fn test_explicit_files_are_filtered() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.webp");
        let txt = touch(dir.path(), "readme.txt");
        let missing = dir.path().join("missing.png");

        let files = PathExpander::new()
            .expand([arg(&txt), arg(&a), arg(&missing)])
            .unwrap();
        assert_eq!(files, vec![a]);
    }

    #[test]
    fn test_dedupe_keeps_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.png");
        let b = touch(dir.path(), "b.jpeg");

        let files = PathExpander::new()
            .expand([arg(&b), arg(&a), arg(&b), arg(dir.path())])
            .unwrap();
        assert_eq!(files, vec![b, a]);
    }

    #[test]
    fn test_nested_list_files() {
        let dir = TempDir::new().unwrap();
        let a = touch(dir.path(), "a.png");
        let b = touch(dir.path(), "b.jpg");
        let c = touch(dir.path(), "c.webp");

        let inner = dir.path().join("inner.txt");
        fs::write(&inner, format!("{}\n", arg(&c))).unwrap();

        let outer = dir.path().join("outer.txt");
        fs::write(
            &outer,
            format!(
                "# batch\n\n\"{}\"\n  {}\n{}\n{}\n",
                arg(&b),
                list_arg(&inner),
                arg(&a),
                list_arg(&inner)
            ),
        )
        .unwrap();

        let files = PathExpander::new().expand([list_arg(&outer)]).unwrap();
        assert_eq!(files, vec![b, c, a]);
    }

    #[test]
    fn test_cyclic_list_files_fail_fast() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.png");
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        fs::write(&first, format!("{}\n", list_arg(&second))).unwrap();
        fs::write(&second, format!("{}\n{}\n", arg(&dir.path().join("a.png")), list_arg(&first))).unwrap();

        let err = PathExpander::new().expand([list_arg(&first)]).unwrap_err();
        match err {
            ConvertError::CyclicListFile { chain } => {
                let first = fs::canonicalize(&first).unwrap();
                let second = fs::canonicalize(&second).unwrap();
                assert_eq!(chain, vec![first.clone(), second, first]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_self_referencing_list_file() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("self.txt");
        fs::write(&list, format!("{}\n", list_arg(&list))).unwrap();

        let err = PathExpander::new().expand([list_arg(&list)]).unwrap_err();
        assert!(matches!(err, ConvertError::CyclicListFile { ref chain } if chain.len() == 2));
        assert!(err.is_batch_fatal());
    }

    #[test]
    fn test_missing_list_file() {
        let dir = TempDir::new().unwrap();
        let err = PathExpander::new()
            .expand([list_arg(&dir.path().join("nope.txt"))])
            .unwrap_err();
        assert!(matches!(err, ConvertError::ListFile { .. }));
    }

    #[test]
    fn test_nothing_convertible_is_fatal() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "notes.txt");

        let err = PathExpander::new().expand([arg(dir.path())]).unwrap_err();
        assert!(matches!(err, ConvertError::InputsEmpty));

        let none: [&str; 0] = [];
        assert!(matches!(PathExpander::new().expand(none), Err(ConvertError::InputsEmpty)));
    }
}
