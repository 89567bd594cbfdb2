use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::error::InkfolioError;

pub struct Utils {

}

impl Utils {
    /// Forward-slash form of a path with `.` components removed and `..` folded where possible.
    pub fn norm_path(path: &Path) -> String {
        let mut parts: Vec<String> = Vec::new();
        let mut prefix = String::new();

        for component in path.components() {
            match component {
                Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
                Component::RootDir => prefix.push('/'),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.last().is_some_and(|last| last != "..") {
                        parts.pop();
                    } else if prefix.is_empty() {
                        parts.push("..".to_string());
                    }
                }
                Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            }
        }

        let joined = format!("{}{}", prefix, parts.join("/")).replace('\\', "/");
        if joined.is_empty() {
            ".".to_string()
        } else {
            joined
        }
    }

    /// Path of `path` relative to `root` in forward-slash form, or the normalized
    /// path itself when it does not live under `root`.
    pub fn rel_from_root(root: &Path, path: &Path) -> String {
        match path.strip_prefix(root) {
            Ok(rel) => Self::norm_path(rel),
            Err(_) => Self::norm_path(path),
        }
    }

    /// Trims slashes and backslashes off a configured directory so it can be used
    /// to build `./<dir>/<file>` catalog paths.
    pub fn clean_rel_dir(dir: &str) -> String {
        dir.replace('\\', "/")
            .trim_start_matches("./")
            .trim_matches('/')
            .to_string()
    }

    /// `path` if absolute, else `path` under `root`.
    pub fn in_root(root: &Path, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            root.join(path)
        }
    }

    /// Resolves a path as recorded in the catalog (e.g. `./images/x.png`) against the
    /// project root. Leading dots and slashes are dropped before joining.
    pub fn resolve_recorded_path(root: &Path, recorded: &str) -> PathBuf {
        let trimmed = recorded.trim_start_matches(['.', '/']);
        root.join(trimmed)
    }

    pub fn recorded_path_exists(root: &Path, recorded: &str) -> bool {
        if recorded.is_empty() {
            return false;
        }
        Self::resolve_recorded_path(root, recorded).is_file()
    }

    /// Pretty JSON (two-space indent, raw UTF-8) followed by a newline.
    pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), InkfolioError> {
        let mut text = serde_json::to_string_pretty(value)?;
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }

    /// Quotes a CSV field when it contains a separator, quote or line break.
    pub fn csv_field(value: &str) -> String {
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_owned()
        }
    }

    pub fn csv_row(fields: &[&str]) -> String {
        let mut row = fields
            .iter()
            .map(|f| Self::csv_field(f))
            .collect::<Vec<_>>()
            .join(",");
        row.push_str("\r\n");
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_norm_path_drops_cur_dir_and_folds_parent() {
        assert_eq!(Utils::norm_path(Path::new("./images/./paintings")), "images/paintings");
        assert_eq!(Utils::norm_path(Path::new("images/tmp/../large")), "images/large");
        assert_eq!(Utils::norm_path(Path::new("../outside")), "../outside");
        assert_eq!(Utils::norm_path(Path::new(".")), ".");
    }

    #[test]
    fn test_rel_from_root() {
        let root = Path::new("/site");
        assert_eq!(
            Utils::rel_from_root(root, Path::new("/site/images/paintings/a_thumb.png")),
            "images/paintings/a_thumb.png"
        );
        assert_eq!(Utils::rel_from_root(root, Path::new("/elsewhere/x.png")), "/elsewhere/x.png");
    }

    #[test]
    fn test_clean_rel_dir() {
        assert_eq!(Utils::clean_rel_dir("./images/paintings/thumbnails/"), "images/paintings/thumbnails");
        assert_eq!(Utils::clean_rel_dir("images\\paintings\\large"), "images/paintings/large");
    }

    #[test]
    fn test_recorded_path_exists() {
        let dir = TempDir::new().unwrap();
        let images = dir.path().join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("a_thumb.png"), b"png").unwrap();

        assert!(Utils::recorded_path_exists(dir.path(), "./images/a_thumb.png"));
        assert!(Utils::recorded_path_exists(dir.path(), "images/a_thumb.png"));
        assert!(!Utils::recorded_path_exists(dir.path(), "./images/b_thumb.png"));
        assert!(!Utils::recorded_path_exists(dir.path(), ""));
        // Directories are not assets
        assert!(!Utils::recorded_path_exists(dir.path(), "./images"));
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(Utils::csv_field("plain"), "plain");
        assert_eq!(Utils::csv_field("a,b"), "\"a,b\"");
        assert_eq!(Utils::csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(Utils::csv_row(&["thumb", "a,1", "b"]), "thumb,\"a,1\",b\r\n");
    }
}
