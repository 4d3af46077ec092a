use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const TEMP_SUFFIX: &str = ".tmp";

/// Writes through a sibling temp file and renames it over the target, so
/// readers see either the old contents or the new ones. The target is never
/// removed first.
pub(crate) fn write_text_atomic(path: &Path, text: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, text.as_bytes())?;
    replace_file(&tmp_path, path)
}

fn replace_file(tmp_path: &Path, final_path: &Path) -> io::Result<()> {
    if let Err(error) = fs::rename(tmp_path, final_path) {
        let _ = fs::remove_file(tmp_path);
        return Err(error);
    }
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("area");
    let tmp_name = format!("{file_name}{TEMP_SUFFIX}");
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn writes_new_file_and_creates_parent() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("nested").join("area_0_0.json");

        write_text_atomic(&path, "{}").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "{}");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn replaces_existing_contents() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("area_1_1.json");
        fs::write(&path, "old").expect("seed");

        write_text_atomic(&path, "new").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new");
        assert!(!temp_path_for(&path).exists());
    }

    #[test]
    fn failed_replace_keeps_the_target_and_drops_the_temp_file() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("area_2_2.json");
        fs::create_dir(&path).expect("target dir");
        fs::write(path.join("keep.txt"), "kept").expect("seed");

        assert!(write_text_atomic(&path, "new").is_err());
        assert_eq!(
            fs::read_to_string(path.join("keep.txt")).expect("read"),
            "kept"
        );
        assert!(!temp_path_for(&path).exists());
    }
}
