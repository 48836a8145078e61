use std::io::Read;
use std::path::{Path, PathBuf};

pub fn absolute_path(path: PathBuf) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// Resolves `path` against `base` unless it is already absolute.
pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Reads at most `count` bytes from `source` and returns them.
pub fn read_at_most<R: Read>(source: R, count: usize) -> std::io::Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::with_capacity(count);
    source.take(count as u64).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Creates the parent directory of `path` if it does not exist yet.
pub fn create_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Creates the first non-existing directory `<base>/<n>` for n = 0, 1, ...
pub fn create_numbered_dir(base: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(base)?;
    let mut counter: u64 = 0;
    loop {
        let dir = base.join(counter.to_string());
        match std::fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => counter += 1,
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::common::utils::fs::{create_numbered_dir, read_at_most, resolve_path};
    use std::path::Path;

    #[test]
    fn test_numbered_dirs() {
        let tmp = tempfile::TempDir::with_prefix("jobdesc-test").unwrap();
        let base = tmp.path().join("job");
        assert_eq!(create_numbered_dir(&base).unwrap(), base.join("0"));
        assert_eq!(create_numbered_dir(&base).unwrap(), base.join("1"));
        std::fs::remove_dir(base.join("0")).unwrap();
        assert_eq!(create_numbered_dir(&base).unwrap(), base.join("0"));
    }

    #[test]
    fn test_read_at_most() {
        let data = b"#!/bin/bash\n#SBATCH -J x\n";
        assert_eq!(read_at_most(&data[..], 4).unwrap(), b"#!/b");
        assert_eq!(read_at_most(&data[..], 1000).unwrap(), data);
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            resolve_path(Path::new("/work"), Path::new("logs/a.out")),
            Path::new("/work/logs/a.out")
        );
        assert_eq!(
            resolve_path(Path::new("/work"), Path::new("/tmp/a.out")),
            Path::new("/tmp/a.out")
        );
    }
}
