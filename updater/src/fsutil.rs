//! 파일시스템 헬퍼 (디렉터리 복사, zip 해제, 스테이징 경로)

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 디렉터리 전체 복사
pub fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// `dir` 옆에 만드는 임시 디렉터리 경로 (예: app → .app.staging)
pub fn sibling_path(dir: &Path, suffix: &str) -> PathBuf {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "install".to_string());
    let sibling = format!(".{}.{}", name, suffix);
    match dir.parent() {
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    }
}

/// 디렉터리가 있으면 삭제 (없으면 무시)
pub fn remove_dir_if_exists(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// zip 아카이브를 `target`에 해제. 엔트리마다 `on_entry(done, total)` 호출
///
/// 아카이브 밖으로 나가는 경로(`../` 등)를 가진 엔트리는 거부합니다.
pub fn extract_zip(
    archive_path: &Path,
    target: &Path,
    mut on_entry: impl FnMut(usize, usize),
) -> Result<usize> {
    let file = fs::File::open(archive_path)
        .with_context(|| format!("Failed to open {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)?;
    fs::create_dir_all(target)?;

    let total = archive.len();
    for i in 0..total {
        let mut entry = archive.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| anyhow::anyhow!("Unsafe path in archive: {}", entry.name()))?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&out_path)?;
            std::io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
        on_entry(i + 1, total);
    }

    Ok(total)
}

/// 디렉터리 스냅샷 (상대 경로 → 파일 크기), 테스트에서 변경 여부 비교용
#[cfg(test)]
pub fn snapshot(root: &Path) -> std::collections::BTreeMap<PathBuf, u64> {
    fn walk(root: &Path, dir: &Path, out: &mut std::collections::BTreeMap<PathBuf, u64>) {
        let Ok(entries) = fs::read_dir(dir) else { return };
        for entry in entries.flatten() {
            let path = entry.path();
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            if path.is_dir() {
                out.insert(rel, u64::MAX);
                walk(root, &path, out);
            } else {
                out.insert(rel, entry.metadata().map(|m| m.len()).unwrap_or(0));
            }
        }
    }
    let mut out = std::collections::BTreeMap::new();
    walk(root, root, &mut out);
    out
}
