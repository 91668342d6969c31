use std::io;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::fs;

const MAX_EXTENSION_LEN: usize = 8;
const FALLBACK_EXTENSION: &str = "bin";

/// Extension hint for the workspace input file, taken from the client's
/// declared filename. Only short alphanumeric extensions survive.
pub fn sanitize_extension(declared_filename: Option<&str>) -> String {
    declared_filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Move a spooled upload into the workspace input path.
///
/// Tries a rename first. When the spool directory is on another filesystem
/// (EXDEV) the bytes are copied instead and the spooled file is dropped.
pub async fn store_upload(spooled: NamedTempFile, dest: &Path) -> io::Result<u64> {
    match spooled.persist(dest) {
        Ok(file) => Ok(file.metadata()?.len()),
        Err(persist_err) if is_cross_device_error(&persist_err.error) => {
            tracing::debug!(
                "Cross-device persist, copying upload to {}",
                dest.display()
            );
            let spooled = persist_err.file;
            let copied = fs::copy(spooled.path(), dest).await?;
            drop(spooled);
            Ok(copied)
        }
        Err(persist_err) => Err(persist_err.error),
    }
}

fn is_cross_device_error(e: &io::Error) -> bool {
    // EXDEV
    e.raw_os_error() == Some(18)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extension_hint_is_sanitized() {
        assert_eq!(sanitize_extension(Some("holiday.MP4")), "mp4");
        assert_eq!(sanitize_extension(Some("clip.mov")), "mov");
        assert_eq!(sanitize_extension(Some("no_extension")), "bin");
        assert_eq!(sanitize_extension(Some("evil.m p4")), "bin");
        assert_eq!(sanitize_extension(Some("x.averyverylongext")), "bin");
        assert_eq!(sanitize_extension(Some("../../etc/passwd")), "bin");
        assert_eq!(sanitize_extension(None), "bin");
    }

    #[actix_web::test]
    async fn store_upload_moves_spooled_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut spooled = NamedTempFile::new_in(dir.path()).unwrap();
        spooled.write_all(b"video bytes").unwrap();
        let spooled_path = spooled.path().to_path_buf();

        let dest = dir.path().join("input.mp4");
        let size = store_upload(spooled, &dest).await.unwrap();

        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&dest).unwrap(), b"video bytes");
        assert!(!spooled_path.exists());
    }

    #[actix_web::test]
    async fn store_upload_fails_for_missing_destination_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spooled = NamedTempFile::new_in(dir.path()).unwrap();
        let dest = dir.path().join("missing").join("input.mp4");
        assert!(store_upload(spooled, &dest).await.is_err());
    }
}
