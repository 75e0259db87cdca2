//! 简历文件解析
//!
//! 简历引用可以是远程地址（下载到本地临时目录）或本地路径。
//! 下载的文件在尝试结束后由 [`ResumeFile::discard`] 删除，本地文件保持不变。

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{AppResult, AutomationError};

/// 已解析的简历文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeFile {
    path: PathBuf,
    downloaded: bool,
}

impl ResumeFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_downloaded(&self) -> bool {
        self.downloaded
    }

    /// 删除下载的临时文件
    pub async fn discard(self) {
        if !self.downloaded {
            return;
        }
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("已删除临时简历: {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("⚠️ 删除临时简历失败 {}: {}", self.path.display(), e),
        }
    }
}

/// 简历文件解析器
#[derive(Clone)]
pub struct ResumeResolver {
    http: reqwest::Client,
    download_dir: PathBuf,
}

impl ResumeResolver {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::new(),
            download_dir: download_dir.into(),
        }
    }

    /// 将简历引用解析为本地文件
    pub async fn resolve(&self, asset_ref: &str, application_id: &str) -> AppResult<ResumeFile> {
        if asset_ref.starts_with("http://") || asset_ref.starts_with("https://") {
            let path = self.download(asset_ref, application_id).await?;
            return Ok(ResumeFile {
                path,
                downloaded: true,
            });
        }

        let path = Path::new(asset_ref);
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(ResumeFile {
                path: path.to_path_buf(),
                downloaded: false,
            }),
            Ok(_) => Err(unavailable(asset_ref, "不是文件")),
            Err(e) => Err(unavailable(asset_ref, e)),
        }
    }

    async fn download(&self, url: &str, application_id: &str) -> AppResult<PathBuf> {
        debug!("下载简历: {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| unavailable(url, e))?;
        let bytes = response.bytes().await.map_err(|e| unavailable(url, e))?;

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| unavailable(url, e))?;
        let path = self
            .download_dir
            .join(format!("resume_{}{}", sanitize(application_id), extension_of(url)));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| unavailable(url, e))?;
        Ok(path)
    }
}

fn unavailable(asset: &str, reason: impl ToString) -> crate::error::AppError {
    AutomationError::ResumeUnavailable {
        asset: asset.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// 文件名只保留安全字符
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// 从地址推断扩展名，默认 .pdf
fn extension_of(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    if path.ends_with(".docx") {
        ".docx"
    } else if path.ends_with(".doc") {
        ".doc"
    } else {
        ".pdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("https://cdn.example.com/cv.docx?token=1"), ".docx");
        assert_eq!(extension_of("https://cdn.example.com/cv"), ".pdf");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("abc/../x"), "abc____x");
    }

    #[tokio::test]
    async fn test_local_file_is_used_in_place() {
        let dir = std::env::temp_dir().join("auto_apply_resume_test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("cv.pdf");
        tokio::fs::write(&file, b"%PDF-1.4").await.unwrap();

        let resolver = ResumeResolver::new(&dir);
        let resolved = resolver.resolve(file.to_str().unwrap(), "a1").await.unwrap();
        assert_eq!(resolved.path(), file.as_path());
        assert!(!resolved.is_downloaded());

        // 本地文件不会被删除
        resolved.discard().await;
        assert!(tokio::fs::metadata(&file).await.is_ok());
    }

    #[tokio::test]
    async fn test_downloaded_file_is_discarded() {
        let dir = std::env::temp_dir().join("auto_apply_resume_discard_test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("resume_a2.pdf");
        tokio::fs::write(&path, b"%PDF-1.4").await.unwrap();

        let downloaded = ResumeFile {
            path: path.clone(),
            downloaded: true,
        };
        downloaded.clone().discard().await;
        assert!(tokio::fs::metadata(&path).await.is_err());

        // 重复删除不报错
        downloaded.discard().await;
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let resolver = ResumeResolver::new(std::env::temp_dir());
        let err = resolver
            .resolve("/definitely/not/here/cv.pdf", "a1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here/cv.pdf"));
    }
}
