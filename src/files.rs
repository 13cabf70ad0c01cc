//! 파일 저장소
//!
//! 요청된 파일 이름을 기준 디렉터리 아래로 한정해서 찾음

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::{Error, Result};

/// 전송 가능한 파일
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    /// 정규화된 경로
    pub path: PathBuf,

    /// 파일 크기 (바이트)
    pub len: u64,
}

impl ResolvedFile {
    /// 읽기용으로 열기
    pub async fn open(&self) -> io::Result<File> {
        File::open(&self.path).await
    }
}

/// 기준 디렉터리 기반 파일 저장소
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 파일 이름을 일반 파일로 해석
    ///
    /// 디렉터리 밖을 가리키거나, 존재하지 않거나, 일반 파일이 아니면 FileNotFound
    pub async fn resolve(&self, name: &str) -> Result<ResolvedFile> {
        let relative = Path::new(name);
        if name.is_empty()
            || !relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
        {
            return Err(Error::InvalidFilename(name.to_string()));
        }

        let not_found = |_| Error::FileNotFound(name.to_string());

        // 심볼릭 링크로 빠져나가는 경우까지 막기 위해 정규화 후 비교
        let base = tokio::fs::canonicalize(&self.base_dir).await?;
        let path = tokio::fs::canonicalize(base.join(relative))
            .await
            .map_err(not_found)?;
        if !path.starts_with(&base) {
            return Err(Error::FileNotFound(name.to_string()));
        }

        let metadata = tokio::fs::metadata(&path).await.map_err(not_found)?;
        if !metadata.is_file() {
            return Err(Error::FileNotFound(name.to_string()));
        }

        Ok(ResolvedFile {
            path,
            len: metadata.len(),
        })
    }
}

/// 버퍼가 가득 차거나 EOF에 닿을 때까지 읽기
pub async fn read_full(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
