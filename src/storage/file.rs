use std::path::PathBuf;

use anyhow::bail;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use super::{is_valid_key, Storage};
use crate::AppError;

#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir: PathBuf = dir.into();

        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
        }

        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }

        Ok(FileStorage { dir })
    }

    fn path(&self, key: &str) -> crate::AppResult<PathBuf> {
        if !is_valid_key(key) {
            return Err(AppError::NotFound);
        }
        Ok(self.dir.join(key))
    }
}

impl Storage for FileStorage {
    async fn get_object(&mut self, key: &str) -> crate::AppResult<Bytes> {
        let mut buf = Vec::with_capacity(1024);
        let mut file = BufReader::new(fs::File::open(self.path(key)?).await?);
        file.read_to_end(&mut buf).await?;

        Ok(buf.into())
    }

    async fn put_object(&mut self, key: &str, data: Bytes) -> crate::AppResult<()> {
        let mut file = fs::File::create(self.path(key)?).await?;
        file.write_all(&data[..]).await?;
        file.flush().await?;

        Ok(())
    }

    async fn delete_object(&mut self, key: &str) -> crate::AppResult<()> {
        fs::remove_file(self.path(key)?).await?;

        Ok(())
    }
}
