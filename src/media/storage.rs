use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::types::AssetRef;

#[derive(Debug, Error)]
pub enum MediaStorageError {
    #[error("asset not found")]
    NotFound,
    #[error("invalid asset id")]
    InvalidAssetId,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaStorageError {
    fn from_io(e: std::io::Error) -> Self {
        if e.kind() == ErrorKind::NotFound {
            Self::NotFound
        } else {
            Self::Io(e)
        }
    }
}

/// Content-addressed asset store on local disk.
///
/// Asset ids are opaque UUIDs; files live under fan-out directories
/// keyed by the id's first four hex characters. Writes land in a temp
/// file and are renamed into place, so a crashed upload never leaves a
/// partial asset visible.
pub struct DiskMediaStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl DiskMediaStore {
    pub fn new(data_dir: &Path, public_base_url: &str) -> Self {
        Self {
            base_path: data_dir.join("media"),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn asset_path(&self, asset_id: &str) -> PathBuf {
        let prefix1 = &asset_id[0..2];
        let prefix2 = &asset_id[2..4];
        self.base_path
            .join("objects")
            .join(prefix1)
            .join(prefix2)
            .join(asset_id)
    }

    fn temp_path(&self) -> PathBuf {
        self.base_path.join("tmp").join(Uuid::new_v4().to_string())
    }

    fn public_url(&self, asset_id: &str) -> String {
        format!("{}/media/{}", self.public_base_url, asset_id)
    }

    /// Persists the bytes and returns a reference with a freshly minted
    /// asset id and its public URL.
    pub async fn store(&self, data: &[u8]) -> Result<AssetRef, MediaStorageError> {
        let asset_id = Uuid::new_v4().simple().to_string();

        let temp = self.temp_path();
        if let Some(parent) = temp.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(&temp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        let target = self.asset_path(&asset_id);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&temp, &target).await?;

        Ok(AssetRef {
            url: self.public_url(&asset_id),
            asset_id,
        })
    }

    /// Opens an asset for streaming. The size comes from file metadata
    /// so callers can set Content-Length.
    pub async fn open(&self, asset_id: &str) -> Result<(BufReader<File>, u64), MediaStorageError> {
        validate_asset_id(asset_id)?;
        let path = self.asset_path(asset_id);
        let file = File::open(&path).await.map_err(MediaStorageError::from_io)?;
        let size = file.metadata().await?.len();
        Ok((BufReader::new(file), size))
    }

    /// Removes an asset; returns whether it existed.
    pub async fn delete(&self, asset_id: &str) -> Result<bool, MediaStorageError> {
        validate_asset_id(asset_id)?;
        match fs::remove_file(self.asset_path(asset_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_asset_id(asset_id: &str) -> Result<(), MediaStorageError> {
    if asset_id.len() == 32 && asset_id.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(MediaStorageError::InvalidAssetId)
    }
}
