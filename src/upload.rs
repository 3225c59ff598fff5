use actix_multipart::{Field, Multipart, MultipartError};
use chrono::Utc;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::response::ApiError;

/// Имя поля формы с картинкой
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct UploadStore {
    config: UploadConfig,
}

/// Загруженный файл. Удаляется с диска при drop.
#[derive(Debug)]
pub struct StoredUpload {
    path: PathBuf,
    mime: String,
    size: usize,
}

impl StoredUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

// Удаление синхронное: drop не может быть async, а файл маленький и локальный
impl Drop for StoredUpload {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Upload {} removed", self.path.display()),
            Err(e) => log::error!("Failed to remove upload {}: {}", self.path.display(), e),
        }
    }
}

impl UploadStore {
    pub fn new(config: UploadConfig) -> Self {
        Self { config }
    }

    /// Принять multipart запрос и сохранить поле `image` во временный файл
    pub async fn receive(&self, mut payload: Multipart) -> Result<StoredUpload, ApiError> {
        let mut fields_seen = 0usize;

        loop {
            let mut field = match payload.try_next().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                // Нет формы вообще = файл не загружен
                Err(e) if fields_seen == 0 && is_missing_form(&e) => {
                    log::debug!("Request carries no multipart form: {}", e);
                    return Err(ApiError::NoFile);
                }
                Err(e) => return Err(malformed(e)),
            };
            fields_seen += 1;

            let is_image = field.content_disposition().get_name() == Some(IMAGE_FIELD);
            if !is_image {
                // Остальные поля пропускаем
                while field.try_next().await.map_err(malformed)?.is_some() {}
                continue;
            }

            return self.store_field(field).await;
        }

        Err(ApiError::NoFile)
    }

    async fn store_field(&self, mut field: Field) -> Result<StoredUpload, ApiError> {
        let mime = field
            .content_type()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();

        // Тип проверяем до записи на диск
        if !self.config.is_type_allowed(&mime) {
            return Err(ApiError::InvalidFileType(mime));
        }

        let file_name = field.content_disposition().get_filename().map(str::to_string);
        let extension = pick_extension(file_name.as_deref(), &mime);

        tokio::fs::create_dir_all(&self.config.dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create upload dir: {}", e))?;

        let path = self.config.dir.join(unique_name(extension));
        let mut file = tokio::fs::File::create(&path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create upload file: {}", e))?;

        // С этого момента файл удалится при любом исходе
        let mut upload = StoredUpload {
            path,
            mime,
            size: 0,
        };

        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            upload.size += chunk.len();
            if upload.size > self.config.max_file_size {
                return Err(ApiError::FileTooLarge(self.config.max_file_size));
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to write upload: {}", e))?;
        }

        file.flush()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to flush upload: {}", e))?;

        log::info!(
            "Stored upload {} ({}, {} bytes)",
            upload.path.display(),
            upload.mime,
            upload.size
        );

        Ok(upload)
    }
}

fn malformed(e: MultipartError) -> ApiError {
    ApiError::MalformedUpload(e.to_string())
}

/// Ошибки, которые означают отсутствие multipart формы, а не ее порчу
fn is_missing_form(e: &MultipartError) -> bool {
    matches!(
        e,
        MultipartError::NoContentType | MultipartError::Boundary | MultipartError::Incomplete
    )
}

/// Метка времени + случайный суффикс, чтобы параллельные запросы не пересекались
fn unique_name(extension: &str) -> String {
    format!(
        "{}-{}.{}",
        Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

fn pick_extension(file_name: Option<&str>, mime: &str) -> &'static str {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match from_name.as_deref() {
        Some("png") => "png",
        Some("jpg") => "jpg",
        Some("jpeg") => "jpeg",
        _ if mime == "image/png" => "png",
        _ => "jpg",
    }
}
