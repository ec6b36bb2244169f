//! Buffered multipart form parsing for upload endpoints.

use std::collections::HashMap;

use axum::extract::Multipart;
use lectern_core::chat::Upload;

use crate::http::error::AppError;

/// All fields of a multipart form, read into memory.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Upload>,
}

impl UploadForm {
    /// Drain a multipart body. Parts with a file name are kept as uploads,
    /// everything else as UTF-8 text.
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read '{name}': {e}"))
                    })?;
                    // Browsers send an empty part for an untouched file input.
                    if file_name.is_empty() && bytes.is_empty() {
                        continue;
                    }
                    form.files.insert(name, Upload::new(file_name, bytes.to_vec()));
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        AppError::Validation(format!("Failed to read '{name}': {e}"))
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn require_text(&self, name: &str) -> Result<&str, AppError> {
        self.text(name)
            .ok_or_else(|| AppError::Validation(format!("Missing form field '{name}'")))
    }

    /// Take an uploaded file out of the form.
    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}
