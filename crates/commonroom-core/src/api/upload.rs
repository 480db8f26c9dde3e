use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};

/// Multipart body for creating a resource: plain text fields plus any
/// number of file parts.
#[derive(Debug, Clone, Default)]
pub struct ResourceUpload {
    fields: Vec<(String, String)>,
    files: Vec<FilePart>,
}

#[derive(Debug, Clone)]
struct FilePart {
    field: String,
    file_name: String,
    bytes: Vec<u8>,
    mime: Option<String>,
}

impl ResourceUpload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        mime: Option<&str>,
    ) -> Self {
        self.files.push(FilePart {
            field: field.into(),
            file_name: file_name.into(),
            bytes,
            mime: mime.map(str::to_string),
        });
        self
    }

    /// Read a file from disk, guessing its MIME type from the extension.
    pub fn file_from_path(self, field: impl Into<String>, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow::anyhow!("Not a file path: {}", path.display()))?;
        let mime = guess_mime(path);
        Ok(self.file(field, file_name, bytes, mime))
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for file in self.files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime) = file.mime {
                part = part
                    .mime_str(&mime)
                    .with_context(|| format!("Invalid MIME type: {}", mime))?;
            }
            form = form.part(file.field, part);
        }
        Ok(form)
    }
}

fn guess_mime(path: &Path) -> Option<&'static str> {
    mime_guess::from_path(path).first_raw()
}
