//! File storage.

use base64::Engine as _;
use parsekit_engine::{Error as EngineError, FileRef};
use serde_json::{json, Value as Json};

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::{Error, Result};

impl Client {
    /// Upload `bytes` under `name`. The server may rename the file; the
    /// returned reference carries the final name and public URL.
    pub async fn upload_file(
        &self,
        name: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<FileRef> {
        validate_file_name(name)?;
        let mut body = json!({
            "base64": base64::engine::general_purpose::STANDARD.encode(bytes),
        });
        if let Some(content_type) = content_type {
            body["_ContentType"] = Json::String(content_type.to_owned());
        }

        let response = self
            .dispatcher()
            .post(&format!("files/{name}"), body, &RequestOptions::default())
            .await?;
        let stored_name = response
            .get("name")
            .and_then(Json::as_str)
            .unwrap_or(name);
        let url = response
            .get("url")
            .and_then(Json::as_str)
            .map(str::to_owned)
            .ok_or_else(|| EngineError::InvalidJson("file upload response has no url".into()))?;

        tracing::debug!(name = %stored_name, size = bytes.len(), "File uploaded");
        Ok(FileRef::new(stored_name, Some(url)))
    }

    /// Delete a stored file. Requires the master key.
    pub async fn delete_file(&self, file: &FileRef) -> Result<()> {
        if self.config().master_key.is_none() {
            return Err(Error::NotInitialized(
                "deleting files requires a master key".into(),
            ));
        }
        self.dispatcher()
            .delete(&format!("files/{}", file.name), &RequestOptions::master())
            .await?;
        Ok(())
    }
}

/// Names start with a letter, digit or underscore and continue with letters,
/// digits, spaces or `@ . ~ _ -`.
fn validate_file_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || " @.~_-".contains(c));
    if valid_first && valid_rest {
        Ok(())
    } else {
        Err(Error::InvalidFileName(name.to_owned()))
    }
}
