//! Record lifecycle: save, fetch and delete.

use async_trait::async_trait;
use parsekit_engine::{Error as EngineError, Record};

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::Result;

/// REST collection path for a class. Built-in classes have their own roots.
pub fn class_path(class_name: &str) -> String {
    match class_name {
        "_User" => "users".to_owned(),
        "_Role" => "roles".to_owned(),
        "_Session" => "sessions".to_owned(),
        "_Installation" => "installations".to_owned(),
        other => format!("classes/{other}"),
    }
}

/// REST resource path for one object.
pub fn object_path(class_name: &str, object_id: &str) -> String {
    format!("{}/{}", class_path(class_name), object_id)
}

/// Remote lifecycle operations on a [`Record`].
///
/// The `&mut` receiver means one record cannot have two operations in flight
/// at once; separate clones of a record are not coordinated.
#[async_trait]
pub trait RecordExt {
    /// Create or update the object with its pending changes.
    async fn save(&mut self, client: &Client) -> Result<()>;

    async fn save_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()>;

    /// Replace local state with the server copy. Pending edits are lost.
    async fn fetch(&mut self, client: &Client) -> Result<()>;

    async fn fetch_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()>;

    /// Delete the object. On success the record becomes a fresh unsaved shell.
    async fn delete(&mut self, client: &Client) -> Result<()>;

    async fn delete_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()>;
}

#[async_trait]
impl RecordExt for Record {
    async fn save(&mut self, client: &Client) -> Result<()> {
        self.save_with(client, &RequestOptions::default()).await
    }

    async fn save_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()> {
        let body = self.save_payload()?;
        let dispatcher = client.dispatcher();
        let response = match self.object_id() {
            Some(id) => {
                let path = object_path(self.class_name(), id);
                dispatcher.put(&path, body, options).await?
            }
            None => {
                let path = class_path(self.class_name());
                dispatcher.post(&path, body, options).await?
            }
        };
        self.apply_save_response(&response)?;
        Ok(())
    }

    async fn fetch(&mut self, client: &Client) -> Result<()> {
        self.fetch_with(client, &RequestOptions::default()).await
    }

    async fn fetch_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()> {
        let id = self.object_id().ok_or(EngineError::MissingObjectId)?;
        let path = object_path(self.class_name(), id);
        let response = client.dispatcher().get(&path, &[], options).await?;
        self.apply_fetch_response(&response)?;
        Ok(())
    }

    async fn delete(&mut self, client: &Client) -> Result<()> {
        self.delete_with(client, &RequestOptions::default()).await
    }

    async fn delete_with(&mut self, client: &Client, options: &RequestOptions) -> Result<()> {
        let id = self.object_id().ok_or(EngineError::MissingObjectId)?;
        let path = object_path(self.class_name(), id);
        client.dispatcher().delete(&path, options).await?;
        self.clear_after_delete();
        Ok(())
    }
}
