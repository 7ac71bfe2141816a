//! Schema maintenance.
//!
//! Administrative calls used by test and maintenance tooling. All of them
//! need the master key.

use parsekit_engine::{Error as EngineError, Record};
use serde_json::Value as Json;

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::{Error, Result};
use crate::object::RecordExt;

impl Client {
    /// Every class schema known to the server.
    pub async fn schemas(&self) -> Result<Vec<Json>> {
        self.require_master_key()?;
        let response = self
            .dispatcher()
            .get("schemas", &[], &RequestOptions::master())
            .await?;
        match response.get("results") {
            Some(Json::Array(results)) => Ok(results.clone()),
            _ => Err(EngineError::InvalidJson("schema response has no results".into()).into()),
        }
    }

    /// Drop a class schema. The server refuses while the class still has objects.
    pub async fn delete_schema(&self, class_name: &str) -> Result<()> {
        self.require_master_key()?;
        self.dispatcher()
            .delete(&format!("schemas/{class_name}"), &RequestOptions::master())
            .await?;
        tracing::info!(class = %class_name, "Schema deleted");
        Ok(())
    }

    fn require_master_key(&self) -> Result<()> {
        match self.config().master_key {
            Some(_) => Ok(()),
            None => Err(Error::NotInitialized(
                "schema maintenance requires a master key".into(),
            )),
        }
    }
}

/// Delete every record, skipping failures.
///
/// Failures are logged and swallowed. Returns how many deletes succeeded.
pub async fn delete_all(client: &Client, records: &mut [Record]) -> usize {
    let options = if client.config().master_key.is_some() {
        RequestOptions::master()
    } else {
        RequestOptions::default()
    };

    let mut deleted = 0;
    for record in records.iter_mut() {
        let class = record.class_name().to_owned();
        let id = record.object_id().map(str::to_owned);
        match record.delete_with(client, &options).await {
            Ok(()) => deleted += 1,
            Err(e) => tracing::warn!(
                class = %class,
                object_id = ?id,
                error = %e,
                "Ignoring failed delete during cleanup"
            ),
        }
    }
    deleted
}
