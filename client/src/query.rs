//! Query execution.

use async_trait::async_trait;
use parsekit_engine::{Error as EngineError, Query, Record};
use serde_json::Value as Json;

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::Result;
use crate::object::{class_path, object_path};

/// Runs a [`Query`] against a backend.
#[async_trait]
pub trait QueryExt {
    /// All matching objects, in server order.
    async fn find(&self, client: &Client) -> Result<Vec<Record>>;

    async fn find_with(&self, client: &Client, options: &RequestOptions) -> Result<Vec<Record>>;

    /// The first match, if any.
    async fn first(&self, client: &Client) -> Result<Option<Record>>;

    /// Number of matches as reported by the server.
    async fn count(&self, client: &Client) -> Result<u64>;

    /// Fetch one object by id. A missing object yields `None`, not an error.
    async fn get(&self, client: &Client, object_id: &str) -> Result<Option<Record>>;
}

#[async_trait]
impl QueryExt for Query {
    async fn find(&self, client: &Client) -> Result<Vec<Record>> {
        self.find_with(client, &RequestOptions::default()).await
    }

    async fn find_with(&self, client: &Client, options: &RequestOptions) -> Result<Vec<Record>> {
        let params = self.to_params()?;
        let response = client
            .dispatcher()
            .get(&class_path(self.class_name()), &params, options)
            .await?;
        let results = response
            .get("results")
            .and_then(Json::as_array)
            .ok_or_else(|| EngineError::InvalidJson("query response has no results".into()))?;

        let records = results
            .iter()
            .map(|item| Record::from_wire_format(Some(self.class_name()), item))
            .collect::<parsekit_engine::error::Result<Vec<_>>>()?;
        tracing::debug!(class = %self.class_name(), count = records.len(), "Query returned");
        Ok(records)
    }

    async fn first(&self, client: &Client) -> Result<Option<Record>> {
        let limited = self.clone().limit(1);
        Ok(limited.find(client).await?.into_iter().next())
    }

    async fn count(&self, client: &Client) -> Result<u64> {
        let params = self.to_count_params()?;
        let response = client
            .dispatcher()
            .get(&class_path(self.class_name()), &params, &RequestOptions::default())
            .await?;
        let count = response
            .get("count")
            .and_then(Json::as_u64)
            .ok_or_else(|| EngineError::InvalidJson("count response has no count".into()))?;
        Ok(count)
    }

    async fn get(&self, client: &Client, object_id: &str) -> Result<Option<Record>> {
        let path = object_path(self.class_name(), object_id);
        let params = self.to_get_params();
        match client
            .dispatcher()
            .get(&path, &params, &RequestOptions::default())
            .await
        {
            Ok(response) => Ok(Some(Record::from_wire_format(
                Some(self.class_name()),
                &response,
            )?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
