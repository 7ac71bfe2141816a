//! Cloud functions.

use parsekit_engine::{codec, Value};
use serde_json::Value as Json;

use crate::client::Client;
use crate::dispatcher::RequestOptions;
use crate::error::Result;

impl Client {
    /// Invoke the named function with `params` and decode its result.
    pub async fn run_function(&self, name: &str, params: Value) -> Result<Value> {
        self.run_function_with(name, params, &RequestOptions::default())
            .await
    }

    pub async fn run_function_with(
        &self,
        name: &str,
        params: Value,
        options: &RequestOptions,
    ) -> Result<Value> {
        let body = match params {
            Value::Null => Json::Object(Default::default()),
            params => codec::encode(&params, false)?,
        };
        let response = self
            .dispatcher()
            .post(&format!("functions/{name}"), body, options)
            .await?;
        match response.get("result") {
            Some(result) => Ok(codec::decode(result)?),
            None => Ok(Value::Null),
        }
    }
}
