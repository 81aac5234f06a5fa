//! The narrow data-access seam services depend on.
//!
//! [`SupabaseClient`] implements it over HTTP. The in-memory
//! [`FakeBackend`](crate::fake::FakeBackend) implements it for tests.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::supabase::{
    FunctionError, MutationOptions, QueryOptions, QueryResponse, RestError, SupabaseClient,
};

/// Query, mutate and invoke against a PostgREST-style backend.
pub trait Backend: Send + Sync {
    /// Run a query and return the raw JSON body.
    fn query(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<QueryResponse<Value>, RestError>> + Send;

    /// Run an insert, update or delete.
    fn mutate(
        &self,
        table: &str,
        options: &MutationOptions,
    ) -> impl Future<Output = Result<Option<Value>, RestError>> + Send;

    /// Invoke an Edge Function.
    fn invoke(
        &self,
        function: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Value, FunctionError>> + Send;

    /// Query and decode the rows. An empty body is an empty list.
    fn select<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<Vec<T>, RestError>> + Send {
        async move {
            let response = self.query(table, options).await?;
            match response.data {
                None | Some(Value::Null) => Ok(Vec::new()),
                Some(rows) => {
                    serde_json::from_value(rows).map_err(|e| RestError::Parse(e.to_string()))
                }
            }
        }
    }

    /// Query and decode the first row, if any.
    fn select_one<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<Option<T>, RestError>> + Send {
        async move {
            let rows: Vec<T> = self.select(table, options).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Mutate with `returning` and decode the first affected row.
    fn mutate_one<T: DeserializeOwned + Send>(
        &self,
        table: &str,
        options: &MutationOptions,
    ) -> impl Future<Output = Result<Option<T>, RestError>> + Send {
        async move {
            let rows = match self.mutate(table, options).await? {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Array(rows)) => rows,
                Some(row) => vec![row],
            };
            rows.into_iter()
                .next()
                .map(serde_json::from_value)
                .transpose()
                .map_err(|e| RestError::Parse(e.to_string()))
        }
    }

    /// Invoke a function and decode its response.
    fn call<T: DeserializeOwned + Send>(
        &self,
        function: &str,
        body: &Value,
    ) -> impl Future<Output = Result<T, FunctionError>> + Send {
        async move {
            let value = self.invoke(function, body).await?;
            serde_json::from_value(value).map_err(|e| FunctionError::Parse {
                function: function.to_string(),
                message: e.to_string(),
            })
        }
    }
}

impl Backend for SupabaseClient {
    fn query(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<QueryResponse<Value>, RestError>> + Send {
        Self::query::<Value>(self, table, options)
    }

    fn mutate(
        &self,
        table: &str,
        options: &MutationOptions,
    ) -> impl Future<Output = Result<Option<Value>, RestError>> + Send {
        Self::mutate(self, table, options)
    }

    fn invoke(
        &self,
        function: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Value, FunctionError>> + Send {
        Self::invoke::<Value, Value>(self, function, body)
    }
}
