//! Query execution against the warehouse's HTTP interface.
//!
//! Execution is outside the refinement core: the loop hands an approved,
//! safety-checked query to a [`QueryExecutor`] and renders whatever comes
//! back. Failures are recovered as an empty result set, never propagated.

use crate::config::Config;
use crate::error::AssistantError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error};

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run a query and return its rows as JSON objects. An empty vector means
    /// either no rows or a recovered execution failure.
    async fn execute(&self, sql_query: &str) -> Vec<Value>;
}

/// Client for a ClickHouse-style HTTP endpoint returning JSONEachRow.
pub struct WarehouseClient {
    base_url: String,
    user: String,
    password: String,
    database: String,
    http_client: reqwest::Client,
}

impl WarehouseClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.warehouse_url.trim_end_matches('/').to_string(),
            user: config.warehouse_user.clone(),
            password: config.warehouse_password.clone(),
            database: config.warehouse_database.clone(),
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.request_timeout_seconds))
                .build()
                .unwrap_or_default(),
        }
    }

    async fn run(&self, sql_query: &str) -> anyhow::Result<Vec<Value>> {
        let body = format!("{} FORMAT JSONEachRow", sql_query.trim_end_matches(';'));
        let response = self
            .http_client
            .post(&self.base_url)
            .query(&[("database", self.database.as_str())])
            .header("X-ClickHouse-User", &self.user)
            .header("X-ClickHouse-Key", &self.password)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AssistantError::Execution(format!(
                "warehouse rejected the query: {}",
                detail.lines().next().unwrap_or("unknown error")
            ))
            .into());
        }

        let text = response.text().await?;
        let mut rows = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            rows.push(serde_json::from_str(line)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl QueryExecutor for WarehouseClient {
    async fn execute(&self, sql_query: &str) -> Vec<Value> {
        match self.run(sql_query).await {
            Ok(rows) => {
                debug!("Query returned {} rows", rows.len());
                rows
            }
            Err(e) => {
                error!("Error executing query: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn client_for(url: &str) -> WarehouseClient {
        let mut cfg = config::test_config();
        cfg.warehouse_url = url.to_string();
        WarehouseClient::new(&cfg)
    }

    #[tokio::test]
    async fn test_execute_parses_json_each_row() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body("{\"name\":\"a\",\"total\":3}\n{\"name\":\"b\",\"total\":5}\n")
            .create_async()
            .await;

        let rows = client_for(&server.url()).execute("SELECT name, total FROM t").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "a");
    }

    #[tokio::test]
    async fn test_execution_failure_recovered_as_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", mockito::Matcher::Any)
            .with_status(500)
            .with_body("DB::Exception: Table t does not exist")
            .create_async()
            .await;

        let rows = client_for(&server.url()).execute("SELECT 1 FROM t").await;
        assert!(rows.is_empty());
    }
}
