//! Tools the query agent can call.

pub mod disease;
pub mod price;
pub mod weather;

pub use disease::DiseaseLookupTool;
pub use price::MarketPriceTool;
pub use weather::WeatherForecastTool;

use async_trait::async_trait;

use crate::error::ToolError;

/// Caller facts made available to every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub phone: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A capability the agent can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name, as exposed to the model.
    fn name(&self) -> &str;

    /// Description the model sees when deciding whether to call.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool. Output is plain text fed back to the model.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<String, ToolError>;
}
