use serde_json::{json, Value};
use snapline_core::{EndpointKey, SnaplineService};

use crate::cli::RefreshArgs;
use crate::error::CliError;

pub async fn run(args: &RefreshArgs, service: SnaplineService) -> Result<Value, CliError> {
    let endpoint = EndpointKey::parse(&args.endpoint)?;

    let outcome = service
        .trigger_immediate_refresh(&endpoint)
        .await
        .map_err(|source| CliError::Fetch {
            endpoint: endpoint.to_string(),
            source,
        })?;

    Ok(json!({
        "refresh": outcome,
        "attempts": service.executor().stats(&endpoint),
        "breakers": service.breaker_snapshot(),
    }))
}
