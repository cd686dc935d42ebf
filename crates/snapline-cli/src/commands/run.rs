use serde_json::{json, Value};
use snapline_core::SnaplineService;
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;

pub async fn run(args: &RunArgs, service: SnaplineService) -> Result<Value, CliError> {
    if args.once {
        let report = service.prefetch_once().await;
        return Ok(json!({
            "cycle": report,
            "breakers": service.breaker_snapshot(),
        }));
    }

    service.start_scheduler();
    info!("prefetch scheduler running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("shutdown requested");
    service.stop_scheduler().await;

    Ok(json!({
        "stopped": true,
        "cached_records": service.store().len(),
        "breakers": service.breaker_snapshot(),
    }))
}
