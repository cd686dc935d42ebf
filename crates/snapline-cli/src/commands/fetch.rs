use serde_json::{json, Value};
use snapline_core::{DataKind, Entity, EntityId, Period, Position, SnaplineService};

use crate::cli::FetchArgs;
use crate::error::CliError;

pub async fn run(args: &FetchArgs, service: SnaplineService) -> Result<Value, CliError> {
    let position: Position = args.position.parse()?;
    let mut entity = Entity::new(EntityId::parse(&args.entity)?, position);
    if let Some(rank) = args.rank {
        entity = entity.with_depth_rank(rank);
    }
    let period = Period::new(args.season, args.week)?;
    let kind: DataKind = args.kind.parse()?;

    let prefetch = if args.no_prefetch {
        None
    } else {
        Some(service.prefetch_once().await)
    };

    let outcome = service.fetch(&entity, period, kind).await;

    Ok(json!({
        "entity": entity,
        "period": period,
        "kind": kind,
        "outcome": outcome,
        "prefetch": prefetch,
    }))
}
