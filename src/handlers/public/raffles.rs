use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::models::{Package, PublicInstantPrize, Quote, RaffleStatus, RaffleView};

/// Raffle page: figures, pricing tiers and instant-win numbers.
#[derive(Debug, Serialize)]
pub struct RaffleDetail {
    #[serde(flatten)]
    pub raffle: RaffleView,
    pub packages: Vec<Package>,
    pub instant_prizes: Vec<PublicInstantPrize>,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub quantity: i64,
}

pub async fn list_raffles(State(state): State<AppState>) -> Result<Json<Vec<RaffleView>>> {
    let conn = state.db.get()?;
    let raffles = queries::list_raffles(&conn, Some(RaffleStatus::Active))?;
    Ok(Json(raffles.into_iter().map(RaffleView::from).collect()))
}

/// Drafts are not visible to the storefront.
pub async fn get_raffle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RaffleDetail>> {
    let conn = state.db.get()?;
    let raffle = queries::get_raffle_by_id(&conn, &id)?
        .filter(|r| r.status != RaffleStatus::Draft)
        .or_not_found(msg::RAFFLE_NOT_FOUND)?;

    let packages = queries::list_packages(&conn, &raffle.id)?;
    let instant_prizes = queries::list_instant_prizes(&conn, &raffle.id)?
        .iter()
        .map(PublicInstantPrize::from)
        .collect();

    Ok(Json(RaffleDetail {
        raffle: raffle.into(),
        packages,
        instant_prizes,
    }))
}

pub async fn quote_raffle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Quote>> {
    let conn = state.db.get()?;
    let raffle = queries::get_raffle_by_id(&conn, &id)?
        .filter(|r| r.status != RaffleStatus::Draft)
        .or_not_found(msg::RAFFLE_NOT_FOUND)?;
    let packages = queries::list_packages(&conn, &raffle.id)?;
    Ok(Json(Quote::compute(&raffle, &packages, query.quantity)?))
}
