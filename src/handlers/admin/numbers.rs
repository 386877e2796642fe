use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::TicketNumber;

/// Every sold number of a raffle with its buyer, ordered by number.
pub async fn list_numbers(
    State(state): State<AppState>,
    Path(raffle_id): Path<String>,
) -> Result<Json<Vec<TicketNumber>>> {
    let conn = state.db.get()?;
    queries::get_raffle_by_id(&conn, &raffle_id)?.or_not_found(msg::RAFFLE_NOT_FOUND)?;
    Ok(Json(queries::list_raffle_numbers(&conn, &raffle_id)?))
}
