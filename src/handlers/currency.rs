use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::CurrencyConversion;
use crate::error::AppError;
use crate::handlers::transactions::path_id;
use crate::handlers::ErrorResponse;
use crate::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ConvertParams {
    /// Treasury `country_currency_desc`, e.g. `Euro Zone-Euro`.
    pub currency: Option<String>,
}

/// Decimal amounts are rendered as strings to keep their scale.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversionResponse {
    pub transaction_id: Uuid,
    pub description: String,
    pub transaction_date: NaiveDate,
    #[schema(example = "100.00")]
    pub original_amount_usd: String,
    #[schema(example = "0.8500")]
    pub exchange_rate: String,
    pub exchange_date: NaiveDate,
    pub target_currency: String,
    #[schema(example = "85.0000")]
    pub converted_amount: String,
}

impl From<CurrencyConversion> for ConversionResponse {
    fn from(c: CurrencyConversion) -> Self {
        Self {
            transaction_id: c.transaction_id,
            description: c.description,
            transaction_date: c.transaction_date,
            original_amount_usd: c.original_amount.to_string(),
            exchange_rate: c.exchange_rate.to_string(),
            exchange_date: c.exchange_date,
            target_currency: c.target_currency,
            converted_amount: c.converted_amount.to_string(),
        }
    }
}

#[utoipa::path(
    get,
    path = "/transactions/{id}/convert",
    params(("id" = Uuid, Path, description = "Transaction id"), ConvertParams),
    responses(
        (status = 200, description = "Converted amount", body = ConversionResponse),
        (status = 400, description = "Unknown or missing currency", body = ErrorResponse),
        (status = 404, description = "Unknown transaction", body = ErrorResponse),
        (status = 422, description = "No rate within six months", body = ErrorResponse)
    ),
    tag = "Currency"
)]
pub async fn convert_transaction(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Query(params): Query<ConvertParams>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_id(path)?;
    let currency = params.currency.unwrap_or_default();

    let conversion = state.currency.convert(id, &currency).await?;
    Ok(Json(ConversionResponse::from(conversion)))
}
