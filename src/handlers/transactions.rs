use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{Transaction, TransactionStatus};
use crate::error::AppError;
use crate::handlers::ErrorResponse;
use crate::validation::parse_date;
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    #[schema(example = "Laptop")]
    pub description: String,
    #[schema(example = "2024-01-10")]
    pub transaction_date: String,
    #[schema(value_type = String, example = "100.00")]
    pub amount_usd: BigDecimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateTransactionResponse {
    pub id: Uuid,
    pub status: TransactionStatus,
    pub message: String,
    /// `false` when the completion message could not be queued.
    pub queued: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    #[schema(example = "COMPLETED")]
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct Pagination {
    /// Page size, 1 to 100 (default 20).
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    fn resolve(&self) -> Result<(i64, i64), AppError> {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation(
                "offset must be zero or greater".to_string(),
            ));
        }
        Ok((limit, offset))
    }
}

pub(crate) fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|e| AppError::Validation(format!("invalid transaction id: {}", e.body_text())))
}

#[utoipa::path(
    post,
    path = "/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction stored", body = CreateTransactionResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    payload: Result<Json<CreateTransactionRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let transaction_date = parse_date("transaction_date", &request.transaction_date)?;

    let outcome = state
        .transactions
        .create(&request.description, transaction_date, &request.amount_usd)
        .await?;

    let message = if outcome.queued {
        "Transaction created and queued for processing"
    } else {
        "Transaction created; queueing failed, it stays PENDING"
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateTransactionResponse {
            id: outcome.transaction.id,
            status: outcome.transaction.status,
            message: message.to_string(),
            queued: outcome.queued,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/transactions",
    params(Pagination),
    responses(
        (status = 200, description = "Transactions, newest first", body = [Transaction])
    ),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let (limit, offset) = pagination.resolve()?;
    let transactions = state.transactions.list(limit, offset).await?;
    Ok(Json(transactions))
}

#[utoipa::path(
    get,
    path = "/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction found", body = Transaction),
        (status = 404, description = "Unknown transaction", body = ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_id(path)?;
    let transaction = state.transactions.get_by_id(id).await?;
    Ok(Json(transaction))
}

#[utoipa::path(
    patch,
    path = "/transactions/{id}/status",
    params(("id" = Uuid, Path, description = "Transaction id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status applied", body = MessageResponse),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 404, description = "Unknown transaction", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    ),
    tag = "Transactions"
)]
pub async fn update_transaction_status(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let id = path_id(path)?;
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let status = TransactionStatus::from_str(&request.status)?;

    state.transactions.update_status(id, status).await?;

    Ok(Json(MessageResponse {
        message: format!("Transaction status updated to {}", status),
    }))
}
