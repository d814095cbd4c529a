use utoipa::OpenApi;

use crate::domain::{Transaction, TransactionStatus};
use crate::handlers::currency::ConversionResponse;
use crate::handlers::transactions::{
    CreateTransactionRequest, CreateTransactionResponse, MessageResponse, UpdateStatusRequest,
};
use crate::handlers::ErrorResponse;
use crate::health::HealthResponse;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Purchase Core API",
        description = "Purchase transactions with asynchronous completion and historical currency conversion."
    ),
    paths(
        crate::handlers::health,
        crate::handlers::transactions::create_transaction,
        crate::handlers::transactions::list_transactions,
        crate::handlers::transactions::get_transaction,
        crate::handlers::transactions::update_transaction_status,
        crate::handlers::currency::convert_transaction,
    ),
    components(schemas(
        Transaction,
        TransactionStatus,
        CreateTransactionRequest,
        CreateTransactionResponse,
        UpdateStatusRequest,
        MessageResponse,
        ConversionResponse,
        ErrorResponse,
        HealthResponse,
    )),
    tags(
        (name = "Transactions", description = "Purchase transaction lifecycle"),
        (name = "Currency", description = "Conversion using Treasury exchange rates"),
        (name = "Health", description = "Dependency health")
    )
)]
pub struct ApiDoc;
