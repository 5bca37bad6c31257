use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::Operator,
    error::AppError,
    mail::{dispatch, ticket_email},
    orders::assembler::OrderChannel,
    state::AppState,
};

use super::dto::{
    total_pages, CreateOrderRequest, EventOrders, InstantOrderRequest, OrderCreated, OrdersPage,
    PageParams,
};
use super::services::{optional, place_order, required, PlaceOrder};

const DEFAULT_INSTANT_TICKET_TYPE: &str = "regular";

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(list_orders))
        .route("/orders/:event_id", get(orders_for_event))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/order", post(create_order))
        .route("/instant-order", post(create_instant_order))
}

#[instrument(skip(state, params))]
pub async fn list_orders(
    State(state): State<AppState>,
    Operator(operator): Operator,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<OrdersPage>, AppError> {
    let Query(p) = params.map_err(|_| {
        AppError::Validation(
            "Invalid pagination parameters. Page and page_size should be positive integers.".into(),
        )
    })?;
    p.validate()?;

    let data = state.store.list_orders(p.page_size, p.offset()).await?;
    let total_orders = state.store.count_orders().await?;
    Ok(Json(OrdersPage {
        success: true,
        data,
        page: p.page,
        page_size: p.page_size,
        total_orders,
        total_pages: total_pages(total_orders, p.page_size),
        message: "Orders retrieved successfully".into(),
    }))
}

#[instrument(skip(state))]
pub async fn orders_for_event(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventOrders>, AppError> {
    if state.store.find_event(event_id).await?.is_none() {
        return Err(AppError::NotFound("Event not found".into()));
    }
    let data = state.store.orders_for_event(event_id).await?;
    Ok(Json(EventOrders {
        success: true,
        data,
        message: "Orders retrieved successfully".into(),
    }))
}

#[instrument(skip(state, body))]
pub async fn create_order(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Json(body): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreated>), AppError> {
    let event_name = required("event_name", body.event_name.as_deref())?;
    let user_name = required("user_name", body.user_name.as_deref())?;
    let price = body
        .price
        .ok_or_else(|| AppError::Validation("Missing required field: price".into()))?;
    let phone = required("phone", body.phone.as_deref())?;
    let ticket_type = required("ticket_type", body.ticket_type.as_deref())?;

    let placed = place_order(
        &state,
        PlaceOrder {
            channel: OrderChannel::Standard,
            event_name,
            user_name,
            phone,
            email: optional(body.email.as_deref()),
            ticket_type,
            price,
            reference: optional(body.reference.as_deref()),
            instagram: None,
            assigned_table: optional(body.assigned_table.as_deref()),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            success: true,
            qr_code_url: placed.qr_code_url,
            pdf_unlock_token: placed.record.unlock_token,
            message: "Order created successfully".into(),
        }),
    ))
}

/// Walk-up order from the point of sale. Open route; the ticket email goes
/// out in the background when an address is given.
#[instrument(skip(state, body))]
pub async fn create_instant_order(
    State(state): State<AppState>,
    Json(body): Json<InstantOrderRequest>,
) -> Result<(StatusCode, Json<OrderCreated>), AppError> {
    let event_name = required("event_name", body.event_name.as_deref())?;
    let user_name = required("user_name", body.user_name.as_deref())?;
    let phone = required("phone", body.phone.as_deref())?;
    let ticket_type = optional(body.ticket_type.as_deref()).unwrap_or(DEFAULT_INSTANT_TICKET_TYPE);
    let email = optional(body.email.as_deref());

    let placed = place_order(
        &state,
        PlaceOrder {
            channel: OrderChannel::Instant,
            event_name,
            user_name,
            phone,
            email,
            ticket_type,
            price: body.price.unwrap_or(Decimal::ZERO),
            reference: optional(body.reference.as_deref()),
            instagram: optional(body.instagram.as_deref()),
            assigned_table: None,
        },
    )
    .await?;

    if let Some(email) = email {
        let mail_url = state.config.receipt_url(
            OrderChannel::Standard.receipt_route(),
            &placed.order.qr_code,
            &placed.record.unlock_token,
        );
        let (subject, html) =
            ticket_email(user_name, event_name, &mail_url, &placed.record.unlock_token);
        dispatch(state.mailer.clone(), subject, vec![email.to_string()], html);
    }

    Ok((
        StatusCode::CREATED,
        Json(OrderCreated {
            success: true,
            qr_code_url: placed.qr_code_url,
            pdf_unlock_token: placed.record.unlock_token,
            message: "Order created successfully".into(),
        }),
    ))
}
