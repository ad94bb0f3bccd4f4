use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::doc;
use mongodb::Collection;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::order::{Order, OrderItem, OrderStatus};
use crate::models::user::Claims;
use crate::services::voucher_service::VoucherApplyResult;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItem>,
    pub shipping_fee: Option<f64>,
    pub voucher_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct OrderSummary {
    pub id: String,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub discount_amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    pub total: f64,
    pub status: OrderStatus,
    pub item_count: usize,
    pub created_at: String,
}

/// Finalizes an order. Payment is mocked as immediately settled; this is
/// the only place a voucher is actually consumed.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse> {
    if let Err(errors) = req.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(CreateOrderResponse {
                success: false,
                message: format!("Validation error: {}", errors),
                order_id: None,
                subtotal: None,
                discount_amount: None,
                total: None,
            }),
        ));
    }

    let subtotal: f64 = req.items.iter().map(|item| item.line_total()).sum();
    let shipping_fee = req.shipping_fee.unwrap_or(0.0);

    // Re-run the full voucher validation at finalization; the earlier
    // apply call was only a preview.
    let mut applied_voucher = None;
    let mut discount_amount = 0.0;
    if let Some(code) = &req.voucher_code {
        match state
            .voucher_service
            .apply_voucher(code, &claims.sub, subtotal, &req.items, shipping_fee)
            .await?
        {
            VoucherApplyResult::Approved {
                voucher,
                discount_amount: discount,
            } => {
                discount_amount = discount;
                applied_voucher = Some(voucher);
            }
            VoucherApplyResult::Rejected(error) => {
                return Ok((
                    StatusCode::BAD_REQUEST,
                    Json(CreateOrderResponse {
                        success: false,
                        message: error.message(),
                        order_id: None,
                        subtotal: None,
                        discount_amount: None,
                        total: None,
                    }),
                ));
            }
        }
    }

    let total = (subtotal + shipping_fee - discount_amount).max(0.0);

    let order = Order {
        _id: None,
        user_id: claims.sub.clone(),
        items: req.items,
        subtotal,
        shipping_fee,
        discount_amount,
        voucher_code: applied_voucher.as_ref().map(|v| v.code.clone()),
        total,
        status: OrderStatus::Paid,
        created_at: Utc::now(),
    };

    let orders: Collection<Order> = state.db.collection("orders");
    let insert_result = orders.insert_one(&order).await?;
    let order_id = insert_result
        .inserted_id
        .as_object_id()
        .ok_or(AppError::DocumentNotFound)?;

    if let Some(voucher) = &applied_voucher {
        state
            .voucher_service
            .consume_voucher(voucher, &claims.sub, order_id, discount_amount)
            .await?;
    }

    tracing::info!(
        "Order {} finalized for user {} (total {})",
        order_id.to_hex(),
        claims.sub,
        total
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateOrderResponse {
            success: true,
            message: "Order placed".to_string(),
            order_id: Some(order_id.to_hex()),
            subtotal: Some(subtotal),
            discount_amount: Some(discount_amount),
            total: Some(total),
        }),
    ))
}

pub async fn get_user_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<serde_json::Value>> {
    let orders: Collection<Order> = state.db.collection("orders");

    let cursor = orders
        .find(doc! { "user_id": &claims.sub })
        .sort(doc! { "created_at": -1 })
        .await?;
    let orders: Vec<Order> = cursor.try_collect().await?;

    let summaries: Vec<OrderSummary> = orders
        .iter()
        .map(|order| OrderSummary {
            id: order._id.map(|id| id.to_hex()).unwrap_or_default(),
            subtotal: order.subtotal,
            shipping_fee: order.shipping_fee,
            discount_amount: order.discount_amount,
            voucher_code: order.voucher_code.clone(),
            total: order.total,
            status: order.status,
            item_count: order.items.len(),
            created_at: order.created_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "orders": summaries,
    })))
}
