use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::order::OrderItem;
use crate::models::user::Claims;
use crate::models::voucher::{Voucher, VoucherStatus, VoucherType};
use crate::services::voucher_service::VoucherApplyResult;
use crate::state::AppState;

// Request DTOs
#[derive(Debug, Deserialize, Validate)]
pub struct ApplyVoucherRequest {
    #[validate(length(min = 1, message = "Voucher code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItem>,
    pub shipping_fee: Option<f64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVoucherRequest {
    #[validate(length(min = 3, max = 32, message = "Code must be 3-32 characters"))]
    pub code: String,
    pub description: Option<String>,
    pub voucher_type: VoucherType,
    pub value: f64,
    pub min_order_value: Option<f64>,
    pub max_discount: Option<f64>,
    pub total_usage_limit: Option<i64>,
    pub per_user_limit: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub applicable_categories: Option<Vec<String>>,
    pub applicable_products: Option<Vec<String>>,
    pub excluded_products: Option<Vec<String>>,
}

// Response DTOs
#[derive(Debug, Serialize)]
pub struct VoucherSummary {
    pub code: String,
    pub description: String,
    pub voucher_type: VoucherType,
    pub value: f64,
    pub min_order_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<f64>,
    pub start_date: String,
    pub end_date: String,
}

impl VoucherSummary {
    pub fn from_voucher(voucher: &Voucher) -> Self {
        Self {
            code: voucher.code.clone(),
            description: voucher.description.clone(),
            voucher_type: voucher.voucher_type,
            value: voucher.value,
            min_order_value: voucher.min_order_value,
            max_discount: voucher.max_discount,
            start_date: voucher.start_date.to_rfc3339(),
            end_date: voucher.end_date.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApplyVoucherResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher: Option<VoucherSummary>,
}

/// Dry-run preview of a voucher against the current cart. Consumption
/// happens only when the order is finalized.
pub async fn apply_voucher(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ApplyVoucherRequest>,
) -> Result<impl IntoResponse> {
    if let Err(errors) = req.validate() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(ApplyVoucherResponse {
                success: false,
                message: format!("Validation error: {}", errors),
                discount_amount: None,
                voucher: None,
            }),
        ));
    }

    let order_subtotal: f64 = req.items.iter().map(|item| item.line_total()).sum();
    let shipping_fee = req.shipping_fee.unwrap_or(0.0);

    match state
        .voucher_service
        .apply_voucher(&req.code, &claims.sub, order_subtotal, &req.items, shipping_fee)
        .await?
    {
        VoucherApplyResult::Approved {
            voucher,
            discount_amount,
        } => Ok((
            StatusCode::OK,
            Json(ApplyVoucherResponse {
                success: true,
                message: "Voucher applied".to_string(),
                discount_amount: Some(discount_amount),
                voucher: Some(VoucherSummary::from_voucher(&voucher)),
            }),
        )),
        VoucherApplyResult::Rejected(error) => Ok((
            StatusCode::BAD_REQUEST,
            Json(ApplyVoucherResponse {
                success: false,
                message: error.message(),
                discount_amount: None,
                voucher: None,
            }),
        )),
    }
}

pub async fn create_voucher(
    State(state): State<AppState>,
    Json(req): Json<CreateVoucherRequest>,
) -> Result<impl IntoResponse> {
    req.validate()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    match req.voucher_type {
        VoucherType::Percentage => {
            if req.value <= 0.0 || req.value > 100.0 {
                return Err(AppError::invalid_data("Percentage value must be in (0, 100]"));
            }
        }
        VoucherType::FixedAmount => {
            if req.value <= 0.0 {
                return Err(AppError::invalid_data("Fixed amount must be positive"));
            }
        }
        VoucherType::FreeShipping => {}
    }
    if req.start_date >= req.end_date {
        return Err(AppError::invalid_data("start_date must be before end_date"));
    }
    if req.min_order_value.is_some_and(|v| v < 0.0) {
        return Err(AppError::invalid_data("min_order_value must not be negative"));
    }
    if req.max_discount.is_some_and(|v| v <= 0.0) {
        return Err(AppError::invalid_data("max_discount must be positive"));
    }

    let now = Utc::now();
    let voucher = Voucher {
        _id: None,
        code: req.code,
        description: req.description.unwrap_or_default(),
        voucher_type: req.voucher_type,
        value: req.value,
        min_order_value: req.min_order_value.unwrap_or(0.0),
        max_discount: req.max_discount,
        total_usage_limit: req.total_usage_limit,
        usage_count: 0,
        per_user_limit: req.per_user_limit,
        status: VoucherStatus::Active,
        applicable_categories: req.applicable_categories.unwrap_or_default(),
        applicable_products: req.applicable_products.unwrap_or_default(),
        excluded_products: req.excluded_products.unwrap_or_default(),
        start_date: req.start_date,
        end_date: req.end_date,
        created_at: now,
        updated_at: now,
    };

    let created = state.voucher_service.create_voucher(voucher).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "success": true,
            "message": "Voucher created",
            "voucher": VoucherSummary::from_voucher(&created),
        })),
    ))
}

pub async fn list_active_vouchers(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let vouchers = state.voucher_service.list_active().await?;
    let summaries: Vec<VoucherSummary> =
        vouchers.iter().map(VoucherSummary::from_voucher).collect();

    Ok(Json(serde_json::json!({
        "success": true,
        "vouchers": summaries,
    })))
}
