use crate::{
    entity::{coupon, coupon_discount, sea_orm_active_enums::CouponDiscountType},
    error::ApiError,
    middleware::jwt::AppUser,
    state::AppState,
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use loyalty_hub_ledger::{Coupon, CouponTerms, DiscountEntry, DiscountType};
use loyalty_hub_types::create_id;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, TransactionTrait,
};
use serde::Deserialize;
use utoipa::ToSchema;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    pub name: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discounts: Vec<DiscountEntry>,
    pub points_required: i64,
    /// Defaults to now
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCouponRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    /// Replaces all discount entries
    pub discounts: Option<Vec<DiscountEntry>>,
    pub points_required: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i64>,
    pub is_active: Option<bool>,
}

/// Checks a complete coupon definition before it is written.
fn validate_definition(
    terms: &CouponTerms,
    points_required: i64,
    usage_limit: Option<i64>,
    starts_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), ApiError> {
    terms.validate()?;
    if points_required <= 0 {
        return Err(ApiError::bad_request("pointsRequired must be positive"));
    }
    if usage_limit.is_some_and(|limit| limit < 0) {
        return Err(ApiError::bad_request("usageLimit cannot be negative"));
    }
    if expires_at.is_some_and(|expires_at| expires_at <= starts_at) {
        return Err(ApiError::bad_request("expiresAt must be after startsAt"));
    }
    Ok(())
}

async fn find_coupon<C: ConnectionTrait>(
    conn: &C,
    shop_id: &str,
    coupon_id: &str,
) -> Result<coupon::Model, ApiError> {
    coupon::Entity::find_by_id(coupon_id)
        .filter(coupon::Column::ShopId.eq(shop_id))
        .one(conn)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Coupon {coupon_id} not found")))
}

async fn find_discounts<C: ConnectionTrait>(
    conn: &C,
    coupon_id: &str,
) -> Result<Vec<coupon_discount::Model>, ApiError> {
    Ok(coupon_discount::Entity::find()
        .filter(coupon_discount::Column::CouponId.eq(coupon_id))
        .all(conn)
        .await?)
}

async fn replace_discounts<C: ConnectionTrait>(
    conn: &C,
    coupon_id: &str,
    discounts: &[DiscountEntry],
) -> Result<(), ApiError> {
    coupon_discount::Entity::delete_many()
        .filter(coupon_discount::Column::CouponId.eq(coupon_id))
        .exec(conn)
        .await?;

    let models = discounts.iter().map(|entry| coupon_discount::ActiveModel {
        id: Set(create_id()),
        coupon_id: Set(coupon_id.to_string()),
        article_id: Set(entry.article_id.as_ref().map(|id| id.trim().to_string())),
        value: Set(entry.value),
    });
    coupon_discount::Entity::insert_many(models)
        .exec(conn)
        .await?;
    Ok(())
}

#[utoipa::path(
    get,
    path = "/shops/{shop_id}/coupons",
    tag = "shop",
    params(
        ("shop_id" = String, Path, description = "Shop ID")
    ),
    responses(
        (status = 200, description = "All coupons of the shop, including inactive ones", body = Vec<Coupon>),
        (status = 403, description = "Not an owner of this shop")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "GET /shops/{shop_id}/coupons", skip(state, user))]
pub async fn list_coupons(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(shop_id): Path<String>,
) -> Result<Json<Vec<Coupon>>, ApiError> {
    user.require_shop_owner(&shop_id)?;

    let coupons = coupon::Entity::find()
        .filter(coupon::Column::ShopId.eq(&shop_id))
        .order_by_asc(coupon::Column::CreatedAt)
        .find_with_related(coupon_discount::Entity)
        .all(&state.db)
        .await?
        .into_iter()
        .map(|(model, discounts)| model.into_coupon(discounts))
        .collect();

    Ok(Json(coupons))
}

#[utoipa::path(
    post,
    path = "/shops/{shop_id}/coupons",
    tag = "shop",
    params(
        ("shop_id" = String, Path, description = "Shop ID")
    ),
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = Coupon),
        (status = 400, description = "Invalid coupon definition"),
        (status = 403, description = "Not an owner of this shop")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "POST /shops/{shop_id}/coupons", skip(state, user, request))]
pub async fn create_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path(shop_id): Path<String>,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    user.require_shop_owner(&shop_id)?;

    let now = Utc::now();
    let starts_at = request.starts_at.unwrap_or(now);
    let terms = CouponTerms {
        name: request.name.trim().to_string(),
        description: request.description,
        discount_type: request.discount_type,
        discounts: request.discounts,
    };
    validate_definition(
        &terms,
        request.points_required,
        request.usage_limit,
        starts_at,
        request.expires_at,
    )?;

    let txn = state.db.begin().await?;

    let coupon_id = create_id();
    let model = coupon::ActiveModel {
        id: Set(coupon_id.clone()),
        shop_id: Set(shop_id.clone()),
        name: Set(terms.name.clone()),
        description: Set(terms.description.clone()),
        discount_type: Set(CouponDiscountType::from(terms.discount_type)),
        points_required: Set(request.points_required),
        starts_at: Set(starts_at.naive_utc()),
        expires_at: Set(request.expires_at.map(|t| t.naive_utc())),
        usage_limit: Set(request.usage_limit),
        used_count: Set(0),
        is_active: Set(request.is_active),
        created_at: Set(now.naive_utc()),
        updated_at: Set(now.naive_utc()),
    };
    let created = model.insert(&txn).await?;
    replace_discounts(&txn, &coupon_id, &terms.discounts).await?;
    let discounts = find_discounts(&txn, &coupon_id).await?;

    txn.commit().await?;

    tracing::info!(coupon_id = %coupon_id, shop_id = %shop_id, "Coupon created");
    Ok((StatusCode::CREATED, Json(created.into_coupon(discounts))))
}

#[utoipa::path(
    patch,
    path = "/shops/{shop_id}/coupons/{coupon_id}",
    tag = "shop",
    description = "Edit a coupon. Redemptions already issued keep the terms they were activated with.",
    params(
        ("shop_id" = String, Path, description = "Shop ID"),
        ("coupon_id" = String, Path, description = "Coupon ID")
    ),
    request_body = UpdateCouponRequest,
    responses(
        (status = 200, description = "Coupon updated", body = Coupon),
        (status = 400, description = "Invalid coupon definition"),
        (status = 403, description = "Not an owner of this shop"),
        (status = 404, description = "Coupon not found")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(
    name = "PATCH /shops/{shop_id}/coupons/{coupon_id}",
    skip(state, user, request)
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((shop_id, coupon_id)): Path<(String, String)>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<Json<Coupon>, ApiError> {
    user.require_shop_owner(&shop_id)?;

    let txn = state.db.begin().await?;
    let existing = find_coupon(&txn, &shop_id, &coupon_id).await?;
    let current = existing
        .clone()
        .into_coupon(find_discounts(&txn, &coupon_id).await?);

    let terms = CouponTerms {
        name: request
            .name
            .map(|name| name.trim().to_string())
            .unwrap_or(current.terms.name),
        description: request.description.or(current.terms.description),
        discount_type: request
            .discount_type
            .unwrap_or(current.terms.discount_type),
        discounts: request
            .discounts
            .clone()
            .unwrap_or(current.terms.discounts),
    };
    let points_required = request.points_required.unwrap_or(current.points_required);
    let usage_limit = request.usage_limit.or(current.usage_limit);
    let starts_at = request.starts_at.unwrap_or(current.starts_at);
    let expires_at = request.expires_at.or(current.expires_at);
    validate_definition(&terms, points_required, usage_limit, starts_at, expires_at)?;

    let mut model: coupon::ActiveModel = existing.into();
    model.name = Set(terms.name);
    model.description = Set(terms.description);
    model.discount_type = Set(CouponDiscountType::from(terms.discount_type));
    model.points_required = Set(points_required);
    model.usage_limit = Set(usage_limit);
    model.starts_at = Set(starts_at.naive_utc());
    model.expires_at = Set(expires_at.map(|t| t.naive_utc()));
    if let Some(is_active) = request.is_active {
        model.is_active = Set(is_active);
    }
    model.updated_at = Set(Utc::now().naive_utc());
    let updated = model.update(&txn).await?;

    if let Some(discounts) = &request.discounts {
        replace_discounts(&txn, &coupon_id, discounts).await?;
    }
    let discounts = find_discounts(&txn, &coupon_id).await?;

    txn.commit().await?;

    tracing::info!(coupon_id = %coupon_id, shop_id = %shop_id, "Coupon updated");
    Ok(Json(updated.into_coupon(discounts)))
}

#[utoipa::path(
    delete,
    path = "/shops/{shop_id}/coupons/{coupon_id}",
    tag = "shop",
    description = "Deactivate a coupon. Issued redemptions stay valid until they expire.",
    params(
        ("shop_id" = String, Path, description = "Shop ID"),
        ("coupon_id" = String, Path, description = "Coupon ID")
    ),
    responses(
        (status = 204, description = "Coupon deactivated"),
        (status = 403, description = "Not an owner of this shop"),
        (status = 404, description = "Coupon not found")
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(name = "DELETE /shops/{shop_id}/coupons/{coupon_id}", skip(state, user))]
pub async fn delete_coupon(
    State(state): State<AppState>,
    Extension(user): Extension<AppUser>,
    Path((shop_id, coupon_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    user.require_shop_owner(&shop_id)?;

    let existing = find_coupon(&state.db, &shop_id, &coupon_id).await?;
    let mut model: coupon::ActiveModel = existing.into();
    model.is_active = Set(false);
    model.updated_at = Set(Utc::now().naive_utc());
    model.update(&state.db).await?;

    tracing::info!(coupon_id = %coupon_id, shop_id = %shop_id, "Coupon deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn terms() -> CouponTerms {
        CouponTerms {
            name: "Free coffee".into(),
            description: None,
            discount_type: DiscountType::Percentage,
            discounts: vec![DiscountEntry::for_article("coffee", 100)],
        }
    }

    #[test]
    fn test_definition_validation() {
        let now = Utc::now();
        assert!(validate_definition(&terms(), 300, Some(10), now, None).is_ok());
        assert!(validate_definition(&terms(), 0, None, now, None).is_err());
        assert!(validate_definition(&terms(), 300, Some(-1), now, None).is_err());
        assert!(
            validate_definition(&terms(), 300, None, now, Some(now - Duration::days(1))).is_err()
        );

        let mut bad = terms();
        bad.discounts[0].value = 120;
        let err = validate_definition(&bad, 300, None, now, None).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
