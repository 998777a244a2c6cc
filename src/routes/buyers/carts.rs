use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension,
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    aliases::DieselError,
    app_error::{AppError, StdResponse},
    app_state::AppState,
    auth::CurrentUser,
    inventory, middleware,
    models::{CartEntity, CartItemEntity, CreateCartEntity, MedicineEntity, OrderEntity,
        OrderItemEntity},
    orders,
    schema::{cart_items, carts, medicines},
};

/// Buyer cart routes. One open cart per pharmacy; adding a medicine from a
/// new pharmacy opens a new cart, adding one already in the cart merges the
/// quantities.
pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().nest(
        "/buyers/carts",
        OpenApiRouter::new()
            .routes(utoipa_axum::routes!(get_my_carts))
            .routes(utoipa_axum::routes!(get_cart))
            .routes(utoipa_axum::routes!(add_cart_item))
            .routes(utoipa_axum::routes!(update_cart))
            .routes(utoipa_axum::routes!(delete_cart))
            .routes(utoipa_axum::routes!(checkout_cart))
            .route_layer(axum::middleware::from_fn(middleware::buyers_authorization)),
    )
}

#[derive(Serialize, ToSchema)]
pub struct CartItemView {
    pub medicine_id: i32,
    pub medicine_name: String,
    pub unit_price: f32,
    pub quantity: i32,
}

#[derive(Serialize, ToSchema)]
pub struct GetCartRes {
    pub cart: CartEntity,
    pub items: Vec<CartItemView>,
    pub total_price: f32,
}

fn cart_view(
    cart: CartEntity,
    items: Vec<CartItemEntity>,
    catalog: &HashMap<i32, MedicineEntity>,
) -> GetCartRes {
    let items: Vec<CartItemView> = items
        .into_iter()
        .map(|item| match catalog.get(&item.medicine_id) {
            Some(medicine) => CartItemView {
                medicine_id: item.medicine_id,
                medicine_name: medicine.name.clone(),
                unit_price: medicine.price,
                quantity: item.quantity,
            },
            // The seller removed it while it sat in the cart.
            None => CartItemView {
                medicine_id: item.medicine_id,
                medicine_name: "(no longer available)".to_string(),
                unit_price: 0.0,
                quantity: item.quantity,
            },
        })
        .collect();
    let total_price = items
        .iter()
        .map(|item| item.unit_price * item.quantity as f32)
        .sum();
    GetCartRes {
        cart,
        items,
        total_price,
    }
}

async fn load_catalog(
    conn: &mut diesel_async::AsyncPgConnection,
    medicine_ids: Vec<i32>,
) -> Result<HashMap<i32, MedicineEntity>, AppError> {
    let rows: Vec<MedicineEntity> = medicines::table
        .filter(medicines::id.eq_any(&medicine_ids))
        .get_results(conn)
        .await
        .context("Failed to get medicines for cart items")?;
    Ok(rows.into_iter().map(|m| (m.id, m)).collect())
}

/// Fetch all carts belonging to the authenticated buyer.
#[utoipa::path(
    get,
    path = "/",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my carts", body = StdResponse<Vec<GetCartRes>, String>)
    )
)]
async fn get_my_carts(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let carts: Vec<CartEntity> = carts::table
        .filter(carts::buyer_id.eq(user.id))
        .order(carts::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my carts")?;

    let cart_ids: Vec<i32> = carts.iter().map(|cart| cart.id).collect();
    let items: Vec<CartItemEntity> = cart_items::table
        .filter(cart_items::cart_id.eq_any(&cart_ids))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let medicine_ids: Vec<i32> = items.iter().map(|item| item.medicine_id).collect();
    let catalog = load_catalog(conn, medicine_ids).await?;

    let mut group: HashMap<i32, Vec<CartItemEntity>> = HashMap::new();
    for item in items {
        group.entry(item.cart_id).or_default().push(item);
    }

    let carts_with_items: Vec<GetCartRes> = carts
        .into_iter()
        .map(|cart| {
            let items = group.remove(&cart.id).unwrap_or_default();
            cart_view(cart, items, &catalog)
        })
        .collect();

    Ok(StdResponse {
        data: Some(carts_with_items),
        message: Some("Get my carts successfully"),
    })
}

/// Fetch one cart belonging to the authenticated buyer.
#[utoipa::path(
    get,
    path = "/{id}",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart ID to fetch")
    ),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<GetCartRes, String>)
    )
)]
async fn get_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart: CartEntity = match carts::table
        .find(id)
        .filter(carts::buyer_id.eq(user.id))
        .get_result(conn)
        .await
    {
        Ok(cart) => cart,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let items: Vec<CartItemEntity> = cart_items::table
        .filter(cart_items::cart_id.eq(cart.id))
        .order(cart_items::medicine_id.asc())
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let medicine_ids: Vec<i32> = items.iter().map(|item| item.medicine_id).collect();
    let catalog = load_catalog(conn, medicine_ids).await?;

    Ok(StdResponse {
        data: Some(cart_view(cart, items, &catalog)),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct AddCartItemReq {
    pub medicine_id: i32,
    pub quantity: i32,
}

#[derive(Serialize, ToSchema)]
pub struct AddCartItemRes {
    pub cart: CartEntity,
    pub item: CartItemEntity,
}

/// Add a medicine to the cart for its pharmacy, merging quantities when the
/// medicine is already there. The cart itself is created on first use.
#[utoipa::path(
    post,
    path = "/items",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    request_body = AddCartItemReq,
    responses(
        (status = 200, description = "Added to cart", body = StdResponse<AddCartItemRes, String>)
    )
)]
async fn add_cart_item(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<AddCartItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let medicine: MedicineEntity = match medicines::table
        .find(body.medicine_id)
        .get_result(conn)
        .await
    {
        Ok(medicine) => medicine,
        Err(DieselError::NotFound) => return Err(AppError::NotFound),
        Err(err) => return Err(AppError::Other(err.into())),
    };
    inventory::ensure_orderable(&medicine, body.quantity, Utc::now())?;

    let buyer_id = user.id;
    let (cart, item) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: CartEntity = diesel::insert_into(carts::table)
                    .values(CreateCartEntity {
                        buyer_id,
                        pharmacy_id: medicine.seller_id,
                    })
                    .on_conflict((carts::buyer_id, carts::pharmacy_id))
                    .do_update()
                    .set(carts::updated_at.eq(diesel::dsl::now))
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to open cart")?;

                let item: CartItemEntity = diesel::insert_into(cart_items::table)
                    .values((
                        cart_items::cart_id.eq(cart.id),
                        cart_items::medicine_id.eq(medicine.id),
                        cart_items::quantity.eq(body.quantity),
                    ))
                    .on_conflict((cart_items::cart_id, cart_items::medicine_id))
                    .do_update()
                    .set(cart_items::quantity.eq(cart_items::quantity + body.quantity))
                    .returning(CartItemEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to upsert cart item")?;

                Ok::<(CartEntity, CartItemEntity), AppError>((cart, item))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(AddCartItemRes { cart, item }),
        message: Some("Added to cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCartReq {
    pub items: Vec<UpdateCartItemReq>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateCartItemReq {
    pub medicine_id: i32,
    pub quantity: i32,
}

#[derive(Serialize, ToSchema)]
pub struct UpdateCartRes {
    pub updated_cart: CartEntity,
    pub items: Vec<CartItemEntity>,
}

/// Replace the cart's contents. Medicines absent from the list (or listed
/// with a non-positive quantity) are removed; the rest take the given
/// quantity. Everything must belong to the cart's pharmacy.
#[utoipa::path(
    patch,
    path = "/{id}",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart ID to update")
    ),
    request_body = UpdateCartReq,
    responses(
        (status = 200, description = "Cart updated", body = StdResponse<UpdateCartRes, String>)
    )
)]
async fn update_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(body): Json<UpdateCartReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let buyer_id = user.id;
    let (updated_cart, items) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: CartEntity = match carts::table
                    .find(id)
                    .filter(carts::buyer_id.eq(buyer_id))
                    .get_result(conn)
                    .await
                {
                    Ok(cart) => cart,
                    Err(DieselError::NotFound) => return Err(AppError::NotFound),
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                let now = Utc::now();
                let kept: Vec<&UpdateCartItemReq> = body
                    .items
                    .iter()
                    .filter(|item| item.quantity > 0)
                    .collect();

                for item in &kept {
                    let medicine: MedicineEntity = match medicines::table
                        .find(item.medicine_id)
                        .get_result(conn)
                        .await
                    {
                        Ok(medicine) => medicine,
                        Err(DieselError::NotFound) => {
                            return Err(AppError::ValidationError(format!(
                                "Medicine {} is no longer offered",
                                item.medicine_id
                            )));
                        }
                        Err(err) => return Err(AppError::Other(err.into())),
                    };
                    if medicine.seller_id != cart.pharmacy_id {
                        return Err(AppError::ValidationError(format!(
                            "{} is not sold by this pharmacy",
                            medicine.name
                        )));
                    }
                    inventory::ensure_orderable(&medicine, item.quantity, now)?;
                }

                let kept_ids: Vec<i32> = kept.iter().map(|item| item.medicine_id).collect();
                diesel::delete(
                    cart_items::table
                        .filter(cart_items::cart_id.eq(cart.id))
                        .filter(cart_items::medicine_id.ne_all(&kept_ids)),
                )
                .execute(conn)
                .await
                .context("Failed to delete cart items")?;

                for item in &kept {
                    diesel::insert_into(cart_items::table)
                        .values((
                            cart_items::cart_id.eq(cart.id),
                            cart_items::medicine_id.eq(item.medicine_id),
                            cart_items::quantity.eq(item.quantity),
                        ))
                        .on_conflict((cart_items::cart_id, cart_items::medicine_id))
                        .do_update()
                        .set(cart_items::quantity.eq(item.quantity))
                        .execute(conn)
                        .await
                        .context("Failed to upsert cart item")?;
                }

                let updated_cart: CartEntity = diesel::update(carts::table.find(cart.id))
                    .set(carts::updated_at.eq(diesel::dsl::now))
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update cart timestamp")?;

                let items: Vec<CartItemEntity> = cart_items::table
                    .filter(cart_items::cart_id.eq(cart.id))
                    .order(cart_items::medicine_id.asc())
                    .get_results(conn)
                    .await
                    .context("Failed to get updated items")?;

                Ok::<(CartEntity, Vec<CartItemEntity>), AppError>((updated_cart, items))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(UpdateCartRes {
            updated_cart,
            items,
        }),
        message: Some("Cart updated successfully"),
    })
}

/// Drop a cart and everything in it.
#[utoipa::path(
    delete,
    path = "/{id}",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart ID to delete")
    ),
    responses(
        (status = 200, description = "Cart deleted", body = StdResponse<CartEntity, String>)
    )
)]
async fn delete_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart = diesel::delete(carts::table)
        .filter(carts::id.eq(id))
        .filter(carts::buyer_id.eq(user.id))
        .returning(CartEntity::as_returning())
        .get_result(conn)
        .await;

    match cart {
        Ok(cart) => Ok(StdResponse {
            data: Some(cart),
            message: Some("Cart deleted successfully"),
        }),
        Err(DieselError::NotFound) => Err(AppError::NotFound),
        Err(err) => Err(AppError::Other(err.into())),
    }
}

#[derive(Serialize, ToSchema)]
pub struct CheckoutRes {
    pub order: OrderEntity,
    pub items: Vec<OrderItemEntity>,
}

/// Turn the cart into a pending order. Prices and names are frozen at this
/// point; the cart is consumed.
#[utoipa::path(
    post,
    path = "/{id}/checkout",
    tags = ["Buyer Carts"],
    security(("bearerAuth" = [])),
    params(
        ("id" = i32, Path, description = "Cart ID to check out")
    ),
    responses(
        (status = 200, description = "Order created", body = StdResponse<CheckoutRes, String>)
    )
)]
async fn checkout_cart(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (order, items) = orders::create_from_cart(conn, user.id, id).await?;

    Ok(StdResponse {
        data: Some(CheckoutRes { order, items }),
        message: Some("Order created successfully"),
    })
}
