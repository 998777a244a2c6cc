//! End-to-end order lifecycle tests against a real PostgreSQL database.
//!
//! Point `DATABASE_URL` at a disposable database to run them; without the
//! variable every test skips. Tests run serially because they share the
//! database.

use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};
use pharmatrack::{
    aliases::DbPool,
    app_error::AppError,
    auth::{CurrentUser, Role},
    db,
    models::{
        CartEntity, CreateCartEntity, CreateCartItemEntity, CreateMedicineEntity,
        CreateUserEntity, MedicineEntity, UserPublicEntity,
    },
    notifications, orders,
    schema::{cart_items, carts, medicines, notifications as notifications_table, order_events,
        order_items, orders as orders_table, users},
};
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

async fn test_pool() -> Option<DbPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping: DATABASE_URL is not set");
        return None;
    };
    db::run_migrations_blocking(MIGRATIONS, &url)
        .await
        .expect("Failed to run migrations");
    let pool = db::connect_db(&url).await.expect("Failed to connect");
    Some(pool)
}

async fn create_user(conn: &mut AsyncPgConnection, role: Role) -> Uuid {
    let user: UserPublicEntity = diesel::insert_into(users::table)
        .values(CreateUserEntity {
            username: format!("{}-{}", role.as_str(), Uuid::new_v4()),
            password_hash: "not-a-real-hash".to_string(),
            role: role.as_str().to_string(),
            is_profile_complete: true,
        })
        .returning(UserPublicEntity::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to create user");
    user.id
}

async fn create_medicine(
    conn: &mut AsyncPgConnection,
    seller_id: Uuid,
    stock: i32,
    price: f32,
) -> MedicineEntity {
    diesel::insert_into(medicines::table)
        .values(CreateMedicineEntity {
            seller_id,
            name: format!("Amoxicillin {}", Uuid::new_v4()),
            description: Some("500mg capsules".to_string()),
            price,
            stock_quantity: stock,
            expires_at: None,
        })
        .returning(MedicineEntity::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to create medicine")
}

async fn cart_with_item(
    conn: &mut AsyncPgConnection,
    buyer_id: Uuid,
    medicine: &MedicineEntity,
    quantity: i32,
) -> i32 {
    let cart: CartEntity = diesel::insert_into(carts::table)
        .values(CreateCartEntity {
            buyer_id,
            pharmacy_id: medicine.seller_id,
        })
        .returning(CartEntity::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to create cart");
    diesel::insert_into(cart_items::table)
        .values(CreateCartItemEntity {
            cart_id: cart.id,
            medicine_id: medicine.id,
            quantity,
        })
        .execute(conn)
        .await
        .expect("Failed to create cart item");
    cart.id
}

async fn stock_of(conn: &mut AsyncPgConnection, medicine_id: i32) -> i32 {
    medicines::table
        .find(medicine_id)
        .select(medicines::stock_quantity)
        .get_result(conn)
        .await
        .expect("Failed to read stock")
}

async fn status_of(conn: &mut AsyncPgConnection, order_id: i32) -> String {
    orders_table::table
        .find(order_id)
        .select(orders_table::status)
        .get_result(conn)
        .await
        .expect("Failed to read order status")
}

async fn notification_kinds(conn: &mut AsyncPgConnection, user_id: Uuid) -> Vec<String> {
    notifications_table::table
        .filter(notifications_table::user_id.eq(user_id))
        .order(notifications_table::id.asc())
        .select(notifications_table::kind)
        .get_results(conn)
        .await
        .expect("Failed to read notifications")
}

async fn event_actions(conn: &mut AsyncPgConnection, order_id: i32) -> Vec<String> {
    order_events::table
        .filter(order_events::order_id.eq(order_id))
        .order(order_events::id.asc())
        .select(order_events::action)
        .get_results(conn)
        .await
        .expect("Failed to read order events")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn full_lifecycle_from_cart_to_paid() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 10, 12.5).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 3).await;

    let (order, items) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");
    assert_eq!(order.status, "PENDING");
    assert_eq!(order.total_amount, 37.5);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].medicine_name, medicine.name);
    assert_eq!(items[0].unit_price, 12.5);
    assert_eq!(items[0].quantity, 3);

    // The cart was consumed by checkout.
    let remaining_carts: i64 = carts::table
        .filter(carts::id.eq(cart_id))
        .count()
        .get_result(conn)
        .await
        .expect("Failed to count carts");
    assert_eq!(remaining_carts, 0);

    // Checkout alone must not touch stock.
    assert_eq!(stock_of(conn, medicine.id).await, 10);

    orders::attach_receipt(
        conn,
        order.id,
        buyer,
        "receipts/2026/08/order-1.pdf".to_string(),
        Some("TXN-123456".to_string()),
    )
    .await
    .expect("Failed to attach receipt");

    let paid = orders::confirm_payment(conn, order.id, seller)
        .await
        .expect("Payment confirmation failed");
    assert_eq!(paid.status, "PAID");
    assert_eq!(stock_of(conn, medicine.id).await, 7);

    assert_eq!(
        event_actions(conn, order.id).await,
        vec!["created", "receipt_attached", "payment_confirmed"]
    );
    assert_eq!(
        notification_kinds(conn, seller).await,
        vec![
            notifications::ORDER_PLACED.to_string(),
            notifications::RECEIPT_ATTACHED.to_string()
        ]
    );
    assert_eq!(
        notification_kinds(conn, buyer).await,
        vec![notifications::ORDER_PAID.to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn confirming_twice_deducts_stock_once() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 5, 8.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 2).await;
    let (order, _) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");

    orders::confirm_payment(conn, order.id, seller)
        .await
        .expect("First confirmation failed");
    assert_eq!(stock_of(conn, medicine.id).await, 3);

    match orders::confirm_payment(conn, order.id, seller).await {
        Err(AppError::InvalidTransition { from, attempted }) => {
            assert_eq!(from, "PAID");
            assert_eq!(attempted, "PAID");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(stock_of(conn, medicine.id).await, 3);

    // A paid order is final for the buyer too.
    let actor = CurrentUser {
        id: buyer,
        role: Role::Buyer,
    };
    match orders::cancel(conn, order.id, actor).await {
        Err(AppError::InvalidTransition { from, attempted }) => {
            assert_eq!(from, "PAID");
            assert_eq!(attempted, "CANCELLED");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn shortfall_at_confirmation_keeps_order_pending() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let first_buyer = create_user(conn, Role::Buyer).await;
    let second_buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 3, 20.0).await;

    // Nothing is reserved at checkout, so both orders are accepted while the
    // shelf still covers each of them individually.
    let first_cart = cart_with_item(conn, first_buyer, &medicine, 2).await;
    let (first_order, _) = orders::create_from_cart(conn, first_buyer, first_cart)
        .await
        .expect("First checkout failed");
    let second_cart = cart_with_item(conn, second_buyer, &medicine, 3).await;
    let (second_order, _) = orders::create_from_cart(conn, second_buyer, second_cart)
        .await
        .expect("Second checkout failed");

    orders::confirm_payment(conn, first_order.id, seller)
        .await
        .expect("First confirmation failed");
    assert_eq!(stock_of(conn, medicine.id).await, 1);

    match orders::confirm_payment(conn, second_order.id, seller).await {
        Err(AppError::InsufficientStock {
            medicine_id,
            requested,
            available,
        }) => {
            assert_eq!(medicine_id, medicine.id);
            assert_eq!(requested, 3);
            assert_eq!(available, 1);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // The failed confirmation rolled back entirely.
    assert_eq!(status_of(conn, second_order.id).await, "PENDING");
    assert_eq!(stock_of(conn, medicine.id).await, 1);

    // The buyer gives up and cancels.
    let actor = CurrentUser {
        id: second_buyer,
        role: Role::Buyer,
    };
    let cancelled = orders::cancel(conn, second_order.id, actor)
        .await
        .expect("Cancellation failed");
    assert_eq!(cancelled.status, "CANCELLED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial_test::serial]
async fn racing_confirmations_pay_at_most_one_order() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let first_buyer = create_user(conn, Role::Buyer).await;
    let second_buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 1, 6.0).await;

    let first_cart = cart_with_item(conn, first_buyer, &medicine, 1).await;
    let (first_order, _) = orders::create_from_cart(conn, first_buyer, first_cart)
        .await
        .expect("First checkout failed");
    let second_cart = cart_with_item(conn, second_buyer, &medicine, 1).await;
    let (second_order, _) = orders::create_from_cart(conn, second_buyer, second_cart)
        .await
        .expect("Second checkout failed");

    // Both confirmations run concurrently on their own connections. The
    // guarded decrement serialises them on the medicine row, so whichever
    // commits second sees no stock left and rolls back.
    let first_pool = pool.clone();
    let second_pool = pool.clone();
    let first_id = first_order.id;
    let second_id = second_order.id;
    let (first_result, second_result) = tokio::join!(
        async move {
            let conn = &mut first_pool.get().await.expect("Failed to get a connection");
            orders::confirm_payment(conn, first_id, seller).await
        },
        async move {
            let conn = &mut second_pool.get().await.expect("Failed to get a connection");
            orders::confirm_payment(conn, second_id, seller).await
        }
    );

    assert_eq!(
        first_result.is_ok() as u8 + second_result.is_ok() as u8,
        1,
        "exactly one confirmation may win: {first_result:?} vs {second_result:?}"
    );
    let loser = if first_result.is_ok() {
        &second_result
    } else {
        &first_result
    };
    assert!(matches!(loser, Err(AppError::InsufficientStock { .. })));

    assert_eq!(stock_of(conn, medicine.id).await, 0);
    let statuses = [
        status_of(conn, first_order.id).await,
        status_of(conn, second_order.id).await,
    ];
    assert_eq!(statuses.iter().filter(|s| *s == "PAID").count(), 1);
    assert_eq!(statuses.iter().filter(|s| *s == "PENDING").count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn cancelled_orders_stay_cancelled() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 4, 15.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 1).await;
    let (order, _) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");

    let actor = CurrentUser {
        id: buyer,
        role: Role::Buyer,
    };
    let cancelled = orders::cancel(conn, order.id, actor)
        .await
        .expect("Cancellation failed");
    assert_eq!(cancelled.status, "CANCELLED");
    assert_eq!(stock_of(conn, medicine.id).await, 4);

    // The pharmacy hears about both the order and its cancellation.
    assert_eq!(
        notification_kinds(conn, seller).await,
        vec![
            notifications::ORDER_PLACED.to_string(),
            notifications::ORDER_CANCELLED.to_string()
        ]
    );

    // A cancelled order cannot be paid afterwards.
    match orders::confirm_payment(conn, order.id, seller).await {
        Err(AppError::InvalidTransition { from, attempted }) => {
            assert_eq!(from, "CANCELLED");
            assert_eq!(attempted, "PAID");
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    assert_eq!(stock_of(conn, medicine.id).await, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn pharmacy_can_cancel_but_admin_cannot() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let admin = create_user(conn, Role::Admin).await;
    let medicine = create_medicine(conn, seller, 4, 9.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 2).await;
    let (order, _) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");

    let as_admin = CurrentUser {
        id: admin,
        role: Role::Admin,
    };
    assert!(matches!(
        orders::cancel(conn, order.id, as_admin).await,
        Err(AppError::Forbidden(_))
    ));
    assert_eq!(status_of(conn, order.id).await, "PENDING");

    let as_pharmacy = CurrentUser {
        id: seller,
        role: Role::Seller,
    };
    let cancelled = orders::cancel(conn, order.id, as_pharmacy)
        .await
        .expect("Pharmacy cancellation failed");
    assert_eq!(cancelled.status, "CANCELLED");
    assert_eq!(
        notification_kinds(conn, buyer).await,
        vec![notifications::ORDER_CANCELLED.to_string()]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn receipts_only_attach_to_pending_orders() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 6, 5.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 1).await;
    let (order, _) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");

    assert!(matches!(
        orders::attach_receipt(conn, order.id, buyer, "   ".to_string(), None).await,
        Err(AppError::ValidationError(_))
    ));

    // Another buyer cannot see this order, let alone attach to it.
    let stranger = create_user(conn, Role::Buyer).await;
    assert!(matches!(
        orders::attach_receipt(conn, order.id, stranger, "receipts/a.pdf".to_string(), None).await,
        Err(AppError::OrderNotFound(_))
    ));

    let receipt = orders::attach_receipt(
        conn,
        order.id,
        buyer,
        "  receipts/b.pdf  ".to_string(),
        None,
    )
    .await
    .expect("Failed to attach receipt");
    assert_eq!(receipt.file_reference, "receipts/b.pdf");

    orders::confirm_payment(conn, order.id, seller)
        .await
        .expect("Payment confirmation failed");
    assert!(matches!(
        orders::attach_receipt(conn, order.id, buyer, "receipts/c.pdf".to_string(), None).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn checkout_validates_ownership_and_stock() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let stranger = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 2, 30.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 3).await;

    // Someone else's cart is invisible.
    assert!(matches!(
        orders::create_from_cart(conn, stranger, cart_id).await,
        Err(AppError::NotFound)
    ));

    // Asking for more than the shelf holds fails upfront.
    match orders::create_from_cart(conn, buyer, cart_id).await {
        Err(AppError::InsufficientStock {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, 3);
            assert_eq!(available, 2);
        }
        other => panic!("expected InsufficientStock, got {other:?}"),
    }

    // Nothing was created and the cart is still there for fixing up.
    let order_count: i64 = orders_table::table
        .filter(orders_table::buyer_id.eq(buyer))
        .count()
        .get_result(conn)
        .await
        .expect("Failed to count orders");
    assert_eq!(order_count, 0);
    let cart_count: i64 = carts::table
        .filter(carts::id.eq(cart_id))
        .count()
        .get_result(conn)
        .await
        .expect("Failed to count carts");
    assert_eq!(cart_count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
#[serial_test::serial]
async fn order_snapshot_survives_medicine_deletion() {
    let Some(pool) = test_pool().await else { return };
    let conn = &mut pool.get().await.expect("Failed to get a connection");

    let seller = create_user(conn, Role::Seller).await;
    let buyer = create_user(conn, Role::Buyer).await;
    let medicine = create_medicine(conn, seller, 5, 11.0).await;
    let cart_id = cart_with_item(conn, buyer, &medicine, 2).await;
    let (order, _) = orders::create_from_cart(conn, buyer, cart_id)
        .await
        .expect("Checkout failed");

    diesel::delete(medicines::table.find(medicine.id))
        .execute(conn)
        .await
        .expect("Failed to delete medicine");

    // The line item still tells the story.
    let snapshot: (String, f32) = order_items::table
        .filter(order_items::order_id.eq(order.id))
        .select((order_items::medicine_name, order_items::unit_price))
        .get_result(conn)
        .await
        .expect("Failed to read order item");
    assert_eq!(snapshot.0, medicine.name);
    assert_eq!(snapshot.1, 11.0);

    // A deleted medicine counts as zero stock at confirmation time.
    match orders::confirm_payment(conn, order.id, seller).await {
        Err(AppError::InsufficientStock { available, .. }) => assert_eq!(available, 0),
        other => panic!("expected InsufficientStock, got {other:?}"),
    }
    assert_eq!(status_of(conn, order.id).await, "PENDING");
}
