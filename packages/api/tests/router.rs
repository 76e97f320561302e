use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use loyalty_hub_api::{
    auth::{ErrorSink, hash_secret, terminal_cache_key},
    construct_router,
    sea_orm::DatabaseConnection,
    state::{CachedTerminal, Claims, State, TokenRole},
};
use loyalty_hub_ledger::{
    Coupon, CouponTerms, Customer, DiscountEntry, DiscountType, InMemoryLedgerStore,
    LedgerConfig, MemoryAuditSink, Redemption, RedemptionStatus, Shop,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const SHOP: &str = "shop_cafe";
const OTHER_SHOP: &str = "shop_bakery";
const COUPON: &str = "coupon_coffee";
const CUSTOMER: &str = "user_anna";
const CAFE_KEY: &str = "pos_term_cafe.s3cr3t";
const BAKERY_KEY: &str = "pos_term_bakery.0th3r";

struct TestApp {
    router: Router,
    store: InMemoryLedgerStore,
}

fn coupon(now: chrono::DateTime<Utc>) -> Coupon {
    Coupon {
        id: COUPON.to_string(),
        shop_id: SHOP.to_string(),
        terms: CouponTerms {
            name: "Free coffee".to_string(),
            description: None,
            discount_type: DiscountType::Percentage,
            discounts: vec![DiscountEntry::for_article("coffee", 100)],
        },
        points_required: 600,
        starts_at: now - Duration::days(1),
        expires_at: Some(now + Duration::days(30)),
        usage_limit: None,
        used_count: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn register_terminal(state: &State, terminal_id: &str, secret: &str, shop_id: &str) {
    state.terminal_cache.insert(
        terminal_cache_key(terminal_id, &hash_secret(secret)),
        CachedTerminal {
            terminal_id: terminal_id.to_string(),
            shop_id: shop_id.to_string(),
            valid_until: None,
        },
    );
}

impl TestApp {
    fn new() -> Self {
        let now = Utc::now();
        let store = InMemoryLedgerStore::new();
        for (id, name) in [(SHOP, "Cafe"), (OTHER_SHOP, "Bakery")] {
            store.insert_shop(Shop {
                id: id.to_string(),
                name: name.to_string(),
                points_per_unit: 1,
            });
        }
        store.insert_customer(Customer {
            id: CUSTOMER.to_string(),
            email: Some("anna@example.com".to_string()),
            phone: None,
            display_name: None,
        });
        store.insert_coupon(coupon(now));

        let state = State::new(
            DatabaseConnection::default(),
            Arc::new(store.clone()),
            Arc::new(MemoryAuditSink::new()),
            LedgerConfig::default(),
            SECRET,
            ErrorSink::None,
        );
        register_terminal(&state, "term_cafe", "s3cr3t", SHOP);
        register_terminal(&state, "term_bakery", "0th3r", OTHER_SHOP);

        Self {
            router: construct_router(Arc::new(state)),
            store,
        }
    }

    fn seed(&self, points: i64) {
        self.store.seed_balance(CUSTOMER, SHOP, points, Utc::now());
    }

    fn balance(&self) -> i64 {
        self.store
            .account(CUSTOMER, SHOP)
            .map(|a| a.points_balance)
            .unwrap_or_default()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn activate(&self) -> (StatusCode, Value) {
        self.send(customer_post(
            "/api/v1/customer/redemptions",
            json!({ "couponId": COUPON }),
        ))
        .await
    }

    async fn validate(&self, key: &str, code: &str) -> (StatusCode, Value) {
        self.send(pos_validate(key, code, None)).await
    }
}

fn token(role: TokenRole, sub: &str, shops: Vec<String>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role,
        shops,
        email: None,
        phone: None,
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn customer_token() -> String {
    token(TokenRole::Customer, CUSTOMER, vec![])
}

fn owner_token(shop: &str) -> String {
    token(TokenRole::ShopOwner, "owner_1", vec![shop.to_string()])
}

fn customer_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", format!("Bearer {}", customer_token()))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn pos_validate(key: &str, code: &str, language: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/pos/redemptions/validate")
        .header("x-api-key", key)
        .header("content-type", "application/json");
    if let Some(language) = language {
        builder = builder.header("accept-language", language);
    }
    builder
        .body(Body::from(json!({ "code": code }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_activate_then_validate_exactly_once() {
    let app = TestApp::new();
    app.seed(1000);

    let (status, activation) = app.activate().await;
    assert_eq!(status, StatusCode::CREATED);
    let code = activation["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(activation["pointsBefore"], 1000);
    assert_eq!(activation["pointsAfter"], 400);
    assert_eq!(app.balance(), 400);

    // Staff may type the code with a separator
    let typed = format!("{}-{}", &code[..3], &code[3..]);
    let (status, consumption) = app.validate(CAFE_KEY, &typed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(consumption["code"], code.as_str());
    assert_eq!(consumption["terms"]["discounts"][0]["articleId"], "coffee");
    assert_eq!(consumption["pointsDeducted"], 600);

    let (status, body) = app.validate(CAFE_KEY, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_USED");
    assert_eq!(body["error"]["details"]["reason"], "already_used");
    assert_eq!(app.balance(), 400);
}

#[tokio::test]
async fn test_concurrent_validations_consume_once() {
    let app = TestApp::new();
    app.seed(600);
    let (_, activation) = app.activate().await;
    let code = activation["code"].as_str().unwrap().to_string();

    let attempts = (0..8).map(|_| app.validate(CAFE_KEY, &code));
    let results = futures::future::join_all(attempts).await;

    let accepted = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .count();
    assert_eq!(accepted, 1);
    assert!(
        results
            .iter()
            .filter(|(status, _)| *status != StatusCode::OK)
            .all(|(status, body)| *status == StatusCode::CONFLICT
                && body["error"]["code"] == "ALREADY_USED")
    );
}

#[tokio::test]
async fn test_insufficient_points_reports_deficit() {
    let app = TestApp::new();
    app.seed(450);

    let (status, body) = app.activate().await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_POINTS");
    assert_eq!(body["error"]["details"]["required"], 600);
    assert_eq!(body["error"]["details"]["current"], 450);
    assert_eq!(body["error"]["details"]["deficit"], 150);
    assert_eq!(app.balance(), 450);
    assert!(app.store.redemptions().is_empty());
}

#[tokio::test]
async fn test_code_from_another_shop_is_rejected() {
    let app = TestApp::new();
    app.seed(600);
    let (_, activation) = app.activate().await;
    let code = activation["code"].as_str().unwrap().to_string();

    let (status, body) = app.validate(BAKERY_KEY, &code).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "SHOP_MISMATCH");

    // The rejected attempt does not burn the code
    let (status, _) = app.validate(CAFE_KEY, &code).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_failures_carry_staff_message_in_requested_language() {
    let app = TestApp::new();
    let now = Utc::now();
    app.store.insert_redemption(Redemption {
        id: "red_stale".to_string(),
        code: "424242".to_string(),
        coupon_id: COUPON.to_string(),
        shop_id: SHOP.to_string(),
        customer_id: CUSTOMER.to_string(),
        points_deducted: 600,
        status: RedemptionStatus::Active,
        terms: coupon(now).terms,
        redeemed_at: now - Duration::minutes(6),
        consumed_at: None,
        reversed_at: None,
    });

    let (status, english) = app
        .send(pos_validate(CAFE_KEY, "424242", Some("en-US,en;q=0.9")))
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(english["error"]["code"], "EXPIRED");
    assert_eq!(english["error"]["details"]["reason"], "expired");

    let (status, german) = app.send(pos_validate(CAFE_KEY, "424242", None)).await;
    assert_eq!(status, StatusCode::GONE);
    assert_ne!(
        german["error"]["details"]["staffMessage"],
        english["error"]["details"]["staffMessage"]
    );

    let (status, body) = app.validate(CAFE_KEY, "12ab56").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_FORMAT");

    let (status, body) = app.validate(CAFE_KEY, "999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_owner_reverses_used_redemption() {
    let app = TestApp::new();
    app.seed(600);
    let (_, activation) = app.activate().await;
    let redemption_id = activation["redemptionId"].as_str().unwrap().to_string();
    let code = activation["code"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/shops/{SHOP}/redemptions/{redemption_id}/reverse");

    let reverse = |token: String| {
        Request::builder()
            .method("POST")
            .uri(uri.as_str())
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = app.send(reverse(owner_token(SHOP))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STILL_ACTIVE");

    app.validate(CAFE_KEY, &code).await;

    let (status, _) = app.send(reverse(owner_token(OTHER_SHOP))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(reverse(owner_token(SHOP))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pointsRestored"], 600);
    assert_eq!(app.balance(), 600);

    let (status, body) = app.send(reverse(owner_token(SHOP))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_REVERSED");
    assert_eq!(app.balance(), 600);
}

#[tokio::test]
async fn test_customer_sees_history_and_accounts() {
    let app = TestApp::new();
    app.seed(700);
    app.activate().await;

    let request = |uri: &str| {
        Request::builder()
            .uri(uri)
            .header("authorization", format!("Bearer {}", customer_token()))
            .body(Body::empty())
            .unwrap()
    };

    let (status, history) = app
        .send(request("/api/v1/customer/redemptions?limit=5"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "active");

    let (status, accounts) = app.send(request("/api/v1/customer/accounts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accounts[0]["pointsBalance"], 100);

    let (status, coupons) = app
        .send(request(&format!("/api/v1/customer/shops/{SHOP}/coupons")))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(coupons[0]["id"], COUPON);
}

#[tokio::test]
async fn test_authentication_and_roles() {
    let app = TestApp::new();

    let anonymous = Request::builder()
        .uri("/api/v1/customer/accounts")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(anonymous).await.0, StatusCode::UNAUTHORIZED);

    let forged = Request::builder()
        .uri("/api/v1/customer/accounts")
        .header("authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.send(forged).await.0, StatusCode::UNAUTHORIZED);

    let (status, _) = app.validate("pos_term_cafe", "123456").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Customers cannot act as a terminal
    let (status, _) = app
        .send(customer_post(
            "/api/v1/pos/redemptions/validate",
            json!({ "code": "123456" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let sweep = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/shops/{SHOP}/redemptions/sweep"))
        .header("authorization", format!("Bearer {}", owner_token(SHOP)))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(sweep).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 0);
}

#[tokio::test]
async fn test_public_endpoints() {
    let app = TestApp::new();

    let health = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let document = Request::builder()
        .uri("/api/v1/openapi.json")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(document).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/pos/redemptions/validate"].is_object());
}

#[tokio::test]
async fn test_receipt_claim_and_storno() {
    let app = TestApp::new();

    let record = Request::builder()
        .method("POST")
        .uri("/api/v1/pos/transactions")
        .header("x-api-key", CAFE_KEY)
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "externalId": "R-1001", "amountCents": 1250 }).to_string(),
        ))
        .unwrap();
    let (status, transaction) = app.send(record).await;
    assert_eq!(status, StatusCode::OK);
    let transaction_id = transaction["id"].as_str().unwrap().to_string();

    let claim_uri = format!("/api/v1/customer/receipts/{transaction_id}/claim");
    let (status, claim) = app.send(customer_post(&claim_uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(claim["pointsAwarded"], 12);
    assert_eq!(app.balance(), 12);

    let (status, body) = app.send(customer_post(&claim_uri, json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_CLAIMED");

    let storno = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/pos/transactions/{transaction_id}/storno"))
        .header("x-api-key", CAFE_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(storno).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pointsRevoked"], 12);
    assert_eq!(app.balance(), 0);
}

#[tokio::test]
async fn test_provider_token_resolves_customer_by_email() {
    let app = TestApp::new();
    app.seed(250);

    let provider_token = |email: &str| {
        let claims = Claims {
            sub: "idp|8f2c".to_string(),
            role: TokenRole::Customer,
            shops: vec![],
            email: Some(email.to_string()),
            phone: None,
            exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    };
    let accounts = |token: String| {
        Request::builder()
            .uri("/api/v1/customer/accounts")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };

    let (status, body) = app.send(accounts(provider_token("Anna@Example.com"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["customerId"], CUSTOMER);
    assert_eq!(body[0]["pointsBalance"], 250);

    let (status, body) = app.send(accounts(provider_token("bob@example.com"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_sweep_only_touches_the_owners_shop() {
    let app = TestApp::new();
    let stale = Utc::now() - Duration::minutes(30);
    for (id, shop_id, code) in [
        ("redemption_cafe", SHOP, "111111"),
        ("redemption_bakery", OTHER_SHOP, "222222"),
    ] {
        app.store.insert_redemption(Redemption {
            id: id.to_string(),
            code: code.to_string(),
            coupon_id: COUPON.to_string(),
            shop_id: shop_id.to_string(),
            customer_id: CUSTOMER.to_string(),
            points_deducted: 600,
            status: RedemptionStatus::Active,
            terms: coupon(stale).terms,
            redeemed_at: stale,
            consumed_at: None,
            reversed_at: None,
        });
    }

    let sweep = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/shops/{SHOP}/redemptions/sweep"))
        .header("authorization", format!("Bearer {}", owner_token(SHOP)))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(sweep).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 1);

    let rows = app.store.redemptions();
    let status_of = |id: &str| rows.iter().find(|r| r.id == id).unwrap().status;
    assert_eq!(status_of("redemption_cafe"), RedemptionStatus::Expired);
    assert_eq!(status_of("redemption_bakery"), RedemptionStatus::Active);
}
