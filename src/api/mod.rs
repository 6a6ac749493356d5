//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; the escrow function
//! keeps its `/functions/v1/escrow-payment` path.

pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;

use crate::app_state::AppState;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::escrow::function_routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        use utoipa_swagger_ui::SwaggerUi;
        router.merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    router
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::domain::{
        AgentProfile, CustomerProfile, Ether, EventBus, ProfileId, WalletAddress, Wei,
    };
    use crate::ledger::{InMemoryLedger, Signer};
    use crate::persistence::MemoryStore;

    const ESCROW_WALLET: WalletAddress = WalletAddress::from_bytes([0xe5; 20]);
    const AGENT_WALLET: WalletAddress = WalletAddress::from_bytes([0xa9; 20]);
    const CUSTOMER_WALLET: WalletAddress = WalletAddress::from_bytes([0xc1; 20]);

    struct Harness {
        router: Router,
        ledger: InMemoryLedger,
        agent_id: ProfileId,
        customer_id: ProfileId,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let agent_id = ProfileId::new();
        let customer_id = ProfileId::new();
        let Ok(charges) = Ether::new(dec!(0.05)) else {
            panic!("valid charges");
        };
        store
            .put_agent(AgentProfile {
                id: agent_id,
                full_name: "Agent".to_string(),
                wallet_id: AGENT_WALLET,
                charges,
            })
            .await;
        store
            .put_customer(CustomerProfile {
                id: customer_id,
                full_name: "Customer".to_string(),
                wallet_id: CUSTOMER_WALLET,
            })
            .await;

        let ledger = InMemoryLedger::new(ESCROW_WALLET);
        ledger.fund(ESCROW_WALLET, Wei(1_000_000_000_000_000_000)).await;
        let signer: Arc<dyn Signer> = Arc::new(ledger.clone());
        let state = AppState::new(store, signer, EventBus::new(64));
        Harness {
            router: build_router().with_state(state),
            ledger,
            agent_id,
            customer_id,
        }
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = body.map_or_else(Body::empty, |json| Body::from(json.to_string()));
        let Ok(request) = builder.body(body) else {
            panic!("valid request");
        };
        let Ok(response) = router.clone().oneshot(request).await;
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("readable body");
        };
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn book(h: &Harness) -> String {
        let (status, body) = call(
            &h.router,
            "POST",
            "/api/v1/appointments",
            Some(json!({
                "customer_id": h.customer_id,
                "agent_id": h.agent_id,
                "requested_date": "2026-11-02",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let Some(id) = body["id"].as_str() else {
            panic!("booking returns an id: {body}");
        };
        id.to_string()
    }

    #[tokio::test]
    async fn health_reports_escrow_address() {
        let h = harness().await;
        let (status, body) = call(&h.router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["escrow_address"], ESCROW_WALLET.to_string());
    }

    #[tokio::test]
    async fn booked_appointment_offers_pay_to_customer_only() {
        let h = harness().await;
        let id = book(&h).await;

        let uri = format!("/api/v1/appointments/{id}?role=customer");
        let (status, body) = call(&h.router, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["payment_status"], "unpaid");
        assert!(body["permitted_actions"]
            .as_array()
            .is_some_and(|a| a.contains(&json!("pay"))));

        let uri = format!("/api/v1/appointments/{id}?role=agent");
        let (_, body) = call(&h.router, "GET", &uri, None).await;
        assert!(body["permitted_actions"]
            .as_array()
            .is_some_and(|a| !a.contains(&json!("pay"))));
    }

    #[tokio::test]
    async fn pay_then_confirm_releases_escrow() {
        let h = harness().await;
        let id = book(&h).await;
        let actor = json!({ "role": "customer", "profile_id": h.customer_id });

        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/pay"),
            Some(json!({ "actor": actor })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["escrow_payment"]["status"], "pending");

        let (status, body) = call(&h.router, "GET", "/api/v1/escrow/balance", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["balance_wei"], "50000000000000000");

        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/confirm"),
            Some(json!({ "actor": actor, "success": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["escrow_payment"]["status"], "released");
        assert_eq!(h.ledger.balance_of(&AGENT_WALLET).await, Wei(50_000_000_000_000_000));

        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/confirm"),
            Some(json!({ "actor": actor, "success": true })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], 2006);
    }

    #[tokio::test]
    async fn agent_cannot_pay() {
        let h = harness().await;
        let id = book(&h).await;
        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/pay"),
            Some(json!({ "actor": { "role": "agent", "profile_id": h.agent_id } })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], 1003);
    }

    #[tokio::test]
    async fn list_is_scoped_to_profile() {
        let h = harness().await;
        book(&h).await;
        book(&h).await;
        let (status, body) = call(
            &h.router,
            "GET",
            &format!("/api/v1/appointments?profile_id={}&role=agent&per_page=1", h.agent_id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

        let (_, body) = call(
            &h.router,
            "GET",
            &format!("/api/v1/appointments?profile_id={}&role=customer", ProfileId::new()),
            None,
        )
        .await;
        assert_eq!(body["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn escrow_function_pays_then_completes() {
        let h = harness().await;
        let id = book(&h).await;

        let (status, body) = call(
            &h.router,
            "POST",
            "/functions/v1/escrow-payment",
            Some(json!({ "appointment_id": id, "action": "pay", "amount": 0.05 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));

        let (status, body) = call(
            &h.router,
            "POST",
            "/functions/v1/escrow-payment",
            Some(json!({ "appointment_id": id, "action": "complete" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert!(body["transaction"].as_str().is_some_and(|tx| tx.starts_with("0x")));
        assert_eq!(h.ledger.balance_of(&AGENT_WALLET).await, Wei(50_000_000_000_000_000));
    }

    #[tokio::test]
    async fn escrow_function_failures_are_flat_400s() {
        let h = harness().await;
        let id = book(&h).await;

        for body in [
            json!({ "appointment_id": id, "action": "withdraw" }),
            json!({ "appointment_id": id, "action": "refund" }),
            json!({ "appointment_id": ProfileId::new(), "action": "pay" }),
            json!({ "appointment_id": id, "action": "pay", "amount": 1 }),
            json!({ "action": "pay" }),
        ] {
            let (status, response) =
                call(&h.router, "POST", "/functions/v1/escrow-payment", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(response["error"].is_string(), "flat error body: {response}");
        }
    }

    async fn escrow_function(h: &Harness, id: &str, action: &str) -> (StatusCode, Value) {
        call(
            &h.router,
            "POST",
            "/functions/v1/escrow-payment",
            Some(json!({ "appointment_id": id, "action": action })),
        )
        .await
    }

    #[tokio::test]
    async fn escrow_function_completes_a_rest_deposit() {
        let h = harness().await;
        let id = book(&h).await;
        let actor = json!({ "role": "customer", "profile_id": h.customer_id });
        let (status, _) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/pay"),
            Some(json!({ "actor": actor })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = escrow_function(&h, &id, "complete").await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(h.ledger.balance_of(&AGENT_WALLET).await, Wei(50_000_000_000_000_000));
        assert_eq!(
            h.ledger.balance_of(&ESCROW_WALLET).await,
            Wei(950_000_000_000_000_000)
        );

        let (_, body) = call(&h.router, "GET", "/api/v1/escrow/balance", None).await;
        assert_eq!(body["balance_wei"], "0");
    }

    #[tokio::test]
    async fn confirm_settles_a_function_payment() {
        let h = harness().await;
        let id = book(&h).await;
        let (status, _) = escrow_function(&h, &id, "pay").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/confirm"),
            Some(json!({
                "actor": { "role": "customer", "profile_id": h.customer_id },
                "success": true,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["escrow_payment"]["status"], "released");
        assert_eq!(h.ledger.balance_of(&AGENT_WALLET).await, Wei(50_000_000_000_000_000));
    }

    #[tokio::test]
    async fn cancel_refunds_a_function_payment() {
        let h = harness().await;
        let id = book(&h).await;
        let (status, _) = escrow_function(&h, &id, "pay").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &h.router,
            "POST",
            &format!("/api/v1/appointments/{id}/cancel"),
            Some(json!({ "actor": { "role": "customer", "profile_id": h.customer_id } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "cancelled");
        assert_eq!(body["payment_status"], "refunded");
        assert_eq!(
            h.ledger.balance_of(&CUSTOMER_WALLET).await,
            Wei(50_000_000_000_000_000)
        );
    }

    #[tokio::test]
    async fn reconciliation_starts_empty() {
        let h = harness().await;
        let (status, body) = call(&h.router, "GET", "/api/v1/reconciliation", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!([]));
    }
}
