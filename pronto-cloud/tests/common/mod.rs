//! Shared harness for pronto-cloud integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use pronto_cloud::account::{self, SignupRequest};
use pronto_cloud::auth::OwnerContext;
use pronto_cloud::catalog;
use pronto_cloud::config::Config;
use pronto_cloud::push::{DeliveryError, PushTransport};
use pronto_cloud::state::AppState;
use pronto_cloud::store::MemoryStore;
use rust_decimal::Decimal;
use shared::models::{CartLine, PlaceOrderRequest, Product, ProductCreate, PushSubscription};
use std::sync::Arc;
use std::time::Duration;

/// Push transport that records every delivery instead of sending it
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<(String, serde_json::Value)> {
        self.sent.lock().clone()
    }

    /// Wait until at least `n` deliveries were recorded
    pub async fn wait_for(&self, n: usize) -> Vec<(String, serde_json::Value)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let sent = self.sent();
            if sent.len() >= n || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl PushTransport for RecordingTransport {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), DeliveryError> {
        let json = serde_json::from_slice(payload)
            .map_err(|e| DeliveryError::Permanent(e.to_string()))?;
        self.sent.lock().push((subscription.endpoint.clone(), json));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<RecordingTransport>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let state = AppState::with_parts(&Config::for_tests(), store.clone(), transport.clone());
        Self {
            store,
            transport,
            state,
        }
    }

    /// Sign up an owner and return the context its requests would carry
    pub async fn owner(&self, email: &str, business_name: &str) -> OwnerContext {
        let created = account::signup(
            self.store.as_ref(),
            &self.state.jwt_secret,
            SignupRequest {
                email: email.into(),
                password: "hunter2hunter2".into(),
                business_name: business_name.into(),
                slug: None,
                accent_color: None,
            },
        )
        .await
        .unwrap();
        OwnerContext {
            owner_id: created.owner_id,
            business_id: created.business_id,
        }
    }

    pub async fn product(&self, owner: &OwnerContext, name: &str, cents: i64) -> Product {
        catalog::create_product(
            self.store.as_ref(),
            owner,
            ProductCreate {
                name: name.into(),
                description: None,
                price: Decimal::new(cents, 2),
                image_url: None,
                category: None,
                is_available: None,
                sort_order: None,
            },
        )
        .await
        .unwrap()
    }
}

pub fn cart(name: &str, lines: &[(i64, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_name: name.into(),
        customer_note: None,
        items: lines
            .iter()
            .map(|&(product_id, quantity)| CartLine {
                product_id,
                quantity,
            })
            .collect(),
    }
}
