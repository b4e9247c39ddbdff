//! Dashboard WebSocket endpoint: live order board for owners
//!
//! GET /api/owner/live/ws?token=<JWT>
//! Auth: JWT in the query string (browser WebSocket cannot set headers)
//!
//! Protocol:
//! - Cloud → Dashboard: DashboardMessage (Ready, OrderUpserted)
//! - Dashboard → Cloud: DashboardCommand (Refresh)
//!
//! The session subscribes to the business channel *before* fetching the
//! initial list, so no committed change can fall between the two. Events
//! that overlap the fetch are harmless: the dashboard applies them as
//! upserts keyed by order id.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use shared::dashboard::{DashboardCommand, DashboardMessage, OrderEvent};
use shared::error::{AppError, ErrorCode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;
use tokio::time::Duration;

use crate::auth::OwnerContext;
use crate::auth::owner_auth::resolve_owner;
use crate::orders;
use crate::state::AppState;

/// Maximum concurrent dashboard WS connections per business
const MAX_DASHBOARD_WS_PER_BUSINESS: usize = 10;

const PING_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub struct WsAuthQuery {
    token: String,
}

/// One of a business's dashboard connections, released on drop
struct DashboardSlot {
    connections: Arc<DashMap<i64, AtomicUsize>>,
    business_id: i64,
}

impl DashboardSlot {
    fn acquire(
        connections: &Arc<DashMap<i64, AtomicUsize>>,
        business_id: i64,
    ) -> Result<Self, AppError> {
        // Increment under the entry lock, roll back if over the cap
        let counter = connections
            .entry(business_id)
            .or_insert_with(|| AtomicUsize::new(0));
        let prev = counter.fetch_add(1, Ordering::SeqCst);
        if prev >= MAX_DASHBOARD_WS_PER_BUSINESS {
            counter.fetch_sub(1, Ordering::SeqCst);
            return Err(AppError::with_message(
                ErrorCode::ResourceLimitExceeded,
                format!("Too many dashboard connections ({prev}/{MAX_DASHBOARD_WS_PER_BUSINESS})"),
            ));
        }
        drop(counter);
        Ok(Self {
            connections: connections.clone(),
            business_id,
        })
    }
}

impl Drop for DashboardSlot {
    fn drop(&mut self) {
        self.connections
            .remove_if(&self.business_id, |_, count| {
                count.fetch_sub(1, Ordering::SeqCst) == 1
            });
    }
}

/// GET /api/owner/live/ws?token=<JWT>
pub async fn handle_dashboard_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let owner = resolve_owner(&state, &query.token).await?;
    // Released when the session ends, or when the upgrade never completes
    let slot = DashboardSlot::acquire(&state.dashboard_connections, owner.business_id)?;

    Ok(ws.on_upgrade(move |socket| dashboard_ws_session(socket, state, owner, slot)))
}

async fn dashboard_ws_session(
    socket: WebSocket,
    state: AppState,
    owner: OwnerContext,
    _slot: DashboardSlot,
) {
    let (mut sink, mut stream) = socket.split();
    tracing::info!(business_id = owner.business_id, owner_id = owner.owner_id, "Dashboard WS connected");

    run_session(&mut sink, &mut stream, &state, &owner).await;

    tracing::info!(business_id = owner.business_id, "Dashboard WS disconnected");
}

/// Drive one dashboard until either side goes away
async fn run_session<S, R>(sink: &mut S, stream: &mut R, state: &AppState, owner: &OwnerContext)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let business_id = owner.business_id;
    let mut hub_rx = state.live.subscribe(business_id);

    if send_ready(sink, state, owner).await.is_err() {
        return;
    }

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await; // skip immediate

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if sink.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }

            event = hub_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(sink, event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        match e {
                            broadcast::error::RecvError::Lagged(n) => {
                                tracing::warn!(business_id, lagged = n, "Dashboard subscriber lagged, resending full list");
                            }
                            broadcast::error::RecvError::Closed => {
                                tracing::debug!(business_id, "Live channel reset, resending full list");
                            }
                        }
                        // Fresh receiver from the current position, then a full list
                        hub_rx = state.live.subscribe(business_id);
                        if send_ready(sink, state, owner).await.is_err() {
                            break;
                        }
                    }
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<DashboardCommand>(&text) {
                            Ok(DashboardCommand::Refresh) => {
                                if send_ready(sink, state, owner).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::debug!(business_id, error = %e, "Ignoring malformed dashboard command");
                            }
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

async fn send_ready<S>(sink: &mut S, state: &AppState, owner: &OwnerContext) -> Result<(), ()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let orders = orders::list_orders(state.store.as_ref(), owner, None, None)
        .await
        .map_err(|e| {
            tracing::error!(business_id = owner.business_id, error = %e, "Dashboard initial fetch failed");
        })?;
    send_message(sink, &DashboardMessage::Ready { orders }).await
}

async fn send_event<S>(sink: &mut S, event: OrderEvent) -> Result<(), ()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    send_message(sink, &DashboardMessage::from(event)).await
}

async fn send_message<S>(sink: &mut S, msg: &DashboardMessage) -> Result<(), ()>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json.into())).await.map_err(|_| ())
}
