//! Exposes an in-process stub contacts service for use in integration tests.
//!
//! ```
//! use contactbench_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/contacts");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// How the stub answers create and list requests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Behavior {
    /// Every create succeeds and echoes the submitted fields.
    #[default]
    Healthy,
    /// Every create is answered with `500 Internal Server Error`.
    RejectAll,
    /// Every create is answered with `200 OK` and a body that is not a contact.
    MalformedBody,
    /// Every n-th create (starting with the first) is answered with `503 Service Unavailable`.
    FailEvery(u64),
    /// Creates succeed, but every list request is answered with `500 Internal Server Error`.
    RejectQueries,
}

/// Request counters of a [`TestServer`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Number of received create requests.
    pub creates: u64,
    /// Number of creates answered with a stored contact.
    pub created: u64,
    /// Number of list requests filtering by phone number.
    pub phone_queries: u64,
    /// Number of list requests filtering by external id.
    pub external_id_queries: u64,
    /// Number of list requests without a filter.
    pub unfiltered_queries: u64,
}

impl Stats {
    /// Total number of list requests.
    pub fn queries(&self) -> u64 {
        self.phone_queries + self.external_id_queries + self.unfiltered_queries
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
struct StoredContact {
    id: String,
    external_id: u64,
    phone_number: String,
    date_created: String,
    date_updated: String,
}

#[derive(Debug, Deserialize)]
struct CreateBody {
    external_id: u64,
    phone_number: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    external_id: Option<u64>,
    phone_number: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

#[derive(Debug, Default)]
struct Counters {
    creates: AtomicU64,
    created: AtomicU64,
    phone_queries: AtomicU64,
    external_id_queries: AtomicU64,
    unfiltered_queries: AtomicU64,
}

#[derive(Debug, Default)]
struct Inner {
    behavior: Behavior,
    contacts: Mutex<Vec<StoredContact>>,
    counters: Counters,
}

type ServiceState = Arc<Inner>;

/// An in-process contacts service for use in integration tests.
///
/// Contacts are kept in memory and discarded when the server is dropped. The server listens on a
/// random available port on localhost.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: ServiceState,
}

impl TestServer {
    /// Starts a server that accepts every request.
    pub async fn new() -> Self {
        Self::with_behavior(Behavior::Healthy).await
    }

    /// Starts a server answering requests according to `behavior`.
    pub async fn with_behavior(behavior: Behavior) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(Inner {
            behavior,
            ..Default::default()
        });
        let app = Router::new()
            .route("/contacts", post(create_contact).get(list_contacts))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the request counters observed so far.
    pub fn stats(&self) -> Stats {
        let counters = &self.state.counters;
        Stats {
            creates: counters.creates.load(Ordering::SeqCst),
            created: counters.created.load(Ordering::SeqCst),
            phone_queries: counters.phone_queries.load(Ordering::SeqCst),
            external_id_queries: counters.external_id_queries.load(Ordering::SeqCst),
            unfiltered_queries: counters.unfiltered_queries.load(Ordering::SeqCst),
        }
    }

    /// Returns the number of contacts stored by the service.
    pub fn stored(&self) -> usize {
        self.state
            .contacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs().to_string()
}

async fn create_contact(
    State(state): State<ServiceState>,
    Json(body): Json<CreateBody>,
) -> Response {
    let n = state.counters.creates.fetch_add(1, Ordering::SeqCst);

    match state.behavior {
        Behavior::RejectAll => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        Behavior::MalformedBody => return (StatusCode::OK, "definitely not json").into_response(),
        Behavior::FailEvery(every) if every > 0 && n % every == 0 => {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Behavior::Healthy | Behavior::FailEvery(_) | Behavior::RejectQueries => {}
    }

    let now = timestamp();
    let contact = StoredContact {
        id: uuid::Uuid::new_v4().to_string(),
        external_id: body.external_id,
        phone_number: body.phone_number,
        date_created: now.clone(),
        date_updated: now,
    };

    state
        .contacts
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(contact.clone());
    state.counters.created.fetch_add(1, Ordering::SeqCst);

    (StatusCode::CREATED, Json(contact)).into_response()
}

async fn list_contacts(
    State(state): State<ServiceState>,
    Query(params): Query<ListParams>,
) -> Response {
    let counter = match (&params.phone_number, params.external_id) {
        (Some(_), _) => &state.counters.phone_queries,
        (None, Some(_)) => &state.counters.external_id_queries,
        (None, None) => &state.counters.unfiltered_queries,
    };
    counter.fetch_add(1, Ordering::SeqCst);

    if state.behavior == Behavior::RejectQueries {
        return (StatusCode::INTERNAL_SERVER_ERROR, "query failed").into_response();
    }

    let contacts = state
        .contacts
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let matches: Vec<_> = contacts
        .iter()
        .filter(|c| {
            params
                .phone_number
                .as_ref()
                .is_none_or(|phone| &c.phone_number == phone)
                && params.external_id.is_none_or(|id| c.external_id == id)
        })
        .skip(params.offset.unwrap_or(0))
        .take(params.limit.unwrap_or(100))
        .cloned()
        .collect();

    Json(matches).into_response()
}
