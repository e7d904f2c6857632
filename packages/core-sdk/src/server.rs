use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, get_service, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;

use crate::{
    controller::{ChatController, CredentialError, SubmitOutcome, SubmitRejected},
    credential::CredentialStore,
    dashboard,
    llm::{CompletionClient, GeminiClient},
    models::{Message, RequestState},
    telemetry,
};

type ApiError = (StatusCode, String);

/**
 * \brief Shared state of the HTTP surface: one chat view per server process.
 */
pub struct AppState<S, C> {
    controller: Arc<Mutex<ChatController<S, C>>>,
    gemini: Option<Arc<GeminiClient>>,
}

impl<S, C> Clone for AppState<S, C> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            gemini: self.gemini.clone(),
        }
    }
}

impl<S, C> AppState<S, C> {
    pub fn new(controller: ChatController<S, C>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(controller)),
            gemini: None,
        }
    }

    /**
     * \brief Enable the model-listing health check against `client`.
     */
    pub fn with_gemini(mut self, client: GeminiClient) -> Self {
        self.gemini = Some(Arc::new(client));
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, ChatController<S, C>>, ApiError> {
        self.controller
            .lock()
            .map_err(|_| internal_err("chat controller lock poisoned"))
    }
}

/**
 * \brief Build the API router; `ui_dir` is served for every other path.
 */
pub fn router<S, C>(state: AppState<S, C>, ui_dir: &Path) -> Router
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    let static_service =
        get_service(ServeDir::new(ui_dir).append_index_html_on_directories(true));

    Router::new()
        .route("/api/chat", get(get_chat::<S, C>))
        .route("/api/chat/messages", post(post_message::<S, C>))
        .route(
            "/api/credential",
            put(put_credential::<S, C>).delete(delete_credential::<S, C>),
        )
        .route("/api/health", get(health_check::<S, C>))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/stocks", get(get_stocks))
        .route("/api/expenses", get(get_expenses))
        .route("/api/news", get(get_news))
        .route("/api/suggestions", get(get_suggestions))
        .fallback_service(static_service)
        .with_state(state)
}

/**
 * \brief Start the local HTTP service.
 * \param addr Listen address, e.g. "127.0.0.1:5173"
 */
pub async fn run<S, C>(addr: &str, state: AppState<S, C>, ui_dir: &Path) -> Result<()>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Server listening on http://{}", addr);
    telemetry::log_event("server", &format!("listening addr={}", addr));
    axum::serve(listener, router(state, ui_dir)).await?;
    Ok(())
}

#[derive(Serialize, Debug)]
struct ChatView {
    state: RequestState,
    messages: Vec<Message>,
}

#[derive(Deserialize, Debug)]
struct SubmitRequest {
    /** \brief User text to send. */
    text: String,
}

#[derive(Serialize, Debug)]
struct SubmitResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<SubmitRejected>,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<SubmitOutcome>,
    #[serde(flatten)]
    view: ChatView,
}

#[derive(Deserialize, Debug)]
struct CredentialRequest {
    /** \brief Gemini API key. */
    key: String,
}

#[derive(Serialize, Debug)]
struct StateResponse {
    state: RequestState,
}

#[derive(Deserialize, Debug)]
struct NewsQuery {
    sentiment: Option<String>,
}

fn chat_view<S: CredentialStore, C: CompletionClient>(controller: &ChatController<S, C>) -> ChatView {
    ChatView {
        state: controller.state(),
        messages: controller.snapshot().to_vec(),
    }
}

/**
 * \brief Current messages and request state.
 */
async fn get_chat<S, C>(State(app): State<AppState<S, C>>) -> Result<Json<ChatView>, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    let controller = app.lock()?;
    Ok(Json(chat_view(&*controller)))
}

/**
 * \brief Submit a message and wait for the reply.
 * \details The controller is unlocked while the completion runs, so `GET /api/chat`
 * reports `pending` and concurrent submits are refused. The completion and its
 * settlement run on a detached task: a client that hangs up early does not leave
 * the chat stuck in `pending`.
 */
async fn post_message<S, C>(
    State(app): State<AppState<S, C>>,
    Json(payload): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    let dispatch = {
        let mut controller = app.lock()?;
        match controller.begin_submit(&payload.text) {
            Ok(dispatch) => dispatch,
            Err(rejected) => {
                return Ok(Json(SubmitResponse {
                    accepted: false,
                    rejected: Some(rejected),
                    outcome: None,
                    view: chat_view(&*controller),
                }));
            }
        }
    };

    let settled = tokio::spawn(async move {
        let result = dispatch.run().await;
        let mut controller = app.lock()?;
        let outcome = controller.settle(result);
        Ok::<_, ApiError>(SubmitResponse {
            accepted: true,
            rejected: None,
            outcome: Some(outcome),
            view: chat_view(&*controller),
        })
    });
    let response = settled.await.map_err(|e| {
        telemetry::log_error("server.submit", &e.to_string());
        internal_err(e)
    })??;
    Ok(Json(response))
}

/**
 * \brief Store access may sleep on SQLite lock retries, so it runs off the async workers.
 */
async fn with_controller_blocking<S, C, T, F>(app: AppState<S, C>, action: F) -> Result<T, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&mut ChatController<S, C>) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut controller = app.lock()?;
        action(&mut *controller)
    })
    .await
    .map_err(internal_err)?
}

async fn put_credential<S, C>(
    State(app): State<AppState<S, C>>,
    Json(payload): Json<CredentialRequest>,
) -> Result<Json<StateResponse>, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    with_controller_blocking(app, move |controller| {
        match controller.save_credential(&payload.key) {
            Ok(()) => Ok(StateResponse {
                state: controller.state(),
            }),
            Err(err @ CredentialError::Empty) => {
                Err((StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))
            }
            Err(err) => {
                telemetry::log_error("server.credential", &err.to_string());
                Err(internal_err(err))
            }
        }
    })
    .await
    .map(Json)
}

async fn delete_credential<S, C>(
    State(app): State<AppState<S, C>>,
) -> Result<Json<StateResponse>, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    with_controller_blocking(app, |controller| {
        controller.clear_credential().map_err(internal_err)?;
        Ok(StateResponse {
            state: controller.state(),
        })
    })
    .await
    .map(Json)
}

/**
 * \brief Health check: list models with the stored key when Gemini is configured.
 */
async fn health_check<S, C>(State(app): State<AppState<S, C>>) -> Result<Json<Value>, ApiError>
where
    S: CredentialStore + Send + 'static,
    C: CompletionClient + Send + Sync + 'static,
{
    let (state, secret) = {
        let controller = app.lock()?;
        let secret = controller.store().load().map_err(internal_err)?;
        (controller.state(), secret)
    };
    let Some(gemini) = app.gemini.as_ref() else {
        return Ok(Json(json!({"ok": true, "state": state, "provider": "offline"})));
    };
    let Some(secret) = secret else {
        return Ok(Json(json!({
            "ok": false,
            "state": state,
            "model": gemini.model(),
            "error": "no API key stored"
        })));
    };
    match gemini.list_models(&secret).await {
        Ok(list) => Ok(Json(json!({
            "ok": true,
            "state": state,
            "base": gemini.api_base(),
            "model": gemini.model(),
            "models": list.len()
        }))),
        Err(e) => Ok(Json(json!({
            "ok": false,
            "state": state,
            "base": gemini.api_base(),
            "model": gemini.model(),
            "error": e.to_string()
        }))),
    }
}

async fn get_dashboard() -> Json<Value> {
    let slices = dashboard::expense_breakdown();
    Json(json!({
        "stats": dashboard::stat_cards(),
        "watchlist": dashboard::watchlist(),
        "expenses": {
            "total": dashboard::expense_total(&slices),
            "slices": slices,
        },
        "news": dashboard::news(),
    }))
}

async fn get_stocks() -> Json<Value> {
    let stocks = dashboard::watchlist();
    let (gainers, losers) = dashboard::movers(&stocks);
    Json(json!({
        "watchlist": &stocks,
        "gainers": gainers,
        "losers": losers,
        "sectors": dashboard::sectors(),
    }))
}

async fn get_expenses() -> Json<Value> {
    let slices = dashboard::expense_breakdown();
    let over_budget: Vec<_> = dashboard::budget_categories()
        .into_iter()
        .filter(|c| c.is_over_budget())
        .map(|c| c.name)
        .collect();
    Json(json!({
        "total": dashboard::expense_total(&slices),
        "shares": dashboard::expense_shares(&slices),
        "categories": dashboard::budget_categories(),
        "over_budget": over_budget,
        "tips": dashboard::financial_tips(),
    }))
}

async fn get_news(Query(q): Query<NewsQuery>) -> Result<Json<Value>, ApiError> {
    let items = dashboard::news();
    let filtered: Vec<&dashboard::NewsItem> = match q.sentiment.as_deref() {
        None => items.iter().collect(),
        Some(raw) => {
            let sentiment = dashboard::Sentiment::parse(raw).ok_or_else(|| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("unknown sentiment: {}", raw),
                )
            })?;
            dashboard::news_with_sentiment(&items, sentiment)
        }
    };
    Ok(Json(json!({
        "news": filtered,
        "markets": dashboard::market_updates(),
    })))
}

async fn get_suggestions() -> Json<Value> {
    Json(json!({"questions": dashboard::suggested_questions()}))
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        credential::MemoryCredentialStore,
        llm::{CannedAdvisor, CompletionFailure},
    };
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };
    use tokio::sync::Notify;

    struct FailingClient;

    impl CompletionClient for FailingClient {
        async fn complete(&self, _user_text: &str, _secret: &str) -> Result<String, CompletionFailure> {
            Err(CompletionFailure::Rejected("401 -> unauthorized".into()))
        }
    }

    /** \brief Replies only once the gate is opened. */
    struct GatedClient {
        gate: Arc<Notify>,
    }

    impl CompletionClient for GatedClient {
        async fn complete(&self, _user_text: &str, _secret: &str) -> Result<String, CompletionFailure> {
            self.gate.notified().await;
            Ok("done".to_string())
        }
    }

    /** \brief Replies after `delay`. */
    struct SlowClient {
        delay: Duration,
    }

    impl CompletionClient for SlowClient {
        async fn complete(&self, _user_text: &str, _secret: &str) -> Result<String, CompletionFailure> {
            tokio::time::sleep(self.delay).await;
            Ok("late reply".to_string())
        }
    }

    /** \brief Store whose `save` blocks the calling thread, like a long SQLite lock retry. */
    struct SlowStore {
        inner: MemoryCredentialStore,
        entered: Arc<AtomicBool>,
        done: Arc<AtomicBool>,
    }

    impl CredentialStore for SlowStore {
        fn save(&self, secret: &str) -> Result<()> {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
            self.done.store(true, Ordering::SeqCst);
            self.inner.save(secret)
        }
        fn load(&self) -> Result<Option<String>> {
            self.inner.load()
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }

    async fn spawn_app<S, C>(state: AppState<S, C>) -> String
    where
        S: CredentialStore + Send + 'static,
        C: CompletionClient + Send + Sync + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = router(state, Path::new("no-such-ui-dir"));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    async fn get_json(http: &reqwest::Client, url: String) -> Value {
        http.get(url)
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json")
    }

    async fn post_text(http: &reqwest::Client, base: &str, text: &str) -> Value {
        http.post(format!("{}/api/chat/messages", base))
            .json(&json!({"text": text}))
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json")
    }

    #[tokio::test]
    async fn test_credential_gate_and_reply_over_http() {
        let controller = ChatController::new(MemoryCredentialStore::new(), CannedAdvisor);
        let base = spawn_app(AppState::new(controller)).await;
        let http = reqwest::Client::new();

        let chat = get_json(&http, format!("{}/api/chat", base)).await;
        assert_eq!(chat["state"], "awaiting_credential");
        assert_eq!(chat["messages"].as_array().expect("messages").len(), 1);

        let refused = post_text(&http, &base, "Hello").await;
        assert_eq!(refused["accepted"], false);
        assert_eq!(refused["rejected"], "awaiting_credential");
        assert_eq!(refused["messages"].as_array().expect("messages").len(), 1);

        let empty = http
            .put(format!("{}/api/credential", base))
            .json(&json!({"key": "  "}))
            .send()
            .await
            .expect("send");
        assert_eq!(empty.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        let saved: Value = http
            .put(format!("{}/api/credential", base))
            .json(&json!({"key": "abc"}))
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        assert_eq!(saved["state"], "idle");

        let replied = post_text(&http, &base, "Tell me about SIP").await;
        assert_eq!(replied["accepted"], true);
        assert_eq!(replied["outcome"], "replied");
        assert_eq!(replied["state"], "idle");
        let messages = replied["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[2]["role"], "assistant");

        let cleared: Value = http
            .delete(format!("{}/api/credential", base))
            .send()
            .await
            .expect("send")
            .json()
            .await
            .expect("json");
        assert_eq!(cleared["state"], "awaiting_credential");
    }

    #[tokio::test]
    async fn test_failed_completion_over_http() {
        let controller = ChatController::new(MemoryCredentialStore::with_secret("abc"), FailingClient);
        let base = spawn_app(AppState::new(controller)).await;
        let http = reqwest::Client::new();

        let failed = post_text(&http, &base, "test").await;
        assert_eq!(failed["accepted"], true);
        assert_eq!(failed["outcome"], "failed");
        assert_eq!(failed["state"], "awaiting_credential");
        let messages = failed["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2]["text"], crate::controller::APOLOGY_TEXT);
    }

    #[tokio::test]
    async fn test_pending_is_visible_and_blocks_second_submit() {
        let gate = Arc::new(Notify::new());
        let client = GatedClient {
            gate: Arc::clone(&gate),
        };
        let controller = ChatController::new(MemoryCredentialStore::with_secret("abc"), client);
        let base = spawn_app(AppState::new(controller)).await;
        let http = reqwest::Client::new();

        let first = {
            let http = http.clone();
            let base = base.clone();
            tokio::spawn(async move { post_text(&http, &base, "first").await })
        };

        let mut pending = false;
        for _ in 0..100 {
            let chat = get_json(&http, format!("{}/api/chat", base)).await;
            if chat["state"] == "pending" {
                pending = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(pending, "first submit never became pending");

        let second = post_text(&http, &base, "second").await;
        assert_eq!(second["accepted"], false);
        assert_eq!(second["rejected"], "pending");
        assert_eq!(second["messages"].as_array().expect("messages").len(), 2);

        gate.notify_one();
        let first = first.await.expect("join");
        assert_eq!(first["outcome"], "replied");
        assert_eq!(first["state"], "idle");
        assert_eq!(first["messages"].as_array().expect("messages").len(), 3);
    }

    #[tokio::test]
    async fn test_dashboard_endpoints() {
        let controller = ChatController::new(MemoryCredentialStore::new(), CannedAdvisor);
        let base = spawn_app(AppState::new(controller)).await;
        let http = reqwest::Client::new();

        let news = get_json(&http, format!("{}/api/news?sentiment=positive", base)).await;
        assert_eq!(news["news"].as_array().expect("news").len(), 2);

        let bad = http
            .get(format!("{}/api/news?sentiment=bullish", base))
            .send()
            .await
            .expect("send");
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

        let expenses = get_json(&http, format!("{}/api/expenses", base)).await;
        assert_eq!(expenses["total"], 2600.0);
        assert_eq!(expenses["over_budget"], json!(["Shopping"]));

        let health = get_json(&http, format!("{}/api/health", base)).await;
        assert_eq!(health["provider"], "offline");
    }

    #[tokio::test]
    async fn test_abandoned_submit_still_settles() {
        let client = SlowClient {
            delay: Duration::from_millis(300),
        };
        let controller = ChatController::new(MemoryCredentialStore::with_secret("abc"), client);
        let base = spawn_app(AppState::new(controller)).await;

        let impatient = reqwest::Client::builder()
            .timeout(Duration::from_millis(50))
            .build()
            .expect("client");
        let abandoned = impatient
            .post(format!("{}/api/chat/messages", base))
            .json(&json!({"text": "hi"}))
            .send()
            .await;
        assert!(abandoned.is_err(), "request should time out before the reply");

        let http = reqwest::Client::new();
        let mut chat = get_json(&http, format!("{}/api/chat", base)).await;
        for _ in 0..100 {
            if chat["state"] != "pending" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            chat = get_json(&http, format!("{}/api/chat", base)).await;
        }
        assert_eq!(chat["state"], "idle");
        let messages = chat["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["text"], "hi");
        assert_eq!(messages[2]["text"], "late reply");

        let next = post_text(&http, &base, "again").await;
        assert_eq!(next["accepted"], true);
        assert_eq!(next["outcome"], "replied");
    }

    #[tokio::test]
    async fn test_slow_key_storage_leaves_server_responsive() {
        let entered = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let store = SlowStore {
            inner: MemoryCredentialStore::new(),
            entered: Arc::clone(&entered),
            done: Arc::clone(&done),
        };
        let controller = ChatController::new(store, CannedAdvisor);
        let base = spawn_app(AppState::new(controller)).await;
        let http = reqwest::Client::new();

        let save = {
            let http = http.clone();
            let base = base.clone();
            tokio::spawn(async move {
                http.put(format!("{}/api/credential", base))
                    .json(&json!({"key": "abc"}))
                    .send()
                    .await
                    .expect("send")
                    .json::<Value>()
                    .await
                    .expect("json")
            })
        };

        for _ in 0..200 {
            if entered.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(entered.load(Ordering::SeqCst), "save never reached the store");

        let suggestions = get_json(&http, format!("{}/api/suggestions", base)).await;
        assert!(!suggestions["questions"].as_array().expect("questions").is_empty());
        assert!(
            !done.load(Ordering::SeqCst),
            "other requests waited for the key to be stored"
        );

        let saved = save.await.expect("join");
        assert_eq!(saved["state"], "idle");
    }
}
