//! HTTP surface: page loaders answer with JSON, form actions answer with
//! redirects carrying the rewritten cookies.

use anyhow::{Context, Result};
use axum::{
    extract::{Form, Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{self, safe_redirect, DEFAULT_REDIRECT};
use crate::cookies::{
    read_cookie, CookieOptions, CookieSigner, TokenError, DRAFT_COOKIE, SESSION_COOKIE,
};
use crate::intent::{DraftIntent, ExerciseIntent, FormFields};
use crate::{AppError, AppService, DraftBuffer, DraftEntry, Exercise, Workout, WorkoutDetail};

const CREATE_PATH: &str = "/workouts/create";

/// Shared handler state. The service sits behind a mutex because the SQLite
/// connection is not `Sync`; handlers hold it only for one service call.
#[derive(Clone)]
pub struct AppState {
    service: Arc<Mutex<AppService>>,
    signer: CookieSigner,
    cookies: CookieOptions,
    draft_max_age: Duration,
    session_max_age: Duration,
}

impl AppState {
    /// # Errors
    /// Returns `TokenError::InvalidKey` if the configured secret can't key the HMAC.
    pub fn new(service: AppService) -> Result<Self, TokenError> {
        let signer = CookieSigner::new(service.config.cookie_secret.as_bytes())?;
        let cookies = CookieOptions {
            secure: service.config.secure_cookies,
        };
        let draft_max_age = service.config.draft_cookie_max_age();
        let session_max_age = service.config.session_max_age();
        Ok(Self {
            service: Arc::new(Mutex::new(service)),
            signer,
            cookies,
            draft_max_age,
            session_max_age,
        })
    }

    fn with_service<T>(
        &self,
        f: impl FnOnce(&mut AppService) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        // A panic mid-request leaves no half-applied state: every write is one transaction.
        let mut service = self.service.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut service)
    }

    fn verified_cookie(&self, headers: &HeaderMap, name: &str) -> Option<String> {
        let token = read_cookie(headers, name)?;
        match self.signer.verify(&token, Utc::now()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring '{}' cookie: {}", name, e);
                None
            }
        }
    }

    /// The signed-in user's ID, if the session cookie names an existing user.
    fn current_user(&self, headers: &HeaderMap) -> Option<i64> {
        let user_id = self
            .verified_cookie(headers, SESSION_COOKIE)?
            .parse::<i64>()
            .ok()?;
        self.with_service(|service| service.get_user(user_id))
            .ok()
            .map(|user| user.id)
    }

    fn require_user(&self, headers: &HeaderMap) -> Result<i64, AppError> {
        self.current_user(headers).ok_or(AppError::Unauthenticated)
    }

    fn read_draft(&self, headers: &HeaderMap) -> DraftBuffer {
        DraftBuffer::load(self.verified_cookie(headers, DRAFT_COOKIE).as_deref())
    }

    /// The `Set-Cookie` header carrying `draft`.
    ///
    /// A draft whose signed token would not fit in a cookie is refused with a
    /// validation error on `exercises`, so the client keeps its previous cookie.
    fn draft_cookie(&self, draft: &DraftBuffer) -> Result<(HeaderName, HeaderValue), AppError> {
        let raw = draft
            .serialize()
            .map_err(|e| AppError::Cookie(e.to_string()))?;
        let token = match self.signer.sign(&raw, Utc::now() + self.draft_max_age) {
            Ok(token) => token,
            Err(TokenError::TooLarge(len)) => {
                warn!(
                    "Refusing {} byte draft cookie with {} entries",
                    len,
                    draft.len()
                );
                return Err(AppError::validation(
                    "exercises",
                    "The draft is full, save the workout or remove some exercises first",
                ));
            }
            Err(e) => return Err(cookie_error(e)),
        };
        let value = self
            .cookies
            .set_cookie(DRAFT_COOKIE, &token, Some(self.draft_max_age))
            .map_err(cookie_error)?;
        Ok((SET_COOKIE, value))
    }

    fn session_cookie(
        &self,
        user_id: i64,
        remember: bool,
    ) -> Result<(HeaderName, HeaderValue), AppError> {
        let token = self
            .signer
            .sign(&user_id.to_string(), Utc::now() + self.session_max_age)
            .map_err(cookie_error)?;
        let max_age = remember.then_some(self.session_max_age);
        let value = self
            .cookies
            .set_cookie(SESSION_COOKIE, &token, max_age)
            .map_err(cookie_error)?;
        Ok((SET_COOKIE, value))
    }

    fn expired(&self, name: &str) -> Result<(HeaderName, HeaderValue), AppError> {
        let value = self.cookies.expire_cookie(name).map_err(cookie_error)?;
        Ok((SET_COOKIE, value))
    }
}

fn cookie_error(err: TokenError) -> AppError {
    AppError::Cookie(err.to_string())
}

/// Runs CPU-heavy password work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::PasswordHash(e.to_string()))?
}

#[derive(Debug, Serialize)]
struct ActionErrors {
    errors: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Unauthenticated = self {
            return Redirect::to("/login").into_response();
        }
        if let Some(field) = self.field() {
            let errors = BTreeMap::from([(field, self.to_string())]);
            return (StatusCode::BAD_REQUEST, Json(ActionErrors { errors })).into_response();
        }
        if self.is_not_found() {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: self.to_string(),
                }),
            )
                .into_response();
        }
        error!("Request failed: {:?}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Something went wrong, please try again".to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/join", get(account_page).post(join))
        .route("/login", get(account_page).post(login))
        .route("/logout", post(logout))
        .route("/workouts", get(list_workouts))
        .route(CREATE_PATH, get(create_page).post(create_action))
        .route(
            "/workouts/create/exercise",
            get(exercise_page).post(exercise_action),
        )
        .route("/workouts/{id}", get(workout_detail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}

// ---- Accounts ----

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    match state.current_user(&headers) {
        Some(_) => Redirect::to(DEFAULT_REDIRECT),
        None => Redirect::to("/login"),
    }
}

async fn account_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match state.current_user(&headers) {
        Some(_) => Redirect::to(DEFAULT_REDIRECT).into_response(),
        None => Json(serde_json::json!({})).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct JoinForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(rename = "redirectTo")]
    redirect_to: Option<String>,
}

async fn join(
    State(state): State<AppState>,
    Form(form): Form<JoinForm>,
) -> Result<Response, AppError> {
    state.with_service(|service| {
        service.check_registration(&form.name, &form.email, &form.password)
    })?;
    let password = form.password.clone();
    let password_hash = blocking(move || auth::hash_password(&password)).await?;
    let user = state
        .with_service(|service| service.insert_user(&form.name, &form.email, &password_hash))?;
    let target = safe_redirect(form.redirect_to.as_deref(), DEFAULT_REDIRECT);
    Ok((
        AppendHeaders([state.session_cookie(user.id, false)?]),
        Redirect::to(target),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    remember: Option<String>,
    #[serde(rename = "redirectTo")]
    redirect_to: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let candidate =
        state.with_service(|service| service.login_candidate(&form.email, &form.password))?;
    let Some((user, hash)) = candidate else {
        return Err(auth::invalid_credentials());
    };
    let password = form.password.clone();
    if !blocking(move || Ok(auth::verify_password(&password, &hash))).await? {
        return Err(auth::invalid_credentials());
    }
    let remember = form.remember.as_deref() == Some("on");
    let target = safe_redirect(form.redirect_to.as_deref(), DEFAULT_REDIRECT);
    debug!("User {} signed in (remember: {})", user.id, remember);
    Ok((
        AppendHeaders([state.session_cookie(user.id, remember)?]),
        Redirect::to(target),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok((
        AppendHeaders([state.expired(SESSION_COOKIE)?, state.expired(DRAFT_COOKIE)?]),
        Redirect::to("/"),
    )
        .into_response())
}

// ---- Workouts ----

#[derive(Debug, Serialize)]
struct WorkoutsPage {
    workouts: Vec<Workout>,
}

async fn list_workouts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(user_id) = state.current_user(&headers) else {
        return Ok((AppendHeaders([state.expired(DRAFT_COOKIE)?]), Redirect::to("/")).into_response());
    };
    let workouts = state.with_service(|service| service.list_workouts(user_id))?;
    Ok(Json(WorkoutsPage { workouts }).into_response())
}

async fn workout_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(workout_id): Path<i64>,
) -> Result<Json<WorkoutDetail>, AppError> {
    let user_id = state.require_user(&headers)?;
    let detail = state.with_service(|service| service.get_workout_detail(user_id, workout_id))?;
    Ok(Json(detail))
}

// ---- Workout creation ----

#[derive(Debug, Default, Deserialize)]
struct CreateQuery {
    #[serde(default)]
    workout: String,
}

#[derive(Debug, Serialize)]
struct CreatePage {
    exercises: Vec<DraftEntry>,
    title: String,
}

async fn create_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CreateQuery>,
) -> Result<Response, AppError> {
    state.require_user(&headers)?;
    let draft = state.read_draft(&headers);
    // Rewriting the cookie also refreshes its lifetime
    Ok((
        AppendHeaders([state.draft_cookie(&draft)?]),
        Json(CreatePage {
            exercises: draft.entries().to_vec(),
            title: query.workout,
        }),
    )
        .into_response())
}

async fn create_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FormFields>,
) -> Result<Response, AppError> {
    let user_id = state.require_user(&headers)?;
    let draft = state.read_draft(&headers);

    match DraftIntent::from_form(&form)? {
        DraftIntent::Remove { key } => {
            let draft = draft.remove(&key);
            debug!("Removed draft entry {} ({} left)", key, draft.len());
            Ok((
                AppendHeaders([state.draft_cookie(&draft)?]),
                Json(CreatePage {
                    exercises: draft.entries().to_vec(),
                    title: String::new(),
                }),
            )
                .into_response())
        }
        DraftIntent::Commit { title } => {
            let outcome = state
                .with_service(|service| service.commit_workout(Some(user_id), &title, &draft))?;
            Ok((
                AppendHeaders([state.draft_cookie(&outcome.draft)?]),
                Redirect::to(&format!("/workouts/{}", outcome.workout.id)),
            )
                .into_response())
        }
        DraftIntent::Cancel => {
            debug!("Discarding draft with {} entries", draft.len());
            Ok((
                AppendHeaders([state.draft_cookie(&draft.clear())?]),
                Redirect::to(CREATE_PATH),
            )
                .into_response())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExercisePageQuery {
    #[serde(default)]
    workout: String,
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExercisePage {
    exercises: Vec<Exercise>,
    exercise_names: BTreeSet<String>,
    matches: Vec<Exercise>,
    workout: String,
}

async fn exercise_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ExercisePageQuery>,
) -> Result<Json<ExercisePage>, AppError> {
    let user_id = state.require_user(&headers)?;
    let (exercises, exercise_names) = state.with_service(|service| {
        Ok((
            service.list_exercises(user_id)?,
            service.list_distinct_exercise_names(user_id)?,
        ))
    })?;
    let matches = crate::combobox::filter(&exercises, &query.q)
        .into_iter()
        .cloned()
        .collect();
    Ok(Json(ExercisePage {
        exercises,
        exercise_names,
        matches,
        workout: query.workout,
    }))
}

/// Location of the creation page with the in-progress title preserved.
pub fn create_page_location(title: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("workout", title)
        .finish();
    format!("{CREATE_PATH}?{query}")
}

async fn exercise_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FormFields>,
) -> Result<Response, AppError> {
    let user_id = state.require_user(&headers)?;
    let intent = ExerciseIntent::from_form(&form)?;
    let draft = state.read_draft(&headers);
    let location = create_page_location(intent.workout_title());

    let draft = state.with_service(|service| match intent {
        ExerciseIntent::Add { exercise_id, .. } => {
            service.add_existing_to_draft(Some(user_id), draft, exercise_id)
        }
        ExerciseIntent::Create { fields, .. } => {
            service.create_into_draft(Some(user_id), draft, fields)
        }
    })?;
    debug!("Draft now holds {} entries", draft.len());

    Ok((
        AppendHeaders([state.draft_cookie(&draft)?]),
        Redirect::to(&location),
    )
        .into_response())
}
