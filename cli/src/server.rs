use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use diary_core::analysis::{AnalysisReport, Overview};
use diary_core::assistant::{
    FoodRecognition, GenerativeProvider, Goal, InlineImage, Plan, PlanDuration, generate_plan,
    recognize_food,
};
use diary_core::diets::{self, DietPlan};
use diary_core::error::CollaboratorError;
use diary_core::metrics::weather_exercise_suggestion;
use diary_core::models::{
    DailyRecord, ExerciseEntry, ExerciseType, FoodItem, Gender, MealSelection, MealType, Profile,
    ProfileUpdate, RecordEdit, RecordInput,
};
use diary_core::reference::UpsertOutcome;
use diary_core::service::{Diary, HealthAnalysis, IntakeSummary, SavedRecord};
use diary_core::store::{ImportSummary, parse_records};
use diary_core::weather::{DEFAULT_CITY, WeatherProvider, WeatherReport};

const BODY_LIMIT: usize = 10 * 1024 * 1024; // 10 MB, enough for a food photo

/// Everything the server needs from the CLI.
pub struct Services {
    pub diary: Diary,
    pub weather: Box<dyn WeatherProvider>,
    pub ai: Box<dyn GenerativeProvider>,
    /// Where profile changes are persisted; `None` keeps them in memory.
    pub profile_path: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    diary: Arc<Mutex<Diary>>,
    weather: Arc<dyn WeatherProvider>,
    ai: Arc<dyn GenerativeProvider>,
    profile_path: Option<Arc<PathBuf>>,
    api_key: Option<String>,
}

impl AppState {
    fn new(services: Services, api_key: Option<String>) -> Self {
        Self {
            diary: Arc::new(Mutex::new(services.diary)),
            weather: Arc::from(services.weather),
            ai: Arc::from(services.ai),
            profile_path: services.profile_path.map(Arc::new),
            api_key,
        }
    }

    /// Never hold this guard across an `.await`.
    fn diary(&self) -> MutexGuard<'_, Diary> {
        self.diary
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct CreateRecordRequest {
    date: Option<NaiveDate>,
    weight_kg: f64,
    height_cm: f64,
    gender: Option<Gender>,
    #[serde(default)]
    exercises: Vec<ExerciseEntry>,
    city: Option<String>,
}

#[derive(Serialize)]
struct CreateRecordResponse {
    #[serde(flatten)]
    saved: SavedRecord,
    weather: WeatherReport,
    /// Why the weather is unavailable, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    weather_message: Option<String>,
}

#[derive(Deserialize)]
struct FoodQuery {
    q: Option<String>,
    category: Option<String>,
}

#[derive(Deserialize)]
struct ExerciseQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct CreateFoodRequest {
    name: String,
    calories: f64,
    #[serde(default)]
    category: String,
}

#[derive(Deserialize)]
struct CreateExerciseRequest {
    name: String,
    calories_per_minute: f64,
}

#[derive(Serialize)]
struct UpsertResponse<T> {
    outcome: UpsertOutcome,
    item: T,
}

#[derive(Deserialize)]
struct SelectFoodRequest {
    name: String,
}

#[derive(Serialize)]
struct SelectionResponse {
    selection: MealSelection,
    intake: IntakeSummary,
}

#[derive(Serialize)]
struct WeatherResponse {
    weather: WeatherReport,
    suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Deserialize)]
struct PlanRequestBody {
    #[serde(default = "default_goal")]
    goal: Goal,
    #[serde(default = "default_duration")]
    duration: PlanDuration,
}

fn default_goal() -> Goal {
    Goal::Health
}

fn default_duration() -> PlanDuration {
    PlanDuration::Week
}

#[derive(Serialize)]
struct AnalysisResponse {
    health: HealthAnalysis,
    report: AnalysisReport,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    /// An outbound collaborator failed; the message is safe to show.
    Upstream(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<CollaboratorError> for ApiError {
    fn from(err: CollaboratorError) -> Self {
        warn!("collaborator call failed: {err}");
        Self::Upstream(err.user_message())
    }
}

fn bad_request(err: &anyhow::Error) -> ApiError {
    ApiError::BadRequest(format!("{err:#}"))
}

fn parse_date_param(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{s}'. Use YYYY-MM-DD")))
}

fn parse_meal_param(s: &str) -> Result<MealType, ApiError> {
    s.parse().map_err(|e| bad_request(&e))
}

// --- Middleware ---

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected_key);

        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Record handlers ---

async fn list_records(State(state): State<AppState>) -> Json<Vec<DailyRecord>> {
    let diary = state.diary();
    Json(diary.records().into_iter().cloned().collect())
}

async fn create_record(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> Result<(StatusCode, Json<CreateRecordResponse>), ApiError> {
    let city = req
        .city
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CITY.to_string());

    let (weather, weather_message) = match state.weather.current(&city).await {
        Ok(report) => (report, None),
        Err(e) => {
            warn!(%city, "weather lookup failed: {e}");
            (WeatherReport::unavailable(&city), Some(e.user_message()))
        }
    };

    let mut diary = state.diary();
    let input = RecordInput {
        date: req.date.unwrap_or_else(|| Local::now().date_naive()),
        weight_kg: req.weight_kg,
        height_cm: req.height_cm,
        gender: req.gender.unwrap_or(diary.profile().gender),
        exercises: req.exercises,
        city,
    };
    // Validation failures come from compose; storage failures only from the save.
    diary
        .compose_record(&input, &weather)
        .map_err(|e| bad_request(&e))?;
    let saved = diary
        .save_record(&input, &weather)
        .context("failed to save record")?;

    let status = match saved.outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((
        status,
        Json(CreateRecordResponse {
            saved,
            weather,
            weather_message,
        }),
    ))
}

async fn get_record(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DailyRecord>, ApiError> {
    let date = parse_date_param(&date)?;
    let diary = state.diary();
    diary
        .record(date)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No record for {date}")))
}

async fn update_record(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(edit): Json<RecordEdit>,
) -> Result<Json<DailyRecord>, ApiError> {
    let date = parse_date_param(&date)?;
    let mut diary = state.diary();
    if diary.record(date).is_none() {
        return Err(ApiError::NotFound(format!("No record for {date}")));
    }
    let updated = diary.edit_record(date, &edit).map_err(|e| bad_request(&e))?;
    Ok(Json(updated))
}

async fn delete_record(
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<StatusCode, ApiError> {
    let date = parse_date_param(&date)?;
    let mut diary = state.diary();
    if diary
        .delete_record(date)
        .context("failed to delete record")?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No record for {date}")))
    }
}

// --- Export / Import handlers ---

async fn export_records(State(state): State<AppState>) -> Result<Response, ApiError> {
    let bytes = state
        .diary()
        .export_csv()
        .context("failed to export records")?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"health_data.csv\"",
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn import_records(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<ImportSummary>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("CSV body must not be empty".to_string()));
    }
    parse_records(body.as_ref()).map_err(|e| bad_request(&e))?;

    let summary = state
        .diary()
        .import_csv(body.as_ref())
        .context("failed to import records")?;
    Ok(Json(summary))
}

// --- Reference table handlers ---

async fn list_foods(
    State(state): State<AppState>,
    Query(query): Query<FoodQuery>,
) -> Json<Vec<FoodItem>> {
    let diary = state.diary();
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let foods = match query.q.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(q) => diary
            .foods()
            .search(q)
            .into_iter()
            .filter(|f| category.is_none_or(|c| f.category == c))
            .cloned()
            .collect(),
        None => diary.foods().list(category).into_iter().cloned().collect(),
    };
    Json(foods)
}

async fn food_categories(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.diary().foods().categories())
}

async fn create_food(
    State(state): State<AppState>,
    Json(req): Json<CreateFoodRequest>,
) -> Result<(StatusCode, Json<UpsertResponse<FoodItem>>), ApiError> {
    let mut diary = state.diary();
    let outcome = diary
        .foods_mut()
        .upsert(&req.name, req.calories, &req.category)
        .map_err(|e| bad_request(&e))?;
    let item = diary
        .foods()
        .get(req.name.trim())
        .cloned()
        .context("food missing after upsert")?;

    let status = match outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((status, Json(UpsertResponse { outcome, item })))
}

async fn delete_food(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.diary().foods_mut().delete(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No food named '{name}'")))
    }
}

async fn list_exercises(
    State(state): State<AppState>,
    Query(query): Query<ExerciseQuery>,
) -> Json<Vec<ExerciseType>> {
    let needle = query.q.map(|q| q.trim().to_lowercase());
    let diary = state.diary();
    let exercises = diary
        .exercises()
        .list()
        .into_iter()
        .filter(|e| {
            needle
                .as_deref()
                .is_none_or(|n| e.name.to_lowercase().contains(n))
        })
        .cloned()
        .collect();
    Json(exercises)
}

async fn create_exercise(
    State(state): State<AppState>,
    Json(req): Json<CreateExerciseRequest>,
) -> Result<(StatusCode, Json<UpsertResponse<ExerciseType>>), ApiError> {
    let mut diary = state.diary();
    let outcome = diary
        .exercises_mut()
        .upsert(&req.name, req.calories_per_minute)
        .map_err(|e| bad_request(&e))?;
    let item = diary
        .exercises()
        .get(req.name.trim())
        .cloned()
        .context("exercise missing after upsert")?;

    let status = match outcome {
        UpsertOutcome::Inserted => StatusCode::CREATED,
        UpsertOutcome::Updated => StatusCode::OK,
    };
    Ok((status, Json(UpsertResponse { outcome, item })))
}

async fn delete_exercise(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.diary().exercises_mut().delete(&name) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No exercise named '{name}'")))
    }
}

// --- Meal selection handlers ---

fn selection_response(diary: &Diary) -> SelectionResponse {
    SelectionResponse {
        selection: diary.selection().clone(),
        intake: diary.intake(),
    }
}

async fn get_selection(State(state): State<AppState>) -> Json<SelectionResponse> {
    Json(selection_response(&state.diary()))
}

async fn select_food(
    State(state): State<AppState>,
    Path(meal): Path<String>,
    Json(req): Json<SelectFoodRequest>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let meal = parse_meal_param(&meal)?;
    let mut diary = state.diary();
    diary
        .select_food(meal, &req.name)
        .map_err(|e| bad_request(&e))?;
    Ok(Json(selection_response(&diary)))
}

async fn clear_meal(
    State(state): State<AppState>,
    Path(meal): Path<String>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let meal = parse_meal_param(&meal)?;
    let mut diary = state.diary();
    diary.clear_meal(meal);
    Ok(Json(selection_response(&diary)))
}

async fn remove_selected_food(
    State(state): State<AppState>,
    Path((meal, name)): Path<(String, String)>,
) -> Result<Json<SelectionResponse>, ApiError> {
    let meal = parse_meal_param(&meal)?;
    let mut diary = state.diary();
    if !diary.remove_food(meal, &name) {
        return Err(ApiError::NotFound(format!(
            "'{name}' is not selected for {}",
            meal.label()
        )));
    }
    Ok(Json(selection_response(&diary)))
}

// --- Collaborator handlers ---

async fn get_weather(
    State(state): State<AppState>,
    Path(city): Path<String>,
) -> Json<WeatherResponse> {
    let (weather, message) = match state.weather.current(&city).await {
        Ok(report) => (report, None),
        Err(e) => {
            warn!(%city, "weather lookup failed: {e}");
            (WeatherReport::unavailable(&city), Some(e.user_message()))
        }
    };
    let suggestion = weather_exercise_suggestion(&weather.description, weather.temperature_c);
    Json(WeatherResponse {
        weather,
        suggestion,
        message,
    })
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequestBody>,
) -> Result<Json<Plan>, ApiError> {
    let request = state.diary().plan_request(req.goal, req.duration);
    let plan = generate_plan(state.ai.as_ref(), &request).await?;
    Ok(Json(plan))
}

async fn recognize_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FoodRecognition>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Image body must not be empty".to_string()));
    }
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or("image/jpeg")
        .to_string();
    let image = InlineImage {
        mime_type,
        data: body.to_vec(),
    };
    let found = recognize_food(state.ai.as_ref(), image).await?;
    Ok(Json(found))
}

// --- Profile / analysis handlers ---

async fn list_diets() -> Json<Vec<DietPlan>> {
    Json(diets::all())
}

async fn get_profile(State(state): State<AppState>) -> Json<Profile> {
    Json(state.diary().profile().clone())
}

async fn update_profile(
    State(state): State<AppState>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<Profile>, ApiError> {
    let mut diary = state.diary();
    let profile = diary
        .update_profile(&update)
        .map_err(|e| bad_request(&e))?
        .clone();
    if let Some(path) = &state.profile_path {
        profile.save(path).context("failed to save profile")?;
    }
    Ok(Json(profile))
}

async fn get_analysis(State(state): State<AppState>) -> Json<AnalysisResponse> {
    let diary = state.diary();
    Json(AnalysisResponse {
        health: diary.health_analysis(),
        report: diary.analysis(),
    })
}

async fn get_summary(State(state): State<AppState>) -> Json<Overview> {
    Json(state.diary().overview(Local::now().naive_local()))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/records", get(list_records).post(create_record))
        .route(
            "/api/records/{date}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .route("/api/export", get(export_records))
        .route("/api/import", post(import_records))
        .route("/api/foods", get(list_foods).post(create_food))
        .route("/api/foods/categories", get(food_categories))
        .route("/api/foods/{name}", delete(delete_food))
        .route("/api/exercises", get(list_exercises).post(create_exercise))
        .route("/api/exercises/{name}", delete(delete_exercise))
        .route("/api/selection", get(get_selection))
        .route(
            "/api/selection/{meal}",
            post(select_food).delete(clear_meal),
        )
        .route("/api/selection/{meal}/{name}", delete(remove_selected_food))
        .route("/api/weather/{city}", get(get_weather))
        .route("/api/assistant/plan", post(create_plan))
        .route("/api/assistant/recognize", post(recognize_image))
        .route("/api/diets", get(list_diets))
        .route("/api/profile", get(get_profile).put(update_profile))
        .route("/api/analysis", get(get_analysis))
        .route("/api/summary", get(get_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    services: Services,
    port: u16,
    bind: &str,
    api_key: Option<String>,
    new_api_key: bool,
) -> anyhow::Result<()> {
    let records = services.diary.records().len();
    let state = AppState::new(services, api_key.clone());
    let app = build_router(state);

    if let Some(ref key) = api_key {
        if !new_api_key {
            eprintln!(
                "API key: {} (see api_key file in data directory)",
                mask_key(key)
            );
        }
    } else {
        eprintln!("Warning: Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        eprintln!(
            "Warning: Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(records, "diary loaded");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// First and last four characters of the key, or only stars when the key
/// is too short to hide anything.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
