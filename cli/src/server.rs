use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use basket_core::db::{is_constraint_violation, is_not_found};
use basket_core::models::{
    ExtraIngredient, Ingredient, MenuEntry, MenuItem, NewExtraIngredient, Recipe, RecipeDetail,
    RecipeIngredientUpsert, RecipeSearch, RecipeUpsert, Scoped, ShoppingListLine, Subcategory,
    UserId, is_validation_error,
};
use basket_core::service::BasketService;
use basket_core::session::{ApiKeySessions, SessionResolver};

const BODY_LIMIT: usize = 1024 * 1024; // 1 MB

#[derive(Clone)]
struct AppState {
    svc: Arc<Mutex<BasketService>>,
    sessions: Arc<dyn SessionResolver>,
}

impl AppState {
    fn svc(&self) -> MutexGuard<'_, BasketService> {
        self.svc.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// User resolved from the request's bearer key, if any.
#[derive(Clone)]
struct CurrentUser(Option<UserId>);

// --- Request / Response types ---

#[derive(Deserialize)]
struct RecipeQuery {
    #[serde(default)]
    q: String,
    #[serde(default)]
    by: RecipeSearch,
}

#[derive(Deserialize)]
struct IngredientRequest {
    #[serde(default)]
    id: Option<String>,
    ingredient_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    quantity: Decimal,
    #[serde(default)]
    unit: String,
}

#[derive(Deserialize)]
struct AddToMenuRequest {
    recipe_id: String,
    portions: Option<i64>,
}

#[derive(Serialize)]
struct IdResponse {
    id: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized,
    Conflict(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Not signed in".to_string()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(err) => {
                tracing::error!("Internal server error: {err:#}");
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
        if is_not_found(&err) {
            Self::NotFound(err.to_string())
        } else if is_validation_error(&err) {
            Self::BadRequest(err.to_string())
        } else if is_constraint_violation(&err) {
            tracing::debug!("constraint violation: {err:#}");
            Self::Conflict("Conflicts with existing data".to_string())
        } else {
            Self::Internal(err)
        }
    }
}

fn signed_in<T>(scoped: Scoped<T>) -> Result<T, ApiError> {
    scoped.into_option().ok_or(ApiError::Unauthorized)
}

// --- Middleware ---

async fn resolve_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let user = {
        let token = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        state.sessions.resolve(token)
    };
    request.extensions_mut().insert(CurrentUser(user));
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

// --- Recipe handlers ---

async fn search_recipes(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(params): Query<RecipeQuery>,
) -> Result<Json<Vec<Recipe>>, ApiError> {
    let recipes = state
        .svc()
        .search_recipes(user.as_ref(), params.by, &params.q)?;
    Ok(Json(signed_in(recipes)?))
}

async fn upsert_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<RecipeUpsert>,
) -> Result<Json<IdResponse>, ApiError> {
    let id = signed_in(state.svc().upsert_recipe(user.as_ref(), &req)?)?;
    Ok(Json(IdResponse { id }))
}

async fn get_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let detail = signed_in(state.svc().get_recipe(user.as_ref(), &id)?)?
        .ok_or_else(|| ApiError::NotFound(format!("Recipe {id} not found")))?;
    Ok(Json(detail))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    signed_in(state.svc().delete_recipe(user.as_ref(), &id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert_ingredient(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(recipe_id): Path<String>,
    Json(req): Json<IngredientRequest>,
) -> Result<Json<IdResponse>, ApiError> {
    let ingredient = RecipeIngredientUpsert {
        id: req.id,
        recipe_id,
        ingredient_name: req.ingredient_name,
        quantity: req.quantity,
        unit: req.unit,
    };
    let id = signed_in(
        state
            .svc()
            .upsert_recipe_ingredient(user.as_ref(), &ingredient)?,
    )?;
    Ok(Json(IdResponse { id }))
}

async fn delete_ingredient(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path((recipe_id, ingredient_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let removed = signed_in(state.svc().delete_recipe_ingredient(
        user.as_ref(),
        &recipe_id,
        &ingredient_id,
    )?)?;
    if !removed {
        return Err(ApiError::NotFound(format!(
            "Ingredient {ingredient_id} not found in recipe {recipe_id}"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Menu handlers ---

async fn list_menu(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<MenuItem>>, ApiError> {
    let menu = signed_in(state.svc().list_menu(user.as_ref())?)?;
    Ok(Json(menu))
}

async fn add_to_menu(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<AddToMenuRequest>,
) -> Result<(StatusCode, Json<MenuEntry>), ApiError> {
    let svc = state.svc();
    let user = user.as_ref();
    let portions = match req.portions {
        Some(portions) => portions,
        None => {
            signed_in(svc.get_recipe(user, &req.recipe_id)?)?
                .ok_or_else(|| ApiError::NotFound(format!("Recipe {} not found", req.recipe_id)))?
                .recipe
                .portions
        }
    };
    let entry = signed_in(svc.add_to_menu(user, &req.recipe_id, portions)?)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn remove_from_menu(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(recipe_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    signed_in(state.svc().remove_from_menu(user.as_ref(), &recipe_id)?)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Shopping list and catalog handlers ---

async fn shopping_list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<ShoppingListLine>>, ApiError> {
    let lines = signed_in(state.svc().shopping_list(user.as_ref())?)?;
    Ok(Json(lines))
}

async fn store_order(State(state): State<AppState>) -> Result<Json<Vec<Subcategory>>, ApiError> {
    let order = state
        .svc()
        .store_order()
        .context("failed to load store order")?;
    Ok(Json(order))
}

async fn list_ingredients(State(state): State<AppState>) -> Result<Json<Vec<Ingredient>>, ApiError> {
    let ingredients = state
        .svc()
        .list_ingredients()
        .context("failed to load ingredients")?;
    Ok(Json(ingredients))
}

// --- Extra ingredient handlers ---

async fn list_extra_ingredients(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<ExtraIngredient>>, ApiError> {
    let extras = signed_in(state.svc().list_extra_ingredients(user.as_ref())?)?;
    Ok(Json(extras))
}

async fn upsert_extra_ingredient(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(req): Json<NewExtraIngredient>,
) -> Result<Json<ExtraIngredient>, ApiError> {
    let extra = signed_in(state.svc().upsert_extra_ingredient(user.as_ref(), &req)?)?;
    Ok(Json(extra))
}

async fn remove_extra_ingredient(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !signed_in(state.svc().remove_extra_ingredient(user.as_ref(), &name)?)? {
        return Err(ApiError::NotFound(format!(
            "Extra ingredient '{name}' not found"
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/recipes", get(search_recipes).post(upsert_recipe))
        .route("/api/recipes/{id}", get(get_recipe).delete(delete_recipe))
        .route("/api/recipes/{id}/ingredients", put(upsert_ingredient))
        .route(
            "/api/recipes/{id}/ingredients/{ingredient_id}",
            delete(delete_ingredient),
        )
        .route("/api/menu", get(list_menu).post(add_to_menu))
        .route("/api/menu/{recipe_id}", delete(remove_from_menu))
        .route("/api/shopping-list", get(shopping_list))
        .route("/api/store-order", get(store_order))
        .route("/api/ingredients", get(list_ingredients))
        .route(
            "/api/extra-ingredients",
            get(list_extra_ingredients).put(upsert_extra_ingredient),
        )
        .route(
            "/api/extra-ingredients/{name}",
            delete(remove_extra_ingredient),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    svc: BasketService,
    sessions: ApiKeySessions,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    if sessions.is_empty() {
        tracing::warn!(
            "No API keys configured; every request is unauthenticated. Create one with: basket key create <user>"
        );
    } else {
        tracing::info!(keys = sessions.len(), "loaded API keys");
    }

    let state = AppState {
        svc: Arc::new(Mutex::new(svc)),
        sessions: Arc::new(sessions),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    tracing::info!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}
