use crate::genre_fallback::fallback_genres;
use crate::pipeline::{apply_filters, build_pool, FilterCriteria, ResultPool};
use crate::tmdb::{CatalogApi, Category, Genre, MovieDetails, MovieSummary, TmdbClient};
use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

// Home mix: how many records each fetched page contributes to the pool.
const HOME_POPULAR_P1: usize = 15;
const HOME_TOP_RATED_P1: usize = 15;
const HOME_UPCOMING_P1: usize = 10;
const HOME_POPULAR_P2: usize = 10;
const HOME_TOP_RATED_P2: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogApi>,
    pub genres: Arc<Vec<Genre>>,
    pub browse: Arc<Mutex<BrowseSession>>,
}

/// The one place browse state lives: active category, current criteria and
/// the pool built for that category. `epoch` implements last-write-wins on
/// category changes: a build that finishes after a newer one began is
/// discarded instead of installed.
#[derive(Debug)]
pub struct BrowseSession {
    pub category: Category,
    pub criteria: FilterCriteria,
    pub pool: ResultPool,
    pub epoch: u64,
}

#[derive(Debug, Serialize)]
pub struct BrowseView {
    pub category: Category,
    pub criteria: FilterCriteria,
    pub pool_size: usize,
    pub movies: Vec<MovieSummary>,
}

pub async fn run_server() -> Result<()> {
    let catalog: Arc<dyn CatalogApi> = Arc::new(TmdbClient::from_env()?);

    let genres = match catalog.genre_list().await {
        Ok(g) => g,
        Err(e) => {
            warn!("Failed to fetch genre list, using fallback: {}", e);
            fallback_genres()
        }
    };
    info!("Serving {} genre filter options", genres.len());

    let mut session = BrowseSession {
        category: Category::Popular,
        criteria: FilterCriteria::default(),
        pool: ResultPool::default(),
        epoch: 0,
    };
    match load_batches(catalog.as_ref(), &session.category).await {
        Ok(batches) => {
            session.pool = build_pool(batches);
            info!("Initial pool loaded with {} movies", session.pool.len());
        }
        Err(e) => warn!(
            "Initial catalog load failed, starting with an empty pool: {:?}",
            e
        ),
    }

    let state = AppState {
        catalog,
        genres: Arc::new(genres),
        browse: Arc::new(Mutex::new(session)),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/genres", get(list_genres))
        .route("/browse", get(get_browse))
        .route("/browse/category", put(set_category))
        .route("/browse/filters", put(set_filters))
        .route("/movie/:id", get(get_movie_details))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn list_genres(State(state): State<AppState>) -> Json<Vec<Genre>> {
    Json(state.genres.as_ref().clone())
}

async fn get_browse(State(state): State<AppState>) -> Json<BrowseView> {
    let session = state.browse.lock().await;
    Json(view_of(&session))
}

/// Category change: refetch the category's page plan, rebuild the pool and
/// run it through the current filters. The previous pool stays displayed
/// whenever any one source fetch fails.
async fn set_category(
    State(state): State<AppState>,
    Json(category): Json<Category>,
) -> Result<Json<BrowseView>, (StatusCode, Json<serde_json::Value>)> {
    let epoch = {
        let mut session = state.browse.lock().await;
        session.epoch += 1;
        session.epoch
    };

    let batches = match load_batches(state.catalog.as_ref(), &category).await {
        Ok(batches) => batches,
        Err(e) => {
            error!("Failed to aggregate {:?}: {:?}", category, e);
            return Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to load movies. Please try again.",
                    "retryable": true,
                })),
            ));
        }
    };
    let pool = build_pool(batches);

    let mut session = state.browse.lock().await;
    if session.epoch == epoch {
        info!("Switched to {:?} with a pool of {}", category, pool.len());
        session.category = category;
        session.pool = pool;
    } else {
        debug!("Discarding superseded pool for {:?}", category);
    }
    Ok(Json(view_of(&session)))
}

/// Criteria change: reapply against the currently loaded pool, no refetch.
async fn set_filters(
    State(state): State<AppState>,
    Json(criteria): Json<FilterCriteria>,
) -> Json<BrowseView> {
    let mut session = state.browse.lock().await;
    session.criteria = criteria;
    Json(view_of(&session))
}

async fn get_movie_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MovieDetails>, (StatusCode, Json<serde_json::Value>)> {
    match state.catalog.movie_details(id).await {
        Ok(details) => Ok(Json(details)),
        Err(e) => {
            warn!("Failed to fetch details for movie {}: {:?}", id, e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Failed to load movie details. Please try again.",
                    "retryable": true,
                })),
            ))
        }
    }
}

fn view_of(session: &BrowseSession) -> BrowseView {
    let movies = apply_filters(&session.pool, &session.criteria);
    BrowseView {
        category: session.category.clone(),
        criteria: session.criteria.clone(),
        pool_size: session.pool.len(),
        movies,
    }
}

/// Fetch the page plan for a category. All pages of a plan are requested
/// concurrently and joined before the pipeline runs; one failed request
/// fails the whole aggregation so a partial pool never under-represents a
/// source category.
async fn load_batches(
    catalog: &dyn CatalogApi,
    category: &Category,
) -> Result<Vec<Vec<MovieSummary>>> {
    match category {
        // The home view mixes all three listings for variety.
        Category::Popular => {
            let (pop1, pop2, top1, top2, up1, up2) = tokio::try_join!(
                catalog.popular(1),
                catalog.popular(2),
                catalog.top_rated(1),
                catalog.top_rated(2),
                catalog.upcoming(1),
                catalog.upcoming(2),
            )?;
            Ok(vec![
                take(pop1.results, HOME_POPULAR_P1),
                take(top1.results, HOME_TOP_RATED_P1),
                take(up1.results, HOME_UPCOMING_P1),
                take(pop2.results, HOME_POPULAR_P2),
                take(top2.results, HOME_TOP_RATED_P2),
            ])
        }
        Category::TopRated => {
            let (p1, p2, p3) = tokio::try_join!(
                catalog.top_rated(1),
                catalog.top_rated(2),
                catalog.top_rated(3),
            )?;
            Ok(vec![p1.results, p2.results, p3.results])
        }
        Category::Upcoming => {
            let (p1, p2, p3) = tokio::try_join!(
                catalog.upcoming(1),
                catalog.upcoming(2),
                catalog.upcoming(3),
            )?;
            Ok(vec![p1.results, p2.results, p3.results])
        }
        Category::Search { query } => {
            let (p1, p2) = tokio::try_join!(catalog.search(query, 1), catalog.search(query, 2))?;
            Ok(vec![p1.results, p2.results])
        }
    }
}

fn take(mut results: Vec<MovieSummary>, n: usize) -> Vec<MovieSummary> {
    results.truncate(n);
    results
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
