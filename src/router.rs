//! Route assembly (spec §6). `/_/api/data/*` is the PostgREST-style
//! public surface, gated by RLS/JWT rather than a dashboard session.
//! Everything else under `/_/api` is operator tooling and requires a
//! live dashboard session.

use crate::handlers;
use crate::middleware::{record_request_metrics, require_session};
use crate::state::AppState;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

fn data_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/data/{table}",
            get(handlers::data::select)
                .post(handlers::data::insert)
                .patch(handlers::data::update)
                .delete(handlers::data::delete),
        )
        .route("/fts/{index_name}/search", get(handlers::fts::search))
        .with_state(state)
}

fn dashboard_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/tables", get(handlers::tables::list_tables).post(handlers::tables::create_table))
        .route(
            "/tables/{table}",
            get(handlers::tables::list_columns).delete(handlers::tables::drop_table),
        )
        .route("/tables/{table}/columns", post(handlers::tables::add_column))
        .route("/tables/{table}/columns/rename", patch(handlers::tables::rename_column))
        .route(
            "/tables/{table}/columns/{column}",
            delete(handlers::tables::drop_column),
        )
        .route(
            "/tables/{table}/rls",
            get(handlers::tables::get_rls_status).patch(handlers::tables::set_rls_status),
        )
        .route(
            "/policies/{table}",
            get(handlers::policies::list_policies).post(handlers::policies::create_policy),
        )
        .route(
            "/policies/{table}/{policy_name}",
            patch(handlers::policies::update_policy).delete(handlers::policies::drop_policy),
        )
        .route("/policies/{table}/enable", put(handlers::policies::enable_rls))
        .route("/policies/{table}/disable", put(handlers::policies::disable_rls))
        .route("/policies/test", post(handlers::policies::test_policy))
        .route("/sql", post(handlers::sql::run))
        .route("/export/schema.sql", get(handlers::export::schema_sql))
        .route("/export/rls", get(handlers::export::rls_sql))
        .route("/export/data/{table}.csv", get(handlers::export::table_csv))
        .route("/export/data/{table}.json", get(handlers::export::table_json))
        .route("/export/bundle.zip", get(handlers::export::bundle))
        .route("/export/backup", get(handlers::export::backup))
        .route(
            "/fts/{index_name}",
            post(handlers::fts::create_index).delete(handlers::fts::drop_index),
        )
        .route("/fts/{index_name}/rebuild", post(handlers::fts::rebuild_index))
        .route("/observability/metrics", get(handlers::observability::metrics))
        .route("/observability/traces", get(handlers::observability::traces))
        .route("/observability/status", get(handlers::observability::status))
        .route("/settings", get(handlers::settings::list_settings))
        .route("/settings/{key}", put(handlers::settings::set_setting))
        .route(
            "/email-templates/{name}",
            get(handlers::settings::get_template).put(handlers::settings::set_template),
        )
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users", get(handlers::users::list_users).post(handlers::users::invite_user))
        .route("/users/{id}", delete(handlers::users::delete_user))
        .route("/users/batch-delete", post(handlers::users::batch_delete_users))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_session))
        .with_state(state)
}

fn public_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/status", get(handlers::auth::status))
        .route("/auth/setup", post(handlers::auth::setup))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/token", post(handlers::auth::token))
        .route("/auth/anonymous", post(handlers::auth::anonymous_token))
        .route("/auth/accept-invite", post(handlers::users::accept_invite))
        .with_state(state)
}

/// Build the full application router.
#[must_use]
pub fn build(state: AppState) -> Router {
    let api = Router::new()
        .merge(public_api_router(state.clone()))
        .merge(data_router(state.clone()))
        .merge(dashboard_router(state.clone()));

    Router::new()
        .nest("/_/api", api)
        .with_state(state.clone())
        .layer(axum::middleware::from_fn_with_state(state, record_request_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}
