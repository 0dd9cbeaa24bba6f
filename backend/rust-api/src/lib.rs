use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod policy;
pub mod services;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: std::sync::Arc<services::AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any); // TODO: restrict to specific origins in production

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/auth", auth_routes(app_state.clone()))
        .nest(
            "/api/teachers",
            teacher_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/students",
            student_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/exams",
            exam_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/results",
            result_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        .nest(
            "/api/chats",
            chat_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::auth_middleware,
            )),
        )
        // Websocket authenticates via query token inside the handler.
        .route("/ws/chat/{chat_id}", get(handlers::ws::chat_socket))
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn auth_routes(
    app_state: std::sync::Arc<services::AppState>,
) -> Router<std::sync::Arc<services::AppState>> {
    let public_routes = Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/password-reset", post(handlers::auth::password_reset))
        .route(
            "/password-reset/confirm",
            post(handlers::auth::password_reset_confirm),
        );

    let protected_routes = Router::new()
        .route("/logout", post(handlers::auth::logout))
        .route_layer(middleware::from_fn_with_state(
            app_state,
            middlewares::auth::auth_middleware,
        ));

    public_routes.merge(protected_routes)
}

fn teacher_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::teachers::list_teachers).post(handlers::teachers::create_teacher),
        )
        .route("/me", get(handlers::teachers::me))
        .route(
            "/{id}",
            get(handlers::teachers::get_teacher)
                .patch(handlers::teachers::update_teacher)
                .delete(handlers::teachers::delete_teacher),
        )
        .route(
            "/{id}/students",
            get(handlers::teachers::list_assigned_students),
        )
}

fn student_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::students::list_students).post(handlers::students::create_student),
        )
        .route("/me", get(handlers::students::me))
        .route("/me/results", get(handlers::results::my_results))
        .route(
            "/{id}",
            get(handlers::students::get_student)
                .patch(handlers::students::update_student)
                .delete(handlers::students::delete_student),
        )
}

fn exam_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::exams::list_exams).post(handlers::exams::create_exam),
        )
        .route("/unattempted", get(handlers::exams::unattempted_exams))
        .route(
            "/{id}",
            get(handlers::exams::get_exam)
                .put(handlers::exams::update_exam)
                .delete(handlers::exams::delete_exam),
        )
        .route("/{id}/submit", post(handlers::exams::submit_exam))
        .route("/{id}/results", get(handlers::results::exam_results))
}

fn result_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new().route("/class/{class_id}", get(handlers::results::class_results))
}

fn chat_routes() -> Router<std::sync::Arc<services::AppState>> {
    Router::new()
        .route(
            "/",
            get(handlers::chats::list_chats).post(handlers::chats::create_chat),
        )
        .route("/{id}", get(handlers::chats::get_chat))
        .route("/{id}/messages", get(handlers::chats::list_messages))
}
