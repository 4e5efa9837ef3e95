// src/routes.rs

use axum::{
    Router, http::Method, middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{auth, chat, follow, interaction, posts, profile},
    realtime::connection,
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (auth, profile, users, posts, chat).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (database pool, config, notifier).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        "http://localhost:5173".parse().unwrap(),
        "http://127.0.0.1:5173".parse().unwrap(),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password));

    let profile_routes = Router::new()
        .route(
            "/me",
            get(profile::get_me)
                .put(profile::update_me)
                .delete(profile::delete_me),
        )
        .route("/me/avatar", post(profile::upload_avatar))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let user_routes = Router::new()
        .route("/{username}", get(profile::get_user))
        .route(
            "/{username}/follow",
            post(follow::follow_user).delete(follow::unfollow_user),
        )
        .route("/{username}/followers", get(follow::list_followers))
        .route("/{username}/following", get(follow::list_following))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let post_routes = Router::new()
        .route("/", post(posts::create_post).get(posts::list_posts))
        .route("/{id}", get(posts::get_post).delete(posts::delete_post))
        .route(
            "/{id}/like",
            post(interaction::like_post).delete(interaction::unlike_post),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // The same segment must use one parameter name across routes, so
    // "{target}" stands for a username on the POST and an id on the GET.
    let chat_routes = Router::new()
        .route("/can-chat/{username}", get(chat::can_chat))
        .route("/conversation/{target}", post(chat::open_conversation))
        .route("/conversation/{target}/messages", get(chat::list_messages))
        .route("/conversations", get(chat::list_conversations))
        .route("/message", post(chat::send_message))
        .route("/message/{id}", delete(chat::delete_message))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/profile", profile_routes)
        .nest("/api/users", user_routes)
        .nest("/api/posts", post_routes)
        .nest("/api/chat", chat_routes)
        // The socket authenticates itself from the handshake query.
        .route("/ws", get(connection::ws_handler))
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir))
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
