// tests/profile_tests.rs

use linkup::{config::Config, realtime::notifier::Notifier, routes, state::AppState};
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "profile_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        upload_dir: "test_uploads".to_string(),
    };

    let state = AppState {
        pool,
        config,
        notifier: Notifier::new(),
    };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

async fn register_and_login(client: &reqwest::Client, address: &str, username: &str) -> String {
    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({
            "username": username,
            "email": format!("{}@example.com", username),
            "password": "password123"
        }))
        .send()
        .await
        .expect("Register failed");

    let login = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({
            "username": username,
            "password": "password123"
        }))
        .send()
        .await
        .expect("Login failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json");

    login["token"].as_str().expect("Token not found").to_string()
}

async fn follow(client: &reqwest::Client, address: &str, token: &str, username: &str) -> u16 {
    client
        .post(format!("{}/api/users/{}/follow", address, username))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

#[tokio::test]
async fn profile_update_and_counts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let username = unique_name("pa");
    let token = register_and_login(&client, &address, &username).await;

    // Fresh account: empty profile, zero counts
    let me: serde_json::Value = client
        .get(format!("{}/api/profile/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["username"], username.as_str());
    assert_eq!(me["posts_count"], 0);
    assert_eq!(me["followers_count"], 0);
    assert_eq!(me["theme"], "light");

    // Partial update leaves untouched fields alone
    let me: serde_json::Value = client
        .put(format!("{}/api/profile/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "description": "rustacean",
            "gender": "other",
            "age": 30,
            "theme": "dark"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["description"], "rustacean");
    assert_eq!(me["gender"], "other");
    assert_eq!(me["age"], 30);
    assert_eq!(me["theme"], "dark");
    assert_eq!(me["studies"], "");

    // Out-of-range age is rejected
    let response = client
        .put(format!("{}/api/profile/me", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({ "age": 12 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn public_profile_hides_private_fields() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user_a = unique_name("pub_a");
    let user_b = unique_name("pub_b");
    let token_a = register_and_login(&client, &address, &user_a).await;
    let _token_b = register_and_login(&client, &address, &user_b).await;

    let profile: serde_json::Value = client
        .get(format!("{}/api/users/{}", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(profile["username"], user_b.as_str());
    assert!(profile.get("email").is_none());
    assert!(profile.get("password").is_none());
    assert_eq!(profile["is_following"], false);
}

#[tokio::test]
async fn follow_unfollow_flow() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user_a = unique_name("fa");
    let user_b = unique_name("fb");
    let token_a = register_and_login(&client, &address, &user_a).await;
    let _token_b = register_and_login(&client, &address, &user_b).await;

    // Self-follow is rejected outright
    assert_eq!(follow(&client, &address, &token_a, &user_a).await, 400);

    // First follow works, second conflicts
    assert_eq!(follow(&client, &address, &token_a, &user_b).await, 200);
    assert_eq!(follow(&client, &address, &token_a, &user_b).await, 409);

    // Follow state shows up on the public profile
    let profile: serde_json::Value = client
        .get(format!("{}/api/users/{}", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(profile["is_following"], true);
    assert_eq!(profile["followers_count"], 1);

    // And in the follower list
    let followers: Vec<serde_json::Value> = client
        .get(format!("{}/api/users/{}/followers", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(followers.iter().any(|u| u["username"] == user_a.as_str()));

    // Unfollow once works, twice conflicts
    let response = client
        .delete(format!("{}/api/users/{}/follow", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .delete(format!("{}/api/users/{}/follow", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 409);

    // Unknown target is a 404
    let response = client
        .post(format!("{}/api/users/no_such_user_xyz/follow", address))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn account_deletion_cascades() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let user_a = unique_name("da");
    let user_b = unique_name("db");
    let token_a = register_and_login(&client, &address, &user_a).await;
    let token_b = register_and_login(&client, &address, &user_b).await;

    // Mutual follow so they can chat
    follow(&client, &address, &token_a, &user_b).await;
    follow(&client, &address, &token_b, &user_a).await;

    // A posts, B likes it
    let form = reqwest::multipart::Form::new().text("content", "soon to lose a like");
    let post: serde_json::Value = client
        .post(format!("{}/api/posts", address))
        .header("Authorization", format!("Bearer {}", token_a))
        .multipart(form)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let post_id = post["id"].as_i64().unwrap();

    client
        .post(format!("{}/api/posts/{}/like", address, post_id))
        .header("Authorization", format!("Bearer {}", token_b))
        .send()
        .await
        .unwrap();

    // B opens a conversation with A and says hi
    let conversation: serde_json::Value = client
        .post(format!("{}/api/chat/conversation/{}", address, user_a))
        .header("Authorization", format!("Bearer {}", token_b))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let conversation_id = conversation["id"].as_i64().unwrap();

    let form = reqwest::multipart::Form::new()
        .text("conversation_id", conversation_id.to_string())
        .text("content", "hi");
    client
        .post(format!("{}/api/chat/message", address))
        .header("Authorization", format!("Bearer {}", token_b))
        .multipart(form)
        .send()
        .await
        .unwrap();

    // B deletes their account
    let response = client
        .delete(format!("{}/api/profile/me", address))
        .header("Authorization", format!("Bearer {}", token_b))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    // The like came back off A's post
    let post: serde_json::Value = client
        .get(format!("{}/api/posts/{}", address, post_id))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(post["likes_count"], 0);

    // The two-party conversation and its messages are gone from A's inbox
    let inbox: Vec<serde_json::Value> = client
        .get(format!("{}/api/chat/conversations", address))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!inbox.iter().any(|c| c["id"].as_i64() == Some(conversation_id)));

    // And the conversation record itself no longer resolves
    let response = client
        .get(format!(
            "{}/api/chat/conversation/{}/messages",
            address, conversation_id
        ))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // B's public profile is gone too
    let response = client
        .get(format!("{}/api/users/{}", address, user_b))
        .header("Authorization", format!("Bearer {}", token_a))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}
