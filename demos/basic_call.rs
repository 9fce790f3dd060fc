//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create an HTTP retryer around a `reqwest` client
//! - Decode a JSON response with `call`
//! - Build a fresh POST request for every attempt
//! - Work with the raw response returned by `send`
//!
//! Run with: `cargo run --example basic_call`

use http::StatusCode;
use retryer::{Context, Error, HttpRetryer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

const BASE_URL: &str = "https://jsonplaceholder.typicode.com";

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("retryer=debug,basic_call=info")
        .init();

    let client = reqwest::Client::new();
    let retryer = HttpRetryer::new().client(client.clone());
    let ctx = Context::background();

    println!("=== GET Request Example ===");
    let post: Post = retryer
        .call(
            &ctx,
            |_ctx| Ok(client.get(format!("{BASE_URL}/posts/1")).build()?),
            &[StatusCode::OK],
        )
        .await?;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!("Body: {}", post.body);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let created: Post = retryer
        .call(
            &ctx,
            |_ctx| {
                Ok(client
                    .post(format!("{BASE_URL}/posts"))
                    .json(&new_post)
                    .build()?)
            },
            &[StatusCode::CREATED],
        )
        .await?;

    println!("Created post ID: {}", created.id);
    println!("Title: {}", created.title);
    println!();

    println!("=== Raw Response Example ===");
    let response = retryer
        .send(
            &ctx,
            |_ctx| Ok(client.head(format!("{BASE_URL}/posts/1")).build()?),
            &[StatusCode::OK],
        )
        .await?;

    println!("Status code: {}", response.status());
    println!("Content-Type: {:?}", response.headers().get("content-type"));

    Ok(())
}
