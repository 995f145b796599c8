//! Demonstrates plugging a non-reqwest transport into the session client.
//!
//! 1. Implement [`ApiTransport`] by turning an [`OutboundRequest`] into an [`ApiResponse`].
//! 2. Hand the transport to [`SessionClient::new`] together with a token store and descriptor.
//! 3. Observe how the client recovers from `401` responses when the refresh token is rejected:
//!    catalogue reads fall back to anonymous access while writes report the original failure.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use serde_json::{Value, json};
use url::Url;
// self
use session_broker::{
	descriptor::ApiDescriptor,
	flows::SessionClient,
	http::{ApiRequest, ApiResponse, ApiTransport, OutboundRequest, TransportFuture},
	store::{ChangeReason, MemoryStorage, TokenStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let storage = Arc::new(MemoryStorage::seeded("revoked-access", "revoked-refresh"));
	let store = Arc::new(TokenStore::new(storage));
	let _expiry = store.subscribe(|change| {
		if change.reason == ChangeReason::Expired {
			println!("Session expired; the UI would show a sign-in banner now.");
		}
	});
	let descriptor = ApiDescriptor::new(Url::parse("https://shop.example.com/api/")?)?;
	let client = SessionClient::new(StaticStorefront, store.clone(), descriptor);
	let products: Value = client.get_json("products/").await?;

	println!("Catalogue served anonymously: {products}.");

	let order = ApiRequest::post("orders/").json(&json!({ "items": [{ "product": 1 }] }))?;

	match client.send(order).await {
		Ok(_) => println!("Order unexpectedly accepted."),
		Err(e) => println!("Order rejected as expected: {e}"),
	}

	println!("Tokens left in the store: {:?}.", store.get());

	Ok(())
}

// Serves a public catalogue and rejects every token, including the refresh token.
struct StaticStorefront;
impl ApiTransport for StaticStorefront {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let path = request.url.path();

			if path.ends_with("/auth/refresh/") {
				return Ok(ApiResponse::new(401, "{\"detail\":\"Token is blacklisted\"}"));
			}
			if request.authorization().is_some() {
				return Ok(ApiResponse::new(401, "{\"detail\":\"Token is invalid or expired\"}"));
			}
			if path.ends_with("/products/") {
				return Ok(ApiResponse::json_body(200, &json!([{ "id": 1, "name": "Mug" }])));
			}

			Ok(ApiResponse::new(401, "{\"detail\":\"Authentication required\"}"))
		})
	}
}
