//! Demonstrates a storefront session against a mock backend using the default reqwest transport:
//! login, an authorized call that survives a server-side token rejection through one refresh,
//! and logout.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::{Value, json};
use url::Url;
// self
use session_broker::{
	descriptor::ApiDescriptor,
	flows::SessionClient,
	http::ReqwestTransport,
	session::SessionContext,
	store::TokenStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login/");
			then.status(200)
				.header("content-type", "application/json")
				.body(json!({ "access": "access-1", "refresh": "refresh-1" }).to_string());
		})
		.await;
	let _me = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/auth/me/");
			then.status(200).header("content-type", "application/json").body(
				json!({ "id": 1, "email": "ana@example.com", "first_name": "Ana", "last_name": "Rojas" })
					.to_string(),
			);
		})
		.await;
	// The backend revoked `access-1`; the client refreshes once and retries.
	let _stale = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/orders/").header("authorization", "Bearer access-1");
			then.status(401).body("{\"detail\":\"Token is invalid or expired\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh/");
			then.status(200)
				.header("content-type", "application/json")
				.body(json!({ "access": "access-2" }).to_string());
		})
		.await;
	let _orders = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/orders/").header("authorization", "Bearer access-2");
			then.status(200)
				.header("content-type", "application/json")
				.body(json!([{ "id": 42, "status": "PAID" }]).to_string());
		})
		.await;
	let _logout = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout/");
			then.status(200).body("{\"detail\":\"Sesion finalizada.\"}");
		})
		.await;
	let descriptor = ApiDescriptor::new(Url::parse(&server.url("/api/"))?)?;
	let store = Arc::new(TokenStore::in_memory());
	let client = SessionClient::new(ReqwestTransport::default(), store, descriptor);
	let session = SessionContext::new(client)?;
	let user = session.login("ana@example.com", "s3cret").await?;

	println!("Signed in as {}.", user.display_name());

	let orders: Value = session.client().get_json("orders/").await?;

	println!("Orders after one transparent refresh: {orders}.");
	println!("Refresh exchanges sent: {}.", session.client().refresh_metrics().attempts());

	session.logout().await;

	println!("Authenticated after logout: {}.", session.is_authenticated());

	login.assert_async().await;
	refresh.assert_calls_async(1).await;

	Ok(())
}
