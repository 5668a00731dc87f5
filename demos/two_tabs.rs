//! Demonstrates two browsing contexts of one origin sharing a session: a sign-in in the first
//! tab is adopted by the second, an expired access token is renewed once, and a sign-out in
//! the first tab sends the second back to the login view.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use parking_lot::Mutex;
// self
use tab_session::{
	config::SessionConfig,
	exchange::{Credentials, HttpExchange},
	flows::{SessionBackends, SessionManager},
	guard::Navigator,
	http::{ApiRequest, ReqwestTransport},
	store::MemoryStorage,
	sync::MemoryBroadcast,
	url::Url,
};

#[derive(Debug)]
struct Location(Mutex<String>);
impl Navigator for Location {
	fn current_path(&self) -> String {
		self.0.lock().clone()
	}

	fn navigate(&self, path: &str) {
		println!("  navigate -> {path}");

		*self.0.lock() = path.into();
	}
}

fn open_tab(
	config: &SessionConfig,
	storage: &MemoryStorage,
	channel: &MemoryBroadcast,
	path: &str,
) -> Result<(SessionManager, Arc<Location>)> {
	let transport = Arc::new(ReqwestTransport::new(config.api_base.clone())?);
	let exchange = Arc::new(HttpExchange::new(transport.clone(), config.endpoints.clone()));
	let location = Arc::new(Location(Mutex::new(path.into())));
	let tab = SessionManager::with_backends(
		config.clone(),
		SessionBackends {
			storage: Arc::new(storage.sibling()),
			broadcast: Some(Arc::new(channel.sibling())),
			transport,
			exchange,
		},
	)
	.with_navigator(location.clone());

	Ok((tab, location))
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(200).json_body(serde_json::json!({
				"access_token": "demo-access-1",
				"refresh_token": "demo-refresh-1",
				"token_type": "bearer",
				"expires_in": 1800
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/users/me");
			then.status(200).json_body(serde_json::json!({
				"id": "42",
				"email": "ada@example.com",
				"username": "ada"
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/items").header("authorization", "Bearer demo-access-1");
			then.status(401).json_body(serde_json::json!({"detail": "Token has expired"}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(200).json_body(serde_json::json!({
				"access_token": "demo-access-2",
				"refresh_token": "demo-refresh-2",
				"token_type": "bearer",
				"expires_in": 1800
			}));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v1/items").header("authorization", "Bearer demo-access-2");
			then.status(200).json_body(serde_json::json!([{"id": 1}]));
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/logout");
			then.status(204);
		})
		.await;

	let config = SessionConfig::builder(Url::parse(&server.base_url())?).build()?;
	let storage = MemoryStorage::new();
	let channel = MemoryBroadcast::new();
	let (first, _) = open_tab(&config, &storage, &channel, "/login?redirect=%2Fitems")?;
	let (second, second_location) = open_tab(&config, &storage, &channel, "/login")?;

	println!("First tab signs in:");

	let user = first.login(&Credentials::new("ada@example.com", "correct horse")).await?;

	println!("  signed in as {}", user.username);
	println!("Second tab pumps:");
	println!("  {:?}", second.pump().actions);

	println!("First tab hits an expired token:");

	let response = first.request(ApiRequest::get("/api/v1/items")).await?;

	println!(
		"  status {} after {} renewal(s)",
		response.status,
		first.coordinator().metrics().exchanges()
	);
	println!("Second tab pumps:");
	println!("  {:?}", second.pump().actions);
	println!("  second tab now presents {:?}", second.snapshot().access_token());

	println!("First tab signs out:");

	first.logout().await?;

	println!("Second tab pumps:");
	println!("  {:?}", second.pump().actions);
	println!("  second tab is at {}", second_location.current_path());

	Ok(())
}
