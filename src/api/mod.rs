//! API Module
//!
//! HTTP handlers and routing that put a cache instance behind a REST API.
//!
//! # Endpoints
//! - `PUT /set` - Store a key-value pair
//! - `GET /get/:key` - Retrieve a value by key
//! - `DELETE /del/:key` - Delete a key
//! - `POST /incr/:key`, `POST /decr/:key` - Update a counter
//! - `GET /exists/:key` - Check a key
//! - `DELETE /flush` - Clear the cache
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
