// Cloud relay client modules
//
// REST client for the `{ error, msg, data }` API plus the WebSocket
// session it starts once authenticated.

pub mod auth;
pub mod client;
pub mod devices;
pub mod models;

pub use client::CloudClient;
pub use models::CloudDevice;
