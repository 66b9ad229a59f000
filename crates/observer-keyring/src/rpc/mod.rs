pub mod jsonrpc;
pub mod methods;
pub mod router;
pub mod server;
