mod error;
pub use error::{Error, Result};

pub mod ext_axum;
pub mod ext_oauth2;

pub mod client;
pub mod config;
pub mod token;

pub mod id_token;
pub mod identity_pool;
pub mod oauth_code;
pub mod oauth_refresh_token;
pub mod sts_assume_role;

pub mod console_signin;
pub mod federation;
pub mod session_cookie;
pub mod sign_in;

pub mod device_client;
pub mod device_flow;
pub mod device_store;
pub mod pages;

pub mod server;
pub mod terminal;

pub mod cmd;
