//! HTTP client and token manager for the BragerOne REST API.

pub mod cache;
pub mod client;
pub mod error;
pub mod token;
pub mod token_store;

pub use client::{ConnectVariant, CredentialsProvider, HttpClient, HttpClientConfig};
pub use error::HttpError;
pub use token::Token;
pub use token_store::{NullTokenStore, TokenStore};
