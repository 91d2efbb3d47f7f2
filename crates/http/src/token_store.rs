use async_trait::async_trait;

use crate::token::Token;

/// Persistence seam for tokens across process restarts. Spec explicitly
/// excludes concrete keyring/file implementations from this crate (they
/// are external collaborators); only the trait and a no-op default ship
/// here, mirroring `set_token_store`/`_token_loader`/`_token_saver`/
/// `_token_clearer` in `api/client.py`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn load(&self) -> Option<Token>;
    async fn save(&self, token: &Token);
    async fn clear(&self);
}

/// Default `TokenStore`: never persists anything. Used when the embedding
/// application hasn't wired a real store, and in every test.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTokenStore;

#[async_trait]
impl TokenStore for NullTokenStore {
    async fn load(&self) -> Option<Token> {
        None
    }

    async fn save(&self, _token: &Token) {}

    async fn clear(&self) {}
}
