//! External Collaborators
//!
//! The game core does not own users, friendships, or match history. It
//! consumes three operations from the surrounding platform: an online
//! check, a block check, and a fire-and-forget result sink. Everything
//! behind this trait is allowed to suspend; queue and game mutation never
//! happens while one of these calls is in flight.

use std::future::Future;

use tracing::info;

use crate::game::state::MatchResultDto;

/// Platform services consumed by the gateway.
pub trait GameDirectory: Send + Sync + 'static {
    /// Whether the user is currently online.
    fn is_user_online(&self, login: &str) -> impl Future<Output = bool> + Send;

    /// Whether either user has blocked the other.
    fn is_blocked(&self, a: &str, b: &str) -> impl Future<Output = bool> + Send;

    /// Persist a finished game's result. Failures are the caller's to log;
    /// they never block game teardown.
    fn record_result(
        &self,
        result: MatchResultDto,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Permissive stand-in used by the standalone binary: everyone is online,
/// nobody is blocked, results are only logged.
#[derive(Debug, Default, Clone)]
pub struct OpenDirectory;

impl GameDirectory for OpenDirectory {
    async fn is_user_online(&self, _login: &str) -> bool {
        true
    }

    async fn is_blocked(&self, _a: &str, _b: &str) -> bool {
        false
    }

    async fn record_result(&self, result: MatchResultDto) -> anyhow::Result<()> {
        info!(
            winner = result.winner.as_deref().unwrap_or("-"),
            loser = result.loser.as_deref().unwrap_or("-"),
            score = %format!("{}-{}", result.winner_score, result.loser_score),
            "match result recorded"
        );
        Ok(())
    }
}
