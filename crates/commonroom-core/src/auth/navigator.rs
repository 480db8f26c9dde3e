use tracing::warn;

/// Path of the login page the client sends users to when their session
/// is rejected.
pub const LOGIN_PATH: &str = "/login";

/// Receives navigation requests raised by the client.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// Navigator that only records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, path: &str) {
        warn!(path, "Session rejected, redirecting");
    }
}
