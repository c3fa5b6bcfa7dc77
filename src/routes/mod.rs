/// Router Module Index
///
/// Splits routing by access level so authorization is applied explicitly per module.

/// Routes reachable without a session: health, and the page surface behind the
/// navigation guard.
pub mod public;

/// API routes. Every handler resolves the caller's session itself.
pub mod authenticated;
