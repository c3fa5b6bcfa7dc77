//! Navigation guard for the page surface.
//!
//! Decides, for every page navigation, whether to let it through or send the browser
//! to the login page. This is a UX convenience only: the API handlers re-verify the
//! session on every call.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::AppState;

pub const SIGNUP_PATH: &str = "/signup";

/// AllowList
///
/// The public paths reachable without a session, as one tagged configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList {
    /// Only the login page is public.
    LoginOnly,
    /// The login page and `/signup` are public.
    LoginAndSignup,
    /// An explicit set of exact paths.
    Custom(BTreeSet<String>),
}

impl AllowList {
    /// Parses `login`, `login_signup`, or a comma-separated list of absolute paths.
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim() {
            "login" => Ok(AllowList::LoginOnly),
            "login_signup" => Ok(AllowList::LoginAndSignup),
            other => {
                let paths: BTreeSet<String> = other
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .map(str::to_string)
                    .collect();
                if let Some(bad) = paths.iter().find(|path| !path.starts_with('/')) {
                    return Err(format!("'{}' is not an absolute path", bad));
                }
                Ok(AllowList::Custom(paths))
            }
        }
    }
}

/// What the guard does with a pending navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationOutcome {
    Allow,
    RedirectToLogin(String),
}

/// GuardPolicy
///
/// A resolved allow-list plus the login path. The login path is always public.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    login_path: String,
    public_paths: BTreeSet<String>,
}

impl GuardPolicy {
    pub fn new(login_path: impl Into<String>, allow_list: &AllowList) -> Self {
        let login_path = login_path.into();
        let mut public_paths: BTreeSet<String> = match allow_list {
            AllowList::LoginOnly => BTreeSet::new(),
            AllowList::LoginAndSignup => BTreeSet::from([SIGNUP_PATH.to_string()]),
            AllowList::Custom(paths) => paths.iter().map(|path| page_path(path).to_string()).collect(),
        };
        public_paths.insert(page_path(&login_path).to_string());

        Self {
            login_path,
            public_paths,
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    /// Allow-list membership of the page `path` resolves to, so `/login`, `/login/`,
    /// `/login.html` and `/login/index.html` all count as the login page.
    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.contains(page_path(path))
    }

    /// decide
    ///
    /// Public paths always pass; everything else passes only with a session.
    pub fn decide(&self, path: &str, session_present: bool) -> NavigationOutcome {
        if self.is_public(path) || session_present {
            NavigationOutcome::Allow
        } else {
            NavigationOutcome::RedirectToLogin(self.login_path.clone())
        }
    }
}

/// page_path
///
/// The page a request path addresses. A static build serves one page as `/p`, `/p/`,
/// `/p.html` or `/p/index.html`; all four map to `/p`. The root stays `/`.
pub fn page_path(path: &str) -> &str {
    let path = match path.strip_suffix("/index.html") {
        Some(dir) => dir,
        None => path.strip_suffix(".html").unwrap_or(path),
    };
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() { "/" } else { path }
}

/// static_asset
///
/// The file under `public_dir` that `path` names, if it exists and has a non-HTML
/// extension.
/// Paths with `.`/`..` segments or backslashes never resolve.
pub async fn static_asset(public_dir: &Path, path: &str) -> Option<PathBuf> {
    let mut file = public_dir.to_path_buf();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment == "." || segment == ".." || segment.contains('\\') {
            return None;
        }
        file.push(segment);
    }

    // Extensionless files and HTML documents are pages, never assets.
    let extension = file.extension()?;
    if extension.eq_ignore_ascii_case("html") {
        return None;
    }

    match tokio::fs::metadata(&file).await {
        Ok(metadata) if metadata.is_file() => Some(file),
        _ => None,
    }
}

/// navigation_guard
///
/// Middleware in front of the page surface. Existing non-HTML files (scripts, styles,
/// images) pass straight through; every other request is a navigation and either goes
/// on to the page or gets a 303 to the login page.
pub async fn navigation_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    if static_asset(Path::new(&state.config.public_dir), &path).await.is_some() {
        return next.run(request).await;
    }

    let session_present = state.session_lookup.current_session(request.headers());
    match state.guard.decide(&path, session_present) {
        NavigationOutcome::Allow => next.run(request).await,
        NavigationOutcome::RedirectToLogin(login_path) => {
            tracing::debug!(%path, "redirecting navigation without a session");
            Redirect::to(&login_path).into_response()
        }
    }
}
