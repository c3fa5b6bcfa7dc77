mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TEST_USER_ID, create_test_state, create_token};
use guestbook_portal::{
    MemoryStore, MockStorageService, create_router,
    guard::{AllowList, GuardPolicy, NavigationOutcome, page_path, static_asset},
};
use std::{collections::BTreeSet, fs, sync::Arc};
use tower::util::ServiceExt;

const PROTECTED: [&str; 6] = [
    "/",
    "/entries",
    "/signup/extra",
    "/login-help",
    "/admin/index.html",
    "/entries/ada.lovelace",
];

fn redirect() -> NavigationOutcome {
    NavigationOutcome::RedirectToLogin("/login".to_string())
}

// --- Pure decision rule ---

#[test]
fn test_allow_listed_paths_pass_regardless_of_session() {
    let policy = GuardPolicy::new("/login", &AllowList::LoginAndSignup);
    for path in ["/login", "/signup"] {
        assert_eq!(policy.decide(path, false), NavigationOutcome::Allow, "{path}");
        assert_eq!(policy.decide(path, true), NavigationOutcome::Allow, "{path}");
    }
}

#[test]
fn test_other_paths_pass_iff_session_present() {
    let policy = GuardPolicy::new("/login", &AllowList::LoginAndSignup);
    for path in PROTECTED {
        assert_eq!(policy.decide(path, true), NavigationOutcome::Allow, "{path}");
        assert_eq!(policy.decide(path, false), redirect(), "{path}");
    }
}

#[test]
fn test_login_only_variant_guards_signup() {
    let policy = GuardPolicy::new("/login", &AllowList::LoginOnly);
    assert_eq!(policy.decide("/login", false), NavigationOutcome::Allow);
    assert_eq!(policy.decide("/signup", false), redirect());
}

#[test]
fn test_login_path_is_always_public() {
    let custom = AllowList::Custom(BTreeSet::from(["/about".to_string()]));
    for allow_list in [AllowList::LoginOnly, AllowList::LoginAndSignup, custom] {
        let policy = GuardPolicy::new("/sign-in", &allow_list);
        assert!(policy.is_public("/sign-in"), "{allow_list:?}");
        assert_eq!(
            policy.decide("/private", false),
            NavigationOutcome::RedirectToLogin("/sign-in".to_string())
        );
    }
}

#[test]
fn test_matching_is_exact_per_page() {
    let policy = GuardPolicy::new("/login", &AllowList::LoginAndSignup);
    assert!(!policy.is_public("/LOGIN"));
    assert!(!policy.is_public("/signup/confirm"));
    assert!(!policy.is_public("/loginindex.html"));
    assert!(!policy.is_public("/login/extra/index.html"));
}

#[test]
fn test_every_spelling_of_a_public_page_is_public() {
    let policy = GuardPolicy::new("/login", &AllowList::LoginAndSignup);
    for path in ["/login", "/login/", "/login.html", "/login/index.html", "/signup/"] {
        assert!(policy.is_public(path), "{path}");
        assert_eq!(policy.decide(path, false), NavigationOutcome::Allow, "{path}");
    }
}

#[test]
fn test_page_path_normalization() {
    assert_eq!(page_path("/"), "/");
    assert_eq!(page_path("/index.html"), "/");
    assert_eq!(page_path("/login/"), "/login");
    assert_eq!(page_path("/login.html"), "/login");
    assert_eq!(page_path("/login/index.html"), "/login");
    assert_eq!(page_path("/v/1.2"), "/v/1.2");
}

#[test]
fn test_allow_list_parsing() {
    assert_eq!(AllowList::parse("login").unwrap(), AllowList::LoginOnly);
    assert_eq!(AllowList::parse("login_signup").unwrap(), AllowList::LoginAndSignup);
    assert_eq!(
        AllowList::parse("/login, /about,").unwrap(),
        AllowList::Custom(BTreeSet::from(["/login".to_string(), "/about".to_string()]))
    );
    assert!(AllowList::parse("/login,about").is_err());
}

#[tokio::test]
async fn test_static_asset_requires_existing_non_html_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("assets")).unwrap();
    fs::write(dir.path().join("assets/app.css"), "body {}").unwrap();
    fs::write(dir.path().join("about.html"), "<h1>about</h1>").unwrap();
    fs::write(dir.path().join("entries"), "<h1>entries</h1>").unwrap();

    assert!(static_asset(dir.path(), "/assets/app.css").await.is_some());
    assert!(static_asset(dir.path(), "/about.html").await.is_none());
    assert!(static_asset(dir.path(), "/entries").await.is_none(), "extensionless files are pages");
    assert!(static_asset(dir.path(), "/assets").await.is_none(), "directories are pages");
    assert!(static_asset(dir.path(), "/entries/ada.lovelace").await.is_none());
    assert!(static_asset(dir.path(), "/assets/../assets/app.css").await.is_none());
}

// --- Middleware in front of the page surface ---

struct Site {
    _dir: tempfile::TempDir,
    app: axum::Router,
}

// Directory layout of a generated static front-end: one `index.html` per page.
fn site() -> Site {
    let dir = tempfile::tempdir().unwrap();
    for page in ["login", "entries"] {
        fs::create_dir(dir.path().join(page)).unwrap();
        fs::write(
            dir.path().join(page).join("index.html"),
            format!("<h1>{}</h1>", page),
        )
        .unwrap();
    }
    fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    fs::write(dir.path().join("app.css"), "body {}").unwrap();

    let mut state = create_test_state(Arc::new(MemoryStore::new()), MockStorageService::new());
    state.config.public_dir = dir.path().to_string_lossy().into_owned();

    Site {
        app: create_router(state),
        _dir: dir,
    }
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("sb-access-token={}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// Follows redirects like a browser. Returns every hop's (path, status) and the final body.
async fn browse(app: &axum::Router, path: &str, token: Option<&str>) -> (Vec<(String, StatusCode)>, String) {
    let mut hops = Vec::new();
    let mut path = path.to_string();
    for _ in 0..5 {
        let response = app.clone().oneshot(get(&path, token)).await.unwrap();
        let status = response.status();
        hops.push((path.clone(), status));
        if !status.is_redirection() {
            let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            return (hops, String::from_utf8_lossy(&body).into_owned());
        }
        path = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    }
    panic!("redirect loop: {:?}", hops);
}

#[tokio::test]
async fn test_unauthenticated_navigation_is_redirected() {
    let site = site();
    let response = site.app.oneshot(get("/entries", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_unauthenticated_navigation_lands_on_login_page() {
    let site = site();
    let (hops, body) = browse(&site.app, "/entries", None).await;

    assert_eq!(hops.last().unwrap().1, StatusCode::OK, "{hops:?}");
    assert_eq!(body, "<h1>login</h1>");
}

#[tokio::test]
async fn test_login_page_is_served_without_session() {
    let site = site();
    for path in ["/login", "/login/", "/login/index.html"] {
        let (hops, body) = browse(&site.app, path, None).await;
        assert_eq!(hops.last().unwrap().1, StatusCode::OK, "{hops:?}");
        assert_eq!(body, "<h1>login</h1>", "{path}");
    }
}

#[tokio::test]
async fn test_authenticated_navigation_is_served() {
    let site = site();
    let token = create_token(TEST_USER_ID, 3600);
    let (hops, body) = browse(&site.app, "/entries", Some(&token)).await;

    assert_eq!(hops.last().unwrap().1, StatusCode::OK, "{hops:?}");
    assert_eq!(body, "<h1>entries</h1>");
}

#[tokio::test]
async fn test_expired_session_is_redirected() {
    let site = site();
    let token = create_token(TEST_USER_ID, -3600);
    let response = site.app.oneshot(get("/", Some(&token))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_dotted_routes_are_still_guarded() {
    let site = site();
    for path in ["/entries/ada.lovelace", "/v/1.2", "/index.html"] {
        let response = site.app.clone().oneshot(get(path, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(response.headers()[header::LOCATION], "/login", "{path}");
    }
}

#[tokio::test]
async fn test_assets_are_not_guarded() {
    let site = site();
    let response = site.app.oneshot(get("/app.css", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_guard_does_not_apply_to_health() {
    let site = site();
    let response = site.app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
