use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sonic_rs::JsonValueTrait;
use tempfile::TempDir;
use tower::ServiceExt;
use zeroize::Zeroizing;

use memories::{
    config::{Config, Settings},
    console::{self, Command},
    models::user::{AccountType, RegistrationState, User},
    repositories::{layout::BlobLayout, user::NewUser},
    routes,
    state::AppState,
};

const PASSWORD: &str = "Abcd1!ef";
const BOUNDARY: &str = "memories-test-boundary";

// Shared test context
struct TestContext {
    app: Router,
    state: AppState,
    dir: TempDir,
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    fn json(&self) -> sonic_rs::Value {
        sonic_rs::from_slice(&self.body).unwrap()
    }

    fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("memories_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

fn cheap_config() -> Config {
    let mut settings = Settings::defaults();
    settings.set("password_hash_memory_kib", "64");
    settings.set("password_hash_iterations", "1");
    settings.set("max_upload_size", "4096");
    Config::from_settings(&settings).unwrap()
}

impl TestContext {
    async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self::open(dir).await
    }

    async fn open(dir: TempDir) -> Self {
        let (state, _worker) = AppState::new(cheap_config(), BlobLayout::new(dir.path()))
            .await
            .unwrap();
        Self {
            app: routes::router(state.clone()),
            state,
            dir,
        }
    }

    async fn add_user(&self, forename: &str, email: &str) -> User {
        self.add_account(forename, email, AccountType::Standard).await
    }

    async fn add_account(&self, forename: &str, email: &str, account_type: AccountType) -> User {
        self.state
            .users
            .add_user(NewUser {
                forename: forename.to_string(),
                surname: "Tester".to_string(),
                email: email.to_string(),
                password: Zeroizing::new(PASSWORD.to_string()),
                account_type,
                state: RegistrationState::Complete,
            })
            .await
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> Reply {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body,
        }
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Reply {
        let mut builder = Request::get(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, form: &str, cookie: Option<&str>) -> Reply {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    async fn login(&self, email: &str) -> String {
        let reply = self
            .post_form("/login", &format!("email={}&password=Abcd1%21ef", email), None)
            .await;
        assert_eq!(reply.text(), "success");
        reply.session_cookie().expect("login sets the session cookie")
    }

    async fn stage(&self, cookie: &str, filename: &str, data: &[u8]) -> Reply {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::post("/upload/temp")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn stage_id(&self, cookie: &str, filename: &str, data: &[u8]) -> String {
        let reply = self.stage(cookie, filename, data).await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.text());
        reply.json()["id"].as_str().unwrap().to_string()
    }

    async fn publish(&self, cookie: &str, file_id: &str, tags: &str, date: &str) -> Reply {
        self.post_form(
            "/upload/publish",
            &format!("file_id={file_id}&description=beach&tags={tags}&people=jem&date={date}"),
            Some(cookie),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn gate_redirects_or_refuses_without_a_session() {
        let context = TestContext::new().await;

        let root = context.get("/", None).await;
        assert_eq!(root.status, StatusCode::FOUND);
        assert_eq!(root.location(), Some("/login"));

        let publish = context
            .post_form("/upload/publish", "file_id=abc", None)
            .await;
        assert_eq!(publish.status, StatusCode::UNAUTHORIZED);
        assert_eq!(publish.text(), "unauthorised");

        let content = context.get("/static/content/abc.jpg", None).await;
        assert_eq!(content.status, StatusCode::FOUND);
        assert_eq!(content.location(), Some("/login"));
    }

    #[tokio::test]
    async fn static_assets_outside_content_are_public() {
        let context = TestContext::new().await;
        let css_dir = context.dir.path().join("static/css");
        std::fs::create_dir_all(&css_dir).unwrap();
        std::fs::write(css_dir.join("main.css"), "body{}").unwrap();

        let reply = context.get("/static/css/main.css", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.text(), "body{}");
    }

    #[tokio::test]
    async fn trailing_slash_paths_are_not_found() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let reply = context.get("/static/content/", Some(&cookie)).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert_eq!(reply.text(), "404 page not found");
    }

    #[tokio::test]
    async fn login_and_logout_cycle() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;

        // Step 1: wrong password
        let refused = context
            .post_form("/login", "email=alice@example.com&password=nope", None)
            .await;
        assert_eq!(refused.text(), "unauthorised");
        assert!(refused.session_cookie().is_none());

        // Step 2: correct password, then the gate lets us in
        let cookie = context.login("ALICE@example.com").await;
        let home = context.get("/", Some(&cookie)).await;
        assert_eq!(home.status, StatusCode::OK);

        // Step 3: login endpoints while authenticated
        let again = context.get("/login", Some(&cookie)).await;
        assert_eq!(again.status, StatusCode::FOUND);
        assert_eq!(again.location(), Some("/"));
        let posted = context.post_form("/login", "", Some(&cookie)).await;
        assert_eq!(posted.text(), "already authenticated");

        // Step 4: logout expires the cookie
        let out = context.get("/logout", Some(&cookie)).await;
        assert_eq!(out.location(), Some("/login"));
        let cleared = out.session_cookie().unwrap_or_default();
        assert_eq!(cleared, "memories_session=");
    }

    #[tokio::test]
    async fn tampered_cookie_is_not_a_session() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;
        let forged = cookie.replace("alice", "mallory");

        let reply = context.get("/", Some(&forged)).await;
        assert_eq!(reply.status, StatusCode::FOUND);
        assert_eq!(reply.location(), Some("/login"));
    }

    #[tokio::test]
    async fn staged_files_are_private_to_their_uploader() {
        let context = TestContext::new().await;
        let alice = context.add_user("Alice", "alice@example.com").await;
        let bob = context.add_user("Bob", "bob@example.com").await;
        let alice_cookie = context.login("alice@example.com").await;
        let bob_cookie = context.login("bob@example.com").await;

        let id = context.stage_id(&alice_cookie, "x.png", b"png bytes").await;
        let blob = format!("{id}.png");

        let own = context
            .get(&format!("/temp_uploaded/{}/{}", alice.username, blob), Some(&alice_cookie))
            .await;
        assert_eq!(own.status, StatusCode::OK);
        assert_eq!(&own.body[..], b"png bytes");

        let foreign_area = context
            .get(&format!("/temp_uploaded/{}/{}", alice.username, blob), Some(&bob_cookie))
            .await;
        assert_eq!(foreign_area.status, StatusCode::NOT_FOUND);
        assert_eq!(foreign_area.text(), "404 page not found");

        let own_area = context
            .get(&format!("/temp_uploaded/{}/{}", bob.username, blob), Some(&bob_cookie))
            .await;
        assert_eq!(own_area.status, StatusCode::NOT_FOUND);
        assert_eq!(own_area.text(), "404 page not found");

        let stolen = context.publish(&bob_cookie, &id, "holiday", "").await;
        assert_eq!(stolen.status, StatusCode::NOT_FOUND);
        assert_eq!(stolen.json()["error"].as_str(), Some("file_not_found"));
    }

    #[tokio::test]
    async fn publish_dedups_on_content() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;
        let photo = vec![7u8; 1024];

        let first = context.stage_id(&cookie, "photo.jpg", &photo).await;
        let published = context.publish(&cookie, &first, "holiday", "2021-06-01").await;
        assert_eq!(published.status, StatusCode::OK, "{}", published.text());
        assert_eq!(published.json()["date"].as_str(), Some("2021-06-01"));

        let second = context.stage_id(&cookie, "photo2.jpg", &photo).await;
        assert_ne!(first, second);
        let duplicate = context.publish(&cookie, &second, "holiday", "2021-06-01").await;
        assert_eq!(duplicate.status, StatusCode::CONFLICT);
        assert_eq!(duplicate.json()["error"].as_str(), Some("duplicate_content"));

        let search = context
            .get("/search?tags=holiday&format=json", Some(&cookie))
            .await;
        let page = search.json();
        assert_eq!(page["total"].as_u64(), Some(1));
        assert_eq!(page["files"][0]["id"].as_str(), Some(first.as_str()));

        let transactions = context.state.files.transactions().await.unwrap();
        assert_eq!(transactions.len(), 1);
    }

    #[tokio::test]
    async fn upload_rejections_carry_tags() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let exe = context.stage(&cookie, "tool.exe", b"MZ").await;
        assert_eq!(exe.json()["error"].as_str(), Some("unsupported_format"));

        let big = context.stage(&cookie, "big.jpg", &vec![1u8; 8192]).await;
        assert_eq!(big.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(big.json()["error"].as_str(), Some("too_large"));

        let id = context.stage_id(&cookie, "x.png", b"ok").await;
        let missing = context.publish(&cookie, &id, "", "").await;
        assert_eq!(missing.json()["error"].as_str(), Some("missing_field"));
        assert_eq!(missing.json()["field"].as_str(), Some("tags"));

        let bad_date = context.publish(&cookie, &id, "a", "2021-02-30").await;
        assert_eq!(bad_date.json()["field"].as_str(), Some("date"));
    }

    #[tokio::test]
    async fn aggregates_and_favourites() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let a = context.stage_id(&cookie, "a.jpg", b"aaa").await;
        context.publish(&cookie, &a, "sea,sun", "2022-01-01").await;
        let b = context.stage_id(&cookie, "b.mp4", b"bbb").await;
        context.publish(&cookie, &b, "sun", "2022-03-01").await;

        let data = context
            .get("/data?fetch=tags,file_types,dates", Some(&cookie))
            .await
            .json();
        assert_eq!(data["tags"][0].as_str(), Some("sea"));
        assert_eq!(data["tags"][1].as_str(), Some("sun"));
        assert_eq!(data["file_types"][0].as_str(), Some("image"));
        assert_eq!(data["file_types"][1].as_str(), Some("video"));
        assert_eq!(data["dates"][1].as_str(), Some("2022-03-01"));
        assert!(data["people"].is_null());

        let added = context
            .post_form("/favourite", &format!("file_id={a}&action=add"), Some(&cookie))
            .await;
        assert_eq!(added.status, StatusCode::OK);

        let deleted = context
            .post_form("/delete", &format!("file_id={a}"), Some(&cookie))
            .await;
        assert_eq!(deleted.status, StatusCode::OK);

        let favourites = context.get("/favourites", Some(&cookie)).await.json();
        assert_eq!(favourites["total"].as_u64(), Some(0));

        let random = context.get("/random?count=5", Some(&cookie)).await;
        let picked: Vec<sonic_rs::Value> = sonic_rs::from_slice(&random.body).unwrap();
        assert_eq!(picked.len(), 1);
    }

    #[tokio::test]
    async fn registration_needs_both_confirmations() {
        let context = TestContext::new().await;
        let root = context
            .state
            .users
            .add_user(NewUser {
                forename: "Root".to_string(),
                surname: "Admin".to_string(),
                email: "root@example.com".to_string(),
                password: Zeroizing::new(PASSWORD.to_string()),
                account_type: AccountType::SuperAdmin,
                state: RegistrationState::Complete,
            })
            .await
            .unwrap();
        let admin_cookie = context.login(&root.email).await;

        let registered = context
            .post_form(
                "/register",
                "forename=Jem&surname=Gunay&email=j%40x.co&password=Abcd1%21ef",
                None,
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED);
        assert_eq!(registered.json()["username"].as_str(), Some("JemGunay"));

        let early = context
            .post_form("/login", "email=j@x.co&password=Abcd1%21ef", None)
            .await;
        assert_eq!(early.text(), "unauthorised");

        let confirmed = context
            .post_form("/users/JemGunay/confirm", "", Some(&admin_cookie))
            .await;
        assert_eq!(confirmed.json()["state"].as_str(), Some("AdminConfirmed"));

        console::execute(&context.state, Command::ConfirmEmail("JemGunay".to_string()))
            .await
            .unwrap();
        context.login("j@x.co").await;
    }

    #[tokio::test]
    async fn standard_users_cannot_administer() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let bob = context.add_user("Bob", "bob@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let reply = context
            .post_form(&format!("/users/{}/block", bob.username), "", Some(&cookie))
            .await;
        assert_eq!(reply.status, StatusCode::FORBIDDEN);
        assert_eq!(context.state.users.get(&bob.username).unwrap().state, RegistrationState::Complete);
    }

    #[tokio::test]
    async fn blocked_user_loses_existing_session() {
        let context = TestContext::new().await;
        let alice = context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;
        assert_eq!(context.get("/", Some(&cookie)).await.status, StatusCode::OK);

        context
            .state
            .users
            .transition(&alice.username, |_| RegistrationState::Blocked)
            .unwrap();

        let root = context.get("/", Some(&cookie)).await;
        assert_eq!(root.status, StatusCode::FOUND);
        assert_eq!(root.location(), Some("/login"));

        let staged = context.stage(&cookie, "x.png", b"late").await;
        assert_eq!(staged.status, StatusCode::UNAUTHORIZED);
        assert!(context.state.files.list_staged(&alice.username).await.unwrap().is_empty());

        let own_area = context
            .get(&format!("/temp_uploaded/{}/x.png", alice.username), Some(&cookie))
            .await;
        assert_eq!(own_area.status, StatusCode::FOUND);

        // The login page stays reachable instead of bouncing back to `/`
        let login_page = context.get("/login", Some(&cookie)).await;
        assert_eq!(login_page.status, StatusCode::OK);
        let again = context
            .post_form("/login", "email=alice@example.com&password=Abcd1%21ef", Some(&cookie))
            .await;
        assert_eq!(again.text(), "unauthorised");
    }

    #[tokio::test]
    async fn admins_cannot_block_super_admins() {
        let context = TestContext::new().await;
        let root = context
            .add_account("Root", "root@example.com", AccountType::SuperAdmin)
            .await;
        context
            .add_account("Ada", "ada@example.com", AccountType::Admin)
            .await;
        let bob = context.add_user("Bob", "bob@example.com").await;
        let cookie = context.login("ada@example.com").await;

        let refused = context
            .post_form(&format!("/users/{}/block", root.username), "", Some(&cookie))
            .await;
        assert_eq!(refused.status, StatusCode::FORBIDDEN);
        assert_eq!(context.state.users.get(&root.username).unwrap().state, RegistrationState::Complete);

        let blocked = context
            .post_form(&format!("/users/{}/block", bob.username), "", Some(&cookie))
            .await;
        assert_eq!(blocked.status, StatusCode::OK);
        assert_eq!(blocked.json()["state"].as_str(), Some("Blocked"));
    }

    #[tokio::test]
    async fn epoch_dated_memories_keep_their_date() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let id = context.stage_id(&cookie, "old.jpg", b"1970").await;
        let published = context.publish(&cookie, &id, "archive", "1970-01-01").await;
        assert_eq!(published.status, StatusCode::OK, "{}", published.text());
        assert_eq!(published.json()["date"].as_str(), Some("1970-01-01"));

        let dates = context.get("/data?fetch=dates", Some(&cookie)).await.json();
        assert_eq!(dates["dates"][0].as_str(), Some("1970-01-01"));

        let bounded = context
            .get("/search?format=json&max_date=1970-01-01", Some(&cookie))
            .await
            .json();
        assert_eq!(bounded["total"].as_u64(), Some(1));
    }

    #[tokio::test]
    async fn catalogs_survive_a_restart() {
        let context = TestContext::new().await;
        context.add_user("Alice", "alice@example.com").await;
        context.add_user("Bob", "bob@example.com").await;
        let cookie = context.login("alice@example.com").await;

        let mut ids = Vec::new();
        for (i, date) in ["2020-01-01", "2021-01-01", "2022-01-01"].iter().enumerate() {
            let id = context
                .stage_id(&cookie, &format!("f{i}.jpg"), format!("payload {i}").as_bytes())
                .await;
            context.publish(&cookie, &id, "family", date).await;
            ids.push(id);
        }
        context
            .post_form("/favourite", &format!("file_id={}&action=add", ids[1]), Some(&cookie))
            .await;

        let before = context.get("/search?format=json", Some(&cookie)).await.body;
        let users_before = context.state.users.list().unwrap();
        let log_before = context.state.files.transactions().await.unwrap();
        context.state.serialize().await.unwrap();

        let TestContext { dir, .. } = context;
        let reopened = TestContext::open(dir).await;
        let cookie = reopened.login("alice@example.com").await;

        let after = reopened.get("/search?format=json", Some(&cookie)).await.body;
        assert_eq!(before, after);
        assert_eq!(reopened.state.users.list().unwrap(), users_before);
        assert_eq!(reopened.state.files.transactions().await.unwrap(), log_before);
    }
}
