//! Git fetcher tests against local repositories.
//!
//! Each test creates an upstream repository in a temporary directory and
//! fetches it through `file://` URLs with the system `git`.
//!
//! Run with: `cargo test --features integration-tests`

mod common;

use std::fs;
use std::path::Path;

use common::{GitRepo, NoCredentials, NoPrompt, TestFixture};
use model_compose::auth::AuthSession;
use model_compose::cancel::CancellationToken;
use model_compose::error::{Error, Result};
use model_compose::fetch::{FetchContext, Fetcher, FetcherRegistry, GitFetcher};
use model_compose::git::SystemGit;
use model_compose::manifest::{Dependency, Package, Source};
use model_compose::phases::orchestrator::{ComposeOptions, Composer};

fn package(name: &str, url: &str, r#ref: &str) -> Package {
    Package::from_dependency(
        &Dependency {
            name: name.to_string(),
            source: Source {
                url: url.to_string(),
                r#ref: r#ref.to_string(),
                ..Default::default()
            },
        },
        0,
    )
}

/// Runs `f` with a non-interactive fetch context.
fn with_context<T>(f: impl FnOnce(&mut FetchContext<'_, '_>) -> T) -> T {
    let store = NoCredentials::default();
    let mut session = AuthSession::new(&store, &NoPrompt, false);
    let cancel = CancellationToken::new();
    let mut ctx = FetchContext {
        auth: &mut session,
        cancel: &cancel,
    };
    f(&mut ctx)
}

fn download(package: &Package, target: &Path) -> Result<()> {
    with_context(|ctx| GitFetcher::default().download(package, target, ctx))
}

fn ensure_latest(package: &Package, target: &Path) -> Result<bool> {
    with_context(|ctx| GitFetcher::default().ensure_latest(package, target, ctx))
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_download_tag() {
    let upstream = GitRepo::new();
    upstream.commit(&[("platform/a.yaml", "v1")], "first").tag("v1.0.0");
    upstream.commit(&[("platform/a.yaml", "v2")], "second");
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/v1.0.0");

    download(&package("core", &upstream.url(), "v1.0.0"), &target).unwrap();

    assert_eq!(fs::read_to_string(target.join("platform/a.yaml")).unwrap(), "v1");
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_download_falls_back_to_branch() {
    let upstream = GitRepo::new();
    upstream.commit(&[("a.yaml", "main")], "first").branch("develop");
    upstream.git(&["checkout", "--quiet", "develop"]);
    upstream.commit(&[("a.yaml", "develop")], "on develop");
    upstream.git(&["checkout", "--quiet", "main"]);
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/develop");

    download(&package("core", &upstream.url(), "develop"), &target).unwrap();

    assert_eq!(fs::read_to_string(target.join("a.yaml")).unwrap(), "develop");
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_download_default_branch_without_ref() {
    let upstream = GitRepo::new();
    upstream.commit(&[("a.yaml", "main")], "first");
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/latest");

    download(&package("core", &upstream.url(), ""), &target).unwrap();

    assert_eq!(fs::read_to_string(target.join("a.yaml")).unwrap(), "main");
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_download_unknown_ref() {
    let upstream = GitRepo::new();
    upstream.commit(&[("a.yaml", "main")], "first");
    let temp = assert_fs::TempDir::new().unwrap();

    let err = download(&package("core", &upstream.url(), "v9"), &temp.path().join("core/v9")).unwrap_err();

    assert!(
        matches!(&err, Error::RefNotFound { r#ref, .. } if r#ref == "v9"),
        "unexpected error: {}",
        err
    );
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_ensure_latest_tag() {
    let upstream = GitRepo::new();
    upstream.commit(&[("a.yaml", "v1")], "first").tag("v1");
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/v1");
    let core = package("core", &upstream.url(), "v1");

    assert!(!ensure_latest(&core, &target).unwrap(), "missing copy is never current");

    download(&core, &target).unwrap();
    assert!(ensure_latest(&core, &target).unwrap());

    upstream.commit(&[("a.yaml", "moved")], "second");
    upstream.git(&["tag", "-f", "v1"]);
    assert!(!ensure_latest(&core, &target).unwrap());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_ensure_latest_branch() {
    let upstream = GitRepo::new();
    upstream.commit(&[("a.yaml", "one")], "first");
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/main");
    let core = package("core", &upstream.url(), "main");

    download(&core, &target).unwrap();
    assert!(ensure_latest(&core, &target).unwrap());

    upstream.commit(&[("a.yaml", "two")], "second");
    assert!(!ensure_latest(&core, &target).unwrap());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_ensure_latest_plain_directory_is_outdated() {
    let temp = assert_fs::TempDir::new().unwrap();
    let target = temp.path().join("core/v1");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("a.yaml"), "copied by hand").unwrap();

    let core = package("core", "file:///nowhere", "v1");
    assert!(!ensure_latest(&core, &target).unwrap());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_compose_nested_git_packages() {
    let base = GitRepo::new();
    base.commit(&[("foundation/base.yaml", "base")], "base").tag("v1");

    let app = GitRepo::new();
    let nested = format!(
        "name: app\ndependencies:\n  - name: base\n    source:\n      url: {}\n      ref: v1\n",
        base.url()
    );
    app.commit(
        &[("compose.yaml", nested.as_str()), ("src/platform/app.yaml", "app")],
        "app",
    )
    .tag("v2");

    let fixture = TestFixture::new().with_manifest(&format!(
        "name: root\ndependencies:\n  - name: app\n    source:\n      url: {}\n      ref: v2\n",
        app.url()
    ));

    let registry = FetcherRegistry::default();
    let mut store = NoCredentials::default();
    let report = Composer::new(ComposeOptions::new(fixture.path()), &registry, &SystemGit, &mut store, &NoPrompt)
        .compose()
        .unwrap();

    let names: Vec<&str> = report.packages.iter().map(|p| p.name()).collect();
    assert_eq!(names, vec!["app", "base"]);
    assert_eq!(
        fs::read_to_string(fixture.output_dir().join("src/platform/app.yaml")).unwrap(),
        "app"
    );
    assert_eq!(
        fs::read_to_string(fixture.output_dir().join("src/foundation/base.yaml")).unwrap(),
        "base"
    );
    assert!(!fixture.output_dir().join(".git").exists());
    assert!(fixture.packages_dir().join("base/v1/.git").exists());
}
