//! Steps run against the local filesystem through the localhost executor.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use deckhand::config::DbCredentials;
use deckhand::paths::ReleaseLayout;
use deckhand::release::store::ReleaseStore;
use deckhand::release::Release;
use deckhand::settings::{database_substitutions, SettingsProvisioner};
use deckhand::shared::{SharedLink, SharedLinker};
use deckhand::ssh::SshClient;
use deckhand::ErrorCode;

fn path_str(path: &Path) -> String {
    path.to_str().unwrap().to_string()
}

fn credentials(name: &str, password: &str) -> DbCredentials {
    DbCredentials {
        name: name.to_string(),
        username: format!("{}_user", name),
        password: password.to_string(),
    }
}

#[test]
fn settings_are_seeded_once_and_only_placeholders_change() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("default.settings.php");
    let settings = dir.path().join("settings.php");
    fs::write(
        &template,
        "$db = '%db';\n$user = '%user';\n$pass = '%password';\n",
    )
    .unwrap();

    let executor = SshClient::local();
    let provisioner = SettingsProvisioner::new(&executor);

    let first = provisioner
        .ensure_settings_file(
            &path_str(&template),
            &path_str(&settings),
            &database_substitutions(&credentials("site", "p&ss/w\\rd")),
        )
        .unwrap();
    assert!(first.initialized);

    let content = fs::read_to_string(&settings).unwrap();
    assert_eq!(
        content,
        "$db = 'site';\n$user = 'site_user';\n$pass = 'p&ss/w\\rd';\n"
    );
    let mode = fs::metadata(&settings).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o664);

    // Operator edits and a re-added placeholder.
    fs::write(&settings, format!("{}// local override\n$extra = '%db';\n", content)).unwrap();

    let second = provisioner
        .ensure_settings_file(
            &path_str(&template),
            &path_str(&settings),
            &database_substitutions(&credentials("other", "x")),
        )
        .unwrap();
    assert!(!second.initialized);

    let content = fs::read_to_string(&settings).unwrap();
    assert_eq!(
        content,
        "$db = 'site';\n$user = 'site_user';\n$pass = 'p&ss/w\\rd';\n// local override\n$extra = 'other';\n"
    );
}

#[test]
fn linking_shared_paths_twice_leaves_the_same_links() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ReleaseLayout::new(&path_str(dir.path()), None, None, "git-cache");

    fs::create_dir_all(dir.path().join("shared/files")).unwrap();
    fs::write(dir.path().join("shared/files/upload.txt"), "kept").unwrap();
    fs::write(dir.path().join("shared/settings.php"), "<?php").unwrap();

    // The checkout ships its own copy of the shared directory.
    let release_dir = dir.path().join("releases/20240101000000");
    fs::create_dir_all(release_dir.join("sites/default/files")).unwrap();
    fs::write(release_dir.join("sites/default/files/stale.txt"), "from git").unwrap();

    let release = Release {
        identifier: "20240101000000".to_string(),
        revision: Some("abc123".to_string()),
        path: path_str(&release_dir),
    };
    let links = vec![
        SharedLink::new("files", "sites/default/files"),
        SharedLink::new("settings.php", "sites/default/settings.php"),
    ];

    let executor = SshClient::local();
    let linker = SharedLinker::new(&executor, &layout);

    let first = linker.link(&release, &links).unwrap();
    let targets = |dir: &Path| {
        ["files", "settings.php"]
            .iter()
            .map(|name| fs::read_link(dir.join("sites/default").join(name)).unwrap())
            .collect::<Vec<_>>()
    };
    let after_first = targets(&release_dir);

    let second = linker.link(&release, &links).unwrap();
    let after_second = targets(&release_dir);

    assert_eq!(first.len(), 2);
    assert_eq!(first.len(), second.len());
    assert_eq!(after_first, after_second);
    assert_eq!(after_first[0], dir.path().join("shared/files"));
    assert!(release_dir.join("sites/default/files/upload.txt").exists());
    assert!(!dir.path().join("shared/files/stale.txt").exists());
    assert!(!dir.path().join("shared/files/files").exists());
}

#[test]
fn release_store_reads_what_it_records() {
    let dir = tempfile::tempdir().unwrap();
    let layout = ReleaseLayout::new(&path_str(dir.path()), None, None, "git-cache");
    let executor = SshClient::local();
    let store = ReleaseStore::new(&executor, &layout);

    // Not set up yet.
    assert!(store.history().unwrap().is_empty());

    for (identifier, revision) in [("20240102000000", "def456"), ("20240101000000", "abc123")] {
        fs::create_dir_all(dir.path().join("releases").join(identifier)).unwrap();
        store.record_release(identifier, revision).unwrap();
    }
    fs::create_dir_all(dir.path().join("releases/20240103000000")).unwrap();

    let history = store.history().unwrap();
    assert_eq!(
        history.identifiers(),
        vec!["20240101000000", "20240102000000", "20240103000000"]
    );
    assert_eq!(history.as_slice()[0].revision.as_deref(), Some("abc123"));
    assert_eq!(history.as_slice()[1].revision.as_deref(), Some("def456"));
    assert_eq!(history.latest().unwrap().revision, None);

    let err = store.ensure_absent("20240102000000").unwrap_err();
    assert_eq!(err.code, ErrorCode::ReleaseDuplicate);
    assert!(store.ensure_absent("20240104000000").is_ok());
}
