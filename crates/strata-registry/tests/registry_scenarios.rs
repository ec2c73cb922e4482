//! End-to-end scenarios for the filesystem registry.
//!
//! Each test writes a real sources file into a temp dir, opens a
//! [`FilesystemManager`] on it and drives it the way a transport layer would.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_registry::vfs::{EntryInfo, VfsError};
use strata_registry::{
    ConfigLoader, DriverTable, FilesystemManager, FilesystemService, GetContent, RegistryError,
    RequestKind,
};
use tempfile::TempDir;

// ============================================================================
// Shared test setup
// ============================================================================

struct Fixture {
    dir: TempDir,
    manager: Arc<FilesystemManager>,
}

impl Fixture {
    async fn new(sources: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(config_path(dir.path()), sources).unwrap();
        let loader = ConfigLoader::new(config_path(dir.path()));
        let manager = Arc::new(FilesystemManager::open(loader, DriverTable::default()).await);
        Self { dir, manager }
    }

    fn rewrite(&self, sources: &str) {
        std::fs::write(config_path(self.dir.path()), sources).unwrap();
    }

    fn service(&self) -> FilesystemService {
        FilesystemService::new(Arc::clone(&self.manager))
    }
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join("sources.yaml")
}

const MEM1: &str = "\
sources:
  - name: mem1
    path: /m
    protocol: memory
";

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn one_entry_per_unique_name() {
    let fx = Fixture::new(
        "\
sources:
  - name: a
    path: memory://a
  - name: a
    path: memory://elsewhere
  - name: b
    path: memory://b
",
    )
    .await;

    let registry = fx.manager.snapshot();
    assert_eq!(registry.names().collect::<Vec<_>>(), ["a", "b"]);
    assert_eq!(registry.get("a").unwrap().root_path, "a");
    assert_eq!(registry.config().rejected().len(), 1);
    assert_eq!(registry.config().rejected()[0].index, 1);
}

#[tokio::test]
async fn first_run_writes_default_and_starts_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("strata").join("sources.yaml");
    let manager = FilesystemManager::open(ConfigLoader::new(&path), DriverTable::default()).await;

    assert!(manager.snapshot().is_empty());
    assert!(path.exists());
    assert!(manager.list_filesystems().await.is_empty());
}

#[tokio::test]
async fn protocol_inference() {
    let fx = Fixture::new(
        "\
sources:
  - name: bucket
    path: s3://bucket/data
  - name: disk
    path: /tmp/x
",
    )
    .await;

    let bucket = fx.manager.get_filesystem("bucket").unwrap();
    assert_eq!(bucket.protocol, "s3");
    assert_eq!(bucket.root_path, "bucket/data");
    assert_eq!(bucket.canonical_path, "s3://bucket/data");

    let disk = fx.manager.get_filesystem("disk").unwrap();
    assert_eq!(disk.protocol, "file");
    assert_eq!(disk.canonical_path, "file:///tmp/x");
    assert!(disk.is_async);
}

#[tokio::test]
async fn bogus_protocol_does_not_block_siblings() {
    let fx = Fixture::new(
        "\
sources:
  - name: bad
    path: bogus://x
  - name: good
    path: memory://good
",
    )
    .await;

    let bad = fx.manager.get_filesystem("bad").unwrap();
    assert!(bad.instance.is_none());
    assert!(matches!(
        bad.error.as_deref(),
        Some(VfsError::UnknownProtocol(p)) if p == "bogus"
    ));
    assert!(matches!(
        fx.manager.validate(RequestKind::Get, "bad", ""),
        Err(RegistryError::BackendUnavailable { .. })
    ));

    let good = fx.manager.get_filesystem("good").unwrap();
    assert!(good.instance.is_some());
    assert!(good.error.is_none());

    let infos = fx.manager.list_filesystems().await;
    assert_eq!(infos.len(), 2);
    assert!(infos[0].error.is_some());
    assert!(infos[1].error.is_none());
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn mem1_scenario() {
    let fx = Fixture::new(MEM1).await;

    let entry = fx.manager.get_filesystem("mem1").unwrap();
    assert_eq!(entry.root_path, "m");
    assert_eq!(entry.canonical_path, "memory://m");

    let resolved = fx.manager.validate(RequestKind::Get, "mem1", "a/b.txt").unwrap();
    assert_eq!(resolved.path, "m/a/b.txt");

    let listing = vec![EntryInfo::file("m/a/b.txt", 4)];
    let mapped = fx.manager.map_paths("memory://m", "mem1", listing).unwrap();
    assert_eq!(mapped[0].name, "mem1/a/b.txt");
}

#[tokio::test]
async fn empty_path_reads_root_and_rejects_writes() {
    let disk = TempDir::new().unwrap();
    let fx = Fixture::new(&format!(
        "{MEM1}  - name: disk\n    path: {}\n",
        disk.path().display()
    ))
    .await;

    let root = fx.manager.validate(RequestKind::Get, "mem1", "").unwrap();
    assert_eq!(root.path, "m");
    let root = fx.manager.validate(RequestKind::Get, "disk", "").unwrap();
    assert_eq!(root.path, disk.path().display().to_string());

    for kind in [
        RequestKind::Post,
        RequestKind::Put,
        RequestKind::Patch,
        RequestKind::Delete,
        RequestKind::Move,
        RequestKind::Copy,
        RequestKind::Transfer,
    ] {
        assert!(
            matches!(
                fx.manager.validate(kind, "mem1", ""),
                Err(RegistryError::MissingPath { kind: k }) if k == kind
            ),
            "{kind}"
        );
    }
}

#[tokio::test]
async fn listing_names_round_trip() {
    let fx = Fixture::new(MEM1).await;
    let service = fx.service();
    service.post("mem1", "a/b.txt", Some(b"data")).await.unwrap();
    service.post("mem1", "a/c/", None).await.unwrap();

    let GetContent::Listing(listing) = service.get("mem1", "a").await.unwrap() else {
        panic!("expected a directory listing");
    };
    let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["mem1/a/b.txt", "mem1/a/c"]);

    // Key-qualified names resolve straight back to the same objects.
    for entry in &listing {
        let resolved = fx.manager.validate(RequestKind::Get, "mem1", &entry.name).unwrap();
        assert_eq!(resolved.entry.name, "mem1");
        assert!(resolved.instance.exists(&resolved.path).await, "{}", entry.name);
    }
}

// ============================================================================
// Hot reload
// ============================================================================

#[tokio::test]
async fn identical_content_does_not_rebuild() {
    let fx = Fixture::new(MEM1).await;
    let before = fx.manager.get_filesystem("mem1").unwrap();
    let snapshot = fx.manager.snapshot();

    fx.rewrite(&format!("# reformatted\n{MEM1}\n\n"));
    let config = fx.manager.check_reload_config().await.unwrap();
    assert!(Arc::ptr_eq(&config, snapshot.config()));

    let after = fx.manager.get_filesystem("mem1").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(Arc::ptr_eq(
        before.instance.as_ref().unwrap(),
        after.instance.as_ref().unwrap()
    ));
    assert!(Arc::ptr_eq(&snapshot, &fx.manager.snapshot()));
}

#[tokio::test]
async fn held_snapshot_survives_swap() {
    let fx = Fixture::new(MEM1).await;
    let old = fx.manager.snapshot();

    fx.rewrite("sources:\n  - name: fresh\n    path: memory://fresh\n");
    fx.manager.check_reload_config().await.unwrap();

    assert!(old.get("mem1").is_some());
    assert!(old.get("fresh").is_none());
    assert!(old.validate(RequestKind::Get, "mem1", "x").is_ok());

    let new = fx.manager.snapshot();
    assert!(new.get("mem1").is_none());
    assert!(new.get("fresh").is_some());
    assert_ne!(old.hash(), new.hash());
}

#[tokio::test]
async fn memory_contents_outlive_rebuilds() {
    let fx = Fixture::new(MEM1).await;
    let service = fx.service();
    service.post("mem1", "keep.txt", Some(b"still here")).await.unwrap();

    fx.rewrite(&format!("{MEM1}  - name: extra\n    path: memory://extra\n"));
    let content = service.get("mem1", "keep.txt").await.unwrap();

    assert!(fx.manager.get_filesystem("extra").is_some());
    assert_eq!(content, GetContent::Bytes(b"still here".to_vec()));
}

#[tokio::test]
async fn malformed_reload_keeps_serving() {
    let fx = Fixture::new(MEM1).await;
    let service = fx.service();
    service.post("mem1", "a.txt", Some(b"a")).await.unwrap();

    fx.rewrite("sources: [unclosed\n");
    assert_eq!(
        service.get("mem1", "a.txt").await.unwrap(),
        GetContent::Bytes(b"a".to_vec())
    );
}

// ============================================================================
// Local disk
// ============================================================================

#[tokio::test]
async fn local_backend_through_service() {
    let disk = TempDir::new().unwrap();
    let fx = Fixture::new(&format!(
        "sources:\n  - name: disk\n    path: {}\n",
        disk.path().display()
    ))
    .await;
    let service = fx.service();

    service.post("disk", "notes/", None).await.unwrap();
    service.post("disk", "notes/today.md", Some(b"# today")).await.unwrap();
    assert_eq!(
        std::fs::read(disk.path().join("notes/today.md")).unwrap(),
        b"# today"
    );

    let GetContent::Listing(listing) = service.get("disk", "notes").await.unwrap() else {
        panic!("expected a directory listing");
    };
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "disk/notes/today.md");

    assert!(matches!(
        service.get("disk", "../outside").await,
        Err(RegistryError::PathEscapesRoot(_))
    ));
}

#[tokio::test]
async fn transfer_from_memory_to_disk() {
    let disk = TempDir::new().unwrap();
    let fx = Fixture::new(&format!(
        "{MEM1}  - name: disk\n    path: {}\n",
        disk.path().display()
    ))
    .await;
    let service = fx.service();

    service.post("mem1", "export/a.txt", Some(b"a")).await.unwrap();
    service.post("mem1", "export/deep/b.txt", Some(b"b")).await.unwrap();

    let files = service.transfer("mem1", "export", "disk", "backup").await.unwrap();
    assert_eq!(files, 2);
    assert_eq!(std::fs::read(disk.path().join("backup/a.txt")).unwrap(), b"a");
    assert_eq!(std::fs::read(disk.path().join("backup/deep/b.txt")).unwrap(), b"b");
}

#[tokio::test]
async fn transfer_within_one_backend() {
    let fx = Fixture::new(&format!("{MEM1}  - name: inner\n    path: memory://m/tree\n")).await;
    let service = fx.service();
    service.post("mem1", "tree/a.txt", Some(b"a")).await.unwrap();

    assert!(matches!(
        service.transfer("mem1", "tree", "mem1", "tree/copy").await,
        Err(RegistryError::Vfs(VfsError::InvalidPath(_)))
    ));

    // `inner` shares the memory store and sits inside the source tree.
    let files = service.transfer("mem1", "tree", "inner", "copy").await.unwrap();
    assert_eq!(files, 1);
    assert_eq!(
        service.get("mem1", "tree/copy/a.txt").await.unwrap(),
        GetContent::Bytes(b"a".to_vec())
    );
    assert!(matches!(
        service.get("mem1", "tree/copy/copy").await,
        Err(RegistryError::Vfs(VfsError::NotFound(_)))
    ));
}

// ============================================================================
// Local root forms
// ============================================================================

/// `target` spelled relative to the working directory, through `..`.
#[cfg(unix)]
fn relative_to_cwd(target: &Path) -> String {
    let cwd = std::env::current_dir().unwrap();
    let ups = cwd.components().count() - 1;
    let below_root = target.strip_prefix("/").unwrap();
    format!("{}{}", "../".repeat(ups), below_root.display())
}

#[cfg(unix)]
#[tokio::test]
async fn relative_local_root() {
    let disk = TempDir::new().unwrap();
    std::fs::write(disk.path().join("a.txt"), b"on disk").unwrap();
    let fx = Fixture::new(&format!(
        "sources:\n  - name: rel\n    path: {}\n  - name: dot\n    path: ./{}\n",
        relative_to_cwd(disk.path()),
        relative_to_cwd(disk.path()),
    ))
    .await;
    let service = fx.service();

    for key in ["rel", "dot"] {
        let entry = fx.manager.get_filesystem(key).unwrap();
        assert_eq!(entry.root_path, disk.path().display().to_string(), "{key}");

        let resolved = fx.manager.validate(RequestKind::Get, key, "a.txt").unwrap();
        assert_eq!(resolved.path, disk.path().join("a.txt").display().to_string());
        assert_eq!(
            service.get(key, "a.txt").await.unwrap(),
            GetContent::Bytes(b"on disk".to_vec())
        );
        let GetContent::Listing(listing) = service.get(key, "").await.unwrap() else {
            panic!("expected a directory listing");
        };
        assert_eq!(listing[0].name, format!("{key}/a.txt"));
    }

    service.post("rel", "new.txt", Some(b"new")).await.unwrap();
    assert_eq!(std::fs::read(disk.path().join("new.txt")).unwrap(), b"new");
}

#[tokio::test]
async fn home_and_filesystem_root_sources() {
    let fx = Fixture::new(
        "\
sources:
  - name: home
    path: ~/strata-data
  - name: root
    path: /
",
    )
    .await;

    if let Some(home) = dirs::home_dir() {
        let expected = home.join("strata-data");
        let entry = fx.manager.get_filesystem("home").unwrap();
        assert_eq!(entry.root_path, expected.display().to_string());
        let resolved = fx.manager.validate(RequestKind::Put, "home", "a.txt").unwrap();
        assert_eq!(resolved.path, expected.join("a.txt").display().to_string());
    }

    let root = fx.manager.get_filesystem("root").unwrap();
    assert_eq!(root.root_path, "/");
    assert_eq!(
        fx.manager.validate(RequestKind::Get, "root", "etc/hosts").unwrap().path,
        "/etc/hosts"
    );
    assert_eq!(
        fx.manager.validate(RequestKind::Get, "root", "/etc/hosts").unwrap().path,
        "/etc/hosts"
    );
    assert_eq!(fx.manager.validate(RequestKind::Get, "root", "").unwrap().path, "/");
}
