use async_trait::async_trait;
use pretty_assertions::assert_eq;
use repolens_indexer::{
    ErrorKind, IndexerError, LocalDirectorySource, RagConfig, RepoService, SourceProvider,
};
use repolens_vector_store::{EmbeddingModel, IndexPaths};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn words(prefix: &str, count: usize) -> String {
    (0..count)
        .map(|i| format!("{prefix}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_repo(files: &[(&str, String)]) -> TempDir {
    let temp = TempDir::new().expect("tempdir");
    for (name, content) in files {
        let path = temp.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create dirs");
        }
        std::fs::write(path, content).expect("write file");
    }
    temp
}

fn service_with(config: RagConfig) -> RepoService {
    RepoService::new(config, Arc::new(EmbeddingModel::stub(32))).expect("service")
}

async fn indexed_files(service: &RepoService) -> BTreeSet<String> {
    service
        .ask("anything at all", Some(1000))
        .await
        .expect("ask")
        .into_iter()
        .map(|p| p.file_path)
        .collect()
}

#[tokio::test]
async fn two_file_repository_end_to_end() {
    let repo = write_repo(&[
        ("a.md", words("a", 450)),
        ("src/b.py", words("b", 1200)),
    ]);
    let service = service_with(RagConfig::default());

    let stats = service.ingest(repo.path()).await.expect("ingest");
    assert_eq!(stats.files_loaded, 2);
    assert_eq!(stats.chunks_created, 4);
    assert_eq!(stats.files_skipped, 0);

    let passages = service.ask("what is in b?", Some(2)).await.expect("ask");
    assert_eq!(passages.len(), 2);
    for passage in &passages {
        assert!(!passage.file_path.is_empty());
        assert!(!passage.content.is_empty());
    }

    assert_eq!(
        indexed_files(&service).await,
        BTreeSet::from(["a.md".to_string(), "src/b.py".to_string()])
    );

    // default top_k comes from config
    assert_eq!(service.ask("b", None).await.expect("ask").len(), 4);
}

#[tokio::test]
async fn failed_ingest_keeps_previous_index() {
    let repo = write_repo(&[("notes.txt", words("n", 20))]);
    let empty = write_repo(&[("image.png", "not text".to_string())]);
    let service = service_with(RagConfig::default());

    service.ingest(repo.path()).await.expect("ingest");
    let err = service.ingest(empty.path()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EmptyRepository);
    assert!(!err.is_retryable());

    assert_eq!(
        indexed_files(&service).await,
        BTreeSet::from(["notes.txt".to_string()])
    );
}

#[tokio::test]
async fn reingest_replaces_the_whole_index() {
    let first = write_repo(&[("old.md", words("o", 30))]);
    let second = write_repo(&[("new.md", words("x", 30)), ("more.txt", words("y", 5))]);
    let service = service_with(RagConfig::default());

    service.ingest(first.path()).await.expect("first ingest");
    service.ingest(second.path()).await.expect("second ingest");

    assert_eq!(
        indexed_files(&service).await,
        BTreeSet::from(["more.txt".to_string(), "new.md".to_string()])
    );
}

#[tokio::test]
async fn persisted_index_is_restored_by_a_new_service() {
    let repo = write_repo(&[("a.py", words("a", 700)), ("b.js", words("b", 40))]);
    let store = TempDir::new().expect("store");
    let config = RagConfig {
        store_dir: Some(store.path().to_path_buf()),
        ..RagConfig::default()
    };

    let writer = service_with(config.clone());
    writer.ingest(repo.path()).await.expect("ingest");
    let before = writer.ask("a42 a43", Some(3)).await.expect("ask");

    let paths = IndexPaths::in_dir(store.path());
    assert!(paths.vectors.exists());
    assert!(paths.metadata.exists());

    let reader = service_with(config);
    assert!(!reader.has_index());
    assert!(reader.restore().await.expect("restore"));
    assert_eq!(reader.ask("a42 a43", Some(3)).await.expect("ask"), before);
}

#[tokio::test]
async fn restore_reports_missing_and_corrupt_stores() {
    let store = TempDir::new().expect("store");
    let config = RagConfig {
        store_dir: Some(store.path().to_path_buf()),
        ..RagConfig::default()
    };
    let service = service_with(config);
    assert!(!service.restore().await.expect("restore"));

    let paths = IndexPaths::in_dir(store.path());
    std::fs::write(&paths.vectors, b"garbage").expect("write");
    std::fs::write(&paths.metadata, b"{}").expect("write");
    let err = service.restore().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptIndex);
    assert!(!service.has_index());
}

#[tokio::test]
async fn restore_rejects_index_of_another_dimension() {
    let repo = write_repo(&[("a.md", words("a", 10))]);
    let store = TempDir::new().expect("store");
    let config = RagConfig {
        store_dir: Some(store.path().to_path_buf()),
        ..RagConfig::default()
    };

    service_with(config.clone())
        .ingest(repo.path())
        .await
        .expect("ingest");

    let other = RepoService::new(config, Arc::new(EmbeddingModel::stub(8))).expect("service");
    let err = other.restore().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_observe_complete_snapshots_during_reingest() {
    let repo_a = write_repo(&[("a1.txt", words("a", 900)), ("a2.txt", words("c", 50))]);
    let repo_b = write_repo(&[
        ("b1.md", words("b", 1200)),
        ("b2.md", words("d", 10)),
        ("b3.md", words("e", 10)),
    ]);
    let set_a = BTreeSet::from(["a1.txt".to_string(), "a2.txt".to_string()]);
    let set_b = BTreeSet::from([
        "b1.md".to_string(),
        "b2.md".to_string(),
        "b3.md".to_string(),
    ]);

    let service = Arc::new(service_with(RagConfig {
        embed_batch_size: 1,
        ..RagConfig::default()
    }));
    service.ingest(repo_a.path()).await.expect("ingest a");

    let writer = {
        let service = service.clone();
        let roots: Vec<PathBuf> = vec![repo_b.path().into(), repo_a.path().into()];
        tokio::spawn(async move {
            for round in 0..6 {
                let root = &roots[round % 2];
                service.ingest(root).await.expect("reingest");
            }
        })
    };

    while !writer.is_finished() {
        let seen = indexed_files(&service).await;
        assert!(
            seen == set_a || seen == set_b,
            "query saw a mixed or partial index: {seen:?}"
        );
        tokio::task::yield_now().await;
    }
    writer.await.expect("writer task");
    // last round re-ingested repo a
    assert_eq!(indexed_files(&service).await, set_a);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restore_never_mixes_artifacts_of_concurrent_saves() {
    let repo_a = write_repo(&[("a.txt", words("a", 40))]);
    let repo_b = write_repo(&[("b.txt", words("b", 40))]);
    let store = TempDir::new().expect("store");
    let config = RagConfig {
        store_dir: Some(store.path().to_path_buf()),
        ..RagConfig::default()
    };

    let writer = service_with(config.clone());
    writer.ingest(repo_a.path()).await.expect("ingest a");

    let saves = {
        let roots: Vec<PathBuf> = vec![repo_b.path().into(), repo_a.path().into()];
        tokio::spawn(async move {
            for round in 0..40 {
                writer.ingest(&roots[round % 2]).await.expect("reingest");
            }
        })
    };

    let reader = service_with(config);
    while !saves.is_finished() {
        // the read lock keeps restore out of the middle of a save
        assert!(reader.restore().await.expect("restore"));
        let seen = indexed_files(&reader).await;
        assert!(
            seen == BTreeSet::from(["a.txt".to_string()])
                || seen == BTreeSet::from(["b.txt".to_string()]),
            "restored a mixed index: {seen:?}"
        );
    }
    saves.await.expect("writer task");

    assert!(reader.restore().await.expect("restore"));
    assert_eq!(
        indexed_files(&reader).await,
        BTreeSet::from(["a.txt".to_string()])
    );
}

struct NeverReady;

#[async_trait]
impl SourceProvider for NeverReady {
    async fn acquire(&self, _identifier: &str) -> repolens_indexer::Result<PathBuf> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(PathBuf::from("/unreachable"))
    }
}

struct Broken;

#[async_trait]
impl SourceProvider for Broken {
    async fn acquire(&self, identifier: &str) -> repolens_indexer::Result<PathBuf> {
        Err(IndexerError::Generation(format!("cannot fetch {identifier}")))
    }
}

#[tokio::test(start_paused = true)]
async fn source_acquisition_times_out() {
    let service = service_with(RagConfig {
        acquire_timeout_secs: 5,
        ..RagConfig::default()
    });
    let err = service
        .ingest_source(&NeverReady, "git@example.com:repo.git")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);
    assert!(err.is_retryable());
    assert!(err.to_string().contains("timed out after 5s"));
}

#[tokio::test]
async fn source_failures_surface_as_source_unavailable() {
    let repo = write_repo(&[("keep.md", words("k", 12))]);
    let service = service_with(RagConfig::default());
    service
        .ingest_source(&LocalDirectorySource, repo.path().to_str().unwrap())
        .await
        .expect("ingest local");

    let err = service
        .ingest_source(&Broken, "https://example.com/repo")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);

    let missing: &Path = &repo.path().join("missing");
    let err = service
        .ingest_source(&LocalDirectorySource, missing.to_str().unwrap())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceUnavailable);

    assert_eq!(
        indexed_files(&service).await,
        BTreeSet::from(["keep.md".to_string()])
    );
}
