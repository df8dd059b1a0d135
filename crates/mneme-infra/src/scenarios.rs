//! End-to-end scenarios over the real backends: SQLite metadata, flat index,
//! Arrow snapshot artifacts and the local blob store.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use mneme_core::memory::engine::SemanticMemoryEngine;
use mneme_core::memory::gate::WriteGate;
use mneme_core::memory::registry::IndexRegistry;
use mneme_core::memory::store::MetadataStore;
use mneme_core::service::memory::MemoryService;
use mneme_core::snapshot::coordinator::SnapshotCoordinator;
use mneme_types::config::RetrievalConfig;
use mneme_types::conversation::RegisterConversationRequest;
use mneme_types::error::MemoryError;
use mneme_types::snapshot::{LoadOutcome, LoadReport, RestoreMode, index_file_name};

use crate::blob::local::LocalBlobStore;
use crate::embedding::hashing::HashingEmbedder;
use crate::sqlite::conversation::SqliteConversationRepository;
use crate::sqlite::memory::SqliteMetadataStore;
use crate::sqlite::pool::DatabasePool;
use crate::vector::flat::FlatIndex;

type Engine = SemanticMemoryEngine<SqliteMetadataStore, HashingEmbedder, FlatIndex>;
type Service =
    MemoryService<SqliteConversationRepository, SqliteMetadataStore, HashingEmbedder, FlatIndex>;
type Coordinator = SnapshotCoordinator<SqliteMetadataStore, FlatIndex, LocalBlobStore>;

const BUCKET: &str = "mneme";
const PREFIX: &str = "snapshots/test";

/// One process worth of wiring, with its own database file.
struct Node {
    _db_dir: TempDir,
    service: Service,
    coordinator: Coordinator,
}

impl Node {
    async fn start(blob_root: &Path) -> Self {
        let db_dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}?mode=rwc", db_dir.path().join("mneme.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();

        let metadata = Arc::new(SqliteMetadataStore::new(pool.clone()));
        let conversations = Arc::new(SqliteConversationRepository::new(pool));
        let registry = Arc::new(IndexRegistry::<FlatIndex>::new());
        let gate = Arc::new(WriteGate::new(true));

        let engine = Arc::new(SemanticMemoryEngine::new(
            metadata.clone(),
            Arc::new(HashingEmbedder::default()),
            registry.clone(),
            gate.clone(),
        ));
        let coordinator = SnapshotCoordinator::new(
            metadata,
            registry,
            Arc::new(LocalBlobStore::new(blob_root.to_path_buf())),
            gate,
            BUCKET,
            PREFIX,
        );
        let service = MemoryService::new(conversations, engine, RetrievalConfig::default());

        Self {
            _db_dir: db_dir,
            service,
            coordinator,
        }
    }

    fn engine(&self) -> &Engine {
        self.service.engine()
    }

    async fn register(&self, agent: &str, user: &str) -> String {
        self.service
            .register_conversation(RegisterConversationRequest {
                agent: agent.to_string(),
                user: user.to_string(),
            })
            .await
            .unwrap()
            .id
            .to_string()
    }

    async fn store(&self, conversation_id: &str, query: &str, response: &str) {
        self.service
            .store(conversation_id, query, response, &CancellationToken::new())
            .await
            .unwrap();
    }

    async fn top_query(&self, conversation_id: &str, query: &str) -> Option<String> {
        self.service
            .retrieve(conversation_id, query, 1, &CancellationToken::new())
            .await
            .unwrap()
            .similar
            .first()
            .map(|r| r.memory.query.clone())
    }
}

fn report(outcome: LoadOutcome) -> LoadReport {
    match outcome {
        LoadOutcome::Restored(report) => report,
        LoadOutcome::NoSnapshot => panic!("expected a restored snapshot"),
    }
}

async fn seed_support_conversation(node: &Node) -> String {
    let conv = node.register("support-bot", "alice").await;
    node.store(&conv, "How do I reset my password?", "Use the forgot password link.")
        .await;
    node.store(&conv, "How do I change my email address?", "Open account settings.")
        .await;
    node.store(&conv, "What is the weather like today?", "I cannot check the weather.")
        .await;
    conv
}

#[tokio::test]
async fn password_question_recalls_reset_turn() {
    let blobs = TempDir::new().unwrap();
    let node = Node::start(blobs.path()).await;
    let conv = seed_support_conversation(&node).await;

    let recall = node
        .service
        .retrieve(&conv, "I forgot my password", 2, &CancellationToken::new())
        .await
        .unwrap();

    assert!(recall.similarity_available);
    assert_eq!(recall.similar.len(), 2);
    assert_eq!(recall.similar[0].memory.query, "How do I reset my password?");
    assert!(recall.similar[0].distance <= recall.similar[1].distance);
    assert_eq!(recall.recent.len(), 3);
    assert_eq!(recall.recent[0].query, "How do I reset my password?");
    assert_eq!(recall.recent[2].query, "What is the weather like today?");
}

#[tokio::test]
async fn conversations_do_not_see_each_other() {
    let blobs = TempDir::new().unwrap();
    let node = Node::start(blobs.path()).await;
    let a = seed_support_conversation(&node).await;
    let b = node.register("support-bot", "bob").await;

    let recall = node
        .service
        .retrieve(&b, "I forgot my password", 5, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!recall.similarity_available);
    assert!(recall.similar.is_empty());
    assert!(recall.recent.is_empty());

    node.store(&b, "Will it rain tomorrow?", "Probably.").await;
    let recall = node
        .service
        .retrieve(&b, "I forgot my password", 5, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(recall.similar.len(), 1);
    assert_eq!(recall.similar[0].memory.query, "Will it rain tomorrow?");
    assert_eq!(
        node.top_query(&a, "what about the weather").await.unwrap(),
        "What is the weather like today?"
    );
}

#[tokio::test]
async fn snapshot_restores_into_a_fresh_node() {
    let blobs = TempDir::new().unwrap();
    let first = Node::start(blobs.path()).await;
    let conv = seed_support_conversation(&first).await;

    let summary = first.coordinator.store(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.manifest.memory_count, 3);
    assert_eq!(summary.manifest.conversation_count, 1);
    assert!(summary.bytes_written > 0);

    let second = Node::start(blobs.path()).await;
    let restored = report(
        second
            .coordinator
            .load(RestoreMode::Full, &CancellationToken::new())
            .await
            .unwrap(),
    );
    assert!(restored.recency_only.is_empty());
    assert!(
        restored
            .partitions
            .iter()
            .all(|(_, p)| p.orphan_vectors.is_empty() && p.unindexed_rows.is_empty())
    );

    let conversation = second.service.conversation(&conv).await.unwrap();
    assert_eq!(conversation.user, "alice");
    for query in ["I forgot my password", "what about the weather", "change email"] {
        assert_eq!(first.top_query(&conv, query).await, second.top_query(&conv, query).await);
    }

    // Ids keep increasing after a restore.
    second.store(&conv, "Thanks!", "You're welcome.").await;
    let recent = second.service.recent(&conv, Some(10)).await.unwrap();
    assert_eq!(recent.len(), 4);
    assert!(recent.windows(2).all(|w| w[0].internal_id < w[1].internal_id));
}

#[tokio::test]
async fn loading_twice_converges() {
    let blobs = TempDir::new().unwrap();
    let first = Node::start(blobs.path()).await;
    let conv = seed_support_conversation(&first).await;
    first.coordinator.store(&CancellationToken::new()).await.unwrap();

    let second = Node::start(blobs.path()).await;
    let cancel = CancellationToken::new();
    let once = report(second.coordinator.load(RestoreMode::Full, &cancel).await.unwrap());
    let twice = report(second.coordinator.load(RestoreMode::Full, &cancel).await.unwrap());

    assert_eq!(once, twice);
    assert_eq!(second.engine().metadata().count().await.unwrap(), 3);
    assert_eq!(
        second.top_query(&conv, "I forgot my password").await.unwrap(),
        "How do I reset my password?"
    );
}

#[tokio::test]
async fn missing_index_file_degrades_to_recency_then_reindexes() {
    let blobs = TempDir::new().unwrap();
    let first = Node::start(blobs.path()).await;
    let conv = seed_support_conversation(&first).await;
    first.coordinator.store(&CancellationToken::new()).await.unwrap();

    let conversation_id = first.service.conversation(&conv).await.unwrap().id;
    let index_path = blobs
        .path()
        .join(BUCKET)
        .join(PREFIX)
        .join(index_file_name(&conversation_id));
    std::fs::remove_file(index_path).unwrap();

    let second = Node::start(blobs.path()).await;
    let restored = report(
        second
            .coordinator
            .load(RestoreMode::Full, &CancellationToken::new())
            .await
            .unwrap(),
    );
    assert_eq!(restored.recency_only, vec![conversation_id]);

    let recall = second
        .service
        .retrieve(&conv, "I forgot my password", 3, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!recall.similarity_available);
    assert_eq!(recall.recent.len(), 3);

    second.engine().queue_from_report(&restored);
    let reindexed = second
        .engine()
        .reindex_pending(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reindexed, 3);
    assert_eq!(
        second.top_query(&conv, "I forgot my password").await.unwrap(),
        "How do I reset my password?"
    );
}

#[tokio::test]
async fn partition_dimension_is_fixed_by_first_vector() {
    let blobs = TempDir::new().unwrap();
    let node = Node::start(blobs.path()).await;
    let conv = seed_support_conversation(&node).await;
    let conversation_id = node.service.conversation(&conv).await.unwrap().id;

    let engine = node.engine();
    let narrow = SemanticMemoryEngine::new(
        engine.metadata().clone(),
        Arc::new(HashingEmbedder::new(64).unwrap()),
        engine.registry().clone(),
        Arc::new(WriteGate::default()),
    );

    let err = narrow
        .store(conversation_id, "Another password question", "ok", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MemoryError::DimensionMismatch { expected: 256, actual: 64, .. }
    ));
    assert_eq!(engine.metadata().count().await.unwrap(), 3);
    assert_eq!(engine.registry().ids_of(&conversation_id).await.len(), 3);
}

#[tokio::test]
async fn unknown_conversation_is_rejected_end_to_end() {
    let blobs = TempDir::new().unwrap();
    let node = Node::start(blobs.path()).await;
    let stranger = mneme_types::conversation::ConversationId::new().to_string();

    let err = node
        .service
        .store(&stranger, "hello", "hi", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::ConversationNotFound(_)));
    assert_eq!(node.engine().metadata().count().await.unwrap(), 0);
}

#[tokio::test]
async fn punctuation_only_turns_are_stored_and_retrieved() {
    let blobs = TempDir::new().unwrap();
    let node = Node::start(blobs.path()).await;
    let conv = node.register("support-bot", "dana").await;

    node.store(&conv, "???", "Could you rephrase that?").await;
    assert_eq!(node.top_query(&conv, "?!").await.as_deref(), Some("???"));
}
