//! Scan orchestration.
//!
//! [`scan_blocks`] enumerates a tenant's blocks, fetches both metadata shapes
//! of every block with bounded parallelism, and gathers the unified records
//! into a [`ScanReport`]. Only enumeration failing is fatal: a block whose
//! metadata can't be read ends up in [`ScanReport::failures`] and the rest of
//! the scan carries on.

use crate::error::{Error, ErrorKind, Result};
use crate::unify::{BlockState, UnifiedBlock, WindowRange, unify};
use crate::waitgroup::BoundedWaitGroup;
use blockscope_storage::{BlockId, BlockMeta, BlockReader, CompactedBlockMeta};
use exn::ResultExt;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use tracing::instrument;

/// Default number of blocks fetched at once.
pub const DEFAULT_CONCURRENCY: NonZeroUsize = match NonZeroUsize::new(10) {
    Some(n) => n,
    None => panic!("default concurrency is non-zero"),
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    pub window: WindowRange,
    /// Maximum number of blocks being fetched at the same time.
    pub concurrency: NonZeroUsize,
}
impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            window: WindowRange::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// A block whose metadata could not be fetched.
#[derive(Debug)]
pub struct BlockFailure {
    pub id: BlockId,
    pub error: Error,
}

/// Everything one scan pass found.
///
/// `blocks` follow enumeration order (sorted by id); callers that want
/// another order sort explicitly.
#[derive(Debug)]
pub struct ScanReport {
    pub tenant: String,
    pub blocks: Vec<UnifiedBlock>,
    pub failures: Vec<BlockFailure>,
}

/// Counts derived from a [`ScanReport`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub total: usize,
    pub active: usize,
    pub compacted: usize,
    pub unknown: usize,
    pub failed: usize,
    /// Objects across active blocks only; compacted blocks hold copies.
    pub active_objects: u64,
    /// Number of active blocks per window.
    pub windows: BTreeMap<i64, usize>,
}

impl ScanReport {
    fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            blocks: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// `true` when every enumerated block was fetched.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> ScanSummary {
        let mut summary = ScanSummary {
            total: self.blocks.len() + self.failures.len(),
            failed: self.failures.len(),
            ..Default::default()
        };
        for block in &self.blocks {
            if block.is_unknown() {
                summary.unknown += 1;
            } else if block.compacted {
                summary.compacted += 1;
            } else {
                summary.active += 1;
                summary.active_objects += block.objects.unsigned_abs();
                *summary.windows.entry(block.window).or_default() += 1;
            }
        }
        summary
    }
}

/// Scan every block of `tenant`.
///
/// Each block is fetched on its own task, admitted through a
/// [`BoundedWaitGroup`] so that at most `options.concurrency` fetches run at
/// once. Results are kept per task and merged only after every task has
/// finished.
///
/// # Errors
///
/// [`ErrorKind::Enumeration`] if the blocks can't be listed; no partial
/// report is returned in that case.
#[instrument(skip(reader, options), fields(backend = reader.name(), concurrency = options.concurrency.get()))]
pub async fn scan_blocks(reader: &BlockReader, tenant: &str, options: &ScanOptions) -> Result<ScanReport> {
    let ids = reader.blocks(tenant).await.or_raise(|| ErrorKind::Enumeration(tenant.to_string()))?;
    tracing::info!(blocks = ids.len(), "Discovered blocks");

    let group = BoundedWaitGroup::new(options.concurrency);
    let mut tasks = Vec::with_capacity(ids.len());
    for id in ids {
        let admission = group.enter().await;
        let reader = reader.clone();
        let tenant = tenant.to_string();
        let window = options.window;
        let task = tokio::spawn(async move {
            let _admission = admission;
            fetch_block(&reader, &tenant, id, window).await
        });
        tasks.push((id, task));
    }
    group.join().await;

    let mut report = ScanReport::new(tenant);
    for (id, task) in tasks {
        match task.await {
            Ok(Ok(block)) => report.blocks.push(block),
            Ok(Err(error)) => {
                tracing::warn!(block = %id, error = %*error, "Failed to fetch block metadata");
                report.failures.push(BlockFailure { id, error });
            },
            Err(join_error) => {
                tracing::error!(block = %id, error = %join_error, "Block fetch task did not complete");
                report.failures.push(BlockFailure { id, error: Error::from(ErrorKind::TaskFailed(id)) });
            },
        }
    }
    tracing::info!(fetched = report.blocks.len(), failed = report.failures.len(), "Scan complete");
    Ok(report)
}

/// Look up both metadata shapes of one block.
async fn lookup(
    reader: &BlockReader,
    tenant: &str,
    id: BlockId,
) -> Result<(Option<BlockMeta>, Option<CompactedBlockMeta>)> {
    let (active, compacted) = tokio::join!(reader.block_meta(tenant, &id), reader.compacted_block_meta(tenant, &id));
    let active = active.or_raise(|| ErrorKind::Fetch(id))?;
    let compacted = compacted.or_raise(|| ErrorKind::Fetch(id))?;
    Ok((active, compacted))
}

async fn fetch_block(reader: &BlockReader, tenant: &str, id: BlockId, window: WindowRange) -> Result<UnifiedBlock> {
    let (active, compacted) = lookup(reader, tenant, id).await?;
    let state = BlockState::from_lookups(active, compacted);
    if state == BlockState::Unknown {
        tracing::debug!(block = %id, "Block has neither active nor compacted metadata");
    }
    Ok(unify(&state, window))
}

/// Both metadata lookups of a single block, plus their unified record.
#[derive(Debug)]
pub struct BlockInspection {
    pub tenant: String,
    pub id: BlockId,
    pub active: Option<BlockMeta>,
    pub compacted: Option<CompactedBlockMeta>,
    pub block: UnifiedBlock,
}
impl BlockInspection {
    /// The block has both active and compacted metadata. Normal for a moment
    /// during compaction; suspicious if it persists.
    pub fn is_ambiguous(&self) -> bool {
        self.active.is_some() && self.compacted.is_some()
    }

    /// Neither metadata object exists.
    pub fn is_missing(&self) -> bool {
        self.active.is_none() && self.compacted.is_none()
    }
}

/// Fetch and unify a single block. Unlike [`scan_blocks`], a failed lookup
/// is returned as an error since there is nothing else to report.
#[instrument(skip(reader, window), fields(backend = reader.name()))]
pub async fn inspect_block(
    reader: &BlockReader,
    tenant: &str,
    id: BlockId,
    window: WindowRange,
) -> Result<BlockInspection> {
    let (active, compacted) = lookup(reader, tenant, id).await?;
    let state = BlockState::from_lookups(active.clone(), compacted.clone());
    let mut block = unify(&state, window);
    if block.is_unknown() {
        // Keep the id the caller asked about, even though nothing was found.
        block.id = id;
    }
    Ok(BlockInspection {
        tenant: tenant.to_string(),
        id,
        active,
        compacted,
        block,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use blockscope_storage::StorageBackend;
    use blockscope_storage::backend::MockBackend;
    use futures::Stream;
    use std::path::Path;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use time::OffsetDateTime;
    use time::macros::datetime;
    use uuid::Uuid;

    const A: Uuid = Uuid::from_u128(0xa);
    const B: Uuid = Uuid::from_u128(0xb);
    const C: Uuid = Uuid::from_u128(0xc);

    fn meta(id: Uuid, objects: u64, level: u8) -> BlockMeta {
        BlockMeta::new(id, "t", datetime!(2021-01-01 10:00 UTC), datetime!(2021-01-01 11:30 UTC))
            .with_total_objects(objects)
            .with_compaction_level(level)
    }

    fn json<T: serde::Serialize>(value: &T) -> Vec<u8> {
        serde_json::to_vec(value).unwrap()
    }

    /// A has active metadata, B compacted, C neither (only a data object).
    fn backend() -> MockBackend {
        MockBackend::with_objects([
            (format!("t/{A}/meta.json"), json(&meta(A, 10, 1))),
            (
                format!("t/{B}/meta.compacted.json"),
                json(&meta(B, 20, 2).into_compacted(datetime!(2021-01-02 0:00 UTC))),
            ),
            (format!("t/{C}/data"), b"block data".to_vec()),
        ])
    }

    fn reader(backend: MockBackend) -> BlockReader {
        BlockReader::new(Arc::new(backend))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scan_active_compacted_and_unknown() {
        let report = scan_blocks(&reader(backend()), "t", &ScanOptions::default()).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.tenant, "t");
        assert_eq!(report.blocks.len(), 3);

        let window = WindowRange::default().window_of(datetime!(2021-01-01 11:30 UTC));
        assert_eq!(report.blocks[0], UnifiedBlock {
            id: A,
            compaction_level: 1,
            objects: 10,
            window,
            start: datetime!(2021-01-01 10:00 UTC),
            end: datetime!(2021-01-01 11:30 UTC),
            compacted: false,
        });
        assert_eq!(report.blocks[1], UnifiedBlock {
            id: B,
            compaction_level: 2,
            objects: 20,
            window,
            start: datetime!(2021-01-01 10:00 UTC),
            end: datetime!(2021-01-01 11:30 UTC),
            compacted: true,
        });
        assert_eq!(report.blocks[2], UnifiedBlock::unknown());

        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!((summary.active, summary.compacted, summary.unknown, summary.failed), (1, 1, 1, 0));
        assert_eq!(summary.active_objects, 10);
        assert_eq!(summary.windows.get(&window), Some(&1));
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_fatal() {
        let err = scan_blocks(&reader(backend().fail_under("t")), "t", &ScanOptions::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Enumeration(tenant) if tenant == "t"));
    }

    #[tokio::test]
    async fn test_block_failures_are_collected() {
        let backend = backend().fail_under(format!("t/{B}/meta.compacted.json"));
        let report = scan_blocks(&reader(backend), "t", &ScanOptions::default()).await.unwrap();
        assert!(!report.is_complete());
        assert_eq!(report.blocks.len(), 2);
        assert_eq!(report.blocks[0].id, A);
        assert!(report.blocks[1].is_unknown());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].id, B);
        assert!(matches!(&*report.failures[0].error, ErrorKind::Fetch(id) if *id == B));
        assert_eq!(report.summary().failed, 1);
        assert_eq!(report.summary().total, 3);
    }

    #[tokio::test]
    async fn test_empty_tenant() {
        let report = scan_blocks(&reader(backend()), "nobody", &ScanOptions::default()).await.unwrap();
        assert!(report.blocks.is_empty());
        assert!(report.is_complete());
        assert_eq!(report.summary(), ScanSummary::default());
    }

    /// Wraps a [`MockBackend`], recording the highest number of reads in
    /// progress at once.
    struct CountingBackend {
        inner: MockBackend,
        reading: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StorageBackend for CountingBackend {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn list_stream<'a>(
            &'a self,
            prefix: Option<&'a Path>,
        ) -> Pin<Box<dyn Stream<Item = blockscope_storage::error::Result<String>> + Send + 'a>> {
            self.inner.list_stream(prefix)
        }

        async fn read(&self, path: &Path) -> blockscope_storage::error::Result<Vec<u8>> {
            let now = self.reading.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            let result = self.inner.read(path).await;
            self.reading.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_blocks_with_small_capacity() {
        let inner = MockBackend::default();
        let mut expected = Vec::new();
        for n in 0..40u128 {
            let id = Uuid::from_u128(n + 1);
            inner.insert(format!("t/{id}/meta.json"), json(&meta(id, 1, 0))).await.unwrap();
            expected.push(id);
        }
        let backend = Arc::new(CountingBackend {
            inner,
            reading: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let options = ScanOptions { concurrency: NonZeroUsize::new(3).unwrap(), ..Default::default() };
        let report = scan_blocks(&BlockReader::new(backend.clone()), "t", &options).await.unwrap();

        let ids: Vec<_> = report.blocks.iter().map(|b| b.id).collect();
        assert_eq!(ids, expected);
        assert_eq!(report.summary().active_objects, 40);
        // Each admitted fetch performs its two lookups side by side.
        let peak = backend.peak.load(Ordering::SeqCst);
        assert!(peak >= 1);
        assert!(peak <= 2 * options.concurrency.get(), "peak of {peak} concurrent reads");
    }

    #[tokio::test]
    async fn test_inspect_block() {
        let reader = reader(backend());
        let inspection = inspect_block(&reader, "t", B, WindowRange::default()).await.unwrap();
        assert!(inspection.block.compacted);
        assert!(!inspection.is_ambiguous());
        assert_eq!(inspection.compacted.as_ref().map(|c| c.compacted_time), Some(datetime!(2021-01-02 0:00 UTC)));

        let inspection = inspect_block(&reader, "t", C, WindowRange::default()).await.unwrap();
        assert!(inspection.is_missing());
        assert!(inspection.block.is_unknown());
        assert_eq!(inspection.block.id, C);
    }

    #[tokio::test]
    async fn test_inspect_ambiguous_block() {
        let backend = backend();
        backend
            .insert(format!("t/{A}/meta.compacted.json"), json(&meta(A, 10, 1).into_compacted(OffsetDateTime::UNIX_EPOCH)))
            .await
            .unwrap();
        let inspection = inspect_block(&reader(backend), "t", A, WindowRange::default()).await.unwrap();
        assert!(inspection.is_ambiguous());
        assert!(!inspection.block.compacted);
    }

    #[tokio::test]
    async fn test_inspect_failure_is_returned() {
        let backend = backend().fail_under(format!("t/{A}"));
        let err = inspect_block(&reader(backend), "t", A, WindowRange::default()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Fetch(id) if *id == A));
    }
}
