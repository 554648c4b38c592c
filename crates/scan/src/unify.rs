//! Unification of active and compacted block metadata.
//!
//! A block shows up in one of three ways: with active metadata, with
//! compacted metadata, or (transiently, mid-compaction, or after a failed
//! cleanup) with neither. [`unify`] folds all three into one comparable
//! [`UnifiedBlock`] so that a scan can report every block side by side.

use crate::error::{Error, ErrorKind};
use blockscope_storage::{BlockId, BlockMeta, CompactedBlockMeta};
use std::num::NonZeroU64;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// Duration of one compaction window, in whole seconds.
///
/// Blocks are bucketed into windows by their end time; blocks in the same
/// window are the ones a compactor would consider merging together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowRange(NonZeroU64);

impl WindowRange {
    /// One hour, the usual compaction window.
    pub const DEFAULT: Self = match NonZeroU64::new(3600) {
        Some(secs) => Self(secs),
        None => panic!("default window is non-zero"),
    };

    pub fn as_secs(&self) -> u64 {
        self.0.get()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0.get())
    }

    /// Index of the window containing `end`: `floor(end / window)` in Unix
    /// seconds, rounding towards negative infinity for pre-epoch times.
    pub fn window_of(&self, end: OffsetDateTime) -> i64 {
        let secs = i64::try_from(self.0.get()).unwrap_or(i64::MAX);
        end.unix_timestamp().div_euclid(secs)
    }
}
impl Default for WindowRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}
impl TryFrom<Duration> for WindowRange {
    type Error = Error;

    /// Sub-second precision is truncated; anything under one second is
    /// rejected.
    fn try_from(duration: Duration) -> Result<Self, Self::Error> {
        match NonZeroU64::new(duration.as_secs()) {
            Some(secs) => Ok(Self(secs)),
            None => exn::bail!(ErrorKind::InvalidWindow(duration)),
        }
    }
}

/// What the backend knows about one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockState {
    Active(BlockMeta),
    Compacted(CompactedBlockMeta),
    /// Neither metadata object could be found.
    Unknown,
}
impl BlockState {
    /// Pick the authoritative shape from both lookups. Active metadata wins:
    /// during compaction a block may briefly have both.
    pub fn from_lookups(active: Option<BlockMeta>, compacted: Option<CompactedBlockMeta>) -> Self {
        match (active, compacted) {
            (Some(active), _) => Self::Active(active),
            (None, Some(compacted)) => Self::Compacted(compacted),
            (None, None) => Self::Unknown,
        }
    }
}

/// One block, normalized for reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedBlock {
    pub id: BlockId,
    pub compaction_level: u8,
    /// Number of objects, or `-1` for an unknown block.
    pub objects: i64,
    /// Compaction window of the end time, or `-1` for an unknown block.
    pub window: i64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub compacted: bool,
}
impl UnifiedBlock {
    /// Placeholder for a block whose metadata could not be resolved.
    pub fn unknown() -> Self {
        Self {
            id: Uuid::nil(),
            compaction_level: 0,
            objects: -1,
            window: -1,
            start: OffsetDateTime::UNIX_EPOCH,
            end: OffsetDateTime::UNIX_EPOCH,
            compacted: false,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.objects < 0
    }

    /// Time range covered by the block.
    pub fn duration(&self) -> time::Duration {
        self.end - self.start
    }

    fn from_meta(meta: &BlockMeta, window: WindowRange, compacted: bool) -> Self {
        Self {
            id: meta.block_id,
            compaction_level: meta.compaction_level,
            objects: i64::try_from(meta.total_objects).unwrap_or(i64::MAX),
            window: window.window_of(meta.end_time),
            start: meta.start_time,
            end: meta.end_time,
            compacted,
        }
    }
}

/// Build the unified record for a block.
pub fn unify(state: &BlockState, window: WindowRange) -> UnifiedBlock {
    match state {
        BlockState::Active(meta) => UnifiedBlock::from_meta(meta, window, false),
        BlockState::Compacted(compacted) => UnifiedBlock::from_meta(&compacted.meta, window, true),
        BlockState::Unknown => UnifiedBlock::unknown(),
    }
}

/// [`unify`] straight from the two optional lookups.
pub fn unify_parts(
    active: Option<BlockMeta>,
    compacted: Option<CompactedBlockMeta>,
    window: WindowRange,
) -> UnifiedBlock {
    unify(&BlockState::from_lookups(active, compacted), window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use time::macros::datetime;

    const ID: Uuid = Uuid::from_u128(0x1234);

    fn window(secs: u64) -> WindowRange {
        WindowRange::try_from(Duration::from_secs(secs)).unwrap()
    }

    fn active() -> BlockMeta {
        BlockMeta::new(ID, "t", datetime!(2021-01-01 10:00 UTC), datetime!(2021-01-01 10:30 UTC))
            .with_total_objects(42)
            .with_compaction_level(1)
    }

    #[test]
    fn test_active_only() {
        let block = unify_parts(Some(active()), None, window(3600));
        assert_eq!(
            block,
            UnifiedBlock {
                id: ID,
                compaction_level: 1,
                objects: 42,
                window: datetime!(2021-01-01 10:30 UTC).unix_timestamp() / 3600,
                start: datetime!(2021-01-01 10:00 UTC),
                end: datetime!(2021-01-01 10:30 UTC),
                compacted: false,
            }
        );
        assert!(!block.is_unknown());
        assert_eq!(block.duration(), time::Duration::minutes(30));
    }

    #[test]
    fn test_compacted_only() {
        let compacted = active().with_compaction_level(3).into_compacted(datetime!(2021-01-02 0:00 UTC));
        let block = unify_parts(None, Some(compacted), window(3600));
        assert!(block.compacted);
        assert_eq!(block.id, ID);
        assert_eq!(block.compaction_level, 3);
        assert_eq!(block.objects, 42);
        assert_eq!(block.start, datetime!(2021-01-01 10:00 UTC));
        assert_eq!(block.end, datetime!(2021-01-01 10:30 UTC));
    }

    #[test]
    fn test_neither() {
        let block = unify_parts(None, None, window(3600));
        assert_eq!(block, UnifiedBlock::unknown());
        assert_eq!(block.objects, -1);
        assert_eq!(block.window, -1);
        assert_eq!(block.id, Uuid::nil());
        assert!(!block.compacted);
        assert!(block.is_unknown());
    }

    #[test]
    fn test_active_wins_over_compacted() {
        let compacted = active().with_total_objects(1).into_compacted(datetime!(2021-01-02 0:00 UTC));
        let state = BlockState::from_lookups(Some(active()), Some(compacted));
        assert_eq!(state, BlockState::Active(active()));
        assert!(!unify(&state, window(60)).compacted);
    }

    #[rstest]
    #[case(0, 3600, 0)]
    #[case(3599, 3600, 0)]
    #[case(3600, 3600, 1)]
    #[case(7201, 3600, 2)]
    #[case(1_609_459_200, 86_400, 18_628)]
    #[case(-1, 3600, -1)]
    #[case(-3601, 3600, -2)]
    fn test_window_is_floor(#[case] end: i64, #[case] secs: u64, #[case] expected: i64) {
        let end = OffsetDateTime::from_unix_timestamp(end).unwrap();
        assert_eq!(window(secs).window_of(end), expected);
    }

    #[test]
    fn test_window_is_monotonic() {
        let range = window(7);
        let mut previous = i64::MIN;
        for t in (-100..1000).step_by(3) {
            let current = range.window_of(OffsetDateTime::from_unix_timestamp(t).unwrap());
            assert!(current >= previous);
            previous = current;
        }
    }

    #[rstest]
    #[case(Duration::ZERO)]
    #[case(Duration::from_millis(999))]
    fn test_window_rejects_sub_second(#[case] duration: Duration) {
        let err = WindowRange::try_from(duration).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidWindow(_)));
    }

    #[test]
    fn test_window_truncates_fractions() {
        assert_eq!(WindowRange::try_from(Duration::from_millis(1500)).unwrap().as_secs(), 1);
        assert_eq!(WindowRange::default().as_duration(), Duration::from_secs(3600));
    }
}
