//! Human-readable output for scan results.

use blockscope_scan::{BlockInspection, ScanReport, UnifiedBlock, WindowRange};
use std::io::{Result, Write};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIMESTAMP: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const NONE: &str = "-";

/// How to render a [`ScanReport`].
#[derive(Clone, Copy, Debug)]
pub struct Listing {
    pub include_compacted: bool,
    pub window: WindowRange,
    /// Reference time for the `age` column.
    pub now: OffsetDateTime,
}

fn timestamp(at: OffsetDateTime) -> String {
    at.format(TIMESTAMP).unwrap_or_else(|_| at.unix_timestamp().to_string())
}

/// Whole seconds, humanized (`1h 30m`).
fn span(duration: time::Duration) -> String {
    let secs = std::time::Duration::from_secs(duration.unsigned_abs().as_secs());
    let formatted = humantime::format_duration(secs).to_string();
    if duration.is_negative() { format!("-{formatted}") } else { formatted }
}

/// Order rows by window, then level, then start time, then id.
pub fn sort_blocks(blocks: &mut [UnifiedBlock]) {
    blocks.sort_by(|a, b| {
        (a.window, a.compaction_level, a.start, a.id).cmp(&(b.window, b.compaction_level, b.start, b.id))
    });
}

/// Rows to show: compacted blocks only on request, unknown blocks always.
fn visible(report: &ScanReport, listing: &Listing) -> Vec<UnifiedBlock> {
    let mut rows: Vec<UnifiedBlock> = report
        .blocks
        .iter()
        .filter(|block| listing.include_compacted || !block.compacted)
        .cloned()
        .collect();
    sort_blocks(&mut rows);
    rows
}

fn row(block: &UnifiedBlock, now: OffsetDateTime) -> [String; 9] {
    if block.is_unknown() {
        let mut cells = std::array::from_fn(|_| NONE.to_string());
        cells[0] = block.id.to_string();
        cells[8] = "?".to_string();
        return cells;
    }
    [
        block.id.to_string(),
        block.compaction_level.to_string(),
        block.objects.to_string(),
        block.window.to_string(),
        timestamp(block.start),
        timestamp(block.end),
        span(block.duration()),
        span(now - block.end),
        if block.compacted { "yes" } else { "no" }.to_string(),
    ]
}

const HEADERS: [&str; 9] = ["id", "lvl", "objects", "window", "start", "end", "duration", "age", "compacted"];

fn write_table(out: &mut impl Write, rows: &[[String; 9]]) -> Result<()> {
    let mut widths = HEADERS.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }
    let line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    writeln!(out, "{}", line(&HEADERS))?;
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        writeln!(out, "{}", line(&cells))?;
    }
    Ok(())
}

/// One tenant per line, in the order given.
pub fn write_tenants(out: &mut impl Write, tenants: &[String]) -> Result<()> {
    for tenant in tenants {
        writeln!(out, "{tenant}")?;
    }
    Ok(())
}

/// Print the block table followed by the summary of a scan.
pub fn write_report(out: &mut impl Write, report: &ScanReport, listing: &Listing) -> Result<()> {
    let rows: Vec<_> = visible(report, listing).iter().map(|block| row(block, listing.now)).collect();
    write_table(out, &rows)?;

    let summary = report.summary();
    writeln!(out)?;
    writeln!(out, "tenant:               {}", report.tenant)?;
    writeln!(
        out,
        "total blocks:         {} ({} active, {} compacted, {} unknown, {} failed)",
        summary.total, summary.active, summary.compacted, summary.unknown, summary.failed
    )?;
    writeln!(out, "total active objects: {}", summary.active_objects)?;
    if !summary.windows.is_empty() {
        writeln!(out, "active blocks per window:")?;
        let secs = i64::try_from(listing.window.as_secs()).unwrap_or(i64::MAX);
        for (window, count) in &summary.windows {
            let start = window
                .checked_mul(secs)
                .and_then(|unix| OffsetDateTime::from_unix_timestamp(unix).ok())
                .map(timestamp)
                .unwrap_or_else(|| NONE.to_string());
            writeln!(out, "  {window} ({start}): {count}")?;
        }
    }
    if !report.failures.is_empty() {
        writeln!(out, "failures:")?;
        for failure in &report.failures {
            writeln!(out, "  {}: {}", failure.id, *failure.error)?;
        }
    }
    Ok(())
}

/// Print the details of a single block.
pub fn write_inspection(out: &mut impl Write, inspection: &BlockInspection, now: OffsetDateTime) -> Result<()> {
    let block = &inspection.block;
    writeln!(out, "tenant:    {}", inspection.tenant)?;
    writeln!(out, "id:        {}", inspection.id)?;
    if block.is_unknown() {
        writeln!(out, "state:     unknown")?;
    } else {
        let state = if block.compacted { "compacted" } else { "active" };
        writeln!(out, "state:     {state}")?;
        writeln!(out, "level:     {}", block.compaction_level)?;
        writeln!(out, "objects:   {}", block.objects)?;
        writeln!(out, "window:    {}", block.window)?;
        writeln!(out, "start:     {}", timestamp(block.start))?;
        writeln!(out, "end:       {}", timestamp(block.end))?;
        writeln!(out, "duration:  {}", span(block.duration()))?;
        writeln!(out, "age:       {}", span(now - block.end))?;
    }
    if let Some(compacted) = &inspection.compacted {
        writeln!(out, "compacted: {}", timestamp(compacted.compacted_time))?;
    }
    if inspection.is_ambiguous() {
        writeln!(out, "warning: block has both active and compacted metadata")?;
    }
    if inspection.is_missing() {
        writeln!(out, "warning: block has neither active nor compacted metadata")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    const NOW: OffsetDateTime = datetime!(2021-01-02 0:00 UTC);

    fn block(id: u128, window: i64, level: u8, compacted: bool) -> UnifiedBlock {
        let end = OffsetDateTime::from_unix_timestamp(window * 3600 + 1800).unwrap();
        UnifiedBlock {
            id: Uuid::from_u128(id),
            compaction_level: level,
            objects: 10,
            window,
            start: end - time::Duration::minutes(5),
            end,
            compacted,
        }
    }

    fn report() -> ScanReport {
        ScanReport {
            tenant: "t".to_string(),
            blocks: vec![
                block(1, 447_072, 1, false),
                block(2, 447_071, 2, false),
                block(3, 447_071, 0, true),
                block(4, 447_071, 0, false),
                UnifiedBlock::unknown(),
            ],
            failures: Vec::new(),
        }
    }

    fn listing(include_compacted: bool) -> Listing {
        Listing {
            include_compacted,
            window: WindowRange::default(),
            now: NOW,
        }
    }

    fn render(report: &ScanReport, listing: &Listing) -> String {
        let mut out = Vec::new();
        write_report(&mut out, report, listing).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn ids(output: &str) -> Vec<String> {
        output
            .lines()
            .skip(1)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_sort_order() {
        let mut blocks = report().blocks;
        sort_blocks(&mut blocks);
        let order: Vec<_> = blocks.iter().map(|b| b.id.as_u128()).collect();
        assert_eq!(order, vec![0, 3, 4, 2, 1]);
    }

    #[test]
    fn test_compacted_hidden_by_default() {
        let output = render(&report(), &listing(false));
        let expected: Vec<_> = [0u128, 4, 2, 1].iter().map(|n| Uuid::from_u128(*n).to_string()).collect();
        assert_eq!(ids(&output), expected);
        assert!(output.starts_with("id"));
    }

    #[test]
    fn test_compacted_shown_on_request() {
        let output = render(&report(), &listing(true));
        assert_eq!(ids(&output).len(), 5);
        assert!(output.contains(&Uuid::from_u128(3).to_string()));
    }

    #[test]
    fn test_summary() {
        let mut report = report();
        report.failures.push(blockscope_scan::BlockFailure {
            id: Uuid::from_u128(9),
            error: exn::Exn::from(blockscope_scan::error::ErrorKind::Fetch(Uuid::from_u128(9))),
        });
        let output = render(&report, &listing(false));
        assert!(output.contains("total blocks:         6 (3 active, 1 compacted, 1 unknown, 1 failed)"));
        assert!(output.contains("total active objects: 30"));
        assert!(output.contains("  447071 (2020-12-31 23:00:00): 2"));
        assert!(output.contains("  447072 (2021-01-01 00:00:00): 1"));
        assert!(output.contains(&format!("  {}: cannot fetch metadata of block", Uuid::from_u128(9))));
    }

    #[test]
    fn test_write_tenants() {
        let mut out = Vec::new();
        write_tenants(&mut out, &["a".to_string(), "single-tenant".to_string()]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a\nsingle-tenant\n");

        let mut out = Vec::new();
        write_tenants(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_unknown_row() {
        let cells = row(&UnifiedBlock::unknown(), NOW);
        assert_eq!(cells[0], Uuid::nil().to_string());
        assert!(cells[1..8].iter().all(|cell| cell == NONE));
    }

    #[test]
    fn test_row() {
        let cells = row(&block(1, 447_072, 1, false), NOW);
        assert_eq!(cells[4], "2021-01-01 00:25:00");
        assert_eq!(cells[5], "2021-01-01 00:30:00");
        assert_eq!(cells[6], "5m");
        assert_eq!(cells[7], "23h 30m");
        assert_eq!(cells[8], "no");
    }

    #[test]
    fn test_span() {
        assert_eq!(span(time::Duration::seconds(90)), "1m 30s");
        assert_eq!(span(time::Duration::milliseconds(-1500)), "-1s");
        assert_eq!(span(time::Duration::ZERO), "0s");
    }
}
