//! Per-line profile rendering.
//!
//! Emission is a pure function of a stats snapshot, so flushing twice with no
//! intervening sample produces byte-identical output.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::error::ProfileError;
use crate::sparkline::sparkline;
use crate::stats::{FootprintSample, StatsStore};

/// Render the profile for `stats` into `out`.
///
/// Returns `Ok(false)` without writing anything when no CPU or memory sample
/// was ever collected; the driver turns that into the short-run diagnostic.
pub fn emit(stats: &StatsStore, elapsed_s: f64, out: &mut dyn Write) -> io::Result<bool> {
    if stats.total_cpu_samples() == 0.0
        && stats.total_malloc_mb() == 0.0
        && stats.total_free_mb() == 0.0
    {
        return Ok(false);
    }
    let memory_mode = stats.total_malloc_mb() + stats.total_free_mb() > 0.0;

    if memory_mode && !stats.footprint().is_empty() {
        let (_, max, spark) = render_series(
            stats.footprint().snapshot(),
            0.0,
            stats.max_footprint_mb(),
        );
        writeln!(out, "Memory usage: {spark} (max: {max:6.2}MB)")?;
    }

    for file in stats.traced_files() {
        let file_cpu = stats.file_cpu_total(&file);
        let percent = if stats.total_cpu_samples() != 0.0 {
            100.0 * file_cpu / stats.total_cpu_samples()
        } else {
            0.0
        };
        writeln!(
            out,
            "{file}: % of CPU time = {percent:6.2}% out of {elapsed_s:6.2}s."
        )?;
        writeln!(
            out,
            "  \t | {:>9} | {:>9} | {} {} ",
            "CPU %",
            "CPU %",
            if memory_mode { "Avg memory  |" } else { "" },
            if memory_mode { "Memory      |" } else { "" },
        )?;
        writeln!(
            out,
            "  Line\t | {:>9} | {:>9} | {}{} [{}]",
            "(interp)",
            "(native)",
            if memory_mode { "growth (MB) |" } else { "" },
            if memory_mode { " usage       |" } else { "" },
            file,
        )?;
        writeln!(out, "{}", "-".repeat(80))?;

        let source = fs::read_to_string(&file)?;
        for (index, raw_line) in source.lines().enumerate() {
            let line_no = index as u32 + 1;
            let text = raw_line.trim_end();
            write_line(stats, memory_mode, &file, line_no, text, out)?;
        }
        writeln!(out)?;
    }
    Ok(true)
}

fn write_line(
    stats: &StatsStore,
    memory_mode: bool,
    file: &str,
    line_no: u32,
    text: &str,
    out: &mut dyn Write,
) -> io::Result<()> {
    let interp_pct;
    let native_pct;
    if stats.total_cpu_samples() != 0.0 {
        interp_pct = 100.0 * stats.interp_at(file, line_no) / stats.total_cpu_samples();
        native_pct = 100.0 * stats.native_at(file, line_no) / stats.total_cpu_samples();
    } else {
        interp_pct = 0.0;
        native_pct = 0.0;
    }

    // Accumulate heap numbers across every allocation site on this line. The
    // per-line average is the sum of per-site averages, so sites with few
    // events weigh as much as busy ones.
    let mut malloc_mb = 0.0;
    let mut avg_malloc_mb = 0.0;
    let mut avg_free_mb = 0.0;
    for offset in stats.known_offsets_at(file, line_no) {
        let mallocs = stats.malloc_mb_at(file, line_no, offset);
        malloc_mb += mallocs;
        let malloc_events = stats.malloc_events_at(file, line_no, offset);
        if malloc_events > 0 {
            avg_malloc_mb += mallocs / malloc_events as f64;
        }
        let frees = stats.free_mb_at(file, line_no, offset);
        let free_events = stats.free_events_at(file, line_no, offset);
        if free_events > 0 {
            avg_free_mb += frees / free_events as f64;
        }
    }

    let mut growth_mb = avg_malloc_mb - avg_free_mb;
    if growth_mb < 0.0 && growth_mb > -1.0 {
        // Rounds to an ugly "-0" otherwise.
        growth_mb = 0.0;
    }
    let usage = if stats.total_malloc_mb() == 0.0 {
        0.0
    } else {
        malloc_mb / stats.total_malloc_mb()
    };

    let interp_str = percent_cell(interp_pct);
    let native_str = percent_cell(native_pct);

    if memory_mode {
        let growth_str = if growth_mb == 0.0 && usage == 0.0 {
            String::new()
        } else {
            format!("{growth_mb:11.0}")
        };
        let spark = match stats.line_footprint_at(file, line_no) {
            Some(series) if !series.is_empty() => {
                render_series(series.snapshot(), 0.0, stats.max_footprint_mb()).2
            }
            _ => String::new(),
        };
        writeln!(
            out,
            "{line_no:6}\t | {interp_str:>9} | {native_str:>9} | {growth_str:>11} | {spark:<11} | {text}"
        )
    } else {
        writeln!(out, "{line_no:6}\t | {interp_str:>9} | {native_str:>9} | {text}")
    }
}

fn percent_cell(pct: f64) -> String {
    if pct == 0.0 {
        String::new()
    } else {
        format!("{pct:6.2}%")
    }
}

/// Sort a footprint series by time, clamp sampling-error negatives to zero,
/// and render it against fixed bounds.
fn render_series(mut samples: Vec<FootprintSample>, min: f64, max: f64) -> (f64, f64, String) {
    samples.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    let values: Vec<f64> = samples.iter().map(|&(_, v)| v.max(0.0)).collect();
    sparkline(&values, Some(min), Some(max))
}

/// Write the profile to `path`, or to standard output when `path` is `None`.
///
/// File output is rendered in full first and moved into place with a rename,
/// so a reader never observes a half-written report.
pub(crate) fn write(
    stats: &StatsStore,
    elapsed_s: f64,
    path: Option<&Path>,
) -> Result<bool, ProfileError> {
    let mut rendered = Vec::new();
    if !emit(stats, elapsed_s, &mut rendered)? {
        return Ok(false);
    }
    match path {
        None => {
            io::stdout().write_all(&rendered)?;
        }
        Some(path) => {
            let tmp = sibling_tmp(path);
            fs::write(&tmp, &rendered)?;
            fs::rename(&tmp, path)?;
        }
    }
    Ok(true)
}

fn sibling_tmp(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn source_file(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn render(stats: &StatsStore, elapsed_s: f64) -> (bool, String) {
        let mut out = Vec::new();
        let emitted = emit(stats, elapsed_s, &mut out).unwrap();
        (emitted, String::from_utf8(out).unwrap())
    }

    #[test]
    fn empty_stats_emit_nothing() {
        let (emitted, text) = render(&StatsStore::new(), 1.0);
        assert!(!emitted);
        assert!(text.is_empty());
    }

    #[test]
    fn cpu_only_report_has_no_memory_columns() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "main.vm", "let x = 0\nloop(x)\n");
        let mut stats = StatsStore::new();
        stats.add_interp(&file, 2, 0.08);
        stats.add_native(&file, 2, 0.02);
        stats.add_total_cpu(0.10);

        let (emitted, text) = render(&stats, 2.5);
        assert!(emitted);
        assert!(text.contains(&format!("{file}: % of CPU time = 100.00% out of   2.50s.")));
        assert!(text.contains("(interp)"));
        assert!(text.contains("(native)"));
        assert!(!text.contains("Memory usage:"));
        assert!(!text.contains("growth (MB)"));
        // Line 2 carries 80% interpreter and 20% native time.
        assert!(text.contains(" 80.00%"));
        assert!(text.contains(" 20.00%"));
        // Line 1 has no samples: its percent cells are blank.
        let line1 = text.lines().find(|l| l.starts_with("     1\t")).unwrap();
        assert_eq!(line1, "     1\t |           |           | let x = 0");
    }

    #[test]
    fn memory_mode_renders_banner_and_growth() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "main.vm", "a = alloc(10)\nrelease(a)\n");
        let mut stats = StatsStore::new();
        stats.add_total_cpu(0.01);
        stats.add_interp(&file, 1, 0.01);
        stats.record_known_offset(&file, 1, 0);
        stats.add_malloc_sample(&file, 1, 0, 10.0);
        stats.bump_malloc_events(&file, 1, 0);
        stats.offer_footprint((1.0, 10.0));

        let (_, text) = render(&stats, 1.0);
        assert!(text.contains("Memory usage: █ (max:  10.00MB)"));
        assert!(text.contains("growth (MB)"));
        let line1 = text.lines().find(|l| l.starts_with("     1\t")).unwrap();
        assert!(line1.contains("         10"), "growth cell rendered: {line1}");
    }

    #[test]
    fn small_negative_growth_is_not_rendered_as_minus_zero() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "main.vm", "shrink()\n");
        let mut stats = StatsStore::new();
        stats.record_known_offset(&file, 1, 0);
        stats.add_malloc_sample(&file, 1, 0, 0.2);
        stats.bump_malloc_events(&file, 1, 0);
        stats.add_free_sample(&file, 1, 0, 0.5);
        stats.bump_free_events(&file, 1, 0);

        let (_, text) = render(&stats, 1.0);
        assert!(!text.contains("-0"), "got: {text}");
        // usage is nonzero, so the growth cell still renders (as zero).
        let line1 = text.lines().find(|l| l.starts_with("     1\t")).unwrap();
        assert!(line1.contains("          0"));
    }

    #[test]
    fn emission_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "main.vm", "work()\n");
        let mut stats = StatsStore::new();
        stats.add_interp(&file, 1, 0.05);
        stats.add_total_cpu(0.05);
        stats.record_known_offset(&file, 1, 8);
        stats.add_malloc_sample(&file, 1, 8, 2.0);
        stats.bump_malloc_events(&file, 1, 8);
        stats.offer_footprint((1.0, 2.0));
        stats.offer_line_footprint(&file, 1, (0.0, 2.0));

        let (_, first) = render(&stats, 1.0);
        let (_, second) = render(&stats, 1.0);
        assert_eq!(first, second);
    }

    #[test]
    fn missing_source_file_propagates() {
        let mut stats = StatsStore::new();
        stats.add_interp("/nonexistent/gone.vm", 1, 0.05);
        stats.add_total_cpu(0.05);
        let mut out = Vec::new();
        assert!(emit(&stats, 1.0, &mut out).is_err());
    }

    #[test]
    fn files_are_reported_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = source_file(dir.path(), "a.vm", "x\n");
        let b = source_file(dir.path(), "b.vm", "y\n");
        let mut stats = StatsStore::new();
        stats.add_interp(&b, 1, 0.01);
        stats.add_interp(&a, 1, 0.01);
        stats.add_total_cpu(0.02);

        let (_, text) = render(&stats, 1.0);
        let a_pos = text.find(&a).unwrap();
        let b_pos = text.find(&b).unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn write_replaces_the_output_file_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let file = source_file(dir.path(), "main.vm", "work()\n");
        let out_path = dir.path().join("profile.txt");
        fs::write(&out_path, "stale").unwrap();

        let mut stats = StatsStore::new();
        stats.add_interp(&file, 1, 0.05);
        stats.add_total_cpu(0.05);

        assert!(write(&stats, 1.0, Some(&out_path)).unwrap());
        let contents = fs::read_to_string(&out_path).unwrap();
        assert!(contents.contains("% of CPU time"));
        assert!(!contents.contains("stale"));
        assert!(!sibling_tmp(&out_path).exists());
    }

    #[test]
    fn write_leaves_the_file_alone_when_nothing_was_sampled() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("profile.txt");
        fs::write(&out_path, "previous run").unwrap();

        assert!(!write(&StatsStore::new(), 1.0, Some(&out_path)).unwrap());
        assert_eq!(fs::read_to_string(&out_path).unwrap(), "previous run");
    }
}
