//! Per-line CPU and heap accumulators.
//!
//! All tables are created lazily on first write and mutated only from the
//! signal-drain path on the interpreting thread; reads of never-seen keys
//! return zero or empty without inserting. Counters are monotone additive
//! except `current_footprint_mb`, which frees subtract from.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::reservoir::Reservoir;

/// `(timestamp or tick index, megabytes)` point in a footprint series.
pub type FootprintSample = (f64, f64);

/// Capacity of the process-wide footprint reservoir.
pub const GLOBAL_FOOTPRINT_CAPACITY: usize = 47;

/// Capacity of each per-line footprint reservoir.
pub const LINE_FOOTPRINT_CAPACITY: usize = 10;

type PerLine<T> = FxHashMap<String, FxHashMap<u32, T>>;
type PerSite<T> = FxHashMap<String, FxHashMap<u32, FxHashMap<u32, T>>>;

/// Every counter the sampler and the allocation handler feed, plus the two
/// footprint reservoirs the reporter renders.
#[derive(Clone)]
pub struct StatsStore {
    cpu_interp: PerLine<f64>,
    cpu_native: PerLine<f64>,
    malloc_mb: PerSite<f64>,
    malloc_events: PerSite<u64>,
    free_mb: PerSite<f64>,
    free_events: PerSite<u64>,
    known_offsets: PerLine<FxHashSet<u32>>,
    footprint: Reservoir<FootprintSample>,
    line_footprint: PerLine<Reservoir<FootprintSample>>,
    total_cpu_samples: f64,
    total_malloc_mb: f64,
    total_free_mb: f64,
    current_footprint_mb: f64,
    max_footprint_mb: f64,
}

impl StatsStore {
    /// Empty store.
    pub fn new() -> Self {
        Self {
            cpu_interp: PerLine::default(),
            cpu_native: PerLine::default(),
            malloc_mb: PerSite::default(),
            malloc_events: PerSite::default(),
            free_mb: PerSite::default(),
            free_events: PerSite::default(),
            known_offsets: PerLine::default(),
            footprint: Reservoir::new(GLOBAL_FOOTPRINT_CAPACITY),
            line_footprint: PerLine::default(),
            total_cpu_samples: 0.0,
            total_malloc_mb: 0.0,
            total_free_mb: 0.0,
            current_footprint_mb: 0.0,
            max_footprint_mb: 0.0,
        }
    }

    // ── CPU counters ───────────────────────────────────────────────────

    pub(crate) fn add_interp(&mut self, file: &str, line: u32, seconds: f64) {
        *per_line_slot(&mut self.cpu_interp, file, line) += seconds;
    }

    pub(crate) fn add_native(&mut self, file: &str, line: u32, seconds: f64) {
        *per_line_slot(&mut self.cpu_native, file, line) += seconds;
    }

    /// Interpreter seconds attributed to `(file, line)`.
    pub fn interp_at(&self, file: &str, line: u32) -> f64 {
        per_line_get(&self.cpu_interp, file, line).copied().unwrap_or(0.0)
    }

    /// Native seconds attributed to `(file, line)`.
    pub fn native_at(&self, file: &str, line: u32) -> f64 {
        per_line_get(&self.cpu_native, file, line).copied().unwrap_or(0.0)
    }

    pub(crate) fn add_total_cpu(&mut self, seconds: f64) {
        self.total_cpu_samples += seconds;
    }

    /// Sum of all attributed CPU time, in seconds.
    pub fn total_cpu_samples(&self) -> f64 {
        self.total_cpu_samples
    }

    // ── Allocation sites ───────────────────────────────────────────────

    pub(crate) fn record_known_offset(&mut self, file: &str, line: u32, offset: u32) {
        self.known_offsets
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_default()
            .insert(offset);
    }

    /// Every bytecode offset observed allocating or freeing at `(file, line)`,
    /// in ascending order.
    pub fn known_offsets_at(&self, file: &str, line: u32) -> Vec<u32> {
        let mut offsets: Vec<u32> = per_line_get(&self.known_offsets, file, line)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        offsets.sort_unstable();
        offsets
    }

    pub(crate) fn add_malloc_sample(&mut self, file: &str, line: u32, offset: u32, mb: f64) {
        *per_site_slot(&mut self.malloc_mb, file, line, offset) += mb;
        self.total_malloc_mb += mb;
        self.current_footprint_mb += mb;
        if self.current_footprint_mb > self.max_footprint_mb {
            self.max_footprint_mb = self.current_footprint_mb;
        }
    }

    pub(crate) fn add_free_sample(&mut self, file: &str, line: u32, offset: u32, mb: f64) {
        *per_site_slot(&mut self.free_mb, file, line, offset) += mb;
        self.total_free_mb += mb;
        self.current_footprint_mb -= mb;
    }

    pub(crate) fn bump_malloc_events(&mut self, file: &str, line: u32, offset: u32) {
        *per_site_slot(&mut self.malloc_events, file, line, offset) += 1;
    }

    pub(crate) fn bump_free_events(&mut self, file: &str, line: u32, offset: u32) {
        *per_site_slot(&mut self.free_events, file, line, offset) += 1;
    }

    /// Accumulated malloc MB at one site.
    pub fn malloc_mb_at(&self, file: &str, line: u32, offset: u32) -> f64 {
        per_site_get(&self.malloc_mb, file, line, offset).copied().unwrap_or(0.0)
    }

    /// Accumulated free MB at one site.
    pub fn free_mb_at(&self, file: &str, line: u32, offset: u32) -> f64 {
        per_site_get(&self.free_mb, file, line, offset).copied().unwrap_or(0.0)
    }

    /// Number of deliveries that brought malloc samples to one site.
    pub fn malloc_events_at(&self, file: &str, line: u32, offset: u32) -> u64 {
        per_site_get(&self.malloc_events, file, line, offset).copied().unwrap_or(0)
    }

    /// Number of deliveries that brought free samples to one site.
    pub fn free_events_at(&self, file: &str, line: u32, offset: u32) -> u64 {
        per_site_get(&self.free_events, file, line, offset).copied().unwrap_or(0)
    }

    /// Net sampled megabytes at one site: malloc minus free.
    pub fn site_delta(&self, file: &str, line: u32, offset: u32) -> f64 {
        self.malloc_mb_at(file, line, offset) - self.free_mb_at(file, line, offset)
    }

    /// Total sampled malloc MB across the program.
    pub fn total_malloc_mb(&self) -> f64 {
        self.total_malloc_mb
    }

    /// Total sampled free MB across the program.
    pub fn total_free_mb(&self) -> f64 {
        self.total_free_mb
    }

    /// Current sampled footprint (malloc minus free), in MB.
    pub fn current_footprint_mb(&self) -> f64 {
        self.current_footprint_mb
    }

    /// Running maximum of the sampled footprint, in MB.
    pub fn max_footprint_mb(&self) -> f64 {
        self.max_footprint_mb
    }

    // ── Footprint reservoirs ───────────────────────────────────────────

    pub(crate) fn offer_footprint(&mut self, sample: FootprintSample) {
        self.footprint.offer(sample);
    }

    /// The process-wide footprint reservoir.
    pub fn footprint(&self) -> &Reservoir<FootprintSample> {
        &self.footprint
    }

    pub(crate) fn offer_line_footprint(&mut self, file: &str, line: u32, sample: FootprintSample) {
        self.line_footprint
            .entry(file.to_string())
            .or_default()
            .entry(line)
            .or_insert_with(|| Reservoir::new(LINE_FOOTPRINT_CAPACITY))
            .offer(sample);
    }

    /// The footprint series for one line, if any sample ever landed there.
    pub fn line_footprint_at(&self, file: &str, line: u32) -> Option<&Reservoir<FootprintSample>> {
        per_line_get(&self.line_footprint, file, line)
    }

    // ── Reporting views ────────────────────────────────────────────────

    /// Every file with CPU or memory attribution, sorted lexicographically.
    pub fn traced_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .cpu_interp
            .keys()
            .chain(self.cpu_native.keys())
            .chain(self.malloc_mb.keys())
            .chain(self.free_mb.keys())
            .cloned()
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        files.sort_unstable();
        files
    }

    /// All CPU seconds attributed to `file`, both interpreter and native.
    pub fn file_cpu_total(&self, file: &str) -> f64 {
        let interp: f64 = self
            .cpu_interp
            .get(file)
            .map(|lines| lines.values().sum())
            .unwrap_or(0.0);
        let native: f64 = self
            .cpu_native
            .get(file)
            .map(|lines| lines.values().sum())
            .unwrap_or(0.0);
        interp + native
    }
}

impl Default for StatsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn per_line_slot<'a, T: Default>(
    table: &'a mut PerLine<T>,
    file: &str,
    line: u32,
) -> &'a mut T {
    table
        .entry(file.to_string())
        .or_default()
        .entry(line)
        .or_default()
}

fn per_line_get<'a, T>(table: &'a PerLine<T>, file: &str, line: u32) -> Option<&'a T> {
    table.get(file).and_then(|lines| lines.get(&line))
}

fn per_site_slot<'a, T: Default>(
    table: &'a mut PerSite<T>,
    file: &str,
    line: u32,
    offset: u32,
) -> &'a mut T {
    table
        .entry(file.to_string())
        .or_default()
        .entry(line)
        .or_default()
        .entry(offset)
        .or_default()
}

fn per_site_get<'a, T>(
    table: &'a PerSite<T>,
    file: &str,
    line: u32,
    offset: u32,
) -> Option<&'a T> {
    table
        .get(file)
        .and_then(|lines| lines.get(&line))
        .and_then(|sites| sites.get(&offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_of_absent_keys_do_not_insert() {
        let stats = StatsStore::new();
        assert_eq!(stats.interp_at("a.vm", 1), 0.0);
        assert_eq!(stats.malloc_mb_at("a.vm", 1, 0), 0.0);
        assert_eq!(stats.malloc_events_at("a.vm", 1, 0), 0);
        assert!(stats.known_offsets_at("a.vm", 1).is_empty());
        assert!(stats.line_footprint_at("a.vm", 1).is_none());
        assert!(stats.traced_files().is_empty());
    }

    #[test]
    fn footprint_tracks_malloc_minus_free() {
        let mut stats = StatsStore::new();
        stats.add_malloc_sample("a.vm", 1, 0, 100.0);
        stats.add_free_sample("a.vm", 2, 4, 40.0);
        stats.add_malloc_sample("a.vm", 3, 8, 20.0);

        assert_eq!(stats.total_malloc_mb(), 120.0);
        assert_eq!(stats.total_free_mb(), 40.0);
        assert_eq!(
            stats.current_footprint_mb(),
            stats.total_malloc_mb() - stats.total_free_mb()
        );
        assert_eq!(stats.max_footprint_mb(), 100.0);
        assert!(stats.max_footprint_mb() >= stats.current_footprint_mb());
    }

    #[test]
    fn known_offsets_are_sorted_and_deduplicated() {
        let mut stats = StatsStore::new();
        stats.record_known_offset("a.vm", 7, 24);
        stats.record_known_offset("a.vm", 7, 8);
        stats.record_known_offset("a.vm", 7, 24);
        assert_eq!(stats.known_offsets_at("a.vm", 7), vec![8, 24]);
    }

    #[test]
    fn traced_files_unions_cpu_and_memory_tables() {
        let mut stats = StatsStore::new();
        stats.add_interp("b.vm", 1, 0.01);
        stats.add_native("a.vm", 2, 0.01);
        stats.add_malloc_sample("c.vm", 3, 0, 1.0);
        stats.add_free_sample("d.vm", 4, 0, 1.0);
        assert_eq!(stats.traced_files(), vec!["a.vm", "b.vm", "c.vm", "d.vm"]);
    }

    #[test]
    fn file_cpu_total_sums_both_tables() {
        let mut stats = StatsStore::new();
        stats.add_interp("a.vm", 1, 0.02);
        stats.add_interp("a.vm", 2, 0.03);
        stats.add_native("a.vm", 1, 0.05);
        assert!((stats.file_cpu_total("a.vm") - 0.10).abs() < 1e-12);
        assert_eq!(stats.file_cpu_total("other.vm"), 0.0);
    }

    #[test]
    fn site_delta_is_malloc_minus_free() {
        let mut stats = StatsStore::new();
        stats.add_malloc_sample("a.vm", 1, 16, 5.0);
        stats.add_free_sample("a.vm", 1, 16, 2.0);
        assert_eq!(stats.site_delta("a.vm", 1, 16), 3.0);
    }
}
