use crate::logging::{log, LogLevel};
use crate::model::period::Period;
use std::collections::BTreeMap;
use std::time::Duration;

pub const CAT_COUNTRY: &str = "Country Fetch";
pub const CAT_WORLD: &str = "World Fetch";
pub const CAT_IPV: &str = "IPV Files";

const FETCH_CATEGORIES: [&str; 2] = [CAT_COUNTRY, CAT_WORLD];
const CATEGORY_ORDER: [&str; 3] = [CAT_COUNTRY, CAT_WORLD, CAT_IPV];

#[derive(Debug, Clone, Default)]
pub struct CategoryStats {
    pub ok: usize,
    pub fail: usize,
    pub skip_or_empty: usize,
    pub total_tasks: usize,
}

impl CategoryStats {
    pub fn add_ok(&mut self) {
        self.ok += 1;
    }
    pub fn add_fail(&mut self) {
        self.fail += 1;
    }
    pub fn add_skip(&mut self) {
        self.skip_or_empty += 1;
    }
    pub fn set_total(&mut self, total: usize) {
        self.total_tasks = total;
    }
    pub fn get_processed(&self) -> usize {
        self.ok + self.fail + self.skip_or_empty
    }
}

pub type RunStats = BTreeMap<String, CategoryStats>;

pub fn initialize_stats() -> RunStats {
    CATEGORY_ORDER
        .iter()
        .map(|cat| (cat.to_string(), CategoryStats::default()))
        .collect()
}

pub fn category<'a>(stats: &'a mut RunStats, name: &str) -> &'a mut CategoryStats {
    stats.entry(name.to_string()).or_default()
}

pub fn log_progress(phase: &str, stats: &CategoryStats) {
    if stats.total_tasks == 0 {
        return;
    }
    let processed = stats.get_processed();
    let percentage = (processed as f32 / stats.total_tasks.max(1) as f32) * 100.0;
    log(
        LogLevel::Info,
        &format!(
            "{} progress: {}/{} ({:.1}%) [OK: {}, Skip: {}, Fail: {}]",
            phase,
            processed,
            stats.total_tasks,
            percentage,
            stats.ok,
            stats.skip_or_empty,
            stats.fail
        ),
    );
}

pub fn log_phase_completion(phase: &str, stats: &CategoryStats, elapsed: Duration) {
    let level = if stats.fail > 0 {
        LogLevel::Warning
    } else {
        LogLevel::Success
    };
    log(
        level,
        &format!(
            "--- {} Phase complete ({} OK, {} Skip/Empty, {} Fail / {} Total) | Elapsed: {:?} ---",
            phase, stats.ok, stats.skip_or_empty, stats.fail, stats.total_tasks, elapsed
        ),
    );
}

pub fn print_summary(stats: &RunStats, period: &Period, duration: Duration) {
    let sep = "=".repeat(60);
    let title = format!("Run Summary (Reporting Period {})", period);
    println!("\n{}\n{:^60}\n{}", sep, title, sep);
    println!("Total Run Time:    {:.3?}", duration);
    println!("{}", "-".repeat(60));

    println!(
        "{:<17} {:<8} {:<12} {:<8} {:<8}",
        "Category", "OK", "Skip/Empty", "Fail", "Total"
    );
    println!("{}", "-".repeat(60));

    for cat_name in CATEGORY_ORDER {
        if let Some(s) = stats.get(cat_name) {
            println!(
                "{:<17} {:<8} {:<12} {:<8} {:<8}",
                cat_name, s.ok, s.skip_or_empty, s.fail, s.total_tasks
            );
        }
    }
    println!("{}", sep);

    let fetch_failures = fetch_failures(stats);
    if fetch_failures > 0 {
        log(
            LogLevel::Warning,
            &format!(
                "Run completed with {} fetch miss(es); see the error log for details.",
                fetch_failures
            ),
        );
    } else {
        log(LogLevel::Success, "Run completed successfully.");
    }
}

pub fn fetch_failures(stats: &RunStats) -> usize {
    FETCH_CATEGORIES
        .iter()
        .filter_map(|cat| stats.get(*cat))
        .map(|s| s.fail)
        .sum()
}
