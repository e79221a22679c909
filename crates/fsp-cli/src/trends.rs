//! Monthly publication counts per section and a plain text summary.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use fsp_store::{PersistedRecord, Table};

use crate::rank::bom_writer;

const TOP_MONTHS: usize = 5;

/// Count posts per month and section of the thread table
#[derive(Debug, clap::Args)]
pub struct TrendsArgs {
    /// The thread table to read
    #[clap(parse(from_os_str), long, short, default_value = "data.csv")]
    pub table: PathBuf,
    /// Directory receiving trends.csv and 统计报告.txt
    #[clap(parse(from_os_str), long, short, default_value = ".")]
    pub output_dir: PathBuf,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Trends {
    /// `YYYY-MM` -> section -> posts created that month.
    pub months: BTreeMap<String, BTreeMap<String, usize>>,
    /// Posts per section.
    pub sections: BTreeMap<String, usize>,
    /// Posts whose creation time could not be read, left out of every count.
    pub undated: usize,
}

impl Trends {
    pub fn from_records(records: &[PersistedRecord]) -> Self {
        let mut trends = Self::default();
        for record in records {
            if record.create_time.is_epoch() {
                trends.undated += 1;
                continue;
            }
            let month = record.create_time.as_naive().format("%Y-%m").to_string();
            *trends
                .months
                .entry(month)
                .or_default()
                .entry(record.section.clone())
                .or_default() += 1;
            *trends.sections.entry(record.section.clone()).or_default() += 1;
        }
        trends
    }

    pub fn total(&self) -> usize {
        self.sections.values().sum()
    }

    /// First and last month with a post.
    pub fn period(&self) -> Option<(&str, &str)> {
        let first = self.months.keys().next()?;
        let last = self.months.keys().next_back()?;
        Some((first.as_str(), last.as_str()))
    }

    pub fn monthly_totals(&self) -> impl Iterator<Item = (&str, usize)> {
        self.months
            .iter()
            .map(|(month, sections)| (month.as_str(), sections.values().sum()))
    }

    /// Busiest months first, earlier months first on ties.
    pub fn top_months(&self, n: usize) -> Vec<(&str, usize)> {
        let mut months = self.monthly_totals().collect::<Vec<_>>();
        months.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        months.truncate(n);
        months
    }

    /// Largest sections first, by name on ties.
    pub fn section_shares(&self) -> Vec<(&str, usize, f64)> {
        let total = self.total().max(1) as f64;
        let mut shares = self
            .sections
            .iter()
            .map(|(section, &count)| (section.as_str(), count, 100.0 * count as f64 / total))
            .collect::<Vec<_>>();
        shares.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        shares
    }
}

/// The summary report written to `统计报告.txt`.
impl fmt::Display for Trends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "文章发表统计报告")?;
        writeln!(f, "{}\n", "=".repeat(50))?;

        writeln!(f, "1. 总体统计")?;
        writeln!(f, "总文章数：{}", self.total())?;
        if let Some((first, last)) = self.period() {
            writeln!(f, "统计周期：{first} 至 {last}")?;
        }
        if self.undated > 0 {
            writeln!(f, "发表时间未知：{}", self.undated)?;
        }
        writeln!(f)?;

        writeln!(f, "2. 板块分布")?;
        for (section, count, share) in self.section_shares() {
            writeln!(f, "{section}: {count}篇 ({share:.2}%)")?;
        }
        writeln!(f)?;

        writeln!(f, "3. 月度发表TOP{TOP_MONTHS}")?;
        for (month, count) in self.top_months(TOP_MONTHS) {
            writeln!(f, "{month}: {count}篇")?;
        }
        Ok(())
    }
}

/// One row per month: a column per section then the month total.
pub fn write_trends(path: &Path, trends: &Trends) -> anyhow::Result<()> {
    let mut wtr = bom_writer(path)?;
    let sections = trends.sections.keys().collect::<Vec<_>>();

    let mut header = vec!["年月".to_string()];
    header.extend(sections.iter().map(|s| s.to_string()));
    header.push("合计".to_string());
    wtr.write_record(&header)?;

    for (month, counts) in &trends.months {
        let mut row = vec![month.clone()];
        row.extend(
            sections
                .iter()
                .map(|s| counts.get(*s).copied().unwrap_or_default().to_string()),
        );
        row.push(counts.values().sum::<usize>().to_string());
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn trends(args: TrendsArgs) -> anyhow::Result<()> {
    let records = Table::new(&args.table).records()?;
    log::info!("Read {} posts from {}", records.len(), args.table.display());

    let trends = Trends::from_records(&records);
    if trends.undated > 0 {
        log::warn!("{} posts without a creation time are not counted", trends.undated);
    }

    fs_err::create_dir_all(&args.output_dir)?;
    write_trends(&args.output_dir.join("trends.csv"), &trends)?;
    let report = trends.to_string();
    fs_err::write(args.output_dir.join("统计报告.txt"), &report)?;
    for line in report.lines().filter(|l| !l.is_empty()) {
        log::info!("{line}");
    }
    Ok(())
}
