//! Post and author rankings computed from the thread table.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use fsp_store::{PersistedRecord, Table};

const MIN_AGE_DAYS: f64 = 3.0;
const MAX_AGE_DAYS: f64 = 720.0;
/// Added to the age when computing daily views so that fresh posts don't spike.
const AGE_SMOOTHING_DAYS: f64 = 7.0;
const DECAY_DAYS: f64 = 365.0;

const WEIGHT_VIEWS: f64 = 0.30;
const WEIGHT_DAILY_VIEWS: f64 = 0.30;
const WEIGHT_INTERACTION: f64 = 0.20;
const WEIGHT_CONVERSION: f64 = 0.20;

/// Rank thread table posts and authors
#[derive(Debug, clap::Args)]
pub struct RankArgs {
    /// The thread table to read
    #[clap(parse(from_os_str), long, short, default_value = "data.csv")]
    pub table: PathBuf,
    /// Directory receiving posts.csv and authors.csv
    #[clap(parse(from_os_str), long, short, default_value = ".")]
    pub output_dir: PathBuf,
    /// Minimum number of posts for an author to be ranked
    #[clap(long, default_value_t = 3)]
    pub min_posts: usize,
    /// Number of entries logged for each ranking
    #[clap(long, default_value_t = 10)]
    pub top: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostScore {
    pub record: PersistedRecord,
    pub age_days: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorScore {
    pub author: String,
    pub posts: usize,
    pub mean_score: f64,
    pub total_views: u64,
    pub total_words: u64,
    pub total_favorites: u64,
}

/// Scales values to `[0, 1]`, all zeros when they are all equal.
fn min_max(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    values
        .iter()
        .map(|v| if range > 0.0 { (v - min) / range } else { 0.0 })
        .collect()
}

fn age_days(record: &PersistedRecord, now: NaiveDateTime) -> f64 {
    let minutes = (now - record.create_time.as_naive()).num_minutes() as f64;
    (minutes / 1440.0).clamp(MIN_AGE_DAYS, MAX_AGE_DAYS)
}

/// Scores posts with words, best first.
pub fn score_posts(records: Vec<PersistedRecord>, now: NaiveDateTime) -> Vec<PostScore> {
    let records = records
        .into_iter()
        .filter(|r| r.word_count > 0)
        .collect::<Vec<_>>();
    let ages = records.iter().map(|r| age_days(r, now)).collect::<Vec<_>>();

    let views = records
        .iter()
        .map(|r| r.view_count as f64)
        .collect::<Vec<_>>();
    let daily_views = views
        .iter()
        .zip(&ages)
        .map(|(views, age)| views / (age + AGE_SMOOTHING_DAYS))
        .collect::<Vec<_>>();
    let interaction = records
        .iter()
        .map(|r| r.comment_count as f64 / (r.view_count as f64 + 1.0))
        .collect::<Vec<_>>();
    let conversion = records
        .iter()
        .map(|r| (r.favorite_count + r.recommend_count) as f64 / (r.view_count as f64 + 1.0))
        .collect::<Vec<_>>();

    let views = min_max(&views);
    let daily_views = min_max(&daily_views);
    let interaction = min_max(&interaction);
    let conversion = min_max(&conversion);

    let mut posts = records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let composite = WEIGHT_VIEWS * views[i]
                + WEIGHT_DAILY_VIEWS * daily_views[i]
                + WEIGHT_INTERACTION * interaction[i]
                + WEIGHT_CONVERSION * conversion[i];
            let decay = 0.5 + 0.5 * (-ages[i] / DECAY_DAYS).exp();
            PostScore {
                record,
                age_days: ages[i],
                score: 100.0 * composite * decay,
            }
        })
        .collect::<Vec<_>>();
    posts.sort_by(|a, b| b.score.total_cmp(&a.score));
    posts
}

/// Aggregates post scores per author, keeping authors with at least `min_posts` posts.
pub fn rank_authors(posts: &[PostScore], min_posts: usize) -> Vec<AuthorScore> {
    let mut by_author: BTreeMap<&str, Vec<&PostScore>> = BTreeMap::new();
    for post in posts {
        by_author.entry(&post.record.author).or_default().push(post);
    }

    let mut authors = by_author
        .into_iter()
        .filter(|(_, posts)| posts.len() >= min_posts.max(1))
        .map(|(author, posts)| AuthorScore {
            author: author.to_string(),
            posts: posts.len(),
            mean_score: posts.iter().map(|p| p.score).sum::<f64>() / posts.len() as f64,
            total_views: posts.iter().map(|p| p.record.view_count).sum(),
            total_words: posts.iter().map(|p| p.record.word_count).sum(),
            total_favorites: posts.iter().map(|p| p.record.favorite_count).sum(),
        })
        .collect::<Vec<_>>();
    authors.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));
    authors
}

pub(crate) fn bom_writer(path: &Path) -> anyhow::Result<csv::Writer<fs_err::File>> {
    let mut file = fs_err::File::create(path)?;
    file.write_all(b"\xEF\xBB\xBF")?;
    Ok(csv::Writer::from_writer(file))
}

pub fn write_posts(path: &Path, posts: &[PostScore]) -> anyhow::Result<()> {
    let mut wtr = bom_writer(path)?;
    wtr.write_record([
        "排名", "标题", "作者", "板块", "浏览数", "评论数", "收藏数", "点赞数", "字数", "得分", "链接",
    ])?;
    for (rank, post) in posts.iter().enumerate() {
        let r = &post.record;
        wtr.write_record([
            (rank + 1).to_string(),
            r.title.clone(),
            r.author.clone(),
            r.section.clone(),
            r.view_count.to_string(),
            r.comment_count.to_string(),
            r.favorite_count.to_string(),
            r.recommend_count.to_string(),
            r.word_count.to_string(),
            format!("{:.2}", post.score),
            r.url.clone(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_authors(path: &Path, authors: &[AuthorScore]) -> anyhow::Result<()> {
    let mut wtr = bom_writer(path)?;
    wtr.write_record(["排名", "作者", "作品数", "平均得分", "总浏览数", "总字数", "总收藏数"])?;
    for (rank, author) in authors.iter().enumerate() {
        wtr.write_record([
            (rank + 1).to_string(),
            author.author.clone(),
            author.posts.to_string(),
            format!("{:.2}", author.mean_score),
            author.total_views.to_string(),
            author.total_words.to_string(),
            author.total_favorites.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn rank(args: RankArgs) -> anyhow::Result<()> {
    let records = Table::new(&args.table).records()?;
    log::info!("Read {} posts from {}", records.len(), args.table.display());

    let posts = score_posts(records, Local::now().naive_local());
    let authors = rank_authors(&posts, args.min_posts);

    fs_err::create_dir_all(&args.output_dir)?;
    write_posts(&args.output_dir.join("posts.csv"), &posts)?;
    write_authors(&args.output_dir.join("authors.csv"), &authors)?;

    for (i, post) in posts.iter().take(args.top).enumerate() {
        log::info!(
            "#{} {:.2} {} ({})",
            i + 1,
            post.score,
            post.record.title,
            post.record.author
        );
    }
    for (i, author) in authors.iter().take(args.top).enumerate() {
        log::info!(
            "#{} {:.2} {} ({} posts)",
            i + 1,
            author.mean_score,
            author.author,
            author.posts
        );
    }
    Ok(())
}
