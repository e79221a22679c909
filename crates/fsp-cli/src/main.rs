mod rank;
mod scrap;
mod trends;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, io};

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use fs_err::File;
use fsp_crawler::{Crawler, CrawlerConfig, HttpFetcher};
use fsp_store::MergeStore;
use tokio::runtime;

use crate::rank::RankArgs;
use crate::scrap::ScrapArgs;
use crate::trends::TrendsArgs;

/// Forum Section Poller
#[derive(Debug, Parser)]
#[clap(version)]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[clap(name = "crawl")]
    Crawl(CrawlArgs),
    #[clap(name = "scrap")]
    Scrap(ScrapArgs),
    #[clap(name = "rank")]
    Rank(RankArgs),
    #[clap(name = "trends")]
    Trends(TrendsArgs),
    #[clap(hide = true)]
    Completion,
}

/// Crawl forum sections and merge new or updated threads into the table
#[derive(Debug, clap::Args)]
pub struct CrawlArgs {
    /// Optional crawler yaml configuration file
    #[clap(env = "FSP_CONFIG", parse(from_os_str), long, short)]
    pub config: Option<PathBuf>,
    /// Sections to crawl, either a configured NAME or NAME=URL (all configured sections by default)
    #[clap(long, short)]
    pub section: Vec<String>,
    /// Override the table file
    #[clap(parse(from_os_str), long, short)]
    pub table: Option<PathBuf>,
    /// Override the update index file
    #[clap(parse(from_os_str), long)]
    pub index: Option<PathBuf>,
    /// Override the directory where thread texts are saved
    #[clap(parse(from_os_str), long)]
    pub artifact_dir: Option<PathBuf>,
    /// Override the JSON file of extra request headers (cookie)
    #[clap(parse(from_os_str), long)]
    pub headers_file: Option<PathBuf>,
    /// Override the number of concurrent listing page downloads
    #[clap(long)]
    pub page_workers: Option<usize>,
    /// Override the number of concurrent thread downloads
    #[clap(long)]
    pub thread_workers: Option<usize>,
    /// Override the number of sections crawled concurrently
    #[clap(long)]
    pub section_workers: Option<usize>,
    /// Override the request timeout in seconds
    #[clap(long)]
    pub timeout: Option<u64>,
    /// Override the number of attempts per request
    #[clap(long)]
    pub retries: Option<u32>,
    /// Override crawler's user agent
    #[clap(long)]
    pub user_agent: Option<String>,
    /// When quiet no logs are outputted
    #[clap(long, short)]
    pub quiet: bool,
}

impl TryFrom<&CrawlArgs> for CrawlerConfig {
    type Error = anyhow::Error;

    fn try_from(args: &CrawlArgs) -> Result<Self, Self::Error> {
        let mut conf: CrawlerConfig = if let Some(file) = args.config.as_ref().map(File::open) {
            serde_yaml::from_reader(file?)?
        } else {
            CrawlerConfig::default()
        };
        if let Some(table) = &args.table {
            conf.table_file = table.clone();
        }
        if let Some(index) = &args.index {
            conf.index_file = Some(index.clone());
        }
        if let Some(artifact_dir) = &args.artifact_dir {
            conf.artifact_dir = Some(artifact_dir.clone());
        }
        if let Some(headers_file) = &args.headers_file {
            conf.headers_file = Some(headers_file.clone());
        }
        if let Some(page_workers) = args.page_workers {
            conf.page_workers = page_workers;
        }
        if let Some(thread_workers) = args.thread_workers {
            conf.thread_workers = thread_workers;
        }
        if let Some(section_workers) = args.section_workers {
            conf.section_workers = section_workers;
        }
        if let Some(timeout) = args.timeout {
            conf.timeout_secs = timeout;
        }
        if let Some(retries) = args.retries {
            conf.retry.attempts = retries;
        }
        if let Some(user_agent) = &args.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        Ok(conf)
    }
}

/// Sections selected on the command line, or every configured one.
fn selected_sections(
    conf: &CrawlerConfig,
    selection: &[String],
) -> anyhow::Result<BTreeMap<String, String>> {
    if selection.is_empty() {
        return Ok(conf.sections.clone());
    }
    let mut sections = BTreeMap::new();
    for choice in selection {
        match choice.split_once('=') {
            Some((name, url)) => {
                sections.insert(name.to_string(), url.to_string());
            }
            None => match conf.sections.get(choice) {
                Some(url) => {
                    sections.insert(choice.clone(), url.clone());
                }
                None => bail!("Unknown section `{choice}`"),
            },
        }
    }
    Ok(sections)
}

pub fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let conf = CrawlerConfig::try_from(&args)?;
    let sections = selected_sections(&conf, &args.section)?;
    if sections.is_empty() {
        bail!("No section to crawl, configure `sections` or pass --section NAME=URL");
    }

    let store = MergeStore::open(&conf.table_file, conf.index_path())
        .with_context(|| format!("Couldn't open {}", conf.table_file.display()))?;
    let fetcher = HttpFetcher::new(&conf)?;
    let crawler = Crawler::new(fetcher, Arc::new(store), conf);

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let summary = rt.block_on(crawler.crawl_sections(&sections))?;
    if !summary.failed.is_empty() {
        let names = summary
            .failed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        bail!("Failed sections: {}", names.join(", "));
    }
    Ok(())
}

fn init_logs(default: &str) {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", default);
    }
    env_logger::init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Crawl(args) => {
            if !args.quiet {
                init_logs("fsp_crawler=info,fsp_store=info,fsp_scraper=warn");
            }
            crawl(args)
        }
        SubCommand::Scrap(args) => {
            init_logs("fsp=warn");
            scrap::scrap(args)
        }
        SubCommand::Rank(args) => {
            init_logs("fsp=info");
            rank::rank(args)
        }
        SubCommand::Trends(args) => {
            init_logs("fsp=info");
            trends::trends(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "fsp", &mut io::stdout());
            Ok(())
        }
    }
}
