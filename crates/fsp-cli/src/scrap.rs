use std::io::{self, Write};
use std::path::PathBuf;
use std::thread;

use anyhow::Context;
use crossbeam_channel::unbounded;
use csv::StringRecord;
use fsp_scraper::{parse_listing, ThreadSummary};

const HEADERS: [&str; 9] = [
    "tid", "标题", "作者", "评论数", "浏览数", "发表时间", "更新时间", "uid", "链接",
];

/// Parse listing pages and print their threads as CSV to stdout
#[derive(Debug, clap::Args)]
#[clap(group = clap::ArgGroup::new("page").required(true))]
pub struct ScrapArgs {
    /// A local html listing page
    #[clap(group = "page", parse(from_os_str), long)]
    pub file: Option<PathBuf>,
    /// A distant html listing page
    #[clap(group = "page", long)]
    pub url: Option<String>,
    /// A glob pattern of local html listing pages
    #[clap(group = "page", long)]
    pub glob: Option<String>,
    /// Forum host used to build thread URLs (taken from --url when omitted)
    #[clap(long)]
    pub host: Option<String>,
    /// Listing page number, page 1 lists an extra administrator link
    #[clap(long, default_value_t = 1)]
    pub page_number: u32,
    /// Custom user agent to download the page
    #[clap(long, conflicts_with_all = &["file", "glob"])]
    pub ua: Option<String>,
    /// Number of threads parsing files matched by --glob
    #[clap(long)]
    pub num_workers: Option<usize>,
}

fn summary_record(summary: &ThreadSummary) -> StringRecord {
    StringRecord::from(vec![
        summary.tid.clone(),
        summary.title.clone(),
        summary.author.clone(),
        summary.comment_count.to_string(),
        summary.view_count.to_string(),
        summary.create_time.to_string(),
        summary.update_time.to_string(),
        summary.uid.clone(),
        summary.url.clone(),
    ])
}

/// Writes the threads of one listing page, returns how many were written.
pub fn scrap_page<W: Write>(
    markup: &str,
    page_number: u32,
    host: &str,
    wtr: &mut csv::Writer<W>,
) -> anyhow::Result<usize> {
    let listing = parse_listing(markup, page_number, host)?;
    for failure in &listing.failures {
        log::warn!("{failure}");
    }
    for summary in &listing.summaries {
        wtr.write_record(&summary_record(summary))?;
    }
    Ok(listing.summaries.len())
}

/// Parses every file matching `pattern` on `num_workers` threads.
pub fn scrap_glob<W: Write>(
    pattern: &str,
    page_number: u32,
    host: &str,
    num_workers: usize,
    wtr: &mut csv::Writer<W>,
) -> anyhow::Result<usize> {
    let (tx_path, rx_path) = unbounded::<PathBuf>();
    let (tx_record, rx_record) = unbounded::<StringRecord>();

    let mut workers = vec![];
    for id in 0..num_workers.max(1) {
        let rx_path = rx_path.clone();
        let tx_record = tx_record.clone();
        let host = host.to_string();
        let worker = thread::Builder::new()
            .name(format!("{id}"))
            .spawn(move || {
                for path in rx_path.into_iter() {
                    let markup = fs_err::read_to_string(&path)?;
                    match parse_listing(&markup, page_number, &host) {
                        Ok(listing) => {
                            for failure in &listing.failures {
                                log::warn!("{}: {failure}", path.display());
                            }
                            for summary in &listing.summaries {
                                tx_record.send(summary_record(summary)).ok();
                            }
                        }
                        Err(e) => log::error!("Skipping page {} got: {e}", path.display()),
                    }
                }
                Ok::<(), anyhow::Error>(())
            })?;
        workers.push(worker);
    }
    drop(tx_record);

    for path in glob::glob(pattern)? {
        tx_path.send(path?).ok();
    }
    drop(tx_path);

    let mut written = 0;
    for record in rx_record {
        wtr.write_record(&record)?;
        written += 1;
    }

    for w in workers {
        w.join()
            .map_err(|_| anyhow::anyhow!("Scrap worker panicked"))??;
    }

    Ok(written)
}

pub fn scrap(args: ScrapArgs) -> anyhow::Result<()> {
    let host = match (&args.host, &args.url) {
        (Some(host), _) => host.clone(),
        (None, Some(url)) => reqwest::Url::parse(url)?
            .host_str()
            .map(String::from)
            .with_context(|| format!("No host in {url}"))?,
        (None, None) => anyhow::bail!("Missing `host`"),
    };

    let mut wtr = csv::Writer::from_writer(io::stdout());
    wtr.write_record(HEADERS)?;

    let written = if let Some(url) = &args.url {
        let mut builder = reqwest::blocking::ClientBuilder::new();
        if let Some(ua) = &args.ua {
            builder = builder.user_agent(ua);
        }
        let client = builder.build()?;
        let page = client.get(url).send()?.error_for_status()?.text()?;
        scrap_page(&page, args.page_number, &host, &mut wtr)?
    } else if let Some(path) = &args.file {
        let page = fs_err::read_to_string(path)?;
        scrap_page(&page, args.page_number, &host, &mut wtr)?
    } else if let Some(pattern) = &args.glob {
        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);
        scrap_glob(pattern, args.page_number, &host, num_workers, &mut wtr)?
    } else {
        anyhow::bail!("Missing `url`, `file` or `glob`");
    };

    wtr.flush()?;
    log::info!("Scrapped {written} threads");
    Ok(())
}
