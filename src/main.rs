use clap::{crate_version, App, AppSettings, Arg, SubCommand};
use dealgrid::{build, config, coupang, ingest, store};

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let matches = App::new("dealgrid")
        .version(crate_version!())
        .about("Builds a fleet of price-comparison sites from one post store")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Renders every registered site into the output directory")
                .arg(
                    Arg::with_name("threads")
                        .long("threads")
                        .short("t")
                        .takes_value(true)
                        .help("Worker threads for the per-site build loop (default: logical CPUs)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Searches one keyword and appends a post to the store")
                .arg(Arg::with_name("keyword").required(true))
                .arg(Arg::with_name("category")),
        )
        .subcommand(
            SubCommand::with_name("batch")
                .about("Samples keywords from the keyword file and appends one post each")
                .arg(
                    Arg::with_name("count")
                        .long("count")
                        .short("n")
                        .takes_value(true)
                        .help("Keywords to attempt (default: batch_size from the project file)"),
                ),
        )
        .get_matches();

    let cwd = std::env::current_dir()?;

    match matches.subcommand() {
        ("build", Some(sub)) => {
            let threads = parse_usize(sub.value_of("threads"), "--threads")?;
            let config = config::Config::from_directory(&cwd, threads)?;
            let registry = config::Registry::load(&config.registry_path)?;
            let posts = store::load(&config.store_path)?;
            let summary = build::build_sites(&config, &registry, &posts)?;
            println!(
                "Built {} sites ({} detail pages) into {}",
                summary.sites,
                summary.posts,
                config.output_directory.display()
            );
            Ok(())
        }
        ("add", Some(sub)) => {
            dotenv::dotenv().ok();
            let config = config::Config::from_directory(&cwd, None)?;
            let registry = config::Registry::load(&config.registry_path)?;
            let client = coupang::Client::from_env()?;
            let keyword = sub.value_of("keyword").unwrap_or_default(); // required by clap
            match ingest::run_single(
                &config,
                &client,
                registry.len(),
                keyword,
                sub.value_of("category"),
            )? {
                Some(slug) => println!("Added '{}' to {}", slug, config.store_path.display()),
                None => println!("No post added"),
            }
            Ok(())
        }
        ("batch", Some(sub)) => {
            dotenv::dotenv().ok();
            let count = parse_usize(sub.value_of("count"), "--count")?;
            let mut config = config::Config::from_directory(&cwd, None)?;
            if let Some(count) = count {
                config.batch_size = count;
            }
            let registry = config::Registry::load(&config.registry_path)?;
            let client = coupang::Client::from_env()?;
            let outcome = ingest::run_batch(&config, &client, registry.len())?;
            println!(
                "Attempted {} keywords: {} added, {} skipped",
                outcome.attempted, outcome.added, outcome.skipped
            );
            Ok(())
        }
        _ => unreachable!(),
    }
}

fn parse_usize(value: Option<&str>, flag: &str) -> anyhow::Result<Option<usize>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(anyhow::anyhow!(
                "{} expects a positive integer, got `{}`",
                flag,
                raw
            )),
        },
    }
}
