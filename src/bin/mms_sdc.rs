use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use mms_sdc::app::{App, FileList, ProgressSink, TracingSink};
use mms_sdc::auth::EnvCredentials;
use mms_sdc::config::{ConfigLoader, ResolvedConfig, SelectionEntry, ValueEntry, build_selector};
use mms_sdc::domain::DataSelector;
use mms_sdc::error::SdcError;
use mms_sdc::output::{JsonOutput, OutputMode, PlainOutput};
use mms_sdc::sdc::{DEFAULT_SDC_HOME, SdcHttpClient};
use mms_sdc::store::Archive;

#[derive(Parser)]
#[command(name = "mms-sdc")]
#[command(about = "Sync a local MMS data archive with the Science Data Center")]
#[command(version, author)]
struct Cli {
    /// Selections are read from this file when none are given on the command line.
    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    data_root: Option<String>,

    #[arg(long, global = true)]
    workers: Option<usize>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show which files are local and which are missing")]
    Search(SelectionArgs),
    #[command(about = "Download missing files and list all matching local files")]
    Download(SelectionArgs),
    #[command(about = "List matching files in the local archive only")]
    Local(SelectionArgs),
}

#[derive(Args, Clone, Default)]
struct SelectionArgs {
    /// Spacecraft, comma separated (mms1,mms2,...)
    #[arg(long)]
    sc: Option<String>,
    #[arg(long)]
    instr: Option<String>,
    #[arg(long)]
    mode: Option<String>,
    #[arg(long)]
    level: Option<String>,
    #[arg(long)]
    descriptor: Option<String>,
    #[arg(long)]
    version: Option<String>,
    #[arg(long)]
    anc_product: Option<String>,
    /// ancillary, hk or science
    #[arg(long)]
    data_type: Option<String>,
    /// public or private
    #[arg(long)]
    site: Option<String>,
    /// YYYY-MM-DD or YYYY-MM-DDThh:mm:ss
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    #[arg(long, value_delimiter = ',')]
    files: Option<Vec<String>>,
    #[arg(long)]
    offline: bool,
}

impl SelectionArgs {
    fn is_empty(&self) -> bool {
        self.sc.is_none() && self.anc_product.is_none() && self.files.is_none()
    }

    fn into_entry(self) -> SelectionEntry {
        SelectionEntry {
            spacecraft: self.sc.map(ValueEntry::Shorthand),
            instrument: self.instr.map(ValueEntry::Shorthand),
            mode: self.mode.map(ValueEntry::Shorthand),
            level: self.level.map(ValueEntry::Shorthand),
            descriptor: self.descriptor.map(ValueEntry::Shorthand),
            version: self.version.map(ValueEntry::Shorthand),
            anc_product: self.anc_product.map(ValueEntry::Shorthand),
            data_type: self.data_type,
            site: self.site,
            start_date: self.start,
            end_date: self.end,
            files: self.files,
            offline: self.offline.then_some(true),
        }
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SdcError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SdcError) -> u8 {
    match error {
        SdcError::InvalidSelector(_) | SdcError::Parse(_) | SdcError::MissingConfig => 2,
        SdcError::AuthenticationFailure { .. }
        | SdcError::Transport(_)
        | SdcError::Status { .. }
        | SdcError::DownloadFailure { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Plain
    };

    let (command, args) = match cli.command {
        Commands::Search(args) => (Command::Search, args),
        Commands::Download(args) => (Command::Download, args),
        Commands::Local(args) => (Command::Local, args),
    };

    let config = if args.is_empty() || cli.config.is_some() {
        Some(ConfigLoader::resolve(cli.config.as_deref())?)
    } else {
        None
    };
    let selectors = if args.is_empty() {
        config
            .as_ref()
            .map(|config| config.selectors.clone())
            .unwrap_or_default()
    } else {
        vec![build_selector(args.into_entry(), false)?]
    };
    if selectors.is_empty() {
        return Err(miette::Report::msg(
            "nothing selected (pass --sc/--anc-product/--files or a config with selections)",
        ));
    }

    let archive = match cli.data_root.or_else(|| {
        config
            .as_ref()
            .and_then(|config| config.data_root.as_ref().map(|root| root.to_string()))
    }) {
        Some(root) => Archive::new_with_root(Utf8PathBuf::from(root)),
        None => Archive::new()?,
    };
    archive.ensure_root()?;

    let client = SdcHttpClient::with_base_url(&sdc_home(config.as_ref()), EnvCredentials)?;
    let workers = cli
        .workers
        .or_else(|| config.as_ref().map(|config| config.workers))
        .unwrap_or(0);
    let app = App::new(archive, client).with_workers(workers);

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Plain => &TracingSink,
    };
    for mut selector in selectors {
        run_command(command, &app, &mut selector, output_mode, sink)?;
    }
    Ok(())
}

#[derive(Clone, Copy)]
enum Command {
    Search,
    Download,
    Local,
}

fn run_command(
    command: Command,
    app: &App<SdcHttpClient>,
    selector: &mut DataSelector,
    output_mode: OutputMode,
    sink: &dyn ProgressSink,
) -> miette::Result<()> {
    match command {
        Command::Search => {
            let result = app.search(selector, sink)?;
            match output_mode {
                OutputMode::Json => JsonOutput::print_search(&result),
                OutputMode::Plain => PlainOutput::print_search(&result),
            }
            .into_diagnostic()
        }
        Command::Download => {
            let files = FileList {
                files: app.download(selector, sink)?,
            };
            print_files(&files, output_mode)
        }
        Command::Local => {
            let files = FileList {
                files: app.local_files(selector, sink)?,
            };
            print_files(&files, output_mode)
        }
    }
}

fn print_files(files: &FileList, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => JsonOutput::print_files(files),
        OutputMode::Plain => PlainOutput::print_files(files),
    }
    .into_diagnostic()
}

fn sdc_home(config: Option<&ResolvedConfig>) -> String {
    config
        .map(|config| config.sdc_home.clone())
        .unwrap_or_else(|| DEFAULT_SDC_HOME.to_string())
}
