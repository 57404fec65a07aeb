/// `utplot` -- Turn uTP congestion-control logs into plottable data
///
/// Run with --help for brief help.
///
/// Quirks
///
/// Socket selection is by frequency of delay samples, not by volume of traffic or by the length of
/// the connection.  A short-lived socket that logs densely can win over a long-lived one that logs
/// sparsely.  Use --socket to override, the ranking printed by `plot` (and `sockets`) shows the
/// candidates.
///
/// The max_window column is by default the sum over the sockets whose records pass the filter, ie,
/// for a single socket it is just that socket's window.  With --cross-socket-window every socket's
/// window is tracked and summed even though only the selected socket's rows are emitted.
///
/// Log lines that carry a marker phrase but no recognizable `[time] socket:` prefix cannot be
/// attributed to a socket, and are therefore never filtered out.  A loss line without a prefix will
/// be counted against whatever socket is being looked at.
mod format;
mod parse;
mod plot;
mod sockets;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use rustutils::RunConfig;
use std::io::{self, Write};
use std::process;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utplog::SocketFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print information about the program
    Version,

    /// Analyze the log, write the data tables and the plot descriptions
    Plot(PlotCmdArgs),

    /// Print the sockets ranked by number of delay samples
    Sockets(SocketsCmdArgs),

    /// Parse the log, apply socket filtering, and print raw, comma-separated records
    Parse(ParseCmdArgs),
}

#[derive(Args, Debug)]
pub struct PlotCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    filter_args: SocketFilterArgs,

    #[command(flatten)]
    config_args: ConfigArgs,

    #[command(flatten)]
    output_args: OutputArgs,

    #[command(flatten)]
    plot_args: PlotOptionArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SocketsCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    print_args: SocketsPrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct ParseCmdArgs {
    #[command(flatten)]
    source_args: SourceArgs,

    #[command(flatten)]
    filter_args: SocketFilterArgs,

    #[command(flatten)]
    print_args: ParsePrintArgs,

    #[command(flatten)]
    meta_args: MetaArgs,
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Log file name, "-" for stdin
    logfile: String,
}

#[derive(Args, Debug, Default)]
pub struct SocketFilterArgs {
    /// Select records for this socket only [default: the socket with the most delay samples]
    #[arg(long)]
    socket: Option<String>,

    /// Select records for every socket
    #[arg(long)]
    all_sockets: bool,
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// File containing JSON data with run settings, overridden by the command line [default: none]
    #[arg(long)]
    config_file: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Directory to write the artifacts to [default: .]
    #[arg(long)]
    output_dir: Option<String>,

    /// Prefix of the artifact file names [default: utp.out]
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct PlotOptionArgs {
    /// Bucket width of the delay histogram, in ms [default: 1]
    #[arg(long)]
    quantization: Option<f64>,

    /// Track max_window for every socket, not just the selected ones
    #[arg(long)]
    cross_socket_window: bool,

    /// Emit rows only for samples that carry a delay sample
    #[arg(long)]
    indicator_rows_only: bool,
}

#[derive(Args, Debug, Default)]
pub struct SocketsPrintArgs {
    /// Print only the first N sockets [default: all]
    #[arg(long)]
    top: Option<usize>,

    /// Select fields and format for the output [default: try --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ParsePrintArgs {
    /// Select fields and format for the output [default: try --fmt=help]
    #[arg(long)]
    fmt: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct MetaArgs {
    /// Print statistics about the input to stderr and log at the debug level
    #[arg(long, short)]
    verbose: bool,
}

fn main() {
    match utplot() {
        Ok(()) => {}
        Err(msg) => {
            eprintln!("ERROR: {}", msg);
            process::exit(1);
        }
    }
}

fn utplot() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        // Syntax:
        //  - components of the version string are space-separated but there are spaces nowhere else
        //  - the keyword "utplot" is always the first component
        //  - every component is keyword(value)
        //  - "version" carries a semver
        println!("utplot version({})", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if match cli.command {
        Commands::Sockets(ref sockets_args) => {
            format::maybe_help(&sockets_args.print_args.fmt, &sockets::fmt_help)
        }
        Commands::Parse(ref parse_args) => {
            format::maybe_help(&parse_args.print_args.fmt, &parse::fmt_help)
        }
        Commands::Plot(_) | Commands::Version => false,
    } {
        return Ok(());
    }

    let (source_args, meta_args) = match cli.command {
        Commands::Plot(ref plot_args) => (&plot_args.source_args, &plot_args.meta_args),
        Commands::Sockets(ref sockets_args) => (&sockets_args.source_args, &sockets_args.meta_args),
        Commands::Parse(ref parse_args) => (&parse_args.source_args, &parse_args.meta_args),
        Commands::Version => bail!("Unexpected command"),
    };

    init_logging(meta_args.verbose);

    let (records, stats) = utplog::parse_logfile(&source_args.logfile)?;
    if meta_args.verbose {
        eprintln!(
            "{} lines, {} discarded, {} bad values, {} records",
            stats.lines,
            stats.discarded,
            stats.bad_values,
            records.len()
        );
    }

    let mut stdout = io::stdout();
    let output: &mut dyn io::Write = &mut stdout;
    match cli.command {
        Commands::Plot(ref plot_args) => {
            let config = match plot_args.config_args.config_file {
                Some(ref name) => rustutils::read_run_config(name)?,
                None => RunConfig::default(),
            };
            let settings = plot::resolve_settings(plot_args, &config)?;
            plot::plot(output, &settings, &records)?;
        }
        Commands::Sockets(ref sockets_args) => {
            sockets::print_sockets(output, &sockets_args.print_args, &records)?;
        }
        Commands::Parse(ref parse_args) => {
            let filter = socket_filter(&parse_args.filter_args, &RunConfig::default())?;
            parse::print_parsed_data(output, &parse_args.print_args, filter, &records)?;
        }
        Commands::Version => bail!("Unexpected command"),
    }
    let _ = output.flush();

    Ok(())
}

/// Diagnostics go to stderr, filtered by RUST_LOG with a default of `warn`.  --verbose raises the
/// level to `debug` regardless of the environment.

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let console_layer = fmt::layer().with_target(true).with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

/// Combine the filter flags with the configuration.  The command line wins over the file; within
/// either, asking for a socket and for all sockets at the same time is an error.  `None` means
/// "select automatically".

pub fn socket_filter(args: &SocketFilterArgs, config: &RunConfig) -> Result<Option<SocketFilter>> {
    if args.socket.is_some() && args.all_sockets {
        bail!("--socket and --all-sockets are incompatible")
    }
    if let Some(ref s) = args.socket {
        return Ok(Some(SocketFilter::Socket(s.as_str().into())));
    }
    if args.all_sockets {
        return Ok(Some(SocketFilter::All));
    }
    if let Some(ref s) = config.socket {
        return Ok(Some(SocketFilter::Socket(s.as_str().into())));
    }
    if config.all_sockets == Some(true) {
        return Ok(Some(SocketFilter::All));
    }
    Ok(None)
}

#[test]
fn test_socket_filter() {
    let none = SocketFilterArgs::default();
    assert!(socket_filter(&none, &RunConfig::default()).unwrap().is_none());

    let flag = SocketFilterArgs {
        socket: Some("0x1".to_string()),
        all_sockets: false,
    };
    let config = RunConfig {
        all_sockets: Some(true),
        ..Default::default()
    };
    assert!(socket_filter(&flag, &config).unwrap() == Some(SocketFilter::Socket("0x1".into())));
    assert!(socket_filter(&none, &config).unwrap() == Some(SocketFilter::All));

    let config = RunConfig {
        socket: Some("0x2".to_string()),
        ..Default::default()
    };
    assert!(socket_filter(&none, &config).unwrap() == Some(SocketFilter::Socket("0x2".into())));

    let both = SocketFilterArgs {
        socket: Some("0x1".to_string()),
        all_sockets: true,
    };
    assert!(socket_filter(&both, &RunConfig::default()).is_err());
}

#[test]
fn test_cli_parses() {
    let cli = Cli::try_parse_from([
        "utplot",
        "plot",
        "--socket",
        "0x1",
        "--quantization",
        "2.5",
        "--prefix",
        "run.",
        "--verbose",
        "log.txt",
    ])
    .unwrap();
    let Commands::Plot(args) = cli.command else {
        panic!("Expected plot")
    };
    assert!(args.source_args.logfile == "log.txt");
    assert!(args.filter_args.socket.as_deref() == Some("0x1"));
    assert!(args.plot_args.quantization == Some(2.5));
    assert!(args.output_args.prefix.as_deref() == Some("run."));
    assert!(args.meta_args.verbose);

    assert!(Cli::try_parse_from(["utplot", "sockets", "--top", "3", "-"]).is_ok());
    assert!(Cli::try_parse_from(["utplot", "parse"]).is_err());
}
