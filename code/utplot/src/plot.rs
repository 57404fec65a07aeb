/// Run the full analysis and write the artifacts for the chosen socket(s):
///
///   <base>            the time-series table, tab-separated, "-" for missing values
///   <base>.histogram  bucket center and count for the delay histogram
///   <base>.plot.json  the plot descriptor
///   utp.gnuplot       a gnuplot script rendered from the descriptor
///
/// where <base> is the prefix followed by the socket id, or by "all" for all sockets.  Nothing is
/// written if the analysis fails.
use crate::sockets;
use crate::PlotCmdArgs;

use anyhow::{bail, Result};
use rustutils::RunConfig;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use utplog::{Analysis, Histogram, Record, SeriesOptions, SocketFilter, TimeSeries, MISSING_VALUE};

pub const DEFAULT_QUANTIZATION: f64 = 1.0;
pub const DEFAULT_PREFIX: &str = "utp.out";
pub const GNUPLOT_SCRIPT: &str = "utp.gnuplot";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// None means "select automatically".
    pub filter: Option<SocketFilter>,
    pub quantization: f64,
    pub output_dir: PathBuf,
    pub prefix: String,
    pub options: SeriesOptions,
}

/// Defaults, then the config file, then the command line.

pub fn resolve_settings(args: &PlotCmdArgs, config: &RunConfig) -> Result<Settings> {
    let filter = crate::socket_filter(&args.filter_args, config)?;

    let quantization = args
        .plot_args
        .quantization
        .or(config.quantization)
        .unwrap_or(DEFAULT_QUANTIZATION);
    if !quantization.is_finite() || quantization <= 0.0 {
        bail!("Quantization must be a positive number: {quantization}")
    }

    let output_dir = PathBuf::from(
        args.output_args
            .output_dir
            .as_deref()
            .or(config.output_dir.as_deref())
            .unwrap_or("."),
    );
    let prefix = args
        .output_args
        .prefix
        .as_deref()
        .or(config.prefix.as_deref())
        .unwrap_or(DEFAULT_PREFIX)
        .to_string();

    let options = SeriesOptions {
        cross_socket_window: args.plot_args.cross_socket_window
            || config.cross_socket_window.unwrap_or(false),
        indicator_rows_only: args.plot_args.indicator_rows_only
            || config.indicator_rows_only.unwrap_or(false),
    };

    Ok(Settings {
        filter,
        quantization,
        output_dir,
        prefix,
        options,
    })
}

pub fn plot(output: &mut dyn io::Write, settings: &Settings, records: &[Record]) -> Result<()> {
    let analysis = utplog::analyze(
        records,
        settings.filter.clone(),
        settings.quantization,
        settings.options,
    )?;

    if !analysis.ranking.is_empty() {
        sockets::print_ranking(output, &analysis.ranking)?;
    }

    write_artifacts(&settings.output_dir, &settings.prefix, &analysis)?;
    Ok(())
}

/// Write all the artifacts into `dir`, creating it if necessary, and return their paths.

pub fn write_artifacts(dir: &Path, prefix: &str, analysis: &Analysis) -> Result<Vec<PathBuf>> {
    let base = format!("{prefix}{}", analysis.filter);
    let desc = utplog::emit_plot_descriptor(
        &analysis.series.schema,
        &analysis.series.title,
        &base,
        analysis.histogram.width(),
    );

    fs::create_dir_all(dir)?;
    let mut written = vec![];

    let path = dir.join(&desc.data_file);
    write_table(&mut BufWriter::new(File::create(&path)?), &analysis.series)?;
    written.push(path);

    let path = dir.join(&desc.histogram.data_file);
    write_histogram(&mut BufWriter::new(File::create(&path)?), &analysis.histogram)?;
    written.push(path);

    let path = dir.join(format!("{base}.plot.json"));
    fs::write(&path, desc.to_json()?)?;
    written.push(path);

    let path = dir.join(GNUPLOT_SCRIPT);
    fs::write(&path, utplog::render_gnuplot(&desc))?;
    written.push(path);

    for p in &written {
        info!(path = %p.display(), "wrote artifact");
    }
    Ok(written)
}

pub fn write_table(w: &mut dyn io::Write, series: &TimeSeries) -> Result<()> {
    for row in &series.rows {
        let mut line = format!("{:.6}", row.time);
        for v in &row.values {
            line.push('\t');
            match v {
                Some(v) => line += format!("{v:.6}").as_str(),
                None => line += MISSING_VALUE,
            }
        }
        line += format!("\t{:.6}\t{:.6}\n", row.loss, row.timeout).as_str();
        w.write_all(line.as_bytes())?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_histogram(w: &mut dyn io::Write, histogram: &Histogram) -> Result<()> {
    for (bucket, count) in histogram.buckets() {
        writeln!(w, "{}\t{count}", histogram.center(bucket))?;
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
fn plot_args(argv: &[&str]) -> PlotCmdArgs {
    use clap::Parser;
    let mut v = vec!["utplot", "plot"];
    v.extend_from_slice(argv);
    v.push("-");
    match crate::Cli::parse_from(v).command {
        crate::Commands::Plot(args) => args,
        _ => panic!("Expected plot"),
    }
}

#[cfg(test)]
fn records_of(text: &str) -> Vec<Record> {
    utplog::parse_log(io::Cursor::new(text.as_bytes())).unwrap().0
}

#[cfg(test)]
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("utplot-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_resolve_defaults() {
    let s = resolve_settings(&plot_args(&[]), &RunConfig::default()).unwrap();
    assert!(s.filter.is_none());
    assert!(s.quantization == DEFAULT_QUANTIZATION);
    assert!(s.output_dir == PathBuf::from("."));
    assert!(s.prefix == DEFAULT_PREFIX);
    assert!(s.options == SeriesOptions::default());
}

#[test]
fn test_resolve_precedence() {
    let config = RunConfig {
        quantization: Some(5.0),
        prefix: Some("cfg.".to_string()),
        output_dir: Some("/tmp/x".to_string()),
        indicator_rows_only: Some(true),
        ..Default::default()
    };
    let args = plot_args(&["--quantization", "2", "--all-sockets"]);
    let s = resolve_settings(&args, &config).unwrap();
    assert!(s.quantization == 2.0);
    assert!(s.prefix == "cfg.");
    assert!(s.output_dir == PathBuf::from("/tmp/x"));
    assert!(s.filter == Some(SocketFilter::All));
    assert!(s.options.indicator_rows_only);
    assert!(!s.options.cross_socket_window);

    assert!(resolve_settings(&plot_args(&["--quantization", "0"]), &config).is_err());
    assert!(resolve_settings(&plot_args(&["--quantization=-1"]), &config).is_err());
}

#[test]
fn test_write_table() {
    let records = records_of(
        "[1000] s1: Packet 3 lost. Resending\n\
         [1000] s1: our_delay:10 rtt:4 max_window:100\n\
         [1500] s1: our_delay:12 max_window:120\n",
    );
    let series =
        utplog::build_time_series(&records, SocketFilter::All, SeriesOptions::default()).unwrap();
    let mut out = Vec::new();
    write_table(&mut out, &series).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines = text.lines().collect::<Vec<&str>>();
    assert!(lines.len() == 2);
    assert!(lines[0] == "0.000000\t10.000000\t4.000000\t100.000000\t8000.000000\t0.000000");
    assert!(lines[1] == "0.500000\t12.000000\t-\t120.000000\t0.000000\t0.000000");
}

#[test]
fn test_write_histogram() {
    let mut h = Histogram::new(10.0);
    for v in [1.0, 2.0, 15.0] {
        h.add(v);
    }
    let mut out = Vec::new();
    write_histogram(&mut out, &h).unwrap();
    assert!(String::from_utf8(out).unwrap() == "5\t2\n15\t1\n");
}

#[test]
fn test_plot_writes_artifacts() {
    let dir = scratch_dir("artifacts");
    let records = records_of(
        "[0] 0xa: UTP_Connect conn_seed:1 packet_size:1435 (B)\n\
         [0] 0xa: our_delay:100 rtt:9\n\
         [10] 0xa: our_delay:150\n\
         [20] 0xb: our_delay:50\n",
    );
    let settings = Settings {
        filter: None,
        quantization: 1.0,
        output_dir: dir.clone(),
        prefix: DEFAULT_PREFIX.to_string(),
        options: SeriesOptions::default(),
    };
    let mut out = Vec::new();
    plot(&mut out, &settings, &records).unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.lines().count() == 3);
    assert!(report.contains("0xa"));

    let table = fs::read_to_string(dir.join("utp.out0xa")).unwrap();
    assert!(table.lines().count() == 2);
    let histogram = fs::read_to_string(dir.join("utp.out0xa.histogram")).unwrap();
    assert!(histogram == "100.5\t1\n150.5\t1\n");
    let desc = fs::read_to_string(dir.join("utp.out0xa.plot.json")).unwrap();
    let desc = json::parse(&desc).unwrap();
    assert!(desc["data_file"] == "utp.out0xa");
    assert!(desc["title"]
        .as_str()
        .unwrap()
        .ends_with("packet_size:1435 (B) socket: 0xa"));
    let script = fs::read_to_string(dir.join(GNUPLOT_SCRIPT)).unwrap();
    assert!(script.contains("set output \"utp.out0xa.delays.png\""));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_empty_input_writes_nothing() {
    let dir = scratch_dir("empty");
    let records = records_of("[0] 0xa: rtt:9\nnoise\n");
    let settings = Settings {
        filter: None,
        quantization: 1.0,
        output_dir: dir.clone(),
        prefix: DEFAULT_PREFIX.to_string(),
        options: SeriesOptions::default(),
    };
    let mut out = Vec::new();
    assert!(plot(&mut out, &settings, &records).is_err());
    assert!(!dir.exists());
}
