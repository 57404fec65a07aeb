/// Dump of the parsed records, for debugging the parser.
use crate::format;
use crate::ParsePrintArgs;

use anyhow::Result;
use std::collections::HashMap;
use std::io;
use utplog::{Record, SocketFilter};

pub fn print_parsed_data(
    output: &mut dyn io::Write,
    print_args: &ParsePrintArgs,
    filter: Option<SocketFilter>,
    records: &[Record],
) -> Result<()> {
    let (formatters, aliases) = my_formatters();
    let spec = if let Some(ref fmt) = print_args.fmt {
        fmt
    } else {
        FMT_DEFAULTS
    };
    let (fields, others) = format::parse_fields(spec, &formatters, &aliases)?;
    let mut opts = format::standard_options(&others);
    // `parse` defaults to headerless un-named csv.
    if !opts.fixed && !opts.csv && !opts.json && !opts.awk {
        opts.csv = true;
        opts.header = false;
    }

    // No filter means every record, there is no automatic selection here.
    let filter = filter.unwrap_or(SocketFilter::All);
    let selected = records
        .iter()
        .filter(|r| filter.admits(r.socket))
        .cloned()
        .collect::<Vec<Record>>();
    format::format_data(output, &fields, &formatters, &opts, selected, ())
}

pub fn fmt_help() -> format::Help {
    let (formatters, aliases) = my_formatters();
    format::Help {
        fields: formatters
            .keys()
            .cloned()
            .collect::<Vec<String>>(),
        aliases: aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<(String, Vec<String>)>>(),
        defaults: FMT_DEFAULTS.to_string(),
    }
}

const FMT_DEFAULTS: &str = "time,socket,kind,metrics";

fn my_formatters() -> (
    HashMap<String, &'static dyn Fn(RecordDatum, RecordCtx) -> String>,
    HashMap<String, Vec<String>>,
) {
    let mut formatters: HashMap<String, &'static dyn Fn(RecordDatum, RecordCtx) -> String> =
        HashMap::new();
    let mut aliases: HashMap<String, Vec<String>> = HashMap::new();
    formatters.insert("time".to_string(), &format_time);
    formatters.insert("socket".to_string(), &format_socket);
    formatters.insert("kind".to_string(), &format_kind);
    formatters.insert("metrics".to_string(), &format_metrics);
    formatters.insert("title".to_string(), &format_title);

    aliases.insert(
        "all".to_string(),
        vec![
            "time".to_string(),
            "socket".to_string(),
            "kind".to_string(),
            "metrics".to_string(),
            "title".to_string(),
        ],
    );

    (formatters, aliases)
}

type RecordDatum<'a> = &'a Record;
type RecordCtx = ();

fn format_time(d: RecordDatum, _: RecordCtx) -> String {
    d.timestamp.to_string()
}

// Marker lines without a prefix have no socket.
fn format_socket(d: RecordDatum, _: RecordCtx) -> String {
    match d.socket {
        Some(s) => s.to_string(),
        None => "-".to_string(),
    }
}

fn format_kind(d: RecordDatum, _: RecordCtx) -> String {
    d.kind.as_str().to_string()
}

fn format_metrics(d: RecordDatum, _: RecordCtx) -> String {
    d.metrics
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<String>>()
        .join(" ")
}

fn format_title(d: RecordDatum, _: RecordCtx) -> String {
    d.title.clone().unwrap_or_default()
}

#[cfg(test)]
fn print_to_string(fmt: Option<&str>, filter: Option<SocketFilter>, text: &str) -> String {
    let records = utplog::parse_log(io::Cursor::new(text.as_bytes())).unwrap().0;
    let args = ParsePrintArgs {
        fmt: fmt.map(|s| s.to_string()),
    };
    let mut out = Vec::new();
    print_parsed_data(&mut out, &args, filter, &records).unwrap();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
const SOME_LINES: &str = "[5] 0x1: our_delay:10 rtt:4.5\n\
                          noise\n\
                          [7] 0x2: Packet 9 lost. Resending\n\
                          Packet timeout. Resend. seq_nr:3\n";

#[test]
fn test_parse_defaults() {
    let s = print_to_string(None, None, SOME_LINES);
    assert!(s == "5,0x1,sample,our_delay:10 rtt:4.5\n7,0x2,loss,\n7,-,timeout,\n");
}

#[test]
fn test_parse_filtered() {
    let s = print_to_string(
        Some("socket,kind,fixed"),
        Some(SocketFilter::Socket("0x2".into())),
        SOME_LINES,
    );
    assert!(s == "socket  kind\n0x2     loss\n-       timeout\n");
}
